//! # vidmap
//!
//! 纯 Rust 实现的媒体容器索引工具.
//!
//! 对一个媒体文件做一次扫描, 为每条轨道建立采样映射 (偏移, 大小, 时间戳, 类型),
//! 并解析 H.264 的 SPS/PPS. 不解码任何采样数据.
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use vidmap::format::{MediaFile, TrackKind};
//!
//! let mut file = MediaFile::open("movie.mp4")?;
//! let status = file.parse()?;
//! println!("{}: {status}, 视频轨道 {}", file.container(), file.track_count(TrackKind::Video));
//! for track in file.video_tracks() {
//!     println!("{}", track.map);
//! }
//! # Ok::<(), vidmap::core::VidError>(())
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `vidmap-core` | 错误类型, 位读取器, Exp-Golomb |
//! | `vidmap-codec` | 编解码器标识, H.264 参数集解析 |
//! | `vidmap-format` | 容器识别, 解封装器, 采样映射, 媒体文件 |

pub mod config;
pub mod logging;

/// 核心类型与工具
pub use vidmap_core as core;

/// 编解码器标识与参数集解析
pub use vidmap_codec as codec;

/// 容器识别与解封装
pub use vidmap_format as format;

pub use config::VidmapConfig;

/// 获取 vidmap 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// 创建已注册所有内置解封装器的注册表
pub fn default_demuxer_registry() -> vidmap_format::DemuxerRegistry {
    let mut registry = vidmap_format::DemuxerRegistry::new();
    vidmap_format::register_all(&mut registry);
    registry
}
