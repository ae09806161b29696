//! # vidmap-format
//!
//! vidmap 容器格式库: 识别容器族, 为每条轨道构建逐采样的字节映射,
//! 并为 H.264 轨道解析参数集.
//!
//! 处理流程:
//! 1. [`probe::classify`] 根据文件头与扩展名识别 [`Container`]
//! 2. [`DemuxerRegistry`] 按容器分派到一个 [`Demuxer`]
//! 3. 解封装器产出若干 [`BitstreamMap`] 及文件级元数据
//! 4. [`MediaFile`] 对 H.264 轨道解析 SPS/PPS, 并可用 [`sample_filter`] 筛选 IDR

pub mod bitstream_map;
pub mod container;
pub mod demuxer;
pub mod demuxers;
pub mod io;
pub mod media_file;
pub mod options;
pub mod probe;
pub mod registry;
pub mod sample_filter;

// 重导出常用类型
pub use bitstream_map::{AudioInfo, BitstreamMap, ParameterEntry, SampleEntry, SampleType, VideoInfo};
pub use container::Container;
pub use demuxer::{Chapter, DemuxOutput, Demuxer, FileMetadata};
pub use io::IoContext;
pub use media_file::{MAX_TRACKS_PER_KIND, MediaFile, Sample, TrackKind, VideoTrack};
pub use options::ParseOptions;
pub use probe::{ContainerGuess, classify};
pub use registry::DemuxerRegistry;
pub use sample_filter::{FilterMode, SampleFilterConfig, filter_idr_samples};

/// 注册所有内置解封装器
pub fn register_all(registry: &mut DemuxerRegistry) {
    demuxers::register_all_demuxers(registry);
}
