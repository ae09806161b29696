//! # vidmap-codec
//!
//! 编解码器标识与码流参数解析.
//!
//! 本 crate 不做任何像素或音频解码, 只提供:
//! - [`CodecId`] / [`CodecProfile`]: 轨道编解码器与规格的统一标识
//! - [`parsers::h264`]: H.264 SPS/PPS/VUI/HRD 解析与语义校验
//!
//! ## 使用示例
//!
//! ```rust
//! use vidmap_codec::parsers::h264::{ParameterSets, decode_parameter_set_nal};
//!
//! let mut sets = ParameterSets::new();
//! // 非参数集 NAL 不写入参数集表
//! let nal_type = decode_parameter_set_nal(&[0x09, 0xF0], 0, &mut sets).unwrap();
//! assert_eq!(nal_type.type_id(), 9);
//! assert_eq!(sets.sps_count(), 0);
//! ```

pub mod codec_id;
pub mod parsers;

// 重导出常用类型
pub use codec_id::{CodecId, CodecProfile};
