//! # vidmap-core
//!
//! vidmap 核心库, 提供错误分级、位级读取/写入与 Exp-Golomb 解码等基础设施.
//!
//! 上层的参数集解析器与容器索引器都建立在本 crate 之上.

pub mod bitreader;
pub mod bitwriter;
pub mod error;
pub mod exp_golomb;
pub mod media_type;

// 重导出常用类型
pub use bitreader::BitReader;
pub use bitwriter::BitWriter;
pub use error::{ParseStatus, VidError, VidResult};
pub use media_type::StreamType;
