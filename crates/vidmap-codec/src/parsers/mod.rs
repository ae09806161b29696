//! 码流参数解析器.

pub mod h264;
