//! 轨道流类型定义.

use std::fmt;

/// 轨道流类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StreamType {
    /// 音频流
    Audio,
    /// 视频流
    Video,
    /// 文本/字幕流
    Text,
    /// 菜单流
    Menu,
    /// 时间码流
    Timecode,
    /// 元数据流
    Meta,
    /// 提示 (hint) 轨道
    Hint,
    /// 未知
    #[default]
    Unknown,
}

impl StreamType {
    /// 是否为视频流
    pub fn is_video(&self) -> bool {
        matches!(self, Self::Video)
    }

    /// 是否为音频流
    pub fn is_audio(&self) -> bool {
        matches!(self, Self::Audio)
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Audio => "音频",
            Self::Video => "视频",
            Self::Text => "文本",
            Self::Menu => "菜单",
            Self::Timecode => "时间码",
            Self::Meta => "元数据",
            Self::Hint => "提示",
            Self::Unknown => "未知",
        };
        write!(f, "{name}")
    }
}
