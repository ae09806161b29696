//! 解封装器 (Demuxer) trait 定义.
//!
//! 每种容器族的解封装器遍历自身的长度前缀记录语法 (MP4 box 树, RIFF chunk 列表,
//! MPEG 音频帧头, Annex-B 起始码等), 为每条可解析的轨道产出一个
//! [`BitstreamMap`], 并填写文件级元数据.
//!
//! 约定:
//! - `Err(_)` 表示整次解析失败 (零轨道, I/O 错误, 顶层结构损坏)
//! - 单条轨道解析失败只通过 [`DemuxOutput::skip_track`] 记录, 不影响其他轨道
//! - 返回的每条轨道的全部采样区间都落在文件范围内

use log::warn;
use vidmap_core::{ParseStatus, VidError, VidResult};

use crate::bitstream_map::BitstreamMap;
use crate::container::Container;
use crate::io::IoContext;
use crate::options::ParseOptions;

/// 解封装器 trait
pub trait Demuxer: Send {
    /// 对应的容器族
    fn container(&self) -> Container;

    /// 解封装器名称
    fn name(&self) -> &str;

    /// 应用解析选项, 默认忽略
    fn apply_options(&mut self, _options: &ParseOptions) {}

    /// 遍历整个文件, 产出所有轨道的采样映射
    ///
    /// `io` 位于文件起始处, `file_size` 为文件总字节数.
    fn parse(&mut self, io: &mut IoContext, file_size: u64) -> VidResult<DemuxOutput>;
}

/// 章节
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    /// 起始时间 (毫秒)
    pub start_ms: u64,
    pub title: String,
}

/// 文件级元数据
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileMetadata {
    /// 创建时间 (RFC 3339)
    pub creation_time: Option<String>,
    /// 文本标签 (键, 值)
    pub tags: Vec<(String, String)>,
    pub chapters: Vec<Chapter>,
}

impl FileMetadata {
    /// 追加标签, 空值忽略
    pub fn push_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        let value = value.trim_end_matches('\0').trim();
        if !value.is_empty() {
            self.tags.push((key.into(), value.to_string()));
        }
    }

    /// 按键查找第一个标签值
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// 解封装结果
#[derive(Debug, Default)]
pub struct DemuxOutput {
    /// 成功解析的轨道
    pub tracks: Vec<BitstreamMap>,
    pub metadata: FileMetadata,
    /// 所有轨道中最严重的状态
    pub status: ParseStatus,
}

impl DemuxOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// 提交一条已填充的轨道
    pub fn push_track(&mut self, track: BitstreamMap) {
        self.tracks.push(track);
    }

    /// 记录一条无法解析的轨道: 该轨道缺席, 状态取更严重者
    pub fn skip_track(&mut self, err: VidError) {
        warn!("跳过轨道: {err}");
        self.status = self.status.worst(err.status());
    }

    /// 零轨道时返回整体失败
    pub fn finish(self, container: Container) -> VidResult<Self> {
        if self.tracks.is_empty() {
            return Err(VidError::Format(format!("{container}: 未找到任何可解析的轨道")));
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidmap_core::StreamType;

    #[test]
    fn test_跳过轨道取最严重状态() {
        let mut out = DemuxOutput::new();
        out.skip_track(VidError::Unsupported("隔行".into()));
        assert_eq!(out.status, ParseStatus::Unsupported);
        out.skip_track(VidError::InvalidData("坏块".into()));
        assert_eq!(out.status, ParseStatus::Failure);
        out.skip_track(VidError::Unsupported("FMO".into()));
        assert_eq!(out.status, ParseStatus::Failure);
    }

    #[test]
    fn test_零轨道整体失败() {
        let err = DemuxOutput::new()
            .finish(Container::Avi)
            .expect_err("零轨道应失败");
        assert!(format!("{err}").contains("未找到任何可解析的轨道"));

        let mut out = DemuxOutput::new();
        out.push_track(BitstreamMap::new(StreamType::Audio, 0, 0).unwrap());
        assert_eq!(out.finish(Container::Wave).unwrap().tracks.len(), 1);
    }

    #[test]
    fn test_元数据标签() {
        let mut meta = FileMetadata::default();
        meta.push_tag("title", "clip\0\0");
        meta.push_tag("comment", "  ");
        assert_eq!(meta.tag("title"), Some("clip"));
        assert_eq!(meta.tag("comment"), None);
    }
}
