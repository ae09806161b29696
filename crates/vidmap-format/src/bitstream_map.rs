//! 逐轨道采样映射 (bitstream map).
//!
//! 每条轨道一个 [`BitstreamMap`], 记录参数集条目与采样条目的文件字节区间、
//! 类型与时间戳, 不涉及任何载荷解码.
//!
//! 生命周期:
//! - [`BitstreamMap::new`] 按调用方估计的容量预留空间, 分配失败返回 `OutOfMemory`
//! - 解封装器通过 `push_sample` / `push_parameter` 顺序写入
//! - [`BitstreamMap::validate`] 检查所有条目都落在文件范围内
//! - 由所属的 [`MediaFile`](crate::MediaFile) 独占, 文件关闭时一并释放

use std::fmt;

use log::{debug, warn};
use vidmap_codec::{CodecId, CodecProfile};
use vidmap_core::{StreamType, VidError, VidResult};

/// 采样类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SampleType {
    /// 未知
    #[default]
    Unknown,
    /// 普通视频帧
    Video,
    /// 视频同步帧 (IDR / 关键帧)
    VideoSync,
    /// 视频参数集 (SPS/PPS, 序列头)
    VideoParam,
    /// 音频帧
    Audio,
    /// 音频参数
    AudioParam,
    /// 文本
    Text,
    /// 其他
    Other,
}

impl SampleType {
    /// 是否为视频帧 (含同步帧)
    pub fn is_video_frame(&self) -> bool {
        matches!(self, Self::Video | Self::VideoSync)
    }

    /// 是否为同步帧
    pub fn is_sync(&self) -> bool {
        matches!(self, Self::VideoSync)
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "UNKNOWN",
            Self::Video => "VIDEO",
            Self::VideoSync => "VIDEO_SYNC",
            Self::VideoParam => "VIDEO_PARAM",
            Self::Audio => "AUDIO",
            Self::AudioParam => "AUDIO_PARAM",
            Self::Text => "TEXT",
            Self::Other => "OTHER",
        };
        write!(f, "{name}")
    }
}

/// 采样条目
///
/// 时间戳以轨道 timescale 为单位, `-1` 表示未知.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleEntry {
    pub sample_type: SampleType,
    /// 文件内绝对偏移
    pub offset: u64,
    /// 字节大小
    pub size: u64,
    pub pts: i64,
    pub dts: i64,
}

impl SampleEntry {
    /// 创建时间戳未知的条目
    pub fn new(sample_type: SampleType, offset: u64, size: u64) -> Self {
        Self {
            sample_type,
            offset,
            size,
            pts: -1,
            dts: -1,
        }
    }

    /// 设置时间戳
    pub fn with_timestamps(mut self, pts: i64, dts: i64) -> Self {
        self.pts = pts;
        self.dts = dts;
        self
    }

    /// 区间末尾 (不含)
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.size)
    }
}

/// 参数集条目
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterEntry {
    pub parameter_type: SampleType,
    pub offset: u64,
    pub size: u64,
}

/// 视频轨道信息
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    /// 帧率 (未知为 0)
    pub frame_rate: f64,
}

/// 音频轨道信息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AudioInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

/// 逐轨道采样映射
#[derive(Debug, Clone)]
pub struct BitstreamMap {
    /// 流类型
    pub stream_type: StreamType,
    /// 编解码器
    pub codec: CodecId,
    /// 编解码器规格
    pub codec_profile: CodecProfile,
    /// 容器中的原始 fourcc
    pub fourcc: Option<[u8; 4]>,
    /// 容器内的轨道 id
    pub track_id: u32,
    /// 时间戳单位 (每秒刻度数, 0 表示未知)
    pub timescale: u32,
    /// 时长 (毫秒)
    pub duration_ms: u64,
    /// 平均码率 (bps)
    pub bitrate_avg: u64,
    /// 视频帧数 (VIDEO + VIDEO_SYNC)
    pub frame_count: u64,
    /// IDR 帧数 (VIDEO_SYNC)
    pub frame_count_idr: u64,
    pub video: Option<VideoInfo>,
    pub audio: Option<AudioInfo>,
    parameters: Vec<ParameterEntry>,
    samples: Vec<SampleEntry>,
    /// 构造时的容量估计
    param_capacity: usize,
    sample_capacity: usize,
    /// 超出容量估计的告警只输出一次
    overflow_warned: bool,
}

impl BitstreamMap {
    /// 按容量估计创建
    pub fn new(
        stream_type: StreamType,
        param_capacity: usize,
        sample_capacity: usize,
    ) -> VidResult<Self> {
        let mut parameters = Vec::new();
        parameters.try_reserve_exact(param_capacity).map_err(|_| {
            VidError::OutOfMemory(format!("参数集条目: 容量 {param_capacity}"))
        })?;
        let mut samples = Vec::new();
        samples
            .try_reserve_exact(sample_capacity)
            .map_err(|_| VidError::OutOfMemory(format!("采样条目: 容量 {sample_capacity}")))?;

        Ok(Self {
            stream_type,
            codec: CodecId::None,
            codec_profile: CodecProfile::Unknown,
            fourcc: None,
            track_id: 0,
            timescale: 0,
            duration_ms: 0,
            bitrate_avg: 0,
            frame_count: 0,
            frame_count_idr: 0,
            video: None,
            audio: None,
            parameters,
            samples,
            param_capacity,
            sample_capacity,
            overflow_warned: false,
        })
    }

    // ========================
    // 写入
    // ========================

    /// 追加采样条目
    pub fn push_sample(&mut self, entry: SampleEntry) {
        if self.samples.len() >= self.sample_capacity {
            self.warn_overflow("采样", self.sample_capacity);
        }
        self.samples.push(entry);
    }

    /// 追加参数集条目
    pub fn push_parameter(&mut self, entry: ParameterEntry) {
        if self.parameters.len() >= self.param_capacity {
            self.warn_overflow("参数集", self.param_capacity);
        }
        self.parameters.push(entry);
    }

    fn warn_overflow(&mut self, what: &str, capacity: usize) {
        if !self.overflow_warned {
            self.overflow_warned = true;
            warn!(
                "{} 轨道 {} 条目超出容量估计: capacity={}",
                self.stream_type, what, capacity
            );
        }
    }

    /// 最后一个采样条目 (可修改)
    pub fn last_sample_mut(&mut self) -> Option<&mut SampleEntry> {
        self.samples.last_mut()
    }

    /// 整体替换采样数组, 旧数组随即释放
    pub fn replace_samples(&mut self, samples: Vec<SampleEntry>) {
        self.sample_capacity = samples.len();
        self.samples = samples;
    }

    // ========================
    // 查询
    // ========================

    pub fn samples(&self) -> &[SampleEntry] {
        &self.samples
    }

    pub fn parameters(&self) -> &[ParameterEntry] {
        &self.parameters
    }

    pub fn sample(&self, index: usize) -> Option<&SampleEntry> {
        self.samples.get(index)
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    /// 构造时的采样容量估计
    pub fn sample_capacity(&self) -> usize {
        self.sample_capacity
    }

    /// 所有采样的字节总数
    pub fn total_sample_bytes(&self) -> u64 {
        self.samples.iter().map(|s| s.size).fold(0, u64::saturating_add)
    }

    // ========================
    // 统计与校验
    // ========================

    /// 根据采样类型重新统计帧数
    pub fn recount_frames(&mut self) {
        self.frame_count = self
            .samples
            .iter()
            .filter(|s| s.sample_type.is_video_frame())
            .count() as u64;
        self.frame_count_idr = self
            .samples
            .iter()
            .filter(|s| s.sample_type.is_sync())
            .count() as u64;
    }

    /// 根据采样字节总数与时长估算平均码率
    pub fn update_bitrate(&mut self) {
        if self.duration_ms > 0 {
            let bits = u128::from(self.total_sample_bytes()) * 8 * 1000;
            self.bitrate_avg = u64::try_from(bits / u128::from(self.duration_ms)).unwrap_or(u64::MAX);
        }
    }

    /// 校验所有条目满足 `offset + size <= file_size`
    pub fn validate(&self, file_size: u64) -> VidResult<()> {
        for (i, s) in self.samples.iter().enumerate() {
            if s.offset.checked_add(s.size).is_none_or(|end| end > file_size) {
                return Err(VidError::InvalidData(format!(
                    "采样 #{i} 越出文件范围: offset={}, size={}, file_size={file_size}",
                    s.offset, s.size
                )));
            }
        }
        for (i, p) in self.parameters.iter().enumerate() {
            if p.offset.checked_add(p.size).is_none_or(|end| end > file_size) {
                return Err(VidError::InvalidData(format!(
                    "参数集 #{i} 越出文件范围: offset={}, size={}, file_size={file_size}",
                    p.offset, p.size
                )));
            }
        }
        Ok(())
    }

    /// 调试输出 (摘要 + 全部条目), 对未填满的映射同样安全
    pub fn print(&self) {
        debug!("{self}");
        for (i, p) in self.parameters.iter().enumerate() {
            debug!(
                "  param[{i}]: type={}, offset={}, size={}",
                p.parameter_type, p.offset, p.size
            );
        }
        for (i, s) in self.samples.iter().enumerate() {
            debug!(
                "  sample[{i}]: type={}, offset={}, size={}, pts={}, dts={}",
                s.sample_type, s.offset, s.size, s.pts, s.dts
            );
        }
    }
}

impl fmt::Display for BitstreamMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} 轨道 #{}: codec={}, samples={}, params={}, frames={}, idr={}, duration={}ms, bitrate={}bps",
            self.stream_type,
            self.track_id,
            self.codec,
            self.samples.len(),
            self.parameters.len(),
            self.frame_count,
            self.frame_count_idr,
            self.duration_ms,
            self.bitrate_avg,
        )
    }
}
