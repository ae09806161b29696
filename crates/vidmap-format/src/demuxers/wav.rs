//! WAV (RIFF WAVE) 解封装器.
//!
//! WAV 文件结构:
//! ```text
//! RIFF header:  "RIFF" + file_size-8 + "WAVE"
//! fmt  chunk:   "fmt " + chunk_size + audio_format + channels + sample_rate
//!              + byte_rate + block_align + bits_per_sample
//! LIST chunk:   "LIST" + size + "INFO" + 文本标签 (可选)
//! data chunk:   "data" + data_size + PCM samples...
//! ```
//!
//! data 块按固定帧数切分为采样块 (默认 4096 帧), 最后一块可以更短.
//! 时间戳以采样点为单位.

use log::{debug, warn};
use vidmap_codec::CodecId;
use vidmap_core::{StreamType, VidError, VidResult};

use super::riff::{parse_info_list, read_chunk_header};
use crate::bitstream_map::{AudioInfo, BitstreamMap, SampleEntry, SampleType};
use crate::container::Container;
use crate::demuxer::{DemuxOutput, Demuxer, FileMetadata};
use crate::io::IoContext;
use crate::options::{DEFAULT_WAV_BLOCK_FRAMES, MIN_WAV_BLOCK_FRAMES, ParseOptions};

/// WAVE_FORMAT_EXTENSIBLE
const WAV_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// fmt 块内容
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct WaveFormat {
    pub format_tag: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
}

impl WaveFormat {
    /// 从 WAVEFORMATEX 字节解析, EXTENSIBLE 时取子格式 GUID 的前 2 字节作为格式码
    pub(crate) fn parse(raw: &[u8]) -> VidResult<Self> {
        if raw.len() < 16 {
            return Err(VidError::InvalidData(format!(
                "WAVEFORMATEX 不足 16 字节: {}",
                raw.len()
            )));
        }
        let le16 = |i: usize| u16::from_le_bytes([raw[i], raw[i + 1]]);
        let le32 = |i: usize| u32::from_le_bytes([raw[i], raw[i + 1], raw[i + 2], raw[i + 3]]);

        let mut format_tag = le16(0);
        if format_tag == WAV_FORMAT_EXTENSIBLE && raw.len() >= 26 {
            format_tag = le16(24);
        }
        Ok(Self {
            format_tag,
            channels: le16(2),
            sample_rate: le32(4),
            byte_rate: le32(8),
            block_align: le16(12),
            bits_per_sample: le16(14),
        })
    }

    pub(crate) fn codec(&self) -> CodecId {
        CodecId::from_wave_format_tag(self.format_tag, self.bits_per_sample)
    }
}

/// WAV 解封装器
pub struct WavDemuxer {
    /// 每个采样块的帧数
    block_frames: u32,
}

impl WavDemuxer {
    /// 创建 WAV 解封装器实例 (工厂函数)
    pub fn create() -> VidResult<Box<dyn Demuxer>> {
        Ok(Box::new(Self {
            block_frames: DEFAULT_WAV_BLOCK_FRAMES,
        }))
    }

    /// 将 data 块切分为采样块
    fn build_track(
        &self,
        fmt: &WaveFormat,
        data_offset: u64,
        data_size: u64,
    ) -> VidResult<BitstreamMap> {
        if fmt.block_align == 0 {
            return Err(VidError::InvalidData("block_align 为 0".into()));
        }
        let codec = fmt.codec();
        if codec == CodecId::None {
            warn!(
                "未知的 WAV 格式码 0x{:04X}, 仍按块建立索引",
                fmt.format_tag
            );
        }

        let block_align = u64::from(fmt.block_align);
        let block_frames = u64::from(self.block_frames.max(MIN_WAV_BLOCK_FRAMES));
        let block_bytes = block_align * block_frames;
        let total_frames = data_size / block_align;
        let capacity = data_size.div_ceil(block_bytes) as usize;

        let mut map = BitstreamMap::new(StreamType::Audio, 0, capacity)?;
        map.codec = codec;
        map.fourcc = Some(*b"WAVE");
        map.timescale = fmt.sample_rate;
        map.audio = Some(AudioInfo {
            sample_rate: fmt.sample_rate,
            channels: fmt.channels,
            bits_per_sample: fmt.bits_per_sample,
        });

        let mut frame = 0u64;
        while frame < total_frames {
            let frames = block_frames.min(total_frames - frame);
            let pts = frame as i64;
            map.push_sample(
                SampleEntry::new(
                    SampleType::Audio,
                    data_offset + frame * block_align,
                    frames * block_align,
                )
                .with_timestamps(pts, pts),
            );
            frame += frames;
        }

        if fmt.sample_rate > 0 {
            map.duration_ms = total_frames * 1000 / u64::from(fmt.sample_rate);
        }
        map.bitrate_avg = u64::from(fmt.byte_rate) * 8;
        Ok(map)
    }
}

impl Demuxer for WavDemuxer {
    fn container(&self) -> Container {
        Container::Wave
    }

    fn name(&self) -> &str {
        "wav"
    }

    fn apply_options(&mut self, options: &ParseOptions) {
        self.block_frames = options.effective_wav_block_frames();
    }

    fn parse(&mut self, io: &mut IoContext, file_size: u64) -> VidResult<DemuxOutput> {
        io.seek_to(0)?;
        if &io.read_tag()? != b"RIFF" {
            return Err(VidError::InvalidData("不是有效的 RIFF 文件".into()));
        }
        let _riff_size = io.read_u32_le()?;
        if &io.read_tag()? != b"WAVE" {
            return Err(VidError::InvalidData("不是有效的 WAVE 文件".into()));
        }
        debug!("检测到 RIFF/WAVE 文件");

        let mut fmt: Option<WaveFormat> = None;
        let mut data: Option<(u64, u64)> = None;
        let mut metadata = FileMetadata::default();

        while io.position()? + 8 <= file_size {
            let chunk = read_chunk_header(io)?;
            match (&chunk.id, chunk.is_list) {
                (b"fmt ", false) => {
                    let raw = io.read_bytes(chunk.size.min(64) as usize)?;
                    let parsed = WaveFormat::parse(&raw)?;
                    debug!(
                        "fmt: format=0x{:04X}, channels={}, rate={}, block_align={}, bits={}",
                        parsed.format_tag,
                        parsed.channels,
                        parsed.sample_rate,
                        parsed.block_align,
                        parsed.bits_per_sample,
                    );
                    fmt = Some(parsed);
                }
                (b"data", false) => {
                    let available = file_size.saturating_sub(chunk.data_offset);
                    if chunk.size > available {
                        warn!(
                            "data 块大小 {} 超出文件剩余 {} 字节, 按实际截断",
                            chunk.size, available
                        );
                    }
                    let size = chunk.size.min(available);
                    debug!("data: offset={}, size={}", chunk.data_offset, size);
                    data = Some((chunk.data_offset, size));
                }
                (b"INFO", true) => {
                    parse_info_list(io, chunk.data_offset + chunk.size, &mut metadata)?;
                }
                _ => {
                    debug!(
                        "跳过块: '{}', 大小={}",
                        String::from_utf8_lossy(&chunk.id),
                        chunk.size
                    );
                }
            }
            io.seek_to(chunk.padded_end())?;
        }

        let fmt = fmt.ok_or_else(|| VidError::InvalidData("未找到 fmt 块".into()))?;
        let (data_offset, data_size) =
            data.ok_or_else(|| VidError::InvalidData("未找到 data 块".into()))?;

        let mut out = DemuxOutput::new();
        out.metadata = metadata;
        match self.build_track(&fmt, data_offset, data_size) {
            Ok(map) => out.push_track(map),
            Err(e) => out.skip_track(e),
        }
        out.finish(Container::Wave)
    }
}
