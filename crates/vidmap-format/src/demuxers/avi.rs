//! AVI (Audio Video Interleave) 解封装器.
//!
//! AVI 基于 RIFF 格式, 结构如下:
//! ```text
//! RIFF 'AVI '
//!   LIST 'hdrl'
//!     avih (主 AVI 头: 56 字节)
//!     LIST 'strl' (每流一个)
//!       strh (流头)
//!       strf (流格式: BITMAPINFOHEADER 或 WAVEFORMATEX)
//!   LIST 'INFO' (可选文本标签)
//!   LIST 'movi' (数据块)
//!     00dc (视频数据)
//!     01wb (音频数据)
//!   idx1 (可选旧式索引)
//! ```
//!
//! 采样优先取自 idx1. idx1 的偏移通常相对 `movi` 列表类型字段,
//! 少数文件直接写绝对偏移, 通过第一条索引处的块 ID 判定.
//! 没有 idx1 时顺序遍历 movi 中的数据块.

use log::{debug, warn};
use vidmap_codec::CodecId;
use vidmap_core::{StreamType, VidError, VidResult};

use super::riff::{ChunkHeader, parse_info_list, read_chunk_header};
use super::wav::WaveFormat;
use crate::bitstream_map::{AudioInfo, BitstreamMap, SampleEntry, SampleType, VideoInfo};
use crate::container::Container;
use crate::demuxer::{DemuxOutput, Demuxer};
use crate::io::IoContext;

/// idx1 索引条目标志: 关键帧
const AVIIF_KEYFRAME: u32 = 0x10;

/// strf 最多读取的字节数 (BITMAPINFOHEADER / WAVEFORMATEX 及其扩展)
const MAX_STRF_BYTES: u64 = 4096;

/// idx1 索引条目
#[derive(Debug, Clone, Copy)]
struct Idx1Entry {
    /// 块 ID (如 "00dc")
    chunk_id: [u8; 4],
    flags: u32,
    /// 相对 movi 列表类型字段 (或绝对) 的块头偏移
    offset: u32,
    /// 数据大小
    size: u32,
}

/// strl 中解析出的流描述
#[derive(Debug, Clone, Default)]
struct StreamDesc {
    fcc_type: [u8; 4],
    fcc_handler: [u8; 4],
    scale: u32,
    rate: u32,
    length: u32,
    /// strf 原始内容
    format: Vec<u8>,
}

impl StreamDesc {
    fn stream_type(&self) -> StreamType {
        match &self.fcc_type {
            b"vids" => StreamType::Video,
            b"auds" => StreamType::Audio,
            b"txts" => StreamType::Text,
            _ => StreamType::Unknown,
        }
    }
}

/// 正在填充的轨道
struct TrackBuilder {
    map: BitstreamMap,
    /// 已写入的块数
    chunk_count: u64,
    /// PCM 音频累计采样点 (block_align > 0 时有效)
    pcm_frames: u64,
    block_align: u64,
    scale: u64,
    /// 无索引时是否全部视为关键帧
    intra_only: bool,
}

/// AVI 解封装器
pub struct AviDemuxer;

impl AviDemuxer {
    /// 创建 AVI 解封装器实例 (工厂函数)
    pub fn create() -> VidResult<Box<dyn Demuxer>> {
        Ok(Box::new(Self))
    }

    /// 根据 fccHandler 与 biCompression 解析视频编解码器
    fn resolve_video_codec(fcc_handler: &[u8; 4], bi_compression: &[u8; 4]) -> CodecId {
        let by_fourcc = |fourcc: &[u8; 4]| {
            let s = String::from_utf8_lossy(fourcc);
            match s.trim_end_matches('\0').trim().to_uppercase().as_str() {
                "H264" | "X264" | "AVC1" => CodecId::H264,
                "H265" | "HEVC" | "HVC1" => CodecId::H265,
                "VP80" => CodecId::Vp8,
                "VP90" => CodecId::Vp9,
                "AV01" => CodecId::Av1,
                "MP4V" | "XVID" | "DIVX" | "DX50" | "FMP4" => CodecId::Mpeg4,
                "MPG1" => CodecId::Mpeg1Video,
                "MPG2" => CodecId::Mpeg2Video,
                "MJPG" | "JPEG" => CodecId::Mjpeg,
                _ => CodecId::None,
            }
        };
        match by_fourcc(bi_compression) {
            CodecId::None if bi_compression == &[0; 4] => CodecId::RawVideo,
            CodecId::None => by_fourcc(fcc_handler),
            codec => codec,
        }
    }

    /// 解析 hdrl 列表
    fn parse_hdrl(io: &mut IoContext, end: u64) -> VidResult<Vec<StreamDesc>> {
        let mut streams = Vec::new();
        while io.position()? + 8 <= end {
            let chunk = read_chunk_header(io)?;
            match (&chunk.id, chunk.is_list) {
                (b"strl", true) => {
                    streams.push(Self::parse_strl(io, &chunk)?);
                }
                _ => {
                    debug!(
                        "hdrl: 跳过块 '{}', size={}",
                        String::from_utf8_lossy(&chunk.id),
                        chunk.size
                    );
                }
            }
            io.seek_to(chunk.padded_end())?;
        }
        Ok(streams)
    }

    /// 解析 strl 列表
    fn parse_strl(io: &mut IoContext, strl: &ChunkHeader) -> VidResult<StreamDesc> {
        let end = strl.data_offset + strl.size;
        let mut desc = StreamDesc {
            scale: 1,
            rate: 1,
            ..StreamDesc::default()
        };

        while io.position()? + 8 <= end {
            let sub = read_chunk_header(io)?;
            match (&sub.id, sub.is_list) {
                (b"strh", false) => {
                    if sub.size < 36 {
                        return Err(VidError::InvalidData(format!(
                            "strh 块不足 36 字节: {}",
                            sub.size
                        )));
                    }
                    desc.fcc_type = io.read_tag()?;
                    desc.fcc_handler = io.read_tag()?;
                    let _flags = io.read_u32_le()?;
                    let _priority = io.read_u16_le()?;
                    let _language = io.read_u16_le()?;
                    let _initial_frames = io.read_u32_le()?;
                    desc.scale = io.read_u32_le()?;
                    desc.rate = io.read_u32_le()?;
                    let _start = io.read_u32_le()?;
                    desc.length = io.read_u32_le()?;
                    debug!(
                        "strh: type={}, handler={}, scale={}, rate={}, length={}",
                        String::from_utf8_lossy(&desc.fcc_type),
                        String::from_utf8_lossy(&desc.fcc_handler),
                        desc.scale,
                        desc.rate,
                        desc.length
                    );
                }
                (b"strf", false) => {
                    desc.format = io.read_bytes(sub.size.min(MAX_STRF_BYTES) as usize)?;
                }
                _ => {}
            }
            io.seek_to(sub.padded_end())?;
        }
        Ok(desc)
    }

    /// 为一个流建立空轨道
    fn build_track(index: usize, desc: &StreamDesc, capacity: usize) -> VidResult<TrackBuilder> {
        let stream_type = desc.stream_type();
        let mut map = BitstreamMap::new(stream_type, 0, capacity)?;
        map.track_id = index as u32;
        map.timescale = desc.rate;
        let mut block_align = 0u64;
        let mut intra_only = false;

        match stream_type {
            StreamType::Video => {
                let f = &desc.format;
                if f.len() < 40 {
                    return Err(VidError::InvalidData(format!(
                        "流 {index}: BITMAPINFOHEADER 不足 40 字节"
                    )));
                }
                let width = u32::from_le_bytes([f[4], f[5], f[6], f[7]]);
                let height = i32::from_le_bytes([f[8], f[9], f[10], f[11]]).unsigned_abs();
                let bi_compression = [f[16], f[17], f[18], f[19]];
                map.codec = Self::resolve_video_codec(&desc.fcc_handler, &bi_compression);
                map.fourcc = Some(if bi_compression == [0; 4] {
                    desc.fcc_handler
                } else {
                    bi_compression
                });
                let frame_rate = if desc.scale > 0 {
                    f64::from(desc.rate) / f64::from(desc.scale)
                } else {
                    0.0
                };
                map.video = Some(VideoInfo {
                    width,
                    height,
                    frame_rate,
                });
                intra_only = matches!(map.codec, CodecId::Mjpeg | CodecId::RawVideo);
            }
            StreamType::Audio => {
                let fmt = WaveFormat::parse(&desc.format)?;
                map.codec = fmt.codec();
                map.fourcc = Some(desc.fcc_handler);
                map.audio = Some(AudioInfo {
                    sample_rate: fmt.sample_rate,
                    channels: fmt.channels,
                    bits_per_sample: fmt.bits_per_sample,
                });
                if fmt.format_tag == 0x0001 || fmt.format_tag == 0x0003 {
                    block_align = u64::from(fmt.block_align);
                    map.timescale = fmt.sample_rate;
                }
            }
            _ => {}
        }

        Ok(TrackBuilder {
            map,
            chunk_count: 0,
            pcm_frames: 0,
            block_align,
            scale: u64::from(desc.scale.max(1)),
            intra_only,
        })
    }

    /// 读取 idx1
    fn parse_idx1(io: &mut IoContext, size: u64) -> VidResult<Vec<Idx1Entry>> {
        let count = (size / 16) as usize;
        let mut entries = Vec::with_capacity(count.min(1 << 20));
        for _ in 0..count {
            entries.push(Idx1Entry {
                chunk_id: io.read_tag()?,
                flags: io.read_u32_le()?,
                offset: io.read_u32_le()?,
                size: io.read_u32_le()?,
            });
        }
        debug!("idx1: {} 个索引条目", entries.len());
        Ok(entries)
    }

    /// 判定 idx1 偏移基准: 第一条有效条目处的块 ID 与条目一致时为绝对偏移
    fn idx1_base(io: &mut IoContext, entries: &[Idx1Entry], movi_list_pos: u64) -> u64 {
        let Some(first) = entries.iter().find(|e| stream_number(&e.chunk_id).is_some()) else {
            return movi_list_pos;
        };
        let mut tag = [0u8; 4];
        let absolute = io.read_at(u64::from(first.offset), &mut tag).is_ok()
            && tag == first.chunk_id
            && u64::from(first.offset) >= movi_list_pos;
        if absolute {
            debug!("idx1: 使用绝对偏移");
            0
        } else {
            movi_list_pos
        }
    }
}

/// 块 ID 前两位十进制数字为流号
fn stream_number(chunk_id: &[u8; 4]) -> Option<usize> {
    if chunk_id[0].is_ascii_digit() && chunk_id[1].is_ascii_digit() {
        Some(usize::from(chunk_id[0] - b'0') * 10 + usize::from(chunk_id[1] - b'0'))
    } else {
        None
    }
}

impl TrackBuilder {
    /// 当前块的起始时间 (strh 时基), 超出 i64 时饱和
    fn chunk_ticks(&self) -> i64 {
        i64::try_from(self.chunk_count.saturating_mul(self.scale)).unwrap_or(i64::MAX)
    }

    /// 追加一个数据块
    fn push_chunk(&mut self, offset: u64, size: u64, keyframe: Option<bool>) {
        let (sample_type, pts) = match self.map.stream_type {
            StreamType::Video => {
                let sync = keyframe.unwrap_or(self.intra_only || self.chunk_count == 0);
                let t = if sync {
                    SampleType::VideoSync
                } else {
                    SampleType::Video
                };
                (t, self.chunk_ticks())
            }
            StreamType::Audio if self.block_align > 0 => {
                let pts = self.pcm_frames as i64;
                self.pcm_frames += size / self.block_align;
                (SampleType::Audio, pts)
            }
            StreamType::Audio => (SampleType::Audio, self.chunk_ticks()),
            StreamType::Text => (SampleType::Text, self.chunk_ticks()),
            _ => (SampleType::Other, -1),
        };
        self.map
            .push_sample(SampleEntry::new(sample_type, offset, size).with_timestamps(pts, pts));
        self.chunk_count += 1;
    }

    fn finish(mut self) -> BitstreamMap {
        let timescale = u64::from(self.map.timescale);
        if timescale > 0 {
            let end_ticks = if self.block_align > 0 {
                self.pcm_frames
            } else {
                self.chunk_count.saturating_mul(self.scale)
            };
            self.map.duration_ms = end_ticks.saturating_mul(1000) / timescale;
        }
        self.map.recount_frames();
        self.map.update_bitrate();
        self.map
    }
}

impl Demuxer for AviDemuxer {
    fn container(&self) -> Container {
        Container::Avi
    }

    fn name(&self) -> &str {
        "avi"
    }

    fn parse(&mut self, io: &mut IoContext, file_size: u64) -> VidResult<DemuxOutput> {
        io.seek_to(0)?;
        if &io.read_tag()? != b"RIFF" {
            return Err(VidError::InvalidData("不是有效的 RIFF 文件".into()));
        }
        let _riff_size = io.read_u32_le()?;
        if &io.read_tag()? != b"AVI " {
            return Err(VidError::InvalidData("不是有效的 AVI 文件".into()));
        }
        debug!("检测到 RIFF/AVI 文件");

        let mut out = DemuxOutput::new();
        let mut streams = Vec::new();
        let mut movi: Option<ChunkHeader> = None;
        let mut idx1: Vec<Idx1Entry> = Vec::new();

        while io.position()? + 8 <= file_size {
            let chunk = read_chunk_header(io)?;
            match (&chunk.id, chunk.is_list) {
                (b"hdrl", true) => {
                    streams = Self::parse_hdrl(io, chunk.data_offset + chunk.size)?;
                }
                (b"movi", true) => {
                    debug!("movi: offset={}, size={}", chunk.data_offset, chunk.size);
                    movi = Some(chunk);
                }
                (b"INFO", true) => {
                    parse_info_list(io, chunk.data_offset + chunk.size, &mut out.metadata)?;
                }
                (b"idx1", false) => {
                    idx1 = Self::parse_idx1(io, chunk.size.min(file_size - chunk.data_offset))?;
                }
                _ => {}
            }
            io.seek_to(chunk.padded_end())?;
        }

        if streams.is_empty() {
            return Err(VidError::InvalidData("AVI 文件中未找到流描述 (strl)".into()));
        }
        let movi = movi.ok_or_else(|| VidError::InvalidData("AVI 文件中未找到 movi 列表".into()))?;

        let capacity_hint = if idx1.is_empty() {
            16
        } else {
            idx1.len() / streams.len() + 1
        };
        let mut builders: Vec<Option<TrackBuilder>> = Vec::with_capacity(streams.len());
        for (i, desc) in streams.iter().enumerate() {
            match Self::build_track(i, desc, capacity_hint) {
                Ok(b) => builders.push(Some(b)),
                Err(e) => {
                    out.skip_track(e);
                    builders.push(None);
                }
            }
        }

        let mut out_of_range = 0usize;
        if !idx1.is_empty() {
            // movi 列表类型字段的位置
            let movi_list_pos = movi.data_offset - 4;
            let base = Self::idx1_base(io, &idx1, movi_list_pos);
            for entry in &idx1 {
                let Some(b) = stream_number(&entry.chunk_id)
                    .and_then(|n| builders.get_mut(n))
                    .and_then(Option::as_mut)
                else {
                    continue;
                };
                let offset = base + u64::from(entry.offset) + 8;
                let size = u64::from(entry.size);
                if offset + size > file_size {
                    out_of_range += 1;
                    continue;
                }
                b.push_chunk(offset, size, Some(entry.flags & AVIIF_KEYFRAME != 0));
            }
        } else {
            debug!("无 idx1 索引, 顺序遍历 movi");
            let end = (movi.data_offset + movi.size).min(file_size);
            io.seek_to(movi.data_offset)?;
            while io.position()? + 8 <= end {
                let chunk = read_chunk_header(io)?;
                if chunk.is_list {
                    // LIST 'rec ': 进入其内容继续遍历
                    continue;
                }
                if chunk.data_offset + chunk.size > file_size {
                    out_of_range += 1;
                    break;
                }
                if let Some(b) = stream_number(&chunk.id)
                    .and_then(|n| builders.get_mut(n))
                    .and_then(Option::as_mut)
                {
                    b.push_chunk(chunk.data_offset, chunk.size, None);
                }
                io.seek_to(chunk.padded_end())?;
            }
        }
        if out_of_range > 0 {
            warn!("AVI: {out_of_range} 个数据块越出文件范围, 已忽略");
        }

        for b in builders.into_iter().flatten() {
            let map = b.finish();
            if map.sample_count() == 0 {
                debug!("AVI: 轨道 #{} 没有数据块, 不提交", map.track_id);
                continue;
            }
            debug!("AVI: {map}");
            out.push_track(map);
        }
        out.finish(Container::Avi)
    }
}
