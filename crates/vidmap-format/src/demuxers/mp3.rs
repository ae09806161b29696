//! MPEG 音频基本流 (MP1/MP2/MP3) 解封装器.
//!
//! - 跳过文件开头的 ID3v2 标签, 其文本帧写入元数据
//! - 同步到第一个 "后继帧同样有效" 的帧头
//! - 逐帧遍历帧头, 每帧一个 AUDIO 采样, 时间戳以采样点为单位
//! - 遇到无效帧头或文件末尾的 ID3v1 `TAG` 时停止

use log::{debug, warn};
use vidmap_codec::CodecId;
use vidmap_core::{StreamType, VidError, VidResult};

use crate::bitstream_map::{AudioInfo, BitstreamMap, SampleEntry, SampleType};
use crate::container::Container;
use crate::demuxer::{DemuxOutput, Demuxer, FileMetadata};
use crate::io::IoContext;

/// 同步搜索的最大范围
const SYNC_SEARCH_LIMIT: u64 = 64 * 1024;

/// MPEG 版本
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MpegVersion {
    /// MPEG-1
    V1,
    /// MPEG-2
    V2,
    /// MPEG-2.5
    V25,
}

/// MPEG 音频帧头部信息
#[derive(Debug, Clone, Copy)]
pub(crate) struct FrameHeader {
    version: MpegVersion,
    /// 层 (1, 2, 3)
    layer: u8,
    /// 比特率 (bps)
    bitrate: u32,
    /// 采样率 (Hz)
    sample_rate: u32,
    /// 声道模式 (3 = 单声道)
    channel_mode: u8,
    /// 帧总字节数 (含头部)
    frame_size: u32,
    /// 每帧采样数
    samples_per_frame: u32,
}

impl FrameHeader {
    fn codec(&self) -> CodecId {
        match self.layer {
            1 => CodecId::Mp1,
            2 => CodecId::Mp2,
            _ => CodecId::Mp3,
        }
    }

    fn channels(&self) -> u16 {
        if self.channel_mode == 3 { 1 } else { 2 }
    }
}

/// MPEG-1 Layer I 比特率表 (kbps)
const BITRATE_V1_L1: [u32; 15] = [
    0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448,
];

/// MPEG-1 Layer II 比特率表 (kbps)
const BITRATE_V1_L2: [u32; 15] = [
    0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384,
];

/// MPEG-1 Layer III 比特率表 (kbps)
const BITRATE_V1_L3: [u32; 15] = [
    0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320,
];

/// MPEG-2/2.5 Layer I 比特率表 (kbps)
const BITRATE_V2_L1: [u32; 15] = [
    0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256,
];

/// MPEG-2/2.5 Layer II/III 比特率表 (kbps)
const BITRATE_V2_L23: [u32; 15] = [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160];

/// MPEG-1 采样率表
const SAMPLERATE_V1: [u32; 3] = [44100, 48000, 32000];

/// 解析 4 字节帧头
pub(crate) fn parse_frame_header(header: u32) -> Option<FrameHeader> {
    // 同步位 (bit 31-21)
    if (header >> 21) != 0x7FF {
        return None;
    }

    let version = match (header >> 19) & 0x03 {
        0 => MpegVersion::V25,
        2 => MpegVersion::V2,
        3 => MpegVersion::V1,
        _ => return None,
    };
    let layer = match (header >> 17) & 0x03 {
        1 => 3,
        2 => 2,
        3 => 1,
        _ => return None,
    };

    // free / bad
    let br_idx = ((header >> 12) & 0x0F) as usize;
    if br_idx == 0 || br_idx == 15 {
        return None;
    }
    let bitrate_kbps = match (version, layer) {
        (MpegVersion::V1, 1) => BITRATE_V1_L1[br_idx],
        (MpegVersion::V1, 2) => BITRATE_V1_L2[br_idx],
        (MpegVersion::V1, _) => BITRATE_V1_L3[br_idx],
        (_, 1) => BITRATE_V2_L1[br_idx],
        (_, _) => BITRATE_V2_L23[br_idx],
    };
    let bitrate = bitrate_kbps * 1000;

    let sr_idx = ((header >> 10) & 0x03) as usize;
    if sr_idx == 3 {
        return None;
    }
    let sample_rate = match version {
        MpegVersion::V1 => SAMPLERATE_V1[sr_idx],
        MpegVersion::V2 => SAMPLERATE_V1[sr_idx] / 2,
        MpegVersion::V25 => SAMPLERATE_V1[sr_idx] / 4,
    };

    let padding = (header >> 9) & 1;
    let channel_mode = ((header >> 6) & 0x03) as u8;

    let samples_per_frame = match (version, layer) {
        (_, 1) => 384,
        (MpegVersion::V1, _) | (_, 2) => 1152,
        _ => 576,
    };

    let frame_size = if layer == 1 {
        (12 * bitrate / sample_rate + padding) * 4
    } else {
        let factor = if layer == 3 && version != MpegVersion::V1 {
            72
        } else {
            144
        };
        factor * bitrate / sample_rate + padding
    };
    if frame_size < 4 {
        return None;
    }

    Some(FrameHeader {
        version,
        layer,
        bitrate,
        sample_rate,
        channel_mode,
        frame_size,
        samples_per_frame,
    })
}

/// ID3v2 文本帧 → 标签名
fn id3_tag_name(frame_id: &[u8; 4]) -> Option<&'static str> {
    Some(match frame_id {
        b"TIT2" => "title",
        b"TPE1" => "artist",
        b"TALB" => "album",
        b"TYER" | b"TDRC" => "date",
        b"TCON" => "genre",
        b"TRCK" => "track",
        b"TENC" | b"TSSE" => "encoder",
        b"TCOP" => "copyright",
        _ => return None,
    })
}

/// 解码 ID3v2 文本帧内容 (首字节为编码方式)
fn decode_id3_text(data: &[u8]) -> String {
    let Some((&encoding, body)) = data.split_first() else {
        return String::new();
    };
    let text = match encoding {
        // UTF-16 带 BOM
        1 => {
            let (le, body) = match body {
                [0xFF, 0xFE, rest @ ..] => (true, rest),
                [0xFE, 0xFF, rest @ ..] => (false, rest),
                _ => (true, body),
            };
            decode_utf16(body, le)
        }
        // UTF-16BE
        2 => decode_utf16(body, false),
        // UTF-8
        3 => String::from_utf8_lossy(body).into_owned(),
        // ISO-8859-1
        _ => body.iter().map(|&b| char::from(b)).collect(),
    };
    text.trim_end_matches('\0').trim().to_string()
}

fn decode_utf16(body: &[u8], little_endian: bool) -> String {
    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|c| {
            if little_endian {
                u16::from_le_bytes([c[0], c[1]])
            } else {
                u16::from_be_bytes([c[0], c[1]])
            }
        })
        .collect();
    String::from_utf16_lossy(&units)
}

fn syncsafe(b: &[u8]) -> u64 {
    b.iter().fold(0u64, |acc, &x| (acc << 7) | u64::from(x & 0x7F))
}

/// MP3 解封装器
pub struct Mp3Demuxer;

impl Mp3Demuxer {
    /// 创建 MP3 解封装器实例 (工厂函数)
    pub fn create() -> VidResult<Box<dyn Demuxer>> {
        Ok(Box::new(Self))
    }

    /// 解析并跳过 ID3v2 标签, 返回音频数据起始偏移
    fn read_id3v2(
        io: &mut IoContext,
        file_size: u64,
        metadata: &mut FileMetadata,
    ) -> VidResult<u64> {
        if file_size < 10 {
            return Ok(0);
        }
        let mut header = [0u8; 10];
        io.read_at(0, &mut header)?;
        if &header[0..3] != b"ID3" {
            return Ok(0);
        }

        let major = header[3];
        let tag_size = syncsafe(&header[6..10]);
        let total = 10 + tag_size;
        if total > file_size {
            return Err(VidError::InvalidData(format!(
                "ID3v2 标签大小 {total} 超出文件大小 {file_size}"
            )));
        }
        debug!("MP3: ID3v2.{major} 标签, 大小={total} 字节");

        // v2.2 使用 3 字节帧 ID, 不提取
        if major >= 3 {
            let body = io.read_range(10, tag_size)?;
            let mut pos = 0usize;
            while pos + 10 <= body.len() {
                let id: [u8; 4] = [body[pos], body[pos + 1], body[pos + 2], body[pos + 3]];
                if id[0] == 0 {
                    break; // 填充区
                }
                let size = if major >= 4 {
                    syncsafe(&body[pos + 4..pos + 8]) as usize
                } else {
                    u32::from_be_bytes([body[pos + 4], body[pos + 5], body[pos + 6], body[pos + 7]])
                        as usize
                };
                let start = pos + 10;
                let Some(end) = start.checked_add(size).filter(|&e| e <= body.len()) else {
                    warn!("ID3v2 帧越界, 停止解析标签");
                    break;
                };
                if let Some(name) = id3_tag_name(&id) {
                    let value = decode_id3_text(&body[start..end]);
                    if &id == b"TDRC" && !value.is_empty() {
                        metadata.creation_time = Some(value.clone());
                    }
                    metadata.push_tag(name, value);
                }
                pos = end;
            }
        }
        Ok(total)
    }

    /// 同步到第一个有效帧: 要求其后继帧同样有效 (或恰好到达文件末尾)
    fn find_first_frame(
        io: &mut IoContext,
        start: u64,
        file_size: u64,
    ) -> VidResult<(u64, FrameHeader)> {
        let limit = (start + SYNC_SEARCH_LIMIT).min(file_size.saturating_sub(4));
        let mut buf = [0u8; 4];
        let mut pos = start;

        while pos <= limit {
            io.read_at(pos, &mut buf)?;
            if let Some(fh) = parse_frame_header(u32::from_be_bytes(buf)) {
                let next_pos = pos + u64::from(fh.frame_size);
                if next_pos == file_size {
                    return Ok((pos, fh));
                }
                if next_pos + 4 <= file_size {
                    io.read_at(next_pos, &mut buf)?;
                    if parse_frame_header(u32::from_be_bytes(buf)).is_some() {
                        return Ok((pos, fh));
                    }
                }
            }
            pos += 1;
        }

        Err(VidError::InvalidData("MP3: 未找到有效的 MPEG 音频帧".into()))
    }
}

impl Demuxer for Mp3Demuxer {
    fn container(&self) -> Container {
        Container::Mp3Es
    }

    fn name(&self) -> &str {
        "mp3"
    }

    fn parse(&mut self, io: &mut IoContext, file_size: u64) -> VidResult<DemuxOutput> {
        let mut out = DemuxOutput::new();
        let audio_start = Self::read_id3v2(io, file_size, &mut out.metadata)?;
        let (first, first_header) = Self::find_first_frame(io, audio_start, file_size)?;

        let estimate = ((file_size - first) / u64::from(first_header.frame_size)) as usize + 1;
        let mut map = BitstreamMap::new(StreamType::Audio, 0, estimate)?;
        map.codec = first_header.codec();
        map.timescale = first_header.sample_rate;
        map.audio = Some(AudioInfo {
            sample_rate: first_header.sample_rate,
            channels: first_header.channels(),
            bits_per_sample: 0,
        });

        io.seek_to(first)?;
        let mut pos = first;
        let mut pts = 0i64;
        while pos + 4 <= file_size {
            let raw = io.read_tag()?;
            if &raw[0..3] == b"TAG" {
                debug!("MP3: 遇到 ID3v1 标签, offset={pos}");
                break;
            }
            let Some(fh) = parse_frame_header(u32::from_be_bytes(raw)) else {
                debug!("MP3: 帧头无效, 停止遍历, offset={pos}");
                break;
            };
            let size = u64::from(fh.frame_size);
            if pos + size > file_size {
                warn!("MP3: 最后一帧不完整, offset={pos}, size={size}");
                break;
            }
            map.push_sample(
                SampleEntry::new(SampleType::Audio, pos, size).with_timestamps(pts, pts),
            );
            pts += i64::from(fh.samples_per_frame);
            pos += size;
            io.skip(size - 4)?;
        }

        if first_header.sample_rate > 0 {
            map.duration_ms = pts as u64 * 1000 / u64::from(first_header.sample_rate);
        }
        map.update_bitrate();
        debug!(
            "MP3: {:?} layer {}, {} 帧, {}bps (首帧), 首帧 offset={}",
            first_header.version,
            first_header.layer,
            map.sample_count(),
            first_header.bitrate,
            first
        );

        out.push_track(map);
        out.finish(Container::Mp3Es)
    }
}
