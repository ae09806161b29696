//! MP4 采样表 (Sample Table) 解析与展开.
//!
//! 采样表 (stbl) 由多个子 box 共同组成:
//! - stsd: 采样描述 (编解码器参数)
//! - stts: 解码时间→采样编号映射 (delta 编码)
//! - stsc: 采样→块映射 (压缩的 Run-Length 编码)
//! - stsz: 每个采样的字节大小
//! - stco/co64: 每个块的文件偏移
//! - stss: 同步采样 (关键帧) 索引列表
//! - ctts: 合成时间偏移 (B帧重排序)
//!
//! 各表读入后由 [`SampleTable::expand`] 一次遍历展开为逐采样条目.

use log::{debug, warn};
use vidmap_codec::{CodecId, CodecProfile};
use vidmap_core::{StreamType, VidError, VidResult};

use super::boxes::read_full_box_header;
use crate::bitstream_map::{BitstreamMap, ParameterEntry, SampleEntry, SampleType};
use crate::io::IoContext;

/// 时间→采样条目 (stts)
#[derive(Debug, Clone, Copy)]
struct SttsEntry {
    count: u32,
    delta: u32,
}

/// 采样→块条目 (stsc)
#[derive(Debug, Clone, Copy)]
struct StscEntry {
    /// 起始块号 (1-based)
    first_chunk: u32,
    samples_per_chunk: u32,
}

/// 合成时间偏移条目 (ctts)
#[derive(Debug, Clone, Copy)]
struct CttsEntry {
    count: u32,
    offset: i32,
}

/// 按剩余内容大小限制表项数, 防止损坏的计数触发巨量分配
fn bounded_count(io: &mut IoContext, box_end: u64, count: u32, entry_size: u64) -> VidResult<usize> {
    let remaining = box_end.saturating_sub(io.position()?);
    let max = remaining / entry_size;
    if u64::from(count) > max {
        warn!("采样表条目数 {count} 超出 box 容量 {max}, 截断");
    }
    Ok(u64::from(count).min(max) as usize)
}

/// 采样表
#[derive(Default)]
pub struct SampleTable {
    // === 来自 stsd 的信息 ===
    pub codec: CodecId,
    pub codec_profile: CodecProfile,
    /// 采样描述条目的 fourcc
    pub fourcc: Option<[u8; 4]>,
    pub width: u32,
    pub height: u32,
    pub sample_rate: u32,
    pub channel_count: u16,
    pub bits_per_sample: u16,
    /// avcC 中的 SPS/PPS 参数集 (绝对偏移)
    pub parameter_entries: Vec<ParameterEntry>,

    stts_entries: Vec<SttsEntry>,
    stsc_entries: Vec<StscEntry>,
    /// 默认采样大小 (0 表示使用逐样本大小表)
    default_sample_size: u32,
    sample_sizes: Vec<u32>,
    total_samples: u32,
    chunk_offsets: Vec<u64>,
    /// 同步采样列表 (1-based, 升序)
    sync_samples: Vec<u32>,
    /// 无 stss 时所有采样都是同步采样
    has_stss: bool,
    ctts_entries: Vec<CttsEntry>,
}

impl SampleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 总采样数
    pub fn sample_count(&self) -> u32 {
        self.total_samples
    }

    /// 文件大小能容纳的采样数
    ///
    /// 固定采样大小时计数只来自 stsz 头部, 不受 box 大小约束,
    /// 按 `file_size / default_sample_size` 截断.
    pub fn capped_sample_count(&self, file_size: u64) -> u32 {
        if self.default_sample_size == 0 {
            return self.total_samples;
        }
        let max = file_size / u64::from(self.default_sample_size);
        u64::from(self.total_samples).min(max) as u32
    }

    /// stts 中所有 delta 之和
    pub fn total_duration(&self) -> u64 {
        self.stts_entries
            .iter()
            .map(|e| u64::from(e.count) * u64::from(e.delta))
            .fold(0, u64::saturating_add)
    }

    // ========================
    // 解析
    // ========================

    /// 解析 stsd, 只取第一个采样描述条目
    pub fn parse_stsd(
        &mut self,
        io: &mut IoContext,
        stream_type: StreamType,
        box_end: u64,
    ) -> VidResult<()> {
        read_full_box_header(io)?;
        let entry_count = io.read_u32_be()?;
        if entry_count == 0 || io.position()? + 8 > box_end {
            return Ok(());
        }

        let entry_start = io.position()?;
        let entry_size = u64::from(io.read_u32_be()?);
        let entry_format = io.read_tag()?;
        let entry_end = (entry_start + entry_size).min(box_end);

        self.fourcc = Some(entry_format);
        self.codec = fourcc_to_codec_id(&entry_format);

        // 保留字段 (6 bytes) + data_reference_index (2 bytes)
        io.skip(8)?;

        match stream_type {
            StreamType::Video => self.parse_video_sample_entry(io, entry_end)?,
            StreamType::Audio => self.parse_audio_sample_entry(io, entry_end)?,
            _ => {}
        }
        Ok(())
    }

    /// 解析视频采样条目
    fn parse_video_sample_entry(&mut self, io: &mut IoContext, entry_end: u64) -> VidResult<()> {
        // pre_defined + reserved + pre_defined[3]
        io.skip(16)?;
        self.width = u32::from(io.read_u16_be()?);
        self.height = u32::from(io.read_u16_be()?);
        // 分辨率, 保留, frame_count, compressor name, depth, pre_defined
        io.skip(4 + 4 + 4 + 2 + 32 + 2 + 2)?;
        self.parse_codec_config_boxes(io, entry_end)
    }

    /// 解析音频采样条目
    fn parse_audio_sample_entry(&mut self, io: &mut IoContext, entry_end: u64) -> VidResult<()> {
        let version = io.read_u16_be()?;
        io.skip(6)?;
        self.channel_count = io.read_u16_be()?;
        self.bits_per_sample = io.read_u16_be()?;
        io.skip(4)?;
        self.sample_rate = io.read_u32_be()? >> 16;
        // QuickTime 声音描述扩展字段
        match version {
            1 => io.skip(16)?,
            2 => io.skip(36)?,
            _ => {}
        }
        self.parse_codec_config_boxes(io, entry_end)
    }

    /// 解析编解码器配置子 box (avcC, esds)
    fn parse_codec_config_boxes(&mut self, io: &mut IoContext, end: u64) -> VidResult<()> {
        while io.position()? + 8 <= end {
            let pos = io.position()?;
            let size = u64::from(io.read_u32_be()?);
            let tag = io.read_tag()?;
            if size < 8 || pos + size > end {
                break;
            }
            let content_start = pos + 8;
            let content_size = size - 8;

            match &tag {
                b"avcC" => {
                    let data = io.read_bytes(content_size as usize)?;
                    self.parameter_entries = parse_avcc(&data, content_start)?;
                    debug!(
                        "avcC: {} 个参数集, offset={}",
                        self.parameter_entries.len(),
                        content_start
                    );
                }
                b"esds" => {
                    let data = io.read_bytes(content_size as usize)?;
                    self.apply_esds(&data);
                }
                _ => {}
            }
            io.seek_to(pos + size)?;
        }
        Ok(())
    }

    /// 根据 esds 的 objectTypeIndication 与 AudioSpecificConfig 修正编解码器
    fn apply_esds(&mut self, esds: &[u8]) {
        if esds.len() < 4 {
            return;
        }
        let body = &esds[4..];
        if let Some(object_type) = search_descriptor(body, 0x04).and_then(|d| d.first().copied()) {
            self.codec = match object_type {
                0x40 | 0x66..=0x68 => CodecId::Aac,
                0x69 | 0x6B => CodecId::Mp3,
                0x60..=0x65 => CodecId::Mpeg2Video,
                0x6A => CodecId::Mpeg1Video,
                0x20 => CodecId::Mpeg4,
                0x6C => CodecId::Mjpeg,
                0xA5 => CodecId::Ac3,
                _ => self.codec,
            };
        }
        if self.codec == CodecId::Aac {
            // AudioSpecificConfig 前 5 位为 audioObjectType
            if let Some(asc) = search_descriptor(body, 0x05) {
                if asc.first().map(|b| b >> 3) == Some(2) {
                    self.codec_profile = CodecProfile::AacLc;
                }
            }
        }
    }

    /// 解析 stts
    pub fn parse_stts(&mut self, io: &mut IoContext, box_end: u64) -> VidResult<()> {
        read_full_box_header(io)?;
        let count = io.read_u32_be()?;
        let count = bounded_count(io, box_end, count, 8)?;
        self.stts_entries.reserve(count);
        for _ in 0..count {
            let count = io.read_u32_be()?;
            let delta = io.read_u32_be()?;
            self.stts_entries.push(SttsEntry { count, delta });
        }
        Ok(())
    }

    /// 解析 stsc
    pub fn parse_stsc(&mut self, io: &mut IoContext, box_end: u64) -> VidResult<()> {
        read_full_box_header(io)?;
        let count = io.read_u32_be()?;
        let count = bounded_count(io, box_end, count, 12)?;
        self.stsc_entries.reserve(count);
        for _ in 0..count {
            let first_chunk = io.read_u32_be()?;
            let samples_per_chunk = io.read_u32_be()?;
            let _sample_desc_idx = io.read_u32_be()?;
            if first_chunk == 0 {
                return Err(VidError::InvalidData("stsc: first_chunk 为 0".into()));
            }
            self.stsc_entries.push(StscEntry {
                first_chunk,
                samples_per_chunk,
            });
        }
        Ok(())
    }

    /// 解析 stsz
    pub fn parse_stsz(&mut self, io: &mut IoContext, box_end: u64) -> VidResult<()> {
        read_full_box_header(io)?;
        self.default_sample_size = io.read_u32_be()?;
        self.total_samples = io.read_u32_be()?;

        if self.default_sample_size == 0 {
            let count = bounded_count(io, box_end, self.total_samples, 4)?;
            self.total_samples = count as u32;
            self.sample_sizes.reserve(count);
            for _ in 0..count {
                self.sample_sizes.push(io.read_u32_be()?);
            }
        }
        Ok(())
    }

    /// 解析 stco/co64
    pub fn parse_stco(&mut self, io: &mut IoContext, box_end: u64, is_64bit: bool) -> VidResult<()> {
        read_full_box_header(io)?;
        let count = io.read_u32_be()?;
        let count = bounded_count(io, box_end, count, if is_64bit { 8 } else { 4 })?;
        self.chunk_offsets.reserve(count);
        for _ in 0..count {
            let offset = if is_64bit {
                io.read_u64_be()?
            } else {
                u64::from(io.read_u32_be()?)
            };
            self.chunk_offsets.push(offset);
        }
        Ok(())
    }

    /// 解析 stss
    pub fn parse_stss(&mut self, io: &mut IoContext, box_end: u64) -> VidResult<()> {
        read_full_box_header(io)?;
        let count = io.read_u32_be()?;
        let count = bounded_count(io, box_end, count, 4)?;
        self.has_stss = true;
        self.sync_samples.reserve(count);
        for _ in 0..count {
            self.sync_samples.push(io.read_u32_be()?);
        }
        self.sync_samples.sort_unstable();
        Ok(())
    }

    /// 解析 ctts
    pub fn parse_ctts(&mut self, io: &mut IoContext, box_end: u64) -> VidResult<()> {
        let (version, _flags) = read_full_box_header(io)?;
        let count = io.read_u32_be()?;
        let count = bounded_count(io, box_end, count, 8)?;
        self.ctts_entries.reserve(count);
        for _ in 0..count {
            let count = io.read_u32_be()?;
            let offset = if version == 0 {
                io.read_u32_be()? as i32
            } else {
                io.read_i32_be()?
            };
            self.ctts_entries.push(CttsEntry { count, offset });
        }
        Ok(())
    }

    // ========================
    // 展开
    // ========================

    /// 一次遍历展开所有采样, 写入 `map`
    ///
    /// 越出 `file_size` 的采样 (截断文件) 被丢弃, 返回丢弃的采样数.
    /// 偏移或时间戳溢出时返回 `InvalidData`, 由调用方跳过该轨道.
    pub fn expand(&self, map: &mut BitstreamMap, file_size: u64) -> VidResult<usize> {
        let total = self.capped_sample_count(file_size);
        if total < self.total_samples {
            warn!(
                "采样表: 声明 {} 个固定大小采样, 文件只能容纳 {total} 个",
                self.total_samples
            );
        }
        let overflow = || VidError::InvalidData("采样表: 偏移或时间戳溢出".into());
        if total > 0 && (self.stsc_entries.is_empty() || self.chunk_offsets.is_empty()) {
            return Err(VidError::InvalidData("采样表缺少 stsc 或 stco".into()));
        }

        let mut stts = self.stts_entries.iter().copied().filter(|e| e.count > 0);
        let mut stts_cur = stts.next();
        let mut stts_left = stts_cur.map_or(0, |e| e.count);
        let mut last_delta = stts_cur.map_or(0, |e| e.delta);

        let mut ctts = self.ctts_entries.iter().copied().filter(|e| e.count > 0);
        let mut ctts_cur = ctts.next();
        let mut ctts_left = ctts_cur.map_or(0, |e| e.count);

        let mut sync_iter = self.sync_samples.iter().copied().peekable();

        let mut sample_idx = 0u32;
        let mut dts = 0i64;
        let mut dropped = (self.total_samples - total) as usize;
        let mut stsc_idx = 0usize;

        'chunks: for (chunk_idx, &chunk_offset) in self.chunk_offsets.iter().enumerate() {
            let chunk_num = chunk_idx as u32 + 1;
            while stsc_idx + 1 < self.stsc_entries.len()
                && self.stsc_entries[stsc_idx + 1].first_chunk <= chunk_num
            {
                stsc_idx += 1;
            }
            let per_chunk = self.stsc_entries[stsc_idx].samples_per_chunk;

            let mut offset = chunk_offset;
            for _ in 0..per_chunk {
                if sample_idx >= total {
                    break 'chunks;
                }
                let size = u64::from(self.sample_size(sample_idx));

                // dts 来自 stts
                let delta = match stts_cur {
                    Some(e) => {
                        last_delta = e.delta;
                        stts_left -= 1;
                        if stts_left == 0 {
                            stts_cur = stts.next();
                            stts_left = stts_cur.map_or(0, |e| e.count);
                        }
                        e.delta
                    }
                    None => last_delta,
                };
                // pts = dts + ctts
                let cts = match ctts_cur {
                    Some(e) => {
                        ctts_left -= 1;
                        if ctts_left == 0 {
                            ctts_cur = ctts.next();
                            ctts_left = ctts_cur.map_or(0, |e| e.count);
                        }
                        i64::from(e.offset)
                    }
                    None => 0,
                };

                let sample_num = sample_idx + 1;
                while sync_iter.next_if(|&s| s < sample_num).is_some() {}
                let is_sync = !self.has_stss || sync_iter.next_if_eq(&sample_num).is_some();

                let sample_type = match map.stream_type {
                    StreamType::Video if is_sync => SampleType::VideoSync,
                    StreamType::Video => SampleType::Video,
                    StreamType::Audio => SampleType::Audio,
                    StreamType::Text => SampleType::Text,
                    _ => SampleType::Other,
                };

                let end = offset.checked_add(size).ok_or_else(overflow)?;
                if end <= file_size {
                    let pts = dts.checked_add(cts).ok_or_else(overflow)?;
                    map.push_sample(
                        SampleEntry::new(sample_type, offset, size).with_timestamps(pts, dts),
                    );
                } else {
                    dropped += 1;
                }

                offset = end;
                dts = dts.checked_add(i64::from(delta)).ok_or_else(overflow)?;
                sample_idx += 1;
            }
        }

        if sample_idx < total {
            warn!(
                "采样表: 块只容纳 {sample_idx} 个采样, stsz 声明 {total} 个"
            );
        }
        Ok(dropped)
    }

    /// 指定采样的字节大小
    fn sample_size(&self, sample_idx: u32) -> u32 {
        if self.default_sample_size > 0 {
            self.default_sample_size
        } else {
            self.sample_sizes
                .get(sample_idx as usize)
                .copied()
                .unwrap_or(0)
        }
    }
}

/// 解析 AVCDecoderConfigurationRecord, 产出 SPS/PPS 的绝对偏移
///
/// `content_start` 为 avcC 内容在文件中的偏移, 条目偏移指向 NAL 头字节.
fn parse_avcc(data: &[u8], content_start: u64) -> VidResult<Vec<ParameterEntry>> {
    let truncated = || VidError::InvalidData("avcC 记录被截断".into());
    if data.len() < 6 || data[0] != 1 {
        return Err(VidError::InvalidData("avcC 版本或长度无效".into()));
    }

    let mut entries = Vec::new();
    let mut pos = 5usize;
    let sps_count = usize::from(data[5] & 0x1F);
    pos += 1;
    let read_set = |pos: &mut usize, entries: &mut Vec<ParameterEntry>| -> VidResult<()> {
        let len_bytes = data.get(*pos..*pos + 2).ok_or_else(truncated)?;
        let len = usize::from(u16::from_be_bytes([len_bytes[0], len_bytes[1]]));
        *pos += 2;
        if len == 0 || *pos + len > data.len() {
            return Err(truncated());
        }
        entries.push(ParameterEntry {
            parameter_type: SampleType::VideoParam,
            offset: content_start + *pos as u64,
            size: len as u64,
        });
        *pos += len;
        Ok(())
    };

    for _ in 0..sps_count {
        read_set(&mut pos, &mut entries)?;
    }
    let pps_count = usize::from(*data.get(pos).ok_or_else(truncated)?);
    pos += 1;
    for _ in 0..pps_count {
        read_set(&mut pos, &mut entries)?;
    }
    Ok(entries)
}

/// 在 MPEG-4 描述符数据中递归搜索指定 tag 的 payload
fn search_descriptor(data: &[u8], target_tag: u8) -> Option<&[u8]> {
    let mut pos = 0;
    while pos < data.len() {
        let tag = data[pos];
        pos += 1;

        // 可变长度: 每字节高位为续标志, 低 7 位为值
        let mut len = 0usize;
        for _ in 0..4 {
            let b = *data.get(pos)?;
            pos += 1;
            len = (len << 7) | usize::from(b & 0x7F);
            if b & 0x80 == 0 {
                break;
            }
        }

        let desc_end = (pos + len).min(data.len());
        if tag == target_tag {
            return Some(&data[pos..desc_end]);
        }

        let child_start = (pos + descriptor_header_size(tag, &data[pos..desc_end])).min(desc_end);
        if child_start < desc_end {
            if let Some(found) = search_descriptor(&data[child_start..desc_end], target_tag) {
                return Some(found);
            }
        }
        pos = desc_end;
    }
    None
}

/// MPEG-4 描述符固定头部大小
fn descriptor_header_size(tag: u8, payload: &[u8]) -> usize {
    match tag {
        0x03 => {
            // ES_Descriptor: ES_ID(2) + flags(1) + 可选字段
            let Some(&flags) = payload.get(2) else {
                return payload.len();
            };
            let mut skip = 3;
            if flags & 0x80 != 0 {
                skip += 2;
            }
            if flags & 0x40 != 0 {
                skip += 1 + payload.get(skip).map_or(0, |&n| usize::from(n));
            }
            if flags & 0x20 != 0 {
                skip += 2;
            }
            skip
        }
        // DecoderConfigDescriptor: objectType(1)+stream(1)+buf(3)+max(4)+avg(4)
        0x04 => 13,
        _ => 0,
    }
}

/// 采样描述 fourcc 到 CodecId
fn fourcc_to_codec_id(fourcc: &[u8; 4]) -> CodecId {
    match fourcc {
        // 视频
        b"avc1" | b"avc3" | b"h264" => CodecId::H264,
        b"hvc1" | b"hev1" => CodecId::H265,
        b"vp08" => CodecId::Vp8,
        b"vp09" => CodecId::Vp9,
        b"av01" => CodecId::Av1,
        b"mp4v" => CodecId::Mpeg4,
        b"mjpa" | b"mjpb" | b"jpeg" => CodecId::Mjpeg,
        b"raw " => CodecId::RawVideo,
        // 音频
        b"mp4a" => CodecId::Aac,
        b"Opus" => CodecId::Opus,
        b"fLaC" => CodecId::Flac,
        b"alac" => CodecId::Alac,
        b"ac-3" => CodecId::Ac3,
        b"ec-3" => CodecId::Eac3,
        b"sowt" => CodecId::PcmS16le,
        b"twos" => CodecId::PcmS16be,
        b"ulaw" => CodecId::PcmMulaw,
        b"alaw" => CodecId::PcmAlaw,
        b".mp3" => CodecId::Mp3,
        // 文本
        b"tx3g" => CodecId::MovText,
        _ => CodecId::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_box(body: &[u8]) -> Vec<u8> {
        let mut data = vec![0, 0, 0, 0];
        data.extend_from_slice(body);
        data
    }

    fn u32s(values: &[u32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_be_bytes()).collect()
    }

    fn parse_with(
        data: Vec<u8>,
        f: impl FnOnce(&mut SampleTable, &mut IoContext, u64) -> VidResult<()>,
        st: &mut SampleTable,
    ) {
        let end = data.len() as u64;
        let mut io = IoContext::from_memory(data);
        f(st, &mut io, end).unwrap();
    }

    #[test]
    fn test_fourcc_映射() {
        assert_eq!(fourcc_to_codec_id(b"avc1"), CodecId::H264);
        assert_eq!(fourcc_to_codec_id(b"hvc1"), CodecId::H265);
        assert_eq!(fourcc_to_codec_id(b"mp4a"), CodecId::Aac);
        assert_eq!(fourcc_to_codec_id(b"tx3g"), CodecId::MovText);
        assert_eq!(fourcc_to_codec_id(b"xxxx"), CodecId::None);
    }

    #[test]
    fn test_展开_stsc_ctts_stss() {
        let mut st = SampleTable::new();
        // 5 个采样, 大小 10..14
        parse_with(
            full_box(&u32s(&[0, 5, 10, 11, 12, 13, 14])),
            |st, io, end| st.parse_stsz(io, end),
            &mut st,
        );
        // 块 1 起每块 2 个, 块 3 起每块 1 个
        parse_with(
            full_box(&u32s(&[2, 1, 2, 1, 3, 1, 1])),
            |st, io, end| st.parse_stsc(io, end),
            &mut st,
        );
        parse_with(
            full_box(&u32s(&[3, 100, 200, 300])),
            |st, io, end| st.parse_stco(io, end, false),
            &mut st,
        );
        parse_with(
            full_box(&u32s(&[1, 5, 512])),
            |st, io, end| st.parse_stts(io, end),
            &mut st,
        );
        parse_with(
            full_box(&u32s(&[2, 2, 1024, 3, 0])),
            |st, io, end| st.parse_ctts(io, end),
            &mut st,
        );
        parse_with(
            full_box(&u32s(&[2, 4, 1])),
            |st, io, end| st.parse_stss(io, end),
            &mut st,
        );

        let mut map = BitstreamMap::new(StreamType::Video, 0, 5).unwrap();
        let dropped = st.expand(&mut map, 1000).unwrap();
        assert_eq!(dropped, 0);

        let offsets: Vec<u64> = map.samples().iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![100, 110, 200, 212, 300]);
        let dts: Vec<i64> = map.samples().iter().map(|s| s.dts).collect();
        assert_eq!(dts, vec![0, 512, 1024, 1536, 2048]);
        let pts: Vec<i64> = map.samples().iter().map(|s| s.pts).collect();
        assert_eq!(pts, vec![1024, 1536, 1024, 1536, 2048]);
        let sync: Vec<bool> = map.samples().iter().map(|s| s.sample_type.is_sync()).collect();
        assert_eq!(sync, vec![true, false, false, true, false]);
        assert_eq!(st.total_duration(), 2560);
    }

    #[test]
    fn test_截断文件丢弃越界采样() {
        let mut st = SampleTable::new();
        parse_with(
            full_box(&u32s(&[100, 3])),
            |st, io, end| st.parse_stsz(io, end),
            &mut st,
        );
        parse_with(
            full_box(&u32s(&[1, 1, 3, 1])),
            |st, io, end| st.parse_stsc(io, end),
            &mut st,
        );
        parse_with(
            full_box(&u32s(&[1, 0])),
            |st, io, end| st.parse_stco(io, end, false),
            &mut st,
        );
        let mut map = BitstreamMap::new(StreamType::Audio, 0, 3).unwrap();
        let dropped = st.expand(&mut map, 250).unwrap();
        assert_eq!(dropped, 1);
        assert_eq!(map.sample_count(), 2);
        assert!(map.samples().iter().all(|s| s.sample_type == SampleType::Audio));
    }

    /// stsz/stsc/stco 三张表的最小组合
    fn chunked_table(stsz: &[u32], stsc: &[u32], stco: Vec<u8>, is_64bit: bool) -> SampleTable {
        let mut st = SampleTable::new();
        parse_with(full_box(&u32s(stsz)), |st, io, end| st.parse_stsz(io, end), &mut st);
        parse_with(full_box(&u32s(stsc)), |st, io, end| st.parse_stsc(io, end), &mut st);
        parse_with(
            full_box(&stco),
            |st, io, end| st.parse_stco(io, end, is_64bit),
            &mut st,
        );
        st
    }

    #[test]
    fn test_co64_偏移溢出() {
        let mut co64 = u32s(&[1]);
        co64.extend_from_slice(&(u64::MAX - 4).to_be_bytes());
        let st = chunked_table(&[10, 2], &[1, 1, 2, 1], co64, true);

        let mut map = BitstreamMap::new(StreamType::Video, 0, 2).unwrap();
        let err = st.expand(&mut map, 1000).expect_err("偏移溢出应失败");
        assert!(matches!(err, VidError::InvalidData(_)));
    }

    #[test]
    fn test_固定大小计数按文件大小截断() {
        // stsz 声明 u32::MAX 个 10 字节采样, 文件只有 100 字节
        let st = chunked_table(&[10, u32::MAX], &[1, 1, u32::MAX, 1], u32s(&[1, 0]), false);
        assert_eq!(st.capped_sample_count(100), 10);

        let mut map = BitstreamMap::new(StreamType::Audio, 0, 10).unwrap();
        let dropped = st.expand(&mut map, 100).unwrap();
        assert_eq!(map.sample_count(), 10);
        assert_eq!(dropped, (u32::MAX - 10) as usize);
        assert_eq!(map.samples()[9].offset, 90);
    }

    #[test]
    fn test_块偏移越出文件() {
        let st = chunked_table(
            &[0, 4, 10, 10, 10, 10],
            &[1, 1, 2, 1],
            u32s(&[2, 0, 5000]),
            false,
        );
        let mut map = BitstreamMap::new(StreamType::Video, 0, 4).unwrap();
        let dropped = st.expand(&mut map, 100).unwrap();
        assert_eq!(dropped, 2);
        let offsets: Vec<u64> = map.samples().iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![0, 10]);
    }

    #[test]
    fn test_总时长饱和() {
        let st = {
            let mut st = SampleTable::new();
            parse_with(
                full_box(&u32s(&[2, u32::MAX, u32::MAX, u32::MAX, u32::MAX])),
                |st, io, end| st.parse_stts(io, end),
                &mut st,
            );
            st
        };
        assert_eq!(st.total_duration(), u64::MAX);
    }

    #[test]
    fn test_损坏计数被截断() {
        let mut st = SampleTable::new();
        // 声明 1000 个条目, 实际只有 1 个
        parse_with(
            full_box(&u32s(&[1000, 1, 512])),
            |st, io, end| st.parse_stts(io, end),
            &mut st,
        );
        assert_eq!(st.total_duration(), 512);
    }

    #[test]
    fn test_avcc_参数集偏移() {
        let mut avcc = vec![1, 0x64, 0, 0x1F, 0xFF, 0xE1];
        avcc.extend_from_slice(&3u16.to_be_bytes());
        avcc.extend_from_slice(&[0x67, 0x64, 0x00]);
        avcc.push(1);
        avcc.extend_from_slice(&2u16.to_be_bytes());
        avcc.extend_from_slice(&[0x68, 0xEE]);

        let entries = parse_avcc(&avcc, 1000).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!((entries[0].offset, entries[0].size), (1008, 3));
        assert_eq!((entries[1].offset, entries[1].size), (1014, 2));
        assert!(entries.iter().all(|e| e.parameter_type == SampleType::VideoParam));

        assert!(parse_avcc(&avcc[..10], 0).is_err());
    }

    #[test]
    fn test_esds_aac_lc() {
        // ES_Descriptor → DecoderConfigDescriptor(0x40) → DecoderSpecificInfo(0x12 0x10)
        let dsi = [0x05, 0x02, 0x12, 0x10];
        let mut dcd = vec![0x04, 13 + dsi.len() as u8, 0x40, 0x15];
        dcd.extend_from_slice(&[0; 11]);
        dcd.extend_from_slice(&dsi);
        let mut es = vec![0x03, 3 + dcd.len() as u8, 0, 1, 0];
        es.extend_from_slice(&dcd);
        let mut esds = vec![0, 0, 0, 0];
        esds.extend_from_slice(&es);

        let mut st = SampleTable::new();
        st.codec = CodecId::None;
        st.apply_esds(&esds);
        assert_eq!(st.codec, CodecId::Aac);
        assert_eq!(st.codec_profile, CodecProfile::AacLc);
    }
}
