//! 裸视频基本流 (H.264 Annex-B / MPEG-1/2 Video) 解封装器.
//!
//! 逐字节扫描起始码 `00 00 01` (前导零 ≥ 2 个), 由起始码后的第一个字节
//! 判定采样边界:
//!
//! ```text
//! Annex-B 模式:  0x65 → VIDEO_SYNC,  0x67 / 0x68 → VIDEO_PARAM
//! MPEG 模式:     0xB3 → VIDEO_PARAM, 0x00 (picture) → I 帧 VIDEO_SYNC, 其他 VIDEO
//! ```
//!
//! 其他字节不构成边界. 第一个被识别的起始码决定扫描模式.
//! 参数集采样从 NAL 头字节开始, 帧采样从头字节之后开始.
//! 每个采样延伸到下一个边界, 最后一个采样延伸到文件末尾.
//! 扫描在 `file_size - 32` 处停止, 为分类预留前瞻余量.

use log::debug;
use vidmap_codec::{CodecId, CodecProfile};
use vidmap_core::{StreamType, VidError, VidResult};

use crate::bitstream_map::{BitstreamMap, SampleEntry, SampleType, VideoInfo};
use crate::container::Container;
use crate::demuxer::{DemuxOutput, Demuxer};
use crate::io::IoContext;

/// 扫描末尾的前瞻余量
pub const SCAN_MARGIN: u64 = 32;

/// 初始采样容量按每 KiB 一个采样估算, 并限制在此区间内
const MIN_INITIAL_CAPACITY: u64 = 16;
const MAX_INITIAL_CAPACITY: u64 = 1 << 20;
const BYTES_PER_SAMPLE_ESTIMATE: u64 = 1024;

/// MPEG 序列头起始码
const MPEG_SEQUENCE_HEADER: u8 = 0xB3;
/// MPEG 图像起始码
const MPEG_PICTURE_START: u8 = 0x00;
/// MPEG picture_coding_type: I 帧
const MPEG_PICTURE_I: u8 = 1;

/// MPEG frame_rate_code → 帧率
const MPEG_FRAME_RATES: [f64; 9] = [
    0.0,
    24000.0 / 1001.0,
    24.0,
    25.0,
    30000.0 / 1001.0,
    30.0,
    50.0,
    60000.0 / 1001.0,
    60.0,
];

/// 扫描模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanMode {
    /// 尚未遇到可识别的起始码
    Undetermined,
    /// H.264 Annex-B
    AnnexB,
    /// MPEG-1/2 Video
    Mpeg,
}

/// 裸视频基本流解封装器
pub struct EsDemuxer {
    /// 注册时对应的容器
    container: Container,
    mode: ScanMode,
    /// 第一个 MPEG 序列头给出的画面信息
    sequence_info: Option<VideoInfo>,
}

impl EsDemuxer {
    /// 创建 H.264 Annex-B 解封装器 (工厂函数)
    pub fn create_h264() -> VidResult<Box<dyn Demuxer>> {
        Ok(Box::new(Self::new(Container::H264Es)))
    }

    /// 创建 MPEG-1/2 视频基本流解封装器 (工厂函数)
    pub fn create_mpeg() -> VidResult<Box<dyn Demuxer>> {
        Ok(Box::new(Self::new(Container::MpegEs)))
    }

    fn new(container: Container) -> Self {
        Self {
            container,
            mode: ScanMode::Undetermined,
            sequence_info: None,
        }
    }

    /// 扫描整个文件, 产出一条视频轨道
    pub fn scan(&mut self, io: &mut IoContext, file_size: u64) -> VidResult<BitstreamMap> {
        let capacity = (file_size / BYTES_PER_SAMPLE_ESTIMATE)
            .clamp(MIN_INITIAL_CAPACITY, MAX_INITIAL_CAPACITY) as usize;
        let mut map = BitstreamMap::new(StreamType::Video, 0, capacity)?;

        io.seek_to(0)?;
        let scan_end = file_size.saturating_sub(SCAN_MARGIN);
        let mut pos = 0u64;
        let mut zero_run = 0u32;

        while pos < scan_end {
            let byte = io.read_u8()?;
            pos += 1;
            if byte == 0x00 {
                zero_run = zero_run.saturating_add(1);
                continue;
            }
            if byte != 0x01 || zero_run < 2 {
                zero_run = 0;
                continue;
            }
            zero_run = 0;

            // pos 此时指向起始码之后的分类字节
            let code_offset = pos;
            let code = io.read_u8()?;
            pos += 1;

            let Some(sample_type) = self.classify(code, io, &mut pos)? else {
                if code == 0x00 {
                    zero_run = 1;
                }
                continue;
            };

            let offset = if sample_type == SampleType::VideoParam {
                code_offset
            } else {
                code_offset + 1
            };
            if let Some(prev) = map.last_sample_mut() {
                prev.size = offset - prev.offset;
            }
            map.push_sample(SampleEntry::new(sample_type, offset, 0));
        }

        let Some(last) = map.last_sample_mut() else {
            return Err(VidError::InvalidData(format!(
                "{}: 未找到任何可识别的起始码, file_size={file_size}",
                self.container
            )));
        };
        last.size = file_size - last.offset;

        map.codec = match self.mode {
            ScanMode::Mpeg => CodecId::Mpeg2Video,
            _ => CodecId::H264,
        };
        if self.mode == ScanMode::Mpeg {
            map.codec_profile = CodecProfile::Mpeg2Main;
        }
        map.video = self.sequence_info;
        map.recount_frames();

        debug!(
            "ES 扫描完成: mode={:?}, samples={}, frames={}, idr={}",
            self.mode,
            map.sample_count(),
            map.frame_count,
            map.frame_count_idr
        );
        Ok(map)
    }

    /// 根据起始码后的字节分类, 必要时读取后续字节
    fn classify(
        &mut self,
        code: u8,
        io: &mut IoContext,
        pos: &mut u64,
    ) -> VidResult<Option<SampleType>> {
        match self.mode {
            ScanMode::Undetermined => {
                if code == MPEG_SEQUENCE_HEADER {
                    self.mode = ScanMode::Mpeg;
                    debug!("ES 扫描模式: MPEG-1/2 Video");
                    self.classify(code, io, pos)
                } else if let Some(t) = classify_annexb(code) {
                    self.mode = ScanMode::AnnexB;
                    debug!("ES 扫描模式: H.264 Annex-B");
                    Ok(Some(t))
                } else {
                    Ok(None)
                }
            }
            ScanMode::AnnexB => Ok(classify_annexb(code)),
            ScanMode::Mpeg => match code {
                MPEG_SEQUENCE_HEADER => {
                    if self.sequence_info.is_none() {
                        let mut hdr = [0u8; 4];
                        io.read_exact(&mut hdr)?;
                        *pos += 4;
                        self.sequence_info = Some(parse_sequence_header(&hdr));
                    }
                    Ok(Some(SampleType::VideoParam))
                }
                MPEG_PICTURE_START => {
                    // temporal_reference(10) + picture_coding_type(3)
                    let _hi = io.read_u8()?;
                    let lo = io.read_u8()?;
                    *pos += 2;
                    let picture_type = (lo >> 3) & 0x07;
                    if picture_type == MPEG_PICTURE_I {
                        Ok(Some(SampleType::VideoSync))
                    } else {
                        Ok(Some(SampleType::Video))
                    }
                }
                _ => Ok(None),
            },
        }
    }
}

fn classify_annexb(code: u8) -> Option<SampleType> {
    match code {
        0x65 => Some(SampleType::VideoSync),
        0x67 | 0x68 => Some(SampleType::VideoParam),
        _ => None,
    }
}

/// 解析 MPEG 序列头的前 4 字节: 宽 12 位, 高 12 位, 宽高比 4 位, 帧率码 4 位
fn parse_sequence_header(hdr: &[u8; 4]) -> VideoInfo {
    let width = (u32::from(hdr[0]) << 4) | (u32::from(hdr[1]) >> 4);
    let height = ((u32::from(hdr[1]) & 0x0F) << 8) | u32::from(hdr[2]);
    let rate_code = usize::from(hdr[3] & 0x0F);
    VideoInfo {
        width,
        height,
        frame_rate: MPEG_FRAME_RATES.get(rate_code).copied().unwrap_or(0.0),
    }
}

impl Demuxer for EsDemuxer {
    fn container(&self) -> Container {
        self.container
    }

    fn name(&self) -> &str {
        match self.container {
            Container::MpegEs => "mpegvideo",
            _ => "h264",
        }
    }

    fn parse(&mut self, io: &mut IoContext, file_size: u64) -> VidResult<DemuxOutput> {
        let mut out = DemuxOutput::new();
        let map = self.scan(io, file_size)?;
        out.push_track(map);
        out.finish(self.container)
    }
}
