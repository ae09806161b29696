//! MP4/MOV (ISO Base Media File Format) 解封装器.
//!
//! 支持 MP4 (MPEG-4 Part 14) 和 QuickTime MOV 格式.
//!
//! # Box 树结构
//! ```text
//! ftyp                  文件类型 (可选)
//! moov                  影片元数据
//! ├── mvhd              影片头部 (创建时间, 时间刻度)
//! ├── trak              轨道 (每个流一个)
//! │   ├── tkhd          轨道头部 (track id, 宽高)
//! │   └── mdia
//! │       ├── mdhd      媒体头部 (时间刻度, 时长)
//! │       ├── hdlr      处理器引用 (vide/soun/text...)
//! │       └── minf
//! │           └── stbl  采样表
//! └── udta
//!     └── chpl          Nero 章节
//! mdat                  媒体数据
//! ```

mod boxes;
mod sample_table;

use chrono::{DateTime, SecondsFormat};
use log::{debug, warn};
use vidmap_core::{StreamType, VidError, VidResult};

use crate::bitstream_map::{AudioInfo, BitstreamMap, VideoInfo};
use crate::container::Container;
use crate::demuxer::{Chapter, DemuxOutput, Demuxer, FileMetadata};
use crate::io::IoContext;

use self::boxes::{BoxType, FtypBox, read_box_header, read_full_box_header};
use self::sample_table::SampleTable;

/// 1904-01-01 与 1970-01-01 之间的秒数
const MP4_EPOCH_OFFSET: i64 = 2_082_844_800;

/// trak 解析过程中收集的信息
#[derive(Default)]
struct TrakInfo {
    track_id: u32,
    /// tkhd 中的显示宽高
    width: u32,
    height: u32,
    timescale: u32,
    duration: u64,
    handler: [u8; 4],
    table: SampleTable,
}

impl TrakInfo {
    fn stream_type(&self) -> StreamType {
        handler_to_stream_type(&self.handler)
    }
}

/// hdlr 处理器类型 → 流类型
fn handler_to_stream_type(handler: &[u8; 4]) -> StreamType {
    match handler {
        b"vide" => StreamType::Video,
        b"soun" => StreamType::Audio,
        b"text" | b"sbtl" | b"subt" => StreamType::Text,
        b"tmcd" => StreamType::Timecode,
        b"meta" => StreamType::Meta,
        b"hint" => StreamType::Hint,
        _ => StreamType::Unknown,
    }
}

/// 时基单位换算为毫秒, 超出 u64 时饱和; `timescale` 为 0 时返回 0
fn duration_to_ms(duration: u64, timescale: u32) -> u64 {
    if timescale == 0 {
        return 0;
    }
    let ms = u128::from(duration) * 1000 / u128::from(timescale);
    u64::try_from(ms).unwrap_or(u64::MAX)
}

/// mvhd 创建时间 (1904 纪元秒) → RFC 3339, 0 表示未设置
fn mp4_time_to_rfc3339(seconds: u64) -> Option<String> {
    if seconds == 0 {
        return None;
    }
    let unix = i64::try_from(seconds).ok()? - MP4_EPOCH_OFFSET;
    DateTime::from_timestamp(unix, 0).map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// MP4 解封装器
pub struct Mp4Demuxer;

impl Mp4Demuxer {
    /// 创建 MP4 解封装器实例 (工厂函数)
    pub fn create() -> VidResult<Box<dyn Demuxer>> {
        Ok(Box::new(Self))
    }

    /// 解析 moov box 内容
    fn parse_moov(
        io: &mut IoContext,
        moov_end: u64,
        file_size: u64,
        out: &mut DemuxOutput,
    ) -> VidResult<()> {
        while io.position()? + 8 <= moov_end {
            let header = read_box_header(io, moov_end)?;
            match header.box_type {
                BoxType::Mvhd => {
                    Self::parse_mvhd(io, &mut out.metadata)?;
                }
                BoxType::Trak => match Self::parse_trak(io, header.end, file_size) {
                    Ok(Some(map)) => out.push_track(map),
                    Ok(None) => {}
                    Err(e) => out.skip_track(e),
                },
                BoxType::Udta => {
                    Self::parse_udta(io, header.end, &mut out.metadata)?;
                }
                _ => {}
            }
            io.seek_to(header.end)?;
        }
        Ok(())
    }

    /// 解析 mvhd, 只取创建时间
    fn parse_mvhd(io: &mut IoContext, metadata: &mut FileMetadata) -> VidResult<()> {
        let (version, _flags) = read_full_box_header(io)?;
        let (creation, timescale, duration) = if version == 1 {
            let creation = io.read_u64_be()?;
            let _modification = io.read_u64_be()?;
            let timescale = io.read_u32_be()?;
            (creation, timescale, io.read_u64_be()?)
        } else {
            let creation = u64::from(io.read_u32_be()?);
            let _modification = io.read_u32_be()?;
            let timescale = io.read_u32_be()?;
            (creation, timescale, u64::from(io.read_u32_be()?))
        };
        debug!("mvhd: timescale={timescale}, duration={duration}, creation={creation}");
        metadata.creation_time = mp4_time_to_rfc3339(creation);
        Ok(())
    }

    /// 解析 udta, 只关心 chpl
    fn parse_udta(io: &mut IoContext, end: u64, metadata: &mut FileMetadata) -> VidResult<()> {
        while io.position()? + 8 <= end {
            let header = read_box_header(io, end)?;
            if header.box_type == BoxType::Chpl {
                Self::parse_chpl(io, header.end, &mut metadata.chapters)?;
            }
            io.seek_to(header.end)?;
        }
        Ok(())
    }

    /// 解析 Nero 章节 (chpl), 起始时间以 100ns 为单位
    fn parse_chpl(io: &mut IoContext, end: u64, chapters: &mut Vec<Chapter>) -> VidResult<()> {
        let (version, _flags) = read_full_box_header(io)?;
        if version > 0 {
            let _reserved = io.read_u32_be()?;
        }
        let count = io.read_u8()?;
        for _ in 0..count {
            if io.position()? + 9 > end {
                warn!("chpl: 章节列表被截断");
                break;
            }
            let start = io.read_u64_be()?;
            let title_len = u64::from(io.read_u8()?);
            if io.position()? + title_len > end {
                warn!("chpl: 章节标题被截断");
                break;
            }
            let title = io.read_bytes(title_len as usize)?;
            chapters.push(Chapter {
                start_ms: start / 10_000,
                title: String::from_utf8_lossy(&title).into_owned(),
            });
        }
        debug!("chpl: {} 个章节", chapters.len());
        Ok(())
    }

    /// 解析 trak, 没有采样的轨道返回 `None`
    fn parse_trak(
        io: &mut IoContext,
        trak_end: u64,
        file_size: u64,
    ) -> VidResult<Option<BitstreamMap>> {
        let mut info = TrakInfo::default();
        Self::parse_trak_boxes(io, trak_end, &mut info)?;

        let stream_type = info.stream_type();
        let table = &info.table;
        if table.sample_count() == 0 {
            debug!("MP4: 轨道 id={} ({stream_type}) 没有采样, 跳过", info.track_id);
            return Ok(None);
        }

        let capacity = table.capped_sample_count(file_size) as usize;
        let mut map = BitstreamMap::new(stream_type, table.parameter_entries.len(), capacity)?;
        map.codec = table.codec;
        map.codec_profile = table.codec_profile;
        map.fourcc = table.fourcc;
        map.track_id = info.track_id;
        map.timescale = info.timescale;

        for entry in &table.parameter_entries {
            map.push_parameter(*entry);
        }
        let dropped = table.expand(&mut map, file_size)?;
        if dropped > 0 {
            warn!(
                "MP4: 轨道 id={} 有 {dropped} 个采样越出文件范围, 已丢弃",
                info.track_id
            );
        }
        if map.sample_count() == 0 {
            return Err(VidError::InvalidData(format!(
                "轨道 id={} 的全部采样都越出文件范围",
                info.track_id
            )));
        }

        let duration = if info.duration > 0 {
            info.duration
        } else {
            table.total_duration()
        };
        map.duration_ms = duration_to_ms(duration, info.timescale);

        match stream_type {
            StreamType::Video => {
                let frame_rate = if duration > 0 {
                    map.sample_count() as f64 * f64::from(info.timescale) / duration as f64
                } else {
                    0.0
                };
                map.video = Some(VideoInfo {
                    width: if table.width > 0 { table.width } else { info.width },
                    height: if table.height > 0 { table.height } else { info.height },
                    frame_rate,
                });
            }
            StreamType::Audio => {
                map.audio = Some(AudioInfo {
                    sample_rate: table.sample_rate,
                    channels: table.channel_count,
                    bits_per_sample: table.bits_per_sample,
                });
            }
            _ => {}
        }

        map.recount_frames();
        map.update_bitrate();
        debug!("MP4: {map}");
        Ok(Some(map))
    }

    /// 递归解析 trak 内部的 box
    fn parse_trak_boxes(io: &mut IoContext, end: u64, info: &mut TrakInfo) -> VidResult<()> {
        while io.position()? + 8 <= end {
            let header = read_box_header(io, end)?;
            match header.box_type {
                BoxType::Tkhd => Self::parse_tkhd(io, info)?,
                BoxType::Mdia | BoxType::Minf | BoxType::Stbl => {
                    Self::parse_trak_boxes(io, header.end, info)?;
                }
                BoxType::Mdhd => Self::parse_mdhd(io, info)?,
                BoxType::Hdlr => {
                    read_full_box_header(io)?;
                    let _pre_defined = io.read_u32_be()?;
                    info.handler = io.read_tag()?;
                }
                BoxType::Stsd => {
                    let stream_type = info.stream_type();
                    info.table.parse_stsd(io, stream_type, header.end)?;
                }
                BoxType::Stts => info.table.parse_stts(io, header.end)?,
                BoxType::Stsc => info.table.parse_stsc(io, header.end)?,
                BoxType::Stsz => info.table.parse_stsz(io, header.end)?,
                BoxType::Stco => info.table.parse_stco(io, header.end, false)?,
                BoxType::Co64 => info.table.parse_stco(io, header.end, true)?,
                BoxType::Stss => info.table.parse_stss(io, header.end)?,
                BoxType::Ctts => info.table.parse_ctts(io, header.end)?,
                _ => {}
            }
            io.seek_to(header.end)?;
        }
        Ok(())
    }

    /// 解析 tkhd
    fn parse_tkhd(io: &mut IoContext, info: &mut TrakInfo) -> VidResult<()> {
        let (version, _flags) = read_full_box_header(io)?;
        if version == 1 {
            io.skip(16)?;
            info.track_id = io.read_u32_be()?;
            io.skip(4 + 8)?;
        } else {
            io.skip(8)?;
            info.track_id = io.read_u32_be()?;
            io.skip(4 + 4)?;
        }
        // reserved(8) + layer + alternate_group + volume + reserved(2) + matrix(36)
        io.skip(8 + 2 + 2 + 2 + 2 + 36)?;
        // 宽高 (16.16 定点数)
        info.width = io.read_u32_be()? >> 16;
        info.height = io.read_u32_be()? >> 16;
        Ok(())
    }

    /// 解析 mdhd
    fn parse_mdhd(io: &mut IoContext, info: &mut TrakInfo) -> VidResult<()> {
        let (version, _flags) = read_full_box_header(io)?;
        if version == 1 {
            io.skip(16)?;
            info.timescale = io.read_u32_be()?;
            info.duration = io.read_u64_be()?;
        } else {
            io.skip(8)?;
            info.timescale = io.read_u32_be()?;
            info.duration = u64::from(io.read_u32_be()?);
        }
        Ok(())
    }
}

impl Demuxer for Mp4Demuxer {
    fn container(&self) -> Container {
        Container::Mp4
    }

    fn name(&self) -> &str {
        "mp4"
    }

    fn parse(&mut self, io: &mut IoContext, file_size: u64) -> VidResult<DemuxOutput> {
        let mut out = DemuxOutput::new();
        let mut found_moov = false;

        io.seek_to(0)?;
        while io.position()? + 8 <= file_size {
            let header = match read_box_header(io, file_size) {
                Ok(h) => h,
                Err(e) if found_moov => {
                    // moov 之后的尾部损坏不影响已得到的索引
                    warn!("MP4: 顶层 box 损坏, 停止遍历: {e}");
                    break;
                }
                Err(e) => return Err(e),
            };

            match header.box_type {
                BoxType::Ftyp => {
                    let ftyp = FtypBox::parse(io, header.content_size())?;
                    debug!(
                        "MP4: ftyp major_brand={}, compatible={}",
                        ftyp.major_brand_str(),
                        ftyp.compatible_brands.len()
                    );
                }
                BoxType::Moov => {
                    found_moov = true;
                    Self::parse_moov(io, header.end, file_size, &mut out)?;
                }
                BoxType::Mdat => {
                    debug!(
                        "MP4: mdat offset={}, size={}",
                        header.content_start,
                        header.content_size()
                    );
                }
                _ => {}
            }
            io.seek_to(header.end)?;
        }

        if !found_moov {
            return Err(VidError::InvalidData("MP4 文件中未找到 moov box".into()));
        }
        out.finish(Container::Mp4)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::bitstream_map::SampleType;
    use vidmap_codec::CodecId;

    fn mp4_box(tag: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = ((body.len() + 8) as u32).to_be_bytes().to_vec();
        out.extend_from_slice(tag);
        out.extend_from_slice(body);
        out
    }

    fn full_box(tag: &[u8; 4], version: u8, body: &[u8]) -> Vec<u8> {
        let mut content = vec![version, 0, 0, 0];
        content.extend_from_slice(body);
        mp4_box(tag, &content)
    }

    fn u32s(values: &[u32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_be_bytes()).collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn trak(
        track_id: u32,
        handler: &[u8; 4],
        timescale: u32,
        duration: u32,
        stsd_entry: Vec<u8>,
        sample_sizes: &[u32],
        chunk_offset: u32,
        sync: Option<&[u32]>,
    ) -> Vec<u8> {
        let mut tkhd = u32s(&[0, 0, track_id, 0, 0]);
        tkhd.extend_from_slice(&[0; 52]);
        tkhd.extend(u32s(&[640 << 16, 360 << 16]));

        let mut mdhd = u32s(&[0, 0, timescale, duration]);
        mdhd.extend_from_slice(&[0; 4]);

        let mut hdlr = u32s(&[0]);
        hdlr.extend_from_slice(handler);
        hdlr.extend_from_slice(&[0; 13]);

        let mut stsd = u32s(&[1]);
        stsd.extend(stsd_entry);

        let n = sample_sizes.len() as u32;
        let mut stsz = u32s(&[0, n]);
        stsz.extend(u32s(sample_sizes));

        let mut stbl = full_box(b"stsd", 0, &stsd);
        let stts = if n > 0 {
            u32s(&[1, n, duration / n])
        } else {
            u32s(&[0])
        };
        stbl.extend(full_box(b"stts", 0, &stts));
        stbl.extend(full_box(b"stsc", 0, &u32s(&[1, 1, n, 1])));
        stbl.extend(full_box(b"stsz", 0, &stsz));
        stbl.extend(full_box(b"stco", 0, &u32s(&[1, chunk_offset])));
        if let Some(sync) = sync {
            let mut stss = u32s(&[sync.len() as u32]);
            stss.extend(u32s(sync));
            stbl.extend(full_box(b"stss", 0, &stss));
        }

        let minf = mp4_box(b"stbl", &stbl);
        let mut mdia = full_box(b"mdhd", 0, &mdhd);
        mdia.extend(full_box(b"hdlr", 0, &hdlr));
        mdia.extend(mp4_box(b"minf", &minf));

        let mut body = full_box(b"tkhd", 0, &tkhd);
        body.extend(mp4_box(b"mdia", &mdia));
        mp4_box(b"trak", &body)
    }

    fn avc1_entry() -> Vec<u8> {
        let mut avcc = vec![1, 0x64, 0, 0x1F, 0xFF, 0xE1];
        avcc.extend_from_slice(&4u16.to_be_bytes());
        avcc.extend_from_slice(&[0x67, 0x64, 0x00, 0x1F]);
        avcc.push(1);
        avcc.extend_from_slice(&2u16.to_be_bytes());
        avcc.extend_from_slice(&[0x68, 0xEE]);

        let mut body = vec![0u8; 6];
        body.extend_from_slice(&1u16.to_be_bytes());
        body.extend_from_slice(&[0; 16]);
        body.extend_from_slice(&640u16.to_be_bytes());
        body.extend_from_slice(&360u16.to_be_bytes());
        body.extend_from_slice(&[0; 50]);
        body.extend(mp4_box(b"avcC", &avcc));
        mp4_box(b"avc1", &body)
    }

    fn mp4a_entry() -> Vec<u8> {
        let mut body = vec![0u8; 6];
        body.extend_from_slice(&1u16.to_be_bytes());
        body.extend_from_slice(&[0; 8]);
        body.extend_from_slice(&2u16.to_be_bytes());
        body.extend_from_slice(&16u16.to_be_bytes());
        body.extend_from_slice(&[0; 4]);
        body.extend_from_slice(&(44100u32 << 16).to_be_bytes());
        mp4_box(b"mp4a", &body)
    }

    /// ftyp(24) + mdat(8 + 250) + moov
    ///
    /// 视频采样 100/50/60 字节从 32 开始, 音频采样 20/20 字节从 242 开始.
    pub(crate) fn build_mp4() -> Vec<u8> {
        let mut ftyp = b"isom".to_vec();
        ftyp.extend_from_slice(&[0; 4]);
        ftyp.extend_from_slice(b"isomavc1");
        let mut data = mp4_box(b"ftyp", &ftyp);
        data.extend(mp4_box(b"mdat", &[0x11; 250]));

        // 2024-01-01T00:00:00Z
        let creation = (1_704_067_200 + MP4_EPOCH_OFFSET) as u32;
        let mut mvhd = u32s(&[creation, creation, 1000, 1200]);
        mvhd.extend_from_slice(&[0; 80]);

        let mut chpl = vec![0u8];
        for (start, title) in [(0u64, "Intro"), (5_000_000u64, "Main")] {
            chpl.extend_from_slice(&start.to_be_bytes());
            chpl.push(title.len() as u8);
            chpl.extend_from_slice(title.as_bytes());
        }
        chpl[0] = 2;

        let mut moov = full_box(b"mvhd", 0, &mvhd);
        moov.extend(trak(
            1,
            b"vide",
            12800,
            1536,
            avc1_entry(),
            &[100, 50, 60],
            32,
            Some(&[1, 3]),
        ));
        moov.extend(trak(2, b"soun", 44100, 2048, mp4a_entry(), &[20, 20], 242, None));
        moov.extend(trak(3, b"tmcd", 600, 0, Vec::new(), &[], 0, None));
        moov.extend(mp4_box(b"udta", &full_box(b"chpl", 0, &chpl)));
        data.extend(mp4_box(b"moov", &moov));
        data
    }

    fn parse(data: Vec<u8>) -> VidResult<DemuxOutput> {
        let size = data.len() as u64;
        let mut io = IoContext::from_memory(data);
        Mp4Demuxer::create()?.parse(&mut io, size)
    }

    #[test]
    fn test_轨道与采样展开() {
        let data = build_mp4();
        let out = parse(data.clone()).unwrap();
        // tmcd 轨道没有采样, 不提交
        assert_eq!(out.tracks.len(), 2);

        let video = &out.tracks[0];
        assert_eq!(video.stream_type, StreamType::Video);
        assert_eq!(video.codec, CodecId::H264);
        assert_eq!(video.track_id, 1);
        assert_eq!(video.timescale, 12800);
        assert_eq!(video.duration_ms, 120);
        let offsets: Vec<u64> = video.samples().iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![32, 132, 182]);
        let types: Vec<SampleType> = video.samples().iter().map(|s| s.sample_type).collect();
        assert_eq!(
            types,
            vec![SampleType::VideoSync, SampleType::Video, SampleType::VideoSync]
        );
        assert_eq!(video.samples()[1].dts, 512);
        assert_eq!(video.frame_count, 3);
        assert_eq!(video.frame_count_idr, 2);
        let info = video.video.unwrap();
        assert_eq!((info.width, info.height), (640, 360));
        assert_eq!(info.frame_rate, 25.0);

        // avcC 参数集指向 NAL 头字节
        assert_eq!(video.parameter_count(), 2);
        let sps = video.parameters()[0];
        assert_eq!(data[sps.offset as usize], 0x67);
        assert_eq!(sps.size, 4);
        let pps = video.parameters()[1];
        assert_eq!(data[pps.offset as usize], 0x68);

        let audio = &out.tracks[1];
        assert_eq!(audio.codec, CodecId::Aac);
        assert_eq!(audio.sample_count(), 2);
        assert_eq!(audio.samples()[1].offset, 262);
        assert!(audio.samples().iter().all(|s| s.sample_type == SampleType::Audio));
        assert_eq!(audio.audio.unwrap().sample_rate, 44100);

        for track in &out.tracks {
            assert!(track.validate(data.len() as u64).is_ok());
        }
    }

    #[test]
    fn test_创建时间与章节() {
        let out = parse(build_mp4()).unwrap();
        assert_eq!(
            out.metadata.creation_time.as_deref(),
            Some("2024-01-01T00:00:00Z")
        );
        let chapters = &out.metadata.chapters;
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[1].start_ms, 500);
        assert_eq!(chapters[1].title, "Main");
    }

    #[test]
    fn test_缺少_moov() {
        let data = mp4_box(b"mdat", &[0; 16]);
        assert!(matches!(parse(data), Err(VidError::InvalidData(_))));
    }

    #[test]
    fn test_采样越界的轨道被跳过() {
        let mut moov = full_box(b"mvhd", 0, &[0; 96]);
        moov.extend(trak(1, b"vide", 1000, 100, avc1_entry(), &[10], 5000, None));
        let data = mp4_box(b"moov", &moov);
        let err = parse(data).expect_err("唯一轨道越界应失败");
        assert!(matches!(err, VidError::Format(_)));
    }

    #[test]
    fn test_时长换算不溢出() {
        assert_eq!(duration_to_ms(90_000, 90_000), 1000);
        assert_eq!(duration_to_ms(12345, 0), 0);
        assert_eq!(duration_to_ms(u64::MAX, 1000), u64::MAX);
        assert_eq!(duration_to_ms(u64::MAX, 1), u64::MAX);
        assert_eq!(duration_to_ms(u64::MAX / 1000, 1), u64::MAX / 1000 * 1000);
    }

    #[test]
    fn test_时间转换() {
        assert_eq!(mp4_time_to_rfc3339(0), None);
        assert_eq!(
            mp4_time_to_rfc3339(MP4_EPOCH_OFFSET as u64).as_deref(),
            Some("1970-01-01T00:00:00Z")
        );
    }
}
