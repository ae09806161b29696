//! 媒体文件: 容器识别、解封装分派与逐轨道查询的入口.
//!
//! 生命周期:
//! - [`MediaFile::open`] / [`MediaFile::from_bytes`] 打开文件并探测容器
//! - [`MediaFile::parse`] 分派到唯一一个解封装器, 填充各类轨道
//! - [`MediaFile::close`] (或 drop) 释放文件句柄及其拥有的全部轨道

use std::path::Path;

use bytes::Bytes;
use log::{debug, warn};
use vidmap_codec::parsers::h264::{ParameterSets, decode_parameter_set_nal};
use vidmap_codec::{CodecId, CodecProfile};
use vidmap_core::{ParseStatus, StreamType, VidError, VidResult};

use crate::bitstream_map::{BitstreamMap, SampleType, VideoInfo};
use crate::container::Container;
use crate::demuxer::FileMetadata;
use crate::io::IoContext;
use crate::options::ParseOptions;
use crate::probe::{self, ContainerGuess, PROBE_HEAD_SIZE};
use crate::registry::DemuxerRegistry;
use crate::sample_filter::{FilterMode, SampleFilterConfig, filter_idr_samples};

/// 每类轨道的上限
pub const MAX_TRACKS_PER_KIND: usize = 16;

/// 路径保存上限 (字节)
const MAX_PATH_BYTES: usize = 4096;
/// 文件名保存上限 (字节)
const MAX_NAME_BYTES: usize = 255;
/// 单个参数集读取上限, 更长的区间由 NAL 裁剪截断
const MAX_PARAMETER_SET_BYTES: u64 = 64 * 1024;

/// 轨道类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Video,
    Audio,
    Subtitle,
    Other,
}

impl TrackKind {
    /// 流类型 → 轨道类别
    pub fn from_stream_type(stream_type: StreamType) -> Self {
        match stream_type {
            StreamType::Video => Self::Video,
            StreamType::Audio => Self::Audio,
            StreamType::Text => Self::Subtitle,
            _ => Self::Other,
        }
    }
}

/// 视频轨道: 采样映射 + H.264 参数集
#[derive(Debug, Clone)]
pub struct VideoTrack {
    pub map: BitstreamMap,
    /// 按 id 索引的 SPS/PPS
    pub parameter_sets: ParameterSets,
    /// 参数集解析的最严重状态
    pub parameter_status: ParseStatus,
}

/// 按需读取的采样 (不保留在索引中)
#[derive(Debug, Clone)]
pub struct Sample {
    pub sample_type: SampleType,
    pub size: u64,
    pub offset: u64,
    pub pts: i64,
    pub dts: i64,
    pub data: Bytes,
}

/// 在字符边界处截断到 `max_bytes` 以内
fn truncate_utf8(s: &str, max_bytes: usize, what: &str) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    warn!("{what}超过 {max_bytes} 字节, 已截断: {} → {end}", s.len());
    s[..end].to_string()
}

/// 媒体文件
pub struct MediaFile {
    io: IoContext,
    path: String,
    file_name: String,
    file_size: u64,
    guess: ContainerGuess,
    options: ParseOptions,
    video_tracks: Vec<VideoTrack>,
    audio_tracks: Vec<BitstreamMap>,
    subtitle_tracks: Vec<BitstreamMap>,
    other_tracks: Vec<BitstreamMap>,
    metadata: FileMetadata,
}

impl MediaFile {
    /// 以只读方式打开文件并探测容器
    pub fn open(path: impl AsRef<Path>) -> VidResult<Self> {
        let path = path.as_ref();
        let io = IoContext::open_read(path)?;
        Self::from_io(io, &path.to_string_lossy())
    }

    /// 从内存数据创建, `name` 用作路径与扩展名来源
    pub fn from_bytes(name: &str, data: Vec<u8>) -> VidResult<Self> {
        Self::from_io(IoContext::from_memory(data), name)
    }

    fn from_io(mut io: IoContext, path: &str) -> VidResult<Self> {
        let file_size = io.size();
        let head = io.read_range(0, file_size.min(PROBE_HEAD_SIZE as u64))?;
        let guess = probe::classify(&head, &probe::extension_of(path));

        let name = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        debug!(
            "打开文件: path={path}, size={file_size}, container={}, signature={}, extension={}",
            guess.container, guess.by_signature, guess.by_extension
        );

        Ok(Self {
            io,
            path: truncate_utf8(path, MAX_PATH_BYTES, "路径"),
            file_name: truncate_utf8(&name, MAX_NAME_BYTES, "文件名"),
            file_size,
            guess,
            options: ParseOptions::default(),
            video_tracks: Vec::new(),
            audio_tracks: Vec::new(),
            subtitle_tracks: Vec::new(),
            other_tracks: Vec::new(),
            metadata: FileMetadata::default(),
        })
    }

    /// 设置解析选项 (构建器风格)
    pub fn with_options(mut self, options: ParseOptions) -> Self {
        self.options = options;
        self
    }

    /// 设置解析选项
    pub fn set_options(&mut self, options: ParseOptions) {
        self.options = options;
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    // ========================
    // 解析
    // ========================

    /// 使用内置解封装器解析
    pub fn parse(&mut self) -> VidResult<ParseStatus> {
        let registry = DemuxerRegistry::with_builtin();
        self.parse_with(&registry)
    }

    /// 使用给定注册表解析
    ///
    /// `Err` 表示整个文件失败 (无法识别容器, 没有解封装器, I/O 错误, 零轨道).
    /// `Ok` 携带各轨道与各参数集中最严重的状态.
    pub fn parse_with(&mut self, registry: &DemuxerRegistry) -> VidResult<ParseStatus> {
        self.clear_tracks();

        let container = self.guess.container;
        if !container.is_known() {
            return Err(VidError::FormatNotFound(format!(
                "无法识别容器格式: {}",
                self.file_name
            )));
        }
        if self.guess.is_mismatch() {
            warn!(
                "容器签名与扩展名不一致: signature={}, extension={}, 采用 {}",
                self.guess.by_signature, self.guess.by_extension, container
            );
        }

        let mut demuxer = registry.create_demuxer(container)?;
        demuxer.apply_options(&self.options);
        debug!("使用解封装器: {}", demuxer.name());

        self.io.seek_to(0)?;
        let output = demuxer.parse(&mut self.io, self.file_size)?;
        let mut status = output.status;
        self.metadata = output.metadata;

        for map in output.tracks {
            if let Err(e) = map.validate(self.file_size) {
                warn!("丢弃越界轨道 #{}: {e}", map.track_id);
                status = status.worst(e.status());
                continue;
            }
            status = status.worst(self.add_track(map)?);
        }

        if self.track_count_total() == 0 {
            return Err(VidError::Format(format!(
                "{container}: 没有通过校验的轨道"
            )));
        }

        debug!(
            "解析完成: video={}, audio={}, subtitle={}, other={}, status={status}",
            self.video_tracks.len(),
            self.audio_tracks.len(),
            self.subtitle_tracks.len(),
            self.other_tracks.len()
        );
        Ok(status)
    }

    fn clear_tracks(&mut self) {
        self.video_tracks.clear();
        self.audio_tracks.clear();
        self.subtitle_tracks.clear();
        self.other_tracks.clear();
        self.metadata = FileMetadata::default();
    }

    fn track_count_total(&self) -> usize {
        self.video_tracks.len()
            + self.audio_tracks.len()
            + self.subtitle_tracks.len()
            + self.other_tracks.len()
    }

    /// 按类别存放轨道, 超出上限时丢弃并返回 `Unsupported`
    fn add_track(&mut self, map: BitstreamMap) -> VidResult<ParseStatus> {
        let kind = TrackKind::from_stream_type(map.stream_type);
        if self.track_count(kind) >= MAX_TRACKS_PER_KIND {
            warn!(
                "{kind:?} 轨道超过 {MAX_TRACKS_PER_KIND} 条, 丢弃轨道 #{}",
                map.track_id
            );
            return Ok(ParseStatus::Unsupported);
        }

        match kind {
            TrackKind::Video => {
                let track = self.build_video_track(map)?;
                let status = track.parameter_status;
                self.video_tracks.push(track);
                return Ok(status);
            }
            TrackKind::Audio => self.audio_tracks.push(map),
            TrackKind::Subtitle => self.subtitle_tracks.push(map),
            TrackKind::Other => self.other_tracks.push(map),
        }
        Ok(ParseStatus::Success)
    }

    /// 为视频轨道解析 H.264 参数集
    ///
    /// 参数集来源: 容器提供的参数集条目, 没有时取 VIDEO_PARAM 采样 (裸流).
    /// 单个参数集失败只降低状态, 不影响采样索引.
    fn build_video_track(&mut self, mut map: BitstreamMap) -> VidResult<VideoTrack> {
        let mut sets = ParameterSets::new();
        let mut status = ParseStatus::Success;

        if self.options.decode_parameter_sets && map.codec == CodecId::H264 {
            let ranges: Vec<(u64, u64)> = if map.parameter_count() > 0 {
                map.parameters().iter().map(|p| (p.offset, p.size)).collect()
            } else {
                map.samples()
                    .iter()
                    .filter(|s| s.sample_type == SampleType::VideoParam)
                    .map(|s| (s.offset, s.size))
                    .collect()
            };

            for (offset, size) in ranges {
                let bytes = self
                    .io
                    .read_range(offset, size.min(MAX_PARAMETER_SET_BYTES))?;
                let result = decode_parameter_set_nal(&bytes, offset, &mut sets);
                if let Err(e) = &result {
                    warn!("参数集解析失败: offset={offset}, size={size}: {e}");
                }
                status = status.worst(ParseStatus::from_result(&result));
            }

            if let Some(sps) = sets.first_sps() {
                map.codec_profile =
                    CodecProfile::from_h264_profile_idc(sps.profile_idc, sps.constraint_set_flags);
                let frame_rate = sps
                    .frame_rate()
                    .or_else(|| map.video.map(|v| v.frame_rate))
                    .unwrap_or(0.0);
                map.video = Some(VideoInfo {
                    width: sps.width(),
                    height: sps.height(),
                    frame_rate,
                });
            }
            debug!(
                "H.264 参数集: sps={:?}, pps={:?}, status={status}",
                sets.sps_ids(),
                sets.pps_ids()
            );
        }

        Ok(VideoTrack {
            map,
            parameter_sets: sets,
            parameter_status: status,
        })
    }

    // ========================
    // 查询
    // ========================

    /// 最终采用的容器
    pub fn container(&self) -> Container {
        self.guess.container
    }

    /// 签名与扩展名两个猜测
    pub fn container_guess(&self) -> ContainerGuess {
        self.guess
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn video_tracks(&self) -> &[VideoTrack] {
        &self.video_tracks
    }

    pub fn audio_tracks(&self) -> &[BitstreamMap] {
        &self.audio_tracks
    }

    pub fn subtitle_tracks(&self) -> &[BitstreamMap] {
        &self.subtitle_tracks
    }

    pub fn other_tracks(&self) -> &[BitstreamMap] {
        &self.other_tracks
    }

    /// 指定类别的轨道数
    pub fn track_count(&self, kind: TrackKind) -> usize {
        match kind {
            TrackKind::Video => self.video_tracks.len(),
            TrackKind::Audio => self.audio_tracks.len(),
            TrackKind::Subtitle => self.subtitle_tracks.len(),
            TrackKind::Other => self.other_tracks.len(),
        }
    }

    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    /// 指定类别与序号的轨道映射
    pub fn track(&self, kind: TrackKind, track: usize) -> Option<&BitstreamMap> {
        match kind {
            TrackKind::Video => self.video_tracks.get(track).map(|t| &t.map),
            TrackKind::Audio => self.audio_tracks.get(track),
            TrackKind::Subtitle => self.subtitle_tracks.get(track),
            TrackKind::Other => self.other_tracks.get(track),
        }
    }

    // ========================
    // 数据访问
    // ========================

    /// 读取一个采样的数据
    pub fn read_sample(&mut self, kind: TrackKind, track: usize, index: usize) -> VidResult<Sample> {
        let entry = *self
            .track(kind, track)
            .ok_or(VidError::StreamNotFound(track))?
            .sample(index)
            .ok_or_else(|| {
                VidError::InvalidArgument(format!("{kind:?} 轨道 #{track} 没有采样 #{index}"))
            })?;
        let data = self.io.read_range(entry.offset, entry.size)?;
        Ok(Sample {
            sample_type: entry.sample_type,
            size: entry.size,
            offset: entry.offset,
            pts: entry.pts,
            dts: entry.dts,
            data: Bytes::from(data),
        })
    }

    /// 读取任意字节区间, 越出文件时返回 `InvalidArgument`
    pub fn read_range(&mut self, offset: u64, len: u64) -> VidResult<Vec<u8>> {
        self.io.read_range(offset, len)
    }

    /// 筛选视频轨道的 IDR 采样 (破坏性), 返回保留的帧数
    pub fn filter_video_track(
        &mut self,
        track: usize,
        picture_number: usize,
        mode: FilterMode,
        config: &SampleFilterConfig,
    ) -> VidResult<usize> {
        let video = self
            .video_tracks
            .get_mut(track)
            .ok_or(VidError::StreamNotFound(track))?;
        Ok(filter_idr_samples(&mut video.map, picture_number, mode, config))
    }

    /// 关闭文件, 释放句柄与全部轨道
    pub fn close(self) {
        debug!("关闭文件: {}", self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidmap_core::BitWriter;
    use vidmap_core::bitwriter::escape_rbsp;

    use crate::demuxers::{avi, mp3, mp4, wav};

    /// 320x240 Baseline SPS, 可选 VUI 帧率
    fn sps_nal(fps_timing: Option<(u32, u32)>) -> Vec<u8> {
        let mut bw = BitWriter::new();
        bw.write_bits(66, 8);
        bw.write_bits(0xC0, 8);
        bw.write_bits(30, 8);
        bw.write_ue(0); // sps_id
        bw.write_ue(0); // log2_max_frame_num_minus4
        bw.write_ue(2); // pic_order_cnt_type
        bw.write_ue(1); // max_num_ref_frames
        bw.write_flag(false);
        bw.write_ue(19);
        bw.write_ue(14);
        bw.write_flag(true); // frame_mbs_only_flag
        bw.write_flag(true); // direct_8x8_inference_flag
        bw.write_flag(false); // frame_cropping_flag
        match fps_timing {
            Some((num_units, time_scale)) => {
                bw.write_flag(true);
                bw.write_bits(0, 4);
                bw.write_flag(true); // timing_info_present_flag
                bw.write_bits(num_units, 32);
                bw.write_bits(time_scale, 32);
                bw.write_flag(true);
                bw.write_bits(0, 4);
            }
            None => bw.write_flag(false),
        }
        bw.write_rbsp_trailing_bits();
        let mut nal = vec![0x67];
        nal.extend(escape_rbsp(&bw.finish()));
        nal
    }

    fn pps_nal(sps_id: u32) -> Vec<u8> {
        let mut bw = BitWriter::new();
        bw.write_ue(0); // pps_id
        bw.write_ue(sps_id);
        bw.write_flag(false);
        bw.write_flag(false);
        bw.write_ue(0); // num_slice_groups_minus1
        bw.write_ue(0);
        bw.write_ue(0);
        bw.write_flag(false);
        bw.write_bits(0, 2);
        bw.write_se(0);
        bw.write_se(0);
        bw.write_se(0);
        bw.write_flag(true);
        bw.write_flag(false);
        bw.write_flag(false);
        bw.write_rbsp_trailing_bits();
        let mut nal = vec![0x68];
        nal.extend(escape_rbsp(&bw.finish()));
        nal
    }

    fn annexb(nals: &[Vec<u8>]) -> Vec<u8> {
        let mut data = Vec::new();
        for nal in nals {
            data.extend_from_slice(&[0, 0, 0, 1]);
            data.extend_from_slice(nal);
        }
        data.extend_from_slice(&[0; 40]);
        data
    }

    fn idr_slice() -> Vec<u8> {
        let mut nal = vec![0x65];
        nal.extend_from_slice(&[0xAA; 64]);
        nal
    }

    #[test]
    fn test_裸流_参数集解析() {
        let data = annexb(&[sps_nal(Some((1, 50))), pps_nal(0), idr_slice(), idr_slice()]);
        let mut file = MediaFile::from_bytes("clip.h264", data).unwrap();
        assert_eq!(file.container(), Container::H264Es);

        let status = file.parse().unwrap();
        assert_eq!(status, ParseStatus::Success);
        assert_eq!(file.track_count(TrackKind::Video), 1);

        let track = &file.video_tracks()[0];
        assert_eq!(track.parameter_sets.sps_ids(), vec![0]);
        assert_eq!(track.parameter_sets.pps_ids(), vec![0]);
        assert_eq!(track.map.codec_profile, CodecProfile::H264ConstrainedBaseline);
        let info = track.map.video.unwrap();
        assert_eq!((info.width, info.height), (320, 240));
        assert_eq!(info.frame_rate, 25.0);
        assert_eq!(track.map.frame_count_idr, 2);
    }

    #[test]
    fn test_悬空_pps_降低状态() {
        // PPS 引用不存在的 SPS 3
        let data = annexb(&[sps_nal(None), pps_nal(3), idr_slice()]);
        let mut file = MediaFile::from_bytes("clip.264", data).unwrap();
        let status = file.parse().unwrap();
        assert_eq!(status, ParseStatus::Failure);
        let track = &file.video_tracks()[0];
        assert_eq!(track.parameter_sets.sps_count(), 1);
        assert_eq!(track.parameter_sets.pps_count(), 0);
        // 采样索引不受影响
        assert_eq!(track.map.sample_count(), 3);
    }

    #[test]
    fn test_关闭参数集解析() {
        let data = annexb(&[sps_nal(None), pps_nal(0), idr_slice()]);
        let options = ParseOptions {
            decode_parameter_sets: false,
            ..ParseOptions::default()
        };
        let mut file = MediaFile::from_bytes("clip.h264", data)
            .unwrap()
            .with_options(options);
        file.parse().unwrap();
        assert!(file.video_tracks()[0].parameter_sets.is_empty());
    }

    #[test]
    fn test_mp4_avcc_参数集与读取采样() {
        let mut file = MediaFile::from_bytes("movie.mp4", mp4::tests::build_mp4()).unwrap();
        // avcC 中的 SPS 被截断, 参数集失败但轨道保留
        let status = file.parse().unwrap();
        assert_eq!(status, ParseStatus::Failure);
        assert_eq!(file.track_count(TrackKind::Video), 1);
        assert_eq!(file.track_count(TrackKind::Audio), 1);
        assert_eq!(file.metadata().chapters.len(), 2);

        let sample = file.read_sample(TrackKind::Video, 0, 1).unwrap();
        assert_eq!(sample.offset, 132);
        assert_eq!(sample.data.len(), 50);
        assert!(sample.data.iter().all(|&b| b == 0x11));
    }

    #[test]
    fn test_wav_avi_mp3_按类别分配() {
        let mut wav_file =
            MediaFile::from_bytes("tone.wav", wav::tests::build_wav(2, 8000, 16, 5000)).unwrap();
        wav_file.parse().unwrap();
        assert_eq!(wav_file.track_count(TrackKind::Audio), 1);
        assert_eq!(wav_file.track_count(TrackKind::Video), 0);

        let mut avi_file =
            MediaFile::from_bytes("clip.avi", avi::tests::build_avi(true, false)).unwrap();
        avi_file.parse().unwrap();
        assert_eq!(avi_file.track_count(TrackKind::Video), 1);
        assert_eq!(avi_file.track_count(TrackKind::Audio), 1);

        let mut data = Vec::new();
        for _ in 0..4 {
            data.extend(mp3::tests::build_frame(9, 0, false));
        }
        let mut mp3_file = MediaFile::from_bytes("song.mp3", data).unwrap();
        mp3_file.parse().unwrap();
        assert_eq!(mp3_file.audio_tracks()[0].sample_count(), 4);
    }

    #[test]
    fn test_无法识别与未注册容器() {
        let mut file = MediaFile::from_bytes("blob.bin", vec![0x12; 64]).unwrap();
        assert!(matches!(file.parse(), Err(VidError::FormatNotFound(_))));

        let mut mkv = vec![0x1A, 0x45, 0xDF, 0xA3];
        mkv.resize(64, 0);
        let mut file = MediaFile::from_bytes("movie.mkv", mkv).unwrap();
        assert_eq!(file.container(), Container::Mkv);
        assert!(matches!(file.parse(), Err(VidError::FormatNotFound(_))));
    }

    #[test]
    fn test_查询越界() {
        let data = annexb(&[sps_nal(None), pps_nal(0), idr_slice()]);
        let mut file = MediaFile::from_bytes("clip.h264", data).unwrap();
        file.parse().unwrap();
        assert!(matches!(
            file.read_sample(TrackKind::Audio, 0, 0),
            Err(VidError::StreamNotFound(0))
        ));
        assert!(matches!(
            file.read_sample(TrackKind::Video, 0, 99),
            Err(VidError::InvalidArgument(_))
        ));
        let size = file.file_size();
        assert!(matches!(
            file.read_range(size - 4, 8),
            Err(VidError::InvalidArgument(_))
        ));
        assert!(matches!(
            file.filter_video_track(1, 4, FilterMode::Ordered, &SampleFilterConfig::default()),
            Err(VidError::StreamNotFound(1))
        ));
    }

    #[test]
    fn test_路径与文件名截断() {
        let name = format!("{}.h264", "视".repeat(100));
        let file = MediaFile::from_bytes(&name, annexb(&[idr_slice()])).unwrap();
        assert!(file.file_name().len() <= MAX_NAME_BYTES);
        assert!(file.file_name().starts_with('视'));
        assert_eq!(file.path(), name);
        // 扩展名来自原始路径
        assert_eq!(file.container_guess().by_extension, Container::H264Es);

        assert_eq!(truncate_utf8("ab视", 4, "测试"), "ab");
    }

    #[test]
    fn test_每类轨道上限() {
        let mut file = MediaFile::from_bytes("tone.wav", wav::tests::build_wav(1, 8000, 8, 100))
            .unwrap();
        for i in 0..MAX_TRACKS_PER_KIND {
            let mut map = BitstreamMap::new(StreamType::Audio, 0, 0).unwrap();
            map.track_id = i as u32;
            assert_eq!(file.add_track(map).unwrap(), ParseStatus::Success);
        }
        let extra = BitstreamMap::new(StreamType::Audio, 0, 0).unwrap();
        assert_eq!(file.add_track(extra).unwrap(), ParseStatus::Unsupported);
        assert_eq!(file.track_count(TrackKind::Audio), MAX_TRACKS_PER_KIND);
    }
}
