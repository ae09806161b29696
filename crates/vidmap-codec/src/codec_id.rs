//! 编解码器标识符与规格.
//!
//! 为每种编码算法分配唯一标识, 与容器格式无关. 各容器的 fourcc / 格式标签
//! 在对应解封装器中映射到这里.

use std::fmt;

use vidmap_core::StreamType;

/// 编解码器标识符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum CodecId {
    /// 未知编解码器
    #[default]
    None,

    // ========================
    // 视频编解码器
    // ========================
    /// H.264 / AVC / MPEG-4 Part 10
    H264,
    /// H.265 / HEVC
    H265,
    /// MPEG-1 Video
    Mpeg1Video,
    /// MPEG-2 Video
    Mpeg2Video,
    /// MPEG-4 Part 2 (ASP)
    Mpeg4,
    /// VP8
    Vp8,
    /// VP9
    Vp9,
    /// AV1
    Av1,
    /// Motion JPEG
    Mjpeg,
    /// Raw 视频 (未压缩)
    RawVideo,

    // ========================
    // 音频编解码器
    // ========================
    /// AAC
    Aac,
    /// MP3 (MPEG Audio Layer III)
    Mp3,
    /// MP2 (MPEG Audio Layer II)
    Mp2,
    /// MP1 (MPEG Audio Layer I)
    Mp1,
    /// AC-3
    Ac3,
    /// E-AC-3
    Eac3,
    /// DTS
    Dts,
    /// FLAC
    Flac,
    /// Opus
    Opus,
    /// Vorbis
    Vorbis,
    /// Apple Lossless
    Alac,
    /// PCM 无符号 8 位
    PcmU8,
    /// PCM 有符号 16 位小端
    PcmS16le,
    /// PCM 有符号 16 位大端
    PcmS16be,
    /// PCM 有符号 24 位小端
    PcmS24le,
    /// PCM 有符号 32 位小端
    PcmS32le,
    /// PCM 32 位浮点小端
    PcmF32le,
    /// PCM 64 位浮点小端
    PcmF64le,
    /// G.711 A-law
    PcmAlaw,
    /// G.711 μ-law
    PcmMulaw,
    /// IMA ADPCM
    AdpcmIma,
    /// Microsoft ADPCM
    AdpcmMs,

    // ========================
    // 文本编解码器
    // ========================
    /// 3GPP Timed Text (tx3g)
    MovText,
    /// SubRip
    Srt,
}

impl CodecId {
    /// 获取编解码器对应的流类型
    pub const fn stream_type(&self) -> StreamType {
        match self {
            Self::None => StreamType::Unknown,

            Self::H264
            | Self::H265
            | Self::Mpeg1Video
            | Self::Mpeg2Video
            | Self::Mpeg4
            | Self::Vp8
            | Self::Vp9
            | Self::Av1
            | Self::Mjpeg
            | Self::RawVideo => StreamType::Video,

            Self::Aac
            | Self::Mp3
            | Self::Mp2
            | Self::Mp1
            | Self::Ac3
            | Self::Eac3
            | Self::Dts
            | Self::Flac
            | Self::Opus
            | Self::Vorbis
            | Self::Alac
            | Self::PcmU8
            | Self::PcmS16le
            | Self::PcmS16be
            | Self::PcmS24le
            | Self::PcmS32le
            | Self::PcmF32le
            | Self::PcmF64le
            | Self::PcmAlaw
            | Self::PcmMulaw
            | Self::AdpcmIma
            | Self::AdpcmMs => StreamType::Audio,

            Self::MovText | Self::Srt => StreamType::Text,
        }
    }

    /// 获取编解码器的可读名称
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::H264 => "h264",
            Self::H265 => "hevc",
            Self::Mpeg1Video => "mpeg1video",
            Self::Mpeg2Video => "mpeg2video",
            Self::Mpeg4 => "mpeg4",
            Self::Vp8 => "vp8",
            Self::Vp9 => "vp9",
            Self::Av1 => "av1",
            Self::Mjpeg => "mjpeg",
            Self::RawVideo => "rawvideo",
            Self::Aac => "aac",
            Self::Mp3 => "mp3",
            Self::Mp2 => "mp2",
            Self::Mp1 => "mp1",
            Self::Ac3 => "ac3",
            Self::Eac3 => "eac3",
            Self::Dts => "dts",
            Self::Flac => "flac",
            Self::Opus => "opus",
            Self::Vorbis => "vorbis",
            Self::Alac => "alac",
            Self::PcmU8 => "pcm_u8",
            Self::PcmS16le => "pcm_s16le",
            Self::PcmS16be => "pcm_s16be",
            Self::PcmS24le => "pcm_s24le",
            Self::PcmS32le => "pcm_s32le",
            Self::PcmF32le => "pcm_f32le",
            Self::PcmF64le => "pcm_f64le",
            Self::PcmAlaw => "pcm_alaw",
            Self::PcmMulaw => "pcm_mulaw",
            Self::AdpcmIma => "adpcm_ima_wav",
            Self::AdpcmMs => "adpcm_ms",
            Self::MovText => "mov_text",
            Self::Srt => "srt",
        }
    }

    /// 从 WAVEFORMATEX 的 `wFormatTag` 映射 (WAV 与 AVI 共用)
    ///
    /// PCM 需要结合位深区分具体格式.
    pub fn from_wave_format_tag(format_tag: u16, bits_per_sample: u16) -> Self {
        match format_tag {
            0x0001 => match bits_per_sample {
                8 => Self::PcmU8,
                16 => Self::PcmS16le,
                24 => Self::PcmS24le,
                32 => Self::PcmS32le,
                _ => Self::None,
            },
            0x0002 => Self::AdpcmMs,
            0x0003 => match bits_per_sample {
                64 => Self::PcmF64le,
                _ => Self::PcmF32le,
            },
            0x0006 => Self::PcmAlaw,
            0x0007 => Self::PcmMulaw,
            0x0011 => Self::AdpcmIma,
            0x0050 => Self::Mp2,
            0x0055 => Self::Mp3,
            0x00FF | 0x1610 => Self::Aac,
            0x2000 => Self::Ac3,
            0x2001 => Self::Dts,
            0xF1AC => Self::Flac,
            _ => Self::None,
        }
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 编解码器规格 (profile)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CodecProfile {
    /// 未知或不适用
    #[default]
    Unknown,
    /// H.264 Constrained Baseline
    H264ConstrainedBaseline,
    /// H.264 Baseline (66)
    H264Baseline,
    /// H.264 Main (77)
    H264Main,
    /// H.264 Extended (88)
    H264Extended,
    /// H.264 High (100)
    H264High,
    /// H.264 High 10 (110)
    H264High10,
    /// H.264 High 4:2:2 (122)
    H264High422,
    /// H.264 High 4:4:4 Predictive (244)
    H264High444,
    /// 其他 H.264 profile_idc
    H264Other(u8),
    /// MPEG-2 Main
    Mpeg2Main,
    /// AAC LC
    AacLc,
}

impl CodecProfile {
    /// 从 H.264 的 profile_idc 与 constraint_set 标志推导
    ///
    /// `constraint_set_flags` 按码流顺序排列, constraint_set1_flag 位于 bit 6.
    pub fn from_h264_profile_idc(profile_idc: u8, constraint_set_flags: u8) -> Self {
        match profile_idc {
            66 if constraint_set_flags & 0x40 != 0 => Self::H264ConstrainedBaseline,
            66 => Self::H264Baseline,
            77 => Self::H264Main,
            88 => Self::H264Extended,
            100 => Self::H264High,
            110 => Self::H264High10,
            122 => Self::H264High422,
            244 => Self::H264High444,
            other => Self::H264Other(other),
        }
    }
}

impl fmt::Display for CodecProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::H264ConstrainedBaseline => write!(f, "Constrained Baseline"),
            Self::H264Baseline => write!(f, "Baseline"),
            Self::H264Main => write!(f, "Main"),
            Self::H264Extended => write!(f, "Extended"),
            Self::H264High => write!(f, "High"),
            Self::H264High10 => write!(f, "High 10"),
            Self::H264High422 => write!(f, "High 4:2:2"),
            Self::H264High444 => write!(f, "High 4:4:4 Predictive"),
            Self::H264Other(idc) => write!(f, "profile_idc={idc}"),
            Self::Mpeg2Main => write!(f, "MPEG-2 Main"),
            Self::AacLc => write!(f, "AAC LC"),
        }
    }
}
