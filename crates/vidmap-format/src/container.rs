//! 容器族标识符.
//!
//! 签名探测与扩展名探测都映射到同一个 [`Container`] 枚举.

use std::fmt;

/// 容器族标识符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum Container {
    /// 无法识别
    #[default]
    Unknown,

    // ========================
    // 通用容器
    // ========================
    /// MP4 / MOV / 3GP (ISO BMFF)
    Mp4,
    /// Audio Video Interleave
    Avi,
    /// Matroska / WebM
    Mkv,
    /// ASF / WMV / WMA
    Asf,
    /// MPEG Program Stream
    MpegPs,
    /// MPEG Transport Stream
    MpegTs,
    /// Ogg
    Ogg,
    /// Material eXchange Format
    Mxf,
    /// Flash Video
    Flv,
    /// RealMedia
    Rm,

    // ========================
    // 纯音频容器
    // ========================
    /// RIFF WAVE
    Wave,
    /// FLAC 原生容器
    Flac,

    // ========================
    // 裸基本流
    // ========================
    /// MPEG-1/2 视频基本流
    MpegEs,
    /// H.264 Annex-B 基本流
    H264Es,
    /// AAC (ADTS) 基本流
    AacEs,
    /// AC-3 基本流
    Ac3Es,
    /// MPEG 音频 (MP1/MP2/MP3) 基本流
    Mp3Es,
}

/// 扩展名 → 容器映射表
///
/// 扩展名互不重叠, 查表顺序无关.
const EXTENSION_TABLE: &[(Container, &[&str])] = &[
    (Container::Avi, &["avi", "divx"]),
    (Container::Mkv, &["mkv", "webm", "mka", "mks", "mk3d"]),
    (
        Container::Mp4,
        &[
            "mov", "mp4", "m4v", "m4a", "m4b", "m4p", "mj2", "mp4v", "3gp", "3gpp", "3g2", "qt",
            "f4v",
        ],
    ),
    (
        Container::MpegPs,
        &["ps", "vob", "evo", "m2p", "m2v", "mpg", "mpeg"],
    ),
    (Container::MpegTs, &["ts", "trp", "mts", "m2ts"]),
    (Container::Asf, &["asf", "wma", "wmv"]),
    (
        Container::Ogg,
        &["ogg", "ogv", "oga", "ogx", "ogm", "spx", "opus"],
    ),
    (Container::Mxf, &["mxf"]),
    (Container::Flv, &["flv"]),
    (Container::Flac, &["flac"]),
    (Container::Wave, &["wav", "wave", "amb"]),
    (Container::Rm, &["rm", "rmvb"]),
    (Container::H264Es, &["h264"]),
    (Container::AacEs, &["aac"]),
    (Container::Ac3Es, &["ac3"]),
    (Container::Mp3Es, &["mp1", "mp2", "mp3"]),
];

impl Container {
    /// 所有已知容器 (不含 `Unknown`)
    pub const ALL: &'static [Container] = &[
        Self::Mp4,
        Self::Avi,
        Self::Mkv,
        Self::Asf,
        Self::MpegPs,
        Self::MpegTs,
        Self::Ogg,
        Self::Mxf,
        Self::Flv,
        Self::Rm,
        Self::Wave,
        Self::Flac,
        Self::MpegEs,
        Self::H264Es,
        Self::AacEs,
        Self::Ac3Es,
        Self::Mp3Es,
    ];

    /// 获取容器的可读名称
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Mp4 => "mp4",
            Self::Avi => "avi",
            Self::Mkv => "matroska",
            Self::Asf => "asf",
            Self::MpegPs => "mpeg-ps",
            Self::MpegTs => "mpeg-ts",
            Self::Ogg => "ogg",
            Self::Mxf => "mxf",
            Self::Flv => "flv",
            Self::Rm => "rm",
            Self::Wave => "wav",
            Self::Flac => "flac",
            Self::MpegEs => "mpeg-es",
            Self::H264Es => "h264",
            Self::AacEs => "aac",
            Self::Ac3Es => "ac3",
            Self::Mp3Es => "mp3",
        }
    }

    /// 获取该容器对应的扩展名列表
    pub fn extensions(&self) -> &'static [&'static str] {
        EXTENSION_TABLE
            .iter()
            .find(|(c, _)| c == self)
            .map(|(_, exts)| *exts)
            .unwrap_or(&[])
    }

    /// 根据扩展名查找容器
    ///
    /// 扩展名先做归一化: 去除首尾空白与前导 `.`, 转小写.
    pub fn from_extension(ext: &str) -> Self {
        let ext = normalize_extension(ext);
        if ext.is_empty() {
            return Self::Unknown;
        }
        EXTENSION_TABLE
            .iter()
            .find(|(_, exts)| exts.contains(&ext.as_str()))
            .map(|(c, _)| *c)
            .unwrap_or(Self::Unknown)
    }

    /// 是否已识别
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// 是否为裸基本流
    pub fn is_elementary_stream(&self) -> bool {
        matches!(
            self,
            Self::MpegEs | Self::H264Es | Self::AacEs | Self::Ac3Es | Self::Mp3Es
        )
    }
}

/// 扩展名归一化
pub fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_扩展名查表() {
        assert_eq!(Container::from_extension("mp4"), Container::Mp4);
        assert_eq!(Container::from_extension(".MOV"), Container::Mp4);
        assert_eq!(Container::from_extension(" m4a "), Container::Mp4);
        assert_eq!(Container::from_extension("divx"), Container::Avi);
        assert_eq!(Container::from_extension("webm"), Container::Mkv);
        assert_eq!(Container::from_extension("m2ts"), Container::MpegTs);
        assert_eq!(Container::from_extension("m2v"), Container::MpegPs);
        assert_eq!(Container::from_extension("amb"), Container::Wave);
        assert_eq!(Container::from_extension("mp2"), Container::Mp3Es);
        assert_eq!(Container::from_extension("h264"), Container::H264Es);
        assert_eq!(Container::from_extension("xyz"), Container::Unknown);
        assert_eq!(Container::from_extension(""), Container::Unknown);
    }

    #[test]
    fn test_扩展名表互不重叠() {
        let mut seen = std::collections::HashSet::new();
        for (_, exts) in EXTENSION_TABLE {
            for ext in *exts {
                assert!(seen.insert(*ext), "扩展名重复: {ext}");
            }
        }
    }

    #[test]
    fn test_每个容器名称非空() {
        for c in Container::ALL {
            assert!(!c.name().is_empty());
            assert!(c.is_known());
        }
        assert_eq!(Container::MpegEs.extensions(), &[] as &[&str]);
        assert!(Container::Wave.extensions().contains(&"wav"));
    }
}
