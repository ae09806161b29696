//! 容器探测.
//!
//! 通过文件头部签名与扩展名两条线索识别容器族.
//! 签名结果优先, 仅当签名无法识别时才回退到扩展名.
//!
//! 签名表按固定顺序逐条检查, 首个命中者生效. MP4 (`ftyp` 位于 4..8) 与
//! 裸基本流 (`00 00 00 01 67`) 的前导字节存在重叠, 顺序不可调整.

use std::path::Path;

use crate::container::{Container, normalize_extension};

/// 签名探测读取的文件头长度
pub const PROBE_HEAD_SIZE: usize = 16;

/// 探测结果
///
/// 同时保留签名与扩展名两个原始猜测, 供不一致诊断使用.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContainerGuess {
    /// 最终采用的容器
    pub container: Container,
    /// 签名探测结果
    pub by_signature: Container,
    /// 扩展名探测结果
    pub by_extension: Container,
}

impl ContainerGuess {
    /// 两个猜测均已识别且不一致
    pub fn is_mismatch(&self) -> bool {
        self.by_signature.is_known()
            && self.by_extension.is_known()
            && self.by_signature != self.by_extension
    }
}

/// 单条签名规则
type SignatureCheck = fn(&[u8]) -> bool;

/// 签名表 (顺序即优先级)
const SIGNATURE_TABLE: &[(Container, SignatureCheck)] = &[
    (Container::MpegTs, |h| h.first() == Some(&0x47)),
    (Container::Mkv, |h| h.starts_with(&[0x1A, 0x45, 0xDF, 0xA3])),
    (Container::Avi, |h| is_riff(h, b"AVI ")),
    (Container::Wave, |h| is_riff(h, b"WAVE")),
    (Container::MpegPs, |h| {
        h.starts_with(&[0x00, 0x00, 0x01, 0xBA]) || h.starts_with(&[0x00, 0x00, 0x00, 0x01, 0xBA])
    }),
    (Container::MpegEs, |h| start_code_then(h, 0xB3)),
    (Container::H264Es, |h| start_code_then(h, 0x67)),
    (Container::Mp4, |h| h.get(4..8) == Some(b"ftyp".as_slice())),
    (Container::Ogg, |h| h.starts_with(b"OggS")),
    (Container::Flac, |h| h.starts_with(b"fLaC")),
    (Container::Mxf, |h| h.starts_with(&[0x06, 0x0E, 0x2B, 0x34])),
    (Container::Flv, |h| h.starts_with(&[b'F', b'L', b'V', 0x01])),
    (Container::Mp3Es, |h| h.starts_with(&[0xFF, 0xFB])),
    // 以下为追加规则, 不抢占上面的顺序
    (Container::Asf, |h| {
        h.starts_with(&[0x30, 0x26, 0xB2, 0x75, 0x8E, 0x66, 0xCF, 0x11])
    }),
    (Container::Mp3Es, |h| h.starts_with(b"ID3")),
    (Container::Rm, |h| h.starts_with(b".RMF")),
];

fn is_riff(head: &[u8], subtype: &[u8; 4]) -> bool {
    head.starts_with(b"RIFF") && head.get(8..12) == Some(subtype.as_slice())
}

/// 3 字节或 4 字节起始码后紧跟指定字节
fn start_code_then(head: &[u8], code: u8) -> bool {
    head.starts_with(&[0x00, 0x00, 0x01, code]) || head.starts_with(&[0x00, 0x00, 0x00, 0x01, code])
}

/// 仅根据文件头签名识别
pub fn sniff_signature(head: &[u8]) -> Container {
    SIGNATURE_TABLE
        .iter()
        .find(|(_, check)| check(head))
        .map(|(c, _)| *c)
        .unwrap_or(Container::Unknown)
}

/// 综合签名与扩展名识别容器
///
/// `head` 为文件开头的若干字节 (通常 16 字节), `extension` 可带前导 `.`,
/// 大小写不敏感.
pub fn classify(head: &[u8], extension: &str) -> ContainerGuess {
    let by_signature = sniff_signature(head);
    let by_extension = Container::from_extension(extension);
    let container = if by_signature.is_known() {
        by_signature
    } else {
        by_extension
    };
    ContainerGuess {
        container,
        by_signature,
        by_extension,
    }
}

/// 提取路径的归一化扩展名 (无扩展名时为空串)
pub fn extension_of(path: &str) -> String {
    Path::new(path)
        .extension()
        .map(|e| normalize_extension(&e.to_string_lossy()))
        .unwrap_or_default()
}
