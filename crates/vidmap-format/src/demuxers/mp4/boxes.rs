//! MP4 Box (Atom) 头部解析.
//!
//! ISO 14496-12 定义的 Box 结构:
//! ```text
//! Size:       4 bytes (big-endian, 含头部本身)
//! Type:       4 bytes (FourCC)
//! [ExtSize]:  8 bytes (仅当 Size==1 时存在, 64-bit 大小)
//! ```
//!
//! 特殊大小值:
//! - 0: Box 延伸到父容器 (或文件) 末尾
//! - 1: 使用 64-bit 扩展大小

use vidmap_core::{VidError, VidResult};

use crate::io::IoContext;

/// Box 类型 (本解封装器关心的 FourCC)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxType {
    Ftyp,
    Moov,
    Mvhd,
    Trak,
    Tkhd,
    Mdia,
    Mdhd,
    Hdlr,
    Minf,
    Stbl,
    Stsd,
    Stts,
    Stsc,
    Stsz,
    Stco,
    Co64,
    Stss,
    Ctts,
    /// 用户数据
    Udta,
    /// Nero 章节
    Chpl,
    Mdat,
    Unknown([u8; 4]),
}

impl BoxType {
    /// 从 4 字节 FourCC 创建
    pub fn from_fourcc(fourcc: &[u8; 4]) -> Self {
        match fourcc {
            b"ftyp" => Self::Ftyp,
            b"moov" => Self::Moov,
            b"mvhd" => Self::Mvhd,
            b"trak" => Self::Trak,
            b"tkhd" => Self::Tkhd,
            b"mdia" => Self::Mdia,
            b"mdhd" => Self::Mdhd,
            b"hdlr" => Self::Hdlr,
            b"minf" => Self::Minf,
            b"stbl" => Self::Stbl,
            b"stsd" => Self::Stsd,
            b"stts" => Self::Stts,
            b"stsc" => Self::Stsc,
            b"stsz" => Self::Stsz,
            b"stco" => Self::Stco,
            b"co64" => Self::Co64,
            b"stss" => Self::Stss,
            b"ctts" => Self::Ctts,
            b"udta" => Self::Udta,
            b"chpl" => Self::Chpl,
            b"mdat" => Self::Mdat,
            _ => Self::Unknown(*fourcc),
        }
    }
}

impl std::fmt::Display for BoxType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown(cc) => write!(f, "{}", String::from_utf8_lossy(cc)),
            _ => write!(f, "{self:?}"),
        }
    }
}

/// 已解析的 Box 头部
#[derive(Debug, Clone, Copy)]
pub struct BoxHeader {
    pub box_type: BoxType,
    /// 内容起始偏移
    pub content_start: u64,
    /// Box 末尾偏移 (size 为 0 时取父容器末尾)
    pub end: u64,
}

impl BoxHeader {
    /// 内容区域大小
    pub fn content_size(&self) -> u64 {
        self.end - self.content_start
    }
}

/// 读取一个 Box 头部, `parent_end` 为父容器末尾
///
/// 声明的大小小于头部或越出父容器时返回 `InvalidData`.
pub fn read_box_header(io: &mut IoContext, parent_end: u64) -> VidResult<BoxHeader> {
    let start = io.position()?;
    let size32 = io.read_u32_be()?;
    let fourcc = io.read_tag()?;
    let box_type = BoxType::from_fourcc(&fourcc);

    let (size, header_size) = match size32 {
        0 => (parent_end.saturating_sub(start), 8u64),
        1 => (io.read_u64_be()?, 16u64),
        n => (u64::from(n), 8u64),
    };

    let end = start
        .checked_add(size)
        .filter(|&end| size >= header_size && end <= parent_end);
    let Some(end) = end else {
        return Err(VidError::InvalidData(format!(
            "box '{box_type}' 大小无效: offset={start}, size={size}, parent_end={parent_end}"
        )));
    };

    Ok(BoxHeader {
        box_type,
        content_start: start + header_size,
        end,
    })
}

/// 读取 FullBox 的 version 与 flags
pub fn read_full_box_header(io: &mut IoContext) -> VidResult<(u8, u32)> {
    let version = io.read_u8()?;
    let flags = io.read_u24_be()?;
    Ok((version, flags))
}

/// ftyp Box 数据
pub struct FtypBox {
    pub major_brand: [u8; 4],
    pub compatible_brands: Vec<[u8; 4]>,
}

impl FtypBox {
    /// 解析 ftyp box 内容
    pub fn parse(io: &mut IoContext, content_size: u64) -> VidResult<Self> {
        let major_brand = io.read_tag()?;
        let _minor_version = io.read_u32_be()?;

        let brand_count = (content_size.saturating_sub(8) / 4) as usize;
        let mut compatible_brands = Vec::with_capacity(brand_count.min(64));
        for _ in 0..brand_count {
            compatible_brands.push(io.read_tag()?);
        }

        Ok(Self {
            major_brand,
            compatible_brands,
        })
    }

    /// 主品牌字符串
    pub fn major_brand_str(&self) -> String {
        String::from_utf8_lossy(&self.major_brand).to_string()
    }
}
