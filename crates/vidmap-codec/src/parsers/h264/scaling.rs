//! H.264 量化缩放矩阵.
//!
//! 码流中的缩放列表按 zigzag 顺序传输, 解析后立即逆扫描为二维矩阵.
//! 缺省列表按回退规则 A (取默认表) 或规则 B (继承 SPS 矩阵) 推导.

use vidmap_core::{BitReader, VidResult};

/// 4x4 矩阵
pub type Matrix4x4 = [[u8; 4]; 4];
/// 8x8 矩阵
pub type Matrix8x8 = [[u8; 8]; 8];

/// 平坦矩阵 (全部为 16)
pub const FLAT_4X4: Matrix4x4 = [[16; 4]; 4];
/// 平坦矩阵 (全部为 16)
pub const FLAT_8X8: Matrix8x8 = [[16; 8]; 8];

/// Default_4x4_Intra (光栅顺序)
pub const DEFAULT_4X4_INTRA: Matrix4x4 = [
    [6, 13, 20, 28],
    [13, 20, 28, 32],
    [20, 28, 32, 37],
    [28, 32, 37, 42],
];

/// Default_4x4_Inter (光栅顺序)
pub const DEFAULT_4X4_INTER: Matrix4x4 = [
    [10, 14, 20, 24],
    [14, 20, 24, 27],
    [20, 24, 27, 30],
    [24, 27, 30, 34],
];

/// Default_8x8_Intra (光栅顺序)
pub const DEFAULT_8X8_INTRA: Matrix8x8 = [
    [6, 10, 13, 16, 18, 23, 25, 27],
    [10, 11, 16, 18, 23, 25, 27, 29],
    [13, 16, 18, 23, 25, 27, 29, 31],
    [16, 18, 23, 25, 27, 29, 31, 33],
    [18, 23, 25, 27, 29, 31, 33, 36],
    [23, 25, 27, 29, 31, 33, 36, 38],
    [25, 27, 29, 31, 33, 36, 38, 40],
    [27, 29, 31, 33, 36, 38, 40, 42],
];

/// Default_8x8_Inter (光栅顺序)
pub const DEFAULT_8X8_INTER: Matrix8x8 = [
    [9, 13, 15, 17, 19, 21, 22, 24],
    [13, 13, 17, 19, 21, 22, 24, 25],
    [15, 17, 19, 21, 22, 24, 25, 27],
    [17, 19, 21, 22, 24, 25, 27, 28],
    [19, 21, 22, 24, 25, 27, 28, 30],
    [21, 22, 24, 25, 27, 28, 30, 32],
    [22, 24, 25, 27, 28, 30, 32, 33],
    [24, 25, 27, 28, 30, 32, 33, 35],
];

/// 4x4 帧扫描 zigzag: 第 k 个系数所在的光栅位置
const ZIGZAG_4X4: [usize; 16] = [0, 1, 4, 8, 5, 2, 3, 6, 9, 12, 13, 10, 7, 11, 14, 15];

/// 8x8 帧扫描 zigzag
const ZIGZAG_8X8: [usize; 64] = [
    0, 1, 8, 16, 9, 2, 3, 10, 17, 24, 32, 25, 18, 11, 4, 5, 12, 19, 26, 33, 40, 48, 41, 34, 27, 20,
    13, 6, 7, 14, 21, 28, 35, 42, 49, 56, 57, 50, 43, 36, 29, 22, 15, 23, 30, 37, 44, 51, 58, 59,
    52, 45, 38, 31, 39, 46, 53, 60, 61, 54, 47, 55, 62, 63,
];

/// 缺省列表的回退规则
#[derive(Debug, Clone, Copy)]
pub enum FallbackRule<'a> {
    /// 规则 A: 首个 intra/inter 列表回退到默认表
    A,
    /// 规则 B: 首个 intra/inter 列表继承 SPS 中的矩阵
    B(&'a ScalingMatrices),
}

/// 一组完整的缩放矩阵
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalingMatrices {
    /// 6 个 4x4 矩阵: Intra Y/Cb/Cr, Inter Y/Cb/Cr
    pub m4x4: [Matrix4x4; 6],
    /// 8x8 矩阵: 4:4:4 为 6 个, 否则 2 个 (Intra Y, Inter Y)
    pub m8x8: Vec<Matrix8x8>,
}

impl ScalingMatrices {
    /// 平坦矩阵 (未传输缩放矩阵时使用)
    pub fn flat(chroma_format_idc: u32) -> Self {
        Self {
            m4x4: [FLAT_4X4; 6],
            m8x8: vec![FLAT_8X8; count_8x8(chroma_format_idc)],
        }
    }

    /// 标准默认矩阵
    pub fn default_lists(chroma_format_idc: u32) -> Self {
        let m4x4 = std::array::from_fn(default_4x4);
        let m8x8 = (0..count_8x8(chroma_format_idc))
            .map(default_8x8)
            .collect();
        Self { m4x4, m8x8 }
    }
}

fn count_8x8(chroma_format_idc: u32) -> usize {
    if chroma_format_idc == 3 { 6 } else { 2 }
}

fn default_4x4(idx: usize) -> Matrix4x4 {
    if idx < 3 {
        DEFAULT_4X4_INTRA
    } else {
        DEFAULT_4X4_INTER
    }
}

fn default_8x8(idx: usize) -> Matrix8x8 {
    if idx % 2 == 0 {
        DEFAULT_8X8_INTRA
    } else {
        DEFAULT_8X8_INTER
    }
}

/// 读取一个 delta 编码的缩放列表 (zigzag 顺序)
///
/// 首个 `next_scale == 0` 表示使用默认列表, 此时返回 `None`.
pub fn parse_scaling_list(br: &mut BitReader, size: usize) -> VidResult<Option<Vec<u8>>> {
    let mut list = vec![0u8; size];
    let mut last_scale = 8i32;
    let mut next_scale = 8i32;
    for (idx, slot) in list.iter_mut().enumerate() {
        if next_scale != 0 {
            let delta_scale = br.read_se()?;
            let sum = i64::from(last_scale) + i64::from(delta_scale) + 256;
            next_scale = sum.rem_euclid(256) as i32;
            if idx == 0 && next_scale == 0 {
                return Ok(None);
            }
        }
        let cur_scale = if next_scale == 0 {
            last_scale
        } else {
            next_scale
        };
        *slot = cur_scale as u8;
        last_scale = cur_scale;
    }
    Ok(Some(list))
}

/// zigzag 列表逆扫描为 4x4 矩阵
pub fn inverse_scan_4x4(list: &[u8]) -> Matrix4x4 {
    let mut m = [[0u8; 4]; 4];
    for (k, &value) in list.iter().take(16).enumerate() {
        let pos = ZIGZAG_4X4[k];
        m[pos / 4][pos % 4] = value;
    }
    m
}

/// zigzag 列表逆扫描为 8x8 矩阵
pub fn inverse_scan_8x8(list: &[u8]) -> Matrix8x8 {
    let mut m = [[0u8; 8]; 8];
    for (k, &value) in list.iter().take(64).enumerate() {
        let pos = ZIGZAG_8X8[k];
        m[pos / 8][pos % 8] = value;
    }
    m
}

/// 读取 `list_count` 个带存在标志的缩放列表
///
/// 列表 0..6 为 4x4, 6.. 为 8x8. 未出现的列表按 `rule` 回退.
pub fn parse_scaling_matrices(
    br: &mut BitReader,
    list_count: usize,
    chroma_format_idc: u32,
    rule: FallbackRule<'_>,
) -> VidResult<ScalingMatrices> {
    let mut m = match rule {
        FallbackRule::A => ScalingMatrices::default_lists(chroma_format_idc),
        FallbackRule::B(base) => base.clone(),
    };
    let n8 = count_8x8(chroma_format_idc);
    m.m8x8.resize(n8, FLAT_8X8);

    for list_idx in 0..list_count {
        let present = br.read_flag()?;
        if list_idx < 6 {
            m.m4x4[list_idx] = if present {
                match parse_scaling_list(br, 16)? {
                    Some(list) => inverse_scan_4x4(&list),
                    None => default_4x4(list_idx),
                }
            } else if list_idx == 0 || list_idx == 3 {
                match rule {
                    FallbackRule::A => default_4x4(list_idx),
                    FallbackRule::B(base) => base.m4x4[list_idx],
                }
            } else {
                m.m4x4[list_idx - 1]
            };
            continue;
        }

        let idx8 = list_idx - 6;
        if idx8 >= n8 {
            break;
        }
        m.m8x8[idx8] = if present {
            match parse_scaling_list(br, 64)? {
                Some(list) => inverse_scan_8x8(&list),
                None => default_8x8(idx8),
            }
        } else if idx8 < 2 {
            match rule {
                FallbackRule::A => default_8x8(idx8),
                FallbackRule::B(base) => base.m8x8.get(idx8).copied().unwrap_or(FLAT_8X8),
            }
        } else {
            m.m8x8[idx8 - 2]
        };
    }
    Ok(m)
}
