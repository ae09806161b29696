//! 比特流读取器.
//!
//! 提供从字节缓冲区中按位读取数据的能力, 是 H.264 参数集解析的基础设施.
//!
//! 按大端位序读取 (MSB first). 读取越过缓冲区末尾时返回 [`VidError::Eof`],
//! 由调用方检查, 不会越界访问.
//!
//! NAL 载荷中的防竞争字节 (`00 00 03` 中的 `03`) 可在构造时透明移除,
//! 同时保留移除位置, 使 [`BitReader::absolute_byte_offset`] 始终指向原始文件中的字节.

use std::borrow::Cow;

use crate::{VidError, VidResult};

/// 比特流读取器
///
/// # 示例
/// ```
/// use vidmap_core::bitreader::BitReader;
///
/// let data = [0b10110001, 0b01010101];
/// let mut br = BitReader::new(&data);
/// assert_eq!(br.read_bits(4).unwrap(), 0b1011);
/// assert_eq!(br.read_bits(4).unwrap(), 0b0001);
/// assert_eq!(br.read_bits(8).unwrap(), 0b01010101);
/// ```
pub struct BitReader<'a> {
    /// 源数据 (去转义后)
    data: Cow<'a, [u8]>,
    /// 当前字节索引
    byte_pos: usize,
    /// 当前字节中的位位置 (0-7, 0 表示最高位)
    bit_pos: u8,
    /// 数据首字节在文件中的绝对偏移
    base_offset: u64,
    /// 被移除的防竞争字节位置 (以去转义后的索引表示, 升序)
    removed: Vec<usize>,
}

impl<'a> BitReader<'a> {
    /// 创建新的比特流读取器 (不做去转义)
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_base_offset(data, 0)
    }

    /// 创建读取器, 并指定数据首字节在文件中的绝对偏移
    pub fn with_base_offset(data: &'a [u8], base_offset: u64) -> Self {
        Self {
            data: Cow::Borrowed(data),
            byte_pos: 0,
            bit_pos: 0,
            base_offset,
            removed: Vec::new(),
        }
    }

    /// 从 NAL 载荷创建读取器, 透明移除防竞争字节
    ///
    /// `00 00 03` 读作 `00 00`. 仅在确实存在防竞争字节时才复制数据.
    pub fn from_nal_payload(data: &'a [u8], base_offset: u64) -> Self {
        if !has_emulation_prevention(data) {
            return Self::with_base_offset(data, base_offset);
        }

        let mut out = Vec::with_capacity(data.len());
        let mut removed = Vec::new();
        let mut zeros = 0usize;
        for &byte in data {
            if zeros >= 2 && byte == 0x03 {
                removed.push(out.len());
                zeros = 0;
                continue;
            }
            out.push(byte);
            zeros = if byte == 0 { zeros + 1 } else { 0 };
        }

        Self {
            data: Cow::Owned(out),
            byte_pos: 0,
            bit_pos: 0,
            base_offset,
            removed,
        }
    }

    /// 获取已读取的总位数
    pub fn bits_read(&self) -> usize {
        self.byte_pos * 8 + self.bit_pos as usize
    }

    /// 获取剩余可读位数
    pub fn bits_left(&self) -> usize {
        if self.byte_pos >= self.data.len() {
            return 0;
        }
        (self.data.len() - self.byte_pos) * 8 - self.bit_pos as usize
    }

    /// 是否已到达末尾
    pub fn is_eof(&self) -> bool {
        self.bits_left() == 0
    }

    /// 是否处于字节边界
    pub fn is_byte_aligned(&self) -> bool {
        self.bit_pos == 0
    }

    /// 读取 1 个位
    pub fn read_bit(&mut self) -> VidResult<u32> {
        if self.byte_pos >= self.data.len() {
            return Err(VidError::Eof);
        }

        let bit = (self.data[self.byte_pos] >> (7 - self.bit_pos)) & 1;
        self.bit_pos += 1;
        if self.bit_pos >= 8 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }

        Ok(u32::from(bit))
    }

    /// 读取 1 个位作为标志
    pub fn read_flag(&mut self) -> VidResult<bool> {
        Ok(self.read_bit()? == 1)
    }

    /// 读取 N 个位 (0 ≤ N ≤ 32)
    ///
    /// 按大端位序读取, 返回值的低 N 位有效. 剩余位数不足时返回 [`VidError::Eof`]
    /// 且不移动读取位置.
    pub fn read_bits(&mut self, n: u32) -> VidResult<u32> {
        if n == 0 {
            return Ok(0);
        }
        if n > 32 {
            return Err(VidError::InvalidArgument(format!(
                "read_bits: n={} 超过 32 位",
                n,
            )));
        }
        if (n as usize) > self.bits_left() {
            return Err(VidError::Eof);
        }

        let mut result: u32 = 0;
        let mut remaining = n;

        while remaining > 0 {
            let available = 8 - self.bit_pos as u32;
            let to_read = remaining.min(available);

            // 从当前字节中提取位
            let shift = available - to_read;
            let mask = ((1u32 << to_read) - 1) as u8;
            let bits = (self.data[self.byte_pos] >> shift) & mask;

            result = (result << to_read) | u32::from(bits);

            self.bit_pos += to_read as u8;
            if self.bit_pos >= 8 {
                self.bit_pos = 0;
                self.byte_pos += 1;
            }
            remaining -= to_read;
        }

        Ok(result)
    }

    /// 读取 N 个位 (最多 64 位)
    pub fn read_bits_u64(&mut self, n: u32) -> VidResult<u64> {
        if n <= 32 {
            return self.read_bits(n).map(u64::from);
        }
        if n > 64 {
            return Err(VidError::InvalidArgument(format!(
                "read_bits_u64: n={} 超过 64 位",
                n,
            )));
        }

        let high_bits = n - 32;
        let high = u64::from(self.read_bits(high_bits)?);
        let low = u64::from(self.read_bits(32)?);
        Ok((high << 32) | low)
    }

    /// 窥视 N 个位 (不移动位置)
    pub fn peek_bits(&mut self, n: u32) -> VidResult<u32> {
        let saved_byte = self.byte_pos;
        let saved_bit = self.bit_pos;
        let result = self.read_bits(n);
        self.byte_pos = saved_byte;
        self.bit_pos = saved_bit;
        result
    }

    /// 跳过 N 个位
    pub fn skip_bits(&mut self, n: u32) -> VidResult<()> {
        if (n as usize) > self.bits_left() {
            return Err(VidError::Eof);
        }

        let total_bits = self.bit_pos as u32 + n;
        self.byte_pos += (total_bits / 8) as usize;
        self.bit_pos = (total_bits % 8) as u8;

        Ok(())
    }

    /// 前进到下一个字节边界
    ///
    /// 如果当前已在字节边界, 则不做任何事.
    pub fn force_alignment(&mut self) {
        if self.bit_pos > 0 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }
    }

    /// 获取当前字节位置 (相对于去转义后的数据)
    pub fn byte_position(&self) -> usize {
        self.byte_pos
    }

    /// 获取当前字节在原始文件中的绝对偏移
    ///
    /// 计入了读取位置之前被移除的防竞争字节.
    pub fn absolute_byte_offset(&self) -> u64 {
        let escapes = self.removed.partition_point(|&p| p <= self.byte_pos);
        self.base_offset + (self.byte_pos + escapes) as u64
    }

    /// 被移除的防竞争字节数量
    pub fn escape_count(&self) -> usize {
        self.removed.len()
    }

    /// 从当前位置读取原始字节切片
    ///
    /// 仅在字节对齐时可用.
    pub fn read_bytes(&mut self, n: usize) -> VidResult<&[u8]> {
        if self.bit_pos != 0 {
            return Err(VidError::InvalidArgument("read_bytes 需要字节对齐".into()));
        }

        let end = self.byte_pos + n;
        if end > self.data.len() {
            return Err(VidError::Eof);
        }

        let start = self.byte_pos;
        self.byte_pos = end;
        Ok(&self.data[start..end])
    }

    /// 获取底层 (去转义后) 数据的引用
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// 数据中是否存在 `00 00 03` 防竞争序列
fn has_emulation_prevention(data: &[u8]) -> bool {
    data.windows(3).any(|w| w == [0x00, 0x00, 0x03])
}
