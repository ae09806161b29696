//! Exp-Golomb 变长码与 RBSP 辅助读取.
//!
//! H.264 语法中的 `ue(v)`, `se(v)`, `te(v)` 以及 `more_rbsp_data()`,
//! `rbsp_trailing_bits()` 均以 [`BitReader`] 的方法形式提供.

use crate::bitreader::BitReader;
use crate::{VidError, VidResult};

/// 前导零个数上限, 超过即视为损坏的码流
const MAX_LEADING_ZEROS: u32 = 31;

impl BitReader<'_> {
    /// 读取无符号 Exp-Golomb 编码 `ue(v)`
    ///
    /// 计数前导零 `k`, 再读 `k` 位后缀 `s`, 值为 `2^k - 1 + s`.
    pub fn read_ue(&mut self) -> VidResult<u32> {
        let mut leading_zeros = 0u32;
        while self.read_bit()? == 0 {
            leading_zeros += 1;
            if leading_zeros > MAX_LEADING_ZEROS {
                return Err(VidError::InvalidData(format!(
                    "Exp-Golomb 前导零过多: {}",
                    leading_zeros
                )));
            }
        }
        if leading_zeros == 0 {
            return Ok(0);
        }
        let suffix = self.read_bits(leading_zeros)?;
        Ok(((1u32 << leading_zeros) - 1) + suffix)
    }

    /// 读取有符号 Exp-Golomb 编码 `se(v)`
    ///
    /// codeNum 0,1,2,3,4 映射为 0,1,-1,2,-2.
    pub fn read_se(&mut self) -> VidResult<i32> {
        let code = self.read_ue()?;
        let magnitude = code.div_ceil(2) as i32;
        if code & 1 == 1 {
            Ok(magnitude)
        } else {
            Ok(-magnitude)
        }
    }

    /// 读取截断 Exp-Golomb 编码 `te(v)`
    ///
    /// `range == 1` 时读取 1 个取反位, 否则等同 `ue(v)`.
    pub fn read_te(&mut self, range: u32) -> VidResult<u32> {
        match range {
            0 => Err(VidError::InvalidArgument("te(v) 的取值范围不能为 0".into())),
            1 => Ok(1 - self.read_bit()?),
            _ => self.read_ue(),
        }
    }

    /// 是否还有 RBSP 数据 (不计尾部停止位与填充零)
    pub fn more_rbsp_data(&self) -> bool {
        let data = self.data();
        let Some(last_idx) = data.iter().rposition(|&b| b != 0) else {
            return false;
        };
        let stop_bit_pos = last_idx * 8 + 7 - data[last_idx].trailing_zeros() as usize;
        self.bits_read() < stop_bit_pos
    }

    /// 读取 `rbsp_trailing_bits()`: 停止位 1, 随后以 0 填充至字节边界
    pub fn rbsp_trailing_bits(&mut self) -> VidResult<()> {
        match self.read_bit() {
            Ok(1) => {}
            Ok(_) | Err(VidError::Eof) => {
                return Err(VidError::InvalidData("缺少 rbsp_stop_one_bit".into()));
            }
            Err(e) => return Err(e),
        }
        while !self.is_byte_aligned() {
            if self.read_bit()? != 0 {
                return Err(VidError::InvalidData("rbsp 对齐位不为 0".into()));
            }
        }
        Ok(())
    }
}
