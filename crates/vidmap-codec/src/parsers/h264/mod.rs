//! H.264/AVC 参数集解析器.
//!
//! - NAL 头部与类型识别, 载荷裁剪
//! - SPS / PPS 解析与语义校验
//! - VUI / HRD 解析与校验
//! - 缩放矩阵的 delta 解码与逆扫描
//!
//! 所有解析函数都是 [`BitReader`] 加上显式传入的 [`ParameterSets`] 的纯函数,
//! 不依赖任何全局状态.

pub mod nal;
pub mod param_sets;
pub mod pps;
pub mod scaling;
pub mod sps;
pub mod vui;

pub use nal::{NalHeader, NalUnitType, trim_nal_payload};
pub use param_sets::ParameterSets;
pub use pps::{Pps, check_pps, decode_pps, parse_pps};
pub use scaling::ScalingMatrices;
pub use sps::{Sps, check_sps, decode_sps, parse_sps};
pub use vui::{Hrd, HrdEntry, Vui, check_hrd, check_vui, parse_hrd, parse_vui};

use vidmap_core::{BitReader, VidError, VidResult};

/// 解析单个参数集 NAL 单元 (含头部字节, 不含起始码)
///
/// `base_offset` 为头部字节在文件中的绝对偏移. SPS(7) 与 PPS(8) 写入 `sets`,
/// 其他类型直接返回而不写入.
pub fn decode_parameter_set_nal(
    nal_bytes: &[u8],
    base_offset: u64,
    sets: &mut ParameterSets,
) -> VidResult<NalUnitType> {
    let Some((&header_byte, payload)) = nal_bytes.split_first() else {
        return Err(VidError::InvalidData("H.264: NAL 单元数据为空".into()));
    };
    let header = NalHeader::parse(header_byte)?;
    let payload = trim_nal_payload(payload);

    match header.nal_type {
        NalUnitType::Sps => {
            let mut br = BitReader::from_nal_payload(payload, base_offset + 1);
            decode_sps(&mut br, sets)?;
        }
        NalUnitType::Pps => {
            let mut br = BitReader::from_nal_payload(payload, base_offset + 1);
            decode_pps(&mut br, sets)?;
        }
        _ => {}
    }
    Ok(header.nal_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::h264::sps::tests::{SpsFields, build_sps_rbsp};
    use vidmap_core::bitwriter::escape_rbsp;
    use vidmap_core::BitWriter;

    fn pps_nal() -> Vec<u8> {
        let mut bw = BitWriter::new();
        bw.write_bits(0x68, 8);
        bw.write_ue(0);
        bw.write_ue(0);
        bw.write_flag(false);
        bw.write_flag(false);
        bw.write_ue(0);
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
        bw.finish()
    }

    #[test]
    fn test_参数集_nal_分派() {
        let mut sets = ParameterSets::new();
        let mut sps_nal = vec![0x67];
        sps_nal.extend(escape_rbsp(&build_sps_rbsp(&SpsFields::default())));

        assert_eq!(
            decode_parameter_set_nal(&sps_nal, 100, &mut sets).unwrap(),
            NalUnitType::Sps
        );
        assert_eq!(
            decode_parameter_set_nal(&pps_nal(), 200, &mut sets).unwrap(),
            NalUnitType::Pps
        );
        assert_eq!(sets.sps_ids(), vec![0]);
        assert_eq!(sets.pps_ids(), vec![0]);
    }

    #[test]
    fn test_参数集_nal_尾随下一起始码() {
        let mut sets = ParameterSets::new();
        let mut data = vec![0x67];
        data.extend(escape_rbsp(&build_sps_rbsp(&SpsFields::default())));
        data.extend([0x00, 0x00, 0x01, 0x65, 0x88]);
        decode_parameter_set_nal(&data, 0, &mut sets).unwrap();
        assert_eq!(sets.sps_count(), 1);
    }

    #[test]
    fn test_参数集_nal_其他类型不写入() {
        let mut sets = ParameterSets::new();
        let nal_type = decode_parameter_set_nal(&[0x65, 0x88, 0x84], 0, &mut sets).unwrap();
        assert!(nal_type.is_idr());
        assert!(sets.is_empty());

        assert!(decode_parameter_set_nal(&[], 0, &mut sets).is_err());
        assert!(decode_parameter_set_nal(&[0x87], 0, &mut sets).is_err());
    }
}
