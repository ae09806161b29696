//! H.264 VUI (Video Usability Information) 与 HRD 参数.
//!
//! VUI 与 HRD 仅在对应的存在标志置位时解析, 归属于所在的 SPS.
//! 解析阶段只拒绝会导致循环无界的字段, 其余语义约束由
//! [`check_vui`] / [`check_hrd`] 校验.

use vidmap_core::{BitReader, VidError, VidResult};

/// Extended_SAR 的 aspect_ratio_idc
pub const EXTENDED_SAR: u8 = 255;

/// 预定义的 SAR 表 (aspect_ratio_idc 0..=16)
pub const SAR_TABLE: [(u16, u16); 17] = [
    (0, 1),    // 0: 未指定
    (1, 1),    // 1: 1:1
    (12, 11),  // 2: 12:11
    (10, 11),  // 3: 10:11
    (16, 11),  // 4: 16:11
    (40, 33),  // 5: 40:33
    (24, 11),  // 6: 24:11
    (20, 11),  // 7: 20:11
    (32, 11),  // 8: 32:11
    (80, 33),  // 9: 80:33
    (18, 11),  // 10: 18:11
    (15, 11),  // 11: 15:11
    (64, 33),  // 12: 64:33
    (160, 99), // 13: 160:99
    (4, 3),    // 14: 4:3
    (3, 2),    // 15: 3:2
    (2, 1),    // 16: 2:1
];

/// cpb_cnt_minus1 上限
const MAX_CPB_CNT_MINUS1: u32 = 31;

/// HRD 中单个 CPB 条目
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HrdEntry {
    pub bit_rate_value_minus1: u32,
    pub cpb_size_value_minus1: u32,
    pub cbr_flag: bool,
}

/// HRD 参数
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Hrd {
    pub cpb_cnt_minus1: u32,
    pub bit_rate_scale: u8,
    pub cpb_size_scale: u8,
    pub entries: Vec<HrdEntry>,
    pub initial_cpb_removal_delay_length_minus1: u8,
    pub cpb_removal_delay_length_minus1: u8,
    pub dpb_output_delay_length_minus1: u8,
    pub time_offset_length: u8,
}

impl Hrd {
    /// 第 i 个条目的码率 (bit/s)
    pub fn bit_rate(&self, idx: usize) -> Option<u64> {
        self.entries.get(idx).map(|e| {
            (u64::from(e.bit_rate_value_minus1) + 1) << (6 + u32::from(self.bit_rate_scale))
        })
    }
}

/// VUI 参数
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Vui {
    pub aspect_ratio_info_present_flag: bool,
    pub aspect_ratio_idc: u8,
    pub sar_width: u16,
    pub sar_height: u16,

    pub overscan_info_present_flag: bool,
    pub overscan_appropriate_flag: bool,

    pub video_signal_type_present_flag: bool,
    pub video_format: u8,
    pub video_full_range_flag: bool,
    pub colour_description_present_flag: bool,
    pub colour_primaries: u8,
    pub transfer_characteristics: u8,
    pub matrix_coefficients: u8,

    pub chroma_loc_info_present_flag: bool,
    pub chroma_sample_loc_type_top_field: u32,
    pub chroma_sample_loc_type_bottom_field: u32,

    pub timing_info_present_flag: bool,
    pub num_units_in_tick: u32,
    pub time_scale: u32,
    pub fixed_frame_rate_flag: bool,

    pub nal_hrd: Option<Hrd>,
    pub vcl_hrd: Option<Hrd>,
    pub low_delay_hrd_flag: bool,
    pub pic_struct_present_flag: bool,

    pub bitstream_restriction_flag: bool,
    pub motion_vectors_over_pic_boundaries_flag: bool,
    pub max_bytes_per_pic_denom: u32,
    pub max_bits_per_mb_denom: u32,
    pub log2_max_mv_length_horizontal: u32,
    pub log2_max_mv_length_vertical: u32,
    pub max_num_reorder_frames: u32,
    pub max_dec_frame_buffering: u32,
}

impl Vui {
    /// 像素宽高比 (未指定时为 `None`)
    pub fn sample_aspect_ratio(&self) -> Option<(u16, u16)> {
        if !self.aspect_ratio_info_present_flag {
            return None;
        }
        let (w, h) = if self.aspect_ratio_idc == EXTENDED_SAR {
            (self.sar_width, self.sar_height)
        } else {
            *SAR_TABLE.get(usize::from(self.aspect_ratio_idc))?
        };
        (w != 0 && h != 0).then_some((w, h))
    }

    /// 帧率: `time_scale / (2 * num_units_in_tick)`
    pub fn frame_rate(&self) -> Option<f64> {
        if !self.timing_info_present_flag || self.num_units_in_tick == 0 {
            return None;
        }
        Some(f64::from(self.time_scale) / (2.0 * f64::from(self.num_units_in_tick)))
    }
}

// ============================================================
// 解析
// ============================================================

/// 解析 vui_parameters()
pub fn parse_vui(br: &mut BitReader) -> VidResult<Vui> {
    let mut vui = Vui {
        aspect_ratio_info_present_flag: br.read_flag()?,
        ..Default::default()
    };

    if vui.aspect_ratio_info_present_flag {
        vui.aspect_ratio_idc = br.read_bits(8)? as u8;
        if vui.aspect_ratio_idc == EXTENDED_SAR {
            vui.sar_width = br.read_bits(16)? as u16;
            vui.sar_height = br.read_bits(16)? as u16;
        }
    }

    vui.overscan_info_present_flag = br.read_flag()?;
    if vui.overscan_info_present_flag {
        vui.overscan_appropriate_flag = br.read_flag()?;
    }

    vui.video_signal_type_present_flag = br.read_flag()?;
    if vui.video_signal_type_present_flag {
        vui.video_format = br.read_bits(3)? as u8;
        vui.video_full_range_flag = br.read_flag()?;
        vui.colour_description_present_flag = br.read_flag()?;
        if vui.colour_description_present_flag {
            vui.colour_primaries = br.read_bits(8)? as u8;
            vui.transfer_characteristics = br.read_bits(8)? as u8;
            vui.matrix_coefficients = br.read_bits(8)? as u8;
        }
    }

    vui.chroma_loc_info_present_flag = br.read_flag()?;
    if vui.chroma_loc_info_present_flag {
        vui.chroma_sample_loc_type_top_field = br.read_ue()?;
        vui.chroma_sample_loc_type_bottom_field = br.read_ue()?;
    }

    vui.timing_info_present_flag = br.read_flag()?;
    if vui.timing_info_present_flag {
        vui.num_units_in_tick = br.read_bits(32)?;
        vui.time_scale = br.read_bits(32)?;
        vui.fixed_frame_rate_flag = br.read_flag()?;
    }

    if br.read_flag()? {
        vui.nal_hrd = Some(parse_hrd(br)?);
    }
    if br.read_flag()? {
        vui.vcl_hrd = Some(parse_hrd(br)?);
    }
    if vui.nal_hrd.is_some() || vui.vcl_hrd.is_some() {
        vui.low_delay_hrd_flag = br.read_flag()?;
    }
    vui.pic_struct_present_flag = br.read_flag()?;

    vui.bitstream_restriction_flag = br.read_flag()?;
    if vui.bitstream_restriction_flag {
        vui.motion_vectors_over_pic_boundaries_flag = br.read_flag()?;
        vui.max_bytes_per_pic_denom = br.read_ue()?;
        vui.max_bits_per_mb_denom = br.read_ue()?;
        vui.log2_max_mv_length_horizontal = br.read_ue()?;
        vui.log2_max_mv_length_vertical = br.read_ue()?;
        vui.max_num_reorder_frames = br.read_ue()?;
        vui.max_dec_frame_buffering = br.read_ue()?;
    }

    Ok(vui)
}

/// 解析 hrd_parameters()
pub fn parse_hrd(br: &mut BitReader) -> VidResult<Hrd> {
    let cpb_cnt_minus1 = br.read_ue()?;
    if cpb_cnt_minus1 > MAX_CPB_CNT_MINUS1 {
        return Err(VidError::InvalidData(format!(
            "H.264: HRD cpb_cnt_minus1 超出范围, value={}",
            cpb_cnt_minus1
        )));
    }
    let bit_rate_scale = br.read_bits(4)? as u8;
    let cpb_size_scale = br.read_bits(4)? as u8;

    let mut entries = Vec::with_capacity(cpb_cnt_minus1 as usize + 1);
    for _ in 0..=cpb_cnt_minus1 {
        entries.push(HrdEntry {
            bit_rate_value_minus1: br.read_ue()?,
            cpb_size_value_minus1: br.read_ue()?,
            cbr_flag: br.read_flag()?,
        });
    }

    Ok(Hrd {
        cpb_cnt_minus1,
        bit_rate_scale,
        cpb_size_scale,
        entries,
        initial_cpb_removal_delay_length_minus1: br.read_bits(5)? as u8,
        cpb_removal_delay_length_minus1: br.read_bits(5)? as u8,
        dpb_output_delay_length_minus1: br.read_bits(5)? as u8,
        time_offset_length: br.read_bits(5)? as u8,
    })
}

// ============================================================
// 校验
// ============================================================

/// 校验 HRD 参数
///
/// 条目数不超过 32, bit_rate_value_minus1 严格递增, cpb_size_value_minus1 不增.
pub fn check_hrd(hrd: &Hrd) -> VidResult<()> {
    if hrd.cpb_cnt_minus1 > MAX_CPB_CNT_MINUS1
        || hrd.entries.len() != hrd.cpb_cnt_minus1 as usize + 1
    {
        return Err(VidError::InvalidData(format!(
            "H.264: HRD 条目数非法, cpb_cnt_minus1={}, entries={}",
            hrd.cpb_cnt_minus1,
            hrd.entries.len()
        )));
    }
    for (idx, pair) in hrd.entries.windows(2).enumerate() {
        if pair[1].bit_rate_value_minus1 <= pair[0].bit_rate_value_minus1 {
            return Err(VidError::InvalidData(format!(
                "H.264: HRD bit_rate_value_minus1 未严格递增, idx={}, prev={}, cur={}",
                idx + 1,
                pair[0].bit_rate_value_minus1,
                pair[1].bit_rate_value_minus1
            )));
        }
        if pair[1].cpb_size_value_minus1 > pair[0].cpb_size_value_minus1 {
            return Err(VidError::InvalidData(format!(
                "H.264: HRD cpb_size_value_minus1 出现递增, idx={}, prev={}, cur={}",
                idx + 1,
                pair[0].cpb_size_value_minus1,
                pair[1].cpb_size_value_minus1
            )));
        }
    }
    Ok(())
}

/// 校验 VUI 参数
///
/// `chroma_array_type` 来自所属 SPS, 色度采样位置仅在其为 1 时合法.
pub fn check_vui(vui: &Vui, chroma_array_type: u32) -> VidResult<()> {
    if vui.aspect_ratio_info_present_flag {
        let idc = vui.aspect_ratio_idc;
        if usize::from(idc) >= SAR_TABLE.len() && idc != EXTENDED_SAR {
            return Err(VidError::InvalidData(format!(
                "H.264: VUI aspect_ratio_idc 为保留值, value={}",
                idc
            )));
        }
        if idc == EXTENDED_SAR {
            let (w, h) = (vui.sar_width, vui.sar_height);
            if !is_zero_or_prime(w) || !is_zero_or_prime(h) {
                return Err(VidError::InvalidData(format!(
                    "H.264: VUI Extended_SAR 取值须为 0 或素数, sar_width={}, sar_height={}",
                    w, h
                )));
            }
        }
    }

    if vui.video_signal_type_present_flag && vui.video_format > 5 {
        return Err(VidError::InvalidData(format!(
            "H.264: VUI video_format 为保留值, value={}",
            vui.video_format
        )));
    }

    if vui.chroma_loc_info_present_flag {
        if chroma_array_type != 1 {
            return Err(VidError::InvalidData(format!(
                "H.264: VUI chroma_loc_info 仅在 ChromaArrayType==1 时合法, actual={}",
                chroma_array_type
            )));
        }
        let (top, bottom) = (
            vui.chroma_sample_loc_type_top_field,
            vui.chroma_sample_loc_type_bottom_field,
        );
        if top > 5 || bottom > 5 {
            return Err(VidError::InvalidData(format!(
                "H.264: VUI chroma_sample_loc_type 超出范围, top={}, bottom={}",
                top, bottom
            )));
        }
    }

    if vui.timing_info_present_flag {
        if vui.num_units_in_tick == 0 {
            return Err(VidError::InvalidData(
                "H.264: VUI num_units_in_tick 不能为 0".into(),
            ));
        }
        if vui.time_scale == 0 {
            return Err(VidError::InvalidData(
                "H.264: VUI time_scale 不能为 0".into(),
            ));
        }
    }

    if let Some(hrd) = &vui.nal_hrd {
        check_hrd(hrd)?;
    }
    if let Some(hrd) = &vui.vcl_hrd {
        check_hrd(hrd)?;
    }

    if vui.bitstream_restriction_flag {
        check_max("max_bytes_per_pic_denom", vui.max_bytes_per_pic_denom, 16)?;
        check_max("max_bits_per_mb_denom", vui.max_bits_per_mb_denom, 16)?;
        check_max(
            "log2_max_mv_length_horizontal",
            vui.log2_max_mv_length_horizontal,
            16,
        )?;
        check_max(
            "log2_max_mv_length_vertical",
            vui.log2_max_mv_length_vertical,
            16,
        )?;
        check_max("max_dec_frame_buffering", vui.max_dec_frame_buffering, 16)?;
        if vui.max_num_reorder_frames > vui.max_dec_frame_buffering {
            return Err(VidError::InvalidData(format!(
                "H.264: VUI num_reorder_frames 大于 max_dec_frame_buffering, {} > {}",
                vui.max_num_reorder_frames, vui.max_dec_frame_buffering
            )));
        }
    }

    Ok(())
}

fn check_max(field: &str, value: u32, max: u32) -> VidResult<()> {
    if value > max {
        return Err(VidError::InvalidData(format!(
            "H.264: VUI {} 超出范围, value={}, max={}",
            field, value, max
        )));
    }
    Ok(())
}

/// 试除法判断, u16 范围内最多试到 255
fn is_zero_or_prime(v: u16) -> bool {
    let v = u32::from(v);
    if v == 0 {
        return true;
    }
    if v < 2 {
        return false;
    }
    (2..).take_while(|d| d * d <= v).all(|d| v % d != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidmap_core::BitWriter;

    fn write_hrd(bw: &mut BitWriter, entries: &[(u32, u32)]) {
        bw.write_ue(entries.len() as u32 - 1);
        bw.write_bits(0, 4); // bit_rate_scale
        bw.write_bits(3, 4); // cpb_size_scale
        for &(rate, size) in entries {
            bw.write_ue(rate);
            bw.write_ue(size);
            bw.write_flag(false);
        }
        bw.write_bits(23, 5);
        bw.write_bits(23, 5);
        bw.write_bits(23, 5);
        bw.write_bits(24, 5);
    }

    fn hrd_from(entries: &[(u32, u32)]) -> Hrd {
        let mut bw = BitWriter::new();
        write_hrd(&mut bw, entries);
        let data = bw.finish();
        parse_hrd(&mut BitReader::new(&data)).unwrap()
    }

    /// 仅含 timing_info 的 VUI
    fn write_timing_vui(bw: &mut BitWriter, num_units: u32, time_scale: u32) {
        bw.write_flag(false); // aspect_ratio_info_present_flag
        bw.write_flag(false); // overscan_info_present_flag
        bw.write_flag(false); // video_signal_type_present_flag
        bw.write_flag(false); // chroma_loc_info_present_flag
        bw.write_flag(true); // timing_info_present_flag
        bw.write_bits(num_units, 32);
        bw.write_bits(time_scale, 32);
        bw.write_flag(true); // fixed_frame_rate_flag
        bw.write_flag(false); // nal_hrd
        bw.write_flag(false); // vcl_hrd
        bw.write_flag(false); // pic_struct_present_flag
        bw.write_flag(false); // bitstream_restriction_flag
    }

    #[test]
    fn test_hrd_递增码率通过() {
        let hrd = hrd_from(&[(100, 500), (200, 400), (300, 400)]);
        assert_eq!(hrd.entries.len(), 3);
        assert_eq!(hrd.time_offset_length, 24);
        check_hrd(&hrd).unwrap();
        assert_eq!(hrd.bit_rate(0), Some(101 * 64));
    }

    #[test]
    fn test_hrd_码率不递增失败() {
        let hrd = hrd_from(&[(200, 500), (200, 400)]);
        let err = check_hrd(&hrd).expect_err("码率不递增应失败");
        assert!(format!("{}", err).contains("bit_rate_value_minus1"));

        let hrd = hrd_from(&[(300, 500), (100, 400)]);
        assert!(check_hrd(&hrd).is_err());
    }

    #[test]
    fn test_hrd_cpb_size_递增失败() {
        let hrd = hrd_from(&[(100, 400), (200, 500)]);
        let err = check_hrd(&hrd).expect_err("cpb_size 递增应失败");
        assert!(format!("{}", err).contains("cpb_size_value_minus1"));
    }

    #[test]
    fn test_hrd_cpb_cnt_超限在解析阶段拒绝() {
        let mut bw = BitWriter::new();
        bw.write_ue(32);
        bw.write_bits(0, 8);
        let data = bw.finish();
        let err = parse_hrd(&mut BitReader::new(&data)).expect_err("cpb_cnt_minus1=32 应失败");
        assert!(matches!(err, VidError::InvalidData(_)));
    }

    #[test]
    fn test_vui_timing_帧率() {
        let mut bw = BitWriter::new();
        write_timing_vui(&mut bw, 1001, 60000);
        let data = bw.finish();
        let vui = parse_vui(&mut BitReader::new(&data)).unwrap();
        check_vui(&vui, 1).unwrap();
        let fps = vui.frame_rate().unwrap();
        assert!((fps - 29.97).abs() < 0.01, "fps={}", fps);
        assert_eq!(vui.sample_aspect_ratio(), None);
    }

    #[test]
    fn test_vui_timing_零值失败() {
        let mut bw = BitWriter::new();
        write_timing_vui(&mut bw, 0, 50);
        let data = bw.finish();
        let vui = parse_vui(&mut BitReader::new(&data)).unwrap();
        let err = check_vui(&vui, 1).expect_err("num_units_in_tick=0 应失败");
        assert!(format!("{}", err).contains("num_units_in_tick"));
    }

    #[test]
    fn test_vui_extended_sar() {
        let mut vui = Vui {
            aspect_ratio_info_present_flag: true,
            aspect_ratio_idc: EXTENDED_SAR,
            sar_width: 11,
            sar_height: 7,
            ..Default::default()
        };
        check_vui(&vui, 1).unwrap();
        assert_eq!(vui.sample_aspect_ratio(), Some((11, 7)));

        vui.sar_width = 0;
        check_vui(&vui, 1).unwrap();
        assert_eq!(vui.sample_aspect_ratio(), None);

        // 素数相同也合法
        vui.sar_width = 65521;
        vui.sar_height = 65521;
        check_vui(&vui, 1).unwrap();
    }

    #[test]
    fn test_vui_extended_sar_非素数失败() {
        for (w, h) in [(4, 3), (1, 1), (16, 9), (64, 45), (0, 1), (2, 65535)] {
            let vui = Vui {
                aspect_ratio_info_present_flag: true,
                aspect_ratio_idc: EXTENDED_SAR,
                sar_width: w,
                sar_height: h,
                ..Default::default()
            };
            let err = check_vui(&vui, 1).expect_err("非素数 SAR 应失败");
            assert!(format!("{}", err).contains("Extended_SAR"), "{w}:{h}");
        }
    }

    #[test]
    fn test_零或素数判定() {
        let primes: Vec<u16> = (0..30).filter(|&v| is_zero_or_prime(v)).collect();
        assert_eq!(primes, vec![0, 2, 3, 5, 7, 11, 13, 17, 19, 23, 29]);
        assert!(is_zero_or_prime(65521));
        assert!(!is_zero_or_prime(65535));
    }

    #[test]
    fn test_vui_aspect_ratio_保留值失败() {
        let vui = Vui {
            aspect_ratio_info_present_flag: true,
            aspect_ratio_idc: 17,
            ..Default::default()
        };
        assert!(check_vui(&vui, 1).is_err());

        let vui = Vui {
            aspect_ratio_info_present_flag: true,
            aspect_ratio_idc: 14,
            ..Default::default()
        };
        check_vui(&vui, 1).unwrap();
        assert_eq!(vui.sample_aspect_ratio(), Some((4, 3)));
    }

    #[test]
    fn test_vui_chroma_loc_仅限_420() {
        let vui = Vui {
            chroma_loc_info_present_flag: true,
            chroma_sample_loc_type_top_field: 1,
            chroma_sample_loc_type_bottom_field: 1,
            ..Default::default()
        };
        check_vui(&vui, 1).unwrap();
        assert!(check_vui(&vui, 0).is_err());

        let vui = Vui {
            chroma_loc_info_present_flag: true,
            chroma_sample_loc_type_top_field: 6,
            ..Default::default()
        };
        assert!(check_vui(&vui, 1).is_err());
    }

    #[test]
    fn test_vui_bitstream_restriction() {
        let mut vui = Vui {
            bitstream_restriction_flag: true,
            max_bytes_per_pic_denom: 2,
            max_bits_per_mb_denom: 1,
            log2_max_mv_length_horizontal: 16,
            log2_max_mv_length_vertical: 16,
            max_num_reorder_frames: 2,
            max_dec_frame_buffering: 4,
            ..Default::default()
        };
        check_vui(&vui, 1).unwrap();

        vui.max_num_reorder_frames = 5;
        let err = check_vui(&vui, 1).expect_err("reorder > dpb 应失败");
        assert!(format!("{}", err).contains("num_reorder_frames"));

        vui.max_num_reorder_frames = 0;
        vui.max_dec_frame_buffering = 17;
        assert!(check_vui(&vui, 1).is_err());
    }

    #[test]
    fn test_vui_带_hrd_解析() {
        let mut bw = BitWriter::new();
        bw.write_flag(true); // aspect_ratio_info_present_flag
        bw.write_bits(1, 8);
        bw.write_flag(false); // overscan
        bw.write_flag(true); // video_signal_type_present_flag
        bw.write_bits(5, 3);
        bw.write_flag(false);
        bw.write_flag(true); // colour_description_present_flag
        bw.write_bits(1, 8);
        bw.write_bits(1, 8);
        bw.write_bits(1, 8);
        bw.write_flag(false); // chroma_loc
        bw.write_flag(false); // timing
        bw.write_flag(true); // nal_hrd
        write_hrd(&mut bw, &[(1000, 2000)]);
        bw.write_flag(false); // vcl_hrd
        bw.write_flag(false); // low_delay_hrd_flag
        bw.write_flag(true); // pic_struct_present_flag
        bw.write_flag(false); // bitstream_restriction_flag
        let data = bw.finish();

        let vui = parse_vui(&mut BitReader::new(&data)).unwrap();
        assert_eq!(vui.sample_aspect_ratio(), Some((1, 1)));
        assert_eq!(vui.colour_primaries, 1);
        assert!(vui.nal_hrd.is_some());
        assert!(vui.vcl_hrd.is_none());
        assert!(vui.pic_struct_present_flag);
        check_vui(&vui, 1).unwrap();
    }
}
