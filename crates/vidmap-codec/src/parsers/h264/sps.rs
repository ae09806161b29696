//! H.264 SPS (Sequence Parameter Set) 解析与校验.
//!
//! SPS 包含编码视频序列的全局参数:
//! - Profile / Level
//! - 色度格式, 位深, 缩放矩阵 (High 系列)
//! - 帧号与图像顺序计数 (POC) 参数
//! - 宏块单位的图像尺寸与裁剪窗口
//! - 可选的 VUI
//!
//! [`parse_sps`] 只做语法解析, [`check_sps`] 做语义校验,
//! [`decode_sps`] 在两者都通过后写入参数集表.

use log::debug;
use vidmap_core::{BitReader, VidError, VidResult};

use super::param_sets::ParameterSets;
use super::scaling::{self, FallbackRule, ScalingMatrices};
use super::vui::{self, Vui};

/// 支持的 profile_idc: Baseline, Main, High
pub const SUPPORTED_PROFILES: [u8; 3] = [66, 77, 100];

/// SPS id 上限
pub const MAX_SPS_ID: u32 = 31;

/// SPS 解析结果
#[derive(Debug, Clone, PartialEq)]
pub struct Sps {
    /// profile_idc (66=Baseline, 77=Main, 100=High)
    pub profile_idc: u8,
    /// constraint_set0..5 标志 (高位在前) 与 2 个保留位
    pub constraint_set_flags: u8,
    /// level_idc (30=3.0, 41=4.1)
    pub level_idc: u8,
    pub sps_id: u32,

    /// 色度格式 (0=单色, 1=4:2:0, 2=4:2:2, 3=4:4:4)
    pub chroma_format_idc: u32,
    pub separate_colour_plane_flag: bool,
    pub bit_depth_luma: u32,
    pub bit_depth_chroma: u32,
    pub qpprime_y_zero_transform_bypass_flag: bool,
    pub seq_scaling_matrix_present_flag: bool,
    /// 逆扫描后的缩放矩阵 (未传输时为平坦矩阵)
    pub scaling: ScalingMatrices,

    pub log2_max_frame_num_minus4: u32,
    /// MaxFrameNum = 2^(log2_max_frame_num_minus4 + 4)
    pub max_frame_num: u32,

    pub pic_order_cnt_type: u32,
    pub log2_max_pic_order_cnt_lsb_minus4: u32,
    pub delta_pic_order_always_zero_flag: bool,
    pub offset_for_non_ref_pic: i32,
    pub offset_for_top_to_bottom_field: i32,
    pub offset_for_ref_frame: Vec<i32>,

    pub max_num_ref_frames: u32,
    pub gaps_in_frame_num_value_allowed_flag: bool,
    pub pic_width_in_mbs_minus1: u32,
    pub pic_height_in_map_units_minus1: u32,
    pub frame_mbs_only_flag: bool,
    pub mb_adaptive_frame_field_flag: bool,
    pub direct_8x8_inference_flag: bool,

    pub frame_cropping_flag: bool,
    pub frame_crop_left_offset: u32,
    pub frame_crop_right_offset: u32,
    pub frame_crop_top_offset: u32,
    pub frame_crop_bottom_offset: u32,

    pub vui: Option<Vui>,
}

impl Sps {
    /// ChromaArrayType (独立色彩平面时为 0)
    pub fn chroma_array_type(&self) -> u32 {
        if self.separate_colour_plane_flag {
            0
        } else {
            self.chroma_format_idc
        }
    }

    /// 编码宽度 (像素, 未裁剪)
    pub fn coded_width(&self) -> u64 {
        (u64::from(self.pic_width_in_mbs_minus1) + 1) * 16
    }

    /// 编码高度 (像素, 未裁剪)
    pub fn coded_height(&self) -> u64 {
        let field_mult = if self.frame_mbs_only_flag { 1 } else { 2 };
        (u64::from(self.pic_height_in_map_units_minus1) + 1) * field_mult * 16
    }

    /// 水平与垂直方向的裁剪总量 (像素)
    fn crop_pixels(&self) -> (u64, u64) {
        let (unit_x, unit_y) = cropping_unit(self.chroma_array_type(), self.frame_mbs_only_flag);
        let crop_x = (u64::from(self.frame_crop_left_offset)
            + u64::from(self.frame_crop_right_offset))
            * u64::from(unit_x);
        let crop_y = (u64::from(self.frame_crop_top_offset)
            + u64::from(self.frame_crop_bottom_offset))
            * u64::from(unit_y);
        (crop_x, crop_y)
    }

    /// 显示宽度 (像素, 已应用裁剪)
    pub fn width(&self) -> u32 {
        let (crop_x, _) = self.crop_pixels();
        self.coded_width().saturating_sub(crop_x).min(u64::from(u32::MAX)) as u32
    }

    /// 显示高度 (像素, 已应用裁剪)
    pub fn height(&self) -> u32 {
        let (_, crop_y) = self.crop_pixels();
        self.coded_height().saturating_sub(crop_y).min(u64::from(u32::MAX)) as u32
    }

    /// 帧率 (来自 VUI timing_info)
    pub fn frame_rate(&self) -> Option<f64> {
        self.vui.as_ref().and_then(Vui::frame_rate)
    }

    /// 像素宽高比 (来自 VUI)
    pub fn sample_aspect_ratio(&self) -> Option<(u16, u16)> {
        self.vui.as_ref().and_then(Vui::sample_aspect_ratio)
    }
}

// ============================================================
// 解析
// ============================================================

/// 从 RBSP 读取器解析 SPS (不含 NAL 头部字节)
pub fn parse_sps(br: &mut BitReader) -> VidResult<Sps> {
    let profile_idc = br.read_bits(8)? as u8;
    let constraint_set_flags = br.read_bits(8)? as u8;
    let reserved_zero_2bits = constraint_set_flags & 0x03;
    if reserved_zero_2bits != 0 {
        return Err(VidError::InvalidData(format!(
            "H.264: SPS reserved_zero_2bits 不为 0, value={}",
            reserved_zero_2bits
        )));
    }
    let level_idc = br.read_bits(8)? as u8;
    let sps_id = br.read_ue()?;

    let mut chroma_format_idc = 1;
    let mut separate_colour_plane_flag = false;
    let mut bit_depth_luma = 8;
    let mut bit_depth_chroma = 8;
    let mut qpprime_y_zero_transform_bypass_flag = false;
    let mut seq_scaling_matrix_present_flag = false;
    let mut scaling = ScalingMatrices::flat(1);

    if is_high_profile(profile_idc) {
        chroma_format_idc = br.read_ue()?;
        if chroma_format_idc > 3 {
            return Err(VidError::InvalidData(format!(
                "H.264: chroma_format_idc 非法, value={}",
                chroma_format_idc
            )));
        }
        if chroma_format_idc == 3 {
            separate_colour_plane_flag = br.read_flag()?;
        }
        bit_depth_luma = br.read_ue()?.saturating_add(8);
        bit_depth_chroma = br.read_ue()?.saturating_add(8);
        qpprime_y_zero_transform_bypass_flag = br.read_flag()?;
        seq_scaling_matrix_present_flag = br.read_flag()?;
        scaling = ScalingMatrices::flat(chroma_format_idc);
        if seq_scaling_matrix_present_flag {
            let list_count = if chroma_format_idc != 3 { 8 } else { 12 };
            scaling = scaling::parse_scaling_matrices(
                br,
                list_count,
                chroma_format_idc,
                FallbackRule::A,
            )?;
        }
    }

    let log2_max_frame_num_minus4 = br.read_ue()?;
    let max_frame_num = 1u32
        .checked_shl(log2_max_frame_num_minus4.saturating_add(4))
        .unwrap_or(0);

    let pic_order_cnt_type = br.read_ue()?;
    let mut log2_max_pic_order_cnt_lsb_minus4 = 0;
    let mut delta_pic_order_always_zero_flag = false;
    let mut offset_for_non_ref_pic = 0;
    let mut offset_for_top_to_bottom_field = 0;
    let mut offset_for_ref_frame = Vec::new();
    match pic_order_cnt_type {
        0 => {
            log2_max_pic_order_cnt_lsb_minus4 = br.read_ue()?;
        }
        1 => {
            delta_pic_order_always_zero_flag = br.read_flag()?;
            offset_for_non_ref_pic = br.read_se()?;
            offset_for_top_to_bottom_field = br.read_se()?;
            let num_ref_frames_in_pic_order_cnt_cycle = br.read_ue()?;
            if num_ref_frames_in_pic_order_cnt_cycle > 255 {
                return Err(VidError::InvalidData(format!(
                    "H.264: num_ref_frames_in_pic_order_cnt_cycle 超出范围, value={}",
                    num_ref_frames_in_pic_order_cnt_cycle
                )));
            }
            for _ in 0..num_ref_frames_in_pic_order_cnt_cycle {
                offset_for_ref_frame.push(br.read_se()?);
            }
        }
        2 => {}
        _ => {
            return Err(VidError::InvalidData(format!(
                "H.264: pic_order_cnt_type 非法, value={}",
                pic_order_cnt_type
            )));
        }
    }

    let max_num_ref_frames = br.read_ue()?;
    let gaps_in_frame_num_value_allowed_flag = br.read_flag()?;
    let pic_width_in_mbs_minus1 = br.read_ue()?;
    let pic_height_in_map_units_minus1 = br.read_ue()?;

    let frame_mbs_only_flag = br.read_flag()?;
    let mb_adaptive_frame_field_flag = if frame_mbs_only_flag {
        false
    } else {
        br.read_flag()?
    };
    let direct_8x8_inference_flag = br.read_flag()?;

    let frame_cropping_flag = br.read_flag()?;
    let (mut crop_left, mut crop_right, mut crop_top, mut crop_bottom) = (0, 0, 0, 0);
    if frame_cropping_flag {
        crop_left = br.read_ue()?;
        crop_right = br.read_ue()?;
        crop_top = br.read_ue()?;
        crop_bottom = br.read_ue()?;
    }

    let vui = if br.read_flag()? {
        Some(vui::parse_vui(br)?)
    } else {
        None
    };

    Ok(Sps {
        profile_idc,
        constraint_set_flags,
        level_idc,
        sps_id,
        chroma_format_idc,
        separate_colour_plane_flag,
        bit_depth_luma,
        bit_depth_chroma,
        qpprime_y_zero_transform_bypass_flag,
        seq_scaling_matrix_present_flag,
        scaling,
        log2_max_frame_num_minus4,
        max_frame_num,
        pic_order_cnt_type,
        log2_max_pic_order_cnt_lsb_minus4,
        delta_pic_order_always_zero_flag,
        offset_for_non_ref_pic,
        offset_for_top_to_bottom_field,
        offset_for_ref_frame,
        max_num_ref_frames,
        gaps_in_frame_num_value_allowed_flag,
        pic_width_in_mbs_minus1,
        pic_height_in_map_units_minus1,
        frame_mbs_only_flag,
        mb_adaptive_frame_field_flag,
        direct_8x8_inference_flag,
        frame_cropping_flag,
        frame_crop_left_offset: crop_left,
        frame_crop_right_offset: crop_right,
        frame_crop_top_offset: crop_top,
        frame_crop_bottom_offset: crop_bottom,
        vui,
    })
}

// ============================================================
// 校验
// ============================================================

/// 校验 SPS 语义
///
/// 结构性错误返回 [`VidError::InvalidData`], 合法但未实现的特性
/// (非 4:2:0, 独立色彩平面, 隔行 MBAFF, 其他 profile) 返回 [`VidError::Unsupported`].
pub fn check_sps(sps: &Sps) -> VidResult<()> {
    if sps.sps_id > MAX_SPS_ID {
        return Err(VidError::InvalidData(format!(
            "H.264: sps_id 超出范围, sps_id={}",
            sps.sps_id
        )));
    }
    if sps.log2_max_frame_num_minus4 > 12 {
        return Err(VidError::InvalidData(format!(
            "H.264: log2_max_frame_num_minus4 超出范围, value={}",
            sps.log2_max_frame_num_minus4
        )));
    }
    match sps.pic_order_cnt_type {
        0 if sps.log2_max_pic_order_cnt_lsb_minus4 > 12 => {
            return Err(VidError::InvalidData(format!(
                "H.264: log2_max_pic_order_cnt_lsb_minus4 超出范围, value={}",
                sps.log2_max_pic_order_cnt_lsb_minus4
            )));
        }
        1 if sps.offset_for_ref_frame.len() > 255 => {
            return Err(VidError::InvalidData(format!(
                "H.264: num_ref_frames_in_pic_order_cnt_cycle 超出范围, value={}",
                sps.offset_for_ref_frame.len()
            )));
        }
        0..=2 => {}
        other => {
            return Err(VidError::InvalidData(format!(
                "H.264: pic_order_cnt_type 非法, value={}",
                other
            )));
        }
    }
    if sps.max_num_ref_frames > 16 {
        return Err(VidError::InvalidData(format!(
            "H.264: max_num_ref_frames 超出范围, value={}",
            sps.max_num_ref_frames
        )));
    }
    for (field, depth) in [
        ("bit_depth_luma", sps.bit_depth_luma),
        ("bit_depth_chroma", sps.bit_depth_chroma),
    ] {
        if !(8..=14).contains(&depth) {
            return Err(VidError::InvalidData(format!(
                "H.264: {} 非法, value={}",
                field, depth
            )));
        }
    }

    let (crop_x, crop_y) = sps.crop_pixels();
    if crop_x >= sps.coded_width() || crop_y >= sps.coded_height() {
        return Err(VidError::InvalidData(format!(
            "H.264: 裁剪参数非法, coded={}x{}, crop_x={}, crop_y={}",
            sps.coded_width(),
            sps.coded_height(),
            crop_x,
            crop_y
        )));
    }

    if let Some(vui) = &sps.vui {
        vui::check_vui(vui, sps.chroma_array_type())?;
    }

    if !SUPPORTED_PROFILES.contains(&sps.profile_idc) {
        return Err(VidError::Unsupported(format!(
            "H.264: profile_idc={} 未实现",
            sps.profile_idc
        )));
    }
    if sps.chroma_format_idc != 1 {
        return Err(VidError::Unsupported(format!(
            "H.264: chroma_format_idc={} 未实现, 仅支持 4:2:0",
            sps.chroma_format_idc
        )));
    }
    if sps.separate_colour_plane_flag {
        return Err(VidError::Unsupported(
            "H.264: separate_colour_plane_flag 未实现".into(),
        ));
    }
    if sps.mb_adaptive_frame_field_flag {
        return Err(VidError::Unsupported(
            "H.264: mb_adaptive_frame_field_flag (隔行) 未实现".into(),
        ));
    }

    Ok(())
}

/// 解析, 校验并写入参数集表, 返回 SPS id
///
/// 同 id 的旧 SPS 被替换并释放. 解析或校验失败时参数集表保持不变.
pub fn decode_sps(br: &mut BitReader, sets: &mut ParameterSets) -> VidResult<u32> {
    let sps = parse_sps(br)?;
    check_sps(&sps)?;
    let sps_id = sps.sps_id;
    debug!(
        "H.264: SPS id={}, profile={}, level={}, {}x{}",
        sps_id,
        sps.profile_idc,
        sps.level_idc,
        sps.width(),
        sps.height()
    );
    if sets.insert_sps(sps).is_some() {
        debug!("H.264: 替换已有 SPS, id={}", sps_id);
    }
    Ok(sps_id)
}

// ============================================================
// 辅助函数
// ============================================================

/// 是否为携带色度/位深/缩放矩阵语法的 High 系列 profile
pub fn is_high_profile(profile_idc: u8) -> bool {
    matches!(
        profile_idc,
        100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134
    )
}

/// 裁剪单位 (CropUnitX, CropUnitY)
fn cropping_unit(chroma_array_type: u32, frame_mbs_only: bool) -> (u32, u32) {
    let sub_width = match chroma_array_type {
        0 | 3 => 1,
        _ => 2,
    };
    let sub_height = match chroma_array_type {
        0 | 2 | 3 => 1,
        _ => 2,
    };
    let height_mult = if frame_mbs_only { 1 } else { 2 };

    (sub_width, sub_height * height_mult)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::parsers::h264::scaling::{DEFAULT_4X4_INTER, DEFAULT_4X4_INTRA, FLAT_4X4};
    use vidmap_core::BitWriter;

    /// 测试用 SPS 描述
    pub(crate) struct SpsFields {
        pub profile_idc: u8,
        pub constraint_set_flags: u8,
        pub sps_id: u32,
        pub chroma_format_idc: u32,
        pub scaling_lists_absent: bool,
        pub poc_type: u32,
        pub max_num_ref_frames: u32,
        pub width_mbs: u32,
        pub height_mbs: u32,
        pub frame_mbs_only: bool,
        pub mb_adaptive: bool,
        pub crop_bottom: u32,
        pub fps_timing: Option<(u32, u32)>,
    }

    impl Default for SpsFields {
        fn default() -> Self {
            Self {
                profile_idc: 66,
                constraint_set_flags: 0xC0,
                sps_id: 0,
                chroma_format_idc: 1,
                scaling_lists_absent: false,
                poc_type: 2,
                max_num_ref_frames: 1,
                width_mbs: 80,
                height_mbs: 45,
                frame_mbs_only: true,
                mb_adaptive: false,
                crop_bottom: 0,
                fps_timing: None,
            }
        }
    }

    /// 生成 SPS 的 RBSP (不含 NAL 头部字节)
    pub(crate) fn build_sps_rbsp(spec: &SpsFields) -> Vec<u8> {
        let mut bw = BitWriter::new();
        bw.write_bits(u32::from(spec.profile_idc), 8);
        bw.write_bits(u32::from(spec.constraint_set_flags), 8);
        bw.write_bits(31, 8); // level_idc
        bw.write_ue(spec.sps_id);
        if is_high_profile(spec.profile_idc) {
            bw.write_ue(spec.chroma_format_idc);
            if spec.chroma_format_idc == 3 {
                bw.write_flag(false);
            }
            bw.write_ue(0); // bit_depth_luma_minus8
            bw.write_ue(0); // bit_depth_chroma_minus8
            bw.write_flag(false); // qpprime_y_zero_transform_bypass_flag
            bw.write_flag(spec.scaling_lists_absent);
            if spec.scaling_lists_absent {
                let count = if spec.chroma_format_idc == 3 { 12 } else { 8 };
                for _ in 0..count {
                    bw.write_flag(false);
                }
            }
        }
        bw.write_ue(0); // log2_max_frame_num_minus4
        bw.write_ue(spec.poc_type);
        match spec.poc_type {
            0 => bw.write_ue(2),
            1 => {
                bw.write_flag(false);
                bw.write_se(0);
                bw.write_se(0);
                bw.write_ue(2);
                bw.write_se(1);
                bw.write_se(-1);
            }
            _ => {}
        }
        bw.write_ue(spec.max_num_ref_frames);
        bw.write_flag(false); // gaps_in_frame_num_value_allowed_flag
        bw.write_ue(spec.width_mbs - 1);
        bw.write_ue(spec.height_mbs - 1);
        bw.write_flag(spec.frame_mbs_only);
        if !spec.frame_mbs_only {
            bw.write_flag(spec.mb_adaptive);
        }
        bw.write_flag(true); // direct_8x8_inference_flag
        if spec.crop_bottom > 0 {
            bw.write_flag(true);
            bw.write_ue(0);
            bw.write_ue(0);
            bw.write_ue(0);
            bw.write_ue(spec.crop_bottom);
        } else {
            bw.write_flag(false);
        }
        match spec.fps_timing {
            Some((num_units, time_scale)) => {
                bw.write_flag(true);
                bw.write_flag(false); // aspect_ratio_info_present_flag
                bw.write_flag(false); // overscan_info_present_flag
                bw.write_flag(false); // video_signal_type_present_flag
                bw.write_flag(false); // chroma_loc_info_present_flag
                bw.write_flag(true);
                bw.write_bits(num_units, 32);
                bw.write_bits(time_scale, 32);
                bw.write_flag(true);
                bw.write_flag(false); // nal_hrd
                bw.write_flag(false); // vcl_hrd
                bw.write_flag(false); // pic_struct_present_flag
                bw.write_flag(false); // bitstream_restriction_flag
            }
            None => bw.write_flag(false),
        }
        bw.write_rbsp_trailing_bits();
        bw.finish()
    }

    fn parse(spec: &SpsFields) -> VidResult<Sps> {
        let rbsp = build_sps_rbsp(spec);
        parse_sps(&mut BitReader::new(&rbsp))
    }

    #[test]
    fn test_sps_baseline_profile() {
        let sps = parse(&SpsFields::default()).unwrap();
        check_sps(&sps).unwrap();
        assert_eq!(sps.profile_idc, 66);
        assert_eq!(sps.width(), 1280);
        assert_eq!(sps.height(), 720);
        assert_eq!(sps.chroma_format_idc, 1);
        assert_eq!(sps.bit_depth_luma, 8);
        assert_eq!(sps.max_frame_num, 16);
        assert_eq!(sps.scaling.m4x4[0], FLAT_4X4);
        assert!(sps.vui.is_none());
    }

    #[test]
    fn test_sps_high_profile_裁剪与帧率() {
        let spec = SpsFields {
            profile_idc: 100,
            constraint_set_flags: 0,
            width_mbs: 120,
            height_mbs: 68,
            crop_bottom: 4,
            poc_type: 0,
            fps_timing: Some((1, 50)),
            ..Default::default()
        };
        let sps = parse(&spec).unwrap();
        check_sps(&sps).unwrap();
        assert_eq!(sps.width(), 1920);
        assert_eq!(sps.height(), 1080);
        assert_eq!(sps.log2_max_pic_order_cnt_lsb_minus4, 2);
        assert_eq!(sps.frame_rate(), Some(25.0));
    }

    #[test]
    fn test_sps_缩放矩阵全部缺省回退默认表() {
        let spec = SpsFields {
            profile_idc: 100,
            constraint_set_flags: 0,
            scaling_lists_absent: true,
            ..Default::default()
        };
        let sps = parse(&spec).unwrap();
        assert!(sps.seq_scaling_matrix_present_flag);
        assert_eq!(sps.scaling.m4x4[0], DEFAULT_4X4_INTRA);
        assert_eq!(sps.scaling.m4x4[5], DEFAULT_4X4_INTER);
        assert_eq!(sps.scaling.m8x8.len(), 2);
    }

    #[test]
    fn test_sps_poc_type_1() {
        let spec = SpsFields {
            poc_type: 1,
            ..Default::default()
        };
        let sps = parse(&spec).unwrap();
        check_sps(&sps).unwrap();
        assert_eq!(sps.offset_for_ref_frame, vec![1, -1]);
    }

    #[test]
    fn test_sps_reserved_bits_非零失败() {
        let spec = SpsFields {
            constraint_set_flags: 0xC1,
            ..Default::default()
        };
        let err = parse(&spec).expect_err("保留位非零应失败");
        assert!(matches!(err, VidError::InvalidData(_)));
        assert!(format!("{}", err).contains("reserved_zero_2bits"));
    }

    #[test]
    fn test_sps_reject_sps_id_out_of_range() {
        let spec = SpsFields {
            sps_id: 32,
            ..Default::default()
        };
        let sps = parse(&spec).unwrap();
        let err = check_sps(&sps).expect_err("sps_id 超范围应失败");
        assert!(format!("{}", err).contains("sps_id"));
    }

    #[test]
    fn test_sps_reject_invalid_poc_type() {
        let spec = SpsFields {
            poc_type: 3,
            ..Default::default()
        };
        let err = parse(&spec).expect_err("poc_type 非法应失败");
        assert!(format!("{}", err).contains("pic_order_cnt_type"));
    }

    #[test]
    fn test_sps_reject_too_many_ref_frames() {
        let spec = SpsFields {
            max_num_ref_frames: 17,
            ..Default::default()
        };
        let sps = parse(&spec).unwrap();
        let err = check_sps(&sps).expect_err("max_num_ref_frames 超范围应失败");
        assert!(format!("{}", err).contains("max_num_ref_frames"));
    }

    #[test]
    fn test_sps_422_为不支持() {
        let spec = SpsFields {
            profile_idc: 100,
            constraint_set_flags: 0,
            chroma_format_idc: 2,
            ..Default::default()
        };
        let sps = parse(&spec).unwrap();
        let err = check_sps(&sps).expect_err("4:2:2 应不支持");
        assert!(matches!(err, VidError::Unsupported(_)));
    }

    #[test]
    fn test_sps_mbaff_为不支持() {
        let spec = SpsFields {
            frame_mbs_only: false,
            mb_adaptive: true,
            height_mbs: 23,
            ..Default::default()
        };
        let sps = parse(&spec).unwrap();
        assert_eq!(sps.height(), 736);
        let err = check_sps(&sps).expect_err("MBAFF 应不支持");
        assert!(matches!(err, VidError::Unsupported(_)));
    }

    #[test]
    fn test_sps_未实现_profile() {
        let spec = SpsFields {
            profile_idc: 88,
            ..Default::default()
        };
        let sps = parse(&spec).unwrap();
        let err = check_sps(&sps).expect_err("Extended profile 应不支持");
        assert!(matches!(err, VidError::Unsupported(_)));
    }

    #[test]
    fn test_sps_裁剪超出失败() {
        let spec = SpsFields {
            height_mbs: 1,
            crop_bottom: 8,
            ..Default::default()
        };
        let sps = parse(&spec).unwrap();
        let err = check_sps(&sps).expect_err("裁剪超出应失败");
        assert!(format!("{}", err).contains("裁剪"));
    }

    #[test]
    fn test_decode_sps_同_id_替换() {
        let mut sets = ParameterSets::new();
        let first = build_sps_rbsp(&SpsFields::default());
        let second = build_sps_rbsp(&SpsFields {
            width_mbs: 40,
            height_mbs: 30,
            ..Default::default()
        });

        assert_eq!(decode_sps(&mut BitReader::new(&first), &mut sets).unwrap(), 0);
        assert_eq!(decode_sps(&mut BitReader::new(&second), &mut sets).unwrap(), 0);
        assert_eq!(sets.sps_count(), 1);
        assert_eq!(sets.sps(0).map(Sps::width), Some(640));
    }

    #[test]
    fn test_decode_sps_失败不写入() {
        let mut sets = ParameterSets::new();
        let rbsp = build_sps_rbsp(&SpsFields {
            profile_idc: 100,
            constraint_set_flags: 0,
            chroma_format_idc: 2,
            ..Default::default()
        });
        let err = decode_sps(&mut BitReader::new(&rbsp), &mut sets).expect_err("应不支持");
        assert!(matches!(err, VidError::Unsupported(_)));
        assert_eq!(sets.sps_count(), 0);

        let rbsp = build_sps_rbsp(&SpsFields {
            constraint_set_flags: 0x02,
            ..Default::default()
        });
        let err = decode_sps(&mut BitReader::new(&rbsp), &mut sets).expect_err("应失败");
        assert!(matches!(err, VidError::InvalidData(_)));
        assert_eq!(sets.sps_count(), 0);
    }
}
