//! H.264 PPS (Picture Parameter Set) 解析与校验.
//!
//! PPS 引用一个已解析的 SPS. 扩展部分 (transform_8x8_mode_flag, 图像级缩放矩阵,
//! second_chroma_qp_index_offset) 仅在仍有 RBSP 数据且所引用的 SPS 为 High 及以上时读取.

use log::debug;
use vidmap_core::{BitReader, VidError, VidResult};

use super::param_sets::ParameterSets;
use super::scaling::{self, FallbackRule, ScalingMatrices};

/// PPS id 上限
pub const MAX_PPS_ID: u32 = 255;

/// PPS 解析结果
#[derive(Debug, Clone, PartialEq)]
pub struct Pps {
    pub pps_id: u32,
    pub sps_id: u32,
    pub entropy_coding_mode_flag: bool,
    pub bottom_field_pic_order_in_frame_present_flag: bool,
    /// 大于 0 表示 FMO (灵活宏块排序)
    pub num_slice_groups_minus1: u32,
    pub slice_group_map_type: u32,
    pub num_ref_idx_l0_default_active_minus1: u32,
    pub num_ref_idx_l1_default_active_minus1: u32,
    pub weighted_pred_flag: bool,
    pub weighted_bipred_idc: u32,
    pub pic_init_qp_minus26: i32,
    pub pic_init_qs_minus26: i32,
    pub chroma_qp_index_offset: i32,
    pub deblocking_filter_control_present_flag: bool,
    pub constrained_intra_pred_flag: bool,
    pub redundant_pic_cnt_present_flag: bool,
    pub transform_8x8_mode_flag: bool,
    pub pic_scaling_matrix_present_flag: bool,
    /// 图像级缩放矩阵, `None` 表示沿用 SPS 的矩阵
    pub scaling: Option<ScalingMatrices>,
    /// 未传输时等于 chroma_qp_index_offset
    pub second_chroma_qp_index_offset: i32,
}

/// 从 RBSP 读取器解析 PPS (不含 NAL 头部字节)
///
/// 所引用的 SPS 必须已存在于 `sets`, 否则立即失败.
pub fn parse_pps(br: &mut BitReader, sets: &ParameterSets) -> VidResult<Pps> {
    let pps_id = br.read_ue()?;
    let sps_id = br.read_ue()?;
    let sps = sets.sps(sps_id).ok_or_else(|| {
        VidError::InvalidData(format!(
            "H.264: PPS 引用的 SPS 不存在, pps_id={}, sps_id={}",
            pps_id, sps_id
        ))
    })?;

    let entropy_coding_mode_flag = br.read_flag()?;
    let bottom_field_pic_order_in_frame_present_flag = br.read_flag()?;

    let num_slice_groups_minus1 = br.read_ue()?;
    let mut slice_group_map_type = 0;
    if num_slice_groups_minus1 > 0 {
        if num_slice_groups_minus1 > 7 {
            return Err(VidError::InvalidData(format!(
                "H.264: num_slice_groups_minus1 超出范围, value={}",
                num_slice_groups_minus1
            )));
        }
        slice_group_map_type = skip_slice_groups(br, num_slice_groups_minus1)?;
    }

    let num_ref_idx_l0_default_active_minus1 = br.read_ue()?;
    let num_ref_idx_l1_default_active_minus1 = br.read_ue()?;
    let weighted_pred_flag = br.read_flag()?;
    let weighted_bipred_idc = br.read_bits(2)?;
    let pic_init_qp_minus26 = br.read_se()?;
    let pic_init_qs_minus26 = br.read_se()?;
    let chroma_qp_index_offset = br.read_se()?;
    let deblocking_filter_control_present_flag = br.read_flag()?;
    let constrained_intra_pred_flag = br.read_flag()?;
    let redundant_pic_cnt_present_flag = br.read_flag()?;

    let mut transform_8x8_mode_flag = false;
    let mut pic_scaling_matrix_present_flag = false;
    let mut scaling = None;
    let mut second_chroma_qp_index_offset = chroma_qp_index_offset;

    if br.more_rbsp_data() && sps.profile_idc >= 100 {
        transform_8x8_mode_flag = br.read_flag()?;
        pic_scaling_matrix_present_flag = br.read_flag()?;
        if pic_scaling_matrix_present_flag {
            let per_8x8 = if sps.chroma_format_idc == 3 { 6 } else { 2 };
            let list_count = 6 + if transform_8x8_mode_flag { per_8x8 } else { 0 };
            let rule = if sps.seq_scaling_matrix_present_flag {
                FallbackRule::B(&sps.scaling)
            } else {
                FallbackRule::A
            };
            scaling = Some(scaling::parse_scaling_matrices(
                br,
                list_count,
                sps.chroma_format_idc,
                rule,
            )?);
        }
        second_chroma_qp_index_offset = br.read_se()?;
    }

    br.rbsp_trailing_bits()?;

    Ok(Pps {
        pps_id,
        sps_id,
        entropy_coding_mode_flag,
        bottom_field_pic_order_in_frame_present_flag,
        num_slice_groups_minus1,
        slice_group_map_type,
        num_ref_idx_l0_default_active_minus1,
        num_ref_idx_l1_default_active_minus1,
        weighted_pred_flag,
        weighted_bipred_idc,
        pic_init_qp_minus26,
        pic_init_qs_minus26,
        chroma_qp_index_offset,
        deblocking_filter_control_present_flag,
        constrained_intra_pred_flag,
        redundant_pic_cnt_present_flag,
        transform_8x8_mode_flag,
        pic_scaling_matrix_present_flag,
        scaling,
        second_chroma_qp_index_offset,
    })
}

/// 校验 PPS 语义
pub fn check_pps(pps: &Pps) -> VidResult<()> {
    if pps.pps_id > MAX_PPS_ID {
        return Err(VidError::InvalidData(format!(
            "H.264: pps_id 超出范围, pps_id={}",
            pps.pps_id
        )));
    }
    if pps.sps_id > super::sps::MAX_SPS_ID {
        return Err(VidError::InvalidData(format!(
            "H.264: PPS sps_id 超出范围, sps_id={}",
            pps.sps_id
        )));
    }
    for (field, value) in [
        (
            "num_ref_idx_l0_default_active_minus1",
            pps.num_ref_idx_l0_default_active_minus1,
        ),
        (
            "num_ref_idx_l1_default_active_minus1",
            pps.num_ref_idx_l1_default_active_minus1,
        ),
    ] {
        if value > 31 {
            return Err(VidError::InvalidData(format!(
                "H.264: {} 超出范围, value={}",
                field, value
            )));
        }
    }
    if pps.weighted_bipred_idc > 2 {
        return Err(VidError::InvalidData(format!(
            "H.264: weighted_bipred_idc 非法, value={}",
            pps.weighted_bipred_idc
        )));
    }
    validate_qp_init("pic_init_qp_minus26", pps.pic_init_qp_minus26)?;
    validate_qp_init("pic_init_qs_minus26", pps.pic_init_qs_minus26)?;
    validate_chroma_offset("chroma_qp_index_offset", pps.chroma_qp_index_offset)?;
    validate_chroma_offset(
        "second_chroma_qp_index_offset",
        pps.second_chroma_qp_index_offset,
    )?;

    if pps.num_slice_groups_minus1 > 0 {
        return Err(VidError::Unsupported(format!(
            "H.264: FMO 未实现, num_slice_groups_minus1={}",
            pps.num_slice_groups_minus1
        )));
    }
    Ok(())
}

/// 解析, 校验并写入参数集表, 返回 PPS id
///
/// 引用的 SPS 不存在, 或解析/校验失败时不写入.
pub fn decode_pps(br: &mut BitReader, sets: &mut ParameterSets) -> VidResult<u32> {
    let pps = parse_pps(br, sets)?;
    check_pps(&pps)?;
    let pps_id = pps.pps_id;
    debug!(
        "H.264: PPS id={}, sps_id={}, cabac={}, transform_8x8={}",
        pps_id, pps.sps_id, pps.entropy_coding_mode_flag, pps.transform_8x8_mode_flag
    );
    if sets.insert_pps(pps).is_some() {
        debug!("H.264: 替换已有 PPS, id={}", pps_id);
    }
    Ok(pps_id)
}

fn validate_qp_init(field: &str, value: i32) -> VidResult<()> {
    if !(-26..=25).contains(&value) {
        return Err(VidError::InvalidData(format!(
            "H.264: {} 超出范围, value={}",
            field, value
        )));
    }
    Ok(())
}

fn validate_chroma_offset(field: &str, value: i32) -> VidResult<()> {
    if !(-12..=12).contains(&value) {
        return Err(VidError::InvalidData(format!(
            "H.264: {} 超出范围, value={}",
            field, value
        )));
    }
    Ok(())
}

/// 跳过 slice group 语法, 返回 slice_group_map_type
fn skip_slice_groups(br: &mut BitReader, num_slice_groups_minus1: u32) -> VidResult<u32> {
    let slice_group_map_type = br.read_ue()?;
    match slice_group_map_type {
        0 => {
            for _ in 0..=num_slice_groups_minus1 {
                let _run_length_minus1 = br.read_ue()?;
            }
        }
        1 => {}
        2 => {
            for _ in 0..num_slice_groups_minus1 {
                let _top_left = br.read_ue()?;
                let _bottom_right = br.read_ue()?;
            }
        }
        3..=5 => {
            let _slice_group_change_direction_flag = br.read_bit()?;
            let _slice_group_change_rate_minus1 = br.read_ue()?;
        }
        6 => {
            let pic_size_in_map_units_minus1 = br.read_ue()?;
            let bits_per_id = bits_for_slice_group_id(num_slice_groups_minus1 + 1);
            let needed = (pic_size_in_map_units_minus1 as usize)
                .saturating_add(1)
                .saturating_mul(bits_per_id as usize);
            if needed > br.bits_left() {
                return Err(VidError::Eof);
            }
            for _ in 0..=pic_size_in_map_units_minus1 {
                let _slice_group_id = br.read_bits(bits_per_id)?;
            }
        }
        _ => {
            return Err(VidError::InvalidData(format!(
                "H.264: slice_group_map_type 非法, value={}",
                slice_group_map_type
            )));
        }
    }
    Ok(slice_group_map_type)
}

fn bits_for_slice_group_id(group_count: u32) -> u32 {
    if group_count <= 1 {
        0
    } else {
        u32::BITS - (group_count - 1).leading_zeros()
    }
}
