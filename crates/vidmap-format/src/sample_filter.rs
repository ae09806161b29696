//! IDR 采样筛选 (缩略图选帧).
//!
//! 从视频轨道的同步帧中挑出数量有限且有代表性的一组, 并就地替换轨道的采样数组.
//! 该操作是破坏性的: 需要保留完整索引的调用方应先复制 [`BitstreamMap`].

use log::debug;
use serde::{Deserialize, Serialize};

use crate::bitstream_map::{BitstreamMap, SampleEntry};

/// 筛选模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    /// 按原顺序取前 N 个同步帧
    #[default]
    Unfiltered,
    /// 去除过小帧后取前 N 个
    Ordered,
    /// 去除过小帧后等间隔取 N 个
    Distributed,
}

/// 筛选参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleFilterConfig {
    /// 小于 `平均大小 / min_size_divisor` 的 IDR 视为空白帧
    pub min_size_divisor: f64,
    /// 首尾各去除的比例
    pub trim_ratio: f64,
    /// 幸存帧数超过该值时才做首尾去除
    pub trim_min_count: usize,
    /// 请求帧数上限
    pub max_pictures: usize,
}

impl Default for SampleFilterConfig {
    fn default() -> Self {
        Self {
            min_size_divisor: 1.66,
            trim_ratio: 0.03,
            trim_min_count: 48,
            max_pictures: 999,
        }
    }
}

/// 去除过小的 IDR, 再按需去除首尾
fn drop_small_and_trim(idrs: Vec<SampleEntry>, config: &SampleFilterConfig) -> Vec<SampleEntry> {
    let total: u64 = idrs.iter().map(|s| s.size).sum();
    let mean = total as f64 / idrs.len() as f64;
    let threshold = if config.min_size_divisor > 0.0 {
        mean / config.min_size_divisor
    } else {
        0.0
    };
    let mut survivors: Vec<SampleEntry> = idrs
        .into_iter()
        .filter(|s| s.size as f64 >= threshold)
        .collect();

    if survivors.len() > config.trim_min_count {
        let k = (survivors.len() as f64 * config.trim_ratio).floor() as usize;
        if k > 0 && 2 * k < survivors.len() {
            survivors.truncate(survivors.len() - k);
            survivors.drain(..k);
        }
    }
    survivors
}

/// 筛选视频轨道的 IDR 采样, 返回保留的帧数
///
/// 没有同步帧 (或请求 0 帧) 时轨道保持不变并返回 0.
pub fn filter_idr_samples(
    map: &mut BitstreamMap,
    picture_number: usize,
    mode: FilterMode,
    config: &SampleFilterConfig,
) -> usize {
    let n = picture_number.min(config.max_pictures);
    let idrs: Vec<SampleEntry> = map
        .samples()
        .iter()
        .filter(|s| s.sample_type.is_sync())
        .copied()
        .collect();
    if idrs.is_empty() || n == 0 {
        debug!("IDR 筛选: 没有可用帧 (idr={}, n={n})", idrs.len());
        return 0;
    }
    let idr_total = idrs.len();

    let kept: Vec<SampleEntry> = match mode {
        FilterMode::Unfiltered => idrs.into_iter().take(n).collect(),
        FilterMode::Ordered => drop_small_and_trim(idrs, config)
            .into_iter()
            .take(n)
            .collect(),
        FilterMode::Distributed => {
            let survivors = drop_small_and_trim(idrs, config);
            if n == 1 {
                survivors.into_iter().take(1).collect()
            } else {
                let step = (survivors.len() / (n - 1)).max(1);
                survivors.into_iter().step_by(step).take(n).collect()
            }
        }
    };

    debug!(
        "IDR 筛选: mode={mode:?}, 请求 {picture_number}, idr {idr_total} → 保留 {}",
        kept.len()
    );
    let count = kept.len();
    map.replace_samples(kept);
    map.recount_frames();
    count
}
