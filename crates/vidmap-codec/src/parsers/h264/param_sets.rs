//! 按 id 索引的 SPS/PPS 参数集表.
//!
//! 参数集表由解析会话显式持有, 以引用传入 [`decode_pps`](super::decode_pps) 等函数.
//! 同 id 写入时旧值被移出并释放 (后写入者生效).

use std::collections::HashMap;

use super::pps::Pps;
use super::sps::Sps;

/// SPS/PPS 参数集表
#[derive(Debug, Clone, Default)]
pub struct ParameterSets {
    sps: HashMap<u32, Sps>,
    pps: HashMap<u32, Pps>,
}

impl ParameterSets {
    /// 创建空表
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入 SPS, 返回被替换的旧值
    pub fn insert_sps(&mut self, sps: Sps) -> Option<Sps> {
        self.sps.insert(sps.sps_id, sps)
    }

    /// 写入 PPS, 返回被替换的旧值
    pub fn insert_pps(&mut self, pps: Pps) -> Option<Pps> {
        self.pps.insert(pps.pps_id, pps)
    }

    pub fn sps(&self, id: u32) -> Option<&Sps> {
        self.sps.get(&id)
    }

    pub fn pps(&self, id: u32) -> Option<&Pps> {
        self.pps.get(&id)
    }

    pub fn sps_count(&self) -> usize {
        self.sps.len()
    }

    pub fn pps_count(&self) -> usize {
        self.pps.len()
    }

    /// 已存在的 SPS id (升序)
    pub fn sps_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.sps.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// 已存在的 PPS id (升序)
    pub fn pps_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.pps.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// id 最小的 SPS, 用于推导轨道的分辨率与规格
    pub fn first_sps(&self) -> Option<&Sps> {
        self.sps_ids().first().and_then(|id| self.sps.get(id))
    }

    pub fn is_empty(&self) -> bool {
        self.sps.is_empty() && self.pps.is_empty()
    }
}
