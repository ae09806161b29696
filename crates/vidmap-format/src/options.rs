//! 解析选项.

use serde::{Deserialize, Serialize};

/// WAV 每个采样块包含的帧数
pub const DEFAULT_WAV_BLOCK_FRAMES: u32 = 4096;

/// WAV 采样块帧数下限, 更小的配置值按此处理
pub const MIN_WAV_BLOCK_FRAMES: u32 = 1;

/// 解析选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    /// 是否为 H.264 轨道解析 SPS/PPS
    pub decode_parameter_sets: bool,
    /// WAV 每个采样块的帧数
    pub wav_block_frames: u32,
}

impl ParseOptions {
    /// 实际使用的 WAV 块帧数
    pub fn effective_wav_block_frames(&self) -> u32 {
        self.wav_block_frames.max(MIN_WAV_BLOCK_FRAMES)
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            decode_parameter_sets: true,
            wav_block_frames: DEFAULT_WAV_BLOCK_FRAMES,
        }
    }
}
