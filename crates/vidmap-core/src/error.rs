//! 统一错误类型与解析状态定义.
//!
//! 所有 vidmap crate 共用的错误类型, 支持跨模块传播.
//!
//! 解析结果分三级:
//! - [`ParseStatus::Success`]: 成功
//! - [`ParseStatus::Unsupported`]: 语法合法, 但属于未实现的特性 (隔行, FMO, 非 4:2:0 等)
//! - [`ParseStatus::Failure`]: 结构非法 (字段越界, 悬空引用等)

use std::fmt;

use thiserror::Error;

/// vidmap 统一错误类型
#[derive(Debug, Error)]
pub enum VidError {
    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 不支持的特性 (语法合法但未实现)
    #[error("不支持的特性: {0}")]
    Unsupported(String),

    /// 容器格式错误
    #[error("格式错误: {0}")]
    Format(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 数据已耗尽
    #[error("已到达数据末尾")]
    Eof,

    /// 内存分配失败
    #[error("内存分配失败: {0}")]
    OutOfMemory(String),

    /// 未找到指定的容器格式
    #[error("未找到容器格式: {0}")]
    FormatNotFound(String),

    /// 未找到指定的轨道
    #[error("未找到轨道: 索引 {0}")]
    StreamNotFound(usize),

    /// 无效数据 (损坏的码流, 越界字段等)
    #[error("无效数据: {0}")]
    InvalidData(String),

    /// 内部错误 (不应发生)
    #[error("内部错误: {0}")]
    Internal(String),
}

impl VidError {
    /// 将错误归类到三级解析状态
    ///
    /// 只有 [`VidError::Unsupported`] 归为 `Unsupported`, 其余均为 `Failure`.
    pub fn status(&self) -> ParseStatus {
        match self {
            Self::Unsupported(_) => ParseStatus::Unsupported,
            _ => ParseStatus::Failure,
        }
    }
}

/// vidmap 统一 Result 类型
pub type VidResult<T> = Result<T, VidError>;

/// 解析状态
///
/// 按严重程度排序: `Success < Unsupported < Failure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ParseStatus {
    /// 成功
    #[default]
    Success,
    /// 语法合法, 特性未实现
    Unsupported,
    /// 结构非法
    Failure,
}

impl ParseStatus {
    /// 取两者中更严重的状态
    pub fn worst(self, other: Self) -> Self {
        self.max(other)
    }

    /// 从解析结果推导状态
    pub fn from_result<T>(result: &VidResult<T>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(e) => e.status(),
        }
    }

    /// 是否成功
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for ParseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "SUCCESS",
            Self::Unsupported => "UNSUPPORTED",
            Self::Failure => "FAILURE",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_状态_取最严重() {
        let s = ParseStatus::Success;
        assert_eq!(s.worst(ParseStatus::Unsupported), ParseStatus::Unsupported);
        assert_eq!(
            ParseStatus::Failure.worst(ParseStatus::Unsupported),
            ParseStatus::Failure
        );
        assert_eq!(s.worst(ParseStatus::Success), ParseStatus::Success);
    }

    #[test]
    fn test_错误分级() {
        assert_eq!(
            VidError::Unsupported("FMO".into()).status(),
            ParseStatus::Unsupported
        );
        assert_eq!(
            VidError::InvalidData("越界".into()).status(),
            ParseStatus::Failure
        );
        assert_eq!(VidError::Eof.status(), ParseStatus::Failure);

        let ok: VidResult<u32> = Ok(1);
        assert!(ParseStatus::from_result(&ok).is_success());
    }
}
