//! 错误类型

use thiserror::Error;

/// 物理动画错误
///
/// 仅用于构建期（骨骼校验、关节解析、布娃娃构建）。
/// 每帧管线不会向外返回错误，只记录日志并跳过。
#[derive(Debug, Error)]
pub enum RagdollError {
    #[error("骨骼无效: {0}")]
    InvalidSkeleton(String),

    #[error("关节索引越界: {joint} (关节数 {count})")]
    InvalidJoint { joint: usize, count: usize },

    #[error("缺少关节: {0}")]
    MissingJoint(String),

    #[error("未知布娃娃句柄: {0}")]
    UnknownRagdoll(u32),

    #[error("布娃娃尚未加载: {0}")]
    NotLoaded(u32),
}

pub type Result<T> = std::result::Result<T, RagdollError>;
