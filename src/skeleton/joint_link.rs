//! 关节节点
//!
//! JointLink 代表骨骼层级中的一个节点，只保存静态数据。
//! 每帧变化的姿态放在 SkeletonPose 中。

use glam::{Quat, Vec3};

use super::JointTransform;

/// 关节节点
#[derive(Clone, Debug)]
pub struct JointLink {
    /// 关节名称
    pub name: String,

    /// 父关节索引（None 表示根关节）
    pub parent_index: Option<usize>,

    /// 绑定姿态（相对父关节）
    pub bind_transform: JointTransform,
}

impl JointLink {
    pub fn new(name: impl Into<String>, parent_index: Option<usize>, bind_transform: JointTransform) -> Self {
        Self {
            name: name.into(),
            parent_index,
            bind_transform,
        }
    }

    /// 以父关节偏移创建（无旋转）
    pub fn with_offset(name: impl Into<String>, parent_index: Option<usize>, offset: Vec3) -> Self {
        Self::new(name, parent_index, JointTransform::new(offset, Quat::IDENTITY))
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.parent_index.is_none()
    }
}
