//! 骨骼系统
//!
//! 核心设计思想：
//! - JointLink: 单个关节节点（名称、父关节、绑定姿态）
//! - JointSet: 管理关节层级与渲染姿态
//! - SkeletonAdapter: 物理动画只通过这个窄接口访问骨骼

mod joint_link;
mod joint_set;

pub use joint_link::JointLink;
pub use joint_set::{JointSet, SkeletonPose};

use glam::{Mat4, Quat, Vec3};

use crate::math::Pose;

// ============================================================================
// 公共类型定义
// ============================================================================

/// 关节变换数据（相对父关节）
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JointTransform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for JointTransform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl JointTransform {
    #[inline]
    pub fn new(translation: Vec3, rotation: Quat) -> Self {
        Self { translation, rotation, scale: Vec3::ONE }
    }

    /// 转换为 4x4 矩阵
    #[inline]
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    /// 从矩阵分解
    #[inline]
    pub fn from_matrix(m: Mat4) -> Self {
        let (scale, rotation, translation) = m.to_scale_rotation_translation();
        Self { translation, rotation, scale }
    }

    /// 去掉缩放后的刚体姿态
    #[inline]
    pub fn to_pose(&self) -> Pose {
        Pose::new(self.translation, self.rotation)
    }
}

// ============================================================================
// 骨骼适配接口
// ============================================================================

/// 骨骼/动画系统的窄接口
///
/// 关节索引要求拓扑有序：父关节索引总是小于子关节索引。
pub trait SkeletonAdapter {
    /// 关节数量
    fn joint_count(&self) -> usize;

    /// 父关节索引（根关节返回 None）
    fn parent_of(&self, joint: usize) -> Option<usize>;

    /// 给定姿态下关节相对父关节的变换
    fn local_transform(&self, pose: &SkeletonPose, joint: usize) -> Option<JointTransform>;

    /// 给定姿态下关节的模型空间变换（缩放强制为 1）
    fn object_space_transform(&self, pose: &SkeletonPose, joint: usize) -> Option<Pose>;

    /// 绑定姿态
    fn bind_pose(&self) -> &SkeletonPose;

    /// 写入渲染姿态中某关节的旋转
    fn set_joint_rotation(&mut self, joint: usize, rotation: Quat);

    /// 是否禁止动画覆盖渲染姿态
    fn is_animation_update_suppressed(&self) -> bool;

    fn set_animation_update_suppressed(&mut self, suppressed: bool);
}

// ============================================================================
// 类型别名
// ============================================================================

/// Skeleton 别名
pub type Skeleton = JointSet;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joint_transform_matrix_keeps_scale() {
        let transform = JointTransform {
            translation: Vec3::new(0.1, 0.2, 0.3),
            rotation: Quat::from_rotation_z(0.4),
            scale: Vec3::new(1.0, 2.0, 1.0),
        };
        let back = JointTransform::from_matrix(transform.to_matrix());

        assert!((back.translation - transform.translation).length() < 1e-5);
        assert!((back.scale - transform.scale).length() < 1e-5);
        assert!(back.rotation.dot(transform.rotation).abs() > 1.0 - 1e-5);
        // 刚体姿态丢弃缩放
        assert!(back.to_pose().fuzzy_equals(&Pose::new(transform.translation, transform.rotation)));
    }
}
