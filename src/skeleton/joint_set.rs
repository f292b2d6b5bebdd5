//! 关节集合
//!
//! 管理关节层级、绑定姿态以及渲染用的当前姿态。

use std::collections::HashMap;

use glam::{Mat4, Quat};

use super::{JointLink, JointTransform, SkeletonAdapter};
use crate::math::Pose;
use crate::{RagdollError, Result};

// ============================================================================
// 骨骼姿态
// ============================================================================

/// 骨骼姿态：每个关节相对父关节的变换
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SkeletonPose {
    local: Vec<JointTransform>,
}

impl SkeletonPose {
    pub fn new(local: Vec<JointTransform>) -> Self {
        Self { local }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.local.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.local.is_empty()
    }

    #[inline]
    pub fn joint_transform(&self, joint: usize) -> Option<&JointTransform> {
        self.local.get(joint)
    }

    pub fn set_joint_transform(&mut self, joint: usize, transform: JointTransform) {
        if let Some(t) = self.local.get_mut(joint) {
            *t = transform;
        }
    }

    pub fn set_joint_rotation(&mut self, joint: usize, rotation: Quat) {
        if let Some(t) = self.local.get_mut(joint) {
            t.rotation = rotation;
        }
    }
}

// ============================================================================
// 关节集合
// ============================================================================

/// 关节集合 - SkeletonAdapter 的内置实现
#[derive(Clone, Debug)]
pub struct JointSet {
    joints: Vec<JointLink>,
    name_to_index: HashMap<String, usize>,
    bind_pose: SkeletonPose,

    /// 当前渲染姿态（动画写入，物理动画覆盖旋转）
    pose: SkeletonPose,

    /// 为 true 时动画系统不再覆盖渲染姿态
    animation_update_suppressed: bool,
}

impl JointSet {
    /// 创建关节集合
    ///
    /// 要求父关节索引小于子关节索引，这样按索引升序遍历即为自根向叶。
    pub fn new(joints: Vec<JointLink>) -> Result<Self> {
        if joints.is_empty() {
            return Err(RagdollError::InvalidSkeleton("没有关节".to_string()));
        }

        let mut name_to_index = HashMap::with_capacity(joints.len());
        for (index, joint) in joints.iter().enumerate() {
            if let Some(parent) = joint.parent_index {
                if parent >= index {
                    return Err(RagdollError::InvalidSkeleton(format!(
                        "关节 '{}' ({}) 的父关节 {} 不在其之前",
                        joint.name, index, parent
                    )));
                }
            }
            name_to_index.insert(joint.name.clone(), index);
        }

        let bind_pose = SkeletonPose::new(joints.iter().map(|j| j.bind_transform).collect());

        Ok(Self {
            joints,
            name_to_index,
            pose: bind_pose.clone(),
            bind_pose,
            animation_update_suppressed: false,
        })
    }

    #[inline]
    pub fn joints(&self) -> &[JointLink] {
        &self.joints
    }

    #[inline]
    pub fn joint(&self, index: usize) -> Option<&JointLink> {
        self.joints.get(index)
    }

    pub fn find_joint(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    /// 当前渲染姿态
    #[inline]
    pub fn pose(&self) -> &SkeletonPose {
        &self.pose
    }

    /// 动画系统写入新姿态
    ///
    /// 被物理动画接管时忽略，返回是否已应用。
    pub fn apply_animation_pose(&mut self, pose: &SkeletonPose) -> bool {
        if self.animation_update_suppressed || pose.len() != self.joints.len() {
            return false;
        }
        self.pose.clone_from(pose);
        true
    }

    /// 模型空间矩阵（包含缩放）
    pub fn object_space_matrix(&self, pose: &SkeletonPose, joint: usize) -> Option<Mat4> {
        let mut matrix = pose.joint_transform(joint)?.to_matrix();
        let mut current = self.joints.get(joint)?.parent_index;
        while let Some(parent) = current {
            matrix = pose.joint_transform(parent)?.to_matrix() * matrix;
            current = self.joints.get(parent)?.parent_index;
        }
        Some(matrix)
    }
}

impl SkeletonAdapter for JointSet {
    #[inline]
    fn joint_count(&self) -> usize {
        self.joints.len()
    }

    #[inline]
    fn parent_of(&self, joint: usize) -> Option<usize> {
        self.joints.get(joint).and_then(|j| j.parent_index)
    }

    fn local_transform(&self, pose: &SkeletonPose, joint: usize) -> Option<JointTransform> {
        pose.joint_transform(joint).copied()
    }

    fn object_space_transform(&self, pose: &SkeletonPose, joint: usize) -> Option<Pose> {
        self.object_space_matrix(pose, joint).map(Pose::from_matrix)
    }

    fn bind_pose(&self) -> &SkeletonPose {
        &self.bind_pose
    }

    fn set_joint_rotation(&mut self, joint: usize, rotation: Quat) {
        self.pose.set_joint_rotation(joint, rotation.normalize());
    }

    fn is_animation_update_suppressed(&self) -> bool {
        self.animation_update_suppressed
    }

    fn set_animation_update_suppressed(&mut self, suppressed: bool) {
        self.animation_update_suppressed = suppressed;
    }
}
