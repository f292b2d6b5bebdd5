//! 布娃娃构建参数与关节索引

use glam::Vec3;

use crate::skeleton::{JointSet, SkeletonAdapter};
use crate::{RagdollError, Result};

/// 布娃娃构建参数（质量分配、半径、关节位置修正、躯干形状修正）
#[derive(Clone, Debug, PartialEq)]
pub struct RagdollSettings {
    // ========== 质量占比（相对总质量） ==========
    pub head_mass_percentage: f32,
    pub body_upper_mass_percentage: f32,
    pub body_lower_mass_percentage: f32,
    pub arm_mass_percentage: f32,
    pub forearm_mass_percentage: f32,
    pub hand_mass_percentage: f32,
    pub up_leg_mass_percentage: f32,
    pub leg_mass_percentage: f32,
    pub foot_mass_percentage: f32,

    // ========== 形状尺寸（米） ==========
    pub arm_radius: f32,
    pub forearm_radius: f32,
    pub hand_width: f32,
    pub hand_height: f32,
    pub up_leg_radius: f32,
    pub leg_radius: f32,
    pub foot_width: f32,
    pub neck_radius: f32,
    pub head_radius: f32,

    // ========== 关节位置修正（模型空间） ==========
    pub head_joint_adjustment: Vec3,
    pub head_end_joint_adjustment: Vec3,
    pub neck_joint_adjustment: Vec3,
    pub thorax_joint_adjustment: Vec3,
    pub abdomen_joint_adjustment: Vec3,
    pub pelvis_joint_adjustment: Vec3,

    // ========== 躯干胶囊修正 ==========
    pub upper_body_height_modifier: f32,
    pub middle_body_height_modifier: f32,
    pub lower_body_height_modifier: f32,
    pub upper_body_radius_modifier: f32,
    pub middle_body_radius_modifier: f32,
    pub lower_body_radius_modifier: f32,
}

impl Default for RagdollSettings {
    fn default() -> Self {
        Self {
            head_mass_percentage: 0.0826,
            body_upper_mass_percentage: 0.204,
            body_lower_mass_percentage: 0.204,
            arm_mass_percentage: 0.07,
            forearm_mass_percentage: 0.0467,
            hand_mass_percentage: 0.015,
            up_leg_mass_percentage: 0.085,
            leg_mass_percentage: 0.0475,
            foot_mass_percentage: 0.024,

            arm_radius: 0.081,
            forearm_radius: 0.063,
            hand_width: 0.08,
            hand_height: 0.04,
            up_leg_radius: 0.09,
            leg_radius: 0.06,
            foot_width: 0.1,
            neck_radius: 0.1,
            head_radius: 0.1,

            head_joint_adjustment: Vec3::ZERO,
            head_end_joint_adjustment: Vec3::ZERO,
            neck_joint_adjustment: Vec3::ZERO,
            thorax_joint_adjustment: Vec3::ZERO,
            abdomen_joint_adjustment: Vec3::ZERO,
            pelvis_joint_adjustment: Vec3::ZERO,

            upper_body_height_modifier: 1.0,
            middle_body_height_modifier: 1.0,
            lower_body_height_modifier: 1.0,
            upper_body_radius_modifier: 1.0,
            middle_body_radius_modifier: 1.0,
            lower_body_radius_modifier: 1.0,
        }
    }
}

// ============================================================================
// 关节索引
// ============================================================================

/// 构建布娃娃所需的骨骼关节索引
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RagdollJointIds {
    pub head_end: usize,
    pub head: usize,
    pub neck: usize,
    pub spine_03: usize,
    pub spine_02: usize,
    pub spine_01: usize,
    pub pelvis: usize,

    pub thigh_l: usize,
    pub calf_l: usize,
    pub foot_l: usize,
    pub foot_end_l: usize,

    pub thigh_r: usize,
    pub calf_r: usize,
    pub foot_r: usize,
    pub foot_end_r: usize,

    pub upperarm_l: usize,
    pub lowerarm_l: usize,
    pub hand_l: usize,
    pub hand_end_l: usize,

    pub upperarm_r: usize,
    pub lowerarm_r: usize,
    pub hand_r: usize,
    pub hand_end_r: usize,
}

impl RagdollJointIds {
    /// 按标准关节名解析
    pub fn from_skeleton(skeleton: &JointSet) -> Result<Self> {
        let find = |name: &str| {
            skeleton
                .find_joint(name)
                .ok_or_else(|| RagdollError::MissingJoint(name.to_string()))
        };

        Ok(Self {
            head_end: find("head_end")?,
            head: find("head")?,
            neck: find("neck_01")?,
            spine_03: find("spine_03")?,
            spine_02: find("spine_02")?,
            spine_01: find("spine_01")?,
            pelvis: find("pelvis")?,

            thigh_l: find("thigh_l")?,
            calf_l: find("calf_l")?,
            foot_l: find("foot_l")?,
            foot_end_l: find("foot_end_l")?,

            thigh_r: find("thigh_r")?,
            calf_r: find("calf_r")?,
            foot_r: find("foot_r")?,
            foot_end_r: find("foot_end_r")?,

            upperarm_l: find("upperarm_l")?,
            lowerarm_l: find("lowerarm_l")?,
            hand_l: find("hand_l")?,
            hand_end_l: find("hand_end_l")?,

            upperarm_r: find("upperarm_r")?,
            lowerarm_r: find("lowerarm_r")?,
            hand_r: find("hand_r")?,
            hand_end_r: find("hand_end_r")?,
        })
    }

    /// 布娃娃锚定关节（骨盆）
    #[inline]
    pub fn attachment(&self) -> usize {
        self.pelvis
    }

    fn all(&self) -> [usize; 23] {
        [
            self.head_end, self.head, self.neck, self.spine_03, self.spine_02, self.spine_01, self.pelvis,
            self.thigh_l, self.calf_l, self.foot_l, self.foot_end_l,
            self.thigh_r, self.calf_r, self.foot_r, self.foot_end_r,
            self.upperarm_l, self.lowerarm_l, self.hand_l, self.hand_end_l,
            self.upperarm_r, self.lowerarm_r, self.hand_r, self.hand_end_r,
        ]
    }

    /// 所有索引都必须落在骨骼范围内
    pub fn validate(&self, skeleton: &dyn SkeletonAdapter) -> Result<()> {
        let count = skeleton.joint_count();
        match self.all().into_iter().find(|&joint| joint >= count) {
            Some(joint) => Err(RagdollError::InvalidJoint { joint, count }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::JointLink;
    use crate::test_support::humanoid_skeleton;
    use glam::Vec3;

    #[test]
    fn test_resolve_joint_ids() {
        let skeleton = humanoid_skeleton();
        let ids = RagdollJointIds::from_skeleton(&skeleton).unwrap();
        assert_eq!(ids.pelvis, skeleton.find_joint("pelvis").unwrap());
        assert_eq!(ids.attachment(), ids.pelvis);
        assert!(ids.validate(&skeleton).is_ok());
    }

    #[test]
    fn test_missing_joint() {
        let skeleton = JointSet::new(vec![JointLink::with_offset("pelvis", None, Vec3::ZERO)]).unwrap();
        let result = RagdollJointIds::from_skeleton(&skeleton);
        assert!(matches!(result, Err(RagdollError::MissingJoint(name)) if name == "head_end"));
    }

    #[test]
    fn test_validate_out_of_range() {
        let skeleton = humanoid_skeleton();
        let mut ids = RagdollJointIds::from_skeleton(&skeleton).unwrap();
        ids.hand_r = 1000;
        assert!(matches!(
            ids.validate(&skeleton),
            Err(RagdollError::InvalidJoint { joint: 1000, .. })
        ));
    }
}
