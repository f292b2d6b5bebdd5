//! 驱动姿态求解器
//!
//! 按碰撞状态把目标姿态与物理姿态合成为最终送给驱动的 adjusted_pose：
//! - 碰撞中：直接取物理姿态
//! - 碰撞刚结束：随碰撞余量衰减，从物理姿态逐渐回到目标姿态
//! - 无碰撞：直接取目标姿态

use super::component::PhysicalAnimationComponent;
use super::limb::PhysicalAnimationLimb;
use crate::math::{map_value, Pose};

#[derive(Clone, Copy, Debug, Default)]
pub struct DrivePoseSolver;

impl DrivePoseSolver {
    pub fn solve_pose(&self, component: &mut PhysicalAnimationComponent) {
        let position_factor = component.target_position_blend_factor;
        let rotation_factor = component.target_rotation_blend_factor;
        for limb in &mut component.limbs {
            self.solve_limb(limb, position_factor, rotation_factor);
        }
    }

    /// 两个系数分别是碰撞刚结束那一刻位置与旋转的插值系数
    pub fn solve_limb(
        &self,
        limb: &mut PhysicalAnimationLimb,
        target_position_blend_factor: f32,
        target_rotation_blend_factor: f32,
    ) {
        if limb.is_colliding {
            limb.adjusted_pose = limb.physics_pose;
        } else if limb.was_in_collision || limb.collision_time > 0.0 {
            let max = limb.max_collision_time();
            let position_t = map_value(limb.collision_time, 0.0, max, 1.0, target_position_blend_factor);
            let rotation_t = map_value(limb.collision_time, 0.0, max, 1.0, target_rotation_blend_factor);
            let translation = limb.physics_pose.interpolate(&limb.target_pose, position_t).translation;
            let rotation = limb.physics_pose.interpolate(&limb.target_pose, rotation_t).rotation;
            limb.adjusted_pose = Pose::new(translation, rotation).normalized();
        } else {
            limb.adjusted_pose = limb.target_pose;
        }
    }

    /// 收到新碰撞的肢体立即进入碰撞分支
    pub fn force_solve_collided_limb(&self, limb: &mut PhysicalAnimationLimb) {
        limb.is_colliding = true;
        limb.adjusted_pose = limb.physics_pose;
    }
}
