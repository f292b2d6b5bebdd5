//! 驱动姿态采样器
//!
//! 自根向叶遍历参与模拟的关节，按肢体混合策略合成动画姿态与物理姿态，
//! 把旋转写回骨骼，并缓存每个关节的模型空间姿态。

use super::component::{CharacterView, PhysicalAnimationComponent};
use super::limb::PhysicalAnimationLimb;
use super::profile::LimbBlendType;
use crate::math::{fuzzy_equals, Pose};
use crate::physics::PhysicsBackend;

/// 当前生效的混合策略（配置档过渡期间叠加旧策略）
pub fn effective_blend_type(limb: &PhysicalAnimationLimb) -> LimbBlendType {
    let blend_type = limb.blend_type | limb.prev_blend_type;
    if blend_type.is_empty() {
        LimbBlendType::PURE_ANIMATION
    } else {
        blend_type
    }
}

/// 按混合策略合成肢体的父关节相对姿态
///
/// physics_local 为刚体姿态换算到父关节空间的结果。
fn blend_limb_pose(
    limb: &PhysicalAnimationLimb,
    anim_local: Pose,
    physics_local: Pose,
    blend_factor: f32,
    blend_weight: f32,
) -> Pose {
    let blend_type = effective_blend_type(limb);
    if blend_type.contains(LimbBlendType::PURE_ANIMATION) {
        return anim_local;
    }

    let mut new_local = physics_local;
    // PURE_PHYSICS 优先于两种混合标记（配置档过渡期间可能同时出现）
    if !blend_type.contains(LimbBlendType::PURE_PHYSICS) {
        if blend_type.contains(LimbBlendType::BLEND_WITH_ANIMATION_POSE) {
            new_local = anim_local.interpolate(&new_local, blend_factor).normalized();
        }
        if blend_type.contains(LimbBlendType::BLEND_WITH_PREV_POSE)
            && !limb.prev_local_pose.fuzzy_equals(&Pose::IDENTITY)
        {
            new_local = limb.prev_local_pose.interpolate(&new_local, blend_factor).normalized();
        }
    }
    if !fuzzy_equals(blend_weight, 1.0) {
        new_local = anim_local.interpolate(&new_local, blend_weight);
    }
    new_local.normalized()
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DrivePoseSampler;

impl DrivePoseSampler {
    /// 合成渲染姿态
    ///
    /// 关节按索引升序遍历（父关节总在子关节之前），
    /// 父关节的本帧结果总是先于子关节可用。
    pub fn sample_pose(
        &self,
        component: &mut PhysicalAnimationComponent,
        backend: &dyn PhysicsBackend,
        view: &mut CharacterView<'_>,
    ) {
        let joint_count = view.skeleton.joint_count();
        component.local_joint_poses.resize(joint_count, Pose::IDENTITY);

        let inv_world = view.world.inverse();
        let blend_factor = component.blend_factor;
        let blend_weight = component.blend_weight;

        for &joint in &component.simulated_joints {
            if joint >= joint_count {
                continue;
            }
            let Some(anim_local) = view.skeleton.local_transform(view.animation_pose, joint) else {
                continue;
            };
            let anim_local = anim_local.to_pose();
            let parent_local = view
                .skeleton
                .parent_of(joint)
                .and_then(|parent| component.local_joint_poses.get(parent).copied())
                .unwrap_or(Pose::IDENTITY);

            let limb = component
                .limb_by_joint
                .get(&joint)
                .and_then(|&index| component.limbs.get_mut(index));

            let new_local = match limb {
                Some(limb) => {
                    let new_local = match backend.body_pose(limb.body) {
                        Some(physics_world) => blend_limb_pose(
                            limb,
                            anim_local,
                            parent_local.inverse() * (inv_world * physics_world),
                            blend_factor,
                            blend_weight,
                        ),
                        None => anim_local,
                    };
                    limb.prev_local_pose = new_local;
                    new_local
                }
                None => anim_local,
            };

            view.skeleton.set_joint_rotation(joint, new_local.rotation);
            component.local_joint_poses[joint] = (parent_local * new_local).normalized();
        }
    }

    /// 纯动画目标姿态（模型空间），写入各肢体的 target_pose
    pub fn compute_target_poses(&self, component: &mut PhysicalAnimationComponent, view: &CharacterView<'_>) {
        let joint_count = view.skeleton.joint_count();
        component.local_target_poses.resize(joint_count, Pose::IDENTITY);

        for &joint in &component.simulated_joints {
            if joint >= joint_count {
                continue;
            }
            let Some(anim_local) = view.skeleton.local_transform(view.animation_pose, joint) else {
                continue;
            };
            let parent_target = view
                .skeleton
                .parent_of(joint)
                .and_then(|parent| component.local_target_poses.get(parent).copied())
                .unwrap_or(Pose::IDENTITY);

            let target = (parent_target * anim_local.to_pose()).normalized();
            component.local_target_poses[joint] = target;

            if let Some(limb) = component
                .limb_by_joint
                .get(&joint)
                .and_then(|&index| component.limbs.get_mut(index))
            {
                limb.target_pose = target;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physical_animation::limb::LimbType;
    use crate::physical_animation::solver::DrivePoseSolver;
    use crate::physics::BodyHandle;
    use crate::skeleton::SkeletonAdapter;
    use crate::test_support::{built_component, humanoid_skeleton, MockBackend};
    use glam::{Quat, Vec3};

    #[test]
    fn test_empty_blend_type_defaults_to_animation() {
        let mut limb = PhysicalAnimationLimb::new("head", LimbType::Head, 0, BodyHandle(1), 1.0);
        assert_eq!(effective_blend_type(&limb), LimbBlendType::PURE_ANIMATION);

        limb.blend_type = LimbBlendType::BLEND_WITH_ANIMATION_POSE;
        limb.prev_blend_type = LimbBlendType::PURE_PHYSICS;
        assert_eq!(
            effective_blend_type(&limb),
            LimbBlendType::BLEND_WITH_ANIMATION_POSE | LimbBlendType::PURE_PHYSICS
        );
    }

    #[test]
    fn test_pure_physics_overrides_blend_flags() {
        let mut limb = PhysicalAnimationLimb::new("hand_l", LimbType::Hand, 0, BodyHandle(1), 1.0);
        limb.blend_type = LimbBlendType::PURE_PHYSICS;
        limb.prev_blend_type = LimbBlendType::BLEND_WITH_ANIMATION_POSE;
        limb.prev_local_pose = Pose::from_translation(Vec3::new(0.0, 2.0, 0.0));

        let anim = Pose::from_translation(Vec3::new(0.0, 1.0, 0.0));
        let physics = Pose::new(Vec3::new(1.0, 1.0, 0.0), Quat::from_rotation_z(1.0));

        let out = blend_limb_pose(&limb, anim, physics, 0.75, 1.0);
        assert!(out.fuzzy_equals(&physics), "{:?}", out);

        // 换成上一帧姿态混合标记也一样
        limb.prev_blend_type = LimbBlendType::BLEND_WITH_PREV_POSE;
        let out = blend_limb_pose(&limb, anim, physics, 0.75, 1.0);
        assert!(out.fuzzy_equals(&physics), "{:?}", out);

        // 整体权重仍然生效
        let out = blend_limb_pose(&limb, anim, physics, 0.75, 0.0);
        assert!(out.fuzzy_equals(&anim), "{:?}", out);
    }

    #[test]
    fn test_pure_animation_is_idempotent() {
        let mut backend = MockBackend::default();
        let mut skeleton = humanoid_skeleton();
        let mut component = built_component(&mut backend, &skeleton);
        for limb in &mut component.limbs {
            limb.blend_type = LimbBlendType::PURE_ANIMATION;
            // 物理姿态随便偏离，不应影响结果
            backend.set_body_pose(limb.body, Pose::new(Vec3::new(5.0, 0.0, 0.0), Quat::from_rotation_x(1.0)));
        }
        component.blend_weight = 1.0;

        let mut pose = skeleton.bind_pose().clone();
        pose.set_joint_rotation(component.joint_ids.lowerarm_l, Quat::from_rotation_z(0.4));
        let world = Pose::from_translation(Vec3::new(1.0, 0.0, 2.0));

        for _ in 0..2 {
            let mut view = CharacterView {
                skeleton: &mut skeleton,
                animation_pose: &pose,
                world,
            };
            DrivePoseSampler.compute_target_poses(&mut component, &view);
            DrivePoseSampler.sample_pose(&mut component, &backend, &mut view);
            component.read_physics_poses(&backend, &world);
            DrivePoseSolver.solve_pose(&mut component);

            for limb in &component.limbs {
                let anim = skeleton_object(&skeleton, &pose, limb.joint_id);
                assert!(limb.target_pose.fuzzy_equals(&anim), "{}", limb.name);
                assert!(limb.adjusted_pose.fuzzy_equals(&anim), "{}", limb.name);
                assert!(component.local_joint_poses[limb.joint_id].fuzzy_equals(&anim), "{}", limb.name);
            }
        }
    }

    #[test]
    fn test_resolved_rotations_are_unit_and_compose() {
        let mut backend = MockBackend::default();
        let mut skeleton = humanoid_skeleton();
        let mut component = built_component(&mut backend, &skeleton);
        for limb in &mut component.limbs {
            limb.blend_type = LimbBlendType::BLEND_WITH_ANIMATION_POSE | LimbBlendType::BLEND_WITH_PREV_POSE;
            let current = backend.body_pose(limb.body).unwrap();
            let nudged = Pose::new(current.translation + Vec3::Y * 0.05, Quat::from_rotation_y(0.3) * current.rotation);
            backend.set_body_pose(limb.body, nudged);
        }
        component.blend_weight = 0.6;

        let pose = skeleton.bind_pose().clone();
        let mut view = CharacterView {
            skeleton: &mut skeleton,
            animation_pose: &pose,
            world: Pose::IDENTITY,
        };
        DrivePoseSampler.sample_pose(&mut component, &backend, &mut view);
        DrivePoseSampler.sample_pose(&mut component, &backend, &mut view);

        for &joint in &component.simulated_joints {
            let resolved = component.local_joint_poses[joint];
            assert!((resolved.rotation.length() - 1.0).abs() < 1e-4);

            let Some(parent) = skeleton.parent_of(joint) else {
                continue;
            };
            // 父关节姿态 * 写回骨骼的局部旋转 = 缓存的模型空间旋转
            let local = skeleton.pose().joint_transform(joint).unwrap().rotation;
            let composed = component.local_joint_poses[parent].rotation * local;
            assert!(crate::math::quat_fuzzy_equals(composed.normalize(), resolved.rotation));
        }
    }

    fn skeleton_object(skeleton: &crate::skeleton::JointSet, pose: &crate::skeleton::SkeletonPose, joint: usize) -> Pose {
        skeleton.object_space_transform(pose, joint).unwrap()
    }
}
