//! 布娃娃构建器
//!
//! 根据骨骼绑定姿态一次性创建肢体刚体（胶囊/盒子）、肢体间的 D6 关节、
//! 驱动关节的运动学附着体以及骨盆幽灵体。
//!
//! 形状沿局部 +X 放置在两个关节之间；关节坐标系的 X 轴（扭转轴）沿骨骼方向。

use glam::{Quat, Vec2, Vec3};

use super::component::PhysicalAnimationComponent;
use super::limb::{LimbChains, LimbJoint, LimbType, PhysicalAnimationLimb, PhysicsLimbChain};
use super::profile::RagdollProfile;
use crate::math::{shortest_arc, Pose, EPSILON};
use crate::physics::{BodyDesc, BodyKind, D6JointDesc, JointMotion, PhysicsBackend, ShapeDesc};
use crate::skeleton::SkeletonAdapter;
use crate::{RagdollError, Result};

// ============================================================================
// 常量
// ============================================================================

/// 关节限位的刚度与阻尼
const LIMIT_STIFFNESS: f32 = 250.0;
const LIMIT_DAMPING: f32 = 30.0;

/// 附着体与骨盆幽灵体的半边长
const ATTACHMENT_HALF_EXTENT: f32 = 0.02;
const PELVIS_GHOST_HALF_EXTENT: f32 = 0.01;

/// 躯干胶囊半径 = 关节间距 * 该系数
const BODY_RADIUS_FACTOR: f32 = 0.65;

/// 脚盒子高度下限，防止脚与脚尖同高时退化
const MIN_FOOT_HEIGHT: f32 = 0.02;

/// 关节限位（角度制）：扭转 ±twist，摆动 swing_y / swing_z
///
/// swing_offset: 关节坐标系绕 Y 轴预先旋转的角度，使摆动范围前后不对称
#[derive(Clone, Copy, Debug)]
struct JointLimits {
    twist: f32,
    swing_y: f32,
    swing_z: f32,
    swing_offset: f32,
}

impl JointLimits {
    const fn new(twist: f32, swing_y: f32, swing_z: f32, swing_offset: f32) -> Self {
        Self { twist, swing_y, swing_z, swing_offset }
    }
}

const HEAD_LIMITS: JointLimits = JointLimits::new(45.0, 40.0, 40.0, 0.0);
// 后仰 10°
const BODY_UPPER_LIMITS: JointLimits = JointLimits::new(10.0, 17.5, 15.0, 7.5);
// 后仰 4°
const BODY_MIDDLE_LIMITS: JointLimits = JointLimits::new(4.0, 6.0, 4.0, 2.0);
// 前举 90°，后摆 22.5°
const ARM_LIMITS: JointLimits = JointLimits::new(55.0, 56.25, 60.0, 33.75);
// 肘只向一侧弯
const FOREARM_LIMITS: JointLimits = JointLimits::new(10.0, 45.0, 4.0, 45.0);
const HAND_LIMITS: JointLimits = JointLimits::new(8.0, 22.0, 40.0, 0.0);
// 后摆 5°
const THIGH_LIMITS: JointLimits = JointLimits::new(6.0, 25.0, 35.0, 20.0);
// 膝只向一侧弯
const CALF_LIMITS: JointLimits = JointLimits::new(10.0, 45.0, 5.0, 45.0);
const FOOT_LIMITS: JointLimits = JointLimits::new(17.0, 35.0, 22.5, 0.0);

// ============================================================================
// 形状放置
// ============================================================================

/// 放置好的形状：center 为形状中心（模型空间），bottom 为靠近父关节一端的关节坐标系
#[derive(Clone, Copy, Debug)]
struct SegmentShape {
    shape: ShapeDesc,
    center: Pose,
    bottom: Pose,
}

/// 两点之间的盒子，size.x 沿 from → to
fn box_between(from: Vec3, to: Vec3, size: Vec3) -> SegmentShape {
    let direction = (to - from).normalize_or_zero();
    let rotation = shortest_arc(Vec3::X, direction);
    let center = (from + to) * 0.5;

    SegmentShape {
        shape: ShapeDesc::Box { half_extents: size * 0.5 },
        center: Pose::new(center, rotation),
        bottom: Pose::new(center - direction * size.x * 0.5, rotation),
    }
}

/// 给定半径的胶囊，柱体长度 = (关节间距 - 2r) * height_multiplier
fn capsule_from_radius(from: Vec3, to: Vec3, radius: f32, height_multiplier: f32) -> SegmentShape {
    let offset = to - from;
    let direction = offset.normalize_or_zero();
    let height = ((offset.length() - 2.0 * radius) * height_multiplier).max(0.0);
    let rotation = shortest_arc(Vec3::X, direction);
    let center = from + offset * 0.5;

    SegmentShape {
        shape: ShapeDesc::Capsule { radius, half_height: height * 0.5 },
        center: Pose::new(center, rotation),
        bottom: Pose::new(center - direction * (radius + height * 0.5), rotation),
    }
}

/// 给定总长的横向躯干胶囊
///
/// 胶囊轴垂直于 from → to，半径随关节间距放大。
fn capsule_from_height(from: Vec3, to: Vec3, height: f32, radius_modifier: f32) -> SegmentShape {
    let offset = to - from;
    let direction = offset.normalize_or_zero();
    let radius = offset.length() * BODY_RADIUS_FACTOR * radius_modifier;
    let mut height = height;
    if height - 2.0 * radius > EPSILON {
        height -= 2.0 * radius;
    }

    let center = from + offset * 0.5;
    SegmentShape {
        shape: ShapeDesc::Capsule { radius, half_height: height * 0.5 },
        center: Pose::new(center, shortest_arc(Vec3::Y, direction)),
        bottom: Pose::new(center - direction * radius, shortest_arc(Vec3::X, direction)),
    }
}

/// 关节坐标系绕自身 Y 轴旋转，用于把摆动限位的中心偏到自然姿态
fn rotated_frame(frame: Pose, degrees: f32) -> Pose {
    let axis = (frame.rotation * Vec3::Y).normalize_or_zero();
    if degrees == 0.0 || axis == Vec3::ZERO {
        return frame;
    }
    Pose::new(
        frame.translation,
        (Quat::from_axis_angle(axis, degrees.to_radians()) * frame.rotation).normalize(),
    )
}

#[inline]
fn limit_motion(degrees: f32) -> JointMotion {
    if degrees.abs() <= EPSILON {
        JointMotion::Locked
    } else {
        JointMotion::Limited
    }
}

// ============================================================================
// 构建器
// ============================================================================

/// 单个肢体的创建参数
struct LimbLayout<'s> {
    name: &'s str,
    limb_type: LimbType,
    joint_id: usize,
    segment: SegmentShape,
    /// 形状局部位置修正
    shape_adjustment: Vec3,
    mass: f32,
    parent: Option<usize>,
}

/// 布娃娃构建器
pub struct RagdollBuilder<'a> {
    backend: &'a mut dyn PhysicsBackend,
    skeleton: &'a dyn SkeletonAdapter,
    world: Pose,
    profile: &'a RagdollProfile,
    /// 各肢体关节的模型空间姿态（与 component.limbs 一一对应）
    limb_poses: Vec<Pose>,
}

impl<'a> RagdollBuilder<'a> {
    pub fn new(
        backend: &'a mut dyn PhysicsBackend,
        skeleton: &'a dyn SkeletonAdapter,
        world: Pose,
        profile: &'a RagdollProfile,
    ) -> Self {
        Self {
            backend,
            skeleton,
            world,
            profile,
            limb_poses: Vec::new(),
        }
    }

    /// 绑定姿态下关节的模型空间姿态
    fn object_pose(&self, joint: usize) -> Result<Pose> {
        self.skeleton
            .object_space_transform(self.skeleton.bind_pose(), joint)
            .map(Pose::normalized)
            .ok_or(RagdollError::InvalidJoint {
                joint,
                count: self.skeleton.joint_count(),
            })
    }

    #[inline]
    fn position(&self, joint: usize) -> Result<Vec3> {
        Ok(self.object_pose(joint)?.translation)
    }

    /// 构建布娃娃，已构建的组件会先销毁旧刚体
    pub fn build(mut self, component: &mut PhysicalAnimationComponent) -> Result<()> {
        let ids = component.joint_ids;
        ids.validate(self.skeleton)?;

        if component.is_built() {
            component.destroy(self.backend);
        }

        let settings = component.settings.clone();
        let mass = component.mass;

        // ========== 关键点 ==========
        let neck = self.position(ids.neck)? + settings.neck_joint_adjustment;
        let head_end = self.position(ids.head_end)? + settings.head_end_joint_adjustment;
        let thorax = self.position(ids.spine_03)?;
        let abdomen = self.position(ids.spine_01)?;
        let pelvis = self.position(ids.pelvis)?;
        let middle = abdomen.lerp(thorax, 0.5);

        let distance_between_arms = (self.position(ids.upperarm_l)? - self.position(ids.upperarm_r)?).length();
        let hand_length = (self.position(ids.hand_l)? - self.position(ids.hand_end_l)?).length();
        let foot = self.position(ids.foot_l)?;
        let foot_end = self.position(ids.foot_end_l)?;
        let foot_length = (foot - foot_end).length();
        let foot_height = (foot.y - foot_end.y).abs();

        // ========== 躯干 ==========
        let lower_segment = capsule_from_height(
            pelvis,
            middle,
            distance_between_arms * settings.lower_body_height_modifier,
            settings.lower_body_radius_modifier,
        );
        let body_lower = self.add_limb(
            component,
            LimbLayout {
                name: "body_lower",
                limb_type: LimbType::BodyLower,
                joint_id: ids.pelvis,
                segment: lower_segment,
                shape_adjustment: settings.pelvis_joint_adjustment,
                mass: mass * settings.body_lower_mass_percentage,
                parent: None,
            },
        )?;

        let middle_segment = capsule_from_height(
            abdomen,
            thorax,
            distance_between_arms * settings.middle_body_height_modifier,
            settings.middle_body_radius_modifier,
        );
        let body_middle = self.add_limb(
            component,
            LimbLayout {
                name: "body_middle",
                limb_type: LimbType::BodyMiddle,
                joint_id: ids.spine_01,
                segment: middle_segment,
                shape_adjustment: settings.abdomen_joint_adjustment,
                mass: mass * settings.body_lower_mass_percentage,
                parent: Some(body_lower),
            },
        )?;
        self.connect(component, body_lower, body_middle, middle_segment.bottom, BODY_MIDDLE_LIMITS);

        let upper_segment = capsule_from_height(
            middle,
            neck,
            distance_between_arms * settings.upper_body_height_modifier,
            settings.upper_body_radius_modifier,
        );
        let body_upper = self.add_limb(
            component,
            LimbLayout {
                name: "body_upper",
                limb_type: LimbType::BodyUpper,
                joint_id: ids.spine_03,
                segment: upper_segment,
                shape_adjustment: settings.thorax_joint_adjustment,
                mass: mass * settings.body_upper_mass_percentage,
                parent: Some(body_middle),
            },
        )?;
        self.connect(component, body_middle, body_upper, upper_segment.bottom, BODY_UPPER_LIMITS);

        // ========== 头 ==========
        let head_segment = capsule_from_radius(neck, head_end, settings.head_radius, 1.0);
        let head = self.add_limb(
            component,
            LimbLayout {
                name: "head",
                limb_type: LimbType::Head,
                joint_id: ids.head,
                segment: head_segment,
                shape_adjustment: settings.head_joint_adjustment,
                mass: mass * settings.head_mass_percentage,
                parent: Some(body_upper),
            },
        )?;
        self.connect(component, body_upper, head, head_segment.bottom, HEAD_LIMITS);

        // ========== 手臂 ==========
        let arm_joints = [
            ("l", ids.upperarm_l, ids.lowerarm_l, ids.hand_l, ids.hand_end_l),
            ("r", ids.upperarm_r, ids.lowerarm_r, ids.hand_r, ids.hand_end_r),
        ];
        let mut arm_chains = Vec::with_capacity(2);
        for (side, arm_id, forearm_id, hand_id, hand_end_id) in arm_joints {
            let arm_pos = self.position(arm_id)?;
            let forearm_pos = self.position(forearm_id)?;
            let hand_pos = self.position(hand_id)?;
            let hand_end_pos = self.position(hand_end_id)?;

            let arm_segment = capsule_from_radius(arm_pos, forearm_pos, settings.arm_radius, 1.5);
            let arm = self.add_limb(
                component,
                LimbLayout {
                    name: &format!("arm_{}", side),
                    limb_type: LimbType::Arm,
                    joint_id: arm_id,
                    segment: arm_segment,
                    shape_adjustment: Vec3::ZERO,
                    mass: mass * settings.arm_mass_percentage,
                    parent: Some(body_upper),
                },
            )?;
            self.connect(component, body_upper, arm, arm_segment.bottom, ARM_LIMITS);

            let forearm_segment = capsule_from_radius(forearm_pos, hand_pos, settings.forearm_radius, 1.5);
            let forearm = self.add_limb(
                component,
                LimbLayout {
                    name: &format!("forearm_{}", side),
                    limb_type: LimbType::Forearm,
                    joint_id: forearm_id,
                    segment: forearm_segment,
                    shape_adjustment: Vec3::ZERO,
                    mass: mass * settings.forearm_mass_percentage,
                    parent: Some(arm),
                },
            )?;
            self.connect(component, arm, forearm, forearm_segment.bottom, FOREARM_LIMITS);

            let hand_segment = box_between(
                hand_pos,
                hand_end_pos,
                Vec3::new(hand_length, settings.hand_height, settings.hand_width),
            );
            let hand = self.add_limb(
                component,
                LimbLayout {
                    name: &format!("hand_{}", side),
                    limb_type: LimbType::Hand,
                    joint_id: hand_id,
                    segment: hand_segment,
                    shape_adjustment: Vec3::ZERO,
                    mass: mass * settings.hand_mass_percentage,
                    parent: Some(forearm),
                },
            )?;
            self.connect(component, forearm, hand, hand_segment.bottom, HAND_LIMITS);

            arm_chains.push(PhysicsLimbChain::new(vec![arm, forearm, hand]));
        }

        // ========== 腿 ==========
        let leg_joints = [
            ("l", ids.thigh_l, ids.calf_l, ids.foot_l, ids.foot_end_l),
            ("r", ids.thigh_r, ids.calf_r, ids.foot_r, ids.foot_end_r),
        ];
        let mut leg_chains = Vec::with_capacity(2);
        for (side, thigh_id, calf_id, foot_id, foot_end_id) in leg_joints {
            let thigh_pos = self.position(thigh_id)?;
            let calf_pos = self.position(calf_id)?;
            let foot_pos = self.position(foot_id)?;
            let foot_end_pos = self.position(foot_end_id)?;

            let thigh_segment = capsule_from_radius(thigh_pos, calf_pos, settings.up_leg_radius * 1.1, 1.1);
            let thigh = self.add_limb(
                component,
                LimbLayout {
                    name: &format!("thigh_{}", side),
                    limb_type: LimbType::Leg,
                    joint_id: thigh_id,
                    segment: thigh_segment,
                    shape_adjustment: Vec3::ZERO,
                    mass: mass * settings.up_leg_mass_percentage,
                    parent: Some(body_lower),
                },
            )?;
            self.connect(component, body_lower, thigh, thigh_segment.bottom, THIGH_LIMITS);

            let calf_segment = capsule_from_radius(calf_pos, foot_pos, settings.leg_radius * 1.2, 1.3);
            let calf = self.add_limb(
                component,
                LimbLayout {
                    name: &format!("calf_{}", side),
                    limb_type: LimbType::Calf,
                    joint_id: calf_id,
                    segment: calf_segment,
                    shape_adjustment: Vec3::ZERO,
                    mass: mass * settings.leg_mass_percentage,
                    parent: Some(thigh),
                },
            )?;
            self.connect(component, thigh, calf, calf_segment.bottom, CALF_LIMITS);

            // 脚盒子水平放置，底面与脚尖齐平
            let toe_same_height = Vec3::new(foot_end_pos.x, foot_pos.y, foot_end_pos.z);
            let offset = toe_same_height - foot_pos;
            let center = foot_pos + offset * 0.5 - Vec3::new(0.0, foot_height * 0.5, 0.0);
            let foot_segment = box_between(
                center - offset * 0.5,
                center + offset * 0.5,
                Vec3::new(foot_length, (foot_height * 2.0).max(MIN_FOOT_HEIGHT), settings.foot_width),
            );
            let foot = self.add_limb(
                component,
                LimbLayout {
                    name: &format!("foot_{}", side),
                    limb_type: LimbType::Foot,
                    joint_id: foot_id,
                    segment: foot_segment,
                    shape_adjustment: Vec3::ZERO,
                    mass: mass * settings.foot_mass_percentage,
                    parent: Some(calf),
                },
            )?;
            self.connect(component, calf, foot, foot_segment.bottom, FOOT_LIMITS);

            leg_chains.push(PhysicsLimbChain::new(vec![thigh, calf, foot]));
        }

        // ========== 骨盆幽灵体 ==========
        let pelvis_limb = &component.limbs[body_lower];
        let pelvis_body = pelvis_limb.body;
        let pelvis_world = (self.world * self.limb_poses[body_lower]).normalized();
        let ghost = self.backend.create_body(&BodyDesc::kinematic_attachment(
            "pelvis_ghost",
            pelvis_world,
            PELVIS_GHOST_HALF_EXTENT,
            pelvis_limb.mass,
        ));
        let ghost_joint = self
            .backend
            .create_joint(&D6JointDesc::fixed(ghost, pelvis_body, Pose::IDENTITY, Pose::IDENTITY));
        component.pelvis_ghost = Some(ghost);
        component.pelvis_joint = Some(ghost_joint);

        // ========== 肢体链 ==========
        let mut arm_chains = arm_chains.into_iter();
        let mut leg_chains = leg_chains.into_iter();
        component.chains = LimbChains {
            neck: PhysicsLimbChain::new(vec![head]),
            body: PhysicsLimbChain::new(vec![body_lower, body_middle, body_upper]),
            left_arm: arm_chains.next().unwrap_or_default(),
            right_arm: arm_chains.next().unwrap_or_default(),
            left_leg: leg_chains.next().unwrap_or_default(),
            right_leg: leg_chains.next().unwrap_or_default(),
        };

        // ========== 采样范围与缓存 ==========
        component.root_joint_id = ids.attachment();
        component.simulated_joints.clear();
        for limb in &component.limbs {
            let mut current = Some(limb.joint_id);
            while let Some(joint) = current {
                if !component.simulated_joints.insert(joint) {
                    break;
                }
                current = self.skeleton.parent_of(joint);
            }
        }

        let joint_count = self.skeleton.joint_count();
        component.local_target_poses = (0..joint_count)
            .map(|joint| self.object_pose(joint).unwrap_or(Pose::IDENTITY))
            .collect();
        component.local_joint_poses = component.local_target_poses.clone();
        component.loaded = false;

        log::info!(
            "[Ragdoll] 构建完成: {} 个肢体, {} 个关节, 采样 {} 个骨骼关节",
            component.limbs.len(),
            component.joints().len(),
            component.simulated_joints.len()
        );
        Ok(())
    }

    /// 创建肢体刚体及其驱动附着体
    fn add_limb(&mut self, component: &mut PhysicalAnimationComponent, layout: LimbLayout<'_>) -> Result<usize> {
        let joint_pose = self.object_pose(layout.joint_id)?;
        let body_pose = (self.world * joint_pose).normalized();

        let mut shape_local = (joint_pose.inverse() * layout.segment.center).normalized();
        shape_local.translation += layout.shape_adjustment;

        let body = self.backend.create_body(&BodyDesc {
            name: layout.name.to_string(),
            pose: body_pose,
            shape: layout.segment.shape,
            shape_local,
            mass: layout.mass,
            kind: BodyKind::Dynamic,
            simulated: false,
            collidable: true,
            use_gravity: false,
            ccd: true,
            linear_damping: 0.1,
            angular_damping: 0.2,
            position_iterations: 16,
            velocity_iterations: 8,
            sleep_threshold: 0.01,
        });
        // 肢体初始处于 Kinematic 状态
        self.backend.set_body_kinematic(body, true);

        let details = self.profile.details(layout.limb_type);
        let mut limb = PhysicalAnimationLimb::new(layout.name, layout.limb_type, layout.joint_id, body, layout.mass);
        limb.parent_limb = layout.parent;
        limb.blend_type = details.blend_type;
        limb.motor_drive = details.motor_drive;
        limb.drag_force = details.drag_force;
        limb.target_pose = joint_pose;
        limb.physics_pose = joint_pose;
        limb.adjusted_pose = joint_pose;

        if let Some(motor) = details.motor_drive {
            let attachment = self.backend.create_body(&BodyDesc::kinematic_attachment(
                format!("{}_attachment", layout.name),
                body_pose,
                ATTACHMENT_HALF_EXTENT,
                layout.mass,
            ));
            let (linear, angular) = motor.drive_params();
            let handle = self.backend.create_joint(&D6JointDesc::free_drive(
                attachment,
                body,
                linear,
                angular,
                motor.enable_slerp_drive,
            ));
            limb.drive_joint = Some(LimbJoint {
                handle,
                body0: attachment,
                frame0: Pose::IDENTITY,
                frame1: Pose::IDENTITY,
            });
        }

        let index = component.limbs.len();
        component.limb_by_joint.insert(layout.joint_id, index);
        component.limbs.push(limb);
        self.limb_poses.push(joint_pose);
        Ok(index)
    }

    /// 父子肢体之间的 D6 关节，bottom 为子肢体形状靠近父关节一端的模型空间坐标系
    fn connect(
        &mut self,
        component: &mut PhysicalAnimationComponent,
        parent: usize,
        child: usize,
        bottom: Pose,
        limits: JointLimits,
    ) {
        let frame = rotated_frame(bottom, limits.swing_offset);
        let parent_body = component.limbs[parent].body;
        let child_body = component.limbs[child].body;
        let frame0 = (self.limb_poses[parent].inverse() * frame).normalized();
        let frame1 = (self.limb_poses[child].inverse() * frame).normalized();

        let twist = limits.twist.to_radians();
        let desc = D6JointDesc {
            linear_motion: JointMotion::Locked,
            twist_motion: limit_motion(limits.twist),
            twist_limits: Vec2::new(-twist, twist),
            swing_y_motion: limit_motion(limits.swing_y),
            swing_y_limit: limits.swing_y.to_radians(),
            swing_z_motion: limit_motion(limits.swing_z),
            swing_z_limit: limits.swing_z.to_radians(),
            limit_stiffness: LIMIT_STIFFNESS,
            limit_damping: LIMIT_DAMPING,
            ..D6JointDesc::fixed(parent_body, child_body, frame0, frame1)
        };
        let handle = self.backend.create_joint(&desc);

        component.limbs[child].parent_joint = Some(LimbJoint {
            handle,
            body0: parent_body,
            frame0,
            frame1,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physical_animation::settings::RagdollJointIds;
    use crate::test_support::{humanoid_skeleton, MockBackend};
    use std::collections::BTreeSet;

    fn build(backend: &mut MockBackend) -> PhysicalAnimationComponent {
        let skeleton = humanoid_skeleton();
        let mut component = PhysicalAnimationComponent::default();
        component.joint_ids = RagdollJointIds::from_skeleton(&skeleton).unwrap();
        let profile = RagdollProfile::idle();
        RagdollBuilder::new(backend, &skeleton, Pose::IDENTITY, &profile)
            .build(&mut component)
            .unwrap();
        component
    }

    #[test]
    fn test_build_creates_unique_limbs() {
        let mut backend = MockBackend::default();
        let component = build(&mut backend);

        assert_eq!(component.limbs.len(), 16);
        let joints: BTreeSet<usize> = component.limbs.iter().map(|limb| limb.joint_id).collect();
        assert_eq!(joints.len(), component.limbs.len());

        // 父肢体总在子肢体之前
        for (index, limb) in component.limbs.iter().enumerate() {
            match limb.parent_limb {
                Some(parent) => {
                    assert!(parent < index);
                    assert!(limb.parent_joint.is_some());
                }
                None => assert_eq!(limb.limb_type, LimbType::BodyLower),
            }
        }

        // 空骨盆以外有马达的肢体都有驱动关节
        let driven = component.limbs.iter().filter(|limb| limb.drive_joint.is_some()).count();
        assert_eq!(driven, 15);
        assert!(component.pelvis_ghost.is_some());
        assert_eq!(component.chains.left_arm.limbs.len(), 3);
        assert_eq!(component.chains.body.limbs.len(), 3);
    }

    #[test]
    fn test_limb_bodies_start_at_joint_pose() {
        let mut backend = MockBackend::default();
        let component = build(&mut backend);
        let skeleton = humanoid_skeleton();

        for limb in &component.limbs {
            let expected = skeleton.object_space_transform(skeleton.bind_pose(), limb.joint_id).unwrap();
            let body = backend.body(limb.body);
            assert!(body.pose.fuzzy_equals(&expected), "{}", limb.name);
            assert!(body.kinematic);
            assert!(!body.simulated);
            assert!(body.desc.ccd);
            assert_eq!(body.desc.position_iterations, 16);
        }
    }

    #[test]
    fn test_joint_limits() {
        let mut backend = MockBackend::default();
        let component = build(&mut backend);

        let hand = component.limb_by_name("hand_l").unwrap();
        let desc = &backend.joint(hand.parent_joint.unwrap().handle).desc;
        assert_eq!(desc.linear_motion, JointMotion::Locked);
        assert_eq!(desc.twist_motion, JointMotion::Limited);
        assert!((desc.twist_limits.y - 8.0_f32.to_radians()).abs() < 1e-5);
        assert!((desc.swing_z_limit - 40.0_f32.to_radians()).abs() < 1e-5);
        assert!((desc.limit_stiffness - 250.0).abs() < 1e-4);
        assert!(!desc.enable_collision);

        // 关节坐标系在父子两侧对应同一个世界位置
        let joint = hand.parent_joint.unwrap();
        let parent_pose = backend.body(joint.body0).pose;
        let child_pose = backend.body(hand.body).pose;
        let a = (parent_pose * joint.frame0).translation;
        let b = (child_pose * joint.frame1).translation;
        assert!((a - b).length() < 1e-4);
    }

    #[test]
    fn test_rebuild_is_deterministic() {
        let mut first = MockBackend::default();
        let mut second = MockBackend::default();
        let a = build(&mut first);
        let b = build(&mut second);

        assert_eq!(first.joints.len(), second.joints.len());
        for (ja, jb) in first.joints.values().zip(second.joints.values()) {
            assert_eq!(ja.desc, jb.desc);
        }
        let ids_a: Vec<usize> = a.limbs.iter().map(|limb| limb.joint_id).collect();
        let ids_b: Vec<usize> = b.limbs.iter().map(|limb| limb.joint_id).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn test_rebuild_replaces_old_bodies() {
        let mut backend = MockBackend::default();
        let skeleton = humanoid_skeleton();
        let mut component = build(&mut backend);
        let bodies = backend.bodies.len();
        let joints = backend.joints.len();

        let profile = RagdollProfile::idle();
        RagdollBuilder::new(&mut backend, &skeleton, Pose::IDENTITY, &profile)
            .build(&mut component)
            .unwrap();
        assert_eq!(backend.bodies.len(), bodies);
        assert_eq!(backend.joints.len(), joints);
    }

    #[test]
    fn test_simulated_joints_include_ancestors() {
        let mut backend = MockBackend::default();
        let component = build(&mut backend);
        let skeleton = humanoid_skeleton();

        for &joint in &component.simulated_joints {
            if let Some(parent) = skeleton.parent_of(joint) {
                assert!(component.simulated_joints.contains(&parent));
            }
        }
        assert!(component.simulated_joints.contains(&skeleton.find_joint("root").unwrap()));
        assert!(!component.simulated_joints.contains(&skeleton.find_joint("head_end").unwrap()));
    }

    #[test]
    fn test_segment_geometry() {
        let capsule = capsule_from_radius(Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), 0.1, 1.0);
        assert!(matches!(capsule.shape, ShapeDesc::Capsule { half_height, .. } if (half_height - 0.4).abs() < 1e-5));
        assert!(capsule.bottom.translation.length() < 1e-5);

        let torso = capsule_from_height(Vec3::ZERO, Vec3::new(0.0, 0.2, 0.0), 0.5, 1.0);
        // r = 0.13，柱体长度 0.5 - 0.26
        assert!(matches!(torso.shape, ShapeDesc::Capsule { radius, half_height }
            if (radius - 0.13).abs() < 1e-5 && (half_height - 0.12).abs() < 1e-5));
        // 胶囊轴横向
        assert!((torso.center.rotation * Vec3::X).y.abs() < 1e-5);
    }
}
