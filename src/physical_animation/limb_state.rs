//! 肢体约束状态机
//!
//! Kinematic → Simulation 立即切换；
//! Simulation → Kinematic 必须经过 Transition，计时满 transition_time 后才完成，
//! 避免刚体从模拟姿态瞬间跳回动画姿态。

use glam::Vec3;

use super::limb::PhysicalAnimationLimb;
use crate::math::{angle_of, map_value, rotation_time_derivative, Pose, EPSILON};
use crate::physics::PhysicsBackend;

/// 肢体状态
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum LimbStateType {
    /// 刚体跟随计算出的世界姿态，无马达
    #[default]
    Kinematic,
    /// 从模拟降级回运动学的过渡
    Transition { blend_time: f32 },
    /// 马达驱动，可被接触推动
    Simulation,
}

impl LimbStateType {
    #[inline]
    pub fn is_kinematic(&self) -> bool {
        matches!(self, LimbStateType::Kinematic)
    }

    #[inline]
    pub fn is_simulation(&self) -> bool {
        matches!(self, LimbStateType::Simulation)
    }

    #[inline]
    fn same_kind(&self, other: &LimbStateType) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

// ============================================================================
// 状态切换
// ============================================================================

/// 状态转移表
///
/// desired 只取 Kinematic 或 Simulation；请求 Transition 视同 Simulation。
pub fn try_switch_to(current: LimbStateType, desired: LimbStateType, transition_time: f32) -> LimbStateType {
    use LimbStateType::*;

    match (current, desired) {
        (Kinematic, Kinematic) => Kinematic,
        (Kinematic, _) => Simulation,
        (Simulation, Kinematic) => Transition { blend_time: 0.0 },
        (Simulation, _) => Simulation,
        (Transition { blend_time }, Kinematic) => {
            if blend_time + EPSILON >= transition_time {
                Kinematic
            } else {
                current
            }
        }
        (Transition { .. }, _) => Simulation,
    }
}

/// 按期望状态切换，处理进入/退出动作
pub fn switch_state(limb: &mut PhysicalAnimationLimb, backend: &mut dyn PhysicsBackend, desired: LimbStateType) {
    let next = try_switch_to(limb.state, desired, limb.transition_time);
    if next.same_kind(&limb.state) {
        return;
    }

    on_exit(limb, backend);
    limb.state = next;
    on_enter(limb, backend);
}

fn on_enter(limb: &mut PhysicalAnimationLimb, backend: &mut dyn PhysicsBackend) {
    match limb.state {
        LimbStateType::Kinematic => backend.set_body_kinematic(limb.body, true),
        LimbStateType::Transition { .. } => limb.state = LimbStateType::Transition { blend_time: 0.0 },
        LimbStateType::Simulation => {}
    }
}

fn on_exit(limb: &mut PhysicalAnimationLimb, backend: &mut dyn PhysicsBackend) {
    match limb.state {
        LimbStateType::Kinematic => backend.set_body_kinematic(limb.body, false),
        LimbStateType::Transition { .. } | LimbStateType::Simulation => reset_drive(limb, backend),
    }
}

/// 驱动目标复位（单位姿态、零速度）
pub fn reset_drive(limb: &PhysicalAnimationLimb, backend: &mut dyn PhysicsBackend) {
    if let Some(drive) = limb.drive_joint {
        backend.set_joint_drive_target(drive.handle, Pose::IDENTITY, Vec3::ZERO);
    }
}

// ============================================================================
// 每帧更新
// ============================================================================

/// 按当前状态推进肢体
///
/// world 为角色世界变换，root_velocity 为根运动速度（世界空间）。
pub fn update_limb(
    limb: &mut PhysicalAnimationLimb,
    backend: &mut dyn PhysicsBackend,
    world: &Pose,
    root_velocity: Vec3,
    dt: f32,
) {
    match limb.state {
        LimbStateType::Kinematic => {
            if let Some(pose) = follow_pose(limb, backend, world) {
                backend.move_kinematic_body(limb.body, pose);
            }
        }
        LimbStateType::Transition { blend_time } => {
            let blend_time = (blend_time + dt).clamp(0.0, limb.transition_time);
            limb.state = LimbStateType::Transition { blend_time };

            let velocity_scale = map_value(blend_time, 0.0, limb.transition_time, 1.0, 0.1);
            update_motor_drive(limb, backend, dt, velocity_scale);

            if let Some(pose) = follow_pose(limb, backend, world) {
                backend.set_body_pose(limb.body, pose);
            }
        }
        LimbStateType::Simulation => {
            let angular_velocity = update_motor_drive(limb, backend, dt, 1.0);
            update_drag_force(limb, backend, world, root_velocity, angular_velocity, dt);
        }
    }
}

/// 运动学跟随姿态
///
/// 子肢体锚定在父刚体的关节坐标系上，旋转取 adjusted_pose；
/// 根肢体直接取 world * adjusted_pose。
fn follow_pose(limb: &PhysicalAnimationLimb, backend: &dyn PhysicsBackend, world: &Pose) -> Option<Pose> {
    match limb.parent_joint {
        Some(joint) => {
            let parent = backend.body_pose(joint.body0)?;
            let anchor = parent * joint.frame0;
            let rotation = (world.rotation * limb.adjusted_pose.rotation).normalize();
            Some(Pose::new(anchor.translation - rotation * joint.frame1.translation, rotation))
        }
        None => Some((*world * limb.adjusted_pose).normalized()),
    }
}

/// 写入驱动目标、目标角速度与自适应阻尼，返回驱动角速度（模型空间）
fn update_motor_drive(
    limb: &PhysicalAnimationLimb,
    backend: &mut dyn PhysicsBackend,
    dt: f32,
    velocity_scale: f32,
) -> Vec3 {
    let delta_rotation = (limb.adjusted_pose.rotation * limb.physics_pose.rotation.conjugate()).normalize();
    let angular_velocity =
        rotation_time_derivative(delta_rotation, dt) * limb.drive_velocity_modifier * velocity_scale;

    let Some(drive) = limb.drive_joint else {
        return angular_velocity;
    };
    if limb.motor_drive.is_none() {
        return angular_velocity;
    }

    // 附着体位于 target_pose
    let attachment_frame = limb.target_pose * drive.frame0;
    let target = (attachment_frame.inverse() * (limb.adjusted_pose * drive.frame1)).normalized();
    backend.set_joint_drive_target(drive.handle, target, angular_velocity);

    let distance = (limb.adjusted_pose.translation - limb.physics_pose.translation).length();
    let angular_damping = limb.calculate_desired_angular_damping(angle_of(delta_rotation));
    let linear_damping = limb.calculate_desired_linear_damping(distance);
    if let (Some(linear), Some(angular)) = (linear_damping, angular_damping) {
        backend.set_joint_drive_damping(drive.handle, linear, angular);
    }

    angular_velocity
}

/// 拖拽力：把刚体速度部分拉向姿态差对应的速度
fn update_drag_force(
    limb: &PhysicalAnimationLimb,
    backend: &mut dyn PhysicsBackend,
    world: &Pose,
    root_velocity: Vec3,
    angular_velocity: Vec3,
    dt: f32,
) {
    let Some(drag) = limb.drag_force else {
        return;
    };
    if dt <= EPSILON {
        return;
    }
    let Some((linear, angular)) = backend.body_velocity(limb.body) else {
        return;
    };

    let delta_position = world.rotation * (limb.adjusted_pose.translation - limb.physics_pose.translation);
    let desired_linear = (delta_position / dt).clamp_length_max(drag.partial_velocity_drive_limit);
    let mut new_linear = linear.lerp(desired_linear, drag.partial_velocity_drive);
    new_linear += root_velocity.clamp_length_max(drag.acceleration_limit) * drag.acceleration_gain;

    let desired_angular = (world.rotation * angular_velocity).clamp_length_max(drag.partial_angular_drive_limit);
    let new_angular = angular.lerp(desired_angular, drag.partial_angular_drive);

    backend.set_body_velocity(limb.body, new_linear, new_angular);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physical_animation::limb::{LimbJoint, LimbType};
    use crate::physical_animation::profile::{DragForceDetails, MotorDriveDetails};
    use crate::physics::{BodyDesc, D6JointDesc, DriveParams};
    use crate::test_support::MockBackend;
    use glam::Quat;

    fn driven_limb(backend: &mut MockBackend) -> PhysicalAnimationLimb {
        let body = backend.create_body(&MockBackend::dynamic_desc("arm_l"));
        let attachment = backend.create_body(&BodyDesc::kinematic_attachment("arm_l_attachment", Pose::IDENTITY, 0.02, 1.0));
        let handle = backend.create_joint(&D6JointDesc::free_drive(
            attachment,
            body,
            DriveParams::default(),
            DriveParams::default(),
            true,
        ));

        let mut limb = PhysicalAnimationLimb::new("arm_l", LimbType::Arm, 1, body, 7.0);
        limb.drive_joint = Some(LimbJoint {
            handle,
            body0: attachment,
            frame0: Pose::IDENTITY,
            frame1: Pose::IDENTITY,
        });
        limb.motor_drive = Some(MotorDriveDetails::default());
        limb
    }

    #[test]
    fn test_transition_table_is_total() {
        use LimbStateType::*;
        let states = [Kinematic, Transition { blend_time: 0.0 }, Transition { blend_time: 0.2 }, Simulation];
        for state in states {
            // 请求 Simulation 一步到位
            assert_eq!(try_switch_to(state, Simulation, 0.2), Simulation);
        }
        assert_eq!(try_switch_to(Simulation, Kinematic, 0.2), Transition { blend_time: 0.0 });
        assert_eq!(try_switch_to(Transition { blend_time: 0.1 }, Kinematic, 0.2), Transition { blend_time: 0.1 });
        assert_eq!(try_switch_to(Transition { blend_time: 0.2 }, Kinematic, 0.2), Kinematic);
    }

    #[test]
    fn test_downgrade_passes_through_transition() {
        let mut backend = MockBackend::default();
        let mut limb = driven_limb(&mut backend);
        let world = Pose::IDENTITY;

        switch_state(&mut limb, &mut backend, LimbStateType::Simulation);
        assert!(limb.state.is_simulation());
        assert!(!backend.body(limb.body).kinematic);

        switch_state(&mut limb, &mut backend, LimbStateType::Kinematic);
        assert_eq!(limb.state, LimbStateType::Transition { blend_time: 0.0 });

        let mut ticks = 0;
        while !limb.state.is_kinematic() {
            update_limb(&mut limb, &mut backend, &world, Vec3::ZERO, 0.05);
            switch_state(&mut limb, &mut backend, LimbStateType::Kinematic);
            ticks += 1;
            assert!(ticks < 10);
        }
        assert_eq!(ticks, 4);
        assert!(backend.body(limb.body).kinematic);
    }

    #[test]
    fn test_simulation_writes_drive_target() {
        let mut backend = MockBackend::default();
        let mut limb = driven_limb(&mut backend);
        switch_state(&mut limb, &mut backend, LimbStateType::Simulation);

        limb.target_pose = Pose::from_translation(Vec3::new(0.0, 1.0, 0.0));
        limb.adjusted_pose = Pose::new(Vec3::new(0.0, 1.0, 0.0), Quat::from_rotation_z(0.6));
        limb.physics_pose = Pose::from_translation(Vec3::new(0.0, 1.0, 0.0));

        update_limb(&mut limb, &mut backend, &Pose::IDENTITY, Vec3::ZERO, 0.1);

        let joint = backend.joint(limb.drive_joint.unwrap().handle);
        assert!(joint.target.fuzzy_equals(&Pose::from_rotation(Quat::from_rotation_z(0.6))));
        assert!((joint.angular_velocity - Vec3::new(0.0, 0.0, 6.0)).length() < 1e-3);
        // 0.6 rad 超过 30°，阻尼取下限
        assert!((joint.angular_damping - 20.0).abs() < 1e-3);
        assert!((joint.linear_damping - 80.0).abs() < 1e-3);

        // 离开模拟时复位驱动
        switch_state(&mut limb, &mut backend, LimbStateType::Kinematic);
        let joint = backend.joint(limb.drive_joint.unwrap().handle);
        assert!(joint.target.fuzzy_equals(&Pose::IDENTITY));
        assert_eq!(joint.angular_velocity, Vec3::ZERO);
    }

    #[test]
    fn test_drag_force_blends_velocity() {
        let mut backend = MockBackend::default();
        let mut limb = driven_limb(&mut backend);
        limb.drag_force = Some(DragForceDetails::default());
        switch_state(&mut limb, &mut backend, LimbStateType::Simulation);

        limb.adjusted_pose = Pose::from_translation(Vec3::new(0.1, 0.0, 0.0));
        limb.physics_pose = Pose::IDENTITY;
        update_limb(&mut limb, &mut backend, &Pose::IDENTITY, Vec3::ZERO, 0.1);

        // 期望速度 1 m/s，与当前 0 按 0.5 插值
        let (linear, _) = backend.body_velocity(limb.body).unwrap();
        assert!((linear - Vec3::new(0.5, 0.0, 0.0)).length() < 1e-4);
    }

    #[test]
    fn test_kinematic_child_follows_parent_frame() {
        let mut backend = MockBackend::default();
        let parent = backend.create_body(&MockBackend::dynamic_desc("parent"));
        backend.set_body_pose(parent, Pose::from_translation(Vec3::new(0.0, 2.0, 0.0)));

        let body = backend.create_body(&MockBackend::dynamic_desc("child"));
        let mut limb = PhysicalAnimationLimb::new("child", LimbType::Forearm, 2, body, 3.0);
        limb.parent_joint = Some(LimbJoint {
            handle: crate::physics::JointHandle(99),
            body0: parent,
            frame0: Pose::from_translation(Vec3::new(0.5, 0.0, 0.0)),
            frame1: Pose::from_translation(Vec3::new(-0.25, 0.0, 0.0)),
        });

        update_limb(&mut limb, &mut backend, &Pose::IDENTITY, Vec3::ZERO, 0.1);
        let pose = backend.body_pose(body).unwrap();
        assert!((pose.translation - Vec3::new(0.75, 2.0, 0.0)).length() < 1e-4);
    }
}
