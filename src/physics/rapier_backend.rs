//! Rapier 物理世界
//!
//! PhysicsBackend 的默认实现。
//! 刚体/碰撞体/关节都保存在 Rapier 的集合里，对外只暴露 u32 句柄。
//! 流程：create_body / create_joint → 每帧 [move_kinematic_body → step → body_pose]

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use glam::{Quat, Vec3};
use rapier3d::na::{Isometry3, Quaternion, Translation3, UnitQuaternion};
use rapier3d::prelude::*;

use super::config::get_config;
use super::{
    BodyDesc, BodyHandle, BodyKind, ContactEvent, D6JointDesc, DriveParams, JointHandle,
    JointMotion, PhysicsBackend, ShapeDesc,
};
use crate::math::Pose;

// ============================================================================
// 坐标转换
// ============================================================================

#[inline]
fn to_isometry(pose: &Pose) -> Isometry3<f32> {
    let t = pose.translation;
    let r = pose.rotation;
    Isometry3::from_parts(
        Translation3::new(t.x, t.y, t.z),
        UnitQuaternion::new_normalize(Quaternion::new(r.w, r.x, r.y, r.z)),
    )
}

#[inline]
fn from_isometry(iso: &Isometry3<f32>) -> Pose {
    let c = iso.rotation.coords;
    Pose::new(
        Vec3::new(iso.translation.x, iso.translation.y, iso.translation.z),
        Quat::from_xyzw(c.x, c.y, c.z, c.w),
    )
}

#[inline]
fn to_vector(v: Vec3) -> Vector<Real> {
    vector![v.x, v.y, v.z]
}

// ============================================================================
// 接触事件收集
// ============================================================================

/// 在 step 内收集碰撞开始/结束事件
#[derive(Default)]
struct ContactCollector {
    events: Mutex<Vec<(ColliderHandle, ColliderHandle, bool)>>,
}

impl EventHandler for ContactCollector {
    fn handle_collision_event(
        &self,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        event: CollisionEvent,
        _contact_pair: Option<&ContactPair>,
    ) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((event.collider1(), event.collider2(), event.started()));
    }

    fn handle_contact_force_event(
        &self,
        _dt: Real,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        _contact_pair: &ContactPair,
        _total_force_magnitude: Real,
    ) {
    }
}

// ============================================================================
// 关节记录
// ============================================================================

/// 驱动关节的当前参数（Rapier 电机按轴设置，需要整体重写）
#[derive(Clone, Copy)]
struct DriveState {
    linear_drive: Option<DriveParams>,
    angular_drive: Option<DriveParams>,
    target: Pose,
    angular_velocity: Vec3,
}

struct JointRecord {
    handle: ImpulseJointHandle,
    drive: DriveState,
}

const LINEAR_AXES: [JointAxis; 3] = [JointAxis::LinX, JointAxis::LinY, JointAxis::LinZ];
const ANGULAR_AXES: [JointAxis; 3] = [JointAxis::AngX, JointAxis::AngY, JointAxis::AngZ];

fn motor_model(params: &DriveParams) -> MotorModel {
    if params.accelerated {
        MotorModel::AccelerationBased
    } else {
        MotorModel::ForceBased
    }
}

/// 刚体额外求解迭代次数（Rapier 不区分位置/速度迭代）
fn additional_solver_iterations(desc: &BodyDesc) -> usize {
    desc.position_iterations.max(desc.velocity_iterations).saturating_sub(1) as usize
}

/// 将驱动目标写入关节电机
///
/// 三个角轴使用同一组参数，slerp_drive 对结果没有影响。
fn apply_motors(joint: &mut GenericJoint, drive: &DriveState) {
    if let Some(linear) = drive.linear_drive {
        let t = drive.target.translation.to_array();
        for (i, axis) in LINEAR_AXES.into_iter().enumerate() {
            joint.set_motor_model(axis, motor_model(&linear));
            joint.set_motor(axis, t[i], 0.0, linear.stiffness, linear.damping);
            joint.set_motor_max_force(axis, linear.force_limit);
        }
    }
    if let Some(angular) = drive.angular_drive {
        let (x, y, z) = drive.target.rotation.to_euler(glam::EulerRot::XYZ);
        let angles = [x, y, z];
        let velocity = drive.angular_velocity.to_array();
        for (i, axis) in ANGULAR_AXES.into_iter().enumerate() {
            joint.set_motor_model(axis, motor_model(&angular));
            joint.set_motor(axis, angles[i], velocity[i], angular.stiffness, angular.damping);
            joint.set_motor_max_force(axis, angular.force_limit);
        }
    }
}

// ============================================================================
// RapierWorld
// ============================================================================

/// Rapier 物理世界
pub struct RapierWorld {
    bodies: RigidBodySet,
    colliders: ColliderSet,
    integration_parameters: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,
    gravity: Vector<Real>,

    /// 句柄映射
    body_map: HashMap<BodyHandle, RigidBodyHandle>,
    body_lookup: HashMap<RigidBodyHandle, BodyHandle>,
    joint_map: HashMap<JointHandle, JointRecord>,

    next_body: u32,
    next_joint: u32,

    /// 物理 FPS
    fps: f32,
    /// 最大子步数
    max_substep_count: u32,

    collector: ContactCollector,
    /// 自上次 drain 以来的接触事件
    pending_events: Vec<ContactEvent>,
}

impl Default for RapierWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl RapierWorld {
    /// 按全局配置创建物理世界
    pub fn new() -> Self {
        let config = get_config();
        let mut integration_parameters = IntegrationParameters::default();
        if let Some(iterations) = NonZeroUsize::new(config.solver_iterations) {
            integration_parameters.num_solver_iterations = iterations;
        }

        if config.debug_log {
            log::info!(
                "[Rapier] 物理世界创建: FPS={}, 重力Y={}, 迭代={}",
                config.physics_fps, config.gravity_y, config.solver_iterations
            );
        }

        Self {
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            integration_parameters,
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            gravity: vector![0.0, config.gravity_y, 0.0],
            body_map: HashMap::new(),
            body_lookup: HashMap::new(),
            joint_map: HashMap::new(),
            next_body: 1,
            next_joint: 1,
            fps: config.physics_fps.max(1.0),
            max_substep_count: config.max_substep_count.max(1),
            collector: ContactCollector::default(),
            pending_events: Vec::new(),
        }
    }

    /// 设置重力
    pub fn set_gravity(&mut self, x: f32, y: f32, z: f32) {
        self.gravity = vector![x, y, z];
    }

    pub fn body_count(&self) -> usize { self.body_map.len() }
    pub fn joint_count(&self) -> usize { self.joint_map.len() }

    #[inline]
    fn body_mut(&mut self, body: BodyHandle) -> Option<&mut RigidBody> {
        let handle = *self.body_map.get(&body)?;
        self.bodies.get_mut(handle)
    }

    fn build_collider(desc: &BodyDesc) -> Collider {
        let builder = match desc.shape {
            ShapeDesc::Capsule { radius, half_height } => ColliderBuilder::capsule_x(half_height, radius),
            ShapeDesc::Box { half_extents } => {
                ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
            }
        };

        let builder = builder
            .position(to_isometry(&desc.shape_local))
            .mass(desc.mass.max(0.001));

        if desc.collidable {
            builder.active_events(ActiveEvents::COLLISION_EVENTS).build()
        } else {
            builder.collision_groups(InteractionGroups::none()).build()
        }
    }

    /// 把碰撞体事件转换为刚体事件（刚体已删除的跳过）
    fn collect_events(&mut self) {
        let raw: Vec<_> = std::mem::take(
            &mut *self.collector.events.lock().unwrap_or_else(|e| e.into_inner()),
        );
        for (c0, c1, started) in raw {
            let parent0 = self.colliders.get(c0).and_then(|c| c.parent());
            let parent1 = self.colliders.get(c1).and_then(|c| c.parent());
            let (Some(p0), Some(p1)) = (parent0, parent1) else {
                continue;
            };
            let (Some(&body0), Some(&body1)) = (self.body_lookup.get(&p0), self.body_lookup.get(&p1)) else {
                continue;
            };
            self.pending_events.push(ContactEvent { body0, body1, started });
        }
    }
}

impl PhysicsBackend for RapierWorld {
    fn create_body(&mut self, desc: &BodyDesc) -> BodyHandle {
        let body_type = match desc.kind {
            BodyKind::Dynamic => RigidBodyType::Dynamic,
            BodyKind::Kinematic => RigidBodyType::KinematicPositionBased,
        };

        let body = RigidBodyBuilder::new(body_type)
            .position(to_isometry(&desc.pose))
            .linear_damping(desc.linear_damping)
            .angular_damping(desc.angular_damping)
            .gravity_scale(if desc.use_gravity { 1.0 } else { 0.0 })
            .ccd_enabled(desc.ccd)
            .can_sleep(desc.sleep_threshold > 0.0)
            .additional_solver_iterations(additional_solver_iterations(desc))
            .enabled(desc.simulated)
            .build();

        let rapier_handle = self.bodies.insert(body);
        let collider = Self::build_collider(desc);
        self.colliders.insert_with_parent(collider, rapier_handle, &mut self.bodies);

        let handle = BodyHandle(self.next_body);
        self.next_body += 1;
        self.body_map.insert(handle, rapier_handle);
        self.body_lookup.insert(rapier_handle, handle);

        if get_config().debug_log {
            log::debug!("[Rapier] 刚体 '{}' 创建: {:?}", desc.name, handle);
        }
        handle
    }

    fn destroy_body(&mut self, body: BodyHandle) {
        if let Some(rapier_handle) = self.body_map.remove(&body) {
            self.body_lookup.remove(&rapier_handle);
            self.bodies.remove(
                rapier_handle,
                &mut self.islands,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                true,
            );
        }
    }

    fn create_joint(&mut self, desc: &D6JointDesc) -> JointHandle {
        let handle = JointHandle(self.next_joint);
        self.next_joint += 1;

        let (Some(&b0), Some(&b1)) = (self.body_map.get(&desc.body0), self.body_map.get(&desc.body1)) else {
            log::warn!("[Rapier] 关节刚体不存在: {:?} - {:?}", desc.body0, desc.body1);
            return handle;
        };

        let mut locked = JointAxesMask::empty();
        if desc.linear_motion == JointMotion::Locked {
            locked |= JointAxesMask::LIN_AXES;
        }
        let angular = [
            (JointAxesMask::ANG_X, JointAxis::AngX, desc.twist_motion, [desc.twist_limits.x, desc.twist_limits.y]),
            (JointAxesMask::ANG_Y, JointAxis::AngY, desc.swing_y_motion, [-desc.swing_y_limit, desc.swing_y_limit]),
            (JointAxesMask::ANG_Z, JointAxis::AngZ, desc.swing_z_motion, [-desc.swing_z_limit, desc.swing_z_limit]),
        ];

        let mut builder = GenericJointBuilder::new(JointAxesMask::empty())
            .local_frame1(to_isometry(&desc.local_frame0))
            .local_frame2(to_isometry(&desc.local_frame1))
            .contacts_enabled(desc.enable_collision);

        for (mask, axis, motion, limits) in angular {
            match motion {
                JointMotion::Locked => locked |= mask,
                JointMotion::Limited => builder = builder.limits(axis, limits),
                JointMotion::Free => {}
            }
        }

        let mut joint = builder.locked_axes(locked).build();
        let drive = DriveState {
            linear_drive: desc.linear_drive,
            angular_drive: desc.angular_drive,
            target: Pose::IDENTITY,
            angular_velocity: Vec3::ZERO,
        };
        apply_motors(&mut joint, &drive);

        let rapier_handle = self.impulse_joints.insert(b0, b1, joint, true);
        self.joint_map.insert(handle, JointRecord { handle: rapier_handle, drive });
        handle
    }

    fn destroy_joint(&mut self, joint: JointHandle) {
        if let Some(record) = self.joint_map.remove(&joint) {
            self.impulse_joints.remove(record.handle, true);
        }
    }

    fn is_body_ready(&self, body: BodyHandle) -> bool {
        self.body_map
            .get(&body)
            .and_then(|h| self.bodies.get(*h))
            .is_some_and(|b| !b.colliders().is_empty())
    }

    fn body_pose(&self, body: BodyHandle) -> Option<Pose> {
        let handle = self.body_map.get(&body)?;
        self.bodies.get(*handle).map(|b| from_isometry(b.position()))
    }

    fn set_body_pose(&mut self, body: BodyHandle, pose: Pose) {
        if let Some(b) = self.body_mut(body) {
            let iso = to_isometry(&pose);
            b.set_position(iso, true);
            if b.is_kinematic() {
                b.set_next_kinematic_position(iso);
            }
        }
    }

    fn move_kinematic_body(&mut self, body: BodyHandle, pose: Pose) {
        if let Some(b) = self.body_mut(body) {
            if b.is_kinematic() {
                b.set_next_kinematic_position(to_isometry(&pose));
            }
        }
    }

    fn set_body_simulated(&mut self, body: BodyHandle, simulated: bool) {
        if let Some(b) = self.body_mut(body) {
            b.set_enabled(simulated);
        }
    }

    fn set_body_kinematic(&mut self, body: BodyHandle, kinematic: bool) {
        if let Some(b) = self.body_mut(body) {
            let body_type = if kinematic {
                RigidBodyType::KinematicPositionBased
            } else {
                RigidBodyType::Dynamic
            };
            if b.body_type() != body_type {
                b.set_body_type(body_type, true);
            }
        }
    }

    fn body_velocity(&self, body: BodyHandle) -> Option<(Vec3, Vec3)> {
        let handle = self.body_map.get(&body)?;
        self.bodies.get(*handle).map(|b| {
            let lin = b.linvel();
            let ang = b.angvel();
            (Vec3::new(lin.x, lin.y, lin.z), Vec3::new(ang.x, ang.y, ang.z))
        })
    }

    fn set_body_velocity(&mut self, body: BodyHandle, linear: Vec3, angular: Vec3) {
        if let Some(b) = self.body_mut(body) {
            b.set_linvel(to_vector(linear), true);
            b.set_angvel(to_vector(angular), true);
        }
    }

    fn set_joint_enabled(&mut self, joint: JointHandle, enabled: bool) {
        let Some(record) = self.joint_map.get(&joint) else {
            return;
        };
        if let Some(j) = self.impulse_joints.get_mut(record.handle) {
            j.data.set_enabled(enabled);
        }
    }

    fn set_joint_drive(&mut self, joint: JointHandle, linear: DriveParams, angular: DriveParams) {
        let Some(record) = self.joint_map.get_mut(&joint) else {
            return;
        };
        record.drive.linear_drive = Some(linear);
        record.drive.angular_drive = Some(angular);
        if let Some(j) = self.impulse_joints.get_mut(record.handle) {
            apply_motors(&mut j.data, &record.drive);
        }
    }

    fn set_joint_drive_target(&mut self, joint: JointHandle, target: Pose, angular_velocity: Vec3) {
        let Some(record) = self.joint_map.get_mut(&joint) else {
            return;
        };
        record.drive.target = target;
        record.drive.angular_velocity = angular_velocity;
        if let Some(j) = self.impulse_joints.get_mut(record.handle) {
            apply_motors(&mut j.data, &record.drive);
        }
    }

    fn set_joint_drive_damping(&mut self, joint: JointHandle, linear_damping: f32, angular_damping: f32) {
        let Some(record) = self.joint_map.get_mut(&joint) else {
            return;
        };
        if let Some(linear) = record.drive.linear_drive.as_mut() {
            linear.damping = linear_damping;
        }
        if let Some(angular) = record.drive.angular_drive.as_mut() {
            angular.damping = angular_damping;
        }
        if let Some(j) = self.impulse_joints.get_mut(record.handle) {
            apply_motors(&mut j.data, &record.drive);
        }
    }

    /// 按 physics_fps 切分子步（最多 max_substep_count 步）
    fn step(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        let substeps = ((dt * self.fps).ceil() as u32).clamp(1, self.max_substep_count);
        self.integration_parameters.dt = dt / substeps as f32;

        for _ in 0..substeps {
            self.pipeline.step(
                &self.gravity,
                &self.integration_parameters,
                &mut self.islands,
                &mut self.broad_phase,
                &mut self.narrow_phase,
                &mut self.bodies,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                &mut self.ccd_solver,
                Some(&mut self.query_pipeline),
                &(),
                &self.collector,
            );
        }
        self.collect_events();
    }

    fn drain_contact_events(&mut self) -> Vec<ContactEvent> {
        std::mem::take(&mut self.pending_events)
    }
}
