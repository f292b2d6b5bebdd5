//! 物理动画系统
//!
//! 持有全部布娃娃记录与物理后端，每帧分两次推进：
//! - `update`：物理步进之后。构建队列、就绪检查、配置档选择、整体状态机、
//!   碰撞、肢体链、求解器与马达写入
//! - `update_normal`：游戏逻辑帧。根速度、目标姿态、渲染姿态采样、附着体放置

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use glam::Vec3;

use super::builder::RagdollBuilder;
use super::component::{CharacterView, PhysicalAnimationComponent};
use super::limb::{LimbType, PhysicsLimbChain, PhysicalAnimationLimb};
use super::limb_state::{self, LimbStateType};
use super::profile::{ProfileLibrary, ProfileStrength};
use super::sampler::DrivePoseSampler;
use super::settings::{RagdollJointIds, RagdollSettings};
use super::simulation_state::{self, SimulationStateType};
use super::solver::DrivePoseSolver;
use crate::math::Pose;
use crate::physics::{get_config, BodyHandle, ContactEvent, PhysicsBackend, PhysicsConfig};
use crate::skeleton::{JointSet, SkeletonAdapter, SkeletonPose};
use crate::{RagdollError, Result};

// ============================================================================
// 句柄与角色
// ============================================================================

/// 布娃娃句柄
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RagdollHandle(pub u32);

/// 布娃娃驱动的角色
#[derive(Clone, Debug)]
pub struct Character {
    /// 角色世界变换
    pub world: Pose,
    /// 骨骼（可能尚未加载）
    pub skeleton: Option<JointSet>,
    /// 动画系统给出的当前姿态
    pub animation_pose: SkeletonPose,
}

impl Character {
    pub fn new(world: Pose, skeleton: Option<JointSet>) -> Self {
        let mut character = Self {
            world,
            skeleton: None,
            animation_pose: SkeletonPose::default(),
        };
        if let Some(skeleton) = skeleton {
            character.set_skeleton(skeleton);
        }
        character
    }

    /// 设置骨骼，动画姿态重置为绑定姿态
    pub fn set_skeleton(&mut self, skeleton: JointSet) {
        self.animation_pose = skeleton.bind_pose().clone();
        self.skeleton = Some(skeleton);
    }
}

// ============================================================================
// 构建队列
// ============================================================================

/// 待构建布娃娃队列
///
/// 可克隆并跨线程推入重建请求，系统每帧加锁一次整体取出。
#[derive(Clone, Debug, Default)]
pub struct CreationQueue(Arc<Mutex<Vec<RagdollHandle>>>);

impl CreationQueue {
    pub fn push(&self, handle: RagdollHandle) {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).push(handle);
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn take(&self) -> Vec<RagdollHandle> {
        std::mem::take(&mut *self.0.lock().unwrap_or_else(|e| e.into_inner()))
    }

    fn extend(&self, handles: Vec<RagdollHandle>) {
        if handles.is_empty() {
            return;
        }
        self.0.lock().unwrap_or_else(|e| e.into_inner()).extend(handles);
    }
}

// ============================================================================
// 布娃娃记录
// ============================================================================

/// 一个布娃娃：组件 + 角色 + 玩法侧请求
#[derive(Clone, Debug)]
pub struct RagdollRecord {
    pub component: PhysicalAnimationComponent,
    pub character: Character,
    /// 玩法请求纯布娃娃模式
    pub force_ragdoll: bool,
    /// 玩法请求启用模拟（还需 enable_always）
    pub simulation_enabled: bool,
}

impl RagdollRecord {
    /// 本帧期望的整体状态
    fn desired_state(&self, config: &PhysicsConfig) -> SimulationStateType {
        if config.force_ragdoll || self.force_ragdoll {
            SimulationStateType::Ragdoll
        } else if config.enable_always && self.simulation_enabled {
            SimulationStateType::Enabled
        } else {
            SimulationStateType::Disabled
        }
    }
}

// ============================================================================
// 系统
// ============================================================================

/// 物理动画系统
pub struct PhysicalAnimationSystem<B: PhysicsBackend> {
    backend: B,
    ragdolls: BTreeMap<RagdollHandle, RagdollRecord>,
    next_handle: u32,
    queue: CreationQueue,
    profiles: ProfileLibrary,
    sampler: DrivePoseSampler,
    solver: DrivePoseSolver,
}

impl<B: PhysicsBackend> PhysicalAnimationSystem<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            ragdolls: BTreeMap::new(),
            next_handle: 1,
            queue: CreationQueue::default(),
            profiles: ProfileLibrary::default(),
            sampler: DrivePoseSampler,
            solver: DrivePoseSolver,
        }
    }

    // ========================================================================
    // 布娃娃管理
    // ========================================================================

    /// 登记布娃娃，下一次 `update` 时构建
    pub fn create_ragdoll(&mut self, character: Character, settings: RagdollSettings) -> RagdollHandle {
        let handle = RagdollHandle(self.next_handle);
        self.next_handle += 1;

        self.ragdolls.insert(
            handle,
            RagdollRecord {
                component: PhysicalAnimationComponent::new(settings),
                character,
                force_ragdoll: false,
                simulation_enabled: true,
            },
        );
        self.queue.push(handle);
        handle
    }

    /// 销毁布娃娃及其全部刚体和关节
    pub fn destroy_ragdoll(&mut self, handle: RagdollHandle) -> Result<()> {
        let mut record = self
            .ragdolls
            .remove(&handle)
            .ok_or(RagdollError::UnknownRagdoll(handle.0))?;
        record.component.destroy(&mut self.backend);
        if let Some(skeleton) = record.character.skeleton.as_mut() {
            skeleton.set_animation_update_suppressed(false);
        }
        log::info!("[PhysAnim] 销毁布娃娃 {}", handle.0);
        Ok(())
    }

    /// 纯布娃娃模式开关
    pub fn set_ragdoll_mode(&mut self, handle: RagdollHandle, enabled: bool) -> Result<()> {
        self.record_mut(handle)?.force_ragdoll = enabled;
        Ok(())
    }

    /// 启用/停用模拟（经 BlendIn/BlendOut 过渡）
    pub fn set_simulation_enabled(&mut self, handle: RagdollHandle, enabled: bool) -> Result<()> {
        self.record_mut(handle)?.simulation_enabled = enabled;
        Ok(())
    }

    /// 设置马达强度，已有配置档时立即按新强度重新应用
    pub fn set_profile_strength(&mut self, handle: RagdollHandle, strength: ProfileStrength) -> Result<()> {
        let record = self
            .ragdolls
            .get_mut(&handle)
            .ok_or(RagdollError::UnknownRagdoll(handle.0))?;
        if let Some(profile) = record.component.profile.clone() {
            record
                .component
                .try_to_apply_ragdoll_profile(&mut self.backend, &profile, strength, false);
        } else {
            record.component.strength = strength;
        }
        Ok(())
    }

    /// 角色瞬移后把全部肢体刚体放回动画姿态
    pub fn reset_to_animation(&mut self, handle: RagdollHandle) -> Result<()> {
        let record = self
            .ragdolls
            .get_mut(&handle)
            .ok_or(RagdollError::UnknownRagdoll(handle.0))?;
        if !record.component.loaded {
            return Err(RagdollError::NotLoaded(handle.0));
        }
        let Character { world, skeleton, animation_pose } = &mut record.character;
        let skeleton = skeleton.as_mut().ok_or(RagdollError::NotLoaded(handle.0))?;

        let view = CharacterView {
            skeleton,
            animation_pose,
            world: *world,
        };
        record.component.force_sync_limbs_to_animation(&mut self.backend, &view);
        for limb in &record.component.limbs {
            self.backend.set_body_velocity(limb.body, Vec3::ZERO, Vec3::ZERO);
        }
        record.component.prev_position = None;
        Ok(())
    }

    fn record_mut(&mut self, handle: RagdollHandle) -> Result<&mut RagdollRecord> {
        self.ragdolls
            .get_mut(&handle)
            .ok_or(RagdollError::UnknownRagdoll(handle.0))
    }

    // ========================================================================
    // 查询
    // ========================================================================

    pub fn component(&self, handle: RagdollHandle) -> Option<&PhysicalAnimationComponent> {
        self.ragdolls.get(&handle).map(|record| &record.component)
    }

    pub fn character(&self, handle: RagdollHandle) -> Option<&Character> {
        self.ragdolls.get(&handle).map(|record| &record.character)
    }

    /// 动画系统与玩法通过它写入世界变换、骨骼和动画姿态
    pub fn character_mut(&mut self, handle: RagdollHandle) -> Option<&mut Character> {
        self.ragdolls.get_mut(&handle).map(|record| &mut record.character)
    }

    pub fn handles(&self) -> impl Iterator<Item = RagdollHandle> + '_ {
        self.ragdolls.keys().copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ragdolls.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ragdolls.is_empty()
    }

    #[inline]
    pub fn profiles(&self) -> &ProfileLibrary {
        &self.profiles
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn creation_queue(&self) -> CreationQueue {
        self.queue.clone()
    }

    // ========================================================================
    // 每帧更新
    // ========================================================================

    /// 完整一帧：游戏逻辑 → 物理步进 → 物理后处理
    pub fn tick(&mut self, dt: f32) {
        self.update_normal(dt);
        self.backend.step(dt);
        self.update(dt);
    }

    /// 物理步进之后调用
    pub fn update(&mut self, dt: f32) {
        let config = get_config();

        self.process_creation_queue();

        let events = self.backend.drain_contact_events();
        let owners = self.body_owners();

        let Self {
            backend,
            ragdolls,
            profiles,
            solver,
            ..
        } = self;

        for (&handle, record) in ragdolls.iter_mut() {
            if !record.component.is_built() || !poll_loaded(handle, &mut record.component, &*backend) {
                continue;
            }

            let desired = record.desired_state(&config);
            let RagdollRecord { component, character, .. } = record;
            let Character { world, skeleton, animation_pose } = character;
            let Some(skeleton) = skeleton.as_mut() else {
                continue;
            };

            // ========== 配置档 ==========
            let profile = if desired == SimulationStateType::Ragdoll {
                &profiles.ragdoll
            } else {
                profiles.select_by_velocity(component.velocity.length_squared(), config.running_speed, config.sprint_speed)
            };
            let strength = component.strength;
            component.try_to_apply_ragdoll_profile(backend, profile, strength, false);
            component.update_profile_transition(dt);

            // ========== 整体状态 ==========
            let world = *world;
            let mut view = CharacterView {
                skeleton,
                animation_pose,
                world,
            };
            simulation_state::update_states(component, backend, &mut view, desired, dt);

            if !component.is_active() {
                continue;
            }

            // ========== 肢体 ==========
            component.read_physics_poses(&*backend, &world);
            for limb in &mut component.limbs {
                limb.is_colliding = false;
            }
            apply_contacts(component, handle, &events, &owners, solver);
            update_chains(component, backend, &config, dt);

            solver.solve_pose(component);

            let root_velocity = component.velocity;
            for limb in &mut component.limbs {
                limb_state::update_limb(limb, backend, &world, root_velocity, dt);
            }
        }
    }

    /// 游戏逻辑帧调用（下一次物理步进之前）
    pub fn update_normal(&mut self, dt: f32) {
        let Self {
            backend,
            ragdolls,
            sampler,
            ..
        } = self;

        for record in ragdolls.values_mut() {
            let RagdollRecord { component, character, .. } = record;
            let Character { world, skeleton, animation_pose } = character;
            let Some(skeleton) = skeleton.as_mut() else {
                continue;
            };

            // 未被接管时渲染姿态直接取动画
            skeleton.apply_animation_pose(animation_pose);

            if !component.loaded {
                continue;
            }

            let world = *world;
            component.update_velocity(world.translation, dt);

            let mut view = CharacterView {
                skeleton,
                animation_pose,
                world,
            };
            sampler.compute_target_poses(component, &view);
            if component.is_active() {
                sampler.sample_pose(component, &*backend, &mut view);
            }
            component.place_attachments(backend, &world);
        }
    }

    // ========================================================================
    // 内部
    // ========================================================================

    /// 取出构建队列，骨骼未就绪的请求留到下一帧
    fn process_creation_queue(&mut self) {
        let pending = self.queue.take();
        if pending.is_empty() {
            return;
        }

        let mut retry = Vec::new();
        for handle in pending {
            let Some(record) = self.ragdolls.get_mut(&handle) else {
                log::warn!("[PhysAnim] 构建队列中的布娃娃 {} 已不存在", handle.0);
                continue;
            };
            let world = record.character.world;
            let Some(skeleton) = record.character.skeleton.as_mut() else {
                retry.push(handle);
                continue;
            };

            match build_ragdoll(&mut self.backend, &self.profiles, &mut record.component, skeleton, world) {
                Ok(()) => log::info!(
                    "[PhysAnim] 布娃娃 {} 构建完成 ({} 个肢体)",
                    handle.0,
                    record.component.limbs.len()
                ),
                Err(err) => log::warn!("[PhysAnim] 布娃娃 {} 构建失败: {}", handle.0, err),
            }
        }
        self.queue.extend(retry);
    }

    /// 刚体 → 所属布娃娃
    fn body_owners(&self) -> BTreeMap<BodyHandle, RagdollHandle> {
        let mut owners = BTreeMap::new();
        for (&handle, record) in &self.ragdolls {
            for body in record.component.bodies() {
                owners.insert(body, handle);
            }
        }
        owners
    }
}

/// 解析关节、构建刚体并强制应用站立配置档
fn build_ragdoll(
    backend: &mut dyn PhysicsBackend,
    profiles: &ProfileLibrary,
    component: &mut PhysicalAnimationComponent,
    skeleton: &mut JointSet,
    world: Pose,
) -> Result<()> {
    component.joint_ids = RagdollJointIds::from_skeleton(skeleton)?;
    RagdollBuilder::new(backend, skeleton, world, &profiles.idle).build(component)?;

    // 重建后整体状态从头开始
    component.state = SimulationStateType::Disabled;
    component.state_blend_time = 0.0;
    component.blend_weight = 0.0;
    component.prev_position = None;
    component.profile = None;
    skeleton.set_animation_update_suppressed(false);

    let strength = component.strength;
    component.try_to_apply_ragdoll_profile(backend, &profiles.idle, strength, true);
    Ok(())
}

/// 所有肢体刚体就绪后标记 loaded
fn poll_loaded(handle: RagdollHandle, component: &mut PhysicalAnimationComponent, backend: &dyn PhysicsBackend) -> bool {
    if component.loaded {
        return true;
    }
    if component.limbs.iter().all(|limb| backend.is_body_ready(limb.body)) {
        component.loaded = true;
        log::info!("[PhysAnim] 布娃娃 {} 已就绪", handle.0);
    }
    component.loaded
}

/// 把接触事件记到肢体上
///
/// 同一刚体或同一布娃娃内部的接触忽略；只在 Enabled/Ragdoll 状态记录；脚不记录。
fn apply_contacts(
    component: &mut PhysicalAnimationComponent,
    handle: RagdollHandle,
    events: &[ContactEvent],
    owners: &BTreeMap<BodyHandle, RagdollHandle>,
    solver: &DrivePoseSolver,
) {
    let accepts_contacts = matches!(
        component.state,
        SimulationStateType::Enabled | SimulationStateType::Ragdoll
    );
    if !accepts_contacts {
        for limb in &mut component.limbs {
            limb.active_contacts = 0;
        }
        return;
    }

    for event in events {
        if event.body0 == event.body1 {
            continue;
        }
        let owner0 = owners.get(&event.body0);
        let owner1 = owners.get(&event.body1);
        if owner0.is_some() && owner0 == owner1 {
            continue;
        }

        for (body, owner) in [(event.body0, owner0), (event.body1, owner1)] {
            if owner != Some(&handle) {
                continue;
            }
            let Some(limb) = component
                .limb_index_for_body(body)
                .and_then(|index| component.limbs.get_mut(index))
            else {
                continue;
            };
            if limb.limb_type == LimbType::Foot {
                continue;
            }

            if event.started {
                limb.active_contacts += 1;
                solver.force_solve_collided_limb(limb);
            } else {
                limb.active_contacts = limb.active_contacts.saturating_sub(1);
            }
        }
    }

    for limb in &mut component.limbs {
        limb.is_colliding |= limb.active_contacts > 0;
    }
}

/// 按肢体链推进肢体状态，并更新碰撞计时
///
/// 手臂或脖子链活跃时带动躯干、脖子和双臂整体进入 Simulation；双腿各自决定。
fn update_chains(component: &mut PhysicalAnimationComponent, backend: &mut dyn PhysicsBackend, config: &PhysicsConfig, dt: f32) {
    let force = component.state == SimulationStateType::Ragdoll || config.force_drive_simulation;

    let chains = &component.chains;
    let limbs = &mut component.limbs;
    let upper_active = chains.neck.has_active_limb(limbs)
        || chains.left_arm.has_active_limb(limbs)
        || chains.right_arm.has_active_limb(limbs);

    update_chain(&chains.left_leg, limbs, backend, force, dt);
    update_chain(&chains.right_leg, limbs, backend, force, dt);
    update_chain(&chains.body, limbs, backend, force || upper_active, dt);
    update_chain(&chains.neck, limbs, backend, force || upper_active, dt);
    update_chain(&chains.left_arm, limbs, backend, force || upper_active, dt);
    update_chain(&chains.right_arm, limbs, backend, force || upper_active, dt);
}

fn update_chain(
    chain: &PhysicsLimbChain,
    limbs: &mut [PhysicalAnimationLimb],
    backend: &mut dyn PhysicsBackend,
    force_simulation: bool,
    dt: f32,
) {
    let desired = if force_simulation || chain.has_active_limb(limbs) {
        LimbStateType::Simulation
    } else {
        LimbStateType::Kinematic
    };

    for &index in &chain.limbs {
        let Some(limb) = limbs.get_mut(index) else {
            continue;
        };
        limb_state::switch_state(limb, backend, desired);
        limb.update_collision_time(dt);
    }
}
