//! 整体模拟状态机
//!
//! Disabled → BlendIn → Enabled → BlendOut → Disabled，
//! Disabled 与 Enabled 之间不会直接跳转。
//! Ragdoll 为纯布娃娃模式，可从任意状态进入。

use super::component::{CharacterView, PhysicalAnimationComponent};
use super::limb_state;
use crate::math::{map_value, EPSILON};
use crate::physics::{get_config, PhysicsBackend};

/// 整体模拟状态
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SimulationStateType {
    #[default]
    Disabled,
    BlendIn,
    Enabled,
    BlendOut,
    Ragdoll,
}

/// 状态转移表
///
/// desired 取 Enabled、Disabled 或 Ragdoll。
pub fn try_switch_to(component: &PhysicalAnimationComponent, desired: SimulationStateType) -> SimulationStateType {
    use SimulationStateType::*;

    if desired == Ragdoll {
        return Ragdoll;
    }

    let blend_time = component.state_blend_time;
    match component.state {
        Disabled => match desired {
            Enabled | BlendIn => BlendIn,
            _ => Disabled,
        },
        BlendIn => match desired {
            Disabled | BlendOut => BlendOut,
            _ if blend_time + EPSILON >= component.blend_in_time => Enabled,
            _ => BlendIn,
        },
        Enabled => match desired {
            Disabled | BlendOut => BlendOut,
            _ => Enabled,
        },
        BlendOut => match desired {
            Enabled | BlendIn => BlendIn,
            _ if blend_time + EPSILON >= component.blend_out_time => Disabled,
            _ => BlendOut,
        },
        Ragdoll => desired,
    }
}

/// 推进状态机：切换 → 更新 → 再切换
///
/// 第二次切换使计时恰好到点的一帧就能完成混合。
pub fn update_states(
    component: &mut PhysicalAnimationComponent,
    backend: &mut dyn PhysicsBackend,
    view: &mut CharacterView<'_>,
    desired: SimulationStateType,
    dt: f32,
) {
    switch_state(component, backend, view, desired);
    update(component, backend, view, dt);
    switch_state(component, backend, view, desired);
}

/// 按期望状态切换，处理进入/退出动作
pub fn switch_state(
    component: &mut PhysicalAnimationComponent,
    backend: &mut dyn PhysicsBackend,
    view: &mut CharacterView<'_>,
    desired: SimulationStateType,
) {
    let next = try_switch_to(component, desired);
    if next == component.state {
        return;
    }

    if get_config().debug_log {
        log::debug!("[PhysAnim] 模拟状态 {:?} -> {:?}", component.state, next);
    }

    on_exit(component, backend, view);
    component.state = next;
    on_enter(component, backend, view);
}

fn on_enter(component: &mut PhysicalAnimationComponent, backend: &mut dyn PhysicsBackend, view: &mut CharacterView<'_>) {
    match component.state {
        SimulationStateType::Disabled => {
            component.state_blend_time = 0.0;
            component.blend_weight = 0.0;
            if component.simulated {
                component.reset_motor_drives(backend);
                component.set_limbs_simulated(backend, false);
                view.skeleton.set_animation_update_suppressed(false);
            }
        }
        SimulationStateType::BlendIn => {
            // 从 BlendOut 中途折返时保持权重连续
            component.state_blend_time = component.blend_weight * component.blend_in_time;
            if !component.simulated {
                component.force_sync_limbs_to_animation(backend, view);
                component.reset_motor_drives(backend);
                component.set_limbs_simulated(backend, true);
                view.skeleton.set_animation_update_suppressed(true);
            }
        }
        SimulationStateType::Enabled => {
            component.state_blend_time = 0.0;
            component.blend_weight = 1.0;
        }
        SimulationStateType::BlendOut => {
            component.state_blend_time = (1.0 - component.blend_weight) * component.blend_out_time;
        }
        SimulationStateType::Ragdoll => {
            component.state_blend_time = 0.0;
            component.blend_weight = 1.0;
            component.set_anchor_joints_enabled(backend, false);
            if !component.simulated {
                component.force_sync_limbs_to_animation(backend, view);
            }
            component.reset_motor_drives(backend);
            component.set_limbs_simulated(backend, true);
            view.skeleton.set_animation_update_suppressed(true);
        }
    }
}

fn on_exit(component: &mut PhysicalAnimationComponent, backend: &mut dyn PhysicsBackend, view: &mut CharacterView<'_>) {
    if component.state != SimulationStateType::Ragdoll {
        return;
    }

    component.set_anchor_joints_enabled(backend, true);

    // 附着体回到动画姿态，避免驱动关节重新启用时猛拉
    if let Some(ghost) = component.pelvis_ghost {
        if let Some(root) = view
            .skeleton
            .object_space_transform(view.animation_pose, component.root_joint_id)
        {
            backend.set_body_pose(ghost, (view.world * root).normalized());
        }
    }
    for limb in &component.limbs {
        limb_state::reset_drive(limb, backend);
        if let Some(drive) = limb.drive_joint {
            backend.set_body_pose(drive.body0, (view.world * limb.target_pose).normalized());
        }
    }
}

fn update(
    component: &mut PhysicalAnimationComponent,
    backend: &mut dyn PhysicsBackend,
    view: &mut CharacterView<'_>,
    dt: f32,
) {
    match component.state {
        SimulationStateType::Disabled => {
            component.force_sync_limbs_to_animation(backend, view);
        }
        SimulationStateType::BlendIn => {
            component.state_blend_time += dt;
            component.blend_weight = map_value(component.state_blend_time, 0.0, component.blend_in_time, 0.0, 1.0);
        }
        SimulationStateType::BlendOut => {
            component.state_blend_time += dt;
            component.blend_weight = map_value(component.state_blend_time, 0.0, component.blend_out_time, 1.0, 0.0);
        }
        SimulationStateType::Enabled | SimulationStateType::Ragdoll => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Pose;
    use crate::physical_animation::limb::{PhysicalAnimationLimb, LimbType};
    use crate::skeleton::SkeletonAdapter;
    use crate::test_support::{humanoid_skeleton, MockBackend};
    use SimulationStateType::*;

    fn one_arm_component(backend: &mut MockBackend) -> PhysicalAnimationComponent {
        let mut component = PhysicalAnimationComponent::default();
        for (name, limb_type, joint) in [("arm", LimbType::Arm, 1), ("forearm", LimbType::Forearm, 2)] {
            let body = backend.create_body(&MockBackend::dynamic_desc(name));
            component.limbs.push(PhysicalAnimationLimb::new(name, limb_type, joint, body, 1.0));
        }
        component
    }

    fn tick(
        component: &mut PhysicalAnimationComponent,
        backend: &mut MockBackend,
        skeleton: &mut crate::skeleton::JointSet,
        desired: SimulationStateType,
        dt: f32,
    ) {
        let pose = skeleton.bind_pose().clone();
        let mut view = CharacterView {
            skeleton,
            animation_pose: &pose,
            world: Pose::IDENTITY,
        };
        update_states(component, backend, &mut view, desired, dt);
    }

    #[test]
    fn test_blend_in_reaches_enabled() {
        let mut backend = MockBackend::default();
        let mut skeleton = humanoid_skeleton();
        let mut component = one_arm_component(&mut backend);
        component.blend_in_time = 0.1;

        tick(&mut component, &mut backend, &mut skeleton, Enabled, 0.05);
        assert_eq!(component.state, BlendIn);
        assert!((component.blend_weight - 0.5).abs() < 1e-4);

        tick(&mut component, &mut backend, &mut skeleton, Enabled, 0.05);
        assert_eq!(component.state, Enabled);
        assert!((component.blend_weight - 1.0).abs() < 1e-6);
        assert!(component.simulated);
        for limb in &component.limbs {
            assert!(limb.simulated);
            assert!(backend.body(limb.body).simulated);
        }
        assert!(skeleton.is_animation_update_suppressed());
    }

    #[test]
    fn test_never_jumps_between_disabled_and_enabled() {
        let mut component = PhysicalAnimationComponent::default();
        assert_eq!(try_switch_to(&component, Enabled), BlendIn);
        component.state = Enabled;
        assert_eq!(try_switch_to(&component, Disabled), BlendOut);
    }

    #[test]
    fn test_transitions_are_total() {
        for start in [Disabled, BlendIn, Enabled, BlendOut, Ragdoll] {
            for desired in [Enabled, Disabled] {
                let mut backend = MockBackend::default();
                let mut skeleton = humanoid_skeleton();
                let mut component = one_arm_component(&mut backend);
                component.state = start;

                let mut ticks = 0;
                while component.state != desired {
                    tick(&mut component, &mut backend, &mut skeleton, desired, 0.05);
                    ticks += 1;
                    assert!(ticks < 20, "{:?} -> {:?} 卡在 {:?}", start, desired, component.state);
                }
            }
        }
    }

    #[test]
    fn test_disable_restores_animation() {
        let mut backend = MockBackend::default();
        let mut skeleton = humanoid_skeleton();
        let mut component = one_arm_component(&mut backend);

        for _ in 0..3 {
            tick(&mut component, &mut backend, &mut skeleton, Enabled, 0.05);
        }
        assert_eq!(component.state, Enabled);

        let mut ticks = 0;
        while component.state != Disabled {
            tick(&mut component, &mut backend, &mut skeleton, Disabled, 0.05);
            ticks += 1;
        }
        // blend_out_time 0.25
        assert_eq!(ticks, 5);
        assert_eq!(component.blend_weight, 0.0);
        assert!(!component.simulated);
        assert!(!skeleton.is_animation_update_suppressed());
        assert!(!backend.body(component.limbs[0].body).simulated);
    }

    #[test]
    fn test_ragdoll_disables_anchor_joints() {
        let mut backend = MockBackend::default();
        let mut skeleton = humanoid_skeleton();
        let mut component = one_arm_component(&mut backend);
        let ghost = backend.create_body(&MockBackend::dynamic_desc("ghost"));
        let joint = backend.create_joint(&crate::physics::D6JointDesc::fixed(
            ghost,
            component.limbs[0].body,
            Pose::IDENTITY,
            Pose::IDENTITY,
        ));
        component.pelvis_ghost = Some(ghost);
        component.pelvis_joint = Some(joint);

        tick(&mut component, &mut backend, &mut skeleton, Ragdoll, 0.05);
        assert_eq!(component.state, Ragdoll);
        assert_eq!(component.blend_weight, 1.0);
        assert!(!backend.joint(joint).enabled);
        assert!(component.simulated);

        tick(&mut component, &mut backend, &mut skeleton, Enabled, 0.05);
        assert_eq!(component.state, Enabled);
        assert!(backend.joint(joint).enabled);
    }
}
