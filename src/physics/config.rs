//! 物理动画配置
//!
//! 所有参数扁平化，直接在代码中修改默认值即可。

use once_cell::sync::Lazy;
use std::sync::RwLock;

/// 物理配置（扁平化，不嵌套）
#[derive(Debug, Clone)]
pub struct PhysicsConfig {
    // ========== 物理世界 ==========
    /// 重力 Y 分量（负数向下），默认 -9.81
    pub gravity_y: f32,
    /// 物理 FPS，默认 60.0
    pub physics_fps: f32,
    /// 每帧最大子步数，默认 4
    pub max_substep_count: u32,
    /// 求解器迭代次数，默认 8
    pub solver_iterations: usize,

    // ========== 物理动画 ==========
    /// 始终启用模拟（为 false 时布娃娃保持 Disabled）
    pub enable_always: bool,
    /// 强制所有肢体链进入 Simulation
    pub force_drive_simulation: bool,
    /// 强制进入纯布娃娃模式
    pub force_ragdoll: bool,
    /// 跑步速度阈值 (m/s)，默认 1.5
    pub running_speed: f32,
    /// 冲刺速度阈值 (m/s)，默认 5.0
    pub sprint_speed: f32,

    // ========== 调试 ==========
    /// 是否输出调试日志，默认 false
    pub debug_log: bool,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            // ====== 物理世界 ======
            // 米制单位的标准重力
            gravity_y: -9.81,

            // 物理模拟的帧率
            // 越高 → 马达驱动越稳定，但 CPU 消耗越大
            physics_fps: 60.0,

            // 卡顿帧最多补几个子步
            max_substep_count: 4,

            // 约束求解器迭代次数
            // 布娃娃关节链较长，低于 4 容易出现抖动
            solver_iterations: 8,

            // ====== 物理动画 ======
            enable_always: true,
            force_drive_simulation: false,
            force_ragdoll: false,

            // 速度档位：idle < running_speed <= running < sprint_speed <= sprint
            running_speed: 1.5,
            sprint_speed: 5.0,

            // ====== 调试 ======
            debug_log: false,
        }
    }
}

/// 全局配置实例
static PHYSICS_CONFIG: Lazy<RwLock<PhysicsConfig>> = Lazy::new(|| {
    RwLock::new(PhysicsConfig::default())
});

/// 获取当前配置（只读）
pub fn get_config() -> PhysicsConfig {
    PHYSICS_CONFIG.read().unwrap_or_else(|e| e.into_inner()).clone()
}

/// 手动设置配置（用于运行时调试）
pub fn set_config(config: PhysicsConfig) {
    *PHYSICS_CONFIG.write().unwrap_or_else(|e| e.into_inner()) = config;
}

/// 重置为默认配置
pub fn reset_config() {
    *PHYSICS_CONFIG.write().unwrap_or_else(|e| e.into_inner()) = PhysicsConfig::default();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PhysicsConfig::default();
        assert!(config.enable_always);
        assert!(!config.force_ragdoll);
        assert!((config.running_speed - 1.5).abs() < 1e-6);
        assert!((config.sprint_speed - 5.0).abs() < 1e-6);
        assert!(config.running_speed < config.sprint_speed);
    }

    #[test]
    fn test_set_and_reset_config() {
        // 只切换日志开关，不影响并行运行的其他测试
        let mut config = get_config();
        config.debug_log = true;
        set_config(config);
        assert!(get_config().debug_log);

        reset_config();
        assert!(!get_config().debug_log);
    }
}
