//! 关节层配置
//!
//! 所有参数扁平化，直接在代码中修改默认值即可。

use once_cell::sync::Lazy;
use std::sync::RwLock;

use crate::joint::SolverModel;

/// 关节配置（扁平化，不嵌套）
#[derive(Debug, Clone)]
pub struct JointConfig {
    // ========== 单位 ==========
    /// 引擎长度单位 / 显示长度单位，默认 1.0
    /// 所有跨越接口的线性量都乘以（或除以）此值
    pub length_scale: f32,

    // ========== 关节默认值 ==========
    /// 新建关节的约束刚度 (0, 1]，默认 1.0
    pub default_stiffness: f32,
    /// 新建关节的断裂力，默认无穷大（永不断裂）
    pub default_breaking_force: f32,
    /// 新建关节的求解器模式
    pub default_solver_model: SolverModel,
    /// 新建关节连接的两个刚体之间是否允许碰撞，默认 false
    pub default_collidable: bool,

    // ========== 并行 ==========
    /// 已连接关节数达到此值时，约束行提交走 rayon 线程池，默认 64
    pub parallel_threshold: usize,

    // ========== 调试 ==========
    /// 是否输出调试日志，默认 false
    pub debug_log: bool,
}

impl Default for JointConfig {
    fn default() -> Self {
        Self {
            // ====== 单位 ======
            // 1.0 = 显示单位与引擎单位一致
            length_scale: 1.0,

            // ====== 关节默认值 ======
            default_stiffness: 1.0,
            default_breaking_force: f32::INFINITY,
            default_solver_model: SolverModel::Exact,
            default_collidable: false,

            // ====== 并行 ======
            // 关节太少时线程调度开销大于收益
            parallel_threshold: 64,

            // ====== 调试 ======
            debug_log: false,
        }
    }
}

/// 全局配置实例
static JOINT_CONFIG: Lazy<RwLock<JointConfig>> = Lazy::new(|| {
    RwLock::new(JointConfig::default())
});

/// 获取当前配置（只读）
pub fn get_config() -> JointConfig {
    JOINT_CONFIG.read().unwrap_or_else(|e| e.into_inner()).clone()
}

/// 手动设置配置（用于运行时调试）
pub fn set_config(config: JointConfig) {
    *JOINT_CONFIG.write().unwrap_or_else(|e| e.into_inner()) = config;
}

/// 重置为默认配置
pub fn reset_config() {
    *JOINT_CONFIG.write().unwrap_or_else(|e| e.into_inner()) = JointConfig::default();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = JointConfig::default();
        assert_eq!(config.length_scale, 1.0);
        assert!(config.default_breaking_force.is_infinite());
        assert!(config.default_stiffness > 0.0 && config.default_stiffness <= 1.0);
    }
}
