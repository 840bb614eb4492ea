//! 单自由度行策略
//!
//! 每个受控 DOF 每步产生一条约束行，三种策略：
//! - 锁定（hold at zero）：引擎按位置误差修正
//! - 弹簧阻尼/电机：显式目标加速度
//! - 有界摩擦：自由行 + 对称或单侧的行力钳制

use glam::Vec3;

use crate::engine::ConstraintRows;

/// 限位判断的边界带宽，避免正好在边界上抖动
///
/// 与引擎单位尺度相关的经验值，单位尺度变化时需重新调校。
pub const LIMIT_EPSILON: f32 = 5.0e-3;

/// max - min 小于此值视为零范围
pub const MIN_LIMIT_RANGE: f32 = 1.0e-8;

/// 步长下限，防止除零
pub const MIN_TIMESTEP: f32 = 1.0e-6;

// ============================================================================
// 测量
// ============================================================================

/// 单个 DOF 的测量值（位置/速度/加速度）
///
/// 速度和加速度由相邻两步的有限差分得到。
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DofState {
    pub position: f32,
    pub velocity: f32,
    pub acceleration: f32,
    initialized: bool,
}

impl DofState {
    /// 用新位置更新
    pub fn update(&mut self, position: f32, dt: f32) {
        let delta = position - self.position;
        self.update_with_delta(position, delta, dt);
    }

    /// 用新位置和显式位移更新（闭合曲线上的位移需要回绕）
    pub fn update_with_delta(&mut self, position: f32, delta: f32, dt: f32) {
        if self.initialized && dt > MIN_TIMESTEP {
            let velocity = delta / dt;
            self.acceleration = (velocity - self.velocity) / dt;
            self.velocity = velocity;
        } else {
            self.velocity = 0.0;
            self.acceleration = 0.0;
            self.initialized = true;
        }
        self.position = position;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

// ============================================================================
// 限位
// ============================================================================

/// 限位设置
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DofLimits {
    pub enabled: bool,
    pub min: f32,
    pub max: f32,
}

impl Default for DofLimits {
    fn default() -> Self {
        Self {
            enabled: false,
            min: 0.0,
            max: 0.0,
        }
    }
}

impl DofLimits {
    pub fn new(min: f32, max: f32) -> Self {
        Self { enabled: true, min, max }
    }

    /// 按当前位置选择本步的限位行
    pub fn select(&self, position: f32) -> LimitRow {
        if !self.enabled {
            return LimitRow::Free;
        }
        if self.min > self.max {
            return LimitRow::LockAt((self.min + self.max) * 0.5);
        }
        if self.max - self.min < MIN_LIMIT_RANGE {
            return LimitRow::HoldCurrent;
        }
        if position > self.min + LIMIT_EPSILON && position < self.max - LIMIT_EPSILON {
            LimitRow::Free
        } else if position <= self.min + LIMIT_EPSILON {
            LimitRow::StopAtMin(self.min)
        } else {
            LimitRow::StopAtMax(self.max)
        }
    }

    /// 按本步结束时的预测位置选择限位行
    ///
    /// 当前位置已越界时与 select 相同；否则用 position + rate × dt 判断，
    /// 止挡在越界前一步生效。
    pub fn select_ahead(&self, position: f32, rate: f32, dt: f32) -> LimitRow {
        match self.select(position) {
            LimitRow::Free => self.select(position + rate * dt.max(0.0)),
            selected => selected,
        }
    }
}

/// 本步限位行的类型
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LimitRow {
    /// 在范围内：自由 + 摩擦
    Free,
    /// 越过下限：单侧止挡（下侧行力为零）
    StopAtMin(f32),
    /// 越过上限：单侧止挡（上侧行力为零）
    StopAtMax(f32),
    /// min > max：锁在中点
    LockAt(f32),
    /// 零范围：锁在当前位置
    HoldCurrent,
}

// ============================================================================
// 行轴
// ============================================================================

/// 一个 DOF 的行几何
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DofAxis {
    /// 线性：位置 = (point0 - point1)·dir
    Linear { point0: Vec3, point1: Vec3, dir: Vec3 },
    /// 角度：位置由调用方给出（连续角）
    Angular { dir: Vec3 },
}

impl DofAxis {
    pub fn dir(&self) -> Vec3 {
        match *self {
            DofAxis::Linear { dir, .. } | DofAxis::Angular { dir } => dir,
        }
    }

    /// 添加一条误差为 (position - target) 的行
    pub fn add_row(&self, rows: &mut dyn ConstraintRows, position: f32, target: f32) {
        match *self {
            DofAxis::Linear { point0, point1, dir } => {
                // 把父侧参考点沿轴平移到目标位置
                let shift = (point0 - point1).dot(dir) - position + target;
                rows.add_linear_row(point0, point1 + dir * shift, dir);
            }
            DofAxis::Angular { dir } => {
                rows.add_angular_row(position - target, dir);
            }
        }
    }
}

// ============================================================================
// 行提交
// ============================================================================

/// 锁定当前 DOF 于 target
pub fn submit_lock(
    rows: &mut dyn ConstraintRows,
    axis: &DofAxis,
    position: f32,
    target: f32,
    stiffness: f32,
) {
    axis.add_row(rows, position, target);
    rows.set_row_stiffness(stiffness);
}

/// 带限位和摩擦的 DOF
///
/// 范围内：自由行，摩擦钳制 = friction × controller；
/// 将要越界或已越界：单侧止挡，越界一侧的摩擦钳制为零。
/// 止挡时仍在范围内的行带目标加速度，使本步恰好停在边界上；
/// 已越界的行交给引擎按位置误差修正。
#[allow(clippy::too_many_arguments)]
pub fn submit_limited(
    rows: &mut dyn ConstraintRows,
    axis: &DofAxis,
    position: f32,
    rate: f32,
    limits: &DofLimits,
    friction: f32,
    stiffness: f32,
    dt: f32,
) -> LimitRow {
    let dt = dt.max(MIN_TIMESTEP);
    let selected = limits.select_ahead(position, rate, dt);
    // 本步到达 bound 所需的加速度
    let arrive = |bound: f32| ((bound - position) / dt - rate) / dt;
    match selected {
        LimitRow::Free => {
            axis.add_row(rows, position, position);
            rows.set_row_stiffness(stiffness);
            rows.set_row_acceleration(-rate / dt);
            rows.set_row_min_friction(-friction);
            rows.set_row_max_friction(friction);
        }
        LimitRow::StopAtMin(min) => {
            axis.add_row(rows, position, min);
            rows.set_row_stiffness(stiffness);
            if position > min {
                rows.set_row_acceleration(arrive(min));
            }
            rows.set_row_min_friction(0.0);
        }
        LimitRow::StopAtMax(max) => {
            axis.add_row(rows, position, max);
            rows.set_row_stiffness(stiffness);
            if position < max {
                rows.set_row_acceleration(arrive(max));
            }
            rows.set_row_max_friction(0.0);
        }
        LimitRow::LockAt(target) => {
            submit_lock(rows, axis, position, target, stiffness);
        }
        LimitRow::HoldCurrent => {
            axis.add_row(rows, position, position);
            rows.set_row_stiffness(stiffness);
            rows.set_row_acceleration(-rate / dt);
        }
    }
    selected
}

/// 电机驱动参数
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MotorDrive {
    /// 期望加速度（≥0）
    pub power: f32,
    /// 控制量倍率（≥0）
    pub controller: f32,
    /// 速率阻尼（≥0）
    pub damping: f32,
    /// 反转方向
    pub reversed: bool,
    /// 期望加速度为零时自由旋转
    pub free_spin: bool,
    /// 行力上限
    pub max_force: f32,
}

impl Default for MotorDrive {
    fn default() -> Self {
        Self {
            power: 0.0,
            controller: 1.0,
            damping: 0.0,
            reversed: false,
            free_spin: false,
            max_force: f32::INFINITY,
        }
    }
}

impl MotorDrive {
    /// 期望加速度 = power × controller（带方向）
    pub fn desired_acceleration(&self) -> f32 {
        let accel = self.power * self.controller;
        if self.reversed { -accel } else { accel }
    }
}

/// 电机行：目标加速度 desired - damping × rate
pub fn submit_motor(
    rows: &mut dyn ConstraintRows,
    axis: &DofAxis,
    position: f32,
    rate: f32,
    drive: &MotorDrive,
    stiffness: f32,
) {
    let desired = drive.desired_acceleration();
    axis.add_row(rows, position, position);
    rows.set_row_stiffness(stiffness);
    if desired == 0.0 && drive.free_spin {
        rows.set_row_acceleration(0.0);
        rows.set_row_min_friction(0.0);
        rows.set_row_max_friction(0.0);
        return;
    }
    rows.set_row_acceleration(desired - drive.damping * rate);
    rows.set_row_min_friction(-drive.max_force);
    rows.set_row_max_friction(drive.max_force);
}

/// 弹簧阻尼行：朝 rest 偏置
#[allow(clippy::too_many_arguments)]
pub fn submit_spring(
    rows: &mut dyn ConstraintRows,
    axis: &DofAxis,
    position: f32,
    rate: f32,
    rest: f32,
    spring: f32,
    damper: f32,
    max_force: f32,
    stiffness: f32,
    dt: f32,
) {
    let accel = rows.spring_damper_acceleration(dt, spring, position - rest, damper, rate);
    axis.add_row(rows, position, position);
    rows.set_row_stiffness(stiffness);
    rows.set_row_acceleration(accel);
    rows.set_row_min_friction(-max_force);
    rows.set_row_max_friction(max_force);
}

/// 齿轮跟随行：速率追踪 target_rate
pub fn submit_rate(
    rows: &mut dyn ConstraintRows,
    axis: &DofAxis,
    position: f32,
    rate: f32,
    target_rate: f32,
    stiffness: f32,
    dt: f32,
) {
    let dt = dt.max(MIN_TIMESTEP);
    axis.add_row(rows, position, position);
    rows.set_row_stiffness(stiffness);
    rows.set_row_acceleration((target_rate - rate) / dt);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{RowBuffer, RowKind};

    const DT: f32 = 1.0 / 60.0;

    fn linear_axis() -> DofAxis {
        DofAxis::Linear {
            point0: Vec3::new(3.0, 0.0, 0.0),
            point1: Vec3::ZERO,
            dir: Vec3::X,
        }
    }

    #[test]
    fn test_limit_selection() {
        let limits = DofLimits::new(2.0, 5.0);
        assert_eq!(limits.select(3.0), LimitRow::Free);
        assert_eq!(limits.select(6.0), LimitRow::StopAtMax(5.0));
        assert_eq!(limits.select(1.0), LimitRow::StopAtMin(2.0));
        // 边界带内视为越界
        assert_eq!(limits.select(5.0 - LIMIT_EPSILON * 0.5), LimitRow::StopAtMax(5.0));

        let inverted = DofLimits::new(5.0, 2.0);
        assert_eq!(inverted.select(3.0), LimitRow::LockAt(3.5));
        assert_eq!(inverted.select(-100.0), LimitRow::LockAt(3.5));

        let zero = DofLimits::new(1.0, 1.0);
        assert_eq!(zero.select(0.3), LimitRow::HoldCurrent);

        assert_eq!(DofLimits::default().select(1.0e6), LimitRow::Free);
    }

    #[test]
    fn test_free_row_uses_friction() {
        let mut rows = RowBuffer::new();
        let limits = DofLimits::new(2.0, 5.0);
        let selected = submit_limited(&mut rows, &linear_axis(), 3.0, 0.6, &limits, 1.5, 1.0, DT);
        assert_eq!(selected, LimitRow::Free);

        let row = rows.rows()[0];
        assert_eq!(row.min_friction, -1.5);
        assert_eq!(row.max_friction, 1.5);
        assert!((row.acceleration.unwrap() + 0.6 / DT).abs() < 1e-3);
        assert!(row.position_error().abs() < 1e-6);
    }

    #[test]
    fn test_stop_row_is_one_sided() {
        let mut rows = RowBuffer::new();
        let limits = DofLimits::new(2.0, 5.0);
        let axis = DofAxis::Linear {
            point0: Vec3::new(6.0, 0.0, 0.0),
            point1: Vec3::ZERO,
            dir: Vec3::X,
        };
        let selected = submit_limited(&mut rows, &axis, 6.0, 0.0, &limits, 1.5, 1.0, DT);
        assert_eq!(selected, LimitRow::StopAtMax(5.0));

        let row = rows.rows()[0];
        assert_eq!(row.max_friction, 0.0);
        assert!(row.min_friction.is_infinite());
        assert_eq!(row.acceleration, None);
        // 误差 = 位置 - 上限
        assert!((row.position_error() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_stop_engages_before_crossing() {
        let limits = DofLimits::new(-10.0, 10.0);
        // 当前在范围内，但本步会越过上限
        assert_eq!(limits.select(9.95), LimitRow::Free);
        assert_eq!(limits.select_ahead(9.95, 5.0, DT), LimitRow::StopAtMax(10.0));
        assert_eq!(limits.select_ahead(9.95, -5.0, DT), LimitRow::Free);
        assert_eq!(limits.select_ahead(-9.95, -5.0, DT), LimitRow::StopAtMin(-10.0));
        // 已越界时不看速度
        assert_eq!(limits.select_ahead(10.5, -100.0, DT), LimitRow::StopAtMax(10.0));

        let mut rows = RowBuffer::new();
        let axis = DofAxis::Linear {
            point0: Vec3::new(9.95, 0.0, 0.0),
            point1: Vec3::ZERO,
            dir: Vec3::X,
        };
        let selected = submit_limited(&mut rows, &axis, 9.95, 5.0, &limits, 0.0, 1.0, DT);
        assert_eq!(selected, LimitRow::StopAtMax(10.0));
        let row = rows.rows()[0];
        assert_eq!(row.max_friction, 0.0);
        // 速率变为 (10 - 9.95) / dt，本步结束时正好到达上限
        let arrival_rate = 5.0 + row.acceleration.unwrap() * DT;
        assert!((9.95 + arrival_rate * DT - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_inverted_limits_lock_at_midpoint() {
        let mut rows = RowBuffer::new();
        let limits = DofLimits::new(5.0, 2.0);
        submit_limited(&mut rows, &DofAxis::Angular { dir: Vec3::Z }, 0.5, 0.0, &limits, 0.0, 1.0, DT);
        let row = rows.rows()[0];
        assert_eq!(row.kind, RowKind::Angular { angle: 0.5 - 3.5 });
        assert!(!row.is_bounded());
    }

    #[test]
    fn test_motor_row() {
        let mut rows = RowBuffer::new();
        let drive = MotorDrive {
            power: 10.0,
            controller: 0.5,
            damping: 2.0,
            ..Default::default()
        };
        submit_motor(&mut rows, &DofAxis::Angular { dir: Vec3::X }, 0.0, 1.0, &drive, 1.0);
        assert_eq!(rows.rows()[0].acceleration, Some(10.0 * 0.5 - 2.0 * 1.0));
    }

    #[test]
    fn test_motor_free_spin() {
        let mut rows = RowBuffer::new();
        let drive = MotorDrive {
            power: 0.0,
            free_spin: true,
            damping: 5.0,
            ..Default::default()
        };
        submit_motor(&mut rows, &DofAxis::Angular { dir: Vec3::X }, 0.0, 3.0, &drive, 1.0);
        let row = rows.rows()[0];
        assert_eq!(row.min_friction, 0.0);
        assert_eq!(row.max_friction, 0.0);
    }

    #[test]
    fn test_dof_state_finite_difference() {
        let mut state = DofState::default();
        state.update(1.0, 0.5);
        assert_eq!(state.velocity, 0.0);
        state.update(2.0, 0.5);
        assert!((state.velocity - 2.0).abs() < 1e-6);
        assert!((state.acceleration - 4.0).abs() < 1e-6);
        state.reset();
        assert!(!state.is_initialized());
        assert_eq!(state.velocity, 0.0);
    }
}
