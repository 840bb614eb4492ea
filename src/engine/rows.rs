//! 约束行 - 与动力学引擎求解器之间的逐行接口
//!
//! 每个已连接关节每步提交一组约束行。行的顺序固定且与 DOF 表一致，
//! 反作用力回读按位置对应。

use glam::Vec3;

/// 约束行几何
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RowKind {
    /// 线性行：point0 在子刚体上，point1 在父刚体上，误差 = (point0 - point1)·axis
    Linear { point0: Vec3, point1: Vec3 },
    /// 角度行：误差 = 子刚体相对父刚体绕 axis 的角度
    Angular { angle: f32 },
}

/// 单条约束行
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConstraintRow {
    pub kind: RowKind,
    /// 单位轴
    pub axis: Vec3,
    /// 刚度 (0, 1]，混合硬约束与软约束
    pub stiffness: f32,
    /// 显式目标加速度；None 表示由引擎按位置误差自行修正（锁定）
    pub acceleration: Option<f32>,
    /// 行力下限
    pub min_friction: f32,
    /// 行力上限
    pub max_friction: f32,
    /// 求解后的行力（引擎回写）
    pub force: f32,
}

impl ConstraintRow {
    fn new(kind: RowKind, axis: Vec3) -> Self {
        Self {
            kind,
            axis,
            stiffness: 1.0,
            acceleration: None,
            min_friction: f32::NEG_INFINITY,
            max_friction: f32::INFINITY,
            force: 0.0,
        }
    }

    /// 当前位置误差（线性为长度，角度为弧度）
    pub fn position_error(&self) -> f32 {
        match self.kind {
            RowKind::Linear { point0, point1 } => (point0 - point1).dot(self.axis),
            RowKind::Angular { angle } => angle,
        }
    }

    pub fn is_linear(&self) -> bool {
        matches!(self.kind, RowKind::Linear { .. })
    }

    /// 行力是否被钳制（非双向无界）
    pub fn is_bounded(&self) -> bool {
        self.min_friction.is_finite() || self.max_friction.is_finite()
    }
}

/// 引擎提供的逐行约束 API
///
/// 所有 set_* 作用于最近添加的一行。
pub trait ConstraintRows {
    fn add_linear_row(&mut self, point0: Vec3, point1: Vec3, axis: Vec3);
    fn add_angular_row(&mut self, angle: f32, axis: Vec3);
    fn set_row_stiffness(&mut self, stiffness: f32);
    fn set_row_acceleration(&mut self, acceleration: f32);
    fn set_row_min_friction(&mut self, friction: f32);
    fn set_row_max_friction(&mut self, friction: f32);

    /// 隐式弹簧阻尼加速度
    ///
    /// 把 (步长, 弹簧系数, 当前偏移, 阻尼, 当前速率) 换算为一个目标加速度。
    fn spring_damper_acceleration(
        &self,
        dt: f32,
        spring: f32,
        offset: f32,
        damper: f32,
        rate: f32,
    ) -> f32 {
        let ks = spring.abs();
        let kd = damper.abs();
        let ksd = dt * ks;
        let num = ks * offset + kd * rate + ksd * rate;
        let den = 1.0 + dt * kd + dt * ksd;
        -num / den
    }
}

/// 记录约束行的缓冲区
///
/// 关节往里写行，引擎读取求解后再把行力写回 `force`。
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RowBuffer {
    rows: Vec<ConstraintRow>,
}

impl RowBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { rows: Vec::with_capacity(capacity) }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    pub fn rows(&self) -> &[ConstraintRow] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [ConstraintRow] {
        &mut self.rows
    }

    pub fn row(&self, index: usize) -> Option<&ConstraintRow> {
        self.rows.get(index)
    }

    /// 按顺序写回行力，多余的值忽略
    pub fn set_forces(&mut self, forces: &[f32]) {
        for (row, force) in self.rows.iter_mut().zip(forces) {
            row.force = *force;
        }
    }

    /// 线性行合力与角度行合力矩
    pub fn reaction(&self) -> (Vec3, Vec3) {
        self.rows.iter().fold((Vec3::ZERO, Vec3::ZERO), |(force, torque), row| {
            if row.is_linear() {
                (force + row.axis * row.force, torque)
            } else {
                (force, torque + row.axis * row.force)
            }
        })
    }

    fn last_mut(&mut self) -> Option<&mut ConstraintRow> {
        self.rows.last_mut()
    }
}

impl ConstraintRows for RowBuffer {
    fn add_linear_row(&mut self, point0: Vec3, point1: Vec3, axis: Vec3) {
        self.rows.push(ConstraintRow::new(RowKind::Linear { point0, point1 }, axis));
    }

    fn add_angular_row(&mut self, angle: f32, axis: Vec3) {
        self.rows.push(ConstraintRow::new(RowKind::Angular { angle }, axis));
    }

    fn set_row_stiffness(&mut self, stiffness: f32) {
        if let Some(row) = self.last_mut() {
            row.stiffness = stiffness.clamp(f32::EPSILON, 1.0);
        }
    }

    fn set_row_acceleration(&mut self, acceleration: f32) {
        if let Some(row) = self.last_mut() {
            row.acceleration = Some(acceleration);
        }
    }

    fn set_row_min_friction(&mut self, friction: f32) {
        if let Some(row) = self.last_mut() {
            row.min_friction = friction;
        }
    }

    fn set_row_max_friction(&mut self, friction: f32) {
        if let Some(row) = self.last_mut() {
            row.max_friction = friction;
        }
    }
}
