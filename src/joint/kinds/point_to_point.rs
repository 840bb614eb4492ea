//! 点对点关节
//!
//! 父侧枢轴与子侧挂点之间的距离约束，转动全部自由。
//! 长度均为显示单位。

use glam::{Mat4, Vec3};

use crate::engine::ConstraintRows;
use crate::joint::{DofState, JointBehavior, SubmitContext, LIMIT_EPSILON};
use crate::math::{self, UnitScale};

/// 距离约束方式
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PointToPointMode {
    /// 绳：距离不超过 max_length，可松弛（0~1 行）
    Rope { max_length: f32 },
    /// 杆：距离恒为 length（1 行）
    Rod { length: f32 },
    /// 偏移：子侧挂点固定在父侧 pin 方向 length 处（3 行）
    Offset { length: f32 },
}

#[derive(Clone, Debug)]
pub struct PointToPointJoint {
    mode: PointToPointMode,
    /// 子侧挂点（父侧枢轴局部坐标，引擎单位）
    child_offset: Vec3,
    distance: DofState,
    units: UnitScale,
}

impl PointToPointJoint {
    /// `pivot` 为父侧枢轴、`child_point` 为子侧挂点，均为世界空间引擎单位。
    /// 默认模式为杆，长度取创建时两点距离
    pub fn new(units: UnitScale, pivot: Mat4, child_point: Vec3) -> Self {
        let length = units.to_display(math::origin(&pivot).distance(child_point));
        Self {
            mode: PointToPointMode::Rod { length },
            child_offset: pivot.inverse().transform_point3(child_point),
            distance: DofState::default(),
            units,
        }
    }

    pub fn mode(&self) -> PointToPointMode {
        self.mode
    }

    /// 切换模式，长度取非负值
    pub fn set_mode(&mut self, mode: PointToPointMode) {
        let clamp = |value: f32| if value.is_nan() { 0.0 } else { value.max(0.0) };
        self.mode = match mode {
            PointToPointMode::Rope { max_length } => PointToPointMode::Rope {
                max_length: clamp(max_length),
            },
            PointToPointMode::Rod { length } => PointToPointMode::Rod { length: clamp(length) },
            PointToPointMode::Offset { length } => PointToPointMode::Offset {
                length: clamp(length),
            },
        };
    }

    /// 当前两点距离（显示单位）
    pub fn distance(&self) -> f32 {
        self.units.to_display(self.distance.position)
    }

    pub fn distance_rate(&self) -> f32 {
        self.units.to_display(self.distance.velocity)
    }
}

impl JointBehavior for PointToPointJoint {
    fn max_dof(&self) -> u32 {
        3
    }

    fn submit(&mut self, ctx: &SubmitContext, rows: &mut dyn ConstraintRows) {
        let p0 = ctx.child_origin();
        let p1 = ctx.parent_origin();
        let front = math::front(&ctx.parent_frame);
        self.distance.update(p0.distance(p1), ctx.dt);
        let dir = math::direction_between(p1, p0, front);

        match self.mode {
            PointToPointMode::Rope { max_length } => {
                let max_length = self.units.to_engine(max_length);
                if self.distance.position >= max_length - LIMIT_EPSILON {
                    rows.add_linear_row(p0, p1 + dir * max_length, dir);
                    rows.set_row_stiffness(ctx.stiffness);
                    // 只能拉，不能推
                    rows.set_row_max_friction(0.0);
                }
            }
            PointToPointMode::Rod { length } => {
                let length = self.units.to_engine(length);
                rows.add_linear_row(p0, p1 + dir * length, dir);
                rows.set_row_stiffness(ctx.stiffness);
            }
            PointToPointMode::Offset { length } => {
                let target = p1 + front * self.units.to_engine(length);
                for axis in [front, math::up(&ctx.parent_frame), math::right(&ctx.parent_frame)] {
                    rows.add_linear_row(p0, target, axis);
                    rows.set_row_stiffness(ctx.stiffness);
                }
            }
        }
    }

    fn on_disconnect(&mut self) {
        self.distance.reset();
    }

    fn adjust_child_pivot(&self, pivot: Mat4) -> Mat4 {
        let mut adjusted = pivot;
        adjusted.w_axis = pivot.transform_point3(self.child_offset).extend(1.0);
        adjusted
    }
}
