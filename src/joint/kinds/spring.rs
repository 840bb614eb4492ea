//! 弹簧关节
//!
//! 线性模式的行布局同 Slider，角度模式同 Hinge，主行为弹簧阻尼。
//! 限位启用且越界时，止挡行替代弹簧行。

use crate::engine::ConstraintRows;
use crate::joint::{
    submit_limited, submit_rate, submit_spring, DofAxis, DofLimits, DofState, JointBehavior,
    LimitRow, SubmitContext,
};
use crate::math::{self, UnitScale};

use super::{display_state, non_negative, scale_limits, PinRotation, PinTranslation};

/// 弹簧方向
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SpringMode {
    /// 沿 pin 伸缩
    #[default]
    Linear,
    /// 绕 pin 扭转
    Angular,
}

/// 弹簧（线性模式下长度为显示单位，角度模式下为弧度）
#[derive(Clone, Debug)]
pub struct SpringJoint {
    mode: SpringMode,
    translation: PinTranslation,
    rotation: PinRotation,
    rest: f32,
    spring: f32,
    damper: f32,
    max_force: f32,
    limits: DofLimits,
    units: UnitScale,
}

impl SpringJoint {
    pub fn new(mode: SpringMode, units: UnitScale) -> Self {
        Self {
            mode,
            translation: PinTranslation::default(),
            rotation: PinRotation::default(),
            rest: 0.0,
            spring: 0.0,
            damper: 0.0,
            max_force: f32::INFINITY,
            limits: DofLimits::default(),
            units,
        }
    }

    pub fn mode(&self) -> SpringMode {
        self.mode
    }

    /// 切换模式，测量值清零
    pub fn set_mode(&mut self, mode: SpringMode) {
        if self.mode != mode {
            self.mode = mode;
            self.translation.reset();
            self.rotation.reset();
        }
    }

    /// 当前模式下的测量值（显示单位 / 弧度）
    pub fn measurement(&self) -> DofState {
        match self.mode {
            SpringMode::Linear => display_state(self.translation.state, self.units.length()),
            SpringMode::Angular => self.rotation.state,
        }
    }

    pub fn rest(&self) -> f32 {
        self.rest
    }

    pub fn set_rest(&mut self, rest: f32) {
        self.rest = rest;
    }

    pub fn spring(&self) -> f32 {
        self.spring
    }

    pub fn set_spring(&mut self, spring: f32) {
        self.spring = non_negative(spring);
    }

    pub fn damper(&self) -> f32 {
        self.damper
    }

    pub fn set_damper(&mut self, damper: f32) {
        self.damper = non_negative(damper);
    }

    pub fn set_max_force(&mut self, force: f32) {
        self.max_force = if force > 0.0 { force } else { f32::INFINITY };
    }

    pub fn limits(&self) -> DofLimits {
        self.limits
    }

    pub fn set_limits(&mut self, min: f32, max: f32) {
        self.limits = DofLimits::new(min, max);
    }

    pub fn enable_limits(&mut self, enabled: bool) {
        self.limits.enabled = enabled;
    }

    /// 主行：越界时止挡，其余情况弹簧或齿轮跟随
    #[allow(clippy::too_many_arguments)]
    fn submit_primary(
        &self,
        ctx: &SubmitContext,
        rows: &mut dyn ConstraintRows,
        axis: &DofAxis,
        position: f32,
        rate: f32,
        scale: f32,
    ) {
        let limits = scale_limits(self.limits, scale);
        match (limits.select_ahead(position, rate, ctx.dt), ctx.gear) {
            (LimitRow::Free, Some(gear)) => {
                submit_rate(rows, axis, position, rate, gear.target_rate, ctx.stiffness, ctx.dt);
            }
            (LimitRow::Free, None) => {
                submit_spring(
                    rows,
                    axis,
                    position,
                    rate,
                    self.rest * scale,
                    self.spring,
                    self.damper,
                    self.max_force * scale,
                    ctx.stiffness,
                    ctx.dt,
                );
            }
            _ => {
                submit_limited(rows, axis, position, rate, &limits, 0.0, ctx.stiffness, ctx.dt);
            }
        }
    }
}

impl JointBehavior for SpringJoint {
    fn max_dof(&self) -> u32 {
        6
    }

    fn submit(&mut self, ctx: &SubmitContext, rows: &mut dyn ConstraintRows) {
        match self.mode {
            SpringMode::Linear => {
                ctx.lock_linear(rows, math::up(&ctx.parent_frame));
                ctx.lock_linear(rows, math::right(&ctx.parent_frame));
                let (position, rate, axis) = self.translation.measure(ctx);
                self.submit_primary(ctx, rows, &axis, position, rate, self.units.length());
                ctx.lock_rotation(rows);
            }
            SpringMode::Angular => {
                ctx.lock_point(rows);
                ctx.lock_pin_alignment(rows);
                let (angle, rate, axis) = self.rotation.measure(ctx);
                self.submit_primary(ctx, rows, &axis, angle, rate, 1.0);
            }
        }
    }

    fn on_disconnect(&mut self) {
        self.translation.reset();
        self.rotation.reset();
    }

    fn gear_coordinate(&self) -> Option<DofState> {
        Some(match self.mode {
            SpringMode::Linear => self.translation.state,
            SpringMode::Angular => self.rotation.state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{BodyState, RowBuffer};
    use crate::joint::context::test_support::context;
    use glam::{Mat4, Quat, Vec3};

    fn submit_frame(spring: &mut SpringJoint, child_frame: Mat4) -> RowBuffer {
        let body = BodyState::at_rest(child_frame);
        let ctx = context(&body, &BodyState::WORLD, child_frame, Mat4::IDENTITY);
        let mut rows = RowBuffer::new();
        spring.submit(&ctx, &mut rows);
        rows
    }

    #[test]
    fn test_linear_spring_pulls_to_rest() {
        let mut spring = SpringJoint::new(SpringMode::Linear, UnitScale::default());
        spring.set_spring(100.0);
        spring.set_damper(1.0);
        spring.set_rest(1.0);
        let rows = submit_frame(&mut spring, Mat4::from_translation(Vec3::new(2.0, 0.0, 0.0)));
        assert_eq!(rows.len(), 6);
        // 拉伸超过静止长度，加速度为负
        assert!(rows.rows()[2].acceleration.unwrap() < 0.0);
        assert!((spring.measurement().position - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_angular_spring_layout() {
        let mut spring = SpringJoint::new(SpringMode::Angular, UnitScale::default());
        spring.set_spring(10.0);
        let rows = submit_frame(&mut spring, Mat4::from_quat(Quat::from_rotation_x(-0.4)));
        assert_eq!(rows.len(), 6);
        assert_eq!(rows.rows()[5].axis, Vec3::X);
        assert!(rows.rows()[5].acceleration.unwrap() > 0.0);
    }

    #[test]
    fn test_mode_switch_resets_measurement() {
        let mut spring = SpringJoint::new(SpringMode::Linear, UnitScale::default());
        submit_frame(&mut spring, Mat4::from_translation(Vec3::X));
        spring.set_mode(SpringMode::Angular);
        assert_eq!(spring.measurement().position, 0.0);
        assert_eq!(spring.mode(), SpringMode::Angular);
    }
}
