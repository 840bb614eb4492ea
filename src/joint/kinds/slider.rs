//! 滑块与活塞
//!
//! 垂直 pin 的两个方向锁定、三个转动锁定，只剩沿 pin 的平移：
//! - Slider: 限位 + 摩擦
//! - Piston: 弹簧阻尼拉向目标位置，越界时限位优先

use crate::engine::ConstraintRows;
use crate::joint::{
    submit_limited, submit_rate, submit_spring, DofLimits, DofState, JointBehavior, LimitRow,
    SubmitContext,
};
use crate::math::{self, UnitScale};

use super::{display_state, non_negative, scale_limits, PinTranslation};

/// 锁定垂直 pin 的两个平移方向
fn lock_lateral(ctx: &SubmitContext, rows: &mut dyn ConstraintRows) {
    ctx.lock_linear(rows, math::up(&ctx.parent_frame));
    ctx.lock_linear(rows, math::right(&ctx.parent_frame));
}

// ============================================================================
// Slider
// ============================================================================

/// 滑块（线性量均为显示单位）
#[derive(Clone, Debug)]
pub struct SliderJoint {
    translation: PinTranslation,
    limits: DofLimits,
    friction: f32,
    controller: f32,
    units: UnitScale,
}

impl SliderJoint {
    pub fn new(units: UnitScale) -> Self {
        Self {
            translation: PinTranslation::default(),
            limits: DofLimits::default(),
            friction: 0.0,
            controller: 1.0,
            units,
        }
    }

    /// 沿 pin 的位置/速度/加速度（显示单位）
    pub fn measurement(&self) -> DofState {
        display_state(self.translation.state, self.units.length())
    }

    pub fn position(&self) -> f32 {
        self.measurement().position
    }

    pub fn velocity(&self) -> f32 {
        self.measurement().velocity
    }

    pub fn acceleration(&self) -> f32 {
        self.measurement().acceleration
    }

    pub fn limits(&self) -> DofLimits {
        self.limits
    }

    /// 设置限位（显示单位），两端顺序不限
    pub fn set_limits(&mut self, min: f32, max: f32) {
        self.limits = DofLimits::new(min, max);
    }

    pub fn enable_limits(&mut self, enabled: bool) {
        self.limits.enabled = enabled;
    }

    pub fn friction(&self) -> f32 {
        self.friction
    }

    /// 范围内摩擦力（显示单位）
    pub fn set_friction(&mut self, friction: f32) {
        self.friction = non_negative(friction);
    }

    pub fn controller(&self) -> f32 {
        self.controller
    }

    pub fn set_controller(&mut self, controller: f32) {
        self.controller = non_negative(controller);
    }
}

impl JointBehavior for SliderJoint {
    fn max_dof(&self) -> u32 {
        6
    }

    fn submit(&mut self, ctx: &SubmitContext, rows: &mut dyn ConstraintRows) {
        lock_lateral(ctx, rows);

        let (position, rate, axis) = self.translation.measure(ctx);
        let limits = scale_limits(self.limits, self.units.length());
        match ctx.gear {
            Some(gear) if limits.select_ahead(position, rate, ctx.dt) == LimitRow::Free => {
                submit_rate(rows, &axis, position, rate, gear.target_rate, ctx.stiffness, ctx.dt);
            }
            _ => {
                let friction = self.units.to_engine(self.friction * self.controller);
                submit_limited(
                    rows, &axis, position, rate, &limits, friction, ctx.stiffness, ctx.dt,
                );
            }
        }

        ctx.lock_rotation(rows);
    }

    fn on_disconnect(&mut self) {
        self.translation.reset();
    }

    fn gear_coordinate(&self) -> Option<DofState> {
        Some(self.translation.state)
    }
}

// ============================================================================
// Piston
// ============================================================================

/// 活塞（线性量均为显示单位）
#[derive(Clone, Debug)]
pub struct PistonJoint {
    translation: PinTranslation,
    limits: DofLimits,
    target_position: f32,
    /// 弹簧系数
    power: f32,
    damping: f32,
    controller: f32,
    max_force: f32,
    units: UnitScale,
}

impl PistonJoint {
    pub fn new(units: UnitScale) -> Self {
        Self {
            translation: PinTranslation::default(),
            limits: DofLimits::default(),
            target_position: 0.0,
            power: 0.0,
            damping: 0.0,
            controller: 1.0,
            max_force: f32::INFINITY,
            units,
        }
    }

    pub fn measurement(&self) -> DofState {
        display_state(self.translation.state, self.units.length())
    }

    pub fn position(&self) -> f32 {
        self.measurement().position
    }

    pub fn velocity(&self) -> f32 {
        self.measurement().velocity
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

    pub fn target_position(&self) -> f32 {
        self.target_position
    }

    pub fn set_target_position(&mut self, position: f32) {
        self.target_position = position;
    }

    pub fn power(&self) -> f32 {
        self.power
    }

    pub fn set_power(&mut self, power: f32) {
        self.power = non_negative(power);
    }

    pub fn damping(&self) -> f32 {
        self.damping
    }

    pub fn set_damping(&mut self, damping: f32) {
        self.damping = non_negative(damping);
    }

    pub fn controller(&self) -> f32 {
        self.controller
    }

    pub fn set_controller(&mut self, controller: f32) {
        self.controller = non_negative(controller);
    }

    /// 最大推力（显示单位），非正值视为不限
    pub fn set_max_force(&mut self, force: f32) {
        self.max_force = if force > 0.0 { force } else { f32::INFINITY };
    }
}

impl JointBehavior for PistonJoint {
    fn max_dof(&self) -> u32 {
        6
    }

    fn submit(&mut self, ctx: &SubmitContext, rows: &mut dyn ConstraintRows) {
        lock_lateral(ctx, rows);

        let (position, rate, axis) = self.translation.measure(ctx);
        let limits = scale_limits(self.limits, self.units.length());
        match (limits.select_ahead(position, rate, ctx.dt), ctx.gear) {
            (LimitRow::Free, Some(gear)) => {
                submit_rate(rows, &axis, position, rate, gear.target_rate, ctx.stiffness, ctx.dt);
            }
            (LimitRow::Free, None) => {
                submit_spring(
                    rows,
                    &axis,
                    position,
                    rate,
                    self.units.to_engine(self.target_position),
                    self.power * self.controller,
                    self.damping,
                    self.units.to_engine(self.max_force),
                    ctx.stiffness,
                    ctx.dt,
                );
            }
            _ => {
                submit_limited(rows, &axis, position, rate, &limits, 0.0, ctx.stiffness, ctx.dt);
            }
        }

        ctx.lock_rotation(rows);
    }

    fn on_disconnect(&mut self) {
        self.translation.reset();
    }

    fn gear_coordinate(&self) -> Option<DofState> {
        Some(self.translation.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{BodyState, RowBuffer};
    use crate::joint::context::test_support::context;
    use glam::{Mat4, Vec3};

    fn submit_at<J: JointBehavior>(joint: &mut J, offset: Vec3) -> RowBuffer {
        let child_frame = Mat4::from_translation(offset);
        let body = BodyState::at_rest(child_frame);
        let ctx = context(&body, &BodyState::WORLD, child_frame, Mat4::IDENTITY);
        let mut rows = RowBuffer::new();
        joint.submit(&ctx, &mut rows);
        rows
    }

    #[test]
    fn test_slider_row_layout() {
        let mut slider = SliderJoint::new(UnitScale::default());
        let rows = submit_at(&mut slider, Vec3::new(2.0, 0.1, 0.0));
        assert_eq!(rows.len(), 6);
        // 第一行是 up 方向的侧向锁定
        assert!((rows.rows()[0].position_error() - 0.1).abs() < 1e-6);
        // 主行沿 pin，自由
        assert_eq!(rows.rows()[2].axis, Vec3::X);
        assert!(rows.rows()[2].position_error().abs() < 1e-6);
        assert!((slider.position() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_slider_limits_in_display_units() {
        // 1 显示单位 = 0.5 引擎单位
        let mut slider = SliderJoint::new(UnitScale::new(0.5));
        slider.set_limits(-2.0, 2.0);
        // 引擎位置 1.5 = 显示位置 3.0，越过上限
        let rows = submit_at(&mut slider, Vec3::new(1.5, 0.0, 0.0));
        let primary = rows.rows()[2];
        assert_eq!(primary.max_friction, 0.0);
        assert!((primary.position_error() - 0.5).abs() < 1e-5);
        assert!((slider.position() - 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_piston_spring_and_limit() {
        let mut piston = PistonJoint::new(UnitScale::default());
        piston.set_power(20.0);
        piston.set_target_position(1.0);
        let rows = submit_at(&mut piston, Vec3::ZERO);
        assert!(rows.rows()[2].acceleration.unwrap() > 0.0);

        piston.set_limits(-0.5, 0.5);
        let rows = submit_at(&mut piston, Vec3::new(-0.8, 0.0, 0.0));
        let primary = rows.rows()[2];
        assert_eq!(primary.min_friction, 0.0);
        assert_eq!(primary.acceleration, None);
    }
}
