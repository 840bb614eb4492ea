//! 螺旋关节
//!
//! 沿 pin 平移 + 绕 pin 转动，各自带限位和摩擦（钳制乘以 controller）。
//! Screw 模式下平移速率跟随 pitch × 角速度。

use crate::engine::ConstraintRows;
use crate::joint::{
    submit_limited, submit_rate, DofLimits, DofState, JointBehavior, LimitRow, SubmitContext,
};
use crate::math::{self, UnitScale};

use super::{display_state, non_negative, scale_limits, PinRotation, PinTranslation};

/// 平移与转动的耦合方式
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum CorkscrewMode {
    /// 两个 DOF 相互独立
    #[default]
    Free,
    /// 每弧度前进 pitch（显示单位）
    Screw { pitch: f32 },
}

#[derive(Clone, Debug)]
pub struct CorkscrewJoint {
    mode: CorkscrewMode,
    translation: PinTranslation,
    rotation: PinRotation,
    linear_limits: DofLimits,
    angular_limits: DofLimits,
    linear_friction: f32,
    angular_friction: f32,
    controller: f32,
    units: UnitScale,
}

impl CorkscrewJoint {
    pub fn new(units: UnitScale) -> Self {
        Self {
            mode: CorkscrewMode::Free,
            translation: PinTranslation::default(),
            rotation: PinRotation::default(),
            linear_limits: DofLimits::default(),
            angular_limits: DofLimits::default(),
            linear_friction: 0.0,
            angular_friction: 0.0,
            controller: 1.0,
            units,
        }
    }

    pub fn mode(&self) -> CorkscrewMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: CorkscrewMode) {
        self.mode = mode;
    }

    /// 沿 pin 的测量（显示单位）
    pub fn linear_measurement(&self) -> DofState {
        display_state(self.translation.state, self.units.length())
    }

    /// 绕 pin 的测量（弧度）
    pub fn angular_measurement(&self) -> DofState {
        self.rotation.state
    }

    pub fn linear_limits(&self) -> DofLimits {
        self.linear_limits
    }

    pub fn set_linear_limits(&mut self, min: f32, max: f32) {
        self.linear_limits = DofLimits::new(min, max);
    }

    pub fn enable_linear_limits(&mut self, enabled: bool) {
        self.linear_limits.enabled = enabled;
    }

    pub fn angular_limits(&self) -> DofLimits {
        self.angular_limits
    }

    pub fn set_angular_limits(&mut self, min: f32, max: f32) {
        self.angular_limits = DofLimits::new(min, max);
    }

    pub fn enable_angular_limits(&mut self, enabled: bool) {
        self.angular_limits.enabled = enabled;
    }

    pub fn linear_friction(&self) -> f32 {
        self.linear_friction
    }

    pub fn set_linear_friction(&mut self, friction: f32) {
        self.linear_friction = non_negative(friction);
    }

    pub fn angular_friction(&self) -> f32 {
        self.angular_friction
    }

    pub fn set_angular_friction(&mut self, friction: f32) {
        self.angular_friction = non_negative(friction);
    }

    pub fn controller(&self) -> f32 {
        self.controller
    }

    pub fn set_controller(&mut self, controller: f32) {
        self.controller = non_negative(controller);
    }
}

impl JointBehavior for CorkscrewJoint {
    fn max_dof(&self) -> u32 {
        6
    }

    fn submit(&mut self, ctx: &SubmitContext, rows: &mut dyn ConstraintRows) {
        ctx.lock_linear(rows, math::up(&ctx.parent_frame));
        ctx.lock_linear(rows, math::right(&ctx.parent_frame));

        let (angle, angular_rate, angular_axis) = self.rotation.measure(ctx);
        let (position, rate, axis) = self.translation.measure(ctx);
        let limits = scale_limits(self.linear_limits, self.units.length());

        // 平移
        let target_rate = match self.mode {
            CorkscrewMode::Screw { pitch } => Some(self.units.to_engine(pitch) * angular_rate),
            CorkscrewMode::Free => None,
        };
        match target_rate {
            Some(target) if limits.select_ahead(position, rate, ctx.dt) == LimitRow::Free => {
                submit_rate(rows, &axis, position, rate, target, ctx.stiffness, ctx.dt);
            }
            _ => {
                let friction = self.units.to_engine(self.linear_friction * self.controller);
                submit_limited(
                    rows, &axis, position, rate, &limits, friction, ctx.stiffness, ctx.dt,
                );
            }
        }

        // 转动
        ctx.lock_pin_alignment(rows);
        submit_limited(
            rows,
            &angular_axis,
            angle,
            angular_rate,
            &self.angular_limits,
            self.angular_friction * self.controller,
            ctx.stiffness,
            ctx.dt,
        );
    }

    fn on_disconnect(&mut self) {
        self.translation.reset();
        self.rotation.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{BodyState, RowBuffer};
    use crate::joint::context::test_support::context;
    use glam::{Mat4, Vec3};

    #[test]
    fn test_screw_couples_rates() {
        let mut joint = CorkscrewJoint::new(UnitScale::default());
        joint.set_mode(CorkscrewMode::Screw { pitch: 0.5 });

        let child = BodyState {
            omega: Vec3::new(4.0, 0.0, 0.0),
            ..BodyState::at_rest(Mat4::IDENTITY)
        };
        let ctx = context(&child, &BodyState::WORLD, Mat4::IDENTITY, Mat4::IDENTITY);
        let mut rows = RowBuffer::new();
        joint.submit(&ctx, &mut rows);

        assert_eq!(rows.len(), 6);
        // 平移目标速率 = 0.5 × 4，当前为 0
        let accel = rows.rows()[2].acceleration.unwrap();
        assert!((accel - 2.0 / ctx.dt).abs() < 1e-2);
        // 转动自由、无摩擦
        assert_eq!(rows.rows()[5].max_friction, 0.0);
        assert_eq!(rows.rows()[5].min_friction, 0.0);
    }

    #[test]
    fn test_free_mode_independent_limits() {
        let mut joint = CorkscrewJoint::new(UnitScale::default());
        joint.set_linear_limits(1.0, -1.0);
        joint.set_angular_friction(3.0);
        let child_frame = Mat4::from_translation(Vec3::new(0.4, 0.0, 0.0));
        let body = BodyState::at_rest(child_frame);
        let ctx = context(&body, &BodyState::WORLD, child_frame, Mat4::IDENTITY);
        let mut rows = RowBuffer::new();
        joint.submit(&ctx, &mut rows);

        // 颠倒的限位锁在中点 0
        assert!((rows.rows()[2].position_error() - 0.4).abs() < 1e-5);
        assert!(!rows.rows()[2].is_bounded());
        assert_eq!(rows.rows()[5].max_friction, 3.0);
    }

    #[test]
    fn test_friction_scaled_by_controller() {
        let mut joint = CorkscrewJoint::new(UnitScale::default());
        joint.set_linear_friction(2.0);
        joint.set_angular_friction(6.0);
        joint.set_controller(0.5);
        let body = BodyState::at_rest(Mat4::IDENTITY);
        let ctx = context(&body, &BodyState::WORLD, Mat4::IDENTITY, Mat4::IDENTITY);
        let mut rows = RowBuffer::new();
        joint.submit(&ctx, &mut rows);

        assert_eq!(rows.rows()[2].max_friction, 1.0);
        assert_eq!(rows.rows()[5].max_friction, 3.0);
        assert_eq!(rows.rows()[5].min_friction, -3.0);
    }
}
