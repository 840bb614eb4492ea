//! 铰链关节
//!
//! 点重合 + pin 共线，只剩绕 pin 的转动；该转动可以限位并带摩擦。

use crate::engine::ConstraintRows;
use crate::joint::{
    submit_limited, submit_rate, DofLimits, DofState, JointBehavior, LimitRow, SubmitContext,
};

use super::{non_negative, PinRotation};

#[derive(Clone, Debug)]
pub struct HingeJoint {
    rotation: PinRotation,
    limits: DofLimits,
    /// 范围内的摩擦力矩
    friction: f32,
    /// 摩擦倍率
    controller: f32,
}

impl Default for HingeJoint {
    fn default() -> Self {
        Self::new()
    }
}

impl HingeJoint {
    pub fn new() -> Self {
        Self {
            rotation: PinRotation::default(),
            limits: DofLimits::default(),
            friction: 0.0,
            controller: 1.0,
        }
    }

    /// 连续角（弧度）
    pub fn angle(&self) -> f32 {
        self.rotation.state.position
    }

    pub fn omega(&self) -> f32 {
        self.rotation.state.velocity
    }

    pub fn alpha(&self) -> f32 {
        self.rotation.state.acceleration
    }

    pub fn limits(&self) -> DofLimits {
        self.limits
    }

    /// 设置限位（弧度），两端顺序不限
    pub fn set_limits(&mut self, min: f32, max: f32) {
        self.limits = DofLimits::new(min, max);
    }

    pub fn enable_limits(&mut self, enabled: bool) {
        self.limits.enabled = enabled;
    }

    pub fn friction(&self) -> f32 {
        self.friction
    }

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

impl JointBehavior for HingeJoint {
    fn max_dof(&self) -> u32 {
        6
    }

    fn submit(&mut self, ctx: &SubmitContext, rows: &mut dyn ConstraintRows) {
        ctx.lock_point(rows);
        ctx.lock_pin_alignment(rows);

        let (angle, rate, axis) = self.rotation.measure(ctx);
        match ctx.gear {
            Some(gear) if self.limits.select_ahead(angle, rate, ctx.dt) == LimitRow::Free => {
                submit_rate(rows, &axis, angle, rate, gear.target_rate, ctx.stiffness, ctx.dt);
            }
            _ => {
                submit_limited(
                    rows,
                    &axis,
                    angle,
                    rate,
                    &self.limits,
                    self.friction * self.controller,
                    ctx.stiffness,
                    ctx.dt,
                );
            }
        }
    }

    fn on_disconnect(&mut self) {
        self.rotation.reset();
    }

    fn gear_coordinate(&self) -> Option<DofState> {
        Some(self.rotation.state)
    }
}
