//! 电机与伺服
//!
//! 都是绕 pin 驱动的铰链：
//! - Motor: 目标加速度 = power × controller - damping × 角速度
//! - Servo: 弹簧阻尼拉向目标角

use crate::engine::ConstraintRows;
use crate::joint::{
    submit_motor, submit_rate, submit_spring, DofState, JointBehavior, MotorDrive, SubmitContext,
};

use super::{non_negative, PinRotation};

// ============================================================================
// Motor
// ============================================================================

#[derive(Clone, Debug, Default)]
pub struct MotorJoint {
    rotation: PinRotation,
    drive: MotorDrive,
}

impl MotorJoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn angle(&self) -> f32 {
        self.rotation.state.position
    }

    pub fn omega(&self) -> f32 {
        self.rotation.state.velocity
    }

    pub fn alpha(&self) -> f32 {
        self.rotation.state.acceleration
    }

    pub fn drive(&self) -> MotorDrive {
        self.drive
    }

    /// 期望角加速度（≥0，方向由 reversed 决定）
    pub fn set_power(&mut self, power: f32) {
        self.drive.power = non_negative(power);
    }

    pub fn set_controller(&mut self, controller: f32) {
        self.drive.controller = non_negative(controller);
    }

    pub fn set_damping(&mut self, damping: f32) {
        self.drive.damping = non_negative(damping);
    }

    pub fn set_reversed(&mut self, reversed: bool) {
        self.drive.reversed = reversed;
    }

    pub fn set_free_spin(&mut self, free_spin: bool) {
        self.drive.free_spin = free_spin;
    }

    /// 最大力矩，非正值视为不限
    pub fn set_max_torque(&mut self, torque: f32) {
        self.drive.max_force = if torque > 0.0 { torque } else { f32::INFINITY };
    }
}

impl JointBehavior for MotorJoint {
    fn max_dof(&self) -> u32 {
        6
    }

    fn submit(&mut self, ctx: &SubmitContext, rows: &mut dyn ConstraintRows) {
        ctx.lock_point(rows);
        ctx.lock_pin_alignment(rows);

        let (angle, rate, axis) = self.rotation.measure(ctx);
        match ctx.gear {
            Some(gear) => {
                submit_rate(rows, &axis, angle, rate, gear.target_rate, ctx.stiffness, ctx.dt)
            }
            None => submit_motor(rows, &axis, angle, rate, &self.drive, ctx.stiffness),
        }
    }

    fn on_disconnect(&mut self) {
        self.rotation.reset();
    }

    fn gear_coordinate(&self) -> Option<DofState> {
        Some(self.rotation.state)
    }
}

// ============================================================================
// Servo
// ============================================================================

#[derive(Clone, Debug)]
pub struct ServoJoint {
    rotation: PinRotation,
    target_angle: f32,
    /// 弹簧系数
    power: f32,
    damping: f32,
    controller: f32,
    max_torque: f32,
}

impl Default for ServoJoint {
    fn default() -> Self {
        Self::new()
    }
}

impl ServoJoint {
    pub fn new() -> Self {
        Self {
            rotation: PinRotation::default(),
            target_angle: 0.0,
            power: 0.0,
            damping: 0.0,
            controller: 1.0,
            max_torque: f32::INFINITY,
        }
    }

    pub fn angle(&self) -> f32 {
        self.rotation.state.position
    }

    pub fn omega(&self) -> f32 {
        self.rotation.state.velocity
    }

    pub fn alpha(&self) -> f32 {
        self.rotation.state.acceleration
    }

    pub fn target_angle(&self) -> f32 {
        self.target_angle
    }

    /// 目标角（连续角，弧度）
    pub fn set_target_angle(&mut self, angle: f32) {
        self.target_angle = angle;
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

    pub fn set_max_torque(&mut self, torque: f32) {
        self.max_torque = if torque > 0.0 { torque } else { f32::INFINITY };
    }
}

impl JointBehavior for ServoJoint {
    fn max_dof(&self) -> u32 {
        6
    }

    fn submit(&mut self, ctx: &SubmitContext, rows: &mut dyn ConstraintRows) {
        ctx.lock_point(rows);
        ctx.lock_pin_alignment(rows);

        let (angle, rate, axis) = self.rotation.measure(ctx);
        match ctx.gear {
            Some(gear) => {
                submit_rate(rows, &axis, angle, rate, gear.target_rate, ctx.stiffness, ctx.dt)
            }
            None => submit_spring(
                rows,
                &axis,
                angle,
                rate,
                self.target_angle,
                self.power * self.controller,
                self.damping,
                self.max_torque,
                ctx.stiffness,
                ctx.dt,
            ),
        }
    }

    fn on_disconnect(&mut self) {
        self.rotation.reset();
    }

    fn gear_coordinate(&self) -> Option<DofState> {
        Some(self.rotation.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{BodyState, RowBuffer};
    use crate::joint::context::test_support::context;
    use glam::{Mat4, Quat, Vec3};

    #[test]
    fn test_motor_drives_primary_row() {
        let mut motor = MotorJoint::new();
        motor.set_power(8.0);
        motor.set_controller(0.5);
        motor.set_damping(1.0);
        motor.set_reversed(true);

        let child = BodyState {
            omega: Vec3::new(2.0, 0.0, 0.0),
            ..BodyState::at_rest(Mat4::IDENTITY)
        };
        let ctx = context(&child, &BodyState::WORLD, Mat4::IDENTITY, Mat4::IDENTITY);
        let mut rows = RowBuffer::new();
        motor.submit(&ctx, &mut rows);

        assert_eq!(rows.len(), 6);
        assert_eq!(rows.rows()[5].acceleration, Some(-4.0 - 2.0));
    }

    #[test]
    fn test_motor_rejects_negative_power() {
        let mut motor = MotorJoint::new();
        motor.set_power(-5.0);
        motor.set_max_torque(0.0);
        assert_eq!(motor.drive().power, 0.0);
        assert!(motor.drive().max_force.is_infinite());
    }

    #[test]
    fn test_servo_pulls_toward_target() {
        let mut servo = ServoJoint::new();
        servo.set_power(50.0);
        servo.set_damping(2.0);
        servo.set_target_angle(1.0);

        let child_frame = Mat4::from_quat(Quat::from_rotation_x(0.2));
        let body = BodyState::at_rest(child_frame);
        let ctx = context(&body, &BodyState::WORLD, child_frame, Mat4::IDENTITY);
        let mut rows = RowBuffer::new();
        servo.submit(&ctx, &mut rows);

        // 角度小于目标，加速度为正
        assert!(rows.rows()[5].acceleration.unwrap() > 0.0);
        assert!((servo.angle() - 0.2).abs() < 1e-5);
    }
}
