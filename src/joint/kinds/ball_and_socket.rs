//! 球窝关节
//!
//! 点重合，转动自由。可选：
//! - 锥角限位：子侧 pin 偏离父侧 pin 的角度不超过 max_cone
//! - 扭转限位：子侧绕自身 pin 的扭转（去掉摆动后）
//! - 摆动/扭转摩擦（钳制乘以 controller）

use glam::{Quat, Vec3};

use crate::engine::ConstraintRows;
use crate::joint::{
    submit_limited, DofAxis, DofLimits, DofState, JointBehavior, SubmitContext, LIMIT_EPSILON,
};
use crate::math::{self, AngularIntegration};

use super::{angle_between, non_negative};

/// 摆动轴退化阈值
const SWING_AXIS_EPSILON: f32 = 1.0e-6;

#[derive(Clone, Debug)]
pub struct BallAndSocketJoint {
    cone_enabled: bool,
    max_cone: f32,
    twist_limits: DofLimits,
    friction: f32,
    controller: f32,
    twist: AngularIntegration,
    twist_state: DofState,
    cone_state: DofState,
}

impl Default for BallAndSocketJoint {
    fn default() -> Self {
        Self::new()
    }
}

impl BallAndSocketJoint {
    pub fn new() -> Self {
        Self {
            cone_enabled: false,
            max_cone: std::f32::consts::PI,
            twist_limits: DofLimits::default(),
            friction: 0.0,
            controller: 1.0,
            twist: AngularIntegration::default(),
            twist_state: DofState::default(),
            cone_state: DofState::default(),
        }
    }

    /// 子侧 pin 偏离父侧 pin 的角度
    pub fn cone_angle(&self) -> f32 {
        self.cone_state.position
    }

    /// 扭转角（连续）
    pub fn twist_angle(&self) -> f32 {
        self.twist_state.position
    }

    pub fn twist_omega(&self) -> f32 {
        self.twist_state.velocity
    }

    pub fn max_cone(&self) -> f32 {
        self.max_cone
    }

    /// 锥角上限，钳制到 [0, π]
    pub fn set_cone_limit(&mut self, max_cone: f32) {
        self.max_cone = non_negative(max_cone).min(std::f32::consts::PI);
        self.cone_enabled = true;
    }

    pub fn enable_cone_limit(&mut self, enabled: bool) {
        self.cone_enabled = enabled;
    }

    pub fn is_cone_limited(&self) -> bool {
        self.cone_enabled
    }

    pub fn twist_limits(&self) -> DofLimits {
        self.twist_limits
    }

    pub fn set_twist_limits(&mut self, min: f32, max: f32) {
        self.twist_limits = DofLimits::new(min, max);
    }

    pub fn enable_twist_limits(&mut self, enabled: bool) {
        self.twist_limits.enabled = enabled;
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

    fn effective_friction(&self) -> f32 {
        self.friction * self.controller
    }

    /// 摆动行：越过锥角时单侧止挡，否则只在有摩擦时提交
    fn submit_swing(
        &self,
        ctx: &SubmitContext,
        rows: &mut dyn ConstraintRows,
        pin0: Vec3,
        pin1: Vec3,
    ) {
        let cone = self.cone_state.position;
        let lateral = pin1.cross(pin0);
        let length = lateral.length();
        if length <= SWING_AXIS_EPSILON {
            return;
        }
        let swing_axis = lateral / length;
        let swing_rate = ctx.angular_rate(swing_axis);

        if self.cone_enabled && cone >= self.max_cone - LIMIT_EPSILON {
            rows.add_angular_row(cone - self.max_cone, swing_axis);
            rows.set_row_stiffness(ctx.stiffness);
            rows.set_row_max_friction(0.0);
        } else if self.effective_friction() > 0.0 {
            let axis = DofAxis::Angular { dir: swing_axis };
            submit_limited(
                rows,
                &axis,
                cone,
                swing_rate,
                &DofLimits::default(),
                self.effective_friction(),
                ctx.stiffness,
                ctx.dt,
            );
        }
    }
}

impl JointBehavior for BallAndSocketJoint {
    fn max_dof(&self) -> u32 {
        6
    }

    fn submit(&mut self, ctx: &SubmitContext, rows: &mut dyn ConstraintRows) {
        ctx.lock_point(rows);

        let pin0 = math::front(&ctx.child_frame);
        let pin1 = math::front(&ctx.parent_frame);
        self.cone_state.update(angle_between(pin0, pin1), ctx.dt);

        // 扭转 = 父侧 up 经摆动旋转后，与子侧 up 绕子侧 pin 的夹角
        let swing = Quat::from_rotation_arc(pin1, pin0);
        let swung_up = swing * math::up(&ctx.parent_frame);
        let (cos_twist, sin_twist) = math::cos_sin_about(swung_up, math::up(&ctx.child_frame), pin0);
        let twist = self.twist.update(cos_twist, sin_twist);
        self.twist_state.update(twist, ctx.dt);

        self.submit_swing(ctx, rows, pin0, pin1);

        if self.twist_limits.enabled || self.effective_friction() > 0.0 {
            let axis = DofAxis::Angular { dir: pin0 };
            submit_limited(
                rows,
                &axis,
                twist,
                ctx.angular_rate(pin0),
                &self.twist_limits,
                self.effective_friction(),
                ctx.stiffness,
                ctx.dt,
            );
        }
    }

    fn on_disconnect(&mut self) {
        self.twist = AngularIntegration::default();
        self.twist_state.reset();
        self.cone_state.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{BodyState, RowBuffer};
    use crate::joint::context::test_support::context;
    use glam::Mat4;

    fn submit_frame(joint: &mut BallAndSocketJoint, child_frame: Mat4) -> RowBuffer {
        let body = BodyState::at_rest(child_frame);
        let ctx = context(&body, &BodyState::WORLD, child_frame, Mat4::IDENTITY);
        let mut rows = RowBuffer::new();
        joint.submit(&ctx, &mut rows);
        rows
    }

    #[test]
    fn test_free_ball_only_locks_point() {
        let mut joint = BallAndSocketJoint::new();
        let rows = submit_frame(&mut joint, Mat4::from_quat(Quat::from_rotation_y(1.0)));
        assert_eq!(rows.len(), 3);
        assert!((joint.cone_angle() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_cone_limit_stop() {
        let mut joint = BallAndSocketJoint::new();
        joint.set_cone_limit(0.5);
        let rows = submit_frame(&mut joint, Mat4::from_quat(Quat::from_rotation_z(0.8)));
        assert_eq!(rows.len(), 4);
        let stop = rows.rows()[3];
        assert!((stop.position_error() - 0.3).abs() < 1e-4);
        assert_eq!(stop.max_friction, 0.0);
        // 摆动轴 = 父 pin × 子 pin，方向为 +z
        assert!((stop.axis - Vec3::Z).length() < 1e-4);

        // 锥内不提交
        let rows = submit_frame(&mut joint, Mat4::from_quat(Quat::from_rotation_z(0.2)));
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn test_twist_measured_about_pin() {
        let mut joint = BallAndSocketJoint::new();
        joint.set_twist_limits(-0.2, 0.2);
        let rows = submit_frame(&mut joint, Mat4::from_quat(Quat::from_rotation_x(0.5)));
        assert!((joint.twist_angle() - 0.5).abs() < 1e-4);
        let stop = rows.rows()[3];
        assert!((stop.position_error() - 0.3).abs() < 1e-4);
    }

    #[test]
    fn test_friction_scaled_by_controller() {
        let mut joint = BallAndSocketJoint::new();
        joint.set_friction(3.0);
        joint.set_controller(0.5);
        // 摆动 + 扭转两行摩擦
        let rows = submit_frame(&mut joint, Mat4::from_quat(Quat::from_rotation_z(0.2)));
        assert_eq!(rows.len(), 5);
        assert!(rows.rows()[3..].iter().all(|row| row.max_friction == 1.5));
        assert!(rows.rows()[3..].iter().all(|row| row.min_friction == -1.5));

        // controller 为零时摩擦关闭
        joint.set_controller(0.0);
        let rows = submit_frame(&mut joint, Mat4::from_quat(Quat::from_rotation_z(0.2)));
        assert_eq!(rows.len(), 3);
    }
}
