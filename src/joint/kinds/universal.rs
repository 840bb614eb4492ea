//! 万向节
//!
//! 子侧 pin 与父侧 up 保持垂直；绕子侧 pin 和父侧 up 的两个转动
//! 各自带限位和摩擦，摩擦钳制统一乘以 controller。

use glam::Vec3;

use crate::engine::ConstraintRows;
use crate::joint::{submit_limited, DofAxis, DofLimits, DofState, JointBehavior, SubmitContext};
use crate::math::{self, AngularIntegration};

use super::non_negative;

/// 单个转动轴的状态
#[derive(Clone, Copy, Debug, Default)]
struct UniversalAxis {
    integration: AngularIntegration,
    state: DofState,
    limits: DofLimits,
    friction: f32,
}

impl UniversalAxis {
    fn submit(
        &mut self,
        ctx: &SubmitContext,
        rows: &mut dyn ConstraintRows,
        (cos_angle, sin_angle): (f32, f32),
        dir: Vec3,
        controller: f32,
    ) {
        let angle = self.integration.update(cos_angle, sin_angle);
        self.state.update(angle, ctx.dt);
        submit_limited(
            rows,
            &DofAxis::Angular { dir },
            angle,
            ctx.angular_rate(dir),
            &self.limits,
            self.friction * controller,
            ctx.stiffness,
            ctx.dt,
        );
    }

    fn reset(&mut self) {
        self.integration = AngularIntegration::default();
        self.state.reset();
    }
}

#[derive(Clone, Debug)]
pub struct UniversalJoint {
    /// [0] 绕子侧 pin，[1] 绕父侧 up
    axes: [UniversalAxis; 2],
    controller: f32,
}

impl Default for UniversalJoint {
    fn default() -> Self {
        Self::new()
    }
}

impl UniversalJoint {
    pub fn new() -> Self {
        Self {
            axes: [UniversalAxis::default(); 2],
            controller: 1.0,
        }
    }

    /// axis: 0 = 绕子侧 pin，1 = 绕父侧 up
    pub fn measurement(&self, axis: usize) -> Option<DofState> {
        self.axes.get(axis).map(|a| a.state)
    }

    pub fn limits(&self, axis: usize) -> Option<DofLimits> {
        self.axes.get(axis).map(|a| a.limits)
    }

    pub fn set_limits(&mut self, axis: usize, min: f32, max: f32) -> bool {
        match self.axes.get_mut(axis) {
            Some(a) => {
                a.limits = DofLimits::new(min, max);
                true
            }
            None => false,
        }
    }

    pub fn enable_limits(&mut self, axis: usize, enabled: bool) -> bool {
        match self.axes.get_mut(axis) {
            Some(a) => {
                a.limits.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn friction(&self, axis: usize) -> Option<f32> {
        self.axes.get(axis).map(|a| a.friction)
    }

    pub fn set_friction(&mut self, axis: usize, friction: f32) -> bool {
        match self.axes.get_mut(axis) {
            Some(a) => {
                a.friction = non_negative(friction);
                true
            }
            None => false,
        }
    }

    pub fn controller(&self) -> f32 {
        self.controller
    }

    pub fn set_controller(&mut self, controller: f32) {
        self.controller = non_negative(controller);
    }
}

impl JointBehavior for UniversalJoint {
    fn max_dof(&self) -> u32 {
        6
    }

    fn submit(&mut self, ctx: &SubmitContext, rows: &mut dyn ConstraintRows) {
        ctx.lock_point(rows);

        let pin0 = math::front(&ctx.child_frame);
        let up1 = math::up(&ctx.parent_frame);

        let controller = self.controller;
        let [axis0, axis1] = &mut self.axes;
        axis0.submit(
            ctx,
            rows,
            math::cos_sin_about(up1, math::up(&ctx.child_frame), pin0),
            pin0,
            controller,
        );
        axis1.submit(
            ctx,
            rows,
            math::cos_sin_about(math::front(&ctx.parent_frame), pin0, up1),
            up1,
            controller,
        );

        // 子侧 pin 偏向父侧 up 的角度锁定为零
        let lateral = pin0.cross(up1);
        let dir = lateral.try_normalize().unwrap_or_else(|| math::right(&ctx.parent_frame));
        rows.add_angular_row(pin0.dot(up1).clamp(-1.0, 1.0).asin(), dir);
        rows.set_row_stiffness(ctx.stiffness);
    }

    fn on_disconnect(&mut self) {
        for axis in &mut self.axes {
            axis.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{BodyState, RowBuffer};
    use crate::joint::context::test_support::context;
    use glam::{Mat4, Quat};

    fn submit_rotation(joint: &mut UniversalJoint, rotation: Quat) -> RowBuffer {
        let child_frame = Mat4::from_quat(rotation);
        let body = BodyState::at_rest(child_frame);
        let ctx = context(&body, &BodyState::WORLD, child_frame, Mat4::IDENTITY);
        let mut rows = RowBuffer::new();
        joint.submit(&ctx, &mut rows);
        rows
    }

    #[test]
    fn test_two_free_axes_measured() {
        let mut joint = UniversalJoint::new();
        let rotation = Quat::from_rotation_y(0.3) * Quat::from_rotation_x(0.2);
        let rows = submit_rotation(&mut joint, rotation);
        assert_eq!(rows.len(), 6);
        assert!((joint.measurement(0).unwrap().position - 0.2).abs() < 1e-4);
        assert!((joint.measurement(1).unwrap().position - 0.3).abs() < 1e-4);
        // 垂直约束满足
        assert!(rows.rows()[5].position_error().abs() < 1e-5);
    }

    #[test]
    fn test_tilt_toward_up_is_locked() {
        let mut joint = UniversalJoint::new();
        let rows = submit_rotation(&mut joint, Quat::from_rotation_z(0.1));
        assert!((rows.rows()[5].position_error() - 0.1).abs() < 1e-4);
    }

    #[test]
    fn test_axis_index_checked() {
        let mut joint = UniversalJoint::new();
        assert!(joint.set_limits(1, -0.5, 0.5));
        assert!(!joint.set_limits(2, -0.5, 0.5));
        assert!(joint.limits(1).unwrap().enabled);
        assert!(joint.measurement(5).is_none());
    }

    #[test]
    fn test_friction_scaled_by_controller() {
        let mut joint = UniversalJoint::new();
        joint.set_friction(0, 4.0);
        joint.set_friction(1, 2.0);
        joint.set_controller(0.25);
        let rows = submit_rotation(&mut joint, Quat::IDENTITY);
        // 点锁定 3 行之后是两个转动轴
        assert_eq!(rows.rows()[3].max_friction, 1.0);
        assert_eq!(rows.rows()[3].min_friction, -1.0);
        assert_eq!(rows.rows()[4].max_friction, 0.5);

        joint.set_controller(-1.0);
        assert_eq!(joint.controller(), 0.0);
    }
}
