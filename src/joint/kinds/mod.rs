//! 具体关节类型

mod ball_and_socket;
mod corkscrew;
mod curve;
mod fixed;
mod hinge;
mod motor;
mod plane;
mod point_to_point;
mod slider;
mod spring;
mod universal;
mod up_vector;

pub use ball_and_socket::BallAndSocketJoint;
pub use corkscrew::{CorkscrewJoint, CorkscrewMode};
pub use curve::{CurvePiston, CurveSlider, CurveTrack};
pub use fixed::FixedJoint;
pub use hinge::HingeJoint;
pub use motor::{MotorJoint, ServoJoint};
pub use plane::PlaneJoint;
pub use point_to_point::{PointToPointJoint, PointToPointMode};
pub use slider::{PistonJoint, SliderJoint};
pub use spring::{SpringJoint, SpringMode};
pub use universal::UniversalJoint;
pub use up_vector::UpVectorJoint;

use glam::Vec3;

use crate::math::{self, AngularIntegration};

use super::context::SubmitContext;
use super::dof::{DofAxis, DofLimits, DofState};

/// 钳制到 ≥0，NaN 视为 0
#[inline]
pub(crate) fn non_negative(value: f32) -> f32 {
    if value.is_nan() { 0.0 } else { value.max(0.0) }
}

/// 绕 pin 旋转的 DOF 测量（连续角）
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct PinRotation {
    integration: AngularIntegration,
    pub state: DofState,
}

impl PinRotation {
    /// 更新连续角并返回 (角度, 角速度, 轴)
    pub fn measure(&mut self, ctx: &SubmitContext) -> (f32, f32, DofAxis) {
        let (cos_angle, sin_angle) = ctx.pin_cos_sin();
        let angle = self.integration.update(cos_angle, sin_angle);
        self.state.update(angle, ctx.dt);
        let pin = math::front(&ctx.parent_frame);
        (angle, ctx.angular_rate(pin), DofAxis::Angular { dir: pin })
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 沿 pin 平移的 DOF 测量
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct PinTranslation {
    pub state: DofState,
}

impl PinTranslation {
    /// 更新位置并返回 (位置, 速率, 轴)，引擎单位
    pub fn measure(&mut self, ctx: &SubmitContext) -> (f32, f32, DofAxis) {
        let pin = math::front(&ctx.parent_frame);
        let position = ctx.offset_along(pin);
        self.state.update(position, ctx.dt);
        let rate = ctx.linear_rate(ctx.child_origin(), pin);
        (position, rate, ctx.pin_linear_axis())
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 显示单位限位 → 引擎单位
pub(crate) fn scale_limits(limits: DofLimits, scale: f32) -> DofLimits {
    DofLimits {
        enabled: limits.enabled,
        min: limits.min * scale,
        max: limits.max * scale,
    }
}

/// 引擎单位测量 → 显示单位
pub(crate) fn display_state(state: DofState, scale: f32) -> DofState {
    let mut out = state;
    out.position /= scale;
    out.velocity /= scale;
    out.acceleration /= scale;
    out
}

/// 两个单位方向之间的夹角
#[inline]
pub(crate) fn angle_between(a: Vec3, b: Vec3) -> f32 {
    a.dot(b).clamp(-1.0, 1.0).acos()
}
