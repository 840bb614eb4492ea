//! 朝上关节
//!
//! 平移全部自由，子侧 pin 由弹簧阻尼拉向父侧 pin（绕 up/right 两行），
//! 绕 pin 的转动自由。pin 方向可在运行时修改（见 JointRegistry::set_up_vector_pin）。

use crate::engine::ConstraintRows;
use crate::joint::{submit_spring, DofAxis, DofState, JointBehavior, SubmitContext};
use crate::math;

use super::{angle_between, non_negative};

/// 默认对齐弹簧，足够硬以接近刚性锁定
const DEFAULT_SPRING: f32 = 2000.0;
const DEFAULT_DAMPER: f32 = 60.0;

#[derive(Clone, Debug)]
pub struct UpVectorJoint {
    spring: f32,
    damper: f32,
    max_torque: f32,
    deviation: DofState,
}

impl Default for UpVectorJoint {
    fn default() -> Self {
        Self::new()
    }
}

impl UpVectorJoint {
    pub fn new() -> Self {
        Self {
            spring: DEFAULT_SPRING,
            damper: DEFAULT_DAMPER,
            max_torque: f32::INFINITY,
            deviation: DofState::default(),
        }
    }

    /// 子侧 pin 与目标方向的夹角
    pub fn deviation(&self) -> f32 {
        self.deviation.position
    }

    pub fn spring(&self) -> f32 {
        self.spring
    }

    /// 对齐弹簧刚度（≥0）
    pub fn set_spring(&mut self, spring: f32) {
        self.spring = non_negative(spring);
    }

    pub fn damper(&self) -> f32 {
        self.damper
    }

    pub fn set_damper(&mut self, damper: f32) {
        self.damper = non_negative(damper);
    }

    pub fn max_torque(&self) -> f32 {
        self.max_torque
    }

    /// 对齐行力上限，≤0 表示不限
    pub fn set_max_torque(&mut self, torque: f32) {
        self.max_torque = if torque > 0.0 { torque } else { f32::INFINITY };
    }
}

impl JointBehavior for UpVectorJoint {
    fn max_dof(&self) -> u32 {
        2
    }

    fn submit(&mut self, ctx: &SubmitContext, rows: &mut dyn ConstraintRows) {
        let pin0 = math::front(&ctx.child_frame);
        let pin1 = math::front(&ctx.parent_frame);
        self.deviation.update(angle_between(pin0, pin1), ctx.dt);

        for dir in [math::up(&ctx.parent_frame), math::right(&ctx.parent_frame)] {
            let angle = math::angle_about(pin1, pin0, dir);
            submit_spring(
                rows,
                &DofAxis::Angular { dir },
                angle,
                ctx.angular_rate(dir),
                0.0,
                self.spring,
                self.damper,
                self.max_torque,
                ctx.stiffness,
                ctx.dt,
            );
        }
    }

    fn on_disconnect(&mut self) {
        self.deviation.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{BodyState, RowBuffer};
    use crate::joint::context::test_support::context;
    use glam::{Mat4, Quat, Vec3};

    #[test]
    fn test_translation_is_free() {
        let mut joint = UpVectorJoint::new();
        let child_frame = Mat4::from_rotation_translation(
            Quat::from_rotation_y(0.25),
            Vec3::new(4.0, -2.0, 1.0),
        );
        let body = BodyState::at_rest(child_frame);
        let ctx = context(&body, &BodyState::WORLD, child_frame, Mat4::IDENTITY);
        let mut rows = RowBuffer::new();
        joint.submit(&ctx, &mut rows);

        assert_eq!(rows.len(), 2);
        assert!(rows.rows().iter().all(|row| !row.is_linear()));
        // 绕 up(y) 偏转 0.25
        assert!((joint.deviation() - 0.25).abs() < 1e-4);
    }

    #[test]
    fn test_tilt_is_driven_by_spring() {
        let mut joint = UpVectorJoint::new();
        joint.set_spring(50.0);
        joint.set_damper(2.0);
        joint.set_max_torque(8.0);

        let child_frame = Mat4::from_quat(Quat::from_rotation_y(0.25));
        let body = BodyState::at_rest(child_frame);
        let ctx = context(&body, &BodyState::WORLD, child_frame, Mat4::IDENTITY);
        let mut rows = RowBuffer::new();
        joint.submit(&ctx, &mut rows);

        let tilted = rows.rows()[0];
        // 弹簧行：显式加速度拉回，行力有限
        let accel = tilted.acceleration.unwrap();
        assert!(accel < 0.0);
        assert!(accel.is_finite());
        assert_eq!(tilted.max_friction, 8.0);
        assert_eq!(tilted.min_friction, -8.0);
        // 未偏转的一行没有恢复加速度
        assert!(rows.rows()[1].acceleration.unwrap().abs() < 1e-4);

        // 刚度越小，拉回越弱
        joint.set_spring(5.0);
        let mut softer = RowBuffer::new();
        joint.submit(&ctx, &mut softer);
        assert!(softer.rows()[0].acceleration.unwrap() > accel);
    }
}
