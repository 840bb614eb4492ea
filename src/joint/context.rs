//! 每步提交上下文
//!
//! 由注册表在提交前从刚体快照组装：两侧枢轴的全局坐标系、步长、
//! 刚度以及（如有）齿轮目标速率。关节只读它，不接触其他关节的状态。

use glam::{Mat4, Vec3};

use crate::engine::{BodyState, ConstraintRows};
use crate::math;

use super::dof::DofAxis;

/// 齿轮给从动关节的目标速率（来自上一步主动关节的测量值）
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GearDrive {
    pub target_rate: f32,
}

/// 提交上下文
#[derive(Clone, Copy, Debug)]
pub struct SubmitContext<'a> {
    pub dt: f32,
    pub child: &'a BodyState,
    /// 无父刚体时为 BodyState::WORLD
    pub parent: &'a BodyState,
    /// 子刚体上的枢轴（全局）
    pub child_frame: Mat4,
    /// 父刚体上的枢轴（全局）
    pub parent_frame: Mat4,
    pub stiffness: f32,
    pub gear: Option<GearDrive>,
}

impl<'a> SubmitContext<'a> {
    #[inline]
    pub fn child_origin(&self) -> Vec3 {
        math::origin(&self.child_frame)
    }

    #[inline]
    pub fn parent_origin(&self) -> Vec3 {
        math::origin(&self.parent_frame)
    }

    /// 两侧在 point 处沿 dir 的相对线速度
    pub fn linear_rate(&self, point: Vec3, dir: Vec3) -> f32 {
        (self.child.point_velocity(point) - self.parent.point_velocity(point)).dot(dir)
    }

    /// 绕 dir 的相对角速度
    pub fn angular_rate(&self, dir: Vec3) -> f32 {
        (self.child.omega - self.parent.omega).dot(dir)
    }

    /// 沿父侧 pin 的线性 DOF
    pub fn pin_linear_axis(&self) -> DofAxis {
        DofAxis::Linear {
            point0: self.child_origin(),
            point1: self.parent_origin(),
            dir: math::front(&self.parent_frame),
        }
    }

    /// 枢轴沿 dir 的相对位移
    pub fn offset_along(&self, dir: Vec3) -> f32 {
        (self.child_origin() - self.parent_origin()).dot(dir)
    }

    /// 绕父侧 pin 的 (cos, sin)，以 up 轴为零角参考
    pub fn pin_cos_sin(&self) -> (f32, f32) {
        math::cos_sin_about(
            math::up(&self.parent_frame),
            math::up(&self.child_frame),
            math::front(&self.parent_frame),
        )
    }

    // ========================================
    // 常用锁定行
    // ========================================

    /// 沿 dir 锁定两侧枢轴原点
    pub fn lock_linear(&self, rows: &mut dyn ConstraintRows, dir: Vec3) {
        rows.add_linear_row(self.child_origin(), self.parent_origin(), dir);
        rows.set_row_stiffness(self.stiffness);
    }

    /// 三轴点重合
    pub fn lock_point(&self, rows: &mut dyn ConstraintRows) {
        self.lock_linear(rows, math::front(&self.parent_frame));
        self.lock_linear(rows, math::up(&self.parent_frame));
        self.lock_linear(rows, math::right(&self.parent_frame));
    }

    /// 保持两侧 pin 共线（绕父侧 up/right 两行）
    pub fn lock_pin_alignment(&self, rows: &mut dyn ConstraintRows) {
        let pin0 = math::front(&self.child_frame);
        let pin1 = math::front(&self.parent_frame);
        for dir in [math::up(&self.parent_frame), math::right(&self.parent_frame)] {
            rows.add_angular_row(math::angle_about(pin1, pin0, dir), dir);
            rows.set_row_stiffness(self.stiffness);
        }
    }

    /// 锁定绕父侧 pin 的扭转
    pub fn lock_twist(&self, rows: &mut dyn ConstraintRows) {
        let pin = math::front(&self.parent_frame);
        let angle = math::angle_about(math::up(&self.parent_frame), math::up(&self.child_frame), pin);
        rows.add_angular_row(angle, pin);
        rows.set_row_stiffness(self.stiffness);
    }

    /// 锁定全部相对旋转（子侧坐标系对齐到 target）
    pub fn lock_rotation_to(&self, rows: &mut dyn ConstraintRows, target: &Mat4) {
        let rotation = math::relative_rotation_vector(&self.child_frame, target);
        for dir in [math::front(target), math::up(target), math::right(target)] {
            rows.add_angular_row(rotation.dot(dir), dir);
            rows.set_row_stiffness(self.stiffness);
        }
    }

    /// 锁定全部相对旋转（对齐父侧枢轴）
    pub fn lock_rotation(&self, rows: &mut dyn ConstraintRows) {
        let target = self.parent_frame;
        self.lock_rotation_to(rows, &target);
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! 测试用上下文构造
    use super::*;

    pub const DT: f32 = 1.0 / 60.0;

    pub fn context<'a>(
        child: &'a BodyState,
        parent: &'a BodyState,
        child_frame: Mat4,
        parent_frame: Mat4,
    ) -> SubmitContext<'a> {
        SubmitContext {
            dt: DT,
            child,
            parent,
            child_frame,
            parent_frame,
            stiffness: 1.0,
            gear: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::engine::RowBuffer;
    use glam::Quat;

    #[test]
    fn test_aligned_frames_have_zero_error() {
        let body = BodyState::at_rest(Mat4::IDENTITY);
        let ctx = context(&body, &BodyState::WORLD, Mat4::IDENTITY, Mat4::IDENTITY);
        let mut rows = RowBuffer::new();
        ctx.lock_point(&mut rows);
        ctx.lock_pin_alignment(&mut rows);
        ctx.lock_twist(&mut rows);
        assert_eq!(rows.len(), 6);
        for row in rows.rows() {
            assert!(row.position_error().abs() < 1e-6);
        }
    }

    #[test]
    fn test_pin_misalignment_sign() {
        // 子侧 pin 绕 z 转 +0.2
        let child_frame = Mat4::from_quat(Quat::from_rotation_z(0.2));
        let body = BodyState::at_rest(Mat4::IDENTITY);
        let ctx = context(&body, &BodyState::WORLD, child_frame, Mat4::IDENTITY);
        let mut rows = RowBuffer::new();
        ctx.lock_pin_alignment(&mut rows);
        // 第二行绕 right(z)
        assert!((rows.rows()[1].position_error() - 0.2).abs() < 1e-5);
        assert!(rows.rows()[0].position_error().abs() < 1e-5);
    }

    #[test]
    fn test_relative_rates() {
        let child = BodyState {
            transform: Mat4::IDENTITY,
            velocity: Vec3::new(1.0, 0.0, 0.0),
            omega: Vec3::new(0.0, 0.0, 2.0),
            com: Vec3::ZERO,
        };
        let ctx = context(&child, &BodyState::WORLD, Mat4::IDENTITY, Mat4::IDENTITY);
        assert!((ctx.linear_rate(Vec3::ZERO, Vec3::X) - 1.0).abs() < 1e-6);
        // ω × r = (0,0,2) × (1,0,0) = (0,2,0)
        assert!((ctx.linear_rate(Vec3::X, Vec3::Y) - 2.0).abs() < 1e-6);
        assert!((ctx.angular_rate(Vec3::Z) - 2.0).abs() < 1e-6);
    }
}
