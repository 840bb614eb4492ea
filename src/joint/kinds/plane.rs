//! 平面关节
//!
//! 子侧枢轴只能在父侧平面（法向 = 父侧 pin）内滑动，子侧 pin 保持与法向共线。
//! 绕法向的转动默认自由，可锁定。

use crate::engine::ConstraintRows;
use crate::joint::{DofState, JointBehavior, SubmitContext};
use crate::math::{self, UnitScale};

#[derive(Clone, Debug)]
pub struct PlaneJoint {
    rotation_enabled: bool,
    /// 离开平面的距离（引擎单位）
    offset: DofState,
    units: UnitScale,
}

impl PlaneJoint {
    pub fn new(units: UnitScale) -> Self {
        Self {
            rotation_enabled: true,
            offset: DofState::default(),
            units,
        }
    }

    pub fn is_rotation_enabled(&self) -> bool {
        self.rotation_enabled
    }

    /// 是否允许绕法向转动
    pub fn enable_rotation(&mut self, enabled: bool) {
        self.rotation_enabled = enabled;
    }

    /// 离开平面的距离（显示单位）
    pub fn plane_offset(&self) -> f32 {
        self.units.to_display(self.offset.position)
    }
}

impl JointBehavior for PlaneJoint {
    fn max_dof(&self) -> u32 {
        4
    }

    fn submit(&mut self, ctx: &SubmitContext, rows: &mut dyn ConstraintRows) {
        let normal = math::front(&ctx.parent_frame);
        self.offset.update(ctx.offset_along(normal), ctx.dt);

        ctx.lock_linear(rows, normal);
        ctx.lock_pin_alignment(rows);
        if !self.rotation_enabled {
            ctx.lock_twist(rows);
        }
    }

    fn on_disconnect(&mut self) {
        self.offset.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{BodyState, RowBuffer};
    use crate::joint::context::test_support::context;
    use glam::{Mat4, Vec3};

    #[test]
    fn test_plane_rows() {
        let mut joint = PlaneJoint::new(UnitScale::new(2.0));
        let child_frame = Mat4::from_translation(Vec3::new(0.5, 3.0, -7.0));
        let body = BodyState::at_rest(child_frame);
        let ctx = context(&body, &BodyState::WORLD, child_frame, Mat4::IDENTITY);

        let mut rows = RowBuffer::new();
        joint.submit(&ctx, &mut rows);
        assert_eq!(rows.len(), 3);
        assert!((rows.rows()[0].position_error() - 0.5).abs() < 1e-6);
        assert!((joint.plane_offset() - 0.25).abs() < 1e-6);

        joint.enable_rotation(false);
        let mut rows = RowBuffer::new();
        joint.submit(&ctx, &mut rows);
        assert_eq!(rows.len(), 4);
    }
}
