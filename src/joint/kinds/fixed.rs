//! 固定关节 - 六个自由度全部锁定

use crate::engine::ConstraintRows;
use crate::joint::{JointBehavior, SubmitContext};

#[derive(Clone, Debug, Default)]
pub struct FixedJoint;

impl FixedJoint {
    pub fn new() -> Self {
        Self
    }
}

impl JointBehavior for FixedJoint {
    fn max_dof(&self) -> u32 {
        6
    }

    fn submit(&mut self, ctx: &SubmitContext, rows: &mut dyn ConstraintRows) {
        ctx.lock_point(rows);
        ctx.lock_rotation(rows);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{BodyState, RowBuffer};
    use crate::joint::context::test_support::context;
    use glam::{Mat4, Quat, Vec3};

    #[test]
    fn test_six_locked_rows() {
        let child_frame = Mat4::from_rotation_translation(
            Quat::from_rotation_y(0.1),
            Vec3::new(0.0, 0.2, 0.0),
        );
        let body = BodyState::at_rest(Mat4::IDENTITY);
        let ctx = context(&body, &BodyState::WORLD, child_frame, Mat4::IDENTITY);
        let mut rows = RowBuffer::new();
        FixedJoint::new().submit(&ctx, &mut rows);

        assert_eq!(rows.len(), 6);
        assert!(rows.rows().iter().all(|row| row.acceleration.is_none()));
        // up 方向偏移 0.2，绕 up 旋转 0.1
        assert!((rows.rows()[1].position_error() - 0.2).abs() < 1e-5);
        assert!((rows.rows()[4].position_error() - 0.1).abs() < 1e-4);
    }
}
