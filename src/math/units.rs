//! 显示单位 ↔ 引擎单位换算
//!
//! 只有线性量需要换算，角度两侧都是弧度。

use glam::{Mat4, Vec3};

/// 长度换算比例（引擎单位 / 显示单位）
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UnitScale {
    length: f32,
}

impl Default for UnitScale {
    fn default() -> Self {
        Self { length: 1.0 }
    }
}

impl UnitScale {
    pub fn new(length: f32) -> Self {
        // 非法比例退回 1.0
        let length = if length.is_finite() && length > 0.0 { length } else { 1.0 };
        Self { length }
    }

    #[inline]
    pub fn length(&self) -> f32 {
        self.length
    }

    /// 显示 → 引擎
    #[inline]
    pub fn to_engine(&self, value: f32) -> f32 {
        value * self.length
    }

    /// 引擎 → 显示
    #[inline]
    pub fn to_display(&self, value: f32) -> f32 {
        value / self.length
    }

    #[inline]
    pub fn vec_to_engine(&self, v: Vec3) -> Vec3 {
        v * self.length
    }

    #[inline]
    pub fn vec_to_display(&self, v: Vec3) -> Vec3 {
        v / self.length
    }

    /// 只换算矩阵的平移部分
    pub fn frame_to_engine(&self, frame: Mat4) -> Mat4 {
        let mut out = frame;
        out.w_axis = self.vec_to_engine(frame.w_axis.truncate()).extend(1.0);
        out
    }

    pub fn frame_to_display(&self, frame: Mat4) -> Mat4 {
        let mut out = frame;
        out.w_axis = self.vec_to_display(frame.w_axis.truncate()).extend(1.0);
        out
    }

    /// 力 (质量·长度/时间²)
    #[inline]
    pub fn force_to_display(&self, force: Vec3) -> Vec3 {
        force / self.length
    }

    /// 力矩 (质量·长度²/时间²)
    #[inline]
    pub fn torque_to_display(&self, torque: Vec3) -> Vec3 {
        torque / (self.length * self.length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_scale() {
        let units = UnitScale::new(0.02);
        let engine = units.to_engine(50.0);
        assert!((engine - 1.0).abs() < 1e-6);
        assert!((units.to_display(engine) - 50.0).abs() < 1e-4);
    }

    #[test]
    fn test_invalid_scale_falls_back() {
        assert_eq!(UnitScale::new(0.0).length(), 1.0);
        assert_eq!(UnitScale::new(f32::NAN).length(), 1.0);
    }

    #[test]
    fn test_frame_translation_only() {
        let units = UnitScale::new(2.0);
        let frame = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let scaled = units.frame_to_engine(frame);
        assert_eq!(scaled.w_axis.truncate(), Vec3::new(2.0, 4.0, 6.0));
        assert_eq!(scaled.x_axis, frame.x_axis);
    }
}
