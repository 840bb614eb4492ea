//! 曲线切线坐标系 - 平行移动
//!
//! up 轴由上一步缓存的坐标系平行移动而来，避免在折线拐角处出现人为的扭转跳变。

use glam::{Mat4, Quat, Vec3};

use crate::math::{self, any_perpendicular};

/// 沿曲线移动的切线坐标系（front = 切线）
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TangentFrame {
    pub front: Vec3,
    pub up: Vec3,
    pub right: Vec3,
}

impl TangentFrame {
    /// 以切线和参考 up 构造（参考 up 与切线平行时任取垂直向量）
    pub fn new(tangent: Vec3, reference_up: Vec3) -> Self {
        let front = tangent.normalize_or(Vec3::X);
        let projected = reference_up - front * reference_up.dot(front);
        let up = projected.try_normalize().unwrap_or_else(|| any_perpendicular(front));
        let right = front.cross(up);
        Self { front, up, right }
    }

    /// 把当前坐标系平行移动到新的切线
    ///
    /// 用把旧切线转到新切线的最小旋转去旋转 up，再正交化。
    pub fn transport(&self, tangent: Vec3) -> Self {
        let new_front = tangent.normalize_or(self.front);
        let rotation = Quat::from_rotation_arc(self.front, new_front);
        Self::new(new_front, rotation * self.up)
    }

    /// 组装为枢轴坐标系
    pub fn to_matrix(&self, origin: Vec3) -> Mat4 {
        math::frame_from_axes(self.front, self.up, self.right, origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_is_orthonormal() {
        let frame = TangentFrame::new(Vec3::new(1.0, 1.0, 0.0), Vec3::Y);
        let m = frame.to_matrix(Vec3::ZERO);
        assert!(math::is_orthonormal(&m));
    }

    #[test]
    fn test_parallel_reference_falls_back() {
        let frame = TangentFrame::new(Vec3::Y, Vec3::Y);
        assert!(frame.up.dot(Vec3::Y).abs() < 1e-5);
        assert!((frame.up.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_transport_around_bend_keeps_up() {
        // 在水平面内拐 90 度，up 保持 +Z
        let frame = TangentFrame::new(Vec3::X, Vec3::Z);
        let bent = frame.transport(Vec3::Y);
        assert!((bent.up - Vec3::Z).length() < 1e-5);
        assert!((bent.front - Vec3::Y).length() < 1e-5);
    }

    #[test]
    fn test_transport_over_the_top() {
        // 切线从 +X 转到 +Y（竖直面内拐弯），up 随之转动而不翻转
        let frame = TangentFrame::new(Vec3::X, Vec3::Y);
        let bent = frame.transport(Vec3::Y);
        assert!((bent.up - Vec3::NEG_X).length() < 1e-5);
    }
}
