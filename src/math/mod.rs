//! 数学工具 - 枢轴坐标系、角度与单位
//!
//! 枢轴坐标系统一用 `Mat4` 表示：
//! - x_axis: front（销轴 / pin）
//! - y_axis: up
//! - z_axis: right
//! - w_axis: 原点

mod angular_integration;
mod units;

pub use angular_integration::AngularIntegration;
pub use units::UnitScale;

use glam::{Mat4, Quat, Vec3};

/// 由两点推导方向时的最小偏移（引擎单位）
pub const MIN_AXIS_OFFSET: f32 = 1.0e-3;

/// 正交性检查容差
pub const ORTHONORMAL_TOLERANCE: f32 = 1.0e-3;

// ============================================================================
// 坐标系分量
// ============================================================================

#[inline]
pub fn front(frame: &Mat4) -> Vec3 {
    frame.x_axis.truncate()
}

#[inline]
pub fn up(frame: &Mat4) -> Vec3 {
    frame.y_axis.truncate()
}

#[inline]
pub fn right(frame: &Mat4) -> Vec3 {
    frame.z_axis.truncate()
}

#[inline]
pub fn origin(frame: &Mat4) -> Vec3 {
    frame.w_axis.truncate()
}

/// 由三个轴和原点组装坐标系
#[inline]
pub fn frame_from_axes(front: Vec3, up: Vec3, right: Vec3, origin: Vec3) -> Mat4 {
    Mat4::from_cols(
        front.extend(0.0),
        up.extend(0.0),
        right.extend(0.0),
        origin.extend(1.0),
    )
}

/// 坐标系的旋转部分
#[inline]
pub fn frame_rotation(frame: &Mat4) -> Quat {
    Quat::from_mat4(frame).normalize()
}

// ============================================================================
// 坐标系构造与校验
// ============================================================================

/// 以 pin 为 front 构造正交坐标系（Gram-Schmidt）
///
/// pin 为零向量时返回 None。
pub fn frame_from_pin(origin: Vec3, pin: Vec3) -> Option<Mat4> {
    let front = pin.try_normalize()?;
    let helper = if front.y.abs() < 0.9 { Vec3::Y } else { Vec3::X };
    let right = front.cross(helper).normalize();
    let up = right.cross(front);
    Some(frame_from_axes(front, up, right, origin))
}

/// 由两点推导方向
///
/// 两点过近时先沿 `fallback` 加最小偏移，避免零长度线段。
pub fn direction_between(from: Vec3, to: Vec3, fallback: Vec3) -> Vec3 {
    let mut delta = to - from;
    if delta.length_squared() < MIN_AXIS_OFFSET * MIN_AXIS_OFFSET {
        delta += fallback.normalize_or(Vec3::X) * MIN_AXIS_OFFSET;
    }
    delta.normalize_or(Vec3::X)
}

/// 检查坐标系三个轴是否单位正交
pub fn is_orthonormal(frame: &Mat4) -> bool {
    let (f, u, r) = (front(frame), up(frame), right(frame));
    let unit = |v: Vec3| (v.length() - 1.0).abs() < ORTHONORMAL_TOLERANCE;
    unit(f)
        && unit(u)
        && unit(r)
        && f.dot(u).abs() < ORTHONORMAL_TOLERANCE
        && f.dot(r).abs() < ORTHONORMAL_TOLERANCE
        && u.dot(r).abs() < ORTHONORMAL_TOLERANCE
        && frame.w_axis.w == 1.0
}

// ============================================================================
// 角度
// ============================================================================

/// 绕 `axis` 从 `from` 转到 `to` 的有符号角度
#[inline]
pub fn angle_about(from: Vec3, to: Vec3, axis: Vec3) -> f32 {
    let sin_angle = from.cross(to).dot(axis);
    let cos_angle = from.dot(to);
    sin_angle.atan2(cos_angle)
}

/// 绕 `axis` 从 `from` 转到 `to` 的 (cos, sin)，供 AngularIntegration 使用
#[inline]
pub fn cos_sin_about(from: Vec3, to: Vec3, axis: Vec3) -> (f32, f32) {
    let sin_angle = from.cross(to).dot(axis);
    let cos_angle = from.dot(to);
    let len = (sin_angle * sin_angle + cos_angle * cos_angle).sqrt();
    if len > f32::EPSILON {
        (cos_angle / len, sin_angle / len)
    } else {
        (1.0, 0.0)
    }
}

/// child 相对 parent 的旋转（世界空间旋转向量，方向为轴，长度为角度）
pub fn relative_rotation_vector(child: &Mat4, parent: &Mat4) -> Vec3 {
    let q_child = frame_rotation(child);
    let q_parent = frame_rotation(parent);
    let mut q_rel = q_child * q_parent.inverse();
    // 取短弧
    if q_rel.w < 0.0 {
        q_rel = -q_rel;
    }
    q_rel.to_scaled_axis()
}

/// 任取一个与 `v` 垂直的单位向量
pub fn any_perpendicular(v: Vec3) -> Vec3 {
    let helper = if v.x.abs() < 0.9 { Vec3::X } else { Vec3::Y };
    v.cross(helper).normalize_or(Vec3::Z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_frame_from_pin_is_orthonormal() {
        for pin in [Vec3::X, Vec3::Y, Vec3::new(1.0, 2.0, -3.0), Vec3::NEG_Z] {
            let frame = frame_from_pin(Vec3::new(1.0, 2.0, 3.0), pin).unwrap();
            assert!(is_orthonormal(&frame));
            assert!((front(&frame) - pin.normalize()).length() < 1e-5);
        }
        assert!(frame_from_pin(Vec3::ZERO, Vec3::ZERO).is_none());
    }

    #[test]
    fn test_direction_between_coincident_points() {
        let p = Vec3::new(3.0, 3.0, 3.0);
        let dir = direction_between(p, p, Vec3::Y);
        assert!((dir - Vec3::Y).length() < 1e-5);

        let dir = direction_between(Vec3::ZERO, Vec3::new(0.0, 0.0, 5.0), Vec3::Y);
        assert!((dir - Vec3::Z).length() < 1e-5);
    }

    #[test]
    fn test_angle_about_sign() {
        let angle = angle_about(Vec3::Y, Vec3::Z, Vec3::X);
        assert!((angle - FRAC_PI_2).abs() < 1e-5);
        let angle = angle_about(Vec3::Z, Vec3::Y, Vec3::X);
        assert!((angle + FRAC_PI_2).abs() < 1e-5);
    }

    #[test]
    fn test_relative_rotation_vector() {
        let parent = Mat4::IDENTITY;
        let child = Mat4::from_quat(Quat::from_rotation_z(0.3));
        let rot = relative_rotation_vector(&child, &parent);
        assert!((rot - Vec3::new(0.0, 0.0, 0.3)).length() < 1e-4);
    }

    #[test]
    fn test_non_orthonormal_rejected() {
        let mut frame = Mat4::IDENTITY;
        frame.y_axis = Vec3::new(1.0, 1.0, 0.0).extend(0.0);
        assert!(!is_orthonormal(&frame));
        assert!(is_orthonormal(&Mat4::IDENTITY));
    }
}
