//! 曲线系统
//!
//! - CurveGeometry: 关节局部空间中的折线（可闭合），最近点与弧长查询
//! - TangentFrame: 沿曲线平行移动的切线坐标系

mod curve_geometry;
mod tangent_frame;

pub use curve_geometry::{CurveGeometry, CurveHit, CurveSample};
pub use tangent_frame::TangentFrame;
