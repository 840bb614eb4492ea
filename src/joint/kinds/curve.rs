//! 曲线滑块与曲线活塞
//!
//! 子侧枢轴沿父侧枢轴局部空间中的折线运动：
//! - 切线方向：主 DOF（弧长位置），开放曲线两端自动止挡
//! - 垂直切线的两个方向：锁定
//! - 姿态：align 时对齐到平行移动的切线坐标系，否则锁定相对父侧的旋转
//!
//! 控制点、位置、速度均为显示单位。

use glam::{Mat4, Vec3};

use crate::curve::{CurveGeometry, TangentFrame};
use crate::engine::ConstraintRows;
use crate::joint::{
    submit_limited, submit_rate, submit_spring, DofAxis, DofLimits, DofState, JointBehavior,
    LimitRow, SubmitContext,
};
use crate::math::{self, UnitScale};

use super::{display_state, non_negative};

/// 判定投影落在开放曲线端点上的弧长容差（引擎单位）
const END_TOLERANCE: f32 = 1.0e-5;

/// 本步在曲线上的投影
#[derive(Clone, Copy, Debug)]
struct TrackPoint {
    /// 曲线上的投影点（世界空间）
    point: Vec3,
    frame: TangentFrame,
    axis: DofAxis,
    /// 弧长位置（开放曲线两端可越界）
    position: f32,
    rate: f32,
}

// ============================================================================
// 轨道
// ============================================================================

/// 曲线轨道状态，两种曲线关节共用
#[derive(Clone, Debug)]
pub struct CurveTrack {
    /// 引擎单位，父侧枢轴局部空间
    curve: CurveGeometry,
    position: DofState,
    /// 上一步的切线坐标系（世界空间），用于平行移动
    frame: Option<TangentFrame>,
    align: bool,
    rotation_enabled: bool,
    units: UnitScale,
}

impl CurveTrack {
    fn new(units: UnitScale) -> Self {
        Self {
            curve: CurveGeometry::new(),
            position: DofState::default(),
            frame: None,
            align: false,
            rotation_enabled: false,
            units,
        }
    }

    // ========================================
    // 控制点
    // ========================================

    pub fn add_point(&mut self, point: Vec3) -> usize {
        self.curve.add_point(self.units.vec_to_engine(point))
    }

    pub fn insert_point(&mut self, index: usize, point: Vec3) -> usize {
        self.curve.insert_point(index, self.units.vec_to_engine(point))
    }

    pub fn remove_point(&mut self, index: usize) -> Option<Vec3> {
        self.curve
            .remove_point(index)
            .map(|p| self.units.vec_to_display(p))
    }

    pub fn set_point(&mut self, index: usize, point: Vec3) -> bool {
        self.curve.set_point(index, self.units.vec_to_engine(point))
    }

    pub fn clear_points(&mut self) {
        self.curve.clear();
    }

    pub fn point(&self, index: usize) -> Option<Vec3> {
        self.curve.point(index).map(|p| self.units.vec_to_display(p))
    }

    pub fn points(&self) -> Vec<Vec3> {
        self.curve
            .points()
            .iter()
            .map(|p| self.units.vec_to_display(*p))
            .collect()
    }

    pub fn point_count(&self) -> usize {
        self.curve.point_count()
    }

    /// 曲线几何（引擎单位）
    pub fn geometry(&self) -> &CurveGeometry {
        &self.curve
    }

    // ========================================
    // 闭合
    // ========================================

    pub fn is_looped(&self) -> bool {
        self.curve.is_looped()
    }

    /// 切换闭合；取消闭合时把当前位置钳回 [0, length]
    ///
    /// 只经由关节的 set_looped 调用，活塞还需同时钳制目标位置。
    pub(crate) fn set_looped(&mut self, looped: bool) {
        self.curve.set_looped(looped);
        if !looped {
            self.position.position = self.curve.wrap_arc_length(self.position.position);
        }
    }

    /// 曲线总长（显示单位）
    pub fn length(&self) -> f32 {
        self.units.to_display(self.curve.length())
    }

    // ========================================
    // 姿态
    // ========================================

    pub fn is_aligned(&self) -> bool {
        self.align
    }

    /// 子侧姿态是否对齐到切线坐标系
    pub fn set_align(&mut self, align: bool) {
        self.align = align;
    }

    pub fn is_rotation_enabled(&self) -> bool {
        self.rotation_enabled
    }

    /// 是否允许绕切线转动
    pub fn enable_rotation(&mut self, enabled: bool) {
        self.rotation_enabled = enabled;
    }

    // ========================================
    // 测量
    // ========================================

    /// 弧长位置/速度/加速度（显示单位）
    pub fn measurement(&self) -> DofState {
        display_state(self.position, self.units.length())
    }

    pub fn position(&self) -> f32 {
        self.measurement().position
    }

    pub fn velocity(&self) -> f32 {
        self.measurement().velocity
    }

    /// 开放曲线的两端止挡（引擎单位）
    fn end_limits(&self) -> DofLimits {
        if self.curve.is_looped() {
            DofLimits::default()
        } else {
            DofLimits::new(0.0, self.curve.length())
        }
    }

    /// 投影子侧枢轴到曲线并更新测量；曲线退化时返回 None
    fn track(&mut self, ctx: &SubmitContext) -> Option<TrackPoint> {
        let parent = ctx.parent_frame;
        let child = ctx.child_origin();
        let hit = self
            .curve
            .nearest_point(parent.inverse().transform_point3(child))?;

        let point = parent.transform_point3(hit.point);
        let tangent = parent
            .transform_vector3(hit.tangent)
            .normalize_or(math::front(&parent));
        let frame = match self.frame {
            Some(previous) => previous.transport(tangent),
            None => TangentFrame::new(tangent, math::up(&parent)),
        };
        self.frame = Some(frame);

        // 开放曲线两端之外的越界量沿切线计入位置，内部拐角处不计
        let at_open_end = !self.curve.is_looped()
            && (hit.arc_length <= END_TOLERANCE
                || hit.arc_length >= self.curve.length() - END_TOLERANCE);
        let position = if at_open_end {
            hit.arc_length + (child - point).dot(tangent)
        } else {
            hit.arc_length
        };
        let delta = self.curve.arc_delta(self.position.position, position);
        self.position.update_with_delta(position, delta, ctx.dt);

        Some(TrackPoint {
            point,
            frame,
            axis: DofAxis::Linear {
                point0: child,
                point1: point,
                dir: tangent,
            },
            position,
            rate: ctx.linear_rate(child, tangent),
        })
    }

    /// 垂直切线的两个平移锁定
    fn submit_lateral(&self, ctx: &SubmitContext, rows: &mut dyn ConstraintRows, track: &TrackPoint) {
        for dir in [track.frame.up, track.frame.right] {
            rows.add_linear_row(ctx.child_origin(), track.point, dir);
            rows.set_row_stiffness(ctx.stiffness);
        }
    }

    /// 姿态行
    fn submit_orientation(
        &self,
        ctx: &SubmitContext,
        rows: &mut dyn ConstraintRows,
        track: &TrackPoint,
    ) {
        let target: Mat4 = track.frame.to_matrix(track.point);
        match (self.align, self.rotation_enabled) {
            (true, false) => ctx.lock_rotation_to(rows, &target),
            (true, true) => {
                // 子侧 pin 与切线共线，绕切线自由
                let pin0 = math::front(&ctx.child_frame);
                for dir in [track.frame.up, track.frame.right] {
                    rows.add_angular_row(math::angle_about(track.frame.front, pin0, dir), dir);
                    rows.set_row_stiffness(ctx.stiffness);
                }
            }
            (false, false) => ctx.lock_rotation(rows),
            (false, true) => {}
        }
    }

    fn reset(&mut self) {
        self.position.reset();
        self.frame = None;
    }
}

// ============================================================================
// CurveSlider
// ============================================================================

/// 曲线滑块：沿曲线自由滑动，带摩擦
#[derive(Clone, Debug)]
pub struct CurveSlider {
    track: CurveTrack,
    friction: f32,
    controller: f32,
}

impl CurveSlider {
    pub fn new(units: UnitScale) -> Self {
        Self {
            track: CurveTrack::new(units),
            friction: 0.0,
            controller: 1.0,
        }
    }

    pub fn track(&self) -> &CurveTrack {
        &self.track
    }

    pub fn track_mut(&mut self) -> &mut CurveTrack {
        &mut self.track
    }

    /// 切换闭合；取消闭合时当前位置钳回曲线范围
    pub fn set_looped(&mut self, looped: bool) {
        self.track.set_looped(looped);
    }

    pub fn friction(&self) -> f32 {
        self.friction
    }

    pub fn set_friction(&mut self, friction: f32) {
        self.friction = non_negative(friction);
    }

    pub fn controller(&self) -> f32 {
        self.controller
    }

    pub fn set_controller(&mut self, controller: f32) {
        self.controller = non_negative(controller);
    }
}

impl JointBehavior for CurveSlider {
    fn max_dof(&self) -> u32 {
        6
    }

    fn submit(&mut self, ctx: &SubmitContext, rows: &mut dyn ConstraintRows) {
        let Some(track) = self.track.track(ctx) else {
            return;
        };
        self.track.submit_lateral(ctx, rows, &track);

        let limits = self.track.end_limits();
        let selected = limits.select_ahead(track.position, track.rate, ctx.dt);
        match ctx.gear {
            Some(gear) if selected == LimitRow::Free => {
                submit_rate(
                    rows,
                    &track.axis,
                    track.position,
                    track.rate,
                    gear.target_rate,
                    ctx.stiffness,
                    ctx.dt,
                );
            }
            _ => {
                let friction = self.track.units.to_engine(self.friction * self.controller);
                submit_limited(
                    rows,
                    &track.axis,
                    track.position,
                    track.rate,
                    &limits,
                    friction,
                    ctx.stiffness,
                    ctx.dt,
                );
            }
        }

        self.track.submit_orientation(ctx, rows, &track);
    }

    fn on_disconnect(&mut self) {
        self.track.reset();
    }

    fn gear_coordinate(&self) -> Option<DofState> {
        Some(self.track.position)
    }
}

// ============================================================================
// CurvePiston
// ============================================================================

/// 曲线活塞：弹簧阻尼拉向目标弧长位置
#[derive(Clone, Debug)]
pub struct CurvePiston {
    track: CurveTrack,
    target_position: f32,
    power: f32,
    damping: f32,
    controller: f32,
    max_force: f32,
}

impl CurvePiston {
    pub fn new(units: UnitScale) -> Self {
        Self {
            track: CurveTrack::new(units),
            target_position: 0.0,
            power: 0.0,
            damping: 0.0,
            controller: 1.0,
            max_force: f32::INFINITY,
        }
    }

    pub fn track(&self) -> &CurveTrack {
        &self.track
    }

    pub fn track_mut(&mut self) -> &mut CurveTrack {
        &mut self.track
    }

    /// 切换闭合；取消闭合时目标位置同样钳回曲线范围
    pub fn set_looped(&mut self, looped: bool) {
        self.track.set_looped(looped);
        if !looped {
            let units = self.track.units;
            let target = self.track.curve.wrap_arc_length(units.to_engine(self.target_position));
            self.target_position = units.to_display(target);
        }
    }

    pub fn target_position(&self) -> f32 {
        self.target_position
    }

    pub fn set_target_position(&mut self, position: f32) {
        self.target_position = position;
    }

    pub fn power(&self) -> f32 {
        self.power
    }

    pub fn set_power(&mut self, power: f32) {
        self.power = non_negative(power);
    }

    pub fn damping(&self) -> f32 {
        self.damping
    }

    pub fn set_damping(&mut self, damping: f32) {
        self.damping = non_negative(damping);
    }

    pub fn controller(&self) -> f32 {
        self.controller
    }

    pub fn set_controller(&mut self, controller: f32) {
        self.controller = non_negative(controller);
    }

    pub fn set_max_force(&mut self, force: f32) {
        self.max_force = if force > 0.0 { force } else { f32::INFINITY };
    }
}

impl JointBehavior for CurvePiston {
    fn max_dof(&self) -> u32 {
        6
    }

    fn submit(&mut self, ctx: &SubmitContext, rows: &mut dyn ConstraintRows) {
        let Some(track) = self.track.track(ctx) else {
            return;
        };
        self.track.submit_lateral(ctx, rows, &track);

        let units = self.track.units;
        let limits = self.track.end_limits();
        match (limits.select_ahead(track.position, track.rate, ctx.dt), ctx.gear) {
            (LimitRow::Free, Some(gear)) => {
                submit_rate(
                    rows,
                    &track.axis,
                    track.position,
                    track.rate,
                    gear.target_rate,
                    ctx.stiffness,
                    ctx.dt,
                );
            }
            (LimitRow::Free, None) => {
                // 闭合曲线上取最短方向
                let target = units.to_engine(self.target_position);
                let rest = track.position + self.track.curve.arc_delta(track.position, target);
                submit_spring(
                    rows,
                    &track.axis,
                    track.position,
                    track.rate,
                    rest,
                    self.power * self.controller,
                    self.damping,
                    units.to_engine(self.max_force),
                    ctx.stiffness,
                    ctx.dt,
                );
            }
            _ => {
                submit_limited(
                    rows,
                    &track.axis,
                    track.position,
                    track.rate,
                    &limits,
                    0.0,
                    ctx.stiffness,
                    ctx.dt,
                );
            }
        }

        self.track.submit_orientation(ctx, rows, &track);
    }

    fn on_disconnect(&mut self) {
        self.track.reset();
    }

    fn gear_coordinate(&self) -> Option<DofState> {
        Some(self.track.position)
    }
}
