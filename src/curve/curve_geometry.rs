//! 折线曲线 - 曲线滑块/曲线活塞的轨道
//!
//! 控制点保存在关节局部空间，每次修改后重算弧长（O(n)）。

use glam::Vec3;

/// 线段长度低于此值视为退化，跳过
const DEGENERATE_SEGMENT: f32 = 1.0e-8;

/// 最近点查询结果
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CurveHit {
    /// 曲线上的最近点
    pub point: Vec3,
    /// 该点处的单位切线
    pub tangent: Vec3,
    /// 该点处的弧长
    pub arc_length: f32,
    /// 所在线段的起点弧长
    pub segment_start: f32,
    /// 所在线段的终点弧长
    pub segment_end: f32,
    /// 所在线段索引（闭合线段为 point_count - 1）
    pub segment: usize,
}

/// 弧长查询结果
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CurveSample {
    pub point: Vec3,
    pub tangent: Vec3,
    /// 回绕/钳制后的弧长
    pub arc_length: f32,
}

/// 有序折线，可选首尾闭合
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CurveGeometry {
    points: Vec<Vec3>,
    looped: bool,
    length: f32,
}

impl CurveGeometry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_points(points: Vec<Vec3>, looped: bool) -> Self {
        let mut curve = Self { points, looped, length: 0.0 };
        curve.recompute_length();
        curve
    }

    // ========================================
    // 控制点增删改
    // ========================================

    pub fn add_point(&mut self, point: Vec3) -> usize {
        self.points.push(point);
        self.recompute_length();
        self.points.len() - 1
    }

    /// 在 index 处插入，index 越界时追加到末尾
    pub fn insert_point(&mut self, index: usize, point: Vec3) -> usize {
        let index = index.min(self.points.len());
        self.points.insert(index, point);
        self.recompute_length();
        index
    }

    pub fn remove_point(&mut self, index: usize) -> Option<Vec3> {
        if index >= self.points.len() {
            return None;
        }
        let removed = self.points.remove(index);
        self.recompute_length();
        Some(removed)
    }

    /// 修改控制点，越界返回 false
    pub fn set_point(&mut self, index: usize, point: Vec3) -> bool {
        match self.points.get_mut(index) {
            Some(p) => {
                *p = point;
                self.recompute_length();
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.points.clear();
        self.length = 0.0;
    }

    pub fn point(&self, index: usize) -> Option<Vec3> {
        self.points.get(index).copied()
    }

    pub fn points(&self) -> &[Vec3] {
        &self.points
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    // ========================================
    // 闭合与弧长
    // ========================================

    pub fn is_looped(&self) -> bool {
        self.looped
    }

    pub fn set_looped(&mut self, looped: bool) {
        self.looped = looped;
        self.recompute_length();
    }

    /// 总弧长（闭合时包含闭合线段）
    pub fn length(&self) -> f32 {
        self.length
    }

    /// 至少两个点才能构成曲线
    pub fn is_valid(&self) -> bool {
        self.points.len() >= 2 && self.length > DEGENERATE_SEGMENT
    }

    fn recompute_length(&mut self) {
        self.length = self.segments().map(|(_, a, b)| a.distance(b)).sum();
    }

    /// 遍历线段 (索引, 起点, 终点)，闭合时追加末点→首点
    fn segments(&self) -> impl Iterator<Item = (usize, Vec3, Vec3)> + '_ {
        let open = self.points.windows(2).enumerate().map(|(i, w)| (i, w[0], w[1]));
        let closing = match (self.looped && self.points.len() >= 2, self.points.first(), self.points.last()) {
            (true, Some(&first), Some(&last)) => Some((self.points.len() - 1, last, first)),
            _ => None,
        };
        open.chain(closing)
    }

    /// 把弧长映射到合法范围：闭合时取模，否则钳制到 [0, length]
    pub fn wrap_arc_length(&self, arc_length: f32) -> f32 {
        if self.length <= 0.0 {
            return 0.0;
        }
        if self.looped {
            arc_length.rem_euclid(self.length)
        } else {
            arc_length.clamp(0.0, self.length)
        }
    }

    /// 闭合曲线上两个弧长位置之间的最短有符号差
    pub fn arc_delta(&self, from: f32, to: f32) -> f32 {
        let delta = to - from;
        if !self.looped || self.length <= 0.0 {
            return delta;
        }
        let half = self.length * 0.5;
        (delta + half).rem_euclid(self.length) - half
    }

    // ========================================
    // 查询
    // ========================================

    /// 最近点查询
    ///
    /// 逐线段投影到无限直线后钳制到线段范围，保留全局最小（平局取先找到的）。
    /// 投影被钳制到线段外（端点）时，按累积弧长重新定位所在线段，
    /// 以正确处理闭合曲线在闭合顶点处的回绕。
    pub fn nearest_point(&self, query: Vec3) -> Option<CurveHit> {
        if !self.is_valid() {
            return None;
        }

        let mut best: Option<(f32, CurveHit, bool)> = None;
        let mut segment_start = 0.0_f32;

        for (index, a, b) in self.segments() {
            let d = b - a;
            let seg_len = d.length();
            if seg_len < DEGENERATE_SEGMENT {
                continue;
            }

            let t = (query - a).dot(d) / (seg_len * seg_len);
            let left_over = !(0.0..=1.0).contains(&t);
            let t = t.clamp(0.0, 1.0);
            let point = a + d * t;
            let dist_sq = query.distance_squared(point);

            if best.as_ref().map_or(true, |(best_dist, _, _)| dist_sq < *best_dist) {
                best = Some((
                    dist_sq,
                    CurveHit {
                        point,
                        tangent: d / seg_len,
                        arc_length: segment_start + t * seg_len,
                        segment_start,
                        segment_end: segment_start + seg_len,
                        segment: index,
                    },
                    left_over,
                ));
            }
            segment_start += seg_len;
        }

        let (_, hit, left_over) = best?;
        if !left_over {
            return Some(hit);
        }

        // 落在顶点上：按弧长重新定位线段
        let arc_length = self.wrap_arc_length(hit.arc_length);
        let sample = self.locate(arc_length)?;
        Some(CurveHit {
            point: hit.point,
            tangent: sample.tangent,
            arc_length,
            segment_start: sample.segment_start,
            segment_end: sample.segment_end,
            segment: sample.segment,
        })
    }

    /// 按弧长取点和切线
    pub fn position_at(&self, arc_length: f32) -> Option<CurveSample> {
        if !self.is_valid() {
            return None;
        }
        let arc_length = self.wrap_arc_length(arc_length);
        let hit = self.locate(arc_length)?;
        Some(CurveSample {
            point: hit.point,
            tangent: hit.tangent,
            arc_length,
        })
    }

    /// 沿折线累积弧长定位（arc_length 已在合法范围内）
    fn locate(&self, arc_length: f32) -> Option<CurveHit> {
        let mut segment_start = 0.0_f32;
        let mut last: Option<CurveHit> = None;

        for (index, a, b) in self.segments() {
            let d = b - a;
            let seg_len = d.length();
            if seg_len < DEGENERATE_SEGMENT {
                continue;
            }
            let segment_end = segment_start + seg_len;
            let t = ((arc_length - segment_start) / seg_len).clamp(0.0, 1.0);
            let hit = CurveHit {
                point: a + d * t,
                tangent: d / seg_len,
                arc_length,
                segment_start,
                segment_end,
                segment: index,
            };
            if arc_length < segment_end {
                return Some(hit);
            }
            last = Some(hit);
            segment_start = segment_end;
        }

        // arc_length == length：开放曲线落在末端，闭合曲线回到起点
        if self.looped {
            let mut first = self.locate_first()?;
            first.arc_length = 0.0;
            return Some(first);
        }
        last
    }

    fn locate_first(&self) -> Option<CurveHit> {
        let mut segment_start = 0.0_f32;
        for (index, a, b) in self.segments() {
            let seg_len = a.distance(b);
            if seg_len < DEGENERATE_SEGMENT {
                continue;
            }
            return Some(CurveHit {
                point: a,
                tangent: (b - a) / seg_len,
                arc_length: segment_start,
                segment_start,
                segment_end: segment_start + seg_len,
                segment: index,
            });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn l_curve(looped: bool) -> CurveGeometry {
        CurveGeometry::from_points(
            vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(10.0, 0.0, 0.0),
                Vec3::new(10.0, 10.0, 0.0),
            ],
            looped,
        )
    }

    fn assert_vec(a: Vec3, b: Vec3) {
        assert!((a - b).length() < 1e-4, "{:?} != {:?}", a, b);
    }

    #[test]
    fn test_nearest_point_open_polyline() {
        let curve = l_curve(false);
        assert!((curve.length() - 20.0).abs() < 1e-5);

        let hit = curve.nearest_point(Vec3::new(5.0, -1.0, 0.0)).unwrap();
        assert_vec(hit.point, Vec3::new(5.0, 0.0, 0.0));
        assert_vec(hit.tangent, Vec3::X);
        assert!((hit.arc_length - 5.0).abs() < 1e-4);

        let hit = curve.nearest_point(Vec3::new(11.0, 5.0, 0.0)).unwrap();
        assert_vec(hit.point, Vec3::new(10.0, 5.0, 0.0));
        assert_vec(hit.tangent, Vec3::Y);
        assert!((hit.arc_length - 15.0).abs() < 1e-4);
        assert!((hit.segment_start - 10.0).abs() < 1e-4);
        assert!((hit.segment_end - 20.0).abs() < 1e-4);

        let hit = curve.nearest_point(Vec3::new(-5.0, 0.0, 0.0)).unwrap();
        assert_vec(hit.point, Vec3::ZERO);
        assert!(hit.arc_length.abs() < 1e-5);
    }

    #[test]
    fn test_looped_length_and_wrap() {
        let curve = l_curve(true);
        let expected = 20.0 + 200.0_f32.sqrt();
        assert!((curve.length() - expected).abs() < 1e-4);

        let a = curve.position_at(curve.length() + 1.0).unwrap();
        let b = curve.position_at(1.0).unwrap();
        assert_vec(a.point, b.point);
        assert_vec(a.tangent, b.tangent);
    }

    #[test]
    fn test_looped_nearest_at_closing_vertex() {
        let curve = l_curve(true);
        // 离闭合顶点 (0,0,0) 最近，且在所有线段外侧
        let hit = curve.nearest_point(Vec3::new(-1.0, -2.0, 0.0)).unwrap();
        assert_vec(hit.point, Vec3::ZERO);
        // 回绕后落在第 0 段起点
        assert!(hit.arc_length.abs() < 1e-4);
        assert_eq!(hit.segment, 0);
        assert_vec(hit.tangent, Vec3::X);
    }

    #[test]
    fn test_looped_closing_segment_projection() {
        let curve = l_curve(true);
        let hit = curve.nearest_point(Vec3::new(4.0, 6.0, 0.0)).unwrap();
        assert_vec(hit.point, Vec3::new(5.0, 5.0, 0.0));
        assert_eq!(hit.segment, 2);
        let diag = 200.0_f32.sqrt();
        assert!((hit.arc_length - (20.0 + diag * 0.5)).abs() < 1e-3);
    }

    #[test]
    fn test_open_position_clamped() {
        let curve = l_curve(false);
        let end = curve.position_at(100.0).unwrap();
        assert_vec(end.point, Vec3::new(10.0, 10.0, 0.0));
        assert!((end.arc_length - 20.0).abs() < 1e-5);
        let start = curve.position_at(-3.0).unwrap();
        assert_vec(start.point, Vec3::ZERO);
    }

    #[test]
    fn test_length_tracks_mutation() {
        let mut curve = CurveGeometry::new();
        assert!(curve.nearest_point(Vec3::ZERO).is_none());
        curve.add_point(Vec3::ZERO);
        assert!(curve.position_at(0.0).is_none());
        curve.add_point(Vec3::new(3.0, 4.0, 0.0));
        assert!((curve.length() - 5.0).abs() < 1e-5);
        assert!(curve.set_point(1, Vec3::new(0.0, 2.0, 0.0)));
        assert!((curve.length() - 2.0).abs() < 1e-5);
        curve.insert_point(1, Vec3::new(0.0, 1.0, 0.0));
        assert!((curve.length() - 2.0).abs() < 1e-5);
        assert_eq!(curve.remove_point(0), Some(Vec3::ZERO));
        assert!((curve.length() - 1.0).abs() < 1e-5);
        curve.set_looped(true);
        assert!((curve.length() - 2.0).abs() < 1e-5);
        curve.clear();
        assert_eq!(curve.length(), 0.0);
    }

    #[test]
    fn test_degenerate_segments_skipped() {
        let curve = CurveGeometry::from_points(
            vec![Vec3::ZERO, Vec3::ZERO, Vec3::new(0.0, 0.0, 4.0)],
            false,
        );
        let hit = curve.nearest_point(Vec3::new(1.0, 0.0, 2.0)).unwrap();
        assert_vec(hit.point, Vec3::new(0.0, 0.0, 2.0));
        assert_vec(hit.tangent, Vec3::Z);
    }

    #[test]
    fn test_arc_delta_wraps_on_loop() {
        let curve = l_curve(true);
        let len = curve.length();
        let delta = curve.arc_delta(len - 0.5, 0.5);
        assert!((delta - 1.0).abs() < 1e-4);
        let open = l_curve(false);
        assert!((open.arc_delta(19.5, 0.5) + 19.0).abs() < 1e-4);
    }
}
