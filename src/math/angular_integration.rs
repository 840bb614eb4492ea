//! 连续角度积分
//!
//! 把每步的 (cos, sin) 增量累积成一个不回绕的角度，
//! 使转动关节可以对角度做有限差分求速度/加速度，电机可以无限转圈。

/// 连续角度累加器
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AngularIntegration {
    /// 累积角度（弧度，无界）
    angle: f32,
    /// 上一次的 cos 分量
    cos_angle: f32,
    /// 上一次的 sin 分量
    sin_angle: f32,
}

impl Default for AngularIntegration {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl AngularIntegration {
    pub fn new(angle: f32) -> Self {
        Self {
            angle,
            cos_angle: angle.cos(),
            sin_angle: angle.sin(),
        }
    }

    /// 当前累积角度
    #[inline]
    pub fn angle(&self) -> f32 {
        self.angle
    }

    /// 设置累积角度，同时重置缓存的 (cos, sin)
    pub fn set_angle(&mut self, angle: f32) {
        *self = Self::new(angle);
    }

    /// 用新的朝向更新角度，返回连续角度
    ///
    /// 步长取两个朝向之间的最短有符号角，单次变化绝不超过 π。
    pub fn update(&mut self, cos_angle: f32, sin_angle: f32) -> f32 {
        let sin_da = sin_angle * self.cos_angle - cos_angle * self.sin_angle;
        let cos_da = cos_angle * self.cos_angle + sin_angle * self.sin_angle;

        self.angle += sin_da.atan2(cos_da);
        self.cos_angle = cos_angle;
        self.sin_angle = sin_angle;
        self.angle
    }

    /// 用一个回绕角（如 atan2 的结果）更新
    #[inline]
    pub fn update_angle(&mut self, wrapped_angle: f32) -> f32 {
        self.update(wrapped_angle.cos(), wrapped_angle.sin())
    }
}
