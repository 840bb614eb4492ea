//! 关节系统
//!
//! 每个关节 = 公共状态 JointModel + 一个具体类型的状态（JointVariant）。
//! 类型集合是封闭的，每步通过 match 分发一次。
//!
//! | 类型 | 线性 | 角度 |
//! |------|------|------|
//! | Fixed | 锁定×3 | 锁定×3 |
//! | Hinge | 锁定×3 | 绕 pin 受限/驱动，锁定×2 |
//! | Motor / Servo | 锁定×3 | 绕 pin 驱动，锁定×2 |
//! | Slider / Piston | 锁定×2，沿 pin 驱动 | 锁定×3 |
//! | UpVector | 自由×3 | 两轴对齐，绕 pin 自由 |
//! | Spring | 同 Slider 或 Hinge，主行为弹簧 | |
//! | Corkscrew | 沿 pin + 绕 pin（可耦合为螺旋） | |
//! | BallAndSocket | 锁定×3 | 自由锥 + 可选锥角/扭转限位 |
//! | Universal | 锁定×3 | 两轴驱动，锁定×1 |
//! | CurvySlider / CurvyPiston | 沿曲线 | |
//! | Plane | 法向锁定 | 锁定×2，可选绕法向自由 |
//! | PointToPoint | 距离约束（1~3 行） | 自由 |

mod context;
mod dof;
pub mod kinds;
mod model;

pub use context::{GearDrive, SubmitContext};
pub use dof::{
    DofAxis, DofLimits, DofState, LimitRow, MotorDrive, LIMIT_EPSILON, MIN_LIMIT_RANGE,
    MIN_TIMESTEP,
};
pub use kinds::{
    BallAndSocketJoint, CorkscrewJoint, CorkscrewMode, CurvePiston, CurveSlider, CurveTrack,
    FixedJoint, HingeJoint, MotorJoint, PistonJoint, PlaneJoint, PointToPointJoint,
    PointToPointMode, ServoJoint, SliderJoint, SpringJoint, SpringMode, UniversalJoint,
    UpVectorJoint,
};
pub use model::{JointFlags, JointModel, SolverModel};

pub(crate) use dof::{submit_limited, submit_lock, submit_motor, submit_rate, submit_spring};

use glam::Mat4;

use crate::engine::ConstraintRows;

// ============================================================================
// 关节类型
// ============================================================================

/// 关节类型（封闭集合）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JointKind {
    BallAndSocket,
    Corkscrew,
    CurvyPiston,
    CurvySlider,
    Fixed,
    Hinge,
    Motor,
    Piston,
    Plane,
    PointToPoint,
    Servo,
    Slider,
    Spring,
    Universal,
    UpVector,
}

impl JointKind {
    pub const ALL: [JointKind; 15] = [
        JointKind::BallAndSocket,
        JointKind::Corkscrew,
        JointKind::CurvyPiston,
        JointKind::CurvySlider,
        JointKind::Fixed,
        JointKind::Hinge,
        JointKind::Motor,
        JointKind::Piston,
        JointKind::Plane,
        JointKind::PointToPoint,
        JointKind::Servo,
        JointKind::Slider,
        JointKind::Spring,
        JointKind::Universal,
        JointKind::UpVector,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            JointKind::BallAndSocket => "BallAndSocket",
            JointKind::Corkscrew => "Corkscrew",
            JointKind::CurvyPiston => "CurvyPiston",
            JointKind::CurvySlider => "CurvySlider",
            JointKind::Fixed => "Fixed",
            JointKind::Hinge => "Hinge",
            JointKind::Motor => "Motor",
            JointKind::Piston => "Piston",
            JointKind::Plane => "Plane",
            JointKind::PointToPoint => "PointToPoint",
            JointKind::Servo => "Servo",
            JointKind::Slider => "Slider",
            JointKind::Spring => "Spring",
            JointKind::Universal => "Universal",
            JointKind::UpVector => "UpVector",
        }
    }
}

impl std::fmt::Display for JointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// 类型行为
// ============================================================================

/// 具体关节类型的行为
pub trait JointBehavior {
    /// 最大约束行数
    fn max_dof(&self) -> u32;

    /// 提交本步约束行
    fn submit(&mut self, ctx: &SubmitContext, rows: &mut dyn ConstraintRows);

    /// 连接后调用
    fn on_connect(&mut self) {}

    /// 断开后调用，清空测量值和瞬态累积量
    fn on_disconnect(&mut self) {}

    /// 齿轮使用的主 DOF 测量值（不可齿轮的类型返回 None）
    fn gear_coordinate(&self) -> Option<DofState> {
        None
    }

    /// 连接时修正子侧枢轴（全局空间）
    fn adjust_child_pivot(&self, pivot: Mat4) -> Mat4 {
        pivot
    }
}

/// 关节类型数据与 JointVariant 之间的转换
pub trait JointKindData: JointBehavior + Into<JointVariant> {
    const KIND: JointKind;

    fn from_variant(variant: &JointVariant) -> Option<&Self>;
    fn from_variant_mut(variant: &mut JointVariant) -> Option<&mut Self>;
}

macro_rules! joint_variants {
    ($($kind:ident => $ty:ty),* $(,)?) => {
        /// 具体类型状态
        #[derive(Clone, Debug)]
        pub enum JointVariant {
            $($kind($ty),)*
        }

        impl JointVariant {
            pub fn kind(&self) -> JointKind {
                match self {
                    $(JointVariant::$kind(_) => JointKind::$kind,)*
                }
            }

            /// 最大约束行数
            pub fn max_dof(&self) -> u32 {
                self.behavior().max_dof()
            }

            fn behavior(&self) -> &dyn JointBehavior {
                match self {
                    $(JointVariant::$kind(data) => data,)*
                }
            }

            fn behavior_mut(&mut self) -> &mut dyn JointBehavior {
                match self {
                    $(JointVariant::$kind(data) => data,)*
                }
            }
        }

        $(
            impl From<$ty> for JointVariant {
                fn from(data: $ty) -> Self {
                    JointVariant::$kind(data)
                }
            }

            impl JointKindData for $ty {
                const KIND: JointKind = JointKind::$kind;

                fn from_variant(variant: &JointVariant) -> Option<&Self> {
                    match variant {
                        JointVariant::$kind(data) => Some(data),
                        #[allow(unreachable_patterns)]
                        _ => None,
                    }
                }

                fn from_variant_mut(variant: &mut JointVariant) -> Option<&mut Self> {
                    match variant {
                        JointVariant::$kind(data) => Some(data),
                        #[allow(unreachable_patterns)]
                        _ => None,
                    }
                }
            }
        )*
    };
}

joint_variants! {
    BallAndSocket => BallAndSocketJoint,
    Corkscrew => CorkscrewJoint,
    CurvyPiston => CurvePiston,
    CurvySlider => CurveSlider,
    Fixed => FixedJoint,
    Hinge => HingeJoint,
    Motor => MotorJoint,
    Piston => PistonJoint,
    Plane => PlaneJoint,
    PointToPoint => PointToPointJoint,
    Servo => ServoJoint,
    Slider => SliderJoint,
    Spring => SpringJoint,
    Universal => UniversalJoint,
    UpVector => UpVectorJoint,
}

// ============================================================================
// 关节
// ============================================================================

/// 关节：公共状态 + 类型状态
#[derive(Clone, Debug)]
pub struct Joint {
    model: JointModel,
    variant: JointVariant,
}

impl Joint {
    pub(crate) fn new(model: JointModel, variant: JointVariant) -> Self {
        Self { model, variant }
    }

    pub fn model(&self) -> &JointModel {
        &self.model
    }

    pub(crate) fn model_mut(&mut self) -> &mut JointModel {
        &mut self.model
    }

    pub fn kind(&self) -> JointKind {
        self.variant.kind()
    }

    pub fn variant(&self) -> &JointVariant {
        &self.variant
    }

    /// 按类型取只读状态
    pub fn get<T: JointKindData>(&self) -> Option<&T> {
        T::from_variant(&self.variant)
    }

    /// 按类型取可写状态（已连接时请求唤醒）
    pub(crate) fn get_mut<T: JointKindData>(&mut self) -> Option<&mut T> {
        let data = T::from_variant_mut(&mut self.variant)?;
        self.model.request_wake();
        Some(data)
    }

    pub fn gear_coordinate(&self) -> Option<DofState> {
        self.variant.behavior().gear_coordinate()
    }

    pub(crate) fn adjust_child_pivot(&self, pivot: Mat4) -> Mat4 {
        self.variant.behavior().adjust_child_pivot(pivot)
    }

    pub(crate) fn on_connect(&mut self) {
        self.variant.behavior_mut().on_connect();
    }

    pub(crate) fn on_disconnect(&mut self) {
        self.variant.behavior_mut().on_disconnect();
    }

    /// 提交本步约束行并缓存全局枢轴
    pub(crate) fn submit(&mut self, ctx: &SubmitContext, rows: &mut dyn ConstraintRows) {
        self.model.cache_frames(ctx.child_frame, ctx.parent_frame);
        self.variant.behavior_mut().submit(ctx, rows);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{BodyState, WorldHandle};
    use crate::math::UnitScale;

    #[test]
    fn test_kind_round_trip() {
        let hinge: JointVariant = HingeJoint::new().into();
        assert_eq!(hinge.kind(), JointKind::Hinge);
        assert!(HingeJoint::from_variant(&hinge).is_some());
        assert!(SliderJoint::from_variant(&hinge).is_none());
        assert_eq!(<SliderJoint as JointKindData>::KIND, JointKind::Slider);
    }

    #[test]
    fn test_all_kinds_listed_once() {
        let mut kinds = JointKind::ALL.to_vec();
        kinds.sort();
        kinds.dedup();
        assert_eq!(kinds.len(), 15);
    }

    #[test]
    fn test_joint_typed_access() {
        let model = JointModel::new(
            WorldHandle(0),
            JointKind::Fixed,
            6,
            None,
            &BodyState::WORLD,
            Mat4::IDENTITY,
            UnitScale::default(),
        );
        let mut joint = Joint::new(model, FixedJoint::new().into());
        assert_eq!(joint.kind(), JointKind::Fixed);
        assert!(joint.get::<FixedJoint>().is_some());
        assert!(joint.get_mut::<HingeJoint>().is_none());
        assert!(joint.gear_coordinate().is_none());
    }
}
