//! 刚体关节层
//!
//! 在逐行约束的刚体动力学引擎之上提供关节：
//! - 十五种关节类型（铰链、滑块、活塞、电机、球窝、曲线滑块……）
//! - 齿轮耦合
//! - 按世界管理的关节注册表（连接、断开、销毁、每步提交约束行）
//!
//! 引擎侧只需实现 `engine::PhysicsBackend`；`engine::SandboxWorld` 是一个最小参考实现。

pub mod config;
pub mod curve;
pub mod engine;
pub mod gear;
pub mod joint;
pub mod math;
pub mod registry;

pub use config::{get_config, reset_config, set_config, JointConfig};
pub use curve::{CurveGeometry, CurveHit, TangentFrame};
pub use engine::{
    BodyHandle, BodySource, BodyState, ConstraintDesc, ConstraintId, ConstraintRows,
    PhysicsBackend, RowBuffer, SandboxBody, SandboxWorld, WorldHandle,
};
pub use gear::{can_gear, GearCoupling};
pub use joint::{Joint, JointKind, JointModel, SolverModel};
pub use math::{AngularIntegration, UnitScale};
pub use registry::{GearHandle, JointHandle, JointRegistry, Submission};

use thiserror::Error;

/// 关节层错误
#[derive(Debug, Error, Clone, PartialEq)]
pub enum JointError {
    /// 句柄已失效或来自其他世界
    #[error("invalid joint handle")]
    InvalidJoint,

    #[error("invalid gear handle")]
    InvalidGear,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// 按类型访问时类型不符
    #[error("joint kind mismatch: expected {expected}, found {found}")]
    KindMismatch { expected: JointKind, found: JointKind },

    #[error("joint is already connected")]
    AlreadyConnected,

    #[error("joint is not connected")]
    NotConnected,
}

pub type Result<T> = std::result::Result<T, JointError>;
