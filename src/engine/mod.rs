//! 动力学引擎接口
//!
//! 关节层与外部刚体引擎的唯一接触面：
//! - 读取刚体变换/速度（BodySource）
//! - 创建/销毁引擎侧约束对象、唤醒刚体（PhysicsBackend）
//! - 每步提交约束行（ConstraintRows）
//!
//! | 引擎概念 | 本模块 |
//! |----------|--------|
//! | 刚体句柄 | BodyHandle |
//! | 每关节约束对象 | ConstraintId + ConstraintDesc |
//! | AddLinearRow / AddAngularRow / SetRow* | ConstraintRows |

mod rows;
pub mod sandbox;

pub use rows::{ConstraintRow, ConstraintRows, RowBuffer, RowKind};
pub use sandbox::{SandboxBody, SandboxWorld};

use glam::{Mat4, Vec3};

use crate::joint::SolverModel;
use crate::registry::JointHandle;

/// 引擎世界句柄（不透明）
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct WorldHandle(pub u64);

/// 引擎刚体句柄（不透明）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyHandle(pub u64);

/// 引擎约束对象句柄
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConstraintId(pub u64);

/// 刚体状态快照（引擎单位，世界空间）
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BodyState {
    pub transform: Mat4,
    pub velocity: Vec3,
    pub omega: Vec3,
    /// 质心（世界空间）
    pub com: Vec3,
}

impl BodyState {
    /// 静止的世界锚点
    pub const WORLD: Self = Self {
        transform: Mat4::IDENTITY,
        velocity: Vec3::ZERO,
        omega: Vec3::ZERO,
        com: Vec3::ZERO,
    };

    pub fn at_rest(transform: Mat4) -> Self {
        Self {
            transform,
            velocity: Vec3::ZERO,
            omega: Vec3::ZERO,
            com: transform.w_axis.truncate(),
        }
    }

    /// 刚体上某点（世界空间）的速度
    #[inline]
    pub fn point_velocity(&self, point: Vec3) -> Vec3 {
        self.velocity + self.omega.cross(point - self.com)
    }
}

/// 只读刚体访问
///
/// 提交阶段可能在多个工作线程上同时调用，因此要求 Sync。
pub trait BodySource: Sync {
    fn body_state(&self, body: BodyHandle) -> Option<BodyState>;
}

/// 连接时交给引擎的约束描述
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConstraintDesc {
    pub joint: JointHandle,
    pub child: BodyHandle,
    /// None 表示固定在世界上
    pub parent: Option<BodyHandle>,
    /// 最大约束行数
    pub max_dof: u32,
    pub breaking_force: f32,
    pub solver_model: SolverModel,
    pub collidable: bool,
}

/// 可写引擎接口
pub trait PhysicsBackend: BodySource {
    fn set_sleep_state(&mut self, body: BodyHandle, sleeping: bool);
    fn create_constraint(&mut self, desc: &ConstraintDesc) -> ConstraintId;
    fn destroy_constraint(&mut self, constraint: ConstraintId);
    fn set_constraint_collidable(&mut self, constraint: ConstraintId, collidable: bool);
    /// 断裂阈值（引擎单位），同时作用于反作用力和反作用力矩
    fn set_constraint_breaking_force(&mut self, constraint: ConstraintId, force: f32);
}
