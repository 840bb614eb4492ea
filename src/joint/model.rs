//! 关节公共状态
//!
//! 所有关节类型共享的部分：连接的刚体、两侧枢轴、刚度、断裂力、
//! 求解器模式、标志位、反作用力回读以及用户数据。

use bitflags::bitflags;
use glam::{Mat4, Vec3};

use crate::engine::{BodyHandle, BodyState, ConstraintId, WorldHandle};
use crate::math::{self, UnitScale};
use crate::{JointError, Result};

use super::JointKind;

bitflags! {
    /// 关节标志位
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct JointFlags: u32 {
        /// 两个被连接刚体之间允许碰撞
        const COLLIDABLE = 1 << 0;
        /// 下一次提交前需要唤醒两侧刚体
        const WAKE_PENDING = 1 << 1;
        /// 已被引擎判定断裂
        const BROKEN = 1 << 2;
    }
}

/// 求解器模式
///
/// 对应引擎的约束求解精度档位。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SolverModel {
    /// 精确求解（默认）
    #[default]
    Exact,
    /// 迭代求解
    Iterative,
    /// 运动学求解（只修正位置）
    Kinematic,
}

/// 关节公共状态
#[derive(Clone, Debug)]
pub struct JointModel {
    world: WorldHandle,
    kind: JointKind,
    max_dof: u32,

    stiffness: f32,
    breaking_force: f32,
    solver_model: SolverModel,
    flags: JointFlags,

    parent: Option<BodyHandle>,
    child: Option<BodyHandle>,
    constraint: Option<ConstraintId>,

    /// 父侧枢轴（父刚体局部空间；无父刚体时为世界空间）
    local_parent: Mat4,
    /// 子侧枢轴（子刚体局部空间，连接时计算）
    local_child: Mat4,
    /// 上一次提交时的全局枢轴
    global_child: Mat4,
    global_parent: Mat4,

    /// 上一步的反作用力/力矩（引擎单位）
    reaction_force: Vec3,
    reaction_torque: Vec3,

    pub user_data: u64,
    group: Option<u32>,
    units: UnitScale,
}

impl JointModel {
    /// 创建公共状态
    ///
    /// `pivot` 为世界空间枢轴（引擎单位），`parent_state` 为创建时父刚体的状态。
    pub(crate) fn new(
        world: WorldHandle,
        kind: JointKind,
        max_dof: u32,
        parent: Option<BodyHandle>,
        parent_state: &BodyState,
        pivot: Mat4,
        units: UnitScale,
    ) -> Self {
        let local_parent = parent_state.transform.inverse() * pivot;
        Self {
            world,
            kind,
            max_dof,
            stiffness: 1.0,
            breaking_force: f32::INFINITY,
            solver_model: SolverModel::Exact,
            flags: JointFlags::empty(),
            parent,
            child: None,
            constraint: None,
            local_parent,
            local_child: local_parent,
            global_child: pivot,
            global_parent: pivot,
            reaction_force: Vec3::ZERO,
            reaction_torque: Vec3::ZERO,
            user_data: 0,
            group: None,
            units,
        }
    }

    // ========================================
    // 只读属性
    // ========================================

    pub fn world(&self) -> WorldHandle {
        self.world
    }

    pub fn kind(&self) -> JointKind {
        self.kind
    }

    /// 最大约束行数
    pub fn max_dof(&self) -> u32 {
        self.max_dof
    }

    pub fn parent(&self) -> Option<BodyHandle> {
        self.parent
    }

    pub fn child(&self) -> Option<BodyHandle> {
        self.child
    }

    pub fn constraint(&self) -> Option<ConstraintId> {
        self.constraint
    }

    pub fn is_connected(&self) -> bool {
        self.child.is_some()
    }

    pub fn flags(&self) -> JointFlags {
        self.flags
    }

    pub fn is_broken(&self) -> bool {
        self.flags.contains(JointFlags::BROKEN)
    }

    pub fn units(&self) -> UnitScale {
        self.units
    }

    // ========================================
    // 可调属性
    // ========================================

    pub fn stiffness(&self) -> f32 {
        self.stiffness
    }

    /// 设置刚度，取值 (0, 1]
    pub fn set_stiffness(&mut self, stiffness: f32) -> Result<()> {
        if !stiffness.is_finite() || stiffness <= 0.0 {
            return Err(JointError::InvalidArgument(format!(
                "stiffness must be in (0, 1], got {}",
                stiffness
            )));
        }
        self.stiffness = stiffness.min(1.0);
        self.request_wake();
        Ok(())
    }

    /// 断裂力（显示单位）
    pub fn breaking_force(&self) -> f32 {
        self.breaking_force / self.units.length()
    }

    /// 断裂力（引擎单位）
    pub fn engine_breaking_force(&self) -> f32 {
        self.breaking_force
    }

    /// 设置断裂力（显示单位），必须为正；无穷大表示永不断裂
    pub fn set_breaking_force(&mut self, force: f32) -> Result<()> {
        if force.is_nan() || force <= 0.0 {
            return Err(JointError::InvalidArgument(format!(
                "breaking force must be positive, got {}",
                force
            )));
        }
        self.breaking_force = force * self.units.length();
        Ok(())
    }

    pub fn solver_model(&self) -> SolverModel {
        self.solver_model
    }

    pub fn set_solver_model(&mut self, model: SolverModel) {
        self.solver_model = model;
        self.request_wake();
    }

    pub fn is_collidable(&self) -> bool {
        self.flags.contains(JointFlags::COLLIDABLE)
    }

    pub(crate) fn set_collidable_flag(&mut self, collidable: bool) {
        self.flags.set(JointFlags::COLLIDABLE, collidable);
    }

    pub fn group(&self) -> Option<u32> {
        self.group
    }

    pub fn set_group(&mut self, group: Option<u32>) {
        self.group = group;
    }

    // ========================================
    // 枢轴
    // ========================================

    /// 父侧枢轴（局部空间，引擎单位）
    pub fn local_parent_frame(&self) -> Mat4 {
        self.local_parent
    }

    /// 子侧枢轴（局部空间，引擎单位）
    pub fn local_child_frame(&self) -> Mat4 {
        self.local_child
    }

    /// 上一次提交时父侧全局枢轴（显示单位）
    pub fn parent_frame(&self) -> Mat4 {
        self.units.frame_to_display(self.global_parent)
    }

    /// 上一次提交时子侧全局枢轴（显示单位）
    pub fn child_frame(&self) -> Mat4 {
        self.units.frame_to_display(self.global_child)
    }

    /// 用当前父刚体状态求父侧全局枢轴
    pub(crate) fn parent_pivot(&self, parent: &BodyState) -> Mat4 {
        parent.transform * self.local_parent
    }

    /// 用当前子刚体状态求子侧全局枢轴
    pub(crate) fn child_pivot(&self, child: &BodyState) -> Mat4 {
        child.transform * self.local_child
    }

    /// 修改父侧枢轴的 pin（世界空间方向）
    pub(crate) fn set_parent_pin(&mut self, parent: &BodyState, pin: Vec3) -> Result<()> {
        let global = self.parent_pivot(parent);
        let frame = math::frame_from_pin(math::origin(&global), pin)
            .ok_or_else(|| JointError::InvalidArgument("pin direction is zero".to_string()))?;
        self.local_parent = parent.transform.inverse() * frame;
        self.request_wake();
        Ok(())
    }

    pub(crate) fn cache_frames(&mut self, child: Mat4, parent: Mat4) {
        self.global_child = child;
        self.global_parent = parent;
    }

    // ========================================
    // 连接状态
    // ========================================

    pub(crate) fn attach(&mut self, child: BodyHandle, local_child: Mat4, constraint: ConstraintId) {
        self.child = Some(child);
        self.local_child = local_child;
        self.constraint = Some(constraint);
        self.flags.remove(JointFlags::BROKEN);
        self.flags.insert(JointFlags::WAKE_PENDING);
    }

    pub(crate) fn detach(&mut self) -> Option<ConstraintId> {
        self.child = None;
        self.local_child = self.local_parent;
        self.reaction_force = Vec3::ZERO;
        self.reaction_torque = Vec3::ZERO;
        self.flags.remove(JointFlags::WAKE_PENDING);
        self.constraint.take()
    }

    pub(crate) fn mark_broken(&mut self) {
        self.flags.insert(JointFlags::BROKEN);
    }

    /// 参数改动后请求唤醒（仅已连接时有效）
    pub(crate) fn request_wake(&mut self) {
        if self.is_connected() {
            self.flags.insert(JointFlags::WAKE_PENDING);
        }
    }

    pub(crate) fn take_wake_request(&mut self) -> bool {
        let pending = self.flags.contains(JointFlags::WAKE_PENDING);
        self.flags.remove(JointFlags::WAKE_PENDING);
        pending
    }

    // ========================================
    // 反作用力
    // ========================================

    pub(crate) fn set_reaction(&mut self, force: Vec3, torque: Vec3) {
        self.reaction_force = force;
        self.reaction_torque = torque;
    }

    /// 上一步作用在子刚体上的约束力（显示单位）
    pub fn reaction_force(&self) -> Vec3 {
        self.units.force_to_display(self.reaction_force)
    }

    /// 上一步作用在子刚体上的约束力矩（显示单位）
    pub fn reaction_torque(&self) -> Vec3 {
        self.units.torque_to_display(self.reaction_torque)
    }
}
