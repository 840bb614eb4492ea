//! 关节注册表
//!
//! 一个世界一张表。关节和齿轮放在带代数的 arena 里，句柄失效后
//! 访问直接报 InvalidJoint / InvalidGear，不会读到被复用的槽位。
//!
//! 生命周期：
//! - create_*: 只有父刚体和枢轴，未连接
//! - connect: 指定子刚体，创建引擎约束，触发 on_connect
//! - disconnect / report_broken: 清空子刚体，触发 on_disconnect
//! - destroy_joint / destroy_all: 断开并移除，同时移除相关齿轮
//!
//! 每步：flush_wake_requests → submit → 引擎求解 → apply_feedback

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use glam::{Mat4, Vec3};
use rapier3d::data::arena::{Arena, Index};
use rayon::prelude::*;

use crate::config::{self, JointConfig};
use crate::engine::{
    BodyHandle, BodySource, BodyState, ConstraintDesc, ConstraintId, ConstraintRows, PhysicsBackend,
    RowBuffer, WorldHandle,
};
use crate::gear::{self, GearCoupling};
use crate::joint::{
    BallAndSocketJoint, CorkscrewJoint, CurvePiston, CurveSlider, FixedJoint, GearDrive,
    HingeJoint, Joint, JointKind, JointKindData, JointModel, JointVariant,
    MotorJoint, PistonJoint, PlaneJoint, PointToPointJoint, ServoJoint, SliderJoint, SpringJoint,
    SpringMode, SubmitContext, UniversalJoint, UpVectorJoint, MIN_TIMESTEP,
};
use crate::math::{self, UnitScale};
use crate::{JointError, Result};

/// 注册表编号，用于识别来自其他世界的句柄
static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

/// 关节句柄
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct JointHandle {
    registry: u64,
    index: Index,
}

impl JointHandle {
    /// (槽位, 代数)
    pub fn into_raw_parts(self) -> (u32, u32) {
        self.index.into_raw_parts()
    }
}

/// 齿轮句柄
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GearHandle {
    registry: u64,
    index: Index,
}

impl GearHandle {
    pub fn into_raw_parts(self) -> (u32, u32) {
        self.index.into_raw_parts()
    }
}

/// 一个关节本步提交的约束行
#[derive(Clone, Debug)]
pub struct Submission {
    pub joint: JointHandle,
    pub constraint: Option<ConstraintId>,
    pub child: BodyHandle,
    pub parent: Option<BodyHandle>,
    pub rows: RowBuffer,
}

/// 关节注册表
pub struct JointRegistry {
    id: u64,
    world: WorldHandle,
    config: JointConfig,
    units: UnitScale,
    joints: Arena<Joint>,
    gears: Arena<GearCoupling>,
}

impl JointRegistry {
    /// 用当前全局配置创建
    pub fn new(world: WorldHandle) -> Self {
        Self::with_config(world, config::get_config())
    }

    pub fn with_config(world: WorldHandle, config: JointConfig) -> Self {
        let id = NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed);
        let units = UnitScale::new(config.length_scale);
        if config.debug_log {
            log::info!(
                "[Joint] 注册表创建: world={:?}, 长度比例={}, 并行阈值={}",
                world,
                units.length(),
                config.parallel_threshold
            );
        }
        Self {
            id,
            world,
            config,
            units,
            joints: Arena::new(),
            gears: Arena::new(),
        }
    }

    pub fn world(&self) -> WorldHandle {
        self.world
    }

    pub fn config(&self) -> &JointConfig {
        &self.config
    }

    pub fn units(&self) -> UnitScale {
        self.units
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn gear_count(&self) -> usize {
        self.gears.len()
    }

    fn trace(&self, message: std::fmt::Arguments) {
        if self.config.debug_log {
            log::info!("[Joint] {}", message);
        } else {
            log::debug!("[Joint] {}", message);
        }
    }

    // ========================================
    // 创建
    // ========================================

    /// 由原点和 pin 方向构造枢轴坐标系
    pub fn pivot_from_pin(origin: Vec3, pin: Vec3) -> Result<Mat4> {
        math::frame_from_pin(origin, pin)
            .ok_or_else(|| JointError::InvalidArgument("pin direction is zero".to_string()))
    }

    /// 通用创建入口
    ///
    /// `pivot` 为世界空间枢轴（显示单位），必须单位正交。
    /// 失败时不注册任何东西。
    pub fn create_joint<B, T>(
        &mut self,
        bodies: &B,
        parent: Option<BodyHandle>,
        pivot: Mat4,
        data: T,
    ) -> Result<JointHandle>
    where
        B: BodySource + ?Sized,
        T: JointKindData,
    {
        let pivot = self.checked_pivot(pivot)?;
        let parent_state = self.parent_state(bodies, parent)?;
        self.insert(parent, &parent_state, pivot, data.into())
    }

    pub fn create_fixed<B: BodySource + ?Sized>(
        &mut self,
        bodies: &B,
        parent: Option<BodyHandle>,
        pivot: Mat4,
    ) -> Result<JointHandle> {
        self.create_joint(bodies, parent, pivot, FixedJoint::new())
    }

    pub fn create_hinge<B: BodySource + ?Sized>(
        &mut self,
        bodies: &B,
        parent: Option<BodyHandle>,
        pivot: Mat4,
    ) -> Result<JointHandle> {
        self.create_joint(bodies, parent, pivot, HingeJoint::new())
    }

    pub fn create_motor<B: BodySource + ?Sized>(
        &mut self,
        bodies: &B,
        parent: Option<BodyHandle>,
        pivot: Mat4,
    ) -> Result<JointHandle> {
        self.create_joint(bodies, parent, pivot, MotorJoint::new())
    }

    pub fn create_servo<B: BodySource + ?Sized>(
        &mut self,
        bodies: &B,
        parent: Option<BodyHandle>,
        pivot: Mat4,
    ) -> Result<JointHandle> {
        self.create_joint(bodies, parent, pivot, ServoJoint::new())
    }

    pub fn create_slider<B: BodySource + ?Sized>(
        &mut self,
        bodies: &B,
        parent: Option<BodyHandle>,
        pivot: Mat4,
    ) -> Result<JointHandle> {
        let data = SliderJoint::new(self.units);
        self.create_joint(bodies, parent, pivot, data)
    }

    pub fn create_piston<B: BodySource + ?Sized>(
        &mut self,
        bodies: &B,
        parent: Option<BodyHandle>,
        pivot: Mat4,
    ) -> Result<JointHandle> {
        let data = PistonJoint::new(self.units);
        self.create_joint(bodies, parent, pivot, data)
    }

    pub fn create_spring<B: BodySource + ?Sized>(
        &mut self,
        bodies: &B,
        parent: Option<BodyHandle>,
        pivot: Mat4,
        mode: SpringMode,
    ) -> Result<JointHandle> {
        let data = SpringJoint::new(mode, self.units);
        self.create_joint(bodies, parent, pivot, data)
    }

    pub fn create_corkscrew<B: BodySource + ?Sized>(
        &mut self,
        bodies: &B,
        parent: Option<BodyHandle>,
        pivot: Mat4,
    ) -> Result<JointHandle> {
        let data = CorkscrewJoint::new(self.units);
        self.create_joint(bodies, parent, pivot, data)
    }

    pub fn create_ball_and_socket<B: BodySource + ?Sized>(
        &mut self,
        bodies: &B,
        parent: Option<BodyHandle>,
        pivot: Mat4,
    ) -> Result<JointHandle> {
        self.create_joint(bodies, parent, pivot, BallAndSocketJoint::new())
    }

    pub fn create_universal<B: BodySource + ?Sized>(
        &mut self,
        bodies: &B,
        parent: Option<BodyHandle>,
        pivot: Mat4,
    ) -> Result<JointHandle> {
        self.create_joint(bodies, parent, pivot, UniversalJoint::new())
    }

    /// pin 为目标方向（世界空间）
    pub fn create_up_vector<B: BodySource + ?Sized>(
        &mut self,
        bodies: &B,
        parent: Option<BodyHandle>,
        pin: Vec3,
    ) -> Result<JointHandle> {
        let pivot = Self::pivot_from_pin(Vec3::ZERO, pin)?;
        self.create_joint(bodies, parent, pivot, UpVectorJoint::new())
    }

    pub fn create_plane<B: BodySource + ?Sized>(
        &mut self,
        bodies: &B,
        parent: Option<BodyHandle>,
        pivot: Mat4,
    ) -> Result<JointHandle> {
        let data = PlaneJoint::new(self.units);
        self.create_joint(bodies, parent, pivot, data)
    }

    /// `child_point` 为子侧挂点（世界空间，显示单位）
    pub fn create_point_to_point<B: BodySource + ?Sized>(
        &mut self,
        bodies: &B,
        parent: Option<BodyHandle>,
        pivot: Mat4,
        child_point: Vec3,
    ) -> Result<JointHandle> {
        let engine_pivot = self.checked_pivot(pivot)?;
        let data = PointToPointJoint::new(
            self.units,
            engine_pivot,
            self.units.vec_to_engine(child_point),
        );
        self.create_joint(bodies, parent, pivot, data)
    }

    /// `points` 为枢轴局部空间的控制点（显示单位），可以为空
    pub fn create_curvy_slider<B: BodySource + ?Sized>(
        &mut self,
        bodies: &B,
        parent: Option<BodyHandle>,
        pivot: Mat4,
        points: &[Vec3],
    ) -> Result<JointHandle> {
        let mut data = CurveSlider::new(self.units);
        for point in points {
            data.track_mut().add_point(*point);
        }
        self.create_joint(bodies, parent, pivot, data)
    }

    pub fn create_curvy_piston<B: BodySource + ?Sized>(
        &mut self,
        bodies: &B,
        parent: Option<BodyHandle>,
        pivot: Mat4,
        points: &[Vec3],
    ) -> Result<JointHandle> {
        let mut data = CurvePiston::new(self.units);
        for point in points {
            data.track_mut().add_point(*point);
        }
        self.create_joint(bodies, parent, pivot, data)
    }

    fn checked_pivot(&self, pivot: Mat4) -> Result<Mat4> {
        if !math::is_orthonormal(&pivot) {
            log::warn!("[Joint] 枢轴坐标系不是单位正交的，拒绝创建");
            return Err(JointError::InvalidArgument(
                "pivot frame axes must be orthonormal".to_string(),
            ));
        }
        Ok(self.units.frame_to_engine(pivot))
    }

    fn parent_state<B: BodySource + ?Sized>(
        &self,
        bodies: &B,
        parent: Option<BodyHandle>,
    ) -> Result<BodyState> {
        match parent {
            Some(body) => bodies.body_state(body).ok_or_else(|| {
                JointError::InvalidArgument(format!("unknown parent body {:?}", body))
            }),
            None => Ok(BodyState::WORLD),
        }
    }

    fn insert(
        &mut self,
        parent: Option<BodyHandle>,
        parent_state: &BodyState,
        pivot: Mat4,
        variant: JointVariant,
    ) -> Result<JointHandle> {
        let kind = variant.kind();
        let max_dof = variant.max_dof();
        let mut model = JointModel::new(
            self.world,
            kind,
            max_dof,
            parent,
            parent_state,
            pivot,
            self.units,
        );
        if let Err(err) = model.set_stiffness(self.config.default_stiffness) {
            log::warn!("[Joint] 默认刚度无效，使用 1.0: {}", err);
        }
        if let Err(err) = model.set_breaking_force(self.config.default_breaking_force) {
            log::warn!("[Joint] 默认断裂力无效，使用无穷大: {}", err);
        }
        model.set_solver_model(self.config.default_solver_model);
        model.set_collidable_flag(self.config.default_collidable);

        let index = self.joints.insert(Joint::new(model, variant));
        let handle = JointHandle { registry: self.id, index };
        self.trace(format_args!("创建 {} 关节 {:?}", kind, handle.into_raw_parts()));
        Ok(handle)
    }

    // ========================================
    // 查询
    // ========================================

    fn index_of(&self, handle: JointHandle) -> Result<Index> {
        if handle.registry == self.id && self.joints.contains(handle.index) {
            Ok(handle.index)
        } else {
            Err(JointError::InvalidJoint)
        }
    }

    pub fn is_valid(&self, handle: JointHandle) -> bool {
        self.index_of(handle).is_ok()
    }

    pub fn joint(&self, handle: JointHandle) -> Result<&Joint> {
        let index = self.index_of(handle)?;
        self.joints.get(index).ok_or(JointError::InvalidJoint)
    }

    fn joint_mut(&mut self, handle: JointHandle) -> Result<&mut Joint> {
        let index = self.index_of(handle)?;
        self.joints.get_mut(index).ok_or(JointError::InvalidJoint)
    }

    pub fn model(&self, handle: JointHandle) -> Result<&JointModel> {
        Ok(self.joint(handle)?.model())
    }

    pub fn kind_of(&self, handle: JointHandle) -> Result<JointKind> {
        Ok(self.joint(handle)?.kind())
    }

    /// 按类型取关节状态
    pub fn kind<T: JointKindData>(&self, handle: JointHandle) -> Result<&T> {
        let joint = self.joint(handle)?;
        joint.get::<T>().ok_or(JointError::KindMismatch {
            expected: T::KIND,
            found: joint.kind(),
        })
    }

    /// 按类型取可写关节状态；已连接时下一步前唤醒两侧刚体
    pub fn kind_mut<T: JointKindData>(&mut self, handle: JointHandle) -> Result<&mut T> {
        let joint = self.joint_mut(handle)?;
        let found = joint.kind();
        joint.get_mut::<T>().ok_or(JointError::KindMismatch {
            expected: T::KIND,
            found,
        })
    }

    // ========================================
    // 公共属性
    // ========================================

    pub fn set_stiffness(&mut self, handle: JointHandle, stiffness: f32) -> Result<()> {
        self.joint_mut(handle)?.model_mut().set_stiffness(stiffness)
    }

    /// 断裂力（显示单位）；已连接时同步到引擎
    pub fn set_breaking_force<P: PhysicsBackend + ?Sized>(
        &mut self,
        handle: JointHandle,
        backend: &mut P,
        force: f32,
    ) -> Result<()> {
        let model = self.joint_mut(handle)?.model_mut();
        model.set_breaking_force(force)?;
        if let Some(constraint) = model.constraint() {
            backend.set_constraint_breaking_force(constraint, model.engine_breaking_force());
        }
        Ok(())
    }

    pub fn set_solver_model(
        &mut self,
        handle: JointHandle,
        model: crate::joint::SolverModel,
    ) -> Result<()> {
        self.joint_mut(handle)?.model_mut().set_solver_model(model);
        Ok(())
    }

    pub fn set_user_data(&mut self, handle: JointHandle, user_data: u64) -> Result<()> {
        self.joint_mut(handle)?.model_mut().user_data = user_data;
        Ok(())
    }

    pub fn set_group(&mut self, handle: JointHandle, group: Option<u32>) -> Result<()> {
        self.joint_mut(handle)?.model_mut().set_group(group);
        Ok(())
    }

    /// 两个被连接刚体之间是否碰撞；已连接时同步到引擎
    pub fn set_collidable<P: PhysicsBackend + ?Sized>(
        &mut self,
        handle: JointHandle,
        backend: &mut P,
        collidable: bool,
    ) -> Result<()> {
        let model = self.joint_mut(handle)?.model_mut();
        model.set_collidable_flag(collidable);
        if let Some(constraint) = model.constraint() {
            backend.set_constraint_collidable(constraint, collidable);
        }
        Ok(())
    }

    /// 修改 UpVector 的目标方向（世界空间）
    pub fn set_up_vector_pin<B: BodySource + ?Sized>(
        &mut self,
        handle: JointHandle,
        bodies: &B,
        pin: Vec3,
    ) -> Result<()> {
        self.kind::<UpVectorJoint>(handle)?;
        let parent = self.model(handle)?.parent();
        let parent_state = self.parent_state(bodies, parent)?;
        self.joint_mut(handle)?
            .model_mut()
            .set_parent_pin(&parent_state, pin)
    }

    // ========================================
    // 连接
    // ========================================

    /// 连接子刚体，创建引擎约束
    pub fn connect<P: PhysicsBackend + ?Sized>(
        &mut self,
        handle: JointHandle,
        backend: &mut P,
        child: BodyHandle,
    ) -> Result<()> {
        let joint = self.joint(handle)?;
        let model = joint.model();
        if model.is_connected() {
            return Err(JointError::AlreadyConnected);
        }
        if model.parent() == Some(child) {
            return Err(JointError::InvalidArgument(
                "child body must differ from parent body".to_string(),
            ));
        }
        let child_state = backend.body_state(child).ok_or_else(|| {
            JointError::InvalidArgument(format!("unknown child body {:?}", child))
        })?;
        let parent_state = self.parent_state(&*backend, model.parent())?;

        let child_pivot = joint.adjust_child_pivot(model.parent_pivot(&parent_state));
        let local_child = child_state.transform.inverse() * child_pivot;
        let desc = ConstraintDesc {
            joint: handle,
            child,
            parent: model.parent(),
            max_dof: model.max_dof(),
            breaking_force: model.engine_breaking_force(),
            solver_model: model.solver_model(),
            collidable: model.is_collidable(),
        };

        let constraint = backend.create_constraint(&desc);
        let joint = self.joint_mut(handle)?;
        joint.model_mut().attach(child, local_child, constraint);
        joint.on_connect();
        let kind = joint.kind();
        self.trace(format_args!(
            "连接 {} 关节 {:?}: 子刚体 {:?}",
            kind,
            handle.into_raw_parts(),
            child
        ));
        Ok(())
    }

    /// 断开子刚体，销毁引擎约束，清空测量值
    pub fn disconnect<P: PhysicsBackend + ?Sized>(
        &mut self,
        handle: JointHandle,
        backend: &mut P,
    ) -> Result<()> {
        if !self.model(handle)?.is_connected() {
            return Err(JointError::NotConnected);
        }
        self.detach(handle, backend)?;
        self.trace(format_args!("断开关节 {:?}", handle.into_raw_parts()));
        Ok(())
    }

    /// 引擎报告约束断裂：正常断开，不是错误
    pub fn report_broken<P: PhysicsBackend + ?Sized>(
        &mut self,
        handle: JointHandle,
        backend: &mut P,
    ) -> Result<()> {
        if !self.model(handle)?.is_connected() {
            return Ok(());
        }
        self.detach(handle, backend)?;
        self.joint_mut(handle)?.model_mut().mark_broken();
        log::info!("[Joint] 关节 {:?} 超过断裂力，已断开", handle.into_raw_parts());
        Ok(())
    }

    fn detach<P: PhysicsBackend + ?Sized>(
        &mut self,
        handle: JointHandle,
        backend: &mut P,
    ) -> Result<()> {
        let joint = self.joint_mut(handle)?;
        let child = joint.model().child();
        let parent = joint.model().parent();
        let constraint = joint.model_mut().detach();
        joint.on_disconnect();

        if let Some(constraint) = constraint {
            backend.destroy_constraint(constraint);
        }
        // 失去约束的刚体可能悬空，唤醒
        for body in child.into_iter().chain(parent) {
            backend.set_sleep_state(body, false);
        }
        Ok(())
    }

    // ========================================
    // 销毁
    // ========================================

    /// 销毁关节，连带移除它参与的齿轮
    pub fn destroy_joint<P: PhysicsBackend + ?Sized>(
        &mut self,
        handle: JointHandle,
        backend: &mut P,
    ) -> Result<()> {
        if self.model(handle)?.is_connected() {
            self.detach(handle, backend)?;
        }
        for gear in self.gears_of(handle) {
            self.gears.remove(gear.index);
        }
        self.joints.remove(handle.index);
        self.trace(format_args!("销毁关节 {:?}", handle.into_raw_parts()));
        Ok(())
    }

    /// 销毁全部关节和齿轮（世界销毁时调用）
    pub fn destroy_all<P: PhysicsBackend + ?Sized>(&mut self, backend: &mut P) {
        let handles: Vec<JointHandle> = self.joints().collect();
        let count = handles.len();
        for handle in handles {
            if let Err(err) = self.destroy_joint(handle, backend) {
                log::warn!("[Joint] 销毁关节 {:?} 失败: {}", handle.into_raw_parts(), err);
            }
        }
        // 逐个移除，保留世代计数使旧齿轮句柄继续失效
        let gears: Vec<Index> = self.gears.iter().map(|(index, _)| index).collect();
        for index in gears {
            self.gears.remove(index);
        }
        log::info!("[Joint] 世界 {:?} 的 {} 个关节已全部销毁", self.world, count);
    }

    // ========================================
    // 枚举
    // ========================================

    pub fn joints(&self) -> impl Iterator<Item = JointHandle> + '_ {
        let registry = self.id;
        self.joints
            .iter()
            .map(move |(index, _)| JointHandle { registry, index })
    }

    pub fn joints_in_group(&self, group: u32) -> Vec<JointHandle> {
        let registry = self.id;
        self.joints
            .iter()
            .filter(|(_, joint)| joint.model().group() == Some(group))
            .map(|(index, _)| JointHandle { registry, index })
            .collect()
    }

    pub fn joints_of_kind(&self, kind: JointKind) -> Vec<JointHandle> {
        let registry = self.id;
        self.joints
            .iter()
            .filter(|(_, joint)| joint.kind() == kind)
            .map(|(index, _)| JointHandle { registry, index })
            .collect()
    }

    /// 已连接到某刚体（父或子）的关节
    pub fn joints_of_body(&self, body: BodyHandle) -> Vec<JointHandle> {
        let registry = self.id;
        self.joints
            .iter()
            .filter(|(_, joint)| {
                joint.model().parent() == Some(body) || joint.model().child() == Some(body)
            })
            .map(|(index, _)| JointHandle { registry, index })
            .collect()
    }

    pub fn gears(&self) -> impl Iterator<Item = GearHandle> + '_ {
        let registry = self.id;
        self.gears
            .iter()
            .map(move |(index, _)| GearHandle { registry, index })
    }

    /// 关节参与的齿轮
    pub fn gears_of(&self, joint: JointHandle) -> Vec<GearHandle> {
        let registry = self.id;
        self.gears
            .iter()
            .filter(|(_, gear)| gear.involves(joint))
            .map(|(index, _)| GearHandle { registry, index })
            .collect()
    }

    // ========================================
    // 齿轮
    // ========================================

    /// 创建齿轮：b 的主 DOF 速率跟随 ratio × a
    pub fn create_gear(&mut self, a: JointHandle, b: JointHandle, ratio: f32) -> Result<GearHandle> {
        if a.registry != self.id || b.registry != self.id {
            return Err(JointError::InvalidArgument(
                "gear members must belong to the same world".to_string(),
            ));
        }
        let kind_a = self.kind_of(a)?;
        let kind_b = self.kind_of(b)?;
        if a == b {
            return Err(JointError::InvalidArgument(
                "a joint cannot be geared to itself".to_string(),
            ));
        }
        if !ratio.is_finite() {
            return Err(JointError::InvalidArgument(format!(
                "gear ratio must be finite, got {}",
                ratio
            )));
        }
        if !gear::can_gear(kind_a, kind_b) {
            log::warn!("[Joint] {} 与 {} 不能齿轮耦合", kind_a, kind_b);
            return Err(JointError::InvalidArgument(format!(
                "{} cannot be geared with {}",
                kind_a, kind_b
            )));
        }
        if self
            .gears
            .iter()
            .any(|(_, gear)| gear.involves(a) && gear.involves(b))
        {
            return Err(JointError::InvalidArgument(
                "these joints are already geared together".to_string(),
            ));
        }
        // 从动侧只能有一个主动关节
        if self.gears.iter().any(|(_, gear)| gear.members().1 == b) {
            log::warn!("[Gear] {:?} 已被其他齿轮驱动", b.into_raw_parts());
            return Err(JointError::InvalidArgument(
                "joint is already driven by another gear".to_string(),
            ));
        }

        let reference = |handle| {
            self.joint(handle)
                .ok()
                .and_then(Joint::gear_coordinate)
                .map_or(0.0, |state| state.position)
        };
        let coupling = GearCoupling::new(a, b, ratio, reference(a), reference(b));
        let index = self.gears.insert(coupling);
        let handle = GearHandle { registry: self.id, index };
        self.trace(format_args!(
            "创建齿轮 {:?}: {} → {}, 比例 {}",
            handle.into_raw_parts(),
            kind_a,
            kind_b,
            ratio
        ));
        Ok(handle)
    }

    /// 销毁齿轮，重复销毁返回 false
    pub fn destroy_gear(&mut self, handle: GearHandle) -> bool {
        handle.registry == self.id && self.gears.remove(handle.index).is_some()
    }

    /// 齿轮存在且两侧关节都存在
    pub fn is_gear_valid(&self, handle: GearHandle) -> bool {
        self.gear(handle).map_or(false, |gear| {
            let (a, b) = gear.members();
            self.is_valid(a) && self.is_valid(b)
        })
    }

    pub fn gear(&self, handle: GearHandle) -> Result<&GearCoupling> {
        if handle.registry != self.id {
            return Err(JointError::InvalidGear);
        }
        self.gears.get(handle.index).ok_or(JointError::InvalidGear)
    }

    fn gear_mut(&mut self, handle: GearHandle) -> Result<&mut GearCoupling> {
        if handle.registry != self.id {
            return Err(JointError::InvalidGear);
        }
        self.gears.get_mut(handle.index).ok_or(JointError::InvalidGear)
    }

    pub fn gear_ratio(&self, handle: GearHandle) -> Result<f32> {
        Ok(self.gear(handle)?.ratio())
    }

    pub fn set_gear_ratio(&mut self, handle: GearHandle, ratio: f32) -> Result<()> {
        self.gear_mut(handle)?.set_ratio(ratio)
    }

    pub fn gear_user_data(&self, handle: GearHandle) -> Result<u64> {
        Ok(self.gear(handle)?.user_data)
    }

    pub fn set_gear_user_data(&mut self, handle: GearHandle, user_data: u64) -> Result<()> {
        self.gear_mut(handle)?.user_data = user_data;
        Ok(())
    }

    /// 齿轮另一侧的关节
    pub fn gear_partner(&self, handle: GearHandle, joint: JointHandle) -> Result<JointHandle> {
        self.gear(handle)?.partner(joint).ok_or_else(|| {
            JointError::InvalidArgument("joint is not a member of this gear".to_string())
        })
    }

    /// 相位误差（引擎单位 / 弧度）
    pub fn gear_phase_error(&self, handle: GearHandle) -> Result<f32> {
        let gear = self.gear(handle)?;
        let (a, b) = gear.members();
        let state_a = self.joint(a)?.gear_coordinate().unwrap_or_default();
        let state_b = self.joint(b)?.gear_coordinate().unwrap_or_default();
        Ok(gear.phase_error(&state_a, &state_b))
    }

    /// 各从动关节本步的目标速率（两侧都已连接的齿轮才生效）
    fn gear_drives(&self) -> HashMap<Index, GearDrive> {
        let mut drives = HashMap::new();
        for (_, gear) in self.gears.iter() {
            let (a, b) = gear.members();
            let (Ok(joint_a), Ok(joint_b)) = (self.joint(a), self.joint(b)) else {
                continue;
            };
            if !joint_a.model().is_connected() || !joint_b.model().is_connected() {
                continue;
            }
            if let Some(state) = joint_a.gear_coordinate() {
                drives.insert(
                    b.index,
                    GearDrive {
                        target_rate: gear.target_rate(state.velocity),
                    },
                );
            }
        }
        drives
    }

    // ========================================
    // 每步
    // ========================================

    /// 唤醒参数被修改过的已连接关节的刚体
    pub fn flush_wake_requests<P: PhysicsBackend + ?Sized>(&mut self, backend: &mut P) {
        for (_, joint) in self.joints.iter_mut() {
            let model = joint.model_mut();
            if !model.take_wake_request() {
                continue;
            }
            for body in model.child().into_iter().chain(model.parent()) {
                backend.set_sleep_state(body, false);
            }
        }
    }

    /// 为全部已连接关节生成本步约束行
    ///
    /// 关节数达到 parallel_threshold 时在 rayon 线程池上并行。
    /// 齿轮速率在并行前快照，关节之间不读写彼此的状态。
    pub fn submit<B: BodySource + ?Sized>(&mut self, bodies: &B, dt: f32) -> Result<Vec<Submission>> {
        let dt = checked_timestep(dt)?;
        let drives = self.gear_drives();
        let registry = self.id;
        let threshold = self.config.parallel_threshold;

        let mut connected: Vec<(Index, &mut Joint)> = self
            .joints
            .iter_mut()
            .filter(|(_, joint)| joint.model().is_connected())
            .collect();

        let build = |entry: &mut (Index, &mut Joint)| {
            let index = entry.0;
            let handle = JointHandle { registry, index };
            submit_one(handle, &mut *entry.1, bodies, dt, drives.get(&index).copied())
        };

        let submissions: Vec<Submission> = if connected.len() >= threshold.max(1) {
            connected.par_iter_mut().filter_map(build).collect()
        } else {
            connected.iter_mut().filter_map(build).collect()
        };
        Ok(submissions)
    }

    /// 单个关节的提交（引擎逐关节回调时使用）
    pub fn submit_joint<B: BodySource + ?Sized>(
        &mut self,
        handle: JointHandle,
        bodies: &B,
        dt: f32,
        rows: &mut dyn ConstraintRows,
    ) -> Result<()> {
        let dt = checked_timestep(dt)?;
        let drive = self.gear_drives().get(&handle.index).copied();
        let joint = self.joint_mut(handle)?;
        if !joint.model().is_connected() {
            return Err(JointError::NotConnected);
        }
        let (child_state, parent_state) = body_states(joint.model(), bodies).ok_or_else(|| {
            JointError::InvalidArgument("connected body is missing from the engine".to_string())
        })?;
        let ctx = context(joint.model(), &child_state, &parent_state, dt, drive);
        joint.submit(&ctx, rows);
        Ok(())
    }

    /// 回写求解后的行力，更新反作用力
    pub fn apply_feedback(&mut self, handle: JointHandle, rows: &RowBuffer) -> Result<()> {
        let (force, torque) = rows.reaction();
        self.joint_mut(handle)?.model_mut().set_reaction(force, torque);
        Ok(())
    }

    /// 批量回写
    pub fn apply_submissions(&mut self, submissions: &[Submission]) {
        for submission in submissions {
            if let Err(err) = self.apply_feedback(submission.joint, &submission.rows) {
                log::debug!(
                    "[Joint] 回写跳过 {:?}: {}",
                    submission.joint.into_raw_parts(),
                    err
                );
            }
        }
    }
}

// ============================================================================
// 提交辅助
// ============================================================================

fn checked_timestep(dt: f32) -> Result<f32> {
    if !dt.is_finite() || dt < MIN_TIMESTEP {
        return Err(JointError::InvalidArgument(format!("invalid timestep {}", dt)));
    }
    Ok(dt)
}

/// 子刚体与父刚体（无父时为世界）的快照
fn body_states<B: BodySource + ?Sized>(
    model: &JointModel,
    bodies: &B,
) -> Option<(BodyState, BodyState)> {
    let child = bodies.body_state(model.child()?)?;
    let parent = match model.parent() {
        Some(body) => bodies.body_state(body)?,
        None => BodyState::WORLD,
    };
    Some((child, parent))
}

fn context<'a>(
    model: &JointModel,
    child: &'a BodyState,
    parent: &'a BodyState,
    dt: f32,
    gear: Option<GearDrive>,
) -> SubmitContext<'a> {
    SubmitContext {
        dt,
        child,
        parent,
        child_frame: model.child_pivot(child),
        parent_frame: model.parent_pivot(parent),
        stiffness: model.stiffness(),
        gear,
    }
}

fn submit_one<B: BodySource + ?Sized>(
    handle: JointHandle,
    joint: &mut Joint,
    bodies: &B,
    dt: f32,
    gear: Option<GearDrive>,
) -> Option<Submission> {
    let Some((child_state, parent_state)) = body_states(joint.model(), bodies) else {
        log::warn!("[Joint] 关节 {:?} 的刚体不存在，跳过本步", handle.into_raw_parts());
        return None;
    };
    let ctx = context(joint.model(), &child_state, &parent_state, dt, gear);
    let mut rows = RowBuffer::with_capacity(joint.model().max_dof() as usize);
    joint.submit(&ctx, &mut rows);

    let model = joint.model();
    Some(Submission {
        joint: handle,
        constraint: model.constraint(),
        child: model.child()?,
        parent: model.parent(),
        rows,
    })
}
