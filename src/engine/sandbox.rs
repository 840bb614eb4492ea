//! 沙盒刚体世界
//!
//! 最小的参考后端：半隐式欧拉积分 + 对约束行做投影 Gauss-Seidel。
//! 惯量取标量（球形），质心即刚体原点。
//!
//! 每步流程：
//! 1. 唤醒被修改过参数的关节所连接的刚体
//! 2. 关节提交约束行（此时速度为上一步末的速度）
//! 3. 外力积分到速度
//! 4. PGS 求解行冲量，行力钳制在 [min_friction, max_friction]
//! 5. 超过断裂力的约束断开，其余回写反作用力
//! 6. 速度积分到位置

use std::collections::{BTreeMap, HashMap};

use glam::{Mat4, Quat, Vec3};

use super::{
    BodyHandle, BodySource, BodyState, ConstraintDesc, ConstraintId, PhysicsBackend, RowKind,
};
use crate::registry::{JointRegistry, Submission};
use crate::Result;

/// 位置误差修正系数
const BAUMGARTE: f32 = 0.2;

/// 有效质量下限，低于此值的行跳过
const MIN_EFFECTIVE_MASS: f32 = 1.0e-9;

/// 沙盒刚体
#[derive(Clone, Debug)]
pub struct SandboxBody {
    /// 刚体变换（无缩放，原点为质心）
    pub transform: Mat4,
    pub velocity: Vec3,
    pub omega: Vec3,
    inverse_mass: f32,
    inverse_inertia: f32,
    force: Vec3,
    torque: Vec3,
    sleeping: bool,
}

impl SandboxBody {
    /// 动态刚体；质量/惯量非正时按静态处理
    pub fn dynamic(transform: Mat4, mass: f32, inertia: f32) -> Self {
        let inverse = |value: f32| if value > 0.0 && value.is_finite() { 1.0 / value } else { 0.0 };
        Self {
            transform,
            velocity: Vec3::ZERO,
            omega: Vec3::ZERO,
            inverse_mass: inverse(mass),
            inverse_inertia: inverse(inertia),
            force: Vec3::ZERO,
            torque: Vec3::ZERO,
            sleeping: false,
        }
    }

    /// 静态刚体
    pub fn fixed(transform: Mat4) -> Self {
        Self::dynamic(transform, 0.0, 0.0)
    }

    pub fn is_static(&self) -> bool {
        self.inverse_mass == 0.0 && self.inverse_inertia == 0.0
    }

    pub fn is_sleeping(&self) -> bool {
        self.sleeping
    }

    pub fn position(&self) -> Vec3 {
        self.transform.w_axis.truncate()
    }

    fn state(&self) -> BodyState {
        BodyState {
            transform: self.transform,
            velocity: self.velocity,
            omega: self.omega,
            com: self.position(),
        }
    }

    fn integrate_forces(&mut self, gravity: Vec3, dt: f32) {
        if self.sleeping || self.is_static() {
            return;
        }
        if self.inverse_mass > 0.0 {
            self.velocity += (gravity + self.force * self.inverse_mass) * dt;
        }
        self.omega += self.torque * self.inverse_inertia * dt;
    }

    fn integrate_velocity(&mut self, dt: f32) {
        if self.sleeping || self.is_static() {
            return;
        }
        let (_, rotation, translation) = self.transform.to_scale_rotation_translation();
        let rotation = (Quat::from_scaled_axis(self.omega * dt) * rotation).normalize();
        self.transform = Mat4::from_rotation_translation(rotation, translation + self.velocity * dt);
    }
}

/// 单条行的求解数据
struct SolverRow {
    submission: usize,
    row: usize,
    child: BodyHandle,
    parent: Option<BodyHandle>,
    /// 线性雅可比（角度行为零）
    linear: Vec3,
    angular_child: Vec3,
    angular_parent: Vec3,
    inverse_k: f32,
    target: f32,
    lower: f32,
    upper: f32,
    impulse: f32,
}

/// 沙盒世界
pub struct SandboxWorld {
    bodies: BTreeMap<BodyHandle, SandboxBody>,
    constraints: HashMap<ConstraintId, ConstraintDesc>,
    next_body: u64,
    next_constraint: u64,
    pub gravity: Vec3,
    pub solver_iterations: usize,
}

impl Default for SandboxWorld {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, -9.8, 0.0))
    }
}

impl SandboxWorld {
    pub fn new(gravity: Vec3) -> Self {
        Self {
            bodies: BTreeMap::new(),
            constraints: HashMap::new(),
            next_body: 1,
            next_constraint: 1,
            gravity,
            solver_iterations: 20,
        }
    }

    pub fn add_body(&mut self, body: SandboxBody) -> BodyHandle {
        let handle = BodyHandle(self.next_body);
        self.next_body += 1;
        self.bodies.insert(handle, body);
        handle
    }

    pub fn remove_body(&mut self, handle: BodyHandle) -> Option<SandboxBody> {
        self.bodies.remove(&handle)
    }

    pub fn body(&self, handle: BodyHandle) -> Option<&SandboxBody> {
        self.bodies.get(&handle)
    }

    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut SandboxBody> {
        self.bodies.get_mut(&handle)
    }

    /// 持续外力，每步结束后不清除
    pub fn set_force(&mut self, handle: BodyHandle, force: Vec3) {
        if let Some(body) = self.bodies.get_mut(&handle) {
            body.force = force;
            body.sleeping = false;
        }
    }

    pub fn set_torque(&mut self, handle: BodyHandle, torque: Vec3) {
        if let Some(body) = self.bodies.get_mut(&handle) {
            body.torque = torque;
            body.sleeping = false;
        }
    }

    pub fn constraint(&self, constraint: ConstraintId) -> Option<&ConstraintDesc> {
        self.constraints.get(&constraint)
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    /// 推进一步
    pub fn step(&mut self, registry: &mut JointRegistry, dt: f32) -> Result<()> {
        registry.flush_wake_requests(self);
        let mut submissions = registry.submit(&*self, dt)?;

        let mut rows = self.prepare_rows(&submissions, dt);
        let gravity = self.gravity;
        for body in self.bodies.values_mut() {
            body.integrate_forces(gravity, dt);
        }
        self.solve(&mut rows);

        for row in &rows {
            if let Some(target) = submissions[row.submission].rows.rows_mut().get_mut(row.row) {
                target.force = row.impulse / dt;
            }
        }
        let broken: Vec<_> = submissions
            .iter()
            .filter(|submission| self.exceeds_breaking_force(submission))
            .map(|submission| submission.joint)
            .collect();
        registry.apply_submissions(&submissions);
        for joint in broken {
            registry.report_broken(joint, self)?;
        }

        for body in self.bodies.values_mut() {
            body.integrate_velocity(dt);
        }
        Ok(())
    }

    fn exceeds_breaking_force(&self, submission: &Submission) -> bool {
        let Some(desc) = submission.constraint.and_then(|id| self.constraints.get(&id)) else {
            return false;
        };
        let (force, torque) = submission.rows.reaction();
        force.length() > desc.breaking_force || torque.length() > desc.breaking_force
    }

    fn velocities(&self, body: Option<BodyHandle>) -> (Vec3, Vec3) {
        body.and_then(|handle| self.bodies.get(&handle))
            .map_or((Vec3::ZERO, Vec3::ZERO), |body| (body.velocity, body.omega))
    }

    fn inverse_mass(&self, body: Option<BodyHandle>) -> (f32, f32) {
        body.and_then(|handle| self.bodies.get(&handle))
            .map_or((0.0, 0.0), |body| (body.inverse_mass, body.inverse_inertia))
    }

    fn com(&self, body: Option<BodyHandle>) -> Vec3 {
        body.and_then(|handle| self.bodies.get(&handle))
            .map_or(Vec3::ZERO, SandboxBody::position)
    }

    fn relative_velocity(&self, row: &SolverRow) -> f32 {
        let (v_child, w_child) = self.velocities(Some(row.child));
        let (v_parent, w_parent) = self.velocities(row.parent);
        row.linear.dot(v_child - v_parent) + row.angular_child.dot(w_child)
            - row.angular_parent.dot(w_parent)
    }

    /// 建立雅可比与目标速度（使用外力积分前的速度）
    fn prepare_rows(&self, submissions: &[Submission], dt: f32) -> Vec<SolverRow> {
        let mut prepared = Vec::new();
        for (index, submission) in submissions.iter().enumerate() {
            let child_com = self.com(Some(submission.child));
            let parent_com = self.com(submission.parent);
            let (m_child, i_child) = self.inverse_mass(Some(submission.child));
            let (m_parent, i_parent) = self.inverse_mass(submission.parent);

            for (row_index, row) in submission.rows.rows().iter().enumerate() {
                let (linear, angular_child, angular_parent) = match row.kind {
                    RowKind::Linear { point0, point1 } => (
                        row.axis,
                        (point0 - child_com).cross(row.axis),
                        (point1 - parent_com).cross(row.axis),
                    ),
                    RowKind::Angular { .. } => (Vec3::ZERO, row.axis, row.axis),
                };
                let k = (m_child + m_parent) * linear.length_squared()
                    + i_child * angular_child.length_squared()
                    + i_parent * angular_parent.length_squared();
                if k < MIN_EFFECTIVE_MASS {
                    continue;
                }

                let mut solver_row = SolverRow {
                    submission: index,
                    row: row_index,
                    child: submission.child,
                    parent: submission.parent,
                    linear,
                    angular_child,
                    angular_parent,
                    inverse_k: 1.0 / k,
                    target: 0.0,
                    lower: row.min_friction * dt,
                    upper: row.max_friction * dt,
                    impulse: 0.0,
                };
                solver_row.target = match row.acceleration {
                    Some(acceleration) => self.relative_velocity(&solver_row) + acceleration * dt,
                    None => -BAUMGARTE * row.stiffness * row.position_error() / dt,
                };
                prepared.push(solver_row);
            }
        }
        prepared
    }

    fn apply_impulse(&mut self, row: &SolverRow, impulse: f32) {
        if let Some(body) = self.bodies.get_mut(&row.child) {
            body.velocity += row.linear * impulse * body.inverse_mass;
            body.omega += row.angular_child * impulse * body.inverse_inertia;
        }
        if let Some(body) = row.parent.and_then(|handle| self.bodies.get_mut(&handle)) {
            body.velocity -= row.linear * impulse * body.inverse_mass;
            body.omega -= row.angular_parent * impulse * body.inverse_inertia;
        }
    }

    fn solve(&mut self, rows: &mut [SolverRow]) {
        for _ in 0..self.solver_iterations {
            for row in rows.iter_mut() {
                let error = row.target - self.relative_velocity(row);
                let accumulated = (row.impulse + error * row.inverse_k).clamp(row.lower, row.upper);
                let delta = accumulated - row.impulse;
                row.impulse = accumulated;
                self.apply_impulse(row, delta);
            }
        }
    }
}

impl BodySource for SandboxWorld {
    fn body_state(&self, body: BodyHandle) -> Option<BodyState> {
        self.bodies.get(&body).map(SandboxBody::state)
    }
}

impl PhysicsBackend for SandboxWorld {
    fn set_sleep_state(&mut self, body: BodyHandle, sleeping: bool) {
        if let Some(body) = self.bodies.get_mut(&body) {
            body.sleeping = sleeping;
        }
    }

    fn create_constraint(&mut self, desc: &ConstraintDesc) -> ConstraintId {
        let id = ConstraintId(self.next_constraint);
        self.next_constraint += 1;
        self.constraints.insert(id, *desc);
        log::debug!(
            "[Sandbox] 约束创建: {:?}, 子刚体 {:?}, 父刚体 {:?}, 行数 {}",
            id,
            desc.child,
            desc.parent,
            desc.max_dof
        );
        id
    }

    fn destroy_constraint(&mut self, constraint: ConstraintId) {
        if self.constraints.remove(&constraint).is_some() {
            log::debug!("[Sandbox] 约束销毁: {:?}", constraint);
        }
    }

    fn set_constraint_collidable(&mut self, constraint: ConstraintId, collidable: bool) {
        if let Some(desc) = self.constraints.get_mut(&constraint) {
            desc.collidable = collidable;
        }
    }

    fn set_constraint_breaking_force(&mut self, constraint: ConstraintId, force: f32) {
        if let Some(desc) = self.constraints.get_mut(&constraint) {
            log::debug!("[Sandbox] 约束 {:?} 断裂阈值 -> {}", constraint, force);
            desc.breaking_force = force;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JointConfig;
    use crate::engine::WorldHandle;
    use crate::joint::{FixedJoint, HingeJoint, SliderJoint, LIMIT_EPSILON};

    const DT: f32 = 1.0 / 60.0;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn setup() -> (SandboxWorld, JointRegistry, BodyHandle) {
        init_logger();
        let mut world = SandboxWorld::new(Vec3::ZERO);
        let body = world.add_body(SandboxBody::dynamic(Mat4::IDENTITY, 1.0, 1.0));
        let registry = JointRegistry::with_config(WorldHandle(1), JointConfig::default());
        (world, registry, body)
    }

    #[test]
    fn test_slider_stays_within_limits_under_constant_force() {
        let (mut world, mut registry, body) = setup();
        let joint = registry.create_slider(&world, None, Mat4::IDENTITY).unwrap();
        {
            let slider = registry.kind_mut::<SliderJoint>(joint).unwrap();
            slider.set_limits(-10.0, 10.0);
            slider.set_friction(0.0);
        }
        registry.connect(joint, &mut world, body).unwrap();
        world.set_force(body, Vec3::new(5.0, 0.0, 0.0));

        for _ in 0..600 {
            world.step(&mut registry, DT).unwrap();
            let slider = registry.kind::<SliderJoint>(joint).unwrap();
            assert!(
                slider.position().abs() <= 10.0 + LIMIT_EPSILON,
                "position {}",
                slider.position()
            );
        }

        let slider = registry.kind::<SliderJoint>(joint).unwrap();
        assert!((slider.position() - 10.0).abs() < 0.05);
        assert!(slider.velocity().abs() < 1e-2, "velocity {}", slider.velocity());
        assert!(slider.acceleration().abs() < 1e-1, "acceleration {}", slider.acceleration());

        // 侧向和转动保持锁定
        let position = world.body(body).unwrap().position();
        assert!(position.y.abs() < 1e-3 && position.z.abs() < 1e-3);
        // 止挡承受外力
        let reaction = registry.model(joint).unwrap().reaction_force();
        assert!((reaction.x + 5.0).abs() < 0.5, "reaction {:?}", reaction);
    }

    #[test]
    fn test_disconnect_reconnect_round_trip() {
        let (mut world, mut registry, body) = setup();
        let joint = registry.create_hinge(&world, None, Mat4::IDENTITY).unwrap();
        registry.set_stiffness(joint, 0.5).unwrap();
        registry.kind_mut::<HingeJoint>(joint).unwrap().set_friction(3.0);
        registry.connect(joint, &mut world, body).unwrap();
        world.set_torque(body, Vec3::new(10.0, 0.0, 0.0));

        for _ in 0..30 {
            world.step(&mut registry, DT).unwrap();
        }
        assert!(registry.kind::<HingeJoint>(joint).unwrap().angle() > 0.0);

        registry.disconnect(joint, &mut world).unwrap();
        assert_eq!(world.constraint_count(), 0);
        let hinge = registry.kind::<HingeJoint>(joint).unwrap();
        assert_eq!(hinge.angle(), 0.0);
        assert_eq!(hinge.omega(), 0.0);
        assert_eq!(hinge.friction(), 3.0);
        assert_eq!(registry.model(joint).unwrap().stiffness(), 0.5);

        registry.connect(joint, &mut world, body).unwrap();
        assert_eq!(world.constraint_count(), 1);
        world.step(&mut registry, DT).unwrap();
        assert!(registry.model(joint).unwrap().is_connected());
    }

    #[test]
    fn test_fixed_joint_breaks_under_load() {
        let (mut world, mut registry, body) = setup();
        let joint = registry.create_joint(&world, None, Mat4::IDENTITY, FixedJoint::new()).unwrap();
        registry.set_breaking_force(joint, &mut world, 1.0).unwrap();
        registry.connect(joint, &mut world, body).unwrap();
        world.set_force(body, Vec3::new(0.0, 100.0, 0.0));

        world.step(&mut registry, DT).unwrap();
        let model = registry.model(joint).unwrap();
        assert!(model.is_broken());
        assert!(!model.is_connected());
        assert_eq!(world.constraint_count(), 0);

        // 断开后刚体自由运动
        world.step(&mut registry, DT).unwrap();
        assert!(world.body(body).unwrap().velocity.y > 0.0);
    }

    #[test]
    fn test_hinge_breaks_under_torque_only() {
        let (mut world, mut registry, body) = setup();
        let joint = registry.create_hinge(&world, None, Mat4::IDENTITY).unwrap();
        registry.set_breaking_force(joint, &mut world, 10.0).unwrap();
        registry.connect(joint, &mut world, body).unwrap();
        // 绕锁定的 up 轴施加力矩，点约束不受力
        world.set_torque(body, Vec3::new(0.0, 100.0, 0.0));

        world.step(&mut registry, DT).unwrap();
        let model = registry.model(joint).unwrap();
        assert!(model.reaction_force().length() < 10.0);
        assert!(model.is_broken());
        assert_eq!(world.constraint_count(), 0);
    }

    #[test]
    fn test_lowering_breaking_force_while_connected() {
        let (mut world, mut registry, body) = setup();
        let joint = registry.create_joint(&world, None, Mat4::IDENTITY, FixedJoint::new()).unwrap();
        registry.connect(joint, &mut world, body).unwrap();
        world.set_force(body, Vec3::new(0.0, 100.0, 0.0));

        world.step(&mut registry, DT).unwrap();
        assert!(registry.model(joint).unwrap().is_connected());

        let constraint = registry.model(joint).unwrap().constraint().unwrap();
        registry.set_breaking_force(joint, &mut world, 10.0).unwrap();
        assert_eq!(world.constraint(constraint).unwrap().breaking_force, 10.0);

        world.step(&mut registry, DT).unwrap();
        let model = registry.model(joint).unwrap();
        assert!(model.is_broken());
        assert!(!model.is_connected());
    }

    #[test]
    fn test_sleeping_body_woken_by_parameter_change() {
        let (mut world, mut registry, body) = setup();
        let joint = registry.create_hinge(&world, None, Mat4::IDENTITY).unwrap();
        registry.connect(joint, &mut world, body).unwrap();
        world.step(&mut registry, DT).unwrap();

        world.set_sleep_state(body, true);
        registry.kind_mut::<HingeJoint>(joint).unwrap().set_friction(1.0);
        world.step(&mut registry, DT).unwrap();
        assert!(!world.body(body).unwrap().is_sleeping());
    }
}
