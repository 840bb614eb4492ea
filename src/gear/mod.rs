//! 齿轮耦合
//!
//! 把两个关节的主 DOF 速率按比例绑定：B 的目标速率 = ratio × A 的速率。
//! 耦合本身不提交约束行，只是元数据；由注册表在提交前把
//! A 上一步的测量速率交给 B 的行构造。
//!
//! 可齿轮的类型组合（顺序不限）：
//!
//! | 类型 | 可配对 |
//! |------|--------|
//! | Hinge | Hinge, Motor, Servo, Slider, Piston, Spring, CurvySlider, CurvyPiston |
//! | Slider | Motor, Servo, Slider, Piston, Spring, CurvySlider, CurvyPiston |
//! | CurvySlider | Motor, Servo, Piston, Spring, CurvySlider, CurvyPiston |
//! | Motor | Motor, Servo, Piston, Spring, CurvyPiston |
//! | Servo | Servo, Piston, Spring, CurvyPiston |
//! | Piston | Piston, Spring, CurvyPiston |
//! | Spring | Spring, CurvyPiston |
//! | CurvyPiston | CurvyPiston |

use crate::joint::{DofState, JointKind};
use crate::registry::JointHandle;
use crate::{JointError, Result};

use JointKind::*;

/// 齿轮配对表（每行：类型，及其可配对的类型）
const GEAR_TABLE: &[(JointKind, &[JointKind])] = &[
    (Hinge, &[Hinge, Motor, Servo, Slider, Piston, Spring, CurvySlider, CurvyPiston]),
    (Slider, &[Motor, Servo, Slider, Piston, Spring, CurvySlider, CurvyPiston]),
    (CurvySlider, &[Motor, Servo, Piston, Spring, CurvySlider, CurvyPiston]),
    (Motor, &[Motor, Servo, Piston, Spring, CurvyPiston]),
    (Servo, &[Servo, Piston, Spring, CurvyPiston]),
    (Piston, &[Piston, Spring, CurvyPiston]),
    (Spring, &[Spring, CurvyPiston]),
    (CurvyPiston, &[CurvyPiston]),
];

/// 两种类型能否齿轮耦合（顺序不限）
pub fn can_gear(a: JointKind, b: JointKind) -> bool {
    let listed = |x: JointKind, y: JointKind| {
        GEAR_TABLE
            .iter()
            .any(|(kind, partners)| *kind == x && partners.contains(&y))
    };
    listed(a, b) || listed(b, a)
}

/// 齿轮耦合
#[derive(Clone, Debug)]
pub struct GearCoupling {
    a: JointHandle,
    b: JointHandle,
    ratio: f32,
    /// 创建时两侧的位置，作为零点
    reference_a: f32,
    reference_b: f32,
    pub user_data: u64,
}

impl GearCoupling {
    pub(crate) fn new(
        a: JointHandle,
        b: JointHandle,
        ratio: f32,
        reference_a: f32,
        reference_b: f32,
    ) -> Self {
        Self {
            a,
            b,
            ratio,
            reference_a,
            reference_b,
            user_data: 0,
        }
    }

    /// (主动, 从动)
    pub fn members(&self) -> (JointHandle, JointHandle) {
        (self.a, self.b)
    }

    pub fn involves(&self, joint: JointHandle) -> bool {
        self.a == joint || self.b == joint
    }

    /// 另一侧关节；joint 不是成员时返回 None
    pub fn partner(&self, joint: JointHandle) -> Option<JointHandle> {
        if joint == self.a {
            Some(self.b)
        } else if joint == self.b {
            Some(self.a)
        } else {
            None
        }
    }

    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    /// 设置比例（有限值，可为负）
    pub fn set_ratio(&mut self, ratio: f32) -> Result<()> {
        if !ratio.is_finite() {
            return Err(JointError::InvalidArgument(format!(
                "gear ratio must be finite, got {}",
                ratio
            )));
        }
        self.ratio = ratio;
        Ok(())
    }

    /// 从动侧的目标速率
    pub fn target_rate(&self, rate_a: f32) -> f32 {
        self.ratio * rate_a
    }

    /// 相位误差：B 相对零点的位移 - ratio × A 相对零点的位移
    pub fn phase_error(&self, a: &DofState, b: &DofState) -> f32 {
        (b.position - self.reference_b) - self.ratio * (a.position - self.reference_a)
    }

    pub fn references(&self) -> (f32, f32) {
        (self.reference_a, self.reference_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gear_table_symmetric_lookup() {
        assert!(can_gear(Hinge, Slider));
        assert!(can_gear(Slider, Hinge));
        assert!(can_gear(CurvyPiston, Hinge));
        assert!(!can_gear(Hinge, BallAndSocket));
        assert!(!can_gear(CurvySlider, Fixed));
        assert!(!can_gear(Universal, Universal));
    }

    #[test]
    fn test_every_geared_kind_pairs_with_curvy_piston() {
        for (kind, _) in GEAR_TABLE {
            assert!(can_gear(*kind, CurvyPiston), "{} should gear with CurvyPiston", kind);
        }
    }

    #[test]
    fn test_non_gearable_kinds() {
        for kind in [BallAndSocket, Corkscrew, Fixed, Plane, PointToPoint, Universal, UpVector] {
            for other in JointKind::ALL {
                assert!(!can_gear(kind, other));
            }
        }
    }
}
