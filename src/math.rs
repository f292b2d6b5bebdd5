//! 刚体姿态与插值工具
//!
//! 布娃娃内部所有肢体姿态都是刚体变换（缩放恒为 1），
//! 这里用 Pose 表示，避免在每次组合时处理缩放。

use std::ops::Mul;

use glam::{Mat4, Quat, Vec3};

/// 模糊比较的默认容差
pub const EPSILON: f32 = 1e-5;

// ============================================================================
// Pose
// ============================================================================

/// 刚体变换（平移 + 单位旋转）
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub translation: Vec3,
    pub rotation: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Pose {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    #[inline]
    pub fn new(translation: Vec3, rotation: Quat) -> Self {
        Self { translation, rotation }
    }

    #[inline]
    pub fn from_translation(translation: Vec3) -> Self {
        Self { translation, rotation: Quat::IDENTITY }
    }

    #[inline]
    pub fn from_rotation(rotation: Quat) -> Self {
        Self { translation: Vec3::ZERO, rotation }
    }

    /// 逆变换
    #[inline]
    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.inverse();
        Self {
            translation: rotation * -self.translation,
            rotation,
        }
    }

    #[inline]
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.translation + self.rotation * point
    }

    /// 返回旋转归一化后的副本
    #[inline]
    pub fn normalized(mut self) -> Self {
        self.rotation = self.rotation.normalize();
        self
    }

    #[inline]
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.translation)
    }

    /// 从矩阵分解（丢弃缩放）
    #[inline]
    pub fn from_matrix(m: Mat4) -> Self {
        let (_, rotation, translation) = m.to_scale_rotation_translation();
        Self { translation, rotation }
    }

    /// 位置按 t 线性插值，旋转按 t 球面插值（t = 0 返回 self）
    ///
    /// 旋转几乎相同时跳过 slerp，避免除以接近零的夹角。
    pub fn interpolate(&self, other: &Pose, t: f32) -> Pose {
        let translation = self.translation.lerp(other.translation, t);
        let rotation = if quat_fuzzy_equals(self.rotation, other.rotation) {
            other.rotation
        } else {
            self.rotation.slerp(other.rotation, t)
        };
        Pose { translation, rotation }
    }

    pub fn fuzzy_equals(&self, other: &Pose) -> bool {
        self.translation.abs_diff_eq(other.translation, EPSILON)
            && quat_fuzzy_equals(self.rotation, other.rotation)
    }
}

impl Mul for Pose {
    type Output = Pose;

    #[inline]
    fn mul(self, rhs: Pose) -> Pose {
        Pose {
            translation: self.translation + self.rotation * rhs.translation,
            rotation: self.rotation * rhs.rotation,
        }
    }
}

// ============================================================================
// 标量工具
// ============================================================================

#[inline]
pub fn fuzzy_equals(a: f32, b: f32) -> bool {
    (a - b).abs() <= EPSILON
}

/// 两个旋转是否表示同一朝向（q 与 -q 视为相同）
#[inline]
pub fn quat_fuzzy_equals(a: Quat, b: Quat) -> bool {
    a.dot(b).abs() >= 1.0 - EPSILON
}

/// 将 value 从 [in_a, in_b] 线性映射到 [out_a, out_b]，结果钳制在输出区间内
pub fn map_value(value: f32, in_a: f32, in_b: f32, out_a: f32, out_b: f32) -> f32 {
    let span = in_b - in_a;
    if span.abs() <= EPSILON {
        return if value < in_a { out_a } else { out_b };
    }
    let t = ((value - in_a) / span).clamp(0.0, 1.0);
    out_a + (out_b - out_a) * t
}

/// 将 from 方向旋转到 to 方向的最短弧旋转
pub fn shortest_arc(from: Vec3, to: Vec3) -> Quat {
    let from = from.normalize_or_zero();
    let to = to.normalize_or_zero();
    if from == Vec3::ZERO || to == Vec3::ZERO {
        return Quat::IDENTITY;
    }
    Quat::from_rotation_arc(from, to)
}

/// 旋转的夹角（弧度，取最短路径，范围 [0, PI]）
#[inline]
pub fn angle_of(rotation: Quat) -> f32 {
    let w = rotation.w.abs().min(1.0);
    2.0 * w.acos()
}

/// 单帧增量旋转对应的角速度（rad/s）
pub fn rotation_time_derivative(delta: Quat, dt: f32) -> Vec3 {
    if dt <= EPSILON {
        return Vec3::ZERO;
    }
    let delta = if delta.w < 0.0 { -delta } else { delta };
    let (axis, angle) = delta.normalize().to_axis_angle();
    if angle.abs() <= EPSILON {
        return Vec3::ZERO;
    }
    axis * (angle / dt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_pose_inverse() {
        let pose = Pose::new(Vec3::new(1.0, 2.0, 3.0), Quat::from_rotation_y(0.7));
        let identity = pose * pose.inverse();
        assert!(identity.fuzzy_equals(&Pose::IDENTITY));
    }

    #[test]
    fn test_pose_compose_matches_matrix() {
        let a = Pose::new(Vec3::new(0.0, 1.0, 0.0), Quat::from_rotation_z(FRAC_PI_2));
        let b = Pose::from_translation(Vec3::new(1.0, 0.0, 0.0));
        let composed = a * b;
        let from_matrix = Pose::from_matrix(a.to_matrix() * b.to_matrix());
        assert!(composed.fuzzy_equals(&from_matrix));
        assert!((composed.translation - Vec3::new(0.0, 2.0, 0.0)).length() < 1e-4);
    }

    #[test]
    fn test_map_value_clamps() {
        assert!((map_value(0.5, 0.0, 1.0, 10.0, 20.0) - 15.0).abs() < 1e-4);
        assert!((map_value(-1.0, 0.0, 1.0, 10.0, 20.0) - 10.0).abs() < 1e-4);
        assert!((map_value(3.0, 0.0, 1.0, 10.0, 20.0) - 20.0).abs() < 1e-4);
        // 反向输出区间
        assert!((map_value(0.25, 0.0, 1.0, 1.0, 0.1) - 0.775).abs() < 1e-4);
    }

    #[test]
    fn test_rotation_time_derivative() {
        let delta = Quat::from_rotation_x(0.1);
        let velocity = rotation_time_derivative(delta, 0.1);
        assert!((velocity - Vec3::new(1.0, 0.0, 0.0)).length() < 1e-3);

        // 负 w 取最短路径
        let velocity = rotation_time_derivative(-delta, 0.1);
        assert!((velocity - Vec3::new(1.0, 0.0, 0.0)).length() < 1e-3);

        assert_eq!(rotation_time_derivative(Quat::IDENTITY, 0.016), Vec3::ZERO);
    }

    #[test]
    fn test_interpolate_skips_equal_rotation() {
        let a = Pose::new(Vec3::ZERO, Quat::from_rotation_y(0.3));
        let b = Pose::new(Vec3::X, Quat::from_rotation_y(0.3));
        let mid = a.interpolate(&b, 0.5);
        assert!((mid.translation.x - 0.5).abs() < 1e-5);
        assert!(quat_fuzzy_equals(mid.rotation, a.rotation));
    }

    #[test]
    fn test_shortest_arc() {
        let q = shortest_arc(Vec3::X, Vec3::Y);
        assert!((q * Vec3::X - Vec3::Y).length() < 1e-5);
        assert_eq!(shortest_arc(Vec3::ZERO, Vec3::Y), Quat::IDENTITY);
    }
}
