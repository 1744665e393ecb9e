//! Quaternion and ENU primitives (§4.5) plus the rigid-body transform kernel (§4.6).
//!
//! All arithmetic is in `f32`, matching the reference implementation's precision; this keeps the
//! transform kernel numerically identical to the point/cloud data it operates on.

const VALID_ROTATION_EPSILON: f32 = 1e-4;

/// Orientation as a unit quaternion (w, x, y, z).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Quaternion {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Quaternion {
    pub fn identity() -> Self {
        Self {
            w: 1.0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    }

    /// Builds a unit quaternion from intrinsic Euler angles applied in ZYX order
    /// (yaw `rz`, then pitch `ry`, then roll `rx`), via the standard half-angle formula.
    /// No post-normalization is applied.
    pub fn from_euler(rx: f32, ry: f32, rz: f32) -> Self {
        let (sx, cx) = (rx * 0.5).sin_cos();
        let (sy, cy) = (ry * 0.5).sin_cos();
        let (sz, cz) = (rz * 0.5).sin_cos();

        Self {
            w: cx * cy * cz + sx * sy * sz,
            x: sx * cy * cz - cx * sy * sz,
            y: cx * sy * cz + sx * cy * sz,
            z: cx * cy * sz - sx * sy * cz,
        }
    }

    pub fn conjugate(self) -> Self {
        Self {
            w: self.w,
            x: -self.x,
            y: -self.y,
            z: -self.z,
        }
    }

    pub fn norm_squared(self) -> f32 {
        self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z
    }

    /// True iff the squared norm lies strictly within `(1 - eps, 1 + eps)`.
    pub fn is_valid_rotation(self) -> bool {
        let norm_sq = self.norm_squared();
        norm_sq > 1.0 - VALID_ROTATION_EPSILON && norm_sq < 1.0 + VALID_ROTATION_EPSILON
    }

    /// Active rotation of a vector by this quaternion.
    pub fn rotate(self, v: [f32; 3]) -> [f32; 3] {
        let qv = [self.x, self.y, self.z];
        let t = scale(cross(qv, v), 2.0);
        let wt = scale(t, self.w);
        add(add(v, wt), cross(qv, t))
    }
}

fn cross(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn add(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

fn sub(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn scale(a: [f32; 3], s: f32) -> [f32; 3] {
    [a[0] * s, a[1] * s, a[2] * s]
}

/// World-frame position in local-tangent-plane ENU coordinates, meters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EnuPosition {
    pub east_meters: f32,
    pub north_meters: f32,
    pub up_meters: f32,
}

impl EnuPosition {
    pub fn as_array(self) -> [f32; 3] {
        [self.east_meters, self.north_meters, self.up_meters]
    }

    pub fn from_array(a: [f32; 3]) -> Self {
        Self {
            east_meters: a[0],
            north_meters: a[1],
            up_meters: a[2],
        }
    }
}

/// Euclidean distance between two ENU positions.
pub fn enu_distance(a: EnuPosition, b: EnuPosition) -> f32 {
    let dx = a.east_meters - b.east_meters;
    let dy = a.north_meters - b.north_meters;
    let dz = a.up_meters - b.up_meters;
    (dx * dx + dy * dy + dz * dz).sqrt()
}

/// An (orientation, position) pair expressing a sensor's pose relative to the ENU reference.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EnuFix {
    pub orientation: Quaternion,
    pub position: EnuPosition,
}

/// Column-major 4x4 matrix, so that `Mat4::transform_point` applied to `(x,y,z,1)` matches a
/// `M * (x,y,z,1)^T` multiplication.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat4(pub [f32; 16]);

impl Mat4 {
    pub fn identity() -> Self {
        let mut m = [0.0; 16];
        m[0] = 1.0;
        m[5] = 1.0;
        m[10] = 1.0;
        m[15] = 1.0;
        Mat4(m)
    }

    fn from_quat(q: Quaternion) -> Self {
        let (w, x, y, z) = (q.w, q.x, q.y, q.z);
        let (xx, yy, zz) = (x * x, y * y, z * z);
        let (xy, xz, yz) = (x * y, x * z, y * z);
        let (wx, wy, wz) = (w * x, w * y, w * z);

        // Column-major: column 0 is (m[0], m[1], m[2], m[3]).
        Mat4([
            1.0 - 2.0 * (yy + zz),
            2.0 * (xy + wz),
            2.0 * (xz - wy),
            0.0,
            2.0 * (xy - wz),
            1.0 - 2.0 * (xx + zz),
            2.0 * (yz + wx),
            0.0,
            2.0 * (xz + wy),
            2.0 * (yz - wx),
            1.0 - 2.0 * (xx + yy),
            0.0,
            0.0,
            0.0,
            0.0,
            1.0,
        ])
    }

    fn from_translation(v: [f32; 3]) -> Self {
        let mut m = Self::identity();
        m.0[12] = v[0];
        m.0[13] = v[1];
        m.0[14] = v[2];
        m
    }

    /// Column-major matrix multiplication: `self * rhs`.
    pub fn mul(&self, rhs: &Mat4) -> Mat4 {
        let a = &self.0;
        let b = &rhs.0;
        let mut out = [0.0f32; 16];
        for col in 0..4 {
            for row in 0..4 {
                let mut sum = 0.0;
                for k in 0..4 {
                    sum += a[k * 4 + row] * b[col * 4 + k];
                }
                out[col * 4 + row] = sum;
            }
        }
        Mat4(out)
    }

    pub fn transform_point(&self, p: [f32; 3]) -> [f32; 3] {
        let m = &self.0;
        [
            m[0] * p[0] + m[4] * p[1] + m[8] * p[2] + m[12],
            m[1] * p[0] + m[5] * p[1] + m[9] * p[2] + m[13],
            m[2] * p[0] + m[6] * p[1] + m[10] * p[2] + m[14],
        ]
    }
}

/// Transforms a point captured under pose `from` into the frame of pose `to` (§4.6):
/// rotate by `from.orientation`, translate into world ENU by `from.position`, subtract
/// `to.position`, rotate by the conjugate of `to.orientation`.
pub fn transform_point(p: [f32; 3], from: &EnuFix, to: &EnuFix) -> [f32; 3] {
    let rotated = from.orientation.rotate(p);
    let world = add(rotated, from.position.as_array());
    let relative = sub(world, to.position.as_array());
    to.orientation.conjugate().rotate(relative)
}

/// The 4x4 matrix equivalent to [`transform_point`], composed right-to-left so that
/// `M * (x,y,z,1)^T` yields the same result.
pub fn transform_matrix(from: &EnuFix, to: &EnuFix) -> Mat4 {
    let rotate_from = Mat4::from_quat(from.orientation);
    let translate_into_world = Mat4::from_translation(from.position.as_array());
    let translate_out = Mat4::from_translation(scale(to.position.as_array(), -1.0));
    let rotate_to_conj = Mat4::from_quat(to.orientation.conjugate());

    rotate_to_conj
        .mul(&translate_out)
        .mul(&translate_into_world)
        .mul(&rotate_from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_quaternion_is_valid_and_is_noop() {
        let q = Quaternion::identity();
        assert!(q.is_valid_rotation());
        assert_eq!(q.rotate([1.0, 2.0, 3.0]), [1.0, 2.0, 3.0]);
    }

    #[test]
    fn from_euler_yaw_quarter_turn_rotates_x_to_y() {
        let q = Quaternion::from_euler(0.0, 0.0, std::f32::consts::FRAC_PI_2);
        let rotated = q.rotate([1.0, 0.0, 0.0]);
        assert!((rotated[0]).abs() < 1e-5);
        assert!((rotated[1] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn zero_quaternion_is_invalid() {
        let q = Quaternion {
            w: 0.0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        };
        assert!(!q.is_valid_rotation());
    }

    #[test]
    fn enu_distance_is_euclidean() {
        let a = EnuPosition {
            east_meters: 0.0,
            north_meters: 0.0,
            up_meters: 0.0,
        };
        let b = EnuPosition {
            east_meters: 3.0,
            north_meters: 4.0,
            up_meters: 0.0,
        };
        assert_eq!(enu_distance(a, b), 5.0);
    }

    #[test]
    fn transform_point_matches_equivalent_matrix() {
        let from = EnuFix {
            orientation: Quaternion::from_euler(0.0, 0.0, 0.3),
            position: EnuPosition {
                east_meters: 1.0,
                north_meters: 2.0,
                up_meters: 0.5,
            },
        };
        let to = EnuFix {
            orientation: Quaternion::from_euler(0.0, 0.0, -0.2),
            position: EnuPosition {
                east_meters: -1.5,
                north_meters: 0.5,
                up_meters: 0.0,
            },
        };
        let p = [12.33, 1.17, 11.97];

        let direct = transform_point(p, &from, &to);
        let via_matrix = transform_matrix(&from, &to).transform_point(p);

        for i in 0..3 {
            assert!(
                (direct[i] - via_matrix[i]).abs() < 1e-3,
                "component {i}: {direct:?} vs {via_matrix:?}"
            );
        }
    }

    #[test]
    fn transform_point_is_identity_for_same_pose() {
        let fix = EnuFix {
            orientation: Quaternion::from_euler(0.1, 0.2, 0.3),
            position: EnuPosition {
                east_meters: 5.0,
                north_meters: -3.0,
                up_meters: 2.0,
            },
        };
        let p = [1.0, 2.0, 3.0];
        let result = transform_point(p, &fix, &fix);
        for i in 0..3 {
            assert!((result[i] - p[i]).abs() < 1e-4);
        }
    }
}
