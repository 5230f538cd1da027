use std::ops::{Add, AddAssign, Mul, Sub};

/// A 3-element geometric vector (spec §3), stored as a plain `[f64; 3]`
/// rather than pulling in a generic linear-algebra crate: the core only
/// ever needs 3-vectors and 3x3 matrices, and the original's `vector_type`
/// is exactly this, no more.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub v: [f64; 3],
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { v: [0.0, 0.0, 0.0] };

    #[inline]
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Vec3 { v: [x, y, z] }
    }

    #[inline]
    pub fn x(&self) -> f64 {
        self.v[0]
    }
    #[inline]
    pub fn y(&self) -> f64 {
        self.v[1]
    }
    #[inline]
    pub fn z(&self) -> f64 {
        self.v[2]
    }

    pub fn dot(&self, other: &Vec3) -> f64 {
        self.v[0] * other.v[0] + self.v[1] * other.v[1] + self.v[2] * other.v[2]
    }

    pub fn cross(&self, other: &Vec3) -> Vec3 {
        Vec3::new(
            self.v[1] * other.v[2] - self.v[2] * other.v[1],
            self.v[2] * other.v[0] - self.v[0] * other.v[2],
            self.v[0] * other.v[1] - self.v[1] * other.v[0],
        )
    }

    pub fn magnitude(&self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Returns a unit vector in the same direction, or `None` if this
    /// vector is (numerically) zero.
    pub fn normalize(&self) -> Option<Vec3> {
        let mag = self.magnitude();
        if mag < 1.0e-12 {
            None
        } else {
            Some(*self * (1.0 / mag))
        }
    }

    /// In-place weighted accumulation: `self += other * weight`. Mirrors
    /// `add_weighted_vector` from the original fusion code, used by the
    /// priority-weighted averages of spec §4.B.
    pub fn add_weighted(&mut self, other: &Vec3, weight: f64) {
        self.v[0] += other.v[0] * weight;
        self.v[1] += other.v[1] * weight;
        self.v[2] += other.v[2] * weight;
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.v[0] + rhs.v[0], self.v[1] + rhs.v[1], self.v[2] + rhs.v[2])
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Vec3) {
        self.v[0] += rhs.v[0];
        self.v[1] += rhs.v[1];
        self.v[2] += rhs.v[2];
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.v[0] - rhs.v[0], self.v[1] - rhs.v[1], self.v[2] - rhs.v[2])
    }
}

impl Mul<f64> for Vec3 {
    type Output = Vec3;
    fn mul(self, s: f64) -> Vec3 {
        Vec3::new(self.v[0] * s, self.v[1] * s, self.v[2] * s)
    }
}

/// A 3x3 matrix, row-major (spec §3). Used for per-modality axis-alignment
/// (§4.A) and the attitude output's orthonormal basis (§3).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat3 {
    pub m: [[f64; 3]; 3],
}

impl Mat3 {
    pub const IDENTITY: Mat3 = Mat3 {
        m: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
    };

    pub fn from_rows(r0: [f64; 3], r1: [f64; 3], r2: [f64; 3]) -> Self {
        Mat3 { m: [r0, r1, r2] }
    }

    pub fn mul_vec(&self, v: &Vec3) -> Vec3 {
        Vec3::new(
            self.m[0][0] * v.v[0] + self.m[0][1] * v.v[1] + self.m[0][2] * v.v[2],
            self.m[1][0] * v.v[0] + self.m[1][1] * v.v[1] + self.m[1][2] * v.v[2],
            self.m[2][0] * v.v[0] + self.m[2][1] * v.v[1] + self.m[2][2] * v.v[2],
        )
    }

    pub fn mul_mat(&self, other: &Mat3) -> Mat3 {
        let mut out = [[0.0; 3]; 3];
        for i in 0..3 {
            for j in 0..3 {
                let mut acc = 0.0;
                for k in 0..3 {
                    acc += self.m[i][k] * other.m[k][j];
                }
                out[i][j] = acc;
            }
        }
        Mat3 { m: out }
    }

    pub fn transpose(&self) -> Mat3 {
        let mut out = [[0.0; 3]; 3];
        for i in 0..3 {
            for j in 0..3 {
                out[j][i] = self.m[i][j];
            }
        }
        Mat3 { m: out }
    }

    /// Parse from nine whitespace-separated doubles, the on-disk format
    /// used by the per-sensor `axis_alignment` config file (spec §6).
    pub fn from_whitespace_separated(s: &str) -> Option<Mat3> {
        let vals: Vec<f64> = s.split_whitespace().filter_map(|t| t.parse().ok()).collect();
        if vals.len() != 9 {
            return None;
        }
        Some(Mat3::from_rows(
            [vals[0], vals[1], vals[2]],
            [vals[3], vals[4], vals[5]],
            [vals[6], vals[7], vals[8]],
        ))
    }

    pub fn to_whitespace_separated(&self) -> String {
        let mut parts = Vec::with_capacity(9);
        for row in &self.m {
            for val in row {
                parts.push(format!("{val}"));
            }
        }
        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn cross_product_orthogonal() {
        let x = Vec3::new(1.0, 0.0, 0.0);
        let y = Vec3::new(0.0, 1.0, 0.0);
        let z = x.cross(&y);
        assert_relative_eq!(z.z(), 1.0);
        assert_relative_eq!(z.dot(&x), 0.0);
    }

    #[test]
    fn identity_matrix_is_noop() {
        let v = Vec3::new(1.0, 2.0, 3.0);
        let out = Mat3::IDENTITY.mul_vec(&v);
        assert_relative_eq!(out.x(), v.x());
        assert_relative_eq!(out.y(), v.y());
        assert_relative_eq!(out.z(), v.z());
    }

    #[test]
    fn matrix_round_trip_text() {
        let m = Mat3::from_rows([1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]);
        let text = m.to_whitespace_separated();
        let back = Mat3::from_whitespace_separated(&text).unwrap();
        assert_eq!(m, back);
    }
}
