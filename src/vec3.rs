// 3D vector and bounded-plane primitives used by the camera geometry.

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Neg, Sub};

/// A vector in 3D space. Serialises to the `{x, y, z}` wire form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Vector3 { x, y, z }
    }

    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Unit vector with the same direction, or None for the null vector.
    pub fn unit(&self) -> Option<Vector3> {
        let magnitude = self.magnitude();
        if magnitude == 0.0 {
            None
        } else {
            Some(Vector3::new(
                self.x / magnitude,
                self.y / magnitude,
                self.z / magnitude,
            ))
        }
    }

    pub fn dot(&self, other: Vector3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(&self, other: Vector3) -> Vector3 {
        Vector3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    /// Angle in radians between two vectors.
    pub fn angle_between(&self, other: Vector3) -> f64 {
        let cosine = self.dot(other) / (self.magnitude() * other.magnitude());
        // Keep rounding error out of acos' domain.
        cosine.clamp(-1.0, 1.0).acos()
    }

    /// Rotates the vector `angle` radians around the Z axis. The simulation
    /// only ever rotates about Z, so a general rotation is not needed.
    pub fn rotate_around_z(&self, angle: f64) -> Vector3 {
        Vector3::new(
            self.x * angle.cos() - self.y * angle.sin(),
            self.x * angle.sin() + self.y * angle.cos(),
            self.z,
        )
    }
}

impl Add for Vector3 {
    type Output = Vector3;

    fn add(self, other: Vector3) -> Vector3 {
        Vector3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

impl Sub for Vector3 {
    type Output = Vector3;

    fn sub(self, other: Vector3) -> Vector3 {
        Vector3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

impl Neg for Vector3 {
    type Output = Vector3;

    fn neg(self) -> Vector3 {
        Vector3::new(-self.x, -self.y, -self.z)
    }
}

impl Mul<f64> for Vector3 {
    type Output = Vector3;

    fn mul(self, constant: f64) -> Vector3 {
        Vector3::new(self.x * constant, self.y * constant, self.z * constant)
    }
}

/// A bounded plane in vector form: corner point `j` plus two edge vectors `u`
/// and `v`. The corner ordering used throughout makes `u × v` point out of the
/// solid the face belongs to.
#[derive(Debug, Clone, Copy)]
pub struct Plane {
    pub j: Vector3,
    pub u: Vector3,
    pub v: Vector3,
}

impl Plane {
    /// Builds the plane from three corners of a face.
    pub fn from_corners(bottom_left: Vector3, bottom_right: Vector3, top_left: Vector3) -> Plane {
        Plane {
            j: bottom_left,
            u: bottom_right - bottom_left,
            v: top_left - bottom_left,
        }
    }

    pub fn normal(&self) -> Vector3 {
        self.u.cross(self.v)
    }

    /// True when the outward normal points towards the camera, i.e. the face
    /// could be visible from there.
    pub fn is_facing(&self, camera_position: Vector3) -> bool {
        (camera_position - self.j).dot(self.normal()) > 0.0
    }

    /// True when the bounded face obstructs the segment between the camera and
    /// `point`. Lines parallel to the plane never obstruct.
    pub fn obstructs(&self, point: Vector3, camera_position: Vector3) -> bool {
        let direction = point - camera_position;
        let normal = self.normal();
        let denominator = normal.dot(direction);
        if denominator == 0.0 {
            return false;
        }
        // camera + lambda * direction lies on the plane.
        let lambda = (self.j.dot(normal) - normal.dot(camera_position)) / denominator;
        if lambda <= 0.0 || lambda >= 1.0 {
            return false;
        }
        let hit = camera_position + direction * lambda - self.j;
        let mu = hit.dot(self.u) / self.u.magnitude().powi(2);
        if mu <= 0.0 || mu >= 1.0 {
            return false;
        }
        let nu = hit.dot(self.v) / self.v.magnitude().powi(2);
        nu > 0.0 && nu < 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_arithmetic_operators() {
        let a = Vector3::new(1.0, 2.0, 3.0);
        let b = Vector3::new(4.0, -5.0, 6.0);
        assert_eq!(a + b, Vector3::new(5.0, -3.0, 9.0));
        assert_eq!(a - b, Vector3::new(-3.0, 7.0, -3.0));
        assert_eq!(-a, Vector3::new(-1.0, -2.0, -3.0));
        assert_eq!(a * 2.0, Vector3::new(2.0, 4.0, 6.0));
    }

    #[test]
    fn test_magnitude_and_unit() {
        let v = Vector3::new(3.0, 4.0, 0.0);
        assert_approx_eq!(v.magnitude(), 5.0);
        let unit = v.unit().unwrap();
        assert_approx_eq!(unit.magnitude(), 1.0);
        assert_approx_eq!(unit.x, 0.6);
        assert_approx_eq!(unit.y, 0.8);
        assert_eq!(Vector3::new(0.0, 0.0, 0.0).unit(), None);
    }

    #[test]
    fn test_dot_and_cross() {
        let a = Vector3::new(1.0, 0.0, 0.0);
        let b = Vector3::new(0.0, 1.0, 0.0);
        assert_approx_eq!(a.dot(b), 0.0);
        assert_eq!(a.cross(b), Vector3::new(0.0, 0.0, 1.0));
        assert_eq!(b.cross(a), Vector3::new(0.0, 0.0, -1.0));
        // The cross product is perpendicular to both inputs.
        let c = Vector3::new(1.0, 2.0, 3.0);
        let d = Vector3::new(-2.0, 0.5, 4.0);
        let cross = c.cross(d);
        assert_approx_eq!(cross.dot(c), 0.0);
        assert_approx_eq!(cross.dot(d), 0.0);
    }

    #[test]
    fn test_angle_between() {
        let a = Vector3::new(1.0, 0.0, 0.0);
        assert_approx_eq!(a.angle_between(Vector3::new(0.0, 1.0, 0.0)), FRAC_PI_2);
        assert_approx_eq!(a.angle_between(Vector3::new(-2.0, 0.0, 0.0)), PI);
        assert_approx_eq!(a.angle_between(Vector3::new(5.0, 0.0, 0.0)), 0.0);
    }

    #[test]
    fn test_rotate_around_z() {
        let rotated = Vector3::new(1.0, 0.0, 7.0).rotate_around_z(FRAC_PI_2);
        assert_approx_eq!(rotated.x, 0.0);
        assert_approx_eq!(rotated.y, 1.0);
        assert_approx_eq!(rotated.z, 7.0);
    }

    #[test]
    fn test_plane_normal_and_facing() {
        // Unit square in the y-z plane at x = 0, normal pointing towards -x.
        let plane = Plane::from_corners(
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(0.0, 1.0, 0.0),
        );
        let normal = plane.normal();
        assert!(normal.x < 0.0);
        assert_approx_eq!(normal.y, 0.0);
        assert_approx_eq!(normal.z, 0.0);
        assert!(plane.is_facing(Vector3::new(-2.0, 0.5, 0.5)));
        assert!(!plane.is_facing(Vector3::new(2.0, 0.5, 0.5)));
    }

    #[test]
    fn test_plane_obstruction() {
        // Unit square at x = 1 spanning y, z in [0, 1].
        let plane = Plane::from_corners(
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(1.0, 1.0, 0.0),
            Vector3::new(1.0, 0.0, 1.0),
        );
        let camera = Vector3::new(0.0, 0.5, 0.5);
        // Segment passes through the middle of the face.
        assert!(plane.obstructs(Vector3::new(2.0, 0.5, 0.5), camera));
        // Segment ends before reaching the plane.
        assert!(!plane.obstructs(Vector3::new(0.5, 0.5, 0.5), camera));
        // Segment passes outside the bounded face.
        assert!(!plane.obstructs(Vector3::new(2.0, 3.0, 0.5), camera));
        // Segment parallel to the plane.
        assert!(!plane.obstructs(Vector3::new(0.0, 3.0, 0.5), camera));
    }
}
