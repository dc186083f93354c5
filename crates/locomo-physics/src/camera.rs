//! Pinhole camera and RGBA frames.

use nalgebra::{Point3, Unit, Vector3};
use serde::{Deserialize, Serialize};

/// A perspective camera placed with a look-at frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// Eye position.
    pub eye: Point3<f64>,
    /// Point the camera looks at.
    pub target: Point3<f64>,
    /// Approximate up direction.
    pub up: Vector3<f64>,
    /// Vertical field of view in radians.
    pub fov_y: f64,
    /// Width over height of the projection.
    pub aspect: f64,
    /// Near clipping distance.
    pub near: f64,
    /// Far clipping distance.
    pub far: f64,
}

impl Camera {
    /// Camera at `eye` looking at `target` with a 90° vertical field of
    /// view, 4:3 aspect and a `[0.01, 1000]` depth range.
    pub fn look_at(eye: Point3<f64>, target: Point3<f64>, up: Vector3<f64>) -> Self {
        Self {
            eye,
            target,
            up,
            fov_y: std::f64::consts::FRAC_PI_2,
            aspect: 4.0 / 3.0,
            near: 0.01,
            far: 1000.0,
        }
    }

    /// Orthonormal `(forward, right, up)` basis of the view.
    ///
    /// Falls back to world z (or world y when looking straight up or down)
    /// when `up` is parallel to the view direction.
    pub fn basis(&self) -> (Unit<Vector3<f64>>, Unit<Vector3<f64>>, Unit<Vector3<f64>>) {
        let forward = Unit::try_new(self.target - self.eye, 1e-12)
            .unwrap_or_else(|| Unit::new_unchecked(Vector3::x()));
        let right = Unit::try_new(forward.cross(&self.up), 1e-9)
            .or_else(|| Unit::try_new(forward.cross(&Vector3::z()), 1e-9))
            .unwrap_or_else(|| Unit::new_normalize(forward.cross(&Vector3::y())));
        let up = Unit::new_normalize(right.cross(&forward));
        (forward, right, up)
    }

    /// Unit direction of the ray through the center of pixel `(px, py)`
    /// of a `width` × `height` image. Row 0 is the top of the image.
    pub fn ray_direction(&self, px: usize, py: usize, width: usize, height: usize) -> Vector3<f64> {
        let (forward, right, up) = self.basis();
        let half_h = (self.fov_y * 0.5).tan();
        let half_w = half_h * self.aspect;
        let sx = (2.0 * (px as f64 + 0.5) / width as f64) - 1.0;
        let sy = 1.0 - (2.0 * (py as f64 + 0.5) / height as f64);
        (forward.into_inner() + right.into_inner() * (sx * half_w) + up.into_inner() * (sy * half_h))
            .normalize()
    }
}

/// An RGBA image with 8 bits per channel, stored row-major from the top.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    /// Width in pixels.
    pub width: usize,
    /// Height in pixels.
    pub height: usize,
    /// `width * height * 4` bytes.
    pub data: Vec<u8>,
}

impl Image {
    /// An image filled with one color.
    pub fn filled(width: usize, height: usize, rgba: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity(width * height * 4);
        for _ in 0..width * height {
            data.extend_from_slice(&rgba);
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Color of pixel `(x, y)`.
    pub fn pixel(&self, x: usize, y: usize) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y * self.width + x) * 4;
        Some([self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]])
    }

    /// Overwrite pixel `(x, y)`. Out-of-range coordinates are ignored.
    pub fn set_pixel(&mut self, x: usize, y: usize, rgba: [u8; 4]) {
        if x < self.width && y < self.height {
            let i = (y * self.width + x) * 4;
            self.data[i..i + 4].copy_from_slice(&rgba);
        }
    }
}
