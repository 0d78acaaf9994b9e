//! Math utilities and types
//!
//! Provides the nalgebra aliases used across the dashboard core plus the
//! screen rectangle and the car-space to camera-frame projection.

pub use nalgebra::{Matrix3, Matrix4, Vector2, Vector3, Vector4};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Height of the road camera above the ground plane, in meters.
pub const DEFAULT_CAMERA_HEIGHT: f32 = 1.22;

/// Integer screen rectangle in display pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    /// Left edge
    pub x: i32,
    /// Top edge
    pub y: i32,
    /// Width
    pub w: i32,
    /// Height
    pub h: i32,
}

impl Rect {
    /// Create a new rectangle
    pub const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    /// Horizontal center
    pub const fn center_x(&self) -> i32 {
        self.x + self.w / 2
    }

    /// Vertical center
    pub const fn center_y(&self) -> i32 {
        self.y + self.h / 2
    }

    /// One past the right edge
    pub const fn right(&self) -> i32 {
        self.x + self.w
    }

    /// One past the bottom edge
    pub const fn bottom(&self) -> i32 {
        self.y + self.h
    }

    /// Whether the point lies inside the rectangle
    pub const fn contains_point(&self, px: i32, py: i32) -> bool {
        px >= self.x && px < self.x + self.w && py >= self.y && py < self.y + self.h
    }

    /// Whether `other` is fully inside this rectangle
    pub const fn contains_rect(&self, other: &Self) -> bool {
        other.w >= 0
            && other.h >= 0
            && other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }
}

/// Extrinsic transform of a level camera mounted `DEFAULT_CAMERA_HEIGHT` above the road.
///
/// Car frame is x forward, y left, z up; camera frame is x right, y down, z forward.
pub fn default_extrinsic() -> Mat4 {
    Mat4::new(
        0.0, -1.0, 0.0, 0.0,
        0.0, 0.0, -1.0, DEFAULT_CAMERA_HEIGHT,
        1.0, 0.0, 0.0, 0.0,
        0.0, 0.0, 0.0, 1.0,
    )
}

/// Build an extrinsic matrix from 3 row-major rows of 4; the last row is fixed to `[0, 0, 0, 1]`.
pub fn extrinsic_from_rows(rows: &[f32; 12]) -> Mat4 {
    Mat4::new(
        rows[0], rows[1], rows[2], rows[3],
        rows[4], rows[5], rows[6], rows[7],
        rows[8], rows[9], rows[10], rows[11],
        0.0, 0.0, 0.0, 1.0,
    )
}

/// Pinhole camera intrinsics of the road camera
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    /// Focal length in pixels (square pixels)
    pub focal_length: f32,
    /// Full frame width in pixels
    pub frame_width: f32,
    /// Full frame height in pixels
    pub frame_height: f32,
}

impl CameraIntrinsics {
    /// Principal point, assumed at the frame center
    pub fn principal_point(&self) -> Vec2 {
        Vec2::new(self.frame_width / 2.0, self.frame_height / 2.0)
    }

    /// Intrinsic matrix K
    pub fn matrix(&self) -> Mat3 {
        let c = self.principal_point();
        Mat3::new(
            self.focal_length, 0.0, c.x,
            0.0, self.focal_length, c.y,
            0.0, 0.0, 1.0,
        )
    }

    /// Project a car-space point into full-frame pixel coordinates.
    ///
    /// Returns `None` for points behind the camera or outside the top-left quadrant
    /// bound (negative pixel coordinates), matching what the overlays can show.
    pub fn project(&self, extrinsic: &Mat4, car_space: Vec3) -> Option<Vec2> {
        let ep = extrinsic * Vec4::new(car_space.x, car_space.y, car_space.z, 1.0);
        let kep = self.matrix() * Vec3::new(ep.x, ep.y, ep.z);
        if kep.z <= f32::EPSILON {
            return None;
        }
        let p = Vec2::new(kep.x / kep.z, kep.y / kep.z);
        if !p.x.is_finite() || !p.y.is_finite() || p.x < 0.0 || p.y < 0.0 {
            return None;
        }
        Some(p)
    }
}
