//! Transforms - bone and root placement as exchanged on the link
//!
//! Values here are in scene units (meters). The wire layer owns the
//! centimeter conversion.

/// 3D vector
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };
    pub const ONE: Vec3 = Vec3 { x: 1.0, y: 1.0, z: 1.0 };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn scaled(&self, factor: f32) -> Vec3 {
        Vec3 {
            x: self.x * factor,
            y: self.y * factor,
            z: self.z * factor,
        }
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    pub fn from_array(a: [f32; 3]) -> Self {
        Self::new(a[0], a[1], a[2])
    }
}

/// Rotation quaternion, stored in wire order (x, y, z, w)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quat {
    pub const IDENTITY: Quat = Quat {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    pub fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt()
    }

    pub fn normalized(&self) -> Quat {
        let len = self.length();
        if len <= f32::EPSILON {
            return Quat::IDENTITY;
        }
        Quat {
            x: self.x / len,
            y: self.y / len,
            z: self.z / len,
            w: self.w / len,
        }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.x, self.y, self.z, self.w]
    }
}

/// Translation, rotation and scale of a root or bone
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    /// Number of floats a transform occupies on the wire
    pub const FLOATS: usize = 10;

    pub const IDENTITY: Transform = Transform {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn new(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            translation,
            rotation,
            scale,
        }
    }

    /// Flatten as (tx, ty, tz, rx, ry, rz, rw, sx, sy, sz)
    pub fn to_floats(&self) -> [f32; Self::FLOATS] {
        let t = self.translation;
        let r = self.rotation;
        let s = self.scale;
        [t.x, t.y, t.z, r.x, r.y, r.z, r.w, s.x, s.y, s.z]
    }

    /// Inverse of [`Transform::to_floats`]
    pub fn from_floats(v: &[f32; Self::FLOATS]) -> Self {
        Transform {
            translation: Vec3::new(v[0], v[1], v[2]),
            rotation: Quat::new(v[3], v[4], v[5], v[6]),
            scale: Vec3::new(v[7], v[8], v[9]),
        }
    }

    /// Component-wise comparison within `eps`
    pub fn approx_eq(&self, other: &Transform, eps: f32) -> bool {
        self.to_floats()
            .iter()
            .zip(other.to_floats().iter())
            .all(|(a, b)| (a - b).abs() <= eps)
    }
}
