//! # Poses, primitive geometry and inertia
//!
//! Robot-description conventions throughout: positions in meters, rotations
//! as fixed-axis roll/pitch/yaw in radians (`R = Rz(yaw) * Ry(pitch) * Rx(roll)`).

use nalgebra::{Matrix3, Matrix4, Rotation3, Translation3, Vector3};
use serde::{Deserialize, Serialize};

/// Tolerance used when deciding whether a pose or scale is an identity
pub const IDENTITY_EPSILON: f64 = 1e-9;

/// Rigid pose: translation plus roll/pitch/yaw
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub xyz: [f64; 3],
    pub rpy: [f64; 3],
}

impl Pose {
    pub fn new(xyz: [f64; 3], rpy: [f64; 3]) -> Self {
        Self { xyz, rpy }
    }

    pub fn from_xyz(xyz: [f64; 3]) -> Self {
        Self { xyz, rpy: [0.0; 3] }
    }

    pub fn rotation(&self) -> Rotation3<f64> {
        Rotation3::from_euler_angles(self.rpy[0], self.rpy[1], self.rpy[2])
    }

    pub fn to_matrix(&self) -> Matrix4<f64> {
        let translation = Translation3::new(self.xyz[0], self.xyz[1], self.xyz[2]);
        translation.to_homogeneous() * self.rotation().to_homogeneous()
    }

    /// Recover the rigid part of an affine matrix, discarding any scale
    pub fn from_matrix(matrix: &Matrix4<f64>) -> Self {
        decompose(matrix).pose
    }

    pub fn is_identity(&self) -> bool {
        self.xyz.iter().chain(self.rpy.iter()).all(|v| v.abs() <= IDENTITY_EPSILON)
    }
}

/// Result of splitting an affine matrix into translation, rotation and scale
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decomposed {
    pub pose: Pose,
    pub scale: [f64; 3],
}

/// Split `matrix` into a rigid pose and per-axis scale.
///
/// Scale is the length of each basis column; a negative determinant flips the
/// sign of the x factor so the remaining rotation is proper.
pub fn decompose(matrix: &Matrix4<f64>) -> Decomposed {
    let basis: Matrix3<f64> = matrix.fixed_view::<3, 3>(0, 0).into_owned();
    let mut scale = [
        basis.column(0).norm(),
        basis.column(1).norm(),
        basis.column(2).norm(),
    ];
    if basis.determinant() < 0.0 {
        scale[0] = -scale[0];
    }

    let mut unit = basis;
    for (axis, factor) in scale.iter().enumerate() {
        if factor.abs() > IDENTITY_EPSILON {
            let column = unit.column(axis) / *factor;
            unit.set_column(axis, &column);
        } else {
            let mut column = Vector3::zeros();
            column[axis] = 1.0;
            unit.set_column(axis, &column);
        }
    }

    let rotation = Rotation3::from_matrix(&unit);
    let (roll, pitch, yaw) = rotation.euler_angles();

    Decomposed {
        pose: Pose {
            xyz: [matrix[(0, 3)], matrix[(1, 3)], matrix[(2, 3)]],
            rpy: [roll, pitch, yaw],
        },
        scale,
    }
}

pub fn scale_matrix(scale: [f64; 3]) -> Matrix4<f64> {
    Matrix4::new_nonuniform_scaling(&Vector3::new(scale[0], scale[1], scale[2]))
}

pub fn is_unit_scale(scale: [f64; 3]) -> bool {
    scale.iter().all(|s| (s - 1.0).abs() <= IDENTITY_EPSILON)
}

/// Primitive shape carried by visual/collision entries and primitive nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Geometry {
    Box {
        size: [f64; 3],
    },
    Sphere {
        radius: f64,
    },
    Cylinder {
        radius: f64,
        length: f64,
    },
    Mesh {
        filename: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scale: Option<[f64; 3]>,
    },
}

impl Geometry {
    /// Apply a per-axis scale factor.
    ///
    /// Boxes scale per axis, spheres by the largest factor, cylinders by
    /// max(x, y) radially and z axially. Meshes keep their file and carry the
    /// combined scale vector instead.
    pub fn scaled(&self, scale: [f64; 3]) -> Geometry {
        let [sx, sy, sz] = scale.map(f64::abs);
        match self {
            Geometry::Box { size } => Geometry::Box {
                size: [size[0] * sx, size[1] * sy, size[2] * sz],
            },
            Geometry::Sphere { radius } => Geometry::Sphere {
                radius: radius * sx.max(sy).max(sz),
            },
            Geometry::Cylinder { radius, length } => Geometry::Cylinder {
                radius: radius * sx.max(sy),
                length: length * sz,
            },
            Geometry::Mesh { filename, scale: existing } => {
                let base = existing.unwrap_or([1.0; 3]);
                let combined = [base[0] * sx, base[1] * sy, base[2] * sz];
                let scale = if existing.is_none() && is_unit_scale(combined) {
                    None
                } else {
                    Some(combined)
                };
                Geometry::Mesh {
                    filename: filename.clone(),
                    scale,
                }
            }
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Geometry::Box { .. } => "box",
            Geometry::Sphere { .. } => "sphere",
            Geometry::Cylinder { .. } => "cylinder",
            Geometry::Mesh { .. } => "mesh",
        }
    }
}

/// Symmetric inertia tensor (upper triangle)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Inertia {
    pub ixx: f64,
    pub ixy: f64,
    pub ixz: f64,
    pub iyy: f64,
    pub iyz: f64,
    pub izz: f64,
}

impl Inertia {
    pub fn diagonal(values: [f64; 3]) -> Self {
        Self {
            ixx: values[0],
            iyy: values[1],
            izz: values[2],
            ..Self::default()
        }
    }

    /// Inertia of the same mass stretched by a per-axis scale.
    ///
    /// Works through the second moments of the mass distribution, which
    /// scale with the square of their axis factor.
    pub fn scaled(&self, scale: [f64; 3]) -> Inertia {
        let [sx, sy, sz] = scale;
        let mxx = (self.iyy + self.izz - self.ixx) / 2.0 * sx * sx;
        let myy = (self.ixx + self.izz - self.iyy) / 2.0 * sy * sy;
        let mzz = (self.ixx + self.iyy - self.izz) / 2.0 * sz * sz;

        Inertia {
            ixx: myy + mzz,
            iyy: mxx + mzz,
            izz: mxx + myy,
            ixy: self.ixy * sx * sy,
            ixz: self.ixz * sx * sz,
            iyz: self.iyz * sy * sz,
        }
    }
}

/// Inertial block of a link
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Inertial {
    pub origin: Pose,
    pub mass: f64,
    pub inertia: Inertia,
}
