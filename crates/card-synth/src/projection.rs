//! Projection from card-texture pixels to output-frame pixels.
//!
//! The pipeline never depends on a scene graph, only on [`SceneProjector`]:
//! four corners in, four corners out. [`IdentityProjector`] treats texture
//! space as image space; [`FlatProjector`] applies a 3x3 homography built
//! from a random [`CameraPose`].

use nalgebra::{Matrix3, Vector3};
use rand::Rng;
use thiserror::Error;

use crate::config::CameraConfig;

/// Quad corners in pixels, clockwise from top-left.
pub type Corners = [[f64; 2]; 4];

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("homogeneous coordinate vanished")]
    Degenerate,

    #[error("projected coordinates are not finite")]
    NonFinite,

    #[error("projection matrix is not invertible")]
    Singular,
}

/// Maps texture-space corners to output-image corners.
pub trait SceneProjector {
    fn project(&self, corners: &Corners) -> Result<Corners, ProjectionError>;

    /// Size of the image the projected corners refer to.
    fn output_size(&self) -> (u32, u32);
}

/// Texture space is image space.
#[derive(Debug, Clone, Copy)]
pub struct IdentityProjector {
    width: u32,
    height: u32,
}

impl IdentityProjector {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl SceneProjector for IdentityProjector {
    fn project(&self, corners: &Corners) -> Result<Corners, ProjectionError> {
        if corners.iter().flatten().any(|v| !v.is_finite()) {
            return Err(ProjectionError::NonFinite);
        }
        Ok(*corners)
    }

    fn output_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Placement of the card in the frame: uniform scale, rotation about the
/// card center, then translation of that center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    pub scale: f64,
    pub rotation: f64,
    pub center: [f64; 2],
}

impl CameraPose {
    /// Random pose that keeps the whole rotated card inside the frame.
    pub fn random<R: Rng + ?Sized>(
        config: &CameraConfig,
        texture: (u32, u32),
        frame: (u32, u32),
        rng: &mut R,
    ) -> Self {
        let (tw, th) = (texture.0 as f64, texture.1 as f64);
        let (fw, fh) = (frame.0 as f64, frame.1 as f64);
        let margin = config.frame_margin as f64;

        let fill = config.card_fill.sample(rng) as f64;
        let rotation = (config.rotation_degrees.sample(rng) as f64).to_radians();
        let (sin, cos) = (rotation.sin().abs(), rotation.cos().abs());

        // Unit-scale extents of the rotated card
        let ext_w = tw * cos + th * sin;
        let ext_h = tw * sin + th * cos;

        let mut scale = fill * fw / tw;
        let room_w = (fw - 2.0 * margin).max(1.0);
        let room_h = (fh - 2.0 * margin).max(1.0);
        scale = scale.min(room_w / ext_w).min(room_h / ext_h);

        let half_w = scale * ext_w * 0.5;
        let half_h = scale * ext_h * 0.5;
        let center = [
            uniform_or_mid(half_w + margin, fw - half_w - margin, rng),
            uniform_or_mid(half_h + margin, fh - half_h - margin, rng),
        ];
        Self {
            scale,
            rotation,
            center,
        }
    }
}

fn uniform_or_mid<R: Rng + ?Sized>(lo: f64, hi: f64, rng: &mut R) -> f64 {
    if hi > lo {
        rng.random_range(lo..=hi)
    } else {
        (lo + hi) * 0.5
    }
}

/// Homography projector.
#[derive(Debug, Clone, Copy)]
pub struct FlatProjector {
    matrix: Matrix3<f64>,
    width: u32,
    height: u32,
}

impl FlatProjector {
    pub fn new(matrix: Matrix3<f64>, width: u32, height: u32) -> Self {
        Self {
            matrix,
            width,
            height,
        }
    }

    /// `T(center) * R(rotation) * S(scale) * T(-texture_center)`
    pub fn from_pose(pose: &CameraPose, texture: (u32, u32), frame: (u32, u32)) -> Self {
        let (tcx, tcy) = (texture.0 as f64 * 0.5, texture.1 as f64 * 0.5);
        let (sin, cos) = pose.rotation.sin_cos();
        let s = pose.scale;

        #[rustfmt::skip]
        let to_origin = Matrix3::new(
            1.0, 0.0, -tcx,
            0.0, 1.0, -tcy,
            0.0, 0.0, 1.0,
        );
        #[rustfmt::skip]
        let rotate_scale = Matrix3::new(
            s * cos, -s * sin, 0.0,
            s * sin,  s * cos, 0.0,
            0.0,      0.0,     1.0,
        );
        #[rustfmt::skip]
        let to_center = Matrix3::new(
            1.0, 0.0, pose.center[0],
            0.0, 1.0, pose.center[1],
            0.0, 0.0, 1.0,
        );
        Self::new(to_center * rotate_scale * to_origin, frame.0, frame.1)
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    pub fn inverse(&self) -> Result<Matrix3<f64>, ProjectionError> {
        self.matrix.try_inverse().ok_or(ProjectionError::Singular)
    }

    pub fn project_point(&self, x: f64, y: f64) -> Result<[f64; 2], ProjectionError> {
        apply(&self.matrix, x, y)
    }
}

impl SceneProjector for FlatProjector {
    fn project(&self, corners: &Corners) -> Result<Corners, ProjectionError> {
        let mut out = [[0.0; 2]; 4];
        for (dst, src) in out.iter_mut().zip(corners) {
            *dst = apply(&self.matrix, src[0], src[1])?;
        }
        Ok(out)
    }

    fn output_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Homogeneous transform of one point.
pub fn apply(matrix: &Matrix3<f64>, x: f64, y: f64) -> Result<[f64; 2], ProjectionError> {
    let p = matrix * Vector3::new(x, y, 1.0);
    if p.z.abs() < 1e-12 {
        return Err(ProjectionError::Degenerate);
    }
    let out = [p.x / p.z, p.y / p.z];
    if !out[0].is_finite() || !out[1].is_finite() {
        return Err(ProjectionError::NonFinite);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    use crate::config::Span;
    use crate::SynthRng;

    const CARD: (u32, u32) = (1012, 638);
    const FRAME: (u32, u32) = (1024, 1024);

    fn card_corners() -> Corners {
        [[0.0, 0.0], [1012.0, 0.0], [1012.0, 638.0], [0.0, 638.0]]
    }

    #[test]
    fn test_identity_passthrough() {
        let projector = IdentityProjector::new(10, 10);
        let c = [[1.0, 2.0], [3.0, 2.0], [3.0, 4.0], [1.0, 4.0]];
        assert_eq!(projector.project(&c).unwrap(), c);

        let bad = [[f64::NAN, 0.0], [0.0; 2], [0.0; 2], [0.0; 2]];
        assert_eq!(projector.project(&bad), Err(ProjectionError::NonFinite));
    }

    #[test]
    fn test_random_pose_keeps_card_in_frame() {
        let mut rng = SynthRng::seed_from_u64(17);
        let config = CameraConfig {
            rotation_degrees: Span::new(-30.0, 30.0),
            card_fill: Span::new(0.5, 1.0),
            frame_margin: 8,
        };
        for _ in 0..500 {
            let pose = CameraPose::random(&config, CARD, FRAME, &mut rng);
            let projector = FlatProjector::from_pose(&pose, CARD, FRAME);
            for [x, y] in projector.project(&card_corners()).unwrap() {
                assert!((8.0 - 1e-6..=1016.0 + 1e-6).contains(&x), "x = {x}");
                assert!((8.0 - 1e-6..=1016.0 + 1e-6).contains(&y), "y = {y}");
            }
        }
    }

    #[test]
    fn test_pose_maps_texture_center_to_pose_center() {
        let pose = CameraPose {
            scale: 0.5,
            rotation: 0.3,
            center: [400.0, 600.0],
        };
        let projector = FlatProjector::from_pose(&pose, CARD, FRAME);
        let [x, y] = projector.project_point(506.0, 319.0).unwrap();
        assert!((x - 400.0).abs() < 1e-9 && (y - 600.0).abs() < 1e-9);

        let inv = projector.inverse().unwrap();
        let [u, v] = apply(&inv, x, y).unwrap();
        assert!((u - 506.0).abs() < 1e-9 && (v - 319.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_and_singular() {
        let projector = FlatProjector::new(Matrix3::zeros(), 10, 10);
        assert_eq!(
            projector.project(&card_corners()),
            Err(ProjectionError::Degenerate)
        );
        assert_eq!(projector.inverse(), Err(ProjectionError::Singular));
    }
}
