//! Frame rendering: backdrop plus the card texture warped into place.

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use rand::Rng;

use crate::assets::AssetLibrary;
use crate::projection::{apply, FlatProjector, ProjectionError, SceneProjector};

/// Backdrop for one frame.
///
/// A random skybox resized to cover the frame and rolled horizontally, or
/// a dark vertical gradient when no skybox is available.
pub fn backdrop<R: Rng + ?Sized>(library: &AssetLibrary, width: u32, height: u32, rng: &mut R) -> RgbaImage {
    match library.skyboxes.try_pick(rng) {
        Some(sky) => {
            let filled = resize_to_fill(sky, width, height);
            let shift = rng.random_range(0..width.max(1));
            roll_horizontal(&filled, shift)
        }
        None => gradient(width, height, rng),
    }
}

fn resize_to_fill(src: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    let (sw, sh) = src.dimensions();
    let scale = (width as f32 / sw as f32).max(height as f32 / sh as f32);
    let rw = ((sw as f32 * scale).ceil() as u32).max(width);
    let rh = ((sh as f32 * scale).ceil() as u32).max(height);
    let resized = imageops::resize(src, rw, rh, FilterType::Triangle);
    imageops::crop_imm(&resized, (rw - width) / 2, (rh - height) / 2, width, height).to_image()
}

fn roll_horizontal(src: &RgbaImage, shift: u32) -> RgbaImage {
    let (w, h) = src.dimensions();
    RgbaImage::from_fn(w, h, |x, y| *src.get_pixel((x + shift) % w, y))
}

fn gradient<R: Rng + ?Sized>(width: u32, height: u32, rng: &mut R) -> RgbaImage {
    let top: [f32; 3] = std::array::from_fn(|_| rng.random_range(0.05..=0.35));
    let bottom: [f32; 3] = std::array::from_fn(|_| rng.random_range(0.0..=0.15));
    let denom = height.saturating_sub(1).max(1) as f32;
    RgbaImage::from_fn(width, height, |_, y| {
        let t = y as f32 / denom;
        let c = |i: usize| ((top[i] + (bottom[i] - top[i]) * t) * 255.0).round() as u8;
        Rgba([c(0), c(1), c(2), 255])
    })
}

/// Warp the card texture into the frame over `backdrop`.
///
/// Output pixels are mapped back through the inverse homography and sampled
/// bilinearly; only the projected card's bounding box is visited.
pub fn render_frame(
    texture: &RgbaImage,
    projector: &FlatProjector,
    mut backdrop: RgbaImage,
) -> Result<RgbaImage, ProjectionError> {
    let inverse = projector.inverse()?;
    let (tw, th) = (texture.width() as f64, texture.height() as f64);
    let quad = projector.project(&[[0.0, 0.0], [tw, 0.0], [tw, th], [0.0, th]])?;

    let (fw, fh) = backdrop.dimensions();
    let min_x = quad.iter().map(|p| p[0]).fold(f64::INFINITY, f64::min).floor().max(0.0) as u32;
    let min_y = quad.iter().map(|p| p[1]).fold(f64::INFINITY, f64::min).floor().max(0.0) as u32;
    let max_x = quad.iter().map(|p| p[0]).fold(f64::NEG_INFINITY, f64::max).ceil().min(fw as f64) as u32;
    let max_y = quad.iter().map(|p| p[1]).fold(f64::NEG_INFINITY, f64::max).ceil().min(fh as f64) as u32;

    for y in min_y..max_y {
        for x in min_x..max_x {
            // Pixel centers
            let Ok([sx, sy]) = apply(&inverse, x as f64 + 0.5, y as f64 + 0.5) else {
                continue;
            };
            let Some(src) = bilinear_sample(texture, sx - 0.5, sy - 0.5) else {
                continue;
            };
            let alpha = src[3] / 255.0;
            let dest = backdrop.get_pixel_mut(x, y);
            for i in 0..3 {
                let d = dest.0[i] as f64;
                dest.0[i] = (d + (src[i] - d) * alpha).round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    Ok(backdrop)
}

/// Bilinear RGBA sample; `None` outside the texture.
fn bilinear_sample(img: &RgbaImage, x: f64, y: f64) -> Option<[f64; 4]> {
    let (w, h) = (img.width() as f64, img.height() as f64);
    if x < -0.5 || y < -0.5 || x > w - 0.5 || y > h - 0.5 {
        return None;
    }
    let x = x.clamp(0.0, w - 1.0);
    let y = y.clamp(0.0, h - 1.0);

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(img.width() - 1);
    let y1 = (y0 + 1).min(img.height() - 1);
    let dx = x - x0 as f64;
    let dy = y - y0 as f64;

    let p00 = img.get_pixel(x0, y0).0;
    let p10 = img.get_pixel(x1, y0).0;
    let p01 = img.get_pixel(x0, y1).0;
    let p11 = img.get_pixel(x1, y1).0;

    let mut out = [0.0; 4];
    for i in 0..4 {
        let top = p00[i] as f64 * (1.0 - dx) + p10[i] as f64 * dx;
        let bottom = p01[i] as f64 * (1.0 - dx) + p11[i] as f64 * dx;
        out[i] = top * (1.0 - dy) + bottom * dy;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    use crate::assets::AssetPool;
    use crate::projection::CameraPose;
    use crate::SynthRng;

    #[test]
    fn test_identity_pose_copies_texture() {
        let texture = RgbaImage::from_pixel(20, 10, Rgba([200, 100, 50, 255]));
        let pose = CameraPose {
            scale: 1.0,
            rotation: 0.0,
            center: [20.0, 20.0],
        };
        let projector = FlatProjector::from_pose(&pose, (20, 10), (40, 40));
        let frame = render_frame(&texture, &projector, RgbaImage::new(40, 40)).unwrap();

        // Card spans x 10..30, y 15..25
        assert_eq!(&frame.get_pixel(15, 20).0[..3], &[200, 100, 50]);
        assert_eq!(&frame.get_pixel(5, 5).0[..3], &[0, 0, 0]);
        assert_eq!(&frame.get_pixel(31, 20).0[..3], &[0, 0, 0]);
    }

    #[test]
    fn test_gradient_backdrop_without_skybox() {
        let mut rng = SynthRng::seed_from_u64(1);
        let img = backdrop(&AssetLibrary::empty(), 16, 32, &mut rng);
        assert_eq!(img.dimensions(), (16, 32));
        // Constant along rows
        assert_eq!(img.get_pixel(0, 7), img.get_pixel(15, 7));
        assert!(img.pixels().all(|p| p[3] == 255));
    }

    #[test]
    fn test_skybox_fills_frame() {
        let mut library = AssetLibrary::empty();
        library.skyboxes = AssetPool::new(
            "skybox",
            vec![RgbaImage::from_fn(8, 4, |x, _| Rgba([x as u8 * 30, 0, 0, 255]))],
        );
        let img = backdrop(&library, 30, 20, &mut SynthRng::seed_from_u64(2));
        assert_eq!(img.dimensions(), (30, 20));
    }

    #[test]
    fn test_roll_wraps() {
        let src = RgbaImage::from_fn(4, 1, |x, _| Rgba([x as u8, 0, 0, 255]));
        let rolled = roll_horizontal(&src, 1);
        let xs: Vec<u8> = rolled.pixels().map(|p| p[0]).collect();
        assert_eq!(xs, vec![1, 2, 3, 0]);
    }
}
