//! Gradient (Perlin) noise used for stripe wear and grain.

use rand::seq::SliceRandom;
use rand::Rng;

/// 2D Perlin noise with a seeded permutation table.
#[derive(Debug, Clone)]
pub struct Perlin {
    perm: [u8; 512],
}

impl Perlin {
    pub fn new<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut base: Vec<u8> = (0..=255u8).collect();
        base.shuffle(rng);
        let mut perm = [0u8; 512];
        for i in 0..512 {
            perm[i] = base[i & 255];
        }
        Self { perm }
    }

    /// Noise value in [0, 1] at `(x, y)`.
    pub fn sample(&self, x: f32, y: f32) -> f32 {
        ((self.raw(x, y) + 1.0) * 0.5).clamp(0.0, 1.0)
    }

    /// Signed noise, roughly in [-1, 1].
    fn raw(&self, x: f32, y: f32) -> f32 {
        let xf = x.floor();
        let yf = y.floor();
        let xi = (xf as i32 & 255) as usize;
        let yi = (yf as i32 & 255) as usize;
        let dx = x - xf;
        let dy = y - yf;

        let u = fade(dx);
        let v = fade(dy);

        let p = &self.perm;
        let aa = p[p[xi] as usize + yi];
        let ab = p[p[xi] as usize + yi + 1];
        let ba = p[p[xi + 1] as usize + yi];
        let bb = p[p[xi + 1] as usize + yi + 1];

        let x1 = lerp(grad(aa, dx, dy), grad(ba, dx - 1.0, dy), u);
        let x2 = lerp(grad(ab, dx, dy - 1.0), grad(bb, dx - 1.0, dy - 1.0), u);
        // 2D Perlin peaks at about ±0.707; rescale to cover [-1, 1].
        lerp(x1, x2, v) * std::f32::consts::SQRT_2
    }
}

fn fade(t: f32) -> f32 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

fn grad(hash: u8, x: f32, y: f32) -> f32 {
    match hash & 7 {
        0 => x + y,
        1 => -x + y,
        2 => x - y,
        3 => -x - y,
        4 => x,
        5 => -x,
        6 => y,
        _ => -y,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    use crate::SynthRng;

    #[test]
    fn test_range_and_lattice_zero() {
        let noise = Perlin::new(&mut SynthRng::seed_from_u64(3));
        // Gradient noise vanishes on integer lattice points.
        assert!((noise.sample(2.0, 5.0) - 0.5).abs() < 1e-6);
        for i in 0..200 {
            let v = noise.sample(i as f32 * 0.173, i as f32 * 0.091);
            assert!((0.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn test_same_seed_same_field() {
        let a = Perlin::new(&mut SynthRng::seed_from_u64(9));
        let b = Perlin::new(&mut SynthRng::seed_from_u64(9));
        assert_eq!(a.sample(1.37, 4.2), b.sample(1.37, 4.2));
    }
}
