//! Процедурная магнитная полоса
//!
//! Полоса рисуется на прозрачном холсте размером с текстуру карты:
//! градиент, шум Перлина, износ, горизонтальные царапины и
//! интерференционный узор, зависящий от данных дорожек.

use std::f32::consts::PI;

use image::{Rgba, RgbaImage};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::fields::random_pan;
use crate::names::NameGenerator;
use crate::noise::Perlin;

/// Частота шума износа
const WEAR_FREQUENCY: f32 = 5.0;

/// Параметры полосы
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StripeParams {
    /// Ширина в долях ширины карты
    pub width_frac: f32,
    /// Высота в долях высоты карты
    pub height_frac: f32,
    /// Центр в координатах карты (y вниз)
    pub center: [f32; 2],
    /// Альфа полосы
    pub opacity: f32,
    pub noise_intensity: f32,
    pub noise_scale: f32,
    pub scratch_intensity: f32,
    pub wear_intensity: f32,
    pub highlight_color: [f32; 3],
    pub shadow_color: [f32; 3],
    /// Узор данных дорожек
    pub generate_track_data: bool,
    pub track_data_opacity: f32,
    pub track_color: [f32; 3],
}

impl Default for StripeParams {
    fn default() -> Self {
        Self {
            width_frac: 1.0,
            height_frac: 0.177,
            center: [0.0, -0.65],
            opacity: 0.8,
            noise_intensity: 0.2,
            noise_scale: 3.0,
            scratch_intensity: 0.15,
            wear_intensity: 0.2,
            highlight_color: [0.3; 3],
            shadow_color: [0.05; 3],
            generate_track_data: true,
            track_data_opacity: 0.3,
            track_color: [0.2; 3],
        }
    }
}

/// Прямоугольник полосы в пикселях холста
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StripeBand {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl StripeBand {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }
}

/// Синтетические дорожки 1-3 (условный ISO/IEC 7811)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackData {
    pub track1: String,
    pub track2: String,
    pub track3: String,
}

impl TrackData {
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let names = NameGenerator::default();

        let track1 = format!(
            "%B{}^{}^{}{}?",
            random_pan(rng),
            names.track_name(rng),
            track_expiry(rng),
            rng.random_range(100..=999u32)
        );
        let track2 = format!(
            "{}={}{}?",
            random_pan(rng),
            track_expiry(rng),
            rng.random_range(100..=999u32)
        );
        let track3 = format!(
            "{}={}{}{}?",
            random_pan(rng),
            rng.random_range(100..=999u32),
            rng.random_range(100..=999u32),
            rng.random_range(10000..=99999u32)
        );
        Self {
            track1,
            track2,
            track3,
        }
    }

    pub fn tracks(&self) -> [&str; 3] {
        [&self.track1, &self.track2, &self.track3]
    }

    /// Сдвиг фазы узора для каждой трети полосы
    fn phases(&self) -> [f32; 3] {
        self.tracks().map(|t| {
            let sum: u32 = t.bytes().map(u32::from).sum();
            (sum % 360) as f32 * PI / 180.0
        })
    }
}

/// Срок в формате дорожек: YYMM
fn track_expiry<R: Rng + ?Sized>(rng: &mut R) -> String {
    let month = rng.random_range(1..=12u32);
    let year = rng.random_range(24..=29u32);
    format!("{year:02}{month:02}")
}

/// Генератор магнитной полосы
pub struct MagneticStripeSynthesizer {
    params: StripeParams,
}

impl MagneticStripeSynthesizer {
    pub fn new(params: StripeParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &StripeParams {
        &self.params
    }

    /// Положение полосы на холсте; всегда внутри холста
    pub fn band(&self, width: u32, height: u32) -> StripeBand {
        let p = &self.params;
        let bw = ((p.width_frac.max(0.0) * width as f32) as u32).min(width);
        let bh = ((p.height_frac.max(0.0) * height as f32) as u32).min(height);

        let start_x = (p.center[0] + 1.0) * 0.5 * width as f32 - bw as f32 * 0.5;
        let start_y = (p.center[1] + 1.0) * 0.5 * height as f32 - bh as f32 * 0.5;

        StripeBand {
            x: start_x.clamp(0.0, (width - bw) as f32) as u32,
            y: start_y.clamp(0.0, (height - bh) as f32) as u32,
            width: bw,
            height: bh,
        }
    }

    /// Новый прозрачный холст с полосой
    pub fn generate<R: Rng + ?Sized>(&self, width: u32, height: u32, rng: &mut R) -> RgbaImage {
        let mut canvas = RgbaImage::new(width, height);
        self.generate_into(&mut canvas, rng);
        canvas
    }

    /// Рисование полосы в существующий холст
    ///
    /// Холст полностью перезаписывается: вне полосы пиксели прозрачны.
    pub fn generate_into<R: Rng + ?Sized>(&self, canvas: &mut RgbaImage, rng: &mut R) -> StripeBand {
        for px in canvas.pixels_mut() {
            *px = Rgba([0, 0, 0, 0]);
        }
        let band = self.band(canvas.width(), canvas.height());
        if band.is_empty() {
            return band;
        }

        let p = &self.params;
        let noise = Perlin::new(rng);
        let wear = Perlin::new(rng);
        let tracks = p.generate_track_data.then(|| TrackData::generate(rng));

        let mut colors = vec![[0.0f32; 3]; (band.width * band.height) as usize];
        let (bw, bh) = (band.width as f32, band.height as f32);

        for v in 0..band.height {
            for u in 0..band.width {
                let (fx, fy) = (u as f32 / bw, v as f32 / bh);

                let mut c = lerp3(p.shadow_color, p.highlight_color, fy);
                let banding = ((fx * 2.0 * PI).sin() * 0.1).max(0.0);
                c = lerp3(c, p.highlight_color, banding);

                let n = noise.sample(fx * p.noise_scale, fy * p.noise_scale);
                c = lerp3(c, p.shadow_color, n * p.noise_intensity);

                let w = wear.sample(fx * WEAR_FREQUENCY, fy * WEAR_FREQUENCY);
                c = lerp3(c, p.shadow_color, w * p.wear_intensity);

                colors[(v * band.width + u) as usize] = c;
            }
        }

        // Царапины поверх шума, на всю ширину полосы
        let scratch_probability = p.scratch_intensity * 0.1;
        for v in 0..band.height {
            if rng.random::<f32>() >= scratch_probability {
                continue;
            }
            let thickness = rng.random_range(1..=3u32);
            let top = v.saturating_sub(thickness / 2);
            let bottom = (v + thickness / 2 + 1).min(band.height);
            for row in top..bottom {
                let start = (row * band.width) as usize;
                colors[start..start + band.width as usize].fill(p.shadow_color);
            }
        }

        if let Some(tracks) = &tracks {
            let phases = tracks.phases();
            for v in 0..band.height {
                let third = ((v * 3) / band.height).min(2) as usize;
                for u in 0..band.width {
                    let pattern = ((u as f32 / bw * PI * 20.0 + phases[third]).sin()
                        * (v as f32 / bh * PI * 5.0).cos())
                    .abs()
                        * 0.5;
                    let track = p.track_color.map(|t| t * pattern);
                    let c = &mut colors[(v * band.width + u) as usize];
                    *c = lerp3(*c, track, p.track_data_opacity * pattern);
                }
            }
        }

        let alpha = to_u8(p.opacity);
        for v in 0..band.height {
            for u in 0..band.width {
                let c = colors[(v * band.width + u) as usize];
                canvas.put_pixel(
                    band.x + u,
                    band.y + v,
                    Rgba([to_u8(c[0]), to_u8(c[1]), to_u8(c[2]), alpha]),
                );
            }
        }
        band
    }
}

fn lerp3(a: [f32; 3], b: [f32; 3], t: f32) -> [f32; 3] {
    let t = t.clamp(0.0, 1.0);
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
    ]
}

fn to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}
