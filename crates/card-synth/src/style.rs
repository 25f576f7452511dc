//! Цвет и эффекты текста карты
//!
//! Палитра текста, преобразование "хромированной фольги" в HSV и цвета
//! тиснения (тень, обводка, лицевая заливка).

use rand::Rng;

use crate::config::{Span, TextStyleConfig};

/// Линейный RGB в диапазоне [0, 1]
pub type Rgb = [f32; 3];

/// Базовая палитра текста: белый, чёрный, серый, тёмно-серый
pub const TEXT_PALETTE: [Rgb; 4] = [[1.0, 1.0, 1.0], [0.0, 0.0, 0.0], [0.5, 0.5, 0.5], [0.2, 0.2, 0.2]];

/// Цвета карты для смешивания с фоном
pub const CARD_COLORS: [Rgb; 9] = [
    [1.0, 1.0, 1.0],
    [0.0, 0.0, 0.0],
    [0.5, 0.5, 0.5],
    [0.0, 0.0, 1.0],
    [1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [1.0, 0.92, 0.016],
    [0.0, 1.0, 1.0],
    [1.0, 0.0, 1.0],
];

const EMBOSS_SHADOW_ALPHA: f32 = 0.8;

/// Параметры тиснения
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Emboss {
    pub shadow: Rgb,
    pub shadow_alpha: f32,
    pub outline: Rgb,
    pub face: Rgb,
    /// Смещение тени вправо-вниз в долях размера шрифта
    pub shadow_offset: [f32; 2],
}

impl Emboss {
    pub fn from_color<R: Rng + ?Sized>(color: Rgb, rng: &mut R) -> Self {
        Self {
            shadow: scale(color, 0.1),
            shadow_alpha: EMBOSS_SHADOW_ALPHA,
            outline: scale(color, 0.3),
            face: scale(color, 1.2),
            shadow_offset: [rng.random_range(0.01..=0.03), rng.random_range(0.01..=0.03)],
        }
    }
}

/// Стиль одного образца: общий для всех полей карты
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub color: Rgb,
    pub emboss: Option<Emboss>,
}

impl TextStyle {
    pub fn random<R: Rng + ?Sized>(config: &TextStyleConfig, rng: &mut R) -> Self {
        let mut color = TEXT_PALETTE[rng.random_range(0..TEXT_PALETTE.len())];
        if config.chrome {
            color = chrome(color, config.chrome_intensity, rng);
        }
        let emboss = (rng.random::<f32>() < config.emboss_probability)
            .then(|| Emboss::from_color(color, rng));
        Self { color, emboss }
    }

    /// Цвет лицевой заливки глифов
    pub fn face_color(&self) -> Rgb {
        self.emboss.map(|e| e.face).unwrap_or(self.color)
    }
}

/// Эффект металлической фольги
pub fn chrome<R: Rng + ?Sized>(color: Rgb, intensity: f32, rng: &mut R) -> Rgb {
    let reflection = Span::new(0.5, intensity).sample(rng);
    let metallic = rng.random_range(0.7..=1.0f32);
    let saturation_boost = rng.random_range(1.0..=1.5f32);

    let [h, s, v] = rgb_to_hsv(color);
    let s = (s * saturation_boost).clamp(0.0, 1.0);
    let v = (v + reflection * metallic).clamp(0.0, 1.0);
    let c = hsv_to_rgb([h, s, v]);

    let tint_strength = rng.random_range(0.2..=0.4f32);
    let tint = [
        rng.random_range(0.9..=1.1f32),
        rng.random_range(0.9..=1.1f32),
        rng.random_range(1.0..=1.3f32),
    ];
    let gain = [1.2, 1.2, 1.3];

    let mut out = [0.0; 3];
    for i in 0..3 {
        let tinted = (c[i] * tint[i] * (1.0 - tint_strength) + tint[i] * tint_strength).clamp(0.0, 1.0);
        out[i] = (tinted * gain[i]).clamp(0.0, 1.0);
    }
    out
}

pub fn scale(color: Rgb, k: f32) -> Rgb {
    color.map(|c| (c * k).clamp(0.0, 1.0))
}

/// RGB -> HSV, оттенок в [0, 1)
pub fn rgb_to_hsv([r, g, b]: Rgb) -> [f32; 3] {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let h = if delta <= f32::EPSILON {
        0.0
    } else if max == r {
        ((g - b) / delta).rem_euclid(6.0) / 6.0
    } else if max == g {
        ((b - r) / delta + 2.0) / 6.0
    } else {
        ((r - g) / delta + 4.0) / 6.0
    };
    let s = if max <= f32::EPSILON { 0.0 } else { delta / max };
    [h, s, max]
}

pub fn hsv_to_rgb([h, s, v]: [f32; 3]) -> Rgb {
    let h6 = h.rem_euclid(1.0) * 6.0;
    let c = v * s;
    let x = c * (1.0 - (h6 % 2.0 - 1.0).abs());
    let m = v - c;
    let (r, g, b) = match h6 as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    [r + m, g + m, b + m]
}
