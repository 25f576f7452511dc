//! Модуль композиции текстуры карты
//!
//! Фон, смешанный с цветом карты, затем наложения (чип, логотипы, полоса,
//! подпись, RFID) и текст полей. Принадлежность слоя стороне карты
//! фиксирована: чип только спереди, полоса, подпись и RFID только сзади.

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use rand::Rng;

use crate::assets::AssetLibrary;
use crate::config::{OverlayLayout, SynthConfig};
use crate::fields::CardSample;
use crate::pool::TexturePool;
use crate::stripe::MagneticStripeSynthesizer;
use crate::style::Rgb;
use crate::text::{render_fields, FieldPlacement};
use crate::CardFace;

/// Центр контактной площадки EMV по ISO/IEC 7816-2 (координаты карты, y вниз)
pub const CHIP_CENTER: [f32; 2] = [-0.641, -0.179];
pub const BRAND_LOGO_CENTER: [f32; 2] = [1.0, 1.0];
pub const BANK_LOGO_CENTER_FRONT: [f32; 2] = [1.0, -1.0];
pub const BANK_LOGO_CENTER_BACK: [f32; 2] = [-1.0, 1.0];
pub const SIGNATURE_CENTER: [f32; 2] = [0.0, 0.25];
pub const RFID_CENTER: [f32; 2] = [0.8, 0.25];

/// Слой, фактически наложенный на текстуру
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    Chip,
    BrandLogo,
    BankLogo,
    Stripe,
    Signature,
    Rfid,
    Text,
}

impl LayerKind {
    /// Сторона, на которой слой допустим; `None` - на обеих
    pub fn face(self) -> Option<CardFace> {
        match self {
            LayerKind::Chip => Some(CardFace::Front),
            LayerKind::Stripe | LayerKind::Signature | LayerKind::Rfid => Some(CardFace::Back),
            _ => None,
        }
    }
}

/// Готовая текстура карты
#[derive(Debug, Clone)]
pub struct CompositeTexture {
    pub image: RgbaImage,
    pub face: CardFace,
    /// Применённые слои в порядке наложения
    pub layers: Vec<LayerKind>,
    /// Плотные рамки отрисованных полей в пикселях текстуры
    pub fields: Vec<FieldPlacement>,
}

impl CompositeTexture {
    pub fn has_layer(&self, kind: LayerKind) -> bool {
        self.layers.contains(&kind)
    }
}

/// Компоновщик текстуры
pub struct TextureCompositor {
    width: u32,
    height: u32,
    layout: OverlayLayout,
    stripe: MagneticStripeSynthesizer,
}

impl TextureCompositor {
    pub fn new(config: &SynthConfig) -> Self {
        Self {
            width: config.card_width,
            height: config.card_height,
            layout: config.overlays.clone(),
            stripe: MagneticStripeSynthesizer::new(config.stripe.clone()),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Сборка текстуры образца
    ///
    /// Пустой пул ресурсов лишь отключает свой слой.
    pub fn composite<R: Rng + ?Sized>(
        &self,
        sample: &CardSample,
        library: &AssetLibrary,
        pool: &mut TexturePool,
        rng: &mut R,
    ) -> CompositeTexture {
        let mut image = pool.acquire(self.width, self.height);
        self.paint_background(&mut image, sample, library, rng);

        let face = sample.face;
        let toggles = &self.layout.layers;
        let mut layers = Vec::new();

        if !face.is_back() && toggles.chip {
            if let Some(chip) = library.chips.try_pick(rng) {
                if self.place(&mut image, chip, CHIP_CENTER, self.layout.chip_size, self.layout.chip_opacity) {
                    layers.push(LayerKind::Chip);
                }
            }
        }

        if toggles.brand_logo {
            if let Some(logo) = library.brand_logos.try_pick(rng) {
                let (size, opacity) = (self.layout.brand_logo_size, self.layout.brand_logo_opacity);
                if self.place(&mut image, logo, BRAND_LOGO_CENTER, size, opacity) {
                    layers.push(LayerKind::BrandLogo);
                }
            }
        }

        if toggles.bank_logo {
            if let Some(logo) = library.bank_logos.try_pick(rng) {
                let center = match face {
                    CardFace::Front => BANK_LOGO_CENTER_FRONT,
                    CardFace::Back => BANK_LOGO_CENTER_BACK,
                };
                let (size, opacity) = (self.layout.bank_logo_size, self.layout.bank_logo_opacity);
                if self.place(&mut image, logo, center, size, opacity) {
                    layers.push(LayerKind::BankLogo);
                }
            }
        }

        if face.is_back() {
            if toggles.stripe {
                let mut stripe = pool.acquire(self.width, self.height);
                let band = self.stripe.generate_into(&mut stripe, rng);
                if !band.is_empty() {
                    blend_by_alpha(&mut image, &stripe);
                    layers.push(LayerKind::Stripe);
                }
                pool.release(stripe);
            }

            if toggles.signature {
                if let Some(signature) = &library.signature {
                    let [jx, jy] = self.layout.signature_jitter;
                    let center = [
                        SIGNATURE_CENTER[0] + symmetric(jx, rng),
                        SIGNATURE_CENTER[1] + symmetric(jy, rng),
                    ];
                    let (size, opacity) = (self.layout.signature_size, self.layout.signature_opacity);
                    if self.place(&mut image, signature, center, size, opacity) {
                        layers.push(LayerKind::Signature);
                    }
                }
            }

            if toggles.rfid {
                if let Some(rfid) = &library.rfid {
                    if self.place(&mut image, rfid, RFID_CENTER, self.layout.rfid_size, self.layout.rfid_opacity) {
                        layers.push(LayerKind::Rfid);
                    }
                }
            }
        }

        let fields = render_fields(&mut image, sample, self.layout.edge_padding);
        if !fields.is_empty() {
            layers.push(LayerKind::Text);
        }

        log::debug!("Composited {face:?} texture with layers {layers:?}");
        CompositeTexture {
            image,
            face,
            layers,
            fields,
        }
    }

    /// Фон из пула, смешанный с цветом карты; без фонов - сплошной цвет
    fn paint_background<R: Rng + ?Sized>(
        &self,
        canvas: &mut RgbaImage,
        sample: &CardSample,
        library: &AssetLibrary,
        rng: &mut R,
    ) {
        let color = sample.background_color.map(|c| c.clamp(0.0, 1.0) * 255.0);
        let Some(background) = library.backgrounds.try_pick(rng) else {
            let fill = to_rgba(color);
            for px in canvas.pixels_mut() {
                *px = fill;
            }
            return;
        };

        let resized;
        let source = if background.dimensions() == (self.width, self.height) {
            background
        } else {
            resized = imageops::resize(background, self.width, self.height, FilterType::Triangle);
            &resized
        };

        let t = sample.color_blend_amount.clamp(0.0, 1.0);
        for (dest, src) in canvas.pixels_mut().zip(source.pixels()) {
            let mut out = [0f32; 3];
            for i in 0..3 {
                let s = src.0[i] as f32;
                out[i] = s + (color[i] - s) * t;
            }
            *dest = to_rgba(out);
        }
    }

    /// Наложение изображения с центром в координатах карты
    ///
    /// Ширина задаётся долей ширины текстуры, высота по пропорциям
    /// изображения. Прямоугольник прижимается к краям с учётом отступа.
    fn place(&self, canvas: &mut RgbaImage, overlay: &RgbaImage, center: [f32; 2], width_frac: f32, opacity: f32) -> bool {
        let (cw, ch) = canvas.dimensions();
        let (ow, oh) = overlay.dimensions();
        if ow == 0 || oh == 0 {
            return false;
        }
        let logo_w = (width_frac * cw as f32) as i64;
        let logo_h = (logo_w as f32 * oh as f32 / ow as f32) as i64;
        if logo_w <= 0 || logo_h <= 0 {
            log::warn!("Overlay scaled to an empty rectangle, skipping");
            return false;
        }

        let start_x = ((center[0] + 1.0) * 0.5 * cw as f32 - logo_w as f32 * 0.5) as i64;
        let start_y = ((center[1] + 1.0) * 0.5 * ch as f32 - logo_h as f32 * 0.5) as i64;
        let pad_x = (self.layout.edge_padding * cw as f32).round() as i64;
        let pad_y = (self.layout.edge_padding * ch as f32).round() as i64;
        let start_x = clamp_with_padding(start_x, logo_w, cw as i64, pad_x);
        let start_y = clamp_with_padding(start_y, logo_h, ch as i64, pad_y);

        blend_overlay(canvas, overlay, start_x, start_y, logo_w, logo_h, opacity);
        true
    }
}

/// Наложение с выборкой ближайшего соседа:
/// `result = lerp(dest, src, src.alpha / 255 * opacity)`
pub fn blend_overlay(
    canvas: &mut RgbaImage,
    overlay: &RgbaImage,
    start_x: i64,
    start_y: i64,
    width: i64,
    height: i64,
    opacity: f32,
) {
    let (cw, ch) = (canvas.width() as i64, canvas.height() as i64);
    let (ow, oh) = overlay.dimensions();
    if ow == 0 || oh == 0 || width <= 0 || height <= 0 {
        return;
    }
    let scale_x = ow as f32 / width as f32;
    let scale_y = oh as f32 / height as f32;

    for y in 0..height {
        let ty = start_y + y;
        if ty < 0 || ty >= ch {
            continue;
        }
        let sy = ((y as f32 * scale_y) as u32).min(oh - 1);
        for x in 0..width {
            let tx = start_x + x;
            if tx < 0 || tx >= cw {
                continue;
            }
            let sx = ((x as f32 * scale_x) as u32).min(ow - 1);
            let src = overlay.get_pixel(sx, sy);
            if src.0[3] == 0 {
                continue;
            }
            let t = src.0[3] as f32 / 255.0 * opacity;
            let dest = canvas.get_pixel_mut(tx as u32, ty as u32);
            lerp_pixel(dest, src, t);
        }
    }
}

/// Смешивание слоя размером с холст по его собственной альфе
fn blend_by_alpha(canvas: &mut RgbaImage, layer: &RgbaImage) {
    for (dest, src) in canvas.pixels_mut().zip(layer.pixels()) {
        if src.0[3] == 0 {
            continue;
        }
        lerp_pixel(dest, src, src.0[3] as f32 / 255.0);
    }
}

fn lerp_pixel(dest: &mut Rgba<u8>, src: &Rgba<u8>, t: f32) {
    let t = t.clamp(0.0, 1.0);
    for i in 0..3 {
        let d = dest.0[i] as f32;
        dest.0[i] = (d + (src.0[i] as f32 - d) * t).round() as u8;
    }
    dest.0[3] = dest.0[3].max(src.0[3]);
}

/// Как `Mathf.Clamp`: при нехватке места побеждает нижняя граница
fn clamp_with_padding(start: i64, len: i64, total: i64, pad: i64) -> i64 {
    start.min(total - len - pad).max(pad)
}

fn symmetric<R: Rng + ?Sized>(amplitude: f32, rng: &mut R) -> f32 {
    if amplitude <= 0.0 {
        return 0.0;
    }
    rng.random_range(-amplitude..=amplitude)
}

fn to_rgba(rgb: Rgb) -> Rgba<u8> {
    let q = |v: f32| v.round().clamp(0.0, 255.0) as u8;
    Rgba([q(rgb[0]), q(rgb[1]), q(rgb[2]), 255])
}
