//! Растеризация текста прямо в пространстве текстуры карты
//!
//! Векторные шрифты рисуются через `ab_glyph`. Без шрифтов используется
//! встроенный растровый шрифт 5x7. Маска покрытия всегда обрезается по
//! видимым пикселям глифов, поэтому рамка поля плотная.

use std::fmt;

use ab_glyph::{point, Font, FontArc, PxScale, ScaleFont};
use image::{imageops, GrayImage, Luma, RgbaImage};
use imageproc::distance_transform::Norm;
use imageproc::morphology::dilate;

use crate::fields::{CardSample, FieldKind};
use crate::style::Rgb;

/// Шрифт карты
#[derive(Clone)]
pub enum CardFont {
    Outline { name: String, font: FontArc },
    Builtin,
}

impl fmt::Debug for CardFont {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardFont::Outline { name, .. } => f.debug_tuple("Outline").field(name).finish(),
            CardFont::Builtin => f.write_str("Builtin"),
        }
    }
}

impl CardFont {
    pub fn name(&self) -> &str {
        match self {
            CardFont::Outline { name, .. } => name,
            CardFont::Builtin => "builtin-5x7",
        }
    }
}

/// Прямоугольник в пикселях текстуры
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    /// Углы по часовой стрелке начиная с левого верхнего
    pub fn corners(&self) -> [[f64; 2]; 4] {
        let (x0, y0) = (self.x as f64, self.y as f64);
        let (x1, y1) = (x0 + self.width as f64, y0 + self.height as f64);
        [[x0, y0], [x1, y0], [x1, y1], [x0, y1]]
    }
}

/// Итоговое положение отрисованного поля
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldPlacement {
    pub kind: FieldKind,
    pub rect: PixelRect,
}

/// Маска покрытия текста, обрезанная по видимым пикселям
///
/// Пустая строка или строка без видимых глифов даёт `None`.
pub fn rasterize(font: &CardFont, text: &str, px: f32) -> Option<GrayImage> {
    if text.trim().is_empty() || !(px >= 1.0) {
        return None;
    }
    let mask = match font {
        CardFont::Outline { font, .. } => rasterize_outline(font, text, px),
        CardFont::Builtin => rasterize_builtin(text, px),
    };
    crop_to_ink(&mask)
}

fn rasterize_outline(font: &FontArc, text: &str, px: f32) -> GrayImage {
    let scaled = font.as_scaled(PxScale::from(px));
    let line_height = scaled.height() + scaled.line_gap();
    let lines: Vec<&str> = text.lines().collect();

    let widest = lines
        .iter()
        .map(|line| {
            line.chars()
                .map(|c| scaled.h_advance(scaled.glyph_id(c)))
                .sum::<f32>()
        })
        .fold(0.0f32, f32::max);

    // Запас на выносные элементы и отрицательный отступ глифов
    let margin = px.ceil() as u32;
    let width = widest.ceil() as u32 + 2 * margin;
    let height = (line_height * lines.len() as f32).ceil() as u32 + 2 * margin;
    let mut canvas = GrayImage::new(width, height);

    for (i, line) in lines.iter().enumerate() {
        let baseline = margin as f32 + scaled.ascent() + i as f32 * line_height;
        let mut caret = margin as f32;
        let mut previous = None;
        for c in line.chars() {
            let id = scaled.glyph_id(c);
            if let Some(prev) = previous {
                caret += scaled.kern(prev, id);
            }
            let glyph = id.with_scale_and_position(px, point(caret, baseline));
            caret += scaled.h_advance(id);
            previous = Some(id);

            let Some(outlined) = font.outline_glyph(glyph) else {
                continue;
            };
            let bounds = outlined.px_bounds();
            outlined.draw(|gx, gy, coverage| {
                let x = bounds.min.x as i64 + gx as i64;
                let y = bounds.min.y as i64 + gy as i64;
                if x >= 0 && y >= 0 && (x as u32) < width && (y as u32) < height {
                    let pixel = canvas.get_pixel_mut(x as u32, y as u32);
                    let v = (coverage.clamp(0.0, 1.0) * 255.0).round() as u8;
                    pixel.0[0] = pixel.0[0].max(v);
                }
            });
        }
    }
    canvas
}

const BITMAP_ROWS: u32 = 7;
const BITMAP_ADVANCE: u32 = 6;
const BITMAP_LINE: u32 = 9;

fn rasterize_builtin(text: &str, px: f32) -> GrayImage {
    let cell = ((px / BITMAP_LINE as f32).round() as u32).max(1);
    let lines: Vec<&str> = text.lines().collect();
    let columns = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0) as u32;

    let width = (columns * BITMAP_ADVANCE * cell).max(1);
    let height = (lines.len() as u32 * BITMAP_LINE * cell).max(1);
    let mut canvas = GrayImage::new(width, height);

    for (row, line) in lines.iter().enumerate() {
        let top = row as u32 * BITMAP_LINE * cell;
        for (col, c) in line.chars().enumerate() {
            let Some(bits) = bitmap_glyph(c) else {
                continue;
            };
            let left = col as u32 * BITMAP_ADVANCE * cell;
            for (gy, bits_row) in bits.iter().enumerate() {
                for gx in 0..5u32 {
                    if bits_row & (0x10 >> gx) == 0 {
                        continue;
                    }
                    let x0 = left + gx * cell;
                    let y0 = top + gy as u32 * cell;
                    for y in y0..y0 + cell {
                        for x in x0..x0 + cell {
                            canvas.put_pixel(x, y, Luma([255]));
                        }
                    }
                }
            }
        }
    }
    canvas
}

/// Строки глифа 5x7, старший из пяти бит - левый столбец
fn bitmap_glyph(c: char) -> Option<[u8; 7]> {
    let rows = match c.to_ascii_uppercase() {
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        'A' => [0x0E, 0x11, 0x11, 0x11, 0x1F, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1C, 0x12, 0x11, 0x11, 0x11, 0x12, 0x1C],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '/' => [0x01, 0x01, 0x02, 0x04, 0x08, 0x10, 0x10],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        ',' => [0x00, 0x00, 0x00, 0x00, 0x0C, 0x04, 0x08],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '\'' => [0x04, 0x04, 0x08, 0x00, 0x00, 0x00, 0x00],
        _ => return None,
    };
    debug_assert_eq!(rows.len() as u32, BITMAP_ROWS);
    Some(rows)
}

/// Обрезка маски по ненулевым пикселям
fn crop_to_ink(mask: &GrayImage) -> Option<GrayImage> {
    let (mut x0, mut y0) = (u32::MAX, u32::MAX);
    let (mut x1, mut y1) = (0u32, 0u32);
    for (x, y, p) in mask.enumerate_pixels() {
        if p.0[0] > 0 {
            x0 = x0.min(x);
            y0 = y0.min(y);
            x1 = x1.max(x);
            y1 = y1.max(y);
        }
    }
    if x0 > x1 || y0 > y1 {
        return None;
    }
    Some(imageops::crop_imm(mask, x0, y0, x1 - x0 + 1, y1 - y0 + 1).to_image())
}

/// Смешивание цвета по маске: `lerp(dest, color, coverage * alpha)`
pub fn stamp(canvas: &mut RgbaImage, mask: &GrayImage, x: i64, y: i64, color: Rgb, alpha: f32) {
    let rgb = color.map(|c| c.clamp(0.0, 1.0) * 255.0);
    for (mx, my, coverage) in mask.enumerate_pixels() {
        if coverage.0[0] == 0 {
            continue;
        }
        let (cx, cy) = (x + mx as i64, y + my as i64);
        if cx < 0 || cy < 0 || cx >= canvas.width() as i64 || cy >= canvas.height() as i64 {
            continue;
        }
        let t = coverage.0[0] as f32 / 255.0 * alpha;
        let dest = canvas.get_pixel_mut(cx as u32, cy as u32);
        for i in 0..3 {
            let d = dest.0[i] as f32;
            dest.0[i] = (d + (rgb[i] - d) * t).round().clamp(0.0, 255.0) as u8;
        }
        dest.0[3] = dest.0[3].max((t * 255.0).round() as u8);
    }
}

/// Отрисовка всех полей образца на текстуре карты
///
/// Возвращает плотные прямоугольники лицевой заливки. Поле, чья маска
/// пуста, пропускается; подпись без отрисованного значения тоже.
pub fn render_fields(canvas: &mut RgbaImage, sample: &CardSample, edge_padding: f32) -> Vec<FieldPlacement> {
    let (w, h) = canvas.dimensions();
    let pad = (edge_padding.max(0.0) * w.min(h) as f32).round() as i64;
    let mut placements: Vec<FieldPlacement> = Vec::with_capacity(sample.layout.len());

    for field in &sample.layout {
        let px = field.size * h as f32;
        let Some(mask) = rasterize(&sample.font, &field.text, px) else {
            log::debug!("Field {:?} produced no visible glyphs", field.kind);
            continue;
        };
        let (mw, mh) = (mask.width() as i64, mask.height() as i64);

        let (x, y) = match field.kind.label_of() {
            Some(value_kind) => {
                let Some(value) = placements.iter().find(|p| p.kind == value_kind) else {
                    continue;
                };
                let gap = (px * 0.4).round() as i64;
                let r = value.rect;
                (
                    r.x as i64 - gap - mw,
                    r.y as i64 + (r.height as i64 - mh) / 2,
                )
            }
            None => (
                ((field.anchor[0] + 1.0) * 0.5 * w as f32).round() as i64,
                ((field.anchor[1] + 1.0) * 0.5 * h as f32).round() as i64,
            ),
        };
        let x = clamp_start(x, mw, w as i64, pad);
        let y = clamp_start(y, mh, h as i64, pad);

        if let Some(emboss) = sample.style.emboss {
            let ox = (emboss.shadow_offset[0] * px).round().max(1.0) as i64;
            let oy = (emboss.shadow_offset[1] * px).round().max(1.0) as i64;
            stamp(canvas, &mask, x + ox, y + oy, emboss.shadow, emboss.shadow_alpha);

            let k = ((px * 0.04).round() as u8).max(1);
            let outline = dilate(&pad_mask(&mask, k as u32), Norm::LInf, k);
            stamp(canvas, &outline, x - k as i64, y - k as i64, emboss.outline, 1.0);
        }
        stamp(canvas, &mask, x, y, sample.style.face_color(), 1.0);

        if let Some(rect) = clip_rect(x, y, mw, mh, w, h) {
            placements.push(FieldPlacement {
                kind: field.kind,
                rect,
            });
        }
    }
    placements
}

/// Начало отрезка длины `len` внутри `[pad, total - pad]`
fn clamp_start(start: i64, len: i64, total: i64, pad: i64) -> i64 {
    let max = total - pad - len;
    if max < pad {
        return ((total - len) / 2).max(0);
    }
    start.clamp(pad, max)
}

fn clip_rect(x: i64, y: i64, w: i64, h: i64, canvas_w: u32, canvas_h: u32) -> Option<PixelRect> {
    let x0 = x.max(0);
    let y0 = y.max(0);
    let x1 = (x + w).min(canvas_w as i64);
    let y1 = (y + h).min(canvas_h as i64);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(PixelRect {
        x: x0 as u32,
        y: y0 as u32,
        width: (x1 - x0) as u32,
        height: (y1 - y0) as u32,
    })
}

fn pad_mask(mask: &GrayImage, k: u32) -> GrayImage {
    let mut padded = GrayImage::new(mask.width() + 2 * k, mask.height() + 2 * k);
    imageops::replace(&mut padded, mask, k as i64, k as i64);
    padded
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use image::Rgba;

    use crate::fields::PlacedField;
    use crate::style::TextStyle;
    use crate::CardFace;

    fn sample_with(layout: Vec<PlacedField>) -> CardSample {
        CardSample {
            face: CardFace::Front,
            fields: layout.iter().map(|f| (f.kind, f.text.clone())).collect(),
            background_color: [0.0; 3],
            color_blend_amount: 0.0,
            font: CardFont::Builtin,
            style: TextStyle {
                color: [1.0; 3],
                emboss: None,
            },
            placement_jitter: BTreeMap::new(),
            group_offset: [0.0, 0.0],
            layout,
        }
    }

    #[test]
    fn test_builtin_font_name() {
        assert_eq!(CardFont::Builtin.name(), "builtin-5x7");
        assert_eq!(format!("{:?}", CardFont::Builtin), "Builtin");
    }

    #[test]
    fn test_builtin_mask_is_tight() {
        let mask = rasterize(&CardFont::Builtin, "1", 18.0).unwrap();
        // '1' spans columns 1..=3 and all 7 rows of the cell grid
        assert_eq!(mask.dimensions(), (3 * 2, 7 * 2));
        assert!(rasterize(&CardFont::Builtin, "   ", 18.0).is_none());
        assert!(rasterize(&CardFont::Builtin, "", 18.0).is_none());
    }

    #[test]
    fn test_multiline_is_taller() {
        let one = rasterize(&CardFont::Builtin, "EXP", 18.0).unwrap();
        let two = rasterize(&CardFont::Builtin, "EXP\nDATE", 18.0).unwrap();
        assert!(two.height() > one.height());
    }

    #[test]
    fn test_stamp_blends_by_coverage() {
        let mut canvas = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        let mask = GrayImage::from_pixel(2, 2, Luma([255]));
        stamp(&mut canvas, &mask, 1, 1, [1.0, 1.0, 1.0], 0.5);
        assert_eq!(canvas.get_pixel(1, 1).0, [128, 128, 128, 255]);
        assert_eq!(canvas.get_pixel(0, 0).0, [0, 0, 0, 255]);
        // Частично за краем холста
        stamp(&mut canvas, &mask, 3, 3, [1.0, 0.0, 0.0], 1.0);
        assert_eq!(canvas.get_pixel(3, 3).0, [255, 0, 0, 255]);
    }

    #[test]
    fn test_label_sits_left_of_value() {
        let mut canvas = RgbaImage::from_pixel(400, 250, Rgba([0, 0, 0, 255]));
        let sample = sample_with(vec![
            PlacedField {
                kind: FieldKind::Expires,
                text: "12/27".into(),
                anchor: [0.0, 0.0],
                size: 0.065,
            },
            PlacedField {
                kind: FieldKind::ExpiresLabel,
                text: "EXP\nDATE".into(),
                anchor: [0.0, 0.0],
                size: 0.035,
            },
        ]);
        let placements = render_fields(&mut canvas, &sample, 0.05);
        assert_eq!(placements.len(), 2);
        let value = placements[0].rect;
        let label = placements[1].rect;
        assert_eq!(placements[1].kind, FieldKind::ExpiresLabel);
        assert!(label.x + label.width <= value.x);
    }

    #[test]
    fn test_fields_clamped_inside_padding() {
        let mut canvas = RgbaImage::from_pixel(300, 200, Rgba([0, 0, 0, 255]));
        let sample = sample_with(vec![PlacedField {
            kind: FieldKind::Number,
            text: "4123 4567".into(),
            anchor: [0.9, 0.95],
            size: 0.085,
        }]);
        let placements = render_fields(&mut canvas, &sample, 0.05);
        let r = placements[0].rect;
        assert!(r.x + r.width <= 300 - 10);
        assert!(r.y + r.height <= 200 - 10);
    }
}
