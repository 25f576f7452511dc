//! Просмотр разметки: рамки поверх изображения

use std::path::{Path, PathBuf};

use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::annotation::{ClassId, LabelFile};
use crate::SynthError;

/// Цвет рамки для класса
pub fn class_color(class_id: ClassId) -> Rgba<u8> {
    match class_id {
        ClassId::Name => Rgba([255, 64, 64, 255]),
        ClassId::Number => Rgba([64, 255, 64, 255]),
        ClassId::Expires => Rgba([64, 128, 255, 255]),
        ClassId::Cvc => Rgba([255, 255, 64, 255]),
        ClassId::Front => Rgba([255, 64, 255, 255]),
        ClassId::Back => Rgba([64, 255, 255, 255]),
    }
}

/// Рамки с толщиной в два пикселя
pub fn draw_labels(image: &mut RgbaImage, labels: &LabelFile) {
    let (w, h) = (image.width() as f64, image.height() as f64);
    for bbox in &labels.boxes {
        let x0 = ((bbox.cx - bbox.width / 2.0) * w).round() as i32;
        let y0 = ((bbox.cy - bbox.height / 2.0) * h).round() as i32;
        let bw = (bbox.width * w).round() as u32;
        let bh = (bbox.height * h).round() as u32;
        let color = class_color(bbox.class_id);
        for inset in 0..2u32 {
            let (iw, ih) = (bw.saturating_sub(2 * inset), bh.saturating_sub(2 * inset));
            if iw == 0 || ih == 0 {
                break;
            }
            let rect = Rect::at(x0 + inset as i32, y0 + inset as i32).of_size(iw, ih);
            draw_hollow_rect_mut(image, rect, color);
        }
    }
}

/// Отрисовка пары изображение/разметка из каталога части набора
///
/// `split_dir` - каталог вида `yolo/train`, `stem` - имя файла без расширения.
pub fn render_preview(split_dir: &Path, stem: &str, out: &Path) -> Result<PathBuf, SynthError> {
    let image_path = split_dir.join("images").join(format!("{stem}.jpg"));
    let label_path = split_dir.join("labels").join(format!("{stem}.txt"));

    let mut image = image::open(&image_path)
        .map_err(|e| SynthError::AssetLoad {
            path: image_path.clone(),
            reason: e.to_string(),
        })?
        .to_rgba8();
    let labels = LabelFile::read(&label_path)?;
    draw_labels(&mut image, &labels);

    image.save(out).map_err(|e| SynthError::Persist {
        path: out.to_path_buf(),
        reason: e.to_string(),
    })?;
    log::info!("Preview with {} boxes written to {}", labels.len(), out.display());
    Ok(out.to_path_buf())
}
