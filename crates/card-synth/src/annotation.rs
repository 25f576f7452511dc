//! Модуль разметки
//!
//! Нормализованные рамки в формате YOLO, разбиение train/valid/test и
//! запись набора данных на диск.

use std::fmt;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use image::buffer::ConvertBuffer;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, RgbImage, RgbaImage};
use rand::Rng;
use serde::Serialize;
use thiserror::Error;

use crate::compositor::CompositeTexture;
use crate::config::{OutputConfig, PlainFormat, SplitRatios};
use crate::projection::{Corners, SceneProjector};
use crate::text::PixelRect;
use crate::{CardFace, SynthError};

/// Имена классов в порядке идентификаторов
pub const CLASS_NAMES: [&str; 6] = ["Name", "Number", "Expires", "CVC", "Front", "Back"];

/// Шаг сетки, на которую округляются сохраняемые значения
const GRID: f64 = 1e-6;

const JPEG_QUALITY: u8 = 95;

/// Класс объекта
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClassId {
    Name = 0,
    Number = 1,
    Expires = 2,
    Cvc = 3,
    Front = 4,
    Back = 5,
}

impl ClassId {
    pub const ALL: [ClassId; 6] = [
        ClassId::Name,
        ClassId::Number,
        ClassId::Expires,
        ClassId::Cvc,
        ClassId::Front,
        ClassId::Back,
    ];

    pub fn id(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        CLASS_NAMES[self as usize]
    }

    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    pub fn for_face(face: CardFace) -> Self {
        match face {
            CardFace::Front => ClassId::Front,
            CardFace::Back => ClassId::Back,
        }
    }
}

/// Нормализованная рамка с центром (начало координат - левый верхний угол)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub class_id: ClassId,
    pub cx: f64,
    pub cy: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    /// Рамка по углам в пикселях изображения
    ///
    /// Углы обрезаются по изображению; рамка нулевой ширины или высоты
    /// отбрасывается. Результат округлён до шести знаков так, что
    /// `cx - w/2 >= 0` и `cx + w/2 <= 1` выполняются и после записи.
    pub fn from_corners(class_id: ClassId, corners: &Corners, image_w: u32, image_h: u32) -> Option<Self> {
        if image_w == 0 || image_h == 0 {
            return None;
        }
        let (w, h) = (image_w as f64, image_h as f64);
        let xs = corners.iter().map(|c| c[0]);
        let ys = corners.iter().map(|c| c[1]);
        let x0 = xs.clone().fold(f64::INFINITY, f64::min).clamp(0.0, w) / w;
        let x1 = xs.fold(f64::NEG_INFINITY, f64::max).clamp(0.0, w) / w;
        let y0 = ys.clone().fold(f64::INFINITY, f64::min).clamp(0.0, h) / h;
        let y1 = ys.fold(f64::NEG_INFINITY, f64::max).clamp(0.0, h) / h;
        if !(x1 > x0) || !(y1 > y0) {
            return None;
        }

        let (cx, width) = quantize_span(x0, x1)?;
        let (cy, height) = quantize_span(y0, y1)?;
        Some(Self {
            class_id,
            cx,
            cy,
            width,
            height,
        })
    }

    pub fn is_normalized(&self) -> bool {
        let eps = 1e-9;
        [self.cx, self.cy, self.width, self.height]
            .iter()
            .all(|v| (0.0..=1.0).contains(v))
            && self.cx - self.width / 2.0 >= -eps
            && self.cx + self.width / 2.0 <= 1.0 + eps
            && self.cy - self.height / 2.0 >= -eps
            && self.cy + self.height / 2.0 <= 1.0 + eps
    }
}

/// Центр и длина отрезка `[a, b]` на сетке 1e-6 внутри `[0, 1]`
fn quantize_span(a: f64, b: f64) -> Option<(f64, f64)> {
    let center = snap((a + b) * 0.5);
    let len = snap(b - a).min(snap(2.0 * center)).min(snap(2.0 * (1.0 - center)));
    (len > 0.0).then_some((center, len))
}

fn snap(v: f64) -> f64 {
    ((v / GRID).round() * GRID).clamp(0.0, 1.0)
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:.6} {:.6} {:.6} {:.6}",
            self.class_id.id(),
            self.cx,
            self.cy,
            self.width,
            self.height
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LabelParseError {
    #[error("line {line}: expected 5 fields, found {found}")]
    FieldCount { line: usize, found: usize },

    #[error("line {line}: invalid number '{value}'")]
    Number { line: usize, value: String },

    #[error("line {line}: unknown class id {id}")]
    UnknownClass { line: usize, id: u32 },

    #[error("line {line}: box is outside the unit square")]
    OutOfRange { line: usize },
}

impl FromStr for BoundingBox {
    type Err = LabelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_line(s, 1)
    }
}

fn parse_line(s: &str, line: usize) -> Result<BoundingBox, LabelParseError> {
    let parts: Vec<&str> = s.split_whitespace().collect();
    if parts.len() != 5 {
        return Err(LabelParseError::FieldCount {
            line,
            found: parts.len(),
        });
    }
    let id: u32 = parts[0].parse().map_err(|_| LabelParseError::Number {
        line,
        value: parts[0].to_string(),
    })?;
    let class_id = ClassId::from_id(id).ok_or(LabelParseError::UnknownClass { line, id })?;

    let mut values = [0.0f64; 4];
    for (slot, raw) in values.iter_mut().zip(&parts[1..]) {
        *slot = raw.parse().map_err(|_| LabelParseError::Number {
            line,
            value: raw.to_string(),
        })?;
    }
    let bbox = BoundingBox {
        class_id,
        cx: values[0],
        cy: values[1],
        width: values[2],
        height: values[3],
    };
    if !bbox.is_normalized() {
        return Err(LabelParseError::OutOfRange { line });
    }
    Ok(bbox)
}

/// Содержимое одного файла разметки
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelFile {
    pub boxes: Vec<BoundingBox>,
}

impl LabelFile {
    pub fn push(&mut self, bbox: BoundingBox) {
        self.boxes.push(bbox);
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn read(path: &Path) -> Result<Self, SynthError> {
        let text = fs::read_to_string(path)?;
        text.parse().map_err(|e: LabelParseError| SynthError::Persist {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

impl fmt::Display for LabelFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bbox in &self.boxes {
            writeln!(f, "{bbox}")?;
        }
        Ok(())
    }
}

impl FromStr for LabelFile {
    type Err = LabelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let boxes = s
            .lines()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty())
            .map(|(i, l)| parse_line(l, i + 1))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { boxes })
    }
}

/// Разметка одного кадра
#[derive(Debug, Clone, Default)]
pub struct Annotation {
    pub labels: LabelFile,
    /// Поля, чья рамка не попала в файл
    pub omitted: usize,
}

/// Рамка карты целиком и рамки размечаемых полей
///
/// Ошибка проекции или вырожденная рамка убирают только это поле.
pub fn annotate(texture: &CompositeTexture, projector: &dyn SceneProjector) -> Annotation {
    let (out_w, out_h) = projector.output_size();
    let mut annotation = Annotation::default();

    let (tw, th) = texture.image.dimensions();
    let card = PixelRect {
        x: 0,
        y: 0,
        width: tw,
        height: th,
    };
    let card_class = ClassId::for_face(texture.face);
    match projector.project(&card.corners()) {
        Ok(corners) => match BoundingBox::from_corners(card_class, &corners, out_w, out_h) {
            Some(bbox) => annotation.labels.push(bbox),
            None => {
                log::warn!("Card box is empty after projection");
                annotation.omitted += 1;
            }
        },
        Err(e) => {
            log::warn!("Card box omitted: {e}");
            annotation.omitted += 1;
        }
    }

    for placement in &texture.fields {
        let Some(class_id) = placement.kind.class_id() else {
            continue;
        };
        let corners = match projector.project(&placement.rect.corners()) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("{:?} box omitted: {e}", placement.kind);
                annotation.omitted += 1;
                continue;
            }
        };
        match BoundingBox::from_corners(class_id, &corners, out_w, out_h) {
            Some(bbox) => annotation.labels.push(bbox),
            None => {
                log::warn!("{:?} box has no area in the frame", placement.kind);
                annotation.omitted += 1;
            }
        }
    }
    annotation
}

/// Часть набора данных
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataSplit {
    Train,
    Valid,
    Test,
}

impl DataSplit {
    pub const ALL: [DataSplit; 3] = [DataSplit::Train, DataSplit::Valid, DataSplit::Test];

    pub fn dir_name(self) -> &'static str {
        match self {
            DataSplit::Train => "train",
            DataSplit::Valid => "valid",
            DataSplit::Test => "test",
        }
    }

    /// Одно равномерное число против накопленных долей
    pub fn draw<R: Rng + ?Sized>(ratios: &SplitRatios, rng: &mut R) -> Self {
        Self::from_uniform(rng.random::<f64>(), ratios)
    }

    pub fn from_uniform(u: f64, ratios: &SplitRatios) -> Self {
        if u < ratios.train {
            DataSplit::Train
        } else if u < ratios.train + ratios.valid {
            DataSplit::Valid
        } else {
            DataSplit::Test
        }
    }
}

impl fmt::Display for DataSplit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Описание набора для обучающих скриптов (`data.yaml`)
#[derive(Debug, Serialize)]
struct DatasetDescriptor {
    path: String,
    train: String,
    val: String,
    test: String,
    nc: usize,
    names: Vec<String>,
}

/// Запись набора данных на диск
pub struct DatasetWriter {
    root: PathBuf,
    config: OutputConfig,
}

impl DatasetWriter {
    pub fn new(config: OutputConfig) -> Self {
        Self {
            root: config.root.clone(),
            config,
        }
    }

    pub fn yolo_dir(&self) -> PathBuf {
        self.root.join("yolo")
    }

    pub fn plain_dir(&self) -> PathBuf {
        self.root.join(&self.config.plain_dir)
    }

    pub fn images_dir(&self, split: DataSplit) -> PathBuf {
        self.yolo_dir().join(split.dir_name()).join("images")
    }

    pub fn labels_dir(&self, split: DataSplit) -> PathBuf {
        self.yolo_dir().join(split.dir_name()).join("labels")
    }

    /// Каталоги и манифесты; повторный вызов безопасен
    pub fn prepare(&self) -> Result<(), SynthError> {
        if !self.config.yolo {
            fs::create_dir_all(self.plain_dir())?;
            return Ok(());
        }
        for split in DataSplit::ALL {
            fs::create_dir_all(self.images_dir(split))?;
            fs::create_dir_all(self.labels_dir(split))?;
        }
        self.write_classes()?;
        self.write_descriptor()?;
        log::info!("Dataset layout ready at {}", self.yolo_dir().display());
        Ok(())
    }

    fn write_classes(&self) -> Result<(), SynthError> {
        let path = self.yolo_dir().join("classes.txt");
        let mut text = CLASS_NAMES.join("\n");
        text.push('\n');
        fs::write(&path, text).map_err(|e| persist_err(&path, e))
    }

    fn write_descriptor(&self) -> Result<(), SynthError> {
        let path = self.yolo_dir().join("data.yaml");
        let yolo_dir = self.yolo_dir();
        let absolute = fs::canonicalize(&yolo_dir).unwrap_or(yolo_dir);
        let descriptor = DatasetDescriptor {
            path: absolute.display().to_string(),
            train: "train/images".into(),
            val: "valid/images".into(),
            test: "test/images".into(),
            nc: CLASS_NAMES.len(),
            names: CLASS_NAMES.iter().map(|s| s.to_string()).collect(),
        };
        let yaml = serde_yml::to_string(&descriptor).map_err(|e| persist_err(&path, e))?;
        fs::write(&path, yaml).map_err(|e| persist_err(&path, e))
    }

    /// Изображение и разметка в каталоги выбранной части
    ///
    /// Оба файла сначала пишутся под временными именами и переименовываются
    /// только после успешной записи обоих. При любой ошибке на диске не
    /// остаётся ни одного файла образца.
    pub fn write_sample(
        &self,
        index: u64,
        split: DataSplit,
        image: &RgbaImage,
        labels: &LabelFile,
    ) -> Result<PathBuf, SynthError> {
        let stem = format!("card_{index:06}");
        let image_path = self.images_dir(split).join(format!("{stem}.jpg"));
        let label_path = self.labels_dir(split).join(format!("{stem}.txt"));
        let image_tmp = staging_path(&image_path);
        let label_tmp = staging_path(&label_path);

        let staged = save_jpeg(image, &image_tmp).and_then(|_| {
            fs::write(&label_tmp, labels.to_string()).map_err(|e| persist_err(&label_tmp, e))
        });
        if let Err(e) = staged {
            discard(&[&image_tmp, &label_tmp]);
            return Err(e);
        }

        if let Err(e) = fs::rename(&image_tmp, &image_path) {
            discard(&[&image_tmp, &label_tmp]);
            return Err(persist_err(&image_path, e));
        }
        if let Err(e) = fs::rename(&label_tmp, &label_path) {
            discard(&[&image_path, &label_tmp]);
            return Err(persist_err(&label_path, e));
        }
        Ok(image_path)
    }

    /// Только изображение, без разметки
    pub fn write_plain(&self, index: u32, image: &RgbaImage) -> Result<PathBuf, SynthError> {
        let format = self.config.plain_format;
        let path = self
            .plain_dir()
            .join(format!("credit_card_{index:04}.{}", format.extension()));
        match format {
            PlainFormat::Png => image
                .save_with_format(&path, ImageFormat::Png)
                .map_err(|e| persist_err(&path, e))?,
            PlainFormat::Jpg => save_jpeg(image, &path)?,
        }
        Ok(path)
    }
}

fn save_jpeg(image: &RgbaImage, path: &Path) -> Result<(), SynthError> {
    let rgb: RgbImage = image.convert();
    let file = File::create(path).map_err(|e| persist_err(path, e))?;
    let mut writer = BufWriter::new(file);
    JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(|e| persist_err(path, e))
}

/// Скрытое временное имя рядом с целевым файлом
fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}

fn discard(paths: &[&Path]) {
    for path in paths {
        if path.is_file() {
            if let Err(e) = fs::remove_file(path) {
                log::warn!("Cannot remove {}: {e}", path.display());
            }
        }
    }
}

fn persist_err(path: &Path, e: impl fmt::Display) -> SynthError {
    SynthError::Persist {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}
