//! Модуль исходных ресурсов
//!
//! Пулы изображений (фоны, чипы, логотипы, небо), шрифты и одиночные
//! ресурсы (подпись, знак RFID). Любой каталог может отсутствовать или быть
//! пустым: это не ошибка, а лишь отключение зависящих от него слоёв.

use std::fs::read_dir;
use std::path::{Path, PathBuf};

use ab_glyph::{Font, FontArc};
use image::RgbaImage;
use rand::Rng;

use crate::text::CardFont;
use crate::SynthError;

/// Декодированное RGBA-изображение
pub type Raster = RgbaImage;

pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];
pub const SKYBOX_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "exr", "hdr", "cubemap"];
pub const FONT_EXTENSIONS: &[&str] = &["ttf", "otf"];

/// Именованный пул изображений
///
/// Изображения декодируются один раз при загрузке и далее не меняются.
#[derive(Debug, Clone, Default)]
pub struct AssetPool {
    category: String,
    images: Vec<Raster>,
}

impl AssetPool {
    pub fn new(category: impl Into<String>, images: Vec<Raster>) -> Self {
        Self {
            category: category.into(),
            images,
        }
    }

    pub fn empty(category: impl Into<String>) -> Self {
        Self::new(category, Vec::new())
    }

    /// Загрузка всех изображений каталога (без рекурсии)
    pub fn load(category: &str, dir: &Path, extensions: &[&str]) -> Self {
        let mut images = Vec::new();
        for path in scan_dir(dir, extensions) {
            match decode_raster(&path) {
                Ok(raster) => images.push(raster),
                Err(e) => log::warn!("Skipping {category} asset: {e}"),
            }
        }
        log::info!("Loaded {} {category} image(s) from {}", images.len(), dir.display());
        Self::new(category, images)
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn images(&self) -> &[Raster] {
        &self.images
    }

    /// Равномерный выбор; пустой пул - ошибка вызывающей стороны
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<&Raster, SynthError> {
        self.try_pick(rng)
            .ok_or_else(|| SynthError::EmptyPool(self.category.clone()))
    }

    pub fn try_pick<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&Raster> {
        if self.images.is_empty() {
            return None;
        }
        Some(&self.images[rng.random_range(0..self.images.len())])
    }
}

/// Все ресурсы одного запуска
#[derive(Debug, Clone)]
pub struct AssetLibrary {
    pub backgrounds: AssetPool,
    pub chips: AssetPool,
    pub brand_logos: AssetPool,
    pub bank_logos: AssetPool,
    pub skyboxes: AssetPool,
    pub fonts: Vec<CardFont>,
    pub signature: Option<Raster>,
    pub rfid: Option<Raster>,
}

impl Default for AssetLibrary {
    fn default() -> Self {
        Self::empty()
    }
}

impl AssetLibrary {
    /// Библиотека без ресурсов: сплошной фон и встроенный шрифт
    pub fn empty() -> Self {
        Self {
            backgrounds: AssetPool::empty("background"),
            chips: AssetPool::empty("chip"),
            brand_logos: AssetPool::empty("brand-logo"),
            bank_logos: AssetPool::empty("bank-logo"),
            skyboxes: AssetPool::empty("skybox"),
            fonts: Vec::new(),
            signature: None,
            rfid: None,
        }
    }

    /// Загрузка стандартной структуры каталогов
    ///
    /// ```text
    /// root/
    ///   front-images/ chip-images/ logo-images/ bank-logo-images/
    ///   skybox-images/ fonts/ signature.png rfid.png
    /// ```
    pub fn load(root: &Path) -> Self {
        log::info!("Loading assets from {}", root.display());
        let library = Self {
            backgrounds: AssetPool::load("background", &root.join("front-images"), IMAGE_EXTENSIONS),
            chips: AssetPool::load("chip", &root.join("chip-images"), IMAGE_EXTENSIONS),
            brand_logos: AssetPool::load("brand-logo", &root.join("logo-images"), IMAGE_EXTENSIONS),
            bank_logos: AssetPool::load("bank-logo", &root.join("bank-logo-images"), IMAGE_EXTENSIONS),
            skyboxes: AssetPool::load("skybox", &root.join("skybox-images"), SKYBOX_EXTENSIONS),
            fonts: load_fonts(&root.join("fonts")),
            signature: load_singleton(&root.join("signature.png")),
            rfid: load_singleton(&root.join("rfid.png")),
        };
        if library.fonts.is_empty() {
            log::warn!("No usable fonts found, falling back to the built-in bitmap face");
        }
        library
    }

    /// Случайный шрифт или встроенный, если пул пуст
    pub fn pick_font<R: Rng + ?Sized>(&self, rng: &mut R) -> CardFont {
        if self.fonts.is_empty() {
            return CardFont::Builtin;
        }
        self.fonts[rng.random_range(0..self.fonts.len())].clone()
    }
}

/// Файлы каталога с подходящими расширениями в отсортированном порядке
pub fn scan_dir(dir: &Path, extensions: &[&str]) -> Vec<PathBuf> {
    if !dir.is_dir() {
        log::warn!("Folder not found: {}", dir.display());
        return Vec::new();
    }
    let mut paths: Vec<PathBuf> = read_dir(dir)
        .ok()
        .into_iter()
        .flat_map(|rd| rd.filter_map(|e| e.ok()))
        .map(|e| e.path())
        .filter(|p| p.is_file() && has_extension(p, extensions))
        .collect();
    paths.sort();
    paths
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

fn decode_raster(path: &Path) -> Result<Raster, SynthError> {
    if has_extension(path, &["cubemap"]) {
        return Err(SynthError::AssetLoad {
            path: path.to_path_buf(),
            reason: "engine cubemap assets are not supported".into(),
        });
    }
    image::open(path)
        .map(|img| img.to_rgba8())
        .map_err(|e| SynthError::AssetLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

fn load_singleton(path: &Path) -> Option<Raster> {
    if !path.exists() {
        log::warn!("Optional asset not found: {}", path.display());
        return None;
    }
    match decode_raster(path) {
        Ok(raster) => Some(raster),
        Err(e) => {
            log::warn!("{e}");
            None
        }
    }
}

fn load_fonts(dir: &Path) -> Vec<CardFont> {
    scan_dir(dir, FONT_EXTENSIONS)
        .into_iter()
        .filter_map(|path| match load_font(&path) {
            Ok(font) => Some(font),
            Err(e) => {
                log::warn!("Skipping font: {e}");
                None
            }
        })
        .collect()
}

/// Шрифт принимается, только если в нём есть все цифры и латиница A-Z
pub fn load_font(path: &Path) -> Result<CardFont, SynthError> {
    let asset_err = |reason: String| SynthError::AssetLoad {
        path: path.to_path_buf(),
        reason,
    };
    let bytes = std::fs::read(path).map_err(|e| asset_err(e.to_string()))?;
    let font = FontArc::try_from_vec(bytes).map_err(|e| asset_err(e.to_string()))?;
    if let Some(missing) = ('0'..='9')
        .chain('A'..='Z')
        .find(|&ch| font.glyph_id(ch).0 == 0)
    {
        return Err(asset_err(format!("font has no glyph for '{missing}'")));
    }
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("font")
        .to_string();
    Ok(CardFont::Outline { name, font })
}
