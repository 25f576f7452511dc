//! Card Synth - генератор синтетических изображений банковских карт
//!
//! Библиотека для построения размеченного набора данных детектора:
//! - Загрузка пулов исходных изображений и шрифтов
//! - Процедурная магнитная полоса (шум, износ, царапины, дорожки)
//! - Композиция текстуры карты (фон, чип, логотипы, подпись, RFID)
//! - Случайное заполнение полей (номер, имя, срок, CVV, платёжная система)
//! - Проекция карты в кадр и расчёт рамок
//! - Экспорт разметки в формате YOLO с разбиением train/valid/test

pub mod annotation;
pub mod assets;
pub mod compositor;
pub mod config;
pub mod driver;
pub mod fields;
pub mod names;
pub mod noise;
pub mod pool;
pub mod preview;
pub mod projection;
pub mod scene;
pub mod stripe;
pub mod style;
pub mod text;

pub use annotation::{BoundingBox, ClassId, DataSplit, DatasetWriter, LabelFile, CLASS_NAMES};
pub use assets::{AssetLibrary, AssetPool, Raster};
pub use compositor::{CompositeTexture, LayerKind, TextureCompositor};
pub use config::{SplitRatios, SynthConfig};
pub use driver::{DriverControl, GenerationDriver, GenerationReport};
pub use fields::{CardSample, FieldKind, FieldRandomizer};
pub use pool::TexturePool;
pub use projection::{FlatProjector, IdentityProjector, ProjectionError, SceneProjector};
pub use stripe::{MagneticStripeSynthesizer, StripeParams};
pub use text::CardFont;

use std::path::PathBuf;

use thiserror::Error;

/// Генератор случайных чисел, используемый во всём конвейере
///
/// Xoshiro256++ даёт одинаковую последовательность на всех платформах,
/// поэтому образец воспроизводится по одному лишь зерну.
pub type SynthRng = rand_xoshiro::Xoshiro256PlusPlus;

/// Основные ошибки генератора
#[derive(Error, Debug)]
pub enum SynthError {
    #[error("Failed to load asset {path}: {reason}")]
    AssetLoad { path: PathBuf, reason: String },

    #[error("Asset pool '{0}' is empty")]
    EmptyPool(String),

    #[error("Projection error: {0}")]
    Projection(#[from] ProjectionError),

    #[error("Failed to persist {path}: {reason}")]
    Persist { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Сторона карты
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CardFace {
    Front,
    Back,
}

impl CardFace {
    pub fn is_back(self) -> bool {
        self == CardFace::Back
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = SynthError::EmptyPool("chip".into());
        assert_eq!(err.to_string(), "Asset pool 'chip' is empty");

        let err = SynthError::from(ProjectionError::Degenerate);
        assert!(err.to_string().starts_with("Projection error"));
    }
}
