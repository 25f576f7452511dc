//! Конфигурация генератора
//!
//! Все параметры имеют значения по умолчанию, совпадающие с эталонной сценой.
//! Файл конфигурации (JSON) может переопределять любое подмножество полей:
//! отсутствующие поля берутся из `Default`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::stripe::StripeParams;
use crate::SynthError;

/// Закрытый диапазон `[min, max]` для равномерной выборки
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Span {
    pub min: f32,
    pub max: f32,
}

impl Span {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Равномерная выборка; вырожденный диапазон всегда даёт `min`
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        if self.max <= self.min {
            return self.min;
        }
        rng.random_range(self.min..=self.max)
    }

    fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min <= self.max
    }
}

/// Вероятности появления необязательных полей карты
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldProbabilities {
    /// Номер карты
    pub number: f32,
    /// Имя держателя
    pub name: f32,
    /// Срок действия
    pub expiry: f32,
    /// CVV/CVC
    pub cvv: f32,
    /// Название платёжной системы
    pub brand: f32,
}

impl Default for FieldProbabilities {
    fn default() -> Self {
        Self {
            number: 0.9,
            name: 0.8,
            expiry: 0.9,
            cvv: 0.8,
            brand: 0.7,
        }
    }
}

/// Доли выборок train/valid/test (сумма должна быть равна 1)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SplitRatios {
    pub train: f64,
    pub valid: f64,
    pub test: f64,
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self {
            train: 0.7,
            valid: 0.2,
            test: 0.1,
        }
    }
}

impl SplitRatios {
    pub fn validate(&self) -> Result<(), SynthError> {
        let parts = [self.train, self.valid, self.test];
        if parts.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(SynthError::Config(format!(
                "split fractions must be non-negative, got {parts:?}"
            )));
        }
        let sum: f64 = parts.iter().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(SynthError::Config(format!(
                "split fractions must sum to 1.0, got {sum}"
            )));
        }
        Ok(())
    }
}

/// Включение отдельных слоёв наложения
///
/// Принадлежность слоя стороне карты фиксирована: чип только на лицевой
/// стороне, полоса, подпись и RFID только на обороте. Здесь слои можно лишь
/// отключить.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerToggles {
    pub chip: bool,
    pub brand_logo: bool,
    pub bank_logo: bool,
    pub stripe: bool,
    pub signature: bool,
    pub rfid: bool,
}

impl Default for LayerToggles {
    fn default() -> Self {
        Self {
            chip: true,
            brand_logo: true,
            bank_logo: true,
            stripe: true,
            signature: true,
            rfid: true,
        }
    }
}

/// Геометрия и прозрачность накладываемых изображений
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayLayout {
    /// Ширина чипа в долях ширины карты
    pub chip_size: f32,
    pub brand_logo_size: f32,
    pub bank_logo_size: f32,
    pub signature_size: f32,
    pub rfid_size: f32,
    /// Отступ от края карты в долях размера текстуры
    pub edge_padding: f32,
    pub chip_opacity: f32,
    pub brand_logo_opacity: f32,
    pub bank_logo_opacity: f32,
    pub signature_opacity: f32,
    pub rfid_opacity: f32,
    /// Максимальное смещение подписи (x, y) в координатах карты
    pub signature_jitter: [f32; 2],
    pub layers: LayerToggles,
}

impl Default for OverlayLayout {
    fn default() -> Self {
        Self {
            chip_size: 0.14,
            brand_logo_size: 0.2,
            bank_logo_size: 0.15,
            signature_size: 0.5,
            rfid_size: 0.08,
            edge_padding: 0.05,
            chip_opacity: 1.0,
            brand_logo_opacity: 1.0,
            bank_logo_opacity: 1.0,
            signature_opacity: 1.0,
            rfid_opacity: 1.0,
            signature_jitter: [0.05, 0.03],
            layers: LayerToggles::default(),
        }
    }
}

/// Стиль текста
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TextStyleConfig {
    /// Эффект хромированной фольги
    pub chrome: bool,
    /// Верхняя граница "отражения" для хрома
    pub chrome_intensity: f32,
    /// Вероятность эффекта тиснения (тень + обводка)
    pub emboss_probability: f32,
    /// Множитель размера шрифта
    pub font_scale: Span,
    /// Перемешивать вертикальный порядок строк
    pub shuffle_rows: bool,
    /// Год окончания срока действия (две цифры)
    pub expiry_year_min: u8,
    pub expiry_year_max: u8,
}

impl Default for TextStyleConfig {
    fn default() -> Self {
        Self {
            chrome: true,
            chrome_intensity: 0.5,
            emboss_probability: 0.7,
            font_scale: Span::new(0.9, 1.1),
            shuffle_rows: true,
            expiry_year_min: 24,
            expiry_year_max: 29,
        }
    }
}

/// Генерация имени держателя
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NameConfig {
    pub use_middle_initial: bool,
    pub middle_initial_probability: f32,
    pub use_suffix: bool,
    pub suffix_probability: f32,
}

impl Default for NameConfig {
    fn default() -> Self {
        Self {
            use_middle_initial: true,
            middle_initial_probability: 0.3,
            use_suffix: true,
            suffix_probability: 0.1,
        }
    }
}

/// Смещения блока текста (в координатах карты, диапазон [-1, 1])
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    pub front_x: Span,
    pub front_y: Span,
    /// Оборотная сторона получает более широкий разброс по горизонтали
    pub back_x: Span,
    pub back_y: Span,
    /// Индивидуальное смещение каждого поля, ±
    pub per_field: f32,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            front_x: Span::new(0.0, 0.05),
            front_y: Span::new(-0.03, 0.01),
            back_x: Span::new(0.0, 0.2),
            back_y: Span::new(-0.03, 0.03),
            per_field: 0.01,
        }
    }
}

/// Плоская "камера": масштаб и поворот карты в кадре
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Поворот карты, градусы
    pub rotation_degrees: Span,
    /// Ширина карты в долях ширины кадра
    pub card_fill: Span,
    /// Минимальный зазор между картой и краем кадра, пиксели
    pub frame_margin: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            rotation_degrees: Span::new(-5.0, 5.0),
            card_fill: Span::new(0.55, 0.85),
            frame_margin: 8,
        }
    }
}

/// Формат изображений в режиме без разметки
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlainFormat {
    Png,
    Jpg,
}

impl PlainFormat {
    pub fn extension(self) -> &'static str {
        match self {
            PlainFormat::Png => "png",
            PlainFormat::Jpg => "jpg",
        }
    }
}

/// Параметры вывода
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Корневой каталог набора данных
    pub root: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Писать YOLO-разметку (иначе только изображения)
    pub yolo: bool,
    /// Подкаталог для режима без разметки
    pub plain_dir: String,
    pub plain_format: PlainFormat,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("output"),
            width: 1024,
            height: 1024,
            yolo: true,
            plain_dir: "cards".to_string(),
            plain_format: PlainFormat::Png,
        }
    }
}

/// Полная конфигурация запуска
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    /// Количество изображений за один проход
    pub samples: u32,
    /// Зерно генератора; без него берётся энтропия ОС
    pub seed: Option<u64>,
    /// Каталог с исходными изображениями и шрифтами
    pub assets_root: PathBuf,
    /// Вероятность оборотной стороны
    pub back_probability: f32,
    pub fields: FieldProbabilities,
    /// Доля смешивания фона с цветом карты
    pub color_blend: Span,
    pub back_blend_amount: f32,
    pub back_color_scale: f32,
    /// Размер текстуры карты
    pub card_width: u32,
    pub card_height: u32,
    pub overlays: OverlayLayout,
    pub stripe: StripeParams,
    pub text: TextStyleConfig,
    pub names: NameConfig,
    pub placement: PlacementConfig,
    pub camera: CameraConfig,
    pub splits: SplitRatios,
    pub output: OutputConfig,
    /// Пауза между образцами, мс
    pub generation_delay_ms: u64,
    /// Бесконечная генерация: после `samples` счётчик сбрасывается
    pub continuous: bool,
    /// Ограничение числа проходов в бесконечном режиме
    pub max_loops: Option<u32>,
    /// Период очистки пула буферов, секунды
    pub housekeeping_interval_secs: f32,
    /// Ёмкость пула буферов
    pub pool_capacity: usize,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            samples: 10,
            seed: None,
            assets_root: PathBuf::from("assets"),
            back_probability: 0.5,
            fields: FieldProbabilities::default(),
            color_blend: Span::new(0.0, 0.4),
            back_blend_amount: 1.0,
            back_color_scale: 0.5,
            card_width: 1012,
            card_height: 638,
            overlays: OverlayLayout::default(),
            stripe: StripeParams::default(),
            text: TextStyleConfig::default(),
            names: NameConfig::default(),
            placement: PlacementConfig::default(),
            camera: CameraConfig::default(),
            splits: SplitRatios::default(),
            output: OutputConfig::default(),
            generation_delay_ms: 0,
            continuous: false,
            max_loops: None,
            housekeeping_interval_secs: 10.0,
            pool_capacity: 10,
        }
    }
}

impl SynthConfig {
    /// Загрузка конфигурации из JSON-файла
    pub fn from_file(path: &Path) -> Result<Self, SynthError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SynthError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: SynthConfig = serde_json::from_str(&text).map_err(|e| {
            SynthError::Config(format!("cannot parse {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, SynthError> {
        serde_json::to_string_pretty(self).map_err(|e| SynthError::Config(e.to_string()))
    }

    /// Проверка согласованности параметров
    pub fn validate(&self) -> Result<(), SynthError> {
        if self.samples == 0 {
            return Err(SynthError::Config("samples must be positive".into()));
        }
        if self.output.width == 0 || self.output.height == 0 {
            return Err(SynthError::Config(format!(
                "output size must be positive, got {}x{}",
                self.output.width, self.output.height
            )));
        }
        if self.card_width == 0 || self.card_height == 0 {
            return Err(SynthError::Config(format!(
                "card texture size must be positive, got {}x{}",
                self.card_width, self.card_height
            )));
        }

        let probabilities = [
            ("back_probability", self.back_probability),
            ("fields.number", self.fields.number),
            ("fields.name", self.fields.name),
            ("fields.expiry", self.fields.expiry),
            ("fields.cvv", self.fields.cvv),
            ("fields.brand", self.fields.brand),
            ("back_blend_amount", self.back_blend_amount),
            ("text.emboss_probability", self.text.emboss_probability),
            ("names.middle_initial_probability", self.names.middle_initial_probability),
            ("names.suffix_probability", self.names.suffix_probability),
            ("stripe.opacity", self.stripe.opacity),
            ("stripe.track_data_opacity", self.stripe.track_data_opacity),
        ];
        for (name, p) in probabilities {
            if !(0.0..=1.0).contains(&p) {
                return Err(SynthError::Config(format!("{name} must be in [0, 1], got {p}")));
            }
        }

        let spans = [
            ("color_blend", self.color_blend),
            ("text.font_scale", self.text.font_scale),
            ("placement.front_x", self.placement.front_x),
            ("placement.front_y", self.placement.front_y),
            ("placement.back_x", self.placement.back_x),
            ("placement.back_y", self.placement.back_y),
            ("camera.rotation_degrees", self.camera.rotation_degrees),
            ("camera.card_fill", self.camera.card_fill),
        ];
        for (name, span) in spans {
            if !span.is_valid() {
                return Err(SynthError::Config(format!(
                    "{name} must satisfy min <= max, got [{}, {}]",
                    span.min, span.max
                )));
            }
        }
        if self.color_blend.min < 0.0 || self.color_blend.max > 1.0 {
            return Err(SynthError::Config("color_blend must lie within [0, 1]".into()));
        }
        if self.camera.card_fill.min <= 0.0 || self.camera.card_fill.max > 1.0 {
            return Err(SynthError::Config("camera.card_fill must lie within (0, 1]".into()));
        }
        if self.text.expiry_year_min > self.text.expiry_year_max || self.text.expiry_year_max > 99 {
            return Err(SynthError::Config(format!(
                "expiry years must be an ordered pair in 0..=99, got {}..={}",
                self.text.expiry_year_min, self.text.expiry_year_max
            )));
        }
        self.housekeeping_interval()?;

        self.splits.validate()
    }

    /// Период очистки пула; ноль, NaN и значения вне `Duration` отклоняются
    pub fn housekeeping_interval(&self) -> Result<Duration, SynthError> {
        let secs = self.housekeeping_interval_secs;
        match Duration::try_from_secs_f32(secs) {
            Ok(interval) if secs > 0.0 => Ok(interval),
            _ => Err(SynthError::Config(format!(
                "housekeeping_interval_secs must be a positive number of seconds, got {secs}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(SynthConfig::default().validate().is_ok());
    }

    #[test]
    fn test_split_sum_rejected() {
        let mut config = SynthConfig::default();
        config.splits = SplitRatios {
            train: 0.7,
            valid: 0.2,
            test: 0.2,
        };
        assert!(matches!(config.validate(), Err(SynthError::Config(_))));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SynthConfig =
            serde_json::from_str(r#"{ "samples": 3, "fields": { "number": 1.0 } }"#).unwrap();
        assert_eq!(config.samples, 3);
        assert_eq!(config.fields.number, 1.0);
        assert_eq!(config.fields.name, 0.8);
        assert_eq!(config.output.width, 1024);
    }

    #[test]
    fn test_probability_out_of_range() {
        let mut config = SynthConfig::default();
        config.fields.cvv = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_housekeeping_interval_bounds() {
        let mut config = SynthConfig::default();
        assert_eq!(config.housekeeping_interval().unwrap(), Duration::from_secs(10));

        for secs in [0.0, -1.0, f32::NAN, f32::INFINITY, 1e20] {
            config.housekeeping_interval_secs = secs;
            assert!(
                matches!(config.validate(), Err(SynthError::Config(_))),
                "{secs} accepted"
            );
        }
    }

    #[test]
    fn test_degenerate_span_sample() {
        let mut rng = rand::rng();
        assert_eq!(Span::new(0.5, 0.5).sample(&mut rng), 0.5);
    }
}
