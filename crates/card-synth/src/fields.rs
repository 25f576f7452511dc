//! Модуль случайного заполнения карты
//!
//! Для каждого образца решает, какие поля присутствуют, что в них написано,
//! каким шрифтом и цветом, и где они окажутся на текстуре. Расположение
//! задаётся декларативным шаблоном `CardTemplate`.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::annotation::ClassId;
use crate::assets::AssetLibrary;
use crate::config::{Span, SynthConfig};
use crate::names::NameGenerator;
use crate::style::{scale, Rgb, TextStyle, CARD_COLORS};
use crate::text::CardFont;
use crate::CardFace;

pub const BRANDS: [&str; 4] = ["VISA", "MASTERCARD", "AMEX", "DISCOVER"];

/// "Expires On" встречается вдвое чаще остальных
pub const EXPIRES_LABELS: [&str; 5] = ["Expires", "Expires On", "Expires On", "Exp", "Exp Date"];
pub const CVC_LABELS: [&str; 4] = ["CVC", "CVV", "Sec Code", "CVC2"];

const ISSUER_PREFIXES: [char; 3] = ['4', '5', '3'];

/// Вид текстового поля карты
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldKind {
    Name,
    Number,
    Expires,
    Cvc,
    ExpiresLabel,
    CvcLabel,
    BrandLogo,
}

impl FieldKind {
    pub const ALL: [FieldKind; 7] = [
        FieldKind::Name,
        FieldKind::Number,
        FieldKind::Expires,
        FieldKind::Cvc,
        FieldKind::ExpiresLabel,
        FieldKind::CvcLabel,
        FieldKind::BrandLogo,
    ];

    /// Класс разметки; подписи и название бренда не размечаются
    pub fn class_id(self) -> Option<ClassId> {
        match self {
            FieldKind::Name => Some(ClassId::Name),
            FieldKind::Number => Some(ClassId::Number),
            FieldKind::Expires => Some(ClassId::Expires),
            FieldKind::Cvc => Some(ClassId::Cvc),
            _ => None,
        }
    }

    /// Высота шрифта в долях высоты текстуры
    pub fn font_size(self) -> f32 {
        match self {
            FieldKind::Number => 0.085,
            FieldKind::Name => 0.07,
            FieldKind::Expires | FieldKind::Cvc => 0.065,
            FieldKind::ExpiresLabel | FieldKind::CvcLabel => 0.035,
            FieldKind::BrandLogo => 0.08,
        }
    }

    /// Поле-значение, к которому привязана подпись
    pub fn label_of(self) -> Option<FieldKind> {
        match self {
            FieldKind::ExpiresLabel => Some(FieldKind::Expires),
            FieldKind::CvcLabel => Some(FieldKind::Cvc),
            _ => None,
        }
    }
}

/// Слот шаблона: поле и его левая граница (координаты карты)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemplateSlot {
    pub kind: FieldKind,
    pub x: f32,
}

/// Строка шаблона: поля с общей вертикальной позицией
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateRow {
    /// Верхняя граница строки
    pub y: f32,
    pub slots: Vec<TemplateSlot>,
}

/// Декларативная раскладка одной стороны карты
#[derive(Debug, Clone, PartialEq)]
pub struct CardTemplate {
    pub rows: Vec<TemplateRow>,
    /// Фиксированный слот названия платёжной системы
    pub brand: [f32; 2],
}

impl CardTemplate {
    pub fn front() -> Self {
        Self {
            rows: vec![
                TemplateRow {
                    y: 0.18,
                    slots: vec![TemplateSlot { kind: FieldKind::Number, x: -0.82 }],
                },
                TemplateRow {
                    y: 0.45,
                    slots: vec![
                        TemplateSlot { kind: FieldKind::Expires, x: -0.1 },
                        TemplateSlot { kind: FieldKind::Cvc, x: 0.5 },
                    ],
                },
                TemplateRow {
                    y: 0.7,
                    slots: vec![TemplateSlot { kind: FieldKind::Name, x: -0.82 }],
                },
            ],
            brand: [-0.85, -0.82],
        }
    }

    pub fn back() -> Self {
        Self {
            rows: vec![
                TemplateRow {
                    y: -0.25,
                    slots: vec![TemplateSlot { kind: FieldKind::Number, x: -0.85 }],
                },
                TemplateRow {
                    y: 0.5,
                    slots: vec![
                        TemplateSlot { kind: FieldKind::Name, x: -0.85 },
                        TemplateSlot { kind: FieldKind::Cvc, x: 0.35 },
                    ],
                },
                TemplateRow {
                    y: 0.72,
                    slots: vec![TemplateSlot { kind: FieldKind::Expires, x: -0.3 }],
                },
            ],
            brand: [0.3, -0.05],
        }
    }

    pub fn for_face(face: CardFace) -> Self {
        match face {
            CardFace::Front => Self::front(),
            CardFace::Back => Self::back(),
        }
    }

    /// Позиция слота поля, если оно есть в шаблоне
    pub fn slot(&self, kind: FieldKind) -> Option<[f32; 2]> {
        if kind == FieldKind::BrandLogo {
            return Some(self.brand);
        }
        self.rows.iter().find_map(|row| {
            row.slots
                .iter()
                .find(|s| s.kind == kind)
                .map(|s| [s.x, row.y])
        })
    }

    /// Перестановка вертикальных позиций строк; состав строк не меняется
    pub fn shuffle_rows<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let mut ys: Vec<f32> = self.rows.iter().map(|r| r.y).collect();
        ys.shuffle(rng);
        for (row, y) in self.rows.iter_mut().zip(ys) {
            row.y = y;
        }
    }
}

/// Поле с окончательным положением на текстуре
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedField {
    pub kind: FieldKind,
    pub text: String,
    /// Левый верхний угол в координатах карты. Для подписей это точка
    /// привязки поля-значения: сама подпись ставится слева от него.
    pub anchor: [f32; 2],
    /// Высота шрифта в долях высоты текстуры
    pub size: f32,
}

/// Один образец генерации
#[derive(Debug, Clone)]
pub struct CardSample {
    pub face: CardFace,
    /// Текст каждого присутствующего поля
    pub fields: BTreeMap<FieldKind, String>,
    pub background_color: Rgb,
    pub color_blend_amount: f32,
    pub font: CardFont,
    pub style: TextStyle,
    /// Индивидуальное смещение поля (без общего смещения блока)
    pub placement_jitter: BTreeMap<FieldKind, [f32; 2]>,
    /// Общее смещение блока текста
    pub group_offset: [f32; 2],
    /// Поля в порядке отрисовки: значения раньше подписей
    pub layout: Vec<PlacedField>,
}

impl CardSample {
    pub fn is_back(&self) -> bool {
        self.face.is_back()
    }

    pub fn has(&self, kind: FieldKind) -> bool {
        self.fields.contains_key(&kind)
    }
}

/// Генератор образцов
pub struct FieldRandomizer {
    config: SynthConfig,
    names: NameGenerator,
}

impl FieldRandomizer {
    pub fn new(config: SynthConfig) -> Self {
        let names = NameGenerator::new(config.names.clone());
        Self { config, names }
    }

    /// Новый образец; вся случайность берётся из `rng`
    pub fn randomize<R: Rng + ?Sized>(&self, library: &AssetLibrary, rng: &mut R) -> CardSample {
        let cfg = &self.config;
        let face = if rng.random::<f32>() < cfg.back_probability {
            CardFace::Back
        } else {
            CardFace::Front
        };

        let mut background_color = CARD_COLORS[rng.random_range(0..CARD_COLORS.len())];
        let mut color_blend_amount = cfg.color_blend.sample(rng);
        if face.is_back() {
            background_color = scale(background_color, cfg.back_color_scale);
            color_blend_amount = cfg.back_blend_amount;
        }

        let fields = self.pick_fields(rng);
        let font = library.pick_font(rng);
        let style = TextStyle::random(&cfg.text, rng);

        let mut template = CardTemplate::for_face(face);
        if cfg.text.shuffle_rows {
            template.shuffle_rows(rng);
        }

        let (span_x, span_y) = match face {
            CardFace::Front => (cfg.placement.front_x, cfg.placement.front_y),
            CardFace::Back => (cfg.placement.back_x, cfg.placement.back_y),
        };
        let group_offset = [span_x.sample(rng), span_y.sample(rng)];

        let per_field = Span::new(-cfg.placement.per_field, cfg.placement.per_field);
        let mut placement_jitter = BTreeMap::new();
        let mut layout = Vec::with_capacity(fields.len());

        // Значения раньше подписей: подписи привязываются к готовым полям
        let mut ordered: Vec<(&FieldKind, &String)> = fields.iter().collect();
        ordered.sort_by_key(|(kind, _)| kind.label_of().is_some());

        for (&kind, text) in ordered {
            let slot_kind = kind.label_of().unwrap_or(kind);
            let Some(slot) = template.slot(slot_kind) else {
                continue;
            };
            let jitter = [per_field.sample(rng), per_field.sample(rng)];
            placement_jitter.insert(kind, jitter);

            let size = kind.font_size() * cfg.text.font_scale.sample(rng);
            let offset = if kind == FieldKind::BrandLogo {
                [0.0, 0.0]
            } else {
                group_offset
            };
            layout.push(PlacedField {
                kind,
                text: text.clone(),
                anchor: [
                    slot[0] + offset[0] + jitter[0],
                    slot[1] + offset[1] + jitter[1],
                ],
                size,
            });
        }

        CardSample {
            face,
            fields,
            background_color,
            color_blend_amount,
            font,
            style,
            placement_jitter,
            group_offset,
            layout,
        }
    }

    /// Независимые броски на каждое поле и его содержимое
    fn pick_fields<R: Rng + ?Sized>(&self, rng: &mut R) -> BTreeMap<FieldKind, String> {
        let p = &self.config.fields;
        let text = &self.config.text;
        let mut fields = BTreeMap::new();

        if rng.random::<f32>() < p.number {
            fields.insert(FieldKind::Number, format_card_number(&random_pan(rng)));
        }
        if rng.random::<f32>() < p.name {
            fields.insert(FieldKind::Name, self.names.generate(rng));
        }
        if rng.random::<f32>() < p.expiry {
            fields.insert(
                FieldKind::Expires,
                random_expiry(text.expiry_year_min, text.expiry_year_max, rng),
            );
            let label = EXPIRES_LABELS[rng.random_range(0..EXPIRES_LABELS.len())];
            fields.insert(FieldKind::ExpiresLabel, label.replace(' ', "\n"));
        }
        if rng.random::<f32>() < p.cvv {
            fields.insert(FieldKind::Cvc, rng.random_range(100..=999u32).to_string());
            let label = CVC_LABELS[rng.random_range(0..CVC_LABELS.len())];
            fields.insert(FieldKind::CvcLabel, label.replace(' ', "\n"));
        }
        if rng.random::<f32>() < p.brand {
            fields.insert(
                FieldKind::BrandLogo,
                BRANDS[rng.random_range(0..BRANDS.len())].to_string(),
            );
        }
        fields
    }
}

/// 16 цифр с префиксом эмитента 4/5/3
pub fn random_pan<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut pan = String::with_capacity(16);
    pan.push(ISSUER_PREFIXES[rng.random_range(0..ISSUER_PREFIXES.len())]);
    for _ in 1..16 {
        pan.push(char::from(b'0' + rng.random_range(0..10u8)));
    }
    pan
}

/// Группы по четыре цифры через пробел
pub fn format_card_number(digits: &str) -> String {
    digits
        .as_bytes()
        .chunks(4)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Срок действия `MM/YY`
pub fn random_expiry<R: Rng + ?Sized>(year_min: u8, year_max: u8, rng: &mut R) -> String {
    let month = rng.random_range(1..=12u8);
    let year = rng.random_range(year_min..=year_max.max(year_min));
    format!("{month:02}/{year:02}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    use crate::SynthRng;

    fn randomizer() -> FieldRandomizer {
        FieldRandomizer::new(SynthConfig::default())
    }

    #[test]
    fn test_card_number_grouping() {
        assert_eq!(format_card_number("4123456789012345"), "4123 4567 8901 2345");
    }

    #[test]
    fn test_pan_prefix_and_length() {
        let mut rng = SynthRng::seed_from_u64(8);
        for _ in 0..100 {
            let pan = random_pan(&mut rng);
            assert_eq!(pan.len(), 16);
            assert!(pan.chars().all(|c| c.is_ascii_digit()));
            assert!(ISSUER_PREFIXES.contains(&pan.chars().next().unwrap()));
        }
    }

    #[test]
    fn test_expiry_format() {
        let mut rng = SynthRng::seed_from_u64(9);
        for _ in 0..100 {
            let e = random_expiry(24, 29, &mut rng);
            let (mm, yy) = e.split_once('/').unwrap();
            assert!((1..=12).contains(&mm.parse::<u32>().unwrap()));
            assert!((24..=29).contains(&yy.parse::<u32>().unwrap()));
            assert_eq!(mm.len(), 2);
        }
    }

    #[test]
    fn test_labels_follow_values() {
        let mut rng = SynthRng::seed_from_u64(10);
        let library = AssetLibrary::empty();
        let randomizer = randomizer();
        for _ in 0..200 {
            let sample = randomizer.randomize(&library, &mut rng);
            assert_eq!(sample.has(FieldKind::Expires), sample.has(FieldKind::ExpiresLabel));
            assert_eq!(sample.has(FieldKind::Cvc), sample.has(FieldKind::CvcLabel));
            if let Some(label) = sample.fields.get(&FieldKind::ExpiresLabel) {
                assert!(!label.contains(' '));
            }
            // Подписи идут после своих значений
            let first_label = sample.layout.iter().position(|f| f.kind.label_of().is_some());
            if let Some(i) = first_label {
                assert!(sample.layout[i..].iter().all(|f| f.kind.label_of().is_some()));
            }
        }
    }

    #[test]
    fn test_back_face_color() {
        let mut config = SynthConfig::default();
        config.back_probability = 1.0;
        let randomizer = FieldRandomizer::new(config);
        let mut rng = SynthRng::seed_from_u64(12);
        let sample = randomizer.randomize(&AssetLibrary::empty(), &mut rng);
        assert!(sample.is_back());
        assert_eq!(sample.color_blend_amount, 1.0);
        assert!(sample.background_color.iter().all(|c| *c <= 0.5));
    }

    #[test]
    fn test_all_fields_forced() {
        let mut config = SynthConfig::default();
        config.fields.number = 1.0;
        config.fields.name = 1.0;
        config.fields.expiry = 1.0;
        config.fields.cvv = 1.0;
        config.fields.brand = 1.0;
        let randomizer = FieldRandomizer::new(config);
        let sample = randomizer.randomize(&AssetLibrary::empty(), &mut SynthRng::seed_from_u64(1));
        assert_eq!(sample.fields.len(), FieldKind::ALL.len());
        assert_eq!(sample.layout.len(), FieldKind::ALL.len());
    }

    #[test]
    fn test_shuffle_keeps_row_membership() {
        let mut rng = SynthRng::seed_from_u64(77);
        let mut template = CardTemplate::front();
        let before: Vec<Vec<FieldKind>> = template
            .rows
            .iter()
            .map(|r| r.slots.iter().map(|s| s.kind).collect())
            .collect();
        let mut ys: Vec<f32> = template.rows.iter().map(|r| r.y).collect();
        template.shuffle_rows(&mut rng);

        let after: Vec<Vec<FieldKind>> = template
            .rows
            .iter()
            .map(|r| r.slots.iter().map(|s| s.kind).collect())
            .collect();
        assert_eq!(before, after);

        let mut shuffled: Vec<f32> = template.rows.iter().map(|r| r.y).collect();
        ys.sort_by(f32::total_cmp);
        shuffled.sort_by(f32::total_cmp);
        assert_eq!(ys, shuffled);
    }
}
