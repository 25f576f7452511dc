//! Генерация имени держателя карты

use rand::Rng;

use crate::config::NameConfig;

pub const FIRST_NAMES: [&str; 100] = [
    "JAMES", "MARY", "JOHN", "PATRICIA", "ROBERT", "JENNIFER", "MICHAEL", "LINDA", "WILLIAM",
    "ELIZABETH", "DAVID", "BARBARA", "RICHARD", "SUSAN", "JOSEPH", "JESSICA", "THOMAS", "SARAH",
    "CHRISTOPHER", "KAREN", "CHARLES", "NANCY", "DANIEL", "LISA", "MATTHEW", "BETTY", "ANTHONY",
    "HELEN", "MARK", "SANDRA", "DONALD", "DONNA", "STEVEN", "CAROL", "PAUL", "RUTH", "ANDREW",
    "SHARON", "JOSHUA", "MICHELLE", "KENNETH", "LAURA", "KEVIN", "EMILY", "BRIAN", "KIMBERLY",
    "GEORGE", "DEBORAH", "EDWARD", "DOROTHY", "RONALD", "AMANDA", "TIMOTHY", "MELISSA", "JASON",
    "STEPHANIE", "JEFFREY", "REBECCA", "RYAN", "CYNTHIA", "JACOB", "KATHLEEN", "GARY", "AMY",
    "NICHOLAS", "ANGELA", "ERIC", "SHIRLEY", "JONATHAN", "ANNA", "STEPHEN", "BRENDA", "LARRY",
    "PAMELA", "JUSTIN", "NICOLE", "SCOTT", "EMMA", "BRANDON", "SAMANTHA", "BENJAMIN", "KATHERINE",
    "SAMUEL", "CHRISTINE", "FRANK", "DEBRA", "GREGORY", "RACHEL", "RAYMOND", "CATHERINE",
    "ALEXANDER", "CAROLYN", "PATRICK", "JANET", "JACK", "MARIA", "DENNIS", "HEATHER", "JERRY",
    "DIANE",
];

pub const LAST_NAMES: [&str; 100] = [
    "SMITH", "JOHNSON", "WILLIAMS", "BROWN", "JONES", "GARCIA", "MILLER", "DAVIS", "RODRIGUEZ",
    "MARTINEZ", "HERNANDEZ", "LOPEZ", "GONZALEZ", "WILSON", "ANDERSON", "THOMAS", "TAYLOR",
    "MOORE", "JACKSON", "MARTIN", "LEE", "PEREZ", "THOMPSON", "WHITE", "HARRIS", "SANCHEZ",
    "CLARK", "RAMIREZ", "LEWIS", "ROBINSON", "WALKER", "YOUNG", "ALLEN", "KING", "WRIGHT",
    "SCOTT", "TORRES", "NGUYEN", "HILL", "FLORES", "GREEN", "ADAMS", "NELSON", "BAKER", "HALL",
    "RIVERA", "CAMPBELL", "MITCHELL", "CARTER", "ROBERTS", "GOMEZ", "PHILLIPS", "EVANS", "TURNER",
    "DIAZ", "PARKER", "CRUZ", "EDWARDS", "COLLINS", "REYES", "STEWART", "MORRIS", "MORALES",
    "MURPHY", "COOK", "ROGERS", "GUTIERREZ", "ORTIZ", "MORGAN", "COOPER", "PETERSON", "BAILEY",
    "REED", "KELLY", "HOWARD", "RAMOS", "KIM", "COX", "WARD", "RICHARDSON", "WATSON", "BROOKS",
    "CHAVEZ", "WOOD", "JAMES", "BENNETT", "GRAY", "MENDOZA", "RUIZ", "HUGHES", "PRICE", "ALVAREZ",
    "CASTILLO", "SANDERS", "PATEL", "MYERS", "LONG", "ROSS", "FOSTER", "JIMENEZ",
];

pub const SUFFIXES: [&str; 5] = ["JR", "SR", "II", "III", "IV"];

/// Порядок частей имени
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameStyle {
    FirstLast,
    FirstMiddleLast,
    FirstLastSuffix,
    FirstMiddleLastSuffix,
    LastFirst,
    LastFirstMiddle,
}

impl NameStyle {
    pub const ALL: [NameStyle; 6] = [
        NameStyle::FirstLast,
        NameStyle::FirstMiddleLast,
        NameStyle::FirstLastSuffix,
        NameStyle::FirstMiddleLastSuffix,
        NameStyle::LastFirst,
        NameStyle::LastFirstMiddle,
    ];
}

/// Части имени до форматирования
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameParts<'a> {
    pub first: &'a str,
    pub middle_initial: Option<char>,
    pub last: &'a str,
    pub suffix: Option<&'a str>,
}

impl NameParts<'_> {
    /// Отсутствующая часть просто опускается
    pub fn format(&self, style: NameStyle) -> String {
        let first = self.first;
        let last = self.last;
        let middle = self.middle_initial.map(|c| format!("{c}."));
        match (style, middle.as_deref(), self.suffix) {
            (NameStyle::FirstMiddleLast, Some(m), _) => format!("{first} {m} {last}"),
            (NameStyle::FirstLastSuffix, _, Some(s)) => format!("{first} {last} {s}"),
            (NameStyle::FirstMiddleLastSuffix, m, s) => {
                let mut out = first.to_string();
                if let Some(m) = m {
                    out.push(' ');
                    out.push_str(m);
                }
                out.push(' ');
                out.push_str(last);
                if let Some(s) = s {
                    out.push(' ');
                    out.push_str(s);
                }
                out
            }
            (NameStyle::LastFirst, _, _) => format!("{last}, {first}"),
            (NameStyle::LastFirstMiddle, Some(m), _) => format!("{last}, {first} {m}"),
            (NameStyle::LastFirstMiddle, None, _) => format!("{last}, {first}"),
            _ => format!("{first} {last}"),
        }
    }
}

/// Генератор имён
#[derive(Debug, Clone, Default)]
pub struct NameGenerator {
    config: NameConfig,
}

impl NameGenerator {
    pub fn new(config: NameConfig) -> Self {
        Self { config }
    }

    /// Случайное имя в случайном стиле
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        let first = FIRST_NAMES[rng.random_range(0..FIRST_NAMES.len())];
        let last = LAST_NAMES[rng.random_range(0..LAST_NAMES.len())];

        let middle_initial = (self.config.use_middle_initial
            && rng.random::<f32>() < self.config.middle_initial_probability)
            .then(|| char::from(b'A' + rng.random_range(0..26u8)));
        let suffix = (self.config.use_suffix
            && rng.random::<f32>() < self.config.suffix_probability)
            .then(|| SUFFIXES[rng.random_range(0..SUFFIXES.len())]);

        let style = NameStyle::ALL[rng.random_range(0..NameStyle::ALL.len())];
        NameParts {
            first,
            middle_initial,
            last,
            suffix,
        }
        .format(style)
    }

    /// Имя в формате дорожки 1 магнитной полосы: `SURNAME/GIVEN`
    pub fn track_name<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        let first = FIRST_NAMES[rng.random_range(0..FIRST_NAMES.len())];
        let last = LAST_NAMES[rng.random_range(0..LAST_NAMES.len())];
        format!("{last}/{first}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    use crate::SynthRng;

    fn parts() -> NameParts<'static> {
        NameParts {
            first: "JOHN",
            middle_initial: Some('Q'),
            last: "SMITH",
            suffix: Some("JR"),
        }
    }

    #[test]
    fn test_name_styles() {
        let p = parts();
        assert_eq!(p.format(NameStyle::FirstLast), "JOHN SMITH");
        assert_eq!(p.format(NameStyle::FirstMiddleLast), "JOHN Q. SMITH");
        assert_eq!(p.format(NameStyle::FirstLastSuffix), "JOHN SMITH JR");
        assert_eq!(p.format(NameStyle::FirstMiddleLastSuffix), "JOHN Q. SMITH JR");
        assert_eq!(p.format(NameStyle::LastFirst), "SMITH, JOHN");
        assert_eq!(p.format(NameStyle::LastFirstMiddle), "SMITH, JOHN Q.");
    }

    #[test]
    fn test_missing_parts_are_dropped() {
        let p = NameParts {
            middle_initial: None,
            suffix: None,
            ..parts()
        };
        assert_eq!(p.format(NameStyle::FirstMiddleLast), "JOHN SMITH");
        assert_eq!(p.format(NameStyle::FirstMiddleLastSuffix), "JOHN SMITH");
        assert_eq!(p.format(NameStyle::LastFirstMiddle), "SMITH, JOHN");
    }

    #[test]
    fn test_generated_names_use_tables() {
        let generator = NameGenerator::default();
        let mut rng = SynthRng::seed_from_u64(11);
        for _ in 0..50 {
            let name = generator.generate(&mut rng);
            assert!(FIRST_NAMES.iter().any(|f| name.contains(f)));
            assert!(name.chars().all(|c| c.is_ascii_uppercase() || " .,".contains(c)));
        }
        let track = generator.track_name(&mut rng);
        assert_eq!(track.matches('/').count(), 1);
    }
}
