//! Integration tests for card dataset generation

use std::fs;
use std::path::Path;

use card_synth::annotation::annotate;
use card_synth::fields::format_card_number;
use card_synth::projection::IdentityProjector;
use card_synth::{
    AssetLibrary, AssetPool, CardFace, ClassId, DataSplit, DriverControl, FieldRandomizer,
    GenerationDriver, LabelFile, LayerKind, SynthConfig, SynthRng, TextureCompositor, TexturePool,
    CLASS_NAMES,
};
use image::{Rgba, RgbaImage};
use rand::SeedableRng;

/// Helper to create a flat test image
fn create_test_image(width: u32, height: u32, color: [u8; 4]) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Rgba(color))
}

fn test_library() -> AssetLibrary {
    let mut library = AssetLibrary::empty();
    library.backgrounds = AssetPool::new("background", vec![create_test_image(253, 160, [30, 60, 150, 255])]);
    library.chips = AssetPool::new("chip", vec![create_test_image(40, 30, [210, 180, 80, 255])]);
    library.brand_logos = AssetPool::new("brand-logo", vec![create_test_image(50, 30, [240, 20, 20, 255])]);
    library.bank_logos = AssetPool::new("bank-logo", vec![create_test_image(40, 20, [250, 250, 250, 255])]);
    library.signature = Some(create_test_image(100, 20, [240, 235, 220, 255]));
    library.rfid = Some(create_test_image(16, 16, [200, 200, 200, 255]));
    library
}

fn test_config(root: &Path) -> SynthConfig {
    let mut config = SynthConfig::default();
    config.samples = 6;
    config.seed = Some(11);
    config.card_width = 253;
    config.card_height = 160;
    config.output.width = 320;
    config.output.height = 320;
    config.output.root = root.to_path_buf();
    config
}

fn init_logging() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .is_test(true)
        .try_init();
}

#[test]
fn test_dataset_layout() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let mut driver = GenerationDriver::new(test_config(dir.path()), test_library());
    let report = driver.run(&DriverControl::new()).unwrap();
    assert_eq!(report.generated, 6);

    let yolo = dir.path().join("yolo");
    for split in DataSplit::ALL {
        assert!(yolo.join(split.dir_name()).join("images").is_dir());
        assert!(yolo.join(split.dir_name()).join("labels").is_dir());
    }
    assert!(yolo.join("data.yaml").is_file());

    let mut images = 0;
    for split in DataSplit::ALL {
        let images_dir = yolo.join(split.dir_name()).join("images");
        for entry in fs::read_dir(&images_dir).unwrap() {
            let path = entry.unwrap().path();
            assert_eq!(path.extension().unwrap(), "jpg");
            let stem = path.file_stem().unwrap().to_str().unwrap().to_string();
            let label_path = yolo.join(split.dir_name()).join("labels").join(format!("{stem}.txt"));
            assert!(label_path.is_file(), "missing labels for {stem}");
            images += 1;
        }
        assert_eq!(
            fs::read_dir(&images_dir).unwrap().count() as u64,
            report.split_count(split)
        );
    }
    assert_eq!(images, 6);
}

#[test]
fn test_written_labels_parse_back() {
    let dir = tempfile::tempdir().unwrap();
    let mut driver = GenerationDriver::new(test_config(dir.path()), test_library());
    driver.run(&DriverControl::new()).unwrap();

    let mut lines = 0;
    for split in DataSplit::ALL {
        let labels_dir = dir.path().join("yolo").join(split.dir_name()).join("labels");
        for entry in fs::read_dir(labels_dir).unwrap() {
            let text = fs::read_to_string(entry.unwrap().path()).unwrap();
            let file: LabelFile = text.parse().unwrap();
            // Card box always comes first
            assert!(matches!(file.boxes[0].class_id, ClassId::Front | ClassId::Back));
            assert_eq!(
                file.boxes.iter().filter(|b| b.class_id.id() >= 4).count(),
                1,
                "exactly one card box"
            );
            for (line, bbox) in text.lines().zip(&file.boxes) {
                assert_eq!(line.split(' ').count(), 5);
                assert!(bbox.is_normalized());
                lines += 1;
            }
        }
    }
    assert!(lines >= 6);
}

#[test]
fn test_classes_manifest_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.samples = 1;
    GenerationDriver::new(config, AssetLibrary::empty())
        .run(&DriverControl::new())
        .unwrap();

    let classes = fs::read_to_string(dir.path().join("yolo/classes.txt")).unwrap();
    assert_eq!(classes, "Name\nNumber\nExpires\nCVC\nFront\nBack\n");
    assert_eq!(classes.lines().collect::<Vec<_>>(), CLASS_NAMES);
}

#[test]
fn test_front_back_exclusivity() {
    let dir = tempfile::tempdir().unwrap();
    let mut driver = GenerationDriver::new(test_config(dir.path()), test_library());

    for seed in 0..60 {
        let sample = driver.generate_sample(seed).unwrap();
        let back_only = [LayerKind::Stripe, LayerKind::Signature, LayerKind::Rfid];
        match sample.face {
            CardFace::Front => {
                assert!(back_only.iter().all(|l| !sample.layers.contains(l)));
            }
            CardFace::Back => {
                assert!(!sample.layers.contains(&LayerKind::Chip));
            }
        }
        let card_class = sample.annotation.labels.boxes[0].class_id;
        assert_eq!(card_class, ClassId::for_face(sample.face));
    }
}

#[test]
fn test_empty_chip_pool_front_sample() {
    let mut config = SynthConfig::default();
    config.back_probability = 0.0;
    let mut library = test_library();
    library.chips = AssetPool::empty("chip");

    let randomizer = FieldRandomizer::new(config.clone());
    let compositor = TextureCompositor::new(&config);
    let mut pool = TexturePool::new(2);
    let mut rng = SynthRng::seed_from_u64(8);

    let sample = randomizer.randomize(&library, &mut rng);
    let texture = compositor.composite(&sample, &library, &mut pool, &mut rng);
    assert_eq!(texture.face, CardFace::Front);
    assert!(!texture.has_layer(LayerKind::Chip));
    assert!(texture.has_layer(LayerKind::BrandLogo));
    assert!(texture.has_layer(LayerKind::BankLogo));
}

#[test]
fn test_identity_projection_labels_fields() {
    let mut config = SynthConfig::default();
    config.fields.number = 1.0;
    config.fields.name = 1.0;
    config.fields.expiry = 1.0;
    config.fields.cvv = 1.0;
    config.back_probability = 0.0;

    let library = test_library();
    let randomizer = FieldRandomizer::new(config.clone());
    let compositor = TextureCompositor::new(&config);
    let mut pool = TexturePool::new(2);
    let mut rng = SynthRng::seed_from_u64(21);

    let sample = randomizer.randomize(&library, &mut rng);
    let texture = compositor.composite(&sample, &library, &mut pool, &mut rng);
    let (w, h) = texture.image.dimensions();
    let annotation = annotate(&texture, &IdentityProjector::new(w, h));

    let classes: Vec<ClassId> = annotation.labels.boxes.iter().map(|b| b.class_id).collect();
    assert_eq!(classes[0], ClassId::Front);
    // The front template carries Name, Number and Expires slots
    for class in [ClassId::Name, ClassId::Number, ClassId::Expires] {
        assert!(classes.contains(&class), "{class:?} missing from {classes:?}");
    }
    assert_eq!(
        annotation.labels.boxes[0].to_string(),
        "4 0.500000 0.500000 1.000000 1.000000"
    );
}

#[test]
fn test_card_number_formatting() {
    assert_eq!(format_card_number("4123456789012345"), "4123 4567 8901 2345");
}

#[test]
fn test_config_round_trip_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    let mut config = SynthConfig::default();
    config.samples = 42;
    config.seed = Some(5);
    fs::write(&path, config.to_json().unwrap()).unwrap();

    let loaded = SynthConfig::from_file(&path).unwrap();
    assert_eq!(loaded.samples, 42);
    assert_eq!(loaded.seed, Some(5));
    assert_eq!(loaded.splits, config.splits);
}
