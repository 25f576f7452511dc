//! Generator of a small synthetic card dataset
//!
//! Builds a throwaway asset tree from procedural images, then runs the
//! generation driver over it.
//!
//! Usage: cargo run -p card-synth --example gen_dataset

use std::fs;
use std::path::Path;

use anyhow::Context as _;
use card_synth::{AssetLibrary, DataSplit, DriverControl, GenerationDriver, SynthConfig};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let assets_dir = Path::new("generated_assets");
    let output_dir = Path::new("generated_dataset");
    for dir in [assets_dir, output_dir] {
        if dir.exists() {
            fs::remove_dir_all(dir).with_context(|| format!("clean {}", dir.display()))?;
        }
    }

    write_assets(assets_dir)?;
    println!("Assets written to {:?}", assets_dir);

    let mut config = SynthConfig::default();
    config.samples = 20;
    config.seed = Some(2024);
    config.assets_root = assets_dir.to_path_buf();
    config.output.root = output_dir.to_path_buf();
    config.output.width = 640;
    config.output.height = 640;

    let library = AssetLibrary::load(&config.assets_root);
    let mut driver = GenerationDriver::new(config, library);
    let report = driver.run(&DriverControl::new())?;

    println!(
        "Done! Generated {} images in {:?} ({} skipped)",
        report.generated, output_dir, report.skipped
    );
    for split in DataSplit::ALL {
        println!("  {split}: {}", report.split_count(split));
    }
    Ok(())
}

fn write_assets(root: &Path) -> anyhow::Result<()> {
    for sub in ["front-images", "chip-images", "logo-images", "bank-logo-images", "skybox-images"] {
        fs::create_dir_all(root.join(sub))?;
    }

    // Backgrounds: diagonal two-tone gradients
    let palettes = [([20u8, 40, 120], [90u8, 160, 220]), ([60, 20, 70], [200, 90, 140]), ([10, 70, 50], [150, 210, 120])];
    for (i, (a, b)) in palettes.iter().enumerate() {
        let img = RgbaImage::from_fn(506, 319, |x, y| {
            let t = (x + y) as f32 / (506 + 319) as f32;
            let c = |k: usize| (a[k] as f32 + (b[k] as f32 - a[k] as f32) * t) as u8;
            Rgba([c(0), c(1), c(2), 255])
        });
        save(&img, &root.join("front-images").join(format!("bg_{i}.png")))?;
    }

    // Chip: gold pad with contact lines
    let mut chip = RgbaImage::from_pixel(120, 90, Rgba([212, 175, 55, 255]));
    for x in [40.0f32, 80.0] {
        draw_line_segment_mut(&mut chip, (x, 0.0), (x, 90.0), Rgba([120, 95, 30, 255]));
    }
    draw_line_segment_mut(&mut chip, (0.0, 45.0), (120.0, 45.0), Rgba([120, 95, 30, 255]));
    save(&chip, &root.join("chip-images").join("chip.png"))?;

    // Brand logo: two overlapping circles on transparency
    let mut logo = RgbaImage::new(200, 120);
    draw_filled_circle_mut(&mut logo, (70, 60), 50, Rgba([235, 0, 27, 255]));
    draw_filled_circle_mut(&mut logo, (130, 60), 50, Rgba([247, 158, 27, 230]));
    save(&logo, &root.join("logo-images").join("circles.png"))?;

    // Bank logo: white block with a bar
    let mut bank = RgbaImage::new(160, 60);
    draw_filled_rect_mut(&mut bank, Rect::at(0, 0).of_size(160, 60), Rgba([250, 250, 250, 220]));
    draw_filled_rect_mut(&mut bank, Rect::at(10, 25).of_size(140, 10), Rgba([30, 30, 90, 255]));
    save(&bank, &root.join("bank-logo-images").join("bank.png"))?;

    // Skybox: horizon gradient
    let sky = RgbaImage::from_fn(800, 400, |_, y| {
        let t = y as f32 / 400.0;
        Rgba([(110.0 * (1.0 - t)) as u8, (140.0 * (1.0 - t)) as u8, (200.0 - 120.0 * t) as u8, 255])
    });
    save(&sky, &root.join("skybox-images").join("sky.png"))?;

    // Signature strip and contactless mark
    let mut signature = RgbaImage::from_pixel(300, 50, Rgba([245, 240, 225, 255]));
    for i in 0..6 {
        let y = 8.0 + i as f32 * 7.0;
        draw_line_segment_mut(&mut signature, (0.0, y), (300.0, y + 4.0), Rgba([200, 190, 170, 255]));
    }
    save(&signature, &root.join("signature.png"))?;

    let mut rfid = RgbaImage::new(64, 64);
    for r in [32, 22, 12] {
        draw_filled_circle_mut(&mut rfid, (8, 32), r, Rgba([240, 240, 240, 200]));
        draw_filled_circle_mut(&mut rfid, (8, 32), r - 4, Rgba([0, 0, 0, 0]));
    }
    save(&rfid, &root.join("rfid.png"))?;
    Ok(())
}

fn save(img: &RgbaImage, path: &Path) -> anyhow::Result<()> {
    img.save(path).with_context(|| format!("write {}", path.display()))
}
