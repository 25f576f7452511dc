//! Модуль управления генерацией
//!
//! Образцы обрабатываются строго по одному:
//! случайные поля -> текстура -> проекция -> разметка -> запись.
//! Каждый образец получает собственное зерно, поэтому любой из них
//! можно воспроизвести отдельно через [`GenerationDriver::generate_sample`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use image::RgbaImage;
use rand::{RngCore, SeedableRng};
use rand_xoshiro::SplitMix64;

use crate::annotation::{annotate, Annotation, DataSplit, DatasetWriter};
use crate::assets::AssetLibrary;
use crate::compositor::{CompositeTexture, LayerKind, TextureCompositor};
use crate::config::SynthConfig;
use crate::fields::FieldRandomizer;
use crate::pool::TexturePool;
use crate::projection::{CameraPose, FlatProjector, ProjectionError};
use crate::{scene, CardFace, SynthError, SynthRng};

const PAUSE_POLL: Duration = Duration::from_millis(50);

/// Внешнее управление запуском: пауза и остановка
///
/// Клоны разделяют одно состояние, так что управлять можно из другого потока.
#[derive(Debug, Clone, Default)]
pub struct DriverControl {
    paused: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
}

impl DriverControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    /// Остановка после текущего образца
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Итоги запуска
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationReport {
    /// Записанные образцы
    pub generated: u64,
    /// Пропущенные из-за ошибок проекции или записи
    pub skipped: u64,
    /// Начатые проходы
    pub loops: u32,
    pub per_split: BTreeMap<DataSplit, u64>,
    /// Рамки полей, не попавшие в разметку
    pub omitted_boxes: u64,
}

impl GenerationReport {
    pub fn split_count(&self, split: DataSplit) -> u64 {
        self.per_split.get(&split).copied().unwrap_or(0)
    }
}

/// Один полностью обработанный, но ещё не записанный образец
#[derive(Debug, Clone)]
pub struct RenderedSample {
    pub seed: u64,
    pub face: CardFace,
    pub layers: Vec<LayerKind>,
    pub frame: RgbaImage,
    pub annotation: Annotation,
    pub split: DataSplit,
}

/// Генератор набора данных
pub struct GenerationDriver {
    config: SynthConfig,
    library: AssetLibrary,
    randomizer: FieldRandomizer,
    compositor: TextureCompositor,
    writer: DatasetWriter,
    pool: TexturePool,
}

impl GenerationDriver {
    pub fn new(config: SynthConfig, library: AssetLibrary) -> Self {
        Self {
            randomizer: FieldRandomizer::new(config.clone()),
            compositor: TextureCompositor::new(&config),
            writer: DatasetWriter::new(config.output.clone()),
            pool: TexturePool::new(config.pool_capacity),
            config,
            library,
        }
    }

    pub fn config(&self) -> &SynthConfig {
        &self.config
    }

    pub fn writer(&self) -> &DatasetWriter {
        &self.writer
    }

    pub fn pool(&self) -> &TexturePool {
        &self.pool
    }

    /// Полный запуск
    ///
    /// Ошибки конфигурации и создания каталогов прерывают запуск; ошибки
    /// отдельного образца только пропускают его.
    pub fn run(&mut self, control: &DriverControl) -> Result<GenerationReport, SynthError> {
        self.config.validate()?;
        self.writer.prepare().inspect_err(|e| {
            log::error!("Cannot prepare output root: {e}");
        })?;

        let base_seed = self.config.seed.unwrap_or_else(rand::random);
        log::info!(
            "Generating {} samples per loop (seed {base_seed}, continuous: {})",
            self.config.samples,
            self.config.continuous
        );

        let mut seeds = SplitMix64::seed_from_u64(base_seed);
        let mut report = GenerationReport::default();
        let mut last_housekeeping = Instant::now();
        let housekeeping_interval = self.config.housekeeping_interval()?;
        let delay = Duration::from_millis(self.config.generation_delay_ms);
        let mut index: u64 = 0;

        'run: loop {
            report.loops += 1;
            for plain_index in 0..self.config.samples {
                while control.is_paused() && !control.is_stopped() {
                    thread::sleep(PAUSE_POLL);
                }
                if control.is_stopped() {
                    log::info!("Stop requested, ending run");
                    break 'run;
                }

                let seed = seeds.next_u64();
                log::debug!("Sample {index}: seed {seed}");
                self.process(index, plain_index, seed, &mut report);
                index += 1;

                if last_housekeeping.elapsed() >= housekeeping_interval {
                    self.housekeeping();
                    last_housekeeping = Instant::now();
                }
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
            }

            if !self.config.continuous {
                break;
            }
            if self.config.max_loops.is_some_and(|max| report.loops >= max) {
                break;
            }
            log::info!("Loop {} complete, starting over", report.loops);
        }

        log::info!(
            "Generation finished: {} written, {} skipped, {} boxes omitted",
            report.generated,
            report.skipped,
            report.omitted_boxes
        );
        Ok(report)
    }

    fn process(&mut self, index: u64, plain_index: u32, seed: u64, report: &mut GenerationReport) {
        let rendered = match self.generate_sample(seed) {
            Ok(r) => r,
            Err(e) => {
                log::warn!("Sample {index} skipped: {e}");
                report.skipped += 1;
                return;
            }
        };
        report.omitted_boxes += rendered.annotation.omitted as u64;

        log::debug!("Sample {index}: persisting");
        let written = if self.config.output.yolo {
            self.writer
                .write_sample(index, rendered.split, &rendered.frame, &rendered.annotation.labels)
        } else {
            self.writer.write_plain(plain_index, &rendered.frame)
        };

        match written {
            Ok(path) => {
                log::debug!("Sample {index} written to {}", path.display());
                report.generated += 1;
                if self.config.output.yolo {
                    *report.per_split.entry(rendered.split).or_default() += 1;
                }
            }
            Err(e) => {
                log::warn!("Sample {index} skipped: {e}");
                report.skipped += 1;
            }
        }
    }

    /// Образец по зерну без записи на диск
    pub fn generate_sample(&mut self, seed: u64) -> Result<RenderedSample, ProjectionError> {
        let mut rng = SynthRng::seed_from_u64(seed);

        log::debug!("Randomizing");
        let sample = self.randomizer.randomize(&self.library, &mut rng);

        log::debug!("Compositing {:?} face, font {}", sample.face, sample.font.name());
        let texture = self
            .compositor
            .composite(&sample, &self.library, &mut self.pool, &mut rng);

        log::debug!("Projecting");
        let frame_size = (self.config.output.width, self.config.output.height);
        let texture_size = texture.image.dimensions();
        let pose = CameraPose::random(&self.config.camera, texture_size, frame_size, &mut rng);
        let projector = FlatProjector::from_pose(&pose, texture_size, frame_size);
        let backdrop = scene::backdrop(&self.library, frame_size.0, frame_size.1, &mut rng);
        let frame = scene::render_frame(&texture.image, &projector, backdrop);

        log::debug!("Annotating");
        let annotation = annotate(&texture, &projector);
        let split = DataSplit::draw(&self.config.splits, &mut rng);

        let CompositeTexture { image, face, layers, .. } = texture;
        self.pool.release(image);

        Ok(RenderedSample {
            seed,
            face,
            layers,
            frame: frame?,
            annotation,
            split,
        })
    }

    fn housekeeping(&mut self) {
        let stats = self.pool.stats();
        log::info!(
            "Housekeeping: releasing {} pooled buffers ({} reused, {} allocated, {} dropped)",
            stats.retained,
            stats.reused,
            stats.allocated,
            stats.dropped_on_release
        );
        self.pool.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config(root: &std::path::Path) -> SynthConfig {
        let mut config = SynthConfig::default();
        config.samples = 4;
        config.seed = Some(7);
        config.card_width = 202;
        config.card_height = 128;
        config.output.width = 256;
        config.output.height = 256;
        config.output.root = root.to_path_buf();
        config
    }

    #[test]
    fn test_run_writes_every_sample() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = GenerationDriver::new(small_config(dir.path()), AssetLibrary::empty());
        let report = driver.run(&DriverControl::new()).unwrap();

        assert_eq!(report.generated, 4);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.loops, 1);
        let total: u64 = DataSplit::ALL.iter().map(|s| report.split_count(*s)).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn test_same_seed_same_sample() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = GenerationDriver::new(small_config(dir.path()), AssetLibrary::empty());
        let a = driver.generate_sample(42).unwrap();
        let b = driver.generate_sample(42).unwrap();
        assert_eq!(a.frame, b.frame);
        assert_eq!(a.annotation.labels, b.annotation.labels);
        assert_eq!(a.split, b.split);
    }

    #[test]
    fn test_stop_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = GenerationDriver::new(small_config(dir.path()), AssetLibrary::empty());
        let control = DriverControl::new();
        control.stop();
        let report = driver.run(&control).unwrap();
        assert_eq!(report.generated, 0);
    }

    #[test]
    fn test_continuous_mode_honors_max_loops() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = small_config(dir.path());
        config.samples = 2;
        config.continuous = true;
        config.max_loops = Some(3);
        config.output.yolo = false;
        let mut driver = GenerationDriver::new(config, AssetLibrary::empty());
        let report = driver.run(&DriverControl::new()).unwrap();

        assert_eq!(report.loops, 3);
        assert_eq!(report.generated, 6);
        assert!(report.per_split.is_empty());
        // Plain-mode names restart every loop
        let files = std::fs::read_dir(dir.path().join("cards")).unwrap().count();
        assert_eq!(files, 2);
    }

    #[test]
    fn test_failed_write_skips_sample_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = GenerationDriver::new(small_config(dir.path()), AssetLibrary::empty());
        // Второй образец (индекс 1) не сможет записать разметку ни в одной части
        for split in DataSplit::ALL {
            std::fs::create_dir_all(driver.writer().labels_dir(split).join("card_000001.txt")).unwrap();
        }

        let report = driver.run(&DriverControl::new()).unwrap();
        assert_eq!(report.generated, 3);
        assert_eq!(report.skipped, 1);

        for split in DataSplit::ALL {
            let images: Vec<String> = std::fs::read_dir(driver.writer().images_dir(split))
                .unwrap()
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect();
            assert!(!images.iter().any(|n| n.starts_with("card_000001")));
            assert!(!images.iter().any(|n| n.ends_with(".tmp")));
            for name in &images {
                let label = driver.writer().labels_dir(split).join(name.replace(".jpg", ".txt"));
                assert!(label.is_file(), "{name} has no label");
            }
        }
    }

    #[test]
    fn test_paused_run_waits_for_resume() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = GenerationDriver::new(small_config(dir.path()), AssetLibrary::empty());
        let control = DriverControl::new();
        control.pause();

        let remote = control.clone();
        let resumer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            assert!(remote.is_paused());
            remote.resume();
        });

        let started = Instant::now();
        let report = driver.run(&control).unwrap();
        resumer.join().unwrap();

        assert!(started.elapsed() >= Duration::from_millis(200));
        assert!(!control.is_paused());
        assert_eq!(report.generated, 4);
    }

    #[test]
    fn test_housekeeping_empties_pool() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = small_config(dir.path());
        config.housekeeping_interval_secs = 3600.0;
        let mut driver = GenerationDriver::new(config, AssetLibrary::empty());
        driver.run(&DriverControl::new()).unwrap();
        assert!(driver.pool().stats().retained > 0);

        let dir = tempfile::tempdir().unwrap();
        let mut config = small_config(dir.path());
        config.housekeeping_interval_secs = 1e-6;
        let mut driver = GenerationDriver::new(config, AssetLibrary::empty());
        driver.run(&DriverControl::new()).unwrap();
        assert_eq!(driver.pool().stats().retained, 0);
    }

    #[test]
    fn test_oversized_housekeeping_interval_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = small_config(dir.path());
        config.housekeeping_interval_secs = 1e20;
        let mut driver = GenerationDriver::new(config, AssetLibrary::empty());
        assert!(matches!(
            driver.run(&DriverControl::new()),
            Err(SynthError::Config(_))
        ));
    }

    #[test]
    fn test_invalid_config_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = small_config(dir.path());
        config.splits.test = 0.5;
        let mut driver = GenerationDriver::new(config, AssetLibrary::empty());
        assert!(matches!(
            driver.run(&DriverControl::new()),
            Err(SynthError::Config(_))
        ));
    }
}
