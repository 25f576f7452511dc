//! Пул переиспользуемых RGBA-буферов
//!
//! Ограниченный список свободных буферов с ключом (ширина, высота).
//! Все изменения проходят через `acquire`/`release`; доступ по `&mut self`,
//! поэтому при работе из нескольких потоков пул нужно обернуть в `Mutex`.

use std::collections::HashMap;

use image::RgbaImage;

/// Счётчики пула
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Буферов сейчас в пуле
    pub retained: usize,
    /// Выдано из пула повторно
    pub reused: u64,
    /// Выделено заново
    pub allocated: u64,
    /// Отброшено при возврате (пул полон)
    pub dropped_on_release: u64,
}

/// Пул текстур
#[derive(Debug)]
pub struct TexturePool {
    capacity: usize,
    free: HashMap<(u32, u32), Vec<RgbaImage>>,
    stats: PoolStats,
}

impl TexturePool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            free: HashMap::new(),
            stats: PoolStats::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    /// Буфер нужного размера; содержимое повторно выданного буфера не очищается
    pub fn acquire(&mut self, width: u32, height: u32) -> RgbaImage {
        if let Some(image) = self.free.get_mut(&(width, height)).and_then(Vec::pop) {
            self.stats.retained -= 1;
            self.stats.reused += 1;
            return image;
        }
        self.stats.allocated += 1;
        RgbaImage::new(width, height)
    }

    /// Возврат буфера; сверх ёмкости буфер просто освобождается
    pub fn release(&mut self, image: RgbaImage) {
        if self.stats.retained >= self.capacity {
            self.stats.dropped_on_release += 1;
            return;
        }
        self.free.entry(image.dimensions()).or_default().push(image);
        self.stats.retained += 1;
    }

    /// Освобождение всех удерживаемых буферов
    pub fn clear(&mut self) {
        self.free.clear();
        self.stats.retained = 0;
    }
}

impl Default for TexturePool {
    fn default() -> Self {
        Self::new(10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reuse_matching_dimensions() {
        let mut pool = TexturePool::new(4);
        let a = pool.acquire(8, 4);
        pool.release(a);

        let _other = pool.acquire(4, 8);
        assert_eq!(pool.stats().allocated, 2);

        let b = pool.acquire(8, 4);
        assert_eq!(b.dimensions(), (8, 4));
        assert_eq!(pool.stats().reused, 1);
        assert_eq!(pool.stats().retained, 0);
    }

    #[test]
    fn test_capacity_bound() {
        let mut pool = TexturePool::new(2);
        for _ in 0..3 {
            pool.release(RgbaImage::new(2, 2));
        }
        let stats = pool.stats();
        assert_eq!(stats.retained, 2);
        assert_eq!(stats.dropped_on_release, 1);
    }

    #[test]
    fn test_clear_drops_everything() {
        let mut pool = TexturePool::default();
        pool.release(RgbaImage::new(2, 2));
        pool.clear();
        assert_eq!(pool.stats().retained, 0);
        pool.acquire(2, 2);
        assert_eq!(pool.stats().reused, 0);
    }
}
