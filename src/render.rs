// ============================================================================
// RENDER — cancellation token and the parallel tiling scheduler
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rayon::prelude::*;

use crate::canvas::{PixelSurface, Rect, Surface};
use crate::compositor::Compositor;

/// Default tile edge, in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 64;

// ============================================================================
// CANCELLATION
// ============================================================================

/// Shared cooperative cancellation flag. Clones observe the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Clear the flag so the token can drive another pass.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::Relaxed);
    }
}

// ============================================================================
// TILING
// ============================================================================

/// Partition `bounds` into row-major tiles of at most `tile` × `tile` pixels.
/// The tiles are disjoint and cover `bounds` exactly.
pub fn split_into_tiles(bounds: Rect, tile: u32) -> Vec<Rect> {
    if bounds.is_empty() {
        return Vec::new();
    }
    let tile = tile.max(1);
    let cols = bounds.width().div_ceil(tile);
    let rows = bounds.height().div_ceil(tile);
    let mut tiles = Vec::with_capacity(cols as usize * rows as usize);
    let mut top = bounds.top;
    while top < bounds.bottom {
        let bottom = top.saturating_add(tile).min(bounds.bottom);
        let mut left = bounds.left;
        while left < bounds.right {
            let right = left.saturating_add(tile).min(bounds.right);
            tiles.push(Rect::new(left, top, right, bottom));
            left = right;
        }
        top = bottom;
    }
    tiles
}

/// Drives a [`Compositor`] over a whole destination in parallel.
///
/// The destination is cut into bands of `tile_size` rows; each band is an
/// exclusive `&mut` row slice handed to a rayon worker, which renders the
/// band's tiles with [`Compositor::render_range`].
pub struct TileScheduler {
    tile_size: u32,
    pool: Option<rayon::ThreadPool>,
}

impl TileScheduler {
    /// Scheduler on rayon's global pool.
    pub fn new(tile_size: u32) -> Self {
        Self { tile_size: tile_size.max(1), pool: None }
    }

    /// Scheduler on a dedicated pool of `threads` workers (`0` = rayon default).
    pub fn with_threads(tile_size: u32, threads: usize) -> Result<Self, String> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("rgbc-render-{}", i))
            .build()
            .map_err(|e| format!("could not start render thread pool: {}", e))?;
        Ok(Self { tile_size: tile_size.max(1), pool: Some(pool) })
    }

    /// Render every tile of `dst`. Returns early (leaving already-written
    /// pixels in place) once `cancel` is set.
    pub fn render(&self, compositor: &Compositor, dst: &mut Surface, cancel: &CancelToken) {
        let (w, h) = dst.dimensions();
        let start = Instant::now();
        log_debug!(
            "render pass: {}×{}, tile {}, {} slot(s) loaded",
            w,
            h,
            self.tile_size,
            compositor.loaded_count()
        );

        let tile = self.tile_size;
        match &self.pool {
            Some(pool) => pool.install(|| render_bands(compositor, dst, tile, cancel)),
            None => render_bands(compositor, dst, tile, cancel),
        }

        if cancel.is_cancelled() {
            log_info!("render pass cancelled after {:.0}ms", start.elapsed().as_secs_f64() * 1000.0);
        } else {
            log_debug!("render pass finished in {:.0}ms", start.elapsed().as_secs_f64() * 1000.0);
        }
    }
}

fn render_bands(compositor: &Compositor, dst: &mut Surface, tile: u32, cancel: &CancelToken) {
    dst.par_bands_mut(tile).for_each(|mut band| {
        if cancel.is_cancelled() {
            return;
        }
        let tiles = split_into_tiles(band.bounds(), tile);
        compositor.render_range(&mut band, &tiles, 0, tiles.len(), cancel);
    });
}

impl Default for TileScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_TILE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::SlotRole;
    use crate::config::CompositorConfig;
    use crate::pixel::ColorBgra;

    #[test]
    fn tiles_cover_bounds_exactly_once() {
        let bounds = Rect::new(0, 0, 130, 70);
        let tiles = split_into_tiles(bounds, 64);
        assert_eq!(tiles.len(), 3 * 2);
        let area: u64 = tiles.iter().map(|t| t.area()).sum();
        assert_eq!(area, bounds.area());
        for (i, a) in tiles.iter().enumerate() {
            for b in &tiles[i + 1..] {
                assert!(!a.intersects(b), "{:?} overlaps {:?}", a, b);
            }
        }
        assert_eq!(tiles.last(), Some(&Rect::new(128, 64, 130, 70)));
    }

    #[test]
    fn empty_bounds_have_no_tiles() {
        assert!(split_into_tiles(Rect::new(5, 5, 5, 9), 8).is_empty());
    }

    #[test]
    fn token_clones_share_state() {
        let a = CancelToken::new();
        let b = a.clone();
        b.cancel();
        assert!(a.is_cancelled());
        a.reset();
        assert!(!b.is_cancelled());
    }

    fn gradient(w: u32, h: u32) -> Surface {
        let mut s = Surface::new(w, h);
        for y in 0..h {
            for x in 0..w {
                s.put_pixel(x, y, ColorBgra::from_rgba(x as u8, y as u8, (x ^ y) as u8, 255));
            }
        }
        s
    }

    #[test]
    fn parallel_pass_matches_sequential_pass() {
        let (w, h) = (97, 53);
        let mut comp = Compositor::new();
        comp.configure(&CompositorConfig::default(), (w, h));
        comp.set_slot(SlotRole::Blue, Some(gradient(w, h)));
        comp.set_channel(SlotRole::Blue, crate::pixel::ChannelSelector::Green);

        let base = Surface::new_filled(w, h, ColorBgra::from_rgba(1, 2, 3, 4));
        let mut sequential = base.clone();
        comp.render_all(&mut sequential, &CancelToken::new());

        let mut parallel = base.clone();
        TileScheduler::new(16).render(&comp, &mut parallel, &CancelToken::new());
        assert_eq!(parallel, sequential);
        assert_eq!(parallel.get_pixel(10, 40), ColorBgra::from_rgba(1, 2, 40, 4));
    }

    #[test]
    fn dedicated_pool_renders() {
        let mut comp = Compositor::new();
        comp.configure(&CompositorConfig::default(), (8, 8));
        comp.set_slot(SlotRole::Alpha, Some(Surface::new(8, 8)));
        let scheduler = TileScheduler::with_threads(3, 2).unwrap();
        let mut dst = Surface::new_filled(8, 8, ColorBgra::WHITE);
        scheduler.render(&comp, &mut dst, &CancelToken::new());
        assert!(dst.pixels().iter().all(|p| p.a == 0 && p.r == 255));
    }

    #[test]
    fn pre_cancelled_pass_writes_nothing() {
        let mut comp = Compositor::new();
        comp.configure(&CompositorConfig::default(), (8, 8));
        comp.set_slot(SlotRole::Alpha, Some(Surface::new(8, 8)));
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut dst = Surface::new_filled(8, 8, ColorBgra::WHITE);
        TileScheduler::new(2).render(&comp, &mut dst, &cancel);
        assert!(dst.pixels().iter().all(|p| *p == ColorBgra::WHITE));
    }
}
