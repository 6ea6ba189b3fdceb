// ============================================================================
// COMPOSITOR — per-channel source slots, slot loading and the compose kernel
// ============================================================================
//
// Each of the four slots (red, green, blue, alpha) optionally holds a decoded
// source image plus a channel selector. Rendering replaces every output
// channel whose slot is loaded with the selected channel of that slot's image
// and leaves the destination's own value everywhere else.
//
// Threading contract: `configure`, `set_slot` and `dispose` take `&mut self`,
// rendering takes `&self`. Callers must not reconfigure while a render pass
// is reading the slots; the borrow checker enforces this for in-process use.
// ============================================================================

use std::fmt;
use std::path::{Path, PathBuf};

use crate::canvas::{PixelSurface, Rect, Surface};
use crate::config::CompositorConfig;
use crate::io::{DecodeError, ImageFileDecoder, SourceDecoder};
use crate::pixel::{ChannelSelector, ColorBgra, extract_channel};
use crate::render::CancelToken;

// ============================================================================
// SLOTS
// ============================================================================

/// The output channel a slot feeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlotRole {
    Red,
    Green,
    Blue,
    Alpha,
}

impl SlotRole {
    pub const ALL: [SlotRole; 4] = [SlotRole::Red, SlotRole::Green, SlotRole::Blue, SlotRole::Alpha];

    pub fn index(&self) -> usize {
        match self {
            SlotRole::Red => 0,
            SlotRole::Green => 1,
            SlotRole::Blue => 2,
            SlotRole::Alpha => 3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SlotRole::Red => "red",
            SlotRole::Green => "green",
            SlotRole::Blue => "blue",
            SlotRole::Alpha => "alpha",
        }
    }
}

impl fmt::Display for SlotRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Outcome of the most recent load attempt for a slot.
///
/// Only `Loaded` means the slot holds pixels; every other state renders as
/// "use the destination's own channel".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SlotStatus {
    /// No path configured (or the compositor was disposed).
    #[default]
    Unset,
    Loaded,
    /// A path was given but nothing exists there.
    Missing,
    /// The file exists but could not be decoded.
    DecodeFailed(String),
    /// Decoded fine, but its size differs from the destination.
    SizeMismatch { expected: (u32, u32), found: (u32, u32) },
}

impl SlotStatus {
    pub fn is_loaded(&self) -> bool {
        matches!(self, SlotStatus::Loaded)
    }
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotStatus::Unset => write!(f, "unset"),
            SlotStatus::Loaded => write!(f, "loaded"),
            SlotStatus::Missing => write!(f, "file not found"),
            SlotStatus::DecodeFailed(e) => write!(f, "decode failed ({})", e),
            SlotStatus::SizeMismatch { expected, found } => write!(
                f,
                "size mismatch (expected {}×{}, found {}×{})",
                expected.0, expected.1, found.0, found.1
            ),
        }
    }
}

/// One channel source: where it came from, which channel to sample, and the
/// validated pixels (present only when `status` is `Loaded`).
#[derive(Clone, Debug, Default)]
pub struct SourceSlot {
    pub path: PathBuf,
    pub channel: ChannelSelector,
    buffer: Option<Surface>,
    status: SlotStatus,
}

impl SourceSlot {
    pub fn buffer(&self) -> Option<&Surface> {
        self.buffer.as_ref()
    }

    pub fn status(&self) -> &SlotStatus {
        &self.status
    }

    pub fn is_loaded(&self) -> bool {
        self.buffer.is_some()
    }
}

/// Counts of slot buffers handed to and released by the compositor.
/// Every installed buffer is released exactly once, so after `dispose`
/// `installed == released`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LifecycleStats {
    pub installed: u64,
    pub released: u64,
}

impl LifecycleStats {
    pub fn held(&self) -> u64 {
        self.installed - self.released
    }
}

// ============================================================================
// SLOT LOADER
// ============================================================================

/// Decode `path` and validate it against the destination size.
///
/// Never fails: a missing file, a decode error and a size mismatch all come
/// back as `None` with the reason in the status.
pub fn load_slot(
    decoder: &dyn SourceDecoder,
    path: &Path,
    dst_dims: (u32, u32),
) -> (Option<Surface>, SlotStatus) {
    if path.as_os_str().is_empty() {
        return (None, SlotStatus::Unset);
    }
    let img = match decoder.decode(path) {
        Ok(img) => img,
        Err(DecodeError::Missing) => return (None, SlotStatus::Missing),
        Err(DecodeError::Unreadable(e)) => return (None, SlotStatus::DecodeFailed(e)),
    };
    let found = img.dimensions();
    if found != dst_dims {
        return (None, SlotStatus::SizeMismatch { expected: dst_dims, found });
    }
    (Some(Surface::from_rgba_image(&img)), SlotStatus::Loaded)
}

// ============================================================================
// COMPOSITOR
// ============================================================================

pub struct Compositor {
    slots: [SourceSlot; 4],
    /// Destination size the slots were validated against.
    dims: Option<(u32, u32)>,
    decoder: Box<dyn SourceDecoder>,
    stats: LifecycleStats,
}

impl Compositor {
    /// Compositor that decodes sources from disk with the `image` crate.
    pub fn new() -> Self {
        Self::with_decoder(Box::new(ImageFileDecoder))
    }

    pub fn with_decoder(decoder: Box<dyn SourceDecoder>) -> Self {
        Self {
            slots: Default::default(),
            dims: None,
            decoder,
            stats: LifecycleStats::default(),
        }
    }

    // ---- configuration / lifecycle -----------------------------------------

    /// Apply a new configuration for a destination of `dst_dims`.
    ///
    /// Every slot is released and reloaded, including ones whose path did not
    /// change. Load failures leave the slot empty; nothing is reported back
    /// except through [`slot_status`](Self::slot_status).
    pub fn configure(&mut self, config: &CompositorConfig, dst_dims: (u32, u32)) {
        self.dims = Some(dst_dims);
        for role in SlotRole::ALL {
            let slot_cfg = config.slot(role);
            self.release(role);

            let (buffer, status) = load_slot(&*self.decoder, &slot_cfg.path, dst_dims);
            match &status {
                SlotStatus::Loaded => log_info!(
                    "{} slot: loaded {} ({} channel)",
                    role,
                    slot_cfg.path.display(),
                    slot_cfg.channel
                ),
                SlotStatus::Unset => {}
                other => log_warn!("{} slot: {}: {}", role, slot_cfg.path.display(), other),
            }

            let slot = &mut self.slots[role.index()];
            slot.path = slot_cfg.path.clone();
            slot.channel = slot_cfg.channel;
            self.install(role, buffer, status);
        }
    }

    /// Replace one slot's buffer directly, releasing the previous one first.
    ///
    /// `None` clears the slot. A buffer whose size differs from the configured
    /// destination size is discarded.
    pub fn set_slot(&mut self, role: SlotRole, buffer: Option<Surface>) {
        self.release(role);
        let (buffer, status) = match buffer {
            None => (None, SlotStatus::Unset),
            Some(surface) => match self.dims {
                Some(expected) if surface.dimensions() != expected => (
                    None,
                    SlotStatus::SizeMismatch { expected, found: surface.dimensions() },
                ),
                _ => {
                    if self.dims.is_none() {
                        self.dims = Some(surface.dimensions());
                    }
                    (Some(surface), SlotStatus::Loaded)
                }
            },
        };
        self.install(role, buffer, status);
    }

    pub fn set_channel(&mut self, role: SlotRole, channel: ChannelSelector) {
        self.slots[role.index()].channel = channel;
    }

    /// Release every held buffer. Safe to call more than once.
    pub fn dispose(&mut self) {
        for role in SlotRole::ALL {
            self.release(role);
        }
        self.dims = None;
    }

    fn release(&mut self, role: SlotRole) {
        let slot = &mut self.slots[role.index()];
        slot.status = SlotStatus::Unset;
        if let Some(old) = slot.buffer.take() {
            self.stats.released += 1;
            log_debug!("{} slot: released {} bytes", role, old.memory_bytes());
            drop(old);
        }
    }

    fn install(&mut self, role: SlotRole, buffer: Option<Surface>, status: SlotStatus) {
        let slot = &mut self.slots[role.index()];
        debug_assert!(slot.buffer.is_none(), "slot must be released before install");
        if buffer.is_some() {
            self.stats.installed += 1;
        }
        slot.buffer = buffer;
        slot.status = status;
    }

    // ---- queries -----------------------------------------------------------

    pub fn slot(&self, role: SlotRole) -> &SourceSlot {
        &self.slots[role.index()]
    }

    pub fn is_slot_loaded(&self, role: SlotRole) -> bool {
        self.slots[role.index()].is_loaded()
    }

    pub fn slot_status(&self, role: SlotRole) -> &SlotStatus {
        &self.slots[role.index()].status
    }

    pub fn loaded_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_loaded()).count()
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.dims
    }

    pub fn stats(&self) -> LifecycleStats {
        self.stats
    }

    // ---- rendering ---------------------------------------------------------

    /// Slots usable against a destination of `dims`, in output order
    /// blue, green, red, alpha.
    fn sources_for(&self, dims: (u32, u32)) -> [Option<(&Surface, ChannelSelector)>; 4] {
        let pick = |role: SlotRole| {
            let slot = &self.slots[role.index()];
            slot.buffer
                .as_ref()
                .filter(|b| b.dimensions() == dims)
                .map(|b| (b, slot.channel))
        };
        [
            pick(SlotRole::Blue),
            pick(SlotRole::Green),
            pick(SlotRole::Red),
            pick(SlotRole::Alpha),
        ]
    }

    /// Process `rects[start..start + count]` in order.
    ///
    /// Rectangles are clipped to `dst.bounds()`; the range is clamped to the
    /// slice. Cancellation is checked before every rectangle and every row,
    /// and already-written pixels are left as they are.
    pub fn render_range<S: PixelSurface + ?Sized>(
        &self,
        dst: &mut S,
        rects: &[Rect],
        start: usize,
        count: usize,
        cancel: &CancelToken,
    ) {
        if count == 0 || start >= rects.len() {
            return;
        }
        let end = start.saturating_add(count).min(rects.len());
        let dims = dst.dimensions();
        if self.loaded_count() > 0 && self.dims != Some(dims) {
            log_warn!(
                "render target is {}×{} but slots were loaded for {:?}; mismatched slots ignored",
                dims.0,
                dims.1,
                self.dims
            );
        }
        let sources = self.sources_for(dims);
        let bounds = dst.bounds();

        for rect in &rects[start..end] {
            if cancel.is_cancelled() {
                return;
            }
            let clipped = rect.intersect(&bounds);
            if !compose_rect(dst, clipped, &sources, cancel) {
                return;
            }
        }
    }

    /// Process a single rectangle.
    pub fn render_rect<S: PixelSurface + ?Sized>(&self, dst: &mut S, rect: Rect, cancel: &CancelToken) {
        self.render_range(dst, std::slice::from_ref(&rect), 0, 1, cancel);
    }

    /// Sequential pass over the whole destination.
    pub fn render_all(&self, dst: &mut Surface, cancel: &CancelToken) {
        let bounds = Rect::new(0, 0, dst.width(), dst.height());
        self.render_rect(dst, bounds, cancel);
    }
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Compositor {
    fn drop(&mut self) {
        self.dispose();
    }
}

// ============================================================================
// COMPOSE KERNEL
// ============================================================================

#[inline(always)]
fn sample(source: Option<(&Surface, ChannelSelector)>, x: u32, y: u32, fallback: u8) -> u8 {
    match source {
        Some((surface, channel)) => extract_channel(surface.get_pixel(x, y), channel),
        None => fallback,
    }
}

/// Rewrite every pixel of `rect`. Returns `false` if cancelled part-way.
fn compose_rect<S: PixelSurface + ?Sized>(
    dst: &mut S,
    rect: Rect,
    sources: &[Option<(&Surface, ChannelSelector)>; 4],
    cancel: &CancelToken,
) -> bool {
    let [blue, green, red, alpha] = *sources;
    for y in rect.top..rect.bottom {
        if cancel.is_cancelled() {
            return false;
        }
        for x in rect.left..rect.right {
            let fallback = dst.get_pixel(x, y);
            let out = ColorBgra::from_bgra(
                sample(blue, x, y, fallback.b),
                sample(green, x, y, fallback.g),
                sample(red, x, y, fallback.r),
                sample(alpha, x, y, fallback.a),
            );
            dst.put_pixel(x, y, out);
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory decoder keyed by path; records how often each path was decoded.
    #[derive(Default)]
    struct MapDecoder {
        images: HashMap<PathBuf, Result<RgbaImage, DecodeError>>,
        calls: Mutex<Vec<PathBuf>>,
    }

    impl MapDecoder {
        fn with(mut self, path: &str, img: RgbaImage) -> Self {
            self.images.insert(PathBuf::from(path), Ok(img));
            self
        }

        fn with_err(mut self, path: &str, err: DecodeError) -> Self {
            self.images.insert(PathBuf::from(path), Err(err));
            self
        }
    }

    impl SourceDecoder for MapDecoder {
        fn decode(&self, path: &Path) -> Result<RgbaImage, DecodeError> {
            self.calls.lock().unwrap().push(path.to_path_buf());
            self.images.get(path).cloned().unwrap_or(Err(DecodeError::Missing))
        }
    }

    fn solid(w: u32, h: u32, rgba: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(w, h, image::Rgba(rgba))
    }

    fn config(paths: [&str; 4], channels: [ChannelSelector; 4]) -> CompositorConfig {
        let mut cfg = CompositorConfig::default();
        for (i, role) in SlotRole::ALL.iter().enumerate() {
            let slot = cfg.slot_mut(*role);
            slot.path = PathBuf::from(paths[i]);
            slot.channel = channels[i];
        }
        cfg
    }

    const RED4: [ChannelSelector; 4] = [ChannelSelector::Red; 4];

    #[test]
    fn no_slots_is_identity() {
        let comp = Compositor::with_decoder(Box::new(MapDecoder::default()));
        let mut dst = Surface::new(3, 3);
        for y in 0..3 {
            for x in 0..3 {
                dst.put_pixel(x, y, ColorBgra::from_bgra(x as u8, y as u8, 7, 200));
            }
        }
        let before = dst.clone();
        comp.render_all(&mut dst, &CancelToken::new());
        assert_eq!(dst, before);
    }

    #[test]
    fn loaded_slot_replaces_only_its_channel() {
        let decoder = MapDecoder::default().with("r.png", solid(2, 2, [10, 0, 0, 255]));
        let mut comp = Compositor::with_decoder(Box::new(decoder));
        comp.configure(&config(["r.png", "", "", ""], RED4), (2, 2));
        assert!(comp.is_slot_loaded(SlotRole::Red));

        let mut dst = Surface::new_filled(2, 2, ColorBgra::WHITE);
        comp.render_all(&mut dst, &CancelToken::new());
        for px in dst.pixels() {
            assert_eq!(*px, ColorBgra::from_rgba(10, 255, 255, 255));
        }
    }

    #[test]
    fn each_slot_samples_its_own_selector() {
        let decoder = MapDecoder::default()
            .with("src.png", solid(1, 1, [11, 22, 33, 44]));
        let mut comp = Compositor::with_decoder(Box::new(decoder));
        comp.configure(
            &config(
                ["src.png", "src.png", "src.png", "src.png"],
                [
                    ChannelSelector::Alpha,
                    ChannelSelector::Blue,
                    ChannelSelector::Green,
                    ChannelSelector::Red,
                ],
            ),
            (1, 1),
        );
        let mut dst = Surface::new_filled(1, 1, ColorBgra::WHITE);
        comp.render_all(&mut dst, &CancelToken::new());
        // red ← alpha(44), green ← blue(33), blue ← green(22), alpha ← red(11)
        assert_eq!(dst.get_pixel(0, 0), ColorBgra::from_rgba(44, 33, 22, 11));
    }

    #[test]
    fn failures_leave_slots_absent() {
        let decoder = MapDecoder::default()
            .with("big.png", solid(3, 3, [1, 1, 1, 1]))
            .with_err("bad.png", DecodeError::Unreadable("truncated".into()));
        let mut comp = Compositor::with_decoder(Box::new(decoder));
        comp.configure(&config(["big.png", "bad.png", "gone.png", ""], RED4), (2, 2));

        assert_eq!(
            comp.slot_status(SlotRole::Red),
            &SlotStatus::SizeMismatch { expected: (2, 2), found: (3, 3) }
        );
        assert_eq!(
            comp.slot_status(SlotRole::Green),
            &SlotStatus::DecodeFailed("truncated".into())
        );
        assert_eq!(comp.slot_status(SlotRole::Blue), &SlotStatus::Missing);
        assert_eq!(comp.slot_status(SlotRole::Alpha), &SlotStatus::Unset);
        assert_eq!(comp.loaded_count(), 0);
        assert_eq!(comp.stats(), LifecycleStats::default());
    }

    #[test]
    fn reconfigure_replaces_all_slots_and_releases_old_buffers() {
        let decoder = MapDecoder::default()
            .with("a.png", solid(2, 2, [50, 60, 70, 80]))
            .with("b.png", solid(2, 2, [90, 91, 92, 93]));
        let mut comp = Compositor::with_decoder(Box::new(decoder));
        comp.configure(&config(["a.png", "a.png", "", ""], RED4), (2, 2));
        assert_eq!(comp.stats(), LifecycleStats { installed: 2, released: 0 });

        // Red moves to a file that fails; green keeps its path but is reloaded.
        comp.configure(&config(["missing.png", "a.png", "b.png", ""], RED4), (2, 2));
        assert!(!comp.is_slot_loaded(SlotRole::Red));
        assert!(comp.is_slot_loaded(SlotRole::Green));
        assert!(comp.is_slot_loaded(SlotRole::Blue));
        assert!(!comp.is_slot_loaded(SlotRole::Alpha));
        assert_eq!(comp.stats(), LifecycleStats { installed: 4, released: 2 });

        let mut dst = Surface::new_filled(2, 2, ColorBgra::from_rgba(1, 2, 3, 4));
        comp.render_all(&mut dst, &CancelToken::new());
        // red falls back, green ← a.red (50), blue ← b.red (90)
        assert_eq!(dst.get_pixel(1, 1), ColorBgra::from_rgba(1, 50, 90, 4));
    }

    #[test]
    fn reconfigure_decodes_every_path_again() {
        let decoder = MapDecoder::default().with("a.png", solid(1, 1, [1, 2, 3, 4]));
        let mut comp = Compositor::with_decoder(Box::new(decoder));
        let cfg = config(["a.png", "", "", ""], RED4);
        comp.configure(&cfg, (1, 1));
        comp.configure(&cfg, (1, 1));
        assert_eq!(comp.stats(), LifecycleStats { installed: 2, released: 1 });
    }

    #[test]
    fn dispose_releases_everything_once() {
        let decoder = MapDecoder::default().with("a.png", solid(1, 1, [1, 2, 3, 4]));
        let mut comp = Compositor::with_decoder(Box::new(decoder));
        comp.configure(&config(["a.png", "a.png", "a.png", "a.png"], RED4), (1, 1));
        comp.dispose();
        comp.dispose();
        assert_eq!(comp.stats(), LifecycleStats { installed: 4, released: 4 });
        assert_eq!(comp.stats().held(), 0);
        assert_eq!(comp.loaded_count(), 0);
    }

    #[test]
    fn set_slot_validates_size_and_clears_old() {
        let mut comp = Compositor::with_decoder(Box::new(MapDecoder::default()));
        comp.configure(&CompositorConfig::default(), (2, 2));
        comp.set_slot(SlotRole::Alpha, Some(Surface::new(2, 2)));
        assert!(comp.is_slot_loaded(SlotRole::Alpha));
        assert_eq!(
            comp.slot(SlotRole::Alpha).buffer().map(|b| b.dimensions()),
            Some((2, 2))
        );

        comp.set_slot(SlotRole::Alpha, Some(Surface::new(4, 4)));
        assert!(!comp.is_slot_loaded(SlotRole::Alpha));
        assert!(comp.slot(SlotRole::Alpha).buffer().is_none());
        assert!(matches!(
            comp.slot_status(SlotRole::Alpha),
            SlotStatus::SizeMismatch { .. }
        ));
        assert_eq!(comp.stats(), LifecycleStats { installed: 1, released: 1 });

        comp.set_slot(SlotRole::Alpha, None);
        assert_eq!(comp.slot_status(SlotRole::Alpha), &SlotStatus::Unset);
    }

    #[test]
    fn render_range_respects_start_and_count() {
        let mut comp = Compositor::with_decoder(Box::new(MapDecoder::default()));
        comp.configure(&CompositorConfig::default(), (4, 1));
        comp.set_slot(
            SlotRole::Green,
            Some(Surface::new_filled(4, 1, ColorBgra::from_rgba(99, 0, 0, 0))),
        );
        let rects: Vec<Rect> = (0..4).map(|x| Rect::new(x, 0, x + 1, 1)).collect();
        let mut dst = Surface::new_filled(4, 1, ColorBgra::WHITE);

        comp.render_range(&mut dst, &rects, 1, 2, &CancelToken::new());
        assert_eq!(dst.get_pixel(0, 0).g, 255);
        assert_eq!(dst.get_pixel(1, 0).g, 99);
        assert_eq!(dst.get_pixel(2, 0).g, 99);
        assert_eq!(dst.get_pixel(3, 0).g, 255);

        // Zero count and out-of-range starts are no-ops; long counts clamp.
        comp.render_range(&mut dst, &rects, 0, 0, &CancelToken::new());
        comp.render_range(&mut dst, &rects, 9, 1, &CancelToken::new());
        assert_eq!(dst.get_pixel(0, 0).g, 255);
        comp.render_range(&mut dst, &rects, 3, 100, &CancelToken::new());
        assert_eq!(dst.get_pixel(3, 0).g, 99);
    }

    #[test]
    fn cancelled_token_stops_before_any_write() {
        let mut comp = Compositor::with_decoder(Box::new(MapDecoder::default()));
        comp.configure(&CompositorConfig::default(), (2, 2));
        comp.set_slot(SlotRole::Red, Some(Surface::new(2, 2)));
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut dst = Surface::new_filled(2, 2, ColorBgra::WHITE);
        comp.render_all(&mut dst, &cancel);
        assert!(dst.pixels().iter().all(|p| *p == ColorBgra::WHITE));
    }

    #[test]
    fn destination_size_change_ignores_stale_slots() {
        let mut comp = Compositor::with_decoder(Box::new(MapDecoder::default()));
        comp.configure(&CompositorConfig::default(), (2, 2));
        comp.set_slot(SlotRole::Red, Some(Surface::new(2, 2)));
        let mut dst = Surface::new_filled(3, 3, ColorBgra::WHITE);
        comp.render_all(&mut dst, &CancelToken::new());
        assert!(dst.pixels().iter().all(|p| *p == ColorBgra::WHITE));
    }
}
