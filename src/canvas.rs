// ============================================================================
// CANVAS — owned BGRA surfaces, row bands and render rectangles
// ============================================================================

use image::RgbaImage;
use rayon::prelude::*;

use crate::pixel::ColorBgra;

/// Largest surface accepted on import (matches the decoder sanity limit).
pub const MAX_SURFACE_PIXELS: u64 = 256_000_000;

// ============================================================================
// RECT
// ============================================================================

/// Axis-aligned pixel rectangle. `left`/`top` inclusive, `right`/`bottom` exclusive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl Rect {
    pub const fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    /// Overlap of two rectangles; empty (but well-formed) when disjoint.
    pub fn intersect(&self, other: &Rect) -> Rect {
        let left = self.left.max(other.left);
        let top = self.top.max(other.top);
        let right = self.right.min(other.right).max(left);
        let bottom = self.bottom.min(other.bottom).max(top);
        Rect { left, top, right, bottom }
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        !self.intersect(other).is_empty()
    }
}

// ============================================================================
// PIXEL SURFACE — the destination contract the compose kernel writes through
// ============================================================================

/// Random-access BGRA pixel storage.
///
/// `width`/`height` describe the whole image; `bounds` is the part of it this
/// handle may read and write (the full image for a [`Surface`], a row band for
/// a [`SurfaceBand`]). Coordinates are always absolute image coordinates.
pub trait PixelSurface {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn get_pixel(&self, x: u32, y: u32) -> ColorBgra;
    fn put_pixel(&mut self, x: u32, y: u32, px: ColorBgra);

    fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width(), self.height())
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }
}

// ============================================================================
// SURFACE — contiguous row-major BGRA buffer
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Surface {
    width: u32,
    height: u32,
    pixels: Vec<ColorBgra>,
}

impl Surface {
    /// Fully transparent surface.
    pub fn new(width: u32, height: u32) -> Self {
        Self::new_filled(width, height, ColorBgra::TRANSPARENT)
    }

    pub fn new_filled(width: u32, height: u32, color: ColorBgra) -> Self {
        let len = width as usize * height as usize;
        Self { width, height, pixels: vec![color; len] }
    }

    /// Copy a decoded RGBA grid into a new BGRA surface.
    /// Rows are converted in parallel.
    pub fn from_rgba_image(src: &RgbaImage) -> Self {
        let (width, height) = src.dimensions();
        let mut surface = Self::new(width, height);
        if width == 0 || height == 0 {
            return surface;
        }
        let src_stride = width as usize * 4;
        let src_raw = src.as_raw();
        surface
            .pixels
            .par_chunks_mut(width as usize)
            .enumerate()
            .for_each(|(y, row_out)| {
                let row_in = &src_raw[y * src_stride..(y + 1) * src_stride];
                for (dst, px) in row_out.iter_mut().zip(row_in.chunks_exact(4)) {
                    *dst = ColorBgra::from_rgba(px[0], px[1], px[2], px[3]);
                }
            });
        surface
    }

    /// Flatten back to an RGBA `image` buffer (for encoding).
    pub fn to_rgba_image(&self) -> RgbaImage {
        let mut out = RgbaImage::new(self.width, self.height);
        if self.pixels.is_empty() {
            return out;
        }
        let stride = self.width as usize * 4;
        let pixels = &self.pixels;
        let w = self.width as usize;
        out.as_mut()
            .par_chunks_mut(stride)
            .enumerate()
            .for_each(|(y, row_out)| {
                let row_in = &pixels[y * w..(y + 1) * w];
                for (dst, px) in row_out.chunks_exact_mut(4).zip(row_in) {
                    dst.copy_from_slice(&px.to_rgba_bytes());
                }
            });
        out
    }

    #[inline(always)]
    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Read a pixel. Out-of-bounds reads return transparent black.
    #[inline]
    pub fn get_pixel(&self, x: u32, y: u32) -> ColorBgra {
        if x >= self.width || y >= self.height {
            return ColorBgra::TRANSPARENT;
        }
        self.pixels[self.index(x, y)]
    }

    /// Write a pixel. Out-of-bounds writes are ignored.
    #[inline]
    pub fn put_pixel(&mut self, x: u32, y: u32, px: ColorBgra) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = self.index(x, y);
        self.pixels[idx] = px;
    }

    pub fn pixels(&self) -> &[ColorBgra] {
        &self.pixels
    }

    /// Approximate heap memory held by the pixel buffer.
    pub fn memory_bytes(&self) -> usize {
        self.pixels.len() * std::mem::size_of::<ColorBgra>()
    }

    /// Split into disjoint bands of `rows_per_band` full-width rows
    /// (the last band may be shorter), yielded in parallel.
    pub fn par_bands_mut(
        &mut self,
        rows_per_band: u32,
    ) -> impl IndexedParallelIterator<Item = SurfaceBand<'_>> + '_ {
        let width = self.width;
        let height = self.height;
        let rows = rows_per_band.max(1);
        let chunk_len = (width as usize * rows as usize).max(1);
        self.pixels
            .par_chunks_mut(chunk_len)
            .enumerate()
            .map(move |(i, pixels)| SurfaceBand {
                width,
                height,
                top: i as u32 * rows,
                pixels,
            })
    }
}

impl PixelSurface for Surface {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    fn get_pixel(&self, x: u32, y: u32) -> ColorBgra {
        Surface::get_pixel(self, x, y)
    }

    #[inline]
    fn put_pixel(&mut self, x: u32, y: u32, px: ColorBgra) {
        Surface::put_pixel(self, x, y, px)
    }
}

// ============================================================================
// SURFACE BAND — exclusive view of a run of full-width rows
// ============================================================================

/// Mutable view of rows `top..top + rows` of a [`Surface`].
///
/// Bands produced by [`Surface::par_bands_mut`] never overlap, which is what
/// lets the tiling scheduler write them from several threads without locks.
pub struct SurfaceBand<'a> {
    width: u32,
    height: u32,
    top: u32,
    pixels: &'a mut [ColorBgra],
}

impl SurfaceBand<'_> {
    pub fn top(&self) -> u32 {
        self.top
    }

    pub fn rows(&self) -> u32 {
        if self.width == 0 {
            return 0;
        }
        (self.pixels.len() / self.width as usize) as u32
    }

    #[inline(always)]
    fn local_index(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y < self.top {
            return None;
        }
        let idx = (y - self.top) as usize * self.width as usize + x as usize;
        (idx < self.pixels.len()).then_some(idx)
    }
}

impl PixelSurface for SurfaceBand<'_> {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn bounds(&self) -> Rect {
        Rect::new(0, self.top, self.width, self.top + self.rows())
    }

    #[inline]
    fn get_pixel(&self, x: u32, y: u32) -> ColorBgra {
        self.local_index(x, y)
            .map(|i| self.pixels[i])
            .unwrap_or(ColorBgra::TRANSPARENT)
    }

    #[inline]
    fn put_pixel(&mut self, x: u32, y: u32, px: ColorBgra) {
        if let Some(i) = self.local_index(x, y) {
            self.pixels[i] = px;
        }
    }
}
