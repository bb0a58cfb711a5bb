use image::GrayImage;

// ── Image2D ───────────────────────────────────────────────────────────────

/// Densely stored 2-D raster, row-major, indexed by `(row, col)`.
///
/// Dimensions are fixed at construction. Public accessors are
/// bounds-checked; iteration over whole rows goes through `row`/`rows_mut`
/// so hot loops avoid per-pixel checks.
#[derive(Debug, Clone, PartialEq)]
pub struct Image2D<T> {
    nrows: usize,
    ncols: usize,
    data: Vec<T>,
}

/// Grayscale intensity raster.
pub type GrayImage2 = Image2D<u8>;
/// Binary mask; `true` is foreground (ink).
pub type BitImage2 = Image2D<bool>;
/// Component label raster; 0 is background.
pub type LabelImage2 = Image2D<u32>;

impl<T: Copy + Default> Image2D<T> {
    pub fn new(nrows: usize, ncols: usize) -> Self {
        Self::filled(nrows, ncols, T::default())
    }

    pub fn filled(nrows: usize, ncols: usize, value: T) -> Self {
        Image2D {
            nrows,
            ncols,
            data: vec![value; nrows * ncols],
        }
    }

    /// Wrap an existing row-major buffer. `data.len()` must equal
    /// `nrows * ncols`.
    pub fn from_vec(nrows: usize, ncols: usize, data: Vec<T>) -> Self {
        assert_eq!(data.len(), nrows * ncols, "buffer does not match dimensions");
        Image2D { nrows, ncols, data }
    }

    #[inline]
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    #[inline]
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn is_empty(&self) -> bool {
        self.nrows == 0 || self.ncols == 0
    }

    /// Bounds-checked read. Panics on out-of-range coordinates.
    #[inline]
    pub fn at(&self, row: usize, col: usize) -> T {
        assert!(row < self.nrows && col < self.ncols, "({row}, {col}) out of bounds");
        self.data[row * self.ncols + col]
    }

    /// Bounds-checked write. Panics on out-of-range coordinates.
    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: T) {
        assert!(row < self.nrows && col < self.ncols, "({row}, {col}) out of bounds");
        self.data[row * self.ncols + col] = value;
    }

    /// Checked read; `None` outside the raster.
    #[inline]
    pub fn try_at(&self, row: i64, col: i64) -> Option<T> {
        if row < 0 || col < 0 || row as usize >= self.nrows || col as usize >= self.ncols {
            None
        } else {
            Some(self.data[row as usize * self.ncols + col as usize])
        }
    }

    #[inline]
    pub fn row(&self, row: usize) -> &[T] {
        &self.data[row * self.ncols..(row + 1) * self.ncols]
    }

    #[inline]
    pub fn row_mut(&mut self, row: usize) -> &mut [T] {
        let w = self.ncols;
        &mut self.data[row * w..(row + 1) * w]
    }

    /// Parallel-friendly view: one mutable slice per row.
    pub fn rows_mut(&mut self) -> std::slice::ChunksMut<'_, T> {
        self.data.chunks_mut(self.ncols.max(1))
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }
}

impl BitImage2 {
    /// Number of foreground pixels.
    pub fn count_foreground(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }

    /// OR-merge another mask of identical dimensions into this one.
    pub fn or_assign(&mut self, other: &BitImage2) {
        assert_eq!(self.nrows, other.nrows);
        assert_eq!(self.ncols, other.ncols);
        for (d, &s) in self.data.iter_mut().zip(other.data.iter()) {
            *d |= s;
        }
    }
}

// ── image-crate interop ───────────────────────────────────────────────────
//
// The `image` crate indexes (x, y); these rasters index (row, col). Both
// store row-major, so conversion is a buffer handoff.

impl GrayImage2 {
    pub fn from_gray(img: &GrayImage) -> Self {
        Image2D {
            nrows: img.height() as usize,
            ncols: img.width() as usize,
            data: img.as_raw().clone(),
        }
    }

    pub fn to_gray(&self) -> GrayImage {
        GrayImage::from_raw(self.ncols as u32, self.nrows as u32, self.data.clone())
            .expect("dimensions match buffer")
    }
}

impl BitImage2 {
    /// Render as 8-bit gray, ink black on white.
    pub fn to_gray(&self) -> GrayImage {
        let bytes: Vec<u8> = self.data.iter().map(|&fg| if fg { 0 } else { 255 }).collect();
        GrayImage::from_raw(self.ncols as u32, self.nrows as u32, bytes)
            .expect("dimensions match buffer")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_set_at() {
        let mut img: GrayImage2 = Image2D::new(3, 4);
        img.set(2, 3, 17);
        assert_eq!(img.at(2, 3), 17);
        assert_eq!(img.at(0, 0), 0);
    }

    #[test]
    #[should_panic]
    fn out_of_bounds_panics() {
        let img: GrayImage2 = Image2D::new(3, 4);
        img.at(3, 0);
    }

    #[test]
    fn try_at_clips() {
        let img: GrayImage2 = Image2D::filled(2, 2, 9);
        assert_eq!(img.try_at(-1, 0), None);
        assert_eq!(img.try_at(1, 1), Some(9));
        assert_eq!(img.try_at(2, 0), None);
    }

    #[test]
    fn mask_or_and_count() {
        let mut a: BitImage2 = Image2D::new(2, 2);
        let mut b: BitImage2 = Image2D::new(2, 2);
        a.set(0, 0, true);
        b.set(1, 1, true);
        a.or_assign(&b);
        assert_eq!(a.count_foreground(), 2);
    }

    #[test]
    fn gray_interop_preserves_layout() {
        let mut img: GrayImage2 = Image2D::new(2, 3);
        img.set(1, 2, 200);
        let gray = img.to_gray();
        // (x, y) = (col, row) on the image-crate side
        assert_eq!(gray.get_pixel(2, 1)[0], 200);
        let back = GrayImage2::from_gray(&gray);
        assert_eq!(back, img);
    }
}
