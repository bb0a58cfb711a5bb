pub mod sauvola;
pub mod sauvola_ms;

pub use sauvola::sauvola;
pub use sauvola_ms::sauvola_ms;

use crate::image2d::{BitImage2, GrayImage2, Image2D};

/// Dynamic range of the standard deviation; 128 for grayscale documents.
pub const SAUVOLA_R: f64 = 128.0;
/// Default window diameter for Sauvola-based algorithms (must be odd).
pub const DEFAULT_SAUVOLA_WIN: usize = 101;
/// Default K. Badekas et al. (2005) found 0.34 best across document sets.
pub const DEFAULT_SAUVOLA_K: f64 = 0.34;
/// Default number of pyramid levels for the multi-scale variant.
pub const DEFAULT_SAUVOLA_DEPTH: usize = 3;

/// Fixed mid-range cut, the "violent" conversion from gray to binary.
pub fn convert_binarize(img: &GrayImage2) -> BitImage2 {
    let mut out: BitImage2 = Image2D::new(img.nrows(), img.ncols());
    for r in 0..img.nrows() {
        let src = img.row(r);
        let dst = out.row_mut(r);
        for (c, &v) in src.iter().enumerate() {
            dst[c] = v < 128;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convert_cuts_at_mid_range() {
        let img: GrayImage2 = Image2D::from_vec(1, 4, vec![0, 127, 128, 255]);
        let mask = convert_binarize(&img);
        assert!(mask.at(0, 0));
        assert!(mask.at(0, 1));
        assert!(!mask.at(0, 2));
        assert!(!mask.at(0, 3));
    }
}
