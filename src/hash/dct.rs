//! DCT perceptual hash.
//!
//! Computes a 2-D discrete cosine transform of the preprocessed plane and
//! emits the signs of the lowest-frequency modes. Only even-order modes
//! are kept by default, which makes the hash tolerant to mirroring and
//! flipping. DC coefficients are always excluded.

use super::image::Image;
use super::{BitWriter, Hasher};
use crate::error::{HashError, HashResult};
use std::borrow::Cow;

#[derive(Debug, Clone)]
pub struct DctHash {
    n: usize,
    m: usize,
    even: bool,
    /// 1-D DCT matrix coefficients, column-major: `mat[j*m + i]` is mode
    /// `i` evaluated at sample `j`
    mat: Vec<f32>,
}

/// DCT coefficient `cos(pi*i*(2j+1) / (2N))`; normalization is dropped
/// since only signs are kept
#[inline]
fn coef(n: usize, i: usize, j: usize) -> f32 {
    let d = std::f32::consts::FRAC_PI_2 / n as f32;
    (d * (i as f32) * (2 * j + 1) as f32).cos()
}

impl DctHash {
    /// `m` modes per axis, `m*m` bits total. With `even`, only even-order
    /// modes are used and `m` is clamped to `n/2`; otherwise to `n`.
    pub fn new(m: usize, even: bool) -> Self {
        let n = 128;
        let m = Self::clamp_modes(n, m, even);
        Self {
            n,
            m,
            even,
            mat: Self::matrix(n, m, even),
        }
    }

    /// The CLI sizes: `dct1`..`dct4` give 64/256/576/1024-bit hashes
    pub fn with_size(size: usize) -> HashResult<Self> {
        if !(1..=4).contains(&size) {
            return Err(HashError::UnknownAlgorithm {
                name: format!("dct{size}"),
            });
        }
        Ok(Self::new(8 * size, true))
    }

    fn clamp_modes(n: usize, m: usize, even: bool) -> usize {
        if even { m.min(n / 2) } else { m.min(n) }
    }

    fn matrix(n: usize, m: usize, even: bool) -> Vec<f32> {
        let mut mat = Vec::with_capacity(n * m);
        for j in 0..n {
            for i in 0..m {
                // Orders start at 1 (or 2 for even-only) to skip DC
                let order = if even { 2 * (i + 1) } else { i + 1 };
                mat.push(coef(n, order, j));
            }
        }
        mat
    }
}

impl Hasher for DctHash {
    fn hash(&self, image: &Image<f32>) -> HashResult<Vec<u8>> {
        if image.width != image.height || image.channels != 1 {
            return Err(HashError::BadShape {
                height: image.height,
                width: image.width,
                channels: image.channels,
            });
        }

        // Rebuild the matrix locally if the image size differs from the
        // size this hasher was constructed for
        let n = image.width;
        let (m, mat): (usize, Cow<'_, [f32]>) = if n == self.n {
            (self.m, Cow::Borrowed(&self.mat))
        } else {
            let m = Self::clamp_modes(n, self.m, self.even);
            (m, Cow::Owned(Self::matrix(n, m, self.even)))
        };

        // Phase 1: DCT across rows. dct1 is height x m
        let mut dct1 = vec![0.0f32; n * m];
        for y in 0..n {
            for x in 0..n {
                let p = image.at(y, x, 0);
                for u in 0..m {
                    dct1[y * m + u] += mat[x * m + u] * p;
                }
            }
        }

        // Phase 2: DCT along columns. dct is m x m
        let mut dct = vec![0.0f32; m * m];
        for v in 0..m {
            for u in 0..m {
                let mut sum = 0.0f32;
                for y in 0..n {
                    sum += mat[y * m + v] * dct1[y * m + u];
                }
                dct[v * m + u] = sum;
            }
        }

        // Phase 3: emit sign bits in square-shell order so the prefix is
        // stable no matter the size:
        //   0 1 4
        //   2 3 5
        //   6 7 8
        let mut bits = BitWriter::with_capacity(m * m / 8);
        for u in 0..m {
            // Down the column at u, to the row above the diagonal
            for v in 0..u {
                bits.push(dct[v * m + u] > 0.0);
            }
            // Across row u, through the diagonal
            for uu in 0..=u {
                bits.push(dct[u * m + uu] > 0.0);
            }
        }
        Ok(bits.into_bytes())
    }

    fn name(&self) -> &'static str {
        match self.m {
            8 => "dct1",
            16 => "dct2",
            24 => "dct3",
            32 => "dct4",
            _ => "dct",
        }
    }
}

impl Default for DctHash {
    fn default() -> Self {
        Self::new(8, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hamming_distance;
    use crate::hash::image::Preprocess;

    fn textured_image() -> Image<u8> {
        let mut data = Vec::with_capacity(96 * 96);
        for y in 0..96usize {
            for x in 0..96usize {
                let v = 127.0 + 100.0 * (x as f32 * 0.17).sin() * (y as f32 * 0.13).cos();
                data.push(v as u8);
            }
        }
        Image::from_raw(96, 96, 1, data)
    }

    #[test]
    fn test_hash_sizes() {
        let prep = Preprocess::new(128);
        let plane = prep.apply(&textured_image());
        for (size, bytes) in [(1, 8), (2, 32), (3, 72), (4, 128)] {
            let hash = DctHash::with_size(size).unwrap().hash(&plane).unwrap();
            assert_eq!(hash.len(), bytes, "dct{size}");
        }
    }

    #[test]
    fn test_with_size_rejects_out_of_range() {
        assert!(DctHash::with_size(0).is_err());
        assert!(DctHash::with_size(5).is_err());
    }

    #[test]
    fn test_rejects_non_square_input() {
        let img = Image::<f32>::new(8, 16, 1);
        let err = DctHash::default().hash(&img).unwrap_err();
        assert!(matches!(err, HashError::BadShape { .. }));
    }

    #[test]
    fn test_hash_is_deterministic() {
        let prep = Preprocess::new(128);
        let plane = prep.apply(&textured_image());
        let hasher = DctHash::default();
        assert_eq!(hasher.hash(&plane).unwrap(), hasher.hash(&plane).unwrap());
    }

    #[test]
    fn test_different_images_differ() {
        let prep = Preprocess::new(128);
        let a = prep.apply(&textured_image());

        let mut inverted = textured_image();
        for p in &mut inverted.data {
            *p = 255 - *p;
        }
        let b = prep.apply(&inverted);

        let hasher = DctHash::default();
        let ha = hasher.hash(&a).unwrap();
        let hb = hasher.hash(&b).unwrap();
        assert!(hamming_distance(&ha, &hb) > 0);
    }

    #[test]
    fn test_mirror_tolerance() {
        let img = textured_image();
        let mut mirrored = img.clone();
        for y in 0..img.height {
            for x in 0..img.width {
                let idx = mirrored.index(y, x, 0);
                mirrored.data[idx] = img.at(y, img.width - 1 - x, 0);
            }
        }

        let prep = Preprocess::new(128);
        let hasher = DctHash::default();
        let ha = hasher.hash(&prep.apply(&img)).unwrap();
        let hb = hasher.hash(&prep.apply(&mirrored)).unwrap();

        // Even-order modes are symmetric, so mirroring moves at most a few
        // bits (resampling noise around zero coefficients)
        assert!(hamming_distance(&ha, &hb) <= 8);
    }

    #[test]
    fn test_smaller_working_size_is_supported() {
        let prep = Preprocess::new(64);
        let plane = prep.apply(&textured_image());
        let hash = DctHash::default().hash(&plane).unwrap();
        assert_eq!(hash.len(), 8);
    }
}
