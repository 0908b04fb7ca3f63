//! Pixel buffer, area-averaging resize, and hashing preprocessor.
//!
//! Images are flat row-major buffers. Resizing distributes source pixels
//! over destination tiles of near-equal size, so every input pixel
//! contributes exactly once regardless of the scale ratio.

use crate::debug_print;

/// A flat row-major pixel buffer
#[derive(Debug, Clone)]
pub struct Image<T> {
    pub data: Vec<T>,
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl<T: Copy + Default> Image<T> {
    pub fn new(height: usize, width: usize, channels: usize) -> Self {
        Self {
            data: vec![T::default(); height * width * channels],
            height,
            width,
            channels,
        }
    }

    pub fn from_raw(height: usize, width: usize, channels: usize, data: Vec<T>) -> Self {
        debug_assert_eq!(data.len(), height * width * channels);
        Self {
            data,
            height,
            width,
            channels,
        }
    }

    #[inline]
    pub fn row_size(&self) -> usize {
        self.width * self.channels
    }

    #[inline]
    pub fn index(&self, y: usize, x: usize, c: usize) -> usize {
        y * self.row_size() + x * self.channels + c
    }

    #[inline]
    pub fn at(&self, y: usize, x: usize, c: usize) -> T {
        self.data[self.index(y, x, c)]
    }
}

/// Distribute `a` items over `b` tiles (`a >= b`) so tile sizes differ by
/// at most one and every tile is non-empty.
pub fn tile_size(a: usize, b: usize) -> Vec<usize> {
    (0..b).map(|j| a * (j + 1) / b - a * j / b).collect()
}

/// Per-output-coordinate source range along one axis: (start, count).
/// Upscaling maps several outputs to a single source (count 1);
/// downscaling maps one output to a run of sources.
fn axis_map(in_n: usize, out_n: usize) -> Vec<(usize, usize)> {
    let mut map = Vec::with_capacity(out_n);
    if in_n == out_n {
        for i in 0..in_n {
            map.push((i, 1));
        }
    } else if in_n > out_n {
        let tiles = tile_size(in_n, out_n);
        let mut start = 0;
        for t in tiles {
            map.push((start, t));
            start += t;
        }
    } else {
        // out_n > in_n: replicate each source over its output tile
        let tiles = tile_size(out_n, in_n);
        for (src, t) in tiles.into_iter().enumerate() {
            for _ in 0..t {
                map.push((src, 1));
            }
        }
    }
    map
}

/// Area-averaging resize. Channels are preserved; accumulation is in f32.
pub fn resize<T>(input: &Image<T>, out_h: usize, out_w: usize) -> Image<f32>
where
    T: Copy + Default,
    f32: From<T>,
{
    let map_h = axis_map(input.height, out_h);
    let map_w = axis_map(input.width, out_w);
    let channels = input.channels;
    let mut out = Image::<f32>::new(out_h, out_w, channels);

    for (oy, &(sy, ny)) in map_h.iter().enumerate() {
        for (ox, &(sx, nx)) in map_w.iter().enumerate() {
            for c in 0..channels {
                let mut sum = 0.0f32;
                for y in sy..sy + ny {
                    for x in sx..sx + nx {
                        sum += f32::from(input.at(y, x, c));
                    }
                }
                let idx = out.index(oy, ox, c);
                out.data[idx] = sum / (ny * nx) as f32;
            }
        }
    }
    out
}

const HIST_BINS: usize = 256;

/// Prepare an image for hashing: resize to a fixed working size, then
/// histogram-equalize each channel and collapse to a single plane.
#[derive(Debug, Clone)]
pub struct Preprocess {
    size: usize,
}

impl Preprocess {
    pub fn new(size: usize) -> Self {
        Self { size }
    }

    /// Equalization lookup table: cumulative sum of the normalized
    /// per-channel histogram of the source pixels
    fn equalize_lut(input: &Image<u8>) -> Vec<f32> {
        let channels = input.channels;
        let mut hist = vec![0usize; channels * HIST_BINS];
        for (i, &p) in input.data.iter().enumerate() {
            let c = i % channels;
            hist[c * HIST_BINS + p as usize] += 1;
        }

        let count = (input.height * input.width) as f32;
        let mut lut = Vec::with_capacity(hist.len());
        for c in 0..channels {
            let mut sum = 0usize;
            for bin in 0..HIST_BINS {
                sum += hist[c * HIST_BINS + bin];
                lut.push(sum as f32 / count);
            }
        }
        lut
    }

    pub fn apply(&self, input: &Image<u8>) -> Image<f32> {
        debug_print!(
            "preprocess {}x{}x{} -> {}x{}",
            input.height,
            input.width,
            input.channels,
            self.size,
            self.size
        );
        let lut = Self::equalize_lut(input);
        let resized = resize(input, self.size, self.size);

        let channels = resized.channels;
        let mut out = Image::<f32>::new(self.size, self.size, 1);
        for y in 0..self.size {
            for x in 0..self.size {
                let mut sum = 0.0f32;
                for c in 0..channels {
                    let p = resized.at(y, x, c);
                    let bin = (p.clamp(0.0, 255.0) + 0.5) as usize;
                    sum += lut[c * HIST_BINS + bin.min(HIST_BINS - 1)];
                }
                let idx = out.index(y, x, 0);
                out.data[idx] = sum;
            }
        }
        out
    }
}

impl Default for Preprocess {
    fn default() -> Self {
        Self::new(128)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_size_distributes_evenly() {
        let tiles = tile_size(10, 4);
        assert_eq!(tiles.len(), 4);
        assert_eq!(tiles.iter().sum::<usize>(), 10);
        // Sizes differ by at most one
        let min = *tiles.iter().min().unwrap();
        let max = *tiles.iter().max().unwrap();
        assert!(max - min <= 1, "tiles: {tiles:?}");
    }

    #[test]
    fn test_tile_size_exact_division() {
        assert_eq!(tile_size(8, 4), vec![2, 2, 2, 2]);
        assert_eq!(tile_size(5, 5), vec![1, 1, 1, 1, 1]);
    }

    #[test]
    fn test_resize_identity() {
        let img = Image::from_raw(2, 2, 1, vec![10u8, 20, 30, 40]);
        let out = resize(&img, 2, 2);
        assert_eq!(out.data, vec![10.0, 20.0, 30.0, 40.0]);
    }

    #[test]
    fn test_resize_downscale_averages() {
        let img = Image::from_raw(2, 2, 1, vec![10u8, 20, 30, 40]);
        let out = resize(&img, 1, 1);
        assert_eq!(out.data, vec![25.0]);
    }

    #[test]
    fn test_resize_upscale_replicates() {
        let img = Image::from_raw(1, 1, 1, vec![7u8]);
        let out = resize(&img, 2, 3);
        assert_eq!(out.height, 2);
        assert_eq!(out.width, 3);
        assert!(out.data.iter().all(|&p| p == 7.0));
    }

    #[test]
    fn test_resize_preserves_channels() {
        let img = Image::from_raw(2, 2, 3, (0u8..12).collect());
        let out = resize(&img, 1, 1);
        assert_eq!(out.channels, 3);
        // Channel c averages pixels c, c+3, c+6, c+9
        assert_eq!(out.data, vec![4.5, 5.5, 6.5]);
    }

    #[test]
    fn test_preprocess_output_is_single_channel() {
        let img = Image::from_raw(4, 4, 3, vec![128u8; 48]);
        let out = Preprocess::new(8).apply(&img);
        assert_eq!(out.channels, 1);
        assert_eq!(out.height, 8);
        assert_eq!(out.width, 8);
    }

    #[test]
    fn test_preprocess_constant_image_is_flat() {
        let img = Image::from_raw(16, 16, 1, vec![200u8; 256]);
        let out = Preprocess::new(8).apply(&img);
        let first = out.data[0];
        assert!(out.data.iter().all(|&p| (p - first).abs() < 1e-6));
    }
}
