//! Block-mean perceptual hash.
//!
//! The image is reduced to a 20x20 grid whose four quadrants are folded
//! into the top-left 10x10, making the hash invariant to horizontal and
//! vertical mirroring. Each of the inner 8x8 cells then contributes one
//! bit: set when the cell outranks at least half of its 3x3 neighborhood.

use super::image::{Image, resize};
use super::{BitWriter, Hasher};
use crate::error::HashResult;

const GRID: usize = 8;
const FOLDED: usize = GRID + 2;

#[derive(Debug, Clone, Copy, Default)]
pub struct BlockHash;

impl BlockHash {
    pub fn new() -> Self {
        Self
    }
}

impl Hasher for BlockHash {
    fn hash(&self, image: &Image<f32>) -> HashResult<Vec<u8>> {
        let side = 2 * FOLDED;
        let mut tmp = resize(image, side, side);

        // Fold the 4 quadrants into the top left
        for y in 0..FOLDED {
            for x in 0..FOLDED {
                let folded = tmp.at(y, x, 0)
                    + tmp.at(y, side - 1 - x, 0)
                    + tmp.at(side - 1 - y, x, 0)
                    + tmp.at(side - 1 - y, side - 1 - x, 0);
                let i = tmp.index(y, x, 0);
                tmp.data[i] = folded;
            }
        }

        let mut bits = BitWriter::with_capacity(GRID * GRID / 8);
        for y in 0..GRID {
            for x in 0..GRID {
                // Rank of the center pixel within its 3x3 neighborhood
                let p = tmp.at(y + 1, x + 1, 0);
                let mut rank = 0;
                for ny in y..y + 3 {
                    for nx in x..x + 3 {
                        if (ny, nx) == (y + 1, x + 1) {
                            continue;
                        }
                        if p > tmp.at(ny, nx, 0) {
                            rank += 1;
                        }
                    }
                }
                bits.push(rank >= 4);
            }
        }
        Ok(bits.into_bytes())
    }

    fn name(&self) -> &'static str {
        "block"
    }
}
