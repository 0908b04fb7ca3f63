//! Binary PPM (P6) decoding.
//!
//! The only format decoded natively. 8- and 16-bit rasters are supported;
//! 16-bit samples are reduced to 8 bits at load since the hashes operate on
//! 256-bin histograms anyway. Comments (`#` to end of line) are honored
//! anywhere in the header.

use super::image::Image;
use crate::error::{HashError, HashResult};
use std::io::Read;
use std::path::Path;

/// Refuse rasters larger than this (1 GiB)
const MAX_RASTER_BYTES: usize = 0x4000_0000;

struct ByteReader<R: Read> {
    inner: R,
    peeked: Option<u8>,
}

impl<R: Read> ByteReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            peeked: None,
        }
    }

    fn next_byte(&mut self) -> HashResult<Option<u8>> {
        if let Some(b) = self.peeked.take() {
            return Ok(Some(b));
        }
        let mut buf = [0u8; 1];
        loop {
            match self.inner.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(buf[0])),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(HashError::PpmFormat {
                        reason: format!("read failed: {e}"),
                    });
                }
            }
        }
    }

    fn unread(&mut self, b: u8) {
        self.peeked = Some(b);
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> HashResult<()> {
        let mut filled = 0;
        if !buf.is_empty() {
            if let Some(b) = self.peeked.take() {
                buf[0] = b;
                filled = 1;
            }
        }
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => return Err(HashError::PpmTruncated),
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(HashError::PpmFormat {
                        reason: format!("read failed: {e}"),
                    });
                }
            }
        }
        Ok(())
    }

    /// Skip whitespace and `#` comments, returning the first significant byte
    fn skip_space(&mut self) -> HashResult<u8> {
        let mut comment = false;
        loop {
            let b = self.next_byte()?.ok_or(HashError::PpmTruncated)?;
            if comment {
                if b == b'\r' || b == b'\n' {
                    comment = false;
                }
            } else if b == b'#' {
                comment = true;
            } else if !b.is_ascii_whitespace() {
                return Ok(b);
            }
        }
    }

    /// Parse an ASCII decimal, leaving the terminating byte unread
    fn read_number(&mut self) -> HashResult<usize> {
        let first = self.skip_space()?;
        if !first.is_ascii_digit() {
            return Err(HashError::PpmFormat {
                reason: format!("expected digit, got 0x{first:02x}"),
            });
        }
        let mut value: usize = (first - b'0') as usize;
        loop {
            match self.next_byte()? {
                Some(b) if b.is_ascii_digit() => {
                    value = value
                        .checked_mul(10)
                        .and_then(|v| v.checked_add((b - b'0') as usize))
                        .ok_or_else(|| HashError::PpmFormat {
                            reason: "header number overflow".to_string(),
                        })?;
                }
                Some(b) => {
                    self.unread(b);
                    return Ok(value);
                }
                None => return Ok(value),
            }
        }
    }
}

/// Decode a P6 stream into an RGB byte image.
///
/// Returns `Ok(None)` at a clean end of stream so callers can pull a
/// sequence of concatenated images from stdin.
pub fn load_ppm<R: Read>(reader: R) -> HashResult<Option<Image<u8>>> {
    let mut r = ByteReader::new(reader);

    // Magic number; a clean EOF here means the stream is exhausted
    let first = match r.next_byte()? {
        Some(b) => b,
        None => return Ok(None),
    };
    let second = r.next_byte()?.ok_or(HashError::PpmTruncated)?;
    if first != b'P' || second != b'6' {
        return Err(HashError::PpmFormat {
            reason: format!("invalid magic 0x{first:02x}{second:02x}"),
        });
    }

    let width = r.read_number()?;
    let height = r.read_number()?;
    let maxval = r.read_number()?;

    if maxval == 0 || maxval > 0xFFFF {
        return Err(HashError::PpmFormat {
            reason: format!("invalid maxval {maxval}"),
        });
    }
    // A single whitespace byte separates the header from the raster
    match r.next_byte()? {
        Some(b) if b.is_ascii_whitespace() => {}
        Some(_) => {
            return Err(HashError::PpmFormat {
                reason: "no whitespace after maxval".to_string(),
            });
        }
        None => return Err(HashError::PpmTruncated),
    }

    let wide = maxval > 0xFF;
    let pixels = width
        .checked_mul(height)
        .and_then(|n| n.checked_mul(3))
        .ok_or_else(|| HashError::PpmFormat {
            reason: "raster size overflow".to_string(),
        })?;
    let raster_bytes = if wide { pixels * 2 } else { pixels };
    if raster_bytes > MAX_RASTER_BYTES {
        return Err(HashError::PpmFormat {
            reason: format!("raster too large ({raster_bytes} bytes)"),
        });
    }

    let mut data = vec![0u8; pixels];
    if wide {
        // MSB first; keep the high byte
        let row_len = width * 3;
        let mut row = vec![0u8; row_len * 2];
        for y in 0..height {
            r.read_exact(&mut row)?;
            for i in 0..row_len {
                data[y * row_len + i] = row[2 * i];
            }
        }
    } else {
        r.read_exact(&mut data)?;
    }

    Ok(Some(Image::from_raw(height, width, 3, data)))
}

/// Load a PPM file from disk
pub fn load_ppm_file(path: &Path) -> HashResult<Image<u8>> {
    let file = std::fs::File::open(path).map_err(|source| HashError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    load_ppm(std::io::BufReader::new(file))?.ok_or_else(|| HashError::PpmFormat {
        reason: "empty file".to_string(),
    })
}
