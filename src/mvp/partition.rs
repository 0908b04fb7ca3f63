//! Two-bit partition codec.
//!
//! Each vantage point owns two bits of the 64-bit partition key at offset
//! `2*(id-1)`, holding the shell index (0..=3) of the point around that
//! vantage point. The whole key is the bitwise OR over all vantage points.
//! Vantage point ids are dense and start at 1, so the codec supports at
//! most 32 of them.

/// Capacity of the 64-bit partition key
pub const MAX_VANTAGE_POINTS: u32 = 32;

#[inline]
fn bit_offset(vp_id: i64) -> u32 {
    debug_assert!((1..=MAX_VANTAGE_POINTS as i64).contains(&vp_id));
    (2 * (vp_id - 1)) as u32
}

/// The contribution of shell `shell` under vantage point `vp_id`
#[inline]
pub fn bits(shell: usize, vp_id: i64) -> i64 {
    debug_assert!(shell <= 3);
    (shell as i64) << bit_offset(vp_id)
}

/// Mask covering the two bits owned by `vp_id`
#[inline]
pub fn mask(vp_id: i64) -> i64 {
    0b11 << bit_offset(vp_id)
}

/// Clear the bits owned by `vp_id` so they can be rewritten
#[inline]
pub fn clear(partition: i64, vp_id: i64) -> i64 {
    partition & !mask(vp_id)
}

/// Read back the shell index stored for `vp_id`
#[inline]
pub fn shell_of_key(partition: i64, vp_id: i64) -> usize {
    ((partition >> bit_offset(vp_id)) & 0b11) as usize
}
