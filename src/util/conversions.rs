use crate::util::constants::*;
use crate::util::Address;

/* Alignment */

pub fn is_address_aligned(addr: Address) -> bool {
    addr.is_aligned_to(BYTES_IN_ADDRESS)
}

pub const fn raw_align_up(val: usize, align: usize) -> usize {
    // See https://github.com/rust-lang/rust/blob/e620d0f337d0643c757bab791fc7d88d63217704/src/libcore/alloc.rs#L192
    val.wrapping_add(align).wrapping_sub(1) & !align.wrapping_sub(1)
}

pub const fn raw_align_down(val: usize, align: usize) -> usize {
    val & !align.wrapping_sub(1)
}

pub const fn raw_is_aligned(val: usize, align: usize) -> bool {
    val & align.wrapping_sub(1) == 0
}

/* Conversion */

/// Usage of `used` bytes out of `size`, in whole percent. An empty region reports 0%.
pub fn usage_percent(used: usize, size: usize) -> usize {
    if size == 0 {
        0
    } else {
        ((used as u128 * 100) / size as u128) as usize
    }
}

/// Renders a byte count the way the operator reports do: exact bytes under 1K,
/// otherwise the largest binary unit with one decimal.
pub fn bytes_to_formatted_string(bytes: usize) -> String {
    const UNITS: [&str; 3] = ["KB", "MB", "GB"];
    if bytes < BYTES_IN_KBYTE {
        return format!("{}B", bytes);
    }
    let mut value = bytes as f64 / BYTES_IN_KBYTE as f64;
    let mut unit = 0;
    while value >= BYTES_IN_KBYTE as f64 && unit < UNITS.len() - 1 {
        value /= BYTES_IN_KBYTE as f64;
        unit += 1;
    }
    format!("{:.1}{}", value, UNITS[unit])
}
