//! Bit-level helpers over borrowed byte storage
//!
//! Bit `i` lives in byte `i / 8` at position `i % 8` (least significant bit
//! first). The storage is owned elsewhere, typically carved out of an
//! allocator, so everything here works on plain `&[u8]` / `&mut [u8]`.

/// Bits per storage byte
pub const BITS_PER_BYTE: usize = 8;

/// Number of bytes needed to hold `bits` bits
#[inline]
pub const fn bytes_for(bits: usize) -> usize {
    bits / BITS_PER_BYTE + (bits % BITS_PER_BYTE != 0) as usize
}

/// Bit indices `[first, first + count)`
///
/// Panics when the end overflows, like an out-of-bounds slice index, rather
/// than wrapping to an empty range. Callers validate user-supplied counts first.
#[inline]
fn span(first: usize, count: usize) -> core::ops::Range<usize> {
    match first.checked_add(count) {
        Some(end) => first..end,
        None => panic!("bit range {first} + {count} overflows usize"),
    }
}

/// Get a bit
#[inline]
pub fn get(bytes: &[u8], index: usize) -> bool {
    (bytes[index / BITS_PER_BYTE] & (1u8 << (index % BITS_PER_BYTE))) != 0
}

/// Set a bit
#[inline]
pub fn set(bytes: &mut [u8], index: usize) {
    bytes[index / BITS_PER_BYTE] |= 1u8 << (index % BITS_PER_BYTE);
}

/// Clear a bit
#[inline]
pub fn clear(bytes: &mut [u8], index: usize) {
    bytes[index / BITS_PER_BYTE] &= !(1u8 << (index % BITS_PER_BYTE));
}

/// Set bits `[first, first + count)`
pub fn set_range(bytes: &mut [u8], first: usize, count: usize) {
    for index in span(first, count) {
        set(bytes, index);
    }
}

/// Clear bits `[first, first + count)`
pub fn clear_range(bytes: &mut [u8], first: usize, count: usize) {
    for index in span(first, count) {
        clear(bytes, index);
    }
}

/// Check that every bit in `[first, first + count)` is set
pub fn is_range_set(bytes: &[u8], first: usize, count: usize) -> bool {
    span(first, count).all(|index| get(bytes, index))
}

/// Check that any bit in `[first, first + count)` is set
pub fn any_in_range(bytes: &[u8], first: usize, count: usize) -> bool {
    span(first, count).any(|index| get(bytes, index))
}

/// Find the first run of `count` clear bits among the first `len` bits.
///
/// Returns the index of the first bit of the run. Fully occupied bytes are
/// skipped whole.
pub fn find_clear_run(bytes: &[u8], len: usize, count: usize) -> Option<usize> {
    if count == 0 || count > len {
        return None;
    }

    let mut run_start = 0;
    let mut run_len = 0;
    let mut index = 0;

    while index < len {
        if run_len == 0
            && index % BITS_PER_BYTE == 0
            && index + BITS_PER_BYTE <= len
            && bytes[index / BITS_PER_BYTE] == u8::MAX
        {
            index += BITS_PER_BYTE;
            run_start = index;
            continue;
        }

        if get(bytes, index) {
            run_len = 0;
            run_start = index + 1;
        } else {
            run_len += 1;
            if run_len == count {
                return Some(run_start);
            }
        }
        index += 1;
    }

    None
}

/// Count set bits among the first `len` bits
pub fn count_ones(bytes: &[u8], len: usize) -> usize {
    let full = len / BITS_PER_BYTE;
    let mut ones: usize = bytes[..full].iter().map(|b| b.count_ones() as usize).sum();
    for index in full * BITS_PER_BYTE..len {
        if get(bytes, index) {
            ones += 1;
        }
    }
    ones
}

/// Length of the longest run of clear bits among the first `len` bits
pub fn longest_clear_run(bytes: &[u8], len: usize) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for index in 0..len {
        if get(bytes, index) {
            current = 0;
        } else {
            current += 1;
            longest = longest.max(current);
        }
    }
    longest
}
