// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Block encoding: header/footer words and adjacent-block address
//! arithmetic, derived entirely from a payload pointer.
//!
//! A block never appears as a typed struct overlaying heap memory — only
//! as a base address read and written through the helpers below at fixed
//! byte offsets. That keeps the metadata scheme honest about what it
//! actually is: raw bytes with an agreed-upon shape, not a `#[repr(C)]`
//! struct a caller could alias behind our back.
//!
//! ```text
//! byte:   0    4    8    12                   size-4
//!         [hdr][prv][nxt][ payload / padding  ][ftr]
//! ```
//!
//! `prv` and `nxt` are each 4 bytes (heap-relative block offsets, `u32`);
//! together with the 4-byte header they make up the 12 bytes between a
//! block's base and its payload. They are only meaningful while the block
//! is FREE — an ALLOCATED block's bytes there belong to the client.

use crate::{log_warn, HeapSource};

/// Bytes per word; header, footer, and each free-list link are one word.
pub const WORD: usize = 4;

/// Non-payload bytes per block: 4-byte header + 4-byte footer + 8 bytes of
/// free-list link space that becomes payload once the block is allocated.
pub const OVERHEAD: usize = 16;

/// Byte offset of the previous-free link from a block's base.
pub(crate) const PREV_LINK_OFFSET: usize = 4;
/// Byte offset of the next-free link from a block's base.
pub(crate) const NEXT_LINK_OFFSET: usize = 8;

bitflags::bitflags! {
    /// The low bit of every header/footer word, packed alongside the size.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct State: u32 {
        const ALLOCATED = 0b1;
    }
}

/// A block holding this state is on some segregated free list.
pub const FREE: State = State::empty();
/// A block holding this state belongs to a client.
pub const ALLOCATED: State = State::ALLOCATED;

const SIZE_MASK: u32 = !0x7;
const STATE_MASK: u32 = 0x1;

/// Reads the raw header/footer word at `word_addr`.
///
/// # Safety
///
/// `word_addr` must point to 4 readable bytes belonging to a live block's
/// header or footer.
#[inline]
unsafe fn read_word(word_addr: *const u8) -> u32 {
    core::ptr::read_unaligned(word_addr as *const u32)
}

/// Writes the raw header/footer word at `word_addr`.
///
/// # Safety
///
/// `word_addr` must point to 4 writable bytes belonging to a live block's
/// header or footer.
#[inline]
unsafe fn write_word(word_addr: *mut u8, value: u32) {
    core::ptr::write_unaligned(word_addr as *mut u32, value);
}

/// Extracts the block size (a multiple of 8) from a header/footer word.
///
/// # Safety
///
/// See [`read_word`].
#[inline]
pub unsafe fn get_size(word_addr: *const u8) -> usize {
    (read_word(word_addr) & SIZE_MASK) as usize
}

/// Extracts the FREE/ALLOCATED state from a header/footer word.
///
/// # Safety
///
/// See [`read_word`].
#[inline]
pub unsafe fn get_state(word_addr: *const u8) -> State {
    State::from_bits_truncate(read_word(word_addr) & STATE_MASK)
}

/// Packs `size` and `state` into a single header/footer word. `size`'s
/// low 3 bits are discarded (callers must already have aligned it).
#[inline]
pub const fn pack(size: usize, state: State) -> u32 {
    (size as u32 & SIZE_MASK) | state.bits()
}

/// Rewrites the word at `word_addr` with a new size, preserving its state.
///
/// # Safety
///
/// See [`read_word`]/[`write_word`].
#[inline]
pub unsafe fn repack_size(word_addr: *mut u8, size: usize) {
    let state = get_state(word_addr);
    write_word(word_addr, pack(size, state));
}

/// Rewrites the word at `word_addr` with a new state, preserving its size.
///
/// # Safety
///
/// See [`read_word`]/[`write_word`].
#[inline]
pub unsafe fn repack_state(word_addr: *mut u8, state: State) {
    let size = get_size(word_addr);
    write_word(word_addr, pack(size, state));
}

/// Rewrites the word at `word_addr` with both a new size and state.
///
/// # Safety
///
/// See [`read_word`]/[`write_word`].
#[inline]
pub unsafe fn repack(word_addr: *mut u8, size: usize, state: State) {
    write_word(word_addr, pack(size, state));
}

/// Writes only a header word at `base` (used for the zero-sized right
/// terminator, which has no footer).
///
/// # Safety
///
/// `base` must point to 4 writable bytes.
#[inline]
pub unsafe fn write_header(base: *mut u8, size: usize, state: State) {
    write_word(base, pack(size, state));
}

/// Writes matching header and footer words for a block of `size` bytes
/// starting at `base`.
///
/// # Safety
///
/// `base` must point to a writable range of at least `size` bytes.
#[inline]
pub unsafe fn write_header_footer(base: *mut u8, size: usize, state: State) {
    write_word(base, pack(size, state));
    write_word(base.add(size - WORD), pack(size, state));
}

/// The address of `p`'s block header: `p - 12`.
#[inline]
pub unsafe fn header(p: *mut u8) -> *mut u8 {
    p.sub(3 * WORD)
}

/// The address of `p`'s block footer: `p - 16 + size(header(p))`.
#[inline]
pub unsafe fn footer(p: *mut u8) -> *mut u8 {
    header(p).add(get_size(header(p))).sub(WORD)
}

/// The address of the next block's header: `header(p) + size(header(p))`.
#[inline]
pub unsafe fn next_header(p: *mut u8) -> *mut u8 {
    header(p).add(get_size(header(p)))
}

/// The address of the previous block's footer: `p - 16`.
#[inline]
pub unsafe fn prev_footer(p: *mut u8) -> *mut u8 {
    header(p).sub(WORD)
}

/// The payload pointer of the next block: `p + size(header(p))`.
#[inline]
pub unsafe fn next_block(p: *mut u8) -> *mut u8 {
    p.add(get_size(header(p)))
}

/// The payload pointer of the previous block: `p - size(prev_footer(p))`.
#[inline]
pub unsafe fn prev_block(p: *mut u8) -> *mut u8 {
    p.sub(get_size(prev_footer(p)))
}

/// Asserts the heap-extension result the embedding handed back looks
/// sane, logging (not panicking) on anything suspicious. Cheap enough to
/// run unconditionally; the checks are advisory, not a correctness
/// dependency.
pub(crate) fn sanity_check_extend<S: HeapSource>(source: &S, returned: *mut u8, n: usize) {
    let hi = source.heap_hi();
    if (returned as usize).wrapping_add(n) != hi as usize {
        log_warn!(
            "heap_extend returned {:p} for {} bytes but heap_hi() is {:p}",
            returned,
            n,
            hi
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec;

    #[test]
    fn pack_and_unpack_roundtrip() {
        let word = pack(64, ALLOCATED);
        assert_eq!(word & SIZE_MASK, 64);
        assert_eq!(word & STATE_MASK, 1);
    }

    #[test]
    fn free_state_is_zero_bit() {
        assert_eq!(FREE.bits(), 0);
        assert_eq!(ALLOCATED.bits(), 1);
    }

    #[test]
    fn header_footer_roundtrip_through_a_buffer() {
        // A free 32-byte block at offset 16 in a backing buffer, with a
        // payload pointer computed the same way the allocator would.
        let mut buf = vec![0u8; 64];
        let base = unsafe { buf.as_mut_ptr().add(16) };
        unsafe {
            write_header_footer(base, 32, FREE);
            let p = base.add(3 * WORD);
            assert_eq!(header(p), base);
            assert_eq!(get_size(header(p)), 32);
            assert_eq!(get_state(header(p)), FREE);
            assert_eq!(footer(p), base.add(32 - WORD));
            assert_eq!(get_size(footer(p)), 32);
        }
    }

    #[test]
    fn repack_state_preserves_size() {
        let mut buf = vec![0u8; 16];
        let base = buf.as_mut_ptr();
        unsafe {
            write_header_footer(base, 16, FREE);
            repack_state(base, ALLOCATED);
            assert_eq!(get_size(base), 16);
            assert_eq!(get_state(base), ALLOCATED);
        }
    }

    #[test]
    fn repack_size_preserves_state() {
        let mut buf = vec![0u8; 16];
        let base = buf.as_mut_ptr();
        unsafe {
            write_header_footer(base, 16, ALLOCATED);
            repack_size(base, 16);
            assert_eq!(get_state(base), ALLOCATED);
        }
    }

    #[test]
    fn next_header_lands_on_adjacent_block() {
        let mut buf = vec![0u8; 64];
        let base = buf.as_mut_ptr();
        unsafe {
            write_header_footer(base, 24, ALLOCATED);
            let p = base.add(3 * WORD);
            assert_eq!(next_header(p), base.add(24));
        }
    }

    #[test]
    fn header_prev_next_triple_is_twelve_bytes() {
        // The payload address is exactly 12 bytes past the block base,
        // regardless of block size — this is the invariant that makes
        // the payload 8-aligned whenever the block size is a multiple of
        // 8, since header(p) = p - 12 and 12 % 8 == 4, so p is 8-aligned
        // iff header(p) is 4-mod-8 aligned, which every block base is.
        let mut buf = vec![0u8; 32];
        let base = buf.as_mut_ptr();
        let p = unsafe { base.add(3 * WORD) };
        assert_eq!(unsafe { header(p) }, base);
        assert_eq!((p as usize) - (base as usize), 12);
    }
}
