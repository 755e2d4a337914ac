// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Debug-only heap walker: aggregate statistics, a bucket-occupancy dump,
//! and a full invariant check (I1-I7). None of this runs on the
//! allocation hot path; it exists for tests and troubleshooting.

use crate::block::{self, FREE, OVERHEAD};
use crate::log_debug;
use crate::seglist::{bucket_of, MAX_SEG};
use crate::{Heap, HeapSource};

/// Point-in-time summary of heap occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeapStats {
    /// Total bytes under management, sentinels and terminator excluded.
    pub managed_bytes: usize,
    /// Bytes currently sitting on a free list.
    pub free_bytes: usize,
    /// Number of live blocks (allocated or free), sentinels excluded.
    pub block_count: usize,
    /// Number of free blocks.
    pub free_block_count: usize,
}

/// A violated heap invariant, as found by [`check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invariant {
    /// A block's header and footer words disagree.
    HeaderFooterMismatch { header: *const u8 },
    /// A block's size isn't a multiple of 8, or is smaller than the
    /// minimum block size.
    BadBlockSize { header: *const u8, size: usize },
    /// Two adjacent blocks are both FREE; they should have been
    /// coalesced.
    UncoalescedNeighbors { left: *const u8, right: *const u8 },
    /// Walking the heap via `next_header` did not land exactly on the
    /// terminator: the blocks don't tile the heap.
    HeapNotTiled { stopped_at: *const u8 },
    /// A free block lives in a bucket its size doesn't map to.
    WrongBucket { block: *const u8, bucket: usize, expected: usize },
    /// A free-list's forward and backward links disagree about
    /// adjacency.
    LinkMismatch { block: *const u8 },
    /// The number of FREE blocks found walking the heap doesn't match the
    /// number of blocks reachable across every segregated list.
    FreeSetMismatch { heap_walk_free: usize, list_total: usize },
}

// SAFETY: `Invariant` only carries addresses for diagnostic display; it
// never dereferences them. No thread can mutate the heap while a `&Heap`
// exists to run the checker over, so sending the result around is sound.
unsafe impl Send for Invariant {}

/// Walks every block via `next_header`, summing totals. Does not validate
/// anything; see [`check`] for that.
pub(crate) fn stats<S: HeapSource>(heap: &Heap<S>) -> HeapStats {
    let mut out = HeapStats::default();
    unsafe {
        let mut cur = heap.source().heap_lo().add(OVERHEAD);
        let hi = heap.source().heap_hi();
        // The walk starts on the left sentinel itself; it's real enough to
        // probe during coalescing but isn't managed space handed to a
        // client, so the first block seen here is never counted.
        let mut is_sentinel = true;

        while (cur as usize) < hi as usize {
            let header = block::header(cur);
            let size = block::get_size(header);
            if size == 0 {
                break;
            }

            if !is_sentinel {
                out.managed_bytes += size;
                out.block_count += 1;
                if block::get_state(header) == FREE {
                    out.free_bytes += size;
                    out.free_block_count += 1;
                }
            }
            is_sentinel = false;

            cur = block::next_block(cur);
        }
    }
    out
}

/// Logs the occupancy of every non-empty bucket at `debug` level.
pub(crate) fn dump<S: HeapSource>(heap: &Heap<S>) {
    for bucket in 0..MAX_SEG {
        let mut count = 0usize;
        let mut cur = heap.lists().first(bucket);
        while !cur.is_null() {
            count += 1;
            cur = unsafe { heap.lists().next(heap.base(), cur) };
        }
        if count > 0 {
            log_debug!("bucket {}: {} free block(s)", bucket, count);
        }
    }
}

/// Verifies, in order:
///
/// - every block's header and footer agree (I1)
/// - every block size is a multiple of 8 and at least `OVERHEAD` (I2)
/// - no two adjacent blocks are both FREE (I3)
/// - the blocks exactly tile the heap from the left sentinel to the
///   terminator, with no gaps or overlaps (I4)
/// - every free block sits in the bucket its size maps to (I5)
/// - every free list's links are mutually consistent (I6, I7)
pub(crate) fn check<S: HeapSource>(heap: &Heap<S>) -> Result<(), Invariant> {
    let mut heap_walk_free = 0usize;

    unsafe {
        let mut cur = heap.source().heap_lo().add(OVERHEAD);
        let hi = heap.source().heap_hi();
        let mut prev_state: Option<(block::State, *const u8)> = None;

        loop {
            let header = block::header(cur);
            if header as usize >= hi as usize {
                return Err(Invariant::HeapNotTiled { stopped_at: header });
            }

            let size = block::get_size(header);
            if size == 0 {
                if header as usize + block::WORD != hi as usize {
                    return Err(Invariant::HeapNotTiled { stopped_at: header });
                }
                break;
            }

            if size % 8 != 0 || size < OVERHEAD {
                return Err(Invariant::BadBlockSize { header, size });
            }

            let footer = block::footer(cur);
            if block::get_size(footer) != size || block::get_state(footer) != block::get_state(header) {
                return Err(Invariant::HeaderFooterMismatch { header });
            }

            let state = block::get_state(header);
            if state == FREE {
                heap_walk_free += 1;
            }
            if let Some((FREE, left)) = prev_state {
                if state == FREE {
                    return Err(Invariant::UncoalescedNeighbors { left, right: header });
                }
            }
            prev_state = Some((state, header));

            cur = block::next_block(cur);
        }
    }

    let mut list_total = 0usize;

    for bucket in 0..MAX_SEG {
        let mut cur = heap.lists().first(bucket);
        let mut prev: *mut u8 = core::ptr::null_mut();

        while !cur.is_null() {
            let size = unsafe { block::get_size(block::header(cur)) };
            let expected = bucket_of(size);
            if expected != bucket {
                return Err(Invariant::WrongBucket { block: cur, bucket, expected });
            }

            let observed_prev = unsafe { links_prev(heap, cur) };
            if observed_prev != prev {
                return Err(Invariant::LinkMismatch { block: cur });
            }

            list_total += 1;
            prev = cur;
            cur = unsafe { heap.lists().next(heap.base(), cur) };
        }

        if prev != heap.lists().last(bucket) {
            return Err(Invariant::LinkMismatch {
                block: heap.lists().last(bucket),
            });
        }
    }

    if heap_walk_free != list_total {
        return Err(Invariant::FreeSetMismatch { heap_walk_free, list_total });
    }

    Ok(())
}

/// Reads `b`'s prev-free link directly; `Lists` doesn't expose this (only
/// `next`, which is enough for normal traversal), so the checker reaches
/// past it to cross-validate both directions.
unsafe fn links_prev<S: HeapSource>(heap: &Heap<S>, b: *mut u8) -> *mut u8 {
    let addr = block::header(b).add(crate::block::PREV_LINK_OFFSET) as *const u32;
    let offset = core::ptr::read_unaligned(addr);
    if offset == 0 {
        core::ptr::null_mut()
    } else {
        heap.base().add(offset as usize).add(3 * block::WORD)
    }
}
