// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Placement: locating a free block big enough for a request, or growing
//! the heap to manufacture one.

use crate::block::{self, FREE, WORD};
use crate::log_trace;
use crate::seglist::{bucket_of, MAX_SEG};
use crate::{Heap, HeapSource};

impl<S: HeapSource> Heap<S> {
    /// First-fit search across segregated lists: starts in the bucket
    /// `size` maps to, then widens to larger buckets, then finally checks
    /// the oversized catch-all (bucket 0), which can hold a block big
    /// enough regardless of where the search started.
    pub(crate) fn find_block(&self, size: usize) -> Option<*mut u8> {
        let start = bucket_of(size);

        if start != 0 {
            for bucket in start..MAX_SEG {
                if let Some(b) = self.scan_bucket(bucket, size) {
                    return Some(b);
                }
            }
        }

        self.scan_bucket(0, size)
    }

    fn scan_bucket(&self, bucket: usize, size: usize) -> Option<*mut u8> {
        let mut cur = self.lists().first(bucket);
        while !cur.is_null() {
            if unsafe { block::get_size(block::header(cur)) } >= size {
                return Some(cur);
            }
            cur = unsafe { self.lists().next(self.base(), cur) };
        }
        None
    }

    /// Extends the heap by exactly `size` bytes and turns the extension
    /// into a new block, reusing the old zero-sized terminator's header
    /// word as the new block's header and writing a fresh terminator past
    /// the end. Coalesces with the previous last block if it was free.
    pub(crate) fn new_block(&mut self, size: usize) -> Option<*mut u8> {
        let old_hi = self.source().heap_hi();
        let terminator = unsafe { old_hi.sub(WORD) };

        let extended = self.source_mut().heap_extend(size).ok()?;
        block::sanity_check_extend(self.source(), extended, size);

        unsafe {
            block::write_header_footer(terminator, size, FREE);
            let new_terminator = terminator.add(size);
            block::write_header(new_terminator, 0, block::ALLOCATED);
        }

        let b = unsafe { terminator.add(3 * WORD) };
        log_trace!("new_block({}) -> extended at {:p}", size, b);
        Some(self.coalesce(b))
    }
}

#[cfg(test)]
mod tests {
    use crate::block::{self, ALLOCATED, FREE};
    use crate::seglist::Lists;
    use crate::tests_support::FixedHeapSource;
    use crate::Heap;

    fn heap_over(mut source: FixedHeapSource) -> (Heap<FixedHeapSource>, *mut u8) {
        let base = source.base_ptr();
        (
            Heap {
                source,
                base,
                lists: Lists::new(),
            },
            base,
        )
    }

    #[test]
    fn find_block_widens_to_a_larger_bucket_when_its_own_is_empty() {
        let mut buf = std::vec![0u8; 256];
        let raw = buf.as_mut_ptr();
        unsafe {
            block::write_header_footer(raw, 16, ALLOCATED); // left sentinel
            block::write_header_footer(raw.add(16), 64, FREE); // only a 64-byte block around
            block::write_header(raw.add(80), 0, ALLOCATED); // terminator
        }
        let source = FixedHeapSource::preinitialized(buf, 80);
        let (mut heap, base) = heap_over(source);

        unsafe {
            let big = base.add(16 + 3 * block::WORD);
            heap.lists_mut().add(base, big);

            // a request for 16 bytes has no block in its own (small)
            // bucket, but should still find the 64-byte block.
            let found = heap.find_block(16);
            assert_eq!(found, Some(big));
        }
    }

    #[test]
    fn find_block_returns_none_when_nothing_fits() {
        let source = FixedHeapSource::new(256);
        let (heap, _base) = heap_over(source);
        assert_eq!(heap.find_block(32), None);
    }

    #[test]
    fn new_block_reuses_terminator_and_coalesces_left() {
        // left sentinel(16) | last(24, FREE) | terminator
        let mut buf = std::vec![0u8; 256];
        let raw = buf.as_mut_ptr();
        unsafe {
            block::write_header_footer(raw, 16, ALLOCATED);
            block::write_header_footer(raw.add(16), 24, FREE);
            block::write_header(raw.add(40), 0, ALLOCATED);
        }
        let source = FixedHeapSource::preinitialized(buf, 44);
        let (mut heap, base) = heap_over(source);

        unsafe {
            let last = base.add(16 + 3 * block::WORD);
            heap.lists_mut().add(base, last);

            let b = heap.new_block(32).expect("fixed source has room to grow");

            // merged with the preceding free block: 24 + 32 = 56 bytes
            assert_eq!(b, last);
            assert_eq!(block::get_size(block::header(b)), 56);
            assert_eq!(block::get_state(block::header(b)), FREE);
        }
    }

    #[test]
    fn new_block_fails_when_the_source_cannot_grow() {
        let source = FixedHeapSource::preinitialized(std::vec![0u8; 8], 8);
        let (mut heap, _base) = heap_over(source);
        assert!(heap.new_block(32).is_none());
    }
}
