// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! A fixed-buffer `HeapSource` for integration tests: grows monotonically
//! into a pre-allocated `Vec<u8>` until it runs out, mirroring how a
//! `sbrk`-backed embedding would eventually hit its arena limit.

use segheap::HeapExhausted;
use segheap::HeapSource;

pub struct FixedHeapSource {
    buf: Vec<u8>,
    used: usize,
}

impl FixedHeapSource {
    pub fn new(capacity: usize) -> Self {
        FixedHeapSource {
            buf: vec![0u8; capacity],
            used: 0,
        }
    }
}

impl HeapSource for FixedHeapSource {
    fn heap_extend(&mut self, n: usize) -> Result<*mut u8, HeapExhausted> {
        if self.used + n > self.buf.len() {
            return Err(HeapExhausted);
        }
        let ptr = unsafe { self.buf.as_mut_ptr().add(self.used) };
        self.used += n;
        Ok(ptr)
    }

    fn heap_lo(&self) -> *mut u8 {
        self.buf.as_ptr() as *mut u8
    }

    fn heap_hi(&self) -> *mut u8 {
        unsafe { self.buf.as_ptr().add(self.used) as *mut u8 }
    }
}
