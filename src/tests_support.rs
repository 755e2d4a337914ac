// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! A `HeapSource` test double backed by a host `Vec<u8>`. Shared by every
//! module's unit tests; not part of the public API.

use crate::{HeapExhausted, HeapSource};
use std::vec::Vec;

pub(crate) struct FixedHeapSource {
    buf: Vec<u8>,
    used: usize,
}

impl FixedHeapSource {
    /// A fresh, empty backing buffer of `capacity` bytes.
    pub(crate) fn new(capacity: usize) -> Self {
        FixedHeapSource {
            buf: std::vec![0u8; capacity],
            used: 0,
        }
    }

    /// Wraps an already-laid-out buffer, treating its first `used` bytes
    /// as already handed out by `heap_extend`. Lets tests hand-build block
    /// layouts without going through `Heap::init`.
    pub(crate) fn preinitialized(buf: Vec<u8>, used: usize) -> Self {
        FixedHeapSource { buf, used }
    }

    pub(crate) fn base_ptr(&mut self) -> *mut u8 {
        self.buf.as_mut_ptr()
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
