use crate::phlib::{HISTCHAN, TTREADMAX};
use std::ops::{Deref, DerefMut};

fn boxed_array<const N: usize>() -> Box<[u32; N]> {
    // built on the heap; the arrays are too large for a test thread's stack
    match vec![0u32; N].into_boxed_slice().try_into() {
        Ok(array) => array,
        Err(_) => unreachable!("vector was allocated with length {}", N),
    }
}

/// One histogram block as filled in by `PH_GetHistogram`.
///
/// The backing storage is a fixed-length contiguous array of `HISTCHAN`
/// counts, exactly the layout the library writes into.
#[derive(Clone, PartialEq, Eq)]
pub struct Histogram {
    counts: Box<[u32; HISTCHAN]>,
}

impl Histogram {
    pub fn new() -> Self {
        Self {
            counts: boxed_array(),
        }
    }

    pub fn integral(&self) -> u64 {
        self.counts.iter().map(|&c| c as u64).sum()
    }

    pub fn clear(&mut self) {
        self.counts.fill(0);
    }

    pub fn as_mut_ptr(&mut self) -> *mut u32 {
        self.counts.as_mut_ptr()
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Histogram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Histogram")
            .field("channels", &HISTCHAN)
            .field("integral", &self.integral())
            .finish()
    }
}

impl Deref for Histogram {
    type Target = [u32; HISTCHAN];

    fn deref(&self) -> &Self::Target {
        &self.counts
    }
}

impl DerefMut for Histogram {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.counts
    }
}

/// Destination of `PH_ReadFiFo`: room for `TTREADMAX` 32-bit records.
///
/// Each read fills a prefix of the buffer; the rest keeps stale data from
/// previous reads and must not be looked at.
#[derive(Clone)]
pub struct RecordBuffer {
    records: Box<[u32; TTREADMAX]>,
}

impl RecordBuffer {
    pub fn new() -> Self {
        Self {
            records: boxed_array(),
        }
    }

    pub fn capacity(&self) -> usize {
        TTREADMAX
    }

    pub fn filled(&self, n: usize) -> &[u32] {
        &self.records[..n.min(TTREADMAX)]
    }

    pub fn as_mut_ptr(&mut self) -> *mut u32 {
        self.records.as_mut_ptr()
    }

    pub fn as_mut_slice(&mut self) -> &mut [u32] {
        &mut self.records[..]
    }
}

impl Default for RecordBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RecordBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordBuffer")
            .field("capacity", &TTREADMAX)
            .finish()
    }
}
