//! Bitmap physical frame allocator.
//!
//! One bit per frame, set while the frame is in use. `avail_pfn` remembers
//! the lowest frame not known to be used; it only speeds up the next
//! allocation and is re-derived by a scan whenever it turns out to be stale.

use alloc::vec;
use alloc::vec::Vec;
use kernel_memory_addresses::PhysicalPage;
use kernel_vmem::FrameAlloc;
use log::{trace, warn};

const WORD_BITS: usize = u64::BITS as usize;

/// How [`BitmapFrameAlloc::allocate`] picks a frame.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FrameRequest {
    /// Any free frame.
    Auto,
    /// Exactly this frame; used for identity-mapping the kernel image at boot.
    Fixed(PhysicalPage),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum FrameAllocError {
    #[error("physical memory exhausted")]
    Exhausted,
    #[error("frame {0} is beyond installed memory")]
    OutOfRange(PhysicalPage),
    #[error("frame {0} is already in use")]
    AlreadyInUse(PhysicalPage),
    #[error("frame {0} is not in use")]
    NotInUse(PhysicalPage),
}

#[derive(Debug, Clone)]
pub struct BitmapFrameAlloc {
    size: usize,
    bitmap: Vec<u64>,
    filled: usize,
    avail_pfn: usize,
}

impl BitmapFrameAlloc {
    /// A pool of `size` frames, all free.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            size,
            bitmap: vec![0; size.div_ceil(WORD_BITS)],
            filled: 0,
            avail_pfn: 0,
        }
    }

    /// Total number of frames.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Number of frames in use.
    #[must_use]
    pub const fn filled(&self) -> usize {
        self.filled
    }

    /// Number of free frames.
    #[must_use]
    pub const fn available(&self) -> usize {
        self.size - self.filled
    }

    /// Whether `frame` is currently allocated. Frames past the end of the
    /// pool report `false`.
    #[must_use]
    pub fn is_used(&self, frame: PhysicalPage) -> bool {
        Self::pfn(frame).is_some_and(|pfn| pfn < self.size && self.bit(pfn))
    }

    /// Marks a frame used and returns it.
    ///
    /// # Errors
    /// * [`FrameAllocError::Exhausted`] if no frame is free.
    /// * [`FrameAllocError::OutOfRange`] / [`FrameAllocError::AlreadyInUse`]
    ///   for a [`FrameRequest::Fixed`] frame that cannot be handed out.
    pub fn allocate(&mut self, request: FrameRequest) -> Result<PhysicalPage, FrameAllocError> {
        let pfn = match request {
            FrameRequest::Auto => {
                if self.filled == self.size {
                    return Err(FrameAllocError::Exhausted);
                }
                if self.avail_pfn >= self.size || self.bit(self.avail_pfn) {
                    self.avail_pfn = self.scan_free(0).ok_or(FrameAllocError::Exhausted)?;
                }
                self.avail_pfn
            }
            FrameRequest::Fixed(frame) => {
                let pfn = Self::pfn(frame)
                    .filter(|&pfn| pfn < self.size)
                    .ok_or(FrameAllocError::OutOfRange(frame))?;
                if self.bit(pfn) {
                    return Err(FrameAllocError::AlreadyInUse(frame));
                }
                pfn
            }
        };

        self.set_bit(pfn, true);
        self.filled += 1;
        if pfn == self.avail_pfn {
            self.avail_pfn = self.scan_free(pfn + 1).unwrap_or(self.size);
        }

        let frame = PhysicalPage::from_number(pfn as u64);
        trace!("allocated {frame} ({}/{} used)", self.filled, self.size);
        Ok(frame)
    }

    /// Returns `frame` to the pool.
    ///
    /// # Errors
    /// [`FrameAllocError::OutOfRange`] or [`FrameAllocError::NotInUse`];
    /// the pool is unchanged.
    pub fn free(&mut self, frame: PhysicalPage) -> Result<(), FrameAllocError> {
        let pfn = Self::pfn(frame)
            .filter(|&pfn| pfn < self.size)
            .ok_or(FrameAllocError::OutOfRange(frame))?;
        if !self.bit(pfn) {
            return Err(FrameAllocError::NotInUse(frame));
        }

        self.set_bit(pfn, false);
        self.filled -= 1;
        if pfn < self.avail_pfn {
            self.avail_pfn = pfn;
        }
        trace!("freed {frame} ({}/{} used)", self.filled, self.size);
        Ok(())
    }

    fn pfn(frame: PhysicalPage) -> Option<usize> {
        usize::try_from(frame.number()).ok()
    }

    #[inline]
    fn bit(&self, pfn: usize) -> bool {
        self.bitmap[pfn / WORD_BITS] & (1 << (pfn % WORD_BITS)) != 0
    }

    #[inline]
    fn set_bit(&mut self, pfn: usize, used: bool) {
        let word = &mut self.bitmap[pfn / WORD_BITS];
        let mask = 1u64 << (pfn % WORD_BITS);
        if used {
            *word |= mask;
        } else {
            *word &= !mask;
        }
    }

    /// First free frame at or after `from`, wrapping around once.
    fn scan_free(&self, from: usize) -> Option<usize> {
        (from..self.size)
            .chain(0..from.min(self.size))
            .find(|&pfn| !self.bit(pfn))
    }
}

impl FrameAlloc for BitmapFrameAlloc {
    fn alloc_frame(&mut self) -> Option<PhysicalPage> {
        self.allocate(FrameRequest::Auto).ok()
    }

    fn free_frame(&mut self, frame: PhysicalPage) {
        if let Err(e) = self.free(frame) {
            warn!("Ignoring bad frame release: {e}");
        }
    }

    fn free_frames(&self) -> usize {
        self.available()
    }
}
