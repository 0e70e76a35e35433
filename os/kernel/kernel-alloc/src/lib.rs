//! # Kernel Memory Allocation and Virtual Memory Management
//!
//! Physical frame allocation and the address-space manager built on it.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                Virtual Memory Manager (VMM)         │
//! │    • User heap (break) and on-demand stack growth   │
//! │    • Kernel heap break                              │
//! │    • Fork copies through the scratch page           │
//! │    • Address space and kernel stack teardown        │
//! └─────────────────┬───────────────────────────────────┘
//!                   │ kernel_vmem::FrameAlloc
//! ┌─────────────────▼───────────────────────────────────┐
//! │           Physical Frame Allocator                  │
//! │    • One bit per frame                              │
//! │    • Lowest-free hint, rescanned when stale         │
//! │    • Fixed-frame requests for the kernel image      │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ownership
//!
//! A frame belongs to exactly one page table entry (user, kernel stack or
//! kernel) at a time. Moving a page between owners is always free followed by
//! allocate; nothing here ever maps one frame twice, the scratch page
//! excepted for the duration of a single copy.
//!
//! ## Concurrency
//!
//! None. The kernel runs one trap at a time to completion, so the pool and the
//! tables are plain owned values handed to [`vmm::Vmm`] by mutable reference.
//!
//! ## Basic Physical Allocation
//! ```rust
//! use kernel_alloc::frame_alloc::{BitmapFrameAlloc, FrameRequest};
//!
//! let mut frames = BitmapFrameAlloc::new(16);
//! let frame = frames.allocate(FrameRequest::Auto).unwrap();
//! assert_eq!(frames.filled(), 1);
//! frames.free(frame).unwrap();
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

pub mod frame_alloc;
pub mod vmm;
