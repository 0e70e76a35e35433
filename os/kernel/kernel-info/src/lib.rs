//! # Kernel Configuration and Boot Interface
//!
//! This crate is the single source of truth for the simulated machine's
//! layout and for the parameters handed to the kernel at boot. Every other
//! kernel crate sizes its tables and buffers from the constants defined here,
//! which keeps page tables, the kernel stack window and the terminal buffers
//! consistent with each other.
//!
//! ## Architecture
//!
//! ### Memory Layout ([`memory`])
//! * **Regions**: region 0 (kernel, shared) and region 1 (user, per process)
//! * **Kernel stack window**: the top pages of region 0, remapped on every
//!   context switch
//! * **Scratch page**: one page below the window used to stage copies
//! * **Device limits**: terminal count, line length, pipe capacity
//!
//! ### Boot Information ([`boot`])
//! * **[`BootConfig`](boot::BootConfig)**: physical memory size, kernel image
//!   bounds, init program and arguments, idle entry point, log level
//!
//! ## Compile-Time Checks
//!
//! The layout constants are guarded by a `const` assertion block so an
//! inconsistent layout (for example a scratch page overlapping the kernel
//! stack window) fails the build rather than corrupting memory at runtime.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

extern crate alloc;

pub mod boot;
pub mod memory;
