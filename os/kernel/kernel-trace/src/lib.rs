//! # Kernel Trace Output
//!
//! The simulated machine's debug console. Kernel crates only ever talk to the
//! [`log`] facade; this crate provides the sink those records end up in when
//! the kernel runs hosted on a development machine.
//!
//! ## Output Mechanism
//! ```text
//! Kernel Code
//!     ↓
//! log::{trace!, debug!, info!, warn!, error!}
//!     ↓
//! TraceLogger (log::Log)
//!     ↓
//! kernel_trace! macro
//!     ↓
//! host stderr
//! ```
//!
//! ## Feature System
//!
//! ### `enabled` Feature (default)
//! When enabled, [`kernel_trace!`] writes to the host's standard error. When
//! disabled every trace becomes a no-op, so a kernel built without it pays
//! nothing for its log statements beyond level filtering.
//!
//! ## Usage
//!
//! ```rust
//! use kernel_trace::TraceLogger;
//! use log::{LevelFilter, info};
//!
//! // Early in boot; a second call reports the logger as already installed.
//! let _ = TraceLogger::new(LevelFilter::Debug).init();
//! info!("Kernel subsystem initialized");
//! ```

mod logger;

pub use logger::TraceLogger;

#[cfg(feature = "enabled")]
#[doc(hidden)]
pub mod trace_fmt {
    use std::fmt;
    use std::io::Write;

    #[doc(hidden)]
    #[inline]
    pub fn trace_write(args: fmt::Arguments) {
        // Best-effort debug output; a closed stderr is not the kernel's problem.
        let _ = std::io::stderr().lock().write_fmt(args);
    }
}

#[cfg(not(feature = "enabled"))]
#[doc(hidden)]
pub mod trace_fmt {
    use std::fmt;

    #[doc(hidden)]
    #[inline]
    pub fn trace_write(_: fmt::Arguments) {}
}

/// Writes formatted text straight to the debug console, bypassing `log`.
#[macro_export]
macro_rules! kernel_trace {
    ($($arg:tt)*) => {{
        $crate::trace_fmt::trace_write(::core::format_args!($($arg)*));
    }};
}
