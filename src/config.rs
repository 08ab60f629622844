//! Warden Configuration
//!
//! ```rust,ignore
//! use gpu_warden::{NativeLogLevel, Warden, WardenConfig};
//!
//! let config = WardenConfig {
//!     native_log_level: NativeLogLevel::Info,
//!     warn_on_leaks: false,
//!     ..Default::default()
//! };
//! let warden = Warden::new(driver, config);
//! ```

use crate::logging::NativeLogLevel;

/// Behaviour switches of a [`Warden`](crate::Warden).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WardenConfig {
    /// Verbosity pushed to the driver at construction.
    pub native_log_level: NativeLogLevel,

    /// Release a submitted command encoder as soon as its last submission
    /// retires. When off, encoders stay registered until destroyed.
    pub release_retired_encoders: bool,

    /// Reject map offsets not aligned to
    /// [`MAP_ALIGNMENT`](crate::MAP_ALIGNMENT) and copy or write ranges not
    /// aligned to [`COPY_BUFFER_ALIGNMENT`](crate::COPY_BUFFER_ALIGNMENT).
    pub enforce_alignment: bool,

    /// Log every resource still registered when the warden is dropped.
    pub warn_on_leaks: bool,
}

impl Default for WardenConfig {
    #[inline]
    fn default() -> Self {
        Self {
            native_log_level: NativeLogLevel::Warn,
            release_retired_encoders: true,
            enforce_alignment: true,
            warn_on_leaks: true,
        }
    }
}
