//! Native Log Bridge
//!
//! The native library reports diagnostics through a log callback with its own
//! level numbering. [`NativeLogLevel`] mirrors that numbering and
//! [`forward_native_log`] re-emits a callback message through the `log`
//! facade under the [`NATIVE_TARGET`] target, so applications filter native
//! output the same way as everything else.

use std::fmt;

/// Log target used for messages coming from the native library.
pub const NATIVE_TARGET: &str = "gpu_warden::native";

/// Verbosity levels of the native library.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Default)]
#[repr(u32)]
pub enum NativeLogLevel {
    Off = 0,
    Error = 1,
    #[default]
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl NativeLogLevel {
    /// Decodes a raw level received from the native callback.
    #[must_use]
    pub fn from_u32(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => Self::Off,
            1 => Self::Error,
            2 => Self::Warn,
            3 => Self::Info,
            4 => Self::Debug,
            5 => Self::Trace,
            _ => return None,
        })
    }

    #[inline]
    #[must_use]
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    #[must_use]
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            Self::Off => log::LevelFilter::Off,
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }

    /// `None` for [`Off`](Self::Off).
    #[must_use]
    pub fn to_level(self) -> Option<log::Level> {
        self.to_level_filter().to_level()
    }
}

impl From<log::LevelFilter> for NativeLogLevel {
    fn from(filter: log::LevelFilter) -> Self {
        match filter {
            log::LevelFilter::Off => Self::Off,
            log::LevelFilter::Error => Self::Error,
            log::LevelFilter::Warn => Self::Warn,
            log::LevelFilter::Info => Self::Info,
            log::LevelFilter::Debug => Self::Debug,
            log::LevelFilter::Trace => Self::Trace,
        }
    }
}

impl fmt::Display for NativeLogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Off => "off",
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        })
    }
}

/// Re-emits a native log message. Intended to be called from the driver's
/// log callback with the raw level it received.
///
/// Unknown levels are logged at `warn`; `Off` drops the message.
pub fn forward_native_log(raw_level: u32, message: &str) {
    let level = match NativeLogLevel::from_u32(raw_level) {
        Some(level) => level.to_level(),
        None => {
            log::warn!(target: NATIVE_TARGET, "[level {raw_level}] {message}");
            return;
        }
    };
    if let Some(level) = level {
        log::log!(target: NATIVE_TARGET, level, "{message}");
    }
}
