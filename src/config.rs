//! The ambient config surface for [`crate::Connection::open`]: where the
//! database lives and which platform-specific pragmas to apply. There is no
//! file- or env-based configuration layer — the spec's scope has none, so
//! the embedder constructs `OpenOptions` directly, the same way a plain
//! connection constructor takes its arguments directly rather than reaching
//! for a config crate.

use std::path::PathBuf;

use crate::logging::Logger;

/// Where the database lives on disk, or in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionPath {
    Memory,
    File(PathBuf),
}

/// Platform-specific tweaks applied at open time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlatformHints {
    /// On Android-flavored hosts, `PRAGMA temp_store = memory` is also set —
    /// Android devices are more likely to have slow or absent on-disk temp
    /// storage than desktop hosts.
    pub android: bool,
}

pub struct OpenOptions {
    pub(crate) path: ConnectionPath,
    pub(crate) platform: PlatformHints,
    pub(crate) logger: Box<dyn Logger>,
}

impl OpenOptions {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: ConnectionPath::File(path.into()),
            platform: PlatformHints::default(),
            logger: Box::new(crate::logging::NullLogger),
        }
    }

    pub fn memory() -> Self {
        Self {
            path: ConnectionPath::Memory,
            platform: PlatformHints::default(),
            logger: Box::new(crate::logging::NullLogger),
        }
    }

    pub fn android(mut self, android: bool) -> Self {
        self.platform.android = android;
        self
    }

    pub fn logger(mut self, logger: impl Logger + 'static) -> Self {
        self.logger = Box::new(logger);
        self
    }
}
