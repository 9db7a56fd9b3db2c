//! Open options and length (preallocation) options.

use bitflags::bitflags;

bitflags! {
    /// Boolean knobs governing how a [`crate::file_io::FileIo`] is opened.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenOptions: u32 {
        /// Read-only open; writes fail.
        const READ_ONLY = 0x001;
        /// Create the file if missing.
        const CREATE = 0x002;
        /// Establish the mapping table immediately after open.
        const MAPPED = 0x004;
        /// Writes are durable synchronously (descriptor-level flag).
        const SYNC_IO = 0x008;
        /// Bypass the OS page cache where supported; buffers must be page-aligned.
        const DIRECT_IO = 0x010;
        /// Backed by shared memory / tmpfs; contents may vanish on crash.
        const NON_DURABLE = 0x020;
        /// Hint: expect non-sequential access.
        const RANDOM_ACCESS = 0x040;
        /// Hint: prefetch when mapping.
        const READAHEAD = 0x080;
        /// On close, tell the OS it may drop cache pages for this file.
        const CLOSE_DONTNEED = 0x100;
    }
}

impl Default for OpenOptions {
    fn default() -> Self {
        OpenOptions::CREATE
    }
}

/// Preallocation strategy for length-growing operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreallocateMode {
    /// Do not attempt preallocation.
    #[default]
    Never,
    /// Only if cheap (a fast extent API is available).
    Optional,
    /// Always; fall back to non-destructive zero-fill if needed.
    Always,
}

/// Page-cache hints passed to the platform back-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advice {
    /// Pages will be needed soon; prefetch them.
    WillNeed,
    /// Expect non-sequential access.
    Random,
    /// Pages won't be needed soon; the OS may drop them.
    DontNeed,
}
