//! Platform back-end contract surface.
//!
//! A platform back-end implements the hooks `FileIo` declares: open/close a
//! descriptor, get/set length, positional read/write (buffer or raw
//! address), sync (data or data+metadata), best-effort directory sync,
//! best-effort preallocate, and best-effort page-cache hints. Everything
//! above this trait (the mapping table, the access protocol, preallocation
//! policy, sync throttling) is platform-independent and lives in
//! `file_io.rs`.

#[cfg(unix)]
mod posix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
pub(crate) use posix::PosixFile as PlatformFileImpl;
#[cfg(windows)]
pub(crate) use windows::WindowsFile as PlatformFileImpl;

use crate::error::Result;
use crate::options::{Advice, OpenOptions};
use std::fs::File;
use std::path::Path;

/// A single open file descriptor plus its platform-specific operations.
///
/// One `PlatformFile` backs each checked-out slot in the handle pool
/// as well as the primary handle `FileIo` uses
/// for length changes and mapping creation.
pub(crate) trait PlatformFile: Send + Sync + Sized {
    /// Opens (optionally creating) the file at `path` with `options`.
    fn open(path: &Path, options: OpenOptions) -> Result<Self>;

    /// Duplicates the descriptor for another pool slot.
    fn try_clone(&self) -> Result<Self>;

    /// The standard-library file, for use with `memmap2` and `metadata()`.
    fn file(&self) -> &File;

    /// Current length in bytes.
    fn len(&self) -> Result<u64>;

    /// Sets the length, truncating or extending with zeros.
    fn set_len(&self, len: u64) -> Result<()>;

    /// Reads at `offset` into `buf`, retrying internally on `EINTR`-style
    /// interruption. Returns the number of bytes read (0 at EOF).
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize>;

    /// Writes `buf` at `offset`, retrying internally on `EINTR`-style
    /// interruption. Returns the number of bytes written.
    fn write_at(&self, buf: &[u8], offset: u64) -> Result<usize>;

    /// Flushes dirty data (and, if `metadata` is set, file metadata) to
    /// stable storage. On platforms exposing only one "full sync" primitive,
    /// that primitive is used for both.
    fn sync(&self, metadata: bool) -> Result<()>;

    /// Best-effort directory sync of `path`'s parent, after file creation.
    fn sync_parent_dir(path: &Path) -> Result<()>;

    /// Attempts to preallocate `[offset, offset+len)`. Returns `Ok(true)` if
    /// the platform handled it, `Ok(false)` if unsupported here (triggering
    /// the non-destructive zero-fill fallback in `file_io.rs`).
    fn preallocate(&self, offset: u64, len: u64) -> Result<bool>;

    /// Best-effort page-cache hint; ignored where unsupported.
    fn advise(&self, offset: u64, len: usize, advice: Advice) -> Result<()>;
}

pub(crate) type DefaultPlatformFile = PlatformFileImpl;
