//! Persistent data log
//!
//! A single append-only text file of newline-terminated lines. The backing
//! store is abstracted by [`LogStorage`]; on hardware it is a region of
//! internal flash, in tests an in-memory buffer.
//!
//! Backends with a minimum write granule pad appends with `0x00`. Readers
//! skip those bytes, so the padding never shows up in a line.
//!
//! An append that fails part way leaves a fragment without its newline. The
//! fragment is closed with [`TORN_BYTE`] and a newline, right away or at the
//! next mount, and readers drop any line carrying that byte.
//!
//! Every session appends a `New Log` marker line, unless the file already
//! ends with one (a reboot without new data does not stack markers).

use heapless::Vec;

use crate::config::MAX_PACKET_LEN;

/// Marker line written at the start of each session
pub const SESSION_MARKER: &str = "New Log";

/// Longest line the log accepts, excluding the newline
pub const MAX_LOG_LINE: usize = MAX_PACKET_LEN;

/// Chunk size used when scanning the file
const READ_CHUNK: usize = 32;

/// Padding byte inserted by granular backends
pub const PAD_BYTE: u8 = 0x00;

/// Marks a line whose append failed part way (ASCII CAN)
pub const TORN_BYTE: u8 = 0x18;

/// Record closing a torn fragment
const TORN_SEAL: [u8; 2] = [TORN_BYTE, b'\n'];

/// Storage backend error
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageError {
    /// The file system is not mounted
    NotMounted,
    /// Not enough free space
    NoSpace,
    /// The underlying medium reported an error
    Io,
}

#[cfg(feature = "embedded")]
impl defmt::Format for StorageError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::NotMounted => defmt::write!(f, "not mounted"),
            Self::NoSpace => defmt::write!(f, "no space"),
            Self::Io => defmt::write!(f, "io"),
        }
    }
}

/// Append-only single-file store
pub trait LogStorage {
    /// Mount the store, failing if it holds no valid file system
    fn mount(&mut self) -> Result<(), StorageError>;

    /// Erase and initialise the store (leaves it unmounted)
    fn format(&mut self) -> Result<(), StorageError>;

    /// Capacity in bytes
    fn total_bytes(&self) -> usize;

    /// Bytes consumed, padding included
    fn used_bytes(&self) -> usize;

    /// Length of the log file in bytes, padding included
    fn file_len(&self) -> usize;

    /// Append `data` at the end of the file
    fn append(&mut self, data: &[u8]) -> Result<(), StorageError>;

    /// Read from `offset` into `buf`, returning the byte count (0 at the end)
    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Delete the file
    fn remove(&mut self) -> Result<(), StorageError>;
}

/// Capacity accounting of the log
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LogStats {
    /// Capacity in bytes
    pub total: usize,
    /// Bytes in use
    pub used: usize,
    /// Bytes still available
    pub free: usize,
}

/// Append-only text log with capacity accounting
pub struct DataLog<F: LogStorage> {
    storage: F,
    mounted: bool,
    stats: LogStats,
}

impl<F: LogStorage> DataLog<F> {
    /// Wrap a backend; nothing is touched until [`begin`](Self::begin)
    pub const fn new(storage: F) -> Self {
        Self {
            storage,
            mounted: false,
            stats: LogStats {
                total: 0,
                used: 0,
                free: 0,
            },
        }
    }

    /// Mount (formatting if needed) and open a session
    pub fn begin(&mut self) -> bool {
        if self.storage.mount().is_err() {
            warn!("Log mount failed, attempting to format...");
            if self.storage.format().is_err() {
                error!("Log format failed");
                return false;
            }
            info!("Log formatted successfully");
            if self.storage.mount().is_err() {
                error!("Log mount failed even after format");
                return false;
            }
        }
        self.mounted = true;
        self.seal_torn_tail();
        self.update_storage();

        if self.ends_with_marker() {
            debug!("Log already opened with a session marker");
        } else {
            self.write_line(SESSION_MARKER);
        }
        true
    }

    /// Whether the log is mounted
    #[must_use]
    pub const fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Last refreshed capacity accounting
    #[must_use]
    pub const fn stats(&self) -> LogStats {
        self.stats
    }

    /// Length of the file in bytes
    #[must_use]
    pub fn file_len(&self) -> usize {
        self.storage.file_len()
    }

    /// Borrow the backend
    pub const fn storage(&self) -> &F {
        &self.storage
    }

    /// Mutable backend
    pub fn storage_mut(&mut self) -> &mut F {
        &mut self.storage
    }

    /// Append `line` followed by a newline
    ///
    /// Refused when the log is unmounted, the line is longer than
    /// [`MAX_LOG_LINE`], or it would not fit in the free space.
    pub fn write_line(&mut self, line: &str) -> bool {
        if !self.mounted {
            warn!("Log not initialised");
            return false;
        }

        let mut record: Vec<u8, { MAX_LOG_LINE + 1 }> = Vec::new();
        if record.extend_from_slice(line.as_bytes()).is_err() || record.push(b'\n').is_err() {
            warn!("Log line of {} bytes too long, dropping", line.len());
            return false;
        }

        if record.len() >= self.stats.free {
            error!("Not enough space to write data");
            return false;
        }

        match self.storage.append(&record) {
            Ok(()) => {
                debug!("Data written successfully");
                self.refresh();
                true
            }
            Err(StorageError::NoSpace) => {
                error!("Not enough space to write data");
                false
            }
            Err(_) => {
                error!("Write failed");
                self.seal_torn_tail();
                false
            }
        }
    }

    /// Read the line starting at `*cursor` into `out` (without newline)
    ///
    /// Advances the cursor past the line. Returns `false` at the end of the
    /// file. Lines that do not fit `out` and torn lines are skipped with a
    /// warning.
    pub fn read_line<const N: usize>(&mut self, cursor: &mut usize, out: &mut Vec<u8, N>) -> bool {
        if !self.mounted {
            warn!("Log not initialised");
            return false;
        }

        let mut chunk = [0u8; READ_CHUNK];
        let mut pos = *cursor;
        let mut overflow = false;
        let mut torn = false;
        out.clear();

        loop {
            let n = match self.storage.read(pos, &mut chunk) {
                Ok(n) => n,
                Err(_) => {
                    error!("Failed to read log");
                    return false;
                }
            };
            if n == 0 {
                // Unterminated tail
                *cursor = pos;
                return !out.is_empty() && !overflow && !torn;
            }

            for (i, &byte) in chunk[..n].iter().enumerate() {
                match byte {
                    PAD_BYTE => {}
                    TORN_BYTE => torn = true,
                    b'\n' if torn => {
                        warn!("Skipping torn log line");
                        out.clear();
                        overflow = false;
                        torn = false;
                    }
                    b'\n' if overflow => {
                        warn!("Log line too long for buffer, skipping");
                        out.clear();
                        overflow = false;
                    }
                    b'\n' => {
                        *cursor = pos + i + 1;
                        return true;
                    }
                    _ => {
                        if out.push(byte).is_err() {
                            overflow = true;
                        }
                    }
                }
            }
            pos += n;
        }
    }

    /// Delete the log file
    pub fn remove_file(&mut self) -> bool {
        if !self.mounted {
            warn!("Log not initialised");
            return false;
        }

        match self.storage.remove() {
            Ok(()) => {
                info!("Log file removed");
                self.update_storage();
                true
            }
            Err(_) => {
                error!("Failed to remove log file");
                false
            }
        }
    }

    /// Refresh and report the capacity accounting
    pub fn update_storage(&mut self) {
        if !self.mounted {
            warn!("Log not initialised");
            return;
        }
        self.refresh();
        info!(
            "Log storage total {} bytes, used {} bytes, free {} bytes",
            self.stats.total,
            self.stats.used,
            self.stats.free
        );
    }

    fn refresh(&mut self) {
        let total = self.storage.total_bytes();
        let used = self.storage.used_bytes();
        self.stats = LogStats {
            total,
            used,
            free: total.saturating_sub(used),
        };
    }

    /// Close a fragment left by an interrupted append
    fn seal_torn_tail(&mut self) {
        if matches!(self.last_byte(), None | Some(b'\n')) {
            return;
        }
        warn!("Log ends in a torn line, sealing it");
        if self.storage.append(&TORN_SEAL).is_err() {
            error!("Failed to seal torn log line");
        }
        self.refresh();
    }

    /// Last byte of the file that is not padding
    fn last_byte(&mut self) -> Option<u8> {
        let mut window = [0u8; READ_CHUNK];
        let mut end = self.storage.file_len();
        while end > 0 {
            let start = end.saturating_sub(window.len());
            let n = self.storage.read(start, &mut window[..end - start]).ok()?;
            if let Some(&byte) = window[..n].iter().rev().find(|&&b| b != PAD_BYTE) {
                return Some(byte);
            }
            end = start;
        }
        None
    }

    fn ends_with_marker(&mut self) -> bool {
        let len = self.storage.file_len();
        let mut window = [0u8; 2 * READ_CHUNK];
        let start = len.saturating_sub(window.len());
        let n = match self.storage.read(start, &mut window) {
            Ok(n) => n,
            Err(_) => return false,
        };

        let mut tail: Vec<u8, { 2 * READ_CHUNK }> = Vec::new();
        for &byte in window[..n].iter().filter(|&&b| b != PAD_BYTE) {
            // Tail is no longer than the window
            let _ = tail.push(byte);
        }

        let marker = SESSION_MARKER.as_bytes();
        let Some(body) = tail.strip_suffix(b"\n") else {
            return false;
        };
        let Some(before) = body.strip_suffix(marker) else {
            return false;
        };
        // Whole line, not the end of a longer one
        (start == 0 && before.is_empty()) || before.ends_with(b"\n")
    }
}

/// In-memory backend for tests and bench builds
pub struct MemoryStorage<const N: usize> {
    data: Vec<u8, N>,
    formatted: bool,
    mounted: bool,
    fail_after: Option<usize>,
}

impl<const N: usize> MemoryStorage<N> {
    /// Formatted, empty store
    #[must_use]
    pub const fn new() -> Self {
        Self {
            data: Vec::new(),
            formatted: true,
            mounted: false,
            fail_after: None,
        }
    }

    /// Store that refuses to mount until formatted
    #[must_use]
    pub const fn unformatted() -> Self {
        Self {
            data: Vec::new(),
            formatted: false,
            mounted: false,
            fail_after: None,
        }
    }

    /// Formatted store already holding `contents` (truncated to `N`)
    #[must_use]
    pub fn with_contents(contents: &[u8]) -> Self {
        let mut store = Self::new();
        let n = contents.len().min(N);
        // Bounded by N above
        let _ = store.data.extend_from_slice(&contents[..n]);
        store
    }

    /// Make the next append fail with an I/O error after storing `bytes`
    pub fn fail_next_append_after(&mut self, bytes: usize) {
        self.fail_after = Some(bytes);
    }

    /// Raw file contents
    #[must_use]
    pub fn contents(&self) -> &[u8] {
        &self.data
    }
}

impl<const N: usize> Default for MemoryStorage<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> LogStorage for MemoryStorage<N> {
    fn mount(&mut self) -> Result<(), StorageError> {
        if !self.formatted {
            return Err(StorageError::Io);
        }
        self.mounted = true;
        Ok(())
    }

    fn format(&mut self) -> Result<(), StorageError> {
        self.data.clear();
        self.formatted = true;
        self.mounted = false;
        Ok(())
    }

    fn total_bytes(&self) -> usize {
        N
    }

    fn used_bytes(&self) -> usize {
        self.data.len()
    }

    fn file_len(&self) -> usize {
        self.data.len()
    }

    fn append(&mut self, data: &[u8]) -> Result<(), StorageError> {
        if !self.mounted {
            return Err(StorageError::NotMounted);
        }
        if let Some(stored) = self.fail_after.take() {
            let n = stored.min(data.len()).min(N - self.data.len());
            let _ = self.data.extend_from_slice(&data[..n]);
            return Err(StorageError::Io);
        }
        self.data
            .extend_from_slice(data)
            .map_err(|()| StorageError::NoSpace)
    }

    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<usize, StorageError> {
        if !self.mounted {
            return Err(StorageError::NotMounted);
        }
        let available = self.data.get(offset..).unwrap_or(&[]);
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        Ok(n)
    }

    fn remove(&mut self) -> Result<(), StorageError> {
        if !self.mounted {
            return Err(StorageError::NotMounted);
        }
        self.data.clear();
        Ok(())
    }
}
