//! Flash-backed log store
//!
//! Keeps the data log in a reserved region at the top of internal flash.
//! The region starts with a header granule identifying it as formatted; the
//! file follows and grows towards the end of the region.
//!
//! Flash is programmed in 8-byte double words, so appends are padded with
//! `0x00` up to the next granule. The end of the file is the first granule
//! that still reads erased (`0xFF`), found by scanning at mount. A torn
//! append is closed by the log layer above once the store is writable again.

use embassy_stm32::flash::{Blocking, Flash};

use crate::config::log_region;
use crate::storage::{LogStorage, StorageError, PAD_BYTE};

/// Programming granule of the STM32G4 flash
const WRITE_SIZE: usize = 8;

/// Marker written into the header granule
const HEADER: [u8; WRITE_SIZE] = *b"LORALOG1";

/// First byte of file data
const DATA_START: u32 = log_region::START + WRITE_SIZE as u32;

const ERASED: u8 = 0xFF;

/// Log store over the internal flash log region
pub struct FlashLogStorage<'d> {
    flash: Flash<'d, Blocking>,
    end: u32,
    mounted: bool,
}

impl<'d> FlashLogStorage<'d> {
    /// Wrap the flash peripheral
    pub fn new(flash: Flash<'d, Blocking>) -> Self {
        Self {
            flash,
            end: DATA_START,
            mounted: false,
        }
    }

    fn erase_region(&mut self) -> Result<(), StorageError> {
        self.flash
            .blocking_erase(log_region::START, log_region::END)
            .map_err(|_| StorageError::Io)?;
        self.flash
            .blocking_write(log_region::START, &HEADER)
            .map_err(|_| StorageError::Io)?;
        self.end = DATA_START;
        Ok(())
    }

    /// Step over the granule at `end` unless it is still erased
    ///
    /// A failed program may leave the granule partly written, and flash
    /// cannot be programmed twice without an erase.
    fn skip_if_programmed(&mut self) {
        let mut granule = [0u8; WRITE_SIZE];
        let erased = self.flash.blocking_read(self.end, &mut granule).is_ok()
            && granule.iter().all(|&b| b == ERASED);
        if !erased {
            self.end += WRITE_SIZE as u32;
        }
    }

    fn find_end(&mut self) -> Result<u32, StorageError> {
        let mut granule = [0u8; WRITE_SIZE];
        let mut offset = DATA_START;
        while offset < log_region::END {
            self.flash
                .blocking_read(offset, &mut granule)
                .map_err(|_| StorageError::Io)?;
            if granule.iter().all(|&b| b == ERASED) {
                return Ok(offset);
            }
            offset += WRITE_SIZE as u32;
        }
        Ok(log_region::END)
    }
}

impl LogStorage for FlashLogStorage<'_> {
    fn mount(&mut self) -> Result<(), StorageError> {
        let mut header = [0u8; WRITE_SIZE];
        self.flash
            .blocking_read(log_region::START, &mut header)
            .map_err(|_| StorageError::Io)?;
        if header != HEADER {
            return Err(StorageError::Io);
        }
        self.end = self.find_end()?;
        self.mounted = true;
        Ok(())
    }

    fn format(&mut self) -> Result<(), StorageError> {
        self.mounted = false;
        self.erase_region()
    }

    fn total_bytes(&self) -> usize {
        (log_region::END - DATA_START) as usize
    }

    fn used_bytes(&self) -> usize {
        self.file_len()
    }

    fn file_len(&self) -> usize {
        (self.end - DATA_START) as usize
    }

    fn append(&mut self, data: &[u8]) -> Result<(), StorageError> {
        if !self.mounted {
            return Err(StorageError::NotMounted);
        }
        let padded = data.len().div_ceil(WRITE_SIZE) * WRITE_SIZE;
        if self.end as usize + padded > log_region::END as usize {
            return Err(StorageError::NoSpace);
        }

        for chunk in data.chunks(WRITE_SIZE) {
            let mut granule = [PAD_BYTE; WRITE_SIZE];
            granule[..chunk.len()].copy_from_slice(chunk);
            if self.flash.blocking_write(self.end, &granule).is_err() {
                self.skip_if_programmed();
                return Err(StorageError::Io);
            }
            self.end += WRITE_SIZE as u32;
        }
        Ok(())
    }

    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<usize, StorageError> {
        if !self.mounted {
            return Err(StorageError::NotMounted);
        }
        let available = self.file_len().saturating_sub(offset);
        let n = available.min(buf.len());
        if n == 0 {
            return Ok(0);
        }
        let start = u32::try_from(offset).map_err(|_| StorageError::Io)? + DATA_START;
        self.flash
            .blocking_read(start, &mut buf[..n])
            .map_err(|_| StorageError::Io)?;
        Ok(n)
    }

    fn remove(&mut self) -> Result<(), StorageError> {
        if !self.mounted {
            return Err(StorageError::NotMounted);
        }
        self.erase_region()
    }
}
