use std::{
    fmt,
    fs::File,
    io::{Error as IoError, ErrorKind},
    os::unix::fs::FileExt,
};

use zerocopy::FromBytes;

use crate::ProbeError;

/// Largest single read a [`LogicalSource`] will service.
pub const MAX_READ_SIZE: u64 = 16 << 20;

/// Positional, read-only access to a storage device.
///
/// Implementations must either fill `buf` completely or fail.
pub trait BlockDevice {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> Result<(), IoError>;
}

impl BlockDevice for File {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> Result<(), IoError> {
        return FileExt::read_exact_at(self, buf, offset);
    }
}

impl BlockDevice for [u8] {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> Result<(), IoError> {
        let start = usize::try_from(offset).map_err(|_| ErrorKind::UnexpectedEof)?;
        let end = start
            .checked_add(buf.len())
            .ok_or(ErrorKind::UnexpectedEof)?;

        let data = self.get(start..end).ok_or(ErrorKind::UnexpectedEof)?;
        buf.copy_from_slice(data);

        return Ok(());
    }
}

impl BlockDevice for Vec<u8> {
    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> Result<(), IoError> {
        return self.as_slice().read_exact_at(buf, offset);
    }
}

/// A bounded, block-addressed window over a [`BlockDevice`].
///
/// Sources are cheap copyable views. Deriving a child with
/// [`slice`](LogicalSource::slice) never widens the window, so a detector
/// handed a partition can only ever read inside that partition.
#[derive(Clone, Copy)]
pub struct LogicalSource<'a> {
    device: &'a dyn BlockDevice,
    block_size: u64,
    offset: u64,
    len: Option<u64>,
}

impl fmt::Debug for LogicalSource<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogicalSource")
            .field("block_size", &self.block_size)
            .field("offset", &self.offset)
            .field("len", &self.len)
            .finish()
    }
}

impl<'a> LogicalSource<'a> {
    /// Create a source covering the start of `device`, using 512 byte blocks.
    ///
    /// `len` of `None` leaves the window unbounded, reads then run until the
    /// device itself reports end of file.
    pub fn new(device: &'a dyn BlockDevice, len: Option<u64>) -> Self {
        Self {
            device,
            block_size: 512,
            offset: 0,
            len,
        }
    }

    /// Same window, different block size. A zero size is ignored.
    pub fn with_block_size(self, block_size: u64) -> Self {
        if block_size == 0 {
            return self;
        }

        return Self { block_size, ..self };
    }

    /// Derive a child window starting `rel_offset` bytes into this one.
    ///
    /// The child is clamped to the parent's bounds. A child that would start
    /// past the parent's end is empty and every read from it fails.
    pub fn slice(&self, rel_offset: u64, len: u64) -> Self {
        let len = match self.len {
            Some(parent) => len.min(parent.saturating_sub(rel_offset)),
            None => len,
        };

        let (offset, len) = match self.offset.checked_add(rel_offset) {
            Some(offset) => (offset, len),
            None => (u64::MAX, 0),
        };

        return Self {
            device: self.device,
            block_size: self.block_size,
            offset,
            len: Some(len),
        };
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    /// Absolute byte offset of this window within the device.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn len(&self) -> Option<u64> {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == Some(0)
    }

    /// Number of whole blocks in the window, if bounded.
    pub fn blocks(&self) -> Option<u64> {
        return self.len.map(|len| len / self.block_size);
    }

    /// Read `count` whole blocks starting at `start`.
    ///
    /// Either returns exactly `count * block_size` bytes or fails with
    /// [`ProbeError::ShortRead`]. Requests past the end of a bounded window
    /// fail without touching the device.
    pub fn read_blocks(&self, start: u64, count: u64) -> Result<Vec<u8>, ProbeError> {
        let bs = self.block_size;
        let short = ProbeError::ShortRead {
            offset: self.offset.saturating_add(start.saturating_mul(bs)),
            length: count.saturating_mul(bs),
        };

        let rel_offset = start.checked_mul(bs).ok_or(short.clone())?;
        let length = count.checked_mul(bs).ok_or(short.clone())?;
        let end = rel_offset.checked_add(length).ok_or(short.clone())?;

        if let Some(len) = self.len {
            if end > len {
                return Err(short);
            }
        }

        if length > MAX_READ_SIZE {
            log::warn!("read_blocks: refusing {length} byte read at block {start}");
            return Err(short);
        }

        let offset = self.offset.checked_add(rel_offset).ok_or(short.clone())?;
        let mut buffer = vec![0u8; length as usize];

        if let Err(e) = self.device.read_exact_at(&mut buffer, offset) {
            log::trace!("read_blocks: {length} bytes at {offset} failed: {e}");
            return Err(short);
        }

        log::trace!("read_blocks: {length} bytes at {offset}");

        return Ok(buffer);
    }

    pub fn read_block(&self, block: u64) -> Result<Vec<u8>, ProbeError> {
        return self.read_blocks(block, 1);
    }

    /// Read `block` and map its leading bytes onto `T`.
    pub(crate) fn map_from_block<T: FromBytes>(&self, block: u64) -> Result<T, ProbeError> {
        let buffer = self.read_block(block)?;

        let (data, _) = T::read_from_prefix(&buffer).map_err(|_| ProbeError::ShortRead {
            offset: self.offset.saturating_add(block.saturating_mul(self.block_size)),
            length: size_of::<T>() as u64,
        })?;

        return Ok(data);
    }
}
