//! Block device abstraction and a minimal write-back cache.
//!
//! The real host VFS adapter owns page mapping and dirty tracking (spec §1);
//! this module only provides enough of a stand-in cache (`Cache`) that the
//! rest of the crate can be exercised and tested without a kernel. Grounded
//! on the split between `bio.rs`/`buf.rs` (raw disk reads) and the `Disk`
//! trait in `keos_binder.rs` (sector-addressed read/write through a trait
//! object).

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// A fixed-block-size random access device. Implementors need not buffer
/// anything themselves — `Cache` does that.
pub trait BlockDevice {
    /// Size of one block in bytes. Fixed for the lifetime of the device.
    fn block_size(&self) -> usize;
    /// Total number of addressable blocks.
    fn block_count(&self) -> u64;
    /// Read block `index` into `buf`. `buf.len()` must equal `block_size()`.
    fn read_block(&mut self, index: u64, buf: &mut [u8]) -> Result<()>;
    /// Write `buf` to block `index`. `buf.len()` must equal `block_size()`.
    fn write_block(&mut self, index: u64, buf: &[u8]) -> Result<()>;
}

/// An in-memory device, for tests and for `FormatOptions`-driven small
/// page-size experiments. Not part of the on-disk format contract.
pub struct MemDevice {
    block_size: usize,
    blocks: Vec<u8>,
}

impl MemDevice {
    pub fn new(block_size: usize, block_count: u64) -> Self {
        Self {
            block_size,
            blocks: vec![0u8; block_size * block_count as usize],
        }
    }
}

impl BlockDevice for MemDevice {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn block_count(&self) -> u64 {
        (self.blocks.len() / self.block_size) as u64
    }

    fn read_block(&mut self, index: u64, buf: &mut [u8]) -> Result<()> {
        let start = index as usize * self.block_size;
        if start + self.block_size > self.blocks.len() {
            return Err(Error::OutOfRange);
        }
        buf.copy_from_slice(&self.blocks[start..start + self.block_size]);
        Ok(())
    }

    fn write_block(&mut self, index: u64, buf: &[u8]) -> Result<()> {
        let start = index as usize * self.block_size;
        if start + self.block_size > self.blocks.len() {
            return Err(Error::OutOfRange);
        }
        self.blocks[start..start + self.block_size].copy_from_slice(buf);
        Ok(())
    }
}

/// A real block device backed by a file (or block special file) on the host.
pub struct FileDevice {
    file: std::fs::File,
    block_size: usize,
    block_count: u64,
}

impl FileDevice {
    pub fn open(path: &std::path::Path, block_size: usize) -> Result<Self> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            file,
            block_size,
            block_count: len / block_size as u64,
        })
    }
}

impl BlockDevice for FileDevice {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn block_count(&self) -> u64 {
        self.block_count
    }

    fn read_block(&mut self, index: u64, buf: &mut [u8]) -> Result<()> {
        use std::io::{Read, Seek, SeekFrom};
        self.file
            .seek(SeekFrom::Start(index * self.block_size as u64))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn write_block(&mut self, index: u64, buf: &[u8]) -> Result<()> {
        use std::io::{Seek, SeekFrom, Write};
        self.file
            .seek(SeekFrom::Start(index * self.block_size as u64))?;
        self.file.write_all(buf)?;
        Ok(())
    }
}

/// A trusted write-back cache over a `BlockDevice`: `read` pulls a block in
/// on first touch, `write` hands back a mutable buffer and marks it dirty,
/// `flush` pushes every dirty buffer back to the device. No eviction: the
/// whole working set for a `bbfs` session is expected to fit in memory,
/// matching the spec's "trusted cache, no transaction boundary" model.
pub struct Cache<D: BlockDevice> {
    device: D,
    block_size: usize,
    buffers: BTreeMap<u64, Vec<u8>>,
    dirty: BTreeMap<u64, bool>,
}

impl<D: BlockDevice> Cache<D> {
    pub fn new(device: D) -> Self {
        let block_size = device.block_size();
        Self {
            device,
            block_size,
            buffers: BTreeMap::new(),
            dirty: BTreeMap::new(),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn block_count(&self) -> u64 {
        self.device.block_count()
    }

    fn ensure_loaded(&mut self, block: u64) -> Result<()> {
        if !self.buffers.contains_key(&block) {
            let mut buf = vec![0u8; self.block_size];
            self.device.read_block(block, &mut buf)?;
            self.buffers.insert(block, buf);
        }
        Ok(())
    }

    pub fn read(&mut self, block: u64) -> Result<&[u8]> {
        self.ensure_loaded(block)?;
        Ok(self.buffers.get(&block).expect("just loaded"))
    }

    pub fn write(&mut self, block: u64) -> Result<&mut [u8]> {
        self.ensure_loaded(block)?;
        self.dirty.insert(block, true);
        Ok(self.buffers.get_mut(&block).expect("just loaded"))
    }

    /// Insert a whole block verbatim (used by the formatter, which never
    /// needs a prior read) and mark it dirty.
    pub fn write_whole(&mut self, block: u64, data: Vec<u8>) {
        debug_assert_eq!(data.len(), self.block_size);
        self.buffers.insert(block, data);
        self.dirty.insert(block, true);
    }

    /// Unwraps the cache, discarding any buffers (call `flush` first if
    /// they need to reach the device).
    pub fn into_device(self) -> D {
        self.device
    }

    pub fn flush(&mut self) -> Result<()> {
        for (&block, dirty) in self.dirty.iter_mut() {
            if *dirty {
                self.device
                    .write_block(block, &self.buffers[&block])?;
                *dirty = false;
            }
        }
        Ok(())
    }
}
