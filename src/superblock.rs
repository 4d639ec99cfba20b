//! Superblock loading and region-boundary arithmetic.
//!
//! Grounded on `fs/mod.rs`'s `Superblock::new` (raw block-0 read into a
//! `#[repr(C)]` struct) and its `iblock`/`bblock` helpers, generalized from
//! xv6's two regions (inode blocks, free bitmap) to bbfs's five
//! (SB/IMAP/BMAP/ITAB/DATA).

use crate::device::{BlockDevice, Cache};
use crate::error::{Error, Result};
use crate::layout::{read_record, RawSuperblock, ENTRIES_PER_BLOCK, MAGIC, PAGE_SIZE};

/// Region boundaries derived from the on-disk superblock fields, all in
/// units of blocks from the start of the device.
#[derive(Clone, Copy, Debug)]
pub struct Superblock {
    pub nr_imap: u32,
    pub nr_bmap: u32,
    pub nr_inodes: u32,
    pub nr_blocks: u32,
    imap_start: u64,
    bmap_start: u64,
    itab_start: u64,
    data_start: u64,
}

impl Superblock {
    /// Block 0 is always SB; IMAP follows immediately, then BMAP, ITAB, DATA.
    fn from_raw(raw: &RawSuperblock) -> Result<Self> {
        if raw.magic != MAGIC || raw.nr_sb != 1 {
            return Err(Error::BadMagic);
        }
        let imap_start = 1u64;
        let bmap_start = imap_start + raw.nr_imap as u64;
        let itab_start = bmap_start + raw.nr_bmap as u64;
        let data_start = itab_start + raw.nr_inodes as u64;
        Ok(Self {
            nr_imap: raw.nr_imap,
            nr_bmap: raw.nr_bmap,
            nr_inodes: raw.nr_inodes,
            nr_blocks: raw.nr_blocks,
            imap_start,
            bmap_start,
            itab_start,
            data_start,
        })
    }

    /// Read and validate the superblock from block 0 of `cache`.
    pub fn load<D: BlockDevice>(cache: &mut Cache<D>) -> Result<Self> {
        let buf = cache.read(0)?;
        let raw: RawSuperblock = read_record(buf);
        let sb = Self::from_raw(&raw)?;
        log::info!(
            "bbfs: mounted: imap={}..{} bmap={}..{} itab={}..{} data={}..{} (nr_inodes={} nr_blocks={})",
            sb.imap_start,
            sb.bmap_start,
            sb.bmap_start,
            sb.itab_start,
            sb.itab_start,
            sb.data_start,
            sb.data_start,
            sb.data_start + sb.nr_blocks as u64,
            sb.nr_inodes,
            sb.nr_blocks
        );
        Ok(sb)
    }

    /// Absolute device block holding IMAP block `i`.
    pub fn imap_block(&self, i: u32) -> u64 {
        self.imap_start + i as u64
    }

    /// Absolute device block holding BMAP block `i`.
    pub fn bmap_block(&self, i: u32) -> u64 {
        self.bmap_start + i as u64
    }

    /// Absolute device block holding ITAB entry `ino`.
    pub fn itab_block(&self, ino: u32) -> u64 {
        self.itab_start + ino as u64
    }

    /// Absolute device block for DATA-region-relative index `b`.
    pub fn data_block(&self, b: u32) -> u64 {
        self.data_start + b as u64
    }

    /// IMAP block index and slot within it for inode `ino`.
    pub fn imap_slot(ino: u32) -> (u32, usize) {
        (ino / ENTRIES_PER_BLOCK as u32, (ino % ENTRIES_PER_BLOCK as u32) as usize)
    }

    /// BMAP block index and slot within it for DATA block `b`.
    pub fn bmap_slot(b: u32) -> (u32, usize) {
        (b / ENTRIES_PER_BLOCK as u32, (b % ENTRIES_PER_BLOCK as u32) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemDevice;
    use crate::mkfs;

    #[test]
    fn load_rejects_bad_magic() {
        let device = MemDevice::new(PAGE_SIZE, 64);
        let mut cache = Cache::new(device);
        cache.write_whole(0, vec![0u8; PAGE_SIZE]);
        assert!(matches!(Superblock::load(&mut cache), Err(Error::BadMagic)));
    }

    #[test]
    fn load_matches_format_sizing() {
        // 20480 blocks * 4096 = 80 MiB, the smallest round size that clears
        // nr_imap=0 under the formula in mkfs::region_sizes.
        let device = MemDevice::new(PAGE_SIZE, 20480);
        let mut cache = Cache::new(device);
        mkfs::format(&mut cache, 0, 0).unwrap();
        let sb = Superblock::load(&mut cache).unwrap();
        assert_eq!(sb.nr_imap, 1);
        assert_eq!(sb.nr_bmap, 15);
        assert_eq!(sb.nr_inodes, 1024);
        assert_eq!(sb.nr_blocks, 15360);
    }
}
