//! In-core inode and the logical-to-physical block map.
//!
//! Grounded on `fs/ufs/inode.rs` (`Dinode` embedded by value inside the
//! in-core inode, `iget`/writeback copying named fields rather than aliasing
//! a pointer — see §9's "back-reference" design note) and `fs/mod.rs`'s
//! block-map arithmetic (`Superblock::iblock`), generalized from xv6's
//! direct+indirect scheme to bbfs's power-of-two levels array.

use zerocopy::AsBytes;

use crate::balloc;
use crate::device::{BlockDevice, Cache};
use crate::error::Result;
use crate::layout::{read_record, RawInode, MAX_LEVEL};
use crate::superblock::Superblock;

/// The on-disk inode copied in by value, plus its number. Host VFS
/// book-keeping (dentry links, open count, dirty flag) belongs to the
/// embedder (§3 "In-core inode"); this struct is the part the core owns.
#[derive(Clone, Copy)]
pub struct Inode {
    pub ino: u32,
    pub raw: RawInode,
}

impl Inode {
    /// Reads ITAB[ino] into a fresh in-core copy. The embedder is
    /// responsible for any inode cache above this (§4.4: "if already cached
    /// by the host, return it").
    pub fn iget<D: BlockDevice>(sb: &Superblock, cache: &mut Cache<D>, ino: u32) -> Result<Self> {
        let buf = cache.read(sb.itab_block(ino))?;
        let raw: RawInode = read_record(buf);
        Ok(Self { ino, raw })
    }

    /// Writes the in-core copy back to ITAB[ino], marking the buffer dirty.
    pub fn iwrite<D: BlockDevice>(&self, sb: &Superblock, cache: &mut Cache<D>) -> Result<()> {
        let buf = cache.write(sb.itab_block(self.ino))?;
        buf.copy_from_slice(self.raw.as_bytes());
        Ok(())
    }

    /// Finds the run level `L` and in-run offset for logical block `b`,
    /// per §3: the unique `L` with `2^L - 1 <= b < 2^(L+1) - 1`.
    pub fn level_for(b: u64) -> (u32, u64) {
        let n = b + 1;
        let l = (u64::BITS - 1) - n.leading_zeros();
        let offset = b - ((1u64 << l) - 1);
        (l, offset)
    }

    /// Maps logical block `b` to a DATA-relative physical index without
    /// growing the inode. `None` means unmapped (§4.4: the adapter returns
    /// zeroed pages for reads past `l_num`).
    pub fn map_block(&self, b: u64) -> Option<u32> {
        let (l, offset) = Self::level_for(b);
        if l < self.raw.levels().l_num {
            Some(self.raw.levels().levels[l as usize] + offset as u32)
        } else {
            None
        }
    }

    /// Maps logical block `b`, allocating runs at `l_num, l_num+1, ...`
    /// until `b` is covered if `create` is set. Growth is monotone: existing
    /// runs are never touched (§4.4).
    pub fn get_block<D: BlockDevice>(
        &mut self,
        sb: &Superblock,
        cache: &mut Cache<D>,
        b: u64,
        create: bool,
    ) -> Result<Option<u32>> {
        let (l, offset) = Self::level_for(b);
        if l < self.raw.levels().l_num {
            return Ok(Some(self.raw.levels().levels[l as usize] + offset as u32));
        }
        if !create {
            return Ok(None);
        }
        while self.raw.levels().l_num <= l {
            let level = self.raw.levels().l_num;
            let start = balloc::allocate(sb, cache, level)?;
            let levels = self.raw.levels_mut();
            levels.levels[level as usize] = start;
            levels.l_num = level + 1;
        }
        Ok(Some(self.raw.levels().levels[l as usize] + offset as u32))
    }

    /// Frees every run this inode owns. Called once by the namespace layer
    /// when `i_nlink` reaches 0 on unlink/rmdir — and only ever on the
    /// target's own levels, never the parent's (§9 Open Question 1).
    pub fn free_data<D: BlockDevice>(&self, sb: &Superblock, cache: &mut Cache<D>) -> Result<()> {
        let l_num = self.raw.levels().l_num as usize;
        balloc::free_all(sb, cache, &self.raw.levels().levels[..l_num])
    }
}

const _: () = assert!(MAX_LEVEL > 0);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_for_matches_run_boundaries() {
        assert_eq!(Inode::level_for(0), (0, 0));
        assert_eq!(Inode::level_for(1), (1, 0));
        assert_eq!(Inode::level_for(2), (1, 1));
        assert_eq!(Inode::level_for(3), (2, 0));
        assert_eq!(Inode::level_for(6), (2, 3));
        assert_eq!(Inode::level_for(7), (3, 0));
    }

    #[test]
    fn growth_allocates_successive_levels() {
        use crate::device::MemDevice;
        use crate::mkfs;

        let device = MemDevice::new(crate::layout::PAGE_SIZE, 20480);
        let mut cache = Cache::new(device);
        mkfs::format(&mut cache, 0, 0).unwrap();
        let sb = Superblock::load(&mut cache).unwrap();

        let mut inode = Inode::iget(&sb, &mut cache, 0).unwrap();
        assert_eq!(inode.raw.levels().l_num, 0);

        // logical block 1 lives in run-1 (length 2); reaching it from
        // l_num=0 must allocate both run-0 and run-1.
        let phys = inode.get_block(&sb, &mut cache, 1, true).unwrap().unwrap();
        assert_eq!(inode.raw.levels().l_num, 2);
        assert_eq!(phys, inode.raw.levels().levels[1]);

        assert_eq!(inode.map_block(0), Some(inode.raw.levels().levels[0]));
        assert_eq!(inode.map_block(1), Some(inode.raw.levels().levels[1]));
        assert_eq!(inode.map_block(2), Some(inode.raw.levels().levels[1] + 1));
        assert_eq!(inode.map_block(3), None);
    }
}
