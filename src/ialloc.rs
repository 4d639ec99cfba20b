//! Linear first-fit inode allocator over IMAP.
//!
//! Grounded on `fs/mod.rs`'s `balloc`/`bfree` (bit scan over bitmap blocks
//! held in the block cache, first hit wins, buffer marked dirty) but at
//! `u32`-slot rather than single-bit granularity, matching bbfs's IMAP/BMAP
//! layout (§3: one `u32` slot per inode/block, not a packed bitmap).

use crate::device::{BlockDevice, Cache};
use crate::error::{Error, Result};
use crate::layout::ENTRIES_PER_BLOCK;
use crate::superblock::Superblock;

fn slot_offset(slot: usize) -> usize {
    slot * 4
}

fn read_slot(buf: &[u8], slot: usize) -> u32 {
    let off = slot_offset(slot);
    u32::from_ne_bytes(buf[off..off + 4].try_into().expect("4 bytes"))
}

fn write_slot(buf: &mut [u8], slot: usize, value: u32) {
    let off = slot_offset(slot);
    buf[off..off + 4].copy_from_slice(&value.to_ne_bytes());
}

/// Walks IMAP in order and claims the first free inode number.
pub fn alloc<D: BlockDevice>(sb: &Superblock, cache: &mut Cache<D>) -> Result<u32> {
    for block_idx in 0..sb.nr_imap {
        let device_block = sb.imap_block(block_idx);
        let buf = cache.read(device_block)?;
        let free_slot = (0..ENTRIES_PER_BLOCK).find(|&s| read_slot(buf, s) == 0);
        if let Some(slot) = free_slot {
            let ino = block_idx * ENTRIES_PER_BLOCK as u32 + slot as u32;
            if ino >= sb.nr_inodes {
                break;
            }
            let buf = cache.write(device_block)?;
            write_slot(buf, slot, 1);
            return Ok(ino);
        }
    }
    Err(Error::NoSpace)
}

/// Clears the IMAP bit for `ino`, making it available for reuse.
pub fn free<D: BlockDevice>(sb: &Superblock, cache: &mut Cache<D>, ino: u32) -> Result<()> {
    let (block_idx, slot) = Superblock::imap_slot(ino);
    let device_block = sb.imap_block(block_idx);
    let buf = cache.write(device_block)?;
    write_slot(buf, slot, 0);
    Ok(())
}

/// Returns whether `ino`'s IMAP bit is currently set.
pub fn is_allocated<D: BlockDevice>(sb: &Superblock, cache: &mut Cache<D>, ino: u32) -> Result<bool> {
    let (block_idx, slot) = Superblock::imap_slot(ino);
    let buf = cache.read(sb.imap_block(block_idx))?;
    Ok(read_slot(buf, slot) != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemDevice;
    use crate::mkfs;

    fn fresh() -> (Superblock, Cache<MemDevice>) {
        let device = MemDevice::new(crate::layout::PAGE_SIZE, 20480);
        let mut cache = Cache::new(device);
        mkfs::format(&mut cache, 0, 0).unwrap();
        let sb = Superblock::load(&mut cache).unwrap();
        (sb, cache)
    }

    #[test]
    fn root_inode_is_preallocated() {
        let (sb, mut cache) = fresh();
        assert!(is_allocated(&sb, &mut cache, 0).unwrap());
    }

    #[test]
    fn alloc_skips_root_and_is_sequential() {
        let (sb, mut cache) = fresh();
        let a = alloc(&sb, &mut cache).unwrap();
        let b = alloc(&sb, &mut cache).unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, 2);
    }

    #[test]
    fn freed_slot_is_reused() {
        let (sb, mut cache) = fresh();
        let a = alloc(&sb, &mut cache).unwrap();
        free(&sb, &mut cache, a).unwrap();
        let b = alloc(&sb, &mut cache).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn exhaustion_reports_no_space() {
        let (sb, mut cache) = fresh();
        for _ in 1..sb.nr_inodes {
            alloc(&sb, &mut cache).unwrap();
        }
        assert!(matches!(alloc(&sb, &mut cache), Err(Error::NoSpace)));
    }
}
