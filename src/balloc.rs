//! Buddy-style power-of-two run allocator over BMAP.
//!
//! Grounded on `fs/mod.rs`'s `balloc`/`bfree` bit-scan shape (walk candidate
//! starts, inspect a bitmap block through the cache, mark bits, return), but
//! allocating `2^level`-aligned runs instead of single blocks — the
//! "distinguishing design" of §1. No in-memory free list is kept (§9 notes
//! this is conformant as long as the alignment invariant holds); a linear
//! scan over aligned candidates is the straightforward reading of
//! `original_source`'s `bbfs_find_and_mark_free_block`.

use crate::device::{BlockDevice, Cache};
use crate::error::{Error, Result};
use crate::superblock::Superblock;

fn read_bit<D: BlockDevice>(sb: &Superblock, cache: &mut Cache<D>, data_block: u32) -> Result<bool> {
    let (block_idx, slot) = Superblock::bmap_slot(data_block);
    let buf = cache.read(sb.bmap_block(block_idx))?;
    let off = slot * 4;
    Ok(u32::from_ne_bytes(buf[off..off + 4].try_into().expect("4 bytes")) != 0)
}

fn write_bit<D: BlockDevice>(
    sb: &Superblock,
    cache: &mut Cache<D>,
    data_block: u32,
    set: bool,
) -> Result<()> {
    let (block_idx, slot) = Superblock::bmap_slot(data_block);
    let buf = cache.write(sb.bmap_block(block_idx))?;
    let off = slot * 4;
    buf[off..off + 4].copy_from_slice(&(set as u32).to_ne_bytes());
    Ok(())
}

fn run_is_free<D: BlockDevice>(
    sb: &Superblock,
    cache: &mut Cache<D>,
    start: u32,
    len: u32,
) -> Result<bool> {
    for i in 0..len {
        if read_bit(sb, cache, start + i)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn mark_run<D: BlockDevice>(
    sb: &Superblock,
    cache: &mut Cache<D>,
    start: u32,
    len: u32,
    set: bool,
) -> Result<()> {
    for i in 0..len {
        write_bit(sb, cache, start + i, set)?;
    }
    Ok(())
}

/// Allocates a `2^level`-block run, returning its DATA-relative start index.
/// Scanning only `2^level`-aligned candidates guarantees the buddy alignment
/// invariant (§3, §4.3) without storing a length alongside each run.
pub fn allocate<D: BlockDevice>(sb: &Superblock, cache: &mut Cache<D>, level: u32) -> Result<u32> {
    if level >= 32 {
        return Err(Error::NoSpace);
    }
    let run_len = 1u32 << level;
    let mut start = 0u32;
    while start.checked_add(run_len).map_or(false, |end| end <= sb.nr_blocks) {
        if run_is_free(sb, cache, start, run_len)? {
            mark_run(sb, cache, start, run_len, true)?;
            log::trace!("bbfs: balloc level={} start={} len={}", level, start, run_len);
            return Ok(start);
        }
        start += run_len;
    }
    Err(Error::NoSpace)
}

/// Frees the run at `level` starting at `start` (as recorded in
/// `levels[level]`). Per-block free of part of a run is intentionally not
/// exposed (§4.3).
pub fn free_run<D: BlockDevice>(
    sb: &Superblock,
    cache: &mut Cache<D>,
    level: u32,
    start: u32,
) -> Result<()> {
    let run_len = 1u32 << level;
    mark_run(sb, cache, start, run_len, false)
}

/// Frees every run an inode owns, given its `levels[0..l_num]`.
pub fn free_all<D: BlockDevice>(sb: &Superblock, cache: &mut Cache<D>, levels: &[u32]) -> Result<()> {
    for (level, &start) in levels.iter().enumerate() {
        free_run(sb, cache, level as u32, start)?;
    }
    Ok(())
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
    fn allocations_are_aligned_and_disjoint() {
        let (sb, mut cache) = fresh();
        let r0 = allocate(&sb, &mut cache, 0).unwrap();
        let r1 = allocate(&sb, &mut cache, 1).unwrap();
        let r2 = allocate(&sb, &mut cache, 2).unwrap();
        assert_eq!(r0 % 1, 0);
        assert_eq!(r1 % 2, 0);
        assert_eq!(r2 % 4, 0);
        assert!(r1 >= r0 + 1 || r1 + 2 <= r0);
        for b in r2..r2 + 4 {
            assert!(read_bit(&sb, &mut cache, b).unwrap());
        }
    }

    #[test]
    fn free_then_realloc_returns_same_run() {
        let (sb, mut cache) = fresh();
        let r = allocate(&sb, &mut cache, 3).unwrap();
        free_run(&sb, &mut cache, 3, r).unwrap();
        let r2 = allocate(&sb, &mut cache, 3).unwrap();
        assert_eq!(r, r2);
    }

    #[test]
    fn exhaustion_reports_no_space() {
        let (sb, mut cache) = fresh();
        // nr_blocks = 15360; level 13 (8192 blocks) fits once, not twice.
        allocate(&sb, &mut cache, 13).unwrap();
        assert!(matches!(allocate(&sb, &mut cache, 13), Err(Error::NoSpace)));
    }
}
