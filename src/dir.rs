//! Directory engine: a directory's levels hold directory-entry slots,
//! addressed as one logical array in run order.
//!
//! Grounded on `original_source/dir.c`'s `bbfs_iterate` and the directory
//! scan loops duplicated across `inode.c`'s `bbfs_lookup`/`bbfs_create`/etc
//! (runs 0..l_num, blocks within a run, slots within a block, first
//! `valid==0` slot wins on insert). Two of the §9 Open-Question fixes live
//! here: `insert_slot`'s growth path zero-fills the new run before handing
//! back the first slot, and nothing here ever reaches into another inode's
//! `levels[]` (unlike `bbfs_unlink`, which frees DATA through the parent's
//! levels by mistake).

use zerocopy::AsBytes;

use crate::device::{BlockDevice, Cache};
use crate::error::{Error, Result};
use crate::inode::Inode;
use crate::layout::{read_record, RawDirEntry, PAGE_SIZE, SLOTS_PER_BLOCK};
use crate::superblock::Superblock;

const DE_SIZE: usize = core::mem::size_of::<RawDirEntry>();

/// Location of a directory-entry slot: which logical directory block, and
/// which slot within it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Slot {
    pub logical_block: u64,
    pub index: usize,
}

fn logical_block_count(inode: &Inode) -> u64 {
    let l_num = inode.raw.levels().l_num;
    if l_num == 0 {
        0
    } else {
        (1u64 << l_num) - 1
    }
}

fn read_slot<D: BlockDevice>(
    inode: &Inode,
    sb: &Superblock,
    cache: &mut Cache<D>,
    slot: Slot,
) -> Result<RawDirEntry> {
    let phys = inode.map_block(slot.logical_block).expect("slot within l_num");
    let buf = cache.read(sb.data_block(phys))?;
    let off = slot.index * DE_SIZE;
    Ok(read_record(&buf[off..off + DE_SIZE]))
}

fn write_slot<D: BlockDevice>(
    inode: &Inode,
    sb: &Superblock,
    cache: &mut Cache<D>,
    slot: Slot,
    entry: &RawDirEntry,
) -> Result<()> {
    let phys = inode.map_block(slot.logical_block).expect("slot within l_num");
    let buf = cache.write(sb.data_block(phys))?;
    let off = slot.index * DE_SIZE;
    buf[off..off + DE_SIZE].copy_from_slice(entry.as_bytes());
    Ok(())
}

/// Iterates every slot currently backed by `inode`'s runs, valid or not.
fn for_each_slot(inode: &Inode) -> impl Iterator<Item = Slot> {
    let total = logical_block_count(inode);
    (0..total).flat_map(move |logical_block| {
        (0..SLOTS_PER_BLOCK).map(move |index| Slot { logical_block, index })
    })
}

/// Scans every *valid* slot in directory order, yielding `(slot, entry)`.
pub fn scan<D: BlockDevice>(
    inode: &Inode,
    sb: &Superblock,
    cache: &mut Cache<D>,
) -> Result<Vec<(Slot, RawDirEntry)>> {
    let mut out = Vec::new();
    for slot in for_each_slot(inode) {
        let entry = read_slot(inode, sb, cache, slot)?;
        if entry.valid == 1 {
            out.push((slot, entry));
        }
    }
    Ok(out)
}

/// Finds the valid slot named `name`, if any.
pub fn find<D: BlockDevice>(
    inode: &Inode,
    sb: &Superblock,
    cache: &mut Cache<D>,
    name: &str,
) -> Result<Option<(Slot, RawDirEntry)>> {
    for slot in for_each_slot(inode) {
        let entry = read_slot(inode, sb, cache, slot)?;
        if entry.valid == 1 && entry.name_str() == name {
            return Ok(Some((slot, entry)));
        }
    }
    Ok(None)
}

/// Writes `entry` into the first free slot, growing the directory by one
/// level if none is free. New run blocks are explicitly zeroed before the
/// entry is written into them (§9: the original relies on blocks already
/// being zero from a fresh BMAP, which a recycled block would violate).
pub fn insert_slot<D: BlockDevice>(
    inode: &mut Inode,
    sb: &Superblock,
    cache: &mut Cache<D>,
    entry: &RawDirEntry,
) -> Result<()> {
    for slot in for_each_slot(inode) {
        let existing = read_slot(inode, sb, cache, slot)?;
        if existing.valid == 0 {
            write_slot(inode, sb, cache, slot, entry)?;
            return Ok(());
        }
    }

    let new_level = inode.raw.levels().l_num;
    let new_logical_start = if new_level == 0 { 0 } else { (1u64 << new_level) - 1 };
    inode.get_block(sb, cache, new_logical_start, true)?;

    let run_start = inode.raw.levels().levels[new_level as usize];
    let run_len = 1u32 << new_level;
    for i in 0..run_len {
        cache.write_whole(sb.data_block(run_start + i), vec![0u8; PAGE_SIZE]);
    }

    write_slot(
        inode,
        sb,
        cache,
        Slot { logical_block: new_logical_start, index: 0 },
        entry,
    )?;
    Ok(())
}

/// Zeros the named entry's slot (if found) and returns what it held.
pub fn remove_slot<D: BlockDevice>(
    inode: &Inode,
    sb: &Superblock,
    cache: &mut Cache<D>,
    name: &str,
) -> Result<RawDirEntry> {
    let (slot, entry) = find(inode, sb, cache, name)?.ok_or(Error::NotFound)?;
    write_slot(inode, sb, cache, slot, &RawDirEntry::zeroed())?;
    Ok(entry)
}

/// `.`/`..` plus every valid slot, addressed by the public cursor
/// `2 + k` (§4.5). `parent_ino` supplies `..`'s target since bbfs stores no
/// parent back-reference in the directory itself (the original leans on the
/// VFS dcache for it; we don't have one).
pub fn readdir_entry<D: BlockDevice>(
    inode: &Inode,
    parent_ino: u32,
    sb: &Superblock,
    cache: &mut Cache<D>,
    cursor: u64,
) -> Result<Option<(String, u32, u32)>> {
    use crate::layout::dtype;
    if cursor == 0 {
        return Ok(Some((".".to_string(), inode.ino, dtype::DIR)));
    }
    if cursor == 1 {
        return Ok(Some(("..".to_string(), parent_ino, dtype::DIR)));
    }
    let k = (cursor - 2) as usize;
    let entries = scan(inode, sb, cache)?;
    Ok(entries
        .get(k)
        .map(|(_, e)| (e.name_str().to_string(), e.ino, e.type_)))
}

/// Count of valid slots, used by the §8 invariant "valid slots + 2 == full
/// readdir count".
pub fn valid_count<D: BlockDevice>(inode: &Inode, sb: &Superblock, cache: &mut Cache<D>) -> Result<usize> {
    Ok(scan(inode, sb, cache)?.len())
}
