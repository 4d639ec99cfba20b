//! On-disk record layout: fixed-width, native-byte-order structures for the
//! superblock, inode bitmap/block bitmap blocks, inodes, and directory
//! entries.
//!
//! Grounded on `fs/superblock.rs` and `fs/ufs/inode.rs` (the `#[repr(C)]`
//! `Dinode`/`Superblock` pattern, sized and asserted with
//! `static_assertions`, read back with `zerocopy`) and on
//! `original_source/fs.h` for the exact field layout and the `MAX_LEVEL`/
//! `MAX_SYMLINK_LEN` constants (the union is sized 4024 bytes there, not the
//! 4028 that a loose reading of the distilled spec suggests; 4024 is the
//! value that keeps `RawInode` exactly one block, so it's what we use).

use static_assertions::const_assert_eq;
use zerocopy::{AsBytes, FromBytes};

/// Reinterpret a same-sized byte buffer as `T` by value. Grounded on
/// `fs/mod.rs`'s `Superblock::new`, which reads block 0 the same way: a raw
/// `ptr::copy` into an owned, `MaybeUninit` record rather than a borrowed
/// view, since the source buffer belongs to the cache and outlives nothing.
pub fn read_record<T: Copy>(buf: &[u8]) -> T {
    assert_eq!(buf.len(), core::mem::size_of::<T>());
    unsafe {
        let mut out = core::mem::MaybeUninit::<T>::uninit();
        core::ptr::copy_nonoverlapping(buf.as_ptr(), out.as_mut_ptr() as *mut u8, buf.len());
        out.assume_init()
    }
}

/// Page size in bytes. Fixed: `MAX_LEVEL` and the record sizes below are
/// only mutually consistent for this value (§4.10 of SPEC_FULL.md).
pub const PAGE_SIZE: usize = 4096;

/// `u32` entries per block, used for both IMAP and BMAP blocks.
pub const ENTRIES_PER_BLOCK: usize = PAGE_SIZE / 4;

pub const MAGIC: u32 = 0x5346_4242;

/// Maximum number of (level, run) pairs an inode can own.
pub const MAX_LEVEL: usize = 1005;

/// Maximum length of a symlink target, NUL included, i.e. the longest
/// target that fits is `MAX_SYMLINK_LEN - 1` bytes.
pub const MAX_SYMLINK_LEN: usize = 4024;

/// Longest file name bbfs stores, NUL excluded.
pub const NAME_MAX: usize = 255;

pub const ROOT_INO: u32 = 0;

/// POSIX `d_type`-style entry type tags, stored in `RawDirEntry::type_`.
pub mod dtype {
    pub const UNKNOWN: u32 = 0;
    pub const DIR: u32 = 4;
    pub const REG: u32 = 8;
    pub const LNK: u32 = 10;
}

/// Mode bits. Only the type bits the core cares about are named; the
/// permission bits pass through untouched.
pub mod mode {
    pub const S_IFMT: u32 = 0o170_000;
    pub const S_IFDIR: u32 = 0o040_000;
    pub const S_IFREG: u32 = 0o100_000;
    pub const S_IFLNK: u32 = 0o120_000;
}

/// One on-disk superblock, exactly one block.
#[repr(C)]
#[derive(Clone, Copy, AsBytes, FromBytes)]
pub struct RawSuperblock {
    pub magic: u32,
    pub nr_sb: u32,
    pub nr_imap: u32,
    pub nr_bmap: u32,
    pub nr_inodes: u32,
    pub nr_blocks: u32,
    _padding: [u8; PAGE_SIZE - 24],
}

const_assert_eq!(core::mem::size_of::<RawSuperblock>(), PAGE_SIZE);

impl RawSuperblock {
    pub fn new(nr_imap: u32, nr_bmap: u32, nr_inodes: u32, nr_blocks: u32) -> Self {
        Self {
            magic: MAGIC,
            nr_sb: 1,
            nr_imap,
            nr_bmap,
            nr_inodes,
            nr_blocks,
            _padding: [0u8; PAGE_SIZE - 24],
        }
    }
}

/// An IMAP or BMAP block: `ENTRIES_PER_BLOCK` u32 slots, 0 = free, 1 =
/// allocated. Same shape for both regions (§3).
#[repr(C)]
#[derive(Clone, Copy, AsBytes, FromBytes)]
pub struct RawBitmapBlock {
    pub entries: [u32; ENTRIES_PER_BLOCK],
}

const_assert_eq!(core::mem::size_of::<RawBitmapBlock>(), PAGE_SIZE);

impl RawBitmapBlock {
    pub fn zeroed() -> Self {
        Self {
            entries: [0u32; ENTRIES_PER_BLOCK],
        }
    }
}

/// Size, in bytes, of the union tail of `RawInode` (levels array / symlink
/// target). Fixed so that header + union == one block.
pub const INODE_UNION_SIZE: usize = MAX_SYMLINK_LEN;

const_assert_eq!(4 + MAX_LEVEL * 4, INODE_UNION_SIZE);

/// One on-disk inode, exactly one block (one per ITAB entry).
///
/// The C original stores `l_num`/`levels` and `i_link` as a union; Rust
/// unions require every access to be `unsafe` for no real benefit here, so
/// `RawInode` stores the union's bytes as a plain array and exposes typed
/// views (`as_levels`/`as_levels_mut`, `as_symlink`/`as_symlink_mut`)
/// instead.
#[repr(C)]
#[derive(Clone, Copy, AsBytes, FromBytes)]
pub struct RawInode {
    pub valid: u32,
    pub i_mode: u32,
    pub i_uid: u32,
    pub i_gid: u32,
    pub i_size: u32,
    pub i_nlink: u32,
    pub i_ctime_sec: u64,
    pub i_ctime_nsec: u64,
    pub i_atime_sec: u64,
    pub i_atime_nsec: u64,
    pub i_mtime_sec: u64,
    pub i_mtime_nsec: u64,
    union_bytes: [u8; INODE_UNION_SIZE],
}

const_assert_eq!(core::mem::size_of::<RawInode>(), PAGE_SIZE);

/// Typed view over `RawInode::union_bytes` for regular files/directories.
#[repr(C)]
#[derive(Clone, Copy, AsBytes, FromBytes)]
pub struct LevelsView {
    pub l_num: u32,
    pub levels: [u32; MAX_LEVEL],
}

const_assert_eq!(core::mem::size_of::<LevelsView>(), INODE_UNION_SIZE);
// The cast in `levels`/`levels_mut` only needs RawInode's alignment to be at
// least as strict as LevelsView's, not equal (RawInode is 8-aligned via its
// u64 timestamps; LevelsView is 4-aligned via its u32 fields).
static_assertions::const_assert!(
    core::mem::align_of::<RawInode>() >= core::mem::align_of::<LevelsView>()
);

impl RawInode {
    pub fn zeroed() -> Self {
        Self {
            valid: 0,
            i_mode: 0,
            i_uid: 0,
            i_gid: 0,
            i_size: 0,
            i_nlink: 0,
            i_ctime_sec: 0,
            i_ctime_nsec: 0,
            i_atime_sec: 0,
            i_atime_nsec: 0,
            i_mtime_sec: 0,
            i_mtime_nsec: 0,
            union_bytes: [0u8; INODE_UNION_SIZE],
        }
    }

    pub fn levels(&self) -> &LevelsView {
        // SAFETY: union_bytes is exactly sizeof(LevelsView) and shares
        // RawInode's alignment (both are u32-aligned repr(C) records).
        unsafe { &*(self.union_bytes.as_ptr() as *const LevelsView) }
    }

    pub fn levels_mut(&mut self) -> &mut LevelsView {
        // SAFETY: see `levels`.
        unsafe { &mut *(self.union_bytes.as_mut_ptr() as *mut LevelsView) }
    }

    /// NUL-terminated symlink target bytes (including the terminator).
    pub fn symlink_bytes(&self) -> &[u8; MAX_SYMLINK_LEN] {
        &self.union_bytes
    }

    pub fn symlink_bytes_mut(&mut self) -> &mut [u8; MAX_SYMLINK_LEN] {
        &mut self.union_bytes
    }
}

/// One directory-entry slot. `P / sizeof(RawDirEntry)` of these fit exactly
/// in one DATA block.
#[repr(C)]
#[derive(Clone, Copy, AsBytes, FromBytes)]
pub struct RawDirEntry {
    pub valid: u32,
    pub type_: u32,
    pub ino: u32,
    pub name: [u8; NAME_MAX + 1],
    _padding: [u8; 244],
}

const_assert_eq!(core::mem::size_of::<RawDirEntry>(), 512);
const_assert_eq!(PAGE_SIZE % core::mem::size_of::<RawDirEntry>(), 0);

/// Directory slots per DATA block.
pub const SLOTS_PER_BLOCK: usize = PAGE_SIZE / core::mem::size_of::<RawDirEntry>();

impl RawDirEntry {
    pub fn zeroed() -> Self {
        Self {
            valid: 0,
            type_: 0,
            ino: 0,
            name: [0u8; NAME_MAX + 1],
            _padding: [0u8; 244],
        }
    }

    /// Sets `name`; returns `Err` if it (plus NUL) doesn't fit.
    pub fn set_name(&mut self, name: &str) -> Result<(), ()> {
        let bytes = name.as_bytes();
        if bytes.len() > NAME_MAX {
            return Err(());
        }
        self.name = [0u8; NAME_MAX + 1];
        self.name[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    pub fn name_str(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_MAX + 1);
        core::str::from_utf8(&self.name[..len]).unwrap_or("")
    }
}
