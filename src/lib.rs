//! Core on-disk layout, allocators, and inode/directory engine for a
//! block-addressed filesystem.
//!
//! Five regions in order — SB, IMAP, BMAP, ITAB, DATA — all sized in units
//! of the page size. The distinguishing design is the data-block allocator:
//! a buddy-style, power-of-two run allocator (`balloc`) addressed through an
//! inode's `levels[]` array (`inode::Inode::level_for`/`map_block`) instead
//! of the more familiar direct/indirect block pointers.
//!
//! Mount plumbing, permission checks, and time sourcing belong to whatever
//! embeds this crate (a host VFS adapter, a FUSE daemon, a test harness);
//! `device::BlockDevice` and `fs::Filesystem` are the seams for that.

pub mod balloc;
pub mod device;
pub mod dir;
pub mod error;
pub mod fs;
pub mod ialloc;
pub mod inode;
pub mod layout;
pub mod mkfs;
pub mod namei;
pub mod superblock;

pub use error::{Error, Result};
pub use fs::Filesystem;
