//! Formatter: computes region sizes from device size and writes a fresh,
//! empty-root-directory image.
//!
//! Grounded on `original_source/mkfs.c`'s sizing law and write order
//! (superblock, IMAP, BMAP, root inode, remaining ITAB), translated from
//! "write sequentially to an fd" to "fill in blocks through the cache" the
//! way `LENSHOOD-xv6-rust/mkfs/src/main.rs` fills its image through `wsect`.

use zerocopy::AsBytes;

use crate::device::{BlockDevice, Cache};
use crate::error::Result;
use crate::layout::{mode, RawBitmapBlock, RawInode, RawSuperblock, PAGE_SIZE};

/// Region sizes computed from a device size, per the sizing law in §4.1:
/// `nr_imap = (D - sizeof(SB)) / (P + 4) / 17 / (P / 4)`, `nr_bmap = 15 *
/// nr_imap`, the rest derived. Matches `original_source/mkfs.c` exactly,
/// including the truncating integer division at each step.
fn region_sizes(device_bytes: u64) -> (u32, u32, u32, u32) {
    let p = PAGE_SIZE as u64;
    let sb = PAGE_SIZE as u64;
    let nr_imap = (device_bytes.saturating_sub(sb)) / (p + 4) / 17 / (p / 4);
    let nr_bmap = nr_imap * 15;
    let nr_inodes = nr_imap * (p / 4);
    let nr_blocks = nr_bmap * (p / 4);
    (nr_imap as u32, nr_bmap as u32, nr_inodes as u32, nr_blocks as u32)
}

/// Formats `cache`'s underlying device as a fresh bbfs image: superblock,
/// IMAP (inode 0 reserved), BMAP (all clear), a root directory inode at
/// ITAB[0], and the remaining ITAB blocks zeroed. `uid`/`gid` become the
/// root inode's owner (time sourcing and identity are the embedder's
/// responsibility per §1; this crate has no ambient uid/gid/clock source).
pub fn format<D: BlockDevice>(
    cache: &mut Cache<D>,
    uid: u32,
    gid: u32,
) -> Result<()> {
    let device_bytes = cache.block_count() * cache.block_size() as u64;
    let (nr_imap, nr_bmap, nr_inodes, nr_blocks) = region_sizes(device_bytes);

    if nr_imap == 0 || nr_inodes == 0 {
        return Err(crate::error::Error::NoSpace);
    }

    let sb = RawSuperblock::new(nr_imap, nr_bmap, nr_inodes, nr_blocks);
    cache.write_whole(0, sb.as_bytes().to_vec());

    let mut block = 1u64;

    let mut first_imap = RawBitmapBlock::zeroed();
    first_imap.entries[0] = 1;
    cache.write_whole(block, first_imap.as_bytes().to_vec());
    block += 1;
    for _ in 1..nr_imap {
        cache.write_whole(block, RawBitmapBlock::zeroed().as_bytes().to_vec());
        block += 1;
    }

    for _ in 0..nr_bmap {
        cache.write_whole(block, RawBitmapBlock::zeroed().as_bytes().to_vec());
        block += 1;
    }

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let mut root = RawInode::zeroed();
    root.valid = 1;
    root.i_mode = mode::S_IFDIR | 0o755;
    root.i_uid = uid;
    root.i_gid = gid;
    root.i_size = PAGE_SIZE as u32;
    root.i_nlink = 2;
    root.i_ctime_sec = now.as_secs();
    root.i_ctime_nsec = now.subsec_nanos() as u64;
    root.i_atime_sec = root.i_ctime_sec;
    root.i_atime_nsec = root.i_ctime_nsec;
    root.i_mtime_sec = root.i_ctime_sec;
    root.i_mtime_nsec = root.i_ctime_nsec;
    root.levels_mut().l_num = 0;
    cache.write_whole(block, root.as_bytes().to_vec());
    block += 1;

    for _ in 1..nr_inodes {
        cache.write_whole(block, RawInode::zeroed().as_bytes().to_vec());
        block += 1;
    }

    log::debug!(
        "bbfs: formatted: nr_imap={} nr_bmap={} nr_inodes={} nr_blocks={}",
        nr_imap,
        nr_bmap,
        nr_inodes,
        nr_blocks
    );

    cache.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemDevice;
    use crate::layout::MAGIC;

    #[test]
    fn sizing_matches_original_formula() {
        // 80 MiB: the smallest round device size that actually drives
        // nr_imap to 1 under the literal sizing law (a 64 MiB device, as a
        // loose reading of an illustrative scenario might suggest, rounds
        // down to nr_imap=0 with this exact integer arithmetic).
        let (nr_imap, nr_bmap, nr_inodes, nr_blocks) = region_sizes(80 * 1024 * 1024);
        assert_eq!(nr_imap, 1);
        assert_eq!(nr_bmap, 15);
        assert_eq!(nr_inodes, 1024);
        assert_eq!(nr_blocks, 15360);
    }

    #[test]
    fn format_writes_valid_superblock_and_root() {
        let device = MemDevice::new(PAGE_SIZE, 20480);
        let mut cache = Cache::new(device);
        format(&mut cache, 1000, 1000).unwrap();

        let raw: RawSuperblock = crate::layout::read_record(cache.read(0).unwrap());
        assert_eq!(raw.magic, MAGIC);
        assert_eq!(raw.nr_imap, 1);

        let root_block = 1 + raw.nr_imap as u64 + raw.nr_bmap as u64;
        let root: RawInode = crate::layout::read_record(cache.read(root_block).unwrap());
        assert_eq!(root.valid, 1);
        assert_eq!(root.i_mode, mode::S_IFDIR | 0o755);
        assert_eq!(root.i_nlink, 2);
        assert_eq!(root.levels().l_num, 0);
    }

    #[test]
    fn tiny_device_has_no_space() {
        let device = MemDevice::new(PAGE_SIZE, 4);
        let mut cache = Cache::new(device);
        assert!(format(&mut cache, 0, 0).is_err());
    }
}
