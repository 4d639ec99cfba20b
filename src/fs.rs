//! `Filesystem` facade: ties the superblock, allocators, inode engine,
//! directory engine, and namespace operations together behind one handle,
//! so the crate is mountable and usable without a host VFS.
//!
//! Grounded on `fs/mod.rs`'s `FileSystem` (superblock + log, `fsinit`/`fs()`
//! as the process-wide mount point) — generalized into an explicit,
//! non-global handle per §9's design note ("pass superblock/inode cache
//! state explicitly through every core operation rather than through
//! ambient state"), since this crate has no kernel-wide singleton to hang
//! a global off of.

use crate::device::{BlockDevice, Cache};
use crate::error::Result;
use crate::inode::Inode;
use crate::layout::ROOT_INO;
use crate::mkfs;
use crate::namei;
use crate::superblock::Superblock;

pub struct Filesystem<D: BlockDevice> {
    pub sb: Superblock,
    pub cache: Cache<D>,
}

impl<D: BlockDevice> Filesystem<D> {
    /// Formats `device` fresh, then mounts it.
    pub fn format_and_mount(device: D, uid: u32, gid: u32) -> Result<Self> {
        let mut cache = Cache::new(device);
        mkfs::format(&mut cache, uid, gid)?;
        Self::mount(cache.into_device())
    }

    /// Mounts an already-formatted device: reads and validates the
    /// superblock at block 0.
    pub fn mount(device: D) -> Result<Self> {
        let mut cache = Cache::new(device);
        let sb = Superblock::load(&mut cache)?;
        Ok(Self { sb, cache })
    }

    /// Flushes all dirty buffers back to the device.
    pub fn unmount(mut self) -> Result<D> {
        self.cache.flush()?;
        Ok(self.cache.into_device())
    }

    pub fn root(&mut self) -> Result<Inode> {
        self.iget(ROOT_INO)
    }

    pub fn iget(&mut self, ino: u32) -> Result<Inode> {
        Inode::iget(&self.sb, &mut self.cache, ino)
    }

    pub fn lookup(&mut self, dir: &Inode, name: &str) -> Result<Option<Inode>> {
        namei::lookup(dir, &self.sb, &mut self.cache, name)
    }

    pub fn create(&mut self, dir: &mut Inode, name: &str, file_mode: u32, uid: u32, gid: u32) -> Result<Inode> {
        namei::create(dir, &self.sb, &mut self.cache, name, file_mode, uid, gid)
    }

    pub fn mkdir(&mut self, dir: &mut Inode, name: &str, dir_mode: u32, uid: u32, gid: u32) -> Result<Inode> {
        namei::mkdir(dir, &self.sb, &mut self.cache, name, dir_mode, uid, gid)
    }

    pub fn symlink(&mut self, dir: &mut Inode, name: &str, target: &str, uid: u32, gid: u32) -> Result<Inode> {
        namei::symlink(dir, &self.sb, &mut self.cache, name, target, uid, gid)
    }

    pub fn readlink(&self, inode: &Inode) -> &str {
        namei::readlink(inode)
    }

    pub fn link(&mut self, target: &mut Inode, dir: &mut Inode, name: &str) -> Result<()> {
        namei::link(target, dir, &self.sb, &mut self.cache, name)
    }

    pub fn unlink(&mut self, dir: &Inode, name: &str) -> Result<()> {
        namei::unlink(dir, &self.sb, &mut self.cache, name)
    }

    pub fn rmdir(&mut self, dir: &mut Inode, name: &str) -> Result<()> {
        namei::rmdir(dir, &self.sb, &mut self.cache, name)
    }

    pub fn rename(
        &mut self,
        old_dir: Inode,
        old_name: &str,
        new_dir: Inode,
        new_name: &str,
    ) -> Result<(Inode, Inode)> {
        namei::rename(old_dir, &self.sb, &mut self.cache, old_name, new_dir, new_name)
    }

    pub fn readdir(&mut self, dir: &Inode, parent_ino: u32, cursor: u64) -> Result<Option<(String, u32, u32)>> {
        namei::readdir(dir, parent_ino, &self.sb, &mut self.cache, cursor)
    }

    /// Maps a logical file block, growing the inode on write per §4.4, and
    /// writes back the inode if growth occurred.
    pub fn get_block(&mut self, inode: &mut Inode, logical: u64, create: bool) -> Result<Option<u32>> {
        let before = inode.raw.levels().l_num;
        let phys = inode.get_block(&self.sb, &mut self.cache, logical, create)?;
        if inode.raw.levels().l_num != before {
            inode.iwrite(&self.sb, &mut self.cache)?;
        }
        Ok(phys)
    }

    /// Reads one full DATA block by its physical DATA-relative index.
    pub fn read_data_block(&mut self, physical: u32) -> Result<&[u8]> {
        self.cache.read(self.sb.data_block(physical))
    }

    /// Writes one full DATA block by its physical DATA-relative index.
    pub fn write_data_block(&mut self, physical: u32) -> Result<&mut [u8]> {
        self.cache.write(self.sb.data_block(physical))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemDevice;

    #[test]
    fn mkfs_mount_umount_round_trip_produces_empty_root() {
        let device = MemDevice::new(crate::layout::PAGE_SIZE, 20480);
        let mut fs = Filesystem::format_and_mount(device, 0, 0).unwrap();
        let root = fs.root().unwrap();
        assert_eq!(root.raw.i_nlink, 2);
        assert_eq!(crate::dir::valid_count(&root, &fs.sb, &mut fs.cache).unwrap(), 0);

        let device = fs.unmount().unwrap();
        let fs2 = Filesystem::mount(device).unwrap();
        assert_eq!(fs2.sb.nr_inodes, 1024);
    }

    #[test]
    fn write_then_read_arbitrary_offset() {
        let device = MemDevice::new(crate::layout::PAGE_SIZE, 20480);
        let mut fs = Filesystem::format_and_mount(device, 0, 0).unwrap();
        let mut root = fs.root().unwrap();
        let mut file = fs.create(&mut root, "f", 0o644, 0, 0).unwrap();

        let phys = fs.get_block(&mut file, 5, true).unwrap().unwrap();
        {
            let buf = fs.write_data_block(phys).unwrap();
            buf[..5].copy_from_slice(b"hello");
        }
        let phys_again = fs.get_block(&mut file, 5, true).unwrap().unwrap();
        assert_eq!(phys, phys_again);
        let buf = fs.read_data_block(phys_again).unwrap();
        assert_eq!(&buf[..5], b"hello");
    }
}
