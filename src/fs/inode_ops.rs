//! A mounted volume: inode I/O through the block translator plus the
//! directory and path operations built on top of it.

use alloc::vec;
use spin::Mutex;

use super::bitmap::BitmapAlloc;
use super::block_dev::BlockDevice;
use super::bmap::{read_data, write_data};
use super::icache::{InodeCache, InodeRef};
use super::layout::{Dirent, DiskInode, InodeType, Superblock, DIRENT_SIZE, DIRSIZ, ROOTINO};
use super::{FsError, FsResult};
use crate::vfs::types::{DirEntry, Stat, VfsError, VfsResult};
use crate::vfs::vnode::InodeBackend;

pub struct Sfs<D: BlockDevice> {
    dev_id: u32,
    disk:   Mutex<D>,
    sb:     Superblock,
    icache: InodeCache,
}

impl<D: BlockDevice> Sfs<D> {
    pub fn mount(dev_id: u32, mut disk: D) -> FsResult<Self> {
        let sb = Superblock::read(&mut disk)?;
        if !sb.is_consistent() || disk.total_blocks() < sb.size {
            log::warn!("[vfs] dev {}: bad superblock {:?}", dev_id, sb);
            return Err(FsError::Corrupted);
        }
        if !DiskInode::read(&mut disk, ROOTINO)?.is_dir() {
            log::warn!("[vfs] dev {}: root inode is not a directory", dev_id);
            return Err(FsError::Corrupted);
        }
        log::info!(
            "[vfs] dev {}: sfs size {} data {} inodes {} log {}",
            dev_id, sb.size, sb.nblocks, sb.ninodes, sb.nlog
        );
        Ok(Self { dev_id, disk: Mutex::new(disk), sb, icache: InodeCache::new() })
    }

    pub fn dev_id(&self) -> u32 {
        self.dev_id
    }

    pub fn superblock(&self) -> &Superblock {
        &self.sb
    }

    pub fn icache(&self) -> &InodeCache {
        &self.icache
    }

    /// Hands the device back, dropping every cached inode.
    pub fn unmount(self) -> D {
        self.disk.into_inner()
    }

    pub fn iget(&self, inum: u32) -> FsResult<InodeRef> {
        if inum == 0 || inum >= self.sb.ninodes {
            return Err(FsError::InvalidInode);
        }
        self.icache.iget(self.dev_id, inum)
    }

    pub fn idup(&self, ip: InodeRef) -> InodeRef {
        self.icache.idup(ip)
    }

    pub fn iput(&self, ip: InodeRef) {
        self.icache.iput(ip)
    }

    pub fn root(&self) -> FsResult<InodeRef> {
        self.iget(ROOTINO)
    }

    pub fn inum(&self, ip: InodeRef) -> u32 {
        self.icache.inum(ip)
    }

    /// Runs `f` on the locked inode; changes to the record are kept.
    fn with_inode<R>(
        &self,
        ip: InodeRef,
        f: impl FnOnce(&mut dyn BlockDevice, u32, &mut DiskInode) -> FsResult<R>,
    ) -> FsResult<R> {
        let mut disk = self.disk.lock();
        let mut din = self.icache.ilock(ip, &mut *disk)?;
        let before = din;
        let res = f(&mut *disk, self.icache.inum(ip), &mut din);
        if din != before {
            self.icache.update(ip, &din);
        }
        self.icache.iunlock(ip);
        res
    }

    pub fn dinode(&self, ip: InodeRef) -> FsResult<DiskInode> {
        self.with_inode(ip, |_, _, din| Ok(*din))
    }

    /// Writes a modified record to the cache and the disk.
    pub fn iupdate(&self, ip: InodeRef, new: &DiskInode) -> FsResult<()> {
        self.with_inode(ip, |disk, inum, din| {
            *din = *new;
            din.write(disk, inum)
        })
    }

    pub fn readi(&self, ip: InodeRef, off: u32, buf: &mut [u8]) -> FsResult<usize> {
        self.with_inode(ip, |disk, inum, din| read_data(disk, inum, din, off, buf))
    }

    pub fn writei(&self, ip: InodeRef, off: u32, data: &[u8]) -> FsResult<usize> {
        let sb = self.sb;
        self.with_inode(ip, |disk, inum, din| {
            let mut alloc = BitmapAlloc::new(&sb);
            write_data(disk, &mut alloc, inum, din, off, data)
        })
    }

    fn dirent_at(&self, dp: InodeRef, off: u32) -> FsResult<Dirent> {
        let mut raw = [0u8; DIRENT_SIZE];
        if self.readi(dp, off, &mut raw)? != DIRENT_SIZE {
            return Err(FsError::Corrupted);
        }
        Ok(Dirent::decode(&raw))
    }

    fn dir_size(&self, dp: InodeRef) -> FsResult<u32> {
        let din = self.dinode(dp)?;
        if !din.is_dir() {
            return Err(FsError::NotDirectory);
        }
        Ok(din.size)
    }

    /// Finds `name` in directory `dp`, returning a new reference to the
    /// entry's inode and the entry's byte offset.
    pub fn dirlookup(&self, dp: InodeRef, name: &str) -> FsResult<Option<(InodeRef, u32)>> {
        let size = self.dir_size(dp)?;
        let mut off = 0;
        while off + DIRENT_SIZE as u32 <= size {
            let de = self.dirent_at(dp, off)?;
            if !de.is_empty() && de.name_eq(name) {
                return Ok(Some((self.iget(de.inum as u32)?, off)));
            }
            off += DIRENT_SIZE as u32;
        }
        Ok(None)
    }

    /// Adds `name -> inum` to `dp`, reusing the first empty slot.
    pub fn dirlink(&self, dp: InodeRef, name: &str, inum: u32) -> FsResult<()> {
        if name.len() > DIRSIZ {
            return Err(FsError::NameTooLong);
        }
        if let Some((ip, _)) = self.dirlookup(dp, name)? {
            self.iput(ip);
            return Err(FsError::AlreadyExists);
        }

        let size = self.dir_size(dp)?;
        let mut off = 0;
        while off + DIRENT_SIZE as u32 <= size {
            if self.dirent_at(dp, off)?.is_empty() {
                break;
            }
            off += DIRENT_SIZE as u32;
        }

        let de = Dirent::new(inum as u16, name);
        self.writei(dp, off, &de.encode())?;
        Ok(())
    }

    /// The `index`th live entry of `dp`; empty slots are not counted.
    pub fn readdir(&self, dp: InodeRef, index: usize) -> FsResult<Option<Dirent>> {
        let size = self.dir_size(dp)?;
        let mut seen = 0;
        let mut off = 0;
        while off + DIRENT_SIZE as u32 <= size {
            let de = self.dirent_at(dp, off)?;
            if !de.is_empty() {
                if seen == index {
                    return Ok(Some(de));
                }
                seen += 1;
            }
            off += DIRENT_SIZE as u32;
        }
        Ok(None)
    }

    fn walk<'p>(&self, path: &'p str, parent: bool) -> FsResult<(InodeRef, &'p str)> {
        let mut ip = self.root()?;
        let mut parts = path.split('/').filter(|p| !p.is_empty()).peekable();

        while let Some(name) = parts.next() {
            if parent && parts.peek().is_none() {
                return Ok((ip, name));
            }
            let next = match self.dirlookup(ip, name) {
                Ok(Some((next, _))) => next,
                Ok(None) => {
                    self.iput(ip);
                    return Err(FsError::NotFound);
                }
                Err(e) => {
                    self.iput(ip);
                    return Err(e);
                }
            };
            self.iput(ip);
            ip = next;
        }

        if parent {
            self.iput(ip);
            return Err(FsError::NotFound);
        }
        Ok((ip, ""))
    }

    /// Resolves a path from the root. There is no working directory, so
    /// relative paths resolve from the root too.
    pub fn namei(&self, path: &str) -> FsResult<InodeRef> {
        self.walk(path, false).map(|(ip, _)| ip)
    }

    /// Resolves all but the last element, returning the parent and that
    /// last name.
    pub fn nameiparent<'p>(&self, path: &'p str) -> FsResult<(InodeRef, &'p str)> {
        self.walk(path, true)
    }

    /// Claims the first unused on-disk inode.
    pub fn ialloc(&self, itype: InodeType) -> FsResult<InodeRef> {
        let inum = {
            let mut disk = self.disk.lock();
            let mut found = None;
            for inum in ROOTINO..self.sb.ninodes {
                if DiskInode::read(&mut *disk, inum)?.itype == InodeType::Unused {
                    DiskInode::new(itype).write(&mut *disk, inum)?;
                    found = Some(inum);
                    break;
                }
            }
            found
        };
        match inum {
            Some(inum) => {
                log::debug!("[vfs] ialloc {} -> ino {}", itype.name(), inum);
                self.iget(inum)
            }
            None => {
                log::warn!("[vfs] out of inodes");
                Err(FsError::NoInodes)
            }
        }
    }

    /// Creates `path`. Opening an existing regular file for `File` returns
    /// it instead.
    pub fn create(&self, path: &str, itype: InodeType, major: i16, minor: i16) -> FsResult<InodeRef> {
        let (dp, name) = self.nameiparent(path)?;
        let res = self.create_in(dp, name, itype, major, minor);
        self.iput(dp);
        res
    }

    fn create_in(
        &self,
        dp: InodeRef,
        name: &str,
        itype: InodeType,
        major: i16,
        minor: i16,
    ) -> FsResult<InodeRef> {
        if name.len() > DIRSIZ {
            return Err(FsError::NameTooLong);
        }
        if let Some((ip, _)) = self.dirlookup(dp, name)? {
            let existing = match self.dinode(ip) {
                Ok(din) => din.itype,
                Err(e) => {
                    self.iput(ip);
                    return Err(e);
                }
            };
            if itype == InodeType::File && existing == InodeType::File {
                return Ok(ip);
            }
            self.iput(ip);
            return Err(FsError::AlreadyExists);
        }

        let ip = self.ialloc(itype)?;
        let inum = self.inum(ip);
        let res = (|| {
            let mut din = self.dinode(ip)?;
            din.major = major;
            din.minor = minor;
            din.nlink = 1;
            self.iupdate(ip, &din)?;

            if itype == InodeType::Dir {
                let mut parent = self.dinode(dp)?;
                parent.nlink += 1;
                self.iupdate(dp, &parent)?;
                self.dirlink(ip, ".", inum)?;
                self.dirlink(ip, "..", self.inum(dp))?;
            }
            self.dirlink(dp, name, inum)
        })();

        match res {
            Ok(()) => Ok(ip),
            Err(e) => {
                self.iput(ip);
                Err(e)
            }
        }
    }

    pub fn mkdir(&self, path: &str) -> FsResult<()> {
        let ip = self.create(path, InodeType::Dir, 0, 0)?;
        self.iput(ip);
        Ok(())
    }

    /// Reads a whole file; mostly for tools and tests.
    pub fn read_all(&self, ip: InodeRef) -> FsResult<alloc::vec::Vec<u8>> {
        let size = self.dinode(ip)?.size as usize;
        let mut buf = vec![0u8; size];
        let n = self.readi(ip, 0, &mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }
}

impl<D: BlockDevice> InodeBackend for Sfs<D> {
    fn dev_id(&self) -> u32 {
        self.dev_id
    }

    fn root(&self) -> VfsResult<InodeRef> {
        Ok(Sfs::root(self)?)
    }

    fn namei(&self, path: &str) -> VfsResult<InodeRef> {
        Ok(Sfs::namei(self, path)?)
    }

    fn create(&self, path: &str) -> VfsResult<InodeRef> {
        Ok(Sfs::create(self, path, InodeType::File, 0, 0)?)
    }

    fn lookup(&self, dir: InodeRef, name: &str) -> VfsResult<Option<InodeRef>> {
        Ok(self.dirlookup(dir, name)?.map(|(ip, _)| ip))
    }

    fn is_dir(&self, ino: InodeRef) -> VfsResult<bool> {
        Ok(self.dinode(ino)?.is_dir())
    }

    fn read(&self, ino: InodeRef, off: u32, buf: &mut [u8]) -> VfsResult<usize> {
        Ok(self.readi(ino, off, buf)?)
    }

    fn write(&self, ino: InodeRef, off: u32, data: &[u8]) -> VfsResult<usize> {
        if self.dinode(ino)?.is_dir() {
            return Err(VfsError::IsDirectory);
        }
        Ok(self.writei(ino, off, data)?)
    }

    fn stat(&self, ino: InodeRef) -> VfsResult<Stat> {
        let din = self.dinode(ino)?;
        Ok(Stat {
            dev: self.dev_id,
            ino: self.inum(ino),
            kind: din.itype,
            nlink: din.nlink,
            size: din.size,
        })
    }

    fn readdir(&self, dir: InodeRef, index: usize) -> VfsResult<Option<DirEntry>> {
        Ok(Sfs::readdir(self, dir, index)?.map(|de| DirEntry::from_name(de.name_bytes(), de.inum as u32)))
    }

    fn release(&self, ino: InodeRef) {
        self.iput(ino)
    }
}
