//! In-memory copies of on-disk inodes.
//!
//! An entry is claimed by `iget` and stays put while its reference count
//! is non-zero. `busy` serialises users of the inode's contents; `valid`
//! says the mirrored record has been read from disk.

use spin::Mutex;

use super::block_dev::BlockDevice;
use super::layout::DiskInode;
use super::{FsError, FsResult};
use crate::vfs::types::NINODE;

/// Index of a referenced cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InodeRef(usize);

impl InodeRef {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Clone, Copy)]
struct CachedInode {
    dev:    u32,
    inum:   u32,
    refcnt: u32,
    busy:   bool,
    valid:  bool,
    din:    DiskInode,
}

impl CachedInode {
    const fn empty() -> Self {
        Self {
            dev: 0,
            inum: 0,
            refcnt: 0,
            busy: false,
            valid: false,
            din: DiskInode {
                itype: super::layout::InodeType::Unused,
                major: 0,
                minor: 0,
                nlink: 0,
                size: 0,
                addrs: [0; super::layout::NDIRECT + 1],
            },
        }
    }
}

pub struct InodeCache<const N: usize = NINODE> {
    entries: Mutex<[CachedInode; N]>,
}

impl<const N: usize> InodeCache<N> {
    pub const fn new() -> Self {
        Self { entries: Mutex::new([CachedInode::empty(); N]) }
    }

    /// Takes a reference to `(dev, inum)` without touching the disk.
    pub fn iget(&self, dev: u32, inum: u32) -> FsResult<InodeRef> {
        let mut entries = self.entries.lock();
        let mut empty = None;
        for (i, e) in entries.iter_mut().enumerate() {
            if e.refcnt > 0 && e.dev == dev && e.inum == inum {
                e.refcnt += 1;
                return Ok(InodeRef(i));
            }
            if empty.is_none() && e.refcnt == 0 {
                empty = Some(i);
            }
        }
        let Some(i) = empty else {
            log::warn!("[icache] no free entries for ino {}", inum);
            return Err(FsError::NoInodes);
        };
        entries[i] = CachedInode { dev, inum, refcnt: 1, ..CachedInode::empty() };
        log::trace!("[icache] ino {} -> slot {}", inum, i);
        Ok(InodeRef(i))
    }

    pub fn idup(&self, ip: InodeRef) -> InodeRef {
        self.entries.lock()[ip.0].refcnt += 1;
        ip
    }

    pub fn inum(&self, ip: InodeRef) -> u32 {
        self.entries.lock()[ip.0].inum
    }

    pub fn refcnt(&self, ip: InodeRef) -> u32 {
        self.entries.lock()[ip.0].refcnt
    }

    /// Marks the entry busy, loading the record on first use, and returns
    /// a copy of it. Spins while another holder has it.
    pub fn ilock(&self, ip: InodeRef, disk: &mut dyn BlockDevice) -> FsResult<DiskInode> {
        let inum = loop {
            let mut entries = self.entries.lock();
            let e = &mut entries[ip.0];
            if e.refcnt == 0 {
                return Err(FsError::InvalidInode);
            }
            if !e.busy {
                e.busy = true;
                if e.valid {
                    return Ok(e.din);
                }
                break e.inum;
            }
            drop(entries);
            core::hint::spin_loop();
        };

        let loaded = DiskInode::read(disk, inum);
        let mut entries = self.entries.lock();
        let e = &mut entries[ip.0];
        match loaded {
            Ok(din) => {
                e.din = din;
                e.valid = true;
                Ok(din)
            }
            Err(err) => {
                e.busy = false;
                Err(err)
            }
        }
    }

    /// Stores `din` as the cached copy of a locked entry.
    pub fn update(&self, ip: InodeRef, din: &DiskInode) {
        let mut entries = self.entries.lock();
        entries[ip.0].din = *din;
    }

    pub fn iunlock(&self, ip: InodeRef) {
        let mut entries = self.entries.lock();
        let e = &mut entries[ip.0];
        if !e.busy || e.refcnt == 0 {
            log::error!("[icache] iunlock of unlocked ino {}", e.inum);
        }
        e.busy = false;
    }

    /// Drops a reference. The last one evicts the cached copy.
    pub fn iput(&self, ip: InodeRef) {
        let mut entries = self.entries.lock();
        let e = &mut entries[ip.0];
        if e.refcnt == 0 {
            log::error!("[icache] iput of free slot {}", ip.0);
            return;
        }
        e.refcnt -= 1;
        if e.refcnt == 0 {
            e.valid = false;
            e.busy = false;
            log::trace!("[icache] ino {} evicted", e.inum);
        }
    }

    pub fn in_use(&self) -> usize {
        self.entries.lock().iter().filter(|e| e.refcnt > 0).count()
    }
}

impl<const N: usize> Default for InodeCache<N> {
    fn default() -> Self {
        Self::new()
    }
}
