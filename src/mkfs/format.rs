use super::layout::FsLayout;
use super::params::MkfsParams;
use crate::fs::block_dev::BlockDevice;
use crate::fs::bmap::{write_data, BlockAlloc};
use crate::fs::layout::{DiskInode, Dirent, InodeType, BPB, BSIZE, DIRSIZ, ROOTINO};
use crate::fs::{FsError, FsResult};
use crate::vfs::types::ContractViolation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MkfsError {
    Fs(FsError),
    Violation(ContractViolation),
    /// The data region filled up before the tree was written.
    TooManyBlocks,
    InvalidParams(&'static str),
}

impl From<FsError> for MkfsError {
    fn from(e: FsError) -> Self {
        match e {
            FsError::NoSpace => MkfsError::TooManyBlocks,
            e => MkfsError::Fs(e),
        }
    }
}

impl core::fmt::Display for MkfsError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            Self::Fs(e) => write!(f, "{}", e),
            Self::Violation(v) => write!(f, "{}", v),
            Self::TooManyBlocks => write!(f, "data region exhausted"),
            Self::InvalidParams(msg) => write!(f, "invalid parameters: {}", msg),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MkfsReport {
    pub total_blocks: u32,
    pub used_blocks:  u32,
    pub free_blocks:  u32,
    pub inodes_used:  u32,
    pub total_inodes: u32,
}

/// Hands out data blocks in order. The image is zeroed up front, so a
/// fresh block needs no clearing.
#[derive(Debug, Clone, Copy)]
pub struct CursorAlloc {
    pub next: u32,
    pub end:  u32,
}

impl BlockAlloc for CursorAlloc {
    fn alloc_block(&mut self, _dev: &mut dyn BlockDevice) -> FsResult<u32> {
        if self.next >= self.end {
            log::warn!("[mkfs] data region full at block {}", self.next);
            return Err(FsError::NoSpace);
        }
        let b = self.next;
        self.next += 1;
        Ok(b)
    }
}

/// Writes a fresh volume onto `dev`. Inode numbers and data blocks are
/// both handed out monotonically and never reused.
pub struct ImageBuilder<D: BlockDevice> {
    dev:       D,
    lay:       FsLayout,
    alloc:     CursorAlloc,
    freeinode: u32,
}

impl<D: BlockDevice> ImageBuilder<D> {
    pub fn format(mut dev: D, params: &MkfsParams) -> Result<Self, MkfsError> {
        let lay = FsLayout::compute(params)?;
        if dev.total_blocks() < lay.size {
            return Err(MkfsError::InvalidParams("device smaller than volume"));
        }

        log::info!("[mkfs] step 1: zeroing {} blocks", lay.size);
        for b in 0..lay.size {
            dev.zero_block(b)?;
        }

        log::info!("[mkfs] step 2: superblock at block {}", crate::fs::layout::DEV_OFFSET);
        lay.superblock().write(&mut dev)?;

        let mut b = Self {
            dev,
            lay,
            alloc: CursorAlloc { next: lay.data_start, end: lay.log_start },
            freeinode: ROOTINO,
        };

        log::info!("[mkfs] step 3: root directory");
        let root = b.ialloc(InodeType::Dir)?;
        check_root(root)?;
        b.begin_dir(root, root)?;
        Ok(b)
    }

    pub fn layout(&self) -> &FsLayout {
        &self.lay
    }

    pub fn device(&mut self) -> &mut D {
        &mut self.dev
    }

    pub fn used_blocks(&self) -> u32 {
        self.alloc.next
    }

    pub fn ialloc(&mut self, itype: InodeType) -> Result<u32, MkfsError> {
        if self.freeinode >= self.lay.ninodes {
            log::warn!("[mkfs] out of inodes ({})", self.lay.ninodes);
            return Err(MkfsError::Fs(FsError::NoInodes));
        }
        let inum = self.freeinode;
        self.freeinode += 1;
        DiskInode::new(itype).write(&mut self.dev, inum)?;
        Ok(inum)
    }

    pub fn rinode(&mut self, inum: u32) -> Result<DiskInode, MkfsError> {
        Ok(DiskInode::read(&mut self.dev, inum)?)
    }

    pub fn winode(&mut self, inum: u32, din: &DiskInode) -> Result<(), MkfsError> {
        Ok(din.write(&mut self.dev, inum)?)
    }

    /// Appends `data` at the inode's current end of file.
    pub fn append(&mut self, inum: u32, data: &[u8]) -> Result<(), MkfsError> {
        let mut din = self.rinode(inum)?;
        let off = din.size;
        write_data(&mut self.dev, &mut self.alloc, inum, &mut din, off, data)?;
        Ok(())
    }

    /// Writes the "." and ".." entries of a new directory.
    pub fn begin_dir(&mut self, dir: u32, parent: u32) -> Result<(), MkfsError> {
        self.add_entry(dir, ".", dir)?;
        self.add_entry(dir, "..", parent)
    }

    pub fn add_entry(&mut self, dir: u32, name: &str, child: u32) -> Result<(), MkfsError> {
        if name.len() > DIRSIZ {
            log::warn!("[mkfs] name '{}' truncated to {} bytes", name, DIRSIZ);
        }
        let de = Dirent::new(child as u16, name);
        self.append(dir, &de.encode())
    }

    pub fn mkdir(&mut self, parent: u32, name: &str) -> Result<u32, MkfsError> {
        let dir = self.ialloc(InodeType::Dir)?;
        self.add_entry(parent, name, dir)?;
        self.begin_dir(dir, parent)?;
        Ok(dir)
    }

    pub fn add_file(&mut self, parent: u32, name: &str, data: &[u8]) -> Result<u32, MkfsError> {
        let inum = self.ialloc(InodeType::File)?;
        self.add_entry(parent, name, inum)?;
        self.append(inum, data)?;
        Ok(inum)
    }

    /// Rounds a directory's size up to a whole number of blocks.
    pub fn finish_dir(&mut self, dir: u32) -> Result<(), MkfsError> {
        let mut din = self.rinode(dir)?;
        let bs = BSIZE as u32;
        let rounded = din.size.div_ceil(bs) * bs;
        if rounded != din.size {
            din.size = rounded;
            self.winode(dir, &din)?;
        }
        Ok(())
    }

    /// Marks every block handed out so far as used and reports totals.
    pub fn finish(mut self) -> Result<MkfsReport, MkfsError> {
        self.finish_dir(ROOTINO)?;

        let used = self.alloc.next;
        log::info!(
            "[mkfs] step 4: bitmap, first free block {}, {} bitmap block(s)",
            used, self.lay.bitmap_blocks
        );
        for i in 0..self.lay.bitmap_blocks {
            let base = i * BPB;
            let mut buf = [0u8; BSIZE];
            for b in base..used.min(base + BPB) {
                let bit = b - base;
                buf[(bit / 8) as usize] |= 1 << (bit % 8);
            }
            self.dev.write_block(self.lay.bitmap_start + i, &buf)?;
        }

        let report = MkfsReport {
            total_blocks: self.lay.size,
            used_blocks: used,
            free_blocks: self.lay.log_start - used,
            inodes_used: self.freeinode - ROOTINO,
            total_inodes: self.lay.ninodes,
        };
        log::info!(
            "[mkfs] done: {} blocks used, {} free, {}/{} inodes",
            report.used_blocks, report.free_blocks, report.inodes_used, report.total_inodes
        );
        Ok(report)
    }
}

/// The first inode handed out has to be the root directory.
fn check_root(inum: u32) -> Result<(), MkfsError> {
    if inum != ROOTINO {
        log::error!("[mkfs] root directory landed on inode {}", inum);
        return Err(MkfsError::Violation(ContractViolation::RootMisplaced { inum }));
    }
    Ok(())
}
