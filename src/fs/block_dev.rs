use alloc::vec;
use alloc::vec::Vec;

use super::layout::{Block, BSIZE};
use super::{FsError, FsResult};

/// Whole-block access to a volume. Kernel drivers and the image builder
/// each provide one.
pub trait BlockDevice: Send {
    fn read_block(&mut self, bno: u32, buf: &mut Block) -> FsResult<()>;
    fn write_block(&mut self, bno: u32, buf: &Block) -> FsResult<()>;
    fn total_blocks(&self) -> u32;

    fn zero_block(&mut self, bno: u32) -> FsResult<()> {
        self.write_block(bno, &[0u8; BSIZE])
    }
}

impl<D: BlockDevice + ?Sized> BlockDevice for &mut D {
    fn read_block(&mut self, bno: u32, buf: &mut Block) -> FsResult<()> {
        (**self).read_block(bno, buf)
    }
    fn write_block(&mut self, bno: u32, buf: &Block) -> FsResult<()> {
        (**self).write_block(bno, buf)
    }
    fn total_blocks(&self) -> u32 {
        (**self).total_blocks()
    }
}

pub struct RamDisk {
    data: Vec<u8>,
    read_only: bool,
}

impl RamDisk {
    pub fn new(total_blocks: u32) -> Self {
        Self {
            data: vec![0u8; total_blocks as usize * BSIZE],
            read_only: false,
        }
    }

    /// Wraps an existing image; a trailing partial block is dropped.
    pub fn from_image(mut image: Vec<u8>) -> Self {
        let whole = image.len() / BSIZE * BSIZE;
        image.truncate(whole);
        Self { data: image, read_only: false }
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub fn image(&self) -> &[u8] {
        &self.data
    }

    pub fn into_image(self) -> Vec<u8> {
        self.data
    }

    fn range(&self, bno: u32) -> FsResult<core::ops::Range<usize>> {
        if bno >= self.total_blocks() {
            log::warn!("[ramdisk] block {} out of range ({})", bno, self.total_blocks());
            return Err(FsError::BadBlock);
        }
        let start = bno as usize * BSIZE;
        Ok(start..start + BSIZE)
    }
}

impl BlockDevice for RamDisk {
    fn read_block(&mut self, bno: u32, buf: &mut Block) -> FsResult<()> {
        let r = self.range(bno)?;
        buf.copy_from_slice(&self.data[r]);
        Ok(())
    }

    fn write_block(&mut self, bno: u32, buf: &Block) -> FsResult<()> {
        if self.read_only {
            return Err(FsError::IoError);
        }
        let r = self.range(bno)?;
        self.data[r].copy_from_slice(buf);
        Ok(())
    }

    fn total_blocks(&self) -> u32 {
        (self.data.len() / BSIZE) as u32
    }
}
