use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use miku_sfs::fs::layout::{Block, BSIZE};
use miku_sfs::fs::{FsError, FsResult};
use miku_sfs::BlockDevice;

/// An image file opened for the whole build. Any host I/O failure is
/// logged with its cause and surfaces as `IoError`.
pub struct ImageFile {
    file:   File,
    path:   PathBuf,
    blocks: u32,
}

impl ImageFile {
    /// Creates (or truncates) `path` and sizes it to `blocks` blocks.
    pub fn create(path: &Path, blocks: u32) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(blocks as u64 * BSIZE as u64)?;
        Ok(Self { file, path: path.to_path_buf(), blocks })
    }

    pub fn sync(&mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file.sync_all()
    }

    fn seek_to(&mut self, bno: u32) -> FsResult<()> {
        if bno >= self.blocks {
            log::error!("[image] block {} past end of {} ({} blocks)", bno, self.path.display(), self.blocks);
            return Err(FsError::BadBlock);
        }
        self.file
            .seek(SeekFrom::Start(bno as u64 * BSIZE as u64))
            .map(|_| ())
            .map_err(|e| self.fail("seek", bno, e))
    }

    fn fail(&self, op: &str, bno: u32, e: io::Error) -> FsError {
        log::error!("[image] {} block {} of {}: {}", op, bno, self.path.display(), e);
        FsError::IoError
    }
}

impl BlockDevice for ImageFile {
    fn read_block(&mut self, bno: u32, buf: &mut Block) -> FsResult<()> {
        self.seek_to(bno)?;
        self.file.read_exact(buf).map_err(|e| self.fail("read", bno, e))
    }

    fn write_block(&mut self, bno: u32, buf: &Block) -> FsResult<()> {
        self.seek_to(bno)?;
        self.file.write_all(buf).map_err(|e| self.fail("write", bno, e))
    }

    fn total_blocks(&self) -> u32 {
        self.blocks
    }
}
