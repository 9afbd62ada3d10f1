use crate::fs::layout::BPB;

pub const LOGSIZE: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MkfsParams {
    /// Whole volume, in blocks.
    pub size: u32,
    pub nblocks: u32,
    pub nlog: u32,
    pub ninodes: u32,
}

impl MkfsParams {
    pub fn new(size: u32, nblocks: u32, nlog: u32, ninodes: u32) -> Self {
        Self { size, nblocks, nlog, ninodes }
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.ninodes < 2 {
            return Err("ninodes must leave room for the root inode");
        }
        if self.ninodes > u16::MAX as u32 {
            return Err("ninodes must fit a directory entry");
        }
        if self.size == 0 || self.size > BPB * 64 {
            return Err("size out of range");
        }
        Ok(())
    }
}

impl Default for MkfsParams {
    fn default() -> Self {
        Self {
            size: 1024,
            nblocks: 985,
            nlog: LOGSIZE,
            ninodes: 200,
        }
    }
}
