use super::format::MkfsError;
use super::params::MkfsParams;
use crate::fs::layout::{bitmap_blocks, bitmap_start, inode_blocks, Superblock, DEV_OFFSET};
use crate::vfs::types::ContractViolation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsLayout {
    pub size:          u32,
    pub nblocks:       u32,
    pub ninodes:       u32,
    pub nlog:          u32,
    pub inode_start:   u32,
    pub inode_blocks:  u32,
    pub bitmap_start:  u32,
    pub bitmap_blocks: u32,
    pub used_blocks:   u32,
    pub data_start:    u32,
    pub log_start:     u32,
}

impl FsLayout {
    /// Derives the metadata regions and insists they tile the volume
    /// exactly.
    pub fn compute(params: &MkfsParams) -> Result<Self, MkfsError> {
        params.validate().map_err(MkfsError::InvalidParams)?;

        let inode_blocks  = inode_blocks(params.ninodes);
        let bitmap_blocks = bitmap_blocks(params.size);
        let used_blocks   = 1 + DEV_OFFSET + inode_blocks + bitmap_blocks;
        let computed      = params.nblocks as u64 + used_blocks as u64 + params.nlog as u64;

        log::info!(
            "[mkfs] meta {} (bitmap {} inode {}) data {} log {} total {}",
            used_blocks, bitmap_blocks, inode_blocks, params.nblocks, params.nlog, computed
        );

        if computed != params.size as u64 {
            return Err(MkfsError::Violation(ContractViolation::GeometryMismatch {
                size: params.size,
                computed,
            }));
        }

        Ok(Self {
            size: params.size,
            nblocks: params.nblocks,
            ninodes: params.ninodes,
            nlog: params.nlog,
            inode_start: 1 + DEV_OFFSET,
            inode_blocks,
            bitmap_start: bitmap_start(params.ninodes),
            bitmap_blocks,
            used_blocks,
            data_start: used_blocks,
            log_start: used_blocks + params.nblocks,
        })
    }

    pub fn superblock(&self) -> Superblock {
        Superblock {
            size: self.size,
            nblocks: self.nblocks,
            ninodes: self.ninodes,
            nlog: self.nlog,
        }
    }
}
