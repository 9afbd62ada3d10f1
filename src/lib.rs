//! Vnode layer and the simple on-disk filesystem (sfs) of Miku OS.
//!
//! `fs` holds the disk format, the block translator and the mounted
//! volume; `vfs` the shared open-file table; `mkfs` writes new volumes
//! and is what the host-side `mkfs-sfs` tool drives.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod fs;
pub mod mkfs;
pub mod vfs;

pub use fs::block_dev::{BlockDevice, RamDisk};
pub use fs::inode_ops::Sfs;
pub use mkfs::{ImageBuilder, MkfsError, MkfsParams};
pub use vfs::file_table::{FileTable, VnodeHandle};
pub use vfs::types::{ContractViolation, VfsError, VfsResult};
