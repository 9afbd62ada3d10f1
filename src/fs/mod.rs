pub mod bitmap;
pub mod block_dev;
pub mod bmap;
pub mod icache;
pub mod inode_ops;
pub mod layout;

pub type FsResult<T> = Result<T, FsError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    IoError,
    BadBlock,
    InvalidInode,
    FileTooLarge,
    NoSpace,
    NoInodes,
    NotDirectory,
    NotFound,
    AlreadyExists,
    NameTooLong,
    Corrupted,
}

impl FsError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IoError => "I/O error",
            Self::BadBlock => "block out of range",
            Self::InvalidInode => "invalid inode",
            Self::FileTooLarge => "file too large",
            Self::NoSpace => "no free blocks",
            Self::NoInodes => "no free inodes",
            Self::NotDirectory => "not a directory",
            Self::NotFound => "not found",
            Self::AlreadyExists => "already exists",
            Self::NameTooLong => "name too long",
            Self::Corrupted => "filesystem corrupted",
        }
    }
}

impl core::fmt::Display for FsError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
