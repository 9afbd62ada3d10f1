use crate::fs::layout::{InodeType, DIRSIZ};
use crate::fs::FsError;

pub const NFILE: usize = 100;
pub const NINODE: usize = 50;
pub const PIPESIZE: usize = 512;

pub type VfsResult<T> = Result<T, VfsError>;

/// A caller broke the handle or geometry protocol. Never recovered from:
/// whoever receives one stops what it was doing and halts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractViolation {
    DupUnreferenced,
    CloseUnreferenced,
    UnknownKind,
    GeometryMismatch { size: u32, computed: u64 },
    RootMisplaced { inum: u32 },
}

impl ContractViolation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DupUnreferenced => "filedup on unreferenced handle",
            Self::CloseUnreferenced => "fileclose on unreferenced handle",
            Self::UnknownKind => "dispatch on unknown handle kind",
            Self::GeometryMismatch { .. } => "volume geometry does not add up",
            Self::RootMisplaced { .. } => "root directory not at the root inode",
        }
    }

    pub fn halt(self) -> ! {
        log::error!("[vfs] fatal: {}", self);
        panic!("{}", self)
    }
}

impl core::fmt::Display for ContractViolation {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            Self::GeometryMismatch { size, computed } => {
                write!(f, "{}: size {} != computed {}", self.as_str(), size, computed)
            }
            Self::RootMisplaced { inum } => write!(f, "{}: got inode {}", self.as_str(), inum),
            _ => write!(f, "{}", self.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VfsError {
    NotFound,
    PermissionDenied,
    AlreadyExists,
    NotDirectory,
    IsDirectory,
    NoSpace,
    NoInodes,
    IoError,
    NameTooLong,
    InvalidArgument,
    NotSupported,
    BadFd,
    TooManyOpenFiles,
    WouldBlock,
    FileTooLarge,
    Corrupted,
    BrokenPipe,
    Violation(ContractViolation),
}

impl VfsError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not found",
            Self::PermissionDenied => "permission denied",
            Self::AlreadyExists => "already exists",
            Self::NotDirectory => "not a directory",
            Self::IsDirectory => "is a directory",
            Self::NoSpace => "no space left",
            Self::NoInodes => "no free inodes",
            Self::IoError => "I/O error",
            Self::NameTooLong => "name too long",
            Self::InvalidArgument => "invalid argument",
            Self::NotSupported => "not supported",
            Self::BadFd => "bad file descriptor",
            Self::TooManyOpenFiles => "too many open files",
            Self::WouldBlock => "would block",
            Self::FileTooLarge => "file too large",
            Self::Corrupted => "data corrupted",
            Self::BrokenPipe => "broken pipe",
            Self::Violation(v) => v.as_str(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Violation(_))
    }
}

impl core::fmt::Display for VfsError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            Self::Violation(v) => write!(f, "{}", v),
            _ => write!(f, "{}", self.as_str()),
        }
    }
}

impl From<FsError> for VfsError {
    fn from(e: FsError) -> Self {
        match e {
            FsError::IoError | FsError::BadBlock => Self::IoError,
            FsError::InvalidInode | FsError::Corrupted => Self::Corrupted,
            FsError::FileTooLarge => Self::FileTooLarge,
            FsError::NoSpace => Self::NoSpace,
            FsError::NoInodes => Self::NoInodes,
            FsError::NotDirectory => Self::NotDirectory,
            FsError::NotFound => Self::NotFound,
            FsError::AlreadyExists => Self::AlreadyExists,
            FsError::NameTooLong => Self::NameTooLong,
        }
    }
}

impl From<ContractViolation> for VfsError {
    fn from(v: ContractViolation) -> Self {
        Self::Violation(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags(pub u32);

impl OpenFlags {
    pub const RDONLY: u32 = 0x000;
    pub const WRONLY: u32 = 0x001;
    pub const RDWR: u32 = 0x002;
    pub const CREATE: u32 = 0x200;

    #[inline] pub const fn has(&self, flag: u32) -> bool { self.0 & flag != 0 }
    #[inline] pub const fn readable(&self) -> bool { !self.has(Self::WRONLY) }
    #[inline] pub const fn writable(&self) -> bool { self.has(Self::WRONLY) || self.has(Self::RDWR) }
    #[inline] pub const fn create(&self) -> bool { self.has(Self::CREATE) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub dev: u32,
    pub ino: u32,
    pub kind: InodeType,
    pub nlink: i16,
    pub size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    pub name: [u8; DIRSIZ],
    pub name_len: u8,
    pub inum: u32,
}

impl DirEntry {
    pub fn from_name(nm: &[u8], inum: u32) -> Self {
        let mut name = [0u8; DIRSIZ];
        let len = nm.len().min(DIRSIZ);
        name[..len].copy_from_slice(&nm[..len]);
        Self { name, name_len: len as u8, inum }
    }

    pub fn get_name(&self) -> &str {
        core::str::from_utf8(&self.name[..self.name_len as usize]).unwrap_or("")
    }
}
