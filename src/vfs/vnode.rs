use alloc::sync::Arc;

use super::pipe::Pipe;
use super::types::*;
use crate::fs::icache::InodeRef;

/// What a live slot is backed by. A slot with custom ops keeps the
/// `Inode` kind but is dispatched through the ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VnodeKind {
    Free = 0,
    Pipe = 1,
    Inode = 2,
}

/// The default inode backend a handle forwards to when it has no custom
/// ops. Inode references handed out here are owned by the receiver and
/// given back through `release`.
pub trait InodeBackend: Send + Sync {
    fn dev_id(&self) -> u32;
    fn root(&self) -> VfsResult<InodeRef>;
    fn namei(&self, path: &str) -> VfsResult<InodeRef>;
    /// Creates a regular file, or returns the one already there.
    fn create(&self, path: &str) -> VfsResult<InodeRef>;
    fn lookup(&self, dir: InodeRef, name: &str) -> VfsResult<Option<InodeRef>>;
    fn is_dir(&self, ino: InodeRef) -> VfsResult<bool>;
    fn read(&self, ino: InodeRef, off: u32, buf: &mut [u8]) -> VfsResult<usize>;
    fn write(&self, ino: InodeRef, off: u32, data: &[u8]) -> VfsResult<usize>;
    fn stat(&self, ino: InodeRef) -> VfsResult<Stat>;
    fn readdir(&self, dir: InodeRef, index: usize) -> VfsResult<Option<DirEntry>>;
    fn release(&self, ino: InodeRef);
}

/// Operation table a pluggable backend attaches to a handle. Anything a
/// backend leaves out reports `NotSupported`.
pub trait VnodeOps: Send + Sync {
    fn open(&self, _flags: OpenFlags) -> VfsResult<()> {
        Ok(())
    }

    fn close(&self) {}

    fn read(&self, _off: u32, _buf: &mut [u8]) -> VfsResult<usize> {
        Err(VfsError::NotSupported)
    }

    fn write(&self, _off: u32, _data: &[u8]) -> VfsResult<usize> {
        Err(VfsError::NotSupported)
    }

    fn readdir(&self, _index: usize) -> VfsResult<Option<DirEntry>> {
        Err(VfsError::NotSupported)
    }

    fn finddir(&self, _name: &str) -> VfsResult<Option<Arc<dyn VnodeOps>>> {
        Err(VfsError::NotSupported)
    }
}

#[derive(Clone)]
pub enum Backing {
    None,
    Pipe(Arc<Pipe>),
    Inode { fs: Arc<dyn InodeBackend>, ino: InodeRef },
}

pub struct Vnode {
    pub kind: VnodeKind,
    pub refcnt: u32,
    pub readable: bool,
    pub writable: bool,
    pub off: u32,
    pub backing: Backing,
    pub ops: Option<Arc<dyn VnodeOps>>,
}

impl Vnode {
    pub const EMPTY: Self = Self::empty();

    pub const fn empty() -> Self {
        Self {
            kind: VnodeKind::Free,
            refcnt: 0,
            readable: false,
            writable: false,
            off: 0,
            backing: Backing::None,
            ops: None,
        }
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        self.refcnt == 0
    }

    pub fn reset(&mut self) {
        *self = Self::empty();
    }
}

/// Exposes one inode of a mounted volume as a custom backend; lookups
/// hand out further `SfsRootOps` for the children. Each value owns one
/// inode reference, given back on `close`.
pub struct SfsRootOps {
    fs: Arc<dyn InodeBackend>,
    ino: InodeRef,
}

impl SfsRootOps {
    pub fn new(fs: Arc<dyn InodeBackend>, ino: InodeRef) -> Self {
        Self { fs, ino }
    }

    pub fn root(fs: Arc<dyn InodeBackend>) -> VfsResult<Self> {
        let ino = fs.root()?;
        Ok(Self { fs, ino })
    }

    pub fn inode(&self) -> InodeRef {
        self.ino
    }
}

impl VnodeOps for SfsRootOps {
    fn open(&self, flags: OpenFlags) -> VfsResult<()> {
        if flags.writable() && self.fs.is_dir(self.ino)? {
            return Err(VfsError::IsDirectory);
        }
        Ok(())
    }

    fn close(&self) {
        self.fs.release(self.ino);
    }

    fn read(&self, off: u32, buf: &mut [u8]) -> VfsResult<usize> {
        self.fs.read(self.ino, off, buf)
    }

    fn write(&self, off: u32, data: &[u8]) -> VfsResult<usize> {
        self.fs.write(self.ino, off, data)
    }

    fn readdir(&self, index: usize) -> VfsResult<Option<DirEntry>> {
        self.fs.readdir(self.ino, index)
    }

    fn finddir(&self, name: &str) -> VfsResult<Option<Arc<dyn VnodeOps>>> {
        Ok(self
            .fs
            .lookup(self.ino, name)?
            .map(|child| Arc::new(SfsRootOps::new(self.fs.clone(), child)) as Arc<dyn VnodeOps>))
    }
}
