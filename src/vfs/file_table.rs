//! The shared pool of open-file handles.
//!
//! The lock covers slot scans and reference counts only. Reads, writes
//! and teardown run on a snapshot taken under the lock, so one handle's
//! I/O never holds up another handle's allocation or close.

use alloc::sync::Arc;
use spin::Mutex;

use super::pipe::Pipe;
use super::types::*;
use super::vnode::{Backing, InodeBackend, Vnode, VnodeKind, VnodeOps};
use crate::fs::icache::InodeRef;

/// Opaque index of a live slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VnodeHandle(usize);

impl VnodeHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

struct Snapshot {
    kind:     VnodeKind,
    readable: bool,
    writable: bool,
    off:      u32,
    backing:  Backing,
    ops:      Option<Arc<dyn VnodeOps>>,
}

pub struct FileTable<const N: usize = NFILE> {
    slots: Mutex<[Vnode; N]>,
}

impl<const N: usize> FileTable<N> {
    pub const fn new() -> Self {
        Self { slots: Mutex::new([Vnode::EMPTY; N]) }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn in_use(&self) -> usize {
        self.slots.lock().iter().filter(|v| !v.is_free()).count()
    }

    pub fn refcount(&self, h: VnodeHandle) -> u32 {
        self.slots.lock().get(h.0).map_or(0, |v| v.refcnt)
    }

    pub fn kind(&self, h: VnodeHandle) -> VnodeKind {
        self.slots.lock().get(h.0).map_or(VnodeKind::Free, |v| v.kind)
    }

    /// Claims a free slot with one reference and zeroed state.
    pub fn allocate(&self) -> VfsResult<VnodeHandle> {
        let mut slots = self.slots.lock();
        for (i, v) in slots.iter_mut().enumerate() {
            if v.is_free() {
                v.reset();
                v.refcnt = 1;
                log::debug!("[ftable] alloc slot {}", i);
                return Ok(VnodeHandle(i));
            }
        }
        log::warn!("[ftable] all {} slots in use", N);
        Err(VfsError::TooManyOpenFiles)
    }

    /// Adds a reference. Duplicating an unreferenced slot is a contract
    /// violation.
    pub fn duplicate(&self, h: VnodeHandle) -> VfsResult<VnodeHandle> {
        let mut slots = self.slots.lock();
        match slots.get_mut(h.0) {
            Some(v) if v.refcnt >= 1 => {
                v.refcnt += 1;
                Ok(h)
            }
            _ => Err(ContractViolation::DupUnreferenced.into()),
        }
    }

    /// Drops a reference. The last one frees the slot and then, with the
    /// lock released, closes whatever backed it.
    pub fn close(&self, h: VnodeHandle) -> VfsResult<()> {
        let (kind, writable, backing, ops) = {
            let mut slots = self.slots.lock();
            let v = match slots.get_mut(h.0) {
                Some(v) if v.refcnt >= 1 => v,
                _ => return Err(ContractViolation::CloseUnreferenced.into()),
            };
            v.refcnt -= 1;
            if v.refcnt > 0 {
                return Ok(());
            }
            let snap = (
                v.kind,
                v.writable,
                core::mem::replace(&mut v.backing, Backing::None),
                v.ops.take(),
            );
            v.reset();
            snap
        };

        log::debug!("[ftable] release slot {} ({:?})", h.0, kind);
        if let Some(ops) = ops {
            ops.close();
            return Ok(());
        }
        match (kind, backing) {
            (VnodeKind::Pipe, Backing::Pipe(pipe)) => pipe.close(writable),
            (VnodeKind::Inode, Backing::Inode { fs, ino }) => fs.release(ino),
            _ => {}
        }
        Ok(())
    }

    fn snapshot(&self, h: VnodeHandle) -> VfsResult<Snapshot> {
        let slots = self.slots.lock();
        let v = match slots.get(h.0) {
            Some(v) if !v.is_free() => v,
            _ => return Err(VfsError::BadFd),
        };
        Ok(Snapshot {
            kind: v.kind,
            readable: v.readable,
            writable: v.writable,
            off: v.off,
            backing: v.backing.clone(),
            ops: v.ops.clone(),
        })
    }

    fn fill(&self, h: VnodeHandle, kind: VnodeKind, flags: OpenFlags, backing: Backing, ops: Option<Arc<dyn VnodeOps>>) {
        let mut slots = self.slots.lock();
        let v = &mut slots[h.0];
        v.kind = kind;
        v.readable = flags.readable();
        v.writable = flags.writable();
        v.off = 0;
        v.backing = backing;
        v.ops = ops;
    }

    fn do_read(s: &Snapshot, off: u32, buf: &mut [u8]) -> VfsResult<usize> {
        if !s.readable {
            return Err(VfsError::PermissionDenied);
        }
        if let Some(ops) = &s.ops {
            return ops.read(off, buf);
        }
        match (s.kind, &s.backing) {
            (VnodeKind::Pipe, Backing::Pipe(pipe)) => pipe.read(buf),
            (VnodeKind::Inode, Backing::Inode { fs, ino }) => fs.read(*ino, off, buf),
            _ => Err(ContractViolation::UnknownKind.into()),
        }
    }

    fn do_write(s: &Snapshot, off: u32, data: &[u8]) -> VfsResult<usize> {
        if !s.writable {
            return Err(VfsError::PermissionDenied);
        }
        if let Some(ops) = &s.ops {
            return ops.write(off, data);
        }
        match (s.kind, &s.backing) {
            (VnodeKind::Pipe, Backing::Pipe(pipe)) => pipe.write(data),
            (VnodeKind::Inode, Backing::Inode { fs, ino }) => fs.write(*ino, off, data),
            _ => Err(ContractViolation::UnknownKind.into()),
        }
    }

    pub fn read(&self, h: VnodeHandle, off: u32, buf: &mut [u8]) -> VfsResult<usize> {
        let s = self.snapshot(h)?;
        Self::do_read(&s, off, buf)
    }

    pub fn write(&self, h: VnodeHandle, off: u32, data: &[u8]) -> VfsResult<usize> {
        let s = self.snapshot(h)?;
        Self::do_write(&s, off, data)
    }

    fn advance(&self, h: VnodeHandle, s: &Snapshot, n: usize) {
        if s.kind == VnodeKind::Pipe {
            return;
        }
        let mut slots = self.slots.lock();
        if let Some(v) = slots.get_mut(h.0) {
            if !v.is_free() {
                v.off = v.off.wrapping_add(n as u32);
            }
        }
    }

    /// Reads at the handle's cursor and moves it past the bytes read.
    pub fn read_cursor(&self, h: VnodeHandle, buf: &mut [u8]) -> VfsResult<usize> {
        let s = self.snapshot(h)?;
        let n = Self::do_read(&s, s.off, buf)?;
        self.advance(h, &s, n);
        Ok(n)
    }

    pub fn write_cursor(&self, h: VnodeHandle, data: &[u8]) -> VfsResult<usize> {
        let s = self.snapshot(h)?;
        let n = Self::do_write(&s, s.off, data)?;
        self.advance(h, &s, n);
        Ok(n)
    }

    pub fn offset(&self, h: VnodeHandle) -> VfsResult<u32> {
        Ok(self.snapshot(h)?.off)
    }

    pub fn seek(&self, h: VnodeHandle, off: u32) -> VfsResult<()> {
        let mut slots = self.slots.lock();
        match slots.get_mut(h.0) {
            Some(v) if !v.is_free() && v.kind != VnodeKind::Pipe => {
                v.off = off;
                Ok(())
            }
            Some(v) if !v.is_free() => Err(VfsError::InvalidArgument),
            _ => Err(VfsError::BadFd),
        }
    }

    /// Metadata of an inode-backed handle.
    pub fn stat(&self, h: VnodeHandle) -> VfsResult<Stat> {
        match self.snapshot(h)?.backing {
            Backing::Inode { fs, ino } => fs.stat(ino),
            _ => Err(VfsError::NotSupported),
        }
    }

    pub fn readdir(&self, h: VnodeHandle, index: usize) -> VfsResult<Option<DirEntry>> {
        let s = self.snapshot(h)?;
        if let Some(ops) = &s.ops {
            return ops.readdir(index);
        }
        match s.backing {
            Backing::Inode { fs, ino } => fs.readdir(ino, index),
            _ => Err(VfsError::NotDirectory),
        }
    }

    /// Looks `name` up in a directory handle and opens the result read-only
    /// in a fresh slot.
    pub fn finddir(&self, h: VnodeHandle, name: &str) -> VfsResult<Option<VnodeHandle>> {
        let s = self.snapshot(h)?;
        let flags = OpenFlags(OpenFlags::RDONLY);
        if let Some(ops) = &s.ops {
            return match ops.finddir(name)? {
                Some(child) => self.install_ops(child, flags).map(Some),
                None => Ok(None),
            };
        }
        match s.backing {
            Backing::Inode { fs, ino } => match fs.lookup(ino, name)? {
                Some(child) => self.install_inode(fs, child, flags).map(Some),
                None => Ok(None),
            },
            _ => Err(VfsError::NotDirectory),
        }
    }

    /// Opens a handle on an inode reference the caller owns. The reference
    /// moves into the handle, or is released if no slot is free.
    pub fn install_inode(&self, fs: Arc<dyn InodeBackend>, ino: InodeRef, flags: OpenFlags) -> VfsResult<VnodeHandle> {
        let h = match self.allocate() {
            Ok(h) => h,
            Err(e) => {
                fs.release(ino);
                return Err(e);
            }
        };
        self.fill(h, VnodeKind::Inode, flags, Backing::Inode { fs, ino }, None);
        Ok(h)
    }

    /// Attaches a custom backend. The ops move into the handle; if no slot
    /// is free or their `open` refuses, they are closed and the slot goes
    /// back to the pool untouched.
    pub fn install_ops(&self, ops: Arc<dyn VnodeOps>, flags: OpenFlags) -> VfsResult<VnodeHandle> {
        let h = match self.allocate() {
            Ok(h) => h,
            Err(e) => {
                ops.close();
                return Err(e);
            }
        };
        if let Err(e) = ops.open(flags) {
            ops.close();
            self.close(h)?;
            return Err(e);
        }
        self.fill(h, VnodeKind::Inode, flags, Backing::None, Some(ops));
        Ok(h)
    }

    /// Resolves (or with `CREATE`, creates) `path` on `fs` and opens it.
    pub fn open_path(&self, fs: &Arc<dyn InodeBackend>, path: &str, flags: OpenFlags) -> VfsResult<VnodeHandle> {
        let h = self.allocate()?;

        let found = if flags.create() { fs.create(path) } else { fs.namei(path) };
        let ino = match found {
            Ok(ino) => ino,
            Err(e) => {
                self.close(h)?;
                return Err(e);
            }
        };

        let checked = match fs.is_dir(ino) {
            Ok(true) if flags.writable() => Err(VfsError::IsDirectory),
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        };
        if let Err(e) = checked {
            fs.release(ino);
            self.close(h)?;
            return Err(e);
        }

        self.fill(h, VnodeKind::Inode, flags, Backing::Inode { fs: fs.clone(), ino }, None);
        log::debug!("[vfs] open {} -> slot {}", path, h.0);
        Ok(h)
    }

    /// Returns `(read end, write end)` of a new pipe.
    pub fn pipe_alloc(&self) -> VfsResult<(VnodeHandle, VnodeHandle)> {
        let rd = self.allocate()?;
        let wr = match self.allocate() {
            Ok(wr) => wr,
            Err(e) => {
                self.close(rd)?;
                return Err(e);
            }
        };
        let pipe = Arc::new(Pipe::new());
        self.fill(rd, VnodeKind::Pipe, OpenFlags(OpenFlags::RDONLY), Backing::Pipe(pipe.clone()), None);
        self.fill(wr, VnodeKind::Pipe, OpenFlags(OpenFlags::WRONLY), Backing::Pipe(pipe), None);
        Ok((rd, wr))
    }
}

impl<const N: usize> Default for FileTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::block_dev::RamDisk;
    use crate::fs::inode_ops::Sfs;
    use crate::fs::layout::{InodeType, ROOTINO};
    use crate::mkfs::{ImageBuilder, MkfsParams};
    use crate::vfs::vnode::SfsRootOps;
    use core::sync::atomic::{AtomicUsize, Ordering};

    fn volume() -> (Arc<Sfs<RamDisk>>, Arc<dyn InodeBackend>) {
        let params = MkfsParams::default();
        let mut disk = RamDisk::new(params.size);
        let mut b = ImageBuilder::format(&mut disk, &params).unwrap();
        b.add_file(ROOTINO, "readme", b"hello sfs\n").unwrap();
        let bin = b.mkdir(ROOTINO, "bin").unwrap();
        b.finish_dir(bin).unwrap();
        b.finish().unwrap();
        let sfs = Arc::new(Sfs::mount(1, disk).unwrap());
        let backend: Arc<dyn InodeBackend> = sfs.clone();
        (sfs, backend)
    }

    #[derive(Default)]
    struct Counting {
        closes: AtomicUsize,
    }

    impl VnodeOps for Counting {
        fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }

        fn read(&self, off: u32, buf: &mut [u8]) -> VfsResult<usize> {
            buf.fill(off as u8);
            Ok(buf.len())
        }
    }

    struct Refuses;

    impl VnodeOps for Refuses {
        fn open(&self, _flags: OpenFlags) -> VfsResult<()> {
            Err(VfsError::PermissionDenied)
        }
    }

    #[test]
    fn capacity_exhaustion_and_reuse() {
        let table: FileTable<4> = FileTable::new();
        let handles: Vec<_> = (0..4).map(|_| table.allocate().unwrap()).collect();
        assert_eq!(table.allocate(), Err(VfsError::TooManyOpenFiles));
        table.close(handles[2]).unwrap();
        assert_eq!(table.allocate().unwrap(), handles[2]);
        assert_eq!(table.in_use(), 4);
    }

    #[test]
    fn duplicate_keeps_backing_until_last_close() {
        let table: FileTable<8> = FileTable::new();
        let ops = Arc::new(Counting::default());
        let h = table.install_ops(ops.clone(), OpenFlags(OpenFlags::RDONLY)).unwrap();
        assert_eq!(table.duplicate(h).unwrap(), h);
        assert_eq!(table.refcount(h), 2);

        table.close(h).unwrap();
        assert_eq!(ops.closes.load(Ordering::SeqCst), 0);
        let mut buf = [0u8; 3];
        assert_eq!(table.read(h, 9, &mut buf).unwrap(), 3);
        assert_eq!(buf, [9, 9, 9]);

        table.close(h).unwrap();
        assert_eq!(ops.closes.load(Ordering::SeqCst), 1);
        assert_eq!(table.kind(h), VnodeKind::Free);
        assert_eq!(table.read(h, 0, &mut buf), Err(VfsError::BadFd));
    }

    #[test]
    fn refcount_underflow_is_a_violation() {
        let table: FileTable<2> = FileTable::new();
        let h = table.allocate().unwrap();
        table.close(h).unwrap();

        let dup = table.duplicate(h).unwrap_err();
        assert_eq!(dup, VfsError::Violation(ContractViolation::DupUnreferenced));
        assert!(dup.is_fatal());
        let close = table.close(h).unwrap_err();
        assert_eq!(close, VfsError::Violation(ContractViolation::CloseUnreferenced));
        assert!(table.close(VnodeHandle(17)).unwrap_err().is_fatal());
    }

    #[test]
    fn dispatch_on_free_kind_is_a_violation() {
        let table: FileTable<2> = FileTable::new();
        let h = table.allocate().unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(table.read(h, 0, &mut buf), Err(VfsError::PermissionDenied));

        table.slots.lock()[h.0].readable = true;
        assert_eq!(
            table.read(h, 0, &mut buf),
            Err(VfsError::Violation(ContractViolation::UnknownKind))
        );
    }

    #[test]
    fn failed_custom_open_returns_the_slot() {
        let table: FileTable<2> = FileTable::new();
        let err = table.install_ops(Arc::new(Refuses), OpenFlags(OpenFlags::RDONLY));
        assert_eq!(err, Err(VfsError::PermissionDenied));
        assert_eq!(table.in_use(), 0);
    }

    #[test]
    fn custom_ops_default_to_not_supported() {
        let table: FileTable<2> = FileTable::new();
        let h = table.install_ops(Arc::new(Counting::default()), OpenFlags(OpenFlags::RDWR)).unwrap();
        assert_eq!(table.write(h, 0, b"x"), Err(VfsError::NotSupported));
        assert_eq!(table.readdir(h, 0), Err(VfsError::NotSupported));
        assert_eq!(table.finddir(h, "x"), Err(VfsError::NotSupported));
        assert_eq!(table.stat(h), Err(VfsError::NotSupported));
    }

    #[test]
    fn pipe_ends_follow_their_flags() {
        let table: FileTable<4> = FileTable::new();
        let (rd, wr) = table.pipe_alloc().unwrap();
        let mut buf = [0u8; 16];

        assert_eq!(table.write(rd, 0, b"x"), Err(VfsError::PermissionDenied));
        assert_eq!(table.read(wr, 0, &mut buf), Err(VfsError::PermissionDenied));
        assert_eq!(table.read(rd, 0, &mut buf), Err(VfsError::WouldBlock));

        assert_eq!(table.write_cursor(wr, b"ping").unwrap(), 4);
        let extra = table.duplicate(wr).unwrap();
        table.close(wr).unwrap();
        assert_eq!(table.write(extra, 0, b"!").unwrap(), 1);
        assert_eq!(table.read_cursor(rd, &mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"ping!");

        table.close(extra).unwrap();
        assert_eq!(table.read(rd, 0, &mut buf).unwrap(), 0);
        assert_eq!(table.stat(rd), Err(VfsError::NotSupported));
        table.close(rd).unwrap();
        assert_eq!(table.in_use(), 0);
    }

    #[test]
    fn write_to_pipe_without_reader_is_broken() {
        let table: FileTable<4> = FileTable::new();
        let (rd, wr) = table.pipe_alloc().unwrap();
        table.close(rd).unwrap();
        assert_eq!(table.write(wr, 0, b"x"), Err(VfsError::BrokenPipe));
    }

    #[test]
    fn pipe_alloc_needs_two_slots() {
        let table: FileTable<3> = FileTable::new();
        let _keep = table.allocate().unwrap();
        let _keep2 = table.allocate().unwrap();
        assert_eq!(table.pipe_alloc(), Err(VfsError::TooManyOpenFiles));
        assert_eq!(table.in_use(), 2);
    }

    #[test]
    fn open_create_write_and_read_back() {
        let (sfs, fs) = volume();
        let table: FileTable = FileTable::new();
        assert_eq!(table.capacity(), NFILE);

        let flags = OpenFlags(OpenFlags::CREATE | OpenFlags::RDWR);
        let h = table.open_path(&fs, "/log.txt", flags).unwrap();
        assert_eq!(table.write_cursor(h, b"first ").unwrap(), 6);
        assert_eq!(table.write_cursor(h, b"second").unwrap(), 6);
        assert_eq!(table.offset(h).unwrap(), 12);

        table.seek(h, 0).unwrap();
        let mut buf = [0u8; 32];
        assert_eq!(table.read_cursor(h, &mut buf).unwrap(), 12);
        assert_eq!(&buf[..12], b"first second");
        assert_eq!(table.read_cursor(h, &mut buf).unwrap(), 0);

        let st = table.stat(h).unwrap();
        assert_eq!((st.dev, st.kind, st.size, st.nlink), (1, InodeType::File, 12, 1));
        table.close(h).unwrap();
        assert_eq!(sfs.icache().in_use(), 0);
    }

    #[test]
    fn open_flag_checks() {
        let (sfs, fs) = volume();
        let table: FileTable<4> = FileTable::new();

        let ro = table.open_path(&fs, "/readme", OpenFlags(OpenFlags::RDONLY)).unwrap();
        assert_eq!(table.write(ro, 0, b"x"), Err(VfsError::PermissionDenied));
        let mut buf = [0u8; 5];
        assert_eq!(table.read(ro, 6, &mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"sfs\n");
        table.close(ro).unwrap();

        let wr = OpenFlags(OpenFlags::WRONLY);
        assert_eq!(table.open_path(&fs, "/bin", wr), Err(VfsError::IsDirectory));
        assert_eq!(table.open_path(&fs, "/missing", wr), Err(VfsError::NotFound));
        assert_eq!(table.in_use(), 0);
        assert_eq!(sfs.icache().in_use(), 0);
    }

    #[test]
    fn directory_handles_enumerate_and_find() {
        let (sfs, fs) = volume();
        let table: FileTable<4> = FileTable::new();
        let root = table.open_path(&fs, "/", OpenFlags(OpenFlags::RDONLY)).unwrap();

        let names: Vec<_> = (0..)
            .map_while(|i| table.readdir(root, i).unwrap())
            .map(|e| (e.get_name().to_string(), e.inum))
            .collect();
        assert_eq!(names[0], (".".to_string(), ROOTINO));
        assert_eq!(names[1], ("..".to_string(), ROOTINO));
        assert!(names.iter().any(|(n, _)| n == "readme"));
        assert!(names.iter().any(|(n, _)| n == "bin"));

        let child = table.finddir(root, "readme").unwrap().unwrap();
        let mut buf = [0u8; 5];
        assert_eq!(table.read(child, 0, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");
        assert_eq!(table.finddir(root, "nothing").unwrap(), None);
        assert_eq!(table.readdir(child, 0), Err(VfsError::NotDirectory));

        table.close(child).unwrap();
        table.close(root).unwrap();
        assert_eq!(sfs.icache().in_use(), 0);
    }

    #[test]
    fn sfs_root_as_custom_backend() {
        let (sfs, fs) = volume();
        let table: FileTable<4> = FileTable::new();
        let refused = Arc::new(SfsRootOps::root(fs.clone()).unwrap());
        assert_eq!(
            table.install_ops(refused, OpenFlags(OpenFlags::RDWR)),
            Err(VfsError::IsDirectory)
        );
        assert_eq!(sfs.icache().in_use(), 0);

        let ops = Arc::new(SfsRootOps::root(fs.clone()).unwrap());
        let root = table.install_ops(ops, OpenFlags(OpenFlags::RDONLY)).unwrap();

        let first = table.readdir(root, 0).unwrap().unwrap();
        assert_eq!(first.get_name(), ".");
        let readme = table.finddir(root, "readme").unwrap().unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(table.read(readme, 0, &mut buf).unwrap(), 10);
        assert_eq!(table.stat(readme), Err(VfsError::NotSupported));

        table.close(readme).unwrap();
        table.close(root).unwrap();
        assert_eq!(sfs.icache().in_use(), 0);
    }

    #[test]
    fn finddir_on_a_full_table_gives_the_child_back() {
        let (sfs, fs) = volume();
        let table: FileTable<1> = FileTable::new();
        let ops = Arc::new(SfsRootOps::root(fs.clone()).unwrap());
        let root = table.install_ops(ops, OpenFlags(OpenFlags::RDONLY)).unwrap();

        for _ in 0..60 {
            assert_eq!(table.finddir(root, "readme"), Err(VfsError::TooManyOpenFiles));
        }
        assert_eq!(sfs.icache().in_use(), 1);

        table.close(root).unwrap();
        assert_eq!(sfs.icache().in_use(), 0);
    }

    #[test]
    fn refused_or_unplaced_ops_are_closed() {
        let table: FileTable<1> = FileTable::new();
        let ops = Arc::new(Counting::default());
        let h = table.install_ops(ops.clone(), OpenFlags(OpenFlags::RDONLY)).unwrap();

        let extra = Arc::new(Counting::default());
        assert_eq!(
            table.install_ops(extra.clone(), OpenFlags(OpenFlags::RDONLY)),
            Err(VfsError::TooManyOpenFiles)
        );
        assert_eq!(extra.closes.load(Ordering::SeqCst), 1);
        assert_eq!(ops.closes.load(Ordering::SeqCst), 0);
        table.close(h).unwrap();
    }

    #[test]
    fn concurrent_allocate_and_close() {
        let table: Arc<FileTable<8>> = Arc::new(FileTable::new());
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let table = table.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        let h = table.allocate().unwrap();
                        let d = table.duplicate(h).unwrap();
                        table.close(d).unwrap();
                        table.close(h).unwrap();
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }
        assert_eq!(table.in_use(), 0);
    }
}
