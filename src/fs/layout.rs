//! On-disk format shared by the kernel and the image builder.
//!
//! Block 0 is the boot block, block `DEV_OFFSET` the superblock. Then
//! `ninodes / IPB + 1` inode blocks, the free bitmap, `nblocks` data
//! blocks and finally `nlog` log blocks. Every integer is little-endian;
//! this module is the only place that converts.

use super::block_dev::BlockDevice;
use super::{FsError, FsResult};

pub const BSIZE: usize = 512;
pub const DEV_OFFSET: u32 = 1;
pub const ROOTINO: u32 = 1;

pub const NDIRECT: usize = 12;
pub const NINDIRECT: usize = BSIZE / 4;
pub const MAXFILE: usize = NDIRECT + NINDIRECT;

pub const DINODE_SIZE: usize = 64;
pub const IPB: u32 = (BSIZE / DINODE_SIZE) as u32;
pub const BPB: u32 = (BSIZE * 8) as u32;

pub const DIRSIZ: usize = 14;
pub const DIRENT_SIZE: usize = 2 + DIRSIZ;

pub type Block = [u8; BSIZE];

#[inline] fn ru16(b: &[u8], o: usize) -> u16 { u16::from_le_bytes([b[o], b[o + 1]]) }
#[inline] fn ru32(b: &[u8], o: usize) -> u32 { u32::from_le_bytes([b[o], b[o + 1], b[o + 2], b[o + 3]]) }
#[inline] fn wu16(b: &mut [u8], o: usize, v: u16) { b[o..o + 2].copy_from_slice(&v.to_le_bytes()); }
#[inline] fn wu32(b: &mut [u8], o: usize, v: u32) { b[o..o + 4].copy_from_slice(&v.to_le_bytes()); }

/// Block holding inode `inum`.
#[inline]
pub const fn iblock(inum: u32) -> u32 {
    inum / IPB + 1 + DEV_OFFSET
}

#[inline]
pub const fn inode_blocks(ninodes: u32) -> u32 {
    ninodes / IPB + 1
}

#[inline]
pub const fn bitmap_start(ninodes: u32) -> u32 {
    ninodes / IPB + 2 + DEV_OFFSET
}

#[inline]
pub const fn bitmap_blocks(size: u32) -> u32 {
    size / BPB + 1
}

/// Bitmap block holding the bit for block `b`.
#[inline]
pub const fn bblock(b: u32, ninodes: u32) -> u32 {
    b / BPB + bitmap_start(ninodes)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Superblock {
    pub size: u32,
    pub nblocks: u32,
    pub ninodes: u32,
    pub nlog: u32,
}

impl Superblock {
    pub fn decode(buf: &Block) -> Self {
        Self {
            size: ru32(buf, 0),
            nblocks: ru32(buf, 4),
            ninodes: ru32(buf, 8),
            nlog: ru32(buf, 12),
        }
    }

    pub fn encode(&self, buf: &mut Block) {
        wu32(buf, 0, self.size);
        wu32(buf, 4, self.nblocks);
        wu32(buf, 8, self.ninodes);
        wu32(buf, 12, self.nlog);
    }

    /// Boot, superblock, inode table and bitmap.
    pub fn metadata_blocks(&self) -> u32 {
        1 + DEV_OFFSET + inode_blocks(self.ninodes) + bitmap_blocks(self.size)
    }

    pub fn data_start(&self) -> u32 {
        self.metadata_blocks()
    }

    /// First block past the data region (start of the log).
    pub fn data_end(&self) -> u32 {
        self.metadata_blocks() + self.nblocks
    }

    pub fn is_consistent(&self) -> bool {
        self.ninodes > 0 && self.size == self.nblocks + self.metadata_blocks() + self.nlog
    }

    pub fn read<D: BlockDevice + ?Sized>(dev: &mut D) -> FsResult<Self> {
        let mut buf = [0u8; BSIZE];
        dev.read_block(DEV_OFFSET, &mut buf)?;
        Ok(Self::decode(&buf))
    }

    pub fn write<D: BlockDevice + ?Sized>(&self, dev: &mut D) -> FsResult<()> {
        let mut buf = [0u8; BSIZE];
        self.encode(&mut buf);
        dev.write_block(DEV_OFFSET, &buf)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i16)]
pub enum InodeType {
    #[default]
    Unused = 0,
    Dir = 1,
    File = 2,
    Dev = 3,
}

impl InodeType {
    pub fn from_raw(raw: i16) -> Option<Self> {
        match raw {
            0 => Some(Self::Unused),
            1 => Some(Self::Dir),
            2 => Some(Self::File),
            3 => Some(Self::Dev),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Unused => "unused",
            Self::Dir => "dir",
            Self::File => "file",
            Self::Dev => "dev",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiskInode {
    pub itype: InodeType,
    pub major: i16,
    pub minor: i16,
    pub nlink: i16,
    pub size: u32,
    /// `NDIRECT` direct slots, then the indirect block.
    pub addrs: [u32; NDIRECT + 1],
}

impl DiskInode {
    pub fn new(itype: InodeType) -> Self {
        Self { itype, nlink: 1, ..Self::default() }
    }

    pub fn decode(raw: &[u8]) -> FsResult<Self> {
        let itype = InodeType::from_raw(ru16(raw, 0) as i16).ok_or(FsError::Corrupted)?;
        let mut addrs = [0u32; NDIRECT + 1];
        for (i, a) in addrs.iter_mut().enumerate() {
            *a = ru32(raw, 12 + i * 4);
        }
        Ok(Self {
            itype,
            major: ru16(raw, 2) as i16,
            minor: ru16(raw, 4) as i16,
            nlink: ru16(raw, 6) as i16,
            size: ru32(raw, 8),
            addrs,
        })
    }

    pub fn encode(&self, raw: &mut [u8]) {
        wu16(raw, 0, self.itype as i16 as u16);
        wu16(raw, 2, self.major as u16);
        wu16(raw, 4, self.minor as u16);
        wu16(raw, 6, self.nlink as u16);
        wu32(raw, 8, self.size);
        for (i, a) in self.addrs.iter().enumerate() {
            wu32(raw, 12 + i * 4, *a);
        }
    }

    pub fn is_dir(&self) -> bool {
        self.itype == InodeType::Dir
    }

    pub fn read<D: BlockDevice + ?Sized>(dev: &mut D, inum: u32) -> FsResult<Self> {
        let mut buf = [0u8; BSIZE];
        dev.read_block(iblock(inum), &mut buf)?;
        let off = (inum % IPB) as usize * DINODE_SIZE;
        Self::decode(&buf[off..off + DINODE_SIZE])
    }

    pub fn write<D: BlockDevice + ?Sized>(&self, dev: &mut D, inum: u32) -> FsResult<()> {
        let bn = iblock(inum);
        let mut buf = [0u8; BSIZE];
        dev.read_block(bn, &mut buf)?;
        let off = (inum % IPB) as usize * DINODE_SIZE;
        self.encode(&mut buf[off..off + DINODE_SIZE]);
        dev.write_block(bn, &buf)
    }
}

/// Slot `index` of an indirect block.
pub fn indirect_entry(buf: &Block, index: usize) -> u32 {
    ru32(buf, index * 4)
}

pub fn set_indirect_entry(buf: &mut Block, index: usize, value: u32) {
    wu32(buf, index * 4, value);
}

#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Dirent {
    pub inum: u16,
    pub name: [u8; DIRSIZ],
}

impl Dirent {
    /// Names longer than `DIRSIZ` are cut, like `strncpy`.
    pub fn new(inum: u16, name: &str) -> Self {
        let mut de = Self { inum, name: [0; DIRSIZ] };
        let bytes = name.as_bytes();
        let len = bytes.len().min(DIRSIZ);
        de.name[..len].copy_from_slice(&bytes[..len]);
        de
    }

    pub fn decode(raw: &[u8]) -> Self {
        let mut name = [0u8; DIRSIZ];
        name.copy_from_slice(&raw[2..DIRENT_SIZE]);
        Self { inum: ru16(raw, 0), name }
    }

    pub fn encode(&self) -> [u8; DIRENT_SIZE] {
        let mut raw = [0u8; DIRENT_SIZE];
        wu16(&mut raw, 0, self.inum);
        raw[2..].copy_from_slice(&self.name);
        raw
    }

    pub fn name_bytes(&self) -> &[u8] {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(DIRSIZ);
        &self.name[..len]
    }

    pub fn name_str(&self) -> &str {
        core::str::from_utf8(self.name_bytes()).unwrap_or("?")
    }

    /// Compares the way a 14-byte `strncmp` does.
    pub fn name_eq(&self, name: &str) -> bool {
        let bytes = name.as_bytes();
        let bytes = &bytes[..bytes.len().min(DIRSIZ)];
        self.name_bytes() == bytes
    }

    pub fn is_empty(&self) -> bool {
        self.inum == 0
    }
}

impl core::fmt::Debug for Dirent {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "Dirent({} \"{}\")", self.inum, self.name_str())
    }
}
