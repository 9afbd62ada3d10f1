//! Logical-to-physical block translation.
//!
//! The first `NDIRECT` blocks of a file are listed in `addrs[..NDIRECT]`,
//! the next `NINDIRECT` in the block named by `addrs[NDIRECT]`. A zero slot
//! is unallocated. The kernel and the image builder both grow files
//! through here, so the layout they produce is identical.

use super::block_dev::BlockDevice;
use super::layout::{
    indirect_entry, set_indirect_entry, DiskInode, BSIZE, MAXFILE, NDIRECT, NINDIRECT,
};
use super::{FsError, FsResult};

/// Source of fresh data blocks. Returned blocks must read back as zeros.
pub trait BlockAlloc {
    fn alloc_block(&mut self, dev: &mut dyn BlockDevice) -> FsResult<u32>;
}

/// Physical block backing logical block `bn` of inode `inum`.
///
/// Without an allocator a hole yields `Ok(0)`. With one, every slot that
/// gets filled (inode record or indirect block) is written back before
/// returning.
pub fn translate(
    dev: &mut dyn BlockDevice,
    mut alloc: Option<&mut dyn BlockAlloc>,
    inum: u32,
    din: &mut DiskInode,
    bn: u32,
) -> FsResult<u32> {
    let bn = bn as usize;

    if bn < NDIRECT {
        let addr = din.addrs[bn];
        if addr != 0 {
            return Ok(addr);
        }
        let Some(alloc) = alloc else {
            return Ok(0);
        };
        let addr = alloc.alloc_block(dev)?;
        din.addrs[bn] = addr;
        din.write(dev, inum)?;
        log::trace!("[bmap] ino {} direct {} -> {}", inum, bn, addr);
        return Ok(addr);
    }

    let index = bn - NDIRECT;
    if index >= NINDIRECT {
        return Err(FsError::FileTooLarge);
    }

    let mut indirect = din.addrs[NDIRECT];
    if indirect == 0 {
        let Some(alloc) = alloc.as_deref_mut() else {
            return Ok(0);
        };
        indirect = alloc.alloc_block(dev)?;
        din.addrs[NDIRECT] = indirect;
        din.write(dev, inum)?;
        log::trace!("[bmap] ino {} indirect block {}", inum, indirect);
    }

    let mut buf = [0u8; BSIZE];
    dev.read_block(indirect, &mut buf)?;
    let addr = indirect_entry(&buf, index);
    if addr != 0 {
        return Ok(addr);
    }
    let Some(alloc) = alloc else {
        return Ok(0);
    };
    let addr = alloc.alloc_block(dev)?;
    set_indirect_entry(&mut buf, index, addr);
    dev.write_block(indirect, &buf)?;
    log::trace!("[bmap] ino {} indirect[{}] -> {}", inum, index, addr);
    Ok(addr)
}

/// Copies file bytes starting at `off` into `buf`, stopping at EOF.
/// Unallocated blocks read as zeros.
pub fn read_data(
    dev: &mut dyn BlockDevice,
    inum: u32,
    din: &mut DiskInode,
    off: u32,
    buf: &mut [u8],
) -> FsResult<usize> {
    let size = din.size;
    if off >= size {
        return Ok(0);
    }
    let to_read = buf.len().min((size - off) as usize);
    let mut block = [0u8; BSIZE];
    let mut done = 0usize;

    while done < to_read {
        let pos = off as usize + done;
        let block_off = pos % BSIZE;
        let chunk = (BSIZE - block_off).min(to_read - done);

        let phys = translate(dev, None, inum, din, (pos / BSIZE) as u32)?;
        if phys == 0 {
            buf[done..done + chunk].fill(0);
        } else {
            dev.read_block(phys, &mut block)?;
            buf[done..done + chunk].copy_from_slice(&block[block_off..block_off + chunk]);
        }
        done += chunk;
    }

    Ok(done)
}

/// Writes `data` at `off`, allocating blocks as needed, and grows the
/// recorded size. Refuses up front anything reaching past `MAXFILE`.
pub fn write_data(
    dev: &mut dyn BlockDevice,
    alloc: &mut dyn BlockAlloc,
    inum: u32,
    din: &mut DiskInode,
    off: u32,
    data: &[u8],
) -> FsResult<usize> {
    let end = off as usize + data.len();
    if end > MAXFILE * BSIZE {
        return Err(FsError::FileTooLarge);
    }

    let mut block = [0u8; BSIZE];
    let mut done = 0usize;

    while done < data.len() {
        let pos = off as usize + done;
        let block_off = pos % BSIZE;
        let chunk = (BSIZE - block_off).min(data.len() - done);

        let phys = translate(dev, Some(&mut *alloc), inum, din, (pos / BSIZE) as u32)?;
        if chunk < BSIZE {
            dev.read_block(phys, &mut block)?;
        }
        block[block_off..block_off + chunk].copy_from_slice(&data[done..done + chunk]);
        dev.write_block(phys, &block)?;
        done += chunk;
    }

    if end as u32 > din.size {
        din.size = end as u32;
    }
    din.write(dev, inum)?;
    Ok(done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::block_dev::RamDisk;
    use crate::fs::layout::InodeType;
    use alloc::vec::Vec;

    const INUM: u32 = 1;
    const FIRST_DATA: u32 = 40;

    struct Bump {
        next: u32,
        end: u32,
    }

    impl BlockAlloc for Bump {
        fn alloc_block(&mut self, _dev: &mut dyn BlockDevice) -> FsResult<u32> {
            if self.next >= self.end {
                return Err(FsError::NoSpace);
            }
            self.next += 1;
            Ok(self.next - 1)
        }
    }

    fn setup() -> (RamDisk, Bump, DiskInode) {
        let mut disk = RamDisk::new(400);
        let din = DiskInode::new(InodeType::File);
        din.write(&mut disk, INUM).unwrap();
        (disk, Bump { next: FIRST_DATA, end: 400 }, din)
    }

    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
    }

    fn append_then_read(start_block: usize, len: usize) {
        let (mut disk, mut alloc, mut din) = setup();
        if start_block > 0 {
            let filler = pattern(start_block * BSIZE, 1);
            write_data(&mut disk, &mut alloc, INUM, &mut din, 0, &filler).unwrap();
        }
        let data = pattern(len, 7);
        let off = din.size;
        assert_eq!(write_data(&mut disk, &mut alloc, INUM, &mut din, off, &data).unwrap(), len);

        let mut on_disk = DiskInode::read(&mut disk, INUM).unwrap();
        assert_eq!(on_disk, din);
        let mut back = vec![0u8; len];
        assert_eq!(read_data(&mut disk, INUM, &mut on_disk, off, &mut back).unwrap(), len);
        assert_eq!(back, data);
    }

    #[test]
    fn round_trip_within_direct_blocks() {
        append_then_read(0, 3 * BSIZE + 100);
    }

    #[test]
    fn round_trip_across_indirect_boundary() {
        append_then_read(NDIRECT - 1, 2 * BSIZE);
    }

    #[test]
    fn round_trip_inside_indirect_region() {
        append_then_read(NDIRECT + 3, 5 * BSIZE + 17);
    }

    #[test]
    fn lookup_never_allocates() {
        let (mut disk, _, mut din) = setup();
        assert_eq!(translate(&mut disk, None, INUM, &mut din, 0).unwrap(), 0);
        assert_eq!(translate(&mut disk, None, INUM, &mut din, NDIRECT as u32 + 4).unwrap(), 0);
        assert_eq!(din.addrs, [0; NDIRECT + 1]);
    }

    #[test]
    fn allocation_is_written_back_immediately() {
        let (mut disk, mut alloc, mut din) = setup();
        let bn = NDIRECT as u32 + 2;
        let phys = translate(&mut disk, Some(&mut alloc), INUM, &mut din, bn).unwrap();

        let on_disk = DiskInode::read(&mut disk, INUM).unwrap();
        let indirect = on_disk.addrs[NDIRECT];
        assert_eq!(indirect, FIRST_DATA);
        assert_eq!(phys, FIRST_DATA + 1);

        let mut buf = [0u8; BSIZE];
        disk.read_block(indirect, &mut buf).unwrap();
        assert_eq!(indirect_entry(&buf, 2), phys);
        assert_eq!(indirect_entry(&buf, 0), 0);
        assert_eq!(translate(&mut disk, None, INUM, &mut din, bn).unwrap(), phys);
    }

    #[test]
    fn maxfile_is_the_hard_limit() {
        let (mut disk, mut alloc, mut din) = setup();
        let full = pattern(MAXFILE * BSIZE, 3);
        write_data(&mut disk, &mut alloc, INUM, &mut din, 0, &full).unwrap();
        assert_eq!(din.size as usize, MAXFILE * BSIZE);

        let one_more = pattern(BSIZE, 9);
        let size = din.size;
        assert_eq!(
            write_data(&mut disk, &mut alloc, INUM, &mut din, size, &one_more),
            Err(FsError::FileTooLarge)
        );
        assert_eq!(
            translate(&mut disk, Some(&mut alloc), INUM, &mut din, MAXFILE as u32),
            Err(FsError::FileTooLarge)
        );
        assert_eq!(din.size as usize, MAXFILE * BSIZE);
    }

    #[test]
    fn holes_read_as_zeros() {
        let (mut disk, mut alloc, mut din) = setup();
        write_data(&mut disk, &mut alloc, INUM, &mut din, 2 * BSIZE as u32, b"tail").unwrap();
        assert_eq!(din.addrs[0], 0);
        let mut buf = vec![0xFFu8; 2 * BSIZE + 4];
        assert_eq!(read_data(&mut disk, INUM, &mut din, 0, &mut buf).unwrap(), buf.len());
        assert!(buf[..2 * BSIZE].iter().all(|&b| b == 0));
        assert_eq!(&buf[2 * BSIZE..], b"tail");
    }
}
