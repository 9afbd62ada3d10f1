use super::block_dev::BlockDevice;
use super::bmap::BlockAlloc;
use super::layout::{bblock, Superblock, BPB, BSIZE};
use super::{FsError, FsResult};

/// Kernel-side allocator: first clear bit in the free bitmap, limited to
/// the data region so the log is never handed out.
pub struct BitmapAlloc<'a> {
    sb: &'a Superblock,
}

impl<'a> BitmapAlloc<'a> {
    pub fn new(sb: &'a Superblock) -> Self {
        Self { sb }
    }
}

impl BlockAlloc for BitmapAlloc<'_> {
    fn alloc_block(&mut self, dev: &mut dyn BlockDevice) -> FsResult<u32> {
        let limit = self.sb.data_end();
        let mut buf = [0u8; BSIZE];

        let mut base = 0u32;
        while base < limit {
            let bn = bblock(base, self.sb.ninodes);
            dev.read_block(bn, &mut buf)?;

            for bit in 0..BPB.min(limit - base) {
                let byte = (bit / 8) as usize;
                let mask = 1u8 << (bit % 8);
                if buf[byte] & mask == 0 {
                    buf[byte] |= mask;
                    dev.write_block(bn, &buf)?;
                    let block = base + bit;
                    dev.zero_block(block)?;
                    log::trace!("[balloc] block {}", block);
                    return Ok(block);
                }
            }
            base += BPB;
        }

        log::warn!("[balloc] out of blocks");
        Err(FsError::NoSpace)
    }
}

pub fn is_allocated<D: BlockDevice + ?Sized>(dev: &mut D, sb: &Superblock, block: u32) -> FsResult<bool> {
    let mut buf = [0u8; BSIZE];
    dev.read_block(bblock(block, sb.ninodes), &mut buf)?;
    let bit = block % BPB;
    Ok(buf[(bit / 8) as usize] & (1 << (bit % 8)) != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::block_dev::RamDisk;
    use crate::mkfs::{ImageBuilder, MkfsParams};

    #[test]
    fn allocates_first_free_data_block_and_zeroes_it() {
        let params = MkfsParams::default();
        let mut disk = RamDisk::new(params.size);
        let builder = ImageBuilder::format(&mut disk, &params).unwrap();
        let used = builder.finish().unwrap().used_blocks;

        let sb = Superblock::read(&mut disk).unwrap();
        disk.write_block(used, &[0x55; BSIZE]).unwrap();

        let mut alloc = BitmapAlloc::new(&sb);
        let b = alloc.alloc_block(&mut disk).unwrap();
        assert_eq!(b, used);
        assert!(is_allocated(&mut disk, &sb, b).unwrap());
        assert!(!is_allocated(&mut disk, &sb, b + 1).unwrap());

        let mut buf = [0u8; BSIZE];
        disk.read_block(b, &mut buf).unwrap();
        assert!(buf.iter().all(|&x| x == 0));
        assert_eq!(alloc.alloc_block(&mut disk).unwrap(), used + 1);
    }

    #[test]
    fn log_region_is_never_allocated() {
        let params = MkfsParams { size: 16, nblocks: 2, nlog: 9, ninodes: 8 };
        let mut disk = RamDisk::new(params.size);
        let builder = ImageBuilder::format(&mut disk, &params).unwrap();
        builder.finish().unwrap();
        let sb = Superblock::read(&mut disk).unwrap();

        let mut alloc = BitmapAlloc::new(&sb);
        let mut got = 0;
        while alloc.alloc_block(&mut disk).is_ok() {
            got += 1;
        }
        assert!(got <= sb.nblocks);
        assert_eq!(alloc.alloc_block(&mut disk), Err(FsError::NoSpace));
    }
}
