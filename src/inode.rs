//! The inode record and the inode table: locating, reading, writing, and allocating inodes.

use crate::bitmap;
use crate::block_io::BlockIo;
use crate::error::{Error, Result};
use crate::raw::{as_bytes, from_bytes_prefix};
use crate::superblock::{GroupTable, Superblock};

/// Type bits within [`Inode::mode`].
pub const S_IFREG: u16 = 0x8000;
pub const S_IFDIR: u16 = 0x4000;
pub const S_IFLNK: u16 = 0xa000;
/// Mask isolating the type bits from the permission bits.
const S_IFMT: u16 = 0xf000;

/// Directory-entry `file_type` values, written alongside a name (§3, §4.7).
pub const FT_UNKNOWN: u8 = 0;
pub const FT_REG_FILE: u8 = 1;
pub const FT_DIR: u8 = 2;

/// Number of block-pointer slots in an inode: 12 direct, then single/double/triple indirect.
pub const DIRECT_PTRS: usize = 12;
pub const SINGLE_INDIRECT: usize = 12;
pub const DOUBLE_INDIRECT: usize = 13;
pub const TRIPLE_INDIRECT: usize = 14;
pub const NUM_BLOCK_PTRS: usize = 15;

/// The 128-byte on-disk inode record. Revision-0 images never define fields past this size; this
/// struct is intentionally exactly 128 bytes so a read never has to special-case the remainder.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct Inode {
    pub mode: u16,
    pub uid: u16,
    pub size_low: u32,
    pub atime: u32,
    pub ctime: u32,
    pub mtime: u32,
    pub dtime: u32,
    pub gid: u16,
    pub links_count: u16,
    pub blocks: u32,
    pub flags: u32,
    pub osd1: u32,
    pub block: [u32; NUM_BLOCK_PTRS],
    pub generation: u32,
    pub file_acl: u32,
    /// High 32 bits of size for regular files; `dir_acl` for directories (unused here).
    pub size_high: u32,
    pub faddr: u32,
    pub osd2: [u8; 12],
}

/// Size in bytes of the in-memory [`Inode`] layout, and of the on-disk record this engine reads
/// and writes (the first 128 bytes of whatever the superblock's `inode_size` actually is).
pub const INODE_RECORD_SIZE: usize = 128;

impl Inode {
    /// A zeroed inode, as written back after a file is fully deleted (its `dtime` is set
    /// separately by the caller, per §3's lifecycle note).
    pub fn zeroed() -> Self {
        from_bytes_prefix(&[0u8; INODE_RECORD_SIZE])
    }

    pub fn is_regular(&self) -> bool {
        let mode = self.mode;
        mode & S_IFMT == S_IFREG
    }

    pub fn is_dir(&self) -> bool {
        let mode = self.mode;
        mode & S_IFMT == S_IFDIR
    }

    /// Logical file size. For directories and non-regular files only the low 32 bits are
    /// meaningful; for regular files `size_high` (aliased on disk with `dir_acl`) supplies the
    /// high half, read but never produced by a write path in this engine (§9: "64-bit file
    /// sizes").
    pub fn size(&self) -> u64 {
        let low = self.size_low as u64;
        if self.is_regular() {
            let high = self.size_high as u64;
            (high << 32) | low
        } else {
            low
        }
    }

    pub fn set_size_low(&mut self, size: u32) {
        self.size_low = size;
    }
}

/// Returns `(group, offset_within_group)` for 1-based inode number `n`.
fn group_and_offset(n: u32, inodes_per_group: u32) -> (u32, u32) {
    let zero_based = n - 1;
    (zero_based / inodes_per_group, zero_based % inodes_per_group)
}

/// Byte offset of inode `n`'s record within the image.
pub fn locate(n: u32, sb: &Superblock, gdt: &GroupTable) -> Result<u64> {
    let inodes_count = sb.inodes_count;
    if n == 0 || n > inodes_count {
        return Err(Error::InodeOutOfRange {
            inode: n,
            max: inodes_count,
        });
    }
    let (group, within) = group_and_offset(n, sb.inodes_per_group);
    let inode_table = gdt.get(group as usize).inode_table;
    let inode_size = sb.inode_size() as u64;
    Ok(inode_table as u64 * sb.block_size() as u64 + within as u64 * inode_size)
}

/// Reads inode `n`.
pub fn read(io: &mut BlockIo, sb: &Superblock, gdt: &GroupTable, n: u32) -> Result<Inode> {
    let offset = locate(n, sb, gdt)?;
    let mut buf = [0u8; INODE_RECORD_SIZE];
    io.read_at(offset, &mut buf)?;
    Ok(from_bytes_prefix(&buf))
}

/// Writes inode `n`. Only the first [`INODE_RECORD_SIZE`] bytes of the on-disk record are
/// touched; any bytes beyond that (for a revision-1 `inode_size` larger than 128) are preserved.
pub fn write(io: &mut BlockIo, sb: &Superblock, gdt: &GroupTable, n: u32, inode: &Inode) -> Result<()> {
    let offset = locate(n, sb, gdt)?;
    io.write_at(offset, as_bytes(inode))?;
    Ok(())
}

/// Allocates a free inode: scans groups in order for one with a free inode, sets the lowest
/// clear bit in its bitmap, and updates both the group and superblock counters.
///
/// Returns `Ok(None)` if the superblock claims free inodes exist but no group's bitmap yields
/// one — a consistency warning, not a hard error (§4.4).
pub fn allocate(io: &mut BlockIo, sb: &mut Superblock, gdt: &mut GroupTable) -> Result<Option<u32>> {
    for g in 0..gdt.len() {
        if gdt.get(g).free_inodes_count == 0 {
            continue;
        }
        let bitmap_block = gdt.get(g).inode_bitmap;
        let mut buf = io.read_block_vec(bitmap_block)?;
        let Some(bit) = bitmap::find_first_clear(&buf, sb.inodes_per_group) else {
            continue;
        };
        bitmap::set(&mut buf, bit);
        io.write_block(bitmap_block, &buf)?;

        gdt.get_mut(g).free_inodes_count -= 1;
        sb.free_inodes_count -= 1;
        gdt.flush(io_file(io), sb, g)?;
        sb.flush(io_file(io))?;

        return Ok(Some(g as u32 * sb.inodes_per_group + bit + 1));
    }
    if sb.free_inodes_count > 0 {
        eprintln!("inode allocator: superblock free_inodes_count > 0 but no group has a free inode");
    }
    Ok(None)
}

/// Frees inode `n`. Clearing an already-clear bit is a soft failure (a warning, not an error):
/// the caller's intent ("make sure this inode is free") is already satisfied.
pub fn free(io: &mut BlockIo, sb: &mut Superblock, gdt: &mut GroupTable, n: u32) -> Result<()> {
    let inodes_count = sb.inodes_count;
    if n == 0 || n > inodes_count {
        return Err(Error::InodeOutOfRange {
            inode: n,
            max: inodes_count,
        });
    }
    let (group, within) = group_and_offset(n, sb.inodes_per_group);
    let bitmap_block = gdt.get(group as usize).inode_bitmap;
    let mut buf = io.read_block_vec(bitmap_block)?;
    if !bitmap::test(&buf, within) {
        eprintln!("inode allocator: inode {n} freed twice");
        return Ok(());
    }
    bitmap::clear(&mut buf, within);
    io.write_block(bitmap_block, &buf)?;

    gdt.get_mut(group as usize).free_inodes_count += 1;
    sb.free_inodes_count += 1;
    gdt.flush(io_file(io), sb, group as usize)?;
    sb.flush(io_file(io))?;
    Ok(())
}

/// `Superblock`/`GroupTable` are flushed through the raw `File`, not `BlockIo` (they live at
/// byte offsets with no block alignment requirement); this crate keeps exactly one open file
/// handle, so the allocator borrows it back out of the `BlockIo` it otherwise addresses blocks
/// through.
fn io_file(io: &mut BlockIo) -> &mut std::fs::File {
    io.file_mut()
}
