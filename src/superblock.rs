//! The superblock and the group-descriptor table: global geometry, counters, and per-group
//! bookkeeping, decoded from (and persisted back to) fixed byte offsets in the image.

use crate::error::{Error, Result};
use crate::raw::{as_bytes, from_bytes_prefix};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

/// Byte offset of the superblock from the start of the image. Binding regardless of block size.
pub const SUPERBLOCK_OFFSET: u64 = 1024;
/// Size in bytes of the on-disk superblock record.
pub const SUPERBLOCK_SIZE: usize = 1024;
/// The filesystem's magic number, found at a fixed offset inside the superblock.
pub const EXT2_MAGIC: u16 = 0xef53;
/// Legacy (revision 0) inode record size; also the floor for revision 1's `inode_size` field.
pub const LEGACY_INODE_SIZE: u16 = 128;
/// Size in bytes of one on-disk group descriptor.
pub const GROUP_DESC_SIZE: u64 = 32;

/// The ext2 superblock. Field order and widths are binding: this is read and written as a raw
/// 1024-byte record at [`SUPERBLOCK_OFFSET`].
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct Superblock {
    pub inodes_count: u32,
    pub blocks_count: u32,
    pub reserved_blocks_count: u32,
    pub free_blocks_count: u32,
    pub free_inodes_count: u32,
    pub first_data_block: u32,
    pub log_block_size: u32,
    pub log_frag_size: u32,
    pub blocks_per_group: u32,
    pub frags_per_group: u32,
    pub inodes_per_group: u32,
    pub mtime: u32,
    pub wtime: u32,
    pub mnt_count: u16,
    pub max_mnt_count: u16,
    pub magic: u16,
    pub state: u16,
    pub errors: u16,
    pub minor_rev_level: u16,
    pub lastcheck: u32,
    pub checkinterval: u32,
    pub creator_os: u32,
    pub rev_level: u32,
    pub def_resuid: u16,
    pub def_resgid: u16,

    // Fields valid for `rev_level >= 1` (EXT2_DYNAMIC_REV). Read unconditionally; only consulted
    // when `rev_level >= 1`.
    pub first_ino: u32,
    pub inode_size: u16,
    pub block_group_nr: u16,
    pub feature_compat: u32,
    pub feature_incompat: u32,
    pub feature_ro_compat: u32,
    pub uuid: [u8; 16],
    pub volume_name: [u8; 16],
    pub last_mounted: [u8; 64],
    pub algo_bitmap: u32,
    pub prealloc_blocks: u8,
    pub prealloc_dir_blocks: u8,
    pub reserved_gdt_blocks: u16,
    pub journal_uuid: [u8; 16],
    pub journal_inum: u32,
    pub journal_dev: u32,
    pub last_orphan: u32,

    /// Padding out to 1024 bytes; no field this engine reads or writes lives in here.
    pub(crate) _reserved: [u8; 788],
}

impl Superblock {
    /// Reads and decodes the superblock directly from the raw image file, before any geometry
    /// is known (the block size itself lives inside the record being read).
    pub fn load(file: &mut File) -> Result<Self> {
        let mut buf = [0u8; SUPERBLOCK_SIZE];
        file.seek(SeekFrom::Start(SUPERBLOCK_OFFSET))?;
        file.read_exact(&mut buf)?;
        let sb: Self = from_bytes_prefix(&buf);
        sb.validate()?;
        Ok(sb)
    }

    /// Rewrites the 1024-byte superblock record in place.
    pub fn flush(&self, file: &mut File) -> Result<()> {
        file.seek(SeekFrom::Start(SUPERBLOCK_OFFSET))?;
        file.write_all(as_bytes(self))?;
        Ok(())
    }

    /// Validates the invariants binding at mount time. Called by [`Self::load`]; exposed so
    /// tests can exercise it directly against hand-built records.
    pub fn validate(&self) -> Result<()> {
        let magic = self.magic;
        if magic != EXT2_MAGIC {
            return Err(Error::BadFormat("bad magic number"));
        }
        let free_blocks = self.free_blocks_count;
        let blocks = self.blocks_count;
        if free_blocks > blocks {
            return Err(Error::BadFormat("free_blocks_count exceeds blocks_count"));
        }
        let free_inodes = self.free_inodes_count;
        let inodes = self.inodes_count;
        if free_inodes > inodes {
            return Err(Error::BadFormat("free_inodes_count exceeds inodes_count"));
        }
        let blocks_per_group = self.blocks_per_group;
        if blocks_per_group == 0 {
            return Err(Error::BadFormat("blocks_per_group is zero"));
        }
        let inodes_per_group = self.inodes_per_group;
        if inodes_per_group == 0 {
            return Err(Error::BadFormat("inodes_per_group is zero"));
        }
        let block_size = self.block_size();
        if !(1024..=65536).contains(&block_size) {
            return Err(Error::BadFormat("block size out of [1024, 65536] range"));
        }
        let groups_by_blocks = self.groups_count();
        let groups_by_inodes = inodes.div_ceil(inodes_per_group);
        if groups_by_blocks != groups_by_inodes {
            return Err(Error::BadFormat(
                "group count computed from blocks disagrees with group count from inodes",
            ));
        }
        let rev_level = self.rev_level;
        if rev_level >= 1 {
            let inode_size = self.inode_size;
            if inode_size < LEGACY_INODE_SIZE || !inode_size.is_power_of_two() {
                return Err(Error::BadFormat(
                    "dynamic-revision inode_size must be a power of two >= 128",
                ));
            }
        }
        Ok(())
    }

    /// Block size in bytes: `1024 << log_block_size`.
    pub fn block_size(&self) -> u32 {
        1024u32 << self.log_block_size
    }

    /// Effective inode record size: the dynamic-revision field if set and valid, else the
    /// legacy 128-byte size.
    pub fn inode_size(&self) -> u16 {
        let rev_level = self.rev_level;
        if rev_level >= 1 {
            let inode_size = self.inode_size;
            if inode_size > 0 {
                return inode_size;
            }
        }
        LEGACY_INODE_SIZE
    }

    /// Number of block groups, computed from the block count (equal, by the load-time
    /// invariant, to the count computed from inodes). Block 0 is reserved and never part of
    /// group 0's own range when the block size is 1024, so group span starts at
    /// `first_data_block`, not block 0.
    pub fn groups_count(&self) -> u32 {
        let blocks = self.blocks_count;
        let first_data_block = self.first_data_block;
        (blocks - first_data_block).div_ceil(self.blocks_per_group)
    }

    /// Byte offset of the group descriptor table: the first block after the superblock.
    pub fn gdt_offset(&self) -> u64 {
        let first_data_block = self.first_data_block;
        (first_data_block as u64 + 1) * self.block_size() as u64
    }
}

/// One block group's descriptor: the absolute locations of its block bitmap, inode bitmap, and
/// inode table, plus its local free-space counters.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct GroupDescriptor {
    pub block_bitmap: u32,
    pub inode_bitmap: u32,
    pub inode_table: u32,
    pub free_blocks_count: u16,
    pub free_inodes_count: u16,
    pub used_dirs_count: u16,
    pub(crate) _padding: [u8; 14],
}

/// The group descriptor table: one [`GroupDescriptor`] per block group, held in memory and
/// flushed back entry-by-entry as counters change.
pub struct GroupTable {
    groups: Vec<GroupDescriptor>,
}

impl GroupTable {
    /// Reads every group descriptor described by `sb` from the image.
    pub fn load(file: &mut File, sb: &Superblock) -> Result<Self> {
        let base = sb.gdt_offset();
        let mut groups = Vec::with_capacity(sb.groups_count() as usize);
        for i in 0..sb.groups_count() {
            let mut buf = [0u8; GROUP_DESC_SIZE as usize];
            file.seek(SeekFrom::Start(base + i as u64 * GROUP_DESC_SIZE))?;
            file.read_exact(&mut buf)?;
            groups.push(from_bytes_prefix(&buf));
        }
        let table = Self { groups };
        table.validate(sb)?;
        Ok(table)
    }

    /// Checks the cross-structure invariants from §3: summed per-group counters match the
    /// superblock, and each group's bitmap blocks fall inside that group's own block range.
    pub fn validate(&self, sb: &Superblock) -> Result<()> {
        let mut free_blocks = 0u64;
        let mut free_inodes = 0u64;
        for (i, g) in self.groups.iter().enumerate() {
            let group_first_block =
                sb.first_data_block + i as u32 * sb.blocks_per_group;
            let group_last_block = (group_first_block + sb.blocks_per_group).min(sb.blocks_count);
            let block_bitmap = g.block_bitmap;
            let inode_bitmap = g.inode_bitmap;
            if !(group_first_block..group_last_block).contains(&block_bitmap)
                || !(group_first_block..group_last_block).contains(&inode_bitmap)
            {
                return Err(Error::BadFormat(
                    "group descriptor bitmap block lies outside its own group",
                ));
            }
            free_blocks += g.free_blocks_count as u64;
            free_inodes += g.free_inodes_count as u64;
        }
        if free_blocks != sb.free_blocks_count as u64 {
            return Err(Error::BadFormat(
                "sum of per-group free block counts disagrees with the superblock",
            ));
        }
        if free_inodes != sb.free_inodes_count as u64 {
            return Err(Error::BadFormat(
                "sum of per-group free inode counts disagrees with the superblock",
            ));
        }
        Ok(())
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn get(&self, i: usize) -> &GroupDescriptor {
        &self.groups[i]
    }

    pub fn get_mut(&mut self, i: usize) -> &mut GroupDescriptor {
        &mut self.groups[i]
    }

    pub fn iter(&self) -> impl Iterator<Item = &GroupDescriptor> {
        self.groups.iter()
    }

    /// Rewrites group descriptor `i` in place.
    pub fn flush(&self, file: &mut File, sb: &Superblock, i: usize) -> Result<()> {
        let offset = sb.gdt_offset() + i as u64 * GROUP_DESC_SIZE;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(as_bytes(&self.groups[i]))?;
        Ok(())
    }
}
