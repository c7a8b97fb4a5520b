//! Test-only image formatter, grounded in the teacher's `mkfs::Ext2Factory::create` — but
//! finishing what that formatter leaves as a `TODO`: it writes group descriptors and a bare root
//! inode but never the root directory's `.`/`..` entries. This builder writes a minimal, fully
//! self-consistent image (superblock, group descriptors, bitmaps, a populated root directory)
//! small enough to build in memory, since nothing in this crate can shell out to a real
//! `mkfs.ext2` to produce fixtures.

#![cfg(test)]

use crate::block_io::BlockIo;
use crate::dirent;
use crate::inode::{DIRECT_PTRS, Inode, S_IFDIR, S_IFREG, SINGLE_INDIRECT};
use crate::superblock::{EXT2_MAGIC, GroupDescriptor, GroupTable, Superblock};
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;

const ROOT_INODE: u32 = 2;

struct GroupLayout {
    first_block: u32,
    block_bitmap: u32,
    inode_bitmap: u32,
    inode_table: u32,
    data_start: u32,
}

/// Formats a fresh image file with `groups_count` groups of `blocks_per_group` blocks and
/// `inodes_per_group` inodes each, and a root directory already containing `.` and `..`.
/// Returns the path (caller removes it when done) and the superblock as written.
pub fn format_image(
    block_size: u32,
    groups_count: u32,
    inodes_per_group: u32,
    blocks_per_group: u32,
) -> (PathBuf, Superblock) {
    let first_data_block = if block_size == 1024 { 1 } else { 0 };
    let inodes_count = inodes_per_group * groups_count;
    let blocks_count = first_data_block + blocks_per_group * groups_count;
    let inode_size = 128u16;
    let inode_table_blocks =
        ((inodes_per_group as u64 * inode_size as u64).div_ceil(block_size as u64)) as u32;
    let gdt_blocks =
        ((groups_count as u64 * 32).div_ceil(block_size as u64)) as u32;
    let gdt_start_block = first_data_block + 1;

    let mut layouts = Vec::with_capacity(groups_count as usize);
    let mut cursor = gdt_start_block + gdt_blocks;
    for g in 0..groups_count {
        let group_first_block = first_data_block + g * blocks_per_group;
        if cursor < group_first_block {
            cursor = group_first_block;
        }
        let block_bitmap = cursor;
        let inode_bitmap = cursor + 1;
        let inode_table = cursor + 2;
        let data_start = inode_table + inode_table_blocks;
        layouts.push(GroupLayout {
            first_block: group_first_block,
            block_bitmap,
            inode_bitmap,
            inode_table,
            data_start,
        });
        cursor = data_start;
    }

    // Root directory's single data block lives right after group 0's metadata.
    let root_block = layouts[0].data_start;
    let group0_extra_used = 1u32; // the root block itself

    let path = std::env::temp_dir().join(format!(
        "ext2fs-testutil-{}-{}-{}-{}-{}",
        std::process::id(),
        block_size,
        groups_count,
        inodes_per_group,
        blocks_per_group
    ));
    let mut file = File::options()
        .create(true)
        .truncate(true)
        .read(true)
        .write(true)
        .open(&path)
        .unwrap();
    file.set_len(blocks_count as u64 * block_size as u64).unwrap();

    // Block 0 (the boot block, only present when block_size == 1024) is reserved and belongs to
    // no group's bitmap at all, so it is never counted as free.
    let mut free_blocks_count = blocks_count - first_data_block;
    let mut groups = Vec::with_capacity(groups_count as usize);
    for (g, layout) in layouts.iter().enumerate() {
        let metadata_blocks = 2 + inode_table_blocks + if g == 0 { gdt_blocks + 1 } else { 0 };
        let extra = if g == 0 { group0_extra_used } else { 0 };
        let span = blocks_per_group.min(blocks_count - layout.first_block);
        let group_free_blocks = span - metadata_blocks - extra;
        free_blocks_count -= metadata_blocks + extra;

        let free_inodes_count = if g == 0 {
            inodes_per_group - 2
        } else {
            inodes_per_group
        };

        groups.push(GroupDescriptor {
            block_bitmap: layout.block_bitmap,
            inode_bitmap: layout.inode_bitmap,
            inode_table: layout.inode_table,
            free_blocks_count: group_free_blocks as u16,
            free_inodes_count: free_inodes_count as u16,
            used_dirs_count: if g == 0 { 1 } else { 0 },
            _padding: [0; 14],
        });

        // Block bitmap: mark every block from this group's start up to (but not including)
        // data_start as used, plus the root block in group 0.
        let mut bitmap = vec![0u8; block_size as usize];
        let used_span = layout.data_start - layout.first_block;
        for bit in 0..used_span {
            crate::bitmap::set(&mut bitmap, bit);
        }
        if g == 0 {
            crate::bitmap::set(&mut bitmap, root_block - layout.first_block);
        }
        write_block_raw(&mut file, block_size, layout.block_bitmap, &bitmap);

        let mut inode_bitmap = vec![0u8; block_size as usize];
        if g == 0 {
            crate::bitmap::set(&mut inode_bitmap, 0); // inode 1
            crate::bitmap::set(&mut inode_bitmap, 1); // inode 2 (root)
        }
        write_block_raw(&mut file, block_size, layout.inode_bitmap, &inode_bitmap);

        for b in 0..inode_table_blocks {
            write_block_raw(
                &mut file,
                block_size,
                layout.inode_table + b,
                &vec![0u8; block_size as usize],
            );
        }
    }
    let root_dir_block = dirent::init_new_dir_block(block_size, ROOT_INODE, ROOT_INODE);
    write_block_raw(&mut file, block_size, root_block, &root_dir_block);

    let mut root_inode = Inode::zeroed();
    root_inode.mode = S_IFDIR | 0o755;
    root_inode.links_count = 2;
    root_inode.set_size_low(block_size);
    root_inode.block[0] = root_block;

    let sb = Superblock {
        inodes_count,
        blocks_count,
        reserved_blocks_count: 0,
        free_blocks_count,
        free_inodes_count: inodes_count - 2,
        first_data_block,
        log_block_size: (block_size / 1024).trailing_zeros(),
        log_frag_size: (block_size / 1024).trailing_zeros(),
        blocks_per_group,
        frags_per_group: blocks_per_group,
        inodes_per_group,
        mtime: 0,
        wtime: 0,
        mnt_count: 0,
        max_mnt_count: 0xffff,
        magic: EXT2_MAGIC,
        state: 1,
        errors: 1,
        minor_rev_level: 0,
        lastcheck: 0,
        checkinterval: 0,
        creator_os: 0,
        rev_level: 0,
        def_resuid: 0,
        def_resgid: 0,
        first_ino: 11,
        inode_size: 128,
        block_group_nr: 0,
        feature_compat: 0,
        feature_incompat: 0x2, // directory entries carry a file-type byte
        feature_ro_compat: 0,
        uuid: [0; 16],
        volume_name: [0; 16],
        last_mounted: [0; 64],
        algo_bitmap: 0,
        prealloc_blocks: 0,
        prealloc_dir_blocks: 0,
        reserved_gdt_blocks: 0,
        journal_uuid: [0; 16],
        journal_inum: 0,
        journal_dev: 0,
        last_orphan: 0,
        _reserved: [0; 788],
    };
    sb.flush(&mut file).unwrap();

    let gdt_offset = sb.gdt_offset();
    for (i, g) in groups.iter().enumerate() {
        file.seek(SeekFrom::Start(gdt_offset + i as u64 * 32))
            .unwrap();
        file.write_all(crate::raw::as_bytes(g)).unwrap();
    }

    let root_inode_offset =
        layouts[0].inode_table as u64 * block_size as u64 + (ROOT_INODE - 1) as u64 * inode_size as u64;
    file.seek(SeekFrom::Start(root_inode_offset)).unwrap();
    file.write_all(crate::raw::as_bytes(&root_inode)).unwrap();

    (path, sb)
}

fn write_block_raw(file: &mut File, block_size: u32, block: u32, buf: &[u8]) {
    file.seek(SeekFrom::Start(block as u64 * block_size as u64))
        .unwrap();
    file.write_all(buf).unwrap();
}

/// Allocates a fresh inode, writes `data` into its direct blocks and (if it overflows them) a
/// single indirect block, and writes the inode record. Used by tests that only need a readable
/// regular file, not a directory entry pointing at it.
pub fn write_inode_content(
    io: &mut BlockIo,
    sb: &mut Superblock,
    gdt: &mut GroupTable,
    data: &[u8],
) -> crate::error::Result<Inode> {
    let (_, inode) = create_regular_file(io, sb, gdt, data)?;
    Ok(inode)
}

/// As [`write_inode_content`], but also returns the inode number, for tests that go on to link
/// the file into a directory.
pub fn create_regular_file(
    io: &mut BlockIo,
    sb: &mut Superblock,
    gdt: &mut GroupTable,
    data: &[u8],
) -> crate::error::Result<(u32, Inode)> {
    let n = crate::inode::allocate(io, sb, gdt)?.expect("test fixture ran out of inodes");
    let mut inode = Inode::zeroed();
    inode.mode = S_IFREG | 0o644;
    inode.links_count = 1;

    let block_size = sb.block_size() as usize;
    let mut offset = 0usize;
    let mut direct_idx = 0;
    while offset < data.len() && direct_idx < DIRECT_PTRS {
        let b = crate::alloc::allocate(io, sb, gdt, n)?.expect("test fixture ran out of blocks");
        let take = (data.len() - offset).min(block_size);
        let mut buf = vec![0u8; block_size];
        buf[..take].copy_from_slice(&data[offset..offset + take]);
        io.write_block(b, &buf)?;
        inode.block[direct_idx] = b;
        direct_idx += 1;
        offset += take;
    }

    if offset < data.len() {
        let ppb = block_size / 4;
        let ptr_block =
            crate::alloc::allocate(io, sb, gdt, n)?.expect("test fixture ran out of blocks");
        let mut ptr_buf = vec![0u8; block_size];
        let mut i = 0usize;
        while offset < data.len() && i < ppb {
            let b =
                crate::alloc::allocate(io, sb, gdt, n)?.expect("test fixture ran out of blocks");
            let take = (data.len() - offset).min(block_size);
            let mut buf = vec![0u8; block_size];
            buf[..take].copy_from_slice(&data[offset..offset + take]);
            io.write_block(b, &buf)?;
            ptr_buf[i * 4..i * 4 + 4].copy_from_slice(&b.to_le_bytes());
            i += 1;
            offset += take;
        }
        io.write_block(ptr_block, &ptr_buf)?;
        inode.block[SINGLE_INDIRECT] = ptr_block;
    }

    inode.set_size_low(data.len() as u32);
    crate::inode::write(io, sb, gdt, n, &inode)?;
    Ok((n, inode))
}

/// Creates a regular file via [`create_regular_file`] and links it into the root directory under
/// `name`, for tests that resolve paths through `fs`/`dirent` rather than an inode number.
pub fn create_file_in_root(
    io: &mut BlockIo,
    sb: &mut Superblock,
    gdt: &mut GroupTable,
    name: &[u8],
    data: &[u8],
) -> crate::error::Result<u32> {
    let (n, _) = create_regular_file(io, sb, gdt, data)?;
    let root = crate::inode::read(io, sb, gdt, ROOT_INODE)?;
    let root_block = root.block[0];
    let block = io.read_block_vec(root_block)?;
    let new_block = dirent::add_entry(&block, name, n, crate::inode::FT_REG_FILE)?
        .expect("root directory block has room in this fixture");
    io.write_block(root_block, &new_block)?;
    Ok(n)
}

