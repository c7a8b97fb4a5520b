//! The data-block allocator: free/used bitmap search with same-group locality.

use crate::bitmap;
use crate::block_io::BlockIo;
use crate::error::{Error, Result};
use crate::superblock::{GroupTable, Superblock};

/// Allocates a data block, preferring the group that owns `hint_inode` (so a file's metadata
/// and data end up close together on disk), falling back to any group with room.
pub fn allocate(
    io: &mut BlockIo,
    sb: &mut Superblock,
    gdt: &mut GroupTable,
    hint_inode: u32,
) -> Result<Option<u32>> {
    let preferred = ((hint_inode - 1) / sb.inodes_per_group) as usize;
    if let Some(b) = try_allocate_in_group(io, sb, gdt, preferred)? {
        return Ok(Some(b));
    }
    for g in 0..gdt.len() {
        if g == preferred {
            continue;
        }
        if let Some(b) = try_allocate_in_group(io, sb, gdt, g)? {
            return Ok(Some(b));
        }
    }
    if sb.free_blocks_count > 0 {
        eprintln!("block allocator: superblock free_blocks_count > 0 but no group has a free block");
    }
    Ok(None)
}

fn try_allocate_in_group(
    io: &mut BlockIo,
    sb: &mut Superblock,
    gdt: &mut GroupTable,
    g: usize,
) -> Result<Option<u32>> {
    if gdt.get(g).free_blocks_count == 0 {
        return Ok(None);
    }
    let bitmap_block = gdt.get(g).block_bitmap;
    let mut buf = io.read_block_vec(bitmap_block)?;
    let Some(bit) = bitmap::find_first_clear(&buf, sb.blocks_per_group) else {
        return Ok(None);
    };
    bitmap::set(&mut buf, bit);
    io.write_block(bitmap_block, &buf)?;

    gdt.get_mut(g).free_blocks_count -= 1;
    sb.free_blocks_count -= 1;
    gdt.flush(io.file_mut(), sb, g)?;
    sb.flush(io.file_mut())?;

    Ok(Some(g as u32 * sb.blocks_per_group + sb.first_data_block + bit))
}

/// Frees data block `block`. Rejects anything below `first_data_block` or at/above
/// `blocks_count` as a range error; clearing an already-clear bit is a soft warning.
pub fn free(io: &mut BlockIo, sb: &mut Superblock, gdt: &mut GroupTable, block: u32) -> Result<()> {
    let first_data_block = sb.first_data_block;
    let blocks_count = sb.blocks_count;
    if block < first_data_block || block >= blocks_count {
        return Err(Error::BlockOutOfRange {
            block,
            low: first_data_block,
            high: blocks_count,
        });
    }
    let relative = block - first_data_block;
    let group = (relative / sb.blocks_per_group) as usize;
    let within = relative % sb.blocks_per_group;

    let bitmap_block = gdt.get(group).block_bitmap;
    let mut buf = io.read_block_vec(bitmap_block)?;
    if !bitmap::test(&buf, within) {
        eprintln!("block allocator: block {block} freed twice");
        return Ok(());
    }
    bitmap::clear(&mut buf, within);
    io.write_block(bitmap_block, &buf)?;

    gdt.get_mut(group).free_blocks_count += 1;
    sb.free_blocks_count += 1;
    gdt.flush(io.file_mut(), sb, group)?;
    sb.flush(io.file_mut())?;
    Ok(())
}
