//! Traversal of an inode's direct and indirect block-pointer chains.
//!
//! The walker is deliberately a single traversal (`collect`) that materializes the block chain
//! into plain `Vec<u32>`s rather than a re-entrant visitor callback: a callback invoked while
//! `collect` itself still holds the `&mut BlockIo` it needs to read pointer blocks would have to
//! borrow that same handle a second time to do its own I/O (`free_all` frees blocks, a directory
//! search reads block contents, a file read streams bytes). Materializing first and acting
//! second gives every caller in §9's "five places" list (`ls`, `rm`, `rename`, add-entry,
//! empty-check, read) the same single implementation without fighting the borrow checker, at the
//! cost of holding the block-number list (not the content) in memory — negligible next to the
//! data itself.

use crate::block_io::BlockIo;
use crate::error::Result;
use crate::inode::{DIRECT_PTRS, DOUBLE_INDIRECT, Inode, SINGLE_INDIRECT, TRIPLE_INDIRECT};
use crate::superblock::Superblock;

/// The fully-walked block chain of one inode: its data (leaf) blocks in logical order, and every
/// indirect pointer block visited to reach them, in the order visited (outermost first).
pub struct BlockChain {
    pub data_blocks: Vec<u32>,
    pub pointer_blocks: Vec<u32>,
}

fn read_u32_le(buf: &[u8], i: u32) -> u32 {
    let off = i as usize * 4;
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

/// Walks one level of indirection: `ptr` names a block of `ppb` little-endian `u32` entries.
/// `depth == 0` means those entries are data blocks; otherwise they are themselves pointers to
/// another such table, one level shallower.
///
/// A zero entry — at any depth, including `ptr` itself — ends the chain: this engine never
/// allocates holes, so a zero marks the end of the file, not a gap to skip past (§1 Non-goals).
fn walk(io: &mut BlockIo, ptr: u32, ppb: u32, depth: u32, chain: &mut BlockChain) -> Result<()> {
    if ptr == 0 {
        return Ok(());
    }
    chain.pointer_blocks.push(ptr);
    let table = io.read_block_vec(ptr)?;
    for i in 0..ppb {
        let entry = read_u32_le(&table, i);
        if entry == 0 {
            return Ok(());
        }
        if depth == 0 {
            chain.data_blocks.push(entry);
        } else {
            walk(io, entry, ppb, depth - 1, chain)?;
        }
    }
    Ok(())
}

/// Walks every direct and indirect pointer of `inode`, returning the full block chain.
pub fn collect(io: &mut BlockIo, sb: &Superblock, inode: &Inode) -> Result<BlockChain> {
    let ppb = sb.block_size() / 4;
    let mut chain = BlockChain {
        data_blocks: Vec::new(),
        pointer_blocks: Vec::new(),
    };

    for i in 0..DIRECT_PTRS {
        let b = inode.block[i];
        if b == 0 {
            return Ok(chain);
        }
        chain.data_blocks.push(b);
    }
    walk(io, inode.block[SINGLE_INDIRECT], ppb, 0, &mut chain)?;
    if inode.block[SINGLE_INDIRECT] != 0 && chain_stopped_short(&chain, ppb, 0) {
        return Ok(chain);
    }
    walk(io, inode.block[DOUBLE_INDIRECT], ppb, 1, &mut chain)?;
    if inode.block[DOUBLE_INDIRECT] != 0 && chain_stopped_short(&chain, ppb, 1) {
        return Ok(chain);
    }
    walk(io, inode.block[TRIPLE_INDIRECT], ppb, 2, &mut chain)?;
    Ok(chain)
}

/// A level stops "short" of its full span when it hit a zero entry rather than exhausting every
/// slot; in that case shallower levels (double/triple) cannot hold any further data either, so
/// the caller should not bother walking them. This is an optimization, not a correctness
/// requirement: `walk` on an unallocated pointer (`ptr == 0`) is already a no-op.
fn chain_stopped_short(chain: &BlockChain, ppb: u32, depth: u32) -> bool {
    let span: u64 = (ppb as u64).pow(depth + 1);
    (chain.data_blocks.len() as u64) < span
}

/// Invokes `visit` for each allocated data block of `inode`, in logical order, stopping early if
/// `visit` returns `Ok(false)`. The chain is fully collected before the first call, so `visit` is
/// free to use `io` itself (read a block's content, write it back) without the re-entrant borrow
/// `collect`'s own walk would otherwise require.
pub fn enumerate(
    io: &mut BlockIo,
    sb: &Superblock,
    inode: &Inode,
    mut visit: impl FnMut(&mut BlockIo, u32) -> Result<bool>,
) -> Result<()> {
    let chain = collect(io, sb, inode)?;
    for b in chain.data_blocks {
        if !visit(io, b)? {
            break;
        }
    }
    Ok(())
}

/// Reads the full logical byte content of a regular file: the first `inode.size()` bytes across
/// its block chain.
pub fn read_all_to_buffer(io: &mut BlockIo, sb: &Superblock, inode: &Inode) -> Result<Vec<u8>> {
    let block_size = sb.block_size() as u64;
    let mut remaining = inode.size();
    let mut out = Vec::with_capacity(remaining as usize);
    let chain = collect(io, sb, inode)?;
    for b in chain.data_blocks {
        if remaining == 0 {
            break;
        }
        let buf = io.read_block_vec(b)?;
        let take = block_size.min(remaining) as usize;
        out.extend_from_slice(&buf[..take]);
        remaining -= take as u64;
    }
    Ok(out)
}

/// Frees every data block and every indirect pointer block belonging to `inode`, deepest first.
pub fn free_all(
    io: &mut BlockIo,
    sb: &mut Superblock,
    gdt: &mut crate::superblock::GroupTable,
    inode: &Inode,
) -> Result<()> {
    let chain = collect(io, sb, inode)?;
    for b in chain.data_blocks {
        crate::alloc::free(io, sb, gdt, b)?;
    }
    for b in chain.pointer_blocks.into_iter().rev() {
        crate::alloc::free(io, sb, gdt, b)?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::block_io::BlockIo;
    use crate::superblock::{GroupTable, Superblock};
    use crate::testutil::{format_image, write_inode_content};
    use std::fs::File;

    #[test]
    fn reads_direct_only_file() {
        let (path, _) = format_image(1024, 1, 32, 1024);
        let mut file = File::options().read(true).write(true).open(&path).unwrap();
        let mut sb = Superblock::load(&mut file).unwrap();
        let mut gdt = GroupTable::load(&mut file, &sb).unwrap();
        let mut io = BlockIo::new(file, sb.block_size(), sb.blocks_count).unwrap();

        let data = b"hello world".repeat(50);
        let inode = write_inode_content(&mut io, &mut sb, &mut gdt, &data).unwrap();
        let out = read_all_to_buffer(&mut io, &sb, &inode).unwrap();
        assert_eq!(out, data);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn reads_file_spilling_into_single_indirect() {
        let (path, _) = format_image(1024, 1, 64, 4096);
        let mut file = File::options().read(true).write(true).open(&path).unwrap();
        let mut sb = Superblock::load(&mut file).unwrap();
        let mut gdt = GroupTable::load(&mut file, &sb).unwrap();
        let mut io = BlockIo::new(file, sb.block_size(), sb.blocks_count).unwrap();

        // 13 * 1024 + 5 bytes: fills all 12 direct blocks plus one single-indirect block.
        let len = 13 * 1024 + 5;
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let inode = write_inode_content(&mut io, &mut sb, &mut gdt, &data).unwrap();
        assert_ne!({ inode.block[SINGLE_INDIRECT] }, 0);
        let out = read_all_to_buffer(&mut io, &sb, &inode).unwrap();
        assert_eq!(out.len(), len);
        assert_eq!(out, data);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn free_all_releases_data_and_pointer_blocks() {
        let (path, _) = format_image(1024, 1, 64, 4096);
        let mut file = File::options().read(true).write(true).open(&path).unwrap();
        let mut sb = Superblock::load(&mut file).unwrap();
        let mut gdt = GroupTable::load(&mut file, &sb).unwrap();
        let mut io = BlockIo::new(file, sb.block_size(), sb.blocks_count).unwrap();

        let data = vec![0x7au8; 13 * 1024 + 5];
        let inode = write_inode_content(&mut io, &mut sb, &mut gdt, &data).unwrap();
        let free_before = sb.free_blocks_count;
        let chain = collect(&mut io, &sb, &inode).unwrap();
        let freed_count = chain.data_blocks.len() + chain.pointer_blocks.len();
        free_all(&mut io, &mut sb, &mut gdt, &inode).unwrap();
        assert_eq!(sb.free_blocks_count, free_before + freed_count as u32);
        std::fs::remove_file(path).ok();
    }
}
