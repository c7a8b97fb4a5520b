//! The façade: a mounted filesystem exposed as a handful of path-taking operations, each one
//! composing the allocator, inode table, directory editor, and indirect-block walker the way a
//! real `open(2)`/`mkdir(2)`/`rename(2)` would. Every mutating operation here follows the same
//! write order: bitmaps for anything newly allocated, then its content, then the inode record that
//! points at it, then the parent directory's inode, and group descriptors/superblock last (they
//! are flushed incrementally by the allocators themselves). A partially-applied mutation is rolled
//! back by freeing whatever was allocated before the failure, not by undoing completed writes.

use crate::alloc;
use crate::bitmap;
use crate::block_io::BlockIo;
use crate::dirent::{self, DirectoryEntry};
use crate::error::{Error, Result};
use crate::indirect;
use crate::inode::{
    self, DIRECT_PTRS, DOUBLE_INDIRECT, FT_DIR, FT_REG_FILE, Inode, S_IFDIR, S_IFREG,
    SINGLE_INDIRECT,
};
use crate::path;
use crate::reader;
use crate::superblock::{GroupTable, Superblock};
use std::fs::File;

/// Inode number of the filesystem root, fixed by the on-disk format.
pub const ROOT_INODE: u32 = 2;

fn read_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

fn path_name(path: &[u8]) -> String {
    String::from_utf8_lossy(path).into_owned()
}

/// One group's free-space counter checked against an independent recount of its own bitmap —
/// the consistency check `info` and `print groups` promise.
pub struct GroupConsistency {
    pub group: usize,
    pub free_blocks_counter: u16,
    pub free_blocks_bitmap: u32,
    pub free_inodes_counter: u16,
    pub free_inodes_bitmap: u32,
}

impl GroupConsistency {
    pub fn blocks_match(&self) -> bool {
        self.free_blocks_counter as u32 == self.free_blocks_bitmap
    }

    pub fn inodes_match(&self) -> bool {
        self.free_inodes_counter as u32 == self.free_inodes_bitmap
    }
}

/// A mounted image and the operations a shell drives it through. Every operation takes the
/// caller's current-directory inode explicitly rather than holding one itself — `cwd` is the
/// shell's state, not the filesystem's.
pub struct FileSystem {
    io: BlockIo,
    sb: Superblock,
    gdt: GroupTable,
}

impl FileSystem {
    /// Mounts `file`: loads and validates the superblock and group descriptor table, then opens a
    /// block-granularity view over the rest of the image.
    pub fn mount(mut file: File) -> Result<Self> {
        let sb = Superblock::load(&mut file)?;
        let gdt = GroupTable::load(&mut file, &sb)?;
        let io = BlockIo::new(file, sb.block_size(), sb.blocks_count)?;
        Ok(Self { io, sb, gdt })
    }

    pub fn block_size(&self) -> u32 {
        self.sb.block_size()
    }

    /// A copy of the superblock as currently held in memory (kept up to date by every allocator
    /// call, which flushes through as it mutates).
    pub fn read_superblock_snapshot(&self) -> Superblock {
        self.sb
    }

    pub fn group_table_snapshot(&self) -> &GroupTable {
        &self.gdt
    }

    /// Recounts every group's block and inode bitmap and compares the result against that
    /// group's stored free-space counters.
    pub fn check_group_consistency(&mut self) -> Result<Vec<GroupConsistency>> {
        let mut out = Vec::with_capacity(self.gdt.len());
        for g in 0..self.gdt.len() {
            let desc = *self.gdt.get(g);
            let block_bitmap = self.io.read_block_vec(desc.block_bitmap)?;
            let inode_bitmap = self.io.read_block_vec(desc.inode_bitmap)?;
            out.push(GroupConsistency {
                group: g,
                free_blocks_counter: desc.free_blocks_count,
                free_blocks_bitmap: bitmap::count_clear(&block_bitmap, self.sb.blocks_per_group),
                free_inodes_counter: desc.free_inodes_count,
                free_inodes_bitmap: bitmap::count_clear(&inode_bitmap, self.sb.inodes_per_group),
            });
        }
        Ok(out)
    }

    pub fn read_inode(&mut self, n: u32) -> Result<Inode> {
        inode::read(&mut self.io, &self.sb, &self.gdt, n)
    }

    /// Resolves `path` to an inode number, relative to `cwd` unless `path` is absolute.
    pub fn resolve(&mut self, cwd: u32, path: &[u8]) -> Result<u32> {
        path::resolve(&mut self.io, &self.sb, &self.gdt, cwd, path)
    }

    /// Resolves `path` and checks it names a directory, for `cd`.
    pub fn change_dir(&mut self, cwd: u32, path: &[u8]) -> Result<u32> {
        let n = self.resolve(cwd, path)?;
        let dir = self.read_inode(n)?;
        if !dir.is_dir() {
            return Err(Error::NotADirectory(path_name(path)));
        }
        Ok(n)
    }

    /// Lists the entries of `path` (or `cwd` itself if `path` is `None`), in on-disk order.
    pub fn list_dir(&mut self, cwd: u32, path: Option<&[u8]>) -> Result<Vec<DirectoryEntry>> {
        let n = match path {
            Some(p) => self.resolve(cwd, p)?,
            None => cwd,
        };
        let dir = self.read_inode(n)?;
        if !dir.is_dir() {
            return Err(Error::NotADirectory(path_name(path.unwrap_or(b"."))));
        }
        let mut entries = Vec::new();
        indirect::enumerate(&mut self.io, &self.sb, &dir, |io, b| {
            let block = io.read_block_vec(b)?;
            entries.extend(dirent::list(&block));
            Ok(true)
        })?;
        Ok(entries)
    }

    /// Reads the full content of the regular file named by `path`.
    pub fn read_file_content(&mut self, cwd: u32, path: &[u8]) -> Result<Vec<u8>> {
        let n = self.resolve(cwd, path)?;
        let target = self.read_inode(n)?;
        if target.is_dir() {
            return Err(Error::IsADirectory(path_name(path)));
        }
        reader::read_file(&mut self.io, &self.sb, &target)
    }

    /// Creates an empty regular file at `path`. Fails with [`Error::AlreadyExists`] if something
    /// already uses that name.
    pub fn create_file(&mut self, cwd: u32, path: &[u8], now: u32) -> Result<u32> {
        let (parent_num, leaf) = path::resolve_parent(&mut self.io, &self.sb, &self.gdt, cwd, path)?;
        dirent::validate_name(&leaf)?;
        let mut parent = self.read_inode(parent_num)?;
        if !parent.is_dir() {
            return Err(Error::NotADirectory(path_name(path)));
        }
        if self.locate_entry(&parent, &leaf)?.is_some() {
            return Err(Error::AlreadyExists(path_name(path)));
        }

        let n = inode::allocate(&mut self.io, &mut self.sb, &mut self.gdt)?
            .ok_or(Error::NoFreeInodes)?;
        let mut new_inode = Inode::zeroed();
        new_inode.mode = S_IFREG | 0o644;
        new_inode.links_count = 1;
        new_inode.atime = now;
        new_inode.ctime = now;
        new_inode.mtime = now;
        inode::write(&mut self.io, &self.sb, &self.gdt, n, &new_inode)?;

        if let Err(e) = self.link_child(parent_num, &mut parent, &leaf, n, FT_REG_FILE) {
            inode::free(&mut self.io, &mut self.sb, &mut self.gdt, n).ok();
            return Err(e);
        }

        parent.mtime = now;
        parent.atime = now;
        inode::write(&mut self.io, &self.sb, &self.gdt, parent_num, &parent)?;
        Ok(n)
    }

    /// Unlinks the regular file at `path`, freeing its inode and data once its link count reaches
    /// zero (always the case here: this engine never creates hard links).
    pub fn delete_file(&mut self, cwd: u32, path: &[u8], now: u32) -> Result<()> {
        let (parent_num, leaf) = path::resolve_parent(&mut self.io, &self.sb, &self.gdt, cwd, path)?;
        let mut parent = self.read_inode(parent_num)?;
        if !parent.is_dir() {
            return Err(Error::NotADirectory(path_name(path)));
        }
        let (block_num, entry) = self
            .locate_entry(&parent, &leaf)?
            .ok_or_else(|| Error::NotFound(path_name(path)))?;
        let mut target = self.read_inode(entry.inode)?;
        if target.is_dir() {
            return Err(Error::IsADirectory(path_name(path)));
        }

        let block = self.io.read_block_vec(block_num)?;
        let updated = dirent::remove_entry(&block, &leaf)?;
        self.io.write_block(block_num, &updated)?;

        target.links_count -= 1;
        if target.links_count == 0 {
            indirect::free_all(&mut self.io, &mut self.sb, &mut self.gdt, &target)?;
            let mut zeroed = Inode::zeroed();
            zeroed.dtime = now;
            inode::write(&mut self.io, &self.sb, &self.gdt, entry.inode, &zeroed)?;
            inode::free(&mut self.io, &mut self.sb, &mut self.gdt, entry.inode)?;
        } else {
            target.ctime = now;
            inode::write(&mut self.io, &self.sb, &self.gdt, entry.inode, &target)?;
        }

        parent.mtime = now;
        parent.atime = now;
        inode::write(&mut self.io, &self.sb, &self.gdt, parent_num, &parent)?;
        Ok(())
    }

    /// Creates an empty directory at `path`, with `.` and `..` already populated.
    pub fn make_directory(&mut self, cwd: u32, path: &[u8], now: u32) -> Result<u32> {
        let (parent_num, leaf) = path::resolve_parent(&mut self.io, &self.sb, &self.gdt, cwd, path)?;
        dirent::validate_name(&leaf)?;
        let mut parent = self.read_inode(parent_num)?;
        if !parent.is_dir() {
            return Err(Error::NotADirectory(path_name(path)));
        }
        if self.locate_entry(&parent, &leaf)?.is_some() {
            return Err(Error::AlreadyExists(path_name(path)));
        }

        let n = inode::allocate(&mut self.io, &mut self.sb, &mut self.gdt)?
            .ok_or(Error::NoFreeInodes)?;
        let data_block = match alloc::allocate(&mut self.io, &mut self.sb, &mut self.gdt, n)? {
            Some(b) => b,
            None => {
                inode::free(&mut self.io, &mut self.sb, &mut self.gdt, n).ok();
                return Err(Error::NoFreeBlocks);
            }
        };
        let block_size = self.sb.block_size();
        let content = dirent::init_new_dir_block(block_size, n, parent_num);
        if let Err(e) = self.io.write_block(data_block, &content) {
            alloc::free(&mut self.io, &mut self.sb, &mut self.gdt, data_block).ok();
            inode::free(&mut self.io, &mut self.sb, &mut self.gdt, n).ok();
            return Err(e);
        }

        let mut new_inode = Inode::zeroed();
        new_inode.mode = S_IFDIR | 0o755;
        new_inode.links_count = 2;
        new_inode.atime = now;
        new_inode.ctime = now;
        new_inode.mtime = now;
        new_inode.size_low = block_size;
        new_inode.blocks = block_size / 512;
        new_inode.block[0] = data_block;
        inode::write(&mut self.io, &self.sb, &self.gdt, n, &new_inode)?;

        if let Err(e) = self.link_child(parent_num, &mut parent, &leaf, n, FT_DIR) {
            alloc::free(&mut self.io, &mut self.sb, &mut self.gdt, data_block).ok();
            inode::free(&mut self.io, &mut self.sb, &mut self.gdt, n).ok();
            return Err(e);
        }

        parent.links_count += 1;
        parent.mtime = now;
        parent.atime = now;
        inode::write(&mut self.io, &self.sb, &self.gdt, parent_num, &parent)?;
        Ok(n)
    }

    /// Removes the empty directory at `path`. Refuses `/`, `.`, and `..` outright, and any
    /// directory still holding entries besides its own `.`/`..`.
    pub fn remove_directory(&mut self, cwd: u32, path: &[u8], now: u32) -> Result<()> {
        if path == b"/" || path == b"." || path == b".." {
            return Err(Error::RefusedRemoval("\"/\", \".\", or \"..\""));
        }
        let n = self.resolve(cwd, path)?;
        if n == ROOT_INODE {
            return Err(Error::RefusedRemoval("the root directory"));
        }
        let dir = self.read_inode(n)?;
        if !dir.is_dir() {
            return Err(Error::NotADirectory(path_name(path)));
        }
        if !self.directory_is_empty(&dir)? {
            return Err(Error::NotEmpty(path_name(path)));
        }

        let (parent_num, leaf) = path::resolve_parent(&mut self.io, &self.sb, &self.gdt, cwd, path)?;
        let mut parent = self.read_inode(parent_num)?;
        let (block_num, _) = self
            .locate_entry(&parent, &leaf)?
            .ok_or_else(|| Error::NotFound(path_name(path)))?;
        let block = self.io.read_block_vec(block_num)?;
        let updated = dirent::remove_entry(&block, &leaf)?;
        self.io.write_block(block_num, &updated)?;

        indirect::free_all(&mut self.io, &mut self.sb, &mut self.gdt, &dir)?;
        let mut zeroed = Inode::zeroed();
        zeroed.dtime = now;
        inode::write(&mut self.io, &self.sb, &self.gdt, n, &zeroed)?;
        inode::free(&mut self.io, &mut self.sb, &mut self.gdt, n)?;

        parent.links_count -= 1;
        parent.mtime = now;
        parent.atime = now;
        inode::write(&mut self.io, &self.sb, &self.gdt, parent_num, &parent)?;
        Ok(())
    }

    /// Renames `old_name` to `new_name` within `cwd`. Both are plain names, not paths — this never
    /// moves an entry to a different directory. Fails with [`Error::NameTooLong`] if the new name
    /// doesn't fit the existing record in place.
    pub fn rename_in_cwd(
        &mut self,
        cwd: u32,
        old_name: &[u8],
        new_name: &[u8],
        now: u32,
    ) -> Result<()> {
        dirent::validate_name(old_name)?;
        dirent::validate_name(new_name)?;
        let mut dir = self.read_inode(cwd)?;
        if !dir.is_dir() {
            return Err(Error::NotADirectory(path_name(old_name)));
        }
        if self.locate_entry(&dir, new_name)?.is_some() {
            return Err(Error::AlreadyExists(path_name(new_name)));
        }
        let (block_num, entry) = self
            .locate_entry(&dir, old_name)?
            .ok_or_else(|| Error::NotFound(path_name(old_name)))?;

        let block = self.io.read_block_vec(block_num)?;
        let updated = dirent::rename_entry(&block, old_name, new_name)?;
        self.io.write_block(block_num, &updated)?;

        let mut target = self.read_inode(entry.inode)?;
        target.ctime = now;
        inode::write(&mut self.io, &self.sb, &self.gdt, entry.inode, &target)?;

        dir.mtime = now;
        inode::write(&mut self.io, &self.sb, &self.gdt, cwd, &dir)?;
        Ok(())
    }

    /// Looks up `name` among `dir`'s entries, scanning every block in its chain. Returns the
    /// block the entry lives in alongside the decoded entry, so a caller can edit and rewrite
    /// just that block.
    fn locate_entry(&mut self, dir: &Inode, name: &[u8]) -> Result<Option<(u32, DirectoryEntry)>> {
        let mut found = None;
        indirect::enumerate(&mut self.io, &self.sb, dir, |io, b| {
            let block = io.read_block_vec(b)?;
            if let Some(e) = dirent::search(&block, name) {
                found = Some((b, e));
                return Ok(false);
            }
            Ok(true)
        })?;
        Ok(found)
    }

    /// True iff every data block of `dir` holds only `.` and `..`.
    fn directory_is_empty(&mut self, dir: &Inode) -> Result<bool> {
        let mut empty = true;
        indirect::enumerate(&mut self.io, &self.sb, dir, |io, b| {
            let block = io.read_block_vec(b)?;
            if !dirent::is_empty(&block) {
                empty = false;
                return Ok(false);
            }
            Ok(true)
        })?;
        Ok(empty)
    }

    /// Links `child_inode` into `parent`'s directory entries under `name`: tries to split the
    /// final entry of an existing data block first (Phase A), and only allocates and links in a
    /// new block (Phase B) if every existing block is full.
    fn link_child(
        &mut self,
        parent_num: u32,
        parent: &mut Inode,
        name: &[u8],
        child_inode: u32,
        file_type: u8,
    ) -> Result<()> {
        let chain = indirect::collect(&mut self.io, &self.sb, parent)?;
        for b in &chain.data_blocks {
            let block = self.io.read_block_vec(*b)?;
            if let Some(updated) = dirent::add_entry(&block, name, child_inode, file_type)? {
                self.io.write_block(*b, &updated)?;
                return Ok(());
            }
        }

        let new_block = alloc::allocate(&mut self.io, &mut self.sb, &mut self.gdt, parent_num)?
            .ok_or(Error::NoFreeBlocks)?;
        let content =
            dirent::init_single_entry_block(self.sb.block_size(), child_inode, name, file_type);
        if let Err(e) = self.io.write_block(new_block, &content) {
            alloc::free(&mut self.io, &mut self.sb, &mut self.gdt, new_block).ok();
            return Err(e);
        }
        if let Err(e) = self.link_block_into_chain(parent_num, parent, new_block) {
            alloc::free(&mut self.io, &mut self.sb, &mut self.gdt, new_block).ok();
            return Err(e);
        }
        Ok(())
    }

    /// Links an already-allocated, already-written data block into `parent`'s pointer tree:
    /// direct slots first, then single indirect, then double indirect. Directories never grow
    /// into triple indirect. Any pointer block allocated along the way is rolled back if a later
    /// step in the same call fails.
    fn link_block_into_chain(
        &mut self,
        parent_num: u32,
        parent: &mut Inode,
        data_block: u32,
    ) -> Result<()> {
        let block_size = self.sb.block_size();

        for i in 0..DIRECT_PTRS {
            if parent.block[i] == 0 {
                parent.block[i] = data_block;
                bump_size_for_data_block(parent, block_size);
                return Ok(());
            }
        }

        let ppb = (block_size / 4) as usize;

        if parent.block[SINGLE_INDIRECT] == 0 {
            let l1 = alloc::allocate(&mut self.io, &mut self.sb, &mut self.gdt, parent_num)?
                .ok_or(Error::DirectoryFull)?;
            let mut table = vec![0u8; block_size as usize];
            table[0..4].copy_from_slice(&data_block.to_le_bytes());
            if let Err(e) = self.io.write_block(l1, &table) {
                alloc::free(&mut self.io, &mut self.sb, &mut self.gdt, l1).ok();
                return Err(e);
            }
            parent.block[SINGLE_INDIRECT] = l1;
            bump_size_for_data_block(parent, block_size);
            bump_blocks_for_pointer_block(parent, block_size);
            return Ok(());
        }
        {
            let mut table = self.io.read_block_vec(parent.block[SINGLE_INDIRECT])?;
            for i in 0..ppb {
                let off = i * 4;
                if read_u32(&table, off) == 0 {
                    table[off..off + 4].copy_from_slice(&data_block.to_le_bytes());
                    self.io.write_block(parent.block[SINGLE_INDIRECT], &table)?;
                    bump_size_for_data_block(parent, block_size);
                    return Ok(());
                }
            }
        }

        if parent.block[DOUBLE_INDIRECT] == 0 {
            let l2 = alloc::allocate(&mut self.io, &mut self.sb, &mut self.gdt, parent_num)?
                .ok_or(Error::DirectoryFull)?;
            let mut l2table = vec![0u8; block_size as usize];
            l2table[0..4].copy_from_slice(&data_block.to_le_bytes());
            if let Err(e) = self.io.write_block(l2, &l2table) {
                alloc::free(&mut self.io, &mut self.sb, &mut self.gdt, l2).ok();
                return Err(e);
            }
            let l1 = match alloc::allocate(&mut self.io, &mut self.sb, &mut self.gdt, parent_num) {
                Ok(Some(b)) => b,
                Ok(None) => {
                    alloc::free(&mut self.io, &mut self.sb, &mut self.gdt, l2).ok();
                    return Err(Error::DirectoryFull);
                }
                Err(e) => {
                    alloc::free(&mut self.io, &mut self.sb, &mut self.gdt, l2).ok();
                    return Err(e);
                }
            };
            let mut l1table = vec![0u8; block_size as usize];
            l1table[0..4].copy_from_slice(&l2.to_le_bytes());
            if let Err(e) = self.io.write_block(l1, &l1table) {
                alloc::free(&mut self.io, &mut self.sb, &mut self.gdt, l1).ok();
                alloc::free(&mut self.io, &mut self.sb, &mut self.gdt, l2).ok();
                return Err(e);
            }
            parent.block[DOUBLE_INDIRECT] = l1;
            bump_size_for_data_block(parent, block_size);
            bump_blocks_for_pointer_block(parent, block_size);
            bump_blocks_for_pointer_block(parent, block_size);
            return Ok(());
        }

        let mut l1table = self.io.read_block_vec(parent.block[DOUBLE_INDIRECT])?;
        for i in 0..ppb {
            let off = i * 4;
            let l2ptr = read_u32(&l1table, off);
            if l2ptr == 0 {
                let l2 = alloc::allocate(&mut self.io, &mut self.sb, &mut self.gdt, parent_num)?
                    .ok_or(Error::DirectoryFull)?;
                let mut l2table = vec![0u8; block_size as usize];
                l2table[0..4].copy_from_slice(&data_block.to_le_bytes());
                if let Err(e) = self.io.write_block(l2, &l2table) {
                    alloc::free(&mut self.io, &mut self.sb, &mut self.gdt, l2).ok();
                    return Err(e);
                }
                l1table[off..off + 4].copy_from_slice(&l2.to_le_bytes());
                self.io.write_block(parent.block[DOUBLE_INDIRECT], &l1table)?;
                bump_size_for_data_block(parent, block_size);
                bump_blocks_for_pointer_block(parent, block_size);
                return Ok(());
            }
            let mut l2table = self.io.read_block_vec(l2ptr)?;
            for j in 0..ppb {
                let off2 = j * 4;
                if read_u32(&l2table, off2) == 0 {
                    l2table[off2..off2 + 4].copy_from_slice(&data_block.to_le_bytes());
                    self.io.write_block(l2ptr, &l2table)?;
                    bump_size_for_data_block(parent, block_size);
                    return Ok(());
                }
            }
        }

        Err(Error::DirectoryFull)
    }
}

/// Accounts for a newly-linked data block: grows both the logical size and the 512-byte sector
/// count. Ext2 reports `i_size` as the logical byte extent of a file's *data*; pointer blocks
/// never contribute to it, only to `i_blocks`.
fn bump_size_for_data_block(inode: &mut Inode, block_size: u32) {
    inode.size_low += block_size;
    inode.blocks += block_size / 512;
}

/// Accounts for a newly-allocated indirect pointer block: it occupies disk space (`i_blocks`)
/// but is not part of the directory's logical content (`i_size`).
fn bump_blocks_for_pointer_block(inode: &mut Inode, block_size: u32) {
    inode.blocks += block_size / 512;
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutil::format_image;

    fn mount(path: &std::path::Path) -> FileSystem {
        let file = File::options().read(true).write(true).open(path).unwrap();
        FileSystem::mount(file).unwrap()
    }

    #[test]
    fn create_write_read_round_trip() {
        let (path, _) = format_image(1024, 1, 64, 1024);
        let mut fs = mount(&path);
        let n = fs.create_file(ROOT_INODE, b"hello.txt", 100).unwrap();
        assert_eq!(fs.resolve(ROOT_INODE, b"/hello.txt").unwrap(), n);
        let content = fs.read_file_content(ROOT_INODE, b"hello.txt").unwrap();
        assert!(content.is_empty());
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn create_file_rejects_duplicate_name() {
        let (path, _) = format_image(1024, 1, 64, 1024);
        let mut fs = mount(&path);
        fs.create_file(ROOT_INODE, b"a", 1).unwrap();
        assert!(matches!(
            fs.create_file(ROOT_INODE, b"a", 1),
            Err(Error::AlreadyExists(_))
        ));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn delete_file_frees_inode_and_unlinks() {
        let (path, _) = format_image(1024, 1, 64, 1024);
        let mut fs = mount(&path);
        let n = fs.create_file(ROOT_INODE, b"a", 1).unwrap();
        fs.delete_file(ROOT_INODE, b"a", 2).unwrap();
        assert!(matches!(
            fs.resolve(ROOT_INODE, b"a"),
            Err(Error::NotFound(_))
        ));
        let reused = fs.create_file(ROOT_INODE, b"b", 3).unwrap();
        assert_eq!(reused, n);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn make_and_remove_directory_round_trip() {
        let (path, _) = format_image(1024, 1, 64, 1024);
        let mut fs = mount(&path);
        let d = fs.make_directory(ROOT_INODE, b"sub", 1).unwrap();
        let root_after = fs.read_inode(ROOT_INODE).unwrap();
        assert_eq!({ root_after.links_count }, 3);

        fs.create_file(d, b"inner", 2).unwrap();
        assert!(matches!(
            fs.remove_directory(ROOT_INODE, b"sub", 3),
            Err(Error::NotEmpty(_))
        ));
        fs.delete_file(d, b"inner", 3).unwrap();
        fs.remove_directory(ROOT_INODE, b"sub", 4).unwrap();
        assert!(matches!(
            fs.resolve(ROOT_INODE, b"sub"),
            Err(Error::NotFound(_))
        ));
        let root_final = fs.read_inode(ROOT_INODE).unwrap();
        assert_eq!({ root_final.links_count }, 2);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn remove_directory_refuses_root_and_dot_names() {
        let (path, _) = format_image(1024, 1, 64, 1024);
        let mut fs = mount(&path);
        assert!(matches!(
            fs.remove_directory(ROOT_INODE, b"/", 1),
            Err(Error::RefusedRemoval(_))
        ));
        assert!(matches!(
            fs.remove_directory(ROOT_INODE, b".", 1),
            Err(Error::RefusedRemoval(_))
        ));
        assert!(matches!(
            fs.remove_directory(ROOT_INODE, b"..", 1),
            Err(Error::RefusedRemoval(_))
        ));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn rename_in_cwd_updates_name_and_ctime() {
        let (path, _) = format_image(1024, 1, 64, 1024);
        let mut fs = mount(&path);
        let n = fs.create_file(ROOT_INODE, b"old", 1).unwrap();
        fs.rename_in_cwd(ROOT_INODE, b"old", b"new", 5).unwrap();
        assert!(matches!(
            fs.resolve(ROOT_INODE, b"old"),
            Err(Error::NotFound(_))
        ));
        assert_eq!(fs.resolve(ROOT_INODE, b"new").unwrap(), n);
        let renamed = fs.read_inode(n).unwrap();
        assert_eq!({ renamed.ctime }, 5);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn rename_rejects_existing_new_name() {
        let (path, _) = format_image(1024, 1, 64, 1024);
        let mut fs = mount(&path);
        fs.create_file(ROOT_INODE, b"a", 1).unwrap();
        fs.create_file(ROOT_INODE, b"b", 1).unwrap();
        assert!(matches!(
            fs.rename_in_cwd(ROOT_INODE, b"a", b"b", 2),
            Err(Error::AlreadyExists(_))
        ));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn directory_grows_a_second_block_when_the_first_fills() {
        let (path, _) = format_image(1024, 1, 256, 4096);
        let mut fs = mount(&path);
        let mut created = Vec::new();
        for i in 0..120u32 {
            let name = format!("f{i}");
            let n = fs
                .create_file(ROOT_INODE, name.as_bytes(), i)
                .unwrap_or_else(|e| panic!("create {name} failed: {e}"));
            created.push((name, n));
        }
        let root = fs.read_inode(ROOT_INODE).unwrap();
        assert_ne!({ root.block[1] }, 0, "root should have grown a second data block");
        for (name, n) in created {
            assert_eq!(fs.resolve(ROOT_INODE, name.as_bytes()).unwrap(), n);
        }
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn list_dir_includes_dot_and_created_entries() {
        let (path, _) = format_image(1024, 1, 64, 1024);
        let mut fs = mount(&path);
        fs.create_file(ROOT_INODE, b"a", 1).unwrap();
        let entries = fs.list_dir(ROOT_INODE, None).unwrap();
        let names: Vec<&[u8]> = entries.iter().map(|e| e.name.as_slice()).collect();
        assert!(names.contains(&b".".as_slice()));
        assert!(names.contains(&b"..".as_slice()));
        assert!(names.contains(&b"a".as_slice()));
        std::fs::remove_file(path).ok();
    }
}
