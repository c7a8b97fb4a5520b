//! Path resolution: walking `/`-separated components from either the root or a caller-supplied
//! current directory, one directory-entry lookup per component.

use crate::block_io::BlockIo;
use crate::dirent;
use crate::error::{Error, Result};
use crate::indirect;
use crate::inode::{self, Inode};
use crate::superblock::{GroupTable, Superblock};

const ROOT_INODE: u32 = 2;

/// Splits `path` into `(is_absolute, components)`, dropping empty components so that `//a//b/`
/// behaves the same as `/a/b`.
fn split(path: &[u8]) -> (bool, Vec<&[u8]>) {
    let absolute = path.first() == Some(&b'/');
    let components = path.split(|&b| b == b'/').filter(|c| !c.is_empty()).collect();
    (absolute, components)
}

/// Looks up `name` among `dir`'s entries, scanning every block in its chain.
fn find_in_directory(
    io: &mut BlockIo,
    sb: &Superblock,
    dir: &Inode,
    name: &[u8],
) -> Result<Option<dirent::DirectoryEntry>> {
    let mut found = None;
    indirect::enumerate(io, sb, dir, |io, b| {
        let block = io.read_block_vec(b)?;
        found = dirent::search(&block, name);
        Ok(found.is_none())
    })?;
    Ok(found)
}

/// Resolves `path` to an inode number, starting from `cwd` for relative paths or the root for
/// absolute ones (a leading `/`).
pub fn resolve(
    io: &mut BlockIo,
    sb: &Superblock,
    gdt: &GroupTable,
    cwd: u32,
    path: &[u8],
) -> Result<u32> {
    let (absolute, components) = split(path);
    let mut current = if absolute { ROOT_INODE } else { cwd };
    for comp in components {
        let dir = inode::read(io, sb, gdt, current)?;
        if !dir.is_dir() {
            return Err(Error::NotADirectory(String::from_utf8_lossy(comp).into_owned()));
        }
        let entry = find_in_directory(io, sb, &dir, comp)?
            .ok_or_else(|| Error::NotFound(String::from_utf8_lossy(comp).into_owned()))?;
        current = entry.inode;
    }
    Ok(current)
}

/// Resolves everything but the last component of `path` to a directory inode, returning that
/// inode number alongside the final component's name. Used by operations that create, remove, or
/// rename the named entry itself rather than read through it.
pub fn resolve_parent(
    io: &mut BlockIo,
    sb: &Superblock,
    gdt: &GroupTable,
    cwd: u32,
    path: &[u8],
) -> Result<(u32, Vec<u8>)> {
    let (absolute, components) = split(path);
    let Some((leaf, parents)) = components.split_last() else {
        return Err(Error::NameTooLong);
    };
    let mut current = if absolute { ROOT_INODE } else { cwd };
    for comp in parents {
        let dir = inode::read(io, sb, gdt, current)?;
        if !dir.is_dir() {
            return Err(Error::NotADirectory(String::from_utf8_lossy(comp).into_owned()));
        }
        let entry = find_in_directory(io, sb, &dir, comp)?
            .ok_or_else(|| Error::NotFound(String::from_utf8_lossy(comp).into_owned()))?;
        current = entry.inode;
    }
    Ok((current, leaf.to_vec()))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::superblock::{GroupTable, Superblock};
    use crate::testutil::{create_file_in_root, format_image};
    use std::fs::File;

    #[test]
    fn resolves_absolute_and_relative_to_root() {
        let (path, _) = format_image(1024, 1, 32, 1024);
        let mut file = File::options().read(true).write(true).open(&path).unwrap();
        let mut sb = Superblock::load(&mut file).unwrap();
        let mut gdt = GroupTable::load(&mut file, &sb).unwrap();
        let mut io = BlockIo::new(file, sb.block_size(), sb.blocks_count).unwrap();

        let n = create_file_in_root(&mut io, &mut sb, &mut gdt, b"hello.txt", b"hi").unwrap();
        let found = resolve(&mut io, &sb, &gdt, ROOT_INODE, b"/hello.txt").unwrap();
        assert_eq!(found, n);
        let found_rel = resolve(&mut io, &sb, &gdt, ROOT_INODE, b"hello.txt").unwrap();
        assert_eq!(found_rel, n);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn resolve_parent_splits_leaf() {
        let (path, _) = format_image(1024, 1, 32, 1024);
        let mut file = File::options().read(true).write(true).open(&path).unwrap();
        let sb = Superblock::load(&mut file).unwrap();
        let gdt = GroupTable::load(&mut file, &sb).unwrap();
        let mut io = BlockIo::new(file, sb.block_size(), sb.blocks_count).unwrap();

        let (parent, leaf) =
            resolve_parent(&mut io, &sb, &gdt, ROOT_INODE, b"/new.txt").unwrap();
        assert_eq!(parent, ROOT_INODE);
        assert_eq!(leaf, b"new.txt");
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn resolve_missing_component_errors() {
        let (path, _) = format_image(1024, 1, 32, 1024);
        let mut file = File::options().read(true).write(true).open(&path).unwrap();
        let sb = Superblock::load(&mut file).unwrap();
        let gdt = GroupTable::load(&mut file, &sb).unwrap();
        let mut io = BlockIo::new(file, sb.block_size(), sb.blocks_count).unwrap();
        assert!(matches!(
            resolve(&mut io, &sb, &gdt, ROOT_INODE, b"/nope"),
            Err(Error::NotFound(_))
        ));
        std::fs::remove_file(path).ok();
    }
}
