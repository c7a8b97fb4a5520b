//! Streams a regular file's content out of its block chain. A thin wrapper over
//! [`indirect::read_all_to_buffer`]; the type check (is this actually a regular file?) belongs to
//! the caller, which has the path string to put in a useful error.

use crate::block_io::BlockIo;
use crate::error::Result;
use crate::indirect;
use crate::inode::Inode;
use crate::superblock::Superblock;

/// Reads the full content of `inode`'s data, up to its recorded size.
pub fn read_file(io: &mut BlockIo, sb: &Superblock, inode: &Inode) -> Result<Vec<u8>> {
    indirect::read_all_to_buffer(io, sb, inode)
}
