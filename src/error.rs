//! The error type shared by every layer of the filesystem engine.

use std::io;

/// An error produced by the filesystem engine.
///
/// Every public operation on [`crate::fs::FileSystem`] and the components it is built from
/// returns this type instead of a bare [`io::Error`], so a caller can distinguish a failed
/// `open(2)` from a corrupt image from a policy violation (e.g. removing a non-empty directory)
/// without parsing a message.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A read or write syscall against the backing image failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Fewer bytes were transferred than the block size requires.
    #[error("short I/O on block {block}: expected {expected} bytes, got {got}")]
    ShortIo {
        block: u32,
        expected: usize,
        got: usize,
    },

    /// A block number fell outside `[0, blocks_count)`, or outside `[first_data_block,
    /// blocks_count)` where data blocks are expected.
    #[error("block {block} out of range (valid range is {low}..{high})")]
    BlockOutOfRange { block: u32, low: u32, high: u32 },

    /// An inode number fell outside `[1, inodes_count]`.
    #[error("inode {inode} out of range (valid range is 1..={max})")]
    InodeOutOfRange { inode: u32, max: u32 },

    /// A write targeted block 0, which holds the boot sector and must never be overwritten by
    /// this engine.
    #[error("refused to write block 0 (boot area)")]
    WriteBlockZero,

    /// The image failed superblock or group-descriptor validation at mount time.
    #[error("invalid filesystem image: {0}")]
    BadFormat(&'static str),

    /// The inode bitmap has no clear bit left in any group, even though counters may disagree.
    #[error("no free inodes")]
    NoFreeInodes,

    /// The block bitmap has no clear bit left in any group.
    #[error("no free blocks")]
    NoFreeBlocks,

    /// A directory has no room for a new entry at any indirection level (direct, single, or
    /// double indirect).
    #[error("directory has no room for a new entry")]
    DirectoryFull,

    /// A directory block was found with a zero `rec_len`, which would loop forever if walked.
    #[error("corrupt directory block {block}: zero rec_len at offset {offset}")]
    CorruptDirectory { block: u32, offset: u32 },

    /// A name exceeded the 255-byte on-disk limit, or a rename's replacement didn't fit the
    /// entry's existing `rec_len`.
    #[error("name too long (max 255 bytes)")]
    NameTooLong,

    /// A name contained a `/`, which directory entries cannot represent.
    #[error("name must not contain '/'")]
    NameContainsSlash,

    /// `PathResolver` (or a parent lookup inside the façade) couldn't find a component.
    #[error("no such file or directory: {0}")]
    NotFound(String),

    /// `create_file`/`make_directory` found an entry already using the requested name.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// An operation that requires a directory (`cd`, `ls`, `rmdir`, directory traversal) was
    /// given a non-directory inode.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// An operation that requires a regular file (`cat`) was given a directory.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// `rmdir` was called on a directory containing entries other than "." and "..".
    #[error("directory not empty: {0}")]
    NotEmpty(String),

    /// `rmdir` was called on "/", ".", or "..", which this engine never removes.
    #[error("refused to remove {0}")]
    RefusedRemoval(&'static str),
}

/// A specialized [`Result`] using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
