//! An ext2 filesystem engine: mounts a raw image and exposes directory, file, and metadata
//! operations over it. No kernel VFS integration, no write-ahead journal — a userspace library
//! meant to sit underneath a small interactive shell (see `bin/ext2shell`).

pub mod alloc;
pub mod bitmap;
pub mod block_io;
pub mod dirent;
pub mod error;
pub mod fs;
pub mod indirect;
pub mod inode;
pub mod path;
pub mod reader;
mod raw;
pub mod superblock;

#[cfg(test)]
mod testutil;

pub use error::{Error, Result};
pub use fs::FileSystem;
