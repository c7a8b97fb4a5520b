//! One function per driver command, translating parsed arguments into façade calls and formatting
//! their results. Argument counts and unknown commands are reported the same way any other
//! command failure is: to stderr, without unwinding the REPL.

use super::Cwd;
use ext2fs::error::{Error, Result};
use ext2fs::inode::Inode;
use ext2fs::superblock::Superblock;
use ext2fs::FileSystem;
use std::io::Write;

/// Dispatches one already-split command line. `cwd` is updated in place by `cd`; every other
/// command only reads it.
pub fn dispatch(fs: &mut FileSystem, cwd: &mut Cwd, cmd: &str, args: &[&str], now: u32) -> Result<()> {
    match cmd {
        "ls" => ls(fs, cwd, args),
        "cd" => cd(fs, cwd, args),
        "pwd" => {
            println!("{}", cwd.display());
            Ok(())
        }
        "cat" => cat(fs, cwd, args),
        "attr" => attr(fs, cwd, args),
        "info" => info(fs),
        "touch" => touch(fs, cwd, args, now),
        "rm" => rm(fs, cwd, args, now),
        "mkdir" => mkdir(fs, cwd, args, now),
        "rmdir" => rmdir(fs, cwd, args, now),
        "rename" => rename(fs, cwd, args, now),
        "cp" => cp(fs, cwd, args),
        "print" => print_cmd(fs, args),
        "help" => {
            print_help();
            Ok(())
        }
        other => {
            eprintln!("unknown command: {other}");
            Ok(())
        }
    }
}

fn need_arg<'a>(args: &[&'a str], i: usize, what: &'static str) -> Result<&'a str> {
    args.get(i)
        .copied()
        .ok_or_else(|| Error::NotFound(format!("missing argument: {what}")))
}

fn ls(fs: &mut FileSystem, cwd: &Cwd, args: &[&str]) -> Result<()> {
    let path = args.first().map(|s| s.as_bytes());
    let entries = fs.list_dir(cwd.inode, path)?;
    for e in entries {
        let kind = match e.file_type {
            ext2fs::inode::FT_DIR => 'd',
            ext2fs::inode::FT_REG_FILE => '-',
            _ => '?',
        };
        println!("{kind} {:>8} {}", e.inode, String::from_utf8_lossy(&e.name));
    }
    Ok(())
}

fn cd(fs: &mut FileSystem, cwd: &mut Cwd, args: &[&str]) -> Result<()> {
    let path = need_arg(args, 0, "path")?;
    let n = fs.change_dir(cwd.inode, path.as_bytes())?;
    cwd.components = cwd.advance(path.as_bytes());
    cwd.inode = n;
    Ok(())
}

fn cat(fs: &mut FileSystem, cwd: &Cwd, args: &[&str]) -> Result<()> {
    let path = need_arg(args, 0, "path")?;
    let content = fs.read_file_content(cwd.inode, path.as_bytes())?;
    std::io::stdout().write_all(&content).ok();
    Ok(())
}

fn attr(fs: &mut FileSystem, cwd: &Cwd, args: &[&str]) -> Result<()> {
    let path = need_arg(args, 0, "path")?;
    let n = fs.resolve(cwd.inode, path.as_bytes())?;
    let inode = fs.read_inode(n)?;
    print_inode(n, &inode);
    Ok(())
}

fn info(fs: &mut FileSystem) -> Result<()> {
    let sb = fs.read_superblock_snapshot();
    let groups = fs.group_table_snapshot().len();
    println!("block size: {}", sb.block_size());
    println!(
        "inodes: {} ({} free)",
        { sb.inodes_count },
        { sb.free_inodes_count }
    );
    println!(
        "blocks: {} ({} free)",
        { sb.blocks_count },
        { sb.free_blocks_count }
    );
    println!("groups: {groups}");

    let mismatches: Vec<_> = fs
        .check_group_consistency()?
        .into_iter()
        .filter(|c| !c.blocks_match() || !c.inodes_match())
        .collect();
    if mismatches.is_empty() {
        println!("bitmaps: consistent with group counters");
    } else {
        for c in mismatches {
            println!(
                "bitmaps: group {} counters disagree with its bitmap (blocks: {} vs {}, inodes: {} vs {})",
                c.group, c.free_blocks_counter, c.free_blocks_bitmap, c.free_inodes_counter, c.free_inodes_bitmap
            );
        }
    }
    Ok(())
}

fn touch(fs: &mut FileSystem, cwd: &Cwd, args: &[&str], now: u32) -> Result<()> {
    let path = need_arg(args, 0, "path")?;
    fs.create_file(cwd.inode, path.as_bytes(), now)?;
    Ok(())
}

fn rm(fs: &mut FileSystem, cwd: &Cwd, args: &[&str], now: u32) -> Result<()> {
    let path = need_arg(args, 0, "path")?;
    fs.delete_file(cwd.inode, path.as_bytes(), now)
}

fn mkdir(fs: &mut FileSystem, cwd: &Cwd, args: &[&str], now: u32) -> Result<()> {
    let path = need_arg(args, 0, "path")?;
    fs.make_directory(cwd.inode, path.as_bytes(), now)?;
    Ok(())
}

fn rmdir(fs: &mut FileSystem, cwd: &Cwd, args: &[&str], now: u32) -> Result<()> {
    let path = need_arg(args, 0, "path")?;
    fs.remove_directory(cwd.inode, path.as_bytes(), now)
}

fn rename(fs: &mut FileSystem, cwd: &Cwd, args: &[&str], now: u32) -> Result<()> {
    let old = need_arg(args, 0, "old name")?;
    let new = need_arg(args, 1, "new name")?;
    fs.rename_in_cwd(cwd.inode, old.as_bytes(), new.as_bytes(), now)
}

fn cp(fs: &mut FileSystem, cwd: &Cwd, args: &[&str]) -> Result<()> {
    let src = need_arg(args, 0, "source path")?;
    let dst = need_arg(args, 1, "host destination path")?;
    let content = fs.read_file_content(cwd.inode, src.as_bytes())?;
    std::fs::write(dst, content).map_err(Error::Io)
}

fn print_cmd(fs: &mut FileSystem, args: &[&str]) -> Result<()> {
    match need_arg(args, 0, "superblock|inode|groups")? {
        "superblock" => print_superblock(&fs.read_superblock_snapshot()),
        "groups" => {
            for (i, g) in fs.group_table_snapshot().iter().enumerate() {
                println!(
                    "group {i}: block_bitmap={} inode_bitmap={} inode_table={} free_blocks={} free_inodes={} used_dirs={}",
                    { g.block_bitmap },
                    { g.inode_bitmap },
                    { g.inode_table },
                    { g.free_blocks_count },
                    { g.free_inodes_count },
                    { g.used_dirs_count },
                );
            }
            for c in fs.check_group_consistency()? {
                let blocks_flag = if c.blocks_match() { "ok" } else { "MISMATCH" };
                let inodes_flag = if c.inodes_match() { "ok" } else { "MISMATCH" };
                println!(
                    "group {}: bitmap recount free_blocks={} ({blocks_flag}) free_inodes={} ({inodes_flag})",
                    c.group, c.free_blocks_bitmap, c.free_inodes_bitmap
                );
            }
        }
        "inode" => {
            let n: u32 = need_arg(args, 1, "inode number")?
                .parse()
                .map_err(|_| Error::NotFound("inode number must be an integer".to_string()))?;
            let inode = fs.read_inode(n)?;
            print_inode(n, &inode);
        }
        other => eprintln!("print: unknown target {other}"),
    }
    Ok(())
}

fn print_superblock(sb: &Superblock) {
    println!("magic: {:#06x}", { sb.magic });
    println!("inodes_count: {}", { sb.inodes_count });
    println!("blocks_count: {}", { sb.blocks_count });
    println!("free_inodes_count: {}", { sb.free_inodes_count });
    println!("free_blocks_count: {}", { sb.free_blocks_count });
    println!("block_size: {}", sb.block_size());
    println!("blocks_per_group: {}", { sb.blocks_per_group });
    println!("inodes_per_group: {}", { sb.inodes_per_group });
    println!("rev_level: {}", { sb.rev_level });
}

fn print_inode(n: u32, inode: &Inode) {
    println!("inode {n}");
    println!("  mode: {:#o}", { inode.mode });
    println!("  links_count: {}", { inode.links_count });
    println!("  size: {}", inode.size());
    println!("  atime: {}", { inode.atime });
    println!("  ctime: {}", { inode.ctime });
    println!("  mtime: {}", { inode.mtime });
    println!("  dtime: {}", { inode.dtime });
    println!("  blocks: {}", { inode.blocks });
}

fn print_help() {
    println!("ls [path]                 list a directory");
    println!("cd <path>                 change the current directory");
    println!("pwd                       print the current directory");
    println!("cat <path>                print a file's content");
    println!("attr <path>               print an inode's attributes");
    println!("info                      print filesystem-wide counters");
    println!("touch <path>              create an empty file");
    println!("rm <path>                 delete a file");
    println!("mkdir <path>              create a directory");
    println!("rmdir <path>              remove an empty directory");
    println!("rename <old> <new>        rename an entry in the current directory");
    println!("cp <src> <host-dst>       copy a file out to the host filesystem");
    println!("print superblock|groups|inode <n>   dump raw structures");
    println!("exit, quit                leave the shell");
}
