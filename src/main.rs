//! Entry point for the interactive shell: mount an image and hand it to the REPL.

mod shell;

use ext2fs::FileSystem;
use std::env;
use std::fs::File;
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut args = env::args_os().skip(1);
    let Some(image_path) = args.next() else {
        eprintln!("usage: ext2shell <image-path>");
        return ExitCode::FAILURE;
    };

    let file = match File::options().read(true).write(true).open(&image_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("ext2shell: {}: {e}", image_path.to_string_lossy());
            return ExitCode::FAILURE;
        }
    };

    let fs = match FileSystem::mount(file) {
        Ok(fs) => fs,
        Err(e) => {
            eprintln!("ext2shell: {}: {e}", image_path.to_string_lossy());
            return ExitCode::FAILURE;
        }
    };

    match shell::run(fs) {
        0 => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    }
}
