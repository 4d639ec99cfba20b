//! Formatter CLI: one positional path argument, no flags.
//!
//! Grounded on `LENSHOOD-xv6-rust/mkfs/src/main.rs` — a small `clap`-derive
//! binary over a filesystem-core library crate.

use std::process::ExitCode;

use bbfs::device::{Cache, FileDevice};
use bbfs::mkfs;
use clap::Parser;

/// Format a device or file as a fresh bbfs image.
#[derive(Parser, Debug)]
#[command(name = "mkfs", about = "Format a device or file as a fresh bbfs image")]
struct Args {
    /// Device or regular file to format.
    path: std::path::PathBuf,
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(&args.path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("mkfs: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(path: &std::path::Path) -> bbfs::Result<()> {
    let device = FileDevice::open(path, bbfs::layout::PAGE_SIZE)?;
    let mut cache = Cache::new(device);
    // No ambient uid/gid source in this crate (§1: identity is the
    // embedder's responsibility); the root inode is formatted owned by 0/0.
    mkfs::format(&mut cache, 0, 0)?;
    Ok(())
}
