use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use miku_sfs::mkfs::MkfsParams;
use sfs_builder::build_image;

#[derive(Debug, Parser)]
#[command(version, about = "Build an sfs volume image from a directory tree.")]
struct Args {
    /// Image file to write; an existing file is overwritten.
    image: PathBuf,

    /// Directory whose contents become the volume's root.
    source: PathBuf,

    /// Total blocks in the volume.
    #[arg(long, default_value_t = MkfsParams::default().size)]
    size: u32,

    /// Data blocks.
    #[arg(long, default_value_t = MkfsParams::default().nblocks)]
    nblocks: u32,

    /// Log blocks.
    #[arg(long, default_value_t = MkfsParams::default().nlog)]
    nlog: u32,

    /// Inodes.
    #[arg(long, default_value_t = MkfsParams::default().ninodes)]
    ninodes: u32,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let params = MkfsParams::new(args.size, args.nblocks, args.nlog, args.ninodes);

    match build_image(&args.image, &args.source, &params) {
        Ok(report) => {
            log::info!(
                "[mkfs] {}: {} of {} blocks used, {} inodes",
                args.image.display(), report.used_blocks, report.total_blocks, report.inodes_used
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("mkfs-sfs: {}", e);
            ExitCode::FAILURE
        }
    }
}
