use super::endpoint::{self, SideOptions};
use crate::context::{AppContext, VerbosityLevel};
use libreplica::Result;
use libreplica::transfer::Options;
use libreplica::transfer::options::{with_copy_by_chunk, with_speed};

/// Arguments of the copy command
#[derive(Debug)]
pub struct CopyArgs {
    pub src: String,
    pub dst: String,
    pub speed: u32,
    pub chunked: bool,
    pub override_existing: bool,
    pub src_side: SideOptions,
    pub dst_side: SideOptions,
}

/// Handle the copy command
pub async fn handle_copy(ctx: &AppContext, args: CopyArgs) -> Result<()> {
    let src = endpoint::resource(&args.src, &args.src_side)?;
    let dst = endpoint::resource(&args.dst, &args.dst_side)?.with_override(args.override_existing);
    let opts = Options::new([with_speed(args.speed), with_copy_by_chunk(args.chunked)]);
    if ctx.verbosity >= VerbosityLevel::Verbose {
        eprintln!(
            "Copying {} to {} (speed: {} KB/s, chunked: {}, override: {})",
            args.src, args.dst, opts.speed, opts.copy_by_chunk, args.override_existing
        );
    }

    ctx.replica
        .run(&format!("copy {} {}", args.src, args.dst), &src, &dst, &opts)
        .await?;

    if ctx.token.is_cancelled() {
        eprintln!("⚠ Copy interrupted");
    } else {
        println!("✓ Copied {} to {}", args.src, args.dst);
    }
    Ok(())
}
