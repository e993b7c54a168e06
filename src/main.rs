//! Photobatch CLI: resize a folder of images into a dated collection and archive the originals.

use anyhow::Result;
use clap::Parser;
use photobatch::engine::arg_parser::Cli;
use photobatch::engine::handle_run;
use std::time::Instant;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    handle_run(&cli)?;
    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(())
}
