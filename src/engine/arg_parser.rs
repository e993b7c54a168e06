use clap::Parser;
use std::path::PathBuf;

struct DefaultArgs;

impl DefaultArgs {
    pub const DIR: &'static str = ".";
    pub const ID: &'static str = "photobatch";
}

/// Batch image conversion: resize every image in a folder and archive the originals.
#[derive(Clone, Parser)]
#[command(name = "photobatch")]
#[command(
    about = "Resize a folder of images into a dated collection folder and archive the originals."
)]
pub struct Cli {
    /// Image folder (or a single image). Default: current directory.
    #[arg(value_name = "DIR", default_value = DefaultArgs::DIR)]
    pub dir: PathBuf,

    /// Collection name, appended to the date range in the output folder name.
    #[arg(long, short = 'c')]
    pub collection: String,

    /// Settings file. Default: `photobatch.toml` in DIR when present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Folder under which the collection folder is created. Default: ~/Pictures.
    #[arg(long, short = 'p')]
    pub publish_dir: Option<PathBuf>,

    /// Name of the archive subfolder for the originals.
    #[arg(long, short = 'a')]
    pub archive_name: Option<String>,

    /// Workers per stage.
    #[arg(long, short = 'w', value_parser = clap::value_parser!(usize))]
    pub workers: Option<usize>,

    /// Timeout for one stage on one image, in milliseconds.
    #[arg(long, short = 't', value_parser = clap::value_parser!(u64))]
    pub timeout_ms: Option<u64>,

    /// Target width in pixels (with height, gives the resize area).
    #[arg(long)]
    pub width: Option<u32>,

    /// Target height in pixels.
    #[arg(long)]
    pub height: Option<u32>,

    /// Move originals into the archive folder instead of copying them.
    #[arg(long, short = 'm', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub move_original: Option<bool>,

    /// Skip images whose capture date can not be read instead of dating them now.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub strict_metadata: Option<bool>,

    /// Image tool command line prefix, e.g. "magick convert".
    #[arg(long)]
    pub tool: Option<String>,

    /// Print progress messages as JSON lines.
    #[arg(long)]
    pub json: bool,

    /// Process id stamped on progress messages.
    #[arg(long, default_value = DefaultArgs::ID)]
    pub id: String,

    /// Verbose output.
    #[arg(long, short = 'v', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub verbose: Option<bool>,
}
