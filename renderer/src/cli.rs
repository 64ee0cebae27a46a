use std::path::PathBuf;

use clap::{ArgAction, Parser};
use engine::WriterArg;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Project file to load
    #[arg(value_name = "PROJECT")]
    pub project: PathBuf,

    /// Writer to render as NAME[:FIRST:LAST[:STEP]]; repeat for several.
    /// All writers of the project are rendered when omitted.
    #[arg(short = 'w', long = "writer", value_name = "NAME[:FIRST:LAST[:STEP]]")]
    pub writers: Vec<WriterArg>,

    /// Collect timing and memory statistics
    #[arg(long = "stats")]
    pub stats: bool,

    /// Start the batch and poll for completion instead of blocking on it
    #[arg(long = "no-block")]
    pub no_block: bool,

    /// Render each writer in its own renderer process
    #[arg(long = "separate-process")]
    pub separate_process: bool,

    /// Base directory for relative writer outputs (defaults to the project's directory)
    #[arg(long = "output-dir", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Settings file to use instead of the user configuration
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Verbosity: -v info, -vv debug, -vvv trace
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbosity: u8,
}
