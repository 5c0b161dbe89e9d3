use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::mount::DEFAULT_EXTENSION;
use crate::resolver::DEFAULT_REQUEST_DEPTH;

#[derive(Parser, Debug)]
#[command(name = "zipserve")]
#[command(version)]
#[command(about = "Serve files out of ZIP archives, extracting each entry once", long_about = None)]
#[command(after_help = "Examples:\n  \
  zipserve -d ./data list                      list archives in ./data\n  \
  zipserve get /site/img/logo.png > logo.png   resolve a request, body to stdout\n  \
  zipserve entries site -l                     list entries of ./data/site.zip")]
pub struct Cli {
    /// Data directory holding the archives and their extracted contents
    #[arg(short = 'd', long = "data", value_name = "DIR", env = "ZIPSERVE_DATA", default_value = "./data", global = true)]
    pub data_dir: PathBuf,

    /// Leading entry name segments ignored when matching request paths
    #[arg(long, value_name = "N", default_value_t = DEFAULT_REQUEST_DEPTH, global = true)]
    pub depth: usize,

    /// Archive file extension
    #[arg(long = "ext", value_name = "EXT", default_value = DEFAULT_EXTENSION, global = true)]
    pub extension: String,

    /// More log output (-vv for trace)
    #[arg(short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short = 'q', global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve a request path and write the response body
    Get {
        /// Request path, e.g. /site/index.html
        #[arg(value_name = "PATH")]
        path: String,

        /// Resolve as a HEAD request (no body)
        #[arg(long)]
        head: bool,

        /// Write the body to FILE instead of stdout
        #[arg(short = 'o', value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// List archives at the root of the data directory
    List,

    /// List the entries of one archive
    Entries {
        /// Archive name without extension
        #[arg(value_name = "NAME")]
        name: String,

        /// Show sizes, compression ratio and timestamps
        #[arg(short = 'l', long = "long")]
        long: bool,
    },
}

impl Cli {
    /// Default log filter when `RUST_LOG` is unset.
    pub fn log_filter(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "zipserve=info",
            1 => "zipserve=debug",
            _ => "zipserve=trace",
        }
    }
}
