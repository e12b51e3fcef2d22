use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Engine configuration file (JSON)
    #[arg(long, default_value = "config.json")]
    pub config: PathBuf,
}
