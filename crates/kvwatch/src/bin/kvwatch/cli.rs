//! kvwatch cli interface

use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::Formatter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Settings file (toml)
    ///
    /// Settings can also be given as environment variables,
    /// e.g. KVWATCH__METADATA__BACKEND_NODES=10.0.0.1:80
    #[clap(short = 'c', long = "config", global(true))]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the flattened values below the given keys
    Get(GetCommand),

    /// Print the values below a prefix again every time they change
    Watch(WatchCommand),

    /// Flatten a JSON or YAML document read from stdin
    Flatten(FlattenCommand),
}

#[derive(Parser, Debug)]
pub struct GetCommand {
    #[clap(flatten)]
    pub output: OutputArgs,

    /// Keys to read, e.g. /self/service
    #[arg(required = true)]
    pub keys: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct WatchCommand {
    #[clap(flatten)]
    pub output: OutputArgs,

    /// Re-poll interval in seconds
    ///
    /// Used between watch calls, backends without change notification return from every watch immediately.
    #[arg(short = 'i', long = "interval", default_value_t = 10)]
    pub interval: u64,

    /// Prefix to watch
    pub prefix: String,

    /// Only changes below these keys count (defaults to the prefix)
    pub keys: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct FlattenCommand {
    #[clap(flatten)]
    pub output: OutputArgs,

    /// Key the document is rooted at
    #[arg(short = 'r', long = "root", default_value = "/")]
    pub root: String,
}

#[derive(Parser, Debug)]
pub struct OutputArgs {
    #[arg(short = 'F', long = "output-format", default_value_t)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum OutputFormat {
    Json,
    #[default]
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}
