use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Scans a file or directory for i.MX Authentication Containers, legacy
/// IVTs, and FIT/FDT blobs.
#[derive(Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// File or directory to scan.
    pub path: PathBuf,

    /// Enable diagnostic traces.
    #[arg(short, long)]
    pub verbose: bool,

    /// Sweep step and alignment.
    #[arg(short, long, default_value_t = 4)]
    pub increment: usize,

    /// Embed image payload bytes in the report instead of only ranges.
    #[arg(short = 'I', long = "include-image-contents")]
    pub include_image_contents: bool,

    /// Write each image payload to disk next to the scanned file.
    #[arg(short, long)]
    pub extract: bool,

    /// Report serialization format. `auto` prefers YAML.
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Auto)]
    pub output_format: OutputFormat,
}

#[derive(ValueEnum, Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Auto,
    Yaml,
    Json,
}
