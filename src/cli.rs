use clap::Parser;
use std::path::PathBuf;

/// Verbosity levels for log output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum VerbosityLevel {
    /// Only show errors
    Quiet,
    /// Show lifecycle and per-request summaries
    #[default]
    Normal,
    /// Show detailed information
    Verbose,
}

impl VerbosityLevel {
    /// Default tracing filter when `RUST_LOG` is not set
    pub fn filter_directive(self) -> &'static str {
        match self {
            VerbosityLevel::Quiet => "error",
            VerbosityLevel::Normal => "info",
            VerbosityLevel::Verbose => "debug",
        }
    }
}

/// Stream the exiftool tag catalog as JSON over HTTP
#[derive(Parser, Debug, Clone)]
#[command(name = "taginfo-stream")]
#[command(about = "Serve the exiftool tag catalog as a streamed JSON array")]
#[command(version)]
pub struct Cli {
    /// Address to bind the server to
    #[arg(long = "bind-address", value_name = "HOST:PORT")]
    pub bind_address: Option<String>,

    /// Path to exiftool; searched on PATH when omitted
    #[arg(long = "exiftool", value_name = "PATH")]
    pub exiftool: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short = 'q', long = "quiet", conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn verbosity(&self) -> VerbosityLevel {
        if self.quiet {
            VerbosityLevel::Quiet
        } else if self.verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }
}
