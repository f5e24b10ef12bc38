// CLI configuration
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// oxitag - read and rewrite tags of ASF, MP4, FLAC and MP3 files
#[derive(Parser, Debug)]
#[command(name = "oxitag")]
#[command(about = "Byte-exact audio tag reader and rewriter", long_about = None)]
#[command(version)]
pub struct Config {
    /// Output format
    #[arg(short, long, value_enum, default_value = "pretty", global = true)]
    pub format: OutputFormat,

    /// Quiet mode (suppress progress messages)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug logging on stderr)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Do not decode embedded pictures
    #[arg(long, global = true)]
    pub skip_artwork: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for tags and listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON
    #[default]
    Pretty,
    /// Compact JSON, one document per line
    Json,
    /// `id=value` lines
    KeyValue,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Read tags from audio file(s)
    Read {
        /// Audio file path(s)
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,

        /// Output to file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Detect file format
    Detect {
        /// Audio file path(s)
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,
    },

    /// List the top-level chunks that hold the tag
    Chunks {
        /// Audio file path
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Set or remove fields and rewrite the file
    Set {
        /// Audio file path
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// KEY=VALUE assignments; `cover=<image path>` replaces the artwork
        #[arg(value_name = "KEY=VALUE")]
        assignments: Vec<String>,

        /// Remove every value of a field
        #[arg(short, long, value_name = "KEY")]
        remove: Vec<String>,
    },

    /// Export cover art
    ExportCover {
        /// Audio file path
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output directory for cover images
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Cover index (for files with multiple covers)
        #[arg(short, long)]
        index: Option<usize>,
    },

    /// Look up the legacy genre table; lists it without a query
    Genre {
        /// Genre id or name
        query: Option<String>,
    },

    /// Read every file matching a glob pattern
    Batch {
        /// Directory path
        #[arg(short, long, default_value = ".")]
        directory: PathBuf,

        /// File pattern (e.g., "*.m4a", "**/*.flac")
        #[arg(short, long)]
        pattern: String,
    },

    /// Show file information
    Info {
        /// Audio file path(s)
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,
    },
}

impl Config {
    /// Default log filter when RUST_LOG is not set
    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "warn"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_set() {
        let config = Config::try_parse_from([
            "oxitag",
            "set",
            "song.flac",
            "title=Song",
            "track=3/12",
            "--remove",
            "comment",
            "-v",
        ])
        .unwrap();
        assert_eq!(config.log_level(), "debug");
        match config.command {
            Commands::Set {
                assignments,
                remove,
                ..
            } => {
                assert_eq!(assignments, vec!["title=Song", "track=3/12"]);
                assert_eq!(remove, vec!["comment"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_format() {
        let config =
            Config::try_parse_from(["oxitag", "read", "a.m4a", "--format", "key-value"]).unwrap();
        assert_eq!(config.format, OutputFormat::KeyValue);
        assert_eq!(config.log_level(), "warn");
        assert!(Config::try_parse_from(["oxitag", "read"]).is_err());
    }
}
