//! directblk CLI.
//!
//! Probes and benchmarks raw block devices through unbuffered, block-addressed
//! transfers.
//!
//! # Quick Start
//!
//! ```bash
//! # Write one block of 0xAA at block 3 and read it back
//! directblk probe /dev/raw1 --block 3
//!
//! # Run the read/write suite from directblk.toml
//! directblk bench --device /dev/raw1 --runs 5 --json report.json
//!
//! # Show the resolved configuration
//! directblk config show
//! ```

mod commands;
mod style;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// directblk - direct block-device I/O probe and benchmark.
#[derive(Parser)]
#[command(name = "directblk")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version information.
    Version,

    /// Write one block of a byte pattern and read it back.
    Probe {
        /// Device or image file to probe.
        path: PathBuf,

        /// Block address to probe.
        #[arg(short, long, default_value = "0")]
        block: i64,

        /// Go through the page cache instead of bypassing it.
        #[arg(long)]
        buffered: bool,

        /// Byte written to every position of the block (e.g. 0xAA or 170).
        #[arg(short, long, default_value = "0xAA", value_parser = parse_byte)]
        pattern: u8,

        /// Block size in bytes (default from configuration).
        #[arg(long)]
        block_size: Option<usize>,

        /// Project directory holding directblk.toml.
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,
    },

    /// Run the random-address read/write benchmark suite.
    Bench {
        /// Device to benchmark (default from configuration).
        #[arg(short, long)]
        device: Option<PathBuf>,

        /// Go through the page cache instead of bypassing it.
        #[arg(long)]
        buffered: bool,

        /// Repetitions of every measurement.
        #[arg(short, long)]
        runs: Option<u32>,

        /// Blocks per measurement, comma separated (e.g. 100,200,500).
        #[arg(short, long, value_delimiter = ',')]
        blocks: Option<Vec<u32>>,

        /// Random addresses are drawn from [0, SPAN).
        #[arg(short, long)]
        span: Option<u64>,

        /// Operations to run, comma separated.
        #[arg(short, long, value_delimiter = ',', default_value = "read,write")]
        operations: Vec<directblk_bench::Operation>,

        /// RNG seed for a reproducible address sequence.
        #[arg(long)]
        seed: Option<u64>,

        /// Write the full report as JSON to this file.
        #[arg(long)]
        json: Option<PathBuf>,

        /// Save the JSON report under <PROJECT_DIR>/benches/.
        #[arg(long, conflicts_with = "json")]
        save: bool,

        /// Project directory holding directblk.toml.
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,
    },

    /// Configuration commands.
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the resolved configuration.
    Show {
        /// Project directory holding directblk.toml.
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,

        /// Output format (toml, json).
        #[arg(short, long, default_value = "toml")]
        format: String,
    },
}

fn parse_byte(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse::<u8>(),
    };
    parsed.map_err(|e| format!("invalid byte '{s}': {e}"))
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    style::set_no_color(cli.no_color);

    match cli.command {
        Commands::Version => {
            commands::version::run();
            Ok(())
        }
        Commands::Probe {
            path,
            block,
            buffered,
            pattern,
            block_size,
            project_dir,
        } => commands::probe::run(&commands::probe::ProbeArgs {
            path,
            block,
            buffered,
            pattern,
            block_size,
            project_dir,
        }),
        Commands::Bench {
            device,
            buffered,
            runs,
            blocks,
            span,
            operations,
            seed,
            json,
            save,
            project_dir,
        } => commands::bench::run(commands::bench::BenchArgs {
            device,
            buffered,
            runs,
            blocks,
            span,
            operations,
            seed,
            json,
            save,
            project_dir,
        }),
        Commands::Config(cmd) => match cmd {
            ConfigCommands::Show {
                project_dir,
                format,
            } => commands::config::show(&project_dir, &format),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_and_decimal_bytes() {
        assert_eq!(parse_byte("0xAA"), Ok(0xAA));
        assert_eq!(parse_byte("0X0f"), Ok(0x0F));
        assert_eq!(parse_byte("170"), Ok(170));
        assert!(parse_byte("0x100").is_err());
        assert!(parse_byte("256").is_err());
        assert!(parse_byte("zz").is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
