//! spfc command-line driver
//!
//! Loads a Matrix Market weight matrix, runs the blocked fully-connected
//! layer for the configured number of trials, verifies the result and prints
//! the throughput report to stdout. Diagnostics go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{Parser, ValueEnum};
use tracing::debug;

use spfc::blocking::{ColumnBlocking, InputLayout};
use spfc::config::{DEFAULT_BATCH, DEFAULT_TRIALS, RunConfig};
use spfc::runtime::{available_threads, detect_simd};
use spfc::sparse::IndexWidth;
use spfc::verify::{DEFAULT_TOLERANCE, ZeroPolicy};

/// Exit status for success
const EXIT_SUCCESS: u8 = 0;
/// Exit status for every failure (-1 as an 8-bit status)
const EXIT_FAILURE: u8 = 255;

/// Blocked sparse × dense fully-connected layer benchmark
#[derive(Parser, Debug)]
#[command(name = "spfc")]
#[command(about = "Blocked CSR × dense fully-connected layer: tile, compute, de-block, verify")]
#[command(version)]
struct Cli {
    /// Weight matrix in Matrix Market coordinate format
    #[arg(value_name = "MATRIX")]
    matrix: PathBuf,

    /// Batch width (dense input columns)
    #[arg(value_name = "BATCH", default_value_t = DEFAULT_BATCH)]
    batch: usize,

    /// Number of column blocks over the reduction dimension
    #[arg(value_name = "COL_BLOCKS", conflicts_with = "col_block_size")]
    col_blocks: Option<usize>,

    /// Columns per column block instead of a block count
    #[arg(long, value_name = "N")]
    col_block_size: Option<usize>,

    /// Worker threads [default: available parallelism]
    #[arg(short, long, value_name = "N")]
    threads: Option<usize>,

    /// Timed trials
    #[arg(short, long, value_name = "N", default_value_t = DEFAULT_TRIALS)]
    repeat: usize,

    /// Dense input layout
    #[arg(long, value_enum, default_value_t = LayoutArg::Partitioned)]
    layout: LayoutArg,

    /// Stored column index width
    #[arg(long, value_enum, default_value_t = IndexArg::U32)]
    index: IndexArg,

    /// Preferred batch-block width [default: detected SIMD stripe]
    #[arg(long, value_name = "N")]
    batch_block_width: Option<usize>,

    /// Relative verification tolerance
    #[arg(long, value_name = "TOL", default_value_t = DEFAULT_TOLERANCE)]
    tolerance: f32,

    /// Handling of outputs whose expected value is zero
    #[arg(long, value_enum, default_value_t = ZeroPolicyArg::Absolute)]
    zero_policy: ZeroPolicyArg,

    /// Keep only the first rows/FACTOR weight rows (e.g. 32 for one tile under a simulator)
    #[arg(long, value_name = "FACTOR", default_value_t = 1)]
    scale_down: usize,

    /// Log the reference terms of output element ROW,COL (needs --log-level trace)
    #[arg(long, value_name = "ROW,COL", value_parser = parse_element)]
    trace: Option<(usize, usize)>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, value_name = "LEVEL", default_value = "warn")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

fn parse_element(s: &str) -> std::result::Result<(usize, usize), String> {
    let (row, col) = s
        .split_once(',')
        .ok_or_else(|| format!("expected ROW,COL, got '{s}'"))?;
    let parse = |t: &str| {
        t.trim()
            .parse::<usize>()
            .map_err(|e| format!("'{t}': {e}"))
    };
    Ok((parse(row)?, parse(col)?))
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LayoutArg {
    RowMajor,
    Partitioned,
    Replicated,
}

impl From<LayoutArg> for InputLayout {
    fn from(arg: LayoutArg) -> Self {
        match arg {
            LayoutArg::RowMajor => Self::RowMajor,
            LayoutArg::Partitioned => Self::Partitioned,
            LayoutArg::Replicated => Self::Replicated,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum IndexArg {
    U16,
    U32,
}

impl From<IndexArg> for IndexWidth {
    fn from(arg: IndexArg) -> Self {
        match arg {
            IndexArg::U16 => Self::U16,
            IndexArg::U32 => Self::U32,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ZeroPolicyArg {
    Absolute,
    Exact,
}

impl From<ZeroPolicyArg> for ZeroPolicy {
    fn from(arg: ZeroPolicyArg) -> Self {
        match arg {
            ZeroPolicyArg::Absolute => Self::AbsoluteFallback,
            ZeroPolicyArg::Exact => Self::Exact,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Pretty,
    Compact,
}

impl Cli {
    fn run_config(&self) -> RunConfig {
        let columns = match (self.col_block_size, self.col_blocks) {
            (Some(size), _) => ColumnBlocking::Size(size),
            (None, Some(count)) => ColumnBlocking::Count(count),
            (None, None) => ColumnBlocking::default(),
        };
        RunConfig {
            matrix: self.matrix.clone(),
            batch: self.batch,
            columns,
            threads: self.threads.unwrap_or_else(available_threads),
            trials: self.repeat,
            layout: self.layout.into(),
            index: self.index.into(),
            batch_block_width: self.batch_block_width,
            tolerance: self.tolerance,
            zero_policy: self.zero_policy.into(),
            scale_down: self.scale_down,
            trace: self.trace,
        }
    }
}

fn setup_logging(level: &str, format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        LogFormat::Compact => subscriber.compact().init(),
        LogFormat::Pretty => subscriber.pretty().init(),
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = cli.run_config();
    debug!(?config, simd = %detect_simd(), "starting run");
    config.validate().context("invalid configuration")?;

    let outcome = spfc::pipeline::run(&config)
        .with_context(|| format!("run failed for {}", config.matrix.display()))?;
    println!("{}", outcome.report);
    Ok(())
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => EXIT_SUCCESS,
                _ => EXIT_FAILURE,
            };
            // Help and version go to stdout, usage errors to stderr
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    setup_logging(&cli.log_level, cli.log_format);

    match run(&cli) {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_positional_defaults() {
        let cli = Cli::try_parse_from(["spfc", "m.mtx"]).unwrap();
        let config = cli.run_config();
        assert_eq!(config.batch, 256);
        assert_eq!(config.columns, ColumnBlocking::Count(256));
        assert_eq!(config.trials, 256);
    }

    #[test]
    fn test_positional_overrides() {
        let cli = Cli::try_parse_from([
            "spfc",
            "m.mtx",
            "64",
            "8",
            "--layout",
            "replicated",
            "--index",
            "u16",
        ])
        .unwrap();
        let config = cli.run_config();
        assert_eq!(config.batch, 64);
        assert_eq!(config.columns, ColumnBlocking::Count(8));
        assert_eq!(config.layout, InputLayout::Replicated);
        assert_eq!(config.index, IndexWidth::U16);
    }

    #[test]
    fn test_col_block_size_conflicts_with_count() {
        assert!(
            Cli::try_parse_from(["spfc", "m.mtx", "64", "8", "--col-block-size", "32"]).is_err()
        );
        let cli = Cli::try_parse_from(["spfc", "m.mtx", "--col-block-size", "32"]).unwrap();
        assert_eq!(cli.run_config().columns, ColumnBlocking::Size(32));
    }

    #[test]
    fn test_scale_down_and_trace() {
        let cli = Cli::try_parse_from(["spfc", "m.mtx", "--scale-down", "32", "--trace", "3,7"])
            .unwrap();
        let config = cli.run_config();
        assert_eq!(config.scale_down, 32);
        assert_eq!(config.trace, Some((3, 7)));

        let config = Cli::try_parse_from(["spfc", "m.mtx"]).unwrap().run_config();
        assert_eq!(config.scale_down, 1);
        assert_eq!(config.trace, None);

        assert!(Cli::try_parse_from(["spfc", "m.mtx", "--trace", "3"]).is_err());
        assert!(Cli::try_parse_from(["spfc", "m.mtx", "--trace", "3,x"]).is_err());
    }

    #[test]
    fn test_missing_matrix_is_usage_error() {
        let err = Cli::try_parse_from(["spfc"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }
}
