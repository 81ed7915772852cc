use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::dashboard::PlaybackSpeed;
use crate::processors::CollisionPolicy;

#[derive(Parser)]
#[command(name = "firesmoke-archive")]
#[command(about = "Download, reconcile and browse wildfire-smoke dispersion forecasts")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Log file path")]
    pub log_file: Option<PathBuf>,

    #[arg(
        short,
        long,
        global = true,
        help = "Configuration file [default: firesmoke.toml if present]"
    )]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download every configured forecast run for each day of a date range
    FetchRange {
        #[arg(long, help = "First date (YYYY-MM-DD)")]
        start: NaiveDate,

        #[arg(long, help = "Last date, inclusive (YYYY-MM-DD)")]
        end: NaiveDate,

        #[arg(
            short,
            long = "forecast",
            help = "Restrict to these forecast ids [default: whole registry]"
        )]
        forecasts: Vec<String>,

        #[arg(long, help = "Concurrent downloads [default: from configuration]")]
        max_concurrent: Option<usize>,

        #[arg(long, help = "Download again even when the file already exists")]
        overwrite: bool,
    },

    /// Download one day of every configured forecast run
    FetchDaily {
        #[arg(short, long, help = "Date to fetch (YYYY-MM-DD) [default: yesterday]")]
        date: Option<NaiveDate>,

        #[arg(short, long = "forecast")]
        forecasts: Vec<String>,
    },

    /// Download the current snapshot and archive it if its timestamp is new
    FetchLatest {
        #[arg(short, long, help = "Canonical archive directory [default: from configuration]")]
        archive: Option<PathBuf>,
    },

    /// Merge download directories into a canonically named archive
    Canonicalize {
        #[arg(short, long = "source", required = true, help = "Source directories, in merge order")]
        sources: Vec<PathBuf>,

        #[arg(short, long, help = "Destination archive [default: from configuration]")]
        dest: Option<PathBuf>,

        #[arg(short, long, help = "flag, keep-first or keep-last [default: from configuration]")]
        policy: Option<CollisionPolicy>,

        #[arg(long, default_value_t = num_cpus::get())]
        max_workers: usize,

        #[arg(long, help = "Report what would be merged without copying anything")]
        dry_run: bool,
    },

    /// List files present in a source directory but missing from the destination
    Verify {
        #[arg(short, long = "source", required = true)]
        sources: Vec<PathBuf>,

        #[arg(short, long)]
        dest: Option<PathBuf>,

        #[arg(long, help = "Print the audit as JSON")]
        json: bool,
    },

    /// Write a CSV manifest of the canonical archive
    Manifest {
        #[arg(short, long)]
        archive: Option<PathBuf>,

        #[arg(
            short,
            long,
            help = "Output CSV path [default: output/firesmoke-manifest-{YYMMDD}.csv]"
        )]
        output: Option<PathBuf>,
    },

    /// Look up one hour of PM2.5 at a resolution level
    Query {
        #[arg(short, long = "file", required = true)]
        files: Vec<PathBuf>,

        #[arg(short, long)]
        date: NaiveDate,

        #[arg(long, default_value = "0")]
        hour: u32,

        #[arg(short, long, default_value = "0")]
        resolution: u32,
    },

    /// Render one PNG per archived hour, taken from the newest forecast covering it
    Frames {
        #[arg(short, long)]
        archive: Option<PathBuf>,

        #[arg(short, long, default_value = "frames")]
        output: PathBuf,

        #[arg(long, help = "Render workers [default: from configuration]")]
        workers: Option<usize>,

        #[arg(long, help = "Fixed colour scale minimum (ug/m3)")]
        scale_min: Option<f32>,

        #[arg(long, help = "Fixed colour scale maximum (ug/m3)")]
        scale_max: Option<f32>,
    },

    /// Play the dashboard forward and save each displayed frame
    Animate {
        #[arg(short, long = "file", required = true)]
        files: Vec<PathBuf>,

        #[arg(short, long, help = "Start date [default: first day of the data]")]
        date: Option<NaiveDate>,

        #[arg(short, long, default_value = "0")]
        resolution: u32,

        #[arg(long, default_value = "24", help = "Number of frames to capture")]
        frames: usize,

        #[arg(short, long, default_value = "normal", help = "slow, normal or fast")]
        speed: PlaybackSpeed,

        #[arg(short, long, default_value = "animation")]
        output: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fetch_range() {
        let cli = Cli::parse_from([
            "firesmoke-archive",
            "fetch-range",
            "--start",
            "2021-03-04",
            "--end",
            "2021-03-06",
            "--forecast",
            "BSC00CA12-01",
            "-v",
        ]);
        assert!(cli.verbose);
        match cli.command {
            Commands::FetchRange {
                start,
                end,
                forecasts,
                max_concurrent,
                overwrite,
            } => {
                assert_eq!(start, NaiveDate::from_ymd_opt(2021, 3, 4).unwrap());
                assert_eq!(end, NaiveDate::from_ymd_opt(2021, 3, 6).unwrap());
                assert_eq!(forecasts, vec!["BSC00CA12-01".to_string()]);
                assert_eq!(max_concurrent, None);
                assert!(!overwrite);
            }
            _ => panic!("expected fetch-range"),
        }
    }

    #[test]
    fn test_parse_canonicalize_keeps_source_order() {
        let cli = Cli::parse_from([
            "firesmoke-archive",
            "canonicalize",
            "-s",
            "b",
            "-s",
            "a",
            "--policy",
            "keep-last",
        ]);
        match cli.command {
            Commands::Canonicalize {
                sources, policy, ..
            } => {
                assert_eq!(sources, vec![PathBuf::from("b"), PathBuf::from("a")]);
                assert_eq!(policy, Some(CollisionPolicy::KeepLast));
            }
            _ => panic!("expected canonicalize"),
        }
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Cli::try_parse_from(["firesmoke-archive", "fetch-daily", "-d", "yesterday"]).is_err());
        assert!(Cli::try_parse_from([
            "firesmoke-archive",
            "canonicalize",
            "-s",
            "a",
            "--policy",
            "newest"
        ])
        .is_err());
        assert!(Cli::try_parse_from(["firesmoke-archive", "verify"]).is_err());
    }
}
