//! recfilter: airtime gating for ARIB transport streams.
//!
//! Reads 188-byte TS packets reduced upstream to a single service, and
//! either forwards only the packets inside a target event's airtime
//! (`filter-program`) or reports the event's timing changes as JSON lines
//! (`track-airtime`).

use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use clap::{Parser, Subcommand};
use log::info;

mod error;
mod filter;
mod logging;
mod pcr;
mod pipeline;
mod ts;

use filter::{AirtimeTracker, AirtimeTrackerOptions, ProgramFilter, ProgramFilterOptions};
use pipeline::{feed_packets, JsonlWriter, PacketReader, WriteSink};

/// recfilter - airtime gating for ARIB transport streams
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Configuration file path
    #[arg(short = 'f', long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory where log files are stored (stderr only when unset)
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Forward only the packets inside the target event's airtime
    FilterProgram {
        /// Target service id
        #[arg(long)]
        sid: u16,

        /// Target event id
        #[arg(long)]
        eid: u16,

        /// PCR value observed at --clock-time
        #[arg(long)]
        clock_pcr: i64,

        /// Wall-clock instant paired with --clock-pcr; read as JST unless an
        /// offset is given
        #[arg(long, value_parser = parse_clock_time)]
        clock_time: DateTime<Utc>,

        /// Widen the window before the event start, in milliseconds
        #[arg(long)]
        start_margin: Option<i64>,

        /// Widen the window past the event end, in milliseconds
        #[arg(long)]
        end_margin: Option<i64>,

        /// Forward PAT packets live while waiting for the window
        #[arg(long)]
        pre_streaming: bool,

        /// Input TS file (stdin when omitted)
        file: Option<PathBuf>,
    },

    /// Emit one JSON line per EIT update for the target event
    TrackAirtime {
        /// Target service id
        #[arg(long)]
        sid: u16,

        /// Target event id
        #[arg(long)]
        eid: u16,

        /// Input TS file (stdin when omitted)
        file: Option<PathBuf>,
    },
}

/// Configuration file format.
#[derive(Debug, serde::Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    logging: LoggingSection,
    #[serde(default)]
    filter: FilterSection,
}

#[derive(Debug, serde::Deserialize, Default)]
struct LoggingSection {
    log_dir: Option<String>,
    level: Option<String>,
}

#[derive(Debug, serde::Deserialize, Default)]
struct FilterSection {
    start_margin: Option<i64>,
    end_margin: Option<i64>,
}

fn load_config(path: &PathBuf) -> Result<ConfigFile, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    let config: ConfigFile = toml::from_str(&contents)?;
    Ok(config)
}

/// Parse a clock instant: RFC 3339, or "%Y-%m-%d %H:%M:%S" taken as JST.
fn parse_clock_time(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map_err(|e| format!("invalid clock time: {}", e))?;
    let jst = FixedOffset::east_opt(9 * 3600).expect("valid fixed offset");
    naive
        .and_local_timezone(jst)
        .single()
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| "invalid clock time".to_string())
}

fn open_input(file: &Option<PathBuf>) -> io::Result<Box<dyn Read>> {
    match file {
        Some(path) => Ok(Box::new(File::open(path)?)),
        None => Ok(Box::new(io::stdin())),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load config file: explicit path > auto-detect > default.
    let config_path = args.config.clone().or_else(|| {
        let default_path = PathBuf::from("recfilter.toml");
        if default_path.exists() {
            Some(default_path)
        } else {
            None
        }
    });
    let file_config = match &config_path {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config file: {}", e);
                return Err(e);
            }
        },
        None => ConfigFile::default(),
    };

    // Command line takes precedence over the config file.
    let log_dir = args
        .log_dir
        .clone()
        .or_else(|| file_config.logging.log_dir.as_deref().map(PathBuf::from));
    logging::init_logging(
        args.verbose,
        log_dir.as_deref(),
        file_config.logging.level.as_deref(),
    )?;

    match args.command {
        Command::FilterProgram {
            sid,
            eid,
            clock_pcr,
            clock_time,
            start_margin,
            end_margin,
            pre_streaming,
            file,
        } => {
            let option = ProgramFilterOptions {
                sid,
                eid,
                clock_pcr,
                clock_time,
                start_margin_ms: start_margin
                    .or(file_config.filter.start_margin)
                    .unwrap_or(0),
                end_margin_ms: end_margin.or(file_config.filter.end_margin).unwrap_or(0),
                pre_streaming,
            };
            info!(
                "Filtering SID#{:04X} EID#{:04X}, margins {}ms/{}ms",
                sid, eid, option.start_margin_ms, option.end_margin_ms
            );

            let mut reader = PacketReader::new(open_input(&file)?);
            let mut filter = ProgramFilter::new(option);
            filter.connect(Box::new(WriteSink::new(io::stdout())));
            feed_packets(&mut reader, &mut filter)?;
        }
        Command::TrackAirtime { sid, eid, file } => {
            info!("Tracking airtime of SID#{:04X} EID#{:04X}", sid, eid);

            let mut reader = PacketReader::new(open_input(&file)?);
            let mut tracker = AirtimeTracker::new(
                AirtimeTrackerOptions { sid, eid },
                JsonlWriter::new(io::stdout()),
            );
            feed_packets(&mut reader, &mut tracker)?;
        }
    }

    Ok(())
}
