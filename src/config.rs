//! Configuration.
//!
//! Everything the running parts of the crate need to know is collected
//! into a [`Config`] before anything starts. The value is frozen from
//! the command line arguments; nothing re-reads configuration later.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use clap::{ArgAction, Parser};
use log::LevelFilter;


//------------ Args ----------------------------------------------------------

/// The command line arguments.
#[derive(Clone, Debug, Parser)]
#[command(name = "lodestar", version, about = "RPKI relying party software")]
pub struct Args {
    /// Directory containing the trust anchor locators
    #[arg(long, value_name = "DIR", default_value = "tals")]
    tal_dir: PathBuf,

    /// Directory to keep the local repository copy in
    #[arg(long, value_name = "DIR", default_value = "repository")]
    cache_dir: PathBuf,

    /// The rsync command to run
    #[arg(long, value_name = "COMMAND", default_value = "rsync")]
    rsync_command: String,

    /// Additional arguments passed to the rsync command
    #[arg(long = "rsync-arg", value_name = "ARG", allow_hyphen_values = true)]
    rsync_args: Vec<String>,

    /// Maximum number of rsync processes running in parallel
    #[arg(long, value_name = "COUNT", default_value_t = 4)]
    fetch_concurrency: usize,

    /// Seconds between the start of two validation cycles
    #[arg(long, value_name = "SECONDS", default_value_t = 600)]
    refresh: u64,

    /// Retry interval in seconds advertised to RTR clients
    #[arg(long, value_name = "SECONDS", default_value_t = 600)]
    retry: u64,

    /// Expire time in seconds advertised to RTR clients
    #[arg(long, value_name = "SECONDS", default_value_t = 7200)]
    expire: u64,

    /// Number of data set versions to keep for incremental updates
    #[arg(long, value_name = "COUNT", default_value_t = 10)]
    history_size: usize,

    /// Abort a validation cycle after this many seconds
    #[arg(long, value_name = "SECONDS", default_value_t = 3600)]
    deadline: u64,

    /// Address and port to listen on for RTR connections
    #[arg(long, value_name = "ADDR:PORT", default_value = "0.0.0.0:323")]
    rtr_listen: SocketAddr,

    /// Close RTR connections idle for this many seconds
    #[arg(long, value_name = "SECONDS", default_value_t = 3600)]
    rtr_timeout: u64,

    /// Path to a SLURM file with local exceptions
    #[arg(long, value_name = "FILE")]
    slurm: Option<PathBuf>,

    /// Reject stale manifests and CRLs instead of warning
    #[arg(long)]
    strict: bool,

    /// Parse Ghostbusters records instead of skipping them
    #[arg(long)]
    parse_gbr: bool,

    /// Log more information, twice for even more
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}


//------------ Config --------------------------------------------------------

/// The frozen configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// The directory containing the trust anchor locators.
    pub tal_dir: PathBuf,

    /// The directory the repository is mirrored under.
    pub cache_dir: PathBuf,

    /// The rsync command.
    pub rsync_command: String,

    /// Additional arguments for the rsync command.
    pub rsync_args: Vec<String>,

    /// How many fetches may run in parallel.
    pub fetch_concurrency: usize,

    /// The time between the start of two validation cycles.
    pub refresh: Duration,

    /// The retry interval advertised to RTR clients.
    pub retry: Duration,

    /// The expire time advertised to RTR clients.
    pub expire: Duration,

    /// The number of data set versions to keep.
    pub history_size: usize,

    /// The wall-clock limit for a validation cycle.
    pub deadline: Duration,

    /// The RTR listen address.
    pub rtr_listen: SocketAddr,

    /// The RTR client idle timeout.
    pub rtr_timeout: Duration,

    /// The optional SLURM file.
    pub slurm: Option<PathBuf>,

    /// Whether stale manifests and CRLs are rejected.
    pub strict: bool,

    /// Whether Ghostbusters records are parsed.
    pub parse_gbr: bool,

    /// The log level to run with.
    pub log_level: LevelFilter,
}

impl Config {
    /// Creates the configuration from the command line arguments.
    pub fn from_args(args: Args) -> Self {
        Config {
            tal_dir: args.tal_dir,
            cache_dir: args.cache_dir,
            rsync_command: args.rsync_command,
            rsync_args: args.rsync_args,
            fetch_concurrency: args.fetch_concurrency,
            refresh: Duration::from_secs(args.refresh),
            retry: Duration::from_secs(args.retry),
            expire: Duration::from_secs(args.expire),
            history_size: args.history_size,
            deadline: Duration::from_secs(args.deadline),
            rtr_listen: args.rtr_listen,
            rtr_timeout: Duration::from_secs(args.rtr_timeout),
            slurm: args.slurm,
            strict: args.strict,
            parse_gbr: args.parse_gbr,
            log_level: match args.verbose {
                0 => LevelFilter::Warn,
                1 => LevelFilter::Info,
                _ => LevelFilter::Debug,
            },
        }
    }

    /// Returns the timing values handed to RTR clients.
    pub fn timing(&self) -> crate::rtr::server::Timing {
        crate::rtr::server::Timing {
            refresh: self.refresh.as_secs().min(u32::MAX.into()) as u32,
            retry: self.retry.as_secs().min(u32::MAX.into()) as u32,
            expire: self.expire.as_secs().min(u32::MAX.into()) as u32,
        }
    }
}


//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::from_args(
            Args::parse_from(["lodestar"])
        );
        assert_eq!(config.refresh, Duration::from_secs(600));
        assert_eq!(config.history_size, 10);
        assert_eq!(config.rtr_listen.port(), 323);
        assert_eq!(config.log_level, LevelFilter::Warn);
        assert!(!config.strict);
    }

    #[test]
    fn verbosity_and_switches() {
        let config = Config::from_args(Args::parse_from([
            "lodestar", "-vv", "--strict",
            "--rtr-listen", "127.0.0.1:3323",
            "--rsync-arg", "--timeout=30",
        ]));
        assert_eq!(config.log_level, LevelFilter::Debug);
        assert!(config.strict);
        assert_eq!(config.rtr_listen.port(), 3323);
        assert_eq!(config.rsync_args, ["--timeout=30"]);
    }
}
