//! Command-line interface definitions and parsing.

use clap::{value_parser, Arg, ArgMatches, Command};
use std::path::PathBuf;

/// Command-line arguments for the Meridian server.
///
/// Anything given here overrides the matching value in the configuration file.
#[derive(Debug, Clone, PartialEq)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional override for the number of in-process nodes
    pub nodes: Option<usize>,
    /// Optional override for the number of bots (implies bots enabled)
    pub bots: Option<usize>,
    /// Disable the bot simulation regardless of configuration
    pub no_bots: bool,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
}

impl CliArgs {
    /// Parses the process arguments.
    pub fn parse() -> Self {
        Self::from_matches(&Self::command().get_matches())
    }

    /// Parses an explicit argument list, first item being the program name.
    pub fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Ok(Self::from_matches(&Self::command().try_get_matches_from(args)?))
    }

    fn command() -> Command {
        Command::new("Meridian")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Distributed aggregation of moving positions into map-ready clusters")
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path")
                    .default_value("meridian.toml"),
            )
            .arg(
                Arg::new("nodes")
                    .short('n')
                    .long("nodes")
                    .value_name("COUNT")
                    .help("Number of in-process cluster nodes")
                    .value_parser(value_parser!(usize)),
            )
            .arg(
                Arg::new("bots")
                    .short('b')
                    .long("bots")
                    .value_name("COUNT")
                    .help("Number of simulated users to run")
                    .value_parser(value_parser!(usize))
                    .conflicts_with("no-bots"),
            )
            .arg(
                Arg::new("no-bots")
                    .long("no-bots")
                    .help("Disable the bot simulation")
                    .action(clap::ArgAction::SetTrue),
            )
            .arg(
                Arg::new("log-level")
                    .short('l')
                    .long("log-level")
                    .value_name("LEVEL")
                    .help("Log level (trace, debug, info, warn, error)"),
            )
            .arg(
                Arg::new("json-logs")
                    .long("json-logs")
                    .help("Output logs in JSON format")
                    .action(clap::ArgAction::SetTrue),
            )
    }

    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("meridian.toml")),
            nodes: matches.get_one::<usize>("nodes").copied(),
            bots: matches.get_one::<usize>("bots").copied(),
            no_bots: matches.get_flag("no-bots"),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
        }
    }
}
