//! CLI surface.
//!
//! Short flags `-f`, `-p`, `-t` for the three server scalars, an
//! optional settings file, and counted verbosity.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::{Result, catalog, config, server};

#[derive(Parser, Debug)]
#[command(
    name = "boxoffice",
    version,
    about = "Single-host UDP ticket reservation server"
)]
pub struct Cli {
    /// Event catalog: pairs of description / ticket count lines.
    #[arg(short = 'f', long, value_name = "PATH")]
    pub file: PathBuf,

    /// UDP port to listen on.
    #[arg(short = 'p', long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Seconds before an uncollected reservation expires.
    #[arg(short = 't', long, value_name = "SECS")]
    pub timeout: Option<u32>,

    /// Optional TOML settings file; flags override its values.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Debug output (repeat for more).
    #[arg(short = 'v', long, action = ArgAction::Count)]
    pub verbose: u8,
}

pub fn parse_from<I, T>(args: I) -> Cli
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Cli::parse_from(args)
}

pub fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => config::load(path)?,
        None => config::Config::default(),
    };
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(timeout) = cli.timeout {
        config.timeout = timeout;
    }
    config.validate()?;

    let seeds = catalog::load(&cli.file)?;
    tracing::info!(
        file = %cli.file.display(),
        port = config.port,
        timeout = config.timeout,
        events = seeds.len(),
        "starting"
    );
    for (event_id, seed) in seeds.iter().enumerate() {
        tracing::info!(
            event_id,
            description = %String::from_utf8_lossy(&seed.description),
            tickets = seed.ticket_count,
            "catalog event"
        );
    }

    let server = server::Server::bind(&config, seeds)?;
    server.run()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_flags_cover_all_three_scalars() {
        let cli = parse_from(["boxoffice", "-f", "events.txt", "-p", "3000", "-t", "60"]);
        assert_eq!(cli.file, PathBuf::from("events.txt"));
        assert_eq!(cli.port, Some(3000));
        assert_eq!(cli.timeout, Some(60));
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn port_and_timeout_are_optional() {
        let cli = parse_from(["boxoffice", "--file", "events.txt", "-vv"]);
        assert_eq!(cli.port, None);
        assert_eq!(cli.timeout, None);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn file_is_required() {
        let result = Cli::try_parse_from(["boxoffice", "-p", "3000"]);
        assert!(result.is_err());
    }
}
