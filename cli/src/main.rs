mod terminal;

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use hcepay::tlv::EmvRecord;
use hcepay::{Card, Settings, Track2};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::terminal::Terminal;

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error("Could not read the settings: {0}")]
    Io(#[from] io::Error),

    #[error("Settings are not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Command APDU is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error(transparent)]
    Card(#[from] hcepay::card::Error),

    #[error("The terminal could not complete the transaction: {0}")]
    Terminal(#[from] terminal::Error),
}

type Result<T> = std::result::Result<T, Error>;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Magnetic-stripe track data in ISO/IEC 7813 format
    #[arg(long, global = true, conflicts_with = "settings")]
    swipe_data: Option<String>,

    /// JSON settings file, e.g. {"swipe_data": "...;PAN=DATA?"}
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Logs every APDU exchanged
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Prints the Read Record response built from the swipe data
    Encode,

    /// Answers each command APDU given in hex
    Respond {
        #[arg(required = true)]
        apdus: Vec<String>,
    },

    /// Plays a whole tap from the terminal side
    Simulate,

    /// Answers hex command APDUs read line by line from stdin.
    /// A line `swipe <data>` replaces the swipe data.
    Serve,
}

impl Cli {
    fn load_settings(&self) -> Result<Settings> {
        if let Some(swipe_data) = &self.swipe_data {
            return Ok(Settings {
                swipe_data: swipe_data.clone(),
            });
        }

        match &self.settings {
            Some(path) => {
                let reader = BufReader::new(File::open(path)?);

                Ok(serde_json::from_reader(reader)?)
            }
            None => Ok(Settings::default()),
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = match verbose {
        true => EnvFilter::new("debug"),
        _ => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn encode(settings: &Settings) -> Result<()> {
    let track2 = Track2::extract(&settings.swipe_data).map_err(hcepay::card::Error::from)?;
    let record =
        EmvRecord::read_record_response(&track2.pack()).map_err(hcepay::card::Error::from)?;

    info!("Track 2 equivalent data: {}", track2);
    println!("{}", hex::encode_upper(record.as_bytes()));

    Ok(())
}

fn respond(card: &Card, apdus: &[String]) -> Result<()> {
    for apdu in apdus {
        let command = hex::decode(apdu.replace(' ', ""))?;
        println!("{}", hex::encode_upper(card.handle(&command)));
    }

    Ok(())
}

fn simulate(card: &Card) -> Result<()> {
    let transaction = Terminal::new(card).tap()?;

    println!("Application: {}", transaction.label);
    println!("AIP: {}", hex::encode_upper(transaction.aip));
    println!("PAN: {}", transaction.track2.pan());
    println!("Data: {}", transaction.track2.discretionary());

    Ok(())
}

fn serve(card: &Card) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();

    for line in stdin.lock().lines() {
        let line = line?;
        let line = line.trim();

        if line.is_empty() {
            continue;
        }

        if let Some(swipe_data) = line.strip_prefix("swipe ") {
            // The card keeps answering with the previous record on failure.
            let _ = card.on_swipe_data_changed(swipe_data.trim());
            continue;
        }

        match hex::decode(line.replace(' ', "")) {
            Ok(command) => writeln!(stdout, "{}", hex::encode_upper(card.handle(&command)))?,
            Err(e) => warn!("Skipping {:?}: {}", line, e),
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = cli.load_settings()?;

    let card = Card::with_settings(&settings);

    match cli.command {
        Command::Encode => encode(&settings),
        Command::Respond { apdus } => respond(&card, &apdus),
        Command::Simulate => simulate(&card),
        Command::Serve => serve(&card),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_settings() {
        let cli = Cli::try_parse_from(["hcepay", "encode", "--swipe-data", ";123456789012=1?"]).unwrap();
        assert_eq!(";123456789012=1?", cli.load_settings().unwrap().swipe_data);

        let cli = Cli::try_parse_from(["hcepay", "simulate"]).unwrap();
        assert_eq!(Settings::default(), cli.load_settings().unwrap());
    }

    #[test]
    fn test_settings_json() {
        let settings: Settings = serde_json::from_str(r#"{"swipe_data": ";123456789012=1?"}"#).unwrap();
        assert_eq!(";123456789012=1?", settings.swipe_data);

        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(Settings::default(), settings);
    }

    #[test]
    fn test_conflicting_sources() {
        assert!(Cli::try_parse_from([
            "hcepay",
            "encode",
            "--swipe-data",
            ";123456789012=1?",
            "--settings",
            "settings.json",
        ])
        .is_err());
    }
}
