use std::{path::PathBuf, time::Duration};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use flexi_logger::Logger;
use log::*;
use volca_fm_librarian::{
    write_cartridge, Cartridge, ConnectionState, LibrarianConfig, LibrarianService, MidirTransport,
};

// generous upper bound; the session has its own dump timeout
const DUMP_WAIT: Duration = Duration::from_secs(120);

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML file overriding the default settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log specification, e.g. "debug" or "volca_fm_librarian=trace"
    #[arg(short, long)]
    log: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the MIDI input and output ports
    Ports,
    /// Look for a volca fm on every output port
    Detect,
    /// Pull the program bank and write it out as two DX7 cartridges
    Dump {
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => LibrarianConfig::from_file(path)?,
        None => LibrarianConfig::default(),
    };

    let log_spec = args.log.clone().unwrap_or_else(|| config.log_spec.clone());
    let _logger = Logger::try_with_str(&log_spec)
        .with_context(|| format!("invalid log specification {}", log_spec))?
        .start()?;

    let client_name = config.client_name.clone();
    let discovery_wait = config.discovery_timeout() + Duration::from_secs(1);
    let export_dir = config.export_dir.clone();
    let service = LibrarianService::spawn(config, move |inbound| MidirTransport::open(&client_name, inbound));

    match args.command {
        Command::Ports => {
            for port in service.input_ports()? {
                println!("in  {:>3}: {}", port.id, port.name);
            }
            for port in service.output_ports()? {
                println!("out {:>3}: {}", port.id, port.name);
            }
        }
        Command::Detect => {
            detect(&service, discovery_wait)?;
        }
        Command::Dump { out_dir } => {
            detect(&service, discovery_wait)?;

            service.request_dump()?;
            let state = service.wait_for(DUMP_WAIT, |state| {
                matches!(state, ConnectionState::Received | ConnectionState::Error)
            })?;
            if state != ConnectionState::Received {
                bail!("bank dump did not complete ({})", state);
            }

            for (slot, name) in service.program_names()?.iter().enumerate() {
                debug!("{:02}: {}", slot, name);
            }

            let out_dir = out_dir.unwrap_or(export_dir);
            for cartridge in Cartridge::ALL {
                let message = service.export_cartridge(cartridge)?;
                let path = write_cartridge(&out_dir, cartridge, &message)?;
                println!("{}", path.display());
            }
        }
    }

    service.close();
    Ok(())
}

fn detect(service: &LibrarianService, wait: Duration) -> anyhow::Result<()> {
    service.detect()?;
    let state = service.wait_for(wait, |state| state != ConnectionState::Searching)?;

    match (state, service.connection_state()?.1) {
        (ConnectionState::Detected, Some(paired)) => {
            println!("volca fm found: in {}, out {}", paired.input, paired.output);
            Ok(())
        }
        (state, _) => bail!("no volca fm found ({})", state),
    }
}
