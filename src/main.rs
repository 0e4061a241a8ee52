use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, LevelFilter};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use universal_network_adapter::cli::{Args, Commands};
use universal_network_adapter::config::{load_config, AdapterConfig};
use universal_network_adapter::security::{
    safe_error_message, sanitize_filename, validate_output_path,
};
use universal_network_adapter::{AdapterRegistry, Destination, RemoteFile};

fn main() -> Result<()> {
    let args = Args::parse();

    initialize_logging(args.verbose)?;

    let config = load_config(args.config.as_deref())?;
    let registry = AdapterRegistry::from_config(&config);
    let destination = build_destination(&args, &config)?;

    if let Err(e) = run(&args, &registry, &destination) {
        error!("{}", safe_error_message(args.command.url(), &e));
        return Err(e);
    }

    Ok(())
}

/// Initialize logging with the specified verbosity level
fn initialize_logging(verbose: bool) -> Result<()> {
    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    TermLogger::init(
        log_level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )
    .context("Failed to initialize logger")?;
    Ok(())
}

/// Build the destination from the URL and the global options
fn build_destination(args: &Args, config: &AdapterConfig) -> Result<Destination> {
    let timeout = args
        .timeout
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.default_timeout());

    let mut destination = Destination::new(args.command.url()).with_timeout(timeout);

    if let Some(protocol) = &args.protocol {
        destination = destination.with_protocol(protocol.clone());
    }

    if let Some(name) = &args.profile {
        let credentials = config
            .profile(name)?
            .to_credentials()
            .context(format!("Failed to load credential profile '{}'", name))?;
        destination = destination.with_credentials(credentials);
    }

    Ok(destination)
}

fn run(args: &Args, registry: &AdapterRegistry, destination: &Destination) -> Result<()> {
    match &args.command {
        Commands::Stat { .. } => {
            let file = registry.stat(destination)?;
            print_files(std::slice::from_ref(&file), args.json)
        }
        Commands::Browse { .. } => {
            let files = registry.browse(destination)?;
            info!("{} entries", files.len());
            print_files(&files, args.json)
        }
        Commands::Download { output, .. } => {
            let file = RemoteFile::from_destination(destination)?;
            download(registry, &file, output.clone())
        }
        Commands::Remove { .. } => {
            let file = RemoteFile::from_destination(destination)?;
            registry.remove(&file)?;
            info!("Removed {}", file.full_path());
            Ok(())
        }
    }
}

/// Download a remote file and copy the staged bytes to the output path
fn download(registry: &AdapterRegistry, file: &RemoteFile, output: Option<PathBuf>) -> Result<()> {
    let output = output.unwrap_or_else(|| PathBuf::from(sanitize_filename(&file.name)));
    validate_output_path(&output)?;

    let mut content = registry.download(file)?;

    let target = File::create(&output)
        .context(format!("Failed to create output file: {}", output.display()))?;
    let mut writer = BufWriter::new(target);
    let bytes = io::copy(&mut content.blob, &mut writer)
        .context(format!("Failed to write {}", output.display()))?;
    writer.flush()?;

    content
        .blob
        .close()
        .context("Failed to release staged download")?;

    info!("Saved {} ({} bytes) to {}", file.name, bytes, output.display());
    Ok(())
}

fn print_files(files: &[RemoteFile], json: bool) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    if json {
        serde_json::to_writer_pretty(&mut out, files).context("Failed to serialize output")?;
        writeln!(out)?;
        return Ok(());
    }

    for file in files {
        let modified = file
            .last_modified
            .map(|ts| ts.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        let kind = if file.is_dir { "d" } else { "-" };
        writeln!(
            out,
            "{} {:>12} {} {}",
            kind,
            file.size,
            modified,
            file.full_path()
        )?;
    }

    Ok(())
}
