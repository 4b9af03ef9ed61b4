//! Jukebox CLI

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context};
use jukebox::config::Config;
use jukebox::fingerprint;
use jukebox::matching::{self, HeaderCriterion, MatchCriteria};
use jukebox::message::Request;
use jukebox::network::{HttpClient, NetworkHandler};
use jukebox::storage::{recording_location, RECORDING_EXTENSION};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Jukebox v{}", env!("CARGO_PKG_VERSION"));
        eprintln!();
        eprintln!("Usage: jukebox <command> [options]");
        eprintln!();
        eprintln!("Commands:");
        eprintln!("  serve [config.toml]                      Run the mock endpoint");
        eprintln!("  stats <recording-dir>                    Count recordings per album");
        eprintln!("  key <album> <method> <url> [match-json]  Show where a request is recorded");
        process::exit(1);
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let command = &args[1];

    match command.as_str() {
        "serve" => serve(args.get(2).map(PathBuf::from)).await,
        "stats" => {
            if args.len() < 3 {
                eprintln!("Usage: jukebox stats <recording-dir>");
                process::exit(1);
            }

            show_stats(Path::new(&args[2]))
        }
        "key" => {
            if args.len() < 5 {
                eprintln!("Usage: jukebox key <album> <method> <url> [match-json]");
                process::exit(1);
            }

            show_key(&args[2], &args[3], &args[4], args.get(5).map(String::as_str))
        }
        _ => {
            eprintln!("Unknown command: {command}");
            eprintln!("Run 'jukebox' for usage information.");
            process::exit(1);
        }
    }
}

async fn serve(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = match config_path {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => Config::default(),
    };

    tracing::info!(
        "Serving {} from {}",
        config.server.mock_path,
        config.recording_dir.display()
    );

    let transport = HttpClient::new().with_max_response_size(config.limits.max_response_size);
    NetworkHandler::new(&config, Arc::new(transport)).run().await?;
    Ok(())
}

fn show_stats(dir: &Path) -> anyhow::Result<()> {
    if !dir.is_dir() {
        bail!("Directory not found: {}", dir.display());
    }

    let mut albums = BTreeMap::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            let count = count_recordings(&entry.path())?;
            albums.insert(entry.file_name().to_string_lossy().into_owned(), count);
        }
    }

    println!("Recording directory: {}", dir.display());
    println!();
    if albums.is_empty() {
        println!("No albums found.");
        return Ok(());
    }

    let width = albums.keys().map(String::len).max().unwrap_or(0);
    for (album, count) in &albums {
        println!("  {album:<width$}  {count:>6} recordings");
    }
    println!();
    println!("Total: {} recordings in {} albums", albums.values().sum::<usize>(), albums.len());

    Ok(())
}

fn count_recordings(dir: &Path) -> anyhow::Result<usize> {
    let mut count = 0;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            count += count_recordings(&path)?;
        } else if path.extension().is_some_and(|ext| ext == RECORDING_EXTENSION) {
            count += 1;
        }
    }
    Ok(count)
}

/// Print the recording path, relative to the storage root, for a request
/// carrying exactly the values the first match entry names
fn show_key(album: &str, method: &str, url: &str, match_json: Option<&str>) -> anyhow::Result<()> {
    let criteria: Option<MatchCriteria> = match_json
        .map(serde_json::from_str)
        .transpose()
        .context("match-json is not a valid match definition")?;

    let mut request = Request::new(method, url);
    if let Some(entry) = criteria.as_ref().and_then(|c| c.entries().first()) {
        match entry.header_criterion() {
            Some(HeaderCriterion::Values(values)) => {
                for (name, value) in values {
                    request = request.with_header(name, value.clone());
                }
            }
            Some(HeaderCriterion::Names(names)) => {
                bail!("Header names {names:?} need values; use the {{\"name\": \"value\"}} form");
            }
            None => {}
        }
        if let Some(body) = entry.body_criterion() {
            request = request.with_body(body.clone());
        }
    }

    let selected = matching::evaluate(criteria.as_ref(), &request).selected();
    let key = fingerprint::derive_key(&request, selected);
    let path = recording_location(Path::new(""), album, url, method, &key)?;

    println!("{}", path.display());
    Ok(())
}
