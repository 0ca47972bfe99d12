//! Interactive terminal front end for the soundboard playback pool.
//!
//! Sounds are registered on the command line as `KEY=PATH` pairs and driven
//! with line commands on stdin (type `help`).

mod commands;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use soundboard_core::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::commands::{Command, HELP};

#[derive(Parser)]
#[command(name = "soundboard", version, about = "A terminal soundboard.")]
struct Cli {
    /// Settings file (JSON or YAML). Defaults are used when omitted.
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Use silent mock outputs instead of the audio device.
    #[arg(long)]
    mock: bool,

    /// Sounds to register, in the form <KEY>=<PATH>.
    #[arg(value_parser = parse_sound_entry)]
    sounds: Vec<(String, PathBuf)>,
}

fn parse_sound_entry(entry: &str) -> std::result::Result<(String, PathBuf), String> {
    match entry.split_once('=') {
        Some((key, path)) if !key.is_empty() && !path.is_empty() => {
            Ok((key.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected <KEY>=<PATH>, got '{}'", entry)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => SettingsLoader::new()
            .load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => PoolSettings::default(),
    };

    let factory: Arc<dyn OutputFactory> = if cli.mock {
        Arc::new(MockOutputFactory::new())
    } else {
        Arc::new(KiraOutputFactory::open_default().context("opening audio device")?)
    };

    let pool = Arc::new(PlaybackPool::from_settings(factory, &settings)?);
    let catalog: BTreeMap<String, PathBuf> = cli.sounds.into_iter().collect();
    tracing::info!("Loaded {} sound(s)", catalog.len());

    let events = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.run_events().await })
    };

    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<Command>() {
            Ok(Command::Quit) => break,
            Ok(command) => execute(&pool, &catalog, command).await,
            Err(e) => println!("{}", e),
        }
    }

    events.abort();
    pool.stop_all();
    Ok(())
}

async fn execute(pool: &PlaybackPool, catalog: &BTreeMap<String, PathBuf>, command: Command) {
    match command {
        Command::Play { key, repeat } => {
            let location = match catalog.get(&key) {
                Some(location) => location.clone(),
                None => {
                    println!("unknown sound '{}'", key);
                    return;
                }
            };

            let mut request = PlayRequest::new(key, location, pool.volume())
                .on_complete(|completion| println!("done  {} ({:?})", completion.key, completion.reason));
            if repeat {
                request = request.repeat(true);
            }

            match pool.play(request).await {
                Ok(PlayOutcome::Started(key)) => println!("play  {}", key),
                Ok(PlayOutcome::Dropped(reason)) => println!("not started ({:?})", reason),
                Err(e) => println!("{}", e),
            }
        }
        Command::Stop(key) => {
            let stopped = pool.stop_specific(&key);
            println!("stopped {} instance(s) of {}", stopped, key);
        }
        Command::StopAll => {
            println!("stopped {} instance(s)", pool.stop_all());
        }
        Command::Volume(volume) => pool.update_volume(volume),
        Command::Multi(enabled) => {
            pool.update_concurrency_mode(enabled);
        }
        Command::Repeat(enabled) => {
            pool.update_repeat_mode(enabled);
        }
        Command::Status => print_status(pool, catalog),
        Command::Help => println!("{}", HELP),
        Command::Quit => {}
    }
}

fn print_status(pool: &PlaybackPool, catalog: &BTreeMap<String, PathBuf>) {
    let mode = pool.mode();
    println!(
        "multi {}  repeat {}  volume {:.2}  idle outputs {}",
        on_off(mode.multi_sound_enabled),
        on_off(mode.repeat_sound_enabled),
        pool.volume(),
        pool.idle_count()
    );
    let handles = pool.handles();
    for handle in &handles {
        println!(
            "  {:<20} {:?}  {:.1}s",
            handle.key.to_string(),
            handle.state,
            handle.started_at.elapsed().as_secs_f32()
        );
    }
    let silent = catalog
        .keys()
        .filter(|key| !handles.iter().any(|h| h.key.source() == key.as_str()));
    for key in silent {
        println!("  {:<20} -", key);
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}
