//! # Tunesift
//!
//! Suggests tracks that fit one of your playlists. The playlist's audio
//! features are clustered, a pool of candidates is gathered through random
//! searches, and candidates landing in the playlist's dominant cluster are
//! recommended.
//!
//! ## Usage
//!
//! ```bash
//! # List playlists
//! tunesift --catalog snapshot.json playlists
//!
//! # Recommend ten tracks, repeatably
//! tunesift --catalog snapshot.json recommend "Evening Mix" --count 10 --seed 7
//!
//! # Inspect audio features
//! tunesift --catalog snapshot.json features 4iV5W9uYEdYUVa79Axb7Rh
//!
//! # Look songs up by title and artist first
//! tunesift --catalog snapshot.json features --song "Teardrop, Massive Attack; Clair de Lune"
//! ```

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::io;
use std::path::Path;

use tunesift::catalog::SnapshotCatalog;
use tunesift::cli::{Args, Command};
use tunesift::completion;
use tunesift::config::RuntimeConfig;
use tunesift::error::RecError;
use tunesift::features::{extract_features, FEATURE_NAMES};
use tunesift::lookup::{lookup_track, parse_song_list};
use tunesift::pipeline::Recommender;
use tunesift::rate_limiter::RequestCategory;

/// Main entry point for Tunesift.
///
/// # Logging
///
/// Controlled via `RUST_LOG`:
/// - `RUST_LOG=info tunesift recommend "Mix"` - Pipeline progress
/// - `RUST_LOG=tunesift::rate_limiter=debug tunesift ...` - Quota waits
fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let result = run(args);

    if let Err(err) = &result {
        if let Some(hint) = err.downcast_ref::<RecError>().and_then(RecError::user_hint) {
            eprintln!("hint: {hint}");
        }
    }
    result
}

/// Loads the catalog snapshot named on the command line or in the environment.
fn load_catalog(path: Option<&Path>) -> Result<SnapshotCatalog> {
    let path = path.context("No catalog given. Pass --catalog or set TUNESIFT_CATALOG")?;
    SnapshotCatalog::load(path)
}

fn run(args: Args) -> Result<()> {
    // Loading may create the default config directory, so only commands that
    // read settings do it.
    let config_path = args.config.as_deref();
    let load_config = || RuntimeConfig::load(config_path);
    let catalog_path = args.catalog.as_deref();

    match args.command {
        Command::Completion { shell } => {
            let mut cmd = Args::command();
            completion::generate_completions(
                completion::shell_to_completion_shell(shell),
                &mut cmd,
                &mut io::stdout(),
            );
        }
        Command::Playlists => {
            let config = load_config()?;
            let catalog = load_catalog(catalog_path)?;
            let limiter = config.rate_limiter();
            let recommender = Recommender::new(&catalog, &limiter, &config);
            for name in recommender.playlist_names()? {
                println!("{name}");
            }
        }
        Command::CompletePlaylists => {
            // Completion must stay quiet, so failures just mean no words.
            let (Ok(config), Ok(catalog)) = (load_config(), load_catalog(catalog_path)) else {
                return Ok(());
            };
            let limiter = config.rate_limiter();
            let recommender = Recommender::new(&catalog, &limiter, &config);
            let names = recommender.playlist_names().unwrap_or_default();
            completion::print_completions(&names, &mut io::stdout())?;
        }
        Command::Recommend {
            playlist,
            count,
            pool,
            seed,
            verbose,
        } => {
            let mut config = load_config()?;
            if let Some(count) = count {
                config.recommendation_count = count;
            }
            if let Some(pool) = pool {
                config.pool_size = pool;
            }
            config.validate()?;
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };

            let catalog = load_catalog(catalog_path)?;
            let limiter = config.rate_limiter();
            for category in RequestCategory::ALL {
                debug!("Quota for {category}: {}/s", limiter.quotas().get(category));
            }

            let recommender = Recommender::new(&catalog, &limiter, &config);
            let result = recommender.recommend_for(&playlist, &mut rng)?;
            info!("Rate limiter forced {} waits", limiter.forced_waits());

            if verbose {
                for (k, score) in &result.scores {
                    let marker = if *k == result.k { " <" } else { "" };
                    println!("k={k:>2}  tightness {score:>12.4}{marker}");
                }
                println!(
                    "{} candidates sampled, {} playlist tracks had no features",
                    result.pool_size, result.skipped_user_tracks
                );
                println!();
            }

            if result.tracks.is_empty() {
                println!("No candidates matched '{}'. Try a larger --pool.", result.playlist.name);
            } else {
                println!("Recommended for '{}' ({} clusters):", result.playlist.name, result.k);
                for (i, track) in result.tracks.iter().enumerate() {
                    println!("{:>3}. {track}", i + 1);
                }
            }
        }
        Command::Features { ids, songs } => {
            let config = load_config()?;
            let catalog = load_catalog(catalog_path)?;
            let limiter = config.rate_limiter();

            // (id, heading) per track to print; looked-up songs show their match.
            let mut targets: Vec<(String, String)> = ids.into_iter().map(|id| (id.clone(), id)).collect();
            for song in songs.iter().flat_map(|list| parse_song_list(list)) {
                match lookup_track(&catalog, &limiter, &song)? {
                    Some(track) => targets.push((track.id.clone(), format!("{} ({track})", track.id))),
                    None => println!("Track not found for {}", song.title),
                }
            }

            let ids: Vec<String> = targets.iter().map(|(id, _)| id.clone()).collect();
            let slots = extract_features(&catalog, &limiter, &ids, config.chunk_size)?;
            for ((id, heading), slot) in targets.iter().zip(slots) {
                match slot {
                    Some(vector) => {
                        println!("{heading}");
                        for (name, value) in FEATURE_NAMES.iter().zip(vector.values()) {
                            println!("  {name:<17} {value:.4}");
                        }
                    }
                    None => println!("{id}: missing"),
                }
            }
        }
    }

    Ok(())
}
