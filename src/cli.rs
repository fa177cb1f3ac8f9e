//! # Command-Line Interface Module
//!
//! Clap derive definitions for the `tunesift` binary.
//!
//! ## Commands
//!
//! - `playlists`: List the user's playlists
//! - `recommend`: Suggest tracks that fit a playlist
//! - `features`: Print audio features for track ids or looked-up songs
//! - `completion`: Generate shell completions
//!
//! ## Examples
//!
//! ```bash
//! tunesift --catalog snapshot.json playlists
//! tunesift --catalog snapshot.json recommend "Evening Mix" --count 10
//! TUNESIFT_CATALOG=snapshot.json tunesift features 4iV5W9uYEdYUVa79Axb7Rh
//! tunesift --catalog snapshot.json features --song "Teardrop, Massive Attack; Clair de Lune"
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shell types supported for completion generation
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    PowerShell,
    /// Elvish shell
    Elvish,
}

/// Main application arguments structure.
///
/// Global options come before the subcommand. The catalog is only needed by
/// commands that talk to it, so it is optional here and checked in `main`.
#[derive(Parser, Debug)]
#[command(name = "tunesift")]
#[command(about = "Tunesift: playlist-driven track recommendations by audio-feature clustering")]
#[command(version)]
pub struct Args {
    /// Path to a JSON config file
    ///
    /// Defaults to `config.json` in the platform config directory. Missing
    /// default files are fine; a missing explicit file is an error.
    #[arg(long, global = true, value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Catalog snapshot to read playlists, tracks and features from
    #[arg(long, global = true, env = "TUNESIFT_CATALOG", value_hint = clap::ValueHint::FilePath)]
    pub catalog: Option<PathBuf>,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the user's playlists
    Playlists,

    /// Recommend tracks that match a playlist
    ///
    /// Clusters the playlist's audio features, samples candidate tracks
    /// through random searches and keeps the candidates that land in the
    /// playlist's dominant cluster.
    Recommend {
        /// Playlist name (exact, or case-insensitive)
        #[arg(value_hint = clap::ValueHint::Other)]
        playlist: String,

        /// Number of tracks to recommend
        #[arg(short, long)]
        count: Option<usize>,

        /// Candidate pool size
        #[arg(long)]
        pool: Option<usize>,

        /// Seed for candidate sampling, for repeatable runs
        #[arg(long)]
        seed: Option<u64>,

        /// Show the tightness score for every cluster count tried
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print audio features for track ids or songs looked up by title
    Features {
        /// Track ids
        #[arg(required_unless_present = "songs")]
        ids: Vec<String>,

        /// Songs to look up by title and optional artist
        ///
        /// Separate songs with ';' and put the artist after a comma. May be
        /// given more than once.
        #[arg(long = "song", value_name = "TITLE[, ARTIST][; ...]")]
        songs: Vec<String>,
    },

    /// Generate shell completions
    ///
    /// Usage: tunesift completion bash > ~/.local/share/bash-completion/completions/tunesift
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },

    /// List playlist names for completion (hidden command)
    #[command(hide = true)]
    CompletePlaylists,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_recommend() {
        let args = Args::try_parse_from([
            "tunesift",
            "--catalog",
            "snap.json",
            "recommend",
            "Evening Mix",
            "--count",
            "3",
            "--seed",
            "7",
        ])
        .unwrap();

        assert_eq!(args.catalog, Some(PathBuf::from("snap.json")));
        match args.command {
            Command::Recommend {
                playlist,
                count,
                pool,
                seed,
                verbose,
            } => {
                assert_eq!(playlist, "Evening Mix");
                assert_eq!(count, Some(3));
                assert_eq!(pool, None);
                assert_eq!(seed, Some(7));
                assert!(!verbose);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_features_requires_ids() {
        assert!(Args::try_parse_from(["tunesift", "features"]).is_err());
    }

    #[test]
    fn test_features_accepts_songs_instead_of_ids() {
        let args = Args::try_parse_from(["tunesift", "features", "--song", "Hey Jude, The Beatles; Yesterday"]).unwrap();

        match args.command {
            Command::Features { ids, songs } => {
                assert!(ids.is_empty());
                assert_eq!(songs, vec!["Hey Jude, The Beatles; Yesterday"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
