//! # Shell Completion Module
//!
//! Completion scripts come straight from clap_complete. Playlist names for
//! `recommend` are served by the hidden `complete-playlists` command, which
//! prints one shell-safe word per line.
//!
//! ## Usage
//!
//! ```bash
//! # Generate bash completions
//! tunesift completion bash > ~/.local/share/bash-completion/completions/tunesift
//!
//! # Generate zsh completions
//! tunesift completion zsh > ~/.config/zsh/completions/_tunesift
//! ```

use clap::Command;
use clap_complete::{generate, Generator, Shell as CompletionShell};
use std::io::{self, Write};

use crate::cli::Shell;

/// Write the completion script for `gen` to `out`.
pub fn generate_completions<G: Generator, W: Write>(gen: G, cmd: &mut Command, out: &mut W) {
    let name = cmd.get_name().to_string();
    generate(gen, cmd, name, out);
}

/// Convert our Shell enum to clap_complete's Shell enum
#[must_use]
pub fn shell_to_completion_shell(shell: Shell) -> CompletionShell {
    match shell {
        Shell::Bash => CompletionShell::Bash,
        Shell::Zsh => CompletionShell::Zsh,
        Shell::Fish => CompletionShell::Fish,
        Shell::PowerShell => CompletionShell::PowerShell,
        Shell::Elvish => CompletionShell::Elvish,
    }
}

/// Quote a completion word when it contains whitespace.
#[must_use]
pub fn completion_word(word: &str) -> String {
    if word.chars().any(char::is_whitespace) {
        format!("\"{}\"", word.replace('"', "\\\""))
    } else {
        word.to_string()
    }
}

/// Print `names` sorted, one completion word per line.
///
/// # Errors
///
/// Fails when stdout cannot be written.
pub fn print_completions<W: Write>(names: &[String], out: &mut W) -> io::Result<()> {
    let mut sorted: Vec<&String> = names.iter().collect();
    sorted.sort();
    sorted.dedup();
    for name in sorted {
        writeln!(out, "{}", completion_word(name))?;
    }
    Ok(())
}
