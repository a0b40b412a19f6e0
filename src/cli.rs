use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::execution::Language;

#[derive(Parser, Debug, Clone)]
#[command(name = "playground", about = "Run JavaScript and Python snippets in isolated runtimes", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Open the interactive playground (default).
    Tui {
        /// Language of the editor (javascript|python).
        #[arg(long)]
        lang: Option<Language>,
        /// File to load into the editor.
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Run a snippet without the UI and print its output.
    Run {
        /// Language of the snippet; inferred from the file extension when omitted.
        #[arg(long)]
        lang: Option<Language>,
        /// JavaScript time limit in seconds.
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        timeout: Option<u64>,
        /// Source file, or `-` for stdin.
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Manage saved snippets.
    #[command(subcommand)]
    Snippets(SnippetCommand),
}

#[derive(Subcommand, Debug, Clone)]
pub enum SnippetCommand {
    /// List saved snippets, newest first.
    #[command(visible_alias = "ls")]
    List,
    /// Print the source of a snippet.
    Show { index: usize },
    /// Delete a snippet.
    #[command(visible_alias = "rm")]
    Delete { index: usize },
    /// Save a file as a snippet.
    Save {
        /// Title shown in the snippet list.
        #[arg(long)]
        title: String,
        /// Language of the snippet; inferred from the file extension when omitted.
        #[arg(long)]
        lang: Option<Language>,
        /// Source file, or `-` for stdin.
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Write a snippet to the download directory as snippet.js / snippet.py.
    Export { index: usize },
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
