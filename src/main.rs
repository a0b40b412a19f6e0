use std::{
    fs::{self, OpenOptions},
    io,
    path::{Path, PathBuf},
    sync::Mutex,
    time::Duration,
};

use anyhow::{bail, Context, Result};
use is_terminal::IsTerminal;
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

use playground::{
    cli::{Cli, Command, SnippetCommand},
    config::{Config, RuntimeSettings},
    controller::{RunController, TIMEOUT_NOTICE},
    execution::{Language, RunRequest},
    printer::{SinkFollower, TextPrinter},
    store::{Snippet, SnippetStore},
    tui::{self, App},
    utils,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // Load config
    let cfg = Config::load();

    match args.command {
        None => {
            init_logging(&cfg, true);
            run_interactive(&cfg, None, None).await
        }
        Some(Command::Tui { lang, file }) => {
            init_logging(&cfg, true);
            run_interactive(&cfg, lang, file).await
        }
        Some(Command::Run { lang, timeout, file }) => {
            init_logging(&cfg, false);
            run_headless(&cfg, lang, timeout, &file).await
        }
        Some(Command::Snippets(command)) => {
            init_logging(&cfg, false);
            run_snippet_command(&cfg, command)
        }
    }
}

/// The UI owns the terminal, so its logs go to a file; headless commands log to stderr.
fn init_logging(cfg: &Config, to_file: bool) {
    let default_level = if to_file { "info" } else { "warn" };
    let filter = EnvFilter::try_from_env("PLAYGROUND_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));

    if !to_file {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
        return;
    }

    let path = cfg.log_path();
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    // Without a log file the UI simply runs unlogged.
    if let Ok(file) = OpenOptions::new().create(true).append(true).open(&path) {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    }
}

fn resolve_language(cfg: &Config, lang: Option<Language>, file: Option<&Path>) -> Language {
    lang.or_else(|| file.and_then(Language::from_path))
        .unwrap_or_else(|| cfg.default_language())
}

async fn run_interactive(cfg: &Config, lang: Option<Language>, file: Option<PathBuf>) -> Result<()> {
    let source = match &file {
        Some(path) => utils::read_source(path)?,
        None => String::new(),
    };
    let language = resolve_language(cfg, lang, file.as_deref());

    let (controller, controller_rx) = RunController::new(RuntimeSettings::from_config(cfg));
    let app = App::new(
        controller,
        SnippetStore::from_config(cfg),
        cfg.download_dir(),
        language,
        &source,
    );
    tui::run_tui(app, controller_rx).await
}

async fn run_headless(cfg: &Config, lang: Option<Language>, timeout: Option<u64>, file: &Path) -> Result<()> {
    let source = utils::read_source(file)?;
    let language = resolve_language(cfg, lang, Some(file));

    let mut settings = RuntimeSettings::from_config(cfg);
    if let Some(secs) = timeout {
        settings.js_timeout = Duration::from_secs(secs);
    }
    let (mut controller, mut events) = RunController::new(settings);
    let printer = TextPrinter {
        color: io::stdout().is_terminal(),
    };

    if controller.run(RunRequest::new(language, source)).is_none() {
        bail!("{}", controller.sink().text().trim_end());
    }

    // Placeholders ("Loading Python runtime...") are progress, not output.
    if let Some(placeholder) = controller.sink().lines().first() {
        printer.notice(placeholder);
    }
    let mut follower = SinkFollower::new(printer, controller.sink());

    // A JS run ends once its process exits or the deadline fires; a Python
    // run ends when its result arrives.
    while controller.is_running() && !controller.active_context_exited() {
        let Some(event) = events.recv().await else {
            break;
        };
        controller.handle_event(event);
        follower.flush(controller.sink());
    }
    controller.release();

    if controller.sink().lines().last().map(String::as_str) == Some(TIMEOUT_NOTICE) {
        bail!(
            "script exceeded the {}s time limit",
            controller.settings().js_timeout.as_secs()
        );
    }
    Ok(())
}

fn run_snippet_command(cfg: &Config, command: SnippetCommand) -> Result<()> {
    let store = SnippetStore::from_config(cfg);
    let color = io::stdout().is_terminal();

    match command {
        SnippetCommand::List => {
            let snippets = store.load()?;
            if snippets.is_empty() {
                println!("No saved snippets ({})", store.path().display());
            }
            for (index, snippet) in snippets.iter().enumerate() {
                let created = snippet.created_at.format("%Y-%m-%d %H:%M").to_string();
                if color {
                    println!(
                        "{:>3}  {:<10} {}  {}",
                        index.cyan(),
                        snippet.language.label(),
                        snippet.title.bold(),
                        created.dimmed()
                    );
                } else {
                    println!("{:>3}  {:<10} {}  {}", index, snippet.language.label(), snippet.title, created);
                }
            }
        }
        SnippetCommand::Show { index } => {
            let snippet = find_snippet(&store, index)?;
            print!("{}", snippet.source);
            if !snippet.source.ends_with('\n') {
                println!();
            }
        }
        SnippetCommand::Delete { index } => {
            let snippet = find_snippet(&store, index)?;
            store.delete(index)?;
            println!("Deleted \"{}\"", snippet.title);
        }
        SnippetCommand::Save { title, lang, file } => {
            let source = utils::read_source(&file)?;
            let language = resolve_language(cfg, lang, Some(&file));
            store.add(Snippet::new(title.clone(), language, source))?;
            println!("Saved \"{}\" ({})", title, language.label());
        }
        SnippetCommand::Export { index } => {
            let snippet = find_snippet(&store, index)?;
            let path = utils::download_snippet(&cfg.download_dir(), &snippet.source, snippet.language)
                .context("export failed")?;
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}

fn find_snippet(store: &SnippetStore, index: usize) -> Result<Snippet> {
    let mut snippets = store.load()?;
    if index >= snippets.len() {
        bail!("no snippet at index {} ({} saved)", index, snippets.len());
    }
    Ok(snippets.swap_remove(index))
}
