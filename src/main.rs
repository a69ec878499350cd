//! Demo driver: a small REPL over the line editor
//!
//! Reads commands in the base context and echoes them back. A line
//! starting with `mail` switches to the compose context until a lone `.`
//! is entered, mirroring how a mail client would use the two contexts.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Parser;

use mle::complete::Expander;
use mle::{Editor, MleConfig, MleContext, PosixTty, ReadResult, StaticCapabilities};

/// A mailx-style line editor
#[derive(Parser, Debug)]
#[command(name = "mle")]
#[command(about = "Interactive line editor demo with history and key bindings", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the history file location
    #[arg(long, value_name = "PATH")]
    history_file: Option<PathBuf>,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    dump_config: bool,

    /// Disable configurable key bindings, falling back to the built-ins
    #[arg(long)]
    no_bindings: bool,

    /// Log editor internals (binding resolution, history I/O) to stderr
    #[arg(long, short)]
    verbose: bool,
}

fn load_config(args: &Args) -> Result<MleConfig> {
    let path = match &args.config {
        Some(p) => Some(p.clone()),
        None => dirs::config_dir()
            .map(|d| d.join("mle/config.json"))
            .filter(|p| p.exists()),
    };
    let mut config = match path {
        Some(path) => {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => MleConfig::default(),
    };
    if let Some(path) = &args.history_file {
        config.history_file = Some(path.clone());
    } else if config.history_file.is_none() {
        config.history_file = dirs::data_dir().map(|d| d.join("mle/history"));
    }
    if args.no_bindings {
        config.bindings_enabled = false;
    }
    if args.verbose {
        config.verbose = true;
    }
    Ok(config)
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;
    let default = if verbose { "mle=debug" } else { "mle=error" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Completes tokens against directory entries, like folder name completion
struct FileExpander;

impl Expander for FileExpander {
    fn expand(&mut self, token: &str) -> Vec<String> {
        let bare = token.trim_end_matches('*');
        let (dir, stem) = match bare.rsplit_once('/') {
            Some((d, s)) => (PathBuf::from(d), s.to_string()),
            None => (PathBuf::from("."), bare.to_string()),
        };
        let Ok(entries) = fs::read_dir(&dir) else {
            return Vec::new();
        };
        let mut out: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|name| name.starts_with(&stem))
            .map(|name| {
                if dir == PathBuf::from(".") {
                    name
                } else {
                    format!("{}/{}", dir.display(), name)
                }
            })
            .collect();
        out.sort();
        out
    }
}

/// Restores cooked mode on all exit paths
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> Result<Self> {
        crossterm::terminal::enable_raw_mode().context("entering raw mode")?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = crossterm::terminal::disable_raw_mode();
    }
}

extern "C" fn on_sigwinch(_: nix::libc::c_int) {
    mle::term::note_resize();
}

extern "C" fn on_sigcont(_: nix::libc::c_int) {
    mle::term::note_resume();
}

fn install_signal_handlers() -> Result<()> {
    use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
    let winch = SigAction::new(
        SigHandler::Handler(on_sigwinch),
        SaFlags::empty(),
        SigSet::empty(),
    );
    let cont = SigAction::new(
        SigHandler::Handler(on_sigcont),
        SaFlags::empty(),
        SigSet::empty(),
    );
    // Flags stay empty so reads are interrupted rather than restarted
    unsafe {
        sigaction(Signal::SIGWINCH, &winch).context("installing SIGWINCH handler")?;
        sigaction(Signal::SIGCONT, &cont).context("installing SIGCONT handler")?;
    }
    Ok(())
}

/// Arrow and navigation keys for the common ANSI terminal
fn default_capabilities() -> StaticCapabilities {
    StaticCapabilities::with(&[
        ("ku", b"\x1b[A"),
        ("kd", b"\x1b[B"),
        ("kr", b"\x1b[C"),
        ("kl", b"\x1b[D"),
        ("kh", b"\x1b[H"),
        ("@7", b"\x1b[F"),
        ("kD", b"\x1b[3~"),
    ])
}

fn compose_loop(editor: &mut Editor, tty: &mut PosixTty) -> Result<()> {
    loop {
        match editor.readline(tty, MleContext::Compose, "~ ", None, false)? {
            ReadResult::Line { text, .. } if text == "." => return Ok(()),
            ReadResult::Line { text, .. } => {
                print!("compose: {text}\r\n");
            }
            ReadResult::Cancelled => {
                print!("(cancelled)\r\n");
                return Ok(());
            }
            ReadResult::Eof => return Ok(()),
        }
    }
}

fn repl(editor: &mut Editor, tty: &mut PosixTty) -> Result<()> {
    loop {
        match editor.readline(tty, MleContext::Base, "& ", None, false)? {
            ReadResult::Line { text, .. } => {
                if text == "quit" || text == "exit" {
                    return Ok(());
                }
                if text.starts_with("mail") {
                    print!("composing, end with a lone '.'\r\n");
                    compose_loop(editor, tty)?;
                    continue;
                }
                print!("ok: {text}\r\n");
            }
            ReadResult::Cancelled => print!("(cancelled)\r\n"),
            ReadResult::Eof => return Ok(()),
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    if args.dump_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }
    init_tracing(config.verbose);
    install_signal_handlers()?;

    let mut editor = Editor::new(config, Box::new(default_capabilities()));
    editor.set_expander(Box::new(FileExpander));
    if let Err(e) = editor.load_history() {
        tracing::warn!(error = %e, "could not load history");
    }

    let mut tty = PosixTty::new()?;
    let _guard = RawModeGuard::enable()?;
    let result = repl(&mut editor, &mut tty);
    drop(_guard);

    if let Err(e) = editor.save_history() {
        tracing::warn!(error = %e, "could not save history");
    }
    result
}
