//! Interactive REPL over a plotwatch snapshot.
//!
//! Launch with `plotwatch repl` to enter interactive mode.
//! Type `/help` for available commands, Tab for completion.

use std::sync::Arc;

use rustyline::completion::{Completer, Pair};
use rustyline::config::CompletionType;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{
    Cmd, ConditionalEventHandler, Config, Editor, Event, EventContext, EventHandler, Helper,
    KeyEvent, RepeatCount,
};

use plotwatch::io::export_file;
use plotwatch::{ExportFormat, Report, Snapshot, DEFAULT_TOP_N};

use crate::commands::{render_query, render_summary};
use crate::session::RunSession;

/// Available REPL commands.
const COMMANDS: &[(&str, &str)] = &[
    ("/load", "Load a .pws snapshot file"),
    ("/stats", "Show the run summary"),
    ("/report", "Show per-axis statistics [top N]"),
    ("/plot", "Show results for one plot"),
    ("/export", "Export results: <path> [csv|json]"),
    ("/clear", "Clear the screen"),
    ("/help", "Show available commands"),
    ("/exit", "Quit the REPL"),
];

/// REPL helper for tab completion.
#[derive(Default)]
struct SnapshotHelper;

impl Completer for SnapshotHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let input = &line[..pos];

        if !input.contains(' ') {
            let matches: Vec<Pair> = COMMANDS
                .iter()
                .filter(|(cmd, _)| cmd.starts_with(input))
                .map(|(cmd, desc)| Pair {
                    display: format!("{cmd:<16} {desc}"),
                    replacement: format!("{cmd} "),
                })
                .collect();
            return Ok((0, matches));
        }

        let (cmd, args) = input.split_once(' ').unwrap_or((input, ""));

        if cmd == "/load" {
            let mut files = Vec::new();
            if let Ok(entries) = std::fs::read_dir(".") {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.extension().is_some_and(|e| e == "pws") {
                        if let Some(name) = path.file_name().and_then(|s| s.to_str()) {
                            files.push(name.to_string());
                        }
                    }
                }
            }
            files.sort();
            let prefix_start = input.len() - args.len();
            let matches: Vec<Pair> = files
                .iter()
                .filter(|f| f.starts_with(args.trim()))
                .map(|f| Pair {
                    display: f.clone(),
                    replacement: format!("{f} "),
                })
                .collect();
            return Ok((prefix_start, matches));
        }

        Ok((pos, Vec::new()))
    }
}

impl Hinter for SnapshotHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        if pos < line.len() || line.is_empty() {
            return None;
        }
        if line.starts_with('/') && !line.contains(' ') {
            for (cmd, _) in COMMANDS {
                if cmd.starts_with(line) && *cmd != line {
                    return Some(cmd[line.len()..].to_string());
                }
            }
        }
        None
    }
}

impl Highlighter for SnapshotHelper {}
impl Validator for SnapshotHelper {}
impl Helper for SnapshotHelper {}

struct TabCompleteOrAcceptHint;

impl ConditionalEventHandler for TabCompleteOrAcceptHint {
    fn handle(
        &self,
        _evt: &Event,
        _n: RepeatCount,
        _positive: bool,
        ctx: &EventContext<'_>,
    ) -> Option<Cmd> {
        if ctx.has_hint() {
            Some(Cmd::CompleteHint)
        } else {
            Some(Cmd::Complete)
        }
    }
}

/// Session state.
#[derive(Default)]
struct ReplState {
    path: Option<String>,
    snapshot: Option<Arc<Snapshot>>,
}

/// Run the interactive REPL, starting from the snapshot at `path` if it exists.
pub fn run(path: &str) -> anyhow::Result<()> {
    eprintln!();
    eprintln!(
        "  \x1b[32m\u{25c9}\x1b[0m \x1b[1mplotwatch v{}\x1b[0m \x1b[90m- plot change classification\x1b[0m",
        env!("CARGO_PKG_VERSION")
    );
    eprintln!();
    eprintln!(
        "    Press \x1b[36m/\x1b[0m to browse commands, \x1b[90mTab\x1b[0m to complete, \x1b[90m/exit\x1b[0m to quit."
    );
    eprintln!();

    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .completion_type(CompletionType::List)
        .completion_prompt_limit(20)
        .build();

    let mut rl: Editor<SnapshotHelper, rustyline::history::DefaultHistory> =
        Editor::with_config(config)?;
    rl.set_helper(Some(SnapshotHelper));
    rl.bind_sequence(
        KeyEvent::from('\t'),
        EventHandler::Conditional(Box::new(TabCompleteOrAcceptHint)),
    );

    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    let hist_path = std::path::PathBuf::from(&home).join(".plotwatch_history");
    if hist_path.exists() {
        let _ = rl.load_history(&hist_path);
    }

    let mut state = ReplState::default();
    if std::path::Path::new(path).exists() {
        cmd_load(path, &mut state);
    }
    let prompt = " \x1b[36mplotwatch>\x1b[0m ";

    loop {
        match rl.readline(prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let input = line.strip_prefix('/').unwrap_or(line);
                if input.is_empty() {
                    cmd_help();
                    continue;
                }

                let (cmd, args) = input.split_once(' ').unwrap_or((input, ""));
                let args = args.trim();

                match cmd {
                    "exit" | "quit" => {
                        eprintln!("  Goodbye!");
                        break;
                    }
                    "help" | "h" | "?" => cmd_help(),
                    "clear" | "cls" => eprint!("\x1b[2J\x1b[H"),
                    "load" => cmd_load(args, &mut state),
                    "stats" => cmd_stats(&state),
                    "report" => cmd_report(args, &state),
                    "plot" => cmd_plot(args, &state),
                    "export" => cmd_export(args, &state),
                    _ => {
                        eprintln!("  Unknown command '/{cmd}'. Type /help for commands.");
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                eprintln!("  \x1b[90m(Ctrl+C)\x1b[0m Type \x1b[1m/exit\x1b[0m to quit.");
            }
            Err(ReadlineError::Eof) => {
                eprintln!("  Goodbye!");
                break;
            }
            Err(err) => {
                eprintln!("  Error: {err}");
                break;
            }
        }
    }

    let _ = rl.save_history(&hist_path);

    Ok(())
}

fn cmd_help() {
    eprintln!();
    eprintln!("  Commands:");
    eprintln!();
    for (cmd, desc) in COMMANDS {
        eprintln!("    {cmd:<18} {desc}");
    }
    eprintln!();
    eprintln!("  Tip: Tab completion works for commands and .pws files.");
    eprintln!();
}

fn loaded(state: &ReplState) -> Option<&Snapshot> {
    let snap = state.snapshot.as_deref();
    if snap.is_none() {
        eprintln!("  No snapshot loaded. Use /load <file.pws>.");
    }
    snap
}

fn cmd_load(args: &str, state: &mut ReplState) {
    if args.is_empty() {
        eprintln!("  Usage: /load <file.pws>");
        return;
    }
    let path = args.split_whitespace().next().unwrap_or(args).to_string();
    let opened = RunSession::open(&path).and_then(|session| session.require_current());
    match opened {
        Ok(snapshot) => {
            eprintln!(
                "  Loaded: {path} (run {}, {} results)",
                snapshot.run_id(),
                snapshot.count()
            );
            state.path = Some(path);
            state.snapshot = Some(snapshot);
        }
        Err(e) => {
            eprintln!("  Failed to load: {e}");
        }
    }
}

fn cmd_stats(state: &ReplState) {
    let Some(snapshot) = loaded(state) else { return };
    eprintln!();
    if let Some(path) = &state.path {
        eprintln!("  Snapshot: {path}");
    }
    eprint!("{}", render_summary(snapshot.summary()));
    eprintln!("  Plots: {}", snapshot.plot_ids().len());
    eprintln!();
}

fn cmd_report(args: &str, state: &ReplState) {
    let Some(snapshot) = loaded(state) else { return };
    let top_n = if args.is_empty() {
        DEFAULT_TOP_N
    } else {
        match args.parse::<usize>() {
            Ok(n) => n,
            Err(_) => {
                eprintln!("  Usage: /report [top N]");
                return;
            }
        }
    };
    eprintln!();
    eprint!("{}", Report::build(snapshot, top_n).render_text());
    eprintln!();
}

fn cmd_plot(args: &str, state: &ReplState) {
    if args.is_empty() {
        eprintln!("  Usage: /plot <plot_id>");
        return;
    }
    let Some(snapshot) = loaded(state) else { return };
    eprintln!();
    eprint!("{}", render_query(snapshot, Some(args)));
    eprintln!();
}

fn cmd_export(args: &str, state: &ReplState) {
    let mut parts = args.split_whitespace();
    let Some(path) = parts.next() else {
        eprintln!("  Usage: /export <path> [csv|json]");
        return;
    };
    let format = match parts.next().unwrap_or("csv").parse::<ExportFormat>() {
        Ok(f) => f,
        Err(e) => {
            eprintln!("  {e}");
            return;
        }
    };
    let Some(snapshot) = loaded(state) else { return };
    match export_file(snapshot, None, format, std::path::Path::new(path)) {
        Ok(rows) => eprintln!("  Exported {rows} results to {path}"),
        Err(e) => eprintln!("  Export failed: {e}"),
    }
}
