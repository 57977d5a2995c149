//! plotwatch entry point.

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use plotwatch::io::export_file;
use plotwatch::{
    ExportFormat, PipelineConfig, Report, RuleGating, DEFAULT_LAND_TYPE, DEFAULT_TOLERANCE_DAYS,
    DEFAULT_TOP_N,
};
use plotwatch_cli::commands;
use plotwatch_cli::config::resolve_snapshot_path;
use plotwatch_cli::{RunInputs, RunSession};

#[derive(Parser)]
#[command(
    name = "plotwatch",
    about = "Batch change classification between dated plot observations",
    version
)]
struct Cli {
    /// Path to .pws snapshot file.
    #[arg(short, long, global = true)]
    snapshot: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a request batch and replace the snapshot.
    Run {
        /// Observations CSV (plot_id,date,ndvi,ndbi,ndwi).
        #[arg(long)]
        observations: PathBuf,

        /// Threshold rules CSV (land_type,vegetation_rule,construction_rule,flooding_rule).
        #[arg(long)]
        rules: PathBuf,

        /// Requests CSV (request_id,plot_id,baseline_date,target_date[,land_type]).
        #[arg(long)]
        requests: PathBuf,

        /// Date matching window, in days either side.
        #[arg(long, default_value_t = DEFAULT_TOLERANCE_DAYS)]
        tolerance_days: i64,

        /// Worker threads (1 runs sequentially).
        #[arg(long, default_value_t = 1)]
        workers: usize,

        /// Report "No Change" on an axis whose rule does not match.
        #[arg(long)]
        gate_rules: bool,

        /// Land type used when a request has none or an unknown one.
        #[arg(long, default_value = DEFAULT_LAND_TYPE)]
        default_land_type: String,
    },

    /// Show results from the current snapshot.
    Query {
        /// Restrict to one plot.
        #[arg(long)]
        plot: Option<String>,

        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Per-axis statistics over the current snapshot.
    Report {
        /// Inferences listed per axis.
        #[arg(long, default_value_t = DEFAULT_TOP_N)]
        top: usize,

        /// Restrict to one plot.
        #[arg(long)]
        plot: Option<String>,

        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Write the current results to a file.
    Export {
        /// Output file.
        #[arg(short, long)]
        output: PathBuf,

        /// csv or json.
        #[arg(long, default_value = "csv")]
        format: String,

        /// Restrict to one plot.
        #[arg(long)]
        plot: Option<String>,
    },

    /// Check that every rule in a rules file parses.
    ValidateRules {
        #[arg(long)]
        rules: PathBuf,

        #[arg(long, default_value = DEFAULT_LAND_TYPE)]
        default_land_type: String,
    },

    /// Print snapshot metadata as JSON.
    Info,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   plotwatch completions bash > ~/.local/share/bash-completion/completions/plotwatch
    ///   plotwatch completions zsh > ~/.zfunc/_plotwatch
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },

    /// Launch interactive REPL mode.
    Repl,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let snapshot_path = resolve_snapshot_path(cli.snapshot.as_deref());

    match cli.command {
        Commands::Run {
            observations,
            rules,
            requests,
            tolerance_days,
            workers,
            gate_rules,
            default_land_type,
        } => {
            let config = PipelineConfig {
                tolerance_days,
                workers,
                gating: if gate_rules {
                    RuleGating::Gate
                } else {
                    RuleGating::Advisory
                },
                default_land_type,
            };
            let inputs = RunInputs {
                observations,
                rules,
                requests,
            };
            let session = RunSession::for_run(&snapshot_path);
            let snapshot = session.run(&inputs, config)?;
            print!("{}", commands::render_summary(snapshot.summary()));
            println!("  Snapshot:  {snapshot_path}");
        }

        Commands::Query { plot, json } => {
            let snapshot = RunSession::open(&snapshot_path)?.require_current()?;
            if json {
                println!("{}", commands::query_json(&snapshot, plot.as_deref())?);
            } else {
                print!("{}", commands::render_query(&snapshot, plot.as_deref()));
            }
        }

        Commands::Report { top, plot, json } => {
            let snapshot = RunSession::open(&snapshot_path)?.require_current()?;
            let report = Report::build_filtered(&snapshot, top, plot.as_deref());
            if json {
                println!("{}", commands::report_json(&report)?);
            } else {
                print!("{}", report.render_text());
            }
        }

        Commands::Export {
            output,
            format,
            plot,
        } => {
            let format: ExportFormat = format.parse()?;
            let snapshot = RunSession::open(&snapshot_path)?.require_current()?;
            let rows = export_file(&snapshot, plot.as_deref(), format, &output)?;
            println!("Exported {rows} results to {}", output.display());
        }

        Commands::ValidateRules {
            rules,
            default_land_type,
        } => match commands::validate_rules(&rules, &default_land_type) {
            Ok(listing) => print!("{listing}"),
            Err(e) => {
                eprintln!("Invalid rules file: {e}");
                std::process::exit(1);
            }
        },

        Commands::Info => {
            let session = RunSession::open(&snapshot_path)?;
            let current = session.current();
            println!(
                "{}",
                commands::info_json(&snapshot_path, current.as_deref())?
            );
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "plotwatch", &mut std::io::stdout());
        }

        Commands::Repl => {
            plotwatch_cli::repl::run(&snapshot_path)?;
        }
    }

    Ok(())
}
