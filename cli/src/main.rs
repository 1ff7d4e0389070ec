use clap::{Parser, Subcommand};
use queuesim_core_rs::orchestrator::{
    compile, run_replications, CancelToken, CompiledModel, ConfigError, ModelConfig, RunReport,
    Simulation, SimulationError, StatisticsReport,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "queuesim")]
#[command(about = "Queue Simulator CLI - discrete-event queueing network runs", long_about = None)]
struct Cli {
    /// Log run progress at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a model file and list every problem found
    Validate {
        /// Path to the model JSON file
        model_path: PathBuf,
    },
    /// Run a model once or as independent replications
    Run {
        /// Path to the model JSON file
        model_path: PathBuf,
        /// Override the seed stored in the model
        #[arg(long)]
        seed: Option<u64>,
        /// Number of independent replications
        #[arg(short, long, default_value_t = 1)]
        replications: usize,
        /// Write the full JSON report here instead of a summary on stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error("cannot read '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot write '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("'{path}' is not a model file: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("model has {0} problem(s)")]
    InvalidModel(usize),

    #[error(transparent)]
    Simulation(#[from] SimulationError),

    #[error("cannot encode report: {0}")]
    Encode(#[from] serde_json::Error),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Validate { model_path } => cmd_validate(&model_path),
        Commands::Run {
            model_path,
            seed,
            replications,
            output,
        } => cmd_run(&model_path, seed, replications, output.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_model(path: &Path) -> Result<ModelConfig, CliError> {
    let text = fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| CliError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn compile_model(config: &ModelConfig) -> Result<Arc<CompiledModel>, CliError> {
    compile(config).map(Arc::new).map_err(|errors| {
        print_problems(&errors);
        CliError::InvalidModel(errors.len())
    })
}

fn print_problems(errors: &[ConfigError]) {
    for error in errors {
        eprintln!("  ✗ {}", error);
    }
}

// ============================================================================
// Commands
// ============================================================================

fn cmd_validate(model_path: &Path) -> Result<(), CliError> {
    println!("Validating model: {}", model_path.display());
    let config = load_model(model_path)?;
    let model = compile_model(&config)?;
    println!(
        "✓ Model '{}' is valid ({} stations, {} continuous entities)",
        model.name,
        model.stations.len(),
        model.continuous.len()
    );
    println!("  hash: {}", model.model_hash);
    Ok(())
}

fn cmd_run(
    model_path: &Path,
    seed: Option<u64>,
    replications: usize,
    output: Option<&Path>,
) -> Result<(), CliError> {
    let config = load_model(model_path)?;
    let seed = seed.unwrap_or(config.seed);
    let model = compile_model(&config)?;

    let json = if replications > 1 {
        info!(model = %model.name, replications, seed, "running replications");
        let summary = run_replications(model, replications, seed, &CancelToken::new());
        if output.is_none() {
            for report in &summary.reports {
                print_run_line(report);
            }
            for failure in &summary.failures {
                println!("  ✗ replication {} (seed {}): {}", failure.index, failure.seed, failure.message);
            }
            if let Some(pooled) = &summary.pooled {
                println!("Pooled over {} replication(s):", summary.reports.len());
                print_statistics(pooled);
            }
        }
        serde_json::to_string_pretty(&summary)?
    } else {
        let mut sim = Simulation::new(model, seed)?;
        let report = sim.run()?;
        if output.is_none() {
            print_run_line(&report);
            print_statistics(&report.statistics);
        }
        report.to_json()?
    };

    if let Some(path) = output {
        fs::write(path, json).map_err(|source| CliError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        println!("✓ Report written to {}", path.display());
    }
    Ok(())
}

// ============================================================================
// Output
// ============================================================================

fn print_run_line(report: &RunReport) {
    println!(
        "✓ Run {} (seed {}): {} at t={:.3}, {} events, {} created, {} disposed",
        report.run_id,
        report.seed,
        report.termination,
        report.end_time,
        report.events_processed,
        report.clients_created,
        report.clients_disposed
    );
}

fn print_statistics(stats: &StatisticsReport) {
    println!(
        "  Time in system: mean {:.4}, sd {:.4} ({} clients)",
        stats.time_in_system.snapshot.mean,
        stats.time_in_system.snapshot.sd,
        stats.time_in_system.snapshot.count
    );
    println!(
        "  {:<20} {:<8} {:>10} {:>12} {:>12} {:>10}",
        "station", "kind", "arrivals", "mean wait", "mean queue", "errors"
    );
    for station in &stats.stations {
        println!(
            "  {:<20} {:<8} {:>10} {:>12.4} {:>12.4} {:>10}",
            station.name,
            station.kind,
            station.arrivals,
            station.waiting_time.snapshot.mean,
            station.queue_length.snapshot.mean,
            station.evaluation_errors
        );
        if let Some(routing) = &station.routing {
            for count in routing {
                println!("      -> {:<16} {:>10}", count.destination, count.count);
            }
        }
    }
    for entity in &stats.continuous {
        println!(
            "  {:<20} final {:.4}, mean {:.4}, {} notifications, flow in {:.4} out {:.4}",
            entity.name,
            entity.final_value,
            entity.level.snapshot.mean,
            entity.notifications,
            entity.flow_in,
            entity.flow_out
        );
    }
}
