use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use owo_colors::OwoColorize;
use swarmbots_app::{RunReport, Scenario, load_agent_list};
use swarmbots_core::{SwarmSimulator, TickSummary};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "swarmbots",
    version,
    about = "Run shared swarm programs over a population of agents"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a scenario until its time budget is spent and print the final agents.
    Run(RunArgs),
    /// Print a scenario's program tree and regions without running it.
    Inspect {
        /// Scenario JSON file.
        scenario: PathBuf,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Scenario JSON file (config, agents, regions, program).
    scenario: PathBuf,
    /// Plain-text agent list (`x y` per line) replacing the scenario's agents.
    #[arg(long, env = "SWARMBOTS_AGENTS")]
    agents: Option<PathBuf>,
    /// Additional agents placed at random within the configured spawn extent.
    #[arg(long, default_value_t = 0)]
    random_agents: usize,
    /// Simulated seconds per tick.
    #[arg(long, env = "SWARMBOTS_DT", default_value_t = 1.0)]
    dt: f64,
    /// Total simulated time.
    #[arg(long = "time", env = "SWARMBOTS_TIME", default_value_t = 10.0)]
    total_time: f64,
    /// RNG seed overriding the scenario's configuration.
    #[arg(long, env = "SWARMBOTS_SEED")]
    seed: Option<u64>,
    /// Emit the final report as JSON.
    #[arg(long)]
    json: bool,
    /// Print one line per tick.
    #[arg(long)]
    ticks: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run_command(args),
        Command::Inspect { scenario } => inspect_command(scenario),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_scenario(path: &Path) -> Result<Scenario> {
    Scenario::load(path).with_context(|| format!("failed to load scenario {}", path.display()))
}

fn run_command(args: RunArgs) -> Result<()> {
    let mut scenario = load_scenario(&args.scenario)?;
    if let Some(path) = &args.agents {
        scenario.agents = load_agent_list(path)
            .with_context(|| format!("failed to load agent list {}", path.display()))?;
    }
    if let Some(seed) = args.seed {
        scenario.config.rng_seed = Some(seed);
    }
    let world = scenario
        .build_world_with_random(args.random_agents)
        .context("failed to set up the world")?;

    info!(
        agents = world.agent_count(),
        dt = args.dt,
        total_time = args.total_time,
        "starting run"
    );
    let mut sim = SwarmSimulator::new(world);
    while let Some(summary) = sim
        .simulate(args.dt, args.total_time)
        .context("simulation aborted")?
    {
        if args.ticks && !args.json {
            print_tick(&summary);
        }
    }

    let report = RunReport::from_simulator(&sim);
    info!(ticks = report.ticks, elapsed = report.elapsed, "run finished");
    if args.json {
        let json = serde_json::to_string_pretty(&report).context("failed to encode report")?;
        println!("{json}");
    } else {
        print_report(&report);
    }
    Ok(())
}

fn inspect_command(path: PathBuf) -> Result<()> {
    let scenario = load_scenario(&path)?;
    let tree = scenario
        .program_tree()
        .context("scenario program is invalid")?;
    println!(
        "{} {} nodes, {} primitives, depth {}",
        "program".bold().cyan(),
        tree.len(),
        tree.primitive_count(),
        tree.depth()
    );
    print!("{tree}");
    println!("{} {}", "agents".bold().cyan(), scenario.agents.len());
    for region in &scenario.regions {
        println!(
            "{} {} {:?}",
            "region".bold().cyan(),
            region.label.green(),
            region.shape
        );
    }
    Ok(())
}

fn print_tick(summary: &TickSummary) {
    println!(
        "{} {:>5}  t={:<8.3} executed {:<5} completed {:<5} signalling {}",
        "tick".dimmed(),
        summary.tick.0,
        summary.elapsed,
        summary.primitives_executed,
        summary.blocks_completed,
        summary.signalling_agents
    );
}

fn print_report(report: &RunReport) {
    println!(
        "{} {} ticks, t={:.3}, {} agents ({} signalling)",
        "finished".green().bold(),
        report.ticks,
        report.elapsed,
        report.agents.len(),
        report.signalling()
    );
    println!(
        "{:<6} {:>12} {:>12} {:>8} {:<10} {}",
        "AGENT".bold().cyan(),
        "X".bold().cyan(),
        "Y".bold().cyan(),
        "SPEED".bold().cyan(),
        "STATE".bold().cyan(),
        "LABEL".bold().cyan()
    );
    println!("{}", "-".repeat(64).dimmed());
    for (idx, agent) in report.agents.iter().enumerate() {
        let state = if agent.finished { "done" } else { "running" };
        println!(
            "{:<6} {:>12.3} {:>12.3} {:>8.3} {:<10} {}",
            idx,
            agent.x,
            agent.y,
            agent.speed,
            state,
            agent.label.yellow()
        );
    }
}
