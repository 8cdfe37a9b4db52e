use std::path::PathBuf;

use clap::{Parser, Subcommand};

use ideagen::catalog::Catalog;
use ideagen::config::Config;
use ideagen::core::transcript::MarkdownFileSink;
use ideagen::log::LogOptions;
use ideagen::orchestration::{cancel_on_ctrl_c, Launcher};
use ideagen::pipeline::{preview_plan, Pipeline};
use ideagen::{ilog, ilog_error, Result};

/// Ideagen - multi-agent Design Thinking idea generator
#[derive(Parser, Debug)]
#[command(name = "ideagen")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    \
    IDEAGEN_DEBUG=1|trace   Enable debug (or trace) logging\n    \
    AI_API_KEY              API key of the chat backend\n    \
    AI_MODEL                Model name\n    \
    AI_BASE_URL             OpenAI-compatible base URL\n    \
    RANDOM_ORG_API_KEY      random.org key for true random persona values")]
pub struct Cli {
    /// Enable debug logging
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    /// Also write log lines to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Config file (default: ./ideagen.toml, then ~/.ideagen/ideagen.toml)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run the idea generation pipeline once (default)
    Run {
        /// Run up to N independent tasks concurrently
        #[arg(long)]
        parallel: Option<usize>,
    },

    /// Validate the catalog and print the execution plan
    Plan,

    /// Launch several independent runs and relay their output
    Launch {
        /// Number of instances
        #[arg(default_value_t = 1)]
        instances: usize,
    },
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    ideagen::log::init(LogOptions {
        debug: cli.debug,
        file: cli.log_file.clone(),
    });

    let rt = tokio::runtime::Runtime::new()?;
    match cli.command.clone().unwrap_or(Command::Run { parallel: None }) {
        Command::Run { parallel } => rt.block_on(run_pipeline(cli.config, parallel)),
        Command::Plan => show_plan(cli.config),
        Command::Launch { instances } => rt.block_on(run_launch(cli.config, instances)),
    }
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::load_from(&path)?,
        None => Config::load()?,
    };
    config.apply_env();
    Ok(config)
}

async fn run_pipeline(config_path: Option<PathBuf>, parallel: Option<usize>) -> Result<()> {
    ilog!("Starting idea generation process...");
    let mut config = load_config(config_path)?;
    if let Some(parallel) = parallel {
        config.max_parallel = parallel;
        config.validate()?;
    }

    let pipeline = Pipeline::from_config(config)?;
    let report = match pipeline.run().await {
        Ok(report) => report,
        Err(e) => {
            ilog_error!("An error occurred: {}", e);
            return Err(e);
        }
    };

    let report_path = MarkdownFileSink::report_path(&pipeline.transcript_dir(), &report.run_id);
    match report.into_result() {
        Ok(transcript) => {
            ilog!(
                "Idea generation completed successfully! {} tasks, report: {}",
                transcript.len(),
                report_path.display()
            );
            Ok(())
        }
        Err(e) => {
            ilog_error!("An error occurred: {}", e);
            ilog!("Partial report: {}", report_path.display());
            Err(e)
        }
    }
}

fn show_plan(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let catalog = Catalog::load_or_builtin(config.catalog.as_deref())?;
    let plan = preview_plan(&catalog)?;

    println!(
        "Execution plan: {} tasks, {} dependencies, {} agents",
        plan.len(),
        plan.dependency_count(),
        catalog.agents.len()
    );
    println!();
    for (i, wave) in plan.waves().iter().enumerate() {
        println!("Wave {}:", i + 1);
        for name in wave {
            let agent = plan.node(name).map(|n| n.agent_role()).unwrap_or("?");
            let deps = plan.dependencies_of(name);
            if deps.is_empty() {
                println!("  {:<40} {}", name, agent);
            } else {
                println!("  {:<40} {}  <- {}", name, agent, deps.join(", "));
            }
        }
    }
    println!();
    println!("Order:");
    for (i, name) in plan.order().iter().enumerate() {
        println!("  {:>2}. {}", i + 1, name);
    }
    Ok(())
}

/// Launch always exits 0; setup problems are logged like failed instances.
async fn run_launch(config_path: Option<PathBuf>, instances: usize) -> Result<()> {
    if let Err(e) = launch_instances(config_path, instances).await {
        ilog_error!("Failed to launch instances: {}", e);
    }
    Ok(())
}

async fn launch_instances(config_path: Option<PathBuf>, instances: usize) -> Result<()> {
    let config = load_config(config_path.clone())?;

    let mut args = vec!["run".to_string()];
    if let Some(path) = config_path {
        args.push("--config".to_string());
        args.push(path.display().to_string());
    }
    if ideagen::log::is_debug() {
        args.push("--debug".to_string());
    }

    let launcher = Launcher::current_exe(args)?.with_report_dir(&config.transcript_dir());
    launcher.launch(instances, cancel_on_ctrl_c()).await;
    Ok(())
}
