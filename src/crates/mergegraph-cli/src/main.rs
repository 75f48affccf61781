//! # mergegraph
//!
//! Command-line driver for the two-company deal workflow.

mod approval;

use anyhow::{Context, Result};
use approval::DialoguerApprover;
use clap::{Args, Parser, Subcommand};
use mergegraph_agents::{
    initialize_state, ApprovalMode, ArtifactKind, Collaborators, DealState, DealWorkflow, EntityProfile, EntitySlot,
    FsDocumentLoader, GatePolicy, PipelineConfig, PromptBook,
};
use mergegraph_core::{visualize, ApprovalProvider, DiagramFormat, RunReport, Termination, WorkflowState};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mergegraph")]
#[command(about = "Run the two-company merger analysis workflow", long_about = None)]
#[command(version)]
struct Cli {
    /// Pipeline configuration file (YAML)
    #[arg(short, long, global = true, env = "MERGEGRAPH_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze a merger between two companies
    Run(RunArgs),

    /// Print the assembled workflow graph
    Graph {
        /// Diagram format: mermaid or dot
        #[arg(short, long, default_value = "mermaid")]
        format: DiagramFormat,

        /// Name used for the first company's stages
        #[arg(long, default_value = "company_a")]
        company_a: String,

        /// Name used for the second company's stages
        #[arg(long, default_value = "company_b")]
        company_b: String,
    },

    /// Print the effective configuration as YAML
    Config,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// First company name
    #[arg(long)]
    company_a: String,

    /// First company's source document
    #[arg(long)]
    doc_a: PathBuf,

    /// Second company name
    #[arg(long)]
    company_b: String,

    /// Second company's source document
    #[arg(long)]
    doc_b: PathBuf,

    /// Prompt template overrides (YAML)
    #[arg(long)]
    prompts: Option<PathBuf>,

    /// Gate strategy: interactive, auto-approve or auto-reject
    #[arg(long)]
    approval: Option<ApprovalMode>,

    /// Global step ceiling
    #[arg(long)]
    step_limit: Option<usize>,

    /// Search loop iteration ceiling per company
    #[arg(long)]
    loop_ceiling: Option<u32>,

    /// Use the deterministic offline model and search
    #[arg(long)]
    offline: bool,
}

impl RunArgs {
    /// Flags take precedence over file and environment settings
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(approval) = self.approval {
            config.approval = approval;
        }
        if let Some(limit) = self.step_limit {
            config.step_limit = limit;
        }
        if let Some(ceiling) = self.loop_ceiling {
            config.loop_ceiling = ceiling;
        }
        if self.offline {
            config.offline = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run(args) => run(args, cli.config.as_deref()).await,
        Commands::Graph {
            format,
            company_a,
            company_b,
        } => print_graph(cli.config.as_deref(), format, &company_a, &company_b),
        Commands::Config => {
            let config = PipelineConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
            print!("{}", config.to_yaml()?);
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: RunArgs, config_path: Option<&Path>) -> Result<()> {
    let mut config = PipelineConfig::load(config_path).context("Failed to load configuration")?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let prompts = match &args.prompts {
        Some(path) => PromptBook::with_overrides(path)?,
        None => PromptBook::embedded()?,
    };
    let collaborators = Collaborators::from_config(&config, &prompts)?;

    let provider = match config.approval {
        ApprovalMode::Interactive => Some(Arc::new(DialoguerApprover) as Arc<dyn ApprovalProvider>),
        _ => None,
    };
    let gates = GatePolicy::from_mode(config.approval, provider)?;

    let state = initialize_state(
        EntityProfile::new(args.company_a.clone(), args.doc_a.clone()),
        EntityProfile::new(args.company_b.clone(), args.doc_b.clone()),
        &FsDocumentLoader::new(),
        collaborators.retriever.as_ref(),
    )
    .await
    .context("Failed to prepare company documents")?;

    let workflow = DealWorkflow::from_config(&config, collaborators, prompts, gates);
    let graph = workflow.compile_for(&state)?;
    info!(
        company_a = %args.company_a,
        company_b = %args.company_b,
        approval = ?config.approval,
        "Starting deal analysis"
    );

    let report = graph.invoke_with_report(state).await?;
    print!("{}", summarize(&report));
    Ok(())
}

fn print_graph(config_path: Option<&Path>, format: DiagramFormat, company_a: &str, company_b: &str) -> Result<()> {
    let mut config = PipelineConfig::load(config_path).context("Failed to load configuration")?;
    // Nothing runs; offline collaborators avoid requiring API keys
    config.offline = true;
    let prompts = PromptBook::embedded()?;
    let collaborators = Collaborators::from_config(&config, &prompts)?;
    let workflow = DealWorkflow::from_config(&config, collaborators, prompts, GatePolicy::default());

    let graph = workflow.build(company_a, company_b)?;
    print!("{}", visualize(&graph, format));
    Ok(())
}

fn summarize(report: &RunReport<DealState>) -> String {
    let state = &report.state;
    let mut out = String::new();

    out.push_str(&format!("Run {}\n", report.run_id));
    match &report.termination {
        Termination::Completed => out.push_str("Outcome: completed\n"),
        Termination::GateDeclined { node } => out.push_str(&format!("Outcome: declined at {}\n", node)),
    }
    out.push_str(&format!(
        "Steps: {} ({:.1}s)\n",
        report.steps(),
        report.elapsed().num_milliseconds() as f64 / 1000.0
    ));

    for slot in EntitySlot::ALL {
        let artifacts = state.artifacts(slot);
        let present: Vec<&str> = ArtifactKind::ALL
            .iter()
            .filter(|kind| artifacts.is_populated(**kind))
            .map(|kind| kind.as_str())
            .collect();
        out.push_str(&format!("{}: {}\n", state.entity_name(slot), present.join(", ")));
        for path in artifacts.report_files.values() {
            out.push_str(&format!("  wrote {}\n", path.display()));
        }
    }

    let published = [
        &state.merger.report_file,
        &state.legal.report_file,
        &state.final_report.report_file,
    ];
    for path in published.into_iter().flatten() {
        out.push_str(&format!("wrote {}\n", path.display()));
    }

    if let Some(error) = state.control().error() {
        out.push_str(&format!("Last recorded error: {}\n", error));
    }
    out
}
