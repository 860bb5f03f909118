mod config;

use brebot_gateway::GatewayServer;
use brebot_orchestrator::{
    ActivityLog, CatalogPlanner, Orchestrator, PlanConstraints, PlanRequest,
};
use brebot_skills::SkillRegistry;
use clap::{Parser, Subcommand};
use config::BrebotConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "brebot", about = "Brebot - plan, run and approve operator jobs")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "brebot.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Manage skills
    Skill {
        #[command(subcommand)]
        action: SkillAction,
    },
    /// Turn a goal into a plan and print it
    Plan {
        goal: String,
        /// Keep at most this many steps
        #[arg(long)]
        max_steps: Option<usize>,
        /// Dispatch the plan and wait for the job to settle
        #[arg(long)]
        run: bool,
    },
}

#[derive(Subcommand)]
enum SkillAction {
    /// List registered skills
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let config = BrebotConfig::load(&cli.config).await?;

    match cli.command {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);

            let skills = load_skills(&config)?;
            let activity = Arc::new(ActivityLog::persistent(
                config.orchestrator.activity_capacity,
                config.activity_dir(),
            ));
            let planner = Arc::new(CatalogPlanner::new(skills.clone())?);
            let orchestrator =
                Orchestrator::new(skills, planner, config.orchestrator.clone(), activity);

            if orchestrator.spawn_approval_sweeper(SWEEP_INTERVAL).is_some() {
                info!(
                    ttl_secs = config.orchestrator.approval_ttl_secs,
                    "Approval expiry enabled"
                );
            }

            let app = GatewayServer::build_with_security(orchestrator, &config.security);

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            info!(addr = %addr, "Brebot API listening");
            axum::serve(listener, app).await?;
        }
        Commands::Skill { action } => match action {
            SkillAction::List => {
                let skills = load_skills(&config)?;
                let mut listed = skills.list();
                listed.sort_by(|a, b| a.id.cmp(&b.id));
                println!("Registered skills:");
                for skill in &listed {
                    let gate = match skill.policy {
                        Some(policy) => policy.to_string(),
                        None if skill.critical_default => "critical".to_string(),
                        None => "auto".to_string(),
                    };
                    println!("  {} [{gate}] - {}", skill.id, skill.description);
                }
                println!("\nTotal: {} skill(s)", listed.len());
            }
        },
        Commands::Plan {
            goal,
            max_steps,
            run,
        } => {
            let skills = load_skills(&config)?;
            let orchestrator =
                Orchestrator::with_catalog_planner(skills, config.orchestrator.clone())?;
            let request = PlanRequest {
                prompt: goal,
                constraints: PlanConstraints {
                    max_steps,
                    ..PlanConstraints::default()
                },
            };
            let plan = orchestrator.generate_plan(&request).await?;
            println!("{}", serde_json::to_string_pretty(&plan)?);

            if run {
                let job = orchestrator.dispatch(plan).await?;
                let job = orchestrator.wait_idle(job.id).await?;
                println!("{}", serde_json::to_string_pretty(&job)?);
            }
        }
    }

    Ok(())
}

/// Builtins registered under the data directory, with config policy overrides.
fn load_skills(config: &BrebotConfig) -> anyhow::Result<Arc<SkillRegistry>> {
    let mut registry = SkillRegistry::new();
    brebot_builtins::register_builtins(&mut registry, &config.workspace_dir())?;
    config.apply_skill_policies(&registry)?;
    info!(count = registry.skill_count(), "Skills registered");
    Ok(Arc::new(registry))
}
