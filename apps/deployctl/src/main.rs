use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{load_settings, DeployOrchestrator, DeploySession, DeployState};
use shared::protocol::DeployStatus;
use tokio::sync::broadcast::{self, error::RecvError};
use topology::{export_diagram, read_diagram_file, write_diagram_file, GraphStore};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "deployctl", about = "Validate and deploy service topology diagrams")]
struct Cli {
    /// Deployment API origin, e.g. http://localhost:8080.
    #[arg(long, global = true)]
    api_url: Option<String>,
    /// Status feed origin. Derived from the API origin when omitted.
    #[arg(long, global = true)]
    ws_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check a diagram file without contacting the service.
    Validate { file: PathBuf },
    /// Deploy a diagram to an idle service.
    Deploy {
        file: PathBuf,
        /// Keep printing status updates until Ctrl-C.
        #[arg(long)]
        watch: bool,
    },
    /// Send a revised diagram to the running deployment.
    Update { file: PathBuf },
    Teardown,
    Status,
    /// Follow the live status feed until Ctrl-C or teardown.
    Watch,
    /// Rewrite a diagram in canonical form under a fresh diagram id.
    Export {
        file: PathBuf,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();

    let mut settings = load_settings();
    if let Some(url) = cli.api_url {
        settings.api_base_url = url;
    }
    if let Some(url) = cli.ws_url {
        settings.ws_base_url = Some(url);
    }

    match cli.command {
        Command::Validate { file } => validate(&file),
        Command::Export { file, output } => export(&file, output.as_deref()),
        Command::Deploy { file, watch } => {
            let mut session = DeploySession::new(&settings)?;
            load(&mut session, &file)?;
            let events = session.orchestrator().subscribe();
            session.deploy().await?;
            println!(
                "deploy accepted: {} services, {} connections",
                session.store().nodes().len(),
                session.store().edges().len()
            );
            if watch {
                follow(session.orchestrator(), events).await;
            }
            Ok(())
        }
        Command::Update { file } => {
            let mut session = DeploySession::new(&settings)?;
            session.orchestrator().refresh_status().await?;
            load(&mut session, &file)?;
            session.update_deploy().await?;
            print_state(&session.orchestrator().state());
            Ok(())
        }
        Command::Teardown => {
            let session = DeploySession::new(&settings)?;
            session.orchestrator().refresh_status().await?;
            session.teardown().await?;
            println!("deployment torn down");
            Ok(())
        }
        Command::Status => {
            let session = DeploySession::new(&settings)?;
            session.orchestrator().refresh_status().await?;
            print_state(&session.orchestrator().state());
            Ok(())
        }
        Command::Watch => {
            let session = DeploySession::new(&settings)?;
            let orchestrator = session.orchestrator();
            orchestrator.refresh_status().await?;
            print_state(&orchestrator.state());
            if orchestrator.deploy_status() == DeployStatus::Idle {
                println!("nothing is deployed");
                return Ok(());
            }
            let events = orchestrator.subscribe();
            orchestrator.attach()?;
            follow(orchestrator, events).await;
            Ok(())
        }
    }
}

fn load(session: &mut DeploySession, file: &Path) -> Result<()> {
    session
        .import_file(file)
        .with_context(|| format!("failed to load {}", file.display()))
}

fn validate(file: &Path) -> Result<()> {
    let graph = read_diagram_file(file)?;
    println!(
        "{}: {} services, {} connections",
        file.display(),
        graph.nodes.len(),
        graph.edges.len()
    );
    for node in &graph.nodes {
        let configured = if node.data.config.is_some() {
            "configured"
        } else {
            "defaults"
        };
        println!(
            "  {:<12} {:<12} {} ({configured})",
            node.id.as_str(),
            node.data.service_type.as_str(),
            node.data.label
        );
    }
    Ok(())
}

fn export(file: &Path, output: Option<&Path>) -> Result<()> {
    let graph = read_diagram_file(file)?;
    let mut store = GraphStore::new();
    store.load_diagram(graph.nodes, graph.edges);
    let diagram = export_diagram(store.nodes(), store.edges());

    match output {
        Some(path) => {
            write_diagram_file(path, &diagram)?;
            println!("wrote {} ({})", path.display(), diagram.id);
        }
        None => {
            let json = serde_json::to_string_pretty(&diagram)?;
            println!("{json}");
        }
    }
    Ok(())
}

async fn follow(orchestrator: &DeployOrchestrator, mut events: broadcast::Receiver<DeployState>) {
    println!("following deployment status, Ctrl-C to stop");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(state) => {
                    print_state(&state);
                    if state.deploy_status == DeployStatus::Idle {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "status output fell behind"),
                Err(RecvError::Closed) => break,
            },
        }
    }
    orchestrator.reset();
}

fn print_state(state: &DeployState) {
    match state.last_status_at {
        Some(at) => println!("status: {} (as of {})", state.deploy_status, at.to_rfc3339()),
        None => println!("status: {}", state.deploy_status),
    }
    let mut nodes: Vec<_> = state.node_statuses.iter().collect();
    nodes.sort_by(|a, b| a.0.cmp(b.0));
    for (node_id, status) in nodes {
        println!("  {:<12} {}", node_id.as_str(), status);
    }
    if let Some(error) = &state.error {
        println!("error: {error}");
    }
}
