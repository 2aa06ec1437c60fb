use anyhow::{Context, Result, bail};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vigil_common::protocol::{CloseSessionRequest, CreateSessionRequest, LoopRequest, LoopResponse};
use vigil_engine::AgentService;
use vigil_engine::config::{ConfigLoader, VigilConfig};
use vigil_engine::scripted::{ScriptedReasoner, StaticPerception};
use vigil_h::CdpLauncher;

#[derive(Parser, Debug)]
#[command(name = "vigil", version, about = "Vigil browsing agent")]
struct Args {
    /// Config file (defaults to ./vigil.yaml, then ~/.vigil/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Launch browser in visible mode (not headless)
    #[arg(long, global = true)]
    visible: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Drive one session towards a goal with replayed decisions
    Run(RunArgs),
    /// Start the engine, run one health probe and print the result
    Probe(ProbeArgs),
}

#[derive(ClapArgs, Debug)]
struct ProbeArgs {
    /// Print engine metrics in the Prometheus text format instead of JSON
    #[arg(long)]
    metrics: bool,
}

#[derive(ClapArgs, Debug)]
struct RunArgs {
    /// Goal handed to the reasoner
    #[arg(long)]
    goal: String,

    /// Page to open before the first step
    #[arg(long)]
    url: Option<String>,

    /// YAML/JSON list of decisions, replayed in order
    #[arg(long)]
    decisions: PathBuf,

    /// YAML/JSON list of UI elements reported for every screenshot
    #[arg(long)]
    elements: Option<PathBuf>,

    #[arg(long)]
    max_steps: Option<u32>,

    /// Execute even below the confidence threshold
    #[arg(long)]
    force: bool,

    /// Keep screenshots after the session closes
    #[arg(long)]
    keep_artifacts: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the JSON result.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = ConfigLoader::load(args.config.as_deref())
        .await
        .context("Failed to load configuration")?;
    if args.visible {
        config.browser.headless = false;
    }

    match args.command {
        Command::Run(run_args) => run(config, run_args).await,
        Command::Probe(probe_args) => probe(config, probe_args).await,
    }
}

async fn run(config: VigilConfig, args: RunArgs) -> Result<()> {
    if let Some(url) = &args.url {
        url::Url::parse(url).with_context(|| format!("Invalid URL: {}", url))?;
    }

    let reasoner = ScriptedReasoner::from_path(&args.decisions)
        .await
        .with_context(|| format!("Failed to load decisions from {}", args.decisions.display()))?;
    let perception = match &args.elements {
        Some(path) => StaticPerception::from_path(path)
            .await
            .with_context(|| format!("Failed to load elements from {}", path.display()))?,
        None => StaticPerception::new(Vec::new()),
    };

    let service = AgentService::new(
        config.clone(),
        Arc::new(CdpLauncher::new(config.browser.clone())),
        Arc::new(perception),
        Arc::new(reasoner),
    )?;
    service
        .start()
        .await
        .context("Failed to launch browser engine")?;

    let outcome = drive(&service, &args).await;
    service.shutdown().await;

    let response = outcome?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

/// Create a session, run the loop and close the session again, even when
/// the loop fails.
async fn drive(service: &AgentService, args: &RunArgs) -> Result<LoopResponse> {
    let session_id = service
        .create_session(CreateSessionRequest {
            keep_artifacts: args.keep_artifacts,
            ..CreateSessionRequest::default()
        })
        .await?
        .session_id;
    info!(session_id = %session_id, "Session created");

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping after the current step");
                cancel.cancel();
            }
        })
    };

    let mut request = LoopRequest::new(args.goal.as_str()).with_force(args.force);
    if let Some(max_steps) = args.max_steps {
        request = request.with_max_steps(max_steps);
    }

    let outcome = match &args.url {
        Some(url) => match service.navigate(&session_id, url).await {
            Ok(nav) => {
                info!(url = %nav.url, title = %nav.title, "Opened start page");
                service
                    .run_loop_until(&session_id, request, &cancel)
                    .await
            }
            Err(e) => Err(e),
        },
        None => {
            service
                .run_loop_until(&session_id, request, &cancel)
                .await
        }
    };
    interrupt.abort();

    if args.keep_artifacts {
        if let Some(session) = service.registry().get(&session_id) {
            info!(dir = %session.artifacts_dir().display(), "Keeping session artifacts");
        }
    }
    if let Err(e) = service
        .close_session(
            &session_id,
            CloseSessionRequest {
                keep_artifacts: Some(args.keep_artifacts),
            },
        )
        .await
    {
        warn!(session_id = %session_id, "Failed to close session: {}", e);
    }

    Ok(outcome?)
}

async fn probe(config: VigilConfig, args: ProbeArgs) -> Result<()> {
    let service = AgentService::new(
        config.clone(),
        Arc::new(CdpLauncher::new(config.browser.clone())),
        Arc::new(StaticPerception::new(Vec::new())),
        Arc::new(ScriptedReasoner::new(Vec::new())),
    )?;
    service
        .start()
        .await
        .context("Failed to launch browser engine")?;

    let healthy = service.supervisor().probe_now().await;
    let health = service.health();
    let metrics = service.render_metrics();
    service.shutdown().await;

    if args.metrics {
        print!("{}", metrics?);
    } else {
        println!("{}", serde_json::to_string_pretty(&health)?);
    }
    if !healthy {
        bail!("Engine health probe failed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let args = Args::try_parse_from([
            "vigil",
            "run",
            "--goal",
            "find the docs",
            "--url",
            "https://example.org",
            "--decisions",
            "plan.yaml",
            "--max-steps",
            "3",
            "--keep-artifacts",
            "--visible",
        ])
        .unwrap();

        assert!(args.visible);
        let Command::Run(run) = args.command else {
            panic!("expected run");
        };
        assert_eq!(run.goal, "find the docs");
        assert_eq!(run.url.as_deref(), Some("https://example.org"));
        assert_eq!(run.decisions, PathBuf::from("plan.yaml"));
        assert_eq!(run.max_steps, Some(3));
        assert!(run.keep_artifacts);
        assert!(!run.force);
        assert!(run.elements.is_none());
    }

    #[test]
    fn test_run_requires_goal_and_decisions() {
        assert!(Args::try_parse_from(["vigil", "run", "--goal", "x"]).is_err());
        assert!(Args::try_parse_from(["vigil", "run", "--decisions", "p.yaml"]).is_err());
    }

    #[test]
    fn test_parse_probe_with_config() {
        let args = Args::try_parse_from(["vigil", "--config", "/etc/vigil.yaml", "probe"]).unwrap();
        assert!(matches!(args.command, Command::Probe(ProbeArgs { metrics: false })));
        assert_eq!(args.config, Some(PathBuf::from("/etc/vigil.yaml")));
    }

    #[test]
    fn test_parse_probe_metrics() {
        let args = Args::try_parse_from(["vigil", "probe", "--metrics"]).unwrap();
        assert!(matches!(args.command, Command::Probe(ProbeArgs { metrics: true })));
    }
}
