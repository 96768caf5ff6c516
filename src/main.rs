//! courier: chat agent backend
//!
//! Usage:
//!   courier chat                               → interactive REPL (bare text is routed)
//!   courier send "what's in my inbox?"         → route one message
//!   courier send --agent mail-1 "latest mail"  → send to a specific agent
//!   courier agents                             → list registered agents
//!   courier create mail mail-1 --client-id ..  → create an agent
//!   courier command mail-1 get_auth_url        → run an agent command
//!   courier config                             → print the default config

mod repl;

use anyhow::Context;
use clap::{Parser, Subcommand};
use courier_agent::{
    AgentContext, AgentRegistry, AgentSettings, CredentialBlob, CredentialStore, CreateOptions, EnvBackend,
    LlmClassifier, Router,
};
use courier_core::{Command, CourierConfig, CredentialBackendKind, LlmProviderKind};
use courier_llm::{AnthropicProvider, LlmProvider, OpenAiProvider};
use courier_mail::{GmailClient, MailProvider};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "courier",
    about = "Chat agent backend: routes messages to mail, spreadsheet and general assistants",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Write logs to a file (in addition to stderr)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat in the terminal
    Chat,
    /// Send one message and print the reply
    Send {
        /// Target agent id (default: let the router decide)
        #[arg(short, long)]
        agent: Option<String>,
        message: Vec<String>,
    },
    /// List registered agents
    Agents,
    /// List the agent types that can be created
    Types,
    /// Create and start an agent
    Create {
        /// default, mail or spreadsheet
        agent_type: String,
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        client_id: Option<String>,
        #[arg(long)]
        client_secret: Option<String>,
        #[arg(long)]
        redirect_uri: Option<String>,
        #[arg(long)]
        api_key: Option<String>,
    },
    /// Stop an agent and delete its state and credentials
    Remove { id: String },
    /// Execute an agent command
    Command {
        id: String,
        /// Command name, or a JSON command such as '{"name": "set_tokens", "access_token": "..."}'
        name: String,
        /// JSON payload, e.g. '{"code": "..."}'
        #[arg(long)]
        payload: Option<String>,
    },
    /// Print the default config as TOML
    Config,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Version => {
            println!("courier v{}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Commands::Config => {
            print!("{}", CourierConfig::default().to_toml());
            return Ok(());
        }
        _ => {}
    }

    let _log_guard = init_tracing(cli.log_file.as_ref())?;
    let config = load_config(&cli);
    let registry = build_registry(&config);
    let restored = registry.restore_all().await;
    info!("courier v{} ready ({} agents restored)", env!("CARGO_PKG_VERSION"), restored);

    let outcome = tokio::select! {
        result = run(&registry, cli.command) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            Ok(())
        }
    };

    registry.shutdown_all().await;
    outcome
}

fn init_tracing(log_file: Option<&PathBuf>) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "courier=info,courier_agent=info,courier_mail=info,courier_llm=info".into());
    let stderr = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let Some(path) = log_file else {
        tracing_subscriber::registry().with(filter).with(stderr).init();
        return Ok(None);
    };

    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| std::path::Path::new("."));
    let file_name = path.file_name().context("--log-file must name a file")?;
    std::fs::create_dir_all(dir)?;
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
        .init();
    Ok(Some(guard))
}

fn load_config(cli: &Cli) -> CourierConfig {
    let path = cli.config.clone().unwrap_or_else(|| {
        dirs::config_dir()
            .map(|d| d.join("courier").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("courier.toml"))
    });
    let mut config = CourierConfig::load(&path);
    config.apply_env();
    if let Some(dir) = &cli.data_dir {
        config.storage.data_dir = dir.clone();
    }
    config
}

fn build_llm(config: &CourierConfig) -> Option<Arc<dyn LlmProvider>> {
    let var = match config.llm.provider {
        LlmProviderKind::Anthropic => "ANTHROPIC_API_KEY",
        LlmProviderKind::Openai => "OPENAI_API_KEY",
    };
    let Ok(key) = std::env::var(var) else {
        warn!("{} not set, running without a language model", var);
        return None;
    };
    let base_url = config.llm.base_url.clone();
    let provider: Arc<dyn LlmProvider> = match config.llm.provider {
        LlmProviderKind::Anthropic => {
            let p = AnthropicProvider::new(key);
            Arc::new(match base_url {
                Some(url) => p.with_base_url(url),
                None => p,
            })
        }
        LlmProviderKind::Openai => {
            let p = OpenAiProvider::new(key);
            Arc::new(match base_url {
                Some(url) => p.with_base_url(url),
                None => p,
            })
        }
    };
    Some(provider)
}

fn build_registry(config: &CourierConfig) -> AgentRegistry {
    let credentials = match config.credentials.backend {
        CredentialBackendKind::File => CredentialStore::file(config.credentials_dir()),
        CredentialBackendKind::Env => CredentialStore::new(Arc::new(EnvBackend::from_env(config.credentials_dir()))),
    };
    info!("Credential backend: {}", credentials.backend_name());

    let mail: Arc<dyn MailProvider> = Arc::new(GmailClient::new(
        config.mail.api_base.clone(),
        config.mail.auth_base.clone(),
        config.mail.token_url.clone(),
    ));
    let mut ctx = AgentContext::new(credentials)
        .with_mail(mail)
        .with_settings(AgentSettings::from(config));

    let router = match build_llm(config) {
        Some(llm) => {
            ctx = ctx.with_llm(llm.clone());
            Router::new(Arc::new(LlmClassifier::new(llm, config.llm.router_model.clone())))
        }
        None => Router::disabled(),
    };
    AgentRegistry::new(config.agents_dir(), ctx).with_router(router)
}

async fn run(registry: &AgentRegistry, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Chat => repl::run(registry).await,
        Commands::Send { agent, message } => {
            let message = message.join(" ");
            anyhow::ensure!(!message.trim().is_empty(), "message is empty");
            match agent {
                Some(id) => {
                    let reply = registry.dispatch_message(&id, &message).await?;
                    println!("[{}] {}", id, reply);
                }
                None => {
                    let routed = registry.process_with_routing(&message).await?;
                    println!("[{}] {}", routed.agent_id, routed.response);
                }
            }
            Ok(())
        }
        Commands::Agents => {
            repl::print_agents(registry).await;
            Ok(())
        }
        Commands::Types => {
            for t in registry.available_types() {
                println!("{:<12} {:<24} {}", t.id.as_str(), t.name, t.description);
            }
            Ok(())
        }
        Commands::Create {
            agent_type,
            id,
            name,
            client_id,
            client_secret,
            redirect_uri,
            api_key,
        } => {
            let mut blob = CredentialBlob::new();
            for (field, value) in [
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("redirect_uri", redirect_uri),
                ("api_key", api_key),
            ] {
                if let Some(value) = value {
                    blob.insert(field.to_string(), Value::String(value));
                }
            }
            let options = CreateOptions {
                name,
                credentials: (!blob.is_empty()).then_some(blob),
            };
            let handle = registry.create(&agent_type, &id, options).await?;
            let agent = handle.lock().await;
            println!("Created {} agent {} ({})", agent.kind(), agent.id(), agent.name());
            Ok(())
        }
        Commands::Remove { id } => {
            registry.remove(&id).await?;
            println!("Removed {}", id);
            Ok(())
        }
        Commands::Command { id, name, payload } => {
            let mut command = Command::parse(&name)?;
            if let Some(raw) = payload {
                let value: Value = serde_json::from_str(&raw).context("--payload must be JSON")?;
                command.payload = Some(value);
            }
            let result = registry.dispatch_command(&id, &command).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Commands::Config | Commands::Version => Ok(()),
    }
}
