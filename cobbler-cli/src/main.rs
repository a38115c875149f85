//! cobbler binary: configuration, logging, signal handling, and the
//! generator → bot pipeline wiring.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cobbler::agent::{Agent, AgentConfig};
use cobbler::bot::Bot;
use cobbler::conversation::store::HistoryStore;
use cobbler::github::rest::RestClient;
use cobbler::github::GithubApi;
use cobbler::llm::anthropic::AnthropicClient;
use cobbler::llm::LlmClient;
use cobbler::task::TaskGenerator;
use cobbler::tools::ToolRegistry;
use cobbler::validate::{ChecksValidator, CommitValidator};

#[derive(Parser, Debug)]
#[command(name = "cobbler")]
#[command(about = "cobbler: autonomous GitHub issue-fixing bot")]
struct Args {
    /// Login of the bot account issues are assigned to
    #[arg(long, env = "COBBLER_BOT_USER", value_name = "LOGIN")]
    bot_user: String,

    /// GitHub token for the bot account
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: String,

    /// API key for the model endpoint
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    anthropic_api_key: String,

    /// Model to drive the agent with
    #[arg(long, env = "COBBLER_MODEL", default_value = "claude-sonnet-4-20250514")]
    model: String,

    /// Max output tokens per model response
    #[arg(long, default_value_t = 8192)]
    max_tokens: u32,

    /// Seconds between issue-search cycles
    #[arg(long, env = "COBBLER_CHECK_INTERVAL", value_name = "SECONDS", default_value_t = 60)]
    check_interval: u64,

    /// Directory for resumable conversation histories
    #[arg(long, env = "COBBLER_HISTORY_DIR", value_name = "DIR", default_value = ".cobbler/conversations")]
    history_dir: PathBuf,

    /// Upper bound on agent-loop iterations per task
    #[arg(long, default_value_t = 200)]
    max_iterations: u32,

    /// Cumulative input tokens before conversation summarization (0 disables)
    #[arg(long, default_value_t = 150_000)]
    summarize_threshold: u64,

    /// Seconds before a validation run is abandoned
    #[arg(long, value_name = "SECONDS", default_value_t = 2700)]
    validation_timeout: u64,

    /// Seconds between validation polls
    #[arg(long, value_name = "SECONDS", default_value_t = 15)]
    validation_poll: u64,

    /// Run a single search cycle and exit
    #[arg(long)]
    once: bool,

    /// Also write logs to this file
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

fn init_tracing(log_file: Option<&PathBuf>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match log_file {
        Some(path) => {
            let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let file = path
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_else(|| "cobbler.log".to_string());
            let appender = tracing_appender::rolling::never(dir, file);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let args = Args::parse();
    let _guard = init_tracing(args.log_file.as_ref());

    match run(args).await {
        Ok(()) => {
            info!("clean shutdown");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "fatal error");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let octo = octocrab::Octocrab::builder()
        .personal_token(args.github_token.clone())
        .build()?;
    let api: Arc<dyn GithubApi> = Arc::new(RestClient::new(octo));
    let llm: Arc<dyn LlmClient> = Arc::new(AnthropicClient::new(
        args.anthropic_api_key.clone(),
        args.model.clone(),
        args.max_tokens,
    ));
    let validator: Arc<dyn CommitValidator> = Arc::new(ChecksValidator::new(
        Arc::clone(&api),
        Duration::from_secs(args.validation_poll),
        Duration::from_secs(args.validation_timeout),
    ));
    let agent = Agent::new(
        Arc::clone(&api),
        llm,
        validator,
        HistoryStore::new(&args.history_dir),
        ToolRegistry::standard(),
        args.bot_user.clone(),
        AgentConfig {
            max_iterations: args.max_iterations,
            summarize_threshold: args.summarize_threshold,
        },
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested, finishing current iteration");
                cancel.cancel();
            }
        });
    }

    let mut generator = TaskGenerator::new(
        Arc::clone(&api),
        args.bot_user.clone(),
        Duration::from_secs(args.check_interval),
    );
    if args.once {
        generator = generator.once();
    }
    let (tx, rx) = mpsc::channel(4);
    let generator_handle = tokio::spawn(generator.run(tx, cancel.clone()));

    info!(bot = %args.bot_user, interval = args.check_interval, "cobbler started");
    Bot::new(api, agent).run(rx, cancel).await;

    generator_handle.await??;
    Ok(())
}
