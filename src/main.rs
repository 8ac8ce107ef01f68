use code_agent::cli;
use code_agent::config;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "code-agent", version, about = "Local LLM-driven code assistant")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging (overridden by RUST_LOG)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start an interactive chat session (default)
    Chat,
    /// Run a single turn and print the final answer
    Run {
        /// User message to send
        #[arg(long, short)]
        message: String,
    },
    /// Create a new file with the supplied content
    Create {
        /// Path to the file to create
        path: PathBuf,
        /// Content to write into the file
        #[arg(long)]
        content: String,
        /// Allow overwriting an existing file
        #[arg(long)]
        overwrite: bool,
    },
    /// Append text to an existing file
    Append {
        /// Path to the file to modify
        path: PathBuf,
        /// Text to append to the file
        #[arg(long)]
        content: String,
    },
    /// Convert a Python script to a Jupyter notebook
    Py2ipynb {
        /// Python script to convert
        src: PathBuf,
        /// Target notebook path (defaults to SRC with .ipynb)
        dst: Option<PathBuf>,
    },
    /// List the tools available to the model
    Tools,
    /// Write a default config file
    Init,
}

fn init_tracing(debug: bool) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let default_level = if debug { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // stdout carries the conversation; logs go to stderr.
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let config_path = cli
        .config
        .unwrap_or_else(|| code_agent::code_agent_home().join("config.yaml"));

    match cli.command.unwrap_or(Command::Chat) {
        Command::Create {
            path,
            content,
            overwrite,
        } => cli::create_file(&path, &content, overwrite).await,
        Command::Append { path, content } => cli::append_file(&path, &content).await,
        Command::Py2ipynb { src, dst } => cli::convert_notebook(&src, dst.as_deref()).await,
        Command::Init => cli::init_config(&config_path).await,
        Command::Run { message } => cli::run_once(&load_config(&config_path).await?, &message).await,
        Command::Tools => cli::list_tools(&load_config(&config_path).await?),
        Command::Chat => cli::chat(&load_config(&config_path).await?).await,
    }
}

async fn load_config(path: &std::path::Path) -> anyhow::Result<config::Config> {
    info!(path = %path.display(), "loading configuration");
    config::Config::load(path).await
}
