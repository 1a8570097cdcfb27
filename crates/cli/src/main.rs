use anyhow::Result;
use clap::Parser;
use config::ContextConfig;
use replay::Replay;
use session::Session;
use std::io;
use std::path::PathBuf;

mod config;
mod provider;
mod replay;
mod session;

#[derive(Parser)]
#[command(name = "context-replay")]
#[command(about = "Replay an editor session through the completion context pipeline", long_about = None)]
#[command(version)]
struct Cli {
    /// Session file (JSON), or `-` for stdin
    session: PathBuf,

    /// TOML config (defaults to $CONTEXT_CONFIG, then built-in defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let config = ContextConfig::load(cli.config.as_deref())?;
    let session = Session::from_path(&cli.session)?;
    log::info!(
        "replaying {} steps over {} documents",
        session.steps.len(),
        session.documents.len()
    );

    let mut replay = Replay::new(&session, config).await?;
    let result = replay.run(&session.steps, &mut io::stdout()).await;
    replay.dispose();
    result
}
