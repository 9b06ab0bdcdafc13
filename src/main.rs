use clap::Parser;
use env_logger::Env;
use sentiment_portal::app;
use sentiment_portal::config::AppConfig;
use std::path::PathBuf;

/// Command-line arguments for the web server
#[derive(Parser, Debug)]
#[command(name = "sentiment-portal")]
#[command(about = "Web portal for sentiment analysis of spreadsheets and free text")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "SENTIMENT_PORTAL_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on, overrides the config file
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.bind = bind;
    }

    log::info!("Starting sentiment portal on {}", config.bind);
    app::run(config).await
}
