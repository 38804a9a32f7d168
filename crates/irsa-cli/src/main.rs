//! sts-irsa-proxy entrypoint.

use clap::Parser;

mod commands;
mod handlers;
mod logging;

use commands::{Commands, LogFormat};

#[derive(Parser)]
#[command(name = "sts-irsa-proxy")]
#[command(author, version, about = "Re-signs web identity tokens on their way to AWS STS", long_about = None)]
struct Cli {
    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init(cli.log_format);

    match cli.command {
        Commands::Serve { config, listen } => handlers::serve(&config, listen).await?,
        Commands::ValidateToken { config } => handlers::validate_token(&config).await?,
    }

    Ok(())
}
