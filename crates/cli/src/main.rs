use anyhow::Context;
use clap::{Parser, Subcommand};
use libris_kernel::settings::Settings;

#[derive(Debug, Parser)]
#[command(name = "libris", version, about = "Public library catalog and loan service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Apply pending database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load().with_context(|| "failed to load Libris settings")?;
    libris_telemetry::init(&settings.telemetry)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            tracing::info!(env = ?settings.environment, "starting libris server");
            libris_app::bootstrap::serve(&settings).await
        }
        Command::Migrate => {
            let applied = libris_app::bootstrap::migrate(&settings).await?;
            tracing::info!(applied, db = %settings.database.url, "migrations complete");
            println!("applied {} migration(s)", applied);
            Ok(())
        }
    }
}
