//! Binary for the channel relay.

use anyhow::Result;
use clap::Parser;
use telegram_relay::{load_config, run_reconcile, run_relay, store_status, BaseConfig, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { token } => {
            let config = load_config(token)?;
            run_relay(config).await
        }
        Commands::Reconcile { token, strategy } => {
            let config = load_config(token)?;
            let created = run_reconcile(config, strategy).await?;
            println!("Backlog reconciled: {} records created", created);
            Ok(())
        }
        Commands::Status => {
            let status = store_status(&BaseConfig::database_url_from_env()).await?;
            println!("{}", status);
            Ok(())
        }
    }
}
