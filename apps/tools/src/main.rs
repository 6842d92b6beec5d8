use anyhow::Result;
use clap::{Parser, Subcommand};
use shared::domain::ParkingStatus;
use storage::SqliteBackend;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://./data/parking.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the record readers currently see.
    Show,
    /// List the most recent records, newest first.
    History {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Delete all but the newest `keep` records.
    Prune {
        #[arg(long, default_value_t = 100)]
        keep: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let backend = SqliteBackend::connect(&cli.database_url).await?;

    match cli.command {
        Command::Show => match backend.latest().await? {
            Some(status) => println!("{}", line(&status)),
            None => println!("no records yet"),
        },
        Command::History { limit } => {
            for status in backend.history(limit).await? {
                println!("{}", line(&status));
            }
        }
        Command::Prune { keep } => {
            let removed = backend.prune(keep).await?;
            println!("removed {removed} records, kept newest {keep}");
        }
    }

    backend.close().await;
    Ok(())
}

fn line(status: &ParkingStatus) -> String {
    format!(
        "{}\t{}\t{}\t{}",
        status.timestamp_raw, status.timestamp, status.user, status.location
    )
}
