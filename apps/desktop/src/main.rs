use std::{path::PathBuf, time::Duration};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{SelectedUserStore, StatusClient, SyncSession, SyncState};
use shared::domain::{ParkingStatus, HOUSEHOLD_MEMBERS, PRESET_LOCATIONS};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "parking", about = "See and update where the shared car is parked")]
struct Args {
    #[arg(long, env = "PARKING_SERVER_URL", default_value = "http://127.0.0.1:3000")]
    server_url: String,
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,
    /// Where the selected household member is remembered.
    #[arg(long, env = "PARKING_PREFERENCES")]
    preferences: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Remember which household member this device acts as.
    Login { name: String },
    Logout,
    Whoami,
    /// List household members and preset locations.
    Options,
    /// Print the current status once.
    Status,
    /// Record where the car was just parked.
    Park {
        #[arg(required_unless_present = "preset")]
        location: Option<String>,
        /// 1-based index into the preset locations.
        #[arg(long, conflicts_with = "location")]
        preset: Option<usize>,
    },
    /// Keep polling and print every change until interrupted.
    Watch {
        #[arg(long, default_value_t = 3)]
        poll_interval_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let preferences = SelectedUserStore::new(preferences_path(args.preferences)?);
    let client = StatusClient::new(&args.server_url, Duration::from_secs(args.timeout_secs))?;
    debug!(
        server = %client.status_url(),
        preferences = %preferences.path().display(),
        "client configured"
    );

    match args.command {
        Command::Login { name } => {
            let member = preferences.save(&name)?;
            println!("Acting as {member}");
        }
        Command::Logout => {
            preferences.clear()?;
            println!("Logged out");
        }
        Command::Whoami => match preferences.load()? {
            Some(member) => println!("{member}"),
            None => println!("No household member selected"),
        },
        Command::Options => {
            println!("Household members:");
            for member in HOUSEHOLD_MEMBERS {
                println!("  {member}");
            }
            println!("Preset locations:");
            for (i, location) in PRESET_LOCATIONS.iter().enumerate() {
                println!("  {}. {location}", i + 1);
            }
        }
        Command::Status => {
            let status = client.fetch_status().await?;
            println!("{}", describe(&status));
        }
        Command::Park { location, preset } => {
            let Some(user) = preferences.load()? else {
                bail!("no household member selected; run `parking login <name>` first");
            };
            let location = resolve_location(location, preset)?;
            match client.submit_location(&location, &user).await {
                Ok(stored) => println!("Parked: {}", describe(&stored)),
                Err(error) => bail!("could not save the new location: {error}"),
            }
        }
        Command::Watch { poll_interval_secs } => {
            watch(client, Duration::from_secs(poll_interval_secs.max(1))).await?;
        }
    }

    Ok(())
}

async fn watch(client: StatusClient, poll_interval: Duration) -> Result<()> {
    let session = SyncSession::start(client, poll_interval);
    let mut rx = session.subscribe();
    println!("{}", render(&rx.borrow_and_update()));

    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                println!("{}", render(&rx.borrow_and_update()));
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for ctrl-c")?;
                break;
            }
        }
    }

    session.shutdown();
    Ok(())
}

fn preferences_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    let base = dirs::config_dir().context("could not determine a config directory")?;
    Ok(base.join("parking-status").join("preferences.toml"))
}

fn resolve_location(location: Option<String>, preset: Option<usize>) -> Result<String> {
    if let Some(index) = preset {
        return PRESET_LOCATIONS
            .get(index.wrapping_sub(1))
            .map(|l| l.to_string())
            .with_context(|| {
                format!(
                    "preset must be between 1 and {}",
                    PRESET_LOCATIONS.len()
                )
            });
    }
    match location.map(|l| l.trim().to_string()) {
        Some(l) if !l.is_empty() => Ok(l),
        _ => bail!("location must not be empty"),
    }
}

fn render(state: &SyncState) -> String {
    match state {
        SyncState::Loading => "Loading...".to_string(),
        SyncState::Success(status) => describe(status),
        SyncState::Error(message) => format!("Connection error: {message}"),
    }
}

fn describe(status: &ParkingStatus) -> String {
    if status.is_unset() {
        return format!("Location: {} (nobody has parked yet)", status.location);
    }
    format!(
        "Location: {} | parked by {} | {}",
        status.location, status.user, status.timestamp
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_preset_by_one_based_index() {
        assert_eq!(resolve_location(None, Some(4)).expect("preset"), "Petroprix");
        assert!(resolve_location(None, Some(0)).is_err());
        assert!(resolve_location(None, Some(7)).is_err());
    }

    #[test]
    fn rejects_blank_free_text_location() {
        assert!(resolve_location(Some("   ".into()), None).is_err());
        assert_eq!(
            resolve_location(Some(" Mercadona ".into()), None).expect("location"),
            "Mercadona"
        );
    }

    #[test]
    fn renders_each_sync_state_distinctly() {
        assert_eq!(render(&SyncState::Loading), "Loading...");
        assert!(render(&SyncState::Error("timeout".into())).contains("timeout"));
        assert!(render(&SyncState::Success(ParkingStatus::default())).contains("Desconocido"));
    }
}
