mod client;

use std::time::Duration;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use scanlogin_models::{SceneId, SessionStatus, SessionView};
use tracing::debug;

use crate::client::LoginClient;

#[derive(Parser, Debug)]
#[command(name = "scanlogin-cli")]
#[command(about = "Scan-to-login demonstrator CLI")]
#[command(author, version, long_about = None)]
pub struct Cli {
    /// Base URL of the login server
    #[arg(long, global = true, default_value = "http://localhost:8080")]
    pub server: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a login and wait until the code is scanned
    Login {
        /// Seconds between polls
        #[arg(long, default_value_t = 2)]
        interval: u64,
    },
    /// Show the current state of a session once
    Status {
        /// Scene returned when the session was created
        scene: SceneId,
    },
    /// Check that the server is up
    Health,
}

/// What the polling loop should do after a poll.
#[derive(Debug, PartialEq, Eq)]
enum Step {
    Done,
    Expired,
    Wait,
}

fn next_step(view: &SessionView, now: DateTime<Utc>) -> Step {
    match view.status {
        SessionStatus::Completed => Step::Done,
        SessionStatus::Pending if view.expires_at <= now => Step::Expired,
        SessionStatus::Pending => Step::Wait,
    }
}

fn print_view(view: &SessionView) {
    println!("scene:   {}", view.scene);
    println!("status:  {}", view.status);
    if let Some(subject) = &view.subject {
        println!("subject: {subject}");
    }
    if let Some(label) = &view.display_label {
        println!("label:   {label}");
    }
    println!("expires: {}", view.expires_at);
}

async fn login(client: &LoginClient, interval: Duration) -> anyhow::Result<()> {
    let issued = client
        .new_session()
        .await
        .context("could not start a login session")?;
    println!("Scan this code to log in:");
    println!("  {}", issued.qrcode_url);
    println!("(scene {}, valid until {})", issued.scene, issued.expires_at);

    loop {
        tokio::time::sleep(interval).await;
        let view = match client.poll(&issued.scene).await {
            Ok(view) => view,
            Err(e) if e.is_not_found() => bail!("session {} no longer exists", issued.scene),
            Err(e) => return Err(e).context("poll failed"),
        };
        debug!(status = %view.status, "polled");

        match next_step(&view, Utc::now()) {
            Step::Done => {
                println!("Logged in.");
                print_view(&view);
                return Ok(());
            }
            Step::Expired => bail!("the code expired before it was scanned"),
            Step::Wait => {}
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let client = LoginClient::new(&cli.server);

    match cli.command {
        Commands::Login { interval } => login(&client, Duration::from_secs(interval.max(1))).await,
        Commands::Status { scene } => {
            let view = client.poll(&scene).await?;
            print_view(&view);
            Ok(())
        }
        Commands::Health => {
            let health = client.health().await?;
            println!("{}", serde_json::to_string_pretty(&health)?);
            Ok(())
        }
    }
}
