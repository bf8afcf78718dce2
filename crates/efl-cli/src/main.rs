use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use efl_core::{User, UserId};
use efl_store::{AttendanceEntry, Database};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "efl", about = "efl attendance CLI")]
struct Cli {
    /// SQLite database (default: $XDG_DATA_HOME/efl/efl.db)
    #[arg(long, env = "EFL_DB_PATH", global = true)]
    db: Option<PathBuf>,

    /// Base URL of a running efld
    #[arg(long, env = "EFL_SERVER", default_value = "http://127.0.0.1:8000", global = true)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage users
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Enroll a reference image for a user
    Enroll {
        user_id: UserId,
        image: PathBuf,
        /// Do not ask efld to rebuild its reference set
        #[arg(long)]
        no_refresh: bool,
    },
    /// Show recent attendance logs
    Logs {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Show daemon status
    Status,
    /// Ask efld to rebuild its reference set
    Refresh,
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create a user
    Add { name: String },
    /// List users
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let db_path = cli.db.clone().unwrap_or_else(efl_store::default_db_path);

    match cli.command {
        Commands::User { command } => {
            let db = open_db(&db_path).await?;
            match command {
                UserCommands::Add { name } => {
                    if name.trim().is_empty() {
                        bail!("user name must not be empty");
                    }
                    let user = db.create_user(&name).await?;
                    println!("Created user {} ({})", user.id, user.name);
                }
                UserCommands::List => {
                    let users = db.list_users().await?;
                    if users.is_empty() {
                        println!("No users");
                    }
                    for user in &users {
                        println!("{}", format_user(user));
                    }
                }
            }
        }
        Commands::Enroll {
            user_id,
            image,
            no_refresh,
        } => {
            let path = validate_image(&image)?;
            let db = open_db(&db_path).await?;
            let face = db
                .enroll_face(user_id, &path)
                .await
                .with_context(|| format!("cannot enroll face for user {user_id}"))?;
            println!("Enrolled face {} for user {user_id}: {}", face.id, face.path.display());

            if !no_refresh {
                match refresh(&cli.server).await {
                    Ok(count) => println!("efld reloaded {count} reference(s)"),
                    Err(err) => {
                        tracing::warn!(error = %err, "reference refresh failed");
                        println!("efld not reachable; run `efl refresh` once it is up");
                    }
                }
            }
        }
        Commands::Logs { limit } => {
            let db = open_db(&db_path).await?;
            let entries = db.list_attendance_logs(limit).await?;
            if entries.is_empty() {
                println!("No attendance logs");
            }
            for entry in &entries {
                println!("{}", format_entry(entry));
            }
        }
        Commands::Status => {
            let url = format!("{}/api/status", cli.server.trim_end_matches('/'));
            match reqwest::get(&url).await {
                Ok(resp) => {
                    let status: serde_json::Value = resp.error_for_status()?.json().await?;
                    println!("efld: {}", serde_json::to_string_pretty(&status)?);
                }
                Err(err) => {
                    tracing::debug!(error = %err, "status request failed");
                    println!("efld: not connected ({})", cli.server);
                }
            }
        }
        Commands::Refresh => {
            let count = refresh(&cli.server).await?;
            println!("efld reloaded {count} reference(s)");
        }
    }

    Ok(())
}

async fn open_db(path: &Path) -> Result<Database> {
    Database::open(path)
        .await
        .with_context(|| format!("failed to open database {}", path.display()))
}

/// Check that `path` decodes as an image and return it absolute.
fn validate_image(path: &Path) -> Result<PathBuf> {
    let img = image::open(path).with_context(|| format!("cannot read image {}", path.display()))?;
    tracing::debug!(width = img.width(), height = img.height(), "image decoded");
    std::fs::canonicalize(path).with_context(|| format!("cannot resolve {}", path.display()))
}

async fn refresh(server: &str) -> Result<u64> {
    let url = format!("{}/api/references/refresh", server.trim_end_matches('/'));
    let body: serde_json::Value = reqwest::Client::new()
        .post(&url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    body["references"]
        .as_u64()
        .context("unexpected refresh response")
}

fn format_user(user: &User) -> String {
    format!(
        "{:>4}  {}  (since {})",
        user.id,
        user.name,
        user.created_at.format("%Y-%m-%d")
    )
}

fn format_entry(entry: &AttendanceEntry) -> String {
    format!(
        "{}  {:<7}  {} ({})",
        entry.log.created_at.format("%Y-%m-%d %H:%M:%S"),
        entry.log.kind,
        entry.user_name,
        entry.log.user_id
    )
}
