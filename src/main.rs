use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bugtrack::api;
use bugtrack_core::db::{self, Database};
use bugtrack_core::models::{CreateUserInput, Role};

#[derive(Parser)]
#[command(name = "bugtrack")]
#[command(about = "Role-based bug and ticket tracking server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bugtrack server
    Serve {
        /// Port for HTTP API
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
    /// Provision the four demo accounts (one per role)
    SeedDemo,
}

const DEMO_ACCOUNTS: [(&str, Role); 4] = [
    ("demo1", Role::Administrator),
    ("demo2", Role::ProjectManager),
    ("demo3", Role::Developer),
    ("demo4", Role::Submitter),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "bugtrack=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve { port }) => serve(port).await?,
        Some(Commands::SeedDemo) => seed_demo()?,
        None => serve(3000).await?,
    }

    Ok(())
}

async fn serve(port: u16) -> anyhow::Result<()> {
    tracing::info!("Starting bugtrack server on port {}", port);

    let db = Database::open_default()?;
    db.migrate()?;
    let uploads_dir = db::default_data_dir()?.join("uploads");

    let app = api::create_router(db, uploads_dir);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!("bugtrack server listening on http://127.0.0.1:{}", port);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Creates the demo users through the normal save path, so group sync
/// applies exactly as it would for any other user.
fn seed_demo() -> anyhow::Result<()> {
    let db = Database::open_default()?;
    db.migrate()?;

    for (username, role) in DEMO_ACCOUNTS {
        if db.get_user_by_username(username)?.is_some() {
            tracing::info!(username, "demo account already exists");
            continue;
        }
        let user = db.create_user(CreateUserInput {
            username: username.to_string(),
            email: None,
            role: Some(role),
            is_demo: true,
        })?;
        tracing::info!(username = %user.username, role = role.group_name(), "demo account created");
    }
    Ok(())
}
