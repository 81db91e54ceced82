//! Create or reset a staff account in the shapes database.
//!
//! Usage: create-admin --username NAME [--password PW] [--member]
//!   --password  : falls back to ADMIN_PASSWORD when omitted
//!   --member    : create a read-only (non-staff) account instead

use clap::Parser;
use shapes_live::{db, services::users::PgAuthenticator};

#[derive(Parser)]
#[command(name = "create-admin", about = "Create or reset a shapes-live user")]
struct Args {
    #[arg(long)]
    username: String,

    #[arg(long, env = "ADMIN_PASSWORD")]
    password: String,

    /// Create a non-staff account (cannot log in to the write API)
    #[arg(long)]
    member: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let _ = dotenvy::dotenv();
    let args = Args::parse();

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable not set"))?;
    let pool = db::create_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let user = PgAuthenticator::new(pool)
        .upsert_user(&args.username, &args.password, !args.member)
        .await?;

    tracing::info!(
        "User {} (id={}) saved, is_staff={}",
        user.username,
        user.id,
        user.is_staff
    );
    Ok(())
}
