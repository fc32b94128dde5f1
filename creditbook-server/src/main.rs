use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

mod context;
mod server;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// Postgres via DATABASE_URL.
    Postgres,
    /// In-process state, lost on exit. Local runs only.
    Memory,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "creditbook")]
#[command(author, version, about = "creditbook - dual-currency credit ledger service")]
pub struct Args {
    /// Address the HTTP API binds to
    #[arg(long, env = "CREDITBOOK_BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: String,

    /// Postgres connection URL.
    #[arg(long, env = "DATABASE_URL", default_value = "postgres://creditbook@localhost:5432/creditbook")]
    pub database_url: String,

    #[arg(long, env = "CREDITBOOK_STORE", value_enum, default_value = "postgres")]
    pub store: StoreKind,

    /// Shared secret used to sign payment webhooks
    #[arg(long, env = "CREDITBOOK_WEBHOOK_SECRET", hide_env_values = true)]
    pub webhook_secret: String,

    /// Accepted clock skew for webhook signatures, in seconds
    #[arg(long, env = "CREDITBOOK_WEBHOOK_TOLERANCE_SECS", default_value = "300")]
    pub webhook_tolerance_secs: i64,

    /// Comma-separated user ids allowed on /api/admin
    #[arg(long, env = "CREDITBOOK_ADMIN_IDS", value_delimiter = ',')]
    pub admin_ids: Vec<String>,

    /// Attempts per ledger operation on serialization failure or deadlock
    #[arg(long, env = "CREDITBOOK_MAX_TX_ATTEMPTS", default_value = "3")]
    pub max_tx_attempts: u32,

    #[arg(long, env = "CREDITBOOK_DB_MAX_CONNECTIONS", default_value = "10")]
    pub db_max_connections: u32,

    /// Apply pending migrations at startup
    #[arg(long, env = "CREDITBOOK_MIGRATE", default_value = "true", action = clap::ArgAction::Set)]
    pub migrate: bool,

    /// Seconds the bonus rule cache may serve without reloading
    #[arg(long, env = "CREDITBOOK_BONUS_CACHE_SECS", default_value = "60")]
    pub bonus_cache_secs: i64,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("creditbook=info,creditbook_core=info,tower_http=info"));
    let sub = fmt().with_env_filter(filter).finish();
    if let Err(e) = tracing::subscriber::set_global_default(sub) {
        eprintln!("Failed to set global subscriber: {}", e);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; real deployments set the environment directly.
    dotenv::dotenv().ok();
    init_tracing();
    let args = Args::parse();
    info!(
        "creditbook starting. store={:?}, bind={}, admins={}",
        args.store,
        args.bind_addr,
        args.admin_ids.len()
    );

    if let Err(e) = server::run_server(args).await {
        error!("Server error: {:?}", e);
        return Err(e);
    }
    info!("Main finished. Goodbye!");
    Ok(())
}
