//! Memo auth API server binary.
//!
//! Serves the Connect and REST surfaces of the auth core over one listener
//! and native gRPC over a second. Without a database URL everything lives in
//! memory and is lost on exit.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use memo_api::config::ApiConfig;
use memo_core::auth::password::hash_password;
use memo_core::models::auth::{Role, RowStatus, User};
use memo_core::store::memory::MemoryStore;
use memo_core::store::postgres::PgStore;
use memo_core::store::{StoreArc, UserStore};
use memo_rpc::{AuthLayer, AuthServiceRpc, AuthServiceServer, UserServiceServer};
use sqlx::postgres::PgPoolOptions;
use tonic::transport::server::TcpIncoming;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "memo_server", about = "Memo auth API server")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:8081")]
    bind: String,

    /// Address for the native gRPC listener.
    #[arg(long, env = "GRPC_BIND_ADDR", default_value = "127.0.0.1:8082")]
    grpc_bind: SocketAddr,

    /// PostgreSQL connection URL. Omit to use the in-memory store.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,

    /// Username of the host account to create on first start.
    #[arg(long, env = "MEMO_HOST_USERNAME")]
    host_username: Option<String>,

    /// Password of the host account to create on first start.
    #[arg(long, env = "MEMO_HOST_PASSWORD", hide_env_values = true)]
    host_password: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    EnvFilter::new("info,memo_api=debug,memo_rpc=debug,memo_core=debug")
                }),
        )
        .init();

    let args = Args::parse();

    let mut config = ApiConfig::from_env();
    config.bind_addr = args.bind.clone();
    config.database_url = args.database_url.clone().filter(|url| !url.is_empty());

    info!(config = ?config, "starting memo_server");

    let store: StoreArc = match &config.database_url {
        Some(url) => {
            info!(max_connections = args.max_connections, "connecting to postgres");
            let pool = PgPoolOptions::new()
                .max_connections(args.max_connections)
                .acquire_timeout(std::time::Duration::from_secs(30))
                .connect(url)
                .await?;
            let pg = PgStore::new(pool);
            info!("running database migrations");
            pg.migrate().await?;
            if let Some((username, password)) = host_account(&args) {
                bootstrap_pg(&pg, username, password).await?;
            }
            Arc::new(pg)
        }
        None => {
            warn!("DATABASE_URL not set, using in-memory store");
            let memory = MemoryStore::new();
            if let Some((username, password)) = host_account(&args) {
                bootstrap_memory(&memory, username, password).await?;
            }
            Arc::new(memory)
        }
    };

    let state = memo_api::AppState::new(config.clone(), store);

    // Same auth core behind both listeners.
    let rpc = AuthServiceRpc::new(state.service.clone());
    let grpc = tonic::transport::Server::builder()
        .layer(AuthLayer::new(state.gate.clone()))
        .add_service(AuthServiceServer::new(rpc.clone()))
        .add_service(UserServiceServer::new(rpc));
    let app = memo_api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    let local_addr = listener.local_addr()?;
    let grpc_incoming =
        TcpIncoming::new(args.grpc_bind, true, None).map_err(|e| e.to_string())?;

    info!(addr = %local_addr, "API listening");
    info!(addr = %args.grpc_bind, "gRPC listening");

    let (grpc_stop, grpc_stopped) = tokio::sync::oneshot::channel::<()>();
    let grpc_handle = tokio::spawn(async move {
        let shutdown = async {
            let _ = grpc_stopped.await;
        };
        if let Err(e) = grpc.serve_with_incoming_shutdown(grpc_incoming, shutdown).await {
            error!(error = %e, "gRPC server failed");
        }
    });

    let api_result = axum::serve(listener, app).await;

    let _ = grpc_stop.send(());
    let _ = grpc_handle.await;

    api_result?;
    Ok(())
}

fn host_account(args: &Args) -> Option<(&str, &str)> {
    match (args.host_username.as_deref(), args.host_password.as_deref()) {
        (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
            Some((username, password))
        }
        (None, None) => None,
        _ => {
            warn!("MEMO_HOST_USERNAME and MEMO_HOST_PASSWORD must both be set, skipping host bootstrap");
            None
        }
    }
}

async fn bootstrap_pg(
    store: &PgStore,
    username: &str,
    password: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if store.get_user_by_username(username).await?.is_some() {
        info!(username, "host account already exists");
        return Ok(());
    }
    let hash = hash_password(password)?;
    let id = store.create_user(username, username, Role::Host, &hash).await?;
    info!(user_id = id, username, "created host account");
    Ok(())
}

async fn bootstrap_memory(
    store: &MemoryStore,
    username: &str,
    password: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if store.get_user_by_username(username).await?.is_some() {
        return Ok(());
    }
    let id = store.next_user_id();
    store.insert_user(User {
        id,
        username: username.to_string(),
        nickname: username.to_string(),
        role: Role::Host,
        row_status: RowStatus::Normal,
        password_hash: Some(hash_password(password)?),
    });
    info!(user_id = id, username, "created host account");
    Ok(())
}
