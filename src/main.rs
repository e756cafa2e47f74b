//! Laserscribe server binary.
//!
//! ```bash
//! # Run with default settings (laserscribe.db, port 8080)
//! laserscribe
//!
//! # Custom database and port
//! laserscribe --db settings.db --port 3000
//!
//! # In-memory mode (for testing)
//! laserscribe --memory
//! ```

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use laserscribe::api::create_router;
use laserscribe::db::Store;

/// CLI arguments
struct Args {
    /// Database file path
    db_path: String,
    /// Server port
    port: u16,
    /// Use in-memory database
    in_memory: bool,
    /// Host to bind to
    host: String,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            db_path: "laserscribe.db".to_string(),
            port: 8080,
            in_memory: false,
            host: "0.0.0.0".to_string(),
        }
    }
}

impl Args {
    fn from_env() -> Self {
        let mut args = Args::default();
        let env_args: Vec<String> = env::args().collect();
        let mut i = 1;

        while i < env_args.len() {
            match env_args[i].as_str() {
                "--db" | "-d" => {
                    if i + 1 < env_args.len() {
                        args.db_path = env_args[i + 1].clone();
                        i += 1;
                    }
                }
                "--port" | "-p" => {
                    if i + 1 < env_args.len() {
                        args.port = env_args[i + 1].parse().unwrap_or(8080);
                        i += 1;
                    }
                }
                "--host" | "-h" => {
                    if i + 1 < env_args.len() {
                        args.host = env_args[i + 1].clone();
                        i += 1;
                    }
                }
                "--memory" | "-m" => {
                    args.in_memory = true;
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                _ => {}
            }
            i += 1;
        }

        // Environment variable overrides
        if let Ok(port) = env::var("LASERSCRIBE_PORT") {
            args.port = port.parse().unwrap_or(args.port);
        }
        if let Ok(db) = env::var("LASERSCRIBE_PATH") {
            args.db_path = db;
        }
        if let Ok(host) = env::var("LASERSCRIBE_HOST") {
            args.host = host;
        }
        if env::var("LASERSCRIBE_MEMORY").is_ok() {
            args.in_memory = true;
        }

        args
    }
}

fn print_help() {
    println!(
        r#"
Laserscribe - community laser cutting settings API

USAGE:
    laserscribe [OPTIONS]

OPTIONS:
    -d, --db <PATH>      Database file path [default: laserscribe.db]
    -p, --port <PORT>    Server port [default: 8080]
    -h, --host <HOST>    Host to bind to [default: 0.0.0.0]
    -m, --memory         Use in-memory database
        --help           Print this help message

ENVIRONMENT VARIABLES:
    LASERSCRIBE_PORT     Server port
    LASERSCRIBE_PATH     Database file path
    LASERSCRIBE_HOST     Host to bind to
    LASERSCRIBE_MEMORY   Set to use in-memory database
"#
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .compact()
        .init();

    let args = Args::from_env();

    let store = if args.in_memory {
        Arc::new(Store::in_memory().await?)
    } else {
        Arc::new(Store::new(&args.db_path).await?)
    };
    info!("Database ready at {}", store.path());

    let app = create_router(store);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    info!("Laserscribe API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to install CTRL+C signal handler");
        })
        .await?;

    Ok(())
}
