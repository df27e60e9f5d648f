//! KVDB Server Binary
//!
//! Boot order: parse configuration, open the enabled stores, recover the
//! WAL, bind the listeners, confirm the cluster. Each stage maps to its
//! own exit code so supervisors can tell a bad config from a damaged log.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use kvdb::{exit_code, KvdbError, Server, ServerConfig, ServerContext};

/// KVDB Server
#[derive(Parser, Debug)]
#[command(name = "kvdb-server")]
#[command(about = "Networked multi-database key-value server")]
#[command(version)]
struct Args {
    /// Home directory containing config/kvdb.conf, config/cluster.conf
    /// and system/dblist
    #[arg(long, default_value = ".")]
    home: PathBuf,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kvdb=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("KVDB Server v{}", kvdb::VERSION);
    tracing::info!("home directory: {}", args.home.display());

    let config = match ServerConfig::load(&args.home) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("configuration error: {}", e);
            return ExitCode::from(exit_code::CONFIG as u8);
        }
    };

    let ctx = match ServerContext::open(config) {
        Ok(ctx) => Arc::new(ctx),
        Err(e) => {
            tracing::error!("startup failed: {}", e);
            return ExitCode::from(open_failure_code(&e) as u8);
        }
    };

    let mut server = Server::new(ctx);
    match server.run() {
        Ok(()) => {
            tracing::info!("server stopped");
            ExitCode::from(exit_code::OK as u8)
        }
        Err(e @ KvdbError::ClusterMismatch(_)) => {
            tracing::error!("cluster handshake failed: {}", e);
            ExitCode::from(exit_code::CLUSTER as u8)
        }
        Err(e) => {
            tracing::error!("server error: {}", e);
            ExitCode::from(exit_code::CONFIG as u8)
        }
    }
}

fn open_failure_code(e: &KvdbError) -> i32 {
    match e {
        KvdbError::Engine(_) => exit_code::ENGINE,
        KvdbError::Wal(_) | KvdbError::WalCorruption(_) => exit_code::WAL,
        _ => exit_code::CONFIG,
    }
}
