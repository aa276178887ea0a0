mod commands;
mod config;
mod session_file;

use std::sync::Arc;

use anyhow::{Context as _, Result};
use chrono::Utc;
use clap::Parser;
use desain_service::{SupabaseConfig, SupabaseService};
use desain_store::{ObjectStore, StoreConfig};
use desain_sync::SessionGate;
use tracing::{debug, info, warn};

use crate::commands::Context;
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::parse();
    let session_path = config.data_dir().join("session.json");
    debug!("backend: {}", config.supabase_url);

    let mut supabase = SupabaseConfig::new(&config.supabase_url, &config.anon_key);
    supabase.bucket = config.bucket.clone();
    let service = Arc::new(SupabaseService::new(supabase));
    service.set_session(session_file::load(&session_path)?);

    let gate = Arc::new(SessionGate::new(service.clone()));
    if gate.session().is_some_and(|s| s.is_expired(Utc::now())) {
        info!("session expired, refreshing");
        if let Err(e) = gate.refresh().await {
            warn!("could not refresh session: {e}");
        }
    }

    // An explicit S3 endpoint or local store dir overrides Supabase Storage.
    let mut store_config = StoreConfig::from_env();
    store_config.bucket = Some(config.bucket.clone());
    let blobs: Arc<dyn ObjectStore> =
        if store_config.is_s3() || store_config.local_data_dir.is_some() {
            desain_store::create_store(&store_config).context("create blob store")?
        } else {
            Arc::new(service.storage())
        };

    let ctx = Context {
        records: service.clone(),
        blobs,
        gate: gate.clone(),
    };
    let result = commands::run(config.command, &ctx).await;

    match gate.session() {
        Some(session) => session_file::save(&session_path, &session)?,
        None => session_file::clear(&session_path)?,
    }
    result
}
