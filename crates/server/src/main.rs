//! Test harness for the recommendation engine.
//!
//! Loads a MovieLens directory, serves a few recommendations and keeps the
//! scheduled rebuild loop running until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pipeline::RecommendationQuery;
use server::{EngineConfig, RecommendationEngine};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting ReelRecs server test harness");

    let mut args = std::env::args().skip(1);
    let data_dir = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("data/ml-latest-small"));
    let config_path = args.next().map(PathBuf::from);

    let config = EngineConfig::load(config_path.as_deref())?;
    let interval = config.rebuild.interval();

    info!("Loading catalog from {:?}...", data_dir);
    let engine = {
        let config = config.clone();
        tokio::task::spawn_blocking(move || RecommendationEngine::from_dir(&data_dir, config)).await??
    };
    let engine = Arc::new(engine);
    let (users, movies, ratings) = engine.counts();
    info!(users, movies, ratings, "Engine ready");

    let user_id = 1;
    let limit = 10;
    info!("Getting recommendations for user {} (limit: {})", user_id, limit);
    let result = engine
        .recommend_async(RecommendationQuery::new(user_id, limit))
        .await?;

    info!(
        "Received {} recommendations (fallback: {}):",
        result.items.len(),
        result.fallback
    );
    for (i, item) in result.items.iter().enumerate() {
        let title = engine
            .movie(item.movie_id)
            .map(|m| m.title)
            .unwrap_or_else(|| format!("movie {}", item.movie_id));
        info!("{}. {} - Score: {:.3}", i + 1, title, item.score);
        for explanation in &item.explanations {
            info!("   {}", serde_json::to_string(explanation)?);
        }
    }

    let rebuilds = engine.spawn_rebuild_loop(interval);
    info!("Rebuild loop running every {:?}; press Ctrl-C to stop", interval);
    tokio::signal::ctrl_c().await?;
    rebuilds.abort();
    info!("Shutting down");

    Ok(())
}
