//! Example: Build the similarity indices and inspect one user and one movie
//!
//! Run with: cargo run --package sources --example neighbors -- data/ml-latest-small
//!
//! This example shows how to:
//! 1. Load a MovieLens dataset
//! 2. Build the content index and the interaction matrix
//! 3. Train the latent model
//! 4. Print content neighbors, user neighbors and latent candidates

use data_loader::DataIndex;
use sources::{
    CollaborativeConfig, ContentConfig, ContentIndex, InteractionMatrix, LatentConfig, LatentModel,
};
use std::path::PathBuf;
use std::time::Instant;

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt().with_env_filter("info").init();

    println!("=== ReelRecs Neighbor Index Example ===\n");

    let data_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("data/ml-latest-small"));
    let start = Instant::now();
    let data_index = DataIndex::load_from_dir(&data_dir)?;
    println!("Loaded dataset in {:?}\n", start.elapsed());

    let start = Instant::now();
    let content = ContentIndex::build(&data_index, &ContentConfig::default());
    println!(
        "Content index: {} movies, {} terms in {:?}",
        content.len(),
        content.vocabulary_size(),
        start.elapsed()
    );

    let start = Instant::now();
    let matrix = InteractionMatrix::build(&data_index, &CollaborativeConfig::default(), 1);
    println!(
        "Interaction matrix: {} users, {} ratings in {:?}",
        matrix.user_count(),
        matrix.rating_count(),
        start.elapsed()
    );

    let start = Instant::now();
    let latent = LatentModel::train(&matrix, &LatentConfig::default(), 1)?;
    println!(
        "Latent model: rank {}, rmse {:.4} in {:?}\n",
        latent.rank(),
        latent.train_rmse(),
        start.elapsed()
    );

    let movie_id = data_index
        .find_by_title("Toy Story")
        .map(|m| m.id)
        .unwrap_or(1);
    println!("Movies similar to #{}:", movie_id);
    for (i, neighbor) in content.neighbors(movie_id, 5).iter().enumerate() {
        if let Some(movie) = data_index.get_movie(neighbor.id) {
            println!("  {}. {} ({:.3})", i + 1, movie.title, neighbor.similarity);
        }
    }

    let user_id = 1;
    println!("\nUsers similar to #{}:", user_id);
    for neighbor in matrix.user_neighbors(user_id, 5) {
        println!("  user {} ({:.3})", neighbor.id, neighbor.similarity);
    }

    println!("\nLatent candidates for #{}:", user_id);
    for (movie_id, predicted) in latent.top_candidates(user_id, 5) {
        if let Some(movie) = data_index.get_movie(movie_id) {
            println!("  {} (predicted {:.2})", movie.title, predicted);
        }
    }

    Ok(())
}
