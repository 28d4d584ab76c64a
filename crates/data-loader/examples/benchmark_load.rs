use data_loader::DataIndex;
use std::path::PathBuf;
use std::time::Instant;

fn main() {
    let data_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("data/ml-latest-small"));

    println!("Loading MovieLens dataset from {}...\n", data_dir.display());

    let start = Instant::now();
    let index = DataIndex::load_from_dir(&data_dir).expect("Failed to load dataset");
    let elapsed = start.elapsed();

    let (users, movies, ratings) = index.counts();

    println!("=== Load Complete ===");
    println!("Time taken: {:?}", elapsed);
    println!("Users: {}", users);
    println!("Movies: {}", movies);
    println!("Ratings: {}", ratings);
    println!(
        "\nPerformance: {:.0} ratings/second",
        ratings as f64 / elapsed.as_secs_f64()
    );

    if let Some(movie) = index.find_by_title("Toy Story") {
        let stats = index
            .get_movie_stats(movie.id)
            .copied()
            .unwrap_or(data_loader::MovieStats::UNRATED);
        println!(
            "\n{} -> avg {:.2} over {} ratings",
            movie.title, stats.avg_rating, stats.rating_count
        );
    }
}
