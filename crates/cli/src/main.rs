use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use data_loader::{Genre, MovieId, UserId};
use pipeline::{Explanation, HardConstraints, RecommendationQuery, RecommendationResult};
use profile::PreferenceDelta;
use rand::Rng;
use server::{EngineConfig, RecommendationEngine};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// ReelRecs - Hybrid Movie Recommendation Engine
#[derive(Parser)]
#[command(name = "reel-recs")]
#[command(about = "Movie recommendations from content, collaborative and latent signals", long_about = None)]
struct Cli {
    /// Path to MovieLens dataset directory (.dat or .csv flavour)
    #[arg(short, long, default_value = "data/ml-latest-small")]
    data_dir: PathBuf,

    /// Optional TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding one JSON profile per user
    #[arg(short, long, global = true)]
    profiles: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Get movie recommendations for a user
    Recommend {
        /// User ID to get recommendations for
        #[arg(long)]
        user_id: UserId,

        /// Number of recommendations to return
        #[arg(long, default_value = "20")]
        limit: usize,

        /// Genre that must not appear (repeatable)
        #[arg(long)]
        exclude: Vec<Genre>,

        /// Genre every result must have one of (repeatable)
        #[arg(long)]
        include: Vec<Genre>,

        /// Earliest release year
        #[arg(long)]
        from_year: Option<u16>,

        /// Latest release year
        #[arg(long)]
        to_year: Option<u16>,

        /// Show the evidence behind each recommendation
        #[arg(long)]
        explain: bool,
    },

    /// Show a user's rating history and profile
    User {
        /// User ID to display
        #[arg(long)]
        user_id: UserId,
    },

    /// Search for movies by title
    Search {
        /// Movie title to search for (case-insensitive)
        #[arg(long)]
        title: String,
    },

    /// Movies with similar content
    Similar {
        #[arg(long)]
        movie_id: MovieId,

        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Free-text search over titles, genres and tags
    Query {
        #[arg(long)]
        text: String,

        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Apply preference deltas to a user's profile
    Prefer {
        #[arg(long)]
        user_id: UserId,

        /// One delta or an array, e.g. '{"op":"exclude_genre","genre":"Horror"}'
        #[arg(long)]
        delta: String,
    },

    /// Run benchmark to test performance
    Benchmark {
        /// Number of requests to make
        #[arg(long, default_value = "100")]
        requests: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    // Building the first snapshot may take a moment
    println!("Loading MovieLens dataset from {}...", cli.data_dir.display());
    let start = Instant::now();
    let data_dir = cli.data_dir.clone();
    let engine = tokio::task::spawn_blocking(move || RecommendationEngine::from_dir(&data_dir, config))
        .await?
        .context("Failed to load MovieLens dataset")?;
    let engine = Arc::new(engine);
    let (users, movies, ratings) = engine.counts();
    println!(
        "{} Loaded {} users, {} movies, {} ratings in {:?}",
        "✓".green(),
        users,
        movies,
        ratings,
        start.elapsed()
    );

    if let Some(dir) = &cli.profiles {
        if dir.exists() {
            let loaded = engine.load_profiles(dir)?;
            println!("{} Loaded {} profiles", "✓".green(), loaded);
        }
    }

    match cli.command {
        Commands::Recommend {
            user_id,
            limit,
            exclude,
            include,
            from_year,
            to_year,
            explain,
        } => {
            let mut constraints = HardConstraints::default();
            for genre in exclude {
                constraints = constraints.with_exclude(genre);
            }
            for genre in include {
                constraints = constraints.with_include(genre);
            }
            if from_year.is_some() || to_year.is_some() {
                constraints = constraints
                    .with_year_range(from_year.unwrap_or(0), to_year.unwrap_or(u16::MAX));
            }
            let query = RecommendationQuery::new(user_id, limit).with_constraints(constraints);
            handle_recommend(&engine, query, explain).await?
        }
        Commands::User { user_id } => handle_user(&engine, user_id)?,
        Commands::Search { title } => handle_search(&engine, &title),
        Commands::Similar { movie_id, limit } => handle_similar(&engine, movie_id, limit)?,
        Commands::Query { text, limit } => handle_query(&engine, &text, limit),
        Commands::Prefer { user_id, delta } => {
            handle_prefer(&engine, user_id, &delta, cli.profiles.as_deref())?
        }
        Commands::Benchmark { requests } => handle_benchmark(engine, requests).await?,
    }

    Ok(())
}

/// Handle the 'recommend' command
async fn handle_recommend(
    engine: &Arc<RecommendationEngine>,
    query: RecommendationQuery,
    explain: bool,
) -> Result<()> {
    let result = engine.recommend_async(query).await?;
    print_recommendations(engine, &result, explain);
    Ok(())
}

/// Handle the 'user' command
fn handle_user(engine: &RecommendationEngine, user_id: UserId) -> Result<()> {
    let ratings = engine.user_ratings(user_id);
    let profile = engine.profile(user_id);
    if ratings.is_empty() && profile.version == 0 {
        bail!("User {} has no ratings and no profile", user_id);
    }

    println!("{}", format!("User ID: {}", user_id).bold().blue());

    let num_ratings = ratings.len();
    let avg_rating = if num_ratings > 0 {
        ratings.iter().map(|r| r.rating).sum::<f32>() / num_ratings as f32
    } else {
        0.0
    };
    println!("{}Number of ratings: {}", "• ".cyan(), num_ratings);
    println!("{}Average rating: {:.2}", "• ".cyan(), avg_rating);
    println!("{}Profile: {}", "• ".cyan(), engine.profile_summary(user_id));

    let mut top_rated: Vec<_> = ratings.iter().collect();
    top_rated.sort_by(|a, b| b.rating.total_cmp(&a.rating).then_with(|| b.timestamp.cmp(&a.timestamp)));
    println!("Top rated movies:");
    for rating in top_rated.iter().take(5) {
        if let Some(movie) = engine.movie(rating.movie_id) {
            println!("  - {} (Rating: {})", movie.title, rating.rating);
        }
    }

    println!("Most recent:");
    for rating in ratings.iter().take(5) {
        if let Some(movie) = engine.movie(rating.movie_id) {
            println!("  - {} (Rating: {})", movie.title, rating.rating);
        }
    }
    Ok(())
}

/// Handle the 'search' command
fn handle_search(engine: &RecommendationEngine, title: &str) {
    println!("{}", format!("Search results for '{}':", title).bold().blue());
    let best = engine.search_title(title);
    let matches = engine.search_titles(title, 20);
    if best.is_none() && matches.is_empty() {
        println!("  no matches");
        return;
    }
    for movie in best.iter().chain(matches.iter().filter(|m| Some(m.id) != best.as_ref().map(|b| b.id))) {
        let genres = movie
            .genres
            .iter()
            .map(|g| g.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        println!("{}: {} [{}]", movie.id.to_string().green(), movie.title, genres);
    }
}

/// Handle the 'similar' command
fn handle_similar(engine: &RecommendationEngine, movie_id: MovieId, limit: usize) -> Result<()> {
    let movie = engine
        .movie(movie_id)
        .with_context(|| format!("Movie {} not found", movie_id))?;
    println!("{}", format!("Movies like {}:", movie.title).bold().blue());
    for (i, neighbor) in engine.similar_items(movie_id, limit).iter().enumerate() {
        println!(
            "{}. {} - Similarity: {:.3}",
            (i + 1).to_string().green(),
            title_of(engine, neighbor.id),
            neighbor.similarity
        );
    }
    Ok(())
}

/// Handle the 'query' command
fn handle_query(engine: &RecommendationEngine, text: &str, limit: usize) {
    println!("{}", format!("Movies matching '{}':", text).bold().blue());
    for (i, hit) in engine.search_text(text, limit).iter().enumerate() {
        println!(
            "{}. {} - Score: {:.3}",
            (i + 1).to_string().green(),
            title_of(engine, hit.id),
            hit.similarity
        );
    }
}

/// Handle the 'prefer' command
fn handle_prefer(
    engine: &RecommendationEngine,
    user_id: UserId,
    delta: &str,
    profiles: Option<&Path>,
) -> Result<()> {
    let deltas: Vec<PreferenceDelta> = if delta.trim_start().starts_with('[') {
        serde_json::from_str(delta)
    } else {
        serde_json::from_str(delta).map(|d| vec![d])
    }
    .context("Invalid preference delta JSON")?;

    let version = engine.apply_preference_deltas(user_id, &deltas)?;
    println!(
        "{} Applied {} delta(s), profile version {}",
        "✓".green(),
        deltas.len(),
        version
    );
    println!("{}", engine.profile_summary(user_id));

    match profiles {
        Some(dir) => {
            let written = engine.save_profiles(dir)?;
            println!("{} Saved {} profiles to {}", "✓".green(), written, dir.display());
        }
        None => println!("{}", "No --profiles directory given, changes not saved".yellow()),
    }
    Ok(())
}

/// Handle the 'benchmark' command
async fn handle_benchmark(engine: Arc<RecommendationEngine>, requests: usize) -> Result<()> {
    if requests == 0 {
        bail!("--requests must be positive");
    }
    let (users, _, _) = engine.counts();
    let max_user = users.max(1) as UserId;

    let mut rng = rand::rng();
    let user_ids: Vec<UserId> = (0..requests).map(|_| rng.random_range(1..=max_user)).collect();

    let start = Instant::now();
    let mut handles = Vec::with_capacity(requests);
    for user_id in user_ids {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            let start = Instant::now();
            engine.recommend_async(RecommendationQuery::new(user_id, 20)).await?;
            Ok::<_, anyhow::Error>(start.elapsed())
        }));
    }

    let mut timings: Vec<Duration> = Vec::with_capacity(requests);
    for handle in handles {
        timings.push(handle.await??);
    }
    let total_time = start.elapsed();

    timings.sort();
    let percentile = |p: f32| timings[((timings.len() as f32 * p) as usize).min(timings.len() - 1)];
    let avg_latency = timings.iter().sum::<Duration>() / timings.len() as u32;
    let throughput = requests as f32 / total_time.as_secs_f32();
    let stats = engine.cache_stats();

    println!("{}", "Benchmark results:".bold().blue());
    println!("Total time: {:?}", total_time);
    println!("Average latency: {:?}", avg_latency);
    println!("P50 latency: {:?}", percentile(0.50));
    println!("P95 latency: {:?}", percentile(0.95));
    println!("P99 latency: {:?}", percentile(0.99));
    println!("Throughput: {:.2} requests/second", throughput);
    println!(
        "Cache: {} hits, {} misses, {} entries",
        stats.hits, stats.misses, stats.entries
    );

    Ok(())
}

fn title_of(engine: &RecommendationEngine, movie_id: MovieId) -> String {
    engine
        .movie(movie_id)
        .map(|m| m.title)
        .unwrap_or_else(|| format!("movie {}", movie_id))
}

fn describe(engine: &RecommendationEngine, explanation: &Explanation) -> String {
    match *explanation {
        Explanation::Content { because_of, similarity } => format!(
            "similar to {} you liked ({:.2})",
            title_of(engine, because_of),
            similarity
        ),
        Explanation::CollaborativeUser { user_id, similarity } => {
            format!("user {} with similar taste rated it highly ({:.2})", user_id, similarity)
        }
        Explanation::CollaborativeItem { movie_id, similarity } => format!(
            "rated like {} ({:.2})",
            title_of(engine, movie_id),
            similarity
        ),
        Explanation::Latent { predicted_rating } => {
            format!("predicted rating {:.1}", predicted_rating)
        }
        Explanation::Popularity {
            quality_score,
            rating_count,
        } => format!("popular: quality {:.2} from {} ratings", quality_score, rating_count),
        Explanation::DeclaredGenre { genre } => format!("matches your {} preference", genre),
    }
}

/// Helper function to format and print recommendations
fn print_recommendations(engine: &RecommendationEngine, result: &RecommendationResult, explain: bool) {
    let header = if result.fallback {
        "Popular Movies (not enough history to personalize):"
    } else {
        "Movie Recommendations:"
    };
    println!("{}", header.bold().blue());

    for (i, item) in result.items.iter().enumerate() {
        let Some(movie) = engine.movie(item.movie_id) else {
            continue;
        };
        let genres = movie
            .genres
            .iter()
            .map(|g| g.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "{}. {} [{}] - Score: {:.3}",
            (i + 1).to_string().green(),
            movie.title,
            genres,
            item.score
        );
        if explain {
            for explanation in &item.explanations {
                println!("   - {}", describe(engine, explanation));
            }
        }
    }
    if explain {
        println!(
            "{}",
            format!(
                "snapshot {}, model {}",
                result.snapshot_version,
                result
                    .model_version
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "none".to_string())
            )
            .dimmed()
        );
    }
}
