//! End-to-end behaviour of the recommendation engine.

use std::sync::Arc;
use std::time::Duration;

use data_loader::{DataIndex, Genre, Movie, Rating, Tag};
use pipeline::{DecayConfig, Explanation, HardConstraints, RecommendationQuery};
use profile::{FusionWeights, PreferenceDelta};
use server::{EngineConfig, EngineError, RecommendationEngine};

fn rating(user_id: u32, movie_id: u32, value: f32, timestamp: i64) -> Rating {
    Rating {
        user_id,
        movie_id,
        rating: value,
        timestamp,
    }
}

/// Eight movies, six users with overlapping taste
fn build_catalog() -> DataIndex {
    let mut index = DataIndex::new();
    index.insert_movie(Movie::new(1, "Space Raiders (1981)", Some(1981), &[Genre::Action, Genre::Adventure]));
    index.insert_movie(Movie::new(2, "Space Raiders Return (1984)", Some(1984), &[Genre::Action, Genre::Adventure]));
    index.insert_movie(Movie::new(3, "Haunted Manor (1990)", Some(1990), &[Genre::Horror]));
    index.insert_movie(Movie::new(4, "Haunted Manor Revenge (1994)", Some(1994), &[Genre::Horror, Genre::Thriller]));
    index.insert_movie(Movie::new(5, "Wedding Crashers Club (2005)", Some(2005), &[Genre::Comedy, Genre::Romance]));
    index.insert_movie(Movie::new(6, "Office Pranks (2008)", Some(2008), &[Genre::Comedy]));
    index.insert_movie(Movie::new(7, "Quiet Harbor (1999)", Some(1999), &[Genre::Drama]));
    index.insert_movie(Movie::new(8, "Galaxy Horror Show (2010)", Some(2010), &[Genre::Horror, Genre::SciFi, Genre::Comedy]));

    let ratings = [
        (1, 1, 5.0),
        (1, 3, 4.5),
        (1, 5, 2.0),
        (2, 1, 4.5),
        (2, 2, 5.0),
        (2, 3, 4.0),
        (2, 4, 4.5),
        (3, 3, 5.0),
        (3, 4, 5.0),
        (3, 8, 4.5),
        (4, 5, 4.0),
        (4, 6, 4.5),
        (4, 7, 3.5),
        (5, 6, 5.0),
        (5, 7, 4.0),
        (5, 5, 4.5),
        (6, 2, 3.0),
        (6, 7, 5.0),
        (6, 8, 2.5),
    ];
    for (i, (user_id, movie_id, value)) in ratings.into_iter().enumerate() {
        index.insert_rating(rating(user_id, movie_id, value, 1_000_000 + i as i64));
    }
    index
}

fn engine() -> RecommendationEngine {
    RecommendationEngine::new(build_catalog(), EngineConfig::default()).unwrap()
}

#[test]
fn test_cold_start_uses_popularity_fallback() {
    let engine = engine();
    let query = RecommendationQuery::new(999, 5);

    let first = engine.recommend(&query).unwrap();
    assert!(first.fallback);
    assert_eq!(first.items.len(), 5);
    for item in &first.items {
        assert!(matches!(item.explanations[0], Explanation::Popularity { .. }));
    }
    for pair in first.items.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }

    assert_eq!(engine.recommend(&query).unwrap(), first);
    assert_eq!(engine.recommend_uncached(&query).unwrap(), first);

    let constrained = query.with_constraints(HardConstraints::default().with_exclude(Genre::Horror));
    let result = engine.recommend(&constrained).unwrap();
    assert!(result.fallback);
    for item in &result.items {
        assert!(!engine.movie(item.movie_id).unwrap().has_genre(Genre::Horror));
    }
}

#[test]
fn test_exclusion_is_absolute() {
    let engine = engine();
    // User 3 only likes horror, so every personalized signal points at it
    let query = RecommendationQuery::new(3, 10)
        .with_constraints(HardConstraints::default().with_exclude(Genre::Horror));
    let result = engine.recommend(&query).unwrap();
    for item in &result.items {
        assert!(!engine.movie(item.movie_id).unwrap().has_genre(Genre::Horror));
    }

    // Same via the profile instead of the query
    engine
        .apply_preference_delta(3, &PreferenceDelta::ExcludeGenre { genre: Genre::Horror })
        .unwrap();
    let result = engine.recommend(&RecommendationQuery::new(3, 10)).unwrap();
    for item in &result.items {
        assert!(!engine.movie(item.movie_id).unwrap().has_genre(Genre::Horror));
    }
}

#[test]
fn test_include_constraint_adds_declared_genre() {
    let engine = engine();
    let query = RecommendationQuery::new(1, 10)
        .with_constraints(HardConstraints::default().with_include(Genre::Comedy));
    let result = engine.recommend(&query).unwrap();
    assert!(!result.items.is_empty());
    for item in &result.items {
        assert!(engine.movie(item.movie_id).unwrap().has_genre(Genre::Comedy));
        assert!(item
            .explanations
            .contains(&Explanation::DeclaredGenre { genre: Genre::Comedy }));
    }
}

#[test]
fn test_end_to_end_scenario() {
    let mut catalog = DataIndex::new();
    catalog.insert_movie(Movie::new(1, "Laugh Riot (2000)", Some(2000), &[Genre::Comedy]));
    catalog.insert_movie(Movie::new(2, "Dark House (2001)", Some(2001), &[Genre::Horror]));
    catalog.insert_movie(Movie::new(3, "Giggle Factory (2002)", Some(2002), &[Genre::Comedy]));
    let engine = RecommendationEngine::new(catalog, EngineConfig::default()).unwrap();

    let user = 7;
    engine
        .apply_preference_delta(user, &PreferenceDelta::ExcludeGenre { genre: Genre::Horror })
        .unwrap();
    engine.record_interaction(rating(user, 1, 5.0, 1_700_000_000)).unwrap();

    let check = |engine: &RecommendationEngine| {
        let result = engine.recommend(&RecommendationQuery::new(user, 2)).unwrap();
        assert!(!result.fallback);
        assert_eq!(result.movie_ids(), vec![3]);
        assert_eq!(
            result.items[0].explanations[0].kind(),
            sources::SignalKind::Content
        );
        assert!(matches!(
            result.items[0].explanations[0],
            Explanation::Content { because_of: 1, .. }
        ));
    };

    // Before the rating reaches the indexes
    check(&engine);

    // And after
    engine.rebuild_now().unwrap();
    check(&engine);
}

#[test]
fn test_weights_renormalize_over_present_signals() {
    let mut catalog = DataIndex::new();
    catalog.insert_movie(Movie::new(1, "Laugh Riot (2000)", Some(2000), &[Genre::Comedy]));
    catalog.insert_movie(Movie::new(3, "Giggle Factory (2002)", Some(2002), &[Genre::Comedy, Genre::Romance]));

    let mut config = EngineConfig::default();
    config.fusion.affinity_blend = 0.0;
    config.decay.floor = 1.0;
    let engine = RecommendationEngine::new(catalog, config).unwrap();

    engine
        .apply_preference_delta(
            5,
            &PreferenceDelta::SetWeights {
                weights: FusionWeights {
                    content: 0.4,
                    collaborative: 0.3,
                    latent: 0.3,
                    popularity: 0.0,
                },
            },
        )
        .unwrap();
    engine.record_interaction(rating(5, 1, 5.0, 10)).unwrap();

    let result = engine.recommend(&RecommendationQuery::new(5, 1)).unwrap();
    let item = &result.items[0];
    assert_eq!(item.movie_id, 3);

    // Only content and popularity are present and popularity has no weight,
    // so content carries the full score
    let similarity = engine.similar_items(1, 5)[0].similarity;
    assert!((item.score - similarity).abs() < 1e-5);
    assert!(similarity > 0.0 && similarity < 1.0);
}

#[test]
fn test_ties_break_by_ascending_id() {
    let mut catalog = DataIndex::new();
    catalog.insert_movie(Movie::new(1, "Seed Film (2000)", Some(2000), &[Genre::Comedy]));
    catalog.insert_movie(Movie::new(20, "Twin Picture (2000)", Some(2000), &[Genre::Comedy]));
    catalog.insert_movie(Movie::new(10, "Twin Picture (2000)", Some(2000), &[Genre::Comedy]));
    let engine = RecommendationEngine::new(catalog, EngineConfig::default()).unwrap();

    engine.record_interaction(rating(1, 1, 5.0, 10)).unwrap();
    let result = engine.recommend(&RecommendationQuery::new(1, 5)).unwrap();
    assert_eq!(result.movie_ids(), vec![10, 20]);
    assert_eq!(result.items[0].score, result.items[1].score);
}

#[test]
fn test_recent_release_ranks_higher() {
    let mut catalog = DataIndex::new();
    catalog.insert_movie(Movie::new(1, "Seed Film (2000)", Some(2000), &[Genre::Comedy]));
    catalog.insert_movie(Movie::new(10, "Twin Picture (1980)", Some(1980), &[Genre::Comedy]));
    catalog.insert_movie(Movie::new(20, "Twin Picture (2015)", Some(2015), &[Genre::Comedy]));

    let mut config = EngineConfig::default();
    config.decay = DecayConfig {
        reference_year: Some(2020),
        ..Default::default()
    };
    let engine = RecommendationEngine::new(catalog, config).unwrap();

    engine.record_interaction(rating(1, 1, 5.0, 10)).unwrap();
    let result = engine.recommend(&RecommendationQuery::new(1, 5)).unwrap();
    assert_eq!(result.movie_ids(), vec![20, 10]);
    assert!(result.items[0].score > result.items[1].score);
}

#[test]
fn test_cache_hit_matches_recomputation() {
    let engine = engine();
    let query = RecommendationQuery::new(1, 4);

    let computed = engine.recommend(&query).unwrap();
    let cached = engine.recommend(&query).unwrap();
    assert_eq!(engine.cache_stats().hits, 1);
    assert_eq!(cached, computed);
    assert_eq!(engine.recommend_uncached(&query).unwrap(), computed);
}

#[test]
fn test_new_interaction_invalidates_cache() {
    let engine = engine();
    let query = RecommendationQuery::new(4, 10);

    let before = engine.recommend(&query).unwrap();
    assert_eq!(engine.cache_stats().entries, 1);
    let target = before.items[0].movie_id;

    engine.record_interaction(rating(4, target, 4.0, 2_000_000)).unwrap();
    let stats = engine.cache_stats();
    assert_eq!(stats.entries, 0);
    assert!(stats.invalidations >= 1);

    let after = engine.recommend(&query).unwrap();
    assert_eq!(engine.cache_stats().hits, 0);
    assert!(!after.movie_ids().contains(&target));
}

fn comedy_catalog() -> DataIndex {
    let mut catalog = DataIndex::new();
    catalog.insert_movie(Movie::new(1, "Laugh Riot (2000)", Some(2000), &[Genre::Comedy]));
    catalog.insert_movie(Movie::new(2, "Dark House (2001)", Some(2001), &[Genre::Horror]));
    catalog.insert_movie(Movie::new(3, "Giggle Factory (2002)", Some(2002), &[Genre::Comedy]));
    catalog
}

#[test]
fn test_clear_preferences_keeps_rating_history() {
    let engine = RecommendationEngine::new(comedy_catalog(), EngineConfig::default()).unwrap();
    engine.record_interaction(rating(7, 1, 5.0, 1_700_000_000)).unwrap();
    assert_eq!(engine.recommend(&RecommendationQuery::new(7, 3)).unwrap().movie_ids(), vec![3]);

    engine.clear_preferences(7);
    let result = engine.recommend(&RecommendationQuery::new(7, 3)).unwrap();
    assert!(!result.movie_ids().contains(&1));
    assert_eq!(result.movie_ids(), vec![3]);
    assert!(!result.fallback);
}

#[test]
fn test_rebuild_drops_results_from_previous_model() {
    let engine = engine();
    let query = RecommendationQuery::new(1, 4);

    let before = engine.recommend(&query).unwrap();
    assert_eq!(before.model_version, Some(1));
    assert_eq!(engine.cache_stats().entries, 1);

    assert_eq!(engine.rebuild_now().unwrap(), 2);
    let stats = engine.cache_stats();
    assert_eq!(stats.entries, 0);
    assert!(stats.invalidations >= 1);

    let after = engine.recommend(&query).unwrap();
    let stats = engine.cache_stats();
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.misses, 2);
    assert_eq!(after.snapshot_version, 2);
    assert_eq!(after.model_version, Some(2));
}

#[test]
fn test_include_of_profile_excluded_genre_rejected() {
    let engine = engine();
    engine
        .apply_preference_delta(2, &PreferenceDelta::ExcludeGenre { genre: Genre::Horror })
        .unwrap();

    let query = RecommendationQuery::new(2, 5)
        .with_constraints(HardConstraints::default().with_include(Genre::Horror));
    assert!(matches!(engine.recommend(&query), Err(EngineError::InvalidQuery(_))));
    assert!(matches!(engine.recommend_uncached(&query), Err(EngineError::InvalidQuery(_))));
    assert_eq!(engine.cache_stats().entries, 0);
}

#[test]
fn test_liked_items_are_not_recommended() {
    let mut catalog = comedy_catalog();
    catalog.insert_movie(Movie::new(5, "Chuckle Camp (2004)", Some(2004), &[Genre::Comedy]));
    let engine = RecommendationEngine::new(catalog, EngineConfig::default()).unwrap();

    engine
        .apply_preference_deltas(
            4,
            &[
                PreferenceDelta::LikeItem { movie_id: 1 },
                PreferenceDelta::LikeItem { movie_id: 3 },
            ],
        )
        .unwrap();
    let result = engine.recommend(&RecommendationQuery::new(4, 5)).unwrap();
    assert!(!result.fallback);
    assert_eq!(result.movie_ids(), vec![5]);
}

#[test]
fn test_profile_change_invalidates_cache() {
    let engine = engine();
    let query = RecommendationQuery::new(2, 10);
    engine.recommend(&query).unwrap();

    engine
        .apply_preference_delta(2, &PreferenceDelta::DislikeItem { movie_id: 5 })
        .unwrap();
    assert_eq!(engine.cache_stats().entries, 0);
    assert!(!engine.recommend(&query).unwrap().movie_ids().contains(&5));
}

#[test]
fn test_invalid_weights_rejected() {
    let engine = engine();
    let delta = PreferenceDelta::SetWeights {
        weights: FusionWeights {
            content: -1.0,
            ..Default::default()
        },
    };
    assert!(matches!(
        engine.apply_preference_delta(1, &delta),
        Err(EngineError::InvalidQuery(_))
    ));
}

#[test]
fn test_tags_reach_content_index_after_rebuild() {
    let engine = engine();
    assert!(engine.search_text("swashbuckling", 5).is_empty());

    engine
        .add_tag(
            7,
            Tag {
                user_id: 1,
                text: "swashbuckling".to_string(),
                timestamp: 5,
            },
        )
        .unwrap();
    assert!(engine.add_tag(404, Tag { user_id: 1, text: "x".into(), timestamp: 5 }).is_err());
    assert!(engine.search_text("swashbuckling", 5).is_empty());

    engine.rebuild_now().unwrap();
    let hits = engine.search_text("swashbuckling", 5);
    assert_eq!(hits[0].id, 7);
}

#[test]
fn test_readers_during_rebuild() {
    let engine = engine();
    std::thread::scope(|scope| {
        for user_id in 1..=4 {
            let engine = &engine;
            scope.spawn(move || {
                for _ in 0..20 {
                    let result = engine.recommend_uncached(&RecommendationQuery::new(user_id, 5)).unwrap();
                    assert!(!result.items.is_empty());
                }
            });
        }
        for _ in 0..3 {
            engine.rebuild_now().unwrap();
        }
    });
    assert_eq!(engine.snapshot_version(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_scheduled_rebuild_publishes_new_snapshot() {
    let engine = Arc::new(engine());
    let handle = engine.spawn_rebuild_loop(Duration::from_millis(20));

    engine
        .ingest_movie(Movie::new(9, "Late Arrival (2020)", Some(2020), &[Genre::Drama]))
        .unwrap();

    let waited = tokio::time::timeout(Duration::from_secs(10), async {
        while engine.snapshot_version() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    handle.abort();

    assert!(waited.is_ok());
    assert_eq!(engine.similar_items(9, 10)[0].id, 7);
    let result = engine
        .recommend_async(RecommendationQuery::new(6, 3))
        .await
        .unwrap();
    assert_eq!(result.snapshot_version, engine.snapshot_version());
}
