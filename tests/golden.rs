//! Golden tests for the story path kernel.
//!
//! These tests run the full pipeline over small stories and check
//! categorization across consecutive runs.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use story_path_kernel::{
    route_hash, CancellationFlag, Category, CategoryMode, DecisionReason, HistorySource,
    InMemoryHistory, NoHistory, PassageIndex, PathEnd, PathPipeline, PathPolicy, RunOutcome,
    StoryGraph, ValidationCache,
};

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn diamond() -> StoryGraph {
    StoryGraph::new("Start")
        .with_passage("Start", "You stand at a fork.\n[[Left->A]] [[Right->B]]", &["A", "B"])
        .with_passage("A", "The left path is muddy. [[End]]", &["End"])
        .with_passage("B", "The right path is dry. [[End]]", &["End"])
        .with_passage("End", "The paths meet again.", &[])
}

fn names(route: &[&str]) -> Vec<String> {
    route.iter().map(|s| s.to_string()).collect()
}

fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, day, 12, 0, 0).unwrap()
}

async fn run_with<H: HistorySource + 'static>(
    source: H,
    index: PassageIndex,
    graph: &StoryGraph,
    cache: &ValidationCache,
) -> RunOutcome {
    PathPipeline::new(Arc::new(source), PathPolicy::default(), index)
        .run(graph, cache, &CancellationFlag::new())
        .await
        .unwrap()
}

async fn run(graph: &StoryGraph, cache: &ValidationCache) -> RunOutcome {
    run_with(NoHistory, PassageIndex::new(), graph, cache).await
}

fn category_of(outcome: &RunOutcome, route: &[&str]) -> Category {
    let route = names(route);
    outcome
        .paths
        .iter()
        .find(|p| p.path.route == route)
        .map(|p| p.category)
        .unwrap_or_else(|| panic!("route {route:?} not enumerated"))
}

// ─────────────────────────────────────────────────────────────────────────────
// END-TO-END SCENARIOS
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_diamond_new_then_unchanged() {
    let graph = diamond();

    let first = run(&graph, &ValidationCache::new()).await;
    let routes: Vec<_> = first.paths.iter().map(|p| p.path.route.clone()).collect();
    assert_eq!(
        routes,
        vec![names(&["Start", "A", "End"]), names(&["Start", "B", "End"])]
    );
    assert_ne!(first.paths[0].path.route_hash, first.paths[1].path.route_hash);
    assert!(first.paths.iter().all(|p| p.category == Category::New));

    let second = run(&graph, &first.cache).await;
    assert!(second.paths.iter().all(|p| p.category == Category::Unchanged));
    assert_eq!(second.summary.unchanged, 2);
    assert_eq!(second.summary.stale_dropped, 0);
}

#[tokio::test]
async fn test_validated_flag_survives_repeat_run() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("validation_cache.json");
    let graph = diamond();

    let mut first = run(&graph, &ValidationCache::new()).await;
    first.save_cache(&cache_path, at(1)).unwrap();

    // An author marks one route as reviewed by editing the file.
    let hash = route_hash(&names(&["Start", "A", "End"]));
    let mut doc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&cache_path).unwrap()).unwrap();
    doc[hash.as_str()]["validated"] = json!(true);
    std::fs::write(&cache_path, serde_json::to_string(&doc).unwrap()).unwrap();

    let cache = ValidationCache::load(&cache_path);
    let second = run(&graph, &cache).await;

    let reviewed = second.paths.iter().find(|p| p.path.route_hash == hash).unwrap();
    assert_eq!(reviewed.category, Category::Unchanged);
    assert!(reviewed.validated);
    assert_eq!(second.summary.validated, 1);
    assert!(second.cache.get(&hash).unwrap().validated);
}

#[tokio::test]
async fn test_legacy_cache_is_tolerated() {
    let graph = diamond();
    let a = route_hash(&names(&["Start", "A", "End"]));
    let b = route_hash(&names(&["Start", "B", "End"]));
    let cache = ValidationCache::from_value(json!({
        a.as_str(): {"route": "Start -> A -> End", "validated": true},
        b.as_str(): {"route": "Start -> B -> End", "validated": true, "category": "new"},
        "last_updated": "2025-11-01T00:00:00"
    }));
    assert_eq!(cache.len(), 2);

    let outcome = run(&graph, &cache).await;
    for path in &outcome.paths {
        assert_ne!(path.category, Category::Unchanged);
        assert!(!path.validated);
    }
    // The rewritten entries carry fingerprints from now on.
    let entry = outcome.cache.get(&a).unwrap();
    assert!(entry.prose_fingerprint.is_some());
    assert!(entry.raw_fingerprint.is_some());
    assert_eq!(entry.route, "Start → A → End");
}

#[tokio::test]
async fn test_last_updated_key_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("cache.json");
    let graph = diamond();

    let mut first = run(&graph, &ValidationCache::new()).await;
    first.save_cache(&cache_path, at(1)).unwrap();

    let mut doc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&cache_path).unwrap()).unwrap();
    doc["last_updated"] = json!("2025-11-01T00:00:00");
    std::fs::write(&cache_path, serde_json::to_string(&doc).unwrap()).unwrap();

    let cache = ValidationCache::load(&cache_path);
    assert_eq!(cache.len(), 2);
    let second = run(&graph, &cache).await;
    assert_eq!(second.summary.total, 2);
    assert_eq!(second.summary.unchanged, 2);
}

#[tokio::test]
async fn test_three_cycle_terminates() {
    let graph = StoryGraph::new("A")
        .with_passage("A", "Room A [[B]]", &["B"])
        .with_passage("B", "Room B [[C]]", &["C"])
        .with_passage("C", "Room C [[A]] [[Out]]", &["A", "Out"])
        .with_passage("Out", "Outside.", &[]);

    let outcome = run(&graph, &ValidationCache::new()).await;
    assert_eq!(outcome.summary.total, 2);
    for path in &outcome.paths {
        assert_eq!(path.path.end, PathEnd::Terminal);
        let a_visits = path.path.route.iter().filter(|p| *p == "A").count();
        assert!(a_visits <= 2);
    }
    assert_eq!(outcome.summary.cycle_prunes, 1);
}

#[tokio::test]
async fn test_renamed_passage_keeps_prose_fingerprint() {
    let first = run(&diamond(), &ValidationCache::new()).await;

    let renamed = StoryGraph::new("Start")
        .with_passage("Start", "You stand at a fork.\n[[Left->Mud]] [[Right->B]]", &["Mud", "B"])
        .with_passage("Mud", "The left path is muddy. [[End]]", &["End"])
        .with_passage("B", "The right path is dry. [[End]]", &["End"])
        .with_passage("End", "The paths meet again.", &[]);
    let second = run(&renamed, &first.cache).await;

    let old = &first.paths[0].path;
    let new = &second.paths[0].path;
    assert_ne!(old.route_hash, new.route_hash);
    assert_eq!(old.prose_fingerprint, new.prose_fingerprint);

    // The renamed route shares only two of four passages with its old self,
    // below the similarity threshold, so it counts as new.
    assert_eq!(category_of(&second, &["Start", "Mud", "End"]), Category::New);
    assert_eq!(category_of(&second, &["Start", "B", "End"]), Category::Modified);
    assert_eq!(second.summary.stale_dropped, 1);
}

fn attic() -> StoryGraph {
    StoryGraph::new("Start")
        .with_passage("Start", "The house is quiet. [[Hall]]", &["Hall"])
        .with_passage("Hall", "Portraits line the hall. [[Stairs]]", &["Stairs"])
        .with_passage("Stairs", "The stairs creak. [[Landing]]", &["Landing"])
        .with_passage("Landing", "A draft from above. [[Attic]]", &["Attic"])
        .with_passage(
            "Attic",
            "Dust covers everything.\nA trunk sits open. [[Window]]",
            &["Window"],
        )
        .with_passage("Window", "Moonlight through the glass. [[End]]", &["End"])
        .with_passage("End", "You find the letter.", &[])
}

fn restructured(outcome: &RunOutcome, previous: &RunOutcome) -> (Category, DecisionReason) {
    let path = &outcome.paths[0];
    assert_ne!(path.path.route_hash, previous.paths[0].path.route_hash);
    assert_eq!(path.path.prose_fingerprint, previous.paths[0].path.prose_fingerprint);
    (path.category, path.reason.clone())
}

#[tokio::test]
async fn test_renamed_passage_on_long_route_is_modified() {
    let first = run(&attic(), &ValidationCache::new()).await;

    let renamed = attic()
        .with_passage("Hall", "Portraits line the hall. [[Staircase]]", &["Staircase"])
        .with_passage("Staircase", "The stairs creak. [[Landing]]", &["Landing"]);
    let second = run(&renamed, &first.cache).await;
    assert_eq!(second.summary.total, 1);

    let (category, reason) = restructured(&second, &first);
    assert_eq!(category, Category::Modified);
    match reason {
        DecisionReason::LinksOnlyChange { matched, similarity } => {
            assert_eq!(matched, first.paths[0].path.route_hash);
            assert!((similarity - 0.75).abs() < 1e-6);
        }
        other => panic!("unexpected reason {other:?}"),
    }
    assert_eq!(second.summary.stale_dropped, 1);
}

#[tokio::test]
async fn test_split_passage_is_modified() {
    let first = run(&attic(), &ValidationCache::new()).await;

    let split = attic()
        .with_passage("Attic", "Dust covers everything. [[Look closer->Trunk]]", &["Trunk"])
        .with_passage("Trunk", "A trunk sits open. [[Window]]", &["Window"]);
    let second = run(&split, &first.cache).await;

    let (category, reason) = restructured(&second, &first);
    assert_eq!(category, Category::Modified);
    assert!(matches!(reason, DecisionReason::LinksOnlyChange { .. }));
    assert!(!second.paths[0].validated);
}

#[tokio::test]
async fn test_inserted_choice_is_modified() {
    let first = run(&attic(), &ValidationCache::new()).await;

    let inserted = attic()
        .with_passage("Landing", "A draft from above. [[Ladder]]", &["Ladder"])
        .with_passage("Ladder", "[[Climb->Attic]]", &["Attic"]);
    let second = run(&inserted, &first.cache).await;

    let (category, _) = restructured(&second, &first);
    assert_eq!(category, Category::Modified);
}

#[tokio::test]
async fn test_new_prose_on_unseen_route_is_new() {
    let first = run(&attic(), &ValidationCache::new()).await;

    let extended = attic()
        .with_passage("Window", "Moonlight through the glass. [[Roof]]", &["Roof"])
        .with_passage("Roof", "Wind tugs at your coat. [[End]]", &["End"]);
    let second = run(&extended, &first.cache).await;

    assert_eq!(second.paths[0].category, Category::New);
    assert_eq!(second.paths[0].reason, DecisionReason::NotInCache);
}

#[tokio::test]
async fn test_link_text_change_is_modified() {
    let first = run(&diamond(), &ValidationCache::new()).await;

    let relinked = diamond().with_passage("A", "The left path is muddy. [[Trudge on->End]]", &["End"]);
    let second = run(&relinked, &first.cache).await;

    let path = second
        .paths
        .iter()
        .find(|p| p.path.route == names(&["Start", "A", "End"]))
        .unwrap();
    assert_eq!(path.category, Category::Modified);
    assert!(matches!(path.reason, DecisionReason::LinksOnlyChange { .. }));
    assert_eq!(category_of(&second, &["Start", "B", "End"]), Category::Unchanged);
}

#[tokio::test]
async fn test_removed_branch_drops_stale_entry() {
    let first = run(&diamond(), &ValidationCache::new()).await;

    let pruned = StoryGraph::new("Start")
        .with_passage("Start", "You stand at a fork.\n[[Left->A]]", &["A"])
        .with_passage("A", "The left path is muddy. [[End]]", &["End"])
        .with_passage("End", "The paths meet again.", &[]);
    let second = run(&pruned, &first.cache).await;

    assert_eq!(second.summary.stale_dropped, 1);
    assert_eq!(second.cache.len(), 1);
    assert!(second
        .cache
        .get(&route_hash(&names(&["Start", "B", "End"])))
        .is_none());
}

#[tokio::test]
async fn test_dangling_link_does_not_abort() {
    let graph = diamond().with_passage("B", "The right path is dry. [[Ghost]]", &["Ghost"]);
    let outcome = run(&graph, &ValidationCache::new()).await;

    assert_eq!(outcome.summary.total, 2);
    assert_eq!(outcome.summary.dangling_links, 1);
    let ghost = outcome
        .paths
        .iter()
        .find(|p| p.path.end == PathEnd::MissingPassage)
        .unwrap();
    assert_eq!(ghost.path.route, names(&["Start", "B", "Ghost"]));
    assert_eq!(ghost.path.content["Ghost"], "");
}

// ─────────────────────────────────────────────────────────────────────────────
// HISTORY-BACKED CATEGORIZATION
// ─────────────────────────────────────────────────────────────────────────────

const STORY_V1: &str = "\
:: Start
You stand at a fork.
[[Left->A]] [[Right->B]]

:: A
The left path is muddy. [[End]]

:: B
The right path is dry. [[End]]

:: End
The paths meet again.
";

fn index() -> PassageIndex {
    let mut index = PassageIndex::new();
    for passage in ["Start", "A", "B", "End"] {
        index.insert(passage, "src/story.twee");
    }
    index
}

#[tokio::test]
async fn test_new_prose_since_cached_commit_is_new() {
    let mut history = InMemoryHistory::new();
    history.commit("src/story.twee", at(1), STORY_V1);
    let first = run_with(history.clone(), index(), &diamond(), &ValidationCache::new()).await;
    assert_eq!(
        first.cache.get(&first.paths[0].path.route_hash).unwrap().commit_date.as_deref(),
        Some("2025-03-01T12:00:00Z")
    );

    let lantern = "The left path is muddy. A lantern hangs from a branch. [[End]]";
    history.commit("src/story.twee", at(5), &STORY_V1.replace("The left path is muddy. [[End]]", lantern));
    let edited = diamond().with_passage("A", lantern, &["End"]);

    let second = run_with(history, index(), &edited, &first.cache).await;
    let path = &second.paths[0];
    assert_eq!(path.category, Category::New);
    assert_eq!(path.reason, DecisionReason::ProseChanged);
    assert_eq!(path.git_metadata.prose_change, Some(true));
    assert_eq!(category_of(&second, &["Start", "B", "End"]), Category::Unchanged);
}

#[tokio::test]
async fn test_no_prose_in_history_is_modified() {
    let mut history = InMemoryHistory::new();
    history.commit("src/story.twee", at(1), STORY_V1);
    let first = run_with(history.clone(), index(), &diamond(), &ValidationCache::new()).await;

    // The cached fingerprints no longer match, but history shows no prose
    // edits since the cached commit.
    let hash = first.paths[0].path.route_hash.clone();
    let mut cache = first.cache.clone();
    let mut entry = cache.get(&hash).unwrap().clone();
    entry.prose_fingerprint = Some("stale".into());
    entry.raw_fingerprint = Some("stale".into());
    cache.insert(hash.clone(), entry);

    let second = run_with(history, index(), &diamond(), &cache).await;
    let path = second.paths.iter().find(|p| p.path.route_hash == hash).unwrap();
    assert_eq!(path.category, Category::Modified);
    assert_eq!(path.reason, DecisionReason::NoProseChange);
}

#[tokio::test]
async fn test_untracked_files_default_to_modified() {
    let first = run(&diamond(), &ValidationCache::new()).await;
    let hash = first.paths[0].path.route_hash.clone();
    let mut cache = first.cache.clone();
    let mut entry = cache.get(&hash).unwrap().clone();
    entry.raw_fingerprint = None;
    entry.prose_fingerprint = None;
    entry.commit_date = Some("2025-03-01T00:00:00".into());
    cache.insert(hash.clone(), entry);

    // The index maps passages to a file the history has never seen.
    let second = run_with(InMemoryHistory::new(), index(), &diamond(), &cache).await;
    let path = second.paths.iter().find(|p| p.path.route_hash == hash).unwrap();
    assert_eq!(path.category, Category::Modified);
    assert_eq!(path.reason, DecisionReason::HistoryUnavailable);
    assert!(path.git_metadata.is_degraded());
    assert_eq!(second.summary.degraded, 2);
}

// ─────────────────────────────────────────────────────────────────────────────
// REPORT AND PERSISTENCE
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_report_json_shape() {
    let first = run(&diamond(), &ValidationCache::new()).await;
    let report = serde_json::to_value(first.report(CategoryMode::Modified)).unwrap();

    assert_eq!(report["mode"], "modified");
    assert_eq!(report["summary"]["new"], 2);
    assert_eq!(report["paths"].as_array().unwrap().len(), 2);
    let path = &report["paths"][0];
    assert_eq!(path["route"], json!(["Start", "A", "End"]));
    assert_eq!(path["category"], "new");
    assert_eq!(path["validated"], false);
    assert!(path["route_hash"].as_str().unwrap().len() == 8);
    assert!(path["content"]["A"].as_str().unwrap().contains("muddy"));
}

#[tokio::test]
async fn test_cache_untouched_until_saved() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("cache.json");
    std::fs::write(&cache_path, "{\"last_updated\": \"2025-11-01T00:00:00\"}").unwrap();

    let cache = ValidationCache::load(&cache_path);
    let mut outcome = run(&diamond(), &cache).await;
    assert_eq!(
        std::fs::read_to_string(&cache_path).unwrap(),
        "{\"last_updated\": \"2025-11-01T00:00:00\"}"
    );

    outcome.save_cache(&cache_path, at(2)).unwrap();
    let saved = ValidationCache::load(&cache_path);
    assert_eq!(saved.len(), 2);
    assert_eq!(saved.last_updated(), Some("2025-03-02T12:00:00Z"));
}

#[test]
fn test_graph_json_contract() {
    let graph = StoryGraph::from_json_str(
        r#"{
            "passages": {
                "Start": {"content": "Hi [[End]]", "links": ["End"]},
                "End": {"content": "Bye", "links": []}
            },
            "start_passage": "Start",
            "metadata": {"title": "Tiny", "format": "Harlowe 3.3.8"}
        }"#,
    )
    .unwrap();
    assert_eq!(graph.title(), Some("Tiny"));
    assert_eq!(graph.snapshot_id(), graph.clone().snapshot_id());
}

#[test]
fn test_route_hash_sensitivity() {
    let r1 = route_hash(&names(&["Start", "A", "End"]));
    let r2 = route_hash(&names(&["Start", "B", "A", "End"]));
    assert_ne!(r1, r2);
    assert!(r1.is_well_formed());
}
