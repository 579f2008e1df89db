mod common;

use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{ids, item, review, ten_ids, ten_venue_store, user, FailingOracle, ScriptedOracle};
use tempfile::tempdir;
use venue_funnel::funnel::{JsonlTraceSink, RecommendationTask, Recommender};
use venue_funnel::{FunnelConfig, MemoryStore};

fn task(candidates: Vec<String>) -> RecommendationTask {
    RecommendationTask {
        user_id: "u1".to_string(),
        candidate_list: candidates,
        candidate_category: "Beauty & Spas".to_string(),
    }
}

fn recommender(oracle: Arc<ScriptedOracle>, store: MemoryStore) -> Recommender {
    Recommender::new(oracle, Arc::new(store), FunnelConfig::default())
}

#[tokio::test]
async fn empty_selections_fall_back_to_rating_order() {
    let oracle = Arc::new(ScriptedOracle::silent());
    let out = recommender(oracle.clone(), ten_venue_store())
        .recommend(&task(ten_ids()))
        .await;

    // Stage 3 pads v9..v5, Stage 4 pads v4, v3, v2 from what is left.
    assert_eq!(out.item_list, ids(&["v9", "v4", "v6", "v3", "v5"]));
    assert_eq!(oracle.calls(), 4);
}

#[tokio::test]
async fn oracle_picks_flow_through_the_interleave() {
    let oracle = Arc::new(ScriptedOracle::new(&[
        r#"{"user_profile": "tidy", "primary_need": "nails", "secondary_need": "hair", "potential_need": "spa"}"#,
        r#"```json
{"selected_venues": [
    {"venue_id": "v0", "selection_reason": "cheap"},
    {"venue_id": "v2"}, {"venue_id": "v4"}, {"venue_id": "v6"}, {"venue_id": "v8"},
]}
```"#,
        r#"{"final_recommendations": ["v8", "v0", "v2", "v4", "v6"]}"#,
        r#"{"recommended_venues": [
            {"venue_id": "v1", "need_type": "secondary"},
            {"venue_id": "v3", "need_type": "potential"},
            {"venue_id": "v5"}
        ]}"#,
    ]));
    let out = recommender(oracle.clone(), ten_venue_store())
        .recommend(&task(ten_ids()))
        .await;

    assert_eq!(out.item_list, ids(&["v8", "v1", "v4", "v3", "v6"]));

    let requests = oracle.requests();
    let callers: Vec<&str> = requests.iter().map(|r| r.attribution.caller).collect();
    assert_eq!(
        callers,
        vec![
            "funnel::intent",
            "funnel::primary_screening",
            "funnel::final_selection",
            "funnel::secondary_selection"
        ]
    );
    // The intent flows into later prompts.
    assert!(requests[1].messages[1].content.contains("Primary need: nails"));
    // Stage 4 never sees Stage 3's picks.
    assert!(!requests[3].messages[1].content.contains("(ID: v8)"));
    assert!(requests[3].messages[1].content.contains("(ID: v9)"));
}

#[tokio::test]
async fn invented_ids_never_reach_the_output() {
    let oracle = Arc::new(ScriptedOracle::new(&[
        "{}",
        r#"{"selected_venues": [{"venue_id": "ghost"}, {"venue_id": "v3"}]}"#,
        r#"{"final_recommendations": ["phantom", "v3", "v9"]}"#,
        r#"{"recommended_venues": [{"venue_id": "v3"}, {"venue_id": "nowhere"}]}"#,
    ]));
    let candidates = ten_ids();
    let out = recommender(oracle, ten_venue_store()).recommend(&task(candidates.clone())).await;

    let allowed: HashSet<&String> = candidates.iter().collect();
    assert_eq!(out.item_list.len(), 5);
    assert!(out.item_list.iter().all(|id| allowed.contains(id)));
    let unique: HashSet<&String> = out.item_list.iter().collect();
    assert_eq!(unique.len(), out.item_list.len());
    assert_eq!(out.item_list[0], "v3");
}

#[tokio::test]
async fn low_rated_venues_never_reach_a_prompt_or_the_output() {
    let store = ten_venue_store()
        .with_item(item("bad1", "Nail Salons", 1.5))
        .with_item(item("bad2", "Nail Salons", 0.0))
        .with_review(review("someone", "bad2", 1, "Awful."));
    let mut candidates = ids(&["bad1", "bad2"]);
    candidates.extend(ten_ids());

    let oracle = Arc::new(ScriptedOracle::new(&[
        "{}",
        r#"{"selected_venues": [{"venue_id": "bad1"}, {"venue_id": "bad2"}]}"#,
    ]));
    let out = recommender(oracle.clone(), store).recommend(&task(candidates)).await;

    assert!(!out.item_list.iter().any(|id| id.starts_with("bad")));
    let prompts = oracle.prompt_text();
    assert!(!prompts.contains("bad1"));
    assert!(!prompts.contains("bad2"));
}

#[tokio::test]
async fn too_few_survivors_short_circuit_without_oracle_calls() {
    let store = ten_venue_store().with_item(item("bad", "Nail Salons", 1.0));
    let oracle = Arc::new(ScriptedOracle::silent());

    let candidates = ids(&["v1", "bad", "v2", "missing", "v3", "v4"]);
    let out = recommender(oracle.clone(), store).recommend(&task(candidates)).await;

    assert_eq!(out.item_list, ids(&["v1", "v2", "v3", "v4"]));
    assert_eq!(oracle.calls(), 0);
}

#[tokio::test]
async fn empty_pool_returns_empty_list() {
    let oracle = Arc::new(ScriptedOracle::silent());
    let out = recommender(oracle.clone(), ten_venue_store()).recommend(&task(Vec::new())).await;
    assert!(out.item_list.is_empty());
    assert_eq!(oracle.calls(), 0);
}

#[tokio::test]
async fn oracle_failure_degrades_to_leading_raw_candidates() {
    let oracle = Arc::new(FailingOracle::new());
    let mut candidates = ids(&["unknown-id"]);
    candidates.extend(ten_ids());

    let rec = Recommender::new(oracle.clone(), Arc::new(ten_venue_store()), FunnelConfig::default());
    let out = rec.recommend(&task(candidates)).await;

    assert_eq!(out.item_list, ids(&["unknown-id", "v0", "v1", "v2", "v3"]));
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn exactly_five_survivors_skip_secondary_call() {
    let oracle = Arc::new(ScriptedOracle::silent());
    let candidates = ids(&["v0", "v1", "v2", "v3", "v4"]);
    let out = recommender(oracle.clone(), ten_venue_store()).recommend(&task(candidates)).await;

    // Stage 3 takes all five, leaving Stage 4 nothing to choose from; the
    // interleave yields v4, v1, v0 and the rest is padded in pool order.
    assert_eq!(out.item_list, ids(&["v4", "v1", "v0", "v2", "v3"]));
    assert_eq!(oracle.calls(), 3);
}

fn mention_store(mentioning_venues: usize) -> MemoryStore {
    let mut store = ten_venue_store().with_user(user("u1", "Maria"));
    for i in 0..mentioning_venues {
        store.insert_review(review(
            "owner",
            &format!("v{i}"),
            5,
            "Thank you Maria, we hope to see you again!",
        ));
    }
    store
}

const MENTION_HEADER: &str = "mention the user's name";

#[tokio::test]
async fn mention_context_is_forwarded_for_up_to_three_venues() {
    let oracle = Arc::new(ScriptedOracle::silent());
    recommender(oracle.clone(), mention_store(3))
        .recommend(&task(ten_ids()))
        .await;

    let requests = oracle.requests();
    let intent_prompt = &requests[0].messages[1].content;
    assert!(intent_prompt.contains(MENTION_HEADER));
    assert!(intent_prompt.contains("Thank you Maria"));
}

#[tokio::test]
async fn mention_context_is_suppressed_for_four_venues() {
    let oracle = Arc::new(ScriptedOracle::silent());
    recommender(oracle.clone(), mention_store(4))
        .recommend(&task(ten_ids()))
        .await;

    let requests = oracle.requests();
    let intent_prompt = &requests[0].messages[1].content;
    assert!(!intent_prompt.contains(MENTION_HEADER));
    assert!(!intent_prompt.contains("Thank you Maria"));
}

#[tokio::test]
async fn stage_traces_are_written_in_order() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stages.jsonl");
    let (sink, worker) = JsonlTraceSink::new(&path).unwrap();

    let oracle = Arc::new(ScriptedOracle::silent());
    let rec = recommender(oracle, ten_venue_store()).with_trace(Arc::new(sink));
    rec.recommend(&task(ten_ids())).await;
    drop(rec);
    worker.join().unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    let rows: Vec<serde_json::Value> = raw.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    let stages: Vec<&str> = rows.iter().map(|r| r["stage"].as_str().unwrap()).collect();
    assert_eq!(
        stages,
        vec!["intent_analysis", "primary_screening", "final_selection", "secondary_selection"]
    );
    assert_eq!(rows[1]["padded"], 10);
    assert_eq!(rows[2]["output_ids"], serde_json::json!(["v9", "v8", "v7", "v6", "v5"]));
    let request_ids: HashSet<&str> = rows.iter().map(|r| r["request_id"].as_str().unwrap()).collect();
    assert_eq!(request_ids.len(), 1);
}
