mod common;

use std::sync::Arc;

use common::{ten_ids, ten_venue_store, ScriptedOracle};
use tempfile::tempdir;
use venue_funnel::funnel::{RecommendationTask, Recommender};
use venue_funnel::store::{DataTool, ImportStats, MemoryStore, SqliteStore};
use venue_funnel::FunnelConfig;

fn write_dataset(dir: &std::path::Path) {
    std::fs::write(
        dir.join("user.json"),
        "{\"user_id\": \"u1\", \"name\": \"Ana\"}\n\
         {\"user_id\": \"u2\"}\n",
    )
    .unwrap();
    std::fs::write(
        dir.join("item.json"),
        "{\"item_id\": \"b1\", \"name\": \"Pho 99\", \"categories\": \"Vietnamese, Soup\", \"stars\": 4.5, \"city\": \"Tucson\"}\n\
         not json at all\n\
         {\"item_id\": \"b2\", \"stars\": null}\n",
    )
    .unwrap();
    std::fs::write(
        dir.join("review.json"),
        "{\"item_id\": \"b1\", \"user_id\": \"u1\", \"stars\": 5.0, \"text\": \"Great broth.\", \"useful\": 3, \"date\": \"2021-05-01 10:00:00\"}\n\
         {\"item_id\": \"b2\", \"user_id\": \"u1\", \"stars\": 2, \"text\": null}\n\
         {\"item_id\": \"b1\", \"user_id\": \"u2\", \"stars\": 3.6}\n",
    )
    .unwrap();
}

#[test]
fn imported_dataset_answers_like_the_source() {
    let data = tempdir().unwrap();
    write_dataset(data.path());
    let memory = MemoryStore::load_dir(data.path()).unwrap();

    let db_dir = tempdir().unwrap();
    let store = SqliteStore::open(db_dir.path().join("funnel.sqlite")).unwrap();
    let stats = store.import(&memory).unwrap();
    assert_eq!(
        stats,
        ImportStats {
            users: 2,
            items: 2,
            reviews: 3
        }
    );

    for id in ["b1", "b2", "missing"] {
        assert_eq!(store.get_item(id), memory.get_item(id));
        assert_eq!(store.reviews_by_item(id), memory.reviews_by_item(id));
    }
    for id in ["u1", "u2", "missing"] {
        assert_eq!(store.get_user(id), memory.get_user(id));
        assert_eq!(store.reviews_by_user(id), memory.reviews_by_user(id));
    }

    let b2 = store.get_item("b2").unwrap();
    assert_eq!(b2.name, "Unknown");
    assert_eq!(b2.declared_stars(), None);
    let by_b1 = store.reviews_by_item("b1");
    assert_eq!(by_b1.iter().map(|r| r.stars).collect::<Vec<_>>(), vec![5, 4]);
}

#[test]
fn data_survives_reopen_and_reimport_upserts() {
    let db_dir = tempdir().unwrap();
    let path = db_dir.path().join("nested").join("funnel.sqlite");

    {
        let store = SqliteStore::open(&path).unwrap();
        store.import(&ten_venue_store()).unwrap();
    }

    let reopened = SqliteStore::open(&path).unwrap();
    assert_eq!(reopened.path(), path.as_path());
    assert_eq!(reopened.get_user("u1").unwrap().name, "Dana");
    assert_eq!(reopened.reviews_by_user("u1").len(), 2);

    let renamed = MemoryStore::new().with_user(common::user("u1", "Dana R."));
    reopened.import(&renamed).unwrap();
    assert_eq!(reopened.get_user("u1").unwrap().name, "Dana R.");
    assert_eq!(reopened.reviews_by_user("u1").len(), 2);
}

#[test]
fn reimporting_the_same_dataset_keeps_reviews_single() {
    let db_dir = tempdir().unwrap();
    let store = SqliteStore::open(db_dir.path().join("funnel.sqlite")).unwrap();
    let memory = ten_venue_store();

    store.import(&memory).unwrap();
    store.import(&memory).unwrap();

    assert_eq!(store.reviews_by_item("v0"), memory.reviews_by_item("v0"));
    assert_eq!(store.reviews_by_item("v0").len(), 1);
    assert_eq!(store.reviews_by_user("u1"), memory.reviews_by_user("u1"));
    assert_eq!(store.reviews_by_user("someone").len(), 10);
}

#[tokio::test]
async fn funnel_output_matches_across_backends() {
    let memory = ten_venue_store();
    let db_dir = tempdir().unwrap();
    let sqlite = SqliteStore::open(db_dir.path().join("funnel.sqlite")).unwrap();
    sqlite.import(&memory).unwrap();

    let task = RecommendationTask {
        user_id: "u1".to_string(),
        candidate_list: ten_ids(),
        candidate_category: String::new(),
    };

    let from_memory = Recommender::new(
        Arc::new(ScriptedOracle::silent()),
        Arc::new(memory),
        FunnelConfig::default(),
    )
    .recommend(&task)
    .await;
    let from_sqlite = Recommender::new(
        Arc::new(ScriptedOracle::silent()),
        Arc::new(sqlite),
        FunnelConfig::default(),
    )
    .recommend(&task)
    .await;

    assert_eq!(from_memory.item_list, from_sqlite.item_list);
    assert_eq!(from_memory.item_list.len(), 5);
}
