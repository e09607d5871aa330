mod common;

use std::sync::Arc;

use common::{MockTransport, status_json, user_json, van};
use serde_json::json;
use van::{EntityType, Error, StatusData, UserData};

#[tokio::test]
async fn same_id_gives_same_instance() {
    let mock = MockTransport::default();
    let van = van(mock.clone());

    let a = van.user("bob");
    let b = van.cache().user("bob");
    assert!(Arc::ptr_eq(&a, &b));
    assert!(!a.is_populated());

    // users and statuses live in separate namespaces
    let s = van.status("bob");
    assert!(!s.is_populated());
    assert_eq!(van.cache().len(), 2);
    assert!(mock.calls().await.is_empty());
}

#[tokio::test]
async fn clients_do_not_share_entities() {
    let mock = MockTransport::default();
    let one = van(mock.clone());
    let two = van(mock.clone());

    assert!(!Arc::ptr_eq(&one.user("bob"), &two.user("bob")));
    assert!(Arc::ptr_eq(&one.user("bob"), &one.clone().user("bob")));
}

#[tokio::test]
async fn concurrent_reads_share_one_fetch() {
    let mock = MockTransport::default();
    mock.add_user(user_json("bob")).await;
    let van = van(mock.clone());
    let bob = van.user("bob");

    let (a, b, name) = tokio::join!(bob.data(), bob.data(), bob.name());
    assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
    assert_eq!(name.unwrap(), "bob name");
    assert_eq!(mock.count("users/show").await, 1);

    assert_eq!(bob.screen_name().await.unwrap(), "bob_sn");
    assert_eq!(mock.count("users/show").await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn hydration_happens_once_across_tasks() {
    let mock = MockTransport::default();
    mock.add_user(user_json("bob")).await;
    let van = van(mock.clone());

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let van = van.clone();
            tokio::spawn(async move { van.user("bob").data().await })
        })
        .collect();
    for task in tasks {
        let data = task.await.unwrap().unwrap();
        assert_eq!(data.id, "bob");
    }

    assert_eq!(mock.count("users/show").await, 1);
    assert!(van.user("bob").is_populated());
}

#[tokio::test]
async fn missing_entity_stays_unpopulated_and_retries() {
    let mock = MockTransport::default();
    let van = van(mock.clone());
    let ghost = van.user("ghost");

    let err = ghost.data().await.unwrap_err();
    assert!(matches!(
        &err,
        Error::NotFound { kind: EntityType::User, id } if id == "ghost"
    ));
    assert!(!ghost.is_populated());

    mock.add_user(user_json("ghost")).await;
    assert_eq!(ghost.name().await.unwrap(), "ghost name");
    assert_eq!(mock.count("users/show").await, 2);

    let err = van.status("s404").text().await.unwrap_err();
    assert!(matches!(
        err,
        Error::NotFound {
            kind: EntityType::Status,
            ..
        }
    ));
}

#[tokio::test]
async fn failed_fetch_is_not_cached() {
    let mock = MockTransport::default();
    mock.add_user(user_json("bob")).await;
    let van = van(mock.clone());
    let bob = van.user("bob");

    mock.fail_next(1).await;
    assert!(bob.data().await.unwrap_err().is_network());
    assert!(!bob.is_populated());

    assert_eq!(bob.name().await.unwrap(), "bob name");
}

#[tokio::test]
async fn first_payload_wins() {
    let mock = MockTransport::default();
    let van = van(mock.clone());

    let mut first = status_json(1, "alice");
    first["text"] = json!("first");
    let mut second = status_json(1, "alice");
    second["text"] = json!("second");

    let a = van.cache().resolve::<StatusData>(first).unwrap();
    let b = van.cache().resolve::<StatusData>(second).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(b.text().await.unwrap(), "first");
    assert!(mock.calls().await.is_empty());
}

#[tokio::test]
async fn payload_populates_earlier_bare_id() {
    let mock = MockTransport::default();
    let van = van(mock.clone());

    let early = van.status("s7");
    assert!(early.cached().is_none());

    let resolved = van.cache().resolve::<StatusData>(status_json(7, "alice")).unwrap();
    assert!(Arc::ptr_eq(&early, &resolved));
    assert_eq!(early.cached().unwrap().text, "status 7");
    assert_eq!(early.rawid().await.unwrap(), 7);
    assert!(mock.calls().await.is_empty());
}

#[tokio::test]
async fn embedded_author_is_cached_without_fetching() {
    let mock = MockTransport::default();
    let van = van(mock.clone());

    let status = van.cache().resolve::<StatusData>(status_json(3, "carol")).unwrap();
    let cached = van.cache().lookup::<UserData>("carol").unwrap();
    assert!(cached.is_populated());

    let author = status.user().await.unwrap().unwrap();
    assert!(Arc::ptr_eq(&author, &cached));
    assert_eq!(author.name().await.unwrap(), "carol name");
    assert_eq!(mock.count("users/show").await, 0);
}

#[tokio::test]
async fn reposted_status_is_cached_and_bare_ids_stay_lazy() {
    let mock = MockTransport::default();
    let van = van(mock.clone());

    let mut payload = status_json(10, "alice");
    payload["repost_status"] = status_json(4, "dave");
    let status = van.cache().resolve::<StatusData>(payload).unwrap();

    let origin = status.repost_status().await.unwrap().unwrap();
    assert_eq!(origin.id(), "s4");
    assert!(origin.is_populated());
    assert!(van.cache().lookup::<UserData>("dave").unwrap().is_populated());

    let mut payload = status_json(11, "alice");
    payload["user"] = json!("erin");
    let status = van.cache().resolve::<StatusData>(payload).unwrap();
    let erin = status.user().await.unwrap().unwrap();
    assert_eq!(erin.id(), "erin");
    assert!(!erin.is_populated());
}

#[tokio::test]
async fn hydrate_refreshes_payload() {
    let mock = MockTransport::default();
    mock.add_user(user_json("bob")).await;
    let van = van(mock.clone());
    let bob = van.user("bob");
    assert_eq!(bob.name().await.unwrap(), "bob name");

    let mut renamed = user_json("bob");
    renamed["name"] = json!("Bobby");
    mock.add_user(renamed).await;

    assert_eq!(bob.name().await.unwrap(), "bob name");
    assert_eq!(bob.hydrate().await.unwrap().name, "Bobby");
    assert_eq!(bob.name().await.unwrap(), "Bobby");
    assert_eq!(mock.count("users/show").await, 2);
}

#[tokio::test]
async fn bad_batch_caches_nothing() {
    let mock = MockTransport::default();
    let van = van(mock.clone());

    let batch = json!([status_json(1, "alice"), {"id": "s2"}]);
    assert!(van.cache().resolve_all::<StatusData>(batch).is_err());
    assert!(van.cache().lookup::<StatusData>("s1").is_none());
    assert!(van.cache().is_empty());

    let err = van
        .cache()
        .resolve_all::<StatusData>(json!({"id": "s1"}))
        .unwrap_err();
    assert!(matches!(err, Error::Client(_)));
}

#[tokio::test]
async fn entities_outliving_their_client_are_detached() {
    let mock = MockTransport::default();
    mock.add_user(user_json("bob")).await;
    let van = van(mock.clone());

    let bob = van.user("bob");
    let status = van.cache().resolve::<StatusData>(status_json(1, "alice")).unwrap();
    drop(van);

    assert!(matches!(bob.data().await, Err(Error::Detached)));
    // loaded payloads stay readable
    assert_eq!(status.text().await.unwrap(), "status 1");
    assert!(matches!(status.favorite().await, Err(Error::Detached)));
    assert!(mock.calls().await.is_empty());
}
