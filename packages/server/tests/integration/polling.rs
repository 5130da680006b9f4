use serde_json::json;

use crate::common::{TestApp, routes};

#[tokio::test]
async fn a_new_user_has_an_empty_feed_and_state() {
    let app = TestApp::spawn().await;
    let user = app.create_user("alice@example.com").await;

    let feed = app.get_as(&user, routes::STATUS_FEED).await;
    assert_eq!(feed.status, 200, "{}", feed.text);
    assert!(feed.body["run_id"].is_null());
    assert_eq!(feed.body["isrunning"], false);
    assert!(feed.body["events"].as_array().unwrap().is_empty());

    let state = app.get_as(&user, routes::STATE).await;
    assert!(state.body["current_run_id"].is_null());
    assert_eq!(state.body["credits"], 10);

    let latest = app.get_as(&user, routes::LATEST_ITEM).await;
    assert!(latest.body["run_id"].is_null());
    assert!(latest.body["images"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn feed_follows_the_current_run_newest_first() {
    let app = TestApp::spawn().await;
    let user = app.create_user("alice@example.com").await;
    let run_id = app.start_run(&user).await;
    app.deliver_image(&user, run_id, 1).await;

    let feed = app.get_as(&user, routes::STATUS_FEED).await;

    assert_eq!(feed.body["run_id"], run_id);
    assert_eq!(feed.body["status"], "running");
    assert_eq!(feed.body["isrunning"], true);
    let codes: Vec<&str> = feed.body["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["code"].as_str().unwrap())
        .collect();
    assert_eq!(codes.first(), Some(&"IMAGE_DONE"));
    assert_eq!(codes.last(), Some(&"UPLOAD_RECEIVED"));

    let first = &feed.body["events"][0];
    assert!(first["label"].as_str().is_some_and(|l| !l.is_empty()));
    assert!(first["icon"].as_str().is_some_and(|i| !i.is_empty()));
    assert_eq!(first["severity"], "success");
}

#[tokio::test]
async fn feed_returns_at_most_twenty_entries() {
    let app = TestApp::spawn().await;
    let user = app.create_user("alice@example.com").await;
    let run_id = app.start_run(&user).await;
    for i in 0..25 {
        app.status_callback(&json!({
            "run_id": run_id,
            "user_id": user.id,
            "code": "ANALYSIS_DONE",
            "message": format!("Schritt {i}"),
        }))
        .await;
    }

    let feed = app.get_as(&user, &routes::feed_for(run_id)).await;
    let events = feed.body["events"].as_array().unwrap();
    assert_eq!(events.len(), 20);
    assert_eq!(events[0]["message"], "Schritt 24");

    let limited = app
        .get_as(&user, &format!("{}&limit=5", routes::feed_for(run_id)))
        .await;
    assert_eq!(limited.body["events"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn unknown_codes_are_shown_with_a_fallback_label() {
    let app = TestApp::spawn().await;
    let user = app.create_user("alice@example.com").await;
    let run_id = app.start_run(&user).await;

    app.status_callback(&json!({
        "run_id": run_id,
        "user_id": user.id,
        "code": "SOMETHING_NEW",
    }))
    .await;

    let feed = app.get_as(&user, &routes::feed_for(run_id)).await;
    let event = &feed.body["events"][0];
    assert_eq!(event["code"], "SOMETHING_NEW");
    assert!(event["label"].as_str().is_some_and(|l| !l.is_empty()));
}

#[tokio::test]
async fn state_tracks_the_current_run() {
    let app = TestApp::spawn().await;
    let user = app.create_user("alice@example.com").await;
    let run_id = app.start_run(&user).await;

    let state = app.get_as(&user, routes::STATE).await;

    assert_eq!(state.body["current_run_id"], run_id);
    assert_eq!(state.body["status"], "running");
    assert_eq!(state.body["isrunning"], true);
}

#[tokio::test]
async fn runs_are_listed_newest_first_with_pagination() {
    let app = TestApp::spawn().await;
    let user = app.create_user("alice@example.com").await;
    let first = app.start_run(&user).await;
    app.post_as(&user, &routes::run_reset(first), &json!({})).await;
    let second = app.upload_image(&user).await;

    let res = app.get_as(&user, &format!("{}?per_page=1", routes::RUNS)).await;

    assert_eq!(res.status, 200, "{}", res.text);
    assert_eq!(res.body["runs"][0]["id"], second);
    assert_eq!(res.body["pagination"]["total"], 2);
    assert_eq!(res.body["pagination"]["total_pages"], 2);

    let page_two = app
        .get_as(&user, &format!("{}?per_page=1&page=2", routes::RUNS))
        .await;
    assert_eq!(page_two.body["runs"][0]["id"], first);
}

#[tokio::test]
async fn runs_of_other_users_are_invisible() {
    let app = TestApp::spawn().await;
    let alice = app.create_user("alice@example.com").await;
    let bob = app.create_user("bob@example.com").await;
    let run_id = app.upload_image(&alice).await;

    assert_eq!(app.get_as(&bob, &routes::run(run_id)).await.status, 404);
    assert_eq!(app.get_as(&bob, &routes::feed_for(run_id)).await.status, 404);
    let list = app.get_as(&bob, routes::RUNS).await;
    assert!(list.body["runs"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn health_reports_the_database() {
    let app = TestApp::spawn().await;

    let res = app.get_anonymous(routes::HEALTH).await;

    assert_eq!(res.status, 200);
    assert_eq!(res.body["status"], "ok");
    assert_eq!(res.body["database"], true);
}
