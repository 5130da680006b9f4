use serde_json::json;

use vitrine_server::ledger::credit;

use crate::common::{TestApp, TestOptions, png_bytes, routes};

#[tokio::test]
async fn charges_are_recorded_with_their_step_and_run() {
    let app = TestApp::spawn().await;
    let user = app.create_user("alice@example.com").await;
    let run_id = app.start_run(&user).await;
    app.deliver_image(&user, run_id, 2).await;

    let res = app.get_as(&user, routes::CREDITS).await;

    assert_eq!(res.status, 200, "{}", res.text);
    assert_eq!(res.body["balance"], 8);
    let tx = &res.body["transactions"][0];
    assert_eq!(tx["amount"], -2);
    assert_eq!(tx["reason"], "image_2");
    assert_eq!(tx["run_id"], run_id);
    assert_eq!(tx["meta"]["source"], "webhook_image");

    let run = app.get_as(&user, &routes::run(run_id)).await;
    assert_eq!(run.body["run"]["credits_spent"], 2);
}

#[tokio::test]
async fn the_ledger_replays_to_the_stored_balance() {
    let app = TestApp::spawn().await;
    let user = app.create_user("alice@example.com").await;
    let run_id = app.start_run(&user).await;

    app.status_callback(&json!({
        "run_id": run_id,
        "user_id": user.id,
        "step_type": "analysis",
    }))
    .await;
    for position in 1..=3 {
        app.deliver_image(&user, run_id, position).await;
    }
    app.image_callback(
        &[
            ("run_id", run_id.to_string()),
            ("user_id", user.id.to_string()),
            ("step_type", "upscale_2k".to_string()),
            ("badge", "2k".to_string()),
            ("position", "1".to_string()),
        ],
        Some(png_bytes()),
    )
    .await;

    let (stored, replayed) = credit::replay_balance(&app.db, user.id).await.unwrap();
    assert_eq!(stored, 10 - 1 - 3 * 2 - 1);
    assert_eq!(stored, replayed);
}

#[tokio::test]
async fn charges_may_overdraw_once_work_has_started() {
    let app = TestApp::spawn_with(TestOptions {
        initial_balance: Some(1),
        ..Default::default()
    })
    .await;
    let user = app.create_user("alice@example.com").await;
    let run_id = app.start_run(&user).await;

    app.deliver_image(&user, run_id, 1).await;
    app.deliver_image(&user, run_id, 2).await;

    assert_eq!(app.balance(&user).await, -3);
    let (stored, replayed) = credit::replay_balance(&app.db, user.id).await.unwrap();
    assert_eq!(stored, replayed);
}

#[tokio::test]
async fn unpriced_steps_are_free() {
    let app = TestApp::spawn().await;
    let user = app.create_user("alice@example.com").await;
    let run_id = app.start_run(&user).await;

    let res = app
        .status_callback(&json!({
            "run_id": run_id,
            "user_id": user.id,
            "step_type": "thumbnail",
            "code": "ANALYSIS_DONE",
        }))
        .await;

    assert_eq!(res.status, 200, "{}", res.text);
    assert!(res.body["charged"].is_null());
    assert_eq!(app.balance(&user).await, 10);
}

#[tokio::test]
async fn history_is_paginated_newest_first() {
    let app = TestApp::spawn().await;
    let user = app.create_user("alice@example.com").await;
    let run_id = app.start_run(&user).await;
    for position in 1..=3 {
        app.deliver_image(&user, run_id, position).await;
    }

    let res = app
        .get_as(&user, &format!("{}?per_page=2", routes::CREDITS))
        .await;

    assert_eq!(res.body["transactions"].as_array().unwrap().len(), 2);
    assert_eq!(res.body["transactions"][0]["reason"], "image_3");
    assert_eq!(res.body["pagination"]["total"], 3);
    assert_eq!(res.body["pagination"]["total_pages"], 2);
}

#[tokio::test]
async fn upscale_requests_need_enough_credits() {
    let app = TestApp::spawn_with(TestOptions {
        initial_balance: Some(2),
        ..Default::default()
    })
    .await;
    let user = app.create_user("alice@example.com").await;
    let run_id = app.start_run(&user).await;
    let image_id = app.deliver_image(&user, run_id, 1).await;
    assert_eq!(app.balance(&user).await, 0);

    let res = app
        .post_as(
            &user,
            routes::WORKFLOW_UPDATE,
            &json!({"run_id": run_id, "image_id": image_id, "action": "4k"}),
        )
        .await;

    assert_eq!(res.status, 402);
    assert_eq!(res.code(), "INSUFFICIENT_CREDITS");
    assert!(app.engine.updates.lock().unwrap().is_empty());
}
