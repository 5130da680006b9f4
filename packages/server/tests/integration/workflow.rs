use std::sync::atomic::Ordering;

use serde_json::json;

use crate::common::{TestApp, TestOptions, routes};

mod start {
    use super::*;

    #[tokio::test]
    async fn start_forwards_uploads_and_marks_the_run_running() {
        let app = TestApp::spawn().await;
        let user = app.create_user("alice@example.com").await;
        let run_id = app.upload_image(&user).await;

        let res = app
            .post_as(&user, routes::WORKFLOW_START, &json!({"run_id": run_id}))
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["run_id"], run_id);
        assert_eq!(res.body["webhook_status"], 200);
        assert_eq!(app.run_status(&user, run_id).await, "running");

        let run = app.get_as(&user, &routes::run(run_id)).await;
        assert_eq!(run.body["run"]["last_message"], "Workflow gestartet");
        assert!(run.body["run"]["started_at"].is_string());

        let starts = app.engine.starts.lock().unwrap();
        assert_eq!(starts.len(), 1);
        assert_eq!(starts[0].image_urls.len(), 1);
        assert_eq!(starts[0].image_ratio, "1:1");
    }

    #[tokio::test]
    async fn a_run_without_uploads_cannot_start() {
        let app = TestApp::spawn().await;
        let user = app.create_user("alice@example.com").await;
        let empty = vitrine_server::ledger::run::create_run(&app.db, user.id)
            .await
            .unwrap();

        let res = app
            .post_as(&user, routes::WORKFLOW_START, &json!({"run_id": empty.id}))
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.code(), "VALIDATION_ERROR");
        assert_eq!(app.engine.start_count(), 0);
    }

    #[tokio::test]
    async fn starting_twice_conflicts() {
        let app = TestApp::spawn().await;
        let user = app.create_user("alice@example.com").await;
        let run_id = app.start_run(&user).await;
        let before = app.get_as(&user, &routes::run(run_id)).await;

        let res = app
            .post_as(&user, routes::WORKFLOW_START, &json!({"run_id": run_id}))
            .await;

        assert_eq!(res.status, 409);
        assert_eq!(app.engine.start_count(), 1);

        let after = app.get_as(&user, &routes::run(run_id)).await;
        assert_eq!(after.body["run"]["started_at"], before.body["run"]["started_at"]);
        assert_eq!(after.body["run"]["last_message"], "Workflow gestartet");
        assert_eq!(after.body["run"]["last_message"], before.body["run"]["last_message"]);
    }

    #[tokio::test]
    async fn only_one_run_per_user_may_run() {
        let app = TestApp::spawn().await;
        let user = app.create_user("alice@example.com").await;
        let first = app.start_run(&user).await;
        let second = app.upload_image(&user).await;
        assert_ne!(first, second);

        let res = app
            .post_as(&user, routes::WORKFLOW_START, &json!({"run_id": second}))
            .await;

        assert_eq!(res.status, 409);
        assert_eq!(res.code(), "CONFLICT");
        assert_eq!(app.run_status(&user, second).await, "pending");
    }

    #[tokio::test]
    async fn engine_failure_leaves_the_run_pending() {
        let app = TestApp::spawn().await;
        let user = app.create_user("alice@example.com").await;
        let run_id = app.upload_image(&user).await;
        app.engine.failing.store(true, Ordering::SeqCst);

        let res = app
            .post_as(&user, routes::WORKFLOW_START, &json!({"run_id": run_id}))
            .await;

        assert_eq!(res.status, 502);
        assert_eq!(res.code(), "UPSTREAM_ERROR");
        assert_eq!(app.run_status(&user, run_id).await, "pending");
    }

    #[tokio::test]
    async fn an_empty_balance_cannot_start() {
        let app = TestApp::spawn_with(TestOptions {
            initial_balance: Some(0),
            ..Default::default()
        })
        .await;
        let user = app.create_user("alice@example.com").await;
        let run_id = app.upload_image(&user).await;

        let res = app
            .post_as(&user, routes::WORKFLOW_START, &json!({"run_id": run_id}))
            .await;

        assert_eq!(res.status, 402);
        assert_eq!(res.code(), "INSUFFICIENT_CREDITS");
        assert_eq!(app.engine.start_count(), 0);
    }

    #[tokio::test]
    async fn user_id_must_match_the_session() {
        let app = TestApp::spawn().await;
        let user = app.create_user("alice@example.com").await;
        let run_id = app.upload_image(&user).await;

        let res = app
            .post_as(
                &user,
                routes::WORKFLOW_START,
                &json!({"run_id": run_id, "user_id": user.id + 1}),
            )
            .await;

        assert_eq!(res.status, 400);
    }

    #[tokio::test]
    async fn starting_does_not_charge() {
        let app = TestApp::spawn().await;
        let user = app.create_user("alice@example.com").await;

        app.start_run(&user).await;

        assert_eq!(app.balance(&user).await, 10);
    }
}

mod update {
    use super::*;

    #[tokio::test]
    async fn edit_requests_are_forwarded_without_touching_the_run() {
        let app = TestApp::spawn().await;
        let user = app.create_user("alice@example.com").await;
        let run_id = app.start_run(&user).await;
        let image_id = app.deliver_image(&user, run_id, 2).await;

        let res = app
            .post_as(
                &user,
                routes::WORKFLOW_UPDATE,
                &json!({
                    "run_id": run_id,
                    "image_id": image_id,
                    "action": "edit",
                    "userprompt": "make the background white",
                }),
            )
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(app.run_status(&user, run_id).await, "running");

        let updates = app.engine.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].image_id, image_id);
        assert_eq!(updates[0].position, 2);
        assert_eq!(
            updates[0].userprompt.as_deref(),
            Some("make the background white")
        );
    }

    #[tokio::test]
    async fn edits_need_a_prompt() {
        let app = TestApp::spawn().await;
        let user = app.create_user("alice@example.com").await;
        let run_id = app.start_run(&user).await;
        let image_id = app.deliver_image(&user, run_id, 1).await;

        let res = app
            .post_as(
                &user,
                routes::WORKFLOW_UPDATE,
                &json!({"run_id": run_id, "image_id": image_id, "action": "edit"}),
            )
            .await;

        assert_eq!(res.status, 400);
        assert!(app.engine.updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn upscale_of_an_unknown_image_is_not_found() {
        let app = TestApp::spawn().await;
        let user = app.create_user("alice@example.com").await;
        let run_id = app.start_run(&user).await;

        let res = app
            .post_as(
                &user,
                routes::WORKFLOW_UPDATE,
                &json!({"run_id": run_id, "image_id": 9999, "action": "4k"}),
            )
            .await;

        assert_eq!(res.status, 404);
    }

    #[tokio::test]
    async fn update_shows_up_in_the_status_feed() {
        let app = TestApp::spawn().await;
        let user = app.create_user("alice@example.com").await;
        let run_id = app.start_run(&user).await;
        let image_id = app.deliver_image(&user, run_id, 3).await;

        app.post_as(
            &user,
            routes::WORKFLOW_UPDATE,
            &json!({"run_id": run_id, "image_id": image_id, "action": "2k"}),
        )
        .await;

        let feed = app.get_as(&user, &routes::feed_for(run_id)).await;
        assert_eq!(feed.body["events"][0]["code"], "WORKFLOW_UPDATE_STARTED");
    }
}

mod reset {
    use super::*;

    #[tokio::test]
    async fn reset_fails_a_stuck_run_and_frees_the_slot() {
        let app = TestApp::spawn().await;
        let user = app.create_user("alice@example.com").await;
        let stuck = app.start_run(&user).await;

        let res = app.post_as(&user, &routes::run_reset(stuck), &json!({})).await;
        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["run"]["status"], "failed");

        let next = app.upload_image(&user).await;
        let res = app
            .post_as(&user, routes::WORKFLOW_START, &json!({"run_id": next}))
            .await;
        assert_eq!(res.status, 200, "{}", res.text);
    }

    #[tokio::test]
    async fn finished_runs_cannot_be_reset() {
        let app = TestApp::spawn().await;
        let user = app.create_user("alice@example.com").await;
        let run_id = app.start_run(&user).await;
        app.status_callback(&json!({
            "run_id": run_id,
            "user_id": user.id,
            "isrunning": false,
        }))
        .await;

        let res = app.post_as(&user, &routes::run_reset(run_id), &json!({})).await;

        assert_eq!(res.status, 409);
        assert_eq!(app.run_status(&user, run_id).await, "finished");
    }
}
