use serde_json::json;

use crate::common::{TestApp, TestUser, png_bytes, routes};

fn main_fields(user: &TestUser, run_id: i32, position: i32) -> Vec<(&'static str, String)> {
    vec![
        ("run_id", run_id.to_string()),
        ("user_id", user.id.to_string()),
        ("step_type", format!("image_{position}")),
        ("position", position.to_string()),
    ]
}

async fn finish(app: &TestApp, user: &TestUser, run_id: i32) {
    let res = app
        .status_callback(&json!({
            "run_id": run_id,
            "user_id": user.id,
            "isrunning": false,
        }))
        .await;
    assert_eq!(res.status, 200, "{}", res.text);
}

mod authentication {
    use super::*;

    #[tokio::test]
    async fn callbacks_without_the_bearer_token_are_rejected() {
        let app = TestApp::spawn().await;
        let user = app.create_user("alice@example.com").await;
        let run_id = app.start_run(&user).await;

        let res = app
            .image_callback_with_token(&main_fields(&user, run_id, 1), Some(png_bytes()), "wrong")
            .await;
        assert_eq!(res.status, 401);

        let res = reqwest::Client::new()
            .post(app.url(routes::STATUS_CALLBACK))
            .json(&json!({"run_id": run_id, "user_id": user.id}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 401);
    }

    #[tokio::test]
    async fn callbacks_for_someone_elses_run_are_not_found() {
        let app = TestApp::spawn().await;
        let alice = app.create_user("alice@example.com").await;
        let bob = app.create_user("bob@example.com").await;
        let run_id = app.start_run(&alice).await;

        let res = app
            .image_callback(&main_fields(&bob, run_id, 1), Some(png_bytes()))
            .await;

        assert_eq!(res.status, 404);
    }
}

mod image_results {
    use super::*;

    #[tokio::test]
    async fn main_result_is_stored_charged_and_logged() {
        let app = TestApp::spawn().await;
        let user = app.create_user("alice@example.com").await;
        let run_id = app.start_run(&user).await;

        let res = app
            .image_callback(&main_fields(&user, run_id, 1), Some(png_bytes()))
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["status"], "running");
        assert_eq!(res.body["charged"], 2);
        assert!(res.body.get("stale").is_none());
        assert_eq!(app.balance(&user).await, 8);

        let latest = app.get_as(&user, routes::LATEST_ITEM).await;
        let images = latest.body["images"].as_array().unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0]["position"], 1);
        assert!(images[0]["badge"].is_null());

        let feed = app.get_as(&user, &routes::feed_for(run_id)).await;
        assert_eq!(feed.body["events"][0]["code"], "IMAGE_DONE");
    }

    #[tokio::test]
    async fn every_callback_is_charged_once() {
        let app = TestApp::spawn().await;
        let user = app.create_user("alice@example.com").await;
        let run_id = app.start_run(&user).await;

        for position in 1..=3 {
            app.deliver_image(&user, run_id, position).await;
        }

        assert_eq!(app.balance(&user).await, 10 - 3 * 2);
        let credits = app.get_as(&user, routes::CREDITS).await;
        assert_eq!(credits.body["transactions"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn a_newer_image_replaces_the_slot() {
        let app = TestApp::spawn().await;
        let user = app.create_user("alice@example.com").await;
        let run_id = app.start_run(&user).await;

        app.deliver_image(&user, run_id, 2).await;
        let newer = app.deliver_image(&user, run_id, 2).await;

        let latest = app.get_as(&user, routes::LATEST_ITEM).await;
        let images = latest.body["images"].as_array().unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0]["id"], newer);
    }

    #[tokio::test]
    async fn a_successful_callback_needs_a_file() {
        let app = TestApp::spawn().await;
        let user = app.create_user("alice@example.com").await;
        let run_id = app.start_run(&user).await;

        let res = app.image_callback(&main_fields(&user, run_id, 1), None).await;

        assert_eq!(res.status, 400);
        assert_eq!(app.balance(&user).await, 10);
    }

    #[tokio::test]
    async fn position_outside_the_slots_is_rejected() {
        let app = TestApp::spawn().await;
        let user = app.create_user("alice@example.com").await;
        let run_id = app.start_run(&user).await;

        let res = app
            .image_callback(&main_fields(&user, run_id, 4), Some(png_bytes()))
            .await;

        assert_eq!(res.status, 400);
    }

    #[tokio::test]
    async fn a_note_from_another_run_conflicts() {
        let app = TestApp::spawn().await;
        let user = app.create_user("alice@example.com").await;
        let first = app.start_run(&user).await;
        app.deliver_image(&user, first, 1).await;
        let note_id = app.get_as(&user, &routes::run(first)).await.body["note"]["id"]
            .as_i64()
            .unwrap();
        finish(&app, &user, first).await;
        let second = app.start_run(&user).await;

        let mut fields = main_fields(&user, second, 1);
        fields.push(("note_id", note_id.to_string()));
        let res = app.image_callback(&fields, Some(png_bytes())).await;

        assert_eq!(res.status, 409);
    }
}

mod transitions {
    use super::*;

    #[tokio::test]
    async fn terminal_status_finishes_the_run() {
        let app = TestApp::spawn().await;
        let user = app.create_user("alice@example.com").await;
        let run_id = app.start_run(&user).await;

        finish(&app, &user, run_id).await;

        let run = app.get_as(&user, &routes::run(run_id)).await;
        assert_eq!(run.body["run"]["status"], "finished");
        assert_eq!(run.body["run"]["isrunning"], false);
        assert!(run.body["run"]["finished_at"].is_string());
    }

    #[tokio::test]
    async fn late_callbacks_are_stored_but_cannot_reopen_the_run() {
        let app = TestApp::spawn().await;
        let user = app.create_user("alice@example.com").await;
        let run_id = app.start_run(&user).await;
        finish(&app, &user, run_id).await;

        let res = app
            .image_callback(&main_fields(&user, run_id, 3), Some(png_bytes()))
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["status"], "finished");
        assert_eq!(res.body["stale"], true);
        assert!(res.body["image_id"].is_number());
        assert_eq!(app.run_status(&user, run_id).await, "finished");
    }

    #[tokio::test]
    async fn a_late_failure_does_not_turn_a_finished_run_failed() {
        let app = TestApp::spawn().await;
        let user = app.create_user("alice@example.com").await;
        let run_id = app.start_run(&user).await;
        finish(&app, &user, run_id).await;

        let mut fields = main_fields(&user, run_id, 1);
        fields.push(("executed_successfully", "false".into()));
        fields.push(("isrunning", "false".into()));
        let res = app.image_callback(&fields, None).await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["stale"], true);
        assert!(res.body["image_id"].is_null());
        assert_eq!(app.run_status(&user, run_id).await, "finished");
    }

    #[tokio::test]
    async fn terminal_failure_fails_the_run_with_a_placeholder() {
        let app = TestApp::spawn().await;
        let user = app.create_user("alice@example.com").await;
        let run_id = app.start_run(&user).await;

        let mut fields = main_fields(&user, run_id, 2);
        fields.push(("executed_successfully", "0".into()));
        fields.push(("isrunning", "no".into()));
        fields.push(("message", "Generation timed out".into()));
        let res = app.image_callback(&fields, None).await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["status"], "failed");
        assert!(res.body["charged"].is_null());
        assert_eq!(app.balance(&user).await, 10);

        let latest = app.get_as(&user, routes::LATEST_ITEM).await;
        let images = latest.body["images"].as_array().unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0]["position"], 2);
        assert_eq!(images[0]["badge"], "error");

        let feed = app.get_as(&user, &routes::feed_for(run_id)).await;
        let events = feed.body["events"].as_array().unwrap();
        assert!(events.iter().any(|e| e["severity"] == "error"));
        assert!(events.iter().any(|e| e["code"] == "WORKFLOW_FAILED"));
    }

    #[tokio::test]
    async fn non_terminal_failure_keeps_the_run_going() {
        let app = TestApp::spawn().await;
        let user = app.create_user("alice@example.com").await;
        let run_id = app.start_run(&user).await;

        let mut fields = main_fields(&user, run_id, 1);
        fields.push(("executed_successfully", "false".into()));
        let res = app.image_callback(&fields, None).await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["status"], "running");
        assert!(res.body["image_id"].is_null());
    }
}

mod status_texts {
    use super::*;

    #[tokio::test]
    async fn product_texts_land_on_the_note_and_are_charged() {
        let app = TestApp::spawn().await;
        let user = app.create_user("alice@example.com").await;
        let run_id = app.start_run(&user).await;

        let res = app
            .status_callback(&json!({
                "run_id": run_id.to_string(),
                "user_id": user.id,
                "step_type": "text",
                "executed_successfully": "true",
                "product_name": "  Ledersneaker  ",
                "product_description": "Weiches Leder, helle Sohle.",
            }))
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["charged"], 1);

        let latest = app.get_as(&user, routes::LATEST_ITEM).await;
        assert_eq!(latest.body["note"]["product_name"], "Ledersneaker");
        assert_eq!(latest.body["note"]["source"], "n8n");

        let feed = app.get_as(&user, &routes::feed_for(run_id)).await;
        assert_eq!(feed.body["events"][0]["code"], "TEXT_DONE");
    }

    #[tokio::test]
    async fn malformed_ids_are_rejected() {
        let app = TestApp::spawn().await;

        let res = app
            .status_callback(&json!({"run_id": "abc", "user_id": 1}))
            .await;

        assert_eq!(res.status, 400);
    }
}

mod variants {
    use super::*;

    fn variant_fields(
        user: &TestUser,
        run_id: i32,
        badge: &str,
        position: i32,
    ) -> Vec<(&'static str, String)> {
        let step_type = match badge {
            "2k" => "upscale_2k",
            "4k" => "upscale_4k",
            other => other,
        };
        vec![
            ("run_id", run_id.to_string()),
            ("user_id", user.id.to_string()),
            ("step_type", step_type.to_string()),
            ("badge", badge.to_string()),
            ("position", position.to_string()),
            ("isrunning", "false".to_string()),
            ("prompt", "white background".to_string()),
        ]
    }

    #[tokio::test]
    async fn edit_results_wait_in_staging_and_leave_the_run_alone() {
        let app = TestApp::spawn().await;
        let user = app.create_user("alice@example.com").await;
        let run_id = app.start_run(&user).await;
        app.deliver_image(&user, run_id, 1).await;

        let res = app
            .image_callback(&variant_fields(&user, run_id, "edit", 1), Some(png_bytes()))
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert!(res.body["staging_id"].is_number());
        assert!(res.body["image_id"].is_null());
        assert_eq!(res.body["charged"], 2);
        assert_eq!(app.run_status(&user, run_id).await, "running");

        let run = app.get_as(&user, &routes::run(run_id)).await;
        let staging = run.body["staging"].as_array().unwrap();
        assert_eq!(staging.len(), 1);
        assert_eq!(staging[0]["prompt"], "white background");
    }

    #[tokio::test]
    async fn publishing_promotes_the_staged_image_exactly_once() {
        let app = TestApp::spawn().await;
        let user = app.create_user("alice@example.com").await;
        let run_id = app.start_run(&user).await;
        app.deliver_image(&user, run_id, 1).await;
        let staged = app
            .image_callback(&variant_fields(&user, run_id, "edit", 1), Some(png_bytes()))
            .await;
        let staging_id = staged.body["staging_id"].as_i64().unwrap() as i32;

        let res = app
            .post_as(&user, &routes::staging_publish(staging_id), &json!({}))
            .await;
        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["image"]["badge"], "edit");
        assert_eq!(res.body["image"]["position"], 1);

        let again = app
            .post_as(&user, &routes::staging_publish(staging_id), &json!({}))
            .await;
        assert_eq!(again.status, 404);

        let run = app.get_as(&user, &routes::run(run_id)).await;
        assert!(run.body["staging"].as_array().unwrap().is_empty());
        let slot_one: Vec<_> = run.body["images"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|i| i["position"] == 1)
            .collect();
        assert_eq!(slot_one.len(), 1);
        assert_eq!(slot_one[0]["badge"], "edit");
    }

    #[tokio::test]
    async fn discarded_edits_disappear() {
        let app = TestApp::spawn().await;
        let user = app.create_user("alice@example.com").await;
        let run_id = app.start_run(&user).await;
        let staged = app
            .image_callback(&variant_fields(&user, run_id, "edit", 2), Some(png_bytes()))
            .await;
        let staging_id = staged.body["staging_id"].as_i64().unwrap() as i32;

        let res = app.delete_as(&user, &routes::staging(staging_id)).await;
        assert_eq!(res.status, 200, "{}", res.text);

        let publish = app
            .post_as(&user, &routes::staging_publish(staging_id), &json!({}))
            .await;
        assert_eq!(publish.status, 404);
    }

    #[tokio::test]
    async fn staging_of_another_user_is_not_found() {
        let app = TestApp::spawn().await;
        let alice = app.create_user("alice@example.com").await;
        let bob = app.create_user("bob@example.com").await;
        let run_id = app.start_run(&alice).await;
        let staged = app
            .image_callback(&variant_fields(&alice, run_id, "edit", 1), Some(png_bytes()))
            .await;
        let staging_id = staged.body["staging_id"].as_i64().unwrap() as i32;

        let res = app
            .post_as(&bob, &routes::staging_publish(staging_id), &json!({}))
            .await;

        assert_eq!(res.status, 404);
    }

    #[tokio::test]
    async fn upscales_are_published_directly_with_their_badge() {
        let app = TestApp::spawn().await;
        let user = app.create_user("alice@example.com").await;
        let run_id = app.start_run(&user).await;
        app.deliver_image(&user, run_id, 3).await;

        let res = app
            .image_callback(&variant_fields(&user, run_id, "4k", 3), Some(png_bytes()))
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert!(res.body["image_id"].is_number());
        assert_eq!(res.body["charged"], 2);
        assert_eq!(res.body["status"], "running");

        let latest = app.get_as(&user, routes::LATEST_ITEM).await;
        assert_eq!(latest.body["images"][0]["badge"], "4k");
    }

    #[tokio::test]
    async fn variants_without_a_step_type_are_free() {
        let app = TestApp::spawn().await;
        let user = app.create_user("alice@example.com").await;
        let run_id = app.start_run(&user).await;
        app.deliver_image(&user, run_id, 2).await;
        let before = app.balance(&user).await;

        let mut fields = variant_fields(&user, run_id, "2k", 2);
        fields.retain(|(name, _)| *name != "step_type");
        let res = app.image_callback(&fields, Some(png_bytes())).await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert!(res.body["image_id"].is_number());
        assert!(res.body["charged"].is_null());
        assert_eq!(app.balance(&user).await, before);
    }
}
