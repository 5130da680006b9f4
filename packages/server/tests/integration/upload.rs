use crate::common::{TestApp, png_bytes, routes};

#[tokio::test]
async fn upload_creates_a_pending_run_and_logs_it() {
    let app = TestApp::spawn().await;
    let user = app.create_user("alice@example.com").await;

    let res = app.upload_as(&user, "shoe.png", png_bytes(), None).await;

    assert_eq!(res.status, 200, "{}", res.text);
    assert_eq!(res.body["user_id"], user.id);
    assert_eq!(res.body["name"], "shoe.png");
    let run_id = res.body["run_id"].as_i64().unwrap() as i32;
    assert!(res.body["url"].as_str().unwrap().starts_with("/uploads/"));

    assert_eq!(app.run_status(&user, run_id).await, "pending");

    let feed = app.get_as(&user, &routes::feed_for(run_id)).await;
    let codes: Vec<&str> = feed.body["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["code"].as_str().unwrap())
        .collect();
    assert!(codes.contains(&"UPLOAD_RECEIVED"), "{codes:?}");
}

#[tokio::test]
async fn uploads_are_served_under_their_public_url() {
    let app = TestApp::spawn().await;
    let user = app.create_user("alice@example.com").await;

    let res = app.upload_as(&user, "shoe.png", png_bytes(), None).await;
    let url = res.body["url"].as_str().unwrap().to_string();

    let served = reqwest::get(app.url(&url)).await.unwrap();
    assert_eq!(served.status(), 200);
    assert_eq!(served.bytes().await.unwrap().to_vec(), png_bytes());
}

#[tokio::test]
async fn further_uploads_join_the_pending_run() {
    let app = TestApp::spawn().await;
    let user = app.create_user("alice@example.com").await;

    let first = app.upload_image(&user).await;
    let second = app.upload_image(&user).await;
    assert_eq!(first, second);

    let run = app.get_as(&user, &routes::run(first)).await;
    assert_eq!(run.body["uploads"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn uploads_announce_themselves_to_the_engine() {
    let app = TestApp::spawn().await;
    let user = app.create_user("alice@example.com").await;

    let run_id = app.upload_image(&user).await;

    let intakes = app.engine.intakes.lock().unwrap();
    assert_eq!(intakes.len(), 1);
    assert_eq!(intakes[0].run_id, run_id);
    assert_eq!(intakes[0].user_id, user.id);
}

#[tokio::test]
async fn a_started_run_accepts_no_more_uploads() {
    let app = TestApp::spawn().await;
    let user = app.create_user("alice@example.com").await;
    let run_id = app.start_run(&user).await;

    let res = app
        .upload_as(&user, "late.png", png_bytes(), Some(run_id))
        .await;
    assert_eq!(res.status, 409);
    assert_eq!(res.code(), "CONFLICT");

    // Without an explicit run a fresh one is opened instead.
    let fresh = app.upload_image(&user).await;
    assert_ne!(fresh, run_id);
}

#[tokio::test]
async fn non_images_are_rejected() {
    let app = TestApp::spawn().await;
    let user = app.create_user("alice@example.com").await;

    let res = app
        .upload_as(&user, "notes.txt", b"just some text".to_vec(), None)
        .await;

    assert_eq!(res.status, 400);
    assert_eq!(res.code(), "VALIDATION_ERROR");
}

#[tokio::test]
async fn content_must_match_the_extension() {
    let app = TestApp::spawn().await;
    let user = app.create_user("alice@example.com").await;

    let res = app.upload_as(&user, "photo.jpg", png_bytes(), None).await;

    assert_eq!(res.status, 400);
    assert_eq!(res.code(), "VALIDATION_ERROR");
}

#[tokio::test]
async fn oversized_images_are_rejected() {
    let app = TestApp::spawn().await;
    let user = app.create_user("alice@example.com").await;
    let mut data = png_bytes();
    data.resize(64 * 1024 + 1, 0);

    let res = app.upload_as(&user, "huge.png", data, None).await;

    assert_eq!(res.status, 400);
    assert_eq!(res.code(), "VALIDATION_ERROR");
}

#[tokio::test]
async fn foreign_runs_are_not_found() {
    let app = TestApp::spawn().await;
    let alice = app.create_user("alice@example.com").await;
    let bob = app.create_user("bob@example.com").await;
    let run_id = app.upload_image(&alice).await;

    let res = app.upload_as(&bob, "shoe.png", png_bytes(), Some(run_id)).await;

    assert_eq!(res.status, 404);
}

#[tokio::test]
async fn upload_requires_csrf() {
    let app = TestApp::spawn().await;
    let user = app.create_user("alice@example.com").await;

    let form = reqwest::multipart::Form::new().part(
        "image",
        reqwest::multipart::Part::bytes(png_bytes()).file_name("shoe.png"),
    );
    let res = user
        .client
        .post(app.url(routes::UPLOAD))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 403);
}
