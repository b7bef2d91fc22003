//! Image lifecycle tests: the catalog row and its object appear and
//! disappear together, including when one of the stores fails.

mod common;

use common::{PNG_BYTES, TestApp};
use reqwest::{StatusCode, header};
use std::{path::Path, time::Duration};

/// Count stored payloads (sidecars and temp files excluded) under `root`.
fn payload_files(root: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(root) else {
        return 0;
    };
    entries
        .flatten()
        .map(|entry| {
            let path = entry.path();
            if path.is_dir() {
                payload_files(&path)
            } else {
                let name = entry.file_name().to_string_lossy().to_string();
                usize::from(!name.ends_with(".content-type") && !name.starts_with(".tmp-"))
            }
        })
        .sum()
}

#[tokio::test]
async fn uploaded_bytes_are_served_through_the_signed_url() {
    let app = TestApp::spawn().await;
    let session = app.signed_in().await;
    let (id, key) = app.upload_png(&session, "sunset").await;
    assert!(key.starts_with("images/"));
    assert!(key.ends_with(".png"));
    assert!(app.object_exists(&key).await);

    let resp = app.get(&session, &format!("/image/{}", id)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["name"], "sunset");
    assert_eq!(body["category_id"], 1);
    assert_eq!(body["object_key"], key.as_str());

    // the link itself is the credential; no cookie needed
    let url = body["url"].as_str().unwrap();
    let object = app.client.get(url).send().await.unwrap();
    assert_eq!(object.status(), StatusCode::OK);
    assert_eq!(object.headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(object.bytes().await.unwrap().as_ref(), PNG_BYTES);
}

#[tokio::test]
async fn upload_rejects_unsupported_content_types() {
    let app = TestApp::spawn().await;
    let session = app.signed_in().await;

    let resp = app
        .upload(&session, "notes", "1", "notes.txt", "text/plain", b"hello")
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.image_count().await, 0);
    assert_eq!(payload_files(&app.dir.path().join("objects")), 0);
}

#[tokio::test]
async fn upload_rejects_non_numeric_category() {
    let app = TestApp::spawn().await;
    let session = app.signed_in().await;

    let resp = app
        .upload(&session, "sunset", "landscape", "a.png", "image/png", PNG_BYTES)
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.image_count().await, 0);
}

#[tokio::test]
async fn failed_object_put_leaves_no_row() {
    let app = TestApp::spawn().await;
    let session = app.signed_in().await;
    app.store.fail_puts(true);

    let resp = app
        .upload(&session, "sunset", "1", "a.png", "image/png", PNG_BYTES)
        .await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], 500);
    assert!(!body["error"].as_str().unwrap().contains("injected"));

    assert_eq!(app.image_count().await, 0);
}

#[tokio::test]
async fn failed_commit_removes_the_uploaded_object() {
    let app = TestApp::spawn().await;
    let session = app.signed_in().await;

    // category 999 does not exist; the deferred foreign key fails the commit
    let resp = app
        .upload(&session, "sunset", "999", "a.png", "image/png", PNG_BYTES)
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    assert_eq!(app.image_count().await, 0);
    assert_eq!(payload_files(&app.dir.path().join("objects")), 0);
}

#[tokio::test]
async fn retain_policy_leaves_the_orphan_in_place() {
    let app = TestApp::spawn_with(&[("CATALOG_ORPHAN_POLICY", "retain")]).await;
    let session = app.signed_in().await;

    let resp = app
        .upload(&session, "sunset", "999", "a.png", "image/png", PNG_BYTES)
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    assert_eq!(app.image_count().await, 0);
    assert_eq!(payload_files(&app.dir.path().join("objects")), 1);
}

#[tokio::test]
async fn failed_object_delete_restores_the_row() {
    let app = TestApp::spawn().await;
    let session = app.signed_in().await;
    let (id, key) = app.upload_png(&session, "sunset").await;

    app.store.fail_deletes(true);
    let resp = app.delete(&session, &format!("/imgdel/{}", id)).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let resp = app.get(&session, &format!("/image/{}", id)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(app.object_exists(&key).await);

    app.store.fail_deletes(false);
    let resp = app.delete(&session, &format!("/imgdel/{}", id)).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app.get(&session, &format!("/image/{}", id)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(!app.object_exists(&key).await);
}

#[tokio::test]
async fn deleting_a_missing_image_is_not_found() {
    let app = TestApp::spawn().await;
    let session = app.signed_in().await;

    let resp = app.delete(&session, "/imgdel/4242").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], 404);
}

#[tokio::test]
async fn update_waits_for_an_in_flight_delete() {
    let app = TestApp::spawn().await;
    let session = app.signed_in().await;
    let (id, key) = app.upload_png(&session, "sunset").await;

    // the delete holds the row lock while the object delete is slow
    app.store.delay_deletes(Duration::from_millis(400));
    let delete_path = format!("/imgdel/{}", id);
    let (deleted, updated) = tokio::join!(
        app.delete(&session, &delete_path),
        async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            app.update_form(&session, id, &[("name", "renamed")]).await
        }
    );

    assert_eq!(deleted.status(), StatusCode::OK);
    assert_eq!(updated.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.image_count().await, 0);
    assert!(!app.object_exists(&key).await);
}

#[tokio::test]
async fn concurrent_updates_apply_whole_patches() {
    let app = TestApp::spawn().await;
    let session = app.signed_in().await;
    let (id, key) = app.upload_png(&session, "sunset").await;

    let updates = (0..6).map(|i| {
        let name = format!("name-{}", i);
        let description = format!("description-{}", i);
        let app = &app;
        let session = &session;
        async move {
            app.update_form(
                session,
                id,
                &[("name", name.as_str()), ("description", description.as_str())],
            )
            .await
        }
    });
    for resp in futures::future::join_all(updates).await {
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let resp = app.get(&session, &format!("/image/{}", id)).await;
    let body: serde_json::Value = resp.json().await.unwrap();
    let name = body["name"].as_str().unwrap();
    let description = body["description"].as_str().unwrap();
    assert_eq!(
        name.trim_start_matches("name-"),
        description.trim_start_matches("description-")
    );
    assert_eq!(body["object_key"], key.as_str());
}

#[tokio::test]
async fn partial_update_touches_only_supplied_fields() {
    let app = TestApp::spawn().await;
    let session = app.signed_in().await;
    let (id, key) = app.upload_png(&session, "sunset").await;

    let resp = app
        .update_form(&session, id, &[("description", "golden hour")])
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["id"], id);
    assert_eq!(body["name"], "sunset");
    assert_eq!(body["category_id"], 1);
    assert_eq!(body["description"], "golden hour");
    assert_eq!(body["object_key"], key.as_str());

    // multipart bodies are accepted too
    let form = reqwest::multipart::Form::new().text("name", "dusk");
    let resp = app
        .client
        .put(app.url(&format!("/imgupd/{}", id)))
        .header(header::COOKIE, session.header())
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["name"], "dusk");
    assert_eq!(body["description"], "golden hour");
}

#[tokio::test]
async fn invalid_updates_are_rejected_without_changes() {
    let app = TestApp::spawn().await;
    let session = app.signed_in().await;
    let (id, _) = app.upload_png(&session, "sunset").await;

    let empty = app.update_form(&session, id, &[]).await;
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

    let blank = app
        .update_form(&session, id, &[("name", ""), ("description", "")])
        .await;
    assert_eq!(blank.status(), StatusCode::BAD_REQUEST);

    let bad_category = app.update_form(&session, id, &[("category_id", "abc")]).await;
    assert_eq!(bad_category.status(), StatusCode::BAD_REQUEST);

    let unknown_category = app.update_form(&session, id, &[("category_id", "999")]).await;
    assert_eq!(unknown_category.status(), StatusCode::BAD_REQUEST);

    let missing = app.update_form(&session, 4242, &[("name", "x")]).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let resp = app.get(&session, &format!("/image/{}", id)).await;
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["name"], "sunset");
    assert_eq!(body["category_id"], 1);
}

#[tokio::test]
async fn listing_resolves_category_names_and_signs_urls() {
    let app = TestApp::spawn().await;
    let session = app.signed_in().await;
    app.upload_png(&session, "first").await;
    app.upload_png(&session, "second").await;

    let resp = app.get(&session, "/images").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Vec<serde_json::Value> = resp.json().await.unwrap();
    assert_eq!(body.len(), 2);
    for item in &body {
        assert_eq!(item["category"], "General");
        let url = item["url"].as_str().unwrap();
        assert!(url.contains("/objects/images/"));
        assert!(url.contains("signature="));
    }
}

#[tokio::test]
async fn listing_skips_rows_outside_the_image_prefix() {
    let app = TestApp::spawn().await;
    let session = app.signed_in().await;
    app.upload_png(&session, "first").await;

    for key in ["uploads/legacy.png", "imagesX/legacy.png"] {
        sqlx::query(
            "INSERT INTO images (name, category_id, description, object_key) VALUES (?, 1, '', ?)",
        )
        .bind("legacy")
        .bind(key)
        .execute(&*app.state.assets.metadata().db)
        .await
        .unwrap();
    }
    assert_eq!(app.image_count().await, 3);

    let resp = app.get(&session, "/images").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Vec<serde_json::Value> = resp.json().await.unwrap();
    let names: Vec<&str> = body.iter().map(|i| i["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["first"]);
}

#[tokio::test]
async fn oversized_upload_is_payload_too_large() {
    let app = TestApp::spawn_with(&[("CATALOG_MAX_UPLOAD_BYTES", "1024")]).await;
    let session = app.signed_in().await;

    let resp = app
        .upload(&session, "huge", "1", "huge.png", "image/png", &vec![0u8; 4096])
        .await;
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(app.image_count().await, 0);
}

#[tokio::test]
async fn tampered_or_expired_links_are_forbidden() {
    let app = TestApp::spawn().await;
    let session = app.signed_in().await;
    let (id, key) = app.upload_png(&session, "sunset").await;

    let resp = app.get(&session, &format!("/image/{}", id)).await;
    let body: serde_json::Value = resp.json().await.unwrap();
    let url = body["url"].as_str().unwrap().to_string();

    let (prefix, signature) = url.rsplit_once("signature=").unwrap();
    let flipped = if signature.starts_with('0') { "1" } else { "0" };
    let tampered = format!("{}signature={}{}", prefix, flipped, &signature[1..]);
    let resp = app.client.get(tampered).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let unsigned = app.client.get(app.url(&format!("/objects/{}", key))).send().await.unwrap();
    assert_eq!(unsigned.status(), StatusCode::FORBIDDEN);

    let local = app.state.local_objects.as_ref().unwrap();
    let expired = local.link(&key, chrono::Utc::now().timestamp() - 5);
    let resp = app.client.get(expired).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}
