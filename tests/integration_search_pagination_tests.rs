//! Integration tests for search pagination, tag intersection and directory
//! listing through the HTTP surface.

mod common;

use axum::http::StatusCode;
use imghub::{
    build_app,
    metadata::{MemoryMetadataStore, MetadataStore},
    models::Channel,
    storage::{memory::MemoryChannel, ChannelRegistry},
    test_helpers::{create_test_config, RecordingStore, TestContext},
    AppState,
};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

use common::{file_names, get, post};

#[tokio::test]
async fn test_pages_concatenate_to_the_full_result() {
    let ctx = TestContext::new();
    ctx.seed_files(&["p1.jpg", "p2.jpg", "p3.jpg", "p4.jpg", "p5.jpg"]).await;
    let app = ctx.app();

    let (status, page) = get(&app, "/api/manage/search?q=p&start=2&count=2&sortBy=name").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(file_names(&page), vec!["p3.jpg", "p4.jpg"]);
    assert_eq!(page["total"], 5);
    assert_eq!(page["count"], 2);
    assert_eq!(page["hasMore"], true);

    let (_, last) = get(&app, "/api/manage/search?q=p&start=4&count=2&sortBy=name").await;
    assert_eq!(file_names(&last), vec!["p5.jpg"]);
    assert_eq!(last["hasMore"], false);

    let (_, beyond) = get(&app, "/api/manage/search?q=p&start=9&count=2").await;
    assert!(file_names(&beyond).is_empty());
    assert_eq!(beyond["total"], 5);

    let mut seen = Vec::new();
    for start in (0..5).step_by(2) {
        let (_, page) = get(&app, &format!("/api/manage/search?q=p&start={}&count=2&sortBy=name&sortOrder=desc", start)).await;
        seen.extend(file_names(&page));
    }
    assert_eq!(seen, vec!["p5.jpg", "p4.jpg", "p3.jpg", "p2.jpg", "p1.jpg"]);
}

#[tokio::test]
async fn test_text_search_requires_a_query() {
    let ctx = TestContext::new();
    let app = ctx.app();

    let (status, body) = get(&app, "/api/manage/search").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Search query is required");
}

#[tokio::test]
async fn test_tag_scenario_end_to_end() {
    let ctx = TestContext::new();
    ctx.seed_files(&["x.jpg", "y.jpg", "z.jpg"]).await;
    let app = ctx.app();

    let (status, created) = post(
        &app,
        "/api/manage/tags",
        json!({"name": "Important", "color": "#F56C6C"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let tag_id = created["tag"]["id"].as_str().unwrap().to_string();

    let (status, batch) = post(
        &app,
        "/api/manage/batch/tags/add",
        json!({"fileIds": ["x.jpg", "y.jpg"], "tagIds": [tag_id]}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(batch["results"]["successCount"], 2);
    assert_eq!(batch["results"]["totalTags"], 1);

    let (status, found) = get(&app, &format!("/api/manage/search/tags?tags={}", tag_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found["total"], 2);
    let names: HashSet<String> = file_names(&found).into_iter().collect();
    assert_eq!(names, HashSet::from(["x.jpg".to_string(), "y.jpg".to_string()]));

    // tags may also be named, case-insensitively
    let (_, by_name) = get(&app, "/api/manage/search/tags?tags=important").await;
    assert_eq!(by_name["total"], 2);

    let (_, tags) = get(&app, "/api/manage/tags").await;
    assert_eq!(tags["tags"][0]["fileCount"], 2);
}

#[tokio::test]
async fn test_tag_intersection_and_missing_tags() {
    let ctx = TestContext::new();
    ctx.seed_files(&["a.jpg", "b.jpg", "c.jpg"]).await;
    let app = ctx.app();

    let mut ids = Vec::new();
    for name in ["A", "B", "Empty"] {
        let (_, body) = post(&app, "/api/manage/tags", json!({"name": name, "color": "#000"})).await;
        ids.push(body["tag"]["id"].as_str().unwrap().to_string());
    }
    post(&app, "/api/manage/batch/tags/add", json!({"fileIds": ["a.jpg", "b.jpg"], "tagIds": [ids[0]]})).await;
    post(&app, "/api/manage/batch/tags/add", json!({"fileIds": ["b.jpg", "c.jpg"], "tagIds": [ids[1]]})).await;

    let (_, both) = get(&app, &format!("/api/manage/search/tags?tags={},{}", ids[0], ids[1])).await;
    assert_eq!(file_names(&both), vec!["b.jpg"]);

    let (_, empty) = get(&app, &format!("/api/manage/search/tags?tags={},{}", ids[2], ids[0])).await;
    assert_eq!(empty["total"], 0);

    let (_, unknown) = get(&app, "/api/manage/search/tags?tags=tag_unknown").await;
    assert_eq!(unknown["total"], 0);

    let (status, body) = get(&app, "/api/manage/search/tags").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Tags parameter is required");
}

#[tokio::test]
async fn test_directory_listing() {
    let ctx = TestContext::new();
    ctx.seed_files(&["top.jpg", "trip/beach.jpg", "trip/day2/sunset.png"]).await;
    let app = ctx.app();
    post(&app, "/api/manage/folders/create", json!({"name": "empty", "path": "/trip"})).await;

    let (status, root) = get(&app, "/api/manage/list").await;
    assert_eq!(status, StatusCode::OK);
    // directories come first
    assert_eq!(file_names(&root), vec!["trip", "top.jpg"]);
    assert_eq!(root["directories"], json!(["trip"]));

    let (_, trip) = get(&app, "/api/manage/list?dir=trip").await;
    assert_eq!(file_names(&trip), vec!["trip/day2", "trip/empty", "trip/beach.jpg"]);
    assert_eq!(trip["files"][0]["isDirectory"], true);
    assert_eq!(trip["directories"], json!(["trip/day2", "trip/empty"]));

    let (_, recursive) = get(&app, "/api/manage/list?dir=trip&recursive=true&sortBy=name").await;
    assert_eq!(
        file_names(&recursive),
        vec!["trip/day2", "trip/empty", "trip/beach.jpg", "trip/day2/sunset.png"]
    );
}

#[tokio::test]
async fn test_empty_tag_short_circuits_without_touching_files() {
    let recorder = Arc::new(RecordingStore::new(Arc::new(MemoryMetadataStore::new())));
    let channels = ChannelRegistry::new().with_object_store(Arc::new(MemoryChannel::object_store()));
    let state = Arc::new(AppState::new(
        create_test_config(),
        recorder.clone() as Arc<dyn MetadataStore>,
        channels,
    ));
    let files = state.file_service();
    for path in ["a.jpg", "b.jpg"] {
        files.store_file(path, b"x", Channel::ObjectStore, None).await.unwrap();
    }
    let app = build_app(state);

    let (_, empty) = post(&app, "/api/manage/tags", json!({"name": "Empty", "color": "#000"})).await;
    let (_, full) = post(&app, "/api/manage/tags", json!({"name": "Full", "color": "#fff"})).await;
    let empty_id = empty["tag"]["id"].as_str().unwrap().to_string();
    let full_id = full["tag"]["id"].as_str().unwrap().to_string();
    post(&app, "/api/manage/batch/tags/add", json!({"fileIds": ["a.jpg", "b.jpg"], "tagIds": [full_id]})).await;

    recorder.reset();
    let (status, body) = get(&app, &format!("/api/manage/search/tags?tags={},{}", empty_id, full_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 0);
    assert!(recorder.listings().is_empty(), "listed {:?}", recorder.listings());
    assert!(recorder.file_reads().is_empty(), "read {:?}", recorder.file_reads());
}

#[tokio::test]
async fn test_oversized_tag_list_is_rejected() {
    let ctx = TestContext::new();
    ctx.seed_files(&["x.jpg"]).await;
    let app = ctx.app();

    let mut ids = Vec::new();
    for i in 0..51 {
        let (_, body) = post(&app, "/api/manage/tags", json!({"name": format!("t{}", i), "color": "#000"})).await;
        ids.push(body["tag"]["id"].as_str().unwrap().to_string());
    }
    let first_fifty = ids[..50].to_vec();
    post(&app, "/api/manage/batch/tags/add", json!({"fileIds": ["x.jpg"], "tagIds": first_fifty})).await;

    let (status, body) = get(&app, &format!("/api/manage/search/tags?tags={}", ids.join(","))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Too many tags"));

    // the first fifty still intersect to the one file
    let (status, body) = get(&app, &format!("/api/manage/search/tags?tags={}", first_fifty.join(","))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
}
