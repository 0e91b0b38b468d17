//! Integration tests for the association resolver against a stub
//! directory service.

use ambient_context_agent::{AssociationResolver, StoryOptions, StorySource, TwinOptions};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Shared state for the stub directory service.
struct StubState {
    base_url: String,
    association_requests: AtomicUsize,
    story_requests: AtomicUsize,
    flaky_attempts: AtomicUsize,
}

/// Start a stub directory service on a random port.
async fn spawn_stub() -> anyhow::Result<(String, Arc<StubState>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let base_url = format!("http://{}", listener.local_addr()?);

    let state = Arc::new(StubState {
        base_url: base_url.clone(),
        association_requests: AtomicUsize::new(0),
        story_requests: AtomicUsize::new(0),
        flaky_attempts: AtomicUsize::new(0),
    });

    let app = Router::new()
        .route("/associations/*signature", get(associations))
        .route("/context/device/*signature", get(device_context))
        .route("/story.json", get(story_json))
        .route("/story.html", get(story_html))
        .with_state(state.clone());

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("stub server failed");
    });

    Ok((base_url, state))
}

async fn associations(
    State(stub): State<Arc<StubState>>,
    Path(signature): Path<String>,
) -> Response {
    stub.association_requests.fetch_add(1, Ordering::SeqCst);

    match signature.as_str() {
        "aabbccddeeff/2" => Json(json!({
            "associations": { "aabbccddeeff/2": { "tags": ["chair"] } }
        }))
        .into_response(),

        // Legacy envelope, with a story hosted by this stub.
        "legacy/2" => Json(json!({
            "devices": {
                "legacy/2": { "url": format!("{}/story.json", stub.base_url) }
            }
        }))
        .into_response(),

        // Slow enough that two concurrent callers overlap.
        "slow/2" => {
            tokio::time::sleep(Duration::from_millis(150)).await;
            Json(json!({
                "associations": { "slow/2": { "tags": ["desk"] } }
            }))
            .into_response()
        }

        // The directory answers with the canonical EUI-64 signature.
        "0a1b2c3d4e5f/2" => Json(json!({
            "associations": {
                "0a1b2c3d4e5f6789/1": { "directory": "parc:lab" }
            }
        }))
        .into_response(),

        // Fails on the first attempt only.
        "flaky/2" => {
            if stub.flaky_attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                StatusCode::NOT_FOUND.into_response()
            } else {
                Json(json!({
                    "associations": { "flaky/2": { "tags": ["room"] } }
                }))
                .into_response()
            }
        }

        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn device_context(
    State(_stub): State<Arc<StubState>>,
    Path(signature): Path<String>,
) -> Response {
    if signature == "aabbccddeeff/2" {
        let mut devices = serde_json::Map::new();
        devices.insert(
            signature,
            json!({
                "nearest": [ { "device": "e50000000001/3", "rssi": -62 } ],
                "statid": { "uri": "https://sniffypedia.org/Product/b" }
            }),
        );
        Json(json!({ "devices": devices })).into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

async fn story_json(State(stub): State<Arc<StubState>>) -> Response {
    stub.story_requests.fetch_add(1, Ordering::SeqCst);
    Json(json!({ "stories": { "abc": { "title": "X" } } })).into_response()
}

async fn story_html(State(stub): State<Arc<StubState>>) -> Response {
    stub.story_requests.fetch_add(1, Ordering::SeqCst);
    let html = r#"<html><head>
        <script type="application/ld+json">{"title": "Y"}</script>
        </head><body>A device page</body></html>"#;
    ([(header::CONTENT_TYPE, "text/html")], html.to_string()).into_response()
}

#[tokio::test]
async fn test_associations_resolution_and_caching() -> anyhow::Result<()> {
    let (base_url, stub) = spawn_stub().await?;
    let resolver = AssociationResolver::new(base_url.as_str());

    let associations = resolver
        .resolve_associations("aabbccddeeff/2")
        .await
        .expect("associations should resolve");
    assert!(associations.has_tag("chair"));

    // Second resolution must come from the cache.
    let again = resolver.resolve_associations("aabbccddeeff/2").await;
    assert_eq!(again, Some(associations.clone()));
    assert_eq!(resolver.cached_associations("aabbccddeeff/2"), Some(associations));
    assert_eq!(stub.association_requests.load(Ordering::SeqCst), 1);

    Ok(())
}

#[tokio::test]
async fn test_concurrent_resolution_coalesces_to_one_request() -> anyhow::Result<()> {
    let (base_url, stub) = spawn_stub().await?;
    let resolver = AssociationResolver::new(base_url.as_str());

    let (first, second) = tokio::join!(
        resolver.resolve_associations("slow/2"),
        resolver.resolve_associations("slow/2"),
    );

    assert!(first.is_some());
    assert_eq!(first, second);
    assert_eq!(stub.association_requests.load(Ordering::SeqCst), 1);

    Ok(())
}

#[tokio::test]
async fn test_canonical_signature_is_cached_too() -> anyhow::Result<()> {
    let (base_url, stub) = spawn_stub().await?;
    let resolver = AssociationResolver::new(base_url.as_str());

    let associations = resolver
        .resolve_associations("0a1b2c3d4e5f/2")
        .await
        .expect("associations should resolve");
    assert_eq!(associations.directory.as_deref(), Some("parc:lab"));

    // The canonical signature returned by the directory is cached without
    // a further request.
    let canonical = resolver.resolve_associations("0a1b2c3d4e5f6789/1").await;
    assert_eq!(canonical, Some(associations));
    assert_eq!(stub.association_requests.load(Ordering::SeqCst), 1);

    Ok(())
}

#[tokio::test]
async fn test_failures_are_not_cached() -> anyhow::Result<()> {
    let (base_url, stub) = spawn_stub().await?;
    let resolver = AssociationResolver::new(base_url.as_str());

    assert!(resolver.resolve_associations("flaky/2").await.is_none());

    let recovered = resolver
        .resolve_associations("flaky/2")
        .await
        .expect("second attempt should succeed");
    assert!(recovered.has_tag("room"));
    assert_eq!(stub.association_requests.load(Ordering::SeqCst), 2);

    Ok(())
}

#[tokio::test]
async fn test_story_envelope_and_cache_bypass() -> anyhow::Result<()> {
    let (base_url, stub) = spawn_stub().await?;
    let resolver = AssociationResolver::new(base_url.as_str());
    let story_url = format!("{base_url}/story.json");

    let (story, source) = resolver
        .resolve_story(&story_url, StoryOptions::default())
        .await
        .expect("story should resolve");
    assert_eq!(story.title(), Some("X"));
    assert_eq!(source, StorySource::Network);

    let (cached, source) = resolver
        .resolve_story(&story_url, StoryOptions::default())
        .await
        .expect("cached story should resolve");
    assert_eq!(cached, story);
    assert_eq!(source, StorySource::Cache);
    assert_eq!(resolver.cached_story(&story_url), Some(story));
    assert_eq!(stub.story_requests.load(Ordering::SeqCst), 1);

    let (_, source) = resolver
        .resolve_story(&story_url, StoryOptions { force_refetch: true })
        .await
        .expect("refetched story should resolve");
    assert_eq!(source, StorySource::Network);
    assert_eq!(stub.story_requests.load(Ordering::SeqCst), 2);

    Ok(())
}

#[tokio::test]
async fn test_story_extraction_from_html_page() -> anyhow::Result<()> {
    let (base_url, _stub) = spawn_stub().await?;
    let resolver = AssociationResolver::new(base_url.as_str());

    let (story, _) = resolver
        .resolve_story(&format!("{base_url}/story.html"), StoryOptions::default())
        .await
        .expect("embedded story should resolve");
    assert_eq!(story.title(), Some("Y"));

    Ok(())
}

#[tokio::test]
async fn test_digital_twin_without_url_skips_story_fetch() -> anyhow::Result<()> {
    let (base_url, stub) = spawn_stub().await?;
    let resolver = AssociationResolver::new(base_url.as_str());

    let twin = resolver
        .resolve_digital_twin("aabbccddeeff/2", TwinOptions::default())
        .await
        .expect("twin should resolve");

    assert!(twin.associations.has_tag("chair"));
    assert!(twin.story.is_none());
    assert_eq!(stub.story_requests.load(Ordering::SeqCst), 0);

    Ok(())
}

#[tokio::test]
async fn test_digital_twin_with_story() -> anyhow::Result<()> {
    let (base_url, stub) = spawn_stub().await?;
    let resolver = AssociationResolver::new(base_url.as_str());

    let twin = resolver
        .resolve_digital_twin("legacy/2", TwinOptions::default())
        .await
        .expect("twin should resolve");

    let story = twin.story.as_ref().expect("story should be attached");
    assert_eq!(story.title(), Some("X"));
    assert_eq!(twin.title(), Some("X"));

    // A repeat resolution is served entirely from the caches.
    let again = resolver
        .resolve_digital_twin("legacy/2", TwinOptions::default())
        .await;
    assert_eq!(again, Some(twin));
    assert_eq!(stub.association_requests.load(Ordering::SeqCst), 1);
    assert_eq!(stub.story_requests.load(Ordering::SeqCst), 1);

    Ok(())
}

#[tokio::test]
async fn test_device_context_lookup() -> anyhow::Result<()> {
    let (base_url, _stub) = spawn_stub().await?;
    let resolver = AssociationResolver::new(base_url.as_str());

    let context = resolver
        .resolve_context("aabbccddeeff/2")
        .await
        .expect("context should resolve");
    assert_eq!(context.nearest_device(), Some("e50000000001/3"));
    assert_eq!(
        context.story_url(),
        Some("https://sniffypedia.org/Product/b")
    );

    // Context is dynamic data: unknown devices simply resolve to nothing.
    assert!(resolver.resolve_context("unknown/2").await.is_none());

    Ok(())
}
