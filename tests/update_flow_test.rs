use axum::routing::get;
use axum::{Json, Router};
use restage_lib::engine::api::{create_router, ApiState};
use restage_lib::engine::config::Config;
use restage_lib::engine::resolver::UpdateSource;
use restage_lib::engine::stager::Stager;
use std::fs;
use std::sync::Arc;

async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Stub hosting service: a release listing pointing at its own asset
/// download route.
async fn spawn_upstream_with_release(payload: Vec<u8>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let release = serde_json::json!({
        "assets": [{
            "name": "editor.zip",
            "browser_download_url": format!("{}/downloads/editor.zip", base)
        }],
        "zipball_url": format!("{}/zipball", base)
    });
    let app = Router::new()
        .route(
            "/repos/octo/editor/releases/latest",
            get(move || std::future::ready(Json(release.clone()))),
        )
        .route(
            "/downloads/editor.zip",
            get(move || std::future::ready(payload.clone())),
        );

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    base
}

fn service_config(upstream_base: &str) -> Config {
    let mut config = Config::default_for_repo("octo", "editor");
    config.endpoints.api_base = upstream_base.to_string();
    config.endpoints.archive_base = upstream_base.to_string();
    config
}

#[tokio::test]
async fn test_update_staging_flow() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Stub upstream serving a 10 KB release asset
    let upstream = spawn_upstream_with_release(vec![0xAB; 10 * 1024]).await;

    // 2. Service over a fresh project directory
    let project = tempfile::tempdir()?;
    let config = Arc::new(service_config(&upstream));
    let stager = Arc::new(Stager::new(config, project.path()));
    let service = spawn(create_router(ApiState::new(stager.clone()))).await;
    let client = reqwest::Client::new();

    // 3. Nothing staged yet
    let status: serde_json::Value = client
        .get(format!("{}/update/status", service))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(status, serde_json::json!({ "ready": false }));

    // 4. Trigger the download
    let response = client
        .post(format!("{}/update/download", service))
        .send()
        .await?;
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(
        body,
        serde_json::json!({ "ok": true, "message": "Downloaded. Restart to apply." })
    );

    // 5. Staged and ready; marker points at the release asset
    let status: serde_json::Value = client
        .get(format!("{}/update/status", service))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(status, serde_json::json!({ "ready": true }));

    let marker = stager.read_marker()?.expect("marker should exist");
    assert_eq!(marker.source, UpdateSource::Release);
    assert_eq!(marker.url, format!("{}/downloads/editor.zip", upstream));
    assert_eq!(fs::metadata(stager.archive_path())?.len(), 10 * 1024);

    // 6. Clear removes everything
    let response = client
        .post(format!("{}/update/clear", service))
        .send()
        .await?;
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["ok"], true);

    let status: serde_json::Value = client
        .get(format!("{}/update/status", service))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(status, serde_json::json!({ "ready": false }));
    assert!(!stager.archive_path().exists());
    assert!(!stager.marker_path().exists());

    Ok(())
}

#[tokio::test]
async fn test_undersized_download_preserves_previous_staging(
) -> Result<(), Box<dyn std::error::Error>> {
    // 1. Upstream whose "archive" is a 100-byte error-page-sized payload
    let upstream = spawn_upstream_with_release(vec![0x00; 100]).await;

    // 2. A valid update is already staged
    let project = tempfile::tempdir()?;
    let config = Arc::new(service_config(&upstream));
    let stager = Arc::new(Stager::new(config, project.path()));
    fs::create_dir_all(stager.staging_dir())?;
    let previous_archive = vec![0xCD_u8; 2048];
    fs::write(stager.archive_path(), &previous_archive)?;
    fs::write(
        stager.marker_path(),
        r#"{ "downloaded_at": "2026-08-01T00:00:00Z", "source": "archive", "url": "https://example.test/previous.zip" }"#,
    )?;

    let service = spawn(create_router(ApiState::new(stager.clone()))).await;
    let client = reqwest::Client::new();

    // 3. The new download fails the size check
    let response = client
        .post(format!("{}/update/download", service))
        .send()
        .await?;
    assert_eq!(
        response.status(),
        reqwest::StatusCode::INTERNAL_SERVER_ERROR
    );
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["ok"], false);
    assert!(body["error"].as_str().unwrap().contains("too small"));

    // 4. The previously staged pair is untouched and still consistent
    let status: serde_json::Value = client
        .get(format!("{}/update/status", service))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(status, serde_json::json!({ "ready": true }));
    assert_eq!(fs::read(stager.archive_path())?, previous_archive);
    let marker = stager.read_marker()?.expect("marker should exist");
    assert_eq!(marker.url, "https://example.test/previous.zip");

    Ok(())
}

#[tokio::test]
async fn test_branch_archive_fallback_flow() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Upstream with no published releases, only the branch archive
    let payload = vec![0xEF_u8; 10 * 1024];
    let app = Router::new().route(
        "/octo/editor/archive/refs/heads/main.zip",
        get(move || std::future::ready(payload.clone())),
    );
    let upstream = spawn(app).await;

    // 2. Download through the service
    let project = tempfile::tempdir()?;
    let config = Arc::new(service_config(&upstream));
    let stager = Arc::new(Stager::new(config, project.path()));
    let service = spawn(create_router(ApiState::new(stager.clone()))).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/update/download", service))
        .send()
        .await?;
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    // 3. Marker records the archive fallback
    let marker = stager.read_marker()?.expect("marker should exist");
    assert_eq!(marker.source, UpdateSource::Archive);
    assert_eq!(
        marker.url,
        format!("{}/octo/editor/archive/refs/heads/main.zip", upstream)
    );

    Ok(())
}
