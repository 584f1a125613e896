//! Runs in its own test binary: it changes the process working directory.

use std::path::PathBuf;
use std::time::Duration;

use axum::Router;
use axum::routing::get;
use crtm_poll::fetch::StopTimesEndpoint;
use crtm_poll::{FetchConfig, StopTimesFetcher};
use tempfile::tempdir;

const PATH: &str = "/widgets/api/GetStopsTimes.php";

async fn serve() -> StopTimesFetcher {
    let app = Router::new().route(PATH, get(|| async { "test" }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let endpoint = StopTimesEndpoint::new(&format!("http://{addr}{PATH}")).unwrap();
    StopTimesFetcher::with_endpoint(endpoint)
}

fn entries(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_audit_files_only_appear_when_configured() {
    let fetcher = serve().await;
    let dir = tempdir().unwrap();
    std::env::set_current_dir(dir.path()).unwrap();

    let config = FetchConfig::new(None, Duration::from_secs(10), 2);
    let (responses, _) = fetcher.batch(&["8_1", "8_2", "8_3"], &config).await.unwrap();
    fetcher.single("8_4", &config).await.unwrap();

    assert_eq!(responses.len(), 3);
    assert!(entries(dir.path()).is_empty());

    // A relative log path lands in the same directory, so the check above can see it.
    let config = FetchConfig::new(Some(PathBuf::from("fetch_log")), Duration::from_secs(10), 2);
    fetcher.batch(&["8_1"], &config).await.unwrap();

    assert_eq!(entries(dir.path()), ["fetch_log", "fetch_log.lock"]);
}
