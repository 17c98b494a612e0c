use crate::utils::write_atomic;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

const ICON_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Disk-backed, write-once cache of SVG icons
///
/// Icons are fetched from a fixed external repository the first time they are
/// requested and served from disk afterwards. Failed fetches are not recorded,
/// so a transient outage is retried on the next request.
pub struct IconCache {
    dir: PathBuf,
    source: String,
    client: reqwest::Client,
}

impl IconCache {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, source: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            dir: dir.into(),
            source: source.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// SVG bytes for `slug`, or `None` if the slug is invalid or the icon
    /// cannot be resolved.
    pub async fn get(&self, slug: &str) -> Option<Vec<u8>> {
        if !is_valid_slug(slug) {
            debug!("Rejecting icon slug {slug:?}");
            return None;
        }

        let path = self.dir.join(format!("{slug}.svg"));
        if let Ok(bytes) = tokio::fs::read(&path).await {
            return Some(bytes);
        }

        let bytes = self.fetch(slug).await?;
        if let Err(e) = write_atomic(&path, &bytes) {
            // Still serve the icon; it will be fetched again next time.
            warn!("Failed to cache icon {slug}: {e}");
        } else {
            info!("Cached icon {slug} ({} bytes)", bytes.len());
        }
        Some(bytes)
    }

    async fn fetch(&self, slug: &str) -> Option<Vec<u8>> {
        let url = format!("{}/{slug}.svg", self.source);
        let response = match self
            .client
            .get(&url)
            .timeout(ICON_FETCH_TIMEOUT)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                debug!("Icon {slug} not available upstream: {}", response.status());
                return None;
            }
            Err(e) => {
                warn!("Failed to fetch icon {slug}: {e}");
                return None;
            }
        };

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes.to_vec(),
            Err(e) => {
                warn!("Failed to read icon {slug}: {e}");
                return None;
            }
        };
        if looks_like_svg(&bytes) {
            Some(bytes)
        } else {
            warn!("Icon {slug} from {url} is not SVG markup; ignoring");
            None
        }
    }
}

/// Slugs are restricted to `[a-z0-9-]` so they can never escape the cache directory.
#[must_use]
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

fn looks_like_svg(bytes: &[u8]) -> bool {
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(1024)]).to_ascii_lowercase();
    head.contains("<svg")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Path as UrlPath, http::StatusCode, routing::get, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    const SVG: &str = r#"<?xml version="1.0"?><svg xmlns="http://www.w3.org/2000/svg"></svg>"#;

    async fn spawn_icon_source(hits: Arc<AtomicUsize>) -> String {
        let app = Router::new().route(
            "/:file",
            get(move |UrlPath(file): UrlPath<String>| {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    match file.as_str() {
                        "proxmox.svg" => (StatusCode::OK, SVG.to_string()),
                        "html.svg" => (StatusCode::OK, "<html>nope</html>".to_string()),
                        _ => (StatusCode::NOT_FOUND, String::new()),
                    }
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind icon source");
        let addr = listener.local_addr().expect("Failed to get local address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        format!("http://{addr}")
    }

    #[test]
    fn test_slug_validation() {
        assert!(is_valid_slug("home-assistant"));
        assert!(is_valid_slug("1password"));
        assert!(!is_valid_slug(""));
        assert!(!is_valid_slug("../etc/passwd"));
        assert!(!is_valid_slug("Plex"));
        assert!(!is_valid_slug("a/b"));
        assert!(!is_valid_slug("icon.svg"));
    }

    #[test]
    fn test_svg_detection() {
        assert!(looks_like_svg(SVG.as_bytes()));
        assert!(looks_like_svg(b"<SVG viewBox='0 0 1 1'/>"));
        assert!(!looks_like_svg(b"<!doctype html><html></html>"));
    }

    #[tokio::test]
    async fn test_invalid_slug_never_touches_network() {
        let dir = tempdir().expect("Failed to create temporary directory");
        let hits = Arc::new(AtomicUsize::new(0));
        let source = spawn_icon_source(hits.clone()).await;
        let cache = IconCache::new(dir.path(), source, reqwest::Client::new());

        assert!(cache.get("../secret").await.is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fetch_once_then_serve_from_disk() {
        let dir = tempdir().expect("Failed to create temporary directory");
        let hits = Arc::new(AtomicUsize::new(0));
        let source = spawn_icon_source(hits.clone()).await;
        let cache = IconCache::new(dir.path(), format!("{source}/"), reqwest::Client::new());

        let first = cache.get("proxmox").await.expect("icon resolves");
        let second = cache.get("proxmox").await.expect("icon is cached");

        assert_eq!(first, SVG.as_bytes());
        assert_eq!(second, first);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(dir.path().join("proxmox.svg").exists());
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let dir = tempdir().expect("Failed to create temporary directory");
        let hits = Arc::new(AtomicUsize::new(0));
        let source = spawn_icon_source(hits.clone()).await;
        let cache = IconCache::new(dir.path(), source, reqwest::Client::new());

        assert!(cache.get("missing").await.is_none());
        assert!(cache.get("missing").await.is_none());
        assert!(cache.get("html").await.is_none());

        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert!(!dir.path().join("missing.svg").exists());
        assert!(!dir.path().join("html.svg").exists());
    }

    #[tokio::test]
    async fn test_existing_file_is_served_without_source() {
        let dir = tempdir().expect("Failed to create temporary directory");
        std::fs::write(dir.path().join("nas.svg"), SVG).unwrap();
        let cache = IconCache::new(dir.path(), "http://127.0.0.1:9", reqwest::Client::new());

        assert_eq!(cache.get("nas").await.unwrap(), SVG.as_bytes());
    }
}
