use std::path::{Path, PathBuf};

use reqwest::Url;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::error::{check_status, SyncError};

const FALLBACK_NAME: &str = "download";

/// File name for a download: the url's last non-empty path segment.
pub fn filename_for(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segs| segs.rfind(|s| !s.is_empty()))
        .map(str::to_string)
        .unwrap_or_else(|| FALLBACK_NAME.to_string())
}

/// Stream `url` into `dir`, returning the written path.
pub async fn download(client: &reqwest::Client, url: &str, dir: &Path) -> Result<PathBuf, SyncError> {
    let parsed = Url::parse(url).map_err(|e| SyncError::Decode(format!("{}: {}", url, e)))?;
    let path = dir.join(filename_for(&parsed));

    let resp = client.get(parsed).send().await?;
    let mut resp = check_status("download", "the server refused the request", resp).await?;

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| SyncError::io(dir, e))?;
    let mut file = tokio::fs::File::create(&path)
        .await
        .map_err(|e| SyncError::io(&path, e))?;

    let mut written = 0u64;
    while let Some(chunk) = resp.chunk().await? {
        file.write_all(&chunk)
            .await
            .map_err(|e| SyncError::io(&path, e))?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(|e| SyncError::io(&path, e))?;

    info!("Downloaded {} ({} bytes)", path.display(), written);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn name_from_last_segment() {
        let u = Url::parse("https://host/files/report.pdf?x=1").unwrap();
        assert_eq!(filename_for(&u), "report.pdf");
        let u = Url::parse("https://host/files/archive/").unwrap();
        assert_eq!(filename_for(&u), "archive");
        let u = Url::parse("https://host").unwrap();
        assert_eq!(filename_for(&u), "download");
    }

    #[tokio::test]
    async fn streams_body_to_disk() {
        let server = MockServer::start().await;
        let body = vec![7u8; 64 * 1024];
        Mock::given(method("GET"))
            .and(path("/exports/bookmarks-2024.html"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let url = format!("{}/exports/bookmarks-2024.html", server.uri());
        let saved = download(&reqwest::Client::new(), &url, dir.path()).await.unwrap();
        assert_eq!(saved, dir.path().join("bookmarks-2024.html"));
        assert_eq!(std::fs::read(saved).unwrap(), body);
    }

    #[tokio::test]
    async fn http_error_writes_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let url = format!("{}/missing.bin", server.uri());
        let err = download(&reqwest::Client::new(), &url, dir.path()).await.unwrap_err();
        assert!(matches!(err, SyncError::Http { status: 404, .. }));
        assert!(!dir.path().join("missing.bin").exists());
    }
}
