// src/sources/client.rs
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use reqwest::{header, Url};
use scraper::{Html, Selector};
use tokio::io::AsyncWriteExt;

use crate::pipeline::fertilizer::DocumentFetcher;
use crate::utils::error::SourceError;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; agridata/0.1)";

static PDF_LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"a[href$=".pdf"]"#).expect("Failed to compile PDF_LINK_SELECTOR")
});

/// Thin wrapper over a reqwest client shared by all source downloads.
#[derive(Debug, Clone)]
pub struct SourceClient {
    http: reqwest::Client,
}

impl SourceClient {
    /// Creates a client. The timeout applies to every request made through it.
    pub fn new(timeout: Option<Duration>) -> Result<Self, SourceError> {
        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self { http: builder.build()? })
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Fetches a page and returns its body as text.
    pub async fn fetch_text(&self, url: &str) -> Result<String, SourceError> {
        tracing::debug!("GET {}", url);
        let response = self.http.get(url)
            .header(header::ACCEPT, "text/html,application/xhtml+xml,*/*")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!("HTTP error status: {} for URL: {}", status, url);
            return Err(SourceError::Http(status, url.to_string()));
        }

        Ok(response.text().await?)
    }

    /// Streams a response body into `path`, replacing any existing file.
    /// The body is written next to the target first so an interrupted download
    /// never leaves a truncated file under the final name.
    pub async fn download_to(&self, url: &str, path: &Path) -> Result<u64, SourceError> {
        let mut response = self.http.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!("HTTP error status: {} for URL: {}", status, url);
            return Err(SourceError::Http(status, url.to_string()));
        }

        if let Some(total) = response.content_length() {
            tracing::info!("Downloading {} ({} bytes)", url, total);
        } else {
            tracing::info!("Downloading {}", url);
        }

        let partial = path.with_extension("part");
        let written = match stream_body(&mut response, &partial).await {
            Ok(written) => written,
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                    tracing::debug!("Could not remove {}: {}", partial.display(), cleanup);
                }
                tracing::error!("Download of {} failed: {}", url, e);
                return Err(e);
            }
        };

        tokio::fs::rename(&partial, path).await?;
        tracing::debug!("Wrote {} bytes to {}", written, path.display());
        Ok(written)
    }
}

async fn stream_body(response: &mut reqwest::Response, partial: &Path) -> Result<u64, SourceError> {
    let mut file = tokio::fs::File::create(partial).await?;
    let mut written: u64 = 0;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

/// Collects bulletin links from the fertilizer listing page.
///
/// Keeps `.pdf` anchors whose href mentions "WFP", whose text mentions "Weekly",
/// or whose href contains "fertilizer" in any case. Relative links are resolved
/// against `base_url`. The result is de-duplicated and sorted.
pub fn extract_document_links(html: &str, base_url: &str) -> Result<Vec<String>, SourceError> {
    let base = Url::parse(base_url).map_err(|e| SourceError::Url(base_url.to_string(), e.to_string()))?;
    let document = Html::parse_document(html);

    let mut links = BTreeSet::new();
    for anchor in document.select(&PDF_LINK_SELECTOR) {
        let Some(href) = anchor.value().attr("href") else { continue };
        let text = anchor.text().collect::<String>();

        let wanted = href.contains("WFP")
            || text.contains("Weekly")
            || href.to_uppercase().contains("FERTILIZER");
        if !wanted {
            tracing::trace!("Ignoring unrelated PDF link: {}", href);
            continue;
        }

        match base.join(href) {
            Ok(url) => {
                links.insert(url.to_string());
            }
            Err(e) => tracing::warn!("Skipping malformed link '{}': {}", href, e),
        }
    }

    Ok(links.into_iter().collect())
}

/// File name a downloaded document is stored under: the last path segment of its URL.
pub fn local_file_name(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    Some(segment.to_string())
}

impl DocumentFetcher for SourceClient {
    async fn discover(&self, listing_url: &str) -> Result<Vec<String>, SourceError> {
        let html = self.fetch_text(listing_url).await?;
        extract_document_links(&html, listing_url)
    }

    async fn fetch(&self, url: &str, dir: &Path) -> Result<PathBuf, SourceError> {
        let name = local_file_name(url)
            .ok_or_else(|| SourceError::Parse(format!("No file name in URL {}", url)))?;
        let path = dir.join(name);

        if path.exists() {
            tracing::debug!("Already downloaded: {}", path.display());
            return Ok(path);
        }

        self.download_to(url, &path).await?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <html><body>
          <a href="/wp-content/uploads/2024/03/WFP-March-2024.pdf">Weekly Fertilizer Prices</a>
          <a href="https://fpa.da.gov.ph/wp-content/uploads/2024/02/Fertilizer_Feb_2024.pdf">February</a>
          <a href="/wp-content/uploads/2024/01/prices-jan-2024.pdf">Weekly prices</a>
          <a href="/wp-content/uploads/2024/03/WFP-March-2024.pdf">duplicate</a>
          <a href="/wp-content/uploads/pesticides-2024.pdf">Pesticide list</a>
          <a href="/wp-content/uploads/WFP-summary.xlsx">WFP spreadsheet</a>
          <a href="/wp-content/uploads/wfp-bulletin-2024.pdf">Bulletin</a>
          <a>no href</a>
        </body></html>
    "#;

    #[test]
    fn test_extract_document_links_filters_and_resolves() {
        let links = extract_document_links(LISTING, "https://fpa.da.gov.ph/weekly-prices/").unwrap();
        assert_eq!(
            links,
            vec![
                "https://fpa.da.gov.ph/wp-content/uploads/2024/01/prices-jan-2024.pdf".to_string(),
                "https://fpa.da.gov.ph/wp-content/uploads/2024/02/Fertilizer_Feb_2024.pdf".to_string(),
                "https://fpa.da.gov.ph/wp-content/uploads/2024/03/WFP-March-2024.pdf".to_string(),
            ]
        );
    }

    #[test]
    fn test_wfp_match_is_case_sensitive() {
        let links = extract_document_links(LISTING, "https://fpa.da.gov.ph/weekly-prices/").unwrap();
        assert!(links.iter().all(|link| !link.contains("wfp-bulletin")), "{:?}", links);
    }

    #[test]
    fn test_extract_document_links_empty_page() {
        let links = extract_document_links("<html></html>", "https://fpa.da.gov.ph/").unwrap();
        assert!(links.is_empty());
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            extract_document_links(LISTING, "not a url"),
            Err(SourceError::Url(_, _))
        ));
    }

    #[test]
    fn test_local_file_name() {
        assert_eq!(
            local_file_name("https://fpa.da.gov.ph/wp-content/uploads/WFP-March-2024.pdf"),
            Some("WFP-March-2024.pdf".to_string())
        );
        assert_eq!(local_file_name("https://fpa.da.gov.ph/"), None);
        assert_eq!(local_file_name("garbage"), None);
    }

    #[test]
    fn test_fetch_reuses_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("WFP-March-2024.pdf");
        std::fs::write(&existing, b"%PDF-1.4").unwrap();

        let client = SourceClient::new(None).unwrap();
        // Unroutable host: succeeding proves no request was made.
        let path = tokio_test::block_on(
            client.fetch("http://invalid.invalid/uploads/WFP-March-2024.pdf", dir.path()),
        )
        .unwrap();
        assert_eq!(path, existing);
    }

    #[test]
    fn test_truncated_download_leaves_no_partial_file() {
        use tokio::io::AsyncReadExt;

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("WFP-March-2024.pdf");

        let result = tokio_test::block_on(async {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let address = listener.local_addr().unwrap();
            let server = tokio::spawn(async move {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                }
                // Promises 100 bytes, sends 7, then hangs up.
                socket
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\npartial")
                    .await
                    .unwrap();
                socket.shutdown().await.unwrap();
            });

            let client = SourceClient { http: reqwest::Client::builder().no_proxy().build().unwrap() };
            let url = format!("http://{}/uploads/WFP-March-2024.pdf", address);
            let result = client.download_to(&url, &target).await;
            server.await.unwrap();
            result
        });

        assert!(result.is_err());
        assert!(!target.exists());
        assert!(!dir.path().join("WFP-March-2024.part").exists());
    }
}
