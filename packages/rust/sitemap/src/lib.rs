//! Sitemap discovery and page fetching.
//!
//! The ingestion pipeline starts from a sitemap XML file: fetch it, pull out
//! the `<loc>` page URLs, keep the ones matching the configured prefix
//! filters, then fetch and clean each page into a [`Document`]. Fetches are
//! sequential and any network or parse failure propagates and aborts the
//! run; there is no retry policy.

mod clean;

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use tracing::{debug, info, instrument};
use url::Url;

use sitechat_shared::{Document, Result, SitechatError};

pub use clean::{CleanedPage, clean_html};

/// User-Agent string for all outbound requests.
const USER_AGENT: &str = concat!("sitechat/", env!("CARGO_PKG_VERSION"));

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 5;

/// Timeout for individual HTTP requests.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the HTTP client used for sitemap and page fetches.
pub fn build_client() -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| SitechatError::Network(format!("failed to build HTTP client: {e}")))
}

// ---------------------------------------------------------------------------
// Sitemap fetching
// ---------------------------------------------------------------------------

/// Fetch a sitemap and extract its page URLs in document order.
#[instrument(skip_all, fields(url = %sitemap_url))]
pub async fn fetch_sitemap(client: &Client, sitemap_url: &Url) -> Result<Vec<Url>> {
    let body = fetch_text(client, sitemap_url.as_str()).await?;
    let urls = parse_locations(&body)?;
    info!(pages = urls.len(), "sitemap fetched");
    Ok(urls)
}

/// Extract `<loc>` entries from sitemap XML.
fn parse_locations(xml: &str) -> Result<Vec<Url>> {
    static LOC_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"<loc>\s*([^<]+?)\s*</loc>").expect("valid regex"));

    let mut urls = Vec::new();
    for caps in LOC_RE.captures_iter(xml) {
        let raw = &caps[1];
        let url = Url::parse(raw)
            .map_err(|e| SitechatError::parse(format!("invalid sitemap URL '{raw}': {e}")))?;
        urls.push(url);
    }

    if urls.is_empty() {
        return Err(SitechatError::validation(
            "sitemap contains no <loc> entries",
        ));
    }
    Ok(urls)
}

/// Keep URLs matching at least one prefix. An empty filter list passes all.
pub fn filter_urls(urls: Vec<Url>, prefixes: &[String]) -> Vec<Url> {
    if prefixes.is_empty() {
        return urls;
    }
    urls.into_iter()
        .filter(|u| prefixes.iter().any(|p| u.as_str().starts_with(p.as_str())))
        .collect()
}

// ---------------------------------------------------------------------------
// Page fetching
// ---------------------------------------------------------------------------

/// Fetch each page and reduce it to a cleaned [`Document`].
///
/// Pages are fetched sequentially in sitemap order, so output is
/// deterministic for a fixed site. Pages whose cleaned text is empty are
/// skipped; fetch failures abort the whole run.
#[instrument(skip_all, fields(pages = urls.len()))]
pub async fn fetch_documents(client: &Client, urls: &[Url]) -> Result<Vec<Document>> {
    let mut documents = Vec::with_capacity(urls.len());

    for url in urls {
        debug!(%url, "fetching page");
        let html = fetch_text(client, url.as_str()).await?;
        let cleaned = clean_html(&html);

        if cleaned.text.is_empty() {
            debug!(%url, "page has no visible text after cleaning, skipping");
            continue;
        }

        documents.push(Document {
            url: url.to_string(),
            title: cleaned.title,
            text: cleaned.text,
        });
    }

    info!(documents = documents.len(), "pages fetched and cleaned");
    Ok(documents)
}

/// GET a URL and return its body, erroring on non-success status.
async fn fetch_text(client: &Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| SitechatError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(SitechatError::Network(format!("{url}: HTTP {status}")));
    }

    response
        .text()
        .await
        .map_err(|e| SitechatError::Network(format!("{url}: failed to read body: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(raw: &[&str]) -> Vec<Url> {
        raw.iter().map(|u| Url::parse(u).unwrap()).collect()
    }

    #[test]
    fn parse_locations_extracts_in_order() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
              <url><loc>https://docs.example.com/docs/intro</loc></url>
              <url><loc> https://docs.example.com/reference/api </loc></url>
            </urlset>"#;

        let urls = parse_locations(xml).unwrap();
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[0].as_str(), "https://docs.example.com/docs/intro");
        assert_eq!(urls[1].as_str(), "https://docs.example.com/reference/api");
    }

    #[test]
    fn parse_locations_rejects_empty_sitemap() {
        let xml = r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9"></urlset>"#;
        let result = parse_locations(xml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("no <loc> entries"));
    }

    #[test]
    fn parse_locations_rejects_malformed_url() {
        let xml = "<loc>not a url</loc>";
        assert!(parse_locations(xml).is_err());
    }

    #[test]
    fn filter_urls_matches_any_prefix() {
        let input = urls(&[
            "https://docs.example.com/docs/intro",
            "https://docs.example.com/blog/post",
            "https://docs.example.com/reference/api",
        ]);
        let prefixes = vec![
            "https://docs.example.com/docs/".to_string(),
            "https://docs.example.com/reference/".to_string(),
        ];

        let kept = filter_urls(input, &prefixes);
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|u| !u.as_str().contains("/blog/")));
    }

    #[test]
    fn filter_urls_empty_filter_passes_all() {
        let input = urls(&["https://a.example.com/", "https://b.example.com/"]);
        let kept = filter_urls(input.clone(), &[]);
        assert_eq!(kept.len(), input.len());
    }

    #[tokio::test]
    async fn fetch_sitemap_with_mock_server() {
        let server = wiremock::MockServer::start().await;

        let sitemap = format!(
            r#"<?xml version="1.0"?>
            <urlset>
              <url><loc>{0}/docs/one</loc></url>
              <url><loc>{0}/docs/two</loc></url>
            </urlset>"#,
            server.uri()
        );

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/sitemap.xml"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(&sitemap))
            .mount(&server)
            .await;

        let client = build_client().unwrap();
        let sitemap_url = Url::parse(&format!("{}/sitemap.xml", server.uri())).unwrap();
        let urls = fetch_sitemap(&client, &sitemap_url).await.unwrap();

        assert_eq!(urls.len(), 2);
        assert!(urls[0].as_str().ends_with("/docs/one"));
    }

    #[tokio::test]
    async fn fetch_sitemap_http_error_propagates() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/sitemap.xml"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = build_client().unwrap();
        let sitemap_url = Url::parse(&format!("{}/sitemap.xml", server.uri())).unwrap();
        let result = fetch_sitemap(&client, &sitemap_url).await;

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("HTTP 404"));
    }

    #[tokio::test]
    async fn fetch_documents_cleans_pages() {
        let server = wiremock::MockServer::start().await;

        let page = r#"<html><body>
            <nav><a href="/">Home</a></nav>
            <main><h1>Install</h1><p>Run the installer.</p></main>
        </body></html>"#;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/docs/install"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(page))
            .mount(&server)
            .await;

        let client = build_client().unwrap();
        let urls = vec![Url::parse(&format!("{}/docs/install", server.uri())).unwrap()];
        let docs = fetch_documents(&client, &urls).await.unwrap();

        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].title.as_deref(), Some("Install"));
        assert!(docs[0].text.contains("Run the installer."));
        assert!(!docs[0].text.contains("Home"));
    }

    #[tokio::test]
    async fn fetch_documents_aborts_on_failed_page() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/docs/ok"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_string("<html><body><p>fine</p></body></html>"),
            )
            .mount(&server)
            .await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/docs/broken"))
            .respond_with(wiremock::ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = build_client().unwrap();
        let urls = vec![
            Url::parse(&format!("{}/docs/ok", server.uri())).unwrap(),
            Url::parse(&format!("{}/docs/broken", server.uri())).unwrap(),
        ];

        let result = fetch_documents(&client, &urls).await;
        assert!(result.is_err());
    }
}
