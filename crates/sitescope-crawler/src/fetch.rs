//! Single-URL fetcher.
//!
//! Stateless and safe to call from any worker. A fetch yields the final
//! URL after redirects, the HTTP status and headers, the raw HTML, its
//! cleaned projection, the markdown projection and the discovered link
//! targets. Non-2xx responses are still returned (the caller records the
//! status); every other failure kind yields no page artefact.

use async_trait::async_trait;
use chrono::Utc;
use sitescope_extraction::{clean_html, extract_links, extract_title, markdown_from_cleaned};
use sitescope_types::EngineError;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Failure class of a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    Network,
    Timeout,
    RenderError,
}

impl FetchErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::RenderError => "render_error",
        }
    }
}

#[derive(Debug, Error)]
#[error("{} fetching {url}: {message}", kind.as_str())]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub url: Url,
    pub message: String,
}

/// Per-request options.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub timeout: Duration,
    /// Render the page with the configured [`Renderer`] before extraction.
    pub render_js: bool,
    /// Override the client's User-Agent for this request.
    pub user_agent: Option<String>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            render_js: false,
            user_agent: None,
        }
    }
}

/// Everything retrieved for one URL.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL after redirects.
    pub final_url: Url,
    pub http_status: u16,
    /// Lowercased header names; repeated headers joined with `\n`.
    pub headers: BTreeMap<String, String>,
    pub title: Option<String>,
    pub raw_html: String,
    pub cleaned_html: String,
    pub markdown: String,
    /// `<a href>` targets resolved to absolute URLs, unfiltered.
    pub links: Vec<Url>,
    pub fetched_at: chrono::DateTime<Utc>,
}

impl FetchedPage {
    pub fn is_http_error(&self) -> bool {
        !(200..300).contains(&self.http_status)
    }
}

/// Seam for JS-rendering engines. The default build carries no
/// implementation; requesting `render_js` without one is a render error.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Return the rendered DOM serialised as HTML.
    async fn render(&self, url: &Url, timeout: Duration) -> Result<String, String>;
}

/// Stateless HTTP fetcher shared by all crawl workers.
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    renderer: Option<Arc<dyn Renderer>>,
}

impl Fetcher {
    pub fn new(user_agent: &str) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .gzip(true)
            .build()
            .map_err(|e| EngineError::network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            renderer: None,
        })
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Underlying client, shared with the robots policy.
    pub fn client(&self) -> reqwest::Client {
        self.client.clone()
    }

    /// Fetch one URL and derive all page artefacts.
    pub async fn fetch(&self, url: &Url, options: &FetchOptions) -> Result<FetchedPage, FetchError> {
        let mut request = self.client.get(url.clone()).timeout(options.timeout);
        if let Some(agent) = &options.user_agent {
            request = request.header(reqwest::header::USER_AGENT, agent.clone());
        }

        let response = request.send().await.map_err(|e| classify(url, e))?;
        let final_url = response.url().clone();
        let http_status = response.status().as_u16();
        let headers = collect_headers(response.headers());

        let mut raw_html = response.text().await.map_err(|e| classify(url, e))?;

        if options.render_js {
            match &self.renderer {
                Some(renderer) => {
                    raw_html = renderer
                        .render(&final_url, options.timeout)
                        .await
                        .map_err(|message| FetchError {
                            kind: FetchErrorKind::RenderError,
                            url: url.clone(),
                            message,
                        })?;
                }
                None => {
                    return Err(FetchError {
                        kind: FetchErrorKind::RenderError,
                        url: url.clone(),
                        message: "JS rendering requested but no renderer is configured".to_string(),
                    })
                }
            }
        }

        let cleaned_html = clean_html(&raw_html);
        let markdown = markdown_from_cleaned(&cleaned_html);
        let links = extract_links(&raw_html, &final_url);
        let title = extract_title(&raw_html);

        debug!(
            url = %url,
            status = http_status,
            links = links.len(),
            bytes = raw_html.len(),
            "fetched page"
        );

        Ok(FetchedPage {
            final_url,
            http_status,
            headers,
            title,
            raw_html,
            cleaned_html,
            markdown,
            links,
            fetched_at: Utc::now(),
        })
    }
}

fn classify(url: &Url, err: reqwest::Error) -> FetchError {
    let kind = if err.is_timeout() {
        FetchErrorKind::Timeout
    } else {
        FetchErrorKind::Network
    };
    FetchError {
        kind,
        url: url.clone(),
        message: err.to_string(),
    }
}

fn collect_headers(headers: &reqwest::header::HeaderMap) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else { continue };
        let key = name.as_str().to_lowercase();
        out.entry(key)
            .and_modify(|existing| {
                existing.push('\n');
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetch_produces_all_artefacts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><head><title>Sample</title></head>
                   <body><h1>Hi</h1><a href="/next">next</a><script>x()</script></body></html>"#,
            ))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new("Sitescope-test").expect("client builds");
        let url = Url::parse(&format!("{}/page", server.uri())).unwrap();
        let page = fetcher
            .fetch(&url, &FetchOptions::default())
            .await
            .expect("fetch succeeds");

        assert_eq!(page.http_status, 200);
        assert_eq!(page.title.as_deref(), Some("Sample"));
        assert!(page.cleaned_html.contains("<h1>Hi</h1>"));
        assert!(!page.cleaned_html.contains("x()"));
        assert!(page.markdown.contains("# Hi"));
        assert_eq!(page.links.len(), 1);
        assert_eq!(page.links[0].path(), "/next");
    }

    #[tokio::test]
    async fn non_2xx_still_returns_a_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404).set_body_string("<html><body>gone</body></html>"))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new("Sitescope-test").expect("client builds");
        let url = Url::parse(&format!("{}/gone", server.uri())).unwrap();
        let page = fetcher
            .fetch(&url, &FetchOptions::default())
            .await
            .expect("http errors still return");
        assert_eq!(page.http_status, 404);
        assert!(page.is_http_error());
    }

    #[tokio::test]
    async fn timeout_maps_to_timeout_kind() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200).set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let fetcher = Fetcher::new("Sitescope-test").expect("client builds");
        let url = Url::parse(&format!("{}/slow", server.uri())).unwrap();
        let options = FetchOptions {
            timeout: Duration::from_millis(100),
            ..Default::default()
        };
        let err = fetcher.fetch(&url, &options).await.expect_err("times out");
        assert_eq!(err.kind, FetchErrorKind::Timeout);
    }

    #[tokio::test]
    async fn render_without_renderer_is_a_render_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new("Sitescope-test").expect("client builds");
        let url = Url::parse(&format!("{}/x", server.uri())).unwrap();
        let options = FetchOptions {
            render_js: true,
            ..Default::default()
        };
        let err = fetcher.fetch(&url, &options).await.expect_err("no renderer");
        assert_eq!(err.kind, FetchErrorKind::RenderError);
    }

    #[test]
    fn repeated_headers_join_with_newline() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.append("set-cookie", "a=1; Secure".parse().unwrap());
        headers.append("set-cookie", "b=2; HttpOnly".parse().unwrap());
        let collected = collect_headers(&headers);
        assert_eq!(collected["set-cookie"], "a=1; Secure\nb=2; HttpOnly");
    }
}
