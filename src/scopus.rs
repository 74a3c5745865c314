//! Scopus page source.
//!
//! Fetches search-result listings and paper detail pages over HTTP, replaying
//! the session cookies of a logged-in browser, and extracts links, titles,
//! abstracts, affiliations and authors with CSS selectors.

use crate::affiliation::{AffiliationEntry, RawAuthor};
use crate::config::{DelayRange, DEFAULT_BASE_URL};
use crate::cookies::{cookie_header, Cookie};
use crate::crawl::{PageSource, ResultPage};
use crate::error::{HarvestError, OptionExt, Result};
use crate::paper::DetailPage;
use reqwest::StatusCode;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// User agent string for requests
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Wait assumed when a 429 response carries no usable `Retry-After`
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Text fragments only found on login, access-denied and bot-check pages
const LOGIN_MARKERS: &[&str] = &[
    "bdd-email",
    "Sign in to Scopus",
    "Institutional sign in",
    "signin.uri",
    "Access denied",
    "captcha",
];

/// Options for the Scopus client
#[derive(Debug, Clone)]
pub struct ScopusOptions {
    /// Scopus root URL (proxy or direct)
    pub base_url: String,
    /// Proxy URL (e.g., "http://127.0.0.1:7890")
    pub proxy: Option<String>,
    /// Results per listing page
    pub page_size: u32,
    /// Pause before each request
    pub request_delay: DelayRange,
}

impl Default for ScopusOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            proxy: None,
            page_size: 20,
            request_delay: DelayRange(2000, 4000),
        }
    }
}

/// HTTP-backed [`PageSource`].
pub struct ScopusClient {
    client: reqwest::Client,
    base_url: Url,
    host: String,
    cookie_header: String,
    page_size: u32,
    request_delay: DelayRange,
}

impl ScopusClient {
    pub fn new(options: &ScopusOptions, cookies: &[Cookie]) -> Result<Self> {
        let base_url = Url::parse(options.base_url.trim_end_matches('/'))
            .map_err(|e| HarvestError::Config(format!("Invalid base URL: {}", e)))?;
        let host = base_url.host_str().ok_or_parse("base URL has no host")?.to_string();

        let mut client = Self {
            client: build_http_client(options.proxy.as_deref())?,
            base_url,
            host,
            cookie_header: String::new(),
            page_size: options.page_size.max(1),
            request_delay: options.request_delay,
        };
        client.set_cookies(cookies);
        Ok(client)
    }

    /// Replace the session cookies, e.g. after the user logged in again.
    pub fn set_cookies(&mut self, cookies: &[Cookie]) {
        self.cookie_header = cookie_header(cookies, &self.host);

        if self.cookie_header.is_empty() {
            warn!(host = %self.host, "No session cookies for host. Run 'rustscopus cookies import' after logging in.");
        } else {
            info!(host = %self.host, "Session cookies loaded");
        }
    }

    async fn fetch(&self, url: &Url) -> Result<String> {
        self.request_delay.wait().await;
        debug!(url = %url, "Fetching page");

        let mut request = self
            .client
            .get(url.as_str())
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .header("Accept-Language", "en-US,en;q=0.9")
            .header("Cache-Control", "no-cache")
            .header("Upgrade-Insecure-Requests", "1");

        if !self.cookie_header.is_empty() {
            request = request.header("Cookie", &self.cookie_header);
        }

        let response = request.send().await?;
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        classify_response(response.status(), response.url(), retry_after)?;

        Ok(response.text().await?)
    }
}

impl PageSource for ScopusClient {
    async fn search(&mut self, keyword: &str, page: u32) -> Result<ResultPage> {
        let url = build_search_url(&self.base_url, keyword, page, self.page_size)?;
        let html = self.fetch(&url).await?;
        let result = parse_result_page(&html, &self.base_url)?;
        info!(keyword, page, links = result.links.len(), has_next = result.has_next, "Parsed results page");
        Ok(result)
    }

    async fn detail(&mut self, link: &str) -> Result<DetailPage> {
        let url = Url::parse(link)
            .or_else(|_| self.base_url.join(link))
            .map_err(|e| HarvestError::MalformedInput(format!("link '{}': {}", link, e)))?;
        let html = self.fetch(&url).await?;
        parse_detail_page(&html)
    }
}

/// Map a response to the crawl's error model before its body is read.
///
/// 401/403 and landing on a sign-in page need a fresh login, 429 is a rate
/// limit (`Retry-After` seconds when sent), any other non-2xx is an API error.
pub fn classify_response(status: StatusCode, final_url: &Url, retry_after: Option<u64>) -> Result<()> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(HarvestError::ManualInterventionRequired(format!(
            "HTTP {} from {}, log in again and refresh cookies",
            status,
            final_url.host_str().unwrap_or_default()
        )));
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(HarvestError::RateLimited(retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS)));
    }

    if !status.is_success() {
        return Err(HarvestError::Api {
            code: status.as_u16() as i32,
            message: format!("HTTP error: {}", status),
        });
    }

    let final_path = final_url.path().to_lowercase();
    if final_path.contains("signin") || final_path.contains("login") {
        return Err(HarvestError::ManualInterventionRequired(format!(
            "redirected to login page {}",
            final_url
        )));
    }

    Ok(())
}

/// Build HTTP client with optional proxy
fn build_http_client(proxy: Option<&str>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(30))
        .cookie_store(true);

    if let Some(proxy_url) = proxy {
        let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| {
            HarvestError::Config(format!("Invalid proxy URL '{}': {}", proxy_url, e))
        })?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| HarvestError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Keyword-field search URL for a 1-based results page.
pub fn build_search_url(base_url: &Url, keyword: &str, page: u32, page_size: u32) -> Result<Url> {
    let mut url = base_url
        .join("/results/results.uri")
        .map_err(|e| HarvestError::Config(format!("Invalid base URL: {}", e)))?;

    let offset = page.saturating_sub(1) * page_size + 1;
    {
        let mut params = url.query_pairs_mut();
        params.append_pair("src", "s");
        params.append_pair("sot", "b");
        params.append_pair("sdt", "b");
        params.append_pair("origin", "searchbasic");
        params.append_pair("s", &format!("KEY({})", keyword));
        params.append_pair("offset", &offset.to_string());
        params.append_pair("displayPerPage", &page_size.to_string());
    }

    Ok(url)
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| HarvestError::Parse(e.to_string()))
}

/// Element text with whitespace runs collapsed.
fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether the page is a login, access-denied or bot-check page.
pub fn is_login_wall(html: &str) -> bool {
    let lower = html.to_lowercase();
    LOGIN_MARKERS.iter().any(|m| lower.contains(&m.to_lowercase()))
}

/// Parse a search-results listing.
pub fn parse_result_page(html: &str, base_url: &Url) -> Result<ResultPage> {
    let document = Html::parse_document(html);

    let row_selector = selector("tbody tr[class*='TableItems-module']")?;
    let fallback_selector = selector("[data-testid='search-results'] h3 a, .result-item h3 a")?;
    let link_selector = selector("h3 a")?;
    let button_selector = selector("button")?;

    let rows = document.select(&row_selector).count();
    let mut anchors: Vec<ElementRef<'_>> = document
        .select(&row_selector)
        .filter_map(|row| row.select(&link_selector).next())
        .collect();
    if anchors.is_empty() && rows > 0 {
        return Err(HarvestError::Browser(format!("{} result rows without links", rows)));
    }
    if anchors.is_empty() {
        anchors = document.select(&fallback_selector).collect();
    }

    if anchors.is_empty() && is_login_wall(html) {
        return Err(HarvestError::ManualInterventionRequired(
            "search results replaced by a login page".to_string(),
        ));
    }

    let mut links = Vec::new();
    for anchor in anchors {
        let Some(href) = anchor.value().attr("href").map(str::trim).filter(|h| !h.is_empty()) else {
            warn!("Result row without link");
            continue;
        };
        match Url::parse(href).or_else(|_| base_url.join(href)) {
            Ok(url) => links.push(url.to_string()),
            Err(e) => warn!(href, error = %e, "Unusable result link"),
        }
    }

    let has_next = document.select(&button_selector).any(|button| {
        let enabled = button.value().attr("disabled").is_none()
            && button.value().attr("aria-disabled") != Some("true");
        enabled && element_text(&button) == "Next"
    });

    Ok(ResultPage { links, has_next })
}

/// Parse a paper detail page.
///
/// Missing title, abstract or emails degrade to empty strings. A page with
/// neither a title nor authors did not render paper content: `NotFound`, or
/// `ManualInterventionRequired` when it is a login page.
pub fn parse_detail_page(html: &str) -> Result<DetailPage> {
    let document = Html::parse_document(html);

    let title_selector = selector("h2[data-testid='publication-titles']")?;
    let abstract_selector = selector("#document-details-abstract")?;
    let affiliation_selector = selector("section[data-testid='detailed-information-affiliations'] li")?;
    let flyout_author_selector =
        selector("ul[class*='DetailedInformationFlyout_list'] li[data-testid='authorItem-button']")?;
    let author_selector = selector("li[data-testid='authorItem-button']")?;
    let name_selector = selector("span[class*='Button_text']")?;
    let author_sup_selector = selector("sup[class*='AuthorList_affiliation']")?;
    let mailto_selector = selector("a[href^='mailto:']")?;
    let sup_selector = selector("sup")?;
    let span_selector = selector("span")?;

    let title = document
        .select(&title_selector)
        .next()
        .map(|e| element_text(&e))
        .unwrap_or_default();

    let abstract_text = document
        .select(&abstract_selector)
        .next()
        .map(|e| element_text(&e))
        .unwrap_or_default();

    let mut affiliations = Vec::new();
    for item in document.select(&affiliation_selector) {
        let marker = item.select(&sup_selector).next().map(|s| element_text(&s));
        let text = match (&marker, item.select(&span_selector).next()) {
            (Some(_), Some(span)) => element_text(&span),
            _ => element_text(&item),
        };
        if text.is_empty() {
            continue;
        }
        affiliations.push(AffiliationEntry::new(marker.as_deref(), &text));
    }

    let mut author_items: Vec<ElementRef<'_>> = document.select(&flyout_author_selector).collect();
    if author_items.is_empty() {
        author_items = document.select(&author_selector).collect();
    }

    let authors: Vec<RawAuthor> = author_items
        .iter()
        .map(|item| RawAuthor {
            name: item
                .select(&name_selector)
                .next()
                .map(|n| element_text(&n))
                .unwrap_or_default(),
            marker_text: item.select(&author_sup_selector).map(|s| element_text(&s)).collect(),
            email: item
                .select(&mailto_selector)
                .next()
                .and_then(|a| a.value().attr("href"))
                .map(|href| href.trim_start_matches("mailto:").trim().to_string())
                .unwrap_or_default(),
        })
        .collect();

    if title.is_empty() && authors.is_empty() {
        if is_login_wall(html) {
            return Err(HarvestError::ManualInterventionRequired(
                "detail page replaced by a login page".to_string(),
            ));
        }
        return Err(HarvestError::NotFound("paper content on detail page".to_string()));
    }

    debug!(
        title = %title.chars().take(60).collect::<String>(),
        affiliations = affiliations.len(),
        authors = authors.len(),
        "Parsed detail page"
    );

    Ok(DetailPage {
        title,
        abstract_text,
        affiliations,
        authors,
    })
}
