// src/scrape/mod.rs
//! News-page scraping: index page → article permalinks → per-article extraction.
//!
//! Fetching goes through the `PageFetcher` trait so tests can serve canned HTML.
//! One broken article never aborts the rest of the batch.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use metrics::{counter, histogram};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

/// Index-page permalink pattern: headline tiles → ribbon title anchors.
const INDEX_LINK_SELECTOR: &str =
    "div.tiles.late.ribbon-cont .ribbon .ribbon_content .ribbon_title a[href]";
const ARTICLE_TITLE_SELECTOR: &str = "div.article__title h1";
const ARTICLE_DATE_SELECTOR: &str = "div.article__date-published";
const ARTICLE_BODY_SELECTOR: &str = "div.article__writeup p";

/// Publish timestamps on the source render as e.g. `December 4, 2023 | 3:40pm`.
const DATE_FORMAT: &str = "%B %d, %Y | %I:%M%p";

/// The source publishes in UTC+8 (no DST).
static SOURCE_OFFSET: Lazy<FixedOffset> =
    Lazy::new(|| FixedOffset::east_opt(8 * 3600).expect("UTC+8 offset"));

static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

#[derive(Debug, Clone, PartialEq)]
pub struct ScrapedArticle {
    pub title: String,
    pub link: String,
    pub posted_at: DateTime<Utc>,
    pub body: String,
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
    fn name(&self) -> &'static str;
}

/// Production fetcher over reqwest with bounded timeouts per call.
pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .user_agent("relief-pipeline/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(15))
            .build()
            .expect("reqwest client");
        Self { http }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("fetching {url}"))?
            .error_for_status()
            .with_context(|| format!("bad status from {url}"))?;
        let body = resp
            .text()
            .await
            .with_context(|| format!("reading body of {url}"))?;
        Ok(body)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Serves canned HTML keyed by URL. Unknown URLs error, which exercises the
/// per-article fault isolation path.
#[derive(Default)]
pub struct FixtureFetcher {
    pages: HashMap<String, String>,
}

impl FixtureFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }
}

#[async_trait]
impl PageFetcher for FixtureFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("no fixture for {url}"))
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}

/// Extract article permalinks from the index page, first-seen order, deduped.
pub fn collect_index_links(html: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let selector = Selector::parse(INDEX_LINK_SELECTOR).expect("index link selector");

    let mut links = Vec::new();
    for el in doc.select(&selector) {
        if let Some(href) = el.value().attr("href") {
            let href = href.trim();
            if !href.is_empty() && !links.iter().any(|l| l == href) {
                links.push(href.to_string());
            }
        }
    }
    links
}

/// Parse one article page. A missing title is an error (the caller skips the
/// article); so is an unparseable publish date.
pub fn parse_article(link: &str, html: &str) -> Result<ScrapedArticle> {
    let doc = Html::parse_document(html);

    let title_sel = Selector::parse(ARTICLE_TITLE_SELECTOR).expect("title selector");
    let title = doc
        .select(&title_sel)
        .next()
        .map(|el| normalize_fragment(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty())
        .ok_or_else(|| anyhow!("missing article title"))?;

    let date_sel = Selector::parse(ARTICLE_DATE_SELECTOR).expect("date selector");
    let date_text = doc
        .select(&date_sel)
        .next()
        .map(|el| normalize_fragment(&el.text().collect::<String>()))
        .ok_or_else(|| anyhow!("missing publish date"))?;
    let posted_at = parse_posted(&date_text)?;

    let body_sel = Selector::parse(ARTICLE_BODY_SELECTOR).expect("body selector");
    let body = doc
        .select(&body_sel)
        .map(|el| normalize_fragment(&el.text().collect::<String>()))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    Ok(ScrapedArticle {
        title,
        link: link.to_string(),
        posted_at,
        body,
    })
}

/// Parse the source's local publish timestamp and convert to UTC.
pub fn parse_posted(text: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(text, DATE_FORMAT)
        .with_context(|| format!("parsing publish date '{text}'"))?;
    let local = naive
        .and_local_timezone(*SOURCE_OFFSET)
        .single()
        .ok_or_else(|| anyhow!("ambiguous local datetime '{text}'"))?;
    Ok(local.with_timezone(&Utc))
}

/// Decode stray HTML entities and collapse whitespace.
fn normalize_fragment(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s);
    RE_WS.replace_all(decoded.trim(), " ").to_string()
}

/// Fetch the index, then each article. Per-article failures are logged and
/// skipped; only an index fetch failure surfaces to the caller.
pub async fn scrape(fetcher: &dyn PageFetcher, seed_url: &str) -> Result<Vec<ScrapedArticle>> {
    let t0 = std::time::Instant::now();

    let index_html = fetcher
        .fetch(seed_url)
        .await
        .with_context(|| format!("fetching index {seed_url}"))?;
    let links = collect_index_links(&index_html);

    let mut articles = Vec::with_capacity(links.len());
    for link in links {
        let html = match fetcher.fetch(&link).await {
            Ok(html) => html,
            Err(e) => {
                warn!(target: "scrape", error = ?e, link = %link, "article fetch failed");
                counter!("scrape_skipped_total").increment(1);
                continue;
            }
        };
        match parse_article(&link, &html) {
            Ok(article) => articles.push(article),
            Err(e) => {
                warn!(target: "scrape", error = ?e, link = %link, "article parse failed");
                counter!("scrape_skipped_total").increment(1);
            }
        }
    }

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("scrape_run_ms").record(ms);
    counter!("scrape_articles_total").increment(articles.len() as u64);

    Ok(articles)
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = r#"
        <div class="tiles late ribbon-cont">
          <div class="ribbon"><div class="ribbon_content"><div class="ribbon_title">
            <a href="https://news.example/a1">Quake</a>
          </div></div></div>
          <div class="ribbon"><div class="ribbon_content"><div class="ribbon_title">
            <a href="https://news.example/a2">Fire</a>
            <a href="https://news.example/a1">Quake again</a>
          </div></div></div>
        </div>
        <div class="other"><a href="https://news.example/skip">Nope</a></div>
    "#;

    #[test]
    fn index_links_match_container_and_dedup() {
        let links = collect_index_links(INDEX);
        assert_eq!(
            links,
            vec![
                "https://news.example/a1".to_string(),
                "https://news.example/a2".to_string()
            ]
        );
    }

    #[test]
    fn article_parses_title_date_body() {
        let html = r#"
            <div class="article__title"><h1> Magnitude 7.4 quake rocks region </h1></div>
            <div class="article__date-published">December 4, 2023 | 3:40pm</div>
            <div class="article__writeup"><p>First paragraph.</p><p>Second&nbsp;one.</p></div>
        "#;
        let a = parse_article("https://news.example/a1", html).unwrap();
        assert_eq!(a.title, "Magnitude 7.4 quake rocks region");
        assert_eq!(a.body, "First paragraph.\nSecond one.");
        // 3:40pm UTC+8 == 07:40 UTC
        assert_eq!(a.posted_at.to_rfc3339(), "2023-12-04T07:40:00+00:00");
    }

    #[test]
    fn missing_title_is_an_error() {
        let html = r#"<div class="article__date-published">December 4, 2023 | 3:40pm</div>"#;
        assert!(parse_article("https://news.example/bad", html).is_err());
    }

    #[test]
    fn bad_date_is_an_error() {
        let html = r#"
            <div class="article__title"><h1>Title</h1></div>
            <div class="article__date-published">yesterday-ish</div>
        "#;
        assert!(parse_article("https://news.example/bad", html).is_err());
    }

    #[tokio::test]
    async fn one_broken_article_does_not_abort_the_rest() {
        let good = r#"
            <div class="article__title"><h1>Typhoon floods town</h1></div>
            <div class="article__date-published">September 3, 2023 | 9:05am</div>
            <div class="article__writeup"><p>Rain.</p></div>
        "#;
        let fetcher = FixtureFetcher::new()
            .with_page("https://news.example/", INDEX)
            .with_page("https://news.example/a2", good);
        // a1 has no fixture -> fetch error -> skipped
        let articles = scrape(&fetcher, "https://news.example/").await.unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Typhoon floods town");
    }
}
