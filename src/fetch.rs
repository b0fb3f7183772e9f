use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use scraper::{CaseSensitivity, ElementRef, Html};
use url::Url;

use crate::cli::FetchArgs;
use crate::retry::{RetryOutcome, RetryPolicy};
use crate::source::{ExtractionRule, SourceDescriptor};

const PRESENTATION_ONLY: &[&str] = &["script", "style", "noscript", "template"];

#[derive(Debug)]
pub enum FetchOutcome {
    Success(String),
    /// The page loaded but the rule matched nothing, or only whitespace.
    Empty,
    TransientError(anyhow::Error),
}

impl FetchOutcome {
    /// Empty and transient outcomes are both errors: a page that has not
    /// rendered yet looks the same as one with the wrong structure.
    pub fn into_result(self) -> anyhow::Result<String> {
        match self {
            Self::Success(text) => Ok(text),
            Self::Empty => Err(anyhow::anyhow!(
                "no content matched the extraction rule"
            )),
            Self::TransientError(err) => Err(err),
        }
    }
}

/// One retrieval attempt for a chapter page. Implementations never retry.
#[async_trait]
pub trait ChapterFetcher: Send + Sync {
    async fn fetch(&self, url: &Url, rule: &ExtractionRule) -> FetchOutcome;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("build chapter http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ChapterFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, rule: &ExtractionRule) -> FetchOutcome {
        let response = match self
            .client
            .get(url.clone())
            .header(USER_AGENT, concat!("novelcast/", env!("CARGO_PKG_VERSION")))
            .header(ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                return FetchOutcome::TransientError(
                    anyhow::Error::new(err).context(format!("GET {url}")),
                );
            }
        };

        let status = response.status();
        if !status.is_success() {
            return FetchOutcome::TransientError(anyhow::anyhow!("GET {url}: status {status}"));
        }

        let html = match response.text().await {
            Ok(html) => html,
            Err(err) => {
                return FetchOutcome::TransientError(
                    anyhow::Error::new(err).context(format!("read body of {url}")),
                );
            }
        };

        classify(url, &html, rule)
    }
}

/// Reads saved chapter pages from `file://` URLs.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileFetcher;

#[async_trait]
impl ChapterFetcher for FileFetcher {
    async fn fetch(&self, url: &Url, rule: &ExtractionRule) -> FetchOutcome {
        let Ok(path) = url.to_file_path() else {
            return FetchOutcome::TransientError(anyhow::anyhow!("not a local file url: {url}"));
        };
        match tokio::fs::read_to_string(&path).await {
            Ok(html) => classify(url, &html, rule),
            Err(err) => FetchOutcome::TransientError(
                anyhow::Error::new(err).context(format!("read {}", path.display())),
            ),
        }
    }
}

/// Fetcher able to serve every chapter of `source`.
pub fn fetcher_for(
    source: &SourceDescriptor,
    timeout: Duration,
) -> anyhow::Result<Arc<dyn ChapterFetcher>> {
    if source.locator.is_local() {
        return Ok(Arc::new(FileFetcher));
    }
    Ok(Arc::new(HttpFetcher::new(timeout).context("build fetcher")?))
}

fn classify(url: &Url, html: &str, rule: &ExtractionRule) -> FetchOutcome {
    match extract_text(html, rule) {
        Some(text) => FetchOutcome::Success(text),
        None => {
            tracing::debug!(%url, %rule, bytes = html.len(), "extraction rule matched no text");
            FetchOutcome::Empty
        }
    }
}

/// Text of the first element matching `rule`, or of the whole document when
/// the rule has no constraints. `None` when nothing matches or the text is
/// blank.
pub fn extract_text(html: &str, rule: &ExtractionRule) -> Option<String> {
    let document = Html::parse_document(html);
    let root = document.root_element();

    let node = if rule.is_unconstrained() {
        root
    } else {
        root.descendants()
            .filter_map(ElementRef::wrap)
            .find(|element| matches_rule(element, rule))?
    };

    let text = collect_text(node, rule.sanitize);
    if text.trim().is_empty() {
        return None;
    }
    Some(text)
}

fn matches_rule(element: &ElementRef<'_>, rule: &ExtractionRule) -> bool {
    let value = element.value();
    if let Some(tag) = rule.tag.as_deref()
        && !value.name().eq_ignore_ascii_case(tag)
    {
        return false;
    }
    if let Some(id) = rule.id.as_deref()
        && value.id() != Some(id)
    {
        return false;
    }
    if let Some(class) = rule.class.as_deref()
        && !value.has_class(class, CaseSensitivity::CaseSensitive)
    {
        return false;
    }
    true
}

fn collect_text(element: ElementRef<'_>, sanitize: bool) -> String {
    let mut out = String::new();
    for node in element.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        if sanitize
            && node.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .is_some_and(|el| PRESENTATION_ONLY.contains(&el.name()))
            })
        {
            continue;
        }
        out.push_str(text);
    }
    out
}

/// Fetches a single chapter (with retry) and prints its segments.
pub async fn run(args: FetchArgs) -> anyhow::Result<()> {
    let source = args.source.resolve().context("resolve source")?;
    let strategy = args.segmentation.strategy();
    strategy.validate().context("validate segmentation")?;

    let url = source.catalog()?.chapter_url(args.chapter)?;
    let fetcher = fetcher_for(&source, args.fetch.timeout())?;
    let policy = args.fetch.policy();

    tracing::info!(chapter = args.chapter, %url, rule = %source.extract, "fetch chapter");
    let text = fetch_with_retry(fetcher.as_ref(), &policy, &url, &source.extract)
        .await
        .into_result()
        .with_context(|| format!("fetch chapter {} from {url}", args.chapter))?;

    let segments = crate::segment::segment(&text, strategy);
    let total = segments.len();
    let mut stdout = std::io::stdout().lock();
    for segment in segments {
        writeln!(stdout, "[{}/{total}]\n{}\n", segment.index, segment.text.trim())
            .context("write segment")?;
    }
    stdout.flush().context("flush stdout")?;
    Ok(())
}

pub async fn fetch_with_retry(
    fetcher: &dyn ChapterFetcher,
    policy: &RetryPolicy,
    url: &Url,
    rule: &ExtractionRule,
) -> RetryOutcome<String> {
    crate::retry::retry(policy, "fetch", |attempt| async move {
        tracing::debug!(%url, attempt, "fetch attempt");
        fetcher.fetch(url, rule).await.into_result()
    })
    .await
}
