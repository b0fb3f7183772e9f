use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use url::Url;

use crate::fetch::{ChapterFetcher, fetch_with_retry};
use crate::retry::{RetryOutcome, RetryPolicy};
use crate::segment::{Segment, SegmentStrategy};
use crate::source::{ChapterCatalog, SourceDescriptor};
use crate::speech::SpeechDriver;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub start: u64,
    /// Inclusive ceiling. `None` keeps going until the process is stopped or
    /// the source runs out of chapters.
    pub end: Option<u64>,
    pub fetch_policy: RetryPolicy,
    pub speech_policy: RetryPolicy,
    pub strategy: SegmentStrategy,
    pub chapter_pause: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            start: 1,
            end: None,
            fetch_policy: RetryPolicy::fetch_default(),
            speech_policy: RetryPolicy::speech_default(),
            strategy: SegmentStrategy::default(),
            chapter_pause: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Fetching,
    Segmenting,
    Speaking,
    Advancing,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChapterStatus {
    Completed { spoken: usize, failed: usize },
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterReport {
    pub chapter: u64,
    pub url: Option<Url>,
    pub status: ChapterStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    pub chapters: u64,
    pub skipped: u64,
    pub segments_spoken: u64,
    pub segments_failed: u64,
}

impl PipelineSummary {
    fn record(&mut self, report: &ChapterReport) {
        self.chapters += 1;
        match report.status {
            ChapterStatus::Completed { spoken, failed } => {
                self.segments_spoken += spoken as u64;
                self.segments_failed += failed as u64;
            }
            ChapterStatus::Skipped => self.skipped += 1,
        }
    }
}

impl fmt::Display for PipelineSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} chapter(s), {} skipped, {} segment(s) spoken, {} failed",
            self.chapters, self.skipped, self.segments_spoken, self.segments_failed
        )
    }
}

/// Walks the chapter cursor forward: fetch, segment, speak, advance.
pub struct ChapterPipeline {
    source: SourceDescriptor,
    catalog: ChapterCatalog,
    fetcher: Arc<dyn ChapterFetcher>,
    driver: SpeechDriver,
    config: PipelineConfig,
    cursor: u64,
    halted: bool,
    state: PipelineState,
}

impl ChapterPipeline {
    pub fn new(
        source: SourceDescriptor,
        fetcher: Arc<dyn ChapterFetcher>,
        driver: SpeechDriver,
        config: PipelineConfig,
    ) -> anyhow::Result<Self> {
        source.validate().context("validate source")?;
        let catalog = source.catalog().context("resolve source chapters")?;
        if !catalog.contains(config.start) {
            anyhow::bail!(
                "starting chapter {} is not in the source (available: {})",
                config.start,
                describe_chapters(&catalog.chapters())
            );
        }
        config
            .strategy
            .validate()
            .context("validate segmentation")?;
        if let Some(end) = config.end
            && end < config.start
        {
            anyhow::bail!(
                "last chapter ({end}) is before the starting chapter ({})",
                config.start
            );
        }

        Ok(Self {
            cursor: config.start,
            source,
            catalog,
            fetcher,
            driver,
            config,
            halted: false,
            state: PipelineState::Idle,
        })
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.halted
            || self.config.end.is_some_and(|end| self.cursor > end)
            || self.catalog.last().is_some_and(|last| self.cursor > last)
    }

    /// Marks the pipeline as stopped from outside, e.g. after an interrupt.
    /// The cursor is left on the chapter that was in progress.
    pub fn stop(&mut self) {
        self.halted = true;
        self.state = PipelineState::Stopped;
    }

    /// Runs until the ceiling or the source's last chapter is passed. An
    /// open-ended template source only returns if the cursor overflows; stop
    /// it by dropping the future.
    pub async fn run(&mut self) -> PipelineSummary {
        let mut summary = PipelineSummary::default();
        tracing::info!(
            start = self.cursor,
            end = ?self.config.end,
            source = %self.source.locator,
            "pipeline started"
        );

        while let Some(report) = self.step().await {
            summary.record(&report);
            if !self.is_finished() && !self.config.chapter_pause.is_zero() {
                tokio::time::sleep(self.config.chapter_pause).await;
            }
        }

        tracing::info!(cursor = self.cursor, %summary, "pipeline stopped");
        summary
    }

    /// Processes the chapter under the cursor and advances by one. Returns
    /// `None` once the pipeline is finished.
    pub async fn step(&mut self) -> Option<ChapterReport> {
        if self.is_finished() {
            self.state = PipelineState::Stopped;
            return None;
        }

        let chapter = self.cursor;
        let report = self.process_chapter(chapter).await;

        self.state = PipelineState::Advancing;
        log_report(&report);
        match self.catalog.next_after(chapter) {
            Some(next) => self.cursor = next,
            None => {
                self.cursor = chapter.saturating_add(1);
                self.halted = true;
            }
        }
        Some(report)
    }

    async fn process_chapter(&mut self, chapter: u64) -> ChapterReport {
        self.state = PipelineState::Fetching;
        let url = match self.catalog.chapter_url(chapter) {
            Ok(url) => url,
            Err(err) => {
                tracing::error!(chapter, error = %format!("{err:#}"), "cannot build chapter url; skipping");
                return ChapterReport {
                    chapter,
                    url: None,
                    status: ChapterStatus::Skipped,
                };
            }
        };
        tracing::info!(chapter, %url, "processing chapter");

        let text = match fetch_with_retry(
            self.fetcher.as_ref(),
            &self.config.fetch_policy,
            &url,
            &self.source.extract,
        )
        .await
        {
            RetryOutcome::Succeeded { value, attempts } => {
                tracing::info!(chapter, attempts, chars = value.chars().count(), "chapter fetched");
                value
            }
            RetryOutcome::Exhausted { attempts, .. } => {
                tracing::error!(chapter, %url, attempts, "fetch failed; skipping chapter");
                return ChapterReport {
                    chapter,
                    url: Some(url),
                    status: ChapterStatus::Skipped,
                };
            }
        };

        self.state = PipelineState::Segmenting;
        let segments = crate::segment::segment(&text, self.config.strategy);
        tracing::debug!(chapter, segments = segments.len(), "chapter segmented");

        self.state = PipelineState::Speaking;
        let mut spoken = 0;
        let mut failed = 0;
        for segment in &segments {
            if self.speak_segment(chapter, segment, segments.len()).await {
                spoken += 1;
            } else {
                failed += 1;
            }
        }

        ChapterReport {
            chapter,
            url: Some(url),
            status: ChapterStatus::Completed { spoken, failed },
        }
    }

    async fn speak_segment(&self, chapter: u64, segment: &Segment, total: usize) -> bool {
        let driver = &self.driver;
        let outcome = crate::retry::retry(&self.config.speech_policy, "speak", |attempt| async move {
            tracing::debug!(chapter, segment = segment.index, total, attempt, "speak attempt");
            driver.speak(segment).await.into_result()
        })
        .await;

        match outcome {
            RetryOutcome::Succeeded { .. } => true,
            RetryOutcome::Exhausted { attempts, .. } => {
                tracing::error!(
                    chapter,
                    segment = segment.index,
                    total,
                    attempts,
                    "segment could not be spoken; moving on"
                );
                false
            }
        }
    }
}

fn log_report(report: &ChapterReport) {
    match report.status {
        ChapterStatus::Completed { spoken, failed: 0 } => {
            tracing::info!(chapter = report.chapter, spoken, "chapter finished");
        }
        ChapterStatus::Completed { spoken, failed } => {
            tracing::warn!(
                chapter = report.chapter,
                spoken,
                failed,
                "chapter finished with unspoken segments"
            );
        }
        ChapterStatus::Skipped => {
            tracing::warn!(chapter = report.chapter, "chapter skipped");
        }
    }
}

fn describe_chapters(chapters: &[u64]) -> String {
    match (chapters.first(), chapters.last()) {
        (Some(first), Some(last)) => format!("{} chapter(s), {first}..={last}", chapters.len()),
        _ => "none".to_owned(),
    }
}
