use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;

use crate::cli::ListenArgs;
use crate::espeak::EspeakEngine;
use crate::fetch::fetcher_for;
use crate::pipeline::{ChapterPipeline, PipelineConfig, PipelineSummary};
use crate::speech::SpeechDriver;

pub async fn run(args: ListenArgs) -> anyhow::Result<()> {
    let source = args.source.resolve().context("resolve source")?;
    let fetcher = fetcher_for(&source, args.fetch.timeout())?;

    let engine = EspeakEngine::discover(args.speech.engine.clone())
        .await
        .context("start speech engine")?;
    let driver = SpeechDriver::new(Arc::new(engine), args.speech.profile())
        .with_utterance_timeout(args.speech.utterance_timeout());
    driver.preflight().await.context("check speech settings")?;

    let config = PipelineConfig {
        start: args.start,
        end: args.end,
        fetch_policy: args.fetch.policy(),
        speech_policy: args.speech.policy(),
        strategy: args.segmentation.strategy(),
        chapter_pause: Duration::from_millis(args.chapter_pause_ms),
    };
    let mut pipeline = ChapterPipeline::new(source, fetcher, driver, config)
        .context("build chapter pipeline")?;

    match run_until_interrupted(&mut pipeline, tokio::signal::ctrl_c()).await {
        Some(summary) => tracing::info!(%summary, "all chapters processed"),
        None => tracing::info!(resume_from = pipeline.cursor(), "interrupted; stopping"),
    }
    Ok(())
}

/// Runs `pipeline` until it finishes or `signal` fires. Returns `None` when
/// interrupted, leaving the pipeline stopped with its cursor on the chapter
/// that was in progress.
///
/// A signal that resolves with an error is logged and ignored: the pipeline
/// keeps running.
pub async fn run_until_interrupted<S>(
    pipeline: &mut ChapterPipeline,
    signal: S,
) -> Option<PipelineSummary>
where
    S: Future<Output = std::io::Result<()>>,
{
    let interrupt = async {
        if let Err(err) = signal.await {
            tracing::warn!(?err, "cannot listen for interrupts; continuing without them");
            std::future::pending::<()>().await;
        }
    };

    let interrupted_while = tokio::select! {
        biased;
        () = interrupt => pipeline.state(),
        summary = pipeline.run() => return Some(summary),
    };

    pipeline.stop();
    tracing::info!(
        chapter = pipeline.cursor(),
        ?interrupted_while,
        state = ?pipeline.state(),
        "pipeline interrupted"
    );
    None
}
