use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};

use crate::retry::{MaxAttempts, RetryPolicy};
use crate::segment::SegmentStrategy;
use crate::source::{ChapterFormat, ChapterLocator, ExtractionRule, SourceDescriptor};
use crate::speech::VoiceProfile;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch chapters one after another and read them aloud.
    Listen(ListenArgs),
    /// Fetch a single chapter and print its segments.
    Fetch(FetchArgs),
}

#[derive(Debug, Args)]
pub struct ListenArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub segmentation: SegmentArgs,

    #[command(flatten)]
    pub fetch: FetchRetryArgs,

    #[command(flatten)]
    pub speech: SpeechArgs,

    /// First chapter to read.
    #[arg(long, default_value_t = 1)]
    pub start: u64,

    /// Last chapter to read (inclusive). Runs until interrupted when omitted.
    #[arg(long)]
    pub end: Option<u64>,

    /// Pause between chapters.
    #[arg(long, default_value_t = 1000)]
    pub chapter_pause_ms: u64,
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub segmentation: SegmentArgs,

    #[command(flatten)]
    pub fetch: FetchRetryArgs,

    /// Chapter to fetch.
    #[arg(long, default_value_t = 1)]
    pub chapter: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ChapterFormatArg {
    /// `.../chapter-7`
    Plain,
    /// `.../chapter-007`
    Padded,
    /// `.../chapter-7.html`
    Html,
}

#[derive(Debug, Args)]
#[command(group(
    ArgGroup::new("locator")
        .required(true)
        .multiple(false)
        .args(["source", "url", "dir", "chapter_url"])
))]
pub struct SourceArgs {
    /// Source descriptor YAML file.
    #[arg(long)]
    pub source: Option<PathBuf>,

    /// URL template containing `{n}`, or a base the chapter number is appended to.
    #[arg(long)]
    pub url: Option<String>,

    /// Directory of saved `.html` chapter pages, numbered by `Chapter <n>` in
    /// their file names.
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// With `--dir`, only use files whose name contains this text.
    #[arg(long, requires = "dir")]
    pub name_contains: Option<String>,

    /// Chapter page URL; repeat for each chapter, starting at chapter 1.
    #[arg(long)]
    pub chapter_url: Vec<String>,

    #[arg(long, value_enum, default_value_t = ChapterFormatArg::Plain)]
    pub chapter_format: ChapterFormatArg,

    /// Zero-padding width for `--chapter-format padded`.
    #[arg(long, default_value_t = crate::source::DEFAULT_PAD_WIDTH)]
    pub pad_width: usize,

    /// Tag name of the element holding the chapter text.
    #[arg(long)]
    pub tag: Option<String>,

    /// Class the element must carry.
    #[arg(long)]
    pub class: Option<String>,

    /// Id the element must have.
    #[arg(long)]
    pub id: Option<String>,

    /// Ignore text inside script/style elements.
    #[arg(long)]
    pub sanitize: bool,
}

impl SourceArgs {
    pub fn resolve(&self) -> anyhow::Result<SourceDescriptor> {
        if let Some(path) = &self.source {
            return SourceDescriptor::load(path);
        }

        let locator = if let Some(dir) = &self.dir {
            ChapterLocator::Directory {
                dir: dir.clone(),
                name_contains: self.name_contains.clone(),
            }
        } else if !self.chapter_url.is_empty() {
            ChapterLocator::List {
                urls: self.chapter_url.clone(),
            }
        } else {
            let url = self
                .url
                .clone()
                .context("one of --source, --url, --dir or --chapter-url is required")?;
            let chapter_format = match self.chapter_format {
                ChapterFormatArg::Plain => ChapterFormat::Plain,
                ChapterFormatArg::Padded => ChapterFormat::Padded {
                    width: self.pad_width,
                },
                ChapterFormatArg::Html => ChapterFormat::Html,
            };
            ChapterLocator::template(url, chapter_format)
        };
        let source = SourceDescriptor {
            locator,
            extract: ExtractionRule {
                tag: self.tag.clone(),
                class: self.class.clone(),
                id: self.id.clone(),
                sanitize: self.sanitize,
            },
        };
        source.validate()?;
        Ok(source)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SplitArg {
    /// Equal-length character slices.
    Fractional,
    /// Groups of consecutive sentences.
    Clump,
}

#[derive(Debug, Args)]
pub struct SegmentArgs {
    #[arg(long, value_enum, default_value_t = SplitArg::Clump)]
    pub split: SplitArg,

    /// Number of slices for `--split fractional`.
    #[arg(long, default_value_t = crate::segment::DEFAULT_FRACTIONAL_PARTS)]
    pub parts: usize,

    /// Sentences per segment for `--split clump`.
    #[arg(long, default_value_t = crate::segment::DEFAULT_CLUMP_SIZE)]
    pub clump_size: usize,
}

impl SegmentArgs {
    pub fn strategy(&self) -> SegmentStrategy {
        match self.split {
            SplitArg::Fractional => SegmentStrategy::Fractional { parts: self.parts },
            SplitArg::Clump => SegmentStrategy::SentenceClump {
                sentences: self.clump_size,
            },
        }
    }
}

#[derive(Debug, Args)]
pub struct FetchRetryArgs {
    /// Fetch attempts per chapter (0 retries forever).
    #[arg(long, default_value_t = 5)]
    pub fetch_attempts: u32,

    /// Delay between fetch attempts.
    #[arg(long, default_value_t = 2000)]
    pub fetch_delay_ms: u64,

    /// HTTP request timeout.
    #[arg(long, default_value_t = 10)]
    pub timeout_secs: u64,
}

impl FetchRetryArgs {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            MaxAttempts::from_count(self.fetch_attempts),
            Duration::from_millis(self.fetch_delay_ms),
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Args)]
pub struct SpeechArgs {
    /// Speech program (espeak-ng compatible).
    #[arg(long, default_value = crate::espeak::DEFAULT_PROGRAM)]
    pub engine: String,

    /// Voice index; out-of-range values fall back to the first voice.
    #[arg(long)]
    pub voice_index: Option<usize>,

    /// Words per minute.
    #[arg(long, default_value_t = crate::speech::DEFAULT_RATE)]
    pub rate: u32,

    /// Pitch between 0.0 and 1.0.
    #[arg(long, default_value_t = crate::speech::DEFAULT_PITCH)]
    pub pitch: f32,

    /// Speak attempts per segment, each on a fresh session.
    #[arg(long, default_value_t = 20)]
    pub speech_attempts: u32,

    /// Delay between speak attempts.
    #[arg(long, default_value_t = 1000)]
    pub speech_delay_ms: u64,

    /// Give up on an utterance after this long.
    #[arg(long)]
    pub speech_timeout_secs: Option<u64>,
}

impl SpeechArgs {
    pub fn profile(&self) -> VoiceProfile {
        VoiceProfile {
            rate: self.rate,
            pitch: self.pitch,
            voice_index: self.voice_index,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            MaxAttempts::Limited(self.speech_attempts.max(1)),
            Duration::from_millis(self.speech_delay_ms),
        )
    }

    pub fn utterance_timeout(&self) -> Option<Duration> {
        self.speech_timeout_secs.map(Duration::from_secs)
    }
}
