use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

/// Placeholder replaced by the formatted chapter number in a URL template.
pub const CHAPTER_PLACEHOLDER: &str = "{n}";

pub const DEFAULT_PAD_WIDTH: usize = 3;

/// Where a serial lives and how to pull a chapter's text out of its page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    #[serde(flatten)]
    pub locator: ChapterLocator,
    #[serde(default)]
    pub extract: ExtractionRule,
}

/// How chapter numbers map to pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChapterLocator {
    /// Either a template containing `{n}` or a base the chapter number is appended to.
    Template {
        url: String,
        #[serde(default)]
        chapter_format: ChapterFormat,
    },
    /// Saved `.html` pages, numbered by the `Chapter <n>` in their file names.
    Directory {
        dir: PathBuf,
        /// Only files whose name contains this are considered.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name_contains: Option<String>,
    },
    /// Explicit pages; the first one is chapter 1.
    List { urls: Vec<String> },
}

impl ChapterLocator {
    pub fn template(url: impl Into<String>, chapter_format: ChapterFormat) -> Self {
        Self::Template {
            url: url.into(),
            chapter_format,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::Directory { .. })
    }
}

impl std::fmt::Display for ChapterLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Template { url, .. } => f.write_str(url),
            Self::Directory { dir, .. } => write!(f, "{}", dir.display()),
            Self::List { urls } => write!(f, "{} listed chapter(s)", urls.len()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChapterFormat {
    #[default]
    Plain,
    Padded {
        #[serde(default = "default_pad_width")]
        width: usize,
    },
    Html,
}

fn default_pad_width() -> usize {
    DEFAULT_PAD_WIDTH
}

impl ChapterFormat {
    pub fn format(&self, chapter: u64) -> String {
        match self {
            Self::Plain => chapter.to_string(),
            Self::Padded { width } => {
                let width = *width;
                format!("{chapter:0width$}")
            }
            Self::Html => format!("{chapter}.html"),
        }
    }
}

/// Constraints an element must satisfy to count as the chapter body.
///
/// Every supplied constraint must match. With none supplied the whole
/// document is used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Drop the text of script/style-like elements.
    #[serde(default)]
    pub sanitize: bool,
}

impl ExtractionRule {
    pub fn is_unconstrained(&self) -> bool {
        self.tag.is_none() && self.class.is_none() && self.id.is_none()
    }
}

impl std::fmt::Display for ExtractionRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_unconstrained() {
            return f.write_str("<document>");
        }
        f.write_str(self.tag.as_deref().unwrap_or("*"))?;
        if let Some(id) = &self.id {
            write!(f, "#{id}")?;
        }
        if let Some(class) = &self.class {
            write!(f, ".{class}")?;
        }
        Ok(())
    }
}

impl SourceDescriptor {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("read source file: {}", path.display()))?;
        let source: Self = serde_yaml::from_str(&yaml)
            .with_context(|| format!("parse source file: {}", path.display()))?;
        source.validate()?;
        Ok(source)
    }

    /// Checks that need no I/O. Directory contents are checked by [`Self::catalog`].
    pub fn validate(&self) -> anyhow::Result<()> {
        match &self.locator {
            ChapterLocator::Template {
                url,
                chapter_format,
            } => {
                if url.trim().is_empty() {
                    anyhow::bail!("source url must not be empty");
                }
                if let ChapterFormat::Padded { width: 0 } = chapter_format {
                    anyhow::bail!("padded chapter format needs a width of at least 1");
                }
                template_url(url, *chapter_format, 1).context("build url for chapter 1")?;
            }
            ChapterLocator::Directory { dir, .. } => {
                if dir.as_os_str().is_empty() {
                    anyhow::bail!("chapter directory must not be empty");
                }
            }
            ChapterLocator::List { urls } => {
                if urls.is_empty() {
                    anyhow::bail!("chapter list must contain at least one url");
                }
                for raw in urls {
                    parse_http_url(raw)?;
                }
            }
        }
        for (name, value) in [
            ("tag", &self.extract.tag),
            ("class", &self.extract.class),
            ("id", &self.extract.id),
        ] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                anyhow::bail!("extraction {name} must not be blank");
            }
        }
        Ok(())
    }

    /// Resolves the locator into the chapters it can serve. Scans the
    /// directory for directory sources.
    pub fn catalog(&self) -> anyhow::Result<ChapterCatalog> {
        match &self.locator {
            ChapterLocator::Template {
                url,
                chapter_format,
            } => Ok(ChapterCatalog::Template {
                url: url.clone(),
                chapter_format: *chapter_format,
            }),
            ChapterLocator::Directory { dir, name_contains } => {
                scan_chapter_dir(dir, name_contains.as_deref()).map(ChapterCatalog::Listed)
            }
            ChapterLocator::List { urls } => {
                let mut chapters = BTreeMap::new();
                for (chapter, raw) in (1..).zip(urls) {
                    chapters.insert(chapter, parse_http_url(raw)?);
                }
                if chapters.is_empty() {
                    anyhow::bail!("chapter list must contain at least one url");
                }
                Ok(ChapterCatalog::Listed(chapters))
            }
        }
    }
}

/// The chapters a source can serve, keyed by chapter number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChapterCatalog {
    /// Every chapter number maps to a URL; there is no last chapter.
    Template {
        url: String,
        chapter_format: ChapterFormat,
    },
    Listed(BTreeMap<u64, Url>),
}

impl ChapterCatalog {
    pub fn chapter_url(&self, chapter: u64) -> anyhow::Result<Url> {
        match self {
            Self::Template {
                url,
                chapter_format,
            } => template_url(url, *chapter_format, chapter),
            Self::Listed(chapters) => chapters
                .get(&chapter)
                .cloned()
                .with_context(|| format!("chapter {chapter} is not in the source")),
        }
    }

    pub fn contains(&self, chapter: u64) -> bool {
        match self {
            Self::Template { .. } => true,
            Self::Listed(chapters) => chapters.contains_key(&chapter),
        }
    }

    /// The chapter that follows `chapter`, if any.
    pub fn next_after(&self, chapter: u64) -> Option<u64> {
        match self {
            Self::Template { .. } => chapter.checked_add(1),
            Self::Listed(chapters) => chapters
                .range(chapter.saturating_add(1)..)
                .next()
                .map(|(next, _)| *next)
                .filter(|next| *next > chapter),
        }
    }

    pub fn last(&self) -> Option<u64> {
        match self {
            Self::Template { .. } => None,
            Self::Listed(chapters) => chapters.keys().next_back().copied(),
        }
    }

    /// Listed chapter numbers, in order. Empty for templates.
    pub fn chapters(&self) -> Vec<u64> {
        match self {
            Self::Template { .. } => Vec::new(),
            Self::Listed(chapters) => chapters.keys().copied().collect(),
        }
    }
}

fn template_url(
    template: &str,
    chapter_format: ChapterFormat,
    chapter: u64,
) -> anyhow::Result<Url> {
    let number = chapter_format.format(chapter);
    let raw = if template.contains(CHAPTER_PLACEHOLDER) {
        template.replace(CHAPTER_PLACEHOLDER, &number)
    } else {
        format!("{template}{number}")
    };
    parse_http_url(&raw)
}

fn parse_http_url(raw: &str) -> anyhow::Result<Url> {
    let url = Url::parse(raw).with_context(|| format!("parse chapter url: {raw}"))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        anyhow::bail!("chapter url must be http/https: {url}");
    }
    Ok(url)
}

fn scan_chapter_dir(
    dir: &Path,
    name_contains: Option<&str>,
) -> anyhow::Result<BTreeMap<u64, Url>> {
    let dir = std::fs::canonicalize(dir)
        .with_context(|| format!("open chapter directory: {}", dir.display()))?;
    let pattern = Regex::new(r"(?i)chapter[\s_-]*(\d+)").context("compile chapter pattern")?;

    let mut names = Vec::new();
    for entry in std::fs::read_dir(&dir)
        .with_context(|| format!("read chapter directory: {}", dir.display()))?
    {
        let entry = entry.with_context(|| format!("read entry in {}", dir.display()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if !name.to_ascii_lowercase().ends_with(".html") {
            continue;
        }
        if let Some(needle) = name_contains
            && !name.contains(needle)
        {
            continue;
        }
        names.push((name.to_owned(), path));
    }
    names.sort();

    let mut chapters = BTreeMap::new();
    for (name, path) in names {
        let Some(number) = pattern
            .captures(&name)
            .and_then(|caps| caps.get(1))
            .and_then(|digits| digits.as_str().parse::<u64>().ok())
        else {
            tracing::debug!(file = %name, "no chapter number in file name; ignoring");
            continue;
        };
        let url = Url::from_file_path(&path).map_err(|()| {
            anyhow::anyhow!("chapter file path is not absolute: {}", path.display())
        })?;
        if chapters.contains_key(&number) {
            tracing::warn!(
                chapter = number,
                file = %name,
                "duplicate chapter file; keeping the first"
            );
            continue;
        }
        chapters.insert(number, url);
    }

    if chapters.is_empty() {
        anyhow::bail!("no chapter files found in {}", dir.display());
    }
    tracing::info!(dir = %dir.display(), chapters = chapters.len(), "chapter directory scanned");
    Ok(chapters)
}
