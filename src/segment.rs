pub const DEFAULT_FRACTIONAL_PARTS: usize = 2;
pub const DEFAULT_CLUMP_SIZE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentStrategy {
    /// Equal character slices; the last one absorbs the remainder.
    Fractional { parts: usize },
    /// Runs of `sentences` consecutive sentences.
    SentenceClump { sentences: usize },
}

impl Default for SegmentStrategy {
    fn default() -> Self {
        Self::SentenceClump {
            sentences: DEFAULT_CLUMP_SIZE,
        }
    }
}

impl SegmentStrategy {
    pub fn validate(&self) -> anyhow::Result<()> {
        match self {
            Self::Fractional { parts: 0 } => anyhow::bail!("fractional split needs at least 1 part"),
            Self::SentenceClump { sentences: 0 } => {
                anyhow::bail!("sentence clumps need at least 1 sentence")
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// 1-based position within the chapter.
    pub index: usize,
    pub text: String,
}

pub fn segment(text: &str, strategy: SegmentStrategy) -> Vec<Segment> {
    let pieces = match strategy {
        SegmentStrategy::Fractional { parts } => split_fractional(text, parts),
        SegmentStrategy::SentenceClump { sentences } => clump_sentences(text, sentences),
    };

    pieces
        .into_iter()
        .enumerate()
        .map(|(i, text)| Segment { index: i + 1, text })
        .collect()
}

fn split_fractional(text: &str, parts: usize) -> Vec<String> {
    let boundaries = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect::<Vec<_>>();
    let char_count = boundaries.len() - 1;
    // More parts than characters would only add empty slices.
    let parts = parts.clamp(1, char_count.max(1));
    let slice_len = char_count / parts;

    let mut out = Vec::with_capacity(parts);
    for part in 0..parts {
        let start = boundaries[part * slice_len];
        let end = if part + 1 == parts {
            text.len()
        } else {
            boundaries[(part + 1) * slice_len]
        };
        if start < end {
            out.push(text[start..end].to_owned());
        }
    }
    out
}

/// Splits after `.`, `!` or `?` when followed by whitespace. Sentences are
/// trimmed and empty ones dropped.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((offset, ch)) = chars.next() {
        if !matches!(ch, '.' | '!' | '?') {
            continue;
        }
        let Some(&(_, next)) = chars.peek() else {
            continue;
        };
        if !next.is_whitespace() {
            continue;
        }

        sentences.push(&text[start..offset + ch.len_utf8()]);
        while let Some(&(_, ws)) = chars.peek() {
            if !ws.is_whitespace() {
                break;
            }
            chars.next();
        }
        if let Some(&(next_start, _)) = chars.peek() {
            start = next_start;
        } else {
            start = text.len();
        }
    }
    sentences.push(&text[start..]);

    sentences
        .into_iter()
        .map(str::trim)
        .filter(|sentence| !sentence.is_empty())
        .collect()
}

fn clump_sentences(text: &str, sentences_per_clump: usize) -> Vec<String> {
    split_sentences(text)
        .chunks(sentences_per_clump.max(1))
        .map(|clump| clump.join(" "))
        .collect()
}
