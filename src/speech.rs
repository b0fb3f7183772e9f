use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;

use crate::segment::Segment;

pub const DEFAULT_RATE: u32 = 450;
pub const DEFAULT_PITCH: f32 = 0.5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VoiceProfile {
    /// Words per minute.
    pub rate: u32,
    /// Normalized to `0.0..=1.0`; engines map it onto their own range.
    pub pitch: f32,
    /// Index into the engine's voice list. `None` keeps the engine default.
    pub voice_index: Option<usize>,
}

impl Default for VoiceProfile {
    fn default() -> Self {
        Self {
            rate: DEFAULT_RATE,
            pitch: DEFAULT_PITCH,
            voice_index: None,
        }
    }
}

impl VoiceProfile {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.rate == 0 {
            anyhow::bail!("speech rate must be greater than 0");
        }
        if !(0.0..=1.0).contains(&self.pitch) {
            anyhow::bail!("speech pitch must be within 0.0..=1.0: {}", self.pitch);
        }
        Ok(())
    }
}

/// Picks the voice at `index`, falling back to the first voice when the index
/// is out of range.
pub fn select_voice(voices: &[Voice], index: usize) -> Option<&Voice> {
    match voices.get(index) {
        Some(voice) => Some(voice),
        None => {
            let fallback = voices.first()?;
            tracing::warn!(
                index,
                available = voices.len(),
                fallback = %fallback.id,
                "voice index out of range; using first voice"
            );
            Some(fallback)
        }
    }
}

#[async_trait]
pub trait SpeechEngine: Send + Sync {
    /// Creates a brand-new session. Sessions are never shared or reused.
    async fn open_session(&self) -> anyhow::Result<Box<dyn SpeechSession>>;
}

#[async_trait]
pub trait SpeechSession: Send {
    fn voices(&self) -> Vec<Voice>;
    fn set_rate(&mut self, rate: u32) -> anyhow::Result<()>;
    fn set_pitch(&mut self, pitch: f32) -> anyhow::Result<()>;
    fn set_voice(&mut self, voice: &Voice) -> anyhow::Result<()>;
    fn enqueue(&mut self, text: &str) -> anyhow::Result<()>;
    /// Blocks until every queued utterance has been spoken.
    async fn run_and_wait(&mut self) -> anyhow::Result<()>;
    /// Stops speaking and releases engine resources. Must be idempotent.
    fn stop(&mut self);
}

#[derive(Debug)]
pub enum SpeechOutcome {
    Spoken,
    Failed(anyhow::Error),
}

impl SpeechOutcome {
    pub fn into_result(self) -> anyhow::Result<()> {
        match self {
            Self::Spoken => Ok(()),
            Self::Failed(err) => Err(err),
        }
    }
}

/// Releases the session on every exit path, including cancellation.
struct SessionGuard {
    session: Box<dyn SpeechSession>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.session.stop();
    }
}

#[derive(Clone)]
pub struct SpeechDriver {
    engine: Arc<dyn SpeechEngine>,
    profile: VoiceProfile,
    utterance_timeout: Option<Duration>,
}

impl SpeechDriver {
    pub fn new(engine: Arc<dyn SpeechEngine>, profile: VoiceProfile) -> Self {
        Self {
            engine,
            profile,
            utterance_timeout: None,
        }
    }

    pub fn with_utterance_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.utterance_timeout = timeout;
        self
    }

    pub fn profile(&self) -> &VoiceProfile {
        &self.profile
    }

    /// Checks the profile against a throwaway session before any chapter is
    /// processed.
    pub async fn preflight(&self) -> anyhow::Result<()> {
        self.profile.validate().context("validate voice profile")?;

        let guard = SessionGuard {
            session: self
                .engine
                .open_session()
                .await
                .context("open speech session")?,
        };
        let voices = guard.session.voices();
        tracing::debug!(voices = voices.len(), "speech engine ready");

        if let Some(index) = self.profile.voice_index {
            if voices.is_empty() {
                anyhow::bail!("voice index {index} requested but the engine reports no voices");
            }
            if index >= voices.len() {
                tracing::warn!(
                    index,
                    available = voices.len(),
                    "voice index out of range; sessions will use the first voice"
                );
            }
        }
        Ok(())
    }

    /// Speaks one segment on a fresh session.
    pub async fn speak(&self, segment: &Segment) -> SpeechOutcome {
        match self.try_speak(segment).await {
            Ok(()) => SpeechOutcome::Spoken,
            Err(err) => SpeechOutcome::Failed(err),
        }
    }

    async fn try_speak(&self, segment: &Segment) -> anyhow::Result<()> {
        let mut guard = SessionGuard {
            session: self
                .engine
                .open_session()
                .await
                .context("open speech session")?,
        };
        let session = guard.session.as_mut();

        session
            .set_rate(self.profile.rate)
            .context("set speech rate")?;
        session
            .set_pitch(self.profile.pitch)
            .context("set speech pitch")?;
        if let Some(index) = self.profile.voice_index {
            let voices = session.voices();
            if let Some(voice) = select_voice(&voices, index) {
                session.set_voice(voice).context("set voice")?;
            }
        }
        session.enqueue(&segment.text).context("queue utterance")?;

        tracing::info!(
            segment = segment.index,
            chars = segment.text.chars().count(),
            "speaking segment"
        );
        match self.utterance_timeout {
            Some(timeout) => tokio::time::timeout(timeout, session.run_and_wait())
                .await
                .map_err(|_| anyhow::anyhow!("speech did not finish within {timeout:?}"))?
                .context("drive speech session")?,
            None => session
                .run_and_wait()
                .await
                .context("drive speech session")?,
        }
        tracing::info!(segment = segment.index, "segment spoken");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voices() -> Vec<Voice> {
        ["en-us", "en-gb", "fr"]
            .into_iter()
            .map(|id| Voice {
                id: id.to_owned(),
                name: id.to_uppercase(),
            })
            .collect()
    }

    #[test]
    fn select_voice_uses_index_when_in_range() {
        let voices = voices();
        assert_eq!(select_voice(&voices, 1).map(|v| v.id.as_str()), Some("en-gb"));
    }

    #[test]
    fn select_voice_falls_back_to_first() {
        let voices = voices();
        assert_eq!(select_voice(&voices, 26).map(|v| v.id.as_str()), Some("en-us"));
        assert_eq!(select_voice(&[], 0), None);
    }

    #[test]
    fn profile_rejects_zero_rate_and_wild_pitch() {
        assert!(VoiceProfile::default().validate().is_ok());
        let zero_rate = VoiceProfile {
            rate: 0,
            ..VoiceProfile::default()
        };
        assert!(zero_rate.validate().is_err());
        let high_pitch = VoiceProfile {
            pitch: 2.5,
            ..VoiceProfile::default()
        };
        assert!(high_pitch.validate().is_err());
    }
}
