use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use novelcast::speech::{SpeechEngine, SpeechSession, Voice};

#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Speak,
    FailOpen,
    FailDrive,
    Hang,
}

#[derive(Debug, Default)]
pub struct SpeechLog {
    pub opened: usize,
    pub released: usize,
    pub spoken: Vec<String>,
    pub voices_set: Vec<String>,
    pub rates_set: Vec<u32>,
}

/// In-memory engine. Each `open_session` consumes the next scripted behavior;
/// once the script runs out every session speaks normally, except for text
/// containing `fail_marker`, which always fails to drive.
#[derive(Clone, Default)]
pub struct StubEngine {
    pub log: Arc<Mutex<SpeechLog>>,
    script: Arc<Mutex<VecDeque<Behavior>>>,
    voices: Vec<Voice>,
    fail_marker: Option<String>,
}

#[allow(dead_code)]
impl StubEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_voices(mut self, ids: &[&str]) -> Self {
        self.voices = ids
            .iter()
            .map(|id| Voice {
                id: (*id).to_owned(),
                name: id.to_uppercase(),
            })
            .collect();
        self
    }

    pub fn with_script(self, behaviors: &[Behavior]) -> Self {
        self.script
            .lock()
            .expect("script lock")
            .extend(behaviors.iter().copied());
        self
    }

    pub fn failing_on(mut self, marker: &str) -> Self {
        self.fail_marker = Some(marker.to_owned());
        self
    }

    pub fn opened(&self) -> usize {
        self.log.lock().expect("speech log lock").opened
    }

    pub fn released(&self) -> usize {
        self.log.lock().expect("speech log lock").released
    }

    pub fn spoken(&self) -> Vec<String> {
        self.log.lock().expect("speech log lock").spoken.clone()
    }

    pub fn voices_set(&self) -> Vec<String> {
        self.log.lock().expect("speech log lock").voices_set.clone()
    }
}

#[async_trait]
impl SpeechEngine for StubEngine {
    async fn open_session(&self) -> anyhow::Result<Box<dyn SpeechSession>> {
        let behavior = self
            .script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or(Behavior::Speak);
        if behavior == Behavior::FailOpen {
            anyhow::bail!("engine refused to start");
        }

        self.log.lock().expect("speech log lock").opened += 1;
        Ok(Box::new(StubSession {
            log: Arc::clone(&self.log),
            voices: self.voices.clone(),
            behavior,
            fail_marker: self.fail_marker.clone(),
            queue: Vec::new(),
            released: false,
        }))
    }
}

struct StubSession {
    log: Arc<Mutex<SpeechLog>>,
    voices: Vec<Voice>,
    behavior: Behavior,
    fail_marker: Option<String>,
    queue: Vec<String>,
    released: bool,
}

#[async_trait]
impl SpeechSession for StubSession {
    fn voices(&self) -> Vec<Voice> {
        self.voices.clone()
    }

    fn set_rate(&mut self, rate: u32) -> anyhow::Result<()> {
        self.log.lock().expect("speech log lock").rates_set.push(rate);
        Ok(())
    }

    fn set_pitch(&mut self, _pitch: f32) -> anyhow::Result<()> {
        Ok(())
    }

    fn set_voice(&mut self, voice: &Voice) -> anyhow::Result<()> {
        self.log
            .lock()
            .expect("speech log lock")
            .voices_set
            .push(voice.id.clone());
        Ok(())
    }

    fn enqueue(&mut self, text: &str) -> anyhow::Result<()> {
        self.queue.push(text.to_owned());
        Ok(())
    }

    async fn run_and_wait(&mut self) -> anyhow::Result<()> {
        match self.behavior {
            Behavior::FailDrive => anyhow::bail!("run loop already started"),
            Behavior::Hang => std::future::pending::<()>().await,
            Behavior::Speak | Behavior::FailOpen => {}
        }
        if let Some(marker) = self.fail_marker.as_deref()
            && self.queue.iter().any(|text| text.contains(marker))
        {
            anyhow::bail!("engine choked on utterance");
        }
        let queue = std::mem::take(&mut self.queue);
        self.log
            .lock()
            .expect("speech log lock")
            .spoken
            .extend(queue);
        Ok(())
    }

    fn stop(&mut self) {
        if !self.released {
            self.released = true;
            self.log.lock().expect("speech log lock").released += 1;
        }
    }
}
