use std::process::Stdio;

use anyhow::Context as _;
use async_trait::async_trait;
use tokio::io::AsyncWriteExt as _;
use tokio::process::{Child, Command};

use crate::speech::{SpeechEngine, SpeechSession, Voice};

pub const DEFAULT_PROGRAM: &str = "espeak-ng";

/// Speech engine backed by the `espeak-ng` command line (or a compatible
/// program such as `espeak`). Every utterance runs in its own child process.
#[derive(Debug, Clone)]
pub struct EspeakEngine {
    program: String,
    voices: Vec<Voice>,
}

impl EspeakEngine {
    pub async fn discover(program: impl Into<String>) -> anyhow::Result<Self> {
        let program = program.into();
        let output = Command::new(&program)
            .arg("--voices")
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("run {program} --voices"))?;
        if !output.status.success() {
            anyhow::bail!("{program} --voices failed ({})", output.status);
        }

        let voices = parse_voice_list(&String::from_utf8_lossy(&output.stdout));
        tracing::info!(program = %program, voices = voices.len(), "speech engine discovered");
        Ok(Self { program, voices })
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }
}

#[async_trait]
impl SpeechEngine for EspeakEngine {
    async fn open_session(&self) -> anyhow::Result<Box<dyn SpeechSession>> {
        Ok(Box::new(EspeakSession {
            program: self.program.clone(),
            voices: self.voices.clone(),
            rate: crate::speech::DEFAULT_RATE,
            pitch: to_espeak_pitch(crate::speech::DEFAULT_PITCH),
            voice: None,
            queue: Vec::new(),
            child: None,
        }))
    }
}

struct EspeakSession {
    program: String,
    voices: Vec<Voice>,
    rate: u32,
    pitch: u8,
    voice: Option<String>,
    queue: Vec<String>,
    child: Option<Child>,
}

impl EspeakSession {
    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-s")
            .arg(self.rate.to_string())
            .arg("-p")
            .arg(self.pitch.to_string());
        if let Some(voice) = self.voice.as_deref() {
            cmd.args(["-v", voice]);
        }
        cmd.arg("--stdin")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl SpeechSession for EspeakSession {
    fn voices(&self) -> Vec<Voice> {
        self.voices.clone()
    }

    fn set_rate(&mut self, rate: u32) -> anyhow::Result<()> {
        if rate == 0 {
            anyhow::bail!("rate must be greater than 0");
        }
        self.rate = rate;
        Ok(())
    }

    fn set_pitch(&mut self, pitch: f32) -> anyhow::Result<()> {
        if !(0.0..=1.0).contains(&pitch) {
            anyhow::bail!("pitch must be within 0.0..=1.0: {pitch}");
        }
        self.pitch = to_espeak_pitch(pitch);
        Ok(())
    }

    fn set_voice(&mut self, voice: &Voice) -> anyhow::Result<()> {
        self.voice = Some(voice.id.clone());
        Ok(())
    }

    fn enqueue(&mut self, text: &str) -> anyhow::Result<()> {
        self.queue.push(text.to_owned());
        Ok(())
    }

    async fn run_and_wait(&mut self) -> anyhow::Result<()> {
        for text in std::mem::take(&mut self.queue) {
            let mut child = self
                .command()
                .spawn()
                .with_context(|| format!("spawn {}", self.program))?;
            let mut stdin = child.stdin.take().context("open speech stdin")?;
            self.child = Some(child);

            stdin
                .write_all(text.as_bytes())
                .await
                .context("write speech stdin")?;
            drop(stdin);

            let child = self.child.as_mut().context("speech process vanished")?;
            let status = child.wait().await.context("wait for speech process")?;
            self.child = None;
            if !status.success() {
                anyhow::bail!("{} exited with {status}", self.program);
            }
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.queue.clear();
        if let Some(mut child) = self.child.take()
            && let Err(err) = child.start_kill()
        {
            tracing::debug!(?err, "kill speech process");
        }
    }
}

fn to_espeak_pitch(pitch: f32) -> u8 {
    (pitch.clamp(0.0, 1.0) * 99.0).round() as u8
}

/// Parses the table printed by `espeak-ng --voices`:
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File                 Other Languages
///  5  af              --/M      Afrikaans          gmw/af
/// ```
pub fn parse_voice_list(table: &str) -> Vec<Voice> {
    table
        .lines()
        .filter(|line| !line.trim_start().starts_with("Pty"))
        .filter_map(|line| {
            let mut columns = line.split_whitespace();
            let _priority = columns.next()?;
            let language = columns.next()?;
            let _age_gender = columns.next()?;
            let name = columns.next()?;
            Some(Voice {
                id: language.to_owned(),
                name: name.replace('_', " "),
            })
        })
        .collect()
}
