use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::sync::mpsc as std_mpsc;
use std::thread;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::errors::ControlError;
use super::traits::Prompt;

/// Whitespace is stripped everywhere, then `y`/`yes` in any case is affirmative.
pub fn is_affirmative(answer: &str) -> bool {
    let normalized: String = answer
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    matches!(normalized.as_str(), "y" | "yes")
}

type Line = io::Result<Option<String>>;

/// Writes the question to stdout and reads one line from stdin.
///
/// Lines are read on a plain thread that owns the reader, one per request.
/// A cancelled `ask` leaves its request outstanding and the next `ask` takes
/// that line, so nothing in the async runtime is ever stuck on the read.
pub struct StdinPrompt {
    requests: std_mpsc::Sender<()>,
    lines: mpsc::UnboundedReceiver<Line>,
    pending: bool,
}

impl StdinPrompt {
    pub fn new() -> Self {
        Self::from_reader(io::BufReader::new(io::stdin()))
    }

    pub fn from_reader<R>(mut reader: R) -> Self
    where
        R: BufRead + Send + 'static,
    {
        let (requests, request_rx) = std_mpsc::channel::<()>();
        let (line_tx, lines) = mpsc::unbounded_channel();

        let spawned = thread::Builder::new()
            .name("prompt-reader".to_string())
            .spawn(move || {
                while request_rx.recv().is_ok() {
                    let mut line = String::new();
                    let read = match reader.read_line(&mut line) {
                        Ok(0) => Ok(None),
                        Ok(_) => Ok(Some(line)),
                        Err(err) => Err(err),
                    };
                    let finished = !matches!(read, Ok(Some(_)));
                    if line_tx.send(read).is_err() || finished {
                        return;
                    }
                }
            });
        if let Err(error) = spawned {
            tracing::warn!(%error, "cannot start prompt reader; treating input as closed");
        }

        Self {
            requests,
            lines,
            pending: false,
        }
    }
}

impl Default for StdinPrompt {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Prompt for StdinPrompt {
    async fn ask(&mut self, question: &str) -> Result<Option<String>, ControlError> {
        {
            let mut stdout = io::stdout().lock();
            stdout.write_all(question.as_bytes())?;
            stdout.flush()?;
        }

        if !self.pending {
            if self.requests.send(()).is_err() {
                return Ok(None);
            }
            self.pending = true;
        }

        let line = self.lines.recv().await;
        self.pending = false;
        match line {
            Some(read) => Ok(read?),
            None => Ok(None),
        }
    }
}

/// Replays canned answers, then reports end of input.
#[derive(Debug, Clone, Default)]
pub struct ScriptedPrompt {
    answers: VecDeque<String>,
    asked: Vec<String>,
}

impl ScriptedPrompt {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            asked: Vec::new(),
        }
    }

    /// Questions asked so far, in order.
    pub fn asked(&self) -> &[String] {
        &self.asked
    }
}

#[async_trait]
impl Prompt for ScriptedPrompt {
    async fn ask(&mut self, question: &str) -> Result<Option<String>, ControlError> {
        self.asked.push(question.to_string());
        Ok(self.answers.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn affirmative_answers() {
        for answer in ["y", "Y", "yes", "YES", " yEs \n", "y e s", "\tY\r\n"] {
            assert!(is_affirmative(answer), "{answer:?}");
        }
        for answer in ["", "n", "no", "yeah", "yes please", "ok", "1"] {
            assert!(!is_affirmative(answer), "{answer:?}");
        }
    }

    #[tokio::test]
    async fn scripted_prompt_replays_then_ends() {
        let mut prompt = ScriptedPrompt::new(["yes", "n"]);
        assert_eq!(prompt.ask("q1").await.unwrap().as_deref(), Some("yes"));
        assert_eq!(prompt.ask("q2").await.unwrap().as_deref(), Some("n"));
        assert_eq!(prompt.ask("q3").await.unwrap(), None);
        assert_eq!(prompt.asked(), &["q1", "q2", "q3"]);
    }

    /// Blocks every read until a line is released through the channel.
    struct Gated(std_mpsc::Receiver<String>);

    impl io::Read for Gated {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            unreachable!("only read through BufRead")
        }
    }

    impl BufRead for Gated {
        fn fill_buf(&mut self) -> io::Result<&[u8]> {
            unreachable!("read_line is overridden")
        }

        fn consume(&mut self, _amt: usize) {}

        fn read_line(&mut self, buf: &mut String) -> io::Result<usize> {
            match self.0.recv() {
                Ok(line) => {
                    buf.push_str(&line);
                    Ok(line.len())
                }
                Err(_) => Ok(0),
            }
        }
    }

    #[tokio::test]
    async fn reader_prompt_returns_lines_then_end_of_input() {
        let mut prompt = StdinPrompt::from_reader(io::Cursor::new("yes\nno\n"));
        assert_eq!(prompt.ask("q1").await.unwrap().as_deref(), Some("yes\n"));
        assert_eq!(prompt.ask("q2").await.unwrap().as_deref(), Some("no\n"));
        assert_eq!(prompt.ask("q3").await.unwrap(), None);
        assert_eq!(prompt.ask("q4").await.unwrap(), None);
    }

    #[tokio::test]
    async fn abandoned_question_does_not_block_and_keeps_its_answer() {
        let (release, gate) = std_mpsc::channel();
        let mut prompt = StdinPrompt::from_reader(Gated(gate));

        let waited = tokio::time::timeout(std::time::Duration::from_millis(50), prompt.ask("q1")).await;
        assert!(waited.is_err());

        release.send("y\n".to_string()).unwrap();
        assert_eq!(prompt.ask("q2").await.unwrap().as_deref(), Some("y\n"));

        drop(release);
        assert_eq!(prompt.ask("q3").await.unwrap(), None);
    }
}
