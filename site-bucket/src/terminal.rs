//! Terminal implementations of the core's status sink and deletion prompt.

use async_trait::async_trait;
use site_bucket_core::contract::{DecisionError, DecisionSource, DeletionChoice, StatusSink};
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};
use tokio::sync::Mutex;
use tracing::debug;

/// Writes each status line to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl StatusSink for StdoutSink {
    fn line(&self, message: &str) {
        let mut out = std::io::stdout().lock();
        // A closed stdout must not abort the run.
        let _ = writeln!(out, "{message}");
    }
}

/// Asks the user on the terminal, re-prompting until one of `d`, `D`, `k`, `K` is entered.
pub struct PromptDecisions<R> {
    input: Mutex<R>,
    sink: StdoutSink,
}

impl PromptDecisions<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R> PromptDecisions<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(input: R) -> Self {
        Self {
            input: Mutex::new(input),
            sink: StdoutSink,
        }
    }
}

pub fn prompt_for(candidate: &str) -> String {
    format!(
        "{candidate} is on S3 but not in your site directory anymore. Do you want to [d]elete, [D]elete all, [k]eep, [K]eep all?"
    )
}

#[async_trait]
impl<R> DecisionSource for PromptDecisions<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn choose(&self, candidate: &str) -> Result<DeletionChoice, DecisionError> {
        let mut input = self.input.lock().await;
        loop {
            self.sink.line(&prompt_for(candidate));
            let mut answer = String::new();
            if input.read_line(&mut answer).await? == 0 {
                return Err(DecisionError::Closed);
            }
            match DeletionChoice::from_input(&answer) {
                Some(choice) => {
                    debug!(key = %candidate, ?choice, "Deletion decision entered");
                    return Ok(choice);
                }
                None => debug!(key = %candidate, answer = %answer.trim(), "Unrecognised answer, asking again"),
            }
        }
    }
}
