use async_trait::async_trait;

use super::errors::ControlError;

/// A source of answers to interactive questions.
///
/// `ask` is the only place evaluation suspends; it resolves once an answer is
/// available, or with `None` when the input is exhausted.
#[async_trait]
pub trait Prompt: Send {
    async fn ask(&mut self, question: &str) -> Result<Option<String>, ControlError>;
}
