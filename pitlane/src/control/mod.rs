mod errors;
mod interrupt;
mod prompt;
mod traits;

pub use errors::ControlError;
pub use interrupt::Interrupt;
pub use prompt::{ScriptedPrompt, StdinPrompt, is_affirmative};
pub use traits::Prompt;
