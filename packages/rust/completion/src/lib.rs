//! Completion service abstraction and the HTTP client behind it.
//!
//! Hook answering only depends on [`CompletionService`], so tests and
//! alternative backends can stand in for [`ChatCompletionClient`].

use std::future::Future;

use outlinekb_shared::Result;

mod chat;

pub use chat::ChatCompletionClient;

/// Something that can turn a role description plus a prompt into text.
pub trait CompletionService: Send + Sync {
    /// Ask for a single completion. Errors are reported, never panicked on.
    fn complete(
        &self,
        system_role: &str,
        user_prompt: &str,
        temperature: f32,
    ) -> impl Future<Output = Result<String>> + Send;
}
