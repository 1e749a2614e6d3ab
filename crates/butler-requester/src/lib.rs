//! Host-side half of the Butler browser AI bridge
//!
//! A [`Requester`] emits requests onto a shared [`butler_core::EventBus`],
//! correlates the page's progress and terminal events by request id, and
//! resolves each call with the final text or a descriptive error.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod options;
mod pending;
mod requester;

pub use options::RequestOptions;
pub use requester::{DEFAULT_USER_PROMPT, ProgressFn, Requester, TEST_MESSAGE};
