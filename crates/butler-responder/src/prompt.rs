//! Prompt assembly for generate and chat requests

use butler_core::{ChatPayload, GeneratePayload};

use crate::error::ResponderError;

/// Build the summary prompt
///
/// # Errors
///
/// Returns [`ResponderError::UnsupportedInput`] for base64 content, which
/// the capability cannot read.
pub fn generate(payload: &GeneratePayload) -> Result<String, ResponderError> {
    if payload.is_base64 {
        return Err(ResponderError::UnsupportedInput);
    }

    let mut prompt = String::new();
    if let Some(system) = payload.system_prompt.as_deref().filter(|s| !s.is_empty()) {
        prompt.push_str(system);
        prompt.push_str("\n\n");
    }
    if let Some(user) = payload.user_prompt.as_deref().filter(|s| !s.is_empty()) {
        prompt.push_str(user);
        prompt.push_str("\n\n");
    }
    prompt.push_str("Paper Content:\n");
    prompt.push_str(&payload.content);

    Ok(prompt)
}

/// Build the conversation prompt
///
/// Base64 paper content is left out rather than rejected.
///
/// # Errors
///
/// Returns [`ResponderError::EmptyConversation`] when there is no message to
/// respond to.
pub fn chat(payload: &ChatPayload) -> Result<String, ResponderError> {
    let last = payload.conversation.last().ok_or(ResponderError::EmptyConversation)?;

    let mut prompt = String::from("Conversation history:\n");
    for message in &payload.conversation {
        prompt.push_str(&format!("{}: {}\n\n", message.role, message.content));
    }

    if !payload.is_base64
        && let Some(pdf) = payload.pdf_content.as_deref().filter(|p| !p.is_empty())
    {
        prompt.push_str("\nPaper content:\n");
        prompt.push_str(pdf);
        prompt.push_str("\n\n");
    }

    prompt.push_str("Please respond to: ");
    prompt.push_str(&last.content);

    Ok(prompt)
}
