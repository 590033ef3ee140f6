use crate::error::ApiError;

/// Maximum length of one transcript fragment
const MAX_FRAGMENT_LENGTH: usize = 2000;
/// Maximum length of a user message on the stateless chat route
const MAX_USER_MESSAGE_LENGTH: usize = 5000;
/// Maximum number of messages accepted on the stateless chat route
const MAX_CHAT_MESSAGES: usize = 200;
const MAX_CONVERSATION_ID_LENGTH: usize = 64;

/// Validate a fragment submission. Blank text is allowed through: the
/// accumulator treats it as a no-op rather than an error.
pub fn validate_fragment(text: &str) -> Result<(), ApiError> {
    if text.chars().count() > MAX_FRAGMENT_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Fragment too long (max {} characters)",
            MAX_FRAGMENT_LENGTH
        )));
    }
    Ok(())
}

/// Conversation ids are 1-64 characters of ASCII letters, digits, `-` or `_`
pub fn validate_conversation_id(id: &str) -> Result<(), ApiError> {
    if id.is_empty() {
        return Err(ApiError::InvalidInput(
            "Conversation id cannot be empty".to_string(),
        ));
    }
    if id.len() > MAX_CONVERSATION_ID_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Conversation id too long (max {} characters)",
            MAX_CONVERSATION_ID_LENGTH
        )));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ApiError::InvalidInput(format!(
            "Invalid conversation id: {}",
            id
        )));
    }
    Ok(())
}

/// Validate one message of a client-supplied history. Assistant messages may
/// carry a full stored response (image included), so only user text is bounded.
pub fn validate_chat_message(role: &str, content: &str) -> Result<(), ApiError> {
    match role {
        "user" => {
            if content.chars().count() > MAX_USER_MESSAGE_LENGTH {
                return Err(ApiError::InvalidInput(format!(
                    "Message too long (max {} characters)",
                    MAX_USER_MESSAGE_LENGTH
                )));
            }
            Ok(())
        }
        "assistant" => Ok(()),
        other => Err(ApiError::InvalidInput(format!(
            "Unsupported role: {}. Expected user or assistant",
            other
        ))),
    }
}

pub fn validate_chat_length(count: usize) -> Result<(), ApiError> {
    if count == 0 {
        return Err(ApiError::InvalidInput(
            "At least one message is required".to_string(),
        ));
    }
    if count > MAX_CHAT_MESSAGES {
        return Err(ApiError::InvalidInput(format!(
            "Too many messages (max {})",
            MAX_CHAT_MESSAGES
        )));
    }
    Ok(())
}
