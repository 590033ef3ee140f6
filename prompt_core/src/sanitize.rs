use std::borrow::Cow;

use llm_core::Role;
use tracing::debug;

use crate::{StructuredResponse, Turn};

/// Longest prefix of `text` holding at most `max_chars` characters.
pub fn clamp_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Text of `turn` as it may be shown to the language model.
///
/// Assistant turns that hold a stored response payload are reduced to its
/// `message`, so image data and JSON never reach the model. Every turn is
/// then clamped to `max_chars`. Applying this twice yields the same text.
pub fn sanitize_turn(turn: &Turn, max_chars: usize) -> String {
    match turn.role {
        Role::Assistant => {
            // clamping can cut a longer text down to something that parses
            // as a payload, so peel and clamp until nothing changes
            let mut text = clamp_chars(&unwrap_payload(&turn.text), max_chars).to_string();
            loop {
                let next = clamp_chars(&unwrap_payload(&text), max_chars).to_string();
                if next == text {
                    return text;
                }
                text = next;
            }
        }
        Role::User | Role::System => clamp_chars(&turn.text, max_chars).to_string(),
    }
}

fn unwrap_payload(text: &str) -> Cow<'_, str> {
    let mut current = Cow::Borrowed(text);
    // payloads echoed more than once nest; peel until plain text remains
    while current.trim_start().starts_with('{') {
        match StructuredResponse::parse(&current) {
            Ok(payload) => current = Cow::Owned(payload.message),
            Err(err) => {
                debug!("Stored assistant turn is not a response payload, forwarding as-is: {err}");
                break;
            }
        }
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assistant(text: &str) -> Turn {
        Turn::new(Role::Assistant, text)
    }

    #[test]
    fn test_payload_reduced_to_message() {
        let turn = assistant(r#"{"message":"a glowing orb","image":"data:image/png;base64,AAAA"}"#);
        assert_eq!(sanitize_turn(&turn, 1000), "a glowing orb");
    }

    #[test]
    fn test_plain_assistant_text_untouched() {
        assert_eq!(sanitize_turn(&assistant("a glowing orb"), 1000), "a glowing orb");
    }

    #[test]
    fn test_malformed_payload_falls_back_to_raw() {
        let raw = r#"{"prompt":"not our shape"}"#;
        assert_eq!(sanitize_turn(&assistant(raw), 1000), raw);
        let broken = r#"{"message":"cut off"#;
        assert_eq!(sanitize_turn(&assistant(broken), 1000), broken);
    }

    #[test]
    fn test_user_json_is_not_unwrapped() {
        let raw = r#"{"message":"hi","image":null}"#;
        let turn = Turn::new(Role::User, raw);
        assert_eq!(sanitize_turn(&turn, 1000), raw);
    }

    #[test]
    fn test_clamp_bounds_length_on_char_boundary() {
        let turn = Turn::new(Role::User, "ééééé");
        assert_eq!(sanitize_turn(&turn, 3), "ééé");
        assert_eq!(clamp_chars("abc", 0), "");
        assert_eq!(clamp_chars("abc", 10), "abc");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let nested = serde_json::json!({
            "message": serde_json::json!({"message": "deep orb", "image": null}).to_string(),
            "image": "data:image/png;base64,AAAA"
        })
        .to_string();
        let cases = [
            assistant(r#"{"message":"a glowing orb","image":"x"}"#),
            assistant(&nested),
            assistant(r#"{"other":1}"#),
            assistant(&"long text ".repeat(50)),
            assistant(r#"{"message":"a","image":null} and then more words"#),
            Turn::new(Role::User, "plain words"),
        ];
        for turn in cases {
            let once = sanitize_turn(&turn, 40);
            let twice = sanitize_turn(&Turn::new(turn.role, once.clone()), 40);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_payload_exposed_by_clamp_is_peeled() {
        let turn = assistant(r#"{"message":"a","image":null} and then more words"#);
        assert_eq!(sanitize_turn(&turn, 28), "a");
    }

    #[test]
    fn test_clamp_at_every_boundary_is_stable_and_json_free() {
        let inner = serde_json::json!({"message": "inner orb", "image": null}).to_string();
        let nested = serde_json::json!({"message": inner, "image": "data:image/png;base64,AAAA"}).to_string();
        let inputs = [
            format!("{inner} trailing words after the payload"),
            format!("{nested}{nested}"),
            format!("{inner}{inner}"),
            r#"{"message":"{\"message\":\"x\",\"image\":null} tail","image":null}"#.to_string(),
        ];
        for input in &inputs {
            for max_chars in 0..=input.chars().count() + 1 {
                let once = sanitize_turn(&assistant(input), max_chars);
                let twice = sanitize_turn(&assistant(&once), max_chars);
                assert_eq!(once, twice, "input {input:?} at {max_chars}");
                assert!(once.chars().count() <= max_chars);
                assert!(
                    StructuredResponse::parse(&once).is_err(),
                    "payload forwarded for {input:?} at {max_chars}: {once:?}"
                );
            }
        }
    }
}
