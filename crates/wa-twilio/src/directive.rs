//! Image-generation directive embedded in reply text
//!
//! The model is prompted to request images with an in-text marker of the form
//! `[img:"<prompt>"]`. The marker convention lives entirely in this module so
//! it can be swapped for a structured directive without touching the handler.

use std::sync::OnceLock;

use regex::Regex;

const DIRECTIVE_PATTERN: &str = r#"\[img:"([^"]*)"\]"#;

fn directive_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(DIRECTIVE_PATTERN).expect("directive pattern compiles"))
}

/// Split a reply into its user-visible text and an optional image prompt.
///
/// The first marker found is stripped from the visible text; an empty prompt
/// counts as no directive. Replies without a marker pass through unchanged.
pub fn split_image_directive(reply: &str) -> (String, Option<String>) {
    let re = directive_regex();

    let Some(caps) = re.captures(reply) else {
        return (reply.to_string(), None);
    };

    let prompt = caps[1].trim().to_string();
    let visible = re.replace(reply, "").trim().to_string();

    let prompt = if prompt.is_empty() { None } else { Some(prompt) };
    (visible, prompt)
}

/// Render the marker form of a prompt, as recorded in session history when
/// the side-channel fires.
pub fn image_directive_marker(prompt: &str) -> String {
    format!("[img:\"{}\"]", prompt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_without_directive_is_unchanged() {
        let (visible, prompt) = split_image_directive("Just a regular reply.");
        assert_eq!(visible, "Just a regular reply.");
        assert!(prompt.is_none());
    }

    #[test]
    fn test_directive_is_stripped_and_extracted() {
        let (visible, prompt) = split_image_directive(r#"Here you go [img:"a red bicycle"]"#);
        assert_eq!(visible, "Here you go");
        assert_eq!(prompt.as_deref(), Some("a red bicycle"));
    }

    #[test]
    fn test_directive_in_the_middle() {
        let (visible, prompt) = split_image_directive(r#"Sure [img:"a cat"] coming right up"#);
        assert!(visible.starts_with("Sure"));
        assert!(visible.ends_with("coming right up"));
        assert_eq!(prompt.as_deref(), Some("a cat"));
    }

    #[test]
    fn test_empty_prompt_counts_as_no_directive() {
        let (visible, prompt) = split_image_directive(r#"Oops [img:""]"#);
        assert_eq!(visible, "Oops");
        assert!(prompt.is_none());
    }

    #[test]
    fn test_marker_round_trip() {
        let marker = image_directive_marker("a red bicycle");
        let (visible, prompt) = split_image_directive(&marker);
        assert_eq!(visible, "");
        assert_eq!(prompt.as_deref(), Some("a red bicycle"));
    }
}
