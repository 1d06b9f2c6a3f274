//! Per-number report lines and outbound chunking.

use crate::domain::ProbeOutcome;

/// Render one report line for a probed number.
pub fn render_line(phone: &str, name: &str, outcome: &ProbeOutcome) -> String {
    match outcome {
        ProbeOutcome::Registered {
            first_name,
            last_name,
            username,
        } => {
            let mut who = format!("{first_name} {last_name}").trim().to_string();
            if let Some(u) = username {
                if !u.is_empty() {
                    if !who.is_empty() {
                        who.push(' ');
                    }
                    who.push('@');
                    who.push_str(u);
                }
            }
            if who.is_empty() {
                format!("✅ {phone} {name} - registered")
            } else {
                format!("✅ {phone} {name} - registered ({who})")
            }
        }
        ProbeOutcome::NotRegistered => format!("❌ {phone} {name} - not registered"),
        ProbeOutcome::Transient { message } => {
            format!("⚠️ {phone} {name} - check failed: {message}")
        }
        ProbeOutcome::RateLimited { wait_seconds } => {
            format!("⚠️ {phone} {name} - rate limited, wait {wait_seconds}s")
        }
        ProbeOutcome::SessionInvalid => format!("⚠️ {phone} {name} - session invalid"),
    }
}

/// Split outbound text into chunks of at most `limit` characters.
///
/// The split is purely positional; line breaks are not respected. Front-ends
/// with a hard message size cap consume these as-is.
pub fn chunk_text(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);

    let mut out = Vec::new();
    let mut chunk = String::new();
    let mut count = 0usize;

    for ch in text.chars() {
        chunk.push(ch);
        count += 1;
        if count == limit {
            out.push(std::mem::take(&mut chunk));
            count = 0;
        }
    }
    if !chunk.is_empty() || out.is_empty() {
        out.push(chunk);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_line_includes_profile_and_username() {
        let line = render_line(
            "+380991234567",
            "Ivan Petrov",
            &ProbeOutcome::Registered {
                first_name: "Ivan".to_string(),
                last_name: "".to_string(),
                username: Some("ivanp".to_string()),
            },
        );
        assert_eq!(line, "✅ +380991234567 Ivan Petrov - registered (Ivan @ivanp)");
    }

    #[test]
    fn registered_line_without_profile_fields() {
        let line = render_line(
            "+11",
            "X",
            &ProbeOutcome::Registered {
                first_name: "".to_string(),
                last_name: "".to_string(),
                username: None,
            },
        );
        assert_eq!(line, "✅ +11 X - registered");
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        assert_eq!(chunk_text("hello", 4000), vec!["hello".to_string()]);
        assert_eq!(chunk_text("", 4000), vec![String::new()]);
    }

    #[test]
    fn chunks_split_on_length_without_regard_for_line_breaks() {
        let text = "abcde\nfghij";
        let chunks = chunk_text(text, 4);
        assert_eq!(chunks, vec!["abcd", "e\nfg", "hij"]);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn exact_multiple_of_limit_has_no_empty_tail() {
        let chunks = chunk_text("abcdef", 3);
        assert_eq!(chunks, vec!["abc", "def"]);
    }

    #[test]
    fn chunking_counts_characters_not_bytes() {
        let text = "✅✅✅✅";
        let chunks = chunk_text(text, 2);
        assert_eq!(chunks, vec!["✅✅", "✅✅"]);
    }
}
