//! Contact-info leakage heuristic.
//!
//! Pure scan over outbound free text. Advisory only: the caller sends the
//! message unmodified regardless of the result — no redaction, no blocking.

use serde::Serialize;

use crate::constants::{CONTACT_ADVISORY, CONTACT_CHANNEL_KEYWORDS, PHONE_DIGIT_THRESHOLD};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub flagged: bool,
    pub advisory: Option<String>,
}

/// Scan `text` for contact-sharing patterns. Each rule is independently
/// sufficient to flag, except handle-style tokens which only count when a
/// channel keyword is also present (cuts false positives on plain mentions).
pub fn classify(text: &str) -> Classification {
    let keyword_hit = has_channel_keyword(text);
    let flagged = has_phone_shape(text)
        || has_email_shape(text)
        || keyword_hit
        || (keyword_hit && has_handle_token(text));

    Classification {
        flagged,
        advisory: flagged.then(|| CONTACT_ADVISORY.to_string()),
    }
}

/// 7+ digits in a run, allowing interleaved spaces/dashes/dots/parentheses
/// and a leading `+`. Runs of more than three consecutive separators break
/// the sequence so digits don't accumulate across sentence gaps.
fn has_phone_shape(text: &str) -> bool {
    let mut digits = 0usize;
    let mut separators = 0usize;
    for c in text.chars() {
        if c.is_ascii_digit() {
            digits += 1;
            separators = 0;
            if digits >= PHONE_DIGIT_THRESHOLD {
                return true;
            }
        } else if matches!(c, ' ' | '-' | '.' | '(' | ')' | '+') {
            separators += 1;
            if separators > 3 {
                digits = 0;
            }
        } else {
            digits = 0;
            separators = 0;
        }
    }
    false
}

fn is_local_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'%' | b'+' | b'-')
}

/// `local@domain.tld` shape: non-empty local part, at least one dot in the
/// domain, final label alphabetic and two or more characters.
fn has_email_shape(text: &str) -> bool {
    let bytes = text.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b != b'@' {
            continue;
        }
        if i == 0 || !is_local_byte(bytes[i - 1]) {
            continue;
        }
        // Walk the domain, tracking the start of the current label.
        let mut label_len = 0usize;
        let mut label_alpha = true;
        let mut dots = 0usize;
        let mut j = i + 1;
        while j < bytes.len() {
            let d = bytes[j];
            if d.is_ascii_alphanumeric() || d == b'-' {
                label_len += 1;
                label_alpha &= d.is_ascii_alphabetic();
            } else if d == b'.' && label_len > 0 {
                dots += 1;
                label_len = 0;
                label_alpha = true;
            } else {
                break;
            }
            j += 1;
        }
        if dots > 0 && label_len >= 2 && label_alpha {
            return true;
        }
    }
    false
}

fn has_channel_keyword(text: &str) -> bool {
    let lowered = text.to_lowercase();
    CONTACT_CHANNEL_KEYWORDS.iter().any(|kw| lowered.contains(kw))
}

/// `@word` token at a word boundary, two or more handle characters.
fn has_handle_token(text: &str) -> bool {
    text.split_whitespace().any(|token| {
        let Some(rest) = token.strip_prefix('@') else {
            return false;
        };
        let rest = rest.trim_end_matches(|c: char| !c.is_alphanumeric() && c != '_');
        rest.len() >= 2 && rest.chars().all(|c| c.is_alphanumeric() || c == '_')
    })
}
