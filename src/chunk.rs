//! Paragraph-boundary text chunker.
//!
//! Splits a document's text into [`Fragment`]s of at most `max_tokens`
//! (approximated as four characters per token). Paragraphs (`\n\n`) are packed
//! greedily; a paragraph that is too long on its own is cut at the last
//! newline or space before the limit.

use uuid::Uuid;

use crate::models::{Document, Fragment};

const CHARS_PER_TOKEN: usize = 4;

/// Split a document into fragments with contiguous positions starting at 0.
/// A blank document yields no fragments.
pub fn fragment_document(document: &Document, max_tokens: usize) -> Vec<Fragment> {
    let max_bytes = max_tokens.max(1).saturating_mul(CHARS_PER_TOKEN);
    let mut pieces: Vec<String> = Vec::new();
    let mut current = String::new();

    for para in document.text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let would_be = if current.is_empty() {
            trimmed.len()
        } else {
            current.len() + 2 + trimmed.len()
        };
        if would_be > max_bytes && !current.is_empty() {
            pieces.push(std::mem::take(&mut current));
        }

        if trimmed.len() > max_bytes {
            pieces.extend(hard_split(trimmed, max_bytes));
            continue;
        }

        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(trimmed);
    }
    if !current.is_empty() {
        pieces.push(current);
    }

    pieces
        .into_iter()
        .enumerate()
        .map(|(position, text)| Fragment {
            id: Uuid::new_v4().to_string(),
            document_id: document.id.clone(),
            position,
            text,
        })
        .collect()
}

/// Cut an oversized paragraph into pieces of at most `max_bytes`, preferring
/// newline then space boundaries and never splitting a UTF-8 character.
fn hard_split(text: &str, max_bytes: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_bytes {
            out.push(remaining.trim().to_string());
            break;
        }

        let mut limit = max_bytes;
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }
        if limit == 0 {
            // A single character wider than the budget.
            limit = remaining
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(remaining.len());
        }

        let window = &remaining[..limit];
        let cut = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .map(|pos| pos + 1)
            .unwrap_or(limit);

        let piece = remaining[..cut].trim();
        if !piece.is_empty() {
            out.push(piece.to_string());
        }
        remaining = &remaining[cut..];
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PostMetadata;

    fn doc(text: &str) -> Document {
        Document {
            id: "doc1".to_string(),
            file_name: "post.md".to_string(),
            relative_path: "post.md".to_string(),
            text: text.to_string(),
            metadata: PostMetadata::default(),
        }
    }

    #[test]
    fn test_small_text_single_fragment() {
        let frags = fragment_document(&doc("Hello, world!"), 700);
        assert_eq!(frags.len(), 1);
        assert_eq!(frags[0].position, 0);
        assert_eq!(frags[0].text, "Hello, world!");
        assert_eq!(frags[0].document_id, "doc1");
    }

    #[test]
    fn test_empty_text() {
        assert!(fragment_document(&doc(""), 700).is_empty());
        assert!(fragment_document(&doc("   \n\n \n"), 700).is_empty());
    }

    #[test]
    fn test_huge_limit_does_not_overflow() {
        let frags = fragment_document(&doc("First.\n\nSecond."), usize::MAX);
        assert_eq!(frags.len(), 1);
    }

    #[test]
    fn test_paragraphs_packed_under_limit() {
        let frags = fragment_document(&doc("First.\n\nSecond.\n\nThird."), 700);
        assert_eq!(frags.len(), 1);
        assert_eq!(frags[0].text, "First.\n\nSecond.\n\nThird.");
    }

    #[test]
    fn test_positions_contiguous_and_within_budget() {
        let text = (0..50)
            .map(|i| format!("Paragraph number {}.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let frags = fragment_document(&doc(&text), 10);
        assert!(frags.len() > 1);
        for (i, f) in frags.iter().enumerate() {
            assert_eq!(f.position, i);
            assert!(f.text.len() <= 40, "fragment too long: {:?}", f.text);
        }
    }

    #[test]
    fn test_long_paragraph_split_on_spaces() {
        let text = "word ".repeat(100);
        let frags = fragment_document(&doc(&text), 5);
        assert!(frags.len() > 1);
        assert!(frags.iter().all(|f| f.text.len() <= 20));
        assert!(frags.iter().all(|f| !f.text.starts_with(' ')));
    }

    #[test]
    fn test_multibyte_text_does_not_panic() {
        let text = "é".repeat(30);
        let frags = fragment_document(&doc(&text), 1);
        let joined: String = frags.iter().map(|f| f.text.as_str()).collect();
        assert_eq!(joined, text);
    }

    #[test]
    fn test_fragment_ids_unique() {
        let frags = fragment_document(&doc("A\n\nB\n\nC"), 1);
        let mut ids: Vec<&str> = frags.iter().map(|f| f.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), frags.len());
    }
}
