//! Text normalization and token-budget truncation.
//!
//! Every piece of text sent to the embedding provider passes through
//! [`truncate`] first: whitespace is trimmed, empty input collapses to a
//! single space (the provider rejects empty strings), and anything over the
//! token budget keeps its leading tokens and drops the tail.
//!
//! Token accounting uses a 4-characters-per-token estimate. Budgets are
//! applied on `char` boundaries, never bytes, so multi-byte sequences are
//! never split into invalid fragments.

/// Approximate chars-per-token ratio for the embedding provider.
const CHARS_PER_TOKEN: usize = 4;

/// Estimated token count of `text` under the chars-per-token heuristic.
pub fn token_estimate(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Normalize `text` and bound it to `max_tokens`.
///
/// Trims surrounding whitespace, substitutes `" "` for empty input, and
/// keeps at most `max_tokens * 4` leading characters. Idempotent:
/// `truncate(truncate(t, n), n) == truncate(t, n)`.
///
/// `max_tokens` must be at least 1; config validation enforces this.
pub fn truncate(text: &str, max_tokens: usize) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return " ".to_string();
    }

    let max_chars = max_tokens * CHARS_PER_TOKEN;
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }

    let kept: String = trimmed.chars().take(max_chars).collect();
    let kept = kept.trim_end();
    if kept.is_empty() {
        " ".to_string()
    } else {
        kept.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_passes_through() {
        assert_eq!(truncate("hello world", 100), "hello world");
    }

    #[test]
    fn trims_surrounding_whitespace() {
        assert_eq!(truncate("  padded  ", 100), "padded");
    }

    #[test]
    fn empty_and_whitespace_become_single_space() {
        assert_eq!(truncate("", 100), " ");
        assert_eq!(truncate("   ", 100), " ");
        assert_eq!(truncate("\n\t  \n", 100), " ");
    }

    #[test]
    fn output_fits_token_budget() {
        let text = "abcd".repeat(100);
        for budget in [1, 3, 7, 50, 200] {
            let out = truncate(&text, budget);
            assert!(
                token_estimate(&out) <= budget,
                "budget {} exceeded: {} tokens",
                budget,
                token_estimate(&out)
            );
        }
    }

    #[test]
    fn truncation_keeps_leading_text() {
        let text = "0123456789abcdef";
        // 2 tokens => 8 chars
        assert_eq!(truncate(text, 2), "01234567");
    }

    #[test]
    fn idempotent() {
        let cases = [
            "".to_string(),
            "   ".to_string(),
            "short".to_string(),
            "word ".repeat(500),
            "日本語のテキスト".repeat(50),
        ];
        for text in &cases {
            for budget in [1, 4, 16, 100] {
                let once = truncate(text, budget);
                let twice = truncate(&once, budget);
                assert_eq!(once, twice, "not idempotent for budget {}", budget);
            }
        }
    }

    #[test]
    fn multibyte_chars_never_split() {
        // Each char here is multi-byte in UTF-8; a byte-based cut would panic
        // or produce invalid sequences.
        let text = "日本語テスト".repeat(20);
        let out = truncate(&text, 3);
        assert!(out.chars().count() <= 12);
        assert!(text.starts_with(&out));
    }

    #[test]
    fn trailing_whitespace_at_cut_is_trimmed() {
        // Cut lands right after a space; result must stay trimmed so a
        // second pass is a no-op.
        let text = "abcdefg ijklmnop";
        let out = truncate(text, 2);
        assert_eq!(out, out.trim());
    }
}
