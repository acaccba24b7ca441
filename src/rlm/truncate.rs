//! Output Truncator: bounds captured text to an informative head/tail window.

/// Reduce `text` to a bounded representation.
///
/// If `text`'s character length is at or below `head_budget + tail_budget`,
/// it is returned verbatim. Otherwise the result is the first `head_budget`
/// characters, a single elision marker line, and the last `tail_budget`
/// characters. Slicing happens on Unicode scalar values, never mid-codepoint.
pub fn truncate(text: &str, head_budget: usize, tail_budget: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    let threshold = head_budget + tail_budget;
    if chars.len() <= threshold {
        return text.to_string();
    }

    let head: String = chars[..head_budget].iter().collect();
    let tail: String = chars[chars.len() - tail_budget..].iter().collect();
    let elided = chars.len() - head_budget - tail_budget;

    format!("{head}\n{}\n{tail}", elision_marker(elided))
}

/// The exact marker line emitted when elision occurs, documented to the
/// model by the Prompt Assembler so it is never mistaken for payload content.
pub fn elision_marker(elided_chars: usize) -> String {
    format!("[...{elided_chars} characters elided by RLM output truncation...]")
}

/// Returns the substring that would be produced by `elision_marker` so
/// callers can detect whether a truncated blob still contains it (e.g. to
/// decide whether a hard re-truncation pass is needed, per the orchestrator's
/// edge policy for oversized post-elision output).
pub fn is_elision_marker_line(line: &str) -> bool {
    line.starts_with("[...") && line.ends_with("characters elided by RLM output truncation...]")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_returned_verbatim() {
        assert_eq!(truncate("hello", 10, 10), "hello");
    }

    #[test]
    fn text_at_threshold_is_not_truncated() {
        let text = "a".repeat(20);
        assert_eq!(truncate(&text, 10, 10), text);
    }

    #[test]
    fn long_text_is_truncated_with_marker() {
        let text = "a".repeat(5000) + &"b".repeat(5000);
        let out = truncate(&text, 10, 10);
        assert!(out.starts_with(&"a".repeat(10)));
        assert!(out.ends_with(&"b".repeat(10)));
        let elided_line = out.lines().nth(1).unwrap();
        assert!(is_elision_marker_line(elided_line));
        assert!(elided_line.contains("9980"));
    }

    #[test]
    fn marker_reports_exact_elided_count() {
        let text = "x".repeat(100);
        let out = truncate(&text, 10, 10);
        assert!(out.contains("80 characters elided"));
    }

    #[test]
    fn multibyte_text_is_never_split_mid_codepoint() {
        let text = "é".repeat(50);
        let out = truncate(&text, 5, 5);
        // every remaining char must still be a full 'é', not a stray byte
        assert!(out.chars().all(|c| c == 'é' || c == '\n' || c.is_ascii()));
    }
}
