//! Response Parser: extracts `repl` code blocks and the `FINAL_VAR` directive
//! from an assistant reply.
//!
//! Grounded on the ReAct-style `Action:`/`Final Answer:` extraction in
//! `agents/parser.rs`, adapted to fenced code blocks and a line-anchored
//! final-variable directive instead of free-text markers.

use once_cell::sync::Lazy;
use regex::Regex;

/// One fenced code snippet extracted from an assistant reply, in textual order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeSnippet {
    pub code: String,
}

/// The final-variable directive, if present in the reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalDirective {
    /// The bare identifier named by `FINAL_VAR(...)`, quotes stripped.
    pub identifier: String,
}

/// Everything extracted from one assistant reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedReply {
    pub snippets: Vec<CodeSnippet>,
    pub final_directive: Option<FinalDirective>,
}

impl ParsedReply {
    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty() && self.final_directive.is_none()
    }
}

// ```repl ... ``` or ```python ... ``` (canonical tag is `repl`; `python` accepted as alias).
static FENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:repl|python)[ \t]*\r?\n(.*?)```").expect("static fence regex")
});

// FINAL_VAR(name), FINAL_VAR('name'), FINAL_VAR("name"): anchored at line start.
static FINAL_VAR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^FINAL_VAR\(\s*(?:"([A-Za-z_][A-Za-z0-9_]*)"|'([A-Za-z_][A-Za-z0-9_]*)'|([A-Za-z_][A-Za-z0-9_]*))\s*\)"#)
        .expect("static final-var regex")
});

/// Parse one assistant reply into its code snippets and optional final directive.
///
/// The directive is only recognized outside fenced blocks; a `FINAL_VAR(...)`
/// that merely appears as text inside a `repl` block is not a directive.
pub fn parse(reply: &str) -> ParsedReply {
    let snippets = FENCE_RE
        .captures_iter(reply)
        .map(|cap| CodeSnippet {
            code: cap[1].to_string(),
        })
        .collect();

    let outside_fences = strip_fenced_blocks(reply);
    let final_directive = FINAL_VAR_RE.captures(&outside_fences).map(|cap| {
        let identifier = cap
            .get(1)
            .or_else(|| cap.get(2))
            .or_else(|| cap.get(3))
            .expect("final-var regex always captures one alternative")
            .as_str()
            .to_string();
        FinalDirective { identifier }
    });

    ParsedReply {
        snippets,
        final_directive,
    }
}

/// Replace the contents of every fenced block with blank lines of equal
/// line count, so a `FINAL_VAR(...)` directive inside a code block's text
/// (e.g. in a comment or string literal) is never mistaken for the real
/// directive, while line numbers outside fences are preserved for anchoring.
fn strip_fenced_blocks(reply: &str) -> String {
    FENCE_RE
        .replace_all(reply, |caps: &regex::Captures| {
            let newlines = caps[0].matches('\n').count();
            "\n".repeat(newlines)
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_single_snippet() {
        let reply = "Let's check.\n```repl\nprint(1 + 1)\n```\n";
        let parsed = parse(reply);
        assert_eq!(parsed.snippets.len(), 1);
        assert_eq!(parsed.snippets[0].code, "print(1 + 1)\n");
        assert!(parsed.final_directive.is_none());
    }

    #[test]
    fn extracts_multiple_snippets_in_order() {
        let reply = "```repl\na = 1\n```\ntext\n```repl\nb = 2\n```\n";
        let parsed = parse(reply);
        assert_eq!(parsed.snippets.len(), 2);
        assert_eq!(parsed.snippets[0].code, "a = 1\n");
        assert_eq!(parsed.snippets[1].code, "b = 2\n");
    }

    #[test]
    fn accepts_python_tag_as_alias() {
        let reply = "```python\nx = 42\n```\n";
        assert_eq!(parse(reply).snippets[0].code, "x = 42\n");
    }

    #[test]
    fn extracts_final_directive_bare_identifier() {
        let parsed = parse("FINAL_VAR(answer)\n");
        assert_eq!(parsed.final_directive.unwrap().identifier, "answer");
    }

    #[test]
    fn extracts_final_directive_quoted_identifier() {
        assert_eq!(
            parse("FINAL_VAR('answer')\n").final_directive.unwrap().identifier,
            "answer"
        );
        assert_eq!(
            parse("FINAL_VAR(\"answer\")\n").final_directive.unwrap().identifier,
            "answer"
        );
    }

    #[test]
    fn only_first_directive_is_used() {
        let reply = "FINAL_VAR(first)\nFINAL_VAR(second)\n";
        assert_eq!(parse(reply).final_directive.unwrap().identifier, "first");
    }

    #[test]
    fn directive_must_be_at_line_start() {
        let reply = "the model said FINAL_VAR(x) inline\n";
        assert!(parse(reply).final_directive.is_none());
    }

    #[test]
    fn directive_inside_fence_is_not_recognized() {
        let reply = "```repl\n# FINAL_VAR(oops) is just a comment here\nprint('ok')\n```\n";
        assert!(parse(reply).final_directive.is_none());
    }

    #[test]
    fn both_artefacts_can_appear_in_one_reply() {
        let reply = "```repl\nanswer = 42\n```\nFINAL_VAR(answer)\n";
        let parsed = parse(reply);
        assert_eq!(parsed.snippets.len(), 1);
        assert_eq!(parsed.final_directive.unwrap().identifier, "answer");
    }

    #[test]
    fn empty_reply_has_no_artefacts() {
        assert!(parse("just some prose, no code").is_empty());
    }
}
