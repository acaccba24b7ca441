//! Prompt Assembler: builds the fixed system prompt and the per-iteration
//! user turns.
//!
//! Grounded on the dynamic-strategy system prompt and urgency-escalating
//! continuation prompt from the retrieval pack's `prompts.rs`, adapted to
//! this engine's actual helper signatures (`llm_query`, `llm_query_batched`,
//! `FINAL_VAR`) and to documenting the truncation marker verbatim, which
//! that source omitted.

use crate::rlm::serializer::ContextDescriptor;
use crate::rlm::truncate::elision_marker;

/// Build the system prompt describing the REPL protocol and available helpers.
pub fn build_system_prompt(payload_binding: &str, head_chars: usize, tail_chars: usize) -> String {
    let marker_example = elision_marker(12345);
    format!(
        "You are operating a Python REPL to answer a task over a payload too large \
to fit in your context window. The payload is available under the variable \
`{payload_binding}`. You interact with the REPL by writing ONE fenced code \
block per reply, tagged `repl`:\n\
\n\
```repl\n\
print({payload_binding})\n\
```\n\
\n\
Code is executed only when it appears inside such a block; prose outside \
the block is not executed. The block's stdout is shown to you in the next \
turn.\n\
\n\
Available helpers inside the REPL:\n\
  llm_query(prompt: str) -> str\n\
      Send `prompt` to a sub-model and return its reply as text. The \
      sub-model cannot see `{payload_binding}` or anything else in your \
      namespace: pass all needed data explicitly in `prompt`.\n\
  llm_query_batched(prompts: list[str]) -> list[str]\n\
      Like llm_query, but issues every prompt concurrently and returns \
      replies in the same order as the input list, regardless of which \
      finishes first. Use this instead of a Python loop of llm_query calls \
      when you have many independent sub-queries.\n\
  FINAL_VAR(name)\n\
      Not a function call you write inside a repl block: it is a directive \
      you emit on its own line, outside any code block, once a variable in \
      the REPL namespace holds your final answer, e.g.:\n\
\n\
FINAL_VAR(answer)\n\
\n\
      `name` must already exist in the REPL namespace at the moment you \
      emit the directive. Emitting it ends the loop; no further code runs \
      after the directive is processed except code in the SAME reply, \
      which still executes first.\n\
\n\
Output shown to you is truncated when long: text over the configured \
threshold keeps its first {head_chars} characters and last {tail_chars} \
characters, with a single marker line in between reporting how many \
characters were elided, for example:\n\
{marker_example}\n\
This marker never appears in real output; if you see it, the surrounding \
text has been shortened, not altered.\n\
\n\
Work iteratively: inspect `{payload_binding}` before acting on it, use \
variables to hold intermediate results, and call llm_query/llm_query_batched \
for sub-tasks you want handled with fresh, isolated context. Emit \
FINAL_VAR(name) as soon as a variable holds the complete answer."
    )
}

/// Build the initial user turn: the task statement plus the Context Descriptor.
pub fn build_initial_user_prompt(task: &str, descriptor: &ContextDescriptor) -> String {
    format!(
        "Task: {task}\n\n\
Context descriptor ({}): {}\n\n\
Begin by inspecting the payload, then work toward FINAL_VAR(name).",
        descriptor.type_label(),
        descriptor.render()
    )
}

/// Build the continuation prompt shown after a turn that produced execution
/// output but no final directive, escalating urgency as the iteration
/// budget is approached.
pub fn build_continue_prompt(iteration: u32, max_iterations: u32) -> String {
    let urgency = if max_iterations <= 3 || iteration + 3 >= max_iterations {
        "You are close to the iteration limit. Finish now, or call \
FINAL_VAR(name) with your best partial answer."
    } else if iteration * 2 >= max_iterations {
        "You are past the halfway point of your iteration budget. Converge \
toward a final answer."
    } else {
        "Continue. Inspect output before deciding the next step."
    };

    format!("[iteration {iteration}/{max_iterations}] {urgency}")
}

/// Build the corrective user turn appended when a reply had neither code
/// nor a final directive.
pub fn build_empty_reply_warning() -> String {
    "Your previous reply contained no code and no final directive. Write a \
fenced ```repl block, or emit FINAL_VAR(name) if a variable already holds \
the answer."
        .to_string()
}

/// Build the corrective user turn appended when `FINAL_VAR` named an
/// identifier absent from the sandbox namespace.
pub fn build_missing_final_var_notice(identifier: &str) -> String {
    format!(
        "FINAL_VAR({identifier}) was rejected: `{identifier}` does not exist \
in the REPL namespace. Define it before re-emitting the directive."
    )
}

/// Build the notice returned in place of a depth-capped `llm_query` call.
pub fn depth_capped_marker() -> String {
    "[llm_query unavailable: recursion depth is capped at this level]".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_documents_helpers_and_marker() {
        let prompt = build_system_prompt("context", 4000, 1000);
        assert!(prompt.contains("llm_query"));
        assert!(prompt.contains("llm_query_batched"));
        assert!(prompt.contains("FINAL_VAR"));
        assert!(prompt.contains("characters elided by RLM output truncation"));
        assert!(prompt.contains("context"));
    }

    #[test]
    fn initial_prompt_includes_task_and_descriptor() {
        let descriptor = ContextDescriptor::Text { char_count: 10 };
        let prompt = build_initial_user_prompt("Return the length.", &descriptor);
        assert!(prompt.contains("Return the length."));
        assert!(prompt.contains("10 characters"));
    }

    #[test]
    fn continue_prompt_escalates_near_budget_limit() {
        let early = build_continue_prompt(1, 20);
        let late = build_continue_prompt(18, 20);
        assert!(early.contains("Continue"));
        assert!(late.contains("close to the iteration limit"));
    }

    #[test]
    fn missing_final_var_notice_names_the_identifier() {
        assert!(build_missing_final_var_notice("answer").contains("answer"));
    }
}
