//! Prompt shaping for model calls.
//!
//! Rewrites a task's raw query into the prompt actually sent to the backend.
//! Shaping is driven by the task's required capabilities and context hints,
//! never by which model happens to be selected, so the same task produces
//! the same prompt everywhere. Code shaping wins over conversation shaping
//! when a task qualifies for both.

use crate::capability::Capability;
use crate::task::Task;

/// Produce the backend prompt for `task`.
///
/// - Code tasks (requiring code generation or completion) with a `language`
///   hint become `Generate {language} code for: {query}`.
/// - Conversational tasks with a non-empty `conversation_history` become a
///   transcript ending in the current query.
/// - Everything else passes the query through verbatim.
pub fn optimize(task: &Task) -> String {
    let is_code_task =
        task.requires(Capability::CodeGeneration) || task.requires(Capability::CodeCompletion);
    if is_code_task {
        if let Some(language) = task.language() {
            return format!("Generate {language} code for: {}", task.query());
        }
    }

    if task.requires(Capability::Conversational) {
        if let Some(history) = task.conversation_history() {
            if !history.is_empty() {
                return render_conversation(&history, task.query());
            }
        }
    }

    task.query().to_string()
}

/// Lay out prior turns as a transcript. Turns alternate starting with the
/// user; the current query is appended as the final user line.
fn render_conversation(history: &[&str], query: &str) -> String {
    let mut prompt = String::from("Continue this conversation:\n");
    for (index, turn) in history.iter().enumerate() {
        let speaker = if index % 2 == 0 { "User" } else { "Assistant" };
        prompt.push_str(speaker);
        prompt.push_str(": ");
        prompt.push_str(turn);
        prompt.push('\n');
    }
    prompt.push_str("User: ");
    prompt.push_str(query);
    prompt
}
