//! Prompt templates for each operation.
//!
//! Placeholders are written `{name}` and substituted with [`fill`].

use crate::events::OperationType;
use crate::quiz::QuizConfig;

/// Templates for the three ways an operation can call the model.
#[derive(Debug, Clone, Copy)]
pub struct PromptSet {
    /// Whole document in one call; uses `{text}`
    pub single: &'static str,
    /// One chunk of a long document; uses `{text}`
    pub per_chunk: &'static str,
    /// Merge of all chunk outputs; uses `{chunks}`
    pub combine: &'static str,
}

const SUMMARY: PromptSet = PromptSet {
    single: r#"Summarize the following document in clear, well-organized prose. Capture the main argument, the supporting ideas and any conclusions. Do not add information that is not in the document.

Document:
{text}

Summary:"#,
    per_chunk: r#"The following is one section of a longer document. Summarize this section in a few concise paragraphs, keeping names, figures and conclusions.

Section:
{text}

Section summary:"#,
    combine: r#"Below are summaries of consecutive sections of one document. Combine them into a single coherent summary of the whole document. Remove repetition and keep the original order of ideas.

{chunks}

Combined summary:"#,
};

const KEY_POINTS: PromptSet = PromptSet {
    single: r#"Extract the key points from the following document. Write each key point as one sentence on its own line, starting with "- ". Output only the list.

Document:
{text}

Key points:"#,
    per_chunk: r#"The following is one section of a longer document. List the key points of this section, one sentence per line, each line starting with "- ". Output only the list.

Section:
{text}

Key points:"#,
    combine: r#"Below are key point lists extracted from consecutive sections of one document. Merge them into a single list for the whole document: drop duplicates, keep the most important points, one sentence per line, each line starting with "- ". Output only the list.

{chunks}

Key points:"#,
};

const KEY_TERMS: PromptSet = PromptSet {
    single: r#"Identify the important terms and concepts in the following document. For each one write a line in the form "- Term: definition", where the definition is one sentence based on the document. Output only the list.

Document:
{text}

Key terms:"#,
    per_chunk: r#"The following is one section of a longer document. Identify the important terms in this section. For each one write a line in the form "- Term: definition". Output only the list.

Section:
{text}

Key terms:"#,
    combine: r#"Below are term lists extracted from consecutive sections of one document. Merge them into a single list: one entry per term, keep the clearest definition, each line in the form "- Term: definition". Output only the list.

{chunks}

Key terms:"#,
};

const QUIZ: &str = r#"Create {count} quiz questions about the following document.
Allowed question types: {types}.
Difficulty: {difficulty}.

Respond with a JSON array only. Each element must have:
- "type": one of "multiple_choice", "true_false", "short_answer"
- "question": the question text
- "options": for multiple_choice, an array of at least 4 answer options; otherwise omit
- "correct_answer": for multiple_choice, exactly one of the options; for true_false, "true" or "false"; for short_answer, a short answer
- "explanation": one sentence explaining the answer

Document:
{text}"#;

const QUIZ_RETRY: &str = r#"Your previous answer could not be used: {reason}

Create {count} quiz questions about the following document.
Allowed question types: {types}.
Difficulty: {difficulty}.

Respond with a JSON array only, with no text before or after it. Each element must have:
- "type": one of "multiple_choice", "true_false", "short_answer"
- "question": the question text
- "options": for multiple_choice, an array of at least 4 answer options; otherwise omit
- "correct_answer": for multiple_choice, copied exactly from the options; for true_false, "true" or "false"; for short_answer, a short answer
- "explanation": one sentence explaining the answer

Document:
{text}"#;

/// Templates for a text-producing operation.
///
/// Quiz generation has its own prompts; see [`quiz_prompt`].
pub fn prompt_set(operation: OperationType) -> Option<PromptSet> {
    match operation {
        OperationType::Summary => Some(SUMMARY),
        OperationType::KeyPoints => Some(KEY_POINTS),
        OperationType::KeyTerms => Some(KEY_TERMS),
        OperationType::Quiz => None,
    }
}

/// Substitute `{name}` placeholders.
pub fn fill(template: &str, values: &[(&str, &str)]) -> String {
    values
        .iter()
        .fold(template.to_string(), |acc, (name, value)| {
            acc.replace(&format!("{{{}}}", name), value)
        })
}

/// Join chunk outputs for the combine prompt, labelled `--- Chunk k ---`.
pub fn label_chunks(results: &[String]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, text)| format!("--- Chunk {} ---\n{}", i + 1, text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn quiz_prompt(config: &QuizConfig, text: &str) -> String {
    let count = config.question_count.to_string();
    fill(
        QUIZ,
        &[
            ("count", count.as_str()),
            ("types", config.question_types.as_str()),
            ("difficulty", config.difficulty.as_str()),
            ("text", text),
        ],
    )
}

/// Prompt for a quiz attempt after invalid output.
pub fn quiz_retry_prompt(config: &QuizConfig, text: &str, reason: &str) -> String {
    let count = config.question_count.to_string();
    fill(
        QUIZ_RETRY,
        &[
            ("reason", reason),
            ("count", count.as_str()),
            ("types", config.question_types.as_str()),
            ("difficulty", config.difficulty.as_str()),
            ("text", text),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> QuizConfig {
        QuizConfig::new(5, "multiple_choice,true_false", "hard")
    }

    #[test]
    fn test_fill_replaces_all_placeholders() {
        assert_eq!(fill("{a} and {b} and {a}", &[("a", "x"), ("b", "y")]), "x and y and x");
    }

    #[test]
    fn test_label_chunks() {
        let joined = label_chunks(&["first ".into(), "second".into()]);
        assert_eq!(joined, "--- Chunk 1 ---\nfirst\n\n--- Chunk 2 ---\nsecond");
    }

    #[test]
    fn test_every_text_operation_has_placeholders() {
        for op in [
            OperationType::Summary,
            OperationType::KeyPoints,
            OperationType::KeyTerms,
        ] {
            let set = prompt_set(op).unwrap();
            assert!(set.single.contains("{text}"));
            assert!(set.per_chunk.contains("{text}"));
            assert!(set.combine.contains("{chunks}"));
        }
        assert!(prompt_set(OperationType::Quiz).is_none());
    }

    #[test]
    fn test_quiz_prompt_includes_configuration() {
        let prompt = quiz_prompt(&config(), "The mitochondria is the powerhouse.");
        assert!(prompt.contains("Create 5 quiz questions"));
        assert!(prompt.contains("multiple_choice,true_false"));
        assert!(prompt.contains("Difficulty: hard"));
        assert!(prompt.contains("powerhouse"));
    }

    #[test]
    fn test_retry_prompt_differs_and_carries_reason() {
        let text = "Source text.";
        let first = quiz_prompt(&config(), text);
        let retry = quiz_retry_prompt(&config(), text, "Response was not a JSON array");

        assert_ne!(first, retry);
        assert!(retry.starts_with(
            "Your previous answer could not be used: Response was not a JSON array"
        ));
        assert!(retry.contains("Create 5 quiz questions"));
        assert!(retry.contains("Source text."));
    }
}
