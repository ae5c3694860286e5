//! Prompts sent to the classifier and summarizer models
//!
//! Placeholders in the `const` templates are substituted with `str::replace`
//! before the call.

/// Classification prompt; the reply must be a bare JSON object
///
/// Placeholder: {query} - the user query to analyze
pub const CLASSIFICATION_PROMPT: &str = r#"Analyze this query and return ONLY JSON (no markdown, no backticks):
{
  "complexity": "simple|medium|complex",
  "type": "dialogue|creative|technical|retrieval",
  "requiresMemory": true|false,
  "estimatedTokens": number
}

Query: {query}"#;

/// Prompt used to compact the hot buffer once it passes its ceiling
///
/// Placeholder: {conversation} - the rendered hot buffer
pub const SUMMARY_PROMPT: &str = "Summarize the following conversation, preserving all important facts, relationships, and events:\n\n{conversation}";

/// Prompt used by the auto summarizer plugin on archived text
///
/// Placeholder: {conversation} - the text about to be archived
pub const ROLLING_SUMMARY_PROMPT: &str =
    "Create a concise summary preserving key facts, relationships, and events:\n\n{conversation}";

/// Prompt for answering from a static cache record.
///
/// Built in one pass so braces inside the cached content or the query are
/// never treated as placeholders.
pub fn cached_context_prompt(content: &str, query: &str) -> String {
    format!("Context (from cache):\n{content}\n\nUser Query: {query}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompts_carry_placeholders() {
        assert!(CLASSIFICATION_PROMPT.contains("{query}"));
        assert!(SUMMARY_PROMPT.contains("{conversation}"));
        assert!(ROLLING_SUMMARY_PROMPT.contains("{conversation}"));
    }

    #[test]
    fn test_cached_context_prompt_keeps_literal_braces() {
        let prompt = cached_context_prompt(r#"{"note":"use {query} here"}"#, "What is {content}?");
        assert_eq!(
            prompt,
            "Context (from cache):\n{\"note\":\"use {query} here\"}\n\nUser Query: What is {content}?"
        );
    }

    #[test]
    fn test_classification_prompt_names_every_field() {
        for field in ["complexity", "type", "requiresMemory", "estimatedTokens"] {
            assert!(CLASSIFICATION_PROMPT.contains(field), "missing {field}");
        }
    }
}
