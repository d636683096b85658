// file: src/aggregate/prompt.rs
// description: prompt templates for batch summaries, merge and evaluation
// reference: https://ai.google.dev/gemini-api/docs/text-generation

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref CODE_FENCE: Regex = Regex::new(r"(?s)^\s*```[A-Za-z]*\s*(.*?)\s*```\s*$")
        .expect("CODE_FENCE regex is valid");
}

pub const EVALUATION_SOURCE_SEPARATOR: &str = "\n------------------------\n";

pub fn batch_prompt(keyword: &str) -> String {
    format!(
        "You are an AI analyzing TikTok video summaries under the keyword '{keyword}'. \
The numbered items above are the source summaries of this batch.\n\
1. Summarize what these videos show about the topic.\n\
2. End every sentence of the summary with the sources it comes from, as a list of item \
numbers such as [1, 3], or [ALL] when the sentence applies to every source in this batch.\n\
3. In 'justification', explain why each cited source was included.\n\
4. In 'exclusion', explain why other material was left out.\n\
Return strictly parseable JSON with the keys 'summary', 'justification' and 'exclusion', \
and nothing else: {{\"summary\": \"...\", \"justification\": \"...\", \"exclusion\": \"...\"}}"
    )
}

pub fn merge_prompt(keyword: &str) -> String {
    format!(
        "The JSON objects above are partial summaries of TikTok videos under the keyword \
'{keyword}', each produced from a separate batch of sources. Merge them into one coherent \
summary. Keep a source citation on every sentence, reconcile overlapping statements, and \
combine the justifications and exclusions. Return strictly parseable JSON with the keys \
'summary', 'justification' and 'exclusion', and nothing else."
    )
}

pub fn evaluation_prompt(summary: &str, sources: &[String]) -> String {
    let numbered = sources
        .iter()
        .enumerate()
        .map(|(idx, s)| format!("{}. {}", idx + 1, s))
        .collect::<Vec<_>>()
        .join(EVALUATION_SOURCE_SEPARATOR);

    format!(
        r#"
You are an AI expert in evaluating text summarization accuracy. Your task is to evaluate the **Final Summary** based on the provided **Source Summaries**.

Here are multiple source summaries from different videos:
{numbered}

Below is the final summary produced from these sources:
{summary}

### Evaluation Criteria
1. Sentence-Level Precision & Recall Calculation
2. Missing Content Identification
3. Justify all decisions

Return ALL your response in the following JSON format. IMPORTANT: It must be parseable as JSON.
{{
    "precision_recall": [{{
        "text": "Final summary sentence",
        "precision": 0.8,
        "recall": 0.9,
        "errors": ["Incorrect source: [1, 2]", "Missing source: [3, 4]", "Reasons: explanation"]
    }}],
    "missing_sentences": [{{ "text": "Missing sentence", "source": [2, 5], "reasons": "Explanation" }}]
}}
"#
    )
}

/// Removes a surrounding markdown code fence (```json ... ```), if any
pub fn strip_code_fence(text: &str) -> String {
    match CODE_FENCE.captures(text).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().to_string(),
        None => text.trim().to_string(),
    }
}
