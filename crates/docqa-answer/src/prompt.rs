use std::fmt::Write;

use docqa_core::types::SimilarityResult;

const PREAMBLE: &str = "Based on the following information:";
const INSTRUCTIONS: &str = "Please provide a comprehensive answer \
based ONLY on the information above. \
If the information doesn't contain the answer, say so. \
When referencing information, cite the source number like [Source 1].";

/// Grounded prompt: numbered sources in the given order, then the question
/// and the answering instructions.
pub fn build_prompt(question: &str, sources: &[SimilarityResult]) -> String {
    let mut prompt = String::new();
    // writing into a String cannot fail
    let _ = writeln!(prompt, "{PREAMBLE}\n");
    for (i, source) in sources.iter().enumerate() {
        let _ = writeln!(prompt, "[Source {}]\n{}\n", i + 1, source.content);
    }
    let _ = writeln!(prompt, "Question: {question}\n");
    prompt.push_str(INSTRUCTIONS);
    prompt
}

/// Rough token count at four characters per token over the question, the
/// answer and all source contents.
pub fn estimate_tokens(question: &str, answer: &str, sources: &[SimilarityResult]) -> usize {
    let source_chars: usize = sources.iter().map(|s| s.content.chars().count()).sum();
    question.chars().count() / 4 + answer.chars().count() / 4 + source_chars / 4
}
