//! Answer prompt construction.

use ragchat_core::SearchResult;

/// Instructions wrapped around the retrieved context and the user question.
pub const PROMPT_TEMPLATE: &str = "You are given a set of context information and a question. Follow these steps carefully to provide the best possible answer.

1. First, read the context thoroughly.
2. If the context fully answers the question, use that information directly in your reply.
3. If the context does not contain the full answer but you can answer the question using your own reliable knowledge, provide the answer from that knowledge.
4. If neither the context nor your own knowledge can give a confident and correct answer, clearly say: \"I don't know.\"
5. Never make up facts or speculate without a solid basis. Ensure the answer is accurate, clear, and easy to understand.
6. If answering from your own knowledge (not from context), you may indicate this by stating: \"Based on my knowledge...\" to help distinguish sources.

Context:
{context}

Question:
{question}

Answer:";

/// Join retrieved chunk texts with blank lines.
pub fn format_context(results: &[SearchResult]) -> String {
    results
        .iter()
        .map(|r| r.chunk.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Fill the template with context and question.
pub fn build_prompt(context: &str, question: &str) -> String {
    // Substitute question first so a literal "{question}" inside the context
    // is left alone
    PROMPT_TEMPLATE
        .replacen("{question}", question, 1)
        .replacen("{context}", context, 1)
}
