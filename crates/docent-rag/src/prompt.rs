//! Prompt composition for grounded answers.

use docent_core::types::Chunk;

use crate::generation::ChatMessage;

/// Instruction sent as the system turn of every answer request.
pub const SYSTEM_INSTRUCTION: &str = "You are a helpful assistant that answers questions \
using only the provided context. If the context does not contain the answer, say that \
you don't know instead of guessing. Be concise and accurate.";

/// Number the retrieved chunks as `[Source i]` blocks, starting at 1.
pub fn build_context(chunks: &[Chunk]) -> String {
    let mut context = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        context.push_str(&format!("[Source {}]\n{}\n\n", i + 1, chunk.content));
    }
    context
}

/// System instruction followed by a user turn carrying context and question.
pub fn build_messages(question: &str, chunks: &[Chunk]) -> Vec<ChatMessage> {
    let user = format!(
        "Context:\n{}Question: {}\n\nAnswer based on the context above:",
        build_context(chunks),
        question
    );
    vec![ChatMessage::system(SYSTEM_INSTRUCTION), ChatMessage::user(user)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::ChatRole;
    use chrono::Utc;
    use docent_core::types::NewChunk;

    fn chunk(content: &str) -> Chunk {
        NewChunk::new("doc", 0, content, vec![1.0]).assign(Utc::now())
    }

    #[test]
    fn test_context_is_numbered_from_one() {
        let context = build_context(&[chunk("alpha"), chunk("beta")]);
        assert_eq!(context, "[Source 1]\nalpha\n\n[Source 2]\nbeta\n\n");
    }

    #[test]
    fn test_empty_context() {
        assert_eq!(build_context(&[]), "");
    }

    #[test]
    fn test_messages_layout() {
        let messages = build_messages("What is alpha?", &[chunk("alpha is a letter")]);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, ChatRole::System);
        assert_eq!(messages[0].content, SYSTEM_INSTRUCTION);
        assert_eq!(messages[1].role, ChatRole::User);
        assert!(messages[1].content.contains("[Source 1]\nalpha is a letter"));
        assert!(messages[1].content.contains("Question: What is alpha?"));
    }
}
