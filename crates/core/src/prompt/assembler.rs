use std::sync::Arc;

use studio_llm::provider::{ChatMessage, Role};

use crate::memory::MemoryStore;
use crate::types::MemoryKind;

/// Assembled request: memory sections, then the feature instruction, then
/// the user's input, verbatim and last.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptPayload {
    pub memory: Vec<(MemoryKind, String)>,
    pub instruction: String,
    pub user_input: String,
}

impl PromptPayload {
    /// System half: labelled memory sections followed by the instruction.
    pub fn system_prompt(&self) -> String {
        let mut sections: Vec<String> = self
            .memory
            .iter()
            .map(|(kind, content)| format!("## {}\n{}", kind.label(), content))
            .collect();
        sections.push(self.instruction.clone());
        sections.join("\n\n")
    }

    /// The whole payload as one string; ends with the user input.
    pub fn render(&self) -> String {
        format!("{}\n\n{}", self.system_prompt(), self.user_input)
    }

    pub fn to_messages(&self) -> Vec<ChatMessage> {
        vec![
            ChatMessage::text(Role::System, self.system_prompt()),
            ChatMessage::text(Role::User, self.user_input.clone()),
        ]
    }
}

/// Builds prompts from the injected store. Deterministic for given store contents.
#[derive(Clone)]
pub struct PromptAssembler {
    store: Arc<dyn MemoryStore>,
}

impl PromptAssembler {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self { store }
    }

    /// Read each requested kind (in the order given, skipping empty or
    /// unreadable blobs) and assemble the payload.
    pub async fn build(
        &self,
        instruction: &str,
        kinds: &[MemoryKind],
        user_input: &str,
    ) -> PromptPayload {
        let mut memory = Vec::with_capacity(kinds.len());
        for &kind in kinds {
            match self.store.read(kind).await {
                Ok(blob) if !blob.content.trim().is_empty() => memory.push((kind, blob.content)),
                Ok(_) => {}
                Err(e) => tracing::warn!(?kind, error = %e, "memory unreadable, prompting without it"),
            }
        }

        tracing::debug!(
            sections = memory.len(),
            instruction_len = instruction.len(),
            user_input_len = user_input.len(),
            "prompt assembled"
        );

        PromptPayload {
            memory,
            instruction: instruction.to_owned(),
            user_input: user_input.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryStore, Retention};

    async fn assembler_with(entries: &[(MemoryKind, &str)]) -> PromptAssembler {
        let store = Arc::new(InMemoryStore::default());
        for (kind, text) in entries {
            store.write(*kind, text).await.unwrap();
        }
        PromptAssembler::new(store)
    }

    #[tokio::test]
    async fn labels_memory_sections_in_request_order() {
        let a = assembler_with(&[
            (MemoryKind::ExecutionLearning, "hooks under 3s"),
            (MemoryKind::MarketDna, "gen-z, playful"),
        ]).await;
        let p = a.build("Persona.", &[MemoryKind::MarketDna, MemoryKind::ExecutionLearning], "hi").await;
        let sys = p.system_prompt();
        let dna = sys.find("## Market DNA").unwrap();
        let exec = sys.find("## Execution learning").unwrap();
        assert!(dna < exec);
        assert!(sys.ends_with("Persona."));
    }

    #[tokio::test]
    async fn empty_blobs_are_skipped() {
        let a = assembler_with(&[]).await;
        let p = a.build("Persona.", &MemoryKind::ALL, "hi").await;
        assert!(p.memory.is_empty());
        assert_eq!(p.system_prompt(), "Persona.");
    }

    #[tokio::test]
    async fn user_input_is_last_and_untruncated() {
        let store = Arc::new(InMemoryStore::new(Retention {
            execution_learning: 5,
            market_dna: 5,
            channel_directory: 5,
        }));
        store.write(MemoryKind::ExecutionLearning, "a long lesson").await.unwrap();
        let a = PromptAssembler::new(store);
        let input = "x".repeat(10_000);
        let p = a.build("Persona.", &[MemoryKind::ExecutionLearning], &input).await;
        assert!(p.render().ends_with(&input));
        let msgs = p.to_messages();
        assert_eq!(msgs.last().unwrap().content, input);
        assert_eq!(msgs.last().unwrap().role, Role::User);
    }
}
