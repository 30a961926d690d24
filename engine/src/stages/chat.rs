//! Conversational responder
//!
//! Handles `chat` turns outside the stage pipeline: pulls session-scoped
//! context from conversational memory, asks the completion capability for a
//! reply and records it.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::db::MemoryStore;
use crate::llm::{LLMProvider, Message, MessageRole};
use crate::state::ContractState;

const SYSTEM_PROMPT: &str = "You are Lexis, an assistant for freelancers working on \
service agreements. Answer conversationally and concisely. If the user asks for a draft, \
a revision, a review or admin work, tell them to describe it as a task.";

pub struct Conversation {
    llm: Arc<dyn LLMProvider>,
    memory: Option<MemoryStore>,
    context_turns: usize,
}

impl Conversation {
    pub fn new(llm: Arc<dyn LLMProvider>, memory: Option<MemoryStore>, context_turns: usize) -> Self {
        Self {
            llm,
            memory,
            context_turns,
        }
    }

    async fn context(&self, query: &str, session_id: &str) -> Vec<String> {
        let Some(memory) = &self.memory else {
            return Vec::new();
        };
        match memory.retrieve(query, session_id, self.context_turns).await {
            Ok(turns) => turns,
            Err(e) => {
                warn!("Memory retrieval failed, answering without context: {:#}", e);
                Vec::new()
            }
        }
    }

    fn build_messages(context: &[String], query: &str) -> Vec<Message> {
        let mut system = String::from(SYSTEM_PROMPT);
        if !context.is_empty() {
            system.push_str("\n\n--- Relevant Conversation ---\n");
            for turn in context {
                system.push_str(turn);
                system.push('\n');
            }
        }
        vec![Message::system(system), Message::user(query)]
    }

    /// Answer the latest user turn and append the reply to the state.
    pub async fn respond(&self, state: &mut ContractState) -> Result<String> {
        let query = state.latest_user_message().unwrap_or_default().to_string();
        let context = self.context(&query, &state.session_id).await;
        debug!(
            session_id = %state.session_id,
            context_turns = context.len(),
            "Answering conversational turn"
        );

        let reply = self
            .llm
            .generate(&Self::build_messages(&context, &query))
            .await
            .context("chat completion failed")?;

        state.push_assistant(reply.clone());

        if let Some(memory) = &self.memory {
            if let Err(e) = memory
                .record(MessageRole::Assistant, &reply, &state.session_id)
                .await
            {
                warn!("Failed to record assistant turn: {:#}", e);
            }
        }

        Ok(reply)
    }
}
