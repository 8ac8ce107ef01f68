//! `general-chat`: fallback conversational answer straight from the model.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::warn;

use crate::models::{ChatMessage, ModelProvider};
use crate::tools::{required_str, ArgKind, Tool, ToolDescriptor, ToolOutput};

fn chat_prompt(query: &str) -> String {
    format!(
        "You are a helpful and knowledgeable AI assistant. A user has asked a question that \
         does not fit any of the specialized tools. Provide a direct, helpful, and \
         conversational answer to their query.\n\n\
         User's query: \"{query}\"\n\n\
         Your response:"
    )
}

pub struct GeneralChatTool {
    model: Arc<dyn ModelProvider>,
    descriptor: ToolDescriptor,
}

impl GeneralChatTool {
    pub fn new(model: Arc<dyn ModelProvider>) -> Self {
        let descriptor = ToolDescriptor::new(
            "general-chat",
            "Use this tool as a last resort if no other tool is appropriate for the user's \
             query. It is for general conversation, questions, and answering 'how-to' style \
             inquiries.",
        )
        .required(
            "query",
            ArgKind::String,
            "The user's question or message for a general chat response.",
        );
        Self { model, descriptor }
    }
}

#[async_trait]
impl Tool for GeneralChatTool {
    fn describe(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(&self, args: &Map<String, Value>) -> ToolOutput {
        let query = match required_str(args, "query") {
            Ok(q) => q,
            Err(e) => return ToolOutput::from(e),
        };
        match self
            .model
            .send_chat(&[ChatMessage::new("user", chat_prompt(query))])
            .await
        {
            Ok(reply) => ToolOutput::success(reply),
            Err(e) => {
                warn!(error = %e, "general chat failed");
                ToolOutput::failure(format!("❌ Error during general chat: {e:#}"))
            }
        }
    }
}
