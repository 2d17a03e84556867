//! The per-session conversational agent.
//!
//! An [`Agent`] owns its backend HTTP client and memory buffer, shares the
//! tool registry and LLM client, and renders its system prompt once at
//! construction. [`Agent::invoke`] runs the tool-use loop: the model either
//! answers, or asks for tool calls which are executed and fed back as
//! observations, up to `max_steps` rounds. When the step budget runs out
//! the model is asked once more for a plain answer with no tools offered.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::backend::BackendClient;
use crate::llm::{ChatMessage, LlmClient};
use crate::models::{ChatTurn, Role};
use crate::tools::{ToolContext, ToolRegistry};

const PROMPT_PREFIX: &str = "\
The SFO Airport Assistant helps travelers find their way at the airport.

The assistant answers a wide range of questions about San Francisco
International Airport, from simple lookups to multi-step questions that
require passing results from one query to another. It responds in a natural,
conversational tone and keeps answers relevant to the question at hand.

Use tools if necessary; respond directly if appropriate. Only state facts
returned by the tools. The assistant currently does not have access to user
info.

The assistant has access to the following tools:";

pub struct Agent {
    backend: Arc<BackendClient>,
    tools: Arc<ToolRegistry>,
    llm: Arc<LlmClient>,
    system_prompt: String,
    memory: Mutex<Vec<ChatTurn>>,
    max_steps: usize,
}

impl Agent {
    pub fn new(
        backend: BackendClient,
        tools: Arc<ToolRegistry>,
        llm: Arc<LlmClient>,
        history: Vec<ChatTurn>,
        max_steps: usize,
    ) -> Self {
        let system_prompt = render_system_prompt(&tools, chrono::Utc::now().date_naive());
        Self {
            backend: Arc::new(backend),
            tools,
            llm,
            system_prompt,
            memory: Mutex::new(history),
            max_steps,
        }
    }

    /// The backend client, for attaching identity tokens after login.
    pub fn backend(&self) -> &Arc<BackendClient> {
        &self.backend
    }

    /// Snapshot of the conversation so far, in display order.
    pub async fn history(&self) -> Vec<ChatTurn> {
        self.memory.lock().await.clone()
    }

    /// Run one user turn through the tool-use loop.
    ///
    /// The prompt is appended to memory up front, so a turn that fails
    /// still shows the user's question in the transcript. The answer is
    /// appended on success. Holding the memory lock for the whole turn
    /// serializes concurrent requests on the same session.
    pub async fn invoke(&self, prompt: &str) -> Result<String> {
        let mut memory = self.memory.lock().await;
        memory.push(ChatTurn::human(prompt));

        let mut messages = vec![ChatMessage::system(&self.system_prompt)];
        for turn in memory.iter() {
            messages.push(match turn.role {
                Role::Human => ChatMessage::user(&turn.content),
                Role::Assistant => ChatMessage::assistant(&turn.content),
            });
        }

        let defs = self.tools.definitions();
        let ctx = ToolContext::new(self.backend.clone());
        let mut answer = None;

        for step in 0..self.max_steps {
            let reply = self
                .llm
                .chat(&messages, &defs)
                .await
                .context("Error invoking agent")?;

            let calls = match reply.tool_calls {
                Some(ref calls) if !calls.is_empty() => calls.clone(),
                _ => {
                    answer = Some(reply.content.unwrap_or_default());
                    break;
                }
            };

            tracing::debug!(step, calls = calls.len(), "model requested tool calls");
            messages.push(reply);

            for call in &calls {
                let observation = self.run_tool(&call.function.name, &call.function.arguments, &ctx)
                    .await;
                messages.push(ChatMessage::tool_result(&call.id, observation));
            }
        }

        let answer = match answer {
            Some(text) => text,
            None => {
                // Step budget exhausted: ask for a final answer, no tools.
                let reply = self
                    .llm
                    .chat(&messages, &[])
                    .await
                    .context("Error invoking agent")?;
                reply.content.unwrap_or_default()
            }
        };

        memory.push(ChatTurn::assistant(&answer));

        Ok(answer)
    }

    /// Execute one tool call. Failures (unknown tool, bad arguments, backend
    /// errors) become observation text rather than request failures, so the
    /// model gets a chance to recover.
    async fn run_tool(&self, name: &str, arguments: &str, ctx: &ToolContext) -> String {
        let tool = match self.tools.find(name) {
            Some(tool) => tool,
            None => return format!("Error: no tool named {}", name),
        };

        let params: serde_json::Value = match serde_json::from_str(arguments) {
            Ok(value) => value,
            Err(e) => return format!("Error: invalid arguments for {}: {}", name, e),
        };

        match tool.execute(params, ctx).await {
            Ok(result) => result,
            Err(e) => format!("Error: {}", e),
        }
    }
}

/// Render the system prompt from the tool catalog and today's date.
pub fn render_system_prompt(tools: &ToolRegistry, today: chrono::NaiveDate) -> String {
    let tool_lines: Vec<String> = tools
        .tools()
        .iter()
        .map(|t| format!("> {}: {}", t.name(), t.description()))
        .collect();

    format!(
        "{}\n\n{}\n\nToday is {}.",
        PROMPT_PREFIX,
        tool_lines.join("\n"),
        today.format("%Y-%m-%d")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_lists_all_tools() {
        let tools = ToolRegistry::with_builtins();
        let date = chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let prompt = render_system_prompt(&tools, date);

        for tool in tools.tools() {
            assert!(
                prompt.contains(&format!("> {}:", tool.name())),
                "prompt missing tool {}",
                tool.name()
            );
        }
        assert!(prompt.contains("Today is 2024-03-01."));
        assert!(prompt.starts_with("The SFO Airport Assistant"));
    }

    #[test]
    fn test_system_prompt_empty_catalog() {
        let tools = ToolRegistry::new();
        let date = chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let prompt = render_system_prompt(&tools, date);
        assert!(prompt.contains("Today is 2024-03-01."));
    }

    #[tokio::test]
    async fn test_failed_turn_keeps_prompt_in_history() {
        std::env::set_var("OPENAI_API_KEY", "sk-test-key-not-real");

        let backend = BackendClient::new(&crate::config::BackendConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            auth_token: None,
            timeout_secs: 1,
        })
        .unwrap();
        // Nothing listens on the LLM address, so the turn fails.
        let llm = LlmClient::new(&crate::config::LlmConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            model: "test".to_string(),
            max_steps: 1,
            max_tokens: 16,
            max_retries: 0,
            timeout_secs: 1,
        })
        .unwrap();
        let agent = Agent::new(
            backend,
            Arc::new(ToolRegistry::new()),
            Arc::new(llm),
            crate::models::base_history(),
            1,
        );

        assert!(agent.invoke("where is gate B2?").await.is_err());

        let history = agent.history().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].role, Role::Human);
        assert_eq!(history[1].content, "where is gate B2?");
    }
}
