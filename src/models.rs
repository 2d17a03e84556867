//! Core data models shared across the chat service and the datastore CLI.
//!
//! Chat turns flow between the session store, the agent's memory buffer, and
//! the rendered chat page. Product and embedding records flow between the
//! seed file and the Postgres datastore.

use serde::{Deserialize, Serialize};

/// The canned assistant greeting that seeds every new conversation.
pub const GREETING: &str = "I am an SFO Airport Assistant, ready to assist you.";

/// Who produced a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Human,
    Assistant,
}

/// One turn of conversation, in display order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Starting history for a fresh session.
pub fn base_history() -> Vec<ChatTurn> {
    vec![ChatTurn::assistant(GREETING)]
}

/// Product row stored in the `products` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub product_id: String,
    pub product_name: String,
    pub description: String,
    pub list_price: f64,
}

/// Embedding row stored in the `product_embeddings` table.
///
/// `embedding` is a fixed-length vector; its length must match
/// `embedding.dims` in the config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductEmbedding {
    pub product_id: String,
    pub content: String,
    pub embedding: Vec<f32>,
}

/// Seed file format for `concourse data load`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedData {
    pub products: Vec<Product>,
    pub embeddings: Vec<ProductEmbedding>,
}

/// A row returned by the similarity search, joined back to `products`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductMatch {
    pub product_name: String,
    pub list_price: f64,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_history_starts_with_greeting() {
        let history = base_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::Assistant);
        assert_eq!(history[0].content, GREETING);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let turn = ChatTurn::human("hi");
        let json = serde_json::to_value(&turn).unwrap();
        assert_eq!(json["role"], "human");
    }
}
