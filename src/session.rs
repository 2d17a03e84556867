//! Session store and cookie codec.
//!
//! Sessions map an opaque identifier (minted on first page view, carried in
//! a signed cookie) to the agent instance that holds that user's backend
//! client and conversation memory. The store is created at process start,
//! entries are added on first visit, removed on reset, and cleared at
//! shutdown.
//!
//! The cookie value is `<uuid>.<hex hmac-sha256>`; a bad or missing
//! signature is treated as no session at all.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::agent::Agent;

type HmacSha256 = Hmac<Sha256>;

// ============ Session store ============

pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Agent>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn mint_id() -> String {
        Uuid::new_v4().to_string()
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Agent>> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    pub async fn insert(&self, id: &str, agent: Arc<Agent>) {
        self.sessions.write().await.insert(id.to_string(), agent);
    }

    /// Remove a session's agent. The agent and its HTTP client drop
    /// together once the last reference is released.
    pub async fn remove(&self, id: &str) -> Option<Arc<Agent>> {
        self.sessions.write().await.remove(id)
    }

    /// Drop every session. Called at shutdown.
    pub async fn clear(&self) {
        self.sessions.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

// ============ Cookie codec ============

/// Signs and verifies session cookie values.
pub struct CookieCodec {
    secret: Vec<u8>,
}

impl CookieCodec {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }

    /// Encode a session id as `<id>.<hex signature>`.
    pub fn sign(&self, id: &str) -> String {
        format!("{}.{}", id, self.signature(id))
    }

    /// Decode and verify a cookie value, returning the session id.
    ///
    /// Returns `None` for malformed values or signature mismatches.
    pub fn verify(&self, value: &str) -> Option<String> {
        let (id, sig) = value.rsplit_once('.')?;
        if id.is_empty() {
            return None;
        }

        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(id.as_bytes());
        let sig_bytes = hex::decode(sig).ok()?;
        mac.verify_slice(&sig_bytes).ok()?;
        Some(id.to_string())
    }

    fn signature(&self, id: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(id.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendClient;
    use crate::config::{BackendConfig, LlmConfig};
    use crate::llm::LlmClient;
    use crate::models::base_history;
    use crate::tools::ToolRegistry;

    fn test_agent() -> Arc<Agent> {
        std::env::set_var("OPENAI_API_KEY", "sk-test-key-not-real");
        let backend = BackendClient::new(&BackendConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            auth_token: None,
            timeout_secs: 1,
        })
        .unwrap();
        let llm = LlmClient::new(&LlmConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            model: "test".to_string(),
            max_steps: 1,
            max_tokens: 16,
            max_retries: 0,
            timeout_secs: 1,
        })
        .unwrap();
        Arc::new(Agent::new(
            backend,
            Arc::new(ToolRegistry::new()),
            Arc::new(llm),
            base_history(),
            1,
        ))
    }

    #[tokio::test]
    async fn test_store_lifecycle() {
        let store = SessionStore::new();
        assert!(store.is_empty().await);

        let id = SessionStore::mint_id();
        store.insert(&id, test_agent()).await;
        assert!(store.contains(&id).await);
        assert_eq!(store.len().await, 1);
        assert!(store.get(&id).await.is_some());

        assert!(store.remove(&id).await.is_some());
        assert!(!store.contains(&id).await);
        assert!(store.remove(&id).await.is_none());

        store.insert(&id, test_agent()).await;
        store.clear().await;
        assert!(store.is_empty().await);
    }

    #[test]
    fn test_cookie_roundtrip() {
        let codec = CookieCodec::new("test-secret");
        let id = SessionStore::mint_id();
        let cookie = codec.sign(&id);
        assert_eq!(codec.verify(&cookie), Some(id));
    }

    #[test]
    fn test_cookie_rejects_tampered_id() {
        let codec = CookieCodec::new("test-secret");
        let cookie = codec.sign("session-a");
        let forged = cookie.replacen("session-a", "session-b", 1);
        assert_eq!(codec.verify(&forged), None);
    }

    #[test]
    fn test_cookie_rejects_tampered_signature() {
        let codec = CookieCodec::new("test-secret");
        let mut cookie = codec.sign("session-a");
        cookie.push_str("00");
        assert_eq!(codec.verify(&cookie), None);
    }

    #[test]
    fn test_cookie_rejects_wrong_secret() {
        let signer = CookieCodec::new("secret-one");
        let verifier = CookieCodec::new("secret-two");
        let cookie = signer.sign("session-a");
        assert_eq!(verifier.verify(&cookie), None);
    }

    #[test]
    fn test_cookie_rejects_malformed() {
        let codec = CookieCodec::new("test-secret");
        assert_eq!(codec.verify(""), None);
        assert_eq!(codec.verify("no-dot"), None);
        assert_eq!(codec.verify(".abcdef"), None);
        assert_eq!(codec.verify("id.not-hex"), None);
    }

    #[test]
    fn test_mint_id_unique() {
        assert_ne!(SessionStore::mint_id(), SessionStore::mint_id());
    }
}
