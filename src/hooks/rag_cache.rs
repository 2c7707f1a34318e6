//! Retrieved-context cache lifecycle
//!
//! Decides, from a hash of the retrieved knowledge-base text, whether a
//! remote cached-content handle exists, is fresh, and is reusable. Handles
//! are created lazily after retrieval and consumed immediately before the
//! synthesis model call, where the duplicated text is redacted from the
//! system instruction so the same content is not paid for twice. Creation
//! is best-effort: a failure never degrades the run beyond losing the
//! cache.

use crate::agent::{ModelCallConfig, ToolCall};
use crate::config::RagCacheConfig;
use crate::domain::{CachedContextHandle, RunSession};
use crate::error::Result;
use crate::hooks::{RunContext, RunHook};
use crate::store::CacheCreator;
use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Tool whose results feed the cache
pub const KNOWLEDGE_TOOL: &str = "search_knowledge_base";

/// Session key holding the latest retrieved text
pub const RAG_TEXT_STATE_KEY: &str = "research_rag";

/// "Nothing retrieved" phrases; text containing either is never cached
const SENTINEL_PHRASES: [&str; 2] = [
    "no relevant information found in knowledge base",
    "no rag lookup needed",
];

const REDACTION_PLACEHOLDER: &str = "[knowledge base context attached as cached content]";

/// Hex sha-256 of retrieved text; the cache's content address.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

pub struct CacheLifecycleManager {
    config: RagCacheConfig,
    creator: Arc<dyn CacheCreator>,
}

impl CacheLifecycleManager {
    pub fn new(config: RagCacheConfig, creator: Arc<dyn CacheCreator>) -> Self {
        Self { config, creator }
    }

    fn is_eligible(&self, text: &str) -> bool {
        if !self.config.enabled || text.len() < self.config.min_chars {
            return false;
        }
        let lowered = text.to_lowercase();
        !SENTINEL_PHRASES
            .iter()
            .any(|phrase| lowered.contains(phrase))
    }

    /// Record freshly retrieved text for a session: clear the handle for
    /// ineligible text, reuse a fresh hash-equal handle, or create a new
    /// remote handle.
    pub async fn ingest(&self, session: &mut RunSession, text: &str) {
        session.state.extra.insert(
            RAG_TEXT_STATE_KEY.to_string(),
            serde_json::Value::String(text.to_string()),
        );

        if !self.is_eligible(text) {
            if session.state.rag_cache.take().is_some() {
                debug!("Retrieved text ineligible for caching, cleared stored handle");
            }
            return;
        }

        let hash = content_hash(text);
        let now = Utc::now();

        if let Some(handle) = &session.state.rag_cache {
            if !handle.is_expired(now)
                && handle.content_hash == hash
                && handle.model == self.config.model
            {
                debug!("Cached content {} still fresh, reusing", handle.name);
                return;
            }
        }

        match self
            .creator
            .create_cache(&self.config.model, text, Duration::from_secs(self.config.ttl_secs))
            .await
        {
            Ok(created) => {
                debug!("Created cached content {}", created.name);
                session.state.rag_cache = Some(CachedContextHandle {
                    name: created.name,
                    content_hash: hash,
                    model: self.config.model.clone(),
                    expires_at: created.expire_time,
                });
            }
            Err(e) => {
                // Best-effort: keep whatever handle state was there before.
                warn!("Cache creation failed: {}", e);
            }
        }
    }

    /// Attach a fresh, hash-equal, model-equal handle to an outgoing model
    /// call and redact the duplicated text from the system instruction.
    /// Expired handles are cleared; nothing stale is ever attached.
    pub fn apply_to_model_call(&self, session: &mut RunSession, config: &mut ModelCallConfig) {
        let Some(handle) = session.state.rag_cache.clone() else {
            return;
        };

        if handle.is_expired(Utc::now()) {
            debug!("Cached content {} expired, clearing", handle.name);
            session.state.rag_cache = None;
            return;
        }

        let Some(text) = session
            .state
            .extra
            .get(RAG_TEXT_STATE_KEY)
            .and_then(|v| v.as_str())
            .map(str::to_string)
        else {
            return;
        };

        if handle.content_hash != content_hash(&text) || handle.model != config.model {
            return;
        }

        config.cached_content = Some(handle.name.clone());
        if let Some(pos) = config.system_instruction.find(&text) {
            config
                .system_instruction
                .replace_range(pos..pos + text.len(), REDACTION_PLACEHOLDER);
        }
        debug!("Attached cached content {} to model call", handle.name);
    }
}

#[async_trait]
impl RunHook for CacheLifecycleManager {
    fn name(&self) -> &'static str {
        "rag_cache"
    }

    async fn after_tool(
        &self,
        ctx: &RunContext,
        call: &ToolCall,
        result: &serde_json::Value,
    ) -> Result<()> {
        if call.name != KNOWLEDGE_TOOL {
            return Ok(());
        }
        let Some(session) = ctx.session.as_ref() else {
            return Ok(());
        };
        let Some(text) = extract_retrieved_text(result) else {
            return Ok(());
        };

        let mut session = session.lock().await;
        self.ingest(&mut session, &text).await;
        Ok(())
    }

    async fn before_model(&self, ctx: &RunContext, config: &mut ModelCallConfig) -> Result<()> {
        let Some(session) = ctx.session.as_ref() else {
            return Ok(());
        };
        let mut session = session.lock().await;
        self.apply_to_model_call(&mut session, config);
        Ok(())
    }
}

/// Pull the retrieved text out of a knowledge-tool result: either the
/// "nothing found" message or the concatenated chunk contents.
fn extract_retrieved_text(result: &serde_json::Value) -> Option<String> {
    if let Some(message) = result.get("message").and_then(|v| v.as_str()) {
        return Some(message.to_string());
    }
    if let Some(chunks) = result.get("chunks").and_then(|v| v.as_array()) {
        let contents: Vec<&str> = chunks
            .iter()
            .filter_map(|chunk| chunk.get("content").and_then(|v| v.as_str()))
            .collect();
        if !contents.is_empty() {
            return Some(contents.join("\n\n"));
        }
    }
    result.as_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CreatedCache, MockCacheCreator};
    use chrono::Duration as ChronoDuration;

    fn config(enabled: bool) -> RagCacheConfig {
        RagCacheConfig {
            enabled,
            ttl_secs: 3600,
            min_chars: 280,
            model: "gemini-3-pro-preview".to_string(),
        }
    }

    fn long_text() -> String {
        "Risk management requires position sizing discipline. ".repeat(10)
    }

    fn manager_with(
        enabled: bool,
        setup: impl FnOnce(&mut MockCacheCreator),
    ) -> CacheLifecycleManager {
        let mut creator = MockCacheCreator::new();
        setup(&mut creator);
        CacheLifecycleManager::new(config(enabled), Arc::new(creator))
    }

    #[tokio::test]
    async fn test_disabled_flag_clears_handle() {
        let manager = manager_with(false, |creator| {
            creator.expect_create_cache().never();
        });
        let mut session = RunSession::new("user-1");
        session.state.rag_cache = Some(CachedContextHandle {
            name: "caches/old".to_string(),
            content_hash: content_hash("old"),
            model: "gemini-3-pro-preview".to_string(),
            expires_at: Utc::now() + ChronoDuration::hours(1),
        });

        manager.ingest(&mut session, &long_text()).await;
        assert!(session.state.rag_cache.is_none());
    }

    #[tokio::test]
    async fn test_short_text_is_ineligible() {
        let manager = manager_with(true, |creator| {
            creator.expect_create_cache().never();
        });
        let mut session = RunSession::new("user-1");

        manager.ingest(&mut session, "too short").await;
        assert!(session.state.rag_cache.is_none());
    }

    #[tokio::test]
    async fn test_sentinel_text_is_ineligible() {
        let manager = manager_with(true, |creator| {
            creator.expect_create_cache().never();
        });
        let mut session = RunSession::new("user-1");

        let padding = "x".repeat(300);
        let text = format!("No relevant information found in knowledge base. {padding}");
        manager.ingest(&mut session, &text).await;
        assert!(session.state.rag_cache.is_none());
    }

    #[tokio::test]
    async fn test_same_hash_creates_once() {
        let manager = manager_with(true, |creator| {
            creator.expect_create_cache().times(1).returning(|_, _, _| {
                Ok(CreatedCache {
                    name: "caches/abc".to_string(),
                    expire_time: Utc::now() + ChronoDuration::hours(1),
                })
            });
        });
        let mut session = RunSession::new("user-1");
        let text = long_text();

        manager.ingest(&mut session, &text).await;
        manager.ingest(&mut session, &text).await;

        let handle = session.state.rag_cache.as_ref().unwrap();
        assert_eq!(handle.name, "caches/abc");
        assert_eq!(handle.content_hash, content_hash(&text));
    }

    #[tokio::test]
    async fn test_expired_handle_is_recreated() {
        let manager = manager_with(true, |creator| {
            let mut names = vec!["caches/second", "caches/first"];
            creator.expect_create_cache().times(2).returning(move |_, _, _| {
                Ok(CreatedCache {
                    name: names.pop().unwrap().to_string(),
                    expire_time: Utc::now() + ChronoDuration::hours(1),
                })
            });
        });
        let mut session = RunSession::new("user-1");
        let text = long_text();

        manager.ingest(&mut session, &text).await;
        assert_eq!(session.state.rag_cache.as_ref().unwrap().name, "caches/first");

        // Force expiry, then the same text must create a new handle.
        session.state.rag_cache.as_mut().unwrap().expires_at =
            Utc::now() - ChronoDuration::seconds(1);
        manager.ingest(&mut session, &text).await;
        assert_eq!(session.state.rag_cache.as_ref().unwrap().name, "caches/second");
    }

    #[tokio::test]
    async fn test_creation_failure_keeps_previous_state() {
        let manager = manager_with(true, |creator| {
            creator.expect_create_cache().times(1).returning(|_, _, _| {
                Err(crate::error::AutopilotError::CacheCreation("503".to_string()))
            });
        });
        let mut session = RunSession::new("user-1");

        manager.ingest(&mut session, &long_text()).await;
        assert!(session.state.rag_cache.is_none());
    }

    #[tokio::test]
    async fn test_model_call_attach_and_redact() {
        let manager = manager_with(true, |creator| {
            creator.expect_create_cache().times(1).returning(|_, _, _| {
                Ok(CreatedCache {
                    name: "caches/abc".to_string(),
                    expire_time: Utc::now() + ChronoDuration::hours(1),
                })
            });
        });
        let mut session = RunSession::new("user-1");
        let text = long_text();
        manager.ingest(&mut session, &text).await;

        let mut config = ModelCallConfig {
            model: "gemini-3-pro-preview".to_string(),
            system_instruction: format!("You are an advisor.\n\nKnowledge base:\n{text}"),
            cached_content: None,
        };
        manager.apply_to_model_call(&mut session, &mut config);

        assert_eq!(config.cached_content.as_deref(), Some("caches/abc"));
        assert!(!config.system_instruction.contains(&text));
        assert!(config.system_instruction.contains("cached content"));
    }

    #[tokio::test]
    async fn test_expired_handle_never_attached() {
        let manager = manager_with(true, |creator| {
            creator.expect_create_cache().times(1).returning(|_, _, _| {
                Ok(CreatedCache {
                    name: "caches/abc".to_string(),
                    expire_time: Utc::now() + ChronoDuration::hours(1),
                })
            });
        });
        let mut session = RunSession::new("user-1");
        let text = long_text();
        manager.ingest(&mut session, &text).await;
        session.state.rag_cache.as_mut().unwrap().expires_at =
            Utc::now() - ChronoDuration::seconds(1);

        let mut config = ModelCallConfig {
            model: "gemini-3-pro-preview".to_string(),
            system_instruction: text.clone(),
            cached_content: None,
        };
        manager.apply_to_model_call(&mut session, &mut config);

        assert!(config.cached_content.is_none());
        // Stale handle fields were cleared before proceeding.
        assert!(session.state.rag_cache.is_none());
        assert!(config.system_instruction.contains(&text));
    }

    #[tokio::test]
    async fn test_model_mismatch_not_attached() {
        let manager = manager_with(true, |creator| {
            creator.expect_create_cache().times(1).returning(|_, _, _| {
                Ok(CreatedCache {
                    name: "caches/abc".to_string(),
                    expire_time: Utc::now() + ChronoDuration::hours(1),
                })
            });
        });
        let mut session = RunSession::new("user-1");
        let text = long_text();
        manager.ingest(&mut session, &text).await;

        let mut config = ModelCallConfig {
            model: "some-other-model".to_string(),
            system_instruction: text,
            cached_content: None,
        };
        manager.apply_to_model_call(&mut session, &mut config);
        assert!(config.cached_content.is_none());
    }

    #[test]
    fn test_extract_text_from_chunks() {
        let result = serde_json::json!({
            "found": true,
            "chunks": [
                {"content": "first excerpt", "source": "Book A"},
                {"content": "second excerpt", "source": "Book B"},
            ]
        });
        assert_eq!(
            extract_retrieved_text(&result).unwrap(),
            "first excerpt\n\nsecond excerpt"
        );
    }

    #[test]
    fn test_extract_text_from_message() {
        let result = serde_json::json!({
            "found": false,
            "message": "No relevant information found in knowledge base."
        });
        assert_eq!(
            extract_retrieved_text(&result).unwrap(),
            "No relevant information found in knowledge base."
        );
    }
}
