//! Cached-context lifecycle over the public API.

mod common;

use autopilot::agent::ModelCallConfig;
use autopilot::config::RagCacheConfig;
use autopilot::domain::RunSession;
use autopilot::hooks::CacheLifecycleManager;
use chrono::{Duration, Utc};
use common::CountingCacheCreator;
use std::sync::atomic::Ordering;
use std::sync::Arc;

const MODEL: &str = "gemini-3-pro-preview";

fn cache_config() -> RagCacheConfig {
    RagCacheConfig {
        enabled: true,
        ttl_secs: 3600,
        min_chars: 280,
        model: MODEL.to_string(),
    }
}

fn retrieved_text() -> String {
    "Position sizing is the primary lever of risk control. ".repeat(10)
}

#[tokio::test]
async fn identical_text_within_ttl_creates_exactly_one_handle() {
    let creator = Arc::new(CountingCacheCreator::default());
    let manager = CacheLifecycleManager::new(cache_config(), creator.clone());
    let mut session = RunSession::new("user-1");
    let text = retrieved_text();

    manager.ingest(&mut session, &text).await;
    manager.ingest(&mut session, &text).await;

    assert_eq!(creator.calls.load(Ordering::SeqCst), 1);
    assert!(session.state.rag_cache.is_some());
}

#[tokio::test]
async fn expired_handle_triggers_a_second_creation() {
    let creator = Arc::new(CountingCacheCreator::default());
    let manager = CacheLifecycleManager::new(cache_config(), creator.clone());
    let mut session = RunSession::new("user-1");
    let text = retrieved_text();

    manager.ingest(&mut session, &text).await;
    manager.ingest(&mut session, &text).await;
    assert_eq!(creator.calls.load(Ordering::SeqCst), 1);

    session.state.rag_cache.as_mut().unwrap().expires_at = Utc::now() - Duration::seconds(1);
    manager.ingest(&mut session, &text).await;
    assert_eq!(creator.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn changed_text_creates_a_new_handle() {
    let creator = Arc::new(CountingCacheCreator::default());
    let manager = CacheLifecycleManager::new(cache_config(), creator.clone());
    let mut session = RunSession::new("user-1");

    manager.ingest(&mut session, &retrieved_text()).await;
    let first = session.state.rag_cache.clone().unwrap();

    let other_text = "Different retrieval result with enough length to qualify. ".repeat(10);
    manager.ingest(&mut session, &other_text).await;
    let second = session.state.rag_cache.clone().unwrap();

    assert_eq!(creator.calls.load(Ordering::SeqCst), 2);
    assert_ne!(first.content_hash, second.content_hash);
    assert_ne!(first.name, second.name);
}

#[tokio::test]
async fn ineligible_text_clears_stored_fields() {
    let creator = Arc::new(CountingCacheCreator::default());
    let manager = CacheLifecycleManager::new(cache_config(), creator.clone());
    let mut session = RunSession::new("user-1");

    manager.ingest(&mut session, &retrieved_text()).await;
    assert!(session.state.rag_cache.is_some());

    // Sentinel phrase, matched case-insensitively, invalidates caching.
    let padding = "x".repeat(300);
    let nothing = format!("NO RELEVANT INFORMATION FOUND IN KNOWLEDGE BASE. {padding}");
    manager.ingest(&mut session, &nothing).await;
    assert!(session.state.rag_cache.is_none());
    assert_eq!(creator.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn fresh_handle_attaches_and_redacts_before_model_call() {
    let creator = Arc::new(CountingCacheCreator::default());
    let manager = CacheLifecycleManager::new(cache_config(), creator);
    let mut session = RunSession::new("user-1");
    let text = retrieved_text();
    manager.ingest(&mut session, &text).await;

    let mut config = ModelCallConfig {
        model: MODEL.to_string(),
        system_instruction: format!("You are the advisor.\n\nKnowledge base:\n{text}"),
        cached_content: None,
    };
    manager.apply_to_model_call(&mut session, &mut config);

    assert!(config.cached_content.is_some());
    assert!(
        !config.system_instruction.contains(&text),
        "cached text must not be resent in the prompt"
    );
}

#[tokio::test]
async fn expired_handle_is_cleared_not_attached() {
    let creator = Arc::new(CountingCacheCreator::default());
    let manager = CacheLifecycleManager::new(cache_config(), creator);
    let mut session = RunSession::new("user-1");
    let text = retrieved_text();
    manager.ingest(&mut session, &text).await;
    session.state.rag_cache.as_mut().unwrap().expires_at = Utc::now() - Duration::seconds(1);

    let mut config = ModelCallConfig {
        model: MODEL.to_string(),
        system_instruction: text.clone(),
        cached_content: None,
    };
    manager.apply_to_model_call(&mut session, &mut config);

    assert!(config.cached_content.is_none());
    assert!(session.state.rag_cache.is_none());
    // The prompt keeps the full text when no handle is attached.
    assert!(config.system_instruction.contains(&text));
}
