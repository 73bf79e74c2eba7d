//! In-Memory Token Store Implementation

use chrono::{Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::application::ports::{SpeakRequest, TokenEntry, TokenStorePort};

/// 内存播放令牌存储
///
/// 进程重启即全部失效。过期条目在签发新令牌时批量清理，
/// 在解析命中过期条目时单独删除。
pub struct InMemoryTokenStore {
    tokens: DashMap<String, TokenEntry>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self {
            tokens: DashMap::new(),
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn prune_expired(&self) {
        let now = Utc::now();
        self.tokens.retain(|_, entry| entry.expires_at > now);
    }
}

impl Default for InMemoryTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStorePort for InMemoryTokenStore {
    fn issue(&self, owner_id: &str, request: SpeakRequest, ttl: Duration) -> String {
        self.prune_expired();

        let token = Uuid::new_v4().to_string();
        let expires_at = Utc::now()
            + ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::seconds(300));
        self.tokens.insert(
            token.clone(),
            TokenEntry {
                request,
                owner_id: owner_id.to_string(),
                expires_at,
            },
        );
        tracing::debug!(token = %token, "Playback token issued");
        token
    }

    fn resolve(&self, token: &str) -> Option<TokenEntry> {
        let entry = self.tokens.get(token).map(|e| e.clone())?;
        if entry.expires_at <= Utc::now() {
            self.tokens.remove(token);
            return None;
        }
        Some(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::TtsMode;

    fn request() -> SpeakRequest {
        SpeakRequest {
            mode: TtsMode::Offline,
            voice: "amy".to_string(),
            rate: None,
            text: "hello".to_string(),
        }
    }

    #[test]
    fn test_issue_and_resolve() {
        let store = InMemoryTokenStore::new();
        let token = store.issue("alice", request(), Duration::from_secs(60));

        let entry = store.resolve(&token).unwrap();
        assert_eq!(entry.owner_id, "alice");
        assert_eq!(entry.request.text, "hello");
    }

    #[test]
    fn test_unknown_token_resolves_to_none() {
        let store = InMemoryTokenStore::new();
        assert!(store.resolve("nope").is_none());
    }

    #[test]
    fn test_expired_token_is_deleted_on_lookup() {
        let store = InMemoryTokenStore::new();
        let token = store.issue("alice", request(), Duration::from_secs(0));

        assert!(store.resolve(&token).is_none());
        assert!(store.tokens.get(&token).is_none());
    }

    #[test]
    fn test_issue_prunes_expired_tokens() {
        let store = InMemoryTokenStore::new();
        let dead = store.issue("alice", request(), Duration::from_secs(0));
        let _live = store.issue("alice", request(), Duration::from_secs(60));

        assert!(store.tokens.get(&dead).is_none());
        assert_eq!(store.tokens.len(), 1);
    }
}
