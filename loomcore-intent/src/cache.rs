//! The four cache layers probed, in order, before falling back to an LLM call.

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use async_trait::async_trait;
use lru::LruCache;
use sha2::{Digest, Sha256};

use crate::fingerprint::IntentFingerprint;

/// Everything a cache layer needs to decide whether it has a hit.
#[derive(Debug, Clone)]
pub struct IntentRequest {
    /// The user's current message, plain text.
    pub user_text: String,
    /// Identifies the conversation a fingerprint was computed against, so a
    /// cached entry from a different conversation never leaks across.
    pub conversation_signature: String,
    /// True if the prior turn in this conversation produced a concrete plan
    /// still in progress — used by the follow-up layer.
    pub has_active_plan: bool,
}

/// Exact-match cache key: `sha256(user_text || conversation_signature)`.
pub fn exact_match_key(req: &IntentRequest) -> String {
    let mut hasher = Sha256::new();
    hasher.update(req.user_text.as_bytes());
    hasher.update(b"\0");
    hasher.update(req.conversation_signature.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Per-layer hit/miss counters and cumulative latency, so the cache's
/// latency targets are verifiable layer by layer, not just end to end.
#[derive(Debug, Default, Clone, Copy)]
pub struct LayerStats {
    /// Number of probes that returned a fingerprint.
    pub hits: u64,
    /// Number of probes that returned nothing.
    pub misses: u64,
    /// Total time spent across all probes, in microseconds.
    pub total_micros: u64,
}

impl LayerStats {
    fn record(&mut self, hit: bool, micros: u64) {
        if hit {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        self.total_micros += micros;
    }
}

/// One probe in the ordered cache chain.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    /// Short identifier used in logs and stats lookups.
    fn name(&self) -> &'static str;

    /// Return a cached fingerprint for `req`, or `None` on a miss.
    async fn probe(&self, req: &IntentRequest) -> Option<IntentFingerprint>;

    /// Record a freshly computed fingerprint for future probes.
    async fn store(&self, req: &IntentRequest, fingerprint: &IntentFingerprint);
}

/// Layer 1: exact match on `hash(user_text, conversation_signature)`.
pub struct ExactMatchCache {
    entries: Mutex<std::collections::HashMap<String, IntentFingerprint>>,
}

impl ExactMatchCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self { entries: Mutex::new(std::collections::HashMap::new()) }
    }
}

impl Default for ExactMatchCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheLayer for ExactMatchCache {
    fn name(&self) -> &'static str {
        "exact_match"
    }

    async fn probe(&self, req: &IntentRequest) -> Option<IntentFingerprint> {
        let key = exact_match_key(req);
        self.entries.lock().unwrap().get(&key).cloned()
    }

    async fn store(&self, req: &IntentRequest, fingerprint: &IntentFingerprint) {
        let key = exact_match_key(req);
        self.entries.lock().unwrap().insert(key, fingerprint.clone());
    }
}

/// Produces a fixed-length embedding for a piece of text.
///
/// Real deployments plug in a model-backed embedder; this crate only
/// defines the seam and a deterministic stand-in for tests.
pub trait Embedder: Send + Sync {
    /// Embed `text` into a fixed-length vector.
    fn embed(&self, text: &str) -> Vec<f32>;
}

/// A deterministic bag-of-bytes embedder with no model behind it, useful
/// for tests and as a placeholder until a real embedder is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct HashEmbedder;

const HASH_EMBED_DIM: usize = 32;

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; HASH_EMBED_DIM];
        for (i, byte) in text.bytes().enumerate() {
            v[i % HASH_EMBED_DIM] += byte as f32;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

struct SemanticEntry {
    embedding: Vec<f32>,
    conversation_signature: String,
    fingerprint: IntentFingerprint,
}

/// Layer 2: embedding similarity against a bounded LRU of prior fingerprints.
///
/// Bounded by entry count, not a memory estimate — matching the rest of the
/// cache chain's simplicity. Process-local, never persisted.
pub struct SemanticCache {
    embedder: Box<dyn Embedder>,
    threshold: f32,
    entries: Mutex<LruCache<u64, SemanticEntry>>,
    next_id: Mutex<u64>,
}

impl SemanticCache {
    /// Build a cache holding up to `capacity` entries, hitting when cosine
    /// similarity is at least `threshold` and the conversation matches.
    pub fn new(embedder: impl Embedder + 'static, capacity: usize, threshold: f32) -> Self {
        Self {
            embedder: Box::new(embedder),
            threshold,
            entries: Mutex::new(LruCache::new(NonZeroUsize::new(capacity.max(1)).unwrap())),
            next_id: Mutex::new(0),
        }
    }
}

#[async_trait]
impl CacheLayer for SemanticCache {
    fn name(&self) -> &'static str {
        "semantic"
    }

    async fn probe(&self, req: &IntentRequest) -> Option<IntentFingerprint> {
        let embedding = self.embedder.embed(&req.user_text);
        let entries = self.entries.lock().unwrap();
        entries
            .iter()
            .filter(|(_, entry)| entry.conversation_signature == req.conversation_signature)
            .map(|(_, entry)| (cosine_similarity(&embedding, &entry.embedding), entry))
            .filter(|(score, _)| *score >= self.threshold)
            .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap())
            .map(|(_, entry)| entry.fingerprint.clone())
    }

    async fn store(&self, req: &IntentRequest, fingerprint: &IntentFingerprint) {
        let embedding = self.embedder.embed(&req.user_text);
        let mut next_id = self.next_id.lock().unwrap();
        let id = *next_id;
        *next_id += 1;
        self.entries.lock().unwrap().put(
            id,
            SemanticEntry {
                embedding,
                conversation_signature: req.conversation_signature.clone(),
                fingerprint: fingerprint.clone(),
            },
        );
    }
}

/// Layer 3: reuse the previous turn's fingerprint verbatim for a short
/// follow-up message when a plan is already in progress.
pub struct FollowUpCache {
    max_len: usize,
    last: Mutex<Option<(String, IntentFingerprint)>>,
}

impl FollowUpCache {
    /// Treat messages no longer than `max_len` characters as follow-ups.
    pub fn new(max_len: usize) -> Self {
        Self { max_len, last: Mutex::new(None) }
    }
}

#[async_trait]
impl CacheLayer for FollowUpCache {
    fn name(&self) -> &'static str {
        "follow_up"
    }

    async fn probe(&self, req: &IntentRequest) -> Option<IntentFingerprint> {
        if !req.has_active_plan || req.user_text.chars().count() > self.max_len {
            return None;
        }
        let last = self.last.lock().unwrap();
        last.as_ref()
            .filter(|(sig, _)| *sig == req.conversation_signature)
            .map(|(_, fp)| fp.clone())
    }

    async fn store(&self, req: &IntentRequest, fingerprint: &IntentFingerprint) {
        *self.last.lock().unwrap() = Some((req.conversation_signature.clone(), fingerprint.clone()));
    }
}

/// Always-available tools granted regardless of skill selection.
pub fn base_allowlist() -> HashSet<String> {
    HashSet::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(text: &str, sig: &str, has_plan: bool) -> IntentRequest {
        IntentRequest { user_text: text.into(), conversation_signature: sig.into(), has_active_plan: has_plan }
    }

    fn fp() -> IntentFingerprint {
        IntentFingerprint::default_fallback("k", HashSet::new())
    }

    #[tokio::test]
    async fn exact_match_hits_on_identical_request() {
        let cache = ExactMatchCache::new();
        let r = req("hello", "conv1", false);
        cache.store(&r, &fp()).await;
        assert!(cache.probe(&r).await.is_some());
        assert!(cache.probe(&req("hello", "conv2", false)).await.is_none());
    }

    #[tokio::test]
    async fn semantic_cache_hits_on_similar_text_same_conversation() {
        let cache = SemanticCache::new(HashEmbedder, 8, 0.0);
        let r1 = req("please read the config file", "conv1", false);
        cache.store(&r1, &fp()).await;
        let r2 = req("please read the config file now", "conv1", false);
        assert!(cache.probe(&r2).await.is_some());
    }

    #[tokio::test]
    async fn semantic_cache_ignores_other_conversations() {
        let cache = SemanticCache::new(HashEmbedder, 8, 0.0);
        let r1 = req("identical text", "conv1", false);
        cache.store(&r1, &fp()).await;
        let r2 = req("identical text", "conv2", false);
        assert!(cache.probe(&r2).await.is_none());
    }

    #[tokio::test]
    async fn follow_up_cache_reuses_short_messages_with_active_plan() {
        let cache = FollowUpCache::new(40);
        let r1 = req("do the thing", "conv1", true);
        cache.store(&r1, &fp()).await;
        let r2 = req("yes", "conv1", true);
        assert!(cache.probe(&r2).await.is_some());
    }

    #[tokio::test]
    async fn follow_up_cache_ignores_requests_without_an_active_plan() {
        let cache = FollowUpCache::new(40);
        let r1 = req("do the thing", "conv1", true);
        cache.store(&r1, &fp()).await;
        let r2 = req("yes", "conv1", false);
        assert!(cache.probe(&r2).await.is_none());
    }

    #[tokio::test]
    async fn follow_up_cache_ignores_long_messages() {
        let cache = FollowUpCache::new(5);
        let r1 = req("do the thing", "conv1", true);
        cache.store(&r1, &fp()).await;
        let r2 = req("a much longer follow up message", "conv1", true);
        assert!(cache.probe(&r2).await.is_none());
    }
}
