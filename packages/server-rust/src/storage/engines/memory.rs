//! In-memory [`DataDriver`] backed by a [`DashMap`] of per-queue state.
//!
//! Each queue's messages and claims live behind one `parking_lot::RwLock`.
//! Claim creation binds messages under that queue's write lock, so selecting
//! and marking is a single conditional update: a message is only bound when
//! it holds no live lease at that instant. Unrelated queues never contend.
//!
//! Expiry is lazy. Messages and claims carry absolute expiry timestamps that
//! are compared against the injected clock on every read; expired entries are
//! purged opportunistically by writers.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use uuid::Uuid;
use wharf_core::clock::secs_to_millis;
use wharf_core::{
    validation, ClaimBatch, ClaimDetails, ListOptions, Message, MessagePage, MessageStat,
    Metadata, NewClaim, NewMessage, QueueId, QueueStats, QueueSummary, StorageError,
    StorageResult,
};

use crate::storage::driver::{ClaimController, DataDriver, MessageController, QueueController};
use crate::storage::factory::DriverContext;

fn age_secs(since: u64, now: u64) -> u64 {
    now.saturating_sub(since) / 1000
}

// ---------------------------------------------------------------------------
// Stored state
// ---------------------------------------------------------------------------

/// Lease held on a message. Only meaningful while `expires_at > now`.
#[derive(Debug, Clone)]
struct Binding {
    claim_id: String,
    expires_at: u64,
}

#[derive(Debug, Clone)]
struct StoredMessage {
    id: String,
    body: Value,
    ttl: u32,
    posted_at: u64,
    /// Posting time plus ttl, pushed out by claim grace periods.
    expires_at: u64,
    claim: Option<Binding>,
}

impl StoredMessage {
    fn is_live(&self, now: u64) -> bool {
        self.expires_at > now
    }

    /// Id of the claim currently holding this message, if its lease is live.
    fn holder(&self, now: u64) -> Option<&str> {
        self.claim
            .as_ref()
            .filter(|binding| binding.expires_at > now)
            .map(|binding| binding.claim_id.as_str())
    }

    fn to_message(&self, now: u64) -> Message {
        Message {
            id: self.id.clone(),
            body: self.body.clone(),
            ttl: self.ttl,
            age: age_secs(self.posted_at, now),
            posted_at: self.posted_at,
            claim_id: self.holder(now).map(str::to_string),
        }
    }

    fn stat(&self, now: u64) -> MessageStat {
        MessageStat {
            id: self.id.clone(),
            age: age_secs(self.posted_at, now),
            created: self.posted_at,
        }
    }
}

#[derive(Debug, Clone)]
struct StoredClaim {
    ttl: u32,
    grace: u32,
    /// Start of the current lease; reset by updates.
    created_at: u64,
    message_ids: Vec<String>,
}

impl StoredClaim {
    fn expires_at(&self) -> u64 {
        self.created_at + secs_to_millis(self.ttl)
    }

    fn is_live(&self, now: u64) -> bool {
        now < self.expires_at()
    }
}

#[derive(Debug, Default)]
struct QueueState {
    metadata: Metadata,
    next_marker: u64,
    /// Messages keyed by post order.
    messages: BTreeMap<u64, StoredMessage>,
    /// Message id -> marker.
    index: HashMap<String, u64>,
    claims: HashMap<String, StoredClaim>,
}

impl QueueState {
    fn new(metadata: Metadata) -> Self {
        Self {
            metadata,
            ..Self::default()
        }
    }

    fn purge_expired(&mut self, now: u64) {
        let index = &mut self.index;
        self.messages.retain(|_, msg| {
            let live = msg.is_live(now);
            if !live {
                index.remove(&msg.id);
            }
            live
        });
        self.claims.retain(|_, claim| claim.is_live(now));
    }

    fn append(&mut self, message: NewMessage, now: u64) -> String {
        let marker = self.next_marker;
        self.next_marker += 1;

        let id = Uuid::new_v4().to_string();
        self.index.insert(id.clone(), marker);
        self.messages.insert(
            marker,
            StoredMessage {
                id: id.clone(),
                body: message.body,
                ttl: message.ttl,
                posted_at: now,
                expires_at: now + secs_to_millis(message.ttl),
                claim: None,
            },
        );
        id
    }

    fn message(&self, id: &str) -> Option<&StoredMessage> {
        self.index.get(id).and_then(|marker| self.messages.get(marker))
    }

    fn message_mut(&mut self, id: &str) -> Option<&mut StoredMessage> {
        let marker = *self.index.get(id)?;
        self.messages.get_mut(&marker)
    }

    fn remove_message(&mut self, id: &str) -> Option<StoredMessage> {
        let marker = self.index.remove(id)?;
        self.messages.remove(&marker)
    }
}

struct MemoryStore {
    queues: DashMap<QueueId, Arc<RwLock<QueueState>>>,
    context: DriverContext,
}

impl MemoryStore {
    fn now(&self) -> u64 {
        self.context.clock.now()
    }

    fn find(&self, queue: &QueueId) -> Option<Arc<RwLock<QueueState>>> {
        self.queues.get(queue).map(|entry| Arc::clone(entry.value()))
    }

    fn queue(&self, queue: &QueueId) -> StorageResult<Arc<RwLock<QueueState>>> {
        self.find(queue)
            .ok_or_else(|| StorageError::QueueDoesNotExist(queue.clone()))
    }
}

// ---------------------------------------------------------------------------
// MemoryDriver
// ---------------------------------------------------------------------------

/// Process-local backend selected by `memory://` URIs.
///
/// Every instance is an independent store; the pool catalog keeps one
/// instance per pool.
pub struct MemoryDriver {
    queues: MemoryQueues,
    messages: MemoryMessages,
    claims: MemoryClaims,
}

impl MemoryDriver {
    #[must_use]
    pub fn new(context: DriverContext) -> Self {
        let store = Arc::new(MemoryStore {
            queues: DashMap::new(),
            context,
        });
        Self {
            queues: MemoryQueues(Arc::clone(&store)),
            messages: MemoryMessages(Arc::clone(&store)),
            claims: MemoryClaims(store),
        }
    }
}

#[async_trait]
impl DataDriver for MemoryDriver {
    fn queues(&self) -> &dyn QueueController {
        &self.queues
    }

    fn messages(&self) -> &dyn MessageController {
        &self.messages
    }

    fn claims(&self) -> &dyn ClaimController {
        &self.claims
    }

    async fn is_alive(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// Queues
// ---------------------------------------------------------------------------

struct MemoryQueues(Arc<MemoryStore>);

#[async_trait]
impl QueueController for MemoryQueues {
    async fn create(&self, queue: &QueueId, metadata: Metadata) -> StorageResult<bool> {
        validation::name("queue", &queue.name)?;
        match self.0.queues.entry(queue.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(RwLock::new(QueueState::new(metadata))));
                Ok(true)
            }
        }
    }

    async fn get_metadata(&self, queue: &QueueId) -> StorageResult<Metadata> {
        let state = self.0.queue(queue)?;
        let metadata = state.read().metadata.clone();
        Ok(metadata)
    }

    async fn set_metadata(&self, queue: &QueueId, metadata: Metadata) -> StorageResult<()> {
        let state = self.0.queue(queue)?;
        state.write().metadata = metadata;
        Ok(())
    }

    async fn exists(&self, queue: &QueueId) -> StorageResult<bool> {
        Ok(self.0.queues.contains_key(queue))
    }

    async fn delete(&self, queue: &QueueId) -> StorageResult<()> {
        self.0.queues.remove(queue);
        Ok(())
    }

    async fn list(
        &self,
        project: &str,
        marker: Option<&str>,
        limit: usize,
        detailed: bool,
    ) -> StorageResult<Vec<QueueSummary>> {
        let mut found: Vec<(String, Arc<RwLock<QueueState>>)> = self
            .0
            .queues
            .iter()
            .filter(|entry| {
                entry.key().project == project
                    && marker.map_or(true, |m| entry.key().name.as_str() > m)
            })
            .map(|entry| (entry.key().name.clone(), Arc::clone(entry.value())))
            .collect();
        found.sort_by(|a, b| a.0.cmp(&b.0));
        found.truncate(limit);

        Ok(found
            .into_iter()
            .map(|(name, state)| QueueSummary {
                name,
                metadata: detailed.then(|| state.read().metadata.clone()),
            })
            .collect())
    }

    async fn stats(&self, queue: &QueueId) -> StorageResult<QueueStats> {
        let state = self.0.queue(queue)?;
        let now = self.0.now();
        let state = state.read();

        let mut stats = QueueStats::default();
        let mut live = state.messages.values().filter(|msg| msg.is_live(now));
        let mut newest = None;
        for msg in live.by_ref() {
            if msg.holder(now).is_some() {
                stats.claimed += 1;
            } else {
                stats.free += 1;
            }
            if stats.oldest.is_none() {
                stats.oldest = Some(msg.stat(now));
            }
            newest = Some(msg);
        }
        stats.total = stats.free + stats.claimed;
        stats.newest = newest.map(|msg| msg.stat(now));
        Ok(stats)
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

struct MemoryMessages(Arc<MemoryStore>);

#[async_trait]
impl MessageController for MemoryMessages {
    async fn post(&self, queue: &QueueId, messages: Vec<NewMessage>) -> StorageResult<Vec<String>> {
        if messages.is_empty() {
            return Err(StorageError::bad_request("no messages to post"));
        }
        for message in &messages {
            validation::message_ttl(message.ttl)?;
        }

        let state = self.0.queue(queue)?;
        let now = self.0.now();
        let mut state = state.write();
        state.purge_expired(now);
        Ok(messages
            .into_iter()
            .map(|message| state.append(message, now))
            .collect())
    }

    async fn list(&self, queue: &QueueId, options: &ListOptions) -> StorageResult<MessagePage> {
        if options.limit == 0 {
            return Err(StorageError::bad_request("listing limit must be positive"));
        }
        let limit = options
            .limit
            .min(self.0.context.limits.max_messages_per_page);
        let start = match options.marker.as_deref() {
            None => 0,
            Some(marker) => {
                marker
                    .parse::<u64>()
                    .map_err(|_| StorageError::bad_request(format!("invalid marker {marker:?}")))?
                    + 1
            }
        };

        let state = self.0.queue(queue)?;
        let now = self.0.now();
        let state = state.read();

        let mut last = None;
        let messages = state
            .messages
            .range(start..)
            .filter(|(_, msg)| {
                msg.is_live(now) && (options.include_claimed || msg.holder(now).is_none())
            })
            .take(limit)
            .map(|(marker, msg)| {
                last = Some(*marker);
                msg.to_message(now)
            })
            .collect();

        Ok(MessagePage {
            messages,
            next_marker: last.map(|marker| marker.to_string()),
        })
    }

    async fn get(&self, queue: &QueueId, message_id: &str) -> StorageResult<Message> {
        let state = self.0.queue(queue)?;
        let now = self.0.now();
        let state = state.read();
        state
            .message(message_id)
            .filter(|msg| msg.is_live(now))
            .map(|msg| msg.to_message(now))
            .ok_or_else(|| StorageError::MessageDoesNotExist {
                queue: queue.clone(),
                message: message_id.to_string(),
            })
    }

    async fn bulk_get(&self, queue: &QueueId, message_ids: &[String]) -> StorageResult<Vec<Message>> {
        let state = self.0.queue(queue)?;
        let now = self.0.now();
        let state = state.read();
        Ok(message_ids
            .iter()
            .filter_map(|id| state.message(id))
            .filter(|msg| msg.is_live(now))
            .map(|msg| msg.to_message(now))
            .collect())
    }

    async fn delete(
        &self,
        queue: &QueueId,
        message_id: &str,
        claim_id: Option<&str>,
    ) -> StorageResult<()> {
        let Some(state) = self.0.find(queue) else {
            return Ok(());
        };
        let now = self.0.now();
        let mut guard = state.write();
        let state = &mut *guard;

        let Some(msg) = state.message(message_id).filter(|msg| msg.is_live(now)) else {
            return Ok(());
        };

        match (msg.holder(now), claim_id) {
            (None, None) => {}
            (Some(holder), Some(given)) if holder == given => {}
            (Some(_), None) => {
                return Err(StorageError::MessageIsClaimed {
                    queue: queue.clone(),
                    message: message_id.to_string(),
                });
            }
            (Some(_), Some(given)) => {
                return Err(StorageError::ClaimDoesNotExist {
                    queue: queue.clone(),
                    claim: given.to_string(),
                });
            }
            (None, Some(given)) => {
                return Err(StorageError::ClaimNotHeld {
                    message: message_id.to_string(),
                    claim: given.to_string(),
                });
            }
        }

        state.remove_message(message_id);
        Ok(())
    }

    async fn bulk_delete(&self, queue: &QueueId, message_ids: &[String]) -> StorageResult<()> {
        let Some(state) = self.0.find(queue) else {
            return Ok(());
        };
        let now = self.0.now();
        let mut state = state.write();
        for id in message_ids {
            let claimed = state
                .message(id)
                .is_some_and(|msg| msg.holder(now).is_some());
            if !claimed {
                state.remove_message(id);
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Claims
// ---------------------------------------------------------------------------

struct MemoryClaims(Arc<MemoryStore>);

impl MemoryClaims {
    fn missing(queue: &QueueId, claim_id: &str) -> StorageError {
        StorageError::ClaimDoesNotExist {
            queue: queue.clone(),
            claim: claim_id.to_string(),
        }
    }
}

#[async_trait]
impl ClaimController for MemoryClaims {
    async fn create(&self, queue: &QueueId, claim: NewClaim) -> StorageResult<ClaimBatch> {
        validation::claim_ttl(claim.ttl)?;
        validation::claim_grace(claim.grace)?;
        let limits = &self.0.context.limits;
        let limit = validation::claim_limit(
            claim.limit,
            limits.default_claim_limit,
            limits.max_messages_per_claim,
        )?;

        let state = self.0.queue(queue)?;
        let now = self.0.now();
        let lease_expires = now + secs_to_millis(claim.ttl);
        let min_expiry = lease_expires + secs_to_millis(claim.grace);
        let claim_id = Uuid::new_v4().to_string();

        let mut guard = state.write();
        let state = &mut *guard;
        state.purge_expired(now);

        let mut claimed = Vec::new();
        let mut message_ids = Vec::new();
        for msg in state.messages.values_mut() {
            if claimed.len() == limit {
                break;
            }
            if msg.holder(now).is_some() {
                continue;
            }
            msg.claim = Some(Binding {
                claim_id: claim_id.clone(),
                expires_at: lease_expires,
            });
            msg.expires_at = msg.expires_at.max(min_expiry);
            message_ids.push(msg.id.clone());
            claimed.push(msg.to_message(now));
        }

        if claimed.is_empty() {
            return Ok(ClaimBatch::empty());
        }

        state.claims.insert(
            claim_id.clone(),
            StoredClaim {
                ttl: claim.ttl,
                grace: claim.grace,
                created_at: now,
                message_ids,
            },
        );
        drop(guard);

        tracing::debug!(queue = %queue, claim = %claim_id, count = claimed.len(), "claim created");
        Ok(ClaimBatch {
            claim_id: Some(claim_id),
            messages: claimed,
        })
    }

    async fn get(&self, queue: &QueueId, claim_id: &str) -> StorageResult<ClaimDetails> {
        let state = self.0.queue(queue)?;
        let now = self.0.now();
        let state = state.read();

        let claim = state
            .claims
            .get(claim_id)
            .filter(|claim| claim.is_live(now))
            .ok_or_else(|| Self::missing(queue, claim_id))?;

        let messages = claim
            .message_ids
            .iter()
            .filter_map(|id| state.message(id))
            .filter(|msg| msg.is_live(now) && msg.holder(now) == Some(claim_id))
            .map(|msg| msg.to_message(now))
            .collect();

        Ok(ClaimDetails {
            id: claim_id.to_string(),
            ttl: claim.ttl,
            grace: claim.grace,
            age: age_secs(claim.created_at, now),
            messages,
        })
    }

    async fn update(
        &self,
        queue: &QueueId,
        claim_id: &str,
        ttl: u32,
        grace: Option<u32>,
    ) -> StorageResult<()> {
        validation::claim_ttl(ttl)?;
        if let Some(grace) = grace {
            validation::claim_grace(grace)?;
        }

        let state = self.0.queue(queue)?;
        let now = self.0.now();
        let mut guard = state.write();
        let QueueState {
            messages,
            index,
            claims,
            ..
        } = &mut *guard;

        let claim = claims
            .get_mut(claim_id)
            .filter(|claim| claim.is_live(now))
            .ok_or_else(|| Self::missing(queue, claim_id))?;
        claim.created_at = now;
        claim.ttl = ttl;
        if let Some(grace) = grace {
            claim.grace = grace;
        }

        let lease_expires = claim.expires_at();
        let min_expiry = lease_expires + secs_to_millis(claim.grace);
        for id in &claim.message_ids {
            let Some(msg) = index.get(id).and_then(|marker| messages.get_mut(marker)) else {
                continue;
            };
            if msg.holder(now) != Some(claim_id) {
                continue;
            }
            if let Some(binding) = msg.claim.as_mut() {
                binding.expires_at = lease_expires;
            }
            msg.expires_at = msg.expires_at.max(min_expiry);
        }
        Ok(())
    }

    async fn delete(&self, queue: &QueueId, claim_id: &str) -> StorageResult<()> {
        let Some(state) = self.0.find(queue) else {
            return Ok(());
        };
        let mut guard = state.write();
        let state = &mut *guard;

        let Some(claim) = state.claims.remove(claim_id) else {
            return Ok(());
        };
        for id in &claim.message_ids {
            if let Some(msg) = state.message_mut(id) {
                if msg
                    .claim
                    .as_ref()
                    .is_some_and(|binding| binding.claim_id == claim_id)
                {
                    msg.claim = None;
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
