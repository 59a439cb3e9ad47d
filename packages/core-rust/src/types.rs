use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Free-form JSON object attached to queues and pools.
pub type Metadata = serde_json::Map<String, Value>;

/// Reserved queue metadata key naming the flavor a queue is routed by.
pub const FLAVOR_KEY: &str = "_flavor";

/// Identity of a queue: the tenant (project) and the queue name.
///
/// Every queue, message and claim operation is addressed through a `QueueId`.
/// Two projects may use the same queue name without colliding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueueId {
    /// Tenant that owns the queue.
    pub project: String,
    /// Queue name, unique within the project.
    pub name: String,
}

impl QueueId {
    #[must_use]
    pub fn new(project: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project, self.name)
    }
}

/// Returns the flavor a queue was created with, if any.
#[must_use]
pub fn flavor_of(metadata: &Metadata) -> Option<&str> {
    metadata.get(FLAVOR_KEY).and_then(Value::as_str)
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// A message submitted by a producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    /// Opaque JSON payload.
    pub body: Value,
    /// Lifetime in seconds, counted from the time the message is posted.
    pub ttl: u32,
}

/// A message as seen by consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub body: Value,
    /// Lifetime in seconds as posted by the producer.
    pub ttl: u32,
    /// Seconds since the message was posted.
    pub age: u64,
    /// Milliseconds since the Unix epoch.
    pub posted_at: u64,
    /// Claim currently holding the message, if that claim is still live.
    pub claim_id: Option<String>,
}

/// One page of a message listing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    /// Opaque marker to pass as [`ListOptions::marker`] for the next page.
    /// `None` when the page is empty.
    pub next_marker: Option<String>,
}

/// Paging and filtering options for message listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListOptions {
    /// Marker returned with the previous page.
    pub marker: Option<String>,
    /// Maximum number of messages returned.
    pub limit: usize,
    /// Include messages bound to a live claim.
    pub include_claimed: bool,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            marker: None,
            limit: 10,
            include_claimed: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Claims
// ---------------------------------------------------------------------------

/// Parameters of a claim request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewClaim {
    /// Lease duration in seconds.
    pub ttl: u32,
    /// Extra seconds claimed messages must outlive the lease.
    pub grace: u32,
    /// Maximum number of messages to claim. `None` uses the configured default.
    pub limit: Option<usize>,
}

/// Outcome of creating a claim.
///
/// `claim_id` is `None` when no message was eligible; no claim exists then.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClaimBatch {
    pub claim_id: Option<String>,
    pub messages: Vec<Message>,
}

impl ClaimBatch {
    /// The result returned when nothing could be claimed.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// A live claim and the messages it still holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimDetails {
    pub id: String,
    pub ttl: u32,
    pub grace: u32,
    /// Seconds since the lease was (re)started.
    pub age: u64,
    pub messages: Vec<Message>,
}

// ---------------------------------------------------------------------------
// Queues
// ---------------------------------------------------------------------------

/// Entry of a queue listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSummary {
    pub name: String,
    /// Present only for detailed listings.
    pub metadata: Option<Metadata>,
}

/// Age information about a single message, used by [`QueueStats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageStat {
    pub id: String,
    /// Seconds since the message was posted.
    pub age: u64,
    /// Milliseconds since the Unix epoch.
    pub created: u64,
}

/// Message counts for a queue. Expired messages are not counted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub free: u64,
    pub claimed: u64,
    pub total: u64,
    pub oldest: Option<MessageStat>,
    pub newest: Option<MessageStat>,
}

// ---------------------------------------------------------------------------
// Pools
// ---------------------------------------------------------------------------

/// A backend storage pool registered by an operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolRecord {
    /// Unique pool name.
    pub name: String,
    /// Location of the backend; the scheme selects the driver.
    pub uri: String,
    /// Relative probability of receiving new queues. 0 = no new queues.
    pub weight: u32,
    /// Capability tag used to route flavored queues.
    pub flavor: Option<String>,
    /// Backend-specific options.
    #[serde(default)]
    pub options: Metadata,
}

impl PoolRecord {
    #[must_use]
    pub fn new(name: impl Into<String>, uri: impl Into<String>, weight: u32) -> Self {
        Self {
            name: name.into(),
            uri: uri.into(),
            weight,
            flavor: None,
            options: Metadata::new(),
        }
    }

    #[must_use]
    pub fn with_flavor(mut self, flavor: impl Into<String>) -> Self {
        self.flavor = Some(flavor.into());
        self
    }

    /// Copy of the record without backend options, as returned by
    /// non-detailed reads.
    #[must_use]
    pub fn summary(&self) -> Self {
        Self {
            options: Metadata::new(),
            ..self.clone()
        }
    }
}

/// Partial update of a pool record. Unset fields are left unchanged.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PoolUpdate {
    pub uri: Option<String>,
    pub weight: Option<u32>,
    /// `Some(None)` removes the pool's flavor; in JSON, `"flavor": null`.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    pub flavor: Option<Option<String>>,
    pub options: Option<Metadata>,
}

/// Maps a field that is present (even as `null`) to `Some`, so a missing
/// field and an explicit `null` stay distinguishable.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl PoolUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.uri.is_none() && self.weight.is_none() && self.flavor.is_none() && self.options.is_none()
    }

    /// Applies the set fields to `record`.
    pub fn apply(&self, record: &mut PoolRecord) {
        if let Some(uri) = &self.uri {
            record.uri.clone_from(uri);
        }
        if let Some(weight) = self.weight {
            record.weight = weight;
        }
        if let Some(flavor) = &self.flavor {
            record.flavor.clone_from(flavor);
        }
        if let Some(options) = &self.options {
            record.options.clone_from(options);
        }
    }
}

/// Sticky assignment of a queue to a pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub queue: QueueId,
    pub pool: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn queue_id_displays_project_and_name() {
        let id = QueueId::new("480924", "fizbit");
        assert_eq!(id.to_string(), "480924/fizbit");
    }

    #[test]
    fn flavor_is_read_from_reserved_key() {
        let mut metadata = Metadata::new();
        assert_eq!(flavor_of(&metadata), None);

        metadata.insert(FLAVOR_KEY.to_string(), json!("gold"));
        assert_eq!(flavor_of(&metadata), Some("gold"));

        metadata.insert(FLAVOR_KEY.to_string(), json!(42));
        assert_eq!(flavor_of(&metadata), None);
    }

    #[test]
    fn pool_summary_drops_options() {
        let mut pool = PoolRecord::new("p1", "memory://p1", 100).with_flavor("gold");
        pool.options.insert("replicas".to_string(), json!(3));

        let summary = pool.summary();
        assert!(summary.options.is_empty());
        assert_eq!(summary.flavor.as_deref(), Some("gold"));
        assert_eq!(summary.weight, 100);
    }

    #[test]
    fn pool_update_applies_only_set_fields() {
        let mut pool = PoolRecord::new("p1", "memory://p1", 100);
        let update = PoolUpdate {
            weight: Some(0),
            ..PoolUpdate::default()
        };
        assert!(!update.is_empty());
        update.apply(&mut pool);

        assert_eq!(pool.weight, 0);
        assert_eq!(pool.uri, "memory://p1");
        assert!(PoolUpdate::default().is_empty());
    }

    #[test]
    fn pool_update_can_clear_flavor() {
        let mut pool = PoolRecord::new("p1", "memory://p1", 100).with_flavor("gold");

        let keep: PoolUpdate = serde_json::from_value(json!({ "weight": 5 })).unwrap();
        assert_eq!(keep.flavor, None);
        keep.apply(&mut pool);
        assert_eq!(pool.flavor.as_deref(), Some("gold"));

        let clear: PoolUpdate = serde_json::from_value(json!({ "flavor": null })).unwrap();
        assert_eq!(clear.flavor, Some(None));
        assert!(!clear.is_empty());
        clear.apply(&mut pool);
        assert_eq!(pool.flavor, None);

        let set: PoolUpdate = serde_json::from_value(json!({ "flavor": "silver" })).unwrap();
        set.apply(&mut pool);
        assert_eq!(pool.flavor.as_deref(), Some("silver"));
        assert_eq!(serde_json::to_value(&clear).unwrap()["flavor"], json!(null));
    }

    #[test]
    fn empty_claim_batch_has_no_id() {
        let batch = ClaimBatch::empty();
        assert!(batch.is_empty());
        assert!(batch.claim_id.is_none());
    }
}
