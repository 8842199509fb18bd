//! Segment endpoint resolution for distributed deployments.

use crate::error::{CoreError, CoreResult};
use crate::segment::SegmentRecord;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};

/// Port remote segment workers listen on unless configured otherwise.
pub const DEFAULT_WORKER_PORT: u16 = 50051;

/// Maps a segment to the network endpoint of the worker serving it.
pub trait SegmentDirectory: Send + Sync {
    /// Returns the endpoint address for a segment.
    fn get_segment_endpoint(&self, record: &SegmentRecord) -> CoreResult<String>;
}

/// Assigns segments to workers by rendezvous (highest random weight)
/// hashing of the owning collection.
///
/// All segments of one collection land on the same worker, and changing
/// the member list only moves the collections whose winner changed.
#[derive(Debug)]
pub struct RendezvousHashDirectory {
    members: RwLock<Vec<String>>,
    port: u16,
}

impl RendezvousHashDirectory {
    /// Creates a directory over the given worker members.
    pub fn new<I, S>(members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            members: RwLock::new(members.into_iter().map(Into::into).collect()),
            port: DEFAULT_WORKER_PORT,
        }
    }

    /// Sets the worker port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Replaces the member list.
    pub fn set_members<I, S>(&self, members: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.members.write() = members.into_iter().map(Into::into).collect();
    }

    /// Returns the current member list.
    #[must_use]
    pub fn members(&self) -> Vec<String> {
        self.members.read().clone()
    }

    /// Returns the member with the highest weight for `key`.
    #[must_use]
    pub fn assign(&self, key: &str) -> Option<String> {
        self.members
            .read()
            .iter()
            .max_by_key(|member| (weight(member, key), (*member).clone()))
            .cloned()
    }
}

impl SegmentDirectory for RendezvousHashDirectory {
    fn get_segment_endpoint(&self, record: &SegmentRecord) -> CoreResult<String> {
        let key = record.collection().to_string();
        let member = self
            .assign(&key)
            .ok_or_else(|| CoreError::endpoint_resolution("member list is empty"))?;
        Ok(format!("{member}:{}", self.port))
    }
}

fn weight(member: &str, key: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(member.as_bytes());
    hasher.update([0u8]);
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}
