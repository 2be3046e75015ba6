//! Structural queue snapshots.
//!
//! The snapshot is a plain dump of every tracked job, intended for
//! local-process save/restore rather than as a compatibility contract.

use serde::{Deserialize, Serialize};

use slidecast_models::SlideshowJob;

use crate::error::QueueResult;

/// Serializable dump of the queue's job registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub jobs: Vec<SlideshowJob>,
}

impl QueueSnapshot {
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> QueueResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> QueueResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_roundtrip() {
        let snapshot = QueueSnapshot {
            jobs: vec![SlideshowJob::new("/pool", 2)],
        };
        let json = snapshot.to_json().expect("serialize snapshot");
        let decoded = QueueSnapshot::from_json(&json).expect("deserialize snapshot");
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded.jobs[0].id, snapshot.jobs[0].id);
    }

    #[test]
    fn from_json_rejects_garbage() {
        assert!(QueueSnapshot::from_json("not json").is_err());
    }
}
