//! AccessLogService - Access Event Recording (Ring Buffer)
//!
//! ## Responsibilities
//!
//! - Store access events in a fixed-capacity ring buffer
//! - Provide recent-event queries for the API

use crate::authorization::AccessMethod;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::RwLock;

/// One granted access event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessRecord {
    pub id: u64,
    pub name: String,
    pub method: AccessMethod,
    pub timestamp: DateTime<Utc>,
}

/// Ring buffer for access records
struct AccessRingBuffer {
    records: VecDeque<AccessRecord>,
    capacity: usize,
    next_id: u64,
}

impl AccessRingBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
            next_id: 1,
        }
    }

    fn push(&mut self, mut record: AccessRecord) -> u64 {
        record.id = self.next_id;
        self.next_id += 1;

        if self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
        self.next_id - 1
    }

    fn recent(&self, count: usize) -> Vec<AccessRecord> {
        self.records.iter().rev().take(count).cloned().collect()
    }
}

/// AccessLogService instance
pub struct AccessLogService {
    buffer: RwLock<AccessRingBuffer>,
}

impl AccessLogService {
    /// Create new AccessLogService
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: RwLock::new(AccessRingBuffer::new(capacity)),
        }
    }

    /// Record a granted access
    pub async fn record(&self, name: &str, method: AccessMethod) -> u64 {
        let record = AccessRecord {
            id: 0, // assigned by the buffer
            name: name.to_string(),
            method,
            timestamp: Utc::now(),
        };
        let mut buffer = self.buffer.write().await;
        let id = buffer.push(record);
        tracing::debug!(record_id = id, name = %name, method = %method, "Access recorded");
        id
    }

    /// Most recent records, newest first
    pub async fn recent(&self, count: usize) -> Vec<AccessRecord> {
        let buffer = self.buffer.read().await;
        buffer.recent(count)
    }

    /// Total records currently held
    pub async fn count(&self) -> usize {
        let buffer = self.buffer.read().await;
        buffer.records.len()
    }
}

impl Default for AccessLogService {
    fn default() -> Self {
        Self::new(2000)
    }
}
