//! Query cache for the remote-backed mode.
//!
//! Every key carries an epoch. A fetch records the epoch it started under and its result is
//! only stored if the epoch is unchanged, so invalidations and optimistic edits that land while
//! a fetch is in flight are never overwritten by its (older) result.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use inventory_model::{Device, DeviceStats};
use lru::LruCache;

use crate::translate::SheetIdMap;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum QueryKey {
    List,
    Detail(String),
    Stats,
}

/// A device as seen through the detail query, with the ids needed to address its sheets.
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceDetail {
    pub device: Device,
    pub sheet_ids: SheetIdMap,
    pub end_user_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub(crate) struct FetchTicket {
    key: QueryKey,
    epoch: u64,
}

pub(crate) struct QueryCache {
    list: Option<Arc<Vec<Device>>>,
    stats: Option<DeviceStats>,
    details: LruCache<String, Arc<DeviceDetail>>,
    epochs: HashMap<QueryKey, u64>,
}

impl QueryCache {
    pub(crate) fn new(detail_capacity: NonZeroUsize) -> Self {
        Self {
            list: None,
            stats: None,
            details: LruCache::new(detail_capacity),
            epochs: HashMap::new(),
        }
    }

    fn epoch(&self, key: &QueryKey) -> u64 {
        self.epochs.get(key).copied().unwrap_or(0)
    }

    fn bump(&mut self, key: &QueryKey) {
        *self.epochs.entry(key.clone()).or_insert(0) += 1;
    }

    pub(crate) fn begin_fetch(&self, key: QueryKey) -> FetchTicket {
        let epoch = self.epoch(&key);
        FetchTicket { key, epoch }
    }

    fn is_current(&self, ticket: &FetchTicket) -> bool {
        self.epoch(&ticket.key) == ticket.epoch
    }

    pub(crate) fn list(&self) -> Option<Arc<Vec<Device>>> {
        self.list.clone()
    }

    pub(crate) fn stats(&self) -> Option<DeviceStats> {
        self.stats.clone()
    }

    /// Cached detail; marks the entry as recently used.
    pub(crate) fn detail(&mut self, id: &str) -> Option<Arc<DeviceDetail>> {
        self.details.get(id).cloned()
    }

    pub(crate) fn peek_detail(&self, id: &str) -> Option<Arc<DeviceDetail>> {
        self.details.peek(id).cloned()
    }

    #[cfg(test)]
    pub(crate) fn is_cached(&self, key: &QueryKey) -> bool {
        match key {
            QueryKey::List => self.list.is_some(),
            QueryKey::Stats => self.stats.is_some(),
            QueryKey::Detail(id) => self.details.contains(id),
        }
    }

    /// Returns `false` (and stores nothing) when the ticket is stale.
    pub(crate) fn complete_list(&mut self, ticket: FetchTicket, list: Arc<Vec<Device>>) -> bool {
        if !self.is_current(&ticket) {
            return false;
        }
        self.list = Some(list);
        true
    }

    pub(crate) fn complete_stats(&mut self, ticket: FetchTicket, stats: DeviceStats) -> bool {
        if !self.is_current(&ticket) {
            return false;
        }
        self.stats = Some(stats);
        true
    }

    pub(crate) fn complete_detail(
        &mut self,
        ticket: FetchTicket,
        detail: Arc<DeviceDetail>,
    ) -> bool {
        let QueryKey::Detail(id) = &ticket.key else {
            return false;
        };
        if !self.is_current(&ticket) {
            return false;
        }
        self.details.put(id.clone(), detail);
        true
    }

    /// Install a locally computed detail (optimistic edit or rollback).
    pub(crate) fn replace_detail(&mut self, id: &str, detail: Arc<DeviceDetail>) {
        self.bump(&QueryKey::Detail(id.to_string()));
        self.details.put(id.to_string(), detail);
    }

    /// Drop the entry for `key`. Returns whether anything was cached.
    pub(crate) fn invalidate(&mut self, key: &QueryKey) -> bool {
        self.bump(key);
        match key {
            QueryKey::List => self.list.take().is_some(),
            QueryKey::Stats => self.stats.take().is_some(),
            QueryKey::Detail(id) => self.details.pop(id).is_some(),
        }
    }

    pub(crate) fn clear(&mut self) {
        for key in [QueryKey::List, QueryKey::Stats] {
            self.invalidate(&key);
        }
        let ids: Vec<String> = self.details.iter().map(|(id, _)| id.clone()).collect();
        for id in ids {
            self.invalidate(&QueryKey::Detail(id));
        }
    }
}
