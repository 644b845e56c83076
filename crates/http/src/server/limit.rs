//! Per client address connection limit.

use std::net::IpAddr;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Counts open connections per client address.
#[derive(Debug, Clone)]
pub struct ConnLimiter {
    max_per_ip: usize,
    counts: Arc<DashMap<IpAddr, usize>>,
}

/// One admitted connection, released on drop.
#[derive(Debug)]
pub struct ConnPermit {
    ip: IpAddr,
    counts: Option<Arc<DashMap<IpAddr, usize>>>,
}

impl ConnLimiter {
    /// `max_per_ip == 0` admits everything.
    pub fn new(max_per_ip: usize) -> Self {
        Self { max_per_ip, counts: Arc::new(DashMap::new()) }
    }

    pub fn acquire(&self, ip: IpAddr) -> Option<ConnPermit> {
        if self.max_per_ip == 0 {
            return Some(ConnPermit { ip, counts: None });
        }

        let mut count = self.counts.entry(ip).or_insert(0);
        if *count >= self.max_per_ip {
            return None;
        }
        *count += 1;

        Some(ConnPermit { ip, counts: Some(Arc::clone(&self.counts)) })
    }

    pub fn active(&self, ip: IpAddr) -> usize {
        self.counts.get(&ip).map(|count| *count).unwrap_or(0)
    }
}

impl Drop for ConnPermit {
    fn drop(&mut self) {
        let Some(counts) = &self.counts else {
            return;
        };

        if let Entry::Occupied(mut entry) = counts.entry(self.ip) {
            let count = entry.get_mut();
            *count = count.saturating_sub(1);
            if *count == 0 {
                entry.remove();
            }
        }
    }
}
