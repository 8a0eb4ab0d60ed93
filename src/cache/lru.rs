use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

// ============================================================================
// Bounded LRU Map with Per-Entry TTL
// ============================================================================
//
// Nodes live in a dense arena (`Vec`) and are threaded into a doubly-linked
// recency list by index: `head` is the most recently used entry, `tail` the
// least. A hash index maps keys to arena slots, so lookup, insert, refresh
// and eviction are all O(1) on average.
//
// Removal swaps the last arena node into the freed slot and patches its
// neighbours, keeping the arena dense without a free list.
//
// ============================================================================

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CacheError {
    #[error("Cache capacity must be greater than zero")]
    ZeroCapacity,

    #[error("Cache TTL must be greater than zero")]
    ZeroTtl,
}

#[derive(Debug)]
struct Node<K, V> {
    key: K,
    value: V,
    expires_at: Instant,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Debug)]
pub struct LruTtlCache<K, V> {
    capacity: usize,
    ttl: Duration,
    index: HashMap<K, usize>,
    nodes: Vec<Node<K, V>>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl<K, V> LruTtlCache<K, V>
where
    K: Hash + Eq + Clone,
{
    pub fn new(capacity: usize, ttl: Duration) -> Result<Self, CacheError> {
        if capacity == 0 {
            return Err(CacheError::ZeroCapacity);
        }
        if ttl.is_zero() {
            return Err(CacheError::ZeroTtl);
        }

        Ok(Self {
            capacity,
            ttl,
            index: HashMap::with_capacity(capacity),
            nodes: Vec::with_capacity(capacity),
            head: None,
            tail: None,
        })
    }

    /// Number of stored entries, expired-but-unswept ones included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        self.insert_at(key, value, Instant::now())
    }

    /// Insert or refresh `key`. Resets its expiry and makes it most recent.
    /// Returns the least recently used entry if one had to be evicted.
    pub fn insert_at(&mut self, key: K, value: V, now: Instant) -> Option<(K, V)> {
        let expires_at = now + self.ttl;

        if let Some(&idx) = self.index.get(&key) {
            let node = &mut self.nodes[idx];
            node.value = value;
            node.expires_at = expires_at;
            self.move_to_front(idx);
            return None;
        }

        let evicted = if self.nodes.len() >= self.capacity {
            match self.tail {
                Some(tail) => {
                    let node = self.remove_index(tail);
                    Some((node.key, node.value))
                }
                None => None,
            }
        } else {
            None
        };

        let idx = self.nodes.len();
        self.nodes.push(Node {
            key: key.clone(),
            value,
            expires_at,
            prev: None,
            next: None,
        });
        self.index.insert(key, idx);
        self.push_front(idx);

        evicted
    }

    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_at(key, Instant::now())
    }

    /// Look up `key` and mark it most recent. An expired entry is dropped and
    /// reported as absent.
    pub fn get_at<Q>(&mut self, key: &Q, now: Instant) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = *self.index.get(key)?;

        if self.nodes[idx].expires_at <= now {
            self.remove_index(idx);
            return None;
        }

        self.move_to_front(idx);
        Some(&self.nodes[idx].value)
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = *self.index.get(key)?;
        Some(self.remove_index(idx).value)
    }

    pub fn purge_expired(&mut self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    /// Drop every entry whose TTL has elapsed; returns how many were dropped.
    pub fn purge_expired_at(&mut self, now: Instant) -> usize {
        let expired: Vec<K> = self
            .nodes
            .iter()
            .filter(|node| node.expires_at <= now)
            .map(|node| node.key.clone())
            .collect();

        for key in &expired {
            self.remove(key);
        }

        expired.len()
    }

    // ------------------------------------------------------------------------
    // Recency list plumbing
    // ------------------------------------------------------------------------

    fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.unlink(idx);
        self.push_front(idx);
    }

    fn push_front(&mut self, idx: usize) {
        self.nodes[idx].prev = None;
        self.nodes[idx].next = self.head;

        if let Some(head) = self.head {
            self.nodes[head].prev = Some(idx);
        }
        self.head = Some(idx);

        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = (self.nodes[idx].prev, self.nodes[idx].next);

        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }

        self.nodes[idx].prev = None;
        self.nodes[idx].next = None;
    }

    fn remove_index(&mut self, idx: usize) -> Node<K, V> {
        self.unlink(idx);
        let node = self.nodes.swap_remove(idx);
        self.index.remove(&node.key);

        // The former last node now occupies `idx`; repoint everything that
        // referenced its old slot.
        if idx < self.nodes.len() {
            let (prev, next) = (self.nodes[idx].prev, self.nodes[idx].next);
            match prev {
                Some(p) => self.nodes[p].next = Some(idx),
                None => self.head = Some(idx),
            }
            match next {
                Some(n) => self.nodes[n].prev = Some(idx),
                None => self.tail = Some(idx),
            }
            if let Some(slot) = self.index.get_mut(&self.nodes[idx].key) {
                *slot = idx;
            }
        }

        node
    }
}
