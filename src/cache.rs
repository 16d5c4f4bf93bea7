use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::path::PathTemplate;
use crate::{CompiledRule, RuleType, Section};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    section: Section,
    name: String,
    rule_type: RuleType,
}

impl CacheKey {
    fn new(section: Section, name: &str, rule_type: RuleType) -> Self {
        Self {
            section,
            name: name.to_owned(),
            rule_type,
        }
    }
}

/// The resolved rule for one resource name: the template that matched it and
/// the rule compiled against that template's variables.
#[derive(Debug, Clone)]
pub struct CachedRule {
    pub template: Arc<PathTemplate>,
    pub rule: Arc<CompiledRule>,
}

#[derive(Debug)]
struct CacheEntry {
    rule: CachedRule,
    used: AtomicBool,
}

/// Compiled rules keyed by `(section, name, rule type)`, evicted with a
/// second-chance clock.
///
/// Every [`get`](Self::get) sets the entry's used bit. Each
/// [`sweep`](Self::sweep) clears set bits and drops entries whose bit was
/// already clear, so an entry lives at least one full sweep interval past
/// its last use.
#[derive(Debug, Default)]
pub struct RuleCache {
    entries: DashMap<CacheKey, CacheEntry>,
}

impl RuleCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn has(&self, section: Section, name: &str, rule_type: RuleType) -> bool {
        self.entries
            .contains_key(&CacheKey::new(section, name, rule_type))
    }

    pub fn get(&self, section: Section, name: &str, rule_type: RuleType) -> Option<CachedRule> {
        let entry = self.entries.get(&CacheKey::new(section, name, rule_type))?;
        entry.used.store(true, Ordering::Relaxed);
        Some(entry.rule.clone())
    }

    /// Insert or replace an entry, marked as used.
    pub fn set(&self, section: Section, name: &str, rule_type: RuleType, rule: CachedRule) {
        self.entries.insert(
            CacheKey::new(section, name, rule_type),
            CacheEntry {
                rule,
                used: AtomicBool::new(true),
            },
        );
    }

    pub fn reset(&self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One clock pass. Returns the number of evicted entries.
    pub fn sweep(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.used.swap(false, Ordering::Relaxed));
        let evicted = before.saturating_sub(self.entries.len());
        debug!(evicted, remaining = self.entries.len(), "rule cache sweep");
        evicted
    }

    /// Run [`sweep`](Self::sweep) every `period` on the current tokio runtime.
    ///
    /// The task holds a weak reference and ends once the cache is dropped.
    /// `period` must be non-zero.
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let cache = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                let evicted = cache.sweep();
                if evicted > 0 {
                    info!(evicted, remaining = cache.len(), "evicted unused rules");
                }
            }
        })
    }
}
