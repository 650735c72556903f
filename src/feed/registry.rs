//! Subscription registry: symbol -> interested callbacks
//!
//! Invariant: a symbol present in the registry has at least one live
//! callback. Entries are created on the first subscribe for a symbol and
//! dropped when the last callback leaves.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::types::{PriceUpdate, Symbol};

/// Callback invoked for every update frame matching the subscribed symbol.
pub type UpdateCallback = Arc<dyn Fn(&PriceUpdate) + Send + Sync>;

/// Stable handle returned at subscribe time. Removal is O(1); the same
/// closure can be registered twice and each registration gets its own
/// handle.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId {
    symbol: Symbol,
    token: Uuid,
}

impl SubscriptionId {
    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: DashMap<Symbol, HashMap<Uuid, UpdateCallback>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback under `symbol`. Returns the removal handle
    /// and whether this was the first subscription for the symbol.
    pub fn insert(&self, symbol: Symbol, callback: UpdateCallback) -> (SubscriptionId, bool) {
        let token = Uuid::new_v4();
        let mut entry = self.entries.entry(symbol.clone()).or_default();
        let first = entry.is_empty();
        entry.insert(token, callback);
        (SubscriptionId { symbol, token }, first)
    }

    /// Removes a single callback. Returns the symbol and whether its
    /// entry was dropped, or `None` when the handle was already removed.
    pub fn remove(&self, id: &SubscriptionId) -> Option<(Symbol, bool)> {
        let removed = {
            let mut entry = self.entries.get_mut(&id.symbol)?;
            entry.remove(&id.token)?;
            entry.is_empty()
        };
        if removed {
            self.entries.remove_if(&id.symbol, |_, callbacks| callbacks.is_empty());
        }
        Some((id.symbol.clone(), removed))
    }

    /// Distinct symbols with at least one live callback, for batch replay.
    pub fn symbols(&self) -> Vec<Symbol> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.entries.contains_key(symbol)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Synchronous fan-out to every callback registered for the update's
    /// symbol. Returns the number of callbacks invoked.
    ///
    /// The callbacks are cloned out before any of them runs: a callback
    /// may subscribe or unsubscribe (itself included) without deadlocking
    /// on the symbol's shard lock.
    pub fn dispatch(&self, update: &PriceUpdate) -> usize {
        let callbacks: Vec<UpdateCallback> = match self.entries.get(&update.symbol) {
            Some(entry) => entry.values().cloned().collect(),
            None => return 0,
        };
        for callback in &callbacks {
            callback(update);
        }
        callbacks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn noop() -> UpdateCallback {
        Arc::new(|_| {})
    }

    fn update(symbol: &str, price: f64) -> PriceUpdate {
        PriceUpdate {
            symbol: Symbol::new(symbol),
            price,
            change: None,
            received_at: Utc::now(),
        }
    }

    #[test]
    fn entry_lives_while_a_callback_remains() {
        let registry = SubscriptionRegistry::new();
        let btc = Symbol::new("BTCUSD");

        let (a, first_a) = registry.insert(btc.clone(), noop());
        let (b, first_b) = registry.insert(btc.clone(), noop());
        assert!(first_a);
        assert!(!first_b);
        assert_eq!(registry.symbols(), vec![btc.clone()]);

        assert_eq!(registry.remove(&a), Some((btc.clone(), false)));
        assert!(registry.contains(&btc));

        assert_eq!(registry.remove(&b), Some((btc.clone(), true)));
        assert!(registry.is_empty());

        // a handle removes at most once
        assert_eq!(registry.remove(&b), None);
    }

    #[test]
    fn registry_tracks_exactly_live_symbols() {
        let registry = SubscriptionRegistry::new();
        let mut handles = Vec::new();

        for symbol in ["BTCUSD", "ETHUSD", "BTCUSD", "SOLUSD"] {
            handles.push(registry.insert(Symbol::new(symbol), noop()).0);
        }
        let mut symbols: Vec<_> = registry.symbols().iter().map(|s| s.to_string()).collect();
        symbols.sort();
        assert_eq!(symbols, ["BTCUSD", "ETHUSD", "SOLUSD"]);

        for handle in &handles {
            registry.remove(handle);
        }
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn dispatch_reaches_only_matching_callbacks() {
        let registry = SubscriptionRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        registry.insert(
            Symbol::new("ETHUSD"),
            Arc::new(move |u| {
                assert_eq!(u.price, 3000.0);
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        registry.insert(Symbol::new("BTCUSD"), noop());

        assert_eq!(registry.dispatch(&update("ETHUSD", 3000.0)), 1);
        assert_eq!(registry.dispatch(&update("DOGEUSD", 0.1)), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callback_can_unsubscribe_itself_during_dispatch() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let own_id: Arc<std::sync::Mutex<Option<SubscriptionId>>> =
            Arc::new(std::sync::Mutex::new(None));
        let hits = Arc::new(AtomicUsize::new(0));

        let registry_in_cb = registry.clone();
        let own_id_in_cb = own_id.clone();
        let counter = hits.clone();
        let (id, _) = registry.insert(
            Symbol::new("BTCUSD"),
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                // one-shot: remove ourselves on the first update
                if let Some(id) = own_id_in_cb.lock().unwrap().take() {
                    registry_in_cb.remove(&id);
                }
            }),
        );
        *own_id.lock().unwrap() = Some(id);

        assert_eq!(registry.dispatch(&update("BTCUSD", 1.0)), 1);
        assert!(registry.is_empty());

        // the one-shot callback is gone; nothing fires again
        assert_eq!(registry.dispatch(&update("BTCUSD", 2.0)), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callback_can_subscribe_during_dispatch() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let registry_in_cb = registry.clone();
        registry.insert(
            Symbol::new("BTCUSD"),
            Arc::new(move |u| {
                registry_in_cb.insert(u.symbol.clone(), Arc::new(|_| {}));
            }),
        );

        // only the callbacks present when dispatch started are invoked
        assert_eq!(registry.dispatch(&update("BTCUSD", 1.0)), 1);
        assert_eq!(registry.dispatch(&update("BTCUSD", 2.0)), 2);
    }

    #[test]
    fn clear_empties_everything() {
        let registry = SubscriptionRegistry::new();
        registry.insert(Symbol::new("BTCUSD"), noop());
        registry.insert(Symbol::new("ETHUSD"), noop());
        registry.clear();
        assert!(registry.is_empty());
        assert_eq!(registry.dispatch(&update("BTCUSD", 1.0)), 0);
    }
}
