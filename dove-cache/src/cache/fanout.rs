//! Concurrent batch reads.
//!
//! Used when one cache value is assembled from many accounts, some of which
//! may legitimately not exist yet.

use dove_core::DoveResult;
use futures_util::future::join_all;
use std::future::Future;

/// Result of a fan-out: items that resolved to a value, and items that were
/// absent. Both keep input order.
#[derive(Debug, Clone, PartialEq)]
pub struct FanOut<K, V> {
    pub present: Vec<(K, V)>,
    pub absent: Vec<K>,
}

impl<K, V> FanOut<K, V> {
    pub fn is_complete(&self) -> bool {
        self.absent.is_empty()
    }
}

/// Run `fetch` for every item concurrently.
///
/// `Ok(None)` marks an item absent and is tolerated. Any `Err` fails the
/// whole batch with the first error in input order.
pub async fn fan_out<K, V, I, F, Fut>(items: I, fetch: F) -> DoveResult<FanOut<K, V>>
where
    I: IntoIterator<Item = K>,
    K: Clone,
    F: Fn(K) -> Fut,
    Fut: Future<Output = DoveResult<Option<V>>>,
{
    let items: Vec<K> = items.into_iter().collect();
    let results = join_all(items.iter().cloned().map(&fetch)).await;

    let mut present = Vec::with_capacity(items.len());
    let mut absent = Vec::new();
    for (item, result) in items.into_iter().zip(results) {
        match result? {
            Some(value) => present.push((item, value)),
            None => absent.push(item),
        }
    }
    Ok(FanOut { present, absent })
}
