//! Demo handlers exercising every rendering mode of the protocol.

pub mod counter;
pub mod error;
pub mod home;
pub mod items;

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use tokio::sync::RwLock;

use crate::presentation::views::ItemView;

/// In-memory state behind the demo pages.
pub struct DemoStore {
    counter: AtomicI64,
    next_item_id: AtomicU64,
    items: RwLock<Vec<ItemView>>,
}

impl DemoStore {
    pub fn counter(&self) -> i64 {
        self.counter.load(Ordering::SeqCst)
    }

    pub fn add_to_counter(&self, amount: i64) -> i64 {
        self.counter.fetch_add(amount, Ordering::SeqCst) + amount
    }

    pub fn reset_counter(&self) {
        self.counter.store(0, Ordering::SeqCst);
    }

    pub async fn items(&self) -> Vec<ItemView> {
        self.items.read().await.clone()
    }

    pub async fn push_item(&self, label: impl Into<String>) -> Vec<ItemView> {
        let id = self.next_item_id.fetch_add(1, Ordering::SeqCst);
        let mut items = self.items.write().await;
        items.push(ItemView {
            id,
            label: label.into(),
        });
        items.clone()
    }

    /// Remove the item with `id`, reporting whether it existed.
    pub async fn remove_item(&self, id: u64) -> bool {
        let mut items = self.items.write().await;
        let before = items.len();
        items.retain(|item| item.id != id);
        items.len() != before
    }
}

impl Default for DemoStore {
    fn default() -> Self {
        let seed = ["Write the manifest", "Render fragments", "Merge on the client"];
        let items = seed
            .iter()
            .zip(1u64..)
            .map(|(label, id)| ItemView {
                id,
                label: (*label).to_string(),
            })
            .collect::<Vec<_>>();

        Self {
            counter: AtomicI64::new(0),
            next_item_id: AtomicU64::new(items.len() as u64 + 1),
            items: RwLock::new(items),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn items_get_fresh_ids_and_can_be_removed() {
        let store = DemoStore::default();
        let seeded = store.items().await.len();

        let items = store.push_item("fourth").await;
        assert_eq!(items.len(), seeded + 1);
        let added = items.last().expect("pushed item").id;
        assert!(items[..seeded].iter().all(|item| item.id != added));

        assert!(store.remove_item(added).await);
        assert!(!store.remove_item(added).await);
        assert_eq!(store.items().await.len(), seeded);
    }

    #[test]
    fn counter_accumulates_and_resets() {
        let store = DemoStore::default();
        assert_eq!(store.add_to_counter(3), 3);
        assert_eq!(store.add_to_counter(4), 7);
        store.reset_counter();
        assert_eq!(store.counter(), 0);
    }
}
