use std::path::PathBuf;

use tokio::sync::Mutex;
use tracing::warn;

use crate::error::{AppError, AppResult};

use super::Subscription;

// ============================================================================
// Subscription Store
// ============================================================================

/// CRUD over the subscription list. Records live in memory and the whole
/// JSON file is rewritten on every mutation; the file is the only
/// persistence.
pub struct SubscriptionStore {
    path: PathBuf,
    records: Mutex<Vec<Subscription>>,
}

impl SubscriptionStore {
    /// Load `subscriptions.json`, starting empty when the file is missing
    /// or unreadable.
    pub fn open(path: PathBuf) -> Self {
        let records = match std::fs::read_to_string(&path) {
            Ok(data) => match serde_json::from_str(&data) {
                Ok(records) => records,
                Err(e) => {
                    warn!("ignoring malformed {}: {}", path.display(), e);
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };
        Self {
            path,
            records: Mutex::new(records),
        }
    }

    pub async fn list(&self) -> Vec<Subscription> {
        self.records.lock().await.clone()
    }

    pub async fn get(&self, id: &str) -> AppResult<Subscription> {
        self.records
            .lock()
            .await
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("Subscription not found".to_string()))
    }

    pub async fn insert(&self, subscription: Subscription) -> AppResult<Subscription> {
        let mut records = self.records.lock().await;
        records.push(subscription.clone());
        self.persist(&records).await?;
        Ok(subscription)
    }

    /// Apply `mutate` to the record with `id` and persist the list.
    pub async fn update_with<F>(&self, id: &str, mutate: F) -> AppResult<Subscription>
    where
        F: FnOnce(&mut Subscription),
    {
        let mut records = self.records.lock().await;
        let record = records
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| AppError::NotFound("Subscription not found".to_string()))?;
        mutate(record);
        let updated = record.clone();
        self.persist(&records).await?;
        Ok(updated)
    }

    pub async fn remove(&self, id: &str) -> AppResult<()> {
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|s| s.id != id);
        if records.len() == before {
            return Err(AppError::NotFound("Subscription not found".to_string()));
        }
        self.persist(&records).await
    }

    async fn persist(&self, records: &[Subscription]) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let data = serde_json::to_string_pretty(records)?;
        tokio::fs::write(&self.path, data).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::SubscriptionStatus;
    use tempfile::tempdir;

    fn sample(name: &str) -> Subscription {
        let mut sub = Subscription::new(name.to_string(), format!("http://x/{}", name), None, false);
        // Millisecond ids can collide inside a fast test; make them unique.
        sub.id = format!("{}-{}", sub.id, name);
        sub
    }

    #[tokio::test]
    async fn insert_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("subscriptions.json");

        let store = SubscriptionStore::open(path.clone());
        store.insert(sample("a")).await.unwrap();
        store.insert(sample("b")).await.unwrap();

        let reopened = SubscriptionStore::open(path);
        let records = reopened.list().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "a");
    }

    #[tokio::test]
    async fn update_mutates_and_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("subscriptions.json");
        let store = SubscriptionStore::open(path.clone());
        let sub = store.insert(sample("a")).await.unwrap();

        let updated = store
            .update_with(&sub.id, |s| {
                s.proxy_count = 42;
                s.status = SubscriptionStatus::Error;
            })
            .await
            .unwrap();
        assert_eq!(updated.proxy_count, 42);

        let reopened = SubscriptionStore::open(path);
        assert_eq!(reopened.get(&sub.id).await.unwrap().proxy_count, 42);
    }

    #[tokio::test]
    async fn missing_ids_are_not_found() {
        let dir = tempdir().unwrap();
        let store = SubscriptionStore::open(dir.path().join("subscriptions.json"));

        assert!(matches!(
            store.get("nope").await.unwrap_err(),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            store.remove("nope").await.unwrap_err(),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            store.update_with("nope", |_| {}).await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn remove_deletes_only_the_target() {
        let dir = tempdir().unwrap();
        let store = SubscriptionStore::open(dir.path().join("subscriptions.json"));
        let a = store.insert(sample("a")).await.unwrap();
        store.insert(sample("b")).await.unwrap();

        store.remove(&a.id).await.unwrap();
        let records = store.list().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "b");
    }

    #[tokio::test]
    async fn malformed_file_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("subscriptions.json");
        std::fs::write(&path, "not json at all").unwrap();

        let store = SubscriptionStore::open(path);
        assert!(store.list().await.is_empty());
    }
}
