use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::preview::{PreviewStore, SweepReport};

/// Run one sweep and log what it did.
pub async fn sweep_once<S: PreviewStore>(store: &S, max_age: Duration) -> SweepReport {
    let report = store.sweep_expired(max_age).await;
    if report.removed > 0 || report.failed > 0 {
        tracing::info!(
            removed = report.removed,
            failed = report.failed,
            "Swept expired staging entries"
        );
    } else {
        tracing::debug!("Staging sweep found nothing to remove");
    }
    report
}

/// Sweep `store` every `interval` until the handle is aborted. The first
/// sweep runs immediately.
pub fn spawn_retention_sweep<S>(store: Arc<S>, interval: Duration, max_age: Duration) -> JoinHandle<()>
where
    S: PreviewStore + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            sweep_once(store.as_ref(), max_age).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preview::MemoryPreviewStore;
    use inflow_core::ImportId;

    #[tokio::test]
    async fn sweep_once_reports_removals() {
        let store = MemoryPreviewStore::new();
        store.stage_upload(ImportId::new_v4(), "a.csv", b"x").await.unwrap();
        let report = sweep_once(&store, Duration::ZERO).await;
        assert_eq!(report.removed, 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn background_sweep_clears_expired_entries() {
        let store = Arc::new(MemoryPreviewStore::new());
        let id = ImportId::new_v4();
        store.stage_upload(id, "a.csv", b"x").await.unwrap();

        let handle = spawn_retention_sweep(store.clone(), Duration::from_millis(10), Duration::ZERO);
        for _ in 0..100 {
            if store.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();
        assert!(store.upload(id).is_none());
    }

    #[tokio::test]
    async fn fresh_entries_survive_the_sweep() {
        let store = Arc::new(MemoryPreviewStore::new());
        let id = ImportId::new_v4();
        store.stage_upload(id, "a.csv", b"x").await.unwrap();

        let handle = spawn_retention_sweep(store.clone(), Duration::from_millis(10), Duration::from_secs(3600));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();
        assert!(store.upload(id).is_some());
    }
}
