use chrono::{DateTime, NaiveDate, Utc};
use inflow_core::{
    Direction, FileKind, FinalizedTransaction, ImportId, ImportRecord, ImportStatus, MatchedBy,
    SourceDialect,
};
use inflow_import::{CategorizationEngine, ImportPipeline, PipelineOutput, UserRule};
use inflow_storage::{content_sha256, ImportLedger, ImportOutcome, PreviewStore, StagedPreview};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::WorkflowError;

/// One staged row as shown to the user before confirming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewRow {
    pub index: usize,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub currency: String,
    pub description: String,
    pub original_description: String,
    pub direction: Direction,
    pub category_name: String,
    pub confidence: f32,
    pub matched_by: MatchedBy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewView {
    pub import_id: ImportId,
    pub filename: String,
    pub source_dialect: SourceDialect,
    pub row_count: usize,
    pub transactions: Vec<PreviewRow>,
    pub errors: Vec<String>,
    pub staged_at: DateTime<Utc>,
}

impl From<StagedPreview> for PreviewView {
    fn from(staged: StagedPreview) -> Self {
        let transactions = staged
            .transactions
            .into_iter()
            .enumerate()
            .map(|(index, c)| PreviewRow {
                index,
                date: c.transaction.date,
                amount: c.transaction.amount,
                currency: c.transaction.currency,
                description: c.transaction.description,
                original_description: c.transaction.original_description,
                direction: c.transaction.direction,
                category_name: c.categorization.category_name,
                confidence: c.categorization.confidence,
                matched_by: c.categorization.matched_by,
            })
            .collect();
        PreviewView {
            import_id: staged.import_id,
            filename: staged.filename,
            source_dialect: staged.source_dialect,
            row_count: staged.row_count,
            transactions,
            errors: staged.errors,
            staged_at: staged.staged_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfirmOutcome {
    pub import_id: ImportId,
    pub status: ImportStatus,
    pub imported_count: usize,
    /// Persisted rows whose category did not come from the fallback.
    pub categorized_count: usize,
}

/// Upload → preview → confirm/cancel over a preview store and an import
/// ledger.
pub struct ImportWorkflow<S, L> {
    pipeline: ImportPipeline,
    store: Arc<S>,
    ledger: L,
    max_upload_bytes: usize,
}

impl<S: PreviewStore, L: ImportLedger> ImportWorkflow<S, L> {
    pub fn new(store: Arc<S>, ledger: L, max_upload_bytes: usize) -> Self {
        Self {
            pipeline: ImportPipeline::default(),
            store,
            ledger,
            max_upload_bytes,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    // ── Upload ───────────────────────────────────────────────────────────────

    /// Validate, parse and stage an upload. On success the import is in
    /// `preview`; if no parser accepts the file it is recorded as `failed`
    /// and a format error is returned.
    pub async fn upload(
        &self,
        filename: &str,
        content: &[u8],
        rules: &[UserRule],
    ) -> Result<ImportRecord, WorkflowError> {
        if content.len() > self.max_upload_bytes {
            return Err(WorkflowError::TooLarge {
                size: content.len(),
                limit: self.max_upload_bytes,
            });
        }
        let file_kind = FileKind::from_filename(filename)
            .ok_or_else(|| WorkflowError::UnsupportedExtension(filename.to_string()))?;

        let record = ImportRecord::new(filename, file_kind, content_sha256(content));
        let id = record.id;
        self.ledger.insert(&record).await?;
        tracing::info!(import_id = %id, filename, bytes = content.len(), "Upload received");

        let parsed = if rules.is_empty() {
            self.pipeline.run(filename, content)
        } else {
            let engine = CategorizationEngine::new(rules.to_vec());
            self.pipeline.run_with(&engine, filename, content)
        };

        let output = match parsed {
            Ok(output) => output,
            Err(e) => {
                let reason = e.to_string();
                tracing::warn!(import_id = %id, error = %reason, "Upload could not be parsed");
                let outcome = ImportOutcome {
                    status: ImportStatus::Failed,
                    source_dialect: None,
                    row_count: 0,
                    error_log: vec![reason.clone()],
                };
                self.ledger.record_outcome(id, &outcome).await?;
                return Err(WorkflowError::Format { import_id: id, reason });
            }
        };

        if let Err(e) = self.stage(id, filename, content, &output).await {
            tracing::error!(import_id = %id, error = %e, "Staging failed");
            self.discard(id).await;
            let outcome = ImportOutcome {
                status: ImportStatus::Failed,
                source_dialect: Some(output.source_dialect),
                row_count: output.row_count,
                error_log: vec![format!("Staging failed: {e}")],
            };
            self.ledger.record_outcome(id, &outcome).await?;
            return Err(e.into());
        }

        let outcome = ImportOutcome {
            status: ImportStatus::Preview,
            source_dialect: Some(output.source_dialect),
            row_count: output.row_count,
            error_log: output.errors,
        };
        if !self.ledger.record_outcome(id, &outcome).await? {
            // Cancelled while parsing.
            self.discard(id).await;
            return Err(self.conflict(id, "preview").await);
        }

        self.ledger.get(id).await?.ok_or(WorkflowError::NotFound(id))
    }

    async fn stage(
        &self,
        id: ImportId,
        filename: &str,
        content: &[u8],
        output: &PipelineOutput,
    ) -> Result<(), inflow_storage::StorageError> {
        self.store.stage_upload(id, filename, content).await?;
        let preview = StagedPreview {
            import_id: id,
            filename: filename.to_string(),
            source_dialect: output.source_dialect,
            row_count: output.row_count,
            transactions: output.transactions.clone(),
            errors: output.errors.clone(),
            staged_at: Utc::now(),
        };
        self.store.put(&preview).await
    }

    // ── Preview ──────────────────────────────────────────────────────────────

    pub async fn get_preview(&self, id: ImportId) -> Result<PreviewView, WorkflowError> {
        let record = self.ledger.get(id).await?.ok_or(WorkflowError::NotFound(id))?;
        if !matches!(record.status, ImportStatus::Pending | ImportStatus::Preview) {
            return Err(WorkflowError::Conflict {
                import_id: id,
                status: record.status,
                action: "preview",
            });
        }
        let staged = self
            .store
            .get(id)
            .await?
            .ok_or(WorkflowError::PreviewExpired(id))?;
        Ok(staged.into())
    }

    // ── Confirm / cancel ─────────────────────────────────────────────────────

    /// Persist the staged rows. `overrides` maps a preview row index to the
    /// category the user picked; indices outside the preview are ignored.
    pub async fn confirm(
        &self,
        id: ImportId,
        overrides: &BTreeMap<usize, String>,
    ) -> Result<ConfirmOutcome, WorkflowError> {
        if !self
            .ledger
            .transition(id, &[ImportStatus::Preview], ImportStatus::Processing)
            .await?
        {
            return Err(self.conflict(id, "confirm").await);
        }

        let staged = match self.store.get(id).await {
            Ok(Some(staged)) => staged,
            Ok(None) => {
                tracing::warn!(import_id = %id, "Confirm found no staged preview");
                self.ledger
                    .transition(id, &[ImportStatus::Processing], ImportStatus::Failed)
                    .await?;
                return Err(WorkflowError::PreviewExpired(id));
            }
            Err(e) => {
                self.revert_to_preview(id).await;
                return Err(e.into());
            }
        };

        let row_total = staged.transactions.len();
        for index in overrides.keys().filter(|i| **i >= row_total) {
            tracing::warn!(import_id = %id, index, rows = row_total, "Ignoring override for missing row");
        }

        let finalized: Vec<FinalizedTransaction> = staged
            .transactions
            .into_iter()
            .enumerate()
            .map(|(i, t)| FinalizedTransaction::from_staged(t, overrides.get(&i).map(String::as_str)))
            .collect();
        let categorized_count = finalized
            .iter()
            .filter(|f| f.categorization_method.is_categorized())
            .count();

        match self.ledger.commit(id, &finalized).await {
            Ok(true) => {}
            Ok(false) => return Err(self.conflict(id, "confirm").await),
            Err(e) => {
                tracing::error!(import_id = %id, error = %e, "Persisting confirmed rows failed");
                self.revert_to_preview(id).await;
                return Err(e.into());
            }
        }

        self.discard(id).await;
        tracing::info!(
            import_id = %id,
            imported = finalized.len(),
            categorized = categorized_count,
            "Import confirmed"
        );
        Ok(ConfirmOutcome {
            import_id: id,
            status: ImportStatus::Confirmed,
            imported_count: finalized.len(),
            categorized_count,
        })
    }

    /// Abandon an import that has not been confirmed. Staged data is purged.
    /// Allowed from `pending`, `preview` and `failed`; an import in
    /// `processing` has a commit in flight and is refused with a conflict.
    pub async fn cancel(&self, id: ImportId) -> Result<ImportRecord, WorkflowError> {
        let cancellable = [ImportStatus::Pending, ImportStatus::Preview, ImportStatus::Failed];
        if !self
            .ledger
            .transition(id, &cancellable, ImportStatus::Cancelled)
            .await?
        {
            return Err(self.conflict(id, "cancel").await);
        }
        self.discard(id).await;
        tracing::info!(import_id = %id, "Import cancelled");
        self.ledger.get(id).await?.ok_or(WorkflowError::NotFound(id))
    }

    pub async fn list(&self) -> Result<Vec<ImportRecord>, WorkflowError> {
        Ok(self.ledger.list().await?)
    }

    // ── Helpers ──────────────────────────────────────────────────────────────

    /// Build the error for a refused transition from the current status.
    async fn conflict(&self, id: ImportId, action: &'static str) -> WorkflowError {
        match self.ledger.get(id).await {
            Ok(Some(record)) => WorkflowError::Conflict {
                import_id: id,
                status: record.status,
                action,
            },
            Ok(None) => WorkflowError::NotFound(id),
            Err(e) => e.into(),
        }
    }

    async fn revert_to_preview(&self, id: ImportId) {
        if let Err(e) = self
            .ledger
            .transition(id, &[ImportStatus::Processing], ImportStatus::Preview)
            .await
        {
            tracing::error!(import_id = %id, error = %e, "Could not return import to preview");
        }
    }

    /// Purge staged data. Leftovers are reclaimed by the retention sweep.
    async fn discard(&self, id: ImportId) {
        if let Err(e) = self.store.purge(id).await {
            tracing::warn!(import_id = %id, error = %e, "Failed to purge staged data");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inflow_core::CategorizationMethod;
    use inflow_import::MatchKind;
    use inflow_storage::{create_db, get_transactions_for_import, MemoryPreviewStore, SqliteLedger, StorageError};

    const STATEMENT: &str = "Data Operazione;Data Valuta;Descrizione;Importo\n\
01/03/2025;01/03/2025;PAGAMENTO POS ESSELUNGA VIA ROMA MI;-45,80\n\
03/03/2025;03/03/2025;BONIFICO DA AZIENDA SRL - STIPENDIO MARZO 2025;2.350,00\n\
05/03/2025;07/03/2025;XYZNOMATCH1234567890;-9,99\n";

    type TestWorkflow = ImportWorkflow<MemoryPreviewStore, SqliteLedger>;

    async fn workflow() -> (tempfile::TempDir, TestWorkflow) {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("inflow.db")).await.unwrap();
        let wf = ImportWorkflow::new(
            Arc::new(MemoryPreviewStore::new()),
            SqliteLedger::new(pool),
            64 * 1024,
        );
        (dir, wf)
    }

    async fn staged(wf: &TestWorkflow) -> ImportId {
        let record = wf.upload("estratto.csv", STATEMENT.as_bytes(), &[]).await.unwrap();
        assert_eq!(record.status, ImportStatus::Preview);
        record.id
    }

    #[tokio::test]
    async fn upload_stages_a_preview() {
        let (_dir, wf) = workflow().await;
        let record = wf.upload("estratto.csv", STATEMENT.as_bytes(), &[]).await.unwrap();
        assert_eq!(record.row_count, 3);
        assert_eq!(record.source_dialect, Some(SourceDialect::BankCsv));
        assert_eq!(record.file_kind, FileKind::Csv);
        assert_eq!(record.content_sha256, content_sha256(STATEMENT.as_bytes()));

        let preview = wf.get_preview(record.id).await.unwrap();
        assert_eq!(preview.transactions.len(), 3);
        assert_eq!(preview.transactions[1].index, 1);
        assert_eq!(preview.transactions[1].category_name, "salary");
        assert_eq!(preview.transactions[0].amount.to_string(), "-45.80");
        assert!(wf.store().upload(record.id).is_some());
    }

    #[tokio::test]
    async fn user_rules_apply_to_upload() {
        let (_dir, wf) = workflow().await;
        let rules = vec![UserRule {
            id: "r1".into(),
            pattern: "esselunga".into(),
            match_kind: MatchKind::Contains,
            category_name: "household".into(),
            priority: 1,
        }];
        let record = wf.upload("estratto.csv", STATEMENT.as_bytes(), &rules).await.unwrap();
        let preview = wf.get_preview(record.id).await.unwrap();
        assert_eq!(preview.transactions[0].category_name, "household");
        assert_eq!(preview.transactions[0].matched_by, MatchedBy::UserRule);
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected_before_parsing() {
        let (_dir, wf) = workflow().await;
        let big = vec![b'a'; 64 * 1024 + 1];
        let err = wf.upload("estratto.csv", &big, &[]).await.unwrap_err();
        assert!(matches!(err, WorkflowError::TooLarge { .. }));
        assert!(wf.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unsupported_extension_is_rejected() {
        let (_dir, wf) = workflow().await;
        let err = wf.upload("notes.txt", b"hello", &[]).await.unwrap_err();
        assert!(matches!(err, WorkflowError::UnsupportedExtension(_)));
        assert!(wf.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unrecognized_file_is_recorded_as_failed() {
        let (_dir, wf) = workflow().await;
        let err = wf.upload("random.csv", b"foo,bar\n1,2\n", &[]).await.unwrap_err();
        let WorkflowError::Format { import_id, .. } = &err else {
            panic!("expected a format error, got {err:?}");
        };
        let record = wf.ledger().get(*import_id).await.unwrap().unwrap();
        assert_eq!(record.status, ImportStatus::Failed);
        assert_eq!(record.error_log.len(), 1);
        assert!(wf.store().is_empty());
    }

    #[tokio::test]
    async fn confirm_persists_and_purges() {
        let (_dir, wf) = workflow().await;
        let id = staged(&wf).await;

        let outcome = wf.confirm(id, &BTreeMap::new()).await.unwrap();
        assert_eq!(outcome.status, ImportStatus::Confirmed);
        assert_eq!(outcome.imported_count, 3);
        // The unmatched row falls back.
        assert_eq!(outcome.categorized_count, 2);

        let record = wf.ledger().get(id).await.unwrap().unwrap();
        assert_eq!(record.status, ImportStatus::Confirmed);
        assert_eq!(record.imported_count, 3);
        assert!(wf.store().is_empty());
    }

    #[tokio::test]
    async fn override_forces_manual_method() {
        let (_dir, wf) = workflow().await;
        let id = staged(&wf).await;

        let overrides = BTreeMap::from([(2, "software".to_string()), (99, "ignored".to_string())]);
        let outcome = wf.confirm(id, &overrides).await.unwrap();
        assert_eq!(outcome.imported_count, 3);
        assert_eq!(outcome.categorized_count, 3);

        let stored = get_transactions_for_import(wf.ledger().pool(), id).await.unwrap();
        assert_eq!(stored[2].category_name, "software");
        assert_eq!(stored[2].categorization_method, CategorizationMethod::Manual);
        assert_eq!(stored[1].categorization_method, CategorizationMethod::Pattern);
    }

    #[tokio::test]
    async fn second_confirm_conflicts() {
        let (_dir, wf) = workflow().await;
        let id = staged(&wf).await;
        wf.confirm(id, &BTreeMap::new()).await.unwrap();

        let err = wf.confirm(id, &BTreeMap::new()).await.unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Conflict { status: ImportStatus::Confirmed, .. }
        ));
        let stored = get_transactions_for_import(wf.ledger().pool(), id).await.unwrap();
        assert_eq!(stored.len(), 3);
    }

    #[tokio::test]
    async fn concurrent_confirms_commit_once() {
        let (_dir, wf) = workflow().await;
        let id = staged(&wf).await;
        let none = BTreeMap::new();

        let (a, b) = tokio::join!(wf.confirm(id, &none), wf.confirm(id, &none));
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        let stored = get_transactions_for_import(wf.ledger().pool(), id).await.unwrap();
        assert_eq!(stored.len(), 3);
    }

    #[tokio::test]
    async fn cancel_after_confirm_conflicts() {
        let (_dir, wf) = workflow().await;
        let id = staged(&wf).await;
        wf.confirm(id, &BTreeMap::new()).await.unwrap();

        let err = wf.cancel(id).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Conflict { action: "cancel", .. }));
    }

    #[tokio::test]
    async fn cancel_during_commit_conflicts() {
        let (_dir, wf) = workflow().await;
        let id = staged(&wf).await;
        assert!(wf
            .ledger()
            .transition(id, &[ImportStatus::Preview], ImportStatus::Processing)
            .await
            .unwrap());

        let err = wf.cancel(id).await.unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Conflict {
                status: ImportStatus::Processing,
                action: "cancel",
                ..
            }
        ));
        assert!(wf.store().upload(id).is_some());
    }

    #[tokio::test]
    async fn cancel_purges_and_is_terminal() {
        let (_dir, wf) = workflow().await;
        let id = staged(&wf).await;

        let record = wf.cancel(id).await.unwrap();
        assert_eq!(record.status, ImportStatus::Cancelled);
        assert!(wf.store().is_empty());
        assert!(matches!(wf.cancel(id).await, Err(WorkflowError::Conflict { .. })));
        assert!(matches!(
            wf.confirm(id, &BTreeMap::new()).await,
            Err(WorkflowError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn failed_import_can_be_cancelled() {
        let (_dir, wf) = workflow().await;
        let Err(WorkflowError::Format { import_id, .. }) =
            wf.upload("random.csv", b"foo,bar\n1,2\n", &[]).await
        else {
            panic!("expected a format error");
        };
        let record = wf.cancel(import_id).await.unwrap();
        assert_eq!(record.status, ImportStatus::Cancelled);
    }

    #[tokio::test]
    async fn preview_unavailable_after_terminal_states() {
        let (_dir, wf) = workflow().await;
        let confirmed = staged(&wf).await;
        let cancelled = staged(&wf).await;
        wf.confirm(confirmed, &BTreeMap::new()).await.unwrap();
        wf.cancel(cancelled).await.unwrap();

        for id in [confirmed, cancelled] {
            let err = wf.get_preview(id).await.unwrap_err();
            assert!(matches!(err, WorkflowError::Conflict { action: "preview", .. }));
        }
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let (_dir, wf) = workflow().await;
        let id = ImportId::new_v4();
        assert!(matches!(wf.get_preview(id).await, Err(WorkflowError::NotFound(_))));
        assert!(matches!(wf.confirm(id, &BTreeMap::new()).await, Err(WorkflowError::NotFound(_))));
        assert!(matches!(wf.cancel(id).await, Err(WorkflowError::NotFound(_))));
    }

    #[tokio::test]
    async fn expired_preview_fails_the_confirm() {
        let (_dir, wf) = workflow().await;
        let id = staged(&wf).await;
        wf.store().sweep_expired(std::time::Duration::ZERO).await;

        assert!(matches!(wf.get_preview(id).await, Err(WorkflowError::PreviewExpired(_))));
        assert!(matches!(
            wf.confirm(id, &BTreeMap::new()).await,
            Err(WorkflowError::PreviewExpired(_))
        ));
        let record = wf.ledger().get(id).await.unwrap().unwrap();
        assert_eq!(record.status, ImportStatus::Failed);
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let (_dir, wf) = workflow().await;
        let first = staged(&wf).await;
        let second = staged(&wf).await;
        let ids: Vec<_> = wf.list().await.unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![second, first]);
    }

    /// Ledger whose commit always fails, to exercise the revert path.
    struct BrokenCommit(SqliteLedger);

    impl ImportLedger for BrokenCommit {
        async fn insert(&self, record: &ImportRecord) -> Result<(), StorageError> {
            self.0.insert(record).await
        }

        async fn get(&self, id: ImportId) -> Result<Option<ImportRecord>, StorageError> {
            self.0.get(id).await
        }

        async fn list(&self) -> Result<Vec<ImportRecord>, StorageError> {
            self.0.list().await
        }

        async fn transition(
            &self,
            id: ImportId,
            from: &[ImportStatus],
            to: ImportStatus,
        ) -> Result<bool, StorageError> {
            self.0.transition(id, from, to).await
        }

        async fn record_outcome(&self, id: ImportId, outcome: &ImportOutcome) -> Result<bool, StorageError> {
            self.0.record_outcome(id, outcome).await
        }

        async fn commit(&self, _id: ImportId, _rows: &[FinalizedTransaction]) -> Result<bool, StorageError> {
            Err(StorageError::Corrupt("disk full".into()))
        }
    }

    #[tokio::test]
    async fn failed_persist_returns_import_to_preview() {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("inflow.db")).await.unwrap();
        let wf = ImportWorkflow::new(
            Arc::new(MemoryPreviewStore::new()),
            BrokenCommit(SqliteLedger::new(pool)),
            64 * 1024,
        );
        let id = wf.upload("estratto.csv", STATEMENT.as_bytes(), &[]).await.unwrap().id;

        let err = wf.confirm(id, &BTreeMap::new()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Storage(_)));
        let record = wf.ledger().get(id).await.unwrap().unwrap();
        assert_eq!(record.status, ImportStatus::Preview);
        // Staged data survives so the user can retry.
        assert_eq!(wf.get_preview(id).await.unwrap().transactions.len(), 3);
    }
}
