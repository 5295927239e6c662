use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing upload and question activity.
#[derive(Default)]
pub struct ServiceMetrics {
    documents_processed: AtomicU64,
    chunks_indexed: AtomicU64,
    questions_answered: AtomicU64,
    failed_uploads: AtomicU64,
    failed_questions: AtomicU64,
}

impl ServiceMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a processed document and the number of chunks indexed for it.
    pub fn record_document(&self, chunk_count: u64) {
        self.documents_processed.fetch_add(1, Ordering::Relaxed);
        self.chunks_indexed
            .fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record an answered question.
    pub fn record_answer(&self) {
        self.questions_answered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an upload that did not produce an index.
    pub fn record_failed_upload(&self) {
        self.failed_uploads.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a question that did not produce an answer.
    pub fn record_failed_question(&self) {
        self.failed_questions.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self, active_documents: usize) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_processed: self.documents_processed.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            questions_answered: self.questions_answered.load(Ordering::Relaxed),
            failed_uploads: self.failed_uploads.load(Ordering::Relaxed),
            failed_questions: self.failed_questions.load(Ordering::Relaxed),
            active_documents: active_documents as u64,
        }
    }
}

/// Immutable view of service counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Number of documents processed since startup, including reprocessing.
    pub documents_processed: u64,
    /// Total chunk count indexed across all processed documents.
    pub chunks_indexed: u64,
    /// Questions answered successfully.
    pub questions_answered: u64,
    /// Uploads rejected or failed.
    pub failed_uploads: u64,
    /// Questions rejected or failed.
    pub failed_questions: u64,
    /// Documents currently registered.
    pub active_documents: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_documents_and_chunks() {
        let metrics = ServiceMetrics::new();
        metrics.record_document(2);
        metrics.record_document(3);

        let snapshot = metrics.snapshot(1);
        assert_eq!(snapshot.documents_processed, 2);
        assert_eq!(snapshot.chunks_indexed, 5);
        assert_eq!(snapshot.active_documents, 1);
    }

    #[test]
    fn tracks_questions_and_failures_separately() {
        let metrics = ServiceMetrics::new();
        metrics.record_answer();
        metrics.record_answer();
        metrics.record_failed_question();
        metrics.record_failed_upload();

        let snapshot = metrics.snapshot(0);
        assert_eq!(snapshot.questions_answered, 2);
        assert_eq!(snapshot.failed_questions, 1);
        assert_eq!(snapshot.failed_uploads, 1);
        assert_eq!(snapshot.documents_processed, 0);
    }

    #[test]
    fn fresh_snapshot_is_zeroed() {
        assert_eq!(ServiceMetrics::new().snapshot(0), MetricsSnapshot::default());
    }
}
