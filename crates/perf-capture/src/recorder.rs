//! One capture scope: observe, then reconcile against the stored record.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use perf_config::{Mode, RecordingConfig};
use perf_core::{CacheOp, DbOp, Operation, PerformanceRecord, RecordEntry, Traceback, record_diff};
use perf_sql::fingerprint;
use perf_store::KvFile;
use tracing::{debug, info, warn};

use crate::error::CaptureError;
use crate::fanout::AllSourceRecorder;
use crate::source::{Observer, RawOperation, SourceKind, SourceRegistry};

/// Predicate over observed operations.
pub type OperationFilter = Arc<dyn Fn(&Operation) -> bool + Send + Sync>;

/// Lifecycle of a [`PerformanceRecorder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Capturing,
    Reconciling,
    Done,
    Failed,
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Capturing => "capturing",
            Self::Reconciling => "reconciling",
            Self::Done => "done",
            Self::Failed => "failed",
        })
    }
}

/// Collects the operations of one scope into a record and reconciles it
/// with the record file.
///
/// ```text
/// Idle --start--> Capturing --finish--> Reconciling --> Done
///                     |                      |
///                     +--fail--> Failed <----+ (mismatch, missing record)
/// ```
///
/// Dropping a recorder mid-capture stops observing without reconciling.
pub struct PerformanceRecorder {
    file: PathBuf,
    record_name: String,
    recording: RecordingConfig,
    capture_operation: Option<OperationFilter>,
    capture_traceback: Option<OperationFilter>,
    record: Arc<Mutex<PerformanceRecord>>,
    databases: AllSourceRecorder,
    caches: AllSourceRecorder,
    records_file: Option<KvFile>,
    state: CaptureState,
}

impl PerformanceRecorder {
    pub fn new(
        registry: &SourceRegistry,
        file: impl Into<PathBuf>,
        record_name: impl Into<String>,
        recording: RecordingConfig,
    ) -> Self {
        Self {
            file: file.into(),
            record_name: record_name.into(),
            recording,
            capture_operation: None,
            capture_traceback: None,
            record: Arc::default(),
            databases: AllSourceRecorder::new(registry, SourceKind::Database),
            caches: AllSourceRecorder::new(registry, SourceKind::Cache),
            records_file: None,
            state: CaptureState::Idle,
        }
    }

    /// Only operations matching `filter` are recorded.
    #[must_use]
    pub fn with_capture_operation(mut self, filter: Option<OperationFilter>) -> Self {
        self.capture_operation = filter;
        self
    }

    /// Operations matching `filter` carry a traceback in the record.
    #[must_use]
    pub fn with_capture_traceback(mut self, filter: Option<OperationFilter>) -> Self {
        self.capture_traceback = filter;
        self
    }

    #[must_use]
    pub fn file(&self) -> &Path {
        &self.file
    }

    #[must_use]
    pub fn record_name(&self) -> &str {
        &self.record_name
    }

    #[must_use]
    pub const fn state(&self) -> CaptureState {
        self.state
    }

    /// Operations captured so far.
    #[must_use]
    pub fn record(&self) -> PerformanceRecord {
        self.record.lock().clone()
    }

    /// Observe every database, then every cache, then load the record file.
    ///
    /// # Errors
    ///
    /// Fails if the recorder was already started, a resource is already
    /// being captured, or the record file cannot be loaded. Nothing stays
    /// installed on failure.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        self.expect_state(CaptureState::Idle, "start")?;

        let observer = self.observer();
        let started = self
            .databases
            .install(&observer)
            .and_then(|()| self.caches.install(&observer))
            .and_then(|()| KvFile::open(&self.file).map_err(CaptureError::from));

        match started {
            Ok(records_file) => {
                self.records_file = Some(records_file);
                self.state = CaptureState::Capturing;
                debug!(record = %self.record_name, file = %self.file.display(), "capture started");
                Ok(())
            }
            Err(err) => {
                self.stop_observing();
                self.state = CaptureState::Failed;
                Err(err)
            }
        }
    }

    /// Stop observing and reconcile the captured record.
    ///
    /// # Errors
    ///
    /// `RecordMismatch` or `MissingRecord` per the recording mode, or a
    /// store error if the record cannot be saved.
    pub fn finish(&mut self) -> Result<(), CaptureError> {
        self.expect_state(CaptureState::Capturing, "finish")?;
        self.stop_observing();

        self.state = CaptureState::Reconciling;
        let result = self.reconcile();
        self.state = if result.is_ok() {
            CaptureState::Done
        } else {
            CaptureState::Failed
        };
        result
    }

    /// Stop observing without reconciling.
    pub fn fail(&mut self) {
        self.stop_observing();
        self.state = CaptureState::Failed;
        debug!(record = %self.record_name, "capture abandoned");
    }

    fn expect_state(&self, expected: CaptureState, action: &'static str) -> Result<(), CaptureError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(CaptureError::InvalidState {
                action,
                state: self.state,
            })
        }
    }

    fn stop_observing(&mut self) {
        self.caches.uninstall();
        self.databases.uninstall();
    }

    fn observer(&self) -> Observer {
        let record = Arc::clone(&self.record);
        let hide_columns = self.recording.hide_columns;
        let capture_operation = self.capture_operation.clone();
        let capture_traceback = self.capture_traceback.clone();

        Arc::new(move |raw: RawOperation| {
            let op = match raw {
                RawOperation::Sql { alias, sql } => {
                    Operation::from(DbOp::new(alias, fingerprint(&sql, hide_columns)))
                }
                RawOperation::Cache { alias, verb, keys } => {
                    Operation::from(CacheOp::new(alias, verb.as_str(), keys))
                }
            };
            if let Some(filter) = &capture_operation
                && !filter(&op)
            {
                return;
            }
            let op = match &capture_traceback {
                Some(filter) if filter(&op) => op.with_traceback(Traceback::capture()),
                _ => op,
            };
            record.lock().push(RecordEntry::from_operation(&op));
        })
    }

    fn reconcile(&self) -> Result<(), CaptureError> {
        let Some(records_file) = &self.records_file else {
            return Err(CaptureError::InvalidState {
                action: "reconcile",
                state: self.state,
            });
        };
        let record = self.record();
        let original = records_file.get(&self.record_name);
        let mode = self.recording.mode;

        if mode == Mode::None && original.is_none() {
            return Err(self.missing_record());
        }

        if let Some(original) = &original
            && *original != record
        {
            if mode != Mode::Overwrite {
                return Err(CaptureError::RecordMismatch {
                    record_name: self.record_name.clone(),
                    diff: self
                        .recording
                        .show_diff
                        .then(|| record_diff(original, &record)),
                });
            }
            warn!(record = %self.record_name, file = %self.file.display(), "overwriting record");
        }

        records_file.set_and_save(&self.record_name, record)?;

        if original.is_none() {
            info!(record = %self.record_name, file = %self.file.display(), "created record");
            if mode == Mode::All {
                return Err(self.missing_record());
            }
        }
        Ok(())
    }

    fn missing_record(&self) -> CaptureError {
        CaptureError::MissingRecord {
            record_name: self.record_name.clone(),
        }
    }
}

impl Drop for PerformanceRecorder {
    fn drop(&mut self) {
        self.stop_observing();
    }
}
