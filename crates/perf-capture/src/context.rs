//! Entry point for capture scopes.

use std::sync::Arc;

use perf_config::{PerfConfig, RecordingConfig};
use perf_core::Operation;

use crate::error::CaptureError;
use crate::identity::{CurrentTest, TestDetails};
use crate::naming::{RecordNamer, resolve_path};
use crate::recorder::{OperationFilter, PerformanceRecorder};
use crate::source::SourceRegistry;

/// Options of one capture scope. Everything is optional.
#[derive(Clone, Default)]
pub struct RecordOptions {
    record_name: Option<String>,
    path: Option<String>,
    test: Option<TestDetails>,
    capture_operation: Option<OperationFilter>,
    capture_traceback: Option<OperationFilter>,
}

impl RecordOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use this record name instead of deriving one from the test.
    #[must_use]
    pub fn record_name(mut self, name: impl Into<String>) -> Self {
        self.record_name = Some(name.into());
        self
    }

    /// Record file, or a directory for it when ending in `/`.
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Identity of the running test, overriding the context's provider.
    #[must_use]
    pub fn test(mut self, test: TestDetails) -> Self {
        self.test = Some(test);
        self
    }

    #[must_use]
    pub fn capture_operation(
        mut self,
        filter: impl Fn(&Operation) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.capture_operation = Some(Arc::new(filter));
        self
    }

    #[must_use]
    pub fn capture_traceback(
        mut self,
        filter: impl Fn(&Operation) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.capture_traceback = Some(Arc::new(filter));
        self
    }
}

/// Everything capture scopes share: the observable resources, the
/// recording configuration and the per-test record numbering.
pub struct CaptureContext {
    registry: SourceRegistry,
    recording: RecordingConfig,
    namer: RecordNamer,
    current_test: Option<Box<dyn CurrentTest>>,
}

impl CaptureContext {
    #[must_use]
    pub fn new(registry: SourceRegistry) -> Self {
        Self {
            registry,
            recording: RecordingConfig::default(),
            namer: RecordNamer::new(),
            current_test: None,
        }
    }

    /// Build a context with the `[recording]` section of `config`.
    #[must_use]
    pub fn from_config(registry: SourceRegistry, config: &PerfConfig) -> Self {
        Self::new(registry).with_recording(config.recording.clone())
    }

    /// Build a context from the layered configuration on disk and in the
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns `CaptureError::Config` if the configuration cannot be loaded.
    pub fn load(registry: SourceRegistry) -> Result<Self, CaptureError> {
        let config = PerfConfig::load_with_dotenv()?;
        Ok(Self::from_config(registry, &config))
    }

    #[must_use]
    pub fn with_recording(mut self, recording: RecordingConfig) -> Self {
        self.recording = recording;
        self
    }

    #[must_use]
    pub fn with_current_test(mut self, provider: impl CurrentTest + 'static) -> Self {
        self.current_test = Some(Box::new(provider));
        self
    }

    #[must_use]
    pub const fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    #[must_use]
    pub const fn recording(&self) -> &RecordingConfig {
        &self.recording
    }

    #[must_use]
    pub const fn namer(&self) -> &RecordNamer {
        &self.namer
    }

    /// Prepare an unstarted recorder for one scope.
    ///
    /// The test is only identified when the record path or name has to be
    /// derived from it.
    ///
    /// # Errors
    ///
    /// `TestIdentity` when the test is needed but unknown, or an I/O error
    /// creating the record directory.
    pub fn recorder(&self, options: RecordOptions) -> Result<PerformanceRecorder, CaptureError> {
        let needs_test = options.record_name.is_none()
            || options.path.as_deref().is_none_or(|path| path.ends_with('/'));
        let test = match options.test {
            Some(test) => Some(test),
            None if needs_test => Some(self.identify_test()?),
            None => None,
        };

        let file = resolve_path(options.path.as_deref(), || {
            test.as_ref()
                .map(|test| test.file_path.clone())
                .ok_or_else(|| CaptureError::TestIdentity("no test source file".to_string()))
        })?;

        let record_name = match (options.record_name, &test) {
            (Some(name), _) => name,
            (None, Some(test)) => self.namer.next_name(test, &file),
            (None, None) => {
                return Err(CaptureError::TestIdentity(
                    "no record name and no test to derive one from".to_string(),
                ));
            }
        };

        Ok(
            PerformanceRecorder::new(&self.registry, file, record_name, self.recording.clone())
                .with_capture_operation(options.capture_operation)
                .with_capture_traceback(options.capture_traceback),
        )
    }

    /// Run `body` inside a capture scope and reconcile its record.
    ///
    /// If `body` fails, observation stops and the record is neither compared
    /// nor saved.
    ///
    /// # Errors
    ///
    /// `Body` wrapping the body's error, or any error from setting up or
    /// reconciling the scope.
    pub fn record<T>(
        &self,
        options: RecordOptions,
        body: impl FnOnce() -> anyhow::Result<T>,
    ) -> Result<T, CaptureError> {
        let mut recorder = self.recorder(options)?;
        recorder.start()?;
        match body() {
            Ok(value) => {
                recorder.finish()?;
                Ok(value)
            }
            Err(err) => {
                recorder.fail();
                Err(CaptureError::Body(err))
            }
        }
    }

    fn identify_test(&self) -> Result<TestDetails, CaptureError> {
        self.current_test.as_ref().map_or_else(
            || {
                Err(CaptureError::TestIdentity(
                    "no current test provider configured".to_string(),
                ))
            },
            |provider| provider.current_test(),
        )
    }
}
