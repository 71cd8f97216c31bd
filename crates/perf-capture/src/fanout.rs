//! Observe every alias of one resource kind.

use tracing::debug;

use crate::error::CaptureError;
use crate::source::{Observer, Source, SourceKind, SourceRegistry};

/// Installs one observer on every registered alias of a kind.
///
/// Aliases are visited `default` first and then sorted, so operations from
/// equally configured resources land in the record in the same order on
/// every run. Teardown runs in reverse.
pub struct AllSourceRecorder {
    kind: SourceKind,
    sources: Vec<Source>,
    installed: usize,
}

impl AllSourceRecorder {
    /// Look up every alias of `kind` in `registry`.
    #[must_use]
    pub fn new(registry: &SourceRegistry, kind: SourceKind) -> Self {
        let sources = registry
            .aliases(kind)
            .iter()
            .filter_map(|alias| registry.source(kind, alias).ok())
            .collect();
        Self {
            kind,
            sources,
            installed: 0,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Aliases in install order.
    #[must_use]
    pub fn aliases(&self) -> Vec<&str> {
        self.sources.iter().map(Source::alias).collect()
    }

    /// Install `observer` on every alias.
    ///
    /// # Errors
    ///
    /// If any alias is already observed, the ones installed so far are torn
    /// down and `CaptureError::AlreadyCapturing` is returned.
    pub fn install(&mut self, observer: &Observer) -> Result<(), CaptureError> {
        while let Some(source) = self.sources.get(self.installed) {
            if let Err(err) = source.install(observer.clone()) {
                debug!(kind = %self.kind, alias = source.alias(), "install failed, rolling back");
                self.uninstall();
                return Err(err);
            }
            self.installed += 1;
        }
        debug!(kind = %self.kind, aliases = self.sources.len(), "observing all aliases");
        Ok(())
    }

    /// Remove the observer from every alias it was installed on, in reverse.
    pub fn uninstall(&mut self) {
        for source in self.sources[..self.installed].iter().rev() {
            source.uninstall();
        }
        self.installed = 0;
    }

    #[must_use]
    pub const fn is_installed(&self) -> bool {
        self.installed > 0
    }
}

impl Drop for AllSourceRecorder {
    fn drop(&mut self) {
        self.uninstall();
    }
}
