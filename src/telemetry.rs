use std::sync::Arc;

#[cfg(feature = "prometheus")]
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(feature = "prometheus")]
use std::sync::Mutex;
#[cfg(feature = "prometheus")]
use std::thread::JoinHandle;
#[cfg(feature = "prometheus")]
use std::time::Duration;

use crate::types::{HeadChunkId, SeriesRef};

/// Structured, in-process event hook for observability.
///
/// This crate is a library; emitting logs directly (e.g. `println!`) is not acceptable for
/// production. Instead, callers can provide an implementation that forwards these events to
/// `tracing`, `log`, metrics, or custom sinks.
pub trait DbEventListener: std::fmt::Debug + Send + Sync + 'static {
    fn on_event(&self, event: DbEvent);
}

/// Structured events emitted by the head read path and head maintenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbEvent {
    /// A reader asked for a series that is no longer in the head.
    SeriesNotFound { series: SeriesRef },

    /// The chunk mapper failed while resolving an mmapped OOO chunk.
    OooChunkResolveFailed {
        series: SeriesRef,
        chunk_id: HeadChunkId,
        error: String,
    },

    OooChunksTruncated {
        series: SeriesRef,
        removed: usize,
        first_chunk_id: HeadChunkId,
    },

    SeriesGarbageCollected { removed: usize },
}

#[derive(Debug)]
pub struct NoopEventListener;

impl DbEventListener for NoopEventListener {
    #[inline]
    fn on_event(&self, _event: DbEvent) {}
}

pub fn noop_event_listener() -> Arc<dyn DbEventListener> {
    Arc::new(NoopEventListener)
}

/// Metrics instrumentation and in-process scraping.
///
/// Emitting is effectively a no-op until a recorder is installed, so the library can
/// record unconditionally.
pub mod db_metrics {
    use super::*;

    use ::metrics::{describe_counter, describe_gauge, Unit};

    #[cfg(feature = "prometheus")]
    use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

    // Counters are exposed as `<name>_total` by the Prometheus exporter.

    pub const OOO_SERIES_NOT_FOUND: &str = "ugnos_ooo_series_not_found";
    pub const OOO_CHUNK_RESOLVE_FAILURES: &str = "ugnos_ooo_chunk_resolve_failures";
    pub const CHUNK_POOL_RECYCLED: &str = "ugnos_chunk_pool_recycled";
    pub const CHUNK_POOL_IDLE_BUFFERS: &str = "ugnos_chunk_pool_idle_buffers";

    /// Handle to the in-process Prometheus recorder/scrape renderer.
    ///
    /// This does **not** start an HTTP server. Call [`InProcessPrometheus::render`] to scrape.
    #[cfg(feature = "prometheus")]
    pub struct InProcessPrometheus {
        handle: PrometheusHandle,
        stop: Arc<AtomicBool>,
        upkeep_thread: Mutex<Option<JoinHandle<()>>>,
    }

    #[cfg(feature = "prometheus")]
    impl InProcessPrometheus {
        /// Installs a global Prometheus recorder (once per process) and starts a small upkeep thread.
        pub fn install(upkeep_interval: Duration) -> Result<Self, MetricsInitError> {
            describe_all();

            let handle = PrometheusBuilder::new()
                .install_recorder()
                .map_err(MetricsInitError::from_build_error)?;

            let stop = Arc::new(AtomicBool::new(false));
            let stop_clone = stop.clone();
            let handle_clone = handle.clone();
            let upkeep_thread = std::thread::Builder::new()
                .name("ugnos-ooo-metrics-upkeep".to_string())
                .spawn(move || {
                    while !stop_clone.load(Ordering::Relaxed) {
                        std::thread::sleep(upkeep_interval);
                        handle_clone.run_upkeep();
                    }
                })
                .map_err(|e| MetricsInitError::ThreadSpawn(e.to_string()))?;

            Ok(Self {
                handle,
                stop,
                upkeep_thread: Mutex::new(Some(upkeep_thread)),
            })
        }

        /// Renders the current metrics in the Prometheus text exposition format.
        pub fn render(&self) -> String {
            self.handle.render()
        }
    }

    // `PrometheusHandle` has no `Debug` impl.
    #[cfg(feature = "prometheus")]
    impl std::fmt::Debug for InProcessPrometheus {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("InProcessPrometheus")
                .field("stopped", &self.stop.load(Ordering::Relaxed))
                .finish_non_exhaustive()
        }
    }

    #[cfg(feature = "prometheus")]
    impl Drop for InProcessPrometheus {
        fn drop(&mut self) {
            self.stop.store(true, Ordering::Relaxed);
            if let Ok(mut guard) = self.upkeep_thread.lock() {
                if let Some(t) = guard.take() {
                    let _ = t.join();
                }
            }
        }
    }

    #[cfg(feature = "prometheus")]
    #[derive(Debug, thiserror::Error)]
    pub enum MetricsInitError {
        #[error("metrics recorder already installed")]
        AlreadyInstalled,
        #[error("failed to install prometheus recorder: {0}")]
        Install(String),
        #[error("failed to spawn upkeep thread: {0}")]
        ThreadSpawn(String),
    }

    #[cfg(feature = "prometheus")]
    impl MetricsInitError {
        fn from_build_error(e: BuildError) -> Self {
            match e {
                BuildError::FailedToSetGlobalRecorder(_) => MetricsInitError::AlreadyInstalled,
                other => MetricsInitError::Install(other.to_string()),
            }
        }
    }

    #[inline]
    pub fn record_series_not_found() {
        ::metrics::counter!(OOO_SERIES_NOT_FOUND).increment(1);
    }

    #[inline]
    pub fn record_chunk_resolve_failure() {
        ::metrics::counter!(OOO_CHUNK_RESOLVE_FAILURES).increment(1);
    }

    #[inline]
    pub fn record_chunk_recycled(idle_buffers: usize) {
        ::metrics::counter!(CHUNK_POOL_RECYCLED).increment(1);
        ::metrics::gauge!(CHUNK_POOL_IDLE_BUFFERS).set(idle_buffers as f64);
    }

    pub fn describe_all() {
        describe_counter!(
            OOO_SERIES_NOT_FOUND,
            Unit::Count,
            "Lookups by OOO head readers for series that were already garbage collected."
        );
        describe_counter!(
            OOO_CHUNK_RESOLVE_FAILURES,
            Unit::Count,
            "Chunk mapper failures while resolving mmapped OOO chunks."
        );
        describe_counter!(
            CHUNK_POOL_RECYCLED,
            Unit::Count,
            "Chunk buffers kept by the shared pool for reuse."
        );
        describe_gauge!(
            CHUNK_POOL_IDLE_BUFFERS,
            Unit::Count,
            "Buffers currently idle in the shared chunk pool."
        );
    }
}
