//! [`SpeedTableLoader`] over any [`SpeedTableSource`].
//!
//! The cache and engine are synchronous while sources are async. The loader
//! bridges the two by blocking on a Tokio runtime:
//!
//! - inside a multi-threaded runtime it uses that runtime through
//!   [`tokio::task::block_in_place`];
//! - otherwise it uses the runtime it was built with, either its own
//!   current-thread runtime or a shared [`Handle`].

use std::future::Future;
use std::time::Duration;

use eta_core::{RequestContext, SpeedTable, SpeedTableLoadError, SpeedTableLoader};
use thiserror::Error;
use tokio::runtime::{Handle, Runtime, RuntimeFlavor};

use crate::parse::parse_speed_table;
use crate::source::SpeedTableSource;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Errors raised while constructing a [`SourceSpeedTableLoader`].
#[derive(Debug, Error)]
pub enum LoaderBuildError {
    /// The private Tokio runtime could not be created.
    #[error("failed to build Tokio runtime: {source}")]
    Runtime {
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

enum LoaderRuntime {
    Owned(Runtime),
    Shared(Handle),
}

/// Fetches a table from a source, decodes it and honours the caller's
/// deadline and cancellation.
///
/// # Examples
/// ```
/// use eta_core::{RegionalSpeedCache, RequestContext, SpeedTableLoader};
/// use eta_data::{SourceSpeedTableLoader, test_support::StubSpeedTableSource};
///
/// let source = StubSpeedTableSource::with_bytes("1,2,480,20\n");
/// let loader = SourceSpeedTableLoader::new(source)?;
/// let table = loader.load(&RequestContext::background())?;
/// assert_eq!(table.breakpoint_count(), 1);
///
/// let cache = RegionalSpeedCache::new(loader);
/// assert!(!cache.is_loaded());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct SourceSpeedTableLoader<S> {
    source: S,
    runtime: LoaderRuntime,
}

impl<S> std::fmt::Debug for SourceSpeedTableLoader<S>
where
    S: SpeedTableSource,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let runtime = match self.runtime {
            LoaderRuntime::Owned(_) => "<owned tokio::runtime::Runtime>",
            LoaderRuntime::Shared(_) => "<shared tokio::runtime::Handle>",
        };
        f.debug_struct("SourceSpeedTableLoader")
            .field("source", &self.source.describe())
            .field("runtime", &runtime)
            .finish()
    }
}

impl<S: SpeedTableSource> SourceSpeedTableLoader<S> {
    /// Create a loader with its own current-thread runtime.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderBuildError`] if the runtime fails to build.
    pub fn new(source: S) -> Result<Self, LoaderBuildError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|source| LoaderBuildError::Runtime { source })?;
        Ok(Self {
            source,
            runtime: LoaderRuntime::Owned(runtime),
        })
    }

    /// Create a loader that drives fetches on an existing runtime.
    ///
    /// Loads must then be issued from threads outside that runtime's async
    /// context, such as engine worker threads or `spawn_blocking` tasks.
    pub fn with_handle(source: S, handle: Handle) -> Self {
        Self {
            source,
            runtime: LoaderRuntime::Shared(handle),
        }
    }

    /// The wrapped source.
    pub fn source(&self) -> &S {
        &self.source
    }

    async fn fetch_within(&self, ctx: &RequestContext) -> Result<Vec<u8>, SpeedTableLoadError> {
        let bounded = async {
            let fetch = self.source.fetch();
            let fetched = match ctx.remaining() {
                Some(remaining) => tokio::time::timeout(remaining, fetch)
                    .await
                    .map_err(|_| SpeedTableLoadError::DeadlineExceeded)?,
                None => fetch.await,
            };
            fetched.map_err(SpeedTableLoadError::fetch)
        };
        tokio::select! {
            outcome = bounded => outcome,
            () = wait_for_cancel(ctx) => Err(SpeedTableLoadError::Cancelled),
        }
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        match Handle::try_current() {
            Ok(current) if current.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| current.block_on(future))
            }
            _ => match &self.runtime {
                LoaderRuntime::Owned(runtime) => runtime.block_on(future),
                LoaderRuntime::Shared(handle) => handle.block_on(future),
            },
        }
    }
}

async fn wait_for_cancel(ctx: &RequestContext) {
    while !ctx.is_cancelled() {
        tokio::time::sleep(CANCEL_POLL_INTERVAL).await;
    }
}

impl<S> SpeedTableLoader for SourceSpeedTableLoader<S>
where
    S: SpeedTableSource + Send + Sync,
{
    fn load(&self, ctx: &RequestContext) -> Result<SpeedTable, SpeedTableLoadError> {
        if ctx.is_cancelled() {
            return Err(SpeedTableLoadError::Cancelled);
        }
        if ctx.is_expired() {
            return Err(SpeedTableLoadError::DeadlineExceeded);
        }
        let bytes = self.block_on(self.fetch_within(ctx))?;
        log::debug!(
            "fetched {} bytes of speed data from {}",
            bytes.len(),
            self.source.describe()
        );
        parse_speed_table(bytes.as_slice()).map_err(SpeedTableLoadError::parse)
    }
}
