//! Lazily built, process-wide TLS context.
//!
//! The context is built on first use, at most once per generation, even
//! when many connections ask for it at the same moment. A failed build
//! leaves nothing behind, so the next caller starts from scratch.
//! [`TlsContextCell::invalidate`] starts a new generation after credentials
//! are rotated.

use std::{
    fmt,
    sync::{Arc, PoisonError, RwLock},
};

use tokio::sync::OnceCell;
use tracing::info;

use super::{ContextSource, CredentialLoadError, SecureTransportContext};

type Slot = Arc<OnceCell<Arc<SecureTransportContext>>>;

/// Single-flight holder of the [`SecureTransportContext`].
pub struct TlsContextCell {
    source: Arc<dyn ContextSource>,
    slot: RwLock<Slot>,
}

impl TlsContextCell {
    #[must_use]
    pub fn new(source: Arc<dyn ContextSource>) -> Self {
        Self {
            source,
            slot: RwLock::new(Arc::new(OnceCell::new())),
        }
    }

    /// Return the shared context, building it if this is the first call.
    ///
    /// Concurrent callers wait for a single in-flight build rather than
    /// starting their own.
    ///
    /// # Errors
    ///
    /// Returns the [`CredentialLoadError`] of the build attempt. The cell
    /// stays empty after a failure.
    pub async fn get(&self) -> Result<Arc<SecureTransportContext>, CredentialLoadError> {
        let slot = self.current();
        let context = slot
            .get_or_try_init(|| async {
                let context = self.source.build_context()?;
                info!(
                    trust_anchors = context.trust_anchor_count(),
                    client_auth = context.presents_client_certificate(),
                    "secure transport context initialised"
                );
                Ok::<_, CredentialLoadError>(Arc::new(context))
            })
            .await?;
        Ok(Arc::clone(context))
    }

    /// The context of the current generation, if it has been built.
    #[must_use]
    pub fn get_if_built(&self) -> Option<Arc<SecureTransportContext>> { self.current().get().cloned() }

    /// Drop the built context so the next [`get`](Self::get) rebuilds it.
    ///
    /// Connections already holding the old context keep using it.
    pub fn invalidate(&self) {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Arc::new(OnceCell::new());
        info!("secure transport context invalidated");
    }

    fn current(&self) -> Slot {
        let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*slot)
    }
}

impl fmt::Debug for TlsContextCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsContextCell")
            .field("built", &self.get_if_built().is_some())
            .finish_non_exhaustive()
    }
}
