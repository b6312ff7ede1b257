//! Process-wide crypto runtime registration
//!
//! The certificate-trust stack requires a process-default
//! `CryptoProvider` before any verifier can be built. Registering it is
//! pure plumbing, but doing it twice, or racing it from multiple threads,
//! is exactly the kind of silent hazard this adapter exists to contain:
//! install exactly once at process start, matching uninstall at shutdown,
//! and nothing else in the core ever touches provider state.

use std::sync::atomic::{AtomicBool, Ordering};

use strata_core::{Result, SecurityError};

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Installer for the process-wide crypto provider.
#[derive(Debug)]
pub struct CryptoRuntime;

impl CryptoRuntime {
    /// Register the crypto provider for this process. Must be called
    /// once, before any [`SecurityContext`](crate::SecurityContext) is
    /// built; a second call without [`CryptoRuntime::uninstall`] returns
    /// `AlreadyInitialized`.
    pub fn install() -> Result<()> {
        if INSTALLED.swap(true, Ordering::SeqCst) {
            return Err(SecurityError::AlreadyInitialized);
        }
        // Another library in the same process may have installed a
        // default provider already; that satisfies our requirement.
        if rustls::crypto::ring::default_provider()
            .install_default()
            .is_err()
        {
            tracing::debug!("process default crypto provider was already present");
        }
        Ok(())
    }

    /// Release this module's registration. The provider itself stays
    /// with the process (it cannot be removed once installed); this only
    /// rearms the lifecycle guard so a fresh install/initialize cycle is
    /// accepted.
    pub fn uninstall() {
        INSTALLED.store(false, Ordering::SeqCst);
    }

    /// Whether [`CryptoRuntime::install`] has been called.
    pub fn is_installed() -> bool {
        INSTALLED.load(Ordering::SeqCst)
    }
}
