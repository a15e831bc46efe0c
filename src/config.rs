//! Host-supplied configuration.
//!
//! `winstate` is a library embedded into a host application, not a daemon,
//! so there is no file-based configuration layer here — the host owns
//! that. What the core needs from its caller is a small, explicit struct
//! passed into [`crate::initialize`].
use std::time::Duration;

/// Tuning knobs for the initialization/refresh pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    /// Budget for a single accessibility round trip before it is reported
    /// as `Error::Timeout`. Enforced by every delegate's blocking call
    /// through `property::delegate::run_blocking`; the mock backend
    /// resolves fast enough in tests that it never trips this on its own.
    pub request_timeout: Duration,

    /// Number of additional attempts for an application whose
    /// initialization fails, before it is dropped and logged.
    pub application_init_retries: u32,

    /// Whether the space observer should serialize its probe set so that
    /// internal space ids survive a process restart. Only meaningful with the `serde` feature;
    /// ignored otherwise.
    pub persist_space_probes: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(500),
            application_init_retries: 3,
            persist_space_probes: cfg!(feature = "serde"),
        }
    }
}
