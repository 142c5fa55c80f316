use std::env;

use log::warn;

pub const ENV_BLOCKING: &str = "EPIMAT_BLOCKING";
pub const ENV_STRICT_PAIRING: &str = "EPIMAT_STRICT_PAIRING";

/// When `multiply` returns relative to the device work it issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Blocking {
    /// Return as soon as the work is enqueued.
    #[default]
    Auto,
    /// Synchronize the stream before returning, so device faults surface
    /// from the call itself.
    Always,
}

/// Facade configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MatmulOptions {
    pub blocking: Blocking,
    /// Reject auxiliary bundles produced by an epilog that is not the
    /// forward partner of the requested backward epilog.
    pub strict_pairing: bool,
}

impl MatmulOptions {
    pub fn with_blocking(mut self, blocking: Blocking) -> Self {
        self.blocking = blocking;
        self
    }

    pub fn with_strict_pairing(mut self, strict: bool) -> Self {
        self.strict_pairing = strict;
        self
    }

    /// Build options from `EPIMAT_BLOCKING` and `EPIMAT_STRICT_PAIRING`.
    ///
    /// Unset or unrecognised values keep the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut options = MatmulOptions::default();

        if let Some(raw) = lookup(ENV_BLOCKING) {
            match raw.trim().to_ascii_lowercase().as_str() {
                "auto" | "0" | "false" => options.blocking = Blocking::Auto,
                "always" | "1" | "true" => options.blocking = Blocking::Always,
                other => warn!("ignoring {}={:?}", ENV_BLOCKING, other),
            }
        }

        if let Some(raw) = lookup(ENV_STRICT_PAIRING) {
            match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => options.strict_pairing = true,
                "0" | "false" | "no" => options.strict_pairing = false,
                other => warn!("ignoring {}={:?}", ENV_STRICT_PAIRING, other),
            }
        }

        options
    }
}
