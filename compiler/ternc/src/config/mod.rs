//! Session settings.
//!
//! Defaults suit tests and interactive use; [`SessionConfig::from_env`]
//! overlays `TERN_*` environment variables.

use std::num::NonZeroUsize;

use tern_codegen::{BackendOptions, OptLevel};
use tern_infer::DEFAULT_MAX_FIXPOINT_ITERATIONS;

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap to panic on unexpected state"
)]

/// An environment variable with an unusable value.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid value {value:?} for {var}: expected {expected}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub expected: &'static str,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Cranelift optimization level.
    pub opt_level: OptLevel,
    /// Run the IR verifier on generated code.
    pub verify: bool,
    /// Value of the `num_cores` intrinsic. `None` uses the host's
    /// available parallelism.
    pub num_cores: Option<NonZeroUsize>,
    /// Bound on loop type fixed-point iterations.
    pub max_fixpoint_iterations: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let backend = BackendOptions::default();
        SessionConfig {
            opt_level: backend.opt_level,
            verify: backend.verify,
            num_cores: None,
            max_fixpoint_iterations: DEFAULT_MAX_FIXPOINT_ITERATIONS,
        }
    }
}

impl SessionConfig {
    pub const OPT_LEVEL_VAR: &'static str = "TERN_OPT_LEVEL";
    pub const VERIFY_VAR: &'static str = "TERN_VERIFY";
    pub const NUM_CORES_VAR: &'static str = "TERN_NUM_CORES";
    pub const MAX_FIXPOINT_VAR: &'static str = "TERN_MAX_FIXPOINT";

    /// Defaults overlaid with the `TERN_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Defaults overlaid with whatever `lookup` returns for each variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = SessionConfig::default();
        if let Some(value) = lookup(Self::OPT_LEVEL_VAR) {
            config.opt_level = match value.trim() {
                "none" | "0" => OptLevel::None,
                "speed" | "1" => OptLevel::Speed,
                "speed_and_size" | "2" => OptLevel::SpeedAndSize,
                _ => return Err(invalid(Self::OPT_LEVEL_VAR, value, "none, speed or speed_and_size")),
            };
        }
        if let Some(value) = lookup(Self::VERIFY_VAR) {
            config.verify = match value.trim() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => return Err(invalid(Self::VERIFY_VAR, value, "a boolean")),
            };
        }
        if let Some(value) = lookup(Self::NUM_CORES_VAR) {
            match value.trim().parse::<NonZeroUsize>() {
                Ok(n) => config.num_cores = Some(n),
                Err(_) => return Err(invalid(Self::NUM_CORES_VAR, value, "a positive integer")),
            }
        }
        if let Some(value) = lookup(Self::MAX_FIXPOINT_VAR) {
            match value.trim().parse::<u32>() {
                Ok(n) if n > 0 => config.max_fixpoint_iterations = n,
                _ => return Err(invalid(Self::MAX_FIXPOINT_VAR, value, "a positive integer")),
            }
        }
        tracing::debug!(config = ?config, "session config");
        Ok(config)
    }

    #[must_use]
    pub fn with_opt_level(mut self, opt_level: OptLevel) -> Self {
        self.opt_level = opt_level;
        self
    }

    #[must_use]
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    #[must_use]
    pub fn with_num_cores(mut self, num_cores: NonZeroUsize) -> Self {
        self.num_cores = Some(num_cores);
        self
    }

    #[must_use]
    pub fn with_max_fixpoint_iterations(mut self, limit: u32) -> Self {
        self.max_fixpoint_iterations = limit.max(1);
        self
    }

    pub fn backend_options(&self) -> BackendOptions {
        BackendOptions {
            opt_level: self.opt_level,
            verify: self.verify,
        }
    }

    /// The value `num_cores` reads during an invocation.
    pub fn effective_num_cores(&self) -> usize {
        self.num_cores
            .or_else(|| std::thread::available_parallelism().ok())
            .map_or(1, NonZeroUsize::get)
    }
}

fn invalid(var: &'static str, value: String, expected: &'static str) -> ConfigError {
    ConfigError { var, value, expected }
}
