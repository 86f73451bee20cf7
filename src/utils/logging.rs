use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::EnvConfig;

const DEFAULT_FILTER: &str = "salesflow=info,warn";
const VERBOSE_FILTER: &str = "salesflow=debug,info";

/// Tracing subscriber setup.
///
/// Environment:
/// - `RUST_LOG` overrides the default filter
/// - `SALESFLOW_DEBUG` switches to debug and prints target, file, line and thread id
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Used when `RUST_LOG` is unset.
    pub fallback_filter: String,
    pub verbose: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        Self::with_verbosity(EnvConfig::is_debug_mode())
    }

    pub fn with_verbosity(verbose: bool) -> Self {
        Self {
            fallback_filter: if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER }.to_string(),
            verbose,
        }
    }

    /// Installs the global subscriber from the environment. Only the first
    /// call has an effect.
    ///
    /// ```no_run
    /// use salesflow::utils::LoggingConfig;
    ///
    /// LoggingConfig::init();
    /// tracing::info!("ready");
    /// ```
    pub fn init() {
        Self::from_env().install();
    }

    /// Returns whether this call installed the subscriber.
    pub fn install(&self) -> bool {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&self.fallback_filter));

        let fmt_layer = fmt::layer()
            .with_target(self.verbose)
            .with_file(self.verbose)
            .with_line_number(self.verbose)
            .with_thread_ids(self.verbose);

        let installed = tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .is_ok();

        if installed && self.verbose {
            tracing::debug!("verbose logging enabled");
        }
        installed
    }
}
