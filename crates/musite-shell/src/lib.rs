//! Command-backed implementations of the musite service traits.
//!
//! Both services spawn one external program per call in a scratch directory,
//! pass inputs as JSON files and read JSON results back.

pub mod runner;
pub mod signal;
pub mod site_search;
pub mod template;

use std::path::Path;

use musite_core::ServiceError;
use tempfile::TempDir;

pub use runner::{run_command, CommandError, CommandOutput, CommandSpec};
pub use signal::{parse_results, ShellSignalService, EMPTY_CLUSTER_KEY};
pub use site_search::ShellSiteSearch;

pub(crate) const SIGNAL_SERVICE: &str = "signal-simulation";
pub(crate) const SEARCH_SERVICE: &str = "site-search";

/// Fresh scratch directory, removed when dropped.
pub(crate) fn scratch_dir(
    root: Option<&Path>,
    prefix: &str,
    service: &str,
) -> Result<TempDir, ServiceError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(prefix);
    let dir = match root {
        Some(root) => builder.tempdir_in(root),
        None => builder.tempdir(),
    };
    dir.map_err(|e| ServiceError::failed(service, format!("cannot create scratch dir: {e}")))
}

pub(crate) fn command_error(service: &str, err: CommandError) -> ServiceError {
    match err {
        CommandError::TimedOut { seconds, .. } => ServiceError::Timeout {
            service: service.to_string(),
            seconds,
        },
        other => ServiceError::failed(service, other.to_string()),
    }
}
