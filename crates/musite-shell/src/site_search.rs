//! Site search backed by an external command.
//!
//! The scratch directory holds `structure.json` and `params.json`; the command
//! must write `sites.json`, a list of `{"id", "energy", "structure"}` objects in
//! enumeration order.

use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;

use musite_core::{ServiceError, Site, SiteSearchParams, SiteSearchService, Structure};

use crate::runner::{run_command, CommandSpec};
use crate::signal::STRUCTURE_FILE;
use crate::template::TemplateVars;
use crate::{command_error, scratch_dir, SEARCH_SERVICE};

pub const SITES_FILE: &str = "sites.json";
pub const PARAMS_FILE: &str = "params.json";

/// [`SiteSearchService`] running one command per search.
///
/// Placeholders: `{structure}`, `{params}`, `{workdir}`.
#[derive(Debug, Clone)]
pub struct ShellSiteSearch {
    command: CommandSpec,
    scratch_root: Option<PathBuf>,
}

impl ShellSiteSearch {
    pub fn new(command: CommandSpec) -> Self {
        Self {
            command,
            scratch_root: None,
        }
    }

    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let body = serde_json::to_vec_pretty(value)?;
    std::fs::write(path, body).with_context(|| format!("failed to write {}", path.display()))
}

fn read_sites(workdir: &Path) -> anyhow::Result<Vec<Site>> {
    let path = workdir.join(SITES_FILE);
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).context("sites.json is not a list of sites")
}

#[async_trait]
impl SiteSearchService for ShellSiteSearch {
    async fn search(
        &self,
        structure: &Structure,
        params: &SiteSearchParams,
    ) -> Result<Vec<Site>, ServiceError> {
        let dir = scratch_dir(self.scratch_root.as_deref(), "musite-search-", SEARCH_SERVICE)?;
        let structure_path = dir.path().join(STRUCTURE_FILE);
        let params_path = dir.path().join(PARAMS_FILE);
        write_json(&structure_path, structure)
            .and_then(|_| write_json(&params_path, params))
            .map_err(|e| ServiceError::failed(SEARCH_SERVICE, format!("{e:#}")))?;

        let mut vars = TemplateVars::new();
        vars.insert("structure", structure_path.display().to_string());
        vars.insert("params", params_path.display().to_string());
        vars.insert("workdir", dir.path().display().to_string());

        let output = run_command(&self.command, &vars, dir.path())
            .await
            .map_err(|e| command_error(SEARCH_SERVICE, e))?;
        if !output.success {
            return Err(ServiceError::failed(
                SEARCH_SERVICE,
                format!(
                    "{} exited with code {}: {}",
                    self.command.program,
                    output.exit_code,
                    output.stderr_tail(5)
                ),
            ));
        }

        let sites = read_sites(dir.path())
            .map_err(|e| ServiceError::invalid_output(SEARCH_SERVICE, format!("{e:#}")))?;
        tracing::info!(
            event = "site_search.parsed",
            sites = sites.len(),
            duration_ms = output.duration_ms,
        );
        Ok(sites)
    }
}
