//! musite - muon stopping-site discovery and polarization sweeps
//!
//! ## Commands
//!
//! - `run`: execute a full run from a config file and write the report
//! - `plan`: print the task graph a config would execute
//! - `kt`: print the Kubo-Toyabe reference curve of an implanted structure

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

use musite_core::aggregate::reference_curve;
use musite_core::{
    build_graph, ExitKind, ReferenceParams, RunConfig, RunOptions, RunPlan, ServiceError, Site,
    SiteId, SiteSearchParams, SiteSearchService, SiteSet, Structure, SYNTHESIZED_SITE_ID,
};
use musite_shell::{CommandSpec, ShellSignalService, ShellSiteSearch};

#[derive(Parser)]
#[command(name = "musite")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Muon stopping-site discovery and polarization sweeps", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run site search and the polarization sweep
    Run {
        /// Run config (TOML or JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Write the run report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the task graph for a config without running anything
    Plan {
        /// Run config (TOML or JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Site list (JSON) to plan against; defaults to the input structure
        /// as the single site "0"
        #[arg(long)]
        sites: Option<PathBuf>,
    },

    /// Kubo-Toyabe reference curve for an implanted structure
    Kt {
        /// Structure file (JSON)
        #[arg(short, long)]
        structure: PathBuf,

        /// Dipolar sum cutoff in Angstrom
        #[arg(long, default_value = "40.0")]
        cutoff: f64,

        /// Impurity element symbol
        #[arg(long, default_value = "H")]
        impurity: String,
    },
}

/// External programs backing the two services.
#[derive(Debug, Clone, Deserialize)]
struct ServicesConfig {
    #[serde(default)]
    site_search: Option<CommandSpec>,
    simulation: CommandSpec,
}

/// On-disk run config: structure path, service commands, run options.
#[derive(Debug, Clone, Deserialize)]
struct CliConfig {
    /// Relative paths resolve against the config file's directory.
    structure: PathBuf,
    services: ServicesConfig,
    #[serde(flatten)]
    options: RunOptions,
}

impl CliConfig {
    fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        let mut config: CliConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&text)
                .with_context(|| format!("Invalid TOML config {:?}", path))?,
            Some("json") => serde_json::from_str(&text)
                .with_context(|| format!("Invalid JSON config {:?}", path))?,
            other => anyhow::bail!("Unsupported config extension {:?} for {:?}", other, path),
        };
        if config.structure.is_relative() {
            if let Some(dir) = path.parent() {
                config.structure = dir.join(&config.structure);
            }
        }
        Ok(config)
    }

    fn plan(&self) -> Result<RunPlan> {
        let structure = read_structure(&self.structure)?;
        RunConfig::new(structure, self.options.clone())
            .validate()
            .context("Invalid run config")
    }
}

/// Stand-in when no site-search command is configured.
struct NoSiteSearch;

#[async_trait]
impl SiteSearchService for NoSiteSearch {
    async fn search(
        &self,
        _structure: &Structure,
        _params: &SiteSearchParams,
    ) -> std::result::Result<Vec<Site>, ServiceError> {
        Err(ServiceError::failed(
            "site-search",
            "no site_search command configured",
        ))
    }
}

fn read_structure(path: &Path) -> Result<Structure> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read structure {:?}", path))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid structure file {:?}", path))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    musite_core::telemetry::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run { config, output } => {
            let code = cmd_run(&config, output.as_deref()).await?;
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }
        Commands::Plan { config, sites } => cmd_plan(&config, sites.as_deref()),
        Commands::Kt {
            structure,
            cutoff,
            impurity,
        } => cmd_kt(&structure, cutoff, &impurity),
    }
}

/// Process exit status for a failed run. The run codes (400-402) do not fit
/// the 8 bits a Unix exit status keeps, so each gets its own small code; the
/// full code is in the report's `exit` field.
fn process_exit_code(exit: ExitKind) -> i32 {
    match exit {
        ExitKind::WorkchainFailed => 10,
        ExitKind::PolarizationFailed => 11,
        ExitKind::AggregationFailed => 12,
    }
}

/// Execute a run; returns the process exit code (0, or
/// [`process_exit_code`] of the run's exit).
async fn cmd_run(config_path: &Path, output: Option<&Path>) -> Result<i32> {
    let config = CliConfig::load(config_path)?;
    let plan = config.plan()?;

    let search: Arc<dyn SiteSearchService> = match &config.services.site_search {
        Some(spec) => Arc::new(ShellSiteSearch::new(spec.clone())),
        None if plan.do_implant => {
            anyhow::bail!("Config enables do_implant but has no services.site_search command")
        }
        None => Arc::new(NoSiteSearch),
    };
    let simulator = Arc::new(ShellSignalService::new(config.services.simulation.clone()));

    let orchestrator = musite_core::Orchestrator::new(search, simulator);
    let report = orchestrator.run(plan).await;

    let body = serde_json::to_string_pretty(&report).context("Failed to serialize run report")?;
    if let Some(path) = output {
        std::fs::write(path, &body)
            .with_context(|| format!("Failed to write report to {:?}", path))?;
        info!("Wrote run report to {:?}", path);
    } else {
        println!("{}", body);
    }

    match report.exit {
        Some(exit) => {
            eprintln!("Run {} failed: {}", report.run_id, exit);
            if let Some(error) = &report.error {
                eprintln!("  {}", error);
            }
            Ok(process_exit_code(exit))
        }
        None => Ok(0),
    }
}

fn cmd_plan(config_path: &Path, sites_path: Option<&Path>) -> Result<()> {
    let config = CliConfig::load(config_path)?;
    let plan = config.plan()?;

    let sites = match sites_path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read sites {:?}", path))?;
            let sites: Vec<Site> = serde_json::from_str(&text)
                .with_context(|| format!("Invalid sites file {:?}", path))?;
            SiteSet::new(sites).context("Invalid site list")?
        }
        None => SiteSet::synthesized(plan.structure.clone()),
    };
    let anchor = sites.anchor(plan.anchor_policy).map(|s| s.id.clone());
    let graph = build_graph(&sites, &plan.sweep, anchor.as_ref());

    println!("{}", serde_json::to_string_pretty(&graph)?);
    Ok(())
}

fn cmd_kt(structure_path: &Path, cutoff: f64, impurity: &str) -> Result<()> {
    let structure = read_structure(structure_path)?;
    let params = ReferenceParams {
        cutoff_angstrom: cutoff,
        impurity_symbol: impurity.to_string(),
        ..ReferenceParams::default()
    };
    params.validate().context("Invalid reference parameters")?;
    let curve = reference_curve(&SiteId::new(SYNTHESIZED_SITE_ID), &structure, &params)
        .context("Cannot compute reference curve")?;
    println!("{}", serde_json::to_string_pretty(&curve)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use musite_core::Atom;

    fn implanted_lif() -> Structure {
        Structure::new(
            "LiF",
            Some([[4.0, 0.0, 0.0], [0.0, 4.0, 0.0], [0.0, 0.0, 4.0]]),
            vec![
                Atom::new("Li", [0.0, 0.0, 0.0]),
                Atom::new("F", [2.0, 0.0, 0.0]),
                Atom::new("H", [1.0, 1.0, 1.0]),
            ],
        )
    }

    fn write_fixture(dir: &Path, config: &str) -> PathBuf {
        std::fs::write(
            dir.join("structure.json"),
            serde_json::to_string(&implanted_lif()).unwrap(),
        )
        .unwrap();
        let path = dir.join("run.toml");
        std::fs::write(&path, config).unwrap();
        path
    }

    #[test]
    fn test_config_loads_with_relative_structure() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(
            dir.path(),
            r#"
structure = "structure.json"
do_implant = false

[services.simulation]
program = "solver"
args = ["--in", "{structure}"]

[polarization]
fields = [0.0, 2.0]
field_unit = "mT"
"#,
        );

        let config = CliConfig::load(&path).unwrap();
        assert_eq!(config.structure, dir.path().join("structure.json"));
        assert!(config.services.site_search.is_none());
        assert_eq!(config.services.simulation.timeout_secs, 3600);

        let plan = config.plan().unwrap();
        assert!(!plan.do_implant);
        assert_eq!(plan.sweep.fields, vec![0.0, 2e-3]);
    }

    #[test]
    fn test_config_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.yaml");
        std::fs::write(&path, "structure: s.json").unwrap();
        assert!(CliConfig::load(&path).is_err());
    }

    #[tokio::test]
    async fn test_run_requires_search_command_when_implanting() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(
            dir.path(),
            r#"
structure = "structure.json"

[services.simulation]
program = "true"
"#,
        );

        let err = cmd_run(&path, None).await.unwrap_err();
        assert!(err.to_string().contains("site_search"));
    }

    #[tokio::test]
    async fn test_run_exit_code_from_failed_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(
            dir.path(),
            r#"
structure = "structure.json"

[services.site_search]
program = "false"

[services.simulation]
program = "true"
"#,
        );
        let report = dir.path().join("report.json");

        let code = cmd_run(&path, Some(&report)).await.unwrap();

        assert_eq!(code, 10);
        let body: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&report).unwrap()).unwrap();
        assert_eq!(body["exit"], "WORKCHAIN_FAILED");
    }

    #[test]
    fn test_plan_without_sites_uses_input_structure() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(
            dir.path(),
            r#"
structure = "structure.json"
do_implant = false

[services.simulation]
program = "solver"
"#,
        );
        cmd_plan(&path, None).unwrap();
    }

    #[test]
    fn test_kt_needs_impurity() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), "");
        let structure = dir.path().join("structure.json");

        cmd_kt(&structure, 6.0, "H").unwrap();
        assert!(cmd_kt(&structure, 6.0, "Mu").is_err());
    }

    #[test]
    fn test_kt_rejects_non_positive_cutoff() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), "");
        let structure = dir.path().join("structure.json");

        for cutoff in [0.0, -3.0, f64::NAN] {
            let err = cmd_kt(&structure, cutoff, "H").unwrap_err();
            assert!(err.to_string().contains("Invalid reference parameters"));
        }
    }

    #[test]
    fn test_process_exit_codes_fit_in_a_byte() {
        let codes: Vec<i32> = [
            ExitKind::WorkchainFailed,
            ExitKind::PolarizationFailed,
            ExitKind::AggregationFailed,
        ]
        .into_iter()
        .map(process_exit_code)
        .collect();
        assert_eq!(codes, vec![10, 11, 12]);
        assert!(codes.iter().all(|c| (1..=255).contains(c)));
    }
}
