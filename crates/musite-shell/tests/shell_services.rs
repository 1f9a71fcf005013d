//! Shell-backed services driven by small `sh` scripts.

use std::path::Path;
use std::sync::Arc;

use musite_core::{
    Atom, ExitKind, FieldDirectionClass, Orchestrator, RunConfig, RunOptions, SampleDirection,
    ServiceError, SignalSimulationService, SimulationRequest, SiteId, SiteSearchParams,
    SiteSearchService, Structure,
};
use musite_shell::{CommandSpec, ShellSignalService, ShellSiteSearch};

const RESULTS: &str = r#"[
  {"t": [0.0, 1e-6, 2e-6], "cluster_isotopes": {"19F": 2}, "spins": {"19F": 0.5},
   "probability": 0.75,
   "signal_x_lf": [1.0, 0.8, 0.6], "signal_y_lf": [1.0, 0.8, 0.6],
   "signal_z_lf": [1.0, 0.8, 0.6], "signal_powder_lf": [1.0, 0.8, 0.6]},
  {"t": [0.0, 1e-6, 2e-6], "cluster_isotopes": {"19F": 1, "7Li": 1},
   "spins": {"19F": 0.5, "7Li": 1.5}, "probability": 0.25,
   "signal_x_lf": [1.0, 0.4, 0.2], "signal_y_lf": [1.0, 0.4, 0.2],
   "signal_z_lf": [1.0, 0.4, 0.2], "signal_powder_lf": [1.0, 0.4, 0.2]}
]"#;

fn implanted(label: &str) -> Structure {
    Structure::new(
        label,
        Some([[4.0, 0.0, 0.0], [0.0, 4.0, 0.0], [0.0, 0.0, 4.0]]),
        vec![
            Atom::new("Li", [0.0, 0.0, 0.0]),
            Atom::new("F", [2.0, 0.0, 0.0]),
            Atom::new("H", [1.0, 1.0, 1.0]),
        ],
    )
}

fn host() -> Structure {
    let mut s = implanted("LiF");
    s.atoms.pop();
    s
}

fn write(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    path.display().to_string()
}

/// Solver stand-in: checks its inputs, then copies canned results.
fn solver(fixture: &str) -> CommandSpec {
    let script = format!(
        "test -s {{structure}} && test {{field_direction}} = lf && test {{accuracy}} -gt 0 \
         && cp {fixture} {{workdir}}/results.json"
    );
    CommandSpec::new("sh", &["-c", &script]).with_timeout(30)
}

fn request(field: f64) -> SimulationRequest {
    SimulationRequest {
        structure: implanted("mu"),
        field,
        field_direction: FieldDirectionClass::Longitudinal,
        accuracy_level: 1000,
    }
}

#[tokio::test]
async fn signal_service_reads_solver_results() {
    let fixtures = tempfile::tempdir().unwrap();
    let results = write(fixtures.path(), "results.json", RESULTS);
    let service = ShellSignalService::new(solver(&results));

    let record = service.simulate(&request(2e-3)).await.unwrap();

    assert_eq!(record.times, vec![0.0, 1.0, 2.0]);
    assert_eq!(record.configurations.len(), 2);
    assert_eq!(record.configurations[1].configuration.composition_key, "19F:1,7Li:1");
    assert!((record.probability_total() - 1.0).abs() < 1e-12);
}

#[tokio::test]
async fn signal_service_reports_non_zero_exit() {
    let service = ShellSignalService::new(CommandSpec::new(
        "sh",
        &["-c", "echo 'hamiltonian too large' >&2; exit 3"],
    ));

    let err = service.simulate(&request(0.0)).await.unwrap_err();

    match err {
        ServiceError::Failed { service, reason } => {
            assert_eq!(service, "signal-simulation");
            assert!(reason.contains("code 3"));
            assert!(reason.contains("hamiltonian too large"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn signal_service_missing_results_is_invalid_output() {
    let service = ShellSignalService::new(CommandSpec::new("true", &[]));
    let err = service.simulate(&request(0.0)).await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidOutput { .. }));
}

#[tokio::test]
async fn signal_service_timeout() {
    let service = ShellSignalService::new(CommandSpec::new("sleep", &["5"]).with_timeout(1));
    let err = service.simulate(&request(0.0)).await.unwrap_err();
    assert!(matches!(err, ServiceError::Timeout { seconds: 1, .. }));
}

#[tokio::test]
async fn scratch_directories_are_cleaned_up() {
    let fixtures = tempfile::tempdir().unwrap();
    let results = write(fixtures.path(), "results.json", RESULTS);
    let scratch = tempfile::tempdir().unwrap();
    let service = ShellSignalService::new(solver(&results)).with_scratch_root(scratch.path());

    service.simulate(&request(0.0)).await.unwrap();

    assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn site_search_reads_sites_file() {
    let fixtures = tempfile::tempdir().unwrap();
    let sites = serde_json::json!([
        {"id": "1", "energy": -210.31, "structure": implanted("site-1")},
        {"id": "2", "energy": -210.12, "structure": implanted("site-2")},
    ]);
    let sites_path = write(fixtures.path(), "sites.json", &sites.to_string());
    let script = format!("test -s {{structure}} && test -s {{params}} && cp {sites_path} {{workdir}}/sites.json");
    let service = ShellSiteSearch::new(CommandSpec::new("sh", &["-c", &script]));

    let found = service
        .search(&host(), &SiteSearchParams::default())
        .await
        .unwrap();

    assert_eq!(found.len(), 2);
    assert_eq!(found[0].id, SiteId::new("1"));
    assert_eq!(found[1].energy, Some(-210.12));
}

#[tokio::test]
async fn orchestrator_runs_against_shell_services() {
    let fixtures = tempfile::tempdir().unwrap();
    let results = write(fixtures.path(), "results.json", RESULTS);
    let sites = serde_json::json!([
        {"id": "1", "energy": -1.0, "structure": implanted("site-1")},
    ]);
    let sites_path = write(fixtures.path(), "sites.json", &sites.to_string());
    let search = ShellSiteSearch::new(CommandSpec::new(
        "sh",
        &["-c", &format!("cp {sites_path} {{workdir}}/sites.json")],
    ));
    let orch = Orchestrator::new(Arc::new(search), Arc::new(ShellSignalService::new(solver(&results))));

    let mut options = RunOptions::default();
    options.polarization.fields = vec![0.0, 1.0];
    options.polarization.field_unit = musite_core::FieldUnit::Millitesla;
    options.polarization.accuracy_levels = vec![100, 1000];
    options.polarization.run_convergence_for_anchor = true;
    options.reference.cutoff_angstrom = 6.0;
    let plan = RunConfig::new(host(), options).validate().unwrap();

    let report = orch.run(plan).await;

    assert!(report.succeeded(), "error: {:?}", report.error);
    assert!(report.exit.is_none());
    let pol = report.outputs.polarization.unwrap();
    let z = pol
        .signal(&SiteId::new("1"), 1e-3, SampleDirection::Z)
        .unwrap();
    let expected = [1.0, 0.75 * 0.8 + 0.25 * 0.4, 0.75 * 0.6 + 0.25 * 0.2];
    for (v, e) in z.values.iter().zip(expected) {
        assert!((v - e).abs() < 1e-12);
    }
    assert_eq!(pol.convergence().len(), 2);
}

#[tokio::test]
async fn failing_search_command_is_workchain_failed() {
    let search = ShellSiteSearch::new(CommandSpec::new("false", &[]));
    let orch = Orchestrator::new(
        Arc::new(search),
        Arc::new(ShellSignalService::new(CommandSpec::new("true", &[]))),
    );
    let plan = RunConfig::new(host(), RunOptions::default()).validate().unwrap();

    let report = orch.run(plan).await;

    assert_eq!(report.exit, Some(ExitKind::WorkchainFailed));
}
