use std::path::Path;

use anyhow::Result;
use serde_json::{json, Value};
use tempfile::tempdir;

use autogen::{CollectStatus, JobId, JobStatus, Manager, MergeWarning, PbsRunner, Config, Step};

mod common;
use common::{manager, state_json, MockQueue, MockWriter, ScriptedReader};

fn write_output(dir: &Path, text: &str) -> Result<()> {
    std::fs::write(dir.join("job.o"), text)?;
    Ok(())
}

#[test]
fn test_first_step_enqueues_and_submits() -> Result<()> {
    let dir = tempdir()?;
    let mut mgr = manager(dir.path(), MockQueue::new()).open()?;
    assert!(dir.path().join("job.json").exists(), "open persists state");

    let step = mgr.nextstep()?;

    assert_eq!(step, Step::Enqueued);
    assert!(mgr.writer().completed);
    assert!(dir.path().join("job").exists(), "input written");
    assert_eq!(mgr.runner().submissions, 1);
    assert!(mgr.runner().exelines.is_empty());
    assert_eq!(mgr.status(), JobStatus::NotFinished);
    Ok(())
}

#[test]
fn test_restart_bound() -> Result<()> {
    let dir = tempdir()?;
    let mut mgr = manager(dir.path(), MockQueue::playing("killed"))
        .with_max_restarts(2)
        .open()?;

    assert_eq!(mgr.nextstep()?, Step::Enqueued);
    assert_eq!(mgr.nextstep()?, Step::Restarted);
    assert_eq!(mgr.nextstep()?, Step::Restarted);
    assert_eq!(mgr.nextstep()?, Step::Frozen);

    assert_eq!(mgr.restarts(), 2);
    assert_eq!(mgr.runner().submissions, 3, "one submission plus two resubmissions");
    assert!(mgr.is_frozen());
    assert_eq!(mgr.status(), JobStatus::Frozen);
    assert!(mgr.writer().restart);
    for archived in ["0.job", "0.job.o", "1.job", "1.job.o"] {
        assert!(dir.path().join(archived).exists(), "{archived} archived");
    }
    assert!(!dir.path().join("2.job.o").exists());

    // frozen is stable:
    assert_eq!(mgr.nextstep()?, Step::Frozen);
    assert_eq!(mgr.runner().submissions, 3);
    assert!(!dir.path().join("2.job.o").exists());
    Ok(())
}

#[test]
fn test_raising_budget_unfreezes() -> Result<()> {
    let dir = tempdir()?;
    let mut mgr = manager(dir.path(), MockQueue::playing("killed"))
        .with_max_restarts(0)
        .open()?;
    mgr.nextstep()?;
    assert_eq!(mgr.nextstep()?, Step::Frozen);

    let mut mgr = manager(dir.path(), MockQueue::playing("killed"))
        .with_max_restarts(1)
        .open()?;
    assert!(mgr.is_frozen(), "frozen flag is persisted");
    assert_eq!(mgr.nextstep()?, Step::Restarted);
    assert!(!mgr.is_frozen());
    assert_eq!(mgr.restarts(), 1);
    Ok(())
}

#[test]
fn test_completed_only_after_ok() -> Result<()> {
    let dir = tempdir()?;
    let mut mgr = manager(dir.path(), MockQueue::new()).open()?;

    mgr.nextstep()?;
    assert!(!mgr.is_completed());
    write_output(dir.path(), "restart")?;
    assert_eq!(mgr.nextstep()?, Step::Restarted);
    assert!(!mgr.is_completed());
    assert_eq!(mgr.status(), JobStatus::NotFinished);

    write_output(dir.path(), "ok\ntotal_energy=-1.25")?;
    assert_eq!(mgr.nextstep()?, Step::Done);
    assert!(mgr.is_completed());
    assert_eq!(mgr.status(), JobStatus::Ok);

    // done is stable and doesn't touch the queue:
    let before = std::fs::read_to_string(dir.path().join("job.json"))?;
    assert_eq!(mgr.nextstep()?, Step::Done);
    assert_eq!(mgr.nextstep()?, Step::Done);
    assert_eq!(std::fs::read_to_string(dir.path().join("job.json"))?, before);
    assert_eq!(mgr.runner().submissions, 2);
    Ok(())
}

#[test]
fn test_unreadable_output_is_restart() -> Result<()> {
    let dir = tempdir()?;
    let mut mgr = manager(dir.path(), MockQueue::new()).open()?;
    mgr.nextstep()?;
    write_output(dir.path(), "segmentation fault")?;

    assert_eq!(mgr.nextstep()?, Step::Restarted);
    assert!(!mgr.is_completed());
    assert_eq!(mgr.restarts(), 1);
    Ok(())
}

#[test]
fn test_running_short_circuits() -> Result<()> {
    let dir = tempdir()?;
    let mut mgr = manager(dir.path(), MockQueue::new()).open()?;
    mgr.nextstep()?;
    write_output(dir.path(), "killed")?;

    let running = MockQueue {
        running: true,
        ..MockQueue::new()
    };
    let mut mgr = manager(dir.path(), running).open()?;
    assert_eq!(mgr.nextstep()?, Step::Running);
    assert_eq!(mgr.restarts(), 0);
    assert!(!dir.path().join("0.job.o").exists(), "output not analyzed while running");
    Ok(())
}

#[test]
fn test_bundled_job_keeps_commands() -> Result<()> {
    let dir = tempdir()?;
    let mut mgr = manager(dir.path(), MockQueue::new()).bundled(true).open()?;

    assert_eq!(mgr.nextstep()?, Step::Enqueued);
    assert_eq!(mgr.runner().exelines, ["cp job INPUT", "mock job > job.o"]);
    assert_eq!(mgr.runner().submissions, 0);

    // staged commands survive a reboot and aren't staged twice:
    let mut mgr = manager(dir.path(), MockQueue::new()).bundled(true).open()?;
    assert_eq!(mgr.runner().exelines.len(), 2);
    assert_eq!(mgr.nextstep()?, Step::Enqueued);
    assert_eq!(mgr.runner().exelines.len(), 2);
    Ok(())
}

#[test]
fn test_reboot_recovers_progress() -> Result<()> {
    let dir = tempdir()?;
    {
        let mut mgr = manager(dir.path(), MockQueue::playing("killed"))
            .with_max_restarts(4)
            .open()?;
        mgr.nextstep()?;
        mgr.nextstep()?;
    }

    let mgr = manager(dir.path(), MockQueue::new())
        .with_max_restarts(4)
        .open()?;
    assert_eq!(mgr.restarts(), 1);
    assert_eq!(mgr.runner().queueid, ["101", "102"]);
    assert_eq!(mgr.runner().submissions, 2);
    assert!(mgr.writer().restart, "restart flag taken from disk");
    assert_eq!(mgr.runner().on_submit, None, "fresh runner settings win");
    Ok(())
}

#[test]
fn test_recover_merges_by_policy() -> Result<()> {
    let dir = tempdir()?;
    let config = Config::default();
    let pbs = |walltime: &str| PbsRunner {
        walltime: walltime.to_owned(),
        ..PbsRunner::new(&config)
    };
    let mut old = Manager::new(
        "job",
        dir.path(),
        MockWriter::default(),
        ScriptedReader::default(),
        pbs("1:00:00"),
    )
    .bundled(true)
    .open()?;
    old.nextstep()?;

    let mut persisted = state_json(dir.path(), "job")?["manager"].clone();
    persisted["runner"]["queueid"] = json!(["77"]);
    persisted["writer"]["basis"] = json!("sto-3g");
    persisted["legacy"] = json!(true);

    let mut fresh = Manager::new(
        "job",
        dir.path(),
        MockWriter::default(),
        ScriptedReader::default(),
        pbs("2:00:00"),
    )
    .bundled(true);
    let warnings = fresh.recover(&persisted)?;

    assert_eq!(fresh.runner().queueid, ["77"]);
    assert_eq!(fresh.runner().walltime, "2:00:00");
    assert_eq!(fresh.runner().exelines.len(), 2, "staged commands taken");
    assert_eq!(fresh.writer().basis, "vtz", "physics change rejected");
    assert!(fresh.writer().completed, "input still valid");
    assert!(warnings
        .iter()
        .any(|w| matches!(w, MergeWarning::Rejected { field, .. } if field == "basis")));
    assert!(warnings
        .iter()
        .any(|w| matches!(w, MergeWarning::Drift { field, .. } if field == "legacy")));
    Ok(())
}

#[test]
fn test_recovered_writer_state_regenerates_input() -> Result<()> {
    let dir = tempdir()?;
    let mut mgr = manager(dir.path(), MockQueue::new()).open()?;
    mgr.nextstep()?;

    let mut persisted = state_json(dir.path(), "job")?["manager"].clone();
    persisted["writer"]["guess"] = json!("fort.20");
    let mut fresh = manager(dir.path(), MockQueue::new());
    fresh.recover(&persisted)?;
    assert_eq!(fresh.writer().guess.as_deref(), Some("fort.20"));
    assert!(!fresh.writer().completed);
    Ok(())
}

#[test]
fn test_export_record() -> Result<()> {
    let dir = tempdir()?;
    let mut mgr = manager(dir.path(), MockQueue::new()).open()?;

    let record = mgr.export_record();
    assert_eq!(record.get("total_energy"), Some(&Value::Null));
    assert_eq!(record.get("total_energy_err"), Some(&Value::Null));
    assert!(!record.contains_key("obdm"));
    assert_eq!(record.get("manager"), Some(&json!("MockManager")));
    assert_eq!(record.get("name"), Some(&json!("job")));
    assert_eq!(record.get("status"), Some(&json!("not_finished")));
    assert_eq!(record.get("basis"), Some(&json!("vtz")));

    mgr.nextstep()?;
    write_output(dir.path(), "ok\ntotal_energy=-1.5\ntotal_energy_err=0.01")?;
    mgr.nextstep()?;
    let record = mgr.export_record();
    assert_eq!(record.get("total_energy"), Some(&json!(-1.5)));
    assert_eq!(record.get("total_energy_err"), Some(&json!(0.01)));
    assert_eq!(record.get("completed"), Some(&json!(true)));
    assert_eq!(state_json(dir.path(), "job")?["record"], serde_json::to_value(&record)?);
    Ok(())
}

#[test]
fn test_dependency() -> Result<()> {
    let dir = tempdir()?;
    let (a, b) = (dir.path().join("a"), dir.path().join("b"));
    let trial = || MockWriter {
        needs_trial: true,
        ..MockWriter::default()
    };
    let dependent = |dir: &Path| {
        Manager::new("job", dir, trial(), ScriptedReader::default(), MockQueue::new())
            .depends_on(JobId::new("job", &a))
    };

    let mut b_mgr = dependent(&b).open()?;
    assert_eq!(b_mgr.nextstep()?, Step::AwaitingDependency, "no state yet");
    assert!(!b.join("job").exists());

    let mut a_mgr = manager(&a, MockQueue::playing("ok\ntotal_energy=-2.5")).open()?;
    assert_eq!(b_mgr.nextstep()?, Step::AwaitingDependency, "not completed yet");
    a_mgr.nextstep()?;
    assert_eq!(a_mgr.nextstep()?, Step::Done);

    assert_eq!(b_mgr.nextstep()?, Step::Enqueued);
    assert_eq!(b_mgr.writer().trial_energy, Some(-2.5));
    assert!(std::fs::read_to_string(b.join("job"))?.contains("trial Some(-2.5)"));

    // the accepted trial survives a reboot:
    let b_mgr = dependent(&b).open()?;
    assert_eq!(b_mgr.writer().trial_energy, Some(-2.5));
    Ok(())
}

#[test]
fn test_convergence_aid_polish() -> Result<()> {
    let dir = tempdir()?;
    let mut mgr = manager(dir.path(), MockQueue::new())
        .with_trylev(true)
        .with_max_restarts(3)
        .open()?;
    mgr.nextstep()?;

    write_output(dir.path(), "killed")?;
    assert_eq!(mgr.nextstep()?, Step::Restarted);
    assert!(mgr.is_aided());
    assert!(mgr.writer().levshift);

    write_output(dir.path(), "ok")?;
    assert_eq!(mgr.nextstep()?, Step::Restarted, "converged with aid: polish");
    assert!(!mgr.is_aided());
    assert!(!mgr.writer().levshift);
    assert!(!mgr.is_completed());
    assert_eq!(mgr.restarts(), 2);

    write_output(dir.path(), "ok")?;
    assert_eq!(mgr.nextstep()?, Step::Done);
    assert!(mgr.is_completed());
    Ok(())
}

#[test]
fn test_properties_stage() -> Result<()> {
    let dir = tempdir()?;
    let open = || {
        manager(dir.path(), MockQueue::playing("ok"))
            .with_properties(ScriptedReader::default(), MockQueue::playing("ok\nbands=8"))
            .open()
    };
    let mut mgr = open()?;

    assert!(!mgr.ready_properties()?, "primary just submitted");
    assert!(!mgr.ready_properties()?, "primary done, properties submitted");
    assert!(dir.path().join("job.prop.o").exists());
    assert!(mgr.ready_properties()?);
    assert!(mgr.properties().unwrap().completed);

    let mgr = open()?;
    assert!(mgr.properties().unwrap().completed, "properties completion persisted");
    assert_eq!(mgr.export_record().get("properties_completed"), Some(&json!(true)));
    Ok(())
}

#[test]
fn test_properties_without_stage() -> Result<()> {
    let dir = tempdir()?;
    let mut mgr = manager(dir.path(), MockQueue::playing("ok")).open()?;
    mgr.nextstep()?;
    assert!(mgr.ready_properties().is_err());
    Ok(())
}

#[test]
fn test_submission_failure_drops_commands() -> Result<()> {
    let dir = tempdir()?;
    let failing = MockQueue {
        fail: true,
        ..MockQueue::new()
    };
    let mut mgr = manager(dir.path(), failing).open()?;

    assert!(mgr.nextstep().is_err());
    assert!(mgr.runner().exelines.is_empty());
    assert!(mgr.runner().queueid.is_empty());
    assert_eq!(state_json(dir.path(), "job")?["manager"]["runner"]["exelines"], json!([]));

    let mut mgr = manager(dir.path(), MockQueue::new()).open()?;
    assert_eq!(mgr.nextstep()?, Step::Enqueued);
    assert_eq!(mgr.runner().queueid, ["101"]);
    Ok(())
}

#[test]
fn test_collect_never_submits() -> Result<()> {
    let dir = tempdir()?;
    let mut mgr = manager(dir.path(), MockQueue::new()).open()?;
    mgr.nextstep()?;
    write_output(dir.path(), "ok")?;

    assert_eq!(mgr.collect()?, CollectStatus::Ok);
    assert!(mgr.is_completed());
    assert_eq!(mgr.runner().submissions, 1);
    assert_eq!(state_json(dir.path(), "job")?["manager"]["completed"], json!(true));
    Ok(())
}
