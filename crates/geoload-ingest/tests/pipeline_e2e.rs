//! End-to-end pipeline scenarios against the in-memory collaborators
//!
//! Time is virtual (`start_paused`), so the monitor's full polling budget
//! runs in milliseconds of wall clock.

use std::io::Write;
use std::sync::Arc;

use geoload_ingest::config::IngestConfig;
use geoload_ingest::jobs::{Job, JobConfig, JobOrchestrator, JobStatus, SubmitSource};
use geoload_ingest::pipeline::GeometryEncoding;
use geoload_ingest::storage::MemoryObjectStore;
use geoload_ingest::warehouse::{LoadJobStatus, MemoryWarehouse};
use geoload_common::{FieldMode, FieldType};

/// Stub conversion utility: writes a fixed feature collection to the
/// output path, standing in for `ogr2ogr` on the test machine.
fn stub_converter(dir: &tempfile::TempDir) -> String {
    let script = dir.path().join("stub-ogr2ogr");
    let mut f = std::fs::File::create(&script).unwrap();
    writeln!(f, "#!/bin/sh").unwrap();
    writeln!(f, "cat > \"$3\" <<'EOF'").unwrap();
    writeln!(
        f,
        r#"{{"type":"FeatureCollection","features":[
{{"type":"Feature","geometry":{{"type":"LineString","coordinates":[[0.0,0.0],[1.0,0.0],[1.0,1.0]]}},"properties":{{"parcel":"p-1","area":12.5}}}},
{{"type":"Feature","geometry":{{"type":"LineString","coordinates":[[2.0,2.0],[3.0,2.0],[2.0,2.0]]}},"properties":{{"parcel":"p-2","area":7.0}}}}
]}}"#
    )
    .unwrap();
    writeln!(f, "EOF").unwrap();
    drop(f);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    script.to_string_lossy().to_string()
}

fn shapefile_zip() -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for name in ["parcels.shp", "parcels.dbf", "parcels.shx"] {
        writer
            .start_file(name, zip::write::FileOptions::default())
            .unwrap();
        writer.write_all(b"fixture-bytes").unwrap();
    }
    writer.finish().unwrap().into_inner()
}

struct Harness {
    orchestrator: JobOrchestrator,
    store: Arc<MemoryObjectStore>,
    warehouse: Arc<MemoryWarehouse>,
    _converter_dir: tempfile::TempDir,
}

fn harness(warehouse: MemoryWarehouse) -> Harness {
    let converter_dir = tempfile::tempdir().unwrap();
    let mut config = IngestConfig::default();
    config.convert.ogr2ogr_path = stub_converter(&converter_dir);

    let store = Arc::new(MemoryObjectStore::new());
    let warehouse = Arc::new(warehouse);
    let orchestrator = JobOrchestrator::new(config, store.clone(), warehouse.clone());

    Harness {
        orchestrator,
        store,
        warehouse,
        _converter_dir: converter_dir,
    }
}

/// Follow a job's watch channel until it reaches a terminal status,
/// asserting the record invariants on every observed snapshot.
async fn wait_terminal(orchestrator: &JobOrchestrator, job: &Job) -> Job {
    let mut updates = orchestrator.subscribe(job.id).expect("job exists");
    let mut last_progress = 0u8;

    loop {
        let snapshot = updates.borrow_and_update().clone();
        assert_invariants(&snapshot);

        if snapshot.status != JobStatus::Failed {
            assert!(
                snapshot.progress >= last_progress,
                "progress went backwards: {} -> {}",
                last_progress,
                snapshot.progress
            );
            last_progress = snapshot.progress;
        }

        if snapshot.status.is_terminal() {
            return snapshot;
        }
        if updates.changed().await.is_err() {
            return orchestrator.get_job(job.id).expect("job exists");
        }
    }
}

fn assert_invariants(job: &Job) {
    assert_eq!(
        job.end_time.is_some(),
        job.status.is_terminal(),
        "end_time must be set exactly on terminal status (status: {:?})",
        job.status
    );
    assert_eq!(
        job.error_message.is_some(),
        job.status == JobStatus::Failed,
        "error_message must be set exactly on failure (status: {:?})",
        job.status
    );
    if job.progress == 100 {
        assert_eq!(job.status, JobStatus::Completed);
    }
}

fn status_log_sequence(job: &Job) -> Vec<String> {
    job.logs
        .iter()
        .filter_map(|entry| {
            entry
                .message
                .strip_prefix("Status updated: ")
                .map(|rest| rest.split(' ').next().unwrap_or(rest).to_string())
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_local_zip_job_completes_end_to_end() {
    let h = harness(MemoryWarehouse::new());

    let config = JobConfig::new(
        SubmitSource::Local {
            file_name: "parcels.zip".to_string(),
            bytes: shapefile_zip(),
        },
        "acme-gis",
        "geo.parcels",
    )
    .with_geometry_encoding(GeometryEncoding::Wkt);

    let job = h.orchestrator.create_job(config, "user-1").await.unwrap();
    assert_eq!(job.status, JobStatus::Queued);

    let finished = wait_terminal(&h.orchestrator, &job).await;

    assert_eq!(finished.status, JobStatus::Completed, "{:?}", finished.error_message);
    assert_eq!(finished.progress, 100);
    assert_eq!(finished.record_count, Some(2));

    let external_id = finished
        .external_load_job_id
        .clone()
        .expect("load job id recorded");
    assert!(!external_id.is_empty());
    assert!(
        finished
            .logs
            .iter()
            .any(|l| l.message.contains(&format!("Warehouse load job started: {}", external_id))),
        "logs must note the load job id"
    );

    // Status progression at stage boundaries, in order.
    assert_eq!(
        status_log_sequence(&finished),
        vec!["extracting", "converting", "encoding", "staging", "loading"]
    );

    // Ring-closing: the open boundary was closed, the closed one untouched.
    let staged_uri = finished.staged_uri.clone().expect("staged uri recorded");
    let staged_key = staged_uri.trim_start_matches("mem://geoload-staging/");
    let staged = h
        .store
        .object("geoload-staging", staged_key)
        .expect("staged object exists");
    let staged = String::from_utf8(staged).unwrap();
    assert!(staged.contains("POLYGON((0 0, 1 0, 1 1, 0 0))"), "{}", staged);
    assert!(staged.contains("POLYGON((2 2, 3 2, 2 2))"), "{}", staged);

    // The inferred schema typed the geometry column GEOGRAPHY and went to
    // the warehouse with the load.
    let submissions = h.warehouse.submissions();
    assert_eq!(submissions.len(), 1);
    let schema = submissions[0].schema.as_ref().expect("schema submitted");
    let geometry = schema.iter().find(|f| f.name == "geometry").unwrap();
    assert_eq!(geometry.field_type, FieldType::Geography);
    let area = schema.iter().find(|f| f.name == "area").unwrap();
    assert_eq!(area.field_type, FieldType::Float);
    assert_eq!(area.mode, FieldMode::Required);
}

#[tokio::test(start_paused = true)]
async fn test_local_json_job_uses_inferred_schema() {
    let h = harness(MemoryWarehouse::new());

    let records = br#"[
        { "name": "alpha", "count": 1, "score": 2.5 },
        { "name": "beta", "count": 2, "score": 3 }
    ]"#;

    let config = JobConfig::new(
        SubmitSource::Local {
            file_name: "metrics.json".to_string(),
            bytes: records.to_vec(),
        },
        "acme-gis",
        "geo.metrics",
    );

    let job = h.orchestrator.create_job(config, "user-1").await.unwrap();
    let finished = wait_terminal(&h.orchestrator, &job).await;

    assert_eq!(finished.status, JobStatus::Completed, "{:?}", finished.error_message);
    assert_eq!(finished.record_count, Some(2));

    let submissions = h.warehouse.submissions();
    let schema = submissions[0].schema.as_ref().expect("schema submitted");
    assert_eq!(
        schema.iter().find(|f| f.name == "count").unwrap().field_type,
        FieldType::Integer
    );
    // 2.5 then 3: the upgrade to FLOAT sticks.
    assert_eq!(
        schema.iter().find(|f| f.name == "score").unwrap().field_type,
        FieldType::Float
    );
}

#[tokio::test(start_paused = true)]
async fn test_remote_csv_job_downloads_from_object_store() {
    let h = harness(MemoryWarehouse::new());
    h.store.put_object(
        "uploads",
        "2026-08-06/parcels.csv",
        b"name,zone\nalpha,r1\nbeta,\n".to_vec(),
    );

    let config = JobConfig::new(
        SubmitSource::Remote {
            bucket: "uploads".to_string(),
            path: "2026-08-06/parcels.csv".to_string(),
        },
        "acme-gis",
        "geo.parcels",
    );

    let job = h.orchestrator.create_job(config, "user-1").await.unwrap();
    let finished = wait_terminal(&h.orchestrator, &job).await;

    assert_eq!(finished.status, JobStatus::Completed, "{:?}", finished.error_message);
    assert_eq!(finished.record_count, Some(2));

    let schema = h.warehouse.submissions()[0]
        .schema
        .clone()
        .expect("schema submitted");
    // The empty cell makes the column nullable.
    assert_eq!(
        schema.iter().find(|f| f.name == "zone").unwrap().mode,
        FieldMode::Nullable
    );
}

#[tokio::test(start_paused = true)]
async fn test_empty_input_falls_back_to_warehouse_auto_detect() {
    let h = harness(MemoryWarehouse::new());

    let config = JobConfig::new(
        SubmitSource::Local {
            file_name: "empty.json".to_string(),
            bytes: b"[]".to_vec(),
        },
        "acme-gis",
        "geo.empty",
    );

    let job = h.orchestrator.create_job(config, "user-1").await.unwrap();
    let finished = wait_terminal(&h.orchestrator, &job).await;

    assert_eq!(finished.status, JobStatus::Completed, "{:?}", finished.error_message);
    assert!(h.warehouse.submissions()[0].schema.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_never_finishing_load_times_out_with_a_distinct_message() {
    let h = harness(MemoryWarehouse::with_script(vec![LoadJobStatus::running()]));

    let config = JobConfig::new(
        SubmitSource::Local {
            file_name: "metrics.json".to_string(),
            bytes: br#"[{ "a": 1 }]"#.to_vec(),
        },
        "acme-gis",
        "geo.metrics",
    );

    let job = h.orchestrator.create_job(config, "user-1").await.unwrap();
    let finished = wait_terminal(&h.orchestrator, &job).await;

    assert_eq!(finished.status, JobStatus::Failed);
    let message = finished.error_message.unwrap();
    assert!(message.contains("timed out after 30 attempts"), "{}", message);
    assert!(message.contains("manually"), "{}", message);
    assert!(!message.contains("Warehouse load job failed"), "{}", message);
}

#[tokio::test(start_paused = true)]
async fn test_warehouse_reported_error_becomes_the_job_error() {
    let h = harness(MemoryWarehouse::with_script(vec![
        LoadJobStatus::running(),
        LoadJobStatus::done_with_errors(vec!["Invalid field name: geom".to_string()]),
    ]));

    let config = JobConfig::new(
        SubmitSource::Local {
            file_name: "metrics.json".to_string(),
            bytes: br#"[{ "a": 1 }]"#.to_vec(),
        },
        "acme-gis",
        "geo.metrics",
    );

    let job = h.orchestrator.create_job(config, "user-1").await.unwrap();
    let finished = wait_terminal(&h.orchestrator, &job).await;

    assert_eq!(finished.status, JobStatus::Failed);
    let message = finished.error_message.unwrap();
    assert!(message.contains("Invalid field name: geom"), "{}", message);
}

#[tokio::test(start_paused = true)]
async fn test_transient_poll_failures_do_not_fail_the_job() {
    let h = harness(MemoryWarehouse::new());
    h.warehouse.fail_polls(2);

    let config = JobConfig::new(
        SubmitSource::Local {
            file_name: "metrics.json".to_string(),
            bytes: br#"[{ "a": 1 }]"#.to_vec(),
        },
        "acme-gis",
        "geo.metrics",
    );

    let job = h.orchestrator.create_job(config, "user-1").await.unwrap();
    let finished = wait_terminal(&h.orchestrator, &job).await;

    assert_eq!(finished.status, JobStatus::Completed, "{:?}", finished.error_message);
    assert!(finished
        .logs
        .iter()
        .any(|l| l.message.contains("Failed to check load job status")));
}

#[tokio::test(start_paused = true)]
async fn test_staging_failure_fails_the_job() {
    let h = harness(MemoryWarehouse::new());
    h.store.fail_uploads("bucket unavailable");

    let config = JobConfig::new(
        SubmitSource::Local {
            file_name: "metrics.json".to_string(),
            bytes: br#"[{ "a": 1 }]"#.to_vec(),
        },
        "acme-gis",
        "geo.metrics",
    );

    let job = h.orchestrator.create_job(config, "user-1").await.unwrap();
    let finished = wait_terminal(&h.orchestrator, &job).await;

    assert_eq!(finished.status, JobStatus::Failed);
    assert!(finished.error_message.unwrap().contains("bucket unavailable"));
    assert!(h.warehouse.submissions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_archive_without_primary_file_fails_the_job() {
    let h = harness(MemoryWarehouse::new());

    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    writer
        .start_file("readme.txt", zip::write::FileOptions::default())
        .unwrap();
    writer.write_all(b"no geometry here").unwrap();
    let archive = writer.finish().unwrap().into_inner();

    let config = JobConfig::new(
        SubmitSource::Local {
            file_name: "parcels.zip".to_string(),
            bytes: archive,
        },
        "acme-gis",
        "geo.parcels",
    );

    let job = h.orchestrator.create_job(config, "user-1").await.unwrap();
    let finished = wait_terminal(&h.orchestrator, &job).await;

    assert_eq!(finished.status, JobStatus::Failed);
    assert!(finished.error_message.unwrap().contains(".shp"));
}

#[tokio::test(start_paused = true)]
async fn test_bad_configuration_rejects_creation_outright() {
    let h = harness(MemoryWarehouse::new());

    let config = JobConfig::new(
        SubmitSource::Local {
            file_name: "parcels.zip".to_string(),
            bytes: vec![1],
        },
        "acme-gis",
        "not-a-dataset-table",
    );

    let err = h.orchestrator.create_job(config, "user-1").await.unwrap_err();
    assert!(err.to_string().contains("dataset.table"));

    // No job record was produced for the bad submission.
    assert_eq!(h.orchestrator.stats().total, 0);
    assert!(h.orchestrator.get_jobs("user-1").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_delete_job_cancels_monitoring_and_removes_the_record() {
    let h = harness(MemoryWarehouse::with_script(vec![LoadJobStatus::running()]));

    let config = JobConfig::new(
        SubmitSource::Local {
            file_name: "metrics.json".to_string(),
            bytes: br#"[{ "a": 1 }]"#.to_vec(),
        },
        "acme-gis",
        "geo.metrics",
    );

    let job = h.orchestrator.create_job(config, "user-1").await.unwrap();
    let mut updates = h.orchestrator.subscribe(job.id).expect("job exists");

    // Wait until the job is in its polling phase.
    loop {
        let status = updates.borrow_and_update().status;
        if status == JobStatus::Loading {
            break;
        }
        assert!(!status.is_terminal(), "job ended before reaching loading");
        updates.changed().await.unwrap();
    }

    assert!(h.orchestrator.delete_job(job.id));
    assert!(h.orchestrator.get_job(job.id).is_none());
    assert!(h.orchestrator.subscribe(job.id).is_none());
    assert!(!h.orchestrator.delete_job(job.id));

    // The processing task drops its handle once it notices the
    // cancellation; the watch channel closing proves no further polls are
    // scheduled into the removed record.
    while updates.changed().await.is_ok() {}
}

#[tokio::test(start_paused = true)]
async fn test_get_jobs_lists_newest_first_and_stats_aggregate() {
    let h = harness(MemoryWarehouse::new());

    let first = h
        .orchestrator
        .create_job(
            JobConfig::new(
                SubmitSource::Local {
                    file_name: "a.json".to_string(),
                    bytes: br#"[{ "a": 1 }]"#.to_vec(),
                },
                "acme-gis",
                "geo.a",
            ),
            "user-1",
        )
        .await
        .unwrap();
    wait_terminal(&h.orchestrator, &first).await;

    let second = h
        .orchestrator
        .create_job(
            JobConfig::new(
                SubmitSource::Local {
                    file_name: "b.json".to_string(),
                    bytes: b"not json".to_vec(),
                },
                "acme-gis",
                "geo.b",
            ),
            "user-1",
        )
        .await
        .unwrap();
    wait_terminal(&h.orchestrator, &second).await;

    let jobs = h.orchestrator.get_jobs("user-1");
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].id, second.id);
    assert_eq!(jobs[1].id, first.id);
    assert!(h.orchestrator.get_jobs("someone-else").is_empty());

    let stats = h.orchestrator.stats();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.in_progress, 0);
}

#[tokio::test(start_paused = true)]
async fn test_lookup_load_job_reports_warehouse_status() {
    let h = harness(MemoryWarehouse::new());

    let config = JobConfig::new(
        SubmitSource::Local {
            file_name: "metrics.json".to_string(),
            bytes: br#"[{ "a": 1 }]"#.to_vec(),
        },
        "acme-gis",
        "geo.metrics",
    );

    let job = h.orchestrator.create_job(config, "user-1").await.unwrap();

    // Before submission there is nothing to look up.
    assert!(h.orchestrator.lookup_load_job(job.id).await.is_err());

    let finished = wait_terminal(&h.orchestrator, &job).await;
    assert_eq!(finished.status, JobStatus::Completed);

    let status = h.orchestrator.lookup_load_job(job.id).await.unwrap();
    assert!(status.is_done());
}
