//! Integration tests for the engagement store, ingestion and capture
//!
//! These tests drive [`EngagementStore`] against a temporary storage root and
//! use the tool output fixtures in `tests/fixtures/`.

use pentest_notes_core::storage::{read_json, write_json, LockGuard, LockOptions};
use pentest_notes_core::{
    CloseStatus, CommandCapture, EngagementRecord, EngagementStatus, EngagementStore, Error,
    FindingStatus, FindingUpdate, HostDiscovery, HostSection, IndexEntry, NewCommand,
    NewCredential, NewFinding, Service, Severity, TodoPriority,
};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

/// Get the path to a fixture file
fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn setup() -> (TempDir, EngagementStore) {
    let dir = TempDir::new().expect("failed to create temp dir");
    let store = EngagementStore::with_root(dir.path());
    (dir, store)
}

fn finding_with_cvss(cvss: f64) -> NewFinding {
    let mut finding = NewFinding::new("10.0.0.5", "Remote code execution", Severity::Critical);
    finding.cvss = Some(cvss);
    finding
}

/// The index entry must match what the record on disk says.
fn assert_index_matches_record(store: &EngagementStore, id: &str) {
    let record = store.load_engagement(id).expect("record should load");
    let entry = store
        .index()
        .get(id)
        .expect("index should load")
        .expect("index entry should exist");
    assert_eq!(entry, IndexEntry::from(&record));
}

// ============================================
// Lifecycle
// ============================================

#[test]
fn test_test_corp_scenario() {
    let (_dir, store) = setup();
    let record = store
        .create_engagement("Test Corp", vec!["10.0.0.0/24".to_string()], "")
        .unwrap();
    assert!(record.id.ends_with("-test-corp"));
    assert_eq!(record.scope, vec!["10.0.0.0/24".to_string()]);

    let first = store.add_finding(finding_with_cvss(9.8)).unwrap();
    let second = store.add_finding(finding_with_cvss(9.8)).unwrap();
    assert_eq!(first.id, "F-001");
    assert_eq!(second.id, "F-002");

    for note in ["x", "y"] {
        store
            .update_finding(
                "F-001",
                FindingUpdate {
                    notes: Some(note.to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
    }

    let notes = &store.load_active().unwrap().findings["F-001"].notes;
    let x = notes.find('x').expect("first note kept");
    let y = notes.find('y').expect("second note kept");
    assert!(x < y);
}

#[test]
fn test_finding_ids_stay_sequential_with_interleaved_updates() {
    let (_dir, store) = setup();
    store.create_engagement("Acme", Vec::new(), "").unwrap();

    for n in 1..=15 {
        let finding = store
            .add_finding(NewFinding::new("10.0.0.1", format!("issue {n}"), Severity::Low))
            .unwrap();
        assert_eq!(finding.id, format!("F-{:03}", n));
        store
            .update_finding(
                &finding.id,
                FindingUpdate {
                    status: Some(FindingStatus::Exploited),
                    ..Default::default()
                },
            )
            .unwrap();
    }
}

#[test]
fn test_same_target_same_day_gets_suffix() {
    let (_dir, store) = setup();
    let first = store.create_engagement("Test Corp", Vec::new(), "").unwrap();
    let second = store.create_engagement("Test Corp", Vec::new(), "").unwrap();
    let third = store.create_engagement("Test Corp", Vec::new(), "").unwrap();

    assert_eq!(second.id, format!("{}-2", first.id));
    assert_eq!(third.id, format!("{}-3", first.id));
    assert_eq!(
        store.state().active_engagement_id().unwrap().as_deref(),
        Some(third.id.as_str())
    );
}

#[test]
fn test_collision_checks_directories_missing_from_index() {
    let (_dir, store) = setup();
    let first = store.create_engagement("Orphan", Vec::new(), "").unwrap();
    store.index().remove(&first.id).unwrap();

    let second = store.create_engagement("Orphan", Vec::new(), "").unwrap();
    assert_eq!(second.id, format!("{}-2", first.id));
}

#[test]
fn test_close_clears_active_engagement() {
    let (_dir, store) = setup();
    let record = store.create_engagement("Acme", Vec::new(), "").unwrap();
    store
        .discover_host(HostDiscovery::new("10.0.0.5"))
        .unwrap();

    let outcome = store
        .close_engagement(CloseStatus::Completed, Some("Domain admin in two days."))
        .unwrap();
    assert_eq!(outcome.id, record.id);
    assert_eq!(outcome.status, EngagementStatus::Completed);

    assert_eq!(store.state().active_engagement_id().unwrap(), None);
    assert!(matches!(store.engagement_status(), Err(Error::NoActiveEngagement)));
    assert!(matches!(
        store.add_attack_step("too late"),
        Err(Error::NoActiveEngagement)
    ));

    let closed = store.load_engagement(&record.id).unwrap();
    assert_eq!(closed.status, EngagementStatus::Completed);
    assert_eq!(closed.executive_summary, "Domain admin in two days.");
    assert_index_matches_record(&store, &record.id);

    let report = fs::read_to_string(store.paths().report_file(&record.id)).unwrap();
    assert!(report.contains("Domain admin in two days."));
    assert!(store.paths().host_report_file(&record.id, "10.0.0.5").exists());
}

#[test]
fn test_resume_keeps_status_and_counts_open_todos() {
    let (_dir, store) = setup();
    let record = store.create_engagement("Acme", Vec::new(), "").unwrap();
    store.add_todo("kerberoast", Some(TodoPriority::High)).unwrap();
    store.add_todo("check GPP", None).unwrap();
    store.complete_todo("T-002").unwrap();
    store.close_engagement(CloseStatus::Paused, None).unwrap();

    let (resumed, open_todos) = store.resume_engagement(&record.id).unwrap();
    assert_eq!(resumed.status, EngagementStatus::Paused);
    assert_eq!(open_todos, 1);
    assert_eq!(store.engagement_status().unwrap().id, record.id);
}

#[test]
fn test_list_marks_current() {
    let (_dir, store) = setup();
    let first = store.create_engagement("Alpha", Vec::new(), "").unwrap();
    let second = store.create_engagement("Beta", Vec::new(), "").unwrap();

    let listing = store.list_engagements().unwrap();
    assert_eq!(listing.len(), 2);
    let current: Vec<&str> = listing
        .iter()
        .filter(|l| l.is_current)
        .map(|l| l.entry.id.as_str())
        .collect();
    assert_eq!(current, vec![second.id.as_str()]);

    store.resume_engagement(&first.id).unwrap();
    let listing = store.list_engagements().unwrap();
    assert!(listing.iter().any(|l| l.is_current && l.entry.id == first.id));
}

// ============================================
// Merge semantics
// ============================================

#[test]
fn test_rediscovery_with_subset_is_additive() {
    let (_dir, store) = setup();
    store.create_engagement("Acme", Vec::new(), "").unwrap();

    store
        .discover_host(HostDiscovery {
            ip: "10.0.0.5".into(),
            hostname: Some("dc01".into()),
            os: Some("Windows".into()),
            services: vec![
                Service::new(53, "tcp").named("domain"),
                Service::new(445, "tcp").named("microsoft-ds").with_version("SMBv3"),
            ],
        })
        .unwrap();
    let outcome = store
        .discover_host(HostDiscovery {
            ip: "10.0.0.5".into(),
            hostname: Some("other-name".into()),
            os: None,
            services: vec![Service::new(445, "TCP")],
        })
        .unwrap();

    assert!(!outcome.created);
    assert_eq!(outcome.services_added, 0);
    let host = &store.load_active().unwrap().hosts["10.0.0.5"];
    assert_eq!(host.hostname, "dc01");
    assert_eq!(host.os, "Windows");
    assert_eq!(host.services.len(), 2);
    assert_eq!(host.services[1].version, "SMBv3");
}

#[test]
fn test_section_appends_are_retained_in_order() {
    let (_dir, store) = setup();
    store.create_engagement("Acme", Vec::new(), "").unwrap();
    store.discover_host(HostDiscovery::new("10.0.0.5")).unwrap();

    store
        .update_host_section("10.0.0.5", HostSection::PostExploitation, "A")
        .unwrap();
    let host = store
        .update_host_section("10.0.0.5", HostSection::PostExploitation, "B")
        .unwrap();
    assert_eq!(host.sections.post_exploitation, "A\n\nB");

    assert!(matches!(
        store.update_host_section("10.9.9.9", HostSection::Enumeration, "x"),
        Err(Error::HostNotFound(ip)) if ip == "10.9.9.9"
    ));
}

#[test]
fn test_cvss_boundaries_on_add_and_update() {
    let (_dir, store) = setup();
    store.create_engagement("Acme", Vec::new(), "").unwrap();

    for bad in [-0.1, 10.1] {
        assert!(matches!(
            store.add_finding(finding_with_cvss(bad)),
            Err(Error::InvalidCvss(_))
        ));
    }
    store.add_finding(finding_with_cvss(0.0)).unwrap();
    store.add_finding(finding_with_cvss(10.0)).unwrap();

    for (cvss, ok) in [(-0.1, false), (10.1, false), (0.0, true), (10.0, true)] {
        let result = store.update_finding(
            "F-001",
            FindingUpdate {
                cvss: Some(cvss),
                ..Default::default()
            },
        );
        assert_eq!(result.is_ok(), ok, "cvss {cvss}");
    }
    assert_eq!(store.load_active().unwrap().findings.len(), 2);
}

// ============================================
// Evidence and consistency
// ============================================

#[test]
fn test_evidence_overwrite() {
    let (_dir, store) = setup();
    let record = store.create_engagement("Acme", Vec::new(), "").unwrap();

    let first = store.save_evidence("a.txt", b"v1", Some("first")).unwrap();
    assert!(!first.overwritten);
    let second = store.save_evidence("a.txt", b"v2", None).unwrap();
    assert!(second.overwritten);

    let path = store.paths().evidence_dir(&record.id).join("a.txt");
    assert_eq!(fs::read_to_string(path).unwrap(), "v2");

    let record = store.load_active().unwrap();
    assert_eq!(record.evidence_index.len(), 1);
    let entry = &record.evidence_index["a.txt"];
    assert_eq!(entry.size_bytes, 2);
    assert_eq!(entry.sha256, pentest_notes_core::store::sha256_hex(b"v2"));
}

#[test]
fn test_index_counts_track_every_mutation() {
    let (_dir, store) = setup();
    let record = store.create_engagement("Acme", Vec::new(), "").unwrap();
    assert_index_matches_record(&store, &record.id);

    store.discover_host(HostDiscovery::new("10.0.0.5")).unwrap();
    store.discover_host(HostDiscovery::new("10.0.0.6")).unwrap();
    store.add_finding(finding_with_cvss(7.5)).unwrap();
    store
        .add_credential(NewCredential {
            username: "administrator".into(),
            secret: Some("aad3b435b51404ee".into()),
            credential_type: Some("ntlm".into()),
            verified: Some(true),
            ..Default::default()
        })
        .unwrap();
    store.log_command(NewCommand::new("crackmapexec smb 10.0.0.0/24")).unwrap();
    store.log_dead_end("AS-REP roast", "corp.local", "no accounts without preauth").unwrap();
    store.set_executive_summary("In progress").unwrap();

    assert_index_matches_record(&store, &record.id);
    let entry = store.index().get(&record.id).unwrap().unwrap();
    assert_eq!(
        (entry.hosts, entry.findings, entry.credentials, entry.commands),
        (2, 1, 1, 1)
    );
}

#[test]
fn test_record_json_round_trip() {
    let (dir, store) = setup();
    store.create_engagement("Acme", vec!["corp.local".into()], "no phishing").unwrap();
    store
        .discover_host(HostDiscovery {
            ip: "10.0.0.5".into(),
            services: vec![Service::new(3389, "tcp").named("ms-wbt-server")],
            ..Default::default()
        })
        .unwrap();
    store.add_finding(finding_with_cvss(8.1)).unwrap();
    store.add_todo("dump LSASS", None).unwrap();
    store.add_attack_step("RDP with reused local admin").unwrap();
    let record = store.load_active().unwrap();

    let path = dir.path().join("copy.json");
    write_json(&path, &record).unwrap();
    let back: EngagementRecord = read_json(&path, record.clone()).unwrap();
    assert_eq!(back, record);
}

#[test]
fn test_attack_path_and_status_summary() {
    let (_dir, store) = setup();
    store.create_engagement("Acme", Vec::new(), "").unwrap();
    for i in 1..=6 {
        let step = store.add_attack_step(&format!("step {i}")).unwrap();
        assert_eq!(step.step, i);
    }

    let summary = store.engagement_status().unwrap();
    assert_eq!(summary.recent_attack_path.len(), 5);
    assert_eq!(summary.recent_attack_path[0].step, 2);
    assert_eq!(summary.findings_by_severity.len(), 5);
}

// ============================================
// Locking
// ============================================

#[test]
fn test_held_index_lock_times_out_mutation() {
    let dir = TempDir::new().unwrap();
    let options = LockOptions {
        retries: 3,
        min_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(2),
        ..Default::default()
    };
    let store = EngagementStore::new(
        pentest_notes_core::storage::StoragePaths::new(dir.path()),
        options.clone(),
        Box::new(pentest_notes_core::MarkdownRenderer::new()),
    );
    store.create_engagement("Acme", Vec::new(), "").unwrap();

    let _held = LockGuard::acquire(&store.paths().lock_file(), &options).unwrap();
    let err = store.add_todo("blocked", None).unwrap_err();
    assert!(matches!(err, Error::LockTimeout { attempts: 3, .. }));
}

#[test]
fn test_stale_index_lock_is_reclaimed() {
    let (_dir, store) = setup();
    store.create_engagement("Acme", Vec::new(), "").unwrap();

    let lock = store.paths().lock_file();
    let file = fs::File::create(&lock).unwrap();
    file.set_modified(std::time::SystemTime::now() - Duration::from_secs(120))
        .unwrap();
    drop(file);

    store.add_todo("after crash", None).unwrap();
    assert!(!lock.exists());
}

#[test]
fn test_evidence_matches_record_when_index_lock_times_out() {
    let dir = TempDir::new().unwrap();
    let options = LockOptions {
        retries: 2,
        min_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(2),
        ..Default::default()
    };
    let store = EngagementStore::new(
        pentest_notes_core::storage::StoragePaths::new(dir.path()),
        options.clone(),
        Box::new(pentest_notes_core::MarkdownRenderer::new()),
    );
    let record = store.create_engagement("Acme", Vec::new(), "").unwrap();
    store.save_evidence("a.txt", b"v1", None).unwrap();

    let held = LockGuard::acquire(&store.paths().lock_file(), &options).unwrap();
    assert!(store.save_evidence("a.txt", b"version two", None).is_err());
    drop(held);

    let on_disk = fs::read(store.paths().evidence_dir(&record.id).join("a.txt")).unwrap();
    let entry = &store.load_active().unwrap().evidence_index["a.txt"];
    assert_eq!(entry.sha256, pentest_notes_core::store::sha256_hex(&on_disk));
    assert_eq!(entry.size_bytes, on_disk.len() as u64);
}

#[test]
fn test_resume_rejects_ids_outside_engagements_dir() {
    let (dir, store) = setup();
    let outside = EngagementRecord::new("planted", "Elsewhere", Vec::new(), "", chrono::Utc::now());
    write_json(&dir.path().join("planted").join("engagement.json"), &outside).unwrap();

    assert!(matches!(
        store.resume_engagement("../planted"),
        Err(Error::InvalidEngagementId(id)) if id == "../planted"
    ));
    assert!(matches!(
        store.load_engagement("..\\planted"),
        Err(Error::InvalidEngagementId(_))
    ));
    assert_eq!(store.state().active_engagement_id().unwrap(), None);
}

// ============================================
// Ingestion
// ============================================

#[test]
fn test_ingest_nmap_fixture() {
    let (_dir, store) = setup();
    let record = store.create_engagement("Corp", Vec::new(), "").unwrap();

    let report = store
        .ingest_file("NMAP", &fixture_path("nmap-corp.txt"))
        .expect("ingest should succeed");
    assert_eq!(report.tool, "nmap");
    assert_eq!(report.hosts_discovered, 2);
    assert_eq!(report.hosts_created, 2);
    assert_eq!(report.services_added, 6);
    assert_eq!(report.findings_added, 0);
    assert!(report.evidence_file.starts_with("nmap-"));
    assert!(report.evidence_file.ends_with("-nmap-corp.txt"));

    let active = store.load_active().unwrap();
    assert_eq!(active.hosts["10.0.0.5"].hostname, "dc01.corp.local");
    assert_eq!(active.hosts["10.0.0.7"].os, "Linux 5.0 - 5.14");
    let evidence = store
        .paths()
        .evidence_dir(&record.id)
        .join(&report.evidence_file);
    assert_eq!(
        fs::read(evidence).unwrap(),
        fs::read(fixture_path("nmap-corp.txt")).unwrap()
    );
    assert!(store.paths().host_report_file(&record.id, "10.0.0.7").exists());

    // Same scan again adds nothing new
    let again = store.ingest_file("nmap", &fixture_path("nmap-corp.txt")).unwrap();
    assert_eq!(again.hosts_created, 0);
    assert_eq!(again.services_added, 0);
    assert_index_matches_record(&store, &record.id);
}

#[test]
fn test_ingest_nuclei_fixture() {
    let (_dir, store) = setup();
    store.create_engagement("Corp", Vec::new(), "").unwrap();
    store.ingest_file("nmap", &fixture_path("nmap-corp.txt")).unwrap();

    let report = store
        .ingest_file("nuclei", &fixture_path("nuclei-corp.jsonl"))
        .unwrap();
    assert_eq!(report.findings_added, 3);
    assert_eq!(report.hosts_created, 0);
    assert_eq!(report.warnings.len(), 1, "truncated last line: {:?}", report.warnings);

    let record = store.load_active().unwrap();
    let traversal = record
        .findings
        .values()
        .find(|f| f.title.contains("Path Traversal"))
        .unwrap();
    assert_eq!(traversal.severity, Severity::High);
    assert_eq!(traversal.cvss, Some(7.5));
    assert_eq!(traversal.status, FindingStatus::Potential);
    assert_eq!(traversal.evidence.as_deref(), Some(report.evidence_file.as_str()));
    // Nuclei's port 80 merged into the nmap-discovered service
    assert_eq!(record.hosts["10.0.0.7"].services.len(), 2);
    assert_eq!(record.hosts["10.0.0.7"].services[1].version, "Apache httpd 2.4.52 ((Ubuntu))");
}

#[test]
fn test_ingest_same_file_name_keeps_both_outputs() {
    let (dir, store) = setup();
    let record = store.create_engagement("Corp", Vec::new(), "").unwrap();

    let scan = |sub: &str, ip: &str| {
        let path = dir.path().join(sub).join("scan.txt");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            format!("Nmap scan report for {ip}\nPORT   STATE SERVICE\n22/tcp open  ssh\n"),
        )
        .unwrap();
        path
    };
    let first_path = scan("a", "10.0.0.1");
    let second_path = scan("b", "10.0.0.2");

    let first = store.ingest_file("nmap", &first_path).unwrap();
    let second = store.ingest_file("nmap", &second_path).unwrap();
    assert_ne!(first.evidence_file, second.evidence_file);

    let active = store.load_active().unwrap();
    assert_eq!(active.evidence_index.len(), 2);
    let evidence_dir = store.paths().evidence_dir(&record.id);
    assert_eq!(
        fs::read(evidence_dir.join(&first.evidence_file)).unwrap(),
        fs::read(&first_path).unwrap()
    );
    assert_eq!(
        fs::read(evidence_dir.join(&second.evidence_file)).unwrap(),
        fs::read(&second_path).unwrap()
    );
}

#[test]
fn test_ingest_errors() {
    let (dir, store) = setup();
    assert!(matches!(
        store.ingest_file("nmap", &fixture_path("nmap-corp.txt")),
        Err(Error::NoActiveEngagement)
    ));

    store.create_engagement("Corp", Vec::new(), "").unwrap();
    assert!(matches!(
        store.ingest_file("masscan", &fixture_path("nmap-corp.txt")),
        Err(Error::UnsupportedTool(tool)) if tool == "masscan"
    ));
    let missing = dir.path().join("missing.txt");
    assert!(matches!(
        store.ingest_file("nmap", &missing),
        Err(Error::FileNotFound(path)) if path == missing
    ));
    assert!(store.load_active().unwrap().evidence_index.is_empty());
}

// ============================================
// Capture and repair
// ============================================

#[test]
fn test_capture_with_ingest() {
    let (_dir, store) = setup();
    let record = store.create_engagement("Corp", Vec::new(), "").unwrap();

    let mut capture = CommandCapture::new("/usr/bin/nmap -sV -oN scan.txt 10.0.0.0/24");
    capture.exit_code = Some(0);
    capture.duration_ms = Some(60_000);
    capture.output = Some(fixture_path("nmap-corp.txt"));
    capture.ingest = true;

    let outcome = store.capture_command(capture).unwrap();
    assert_eq!(outcome.command.id, "CMD-001");
    assert_eq!(outcome.command.tool, "nmap");
    assert_eq!(outcome.command.evidence.as_deref(), Some("cmd-001-nmap.log"));
    assert!(outcome.evidence.is_some());
    assert_eq!(outcome.ingest.as_ref().unwrap().hosts_created, 2);
    assert!(outcome.ingest_skipped.is_none());

    let active = store.load_active().unwrap();
    assert_eq!(active.command_log.len(), 1);
    assert_eq!(active.evidence_index.len(), 2);
    assert!(store
        .paths()
        .evidence_dir(&record.id)
        .join("cmd-001-nmap.log")
        .exists());
}

#[test]
fn test_capture_unknown_tool_skips_ingest() {
    let (_dir, store) = setup();
    store.create_engagement("Corp", Vec::new(), "").unwrap();

    let mut capture = CommandCapture::new("gobuster dir -u http://10.0.0.7");
    capture.output = Some(fixture_path("nmap-corp.txt"));
    capture.ingest = true;

    let outcome = store.capture_command(capture).unwrap();
    assert!(outcome.ingest.is_none());
    assert_eq!(
        outcome.ingest_skipped.as_deref(),
        Some("no parser for tool 'gobuster'")
    );
    assert_eq!(
        outcome.command.source,
        pentest_notes_core::CommandSource::LogWrapper
    );
}

#[test]
fn test_capture_keeps_command_when_ingest_fails() {
    let (dir, store) = setup();
    let record = store.create_engagement("Corp", Vec::new(), "").unwrap();
    let xml = dir.path().join("scan.xml");
    fs::write(&xml, "<?xml version=\"1.0\"?>\n<nmaprun></nmaprun>\n").unwrap();

    let mut capture = CommandCapture::new("nmap -oX scan.xml 10.0.0.1");
    capture.output = Some(xml);
    capture.ingest = true;

    let outcome = store.capture_command(capture).expect("logging should survive a parse error");
    assert!(outcome.ingest.is_none());
    let reason = outcome.ingest_skipped.unwrap();
    assert!(reason.starts_with("ingest failed:"), "got {reason}");

    let active = store.load_active().unwrap();
    assert_eq!(active.command_log.len(), 1);
    assert_eq!(active.evidence_index.len(), 1);
    assert!(store
        .paths()
        .evidence_dir(&record.id)
        .join("cmd-001-nmap.log")
        .exists());
}

#[test]
fn test_reconcile_index_repairs_drift() {
    let (_dir, store) = setup();
    let kept = store.create_engagement("Kept", Vec::new(), "").unwrap();
    let gone = store.create_engagement("Gone", Vec::new(), "").unwrap();
    store.add_todo("x", None).unwrap();

    // Stale counts for one, detail record deleted for the other
    let mut stale = IndexEntry::from(&kept);
    stale.findings = 42;
    store.index().upsert(stale).unwrap();
    fs::remove_dir_all(store.paths().engagement_dir(&gone.id)).unwrap();

    let report = store.reconcile_index().unwrap();
    assert_eq!(report.refreshed, 1);
    assert_eq!(report.removed, vec![gone.id.clone()]);
    assert!(report.skipped.is_empty());

    let entries = store.index().load().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].findings, 0);
    assert_index_matches_record(&store, &kept.id);
}
