//! End-to-end integration tests for the complete timebook flow.
//!
//! Tests the full pipeline: import → preview → commit → report

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

fn tb_binary() -> String {
    env!("CARGO_BIN_EXE_tb").to_string()
}

/// A scratch home directory with a config file and source exports for June 2025.
struct Fixture {
    temp: TempDir,
    config: PathBuf,
}

impl Fixture {
    fn new(extra_config: &str) -> Self {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("config.toml");
        let db_path = temp.path().join("data").join("tb.db");
        fs::write(
            &config,
            format!(
                "database_path = '{}'\n{extra_config}\n\
                 [cost_units.project_1]\n\
                 label = \"Project 1\"\n\
                 outlook = [\"Project A\"]\n\
                 kapow = [\"alpha\"]\n",
                db_path.display()
            ),
        )
        .unwrap();

        let mut ezeit = String::from("date;time_worked;day_category;comment\n");
        for day in 1..=30 {
            // June 1 2025 is a Sunday.
            if day % 7 == 1 || day % 7 == 0 {
                writeln!(ezeit, "{day:02}.06.2025;;frei;").unwrap();
            } else {
                writeln!(ezeit, "{day:02}.06.2025;08:00;07:48;").unwrap();
            }
        }
        fs::write(temp.path().join("ezeit.csv"), ezeit).unwrap();

        fs::write(
            temp.path().join("outlook.csv"),
            "Betreff,Beginnt am,Beginnt um,Endet am,Endet um,Kategorien\n\
             Standup,02.06.2025,09:00:00,02.06.2025,09:15:00,Project A\n\
             Focus,02.06.2025,10:00:00,02.06.2025,11:00:00,\n\
             Planning,03.06.2025,13:00:00,03.06.2025,14:00:00,Project A\n",
        )
        .unwrap();

        fs::write(
            temp.path().join("kapow.jsonl"),
            r#"{"start":"2025-06-02T14:00:00","end":"2025-06-02T16:00:00","categories":["alpha"],"source":"kapow"}"#,
        )
        .unwrap();

        Self { temp, config }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.temp.path().join(name)
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(tb_binary())
            .env("HOME", self.temp.path())
            .env_remove("XDG_CONFIG_HOME")
            .env_remove("XDG_DATA_HOME")
            .env_remove("RUST_LOG")
            .arg("--config")
            .arg(&self.config)
            .args(args)
            .output()
            .expect("failed to run tb")
    }

    fn import(&self) -> String {
        let ezeit = self.path("ezeit.csv");
        let outlook = self.path("outlook.csv");
        let events = self.path("kapow.jsonl");
        let output = self.run(&[
            "import",
            "--year",
            "2025",
            "--month",
            "6",
            "--ezeit",
            path_str(&ezeit),
            "--outlook",
            path_str(&outlook),
            "--events",
            path_str(&events),
        ]);
        let stdout = success(&output);
        stdout
            .lines()
            .next()
            .and_then(|line| line.strip_prefix("Staged batch "))
            .expect("import should print the batch ID")
            .to_string()
    }
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("temp paths are UTF-8")
}

fn success(output: &Output) -> String {
    assert!(
        output.status.success(),
        "tb should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout.clone()).unwrap()
}

#[test]
fn test_import_preview_commit_report() {
    let fixture = Fixture::new("");
    let batch = fixture.import();

    let preview = success(&fixture.run(&["preview", batch.as_str()]));
    assert!(preview.contains("EZeit: 30 rows"));
    assert!(preview.contains("Outlook: 3 rows"));
    assert!(preview.contains("Kapow: 1 rows"));

    let status = success(&fixture.run(&["status"]));
    assert!(status.contains("Committed: 0 days, 0 events"));
    assert!(status.contains(&batch));

    let commit = success(&fixture.run(&["commit", batch.as_str(), "--year", "2025", "--month", "6"]));
    assert!(commit.contains("EZeit days: 30"));
    assert!(commit.contains("Events: 4"));

    let again = success(&fixture.run(&["commit", batch.as_str(), "--year", "2025", "--month", "6"]));
    assert!(again.contains("Nothing staged"));

    let status = success(&fixture.run(&["status"]));
    assert!(status.contains("Committed: 30 days, 4 events"));
    assert!(status.contains("No pending batches."));

    let json = success(&fixture.run(&["report", "--year", "2025", "--month", "6", "--json"]));
    let rows: serde_json::Value = serde_json::from_str(&json).unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 30);
    let june_2 = &rows[1];
    assert_eq!(june_2["date"], "2025-06-02");
    assert_eq!(june_2["booked_minutes"], 480);
    assert_eq!(june_2["cost_units"]["project_1"], 135);
    assert_eq!(june_2["cost_units"]["default_cost_unit"], 60);
    assert_eq!(june_2["event_minutes"], 195);
    assert_eq!(june_2["default_cost_unit_inkl_non_event_minutes"], 345);

    let text = success(&fixture.run(&["report", "--year", "2025", "--month", "6", "--hours"]));
    assert!(text.contains("Calendar Week 22"));
    assert!(text.contains("Calendar Week 27"));
    assert!(text.contains("Project 1"));
    assert!(text.contains("2.25"));
}

#[test]
fn test_reject_discards_batch() {
    let fixture = Fixture::new("");
    let batch = fixture.import();

    let reject = success(&fixture.run(&["reject", batch.as_str()]));
    assert!(reject.contains("34 staged rows discarded"));

    let preview = fixture.run(&["preview", batch.as_str()]);
    assert!(!preview.status.success());
}

#[test]
fn test_report_fails_on_ambiguous_mapping() {
    let fixture = Fixture::new("");
    fs::write(
        fixture.path("outlook.csv"),
        "Betreff,Beginnt am,Beginnt um,Endet am,Endet um,Kategorien\n\
         Mixed,02.06.2025,09:00:00,02.06.2025,10:00:00,\"Project A; outlook_default\"\n",
    )
    .unwrap();
    let batch = fixture.import();
    success(&fixture.run(&["commit", batch.as_str(), "--year", "2025", "--month", "6"]));

    let report = fixture.run(&["report", "--year", "2025", "--month", "6"]);
    assert!(!report.status.success());
    let stdout = String::from_utf8(report.stdout).unwrap();
    assert!(stdout.contains("AMBIGUOUS COST-UNIT MAPPINGS"));
    assert!(stdout.contains("Project A | outlook_default"));
}

#[test]
fn test_startup_sweep_evicts_expired_batches() {
    let fixture = Fixture::new("cache_max_age_minutes = 0");
    let batch = fixture.import();

    let preview = fixture.run(&["preview", batch.as_str()]);
    assert!(!preview.status.success());
    assert!(String::from_utf8_lossy(&preview.stderr).contains("no EZeit days"));
}

#[test]
fn test_commit_with_wrong_month_is_refused() {
    let fixture = Fixture::new("");
    let batch = fixture.import();

    let commit = fixture.run(&["commit", batch.as_str(), "--year", "2025", "--month", "7"]);
    assert!(!commit.status.success());
    assert!(String::from_utf8_lossy(&commit.stderr).contains("dated outside 2025-07-01 to 2025-07-31"));

    let status = success(&fixture.run(&["status"]));
    assert!(status.contains("Committed: 0 days, 0 events"));
    assert!(status.contains(&batch));
}

#[test]
fn test_listing_committed_records() {
    let fixture = Fixture::new("");
    let batch = fixture.import();
    success(&fixture.run(&["commit", batch.as_str(), "--year", "2025", "--month", "6"]));

    let kapow = success(&fixture.run(&["events", "--source", "kapow"]));
    let lines: Vec<serde_json::Value> = kapow
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["categories"][0], "alpha");
    assert_eq!(lines[0]["source"], "kapow");

    let days = success(&fixture.run(&["days", "--on-work", "--limit", "100"]));
    assert_eq!(days.lines().count(), 21);
}
