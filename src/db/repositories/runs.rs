use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    helpers::{parse_datetime, parse_optional_datetime, parse_status, to_i64, to_u64},
    models::{RunRecord, RunStatus},
    Database,
};
use crate::energy::EnergyUsage;

const RUN_COLUMNS: &str = "id, script, epochs, work_units, status, exit_code, manifest_path, \
     started_at, stopped_at, elapsed_secs, total_kwh, co2_emissions_kg, wh_per_unit, replay_of, \
     created_at, updated_at";

fn row_to_run(row: &Row) -> Result<RunRecord> {
    let epochs: i64 = row.get("epochs")?;
    let work_units: Option<i64> = row.get("work_units")?;
    let status: String = row.get("status")?;
    let started_at: String = row.get("started_at")?;
    let stopped_at: Option<String> = row.get("stopped_at")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(RunRecord {
        id: row.get("id")?,
        script: row.get("script")?,
        epochs: u32::try_from(to_u64(epochs, "epochs")?)?,
        work_units: work_units.map(|w| to_u64(w, "work_units")).transpose()?,
        status: parse_status(&status)?,
        exit_code: row.get("exit_code")?,
        manifest_path: row.get("manifest_path")?,
        started_at: parse_datetime(&started_at, "started_at")?,
        stopped_at: parse_optional_datetime(stopped_at, "stopped_at")?,
        elapsed_secs: row.get("elapsed_secs")?,
        total_kwh: row.get("total_kwh")?,
        co2_emissions_kg: row.get("co2_emissions_kg")?,
        wh_per_unit: row.get("wh_per_unit")?,
        replay_of: row.get("replay_of")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

impl Database {
    pub fn insert_run(&self, run: &RunRecord) -> Result<()> {
        let record = run.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO runs (id, script, epochs, work_units, status, exit_code, manifest_path,
                                   started_at, stopped_at, elapsed_secs, total_kwh, co2_emissions_kg,
                                   wh_per_unit, replay_of, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                params![
                    record.id,
                    record.script,
                    i64::from(record.epochs),
                    record.work_units.map(to_i64).transpose()?,
                    record.status.as_str(),
                    record.exit_code,
                    record.manifest_path,
                    record.started_at.to_rfc3339(),
                    record.stopped_at.as_ref().map(|dt| dt.to_rfc3339()),
                    record.elapsed_secs,
                    record.total_kwh,
                    record.co2_emissions_kg,
                    record.wh_per_unit,
                    record.replay_of,
                    record.created_at.to_rfc3339(),
                    record.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// Closes a run with its final status and measured usage.
    pub fn finish_run(
        &self,
        run_id: &str,
        status: RunStatus,
        exit_code: Option<i32>,
        usage: &EnergyUsage,
        stopped_at: DateTime<Utc>,
    ) -> Result<()> {
        let run_id = run_id.to_string();
        let usage = usage.clone();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE runs
                 SET status = ?1,
                     exit_code = ?2,
                     stopped_at = ?3,
                     elapsed_secs = ?4,
                     total_kwh = ?5,
                     co2_emissions_kg = ?6,
                     wh_per_unit = ?7,
                     updated_at = ?8
                 WHERE id = ?9",
                params![
                    status.as_str(),
                    exit_code,
                    stopped_at.to_rfc3339(),
                    usage.elapsed_secs,
                    usage.total_kwh,
                    usage.co2_emissions_kg,
                    usage.wh_per_unit,
                    Utc::now().to_rfc3339(),
                    run_id,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>> {
        let run_id = run_id.to_string();
        self.execute(move |conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = ?1"))?;
            let run = stmt
                .query_row(params![run_id], |row| Ok(row_to_run(row)))
                .optional()?
                .transpose()?;
            Ok(run)
        })
    }

    /// Marks runs still flagged `Running` as `Interrupted`. Only one run is
    /// active per process, so anything `Running` at startup belonged to a
    /// process that died.
    pub fn mark_incomplete_runs_interrupted(&self, now: DateTime<Utc>) -> Result<usize> {
        self.execute(move |conn| {
            let updated = conn.execute(
                "UPDATE runs
                 SET status = ?1,
                     stopped_at = COALESCE(stopped_at, ?2),
                     updated_at = ?2
                 WHERE status = ?3",
                params![
                    RunStatus::Interrupted.as_str(),
                    now.to_rfc3339(),
                    RunStatus::Running.as_str(),
                ],
            )?;
            Ok(updated)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_run(id: &str, replay_of: Option<&str>) -> RunRecord {
        let now = Utc::now();
        RunRecord {
            id: id.into(),
            script: "train.py".into(),
            epochs: 3,
            work_units: Some(15_000),
            status: RunStatus::Running,
            exit_code: None,
            manifest_path: format!(".gapwatch/runs/{id}.jsonld"),
            started_at: now,
            stopped_at: None,
            elapsed_secs: 0.0,
            total_kwh: 0.0,
            co2_emissions_kg: 0.0,
            wh_per_unit: None,
            replay_of: replay_of.map(String::from),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn insert_finish_and_fetch_run() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("state/gapwatch.sqlite3")).unwrap();

        db.insert_run(&sample_run("run-1", None)).unwrap();
        let usage = EnergyUsage {
            total_kwh: 0.002,
            co2_emissions_kg: 0.000508,
            wh_per_unit: Some(0.002 * 1000.0 / 15_000.0),
            elapsed_secs: 48.0,
        };
        db.finish_run("run-1", RunStatus::Completed, Some(0), &usage, Utc::now())
            .unwrap();

        let run = db.get_run("run-1").unwrap().expect("run exists");
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.exit_code, Some(0));
        assert_eq!(run.epochs, 3);
        assert_eq!(run.work_units, Some(15_000));
        assert_eq!(run.usage(), usage);
        assert!(run.stopped_at.is_some());
    }

    #[test]
    fn unknown_run_is_none() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("gapwatch.sqlite3")).unwrap();
        assert!(db.get_run("missing").unwrap().is_none());
    }

    #[test]
    fn replay_links_to_original() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("gapwatch.sqlite3")).unwrap();
        db.insert_run(&sample_run("original", None)).unwrap();
        db.insert_run(&sample_run("again", Some("original"))).unwrap();

        let replay = db.get_run("again").unwrap().unwrap();
        assert_eq!(replay.replay_of.as_deref(), Some("original"));
    }

    #[test]
    fn running_runs_are_interrupted_on_recovery() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("gapwatch.sqlite3")).unwrap();
        db.insert_run(&sample_run("crashed", None)).unwrap();

        assert_eq!(db.mark_incomplete_runs_interrupted(Utc::now()).unwrap(), 1);
        let run = db.get_run("crashed").unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Interrupted);
        assert!(run.stopped_at.is_some());

        assert_eq!(db.mark_incomplete_runs_interrupted(Utc::now()).unwrap(), 0);
    }

    #[test]
    fn reopening_keeps_runs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gapwatch.sqlite3");
        {
            let db = Database::new(path.clone()).unwrap();
            db.insert_run(&sample_run("kept", None)).unwrap();
        }
        let db = Database::new(path).unwrap();
        assert!(db.get_run("kept").unwrap().is_some());
    }
}
