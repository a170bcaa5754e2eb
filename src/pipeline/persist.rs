// Outcome recorder.
//
// Writes one artifact per stop under `<class>/<STOP>.json` and appends one
// tab-separated line per outcome to `<class>.txt`. The three aggregate logs are
// shared by every in-flight stop, so each is guarded by its own async mutex and
// a line is written with a single `write_all`.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use super::OutcomeClass;
use crate::schema::ResolvedStop;

/// What gets written for a classified stop.
#[derive(Debug, Clone, Copy)]
pub enum Artifact<'a> {
    /// A resolved record; success when it carries coordinates, failure otherwise.
    Resolved(&'a ResolvedStop),
    /// The error message of a stop that raised.
    Fatal(&'a str),
}

impl Artifact<'_> {
    #[must_use]
    pub fn class(&self) -> OutcomeClass {
        match self {
            Self::Resolved(record) if record.coordinates().is_some() => OutcomeClass::Success,
            Self::Resolved(_) => OutcomeClass::Failure,
            Self::Fatal(_) => OutcomeClass::Fatal,
        }
    }
}

/// Append-only log file, opened lazily on first write.
struct AppendLog {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl AppendLog {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            file: Mutex::new(None),
        }
    }

    async fn append(&self, line: &str) -> io::Result<()> {
        let mut guard = self.file.lock().await;
        if guard.is_none() {
            let opened = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            *guard = Some(opened);
        }
        let file = guard
            .as_mut()
            .ok_or_else(|| io::Error::other("append log is closed"))?;

        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}

pub struct OutcomeRecorder {
    root: PathBuf,
    success_log: AppendLog,
    failure_log: AppendLog,
    fatal_log: AppendLog,
}

impl OutcomeRecorder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let log_path = |class: OutcomeClass| root.join(format!("{class}.txt"));

        Self {
            success_log: AppendLog::new(log_path(OutcomeClass::Success)),
            failure_log: AppendLog::new(log_path(OutcomeClass::Failure)),
            fatal_log: AppendLog::new(log_path(OutcomeClass::Fatal)),
            root,
        }
    }

    /// Creates the output root and one directory per outcome class.
    pub async fn prepare(&self) -> io::Result<()> {
        for class in [
            OutcomeClass::Success,
            OutcomeClass::Failure,
            OutcomeClass::Fatal,
        ] {
            fs::create_dir_all(self.root.join(class.as_str())).await?;
        }
        Ok(())
    }

    #[must_use]
    pub fn artifact_path(&self, class: OutcomeClass, stop: &str) -> PathBuf {
        self.root.join(class.as_str()).join(format!("{stop}.json"))
    }

    #[must_use]
    pub fn log_path(&self, class: OutcomeClass) -> &Path {
        &self.log(class).path
    }

    /// Whether a previous run already resolved this stop successfully.
    ///
    /// Only the file's existence matters; its content is never read.
    pub async fn has_success(&self, stop: &str) -> io::Result<bool> {
        fs::try_exists(self.artifact_path(OutcomeClass::Success, stop)).await
    }

    /// Appends the aggregate line and overwrites the per-stop artifact.
    ///
    /// Returns the line that was appended.
    pub async fn record(&self, stop: &str, artifact: Artifact<'_>) -> io::Result<String> {
        let class = artifact.class();
        let (line, contents) = match artifact {
            Artifact::Resolved(record) => {
                let line = format!(
                    "{stop}\t{}\t{}\t\n",
                    format_coordinate(record.lat()),
                    format_coordinate(record.lng())
                );
                let json = serde_json::to_string_pretty(record).map_err(io::Error::other)?;
                (line, json)
            }
            Artifact::Fatal(message) => (
                format!("{stop}\t{}\t\n", single_line(message)),
                message.to_string(),
            ),
        };

        self.log(class).append(&line).await?;

        let path = self.artifact_path(class, stop);
        fs::write(&path, contents).await?;
        debug!(stop, class = %class, path = %path.display(), "outcome recorded");

        Ok(line)
    }

    fn log(&self, class: OutcomeClass) -> &AppendLog {
        match class {
            OutcomeClass::Success => &self.success_log,
            OutcomeClass::Failure => &self.failure_log,
            OutcomeClass::Fatal => &self.fatal_log,
        }
    }
}

impl std::fmt::Debug for OutcomeRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutcomeRecorder")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

/// Keeps a message inside one tab-separated field.
fn single_line(message: &str) -> String {
    message.replace(['\n', '\r', '\t'], " ")
}

/// Null coordinates render as empty fields.
fn format_coordinate(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::validate::Coordinates;
    use crate::schema::StopRecord;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn record(x: &str, y: &str) -> StopRecord {
        StopRecord {
            valid: true,
            x: Some(json!(x)),
            y: Some(json!(y)),
            paradero: Some("PA1".to_string()),
            nomett: Some("Alameda".to_string()),
            ..StopRecord::default()
        }
    }

    async fn prepared() -> (TempDir, OutcomeRecorder) {
        let dir = TempDir::new().expect("temp dir");
        let recorder = OutcomeRecorder::new(dir.path());
        recorder.prepare().await.expect("prepare");
        (dir, recorder)
    }

    #[tokio::test]
    async fn success_writes_line_and_pretty_record() {
        let (_dir, recorder) = prepared().await;
        let resolved = ResolvedStop::new(
            record("-33.45", "-70.66"),
            None,
            Coordinates::new(-33.45, -70.66),
        );

        let line = recorder
            .record("PA1", Artifact::Resolved(&resolved))
            .await
            .expect("record");

        assert_eq!(line, "PA1\t-33.45\t-70.66\t\n");
        let log = fs::read_to_string(recorder.log_path(OutcomeClass::Success))
            .await
            .expect("log");
        assert_eq!(log, line);

        let written = fs::read_to_string(recorder.artifact_path(OutcomeClass::Success, "PA1"))
            .await
            .expect("artifact");
        assert!(written.contains("\n  \"valid\": true"));
        let value: Value = serde_json::from_str(&written).expect("json");
        assert_eq!(value["lat"], json!(-33.45));
        assert_eq!(value["lng"], json!(-70.66));
    }

    #[tokio::test]
    async fn failure_renders_null_coordinates_as_empty_fields() {
        let (_dir, recorder) = prepared().await;
        let resolved = ResolvedStop::new(record("0", "0"), None, None);

        let line = recorder
            .record("PA2", Artifact::Resolved(&resolved))
            .await
            .expect("record");

        assert_eq!(line, "PA2\t\t\t\n");
        let value: Value = serde_json::from_str(
            &fs::read_to_string(recorder.artifact_path(OutcomeClass::Failure, "PA2"))
                .await
                .expect("artifact"),
        )
        .expect("json");
        assert_eq!(value["lat"], Value::Null);
        assert_eq!(value["lng"], Value::Null);
        assert!(
            !fs::try_exists(recorder.artifact_path(OutcomeClass::Success, "PA2"))
                .await
                .expect("exists check")
        );
    }

    #[tokio::test]
    async fn fatal_writes_raw_message_text() {
        let (_dir, recorder) = prepared().await;

        let line = recorder
            .record("PA3", Artifact::Fatal("connection reset \"by peer\""))
            .await
            .expect("record");

        assert_eq!(line, "PA3\tconnection reset \"by peer\"\t\n");
        let written = fs::read_to_string(recorder.artifact_path(OutcomeClass::Fatal, "PA3"))
            .await
            .expect("artifact");
        assert_eq!(written, "connection reset \"by peer\"");
    }

    #[tokio::test]
    async fn fatal_line_stays_on_one_line_while_artifact_keeps_raw_text() {
        let (_dir, recorder) = prepared().await;
        let message = "status 503: <html>\n<body>\tdown\r\n</body>";

        let line = recorder
            .record("PA6", Artifact::Fatal(message))
            .await
            .expect("record");

        assert_eq!(line, "PA6\tstatus 503: <html> <body> down  </body>\t\n");
        let log = fs::read_to_string(recorder.log_path(OutcomeClass::Fatal))
            .await
            .expect("log");
        assert_eq!(log.lines().count(), 1);
        assert_eq!(log.trim_end_matches('\n').split('\t').count(), 3);
        let written = fs::read_to_string(recorder.artifact_path(OutcomeClass::Fatal, "PA6"))
            .await
            .expect("artifact");
        assert_eq!(written, message);
    }

    #[tokio::test]
    async fn artifacts_are_overwritten_while_logs_accumulate() {
        let (_dir, recorder) = prepared().await;

        recorder
            .record("PA4", Artifact::Fatal("first"))
            .await
            .expect("first");
        recorder
            .record("PA4", Artifact::Fatal("second"))
            .await
            .expect("second");

        let log = fs::read_to_string(recorder.log_path(OutcomeClass::Fatal))
            .await
            .expect("log");
        assert_eq!(log, "PA4\tfirst\t\nPA4\tsecond\t\n");
        let written = fs::read_to_string(recorder.artifact_path(OutcomeClass::Fatal, "PA4"))
            .await
            .expect("artifact");
        assert_eq!(written, "second");
    }

    #[tokio::test]
    async fn has_success_only_looks_at_success_artifacts() {
        let (_dir, recorder) = prepared().await;
        recorder
            .record("PA5", Artifact::Fatal("boom"))
            .await
            .expect("record");
        assert!(!recorder.has_success("PA5").await.expect("check"));

        let resolved = ResolvedStop::new(record("1", "2"), None, Coordinates::new(1.0, 2.0));
        recorder
            .record("PA5", Artifact::Resolved(&resolved))
            .await
            .expect("record");
        assert!(recorder.has_success("PA5").await.expect("check"));
    }

    #[tokio::test]
    async fn concurrent_appends_never_interleave_lines() {
        let (_dir, recorder) = prepared().await;
        let recorder = Arc::new(recorder);

        let mut handles = Vec::new();
        for index in 0..32 {
            let recorder = Arc::clone(&recorder);
            handles.push(tokio::spawn(async move {
                let stop = format!("S{index}");
                let message = format!("error number {index} {}", "x".repeat(512));
                recorder.record(&stop, Artifact::Fatal(&message)).await
            }));
        }
        for handle in handles {
            handle.await.expect("join").expect("record");
        }

        let log = fs::read_to_string(recorder.log_path(OutcomeClass::Fatal))
            .await
            .expect("log");
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 32);
        for line in lines {
            let fields: Vec<&str> = line.split('\t').collect();
            assert_eq!(fields.len(), 3, "malformed line: {line}");
            assert!(fields[0].starts_with('S'));
            assert!(fields[1].starts_with("error number "));
        }
    }
}
