//! Results sinks: where a finished session's trial log goes.
//!
//! | Sink | Target |
//! |------|--------|
//! | [`MemorySink`] | In-process list (tests, simulation) |
//! | [`JsonFileSink`] | One JSON document per user under a directory |
//! | [`SupabaseSink`] | PostgREST `PATCH` of the user's row in the results table |
//!
//! Sinks are synchronous; async callers run them on a blocking thread.
//! A sink is called at most once per session by [`crate::aggregator`].

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::constants::PLACEHOLDER_SUPABASE_URL;
use crate::types::{Group, ResultsPayload, Session};

#[derive(Debug, Error)]
pub enum SinkError {
    /// Sink cannot be used as deployed; shown to the participant verbatim.
    #[error("{0}")]
    NotConfigured(String),
    #[error("failed to write results: {0}")]
    Io(#[from] io::Error),
    #[error("failed to encode results: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("request to results store failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("results store rejected the update (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("results store unavailable: {0}")]
    Unavailable(String),
}

pub trait ResultsSink: Send + Sync {
    fn submit(&self, session: &Session, payload: &ResultsPayload) -> Result<(), SinkError>;
}

/// Row update written for a completed second test phase.
#[derive(Serialize)]
struct CompletionUpdate<'a> {
    results_part2: &'a ResultsPayload,
    status: &'static str,
}

const COMPLETED: &str = "completed";

// ── Memory ──────────────────────────────────────────────────────────

/// Keeps every submission in memory. Optionally fails every call.
#[derive(Debug, Default)]
pub struct MemorySink {
    submissions: Mutex<Vec<(Session, ResultsPayload)>>,
    failure: Option<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every call fails with `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            submissions: Mutex::new(Vec::new()),
            failure: Some(reason.into()),
        }
    }

    /// Number of submit calls, failed ones included.
    pub fn calls(&self) -> usize {
        self.lock().len()
    }

    pub fn submissions(&self) -> Vec<(Session, ResultsPayload)> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(Session, ResultsPayload)>> {
        self.submissions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ResultsSink for MemorySink {
    fn submit(&self, session: &Session, payload: &ResultsPayload) -> Result<(), SinkError> {
        self.lock().push((session.clone(), payload.clone()));
        match &self.failure {
            Some(reason) => Err(SinkError::Unavailable(reason.clone())),
            None => Ok(()),
        }
    }
}

// ── JSON files ──────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserRecord<'a> {
    user_id: &'a str,
    referrer: &'a str,
    group: Group,
    #[serde(flatten)]
    update: CompletionUpdate<'a>,
}

/// Writes `<dir>/<user_id>.json`, replacing any earlier file for that user.
#[derive(Clone, Debug)]
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, user_id: &str) -> PathBuf {
        let safe: String = user_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }
}

impl ResultsSink for JsonFileSink {
    fn submit(&self, session: &Session, payload: &ResultsPayload) -> Result<(), SinkError> {
        fs::create_dir_all(&self.dir)?;
        let record = UserRecord {
            user_id: &session.user_id,
            referrer: &session.referrer,
            group: session.group,
            update: CompletionUpdate {
                results_part2: payload,
                status: COMPLETED,
            },
        };
        let bytes = serde_json::to_vec_pretty(&record)?;
        let path = self.path_for(&session.user_id);
        write_atomic(&path, &bytes)?;
        debug!(path = %path.display(), bytes = bytes.len(), "results written");
        Ok(())
    }
}

/// Write to a sibling temp file, then rename over the target.
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(&tmp, path)
}

// ── Supabase ────────────────────────────────────────────────────────

/// Updates the participant's row (`user_id = eq.<id>`) created by the first
/// test phase.
#[derive(Clone, Debug)]
pub struct SupabaseSink {
    url: String,
    key: String,
    table: String,
    timeout: Duration,
}

impl SupabaseSink {
    pub fn new(url: impl Into<String>, key: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            key: key.into(),
            table: table.into(),
            timeout: Duration::from_secs(15),
        }
    }

    /// A usable URL is non-empty, not the template placeholder, and https.
    pub fn is_configured(&self) -> bool {
        !self.url.is_empty() && self.url != PLACEHOLDER_SUPABASE_URL && self.url.starts_with("https://")
    }

    /// Table endpoint; the row filter travels as an encoded query pair.
    pub fn endpoint(&self) -> String {
        format!("{}/rest/v1/{}", self.url, self.table)
    }

    /// The `PATCH` updating `session`'s row. The user id is caller-supplied,
    /// so it is form-encoded rather than spliced into the URL.
    pub fn build_request(
        &self,
        client: &reqwest::blocking::Client,
        session: &Session,
        payload: &ResultsPayload,
    ) -> Result<reqwest::blocking::Request, SinkError> {
        let request = client
            .patch(self.endpoint())
            .query(&[("user_id", format!("eq.{}", session.user_id))])
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
            .header("Prefer", "return=minimal")
            .json(&CompletionUpdate {
                results_part2: payload,
                status: COMPLETED,
            })
            .build()?;
        Ok(request)
    }
}

impl ResultsSink for SupabaseSink {
    fn submit(&self, session: &Session, payload: &ResultsPayload) -> Result<(), SinkError> {
        if !self.is_configured() {
            warn!(url = %self.url, "supabase sink not configured");
            return Err(SinkError::NotConfigured(
                "Supabase URL не настроен. URL должен быть вида https://xyz.supabase.co".to_string(),
            ));
        }

        // Built per call: the blocking client owns a runtime and must not be
        // created or dropped on an async worker thread.
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()?;
        let request = self.build_request(&client, session, payload)?;
        let response = client.execute(request)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(SinkError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        debug!(user_id = %session.user_id, "supabase row updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Category, TrialResult};

    fn session(user_id: &str) -> Session {
        Session {
            user_id: user_id.into(),
            referrer: "direct".into(),
            start_time_ms: 0,
            group: Group::A,
        }
    }

    fn payload() -> ResultsPayload {
        ResultsPayload {
            group: Group::A,
            data: vec![TrialResult {
                block_id: 3,
                block_title: "Блок 3 из 7: Совмещение (Тренировка)".into(),
                stimulus_id: "mountain_0".into(),
                category: Category::Mountain,
                is_correct: false,
                reaction_time_ms: 812.0,
                timestamp_ms: 42,
            }],
        }
    }

    #[test]
    fn memory_sink_records_calls() {
        let sink = MemorySink::new();
        sink.submit(&session("a"), &payload()).unwrap();
        assert_eq!(sink.calls(), 1);
        assert_eq!(sink.submissions()[0].1.data.len(), 1);
    }

    #[test]
    fn json_sink_writes_completed_record() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(dir.path().join("results"));
        sink.submit(&session("user-1"), &payload()).unwrap();

        let text = std::fs::read_to_string(sink.path_for("user-1")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["userId"], "user-1");
        assert_eq!(json["status"], "completed");
        assert_eq!(json["results_part2"]["group"], "A");
        assert_eq!(json["results_part2"]["data"][0]["stimulusId"], "mountain_0");
    }

    #[test]
    fn json_sink_sanitizes_file_name() {
        let sink = JsonFileSink::new("/tmp/x");
        assert_eq!(sink.path_for("../evil id"), PathBuf::from("/tmp/x/___evil_id.json"));
    }

    #[test]
    fn supabase_placeholder_is_not_configured() {
        let sink = SupabaseSink::new(PLACEHOLDER_SUPABASE_URL, "k", "iat_results");
        assert!(!sink.is_configured());
        let err = sink.submit(&session("u"), &payload()).unwrap_err();
        assert!(matches!(err, SinkError::NotConfigured(_)));
        assert!(err.to_string().contains("https://xyz.supabase.co"));

        assert!(!SupabaseSink::new("http://plain.example", "k", "t").is_configured());
        assert!(!SupabaseSink::new("", "k", "t").is_configured());
    }

    #[test]
    fn supabase_request_filters_by_user() {
        let sink = SupabaseSink::new("https://abc.supabase.co/", "k", "iat_results");
        assert!(sink.is_configured());
        assert_eq!(sink.endpoint(), "https://abc.supabase.co/rest/v1/iat_results");

        let client = reqwest::blocking::Client::new();
        let request = sink.build_request(&client, &session("u-1"), &payload()).unwrap();
        assert_eq!(request.method(), reqwest::Method::PATCH);
        assert_eq!(request.url().path(), "/rest/v1/iat_results");
        assert_eq!(request.url().query(), Some("user_id=eq.u-1"));
        assert_eq!(request.headers()["apikey"], "k");
        assert_eq!(request.headers()["authorization"], "Bearer k");
    }

    #[test]
    fn supabase_user_id_cannot_add_filters() {
        let sink = SupabaseSink::new("https://abc.supabase.co", "k", "iat_results");
        let client = reqwest::blocking::Client::new();
        for user_id in ["x&status=eq.completed", "a b+c#frag", "eq.1&or=(user_id.neq.0)"] {
            let request = sink.build_request(&client, &session(user_id), &payload()).unwrap();
            let pairs: Vec<(String, String)> = request
                .url()
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            assert_eq!(pairs, vec![("user_id".to_string(), format!("eq.{}", user_id))]);
            assert!(request.url().fragment().is_none());
        }
    }
}
