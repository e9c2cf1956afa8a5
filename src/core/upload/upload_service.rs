use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::csv::{parse_csv, sanitize, ParseConfig, ParseError, ParsedTable};

/// Default tab title Google assigns to a fresh spreadsheet, also the
/// target of whole-spreadsheet replaces.
pub const DEFAULT_TAB_TITLE: &str = "Sheet1";

/// Minimum grid size for a newly created tab. Tabs are sized to fit
/// the payload but never smaller than this.
pub const MIN_TAB_ROWS: usize = 1000;
pub const MIN_TAB_COLUMNS: usize = 26;

/// Errors raised by the remote table-write service. The infra client
/// classifies every non-2xx response into one of these before
/// returning; the orchestrator passes the first one through unchanged.
#[derive(Debug, Error)]
pub enum SheetsError {
    #[error("capability token rejected; caller must re-authenticate")]
    AuthExpired,
    #[error("destination spreadsheet or tab not found")]
    NotFound,
    #[error("a tab with the requested title already exists")]
    Conflict,
    #[error("remote write service error: {0}")]
    Remote(String),
}

/// Normalized failure category carried in a [`WriteResult`], so the
/// caller layer can prompt reauthentication or a rename distinctly
/// from generic failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteErrorKind {
    AuthExpired,
    NotFound,
    Conflict,
    RemoteError,
}

impl From<&SheetsError> for WriteErrorKind {
    fn from(err: &SheetsError) -> Self {
        match err {
            SheetsError::AuthExpired => WriteErrorKind::AuthExpired,
            SheetsError::NotFound => WriteErrorKind::NotFound,
            SheetsError::Conflict => WriteErrorKind::Conflict,
            SheetsError::Remote(_) => WriteErrorKind::RemoteError,
        }
    }
}

/// Identity returned by token introspection.
#[derive(Debug, Clone, Default)]
pub struct TokenIdentity {
    pub email: Option<String>,
    pub scope: Option<String>,
}

/// One tab inside a destination spreadsheet.
#[derive(Debug, Clone)]
pub struct TabInfo {
    pub sheet_id: i64,
    pub title: String,
    pub index: usize,
    pub row_count: usize,
    pub column_count: usize,
}

/// What the remote service reported back for a value write.
#[derive(Debug, Clone, Default)]
pub struct WriteResponse {
    pub updated_range: Option<String>,
    pub updated_rows: usize,
}

/// A freshly created spreadsheet and its default tab.
#[derive(Debug, Clone)]
pub struct CreatedSpreadsheet {
    pub spreadsheet_id: String,
    pub default_tab: String,
    pub url: String,
}

/// Trait describing the minimal remote operations the orchestrator
/// needs. The capability token travels as an explicit parameter on
/// every call; implementations must not hold it as ambient state.
#[async_trait]
pub trait SheetsClient: Send + Sync {
    async fn introspect_token(&self, token: &str) -> Result<TokenIdentity, SheetsError>;
    async fn list_tabs(
        &self,
        token: &str,
        spreadsheet_id: &str,
    ) -> Result<Vec<TabInfo>, SheetsError>;
    async fn create_tab(
        &self,
        token: &str,
        spreadsheet_id: &str,
        title: &str,
        row_count: usize,
        column_count: usize,
    ) -> Result<TabInfo, SheetsError>;
    async fn create_spreadsheet(
        &self,
        token: &str,
        title: &str,
    ) -> Result<CreatedSpreadsheet, SheetsError>;
    async fn append_values(
        &self,
        token: &str,
        spreadsheet_id: &str,
        tab_title: &str,
        rows: &[Vec<String>],
    ) -> Result<WriteResponse, SheetsError>;
    async fn clear_values(
        &self,
        token: &str,
        spreadsheet_id: &str,
        tab_title: &str,
    ) -> Result<(), SheetsError>;
    async fn put_values(
        &self,
        token: &str,
        spreadsheet_id: &str,
        tab_title: &str,
        rows: &[Vec<String>],
    ) -> Result<WriteResponse, SheetsError>;
    /// Best-effort header styling plus column auto-resize.
    async fn format_header(
        &self,
        token: &str,
        spreadsheet_id: &str,
        sheet_id: i64,
        column_count: usize,
    ) -> Result<(), SheetsError>;
}

/// How the parsed table lands in the destination. Selected once per
/// request from the caller directive and immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMode {
    /// Write after existing content, never touching prior rows.
    Append,
    /// Clear the target tab, then write from the first cell.
    ReplaceSheet,
    /// Replace against the spreadsheet's default tab.
    ReplaceSpreadsheet,
    /// Create a new tab (conflict when the title exists), then append.
    CreateTabThenWrite,
    /// Create a whole new spreadsheet, then replace into its default tab.
    CreateSpreadsheetThenWrite,
}

impl UploadMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadMode::Append => "append",
            UploadMode::ReplaceSheet => "replace_sheet",
            UploadMode::ReplaceSpreadsheet => "replace_spreadsheet",
            UploadMode::CreateTabThenWrite => "create_tab",
            UploadMode::CreateSpreadsheetThenWrite => "create_spreadsheet",
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown upload mode: {0}")]
pub struct UnknownMode(pub String);

impl FromStr for UploadMode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "append" => Ok(UploadMode::Append),
            "replace" | "replace_sheet" => Ok(UploadMode::ReplaceSheet),
            "replace_spreadsheet" => Ok(UploadMode::ReplaceSpreadsheet),
            "create_tab" | "new_tab" => Ok(UploadMode::CreateTabThenWrite),
            "create_spreadsheet" | "new_spreadsheet" => Ok(UploadMode::CreateSpreadsheetThenWrite),
            other => Err(UnknownMode(other.to_string())),
        }
    }
}

/// Where the rows should go. For create-spreadsheet mode the
/// spreadsheet id is ignored and `spreadsheet_title` (or a
/// date-stamped default) names the new spreadsheet.
#[derive(Debug, Clone)]
pub struct Destination {
    pub spreadsheet_id: String,
    pub tab_title: String,
    pub spreadsheet_title: Option<String>,
}

impl Destination {
    pub fn new(spreadsheet_id: impl Into<String>, tab_title: impl Into<String>) -> Self {
        Self {
            spreadsheet_id: spreadsheet_id.into(),
            tab_title: tab_title.into(),
            spreadsheet_title: None,
        }
    }
}

/// Normalized outcome of one upload, success or not. Built fresh per
/// request and never persisted.
#[derive(Debug, Clone)]
pub struct WriteResult {
    pub success: bool,
    pub rows_written: usize,
    pub updated_range: Option<String>,
    pub destination_url: String,
    pub error_kind: Option<WriteErrorKind>,
}

/// One record for the activity sink: what was attempted and how it went.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub spreadsheet_id: String,
    pub rows: usize,
    pub outcome: String,
}

#[derive(Debug, Error)]
pub enum ActivityError {
    #[error("failed to record activity: {0}")]
    Sink(String),
}

/// Fire-and-forget sink for upload activity. A failure to record
/// never changes the reported upload outcome.
#[async_trait]
pub trait ActivityLog: Send + Sync {
    async fn record(&self, event: ActivityEvent) -> Result<(), ActivityError>;
}

/// Orchestrates one upload end to end: sanitize, parse, resolve the
/// destination when the mode creates one, write, report.
///
/// Each request runs independently with fresh values throughout; the
/// service keeps no cross-request state, and concurrent uploads to the
/// same tab are not coordinated (last writer wins on replace).
pub struct UploadService<C: SheetsClient, L: ActivityLog> {
    client: C,
    activity: L,
}

impl<C, L> UploadService<C, L>
where
    C: SheetsClient,
    L: ActivityLog,
{
    pub fn new(client: C, activity: L) -> Self {
        Self { client, activity }
    }

    /// Parses a bounded sample so the caller can show the user what
    /// the upload will look like. Sanitization runs here too, so the
    /// preview matches what the upload path would actually write.
    pub fn preview(&self, raw: &str, config: &ParseConfig) -> Result<ParsedTable, ParseError> {
        let clean = sanitize(raw);
        let preview_config = ParseConfig {
            preview_only: true,
            ..config.clone()
        };
        parse_csv(&clean, &preview_config)
    }

    /// Runs the full upload pipeline. Parse problems are client-input
    /// errors and surface as `Err`; remote failures come back inside
    /// the [`WriteResult`] with a classified `error_kind`.
    pub async fn upload(
        &self,
        destination: &Destination,
        raw: &str,
        config: &ParseConfig,
        mode: UploadMode,
        token: &str,
    ) -> Result<WriteResult, ParseError> {
        let clean = sanitize(raw);

        let parse_config = ParseConfig {
            preview_only: false,
            ..config.clone()
        };
        let table = match parse_csv(&clean, &parse_config) {
            Ok(table) => table,
            Err(err) => {
                // Parse failures are terminal too; the activity trail
                // records them like any other outcome.
                self.record_activity(destination, mode, 0, "ParseError")
                    .await;
                return Err(err);
            }
        };
        tracing::debug!(
            rows = table.sheet_data.len(),
            columns = table.column_count,
            delimiter = %table.delimiter_used,
            "parsed upload content"
        );

        let result = match self.write_table(destination, &table, mode, token).await {
            Ok(result) => result,
            Err(err) => {
                let kind = WriteErrorKind::from(&err);
                tracing::warn!(mode = mode.as_str(), error = %err, "upload failed");
                WriteResult {
                    success: false,
                    rows_written: 0,
                    updated_range: None,
                    destination_url: spreadsheet_url(&destination.spreadsheet_id),
                    error_kind: Some(kind),
                }
            }
        };

        let outcome = match result.error_kind {
            None => "ok".to_string(),
            Some(kind) => format!("{:?}", kind),
        };
        self.record_activity(destination, mode, table.sheet_data.len(), &outcome)
            .await;
        Ok(result)
    }

    /// Performs the remote write sequence for the selected mode. Every
    /// mode validates the token first; a rejection there is always
    /// AuthExpired so the caller can prompt reauthentication.
    async fn write_table(
        &self,
        destination: &Destination,
        table: &ParsedTable,
        mode: UploadMode,
        token: &str,
    ) -> Result<WriteResult, SheetsError> {
        let identity = self.client.introspect_token(token).await?;
        tracing::debug!(email = ?identity.email, "capability token accepted");

        match mode {
            UploadMode::Append => {
                let response = self
                    .client
                    .append_values(
                        token,
                        &destination.spreadsheet_id,
                        &destination.tab_title,
                        &table.sheet_data,
                    )
                    .await?;
                self.finish_write(
                    token,
                    &destination.spreadsheet_id,
                    &destination.tab_title,
                    table,
                    response,
                )
                .await
            }
            UploadMode::ReplaceSheet => {
                self.replace_into(
                    token,
                    &destination.spreadsheet_id,
                    &destination.tab_title,
                    table,
                )
                .await
            }
            UploadMode::ReplaceSpreadsheet => {
                self.replace_into(token, &destination.spreadsheet_id, DEFAULT_TAB_TITLE, table)
                    .await
            }
            UploadMode::CreateTabThenWrite => {
                let tabs = self
                    .client
                    .list_tabs(token, &destination.spreadsheet_id)
                    .await?;
                if tabs
                    .iter()
                    .any(|t| t.title.eq_ignore_ascii_case(&destination.tab_title))
                {
                    return Err(SheetsError::Conflict);
                }

                let row_count = table.sheet_data.len().max(MIN_TAB_ROWS);
                let column_count = table.column_count.max(MIN_TAB_COLUMNS);
                self.client
                    .create_tab(
                        token,
                        &destination.spreadsheet_id,
                        &destination.tab_title,
                        row_count,
                        column_count,
                    )
                    .await?;

                let response = self
                    .client
                    .append_values(
                        token,
                        &destination.spreadsheet_id,
                        &destination.tab_title,
                        &table.sheet_data,
                    )
                    .await?;
                self.finish_write(
                    token,
                    &destination.spreadsheet_id,
                    &destination.tab_title,
                    table,
                    response,
                )
                .await
            }
            UploadMode::CreateSpreadsheetThenWrite => {
                let title = destination
                    .spreadsheet_title
                    .clone()
                    .unwrap_or_else(default_spreadsheet_title);
                let created = self.client.create_spreadsheet(token, &title).await?;
                tracing::info!(
                    spreadsheet_id = %created.spreadsheet_id,
                    title = %title,
                    "created destination spreadsheet"
                );
                self.replace_into(token, &created.spreadsheet_id, &created.default_tab, table)
                    .await
            }
        }
    }

    /// Clear then write from the first cell. A failed clear aborts the
    /// write and surfaces the classified error; proceeding over a
    /// half-cleared tab would silently mix old and new rows.
    async fn replace_into(
        &self,
        token: &str,
        spreadsheet_id: &str,
        tab_title: &str,
        table: &ParsedTable,
    ) -> Result<WriteResult, SheetsError> {
        self.client
            .clear_values(token, spreadsheet_id, tab_title)
            .await?;
        let response = self
            .client
            .put_values(token, spreadsheet_id, tab_title, &table.sheet_data)
            .await?;
        self.finish_write(token, spreadsheet_id, tab_title, table, response)
            .await
    }

    /// Builds the success result and applies best-effort header
    /// formatting. Formatting failures never downgrade the write.
    async fn finish_write(
        &self,
        token: &str,
        spreadsheet_id: &str,
        tab_title: &str,
        table: &ParsedTable,
        response: WriteResponse,
    ) -> Result<WriteResult, SheetsError> {
        if table.headers.is_some() {
            if let Err(err) = self
                .apply_header_format(token, spreadsheet_id, tab_title, table.column_count)
                .await
            {
                tracing::warn!(error = %err, "header formatting failed, keeping write result");
            }
        }

        let rows_written = if response.updated_rows > 0 {
            response.updated_rows
        } else {
            table.sheet_data.len()
        };

        Ok(WriteResult {
            success: true,
            rows_written,
            updated_range: response.updated_range,
            destination_url: spreadsheet_url(spreadsheet_id),
            error_kind: None,
        })
    }

    async fn apply_header_format(
        &self,
        token: &str,
        spreadsheet_id: &str,
        tab_title: &str,
        column_count: usize,
    ) -> Result<(), SheetsError> {
        let tabs = self.client.list_tabs(token, spreadsheet_id).await?;
        let tab = tabs
            .iter()
            .find(|t| t.title.eq_ignore_ascii_case(tab_title))
            .ok_or(SheetsError::NotFound)?;
        self.client
            .format_header(token, spreadsheet_id, tab.sheet_id, column_count)
            .await
    }

    async fn record_activity(
        &self,
        destination: &Destination,
        mode: UploadMode,
        rows: usize,
        outcome: &str,
    ) {
        let event = ActivityEvent {
            timestamp: Utc::now(),
            action: mode.as_str().to_string(),
            spreadsheet_id: destination.spreadsheet_id.clone(),
            rows,
            outcome: outcome.to_string(),
        };

        if let Err(err) = self.activity.record(event).await {
            tracing::warn!(error = %err, "activity sink rejected event");
        }
    }
}

fn spreadsheet_url(spreadsheet_id: &str) -> String {
    format!("https://docs.google.com/spreadsheets/d/{}", spreadsheet_id)
}

fn default_spreadsheet_title() -> String {
    format!("CSV Upload {}", Utc::now().format("%Y-%m-%d"))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use dashmap::DashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory stand-in for the remote write service. Tabs and cell
    /// contents live in shared maps so tests can inspect the end state.
    #[derive(Default)]
    struct MockSheets {
        tabs: DashMap<String, Vec<TabInfo>>,
        values: DashMap<(String, String), Vec<Vec<String>>>,
        created_titles: Mutex<Vec<String>>,
        created_sizes: Mutex<Vec<(usize, usize)>>,
        reject_token: bool,
        fail_clear: bool,
        fail_format: bool,
        appends: AtomicUsize,
        puts: AtomicUsize,
    }

    impl MockSheets {
        fn with_tab(self, spreadsheet_id: &str, title: &str) -> Self {
            let tab = TabInfo {
                sheet_id: 0,
                title: title.to_string(),
                index: 0,
                row_count: 1000,
                column_count: 26,
            };
            self.tabs
                .entry(spreadsheet_id.to_string())
                .or_default()
                .push(tab);
            self
        }

        fn tab_contents(&self, spreadsheet_id: &str, tab: &str) -> Vec<Vec<String>> {
            self.values
                .get(&(spreadsheet_id.to_string(), tab.to_string()))
                .map(|v| v.clone())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl SheetsClient for MockSheets {
        async fn introspect_token(&self, _token: &str) -> Result<TokenIdentity, SheetsError> {
            if self.reject_token {
                return Err(SheetsError::AuthExpired);
            }
            Ok(TokenIdentity {
                email: Some("upload@example.com".to_string()),
                scope: None,
            })
        }

        async fn list_tabs(
            &self,
            _token: &str,
            spreadsheet_id: &str,
        ) -> Result<Vec<TabInfo>, SheetsError> {
            Ok(self
                .tabs
                .get(spreadsheet_id)
                .map(|t| t.clone())
                .unwrap_or_default())
        }

        async fn create_tab(
            &self,
            _token: &str,
            spreadsheet_id: &str,
            title: &str,
            row_count: usize,
            column_count: usize,
        ) -> Result<TabInfo, SheetsError> {
            self.created_sizes
                .lock()
                .unwrap()
                .push((row_count, column_count));
            let mut tabs = self.tabs.entry(spreadsheet_id.to_string()).or_default();
            if tabs.iter().any(|t| t.title.eq_ignore_ascii_case(title)) {
                return Err(SheetsError::Conflict);
            }
            let tab = TabInfo {
                sheet_id: tabs.len() as i64 + 1,
                title: title.to_string(),
                index: tabs.len(),
                row_count,
                column_count,
            };
            tabs.push(tab.clone());
            Ok(tab)
        }

        async fn create_spreadsheet(
            &self,
            _token: &str,
            title: &str,
        ) -> Result<CreatedSpreadsheet, SheetsError> {
            self.created_titles.lock().unwrap().push(title.to_string());
            let id = format!("new-{}", self.created_titles.lock().unwrap().len());
            self.tabs.insert(
                id.clone(),
                vec![TabInfo {
                    sheet_id: 0,
                    title: DEFAULT_TAB_TITLE.to_string(),
                    index: 0,
                    row_count: 1000,
                    column_count: 26,
                }],
            );
            Ok(CreatedSpreadsheet {
                spreadsheet_id: id.clone(),
                default_tab: DEFAULT_TAB_TITLE.to_string(),
                url: format!("https://docs.google.com/spreadsheets/d/{}", id),
            })
        }

        async fn append_values(
            &self,
            _token: &str,
            spreadsheet_id: &str,
            tab_title: &str,
            rows: &[Vec<String>],
        ) -> Result<WriteResponse, SheetsError> {
            self.appends.fetch_add(1, Ordering::SeqCst);
            self.values
                .entry((spreadsheet_id.to_string(), tab_title.to_string()))
                .or_default()
                .extend(rows.iter().cloned());
            Ok(WriteResponse {
                updated_range: Some(format!("'{}'!A1", tab_title)),
                updated_rows: rows.len(),
            })
        }

        async fn clear_values(
            &self,
            _token: &str,
            spreadsheet_id: &str,
            tab_title: &str,
        ) -> Result<(), SheetsError> {
            if self.fail_clear {
                return Err(SheetsError::Remote("clear returned 500".to_string()));
            }
            self.values
                .remove(&(spreadsheet_id.to_string(), tab_title.to_string()));
            Ok(())
        }

        async fn put_values(
            &self,
            _token: &str,
            spreadsheet_id: &str,
            tab_title: &str,
            rows: &[Vec<String>],
        ) -> Result<WriteResponse, SheetsError> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            self.values.insert(
                (spreadsheet_id.to_string(), tab_title.to_string()),
                rows.to_vec(),
            );
            Ok(WriteResponse {
                updated_range: Some(format!("'{}'!A1", tab_title)),
                updated_rows: rows.len(),
            })
        }

        async fn format_header(
            &self,
            _token: &str,
            _spreadsheet_id: &str,
            _sheet_id: i64,
            _column_count: usize,
        ) -> Result<(), SheetsError> {
            if self.fail_format {
                return Err(SheetsError::Remote("formatting rejected".to_string()));
            }
            Ok(())
        }
    }

    /// Collects events so tests can assert on what was recorded.
    #[derive(Default)]
    struct RecordingLog {
        events: Mutex<Vec<ActivityEvent>>,
    }

    #[async_trait]
    impl ActivityLog for RecordingLog {
        async fn record(&self, event: ActivityEvent) -> Result<(), ActivityError> {
            self.events.lock().unwrap().push(event);
            Ok(())
        }
    }

    /// Sink that always fails, for proving log failures are non-fatal.
    struct FailingLog;

    #[async_trait]
    impl ActivityLog for FailingLog {
        async fn record(&self, _event: ActivityEvent) -> Result<(), ActivityError> {
            Err(ActivityError::Sink("disk full".to_string()))
        }
    }

    fn service(mock: MockSheets) -> UploadService<MockSheets, RecordingLog> {
        UploadService::new(mock, RecordingLog::default())
    }

    const CSV: &str = "name,score\nalice,10\nbob,20";

    #[tokio::test]
    async fn test_append_writes_header_and_rows() {
        let svc = service(MockSheets::default().with_tab("book", "Data"));
        let dest = Destination::new("book", "Data");

        let result = svc
            .upload(&dest, CSV, &ParseConfig::default(), UploadMode::Append, "t")
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.rows_written, 3);
        assert!(result.destination_url.ends_with("/book"));
        assert_eq!(svc.client.tab_contents("book", "Data").len(), 3);
    }

    #[tokio::test]
    async fn test_rejected_token_is_auth_expired_not_remote() {
        let mock = MockSheets {
            reject_token: true,
            ..MockSheets::default()
        };
        let svc = service(mock);
        let dest = Destination::new("book", "Data");

        let result = svc
            .upload(&dest, CSV, &ParseConfig::default(), UploadMode::Append, "t")
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(WriteErrorKind::AuthExpired));
        assert_eq!(svc.client.appends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_create_tab_conflict_detected_before_any_write() {
        let svc = service(MockSheets::default().with_tab("book", "Sheet1"));
        // Duplicate check is case-insensitive.
        let dest = Destination::new("book", "sheet1");

        let result = svc
            .upload(
                &dest,
                CSV,
                &ParseConfig::default(),
                UploadMode::CreateTabThenWrite,
                "t",
            )
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(WriteErrorKind::Conflict));
        assert_eq!(svc.client.appends.load(Ordering::SeqCst), 0);
        assert_eq!(svc.client.puts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_created_tab_respects_size_floor() {
        let svc = service(MockSheets::default());
        let dest = Destination::new("book", "Imported");

        let result = svc
            .upload(
                &dest,
                CSV,
                &ParseConfig::default(),
                UploadMode::CreateTabThenWrite,
                "t",
            )
            .await
            .unwrap();

        assert!(result.success);
        let sizes = svc.client.created_sizes.lock().unwrap().clone();
        assert_eq!(sizes, vec![(MIN_TAB_ROWS, MIN_TAB_COLUMNS)]);
    }

    #[tokio::test]
    async fn test_replace_aborts_when_clear_fails() {
        let mock = MockSheets {
            fail_clear: true,
            ..MockSheets::default()
        }
        .with_tab("book", "Data");
        let svc = service(mock);
        let dest = Destination::new("book", "Data");

        let result = svc
            .upload(
                &dest,
                CSV,
                &ParseConfig::default(),
                UploadMode::ReplaceSheet,
                "t",
            )
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(WriteErrorKind::RemoteError));
        // The write after the failed clear must not happen.
        assert_eq!(svc.client.puts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_replace_spreadsheet_targets_default_tab() {
        let svc = service(MockSheets::default().with_tab("book", DEFAULT_TAB_TITLE));
        let dest = Destination::new("book", "Ignored");

        let result = svc
            .upload(
                &dest,
                CSV,
                &ParseConfig::default(),
                UploadMode::ReplaceSpreadsheet,
                "t",
            )
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(svc.client.tab_contents("book", DEFAULT_TAB_TITLE).len(), 3);
        assert!(svc.client.tab_contents("book", "Ignored").is_empty());
    }

    #[tokio::test]
    async fn test_create_spreadsheet_uses_datestamped_default_title() {
        let svc = service(MockSheets::default());
        let dest = Destination::new("", "");

        let result = svc
            .upload(
                &dest,
                CSV,
                &ParseConfig::default(),
                UploadMode::CreateSpreadsheetThenWrite,
                "t",
            )
            .await
            .unwrap();

        assert!(result.success);
        let titles = svc.client.created_titles.lock().unwrap().clone();
        assert_eq!(titles.len(), 1);
        assert!(titles[0].starts_with("CSV Upload "));
        assert_eq!(svc.client.tab_contents("new-1", DEFAULT_TAB_TITLE).len(), 3);
    }

    #[tokio::test]
    async fn test_formatting_failure_does_not_downgrade_success() {
        let mock = MockSheets {
            fail_format: true,
            ..MockSheets::default()
        }
        .with_tab("book", "Data");
        let svc = service(mock);
        let dest = Destination::new("book", "Data");

        let result = svc
            .upload(&dest, CSV, &ParseConfig::default(), UploadMode::Append, "t")
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.error_kind.is_none());
    }

    #[tokio::test]
    async fn test_empty_content_is_a_client_error() {
        let svc = service(MockSheets::default());
        let dest = Destination::new("book", "Data");

        let err = svc
            .upload(
                &dest,
                "https://example.com/stray\n\n",
                &ParseConfig::default(),
                UploadMode::Append,
                "t",
            )
            .await
            .unwrap_err();

        assert_eq!(err, ParseError::NoData);
        assert_eq!(svc.client.appends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_parse_failure_still_emits_an_activity_event() {
        let svc = service(MockSheets::default());
        let dest = Destination::new("book", "Data");

        svc.upload(&dest, "", &ParseConfig::default(), UploadMode::Append, "t")
            .await
            .unwrap_err();

        let events = svc.activity.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].outcome, "ParseError");
        assert_eq!(events[0].rows, 0);
    }

    #[tokio::test]
    async fn test_activity_sink_failure_is_not_fatal() {
        let mock = MockSheets::default().with_tab("book", "Data");
        let svc = UploadService::new(mock, FailingLog);
        let dest = Destination::new("book", "Data");

        let result = svc
            .upload(&dest, CSV, &ParseConfig::default(), UploadMode::Append, "t")
            .await
            .unwrap();

        assert!(result.success);
    }

    #[tokio::test]
    async fn test_activity_event_recorded_for_both_outcomes() {
        let svc = service(MockSheets::default().with_tab("book", "Sheet1"));

        let ok_dest = Destination::new("book", "Data");
        svc.upload(
            &ok_dest,
            CSV,
            &ParseConfig::default(),
            UploadMode::Append,
            "t",
        )
        .await
        .unwrap();

        let conflict_dest = Destination::new("book", "Sheet1");
        svc.upload(
            &conflict_dest,
            CSV,
            &ParseConfig::default(),
            UploadMode::CreateTabThenWrite,
            "t",
        )
        .await
        .unwrap();

        let events = svc.activity.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].outcome, "ok");
        assert_eq!(events[0].action, "append");
        assert_eq!(events[1].outcome, "Conflict");
    }

    #[tokio::test]
    async fn test_concurrent_replaces_race_last_writer_wins() {
        let svc = service(MockSheets::default().with_tab("book", "Data"));
        let dest = Destination::new("book", "Data");

        let first = "h\nfirst";
        let second = "h\nsecond";
        let config = ParseConfig::default();

        // No locking coordinates these; both succeed and whichever
        // write lands last owns the tab.
        let (a, b) = tokio::join!(
            svc.upload(&dest, first, &config, UploadMode::ReplaceSheet, "t"),
            svc.upload(&dest, second, &config, UploadMode::ReplaceSheet, "t")
        );

        assert!(a.unwrap().success);
        assert!(b.unwrap().success);

        let final_rows = svc.client.tab_contents("book", "Data");
        let first_rows = vec![vec!["h".to_string()], vec!["first".to_string()]];
        let second_rows = vec![vec!["h".to_string()], vec!["second".to_string()]];
        assert!(final_rows == first_rows || final_rows == second_rows);
    }

    #[tokio::test]
    async fn test_preview_parses_a_bounded_sample() {
        let svc = service(MockSheets::default());
        let raw = "h1,h2\n1,2\n3,4\n5,6\n7,8";

        let table = svc
            .preview(
                raw,
                &ParseConfig {
                    preview_row_limit: 2,
                    ..ParseConfig::default()
                },
            )
            .unwrap();

        assert_eq!(table.data_rows.len(), 2);
        assert_eq!(table.row_count_data, 4);
    }

    #[test]
    fn test_upload_mode_directive_parsing() {
        assert_eq!("append".parse::<UploadMode>().unwrap(), UploadMode::Append);
        assert_eq!(
            "replace".parse::<UploadMode>().unwrap(),
            UploadMode::ReplaceSheet
        );
        assert_eq!(
            "new_tab".parse::<UploadMode>().unwrap(),
            UploadMode::CreateTabThenWrite
        );
        assert!("overwrite".parse::<UploadMode>().is_err());
    }
}
