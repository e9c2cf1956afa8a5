// This is the entry point of the uploader.
//
// **Architecture Overview:**
// - `core/` = Business logic (CSV engine, upload orchestration)
// - `infra/` = Implementations of core traits (Google APIs, log sinks)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Run one upload from the command line and report the outcome

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with a pair of mod.rs files that look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "infra/infra_layer.rs"]
mod infra;

use anyhow::{anyhow, bail, Context};

use crate::core::csv::ParseConfig;
use crate::core::upload::{Destination, UploadMode, UploadService};
use crate::infra::activity::FileActivityLog;
use crate::infra::google_sheets::{GoogleSheetsClient, ServiceAccountAuth};

const DEFAULT_ACTIVITY_LOG: &str = "data/activity.jsonl";

/// Capability token for the remote API: either supplied directly via
/// `GOOGLE_ACCESS_TOKEN` or minted from a service-account key.
async fn resolve_token() -> anyhow::Result<String> {
    if let Ok(token) = std::env::var("GOOGLE_ACCESS_TOKEN") {
        return Ok(token);
    }

    let auth = ServiceAccountAuth::from_env().await.map_err(|e| {
        anyhow!(
            "no GOOGLE_ACCESS_TOKEN and service-account setup failed: {}",
            e
        )
    })?;
    auth.get_access_token()
        .await
        .map_err(|e| anyhow!("token exchange failed: {}", e))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        bail!(
            "usage: {} <csv-file> <spreadsheet-id> [mode] [tab-title]\n\
             modes: append (default), replace, replace_spreadsheet, new_tab, new_spreadsheet",
            args[0]
        );
    }

    let csv_path = &args[1];
    let spreadsheet_id = &args[2];
    let mode: UploadMode = args
        .get(3)
        .map(String::as_str)
        .unwrap_or("append")
        .parse()?;
    let tab_title = args
        .get(4)
        .cloned()
        .unwrap_or_else(|| crate::core::upload::DEFAULT_TAB_TITLE.to_string());

    let raw = std::fs::read_to_string(csv_path)
        .with_context(|| format!("failed to read {}", csv_path))?;

    let token = resolve_token().await?;

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // Wire the infra implementations into the core service.

    let sheets_client =
        GoogleSheetsClient::new().map_err(|e| anyhow!("failed to build HTTP client: {}", e))?;
    let activity_path = std::env::var("SHEETPIPE_ACTIVITY_LOG")
        .unwrap_or_else(|_| DEFAULT_ACTIVITY_LOG.to_string());
    let activity_log = FileActivityLog::new(activity_path);
    let service = UploadService::new(sheets_client, activity_log);

    let destination = Destination::new(spreadsheet_id.clone(), tab_title);

    tracing::info!(
        file = %csv_path,
        spreadsheet = %spreadsheet_id,
        mode = mode.as_str(),
        "starting upload"
    );

    let result = service
        .upload(&destination, &raw, &ParseConfig::default(), mode, &token)
        .await
        .map_err(|e| anyhow!("could not parse {}: {}", csv_path, e))?;

    if result.success {
        println!(
            "Uploaded {} rows to {}",
            result.rows_written, result.destination_url
        );
        if let Some(range) = result.updated_range {
            println!("Updated range: {}", range);
        }
        Ok(())
    } else {
        bail!(
            "upload failed ({:?}) for {}",
            result.error_kind,
            result.destination_url
        );
    }
}
