use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;

use crate::core::upload::{
    CreatedSpreadsheet, SheetsClient, SheetsError, TabInfo, TokenIdentity, WriteResponse,
};

const SHEETS_BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

/// Every remote round-trip gets a hard deadline; a hung call maps to a
/// remote error rather than stalling the upload indefinitely.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Google Sheets REST API client. It deliberately exposes only the
/// calls the core layer needs, and takes the caller's bearer token per
/// call instead of storing it.
pub struct GoogleSheetsClient {
    client: Client,
    base_url: String,
    tokeninfo_url: String,
}

impl GoogleSheetsClient {
    pub fn new() -> Result<Self, SheetsError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SheetsError::Remote(e.to_string()))?;

        Ok(Self {
            client,
            base_url: SHEETS_BASE_URL.to_string(),
            tokeninfo_url: TOKENINFO_URL.to_string(),
        })
    }

    /// A1 range covering a whole tab, with the title quoted so names
    /// containing spaces or quotes survive.
    fn tab_range(tab_title: &str) -> String {
        format!("'{}'", tab_title.replace('\'', "''"))
    }

    fn bearer(token: &str) -> String {
        format!("Bearer {}", token)
    }

    /// Classifies a non-2xx response into the core error taxonomy.
    /// The Sheets API reports a duplicate tab title as a 400 with an
    /// "already exists" message rather than a 409, so both map to
    /// Conflict here.
    async fn classify(response: Response) -> SheetsError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SheetsError::AuthExpired,
            StatusCode::NOT_FOUND => SheetsError::NotFound,
            StatusCode::CONFLICT => SheetsError::Conflict,
            StatusCode::BAD_REQUEST if body.contains("already exists") => SheetsError::Conflict,
            _ => {
                let snippet: String = body.chars().take(200).collect();
                SheetsError::Remote(format!("{}: {}", status, snippet))
            }
        }
    }

    fn transport_error(err: reqwest::Error) -> SheetsError {
        if err.is_timeout() {
            SheetsError::Remote("request timed out after 30s".to_string())
        } else {
            SheetsError::Remote(err.to_string())
        }
    }
}

#[async_trait]
impl SheetsClient for GoogleSheetsClient {
    async fn introspect_token(&self, token: &str) -> Result<TokenIdentity, SheetsError> {
        let response = self
            .client
            .get(&self.tokeninfo_url)
            .query(&[("access_token", token)])
            .send()
            .await
            .map_err(Self::transport_error)?;

        // The introspection endpoint answers 400 for malformed or
        // expired tokens; any rejection here means reauthentication.
        if response.status() == StatusCode::BAD_REQUEST
            || response.status() == StatusCode::UNAUTHORIZED
            || response.status() == StatusCode::FORBIDDEN
        {
            return Err(SheetsError::AuthExpired);
        }
        if !response.status().is_success() {
            return Err(Self::classify(response).await);
        }

        let info: TokenInfoResponse = response
            .json()
            .await
            .map_err(|e| SheetsError::Remote(e.to_string()))?;
        Ok(TokenIdentity {
            email: info.email,
            scope: info.scope,
        })
    }

    async fn list_tabs(
        &self,
        token: &str,
        spreadsheet_id: &str,
    ) -> Result<Vec<TabInfo>, SheetsError> {
        let url = format!("{}/{}", self.base_url, spreadsheet_id);
        let response = self
            .client
            .get(&url)
            .query(&[("fields", "sheets.properties")])
            .header("Authorization", Self::bearer(token))
            .send()
            .await
            .map_err(Self::transport_error)?;

        if !response.status().is_success() {
            return Err(Self::classify(response).await);
        }

        let spreadsheet: ApiSpreadsheet = response
            .json()
            .await
            .map_err(|e| SheetsError::Remote(e.to_string()))?;

        Ok(spreadsheet
            .sheets
            .unwrap_or_default()
            .into_iter()
            .filter_map(|s| s.properties)
            .map(TabInfo::from)
            .collect())
    }

    async fn create_tab(
        &self,
        token: &str,
        spreadsheet_id: &str,
        title: &str,
        row_count: usize,
        column_count: usize,
    ) -> Result<TabInfo, SheetsError> {
        let url = format!("{}/{}:batchUpdate", self.base_url, spreadsheet_id);
        let body = json!({
            "requests": [{
                "addSheet": {
                    "properties": {
                        "title": title,
                        "gridProperties": {
                            "rowCount": row_count,
                            "columnCount": column_count,
                        }
                    }
                }
            }]
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", Self::bearer(token))
            .json(&body)
            .send()
            .await
            .map_err(Self::transport_error)?;

        if !response.status().is_success() {
            return Err(Self::classify(response).await);
        }

        let reply: ApiBatchUpdateResponse = response
            .json()
            .await
            .map_err(|e| SheetsError::Remote(e.to_string()))?;

        reply
            .replies
            .unwrap_or_default()
            .into_iter()
            .find_map(|r| r.add_sheet.and_then(|a| a.properties))
            .map(TabInfo::from)
            .ok_or_else(|| {
                SheetsError::Remote("addSheet reply missing sheet properties".to_string())
            })
    }

    async fn create_spreadsheet(
        &self,
        token: &str,
        title: &str,
    ) -> Result<CreatedSpreadsheet, SheetsError> {
        let body = json!({ "properties": { "title": title } });
        let response = self
            .client
            .post(&self.base_url)
            .header("Authorization", Self::bearer(token))
            .json(&body)
            .send()
            .await
            .map_err(Self::transport_error)?;

        if !response.status().is_success() {
            return Err(Self::classify(response).await);
        }

        let created: ApiSpreadsheet = response
            .json()
            .await
            .map_err(|e| SheetsError::Remote(e.to_string()))?;

        let spreadsheet_id = created
            .spreadsheet_id
            .ok_or_else(|| SheetsError::Remote("create reply missing spreadsheetId".to_string()))?;
        let default_tab = created
            .sheets
            .unwrap_or_default()
            .into_iter()
            .filter_map(|s| s.properties)
            .map(|p| p.title)
            .next()
            .unwrap_or_else(|| "Sheet1".to_string());
        let url = created.spreadsheet_url.unwrap_or_else(|| {
            format!("https://docs.google.com/spreadsheets/d/{}", spreadsheet_id)
        });

        Ok(CreatedSpreadsheet {
            spreadsheet_id,
            default_tab,
            url,
        })
    }

    async fn append_values(
        &self,
        token: &str,
        spreadsheet_id: &str,
        tab_title: &str,
        rows: &[Vec<String>],
    ) -> Result<WriteResponse, SheetsError> {
        let range = Self::tab_range(tab_title);
        let url = format!(
            "{}/{}/values/{}:append",
            self.base_url, spreadsheet_id, range
        );
        let body = json!({ "values": rows });

        let response = self
            .client
            .post(&url)
            .query(&[
                ("valueInputOption", "USER_ENTERED"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .header("Authorization", Self::bearer(token))
            .json(&body)
            .send()
            .await
            .map_err(Self::transport_error)?;

        if !response.status().is_success() {
            return Err(Self::classify(response).await);
        }

        let reply: ApiAppendResponse = response
            .json()
            .await
            .map_err(|e| SheetsError::Remote(e.to_string()))?;
        Ok(reply.updates.map(WriteResponse::from).unwrap_or_default())
    }

    async fn clear_values(
        &self,
        token: &str,
        spreadsheet_id: &str,
        tab_title: &str,
    ) -> Result<(), SheetsError> {
        let range = Self::tab_range(tab_title);
        let url = format!("{}/{}/values/{}:clear", self.base_url, spreadsheet_id, range);

        let response = self
            .client
            .post(&url)
            .header("Authorization", Self::bearer(token))
            .json(&json!({}))
            .send()
            .await
            .map_err(Self::transport_error)?;

        if !response.status().is_success() {
            return Err(Self::classify(response).await);
        }
        Ok(())
    }

    async fn put_values(
        &self,
        token: &str,
        spreadsheet_id: &str,
        tab_title: &str,
        rows: &[Vec<String>],
    ) -> Result<WriteResponse, SheetsError> {
        let range = Self::tab_range(tab_title);
        let url = format!("{}/{}/values/{}", self.base_url, spreadsheet_id, range);
        let body = json!({
            "majorDimension": "ROWS",
            "values": rows,
        });

        let response = self
            .client
            .put(&url)
            .query(&[("valueInputOption", "USER_ENTERED")])
            .header("Authorization", Self::bearer(token))
            .json(&body)
            .send()
            .await
            .map_err(Self::transport_error)?;

        if !response.status().is_success() {
            return Err(Self::classify(response).await);
        }

        let reply: ApiUpdateValues = response
            .json()
            .await
            .map_err(|e| SheetsError::Remote(e.to_string()))?;
        Ok(WriteResponse::from(reply))
    }

    async fn format_header(
        &self,
        token: &str,
        spreadsheet_id: &str,
        sheet_id: i64,
        column_count: usize,
    ) -> Result<(), SheetsError> {
        let url = format!("{}/{}:batchUpdate", self.base_url, spreadsheet_id);
        let body = json!({
            "requests": [
                {
                    "repeatCell": {
                        "range": {
                            "sheetId": sheet_id,
                            "startRowIndex": 0,
                            "endRowIndex": 1,
                        },
                        "cell": {
                            "userEnteredFormat": {
                                "textFormat": { "bold": true },
                                "backgroundColor": { "red": 0.9, "green": 0.9, "blue": 0.9 },
                            }
                        },
                        "fields": "userEnteredFormat(textFormat,backgroundColor)",
                    }
                },
                {
                    "autoResizeDimensions": {
                        "dimensions": {
                            "sheetId": sheet_id,
                            "dimension": "COLUMNS",
                            "startIndex": 0,
                            "endIndex": column_count,
                        }
                    }
                }
            ]
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", Self::bearer(token))
            .json(&body)
            .send()
            .await
            .map_err(Self::transport_error)?;

        if !response.status().is_success() {
            return Err(Self::classify(response).await);
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenInfoResponse {
    email: Option<String>,
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiSpreadsheet {
    spreadsheet_id: Option<String>,
    spreadsheet_url: Option<String>,
    sheets: Option<Vec<ApiSheet>>,
}

#[derive(Debug, Deserialize)]
struct ApiSheet {
    properties: Option<ApiSheetProperties>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiSheetProperties {
    sheet_id: Option<i64>,
    title: String,
    #[serde(default)]
    index: usize,
    grid_properties: Option<ApiGridProperties>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiGridProperties {
    row_count: Option<usize>,
    column_count: Option<usize>,
}

impl From<ApiSheetProperties> for TabInfo {
    fn from(p: ApiSheetProperties) -> Self {
        let grid = p.grid_properties.unwrap_or(ApiGridProperties {
            row_count: None,
            column_count: None,
        });
        TabInfo {
            sheet_id: p.sheet_id.unwrap_or_default(),
            title: p.title,
            index: p.index,
            row_count: grid.row_count.unwrap_or(0),
            column_count: grid.column_count.unwrap_or(0),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiBatchUpdateResponse {
    replies: Option<Vec<ApiBatchReply>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiBatchReply {
    add_sheet: Option<ApiAddSheetReply>,
}

#[derive(Debug, Deserialize)]
struct ApiAddSheetReply {
    properties: Option<ApiSheetProperties>,
}

#[derive(Debug, Deserialize)]
struct ApiAppendResponse {
    updates: Option<ApiUpdateValues>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiUpdateValues {
    updated_range: Option<String>,
    updated_rows: Option<usize>,
}

impl From<ApiUpdateValues> for WriteResponse {
    fn from(u: ApiUpdateValues) -> Self {
        WriteResponse {
            updated_range: u.updated_range,
            updated_rows: u.updated_rows.unwrap_or(0),
        }
    }
}
