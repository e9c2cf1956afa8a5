// =============================================================================
// GOOGLE SHEETS MODULE
// =============================================================================
//
// Infra-layer client for the Google Sheets REST API. It lives here
// because it handles external I/O; the core layer only knows the
// `SheetsClient` trait and never sees HTTP.
//
// Two pieces:
// - `sheets_client`: the trait implementation. The caller's capability
//   token travels as an explicit parameter on every call, so one
//   client instance can serve many requests without ambient state.
// - `auth`: service-account OAuth2 for deployments where the server
//   writes with its own credential instead of a caller-supplied token.

pub mod auth;
pub mod sheets_client;

pub use auth::ServiceAccountAuth;
pub use sheets_client::GoogleSheetsClient;
