// The core module contains all business logic.
// Each feature gets its own submodule.

#[path = "csv/mod.rs"]
pub mod csv;

#[path = "upload/upload_service.rs"]
pub mod upload;
