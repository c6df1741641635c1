//! InfluxDB API request and response types

use serde::{Deserialize, Serialize};

/// Query API parameters carried in the URL.
#[derive(Debug, Clone, Serialize)]
pub struct QueryParams<'a> {
    pub org: &'a str,
}

/// Error body returned by the InfluxDB HTTP API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}
