//! JSON bodies of the biometric endpoints.

use serde::{Deserialize, Serialize};

pub const REGISTER_FACE_PATH: &str = "/biometric/register-face";
pub const RECOGNIZE_FACE_PATH: &str = "/biometric/recognize-face";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterFaceRequest<'a> {
    pub employee_id: &'a str,
    pub face_data: &'a [f32],
}

#[derive(Debug, Deserialize)]
pub struct RegisterFaceResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognizeFaceRequest<'a> {
    pub face_data: &'a [f32],
}

#[derive(Debug, Deserialize)]
pub struct RecognizeFaceResponse {
    pub success: bool,
    #[serde(rename = "match", default)]
    pub matched: bool,
    #[serde(default)]
    pub employee: Option<EmployeeRef>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeRef {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl EmployeeRef {
    /// "First Last", whichever parts are present; `None` if neither is.
    pub fn display_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

/// Error body returned with non-2xx statuses.
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}
