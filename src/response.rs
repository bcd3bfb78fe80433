use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Status codes the API documents as failures, with their canned name and
/// description. The description is replaced by the server message when the
/// error body carries one.
const BAD_STATUS_CODES: [(u16, &str, &str); 10] = [
    (400, "Bad Request", "Request failed."),
    (
        401,
        "Unauthorized",
        "Request failed, due to an invalid access token.",
    ),
    (
        403,
        "Forbidden",
        "Request failed, due to missing authorization (e.g. deleting an already submitted upload or missing scopes for your access token).",
    ),
    (
        404,
        "Not Found",
        "Request failed, due to the resource not being found.",
    ),
    (
        405,
        "Method Not Allowed",
        "Request failed, due to unsupported HTTP method.",
    ),
    (
        409,
        "Conflict",
        "Request failed, due to the current state of the resource (e.g. edit a deposition which is not fully integrated).",
    ),
    (
        415,
        "Unsupported Media Type",
        "Request failed, due to missing or invalid request header Content-Type.",
    ),
    (
        422,
        "Unprocessable Entity",
        "Resumption tokens are only valid for 2 minutes.",
    ),
    (
        429,
        "Too Many Requests",
        "Request failed, due to rate limiting.",
    ),
    (
        500,
        "Internal Server Error",
        "Request failed, due to an internal server error.",
    ),
];

/// Structured error built from a failed API response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// HTTP status code of the response
    pub status_code: u16,
    /// Short name of the status code
    pub name: String,
    /// Human readable reason of the failure
    pub description: String,
}

impl ApiError {
    /// Builds an error from a status code and the raw response body.
    ///
    /// The body is inspected for a `message` entry and, when present, the
    /// first entry of `errors`. Bodies that are not JSON fall back to the
    /// canned description of the status code.
    pub fn from_response(status_code: u16, body: &str) -> Self {
        let (name, canned) = Self::canned(status_code);
        let description = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|body| body.describe())
            .unwrap_or(canned);

        ApiError {
            status_code,
            name,
            description,
        }
    }

    /// Returns true if the status code is one of the documented failures.
    pub fn is_known_status(status_code: u16) -> bool {
        BAD_STATUS_CODES
            .iter()
            .any(|(code, _, _)| *code == status_code)
    }

    fn canned(status_code: u16) -> (String, String) {
        match BAD_STATUS_CODES
            .iter()
            .find(|(code, _, _)| *code == status_code)
        {
            Some((_, name, description)) => (name.to_string(), description.to_string()),
            None => {
                let name = reqwest::StatusCode::from_u16(status_code)
                    .ok()
                    .and_then(|status| status.canonical_reason())
                    .unwrap_or("Unknown Status");
                (name.to_string(), "Request failed.".to_string())
            }
        }
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Status code {} ({}): {}",
            self.status_code, self.name, self.description
        )
    }
}

impl std::error::Error for ApiError {}

/// Error body returned by the API.
#[derive(Debug, Deserialize, Serialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: Vec<FieldError>,
}

/// Validation error attached to a single field.
#[derive(Debug, Deserialize, Serialize)]
struct FieldError {
    #[serde(default)]
    field: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ErrorBody {
    fn describe(self) -> Option<String> {
        let message = self.message?;
        match self.errors.into_iter().next() {
            Some(FieldError {
                field: Some(field),
                message: Some(error),
            }) => Some(format!("{message} Field '{field}'. {error}")),
            _ => Some(message),
        }
    }
}
