//! Response envelope shared by every HTTP surface in the workspace.
//!
//! Success: `{"success":true,"data":...,"message":...,"timestamp":...,"requestId":...}`
//! Failure: `{"success":false,"error":{"code":...,"details":...},"message":...,"timestamp":...}`

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Machine-readable error payload inside a failure envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Uniform response envelope. Exactly one of `data` / `error` is present.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Success envelope around `data`.
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message: None,
            timestamp: Utc::now(),
            request_id: None,
        }
    }

    /// Success envelope with a human-readable message.
    pub fn success_with_message(data: T, message: impl Into<String>) -> Self {
        let mut res = Self::success(data);
        res.message = Some(message.into());
        res
    }

    /// Attach the request id echoed back to the caller.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

impl ApiResponse<serde_json::Value> {
    /// Failure envelope with a stable machine code and optional details payload.
    pub fn failure(
        code: impl Into<String>,
        message: impl Into<String>,
        details: Option<serde_json::Value>,
    ) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorBody {
                code: code.into(),
                details,
            }),
            message: Some(message.into()),
            timestamp: Utc::now(),
            request_id: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_envelope_has_data_and_no_error() {
        let res = ApiResponse::success(json!({"userId": "abc"})).with_request_id("req-1");
        let value = serde_json::to_value(&res).unwrap();

        assert_eq!(value["success"], json!(true));
        assert_eq!(value["data"]["userId"], json!("abc"));
        assert_eq!(value["requestId"], json!("req-1"));
        assert!(value.get("error").is_none());
        assert!(value.get("timestamp").is_some());
    }

    #[test]
    fn failure_envelope_has_code_and_no_data() {
        let res = ApiResponse::failure(
            "INVALID_CREDENTIALS",
            "Invalid email or password",
            Some(json!({"requiresVerification": true})),
        );
        let value = serde_json::to_value(&res).unwrap();

        assert_eq!(value["success"], json!(false));
        assert_eq!(value["error"]["code"], json!("INVALID_CREDENTIALS"));
        assert_eq!(value["error"]["details"]["requiresVerification"], json!(true));
        assert!(value.get("data").is_none());
    }

    #[test]
    fn optional_fields_are_omitted_when_absent() {
        let res = ApiResponse::success(json!({}));
        let value = serde_json::to_value(&res).unwrap();

        assert!(value.get("message").is_none());
        assert!(value.get("requestId").is_none());
    }
}
