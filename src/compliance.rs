//! PII handling for audit records and stored messages.

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use serde::Serialize;

const SENSITIVE_TERMS: [&str; 4] = ["password", "social", "credit", "ssn"];

pub const REDACTED: &str = "[REDACTED]";
pub const ANONYMIZED_USER: &str = "ANONYMIZED";
pub const ANONYMIZED_ADDR: &str = "XXX.XXX.XXX.XXX";

/// One API request as written to the audit log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    pub timestamp: String,
    pub method: String,
    pub path: String,
    pub remote_addr: Option<String>,
    pub user_id: Option<String>,
}

impl AuditRecord {
    /// The anonymised record for an incoming request.
    pub fn for_request(request: &Request<Body>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            method: request.method().to_string(),
            path: request.uri().path().to_string(),
            remote_addr: crate::api::client_ip(request).map(|ip| ip.to_string()),
            user_id: Some("anonymous".to_string()),
        }
        .anonymize()
    }

    /// Strip identifying fields.
    pub fn anonymize(mut self) -> Self {
        if self.user_id.is_some() {
            self.user_id = Some(ANONYMIZED_USER.to_string());
        }
        if self.remote_addr.is_some() {
            self.remote_addr = Some(ANONYMIZED_ADDR.to_string());
        }
        self
    }
}

fn is_sensitive(word: &str) -> bool {
    let lower = word.to_lowercase();
    word.contains('@') || SENSITIVE_TERMS.iter().any(|term| lower.contains(term))
}

/// Replace words that look like e-mail addresses or mention credentials.
///
/// Text without any such word is returned untouched, whitespace included.
pub fn redact_message(text: &str) -> String {
    if !text.split_whitespace().any(is_sensitive) {
        return text.to_string();
    }

    text.split_whitespace()
        .map(|word| if is_sensitive(word) { REDACTED } else { word })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Writes an anonymised line per request to the `audit` target.
pub async fn audit_requests(request: Request<Body>, next: Next) -> Response {
    let record = AuditRecord::for_request(&request);

    tracing::info!(
        target: "audit",
        method = %record.method,
        path = %record.path,
        remote_addr = record.remote_addr.as_deref().unwrap_or("-"),
        user_id = record.user_id.as_deref().unwrap_or("-"),
        "API request"
    );

    next.run(request).await
}
