//! Maps failures onto a small taxonomy suitable for presenting to a user.
//!
//! [`classify`] never fails and never panics: whatever it cannot recognize ends up as
//! [`ErrorKind::Unknown`] carrying the raw message.

use crate::aws::dynamodb::client::StoreFault;
use crate::aws::dynamodb::executor::ExecError;
use crate::aws::dynamodb::expression::BuilderError;
use crate::aws::dynamodb::model::ValidationError;
use regex::Regex;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::LazyLock;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Throttled,
    NotFound,
    AccessDenied,
    ConditionalCheckFailed,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Throttled => "throttled",
            ErrorKind::NotFound => "not_found",
            ErrorKind::AccessDenied => "access_denied",
            ErrorKind::ConditionalCheckFailed => "conditional_check_failed",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// A hint on what the user can do about an error of this kind.
    pub fn guidance(&self) -> &'static str {
        match self {
            ErrorKind::Validation => {
                "Check the key condition and filter values against the key schema and attribute types."
            }
            ErrorKind::Throttled => "Wait a moment and retry, or reduce the page size.",
            ErrorKind::NotFound => "Verify the table or index name and the selected region.",
            ErrorKind::AccessDenied => {
                "Check the credentials of the selected profile and its IAM permissions."
            }
            ErrorKind::ConditionalCheckFailed => {
                "The item was changed in the meantime. Reload it and try again."
            }
            ErrorKind::Unknown => "Retry the request. If the problem persists, check the logs.",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ParsedError {
    pub kind: ErrorKind,
    pub message: String,
    pub details: Option<String>,
}

const UNKNOWN_MESSAGE: &str = "Unknown error occurred";

impl ParsedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        let details = details.into();
        self.details = if details.is_empty() {
            None
        } else {
            Some(details)
        };
        self
    }

    /// An unrecognized error. Falls back to a generic message if `message` is blank.
    pub fn unknown(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.trim().is_empty() {
            Self::new(ErrorKind::Unknown, UNKNOWN_MESSAGE)
        } else {
            Self::new(ErrorKind::Unknown, message)
        }
    }

    /// The text shown to a user. Only validation errors append their details.
    pub fn user_message(&self) -> String {
        match (&self.kind, &self.details) {
            (ErrorKind::Validation, Some(details)) => format!("{}: {}", self.message, details),
            _ => self.message.clone(),
        }
    }

    pub fn guidance(&self) -> &'static str {
        self.kind.guidance()
    }
}

impl Display for ParsedError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.user_message())
    }
}

impl Error for ParsedError {}

/// Classifies any error by walking its source chain for something recognizable.
pub fn classify(error: &(dyn Error + 'static)) -> ParsedError {
    let mut current = Some(error);
    while let Some(err) = current {
        if let Some(parsed) = classify_known(err) {
            return parsed;
        }
        current = err.source();
    }

    ParsedError::unknown(error.to_string())
}

/// Classifies an application level error, looking through its whole context chain.
pub fn classify_anyhow(error: &anyhow::Error) -> ParsedError {
    error
        .chain()
        .find_map(classify_known)
        .unwrap_or_else(|| ParsedError::unknown(format!("{:#}", error)))
}

fn classify_known(err: &(dyn Error + 'static)) -> Option<ParsedError> {
    if let Some(parsed) = err.downcast_ref::<ParsedError>() {
        return Some(parsed.clone());
    }
    if let Some(exec) = err.downcast_ref::<ExecError>() {
        return Some(classify_exec(exec));
    }
    if let Some(fault) = err.downcast_ref::<StoreFault>() {
        return Some(classify_fault(fault));
    }
    if let Some(validation) = err.downcast_ref::<ValidationError>() {
        return Some(invalid_request(validation));
    }
    if let Some(builder) = err.downcast_ref::<BuilderError>() {
        return Some(invalid_request(builder));
    }

    None
}

fn classify_exec(error: &ExecError) -> ParsedError {
    match error {
        ExecError::Validation(err) => invalid_request(err),
        ExecError::Builder(err) => invalid_request(err),
        ExecError::TableNotFound(name) => {
            ParsedError::new(ErrorKind::NotFound, "Table or index not found")
                .with_details(format!("Table '{}' does not exist", name))
        }
        ExecError::Store(fault) => classify_fault(fault),
        ExecError::Connection(err) => classify_anyhow(err),
        ExecError::Cancelled => ParsedError::unknown(error.to_string()),
    }
}

fn invalid_request(error: &dyn Display) -> ParsedError {
    ParsedError::new(ErrorKind::Validation, "Invalid request parameters")
        .with_details(error.to_string())
}

/// Classifies a fault reported by the store.
pub fn classify_fault(fault: &StoreFault) -> ParsedError {
    classify_code(fault.code.as_deref(), &fault.message)
}

/// Classifies a store error identifier along with its message.
pub fn classify_code(code: Option<&str>, message: &str) -> ParsedError {
    match code.unwrap_or_default() {
        "ValidationException" => {
            ParsedError::new(ErrorKind::Validation, "Invalid expression syntax")
                .with_details(validation_details(message))
        }
        "ProvisionedThroughputExceededException"
        | "ThrottlingException"
        | "RequestLimitExceeded" => {
            ParsedError::new(ErrorKind::Throttled, "Request throttled. Try again.")
        }
        "ResourceNotFoundException" => {
            ParsedError::new(ErrorKind::NotFound, "Table or index not found")
        }
        "AccessDeniedException" | "UnrecognizedClientException" => {
            ParsedError::new(ErrorKind::AccessDenied, "Permission denied")
        }
        "ConditionalCheckFailedException" => {
            ParsedError::new(ErrorKind::ConditionalCheckFailed, "Condition check failed")
        }
        _ => ParsedError::unknown(message),
    }
}

/// Fragments of DynamoDB validation messages worth showing, tried in order.
static VALIDATION_DETAILS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"Syntax error; token: "[^"]*", near: "(?P<detail>[^"]*)""#,
        r"(?P<detail>reserved keyword: [\w.]+)",
        r"(?P<detail>unused in expressions: keys: \{[^}]*\})",
        r"(?P<detail>missed key schema element: \S+)",
        r"(?P<detail>An expression attribute (?:name|value) used in expression is not defined; attribute (?:name|value): \S+)",
        r"Invalid \w*Expression: (?P<detail>.+)",
    ]
    .into_iter()
    .map(|pattern| Regex::new(pattern).expect("Invalid regex"))
    .collect()
});

const GENERIC_PREFIX: &str = "One or more parameter values were invalid: ";

fn validation_details(message: &str) -> String {
    VALIDATION_DETAILS
        .iter()
        .find_map(|pattern| pattern.captures(message))
        .and_then(|captures| captures.name("detail"))
        .map(|detail| detail.as_str().trim().to_string())
        .unwrap_or_else(|| {
            message
                .trim()
                .trim_start_matches(GENERIC_PREFIX)
                .trim()
                .to_string()
        })
}
