use std::fmt;

/// How a call to the generation endpoint failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Connection refused, DNS failure, reset mid-body.
    Connect,
    /// The configured upper bound elapsed before a full response arrived.
    Timeout,
    /// Endpoint answered with a non-2xx status.
    Status,
    /// 2xx, but the body was not the JSON we expect.
    Decode,
    /// JSON body carried neither `response` nor `message`.
    EmptyPayload,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connect => "connect",
            Self::Timeout => "timeout",
            Self::Status => "status",
            Self::Decode => "decode",
            Self::EmptyPayload => "empty payload",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("LLM request failed ({kind}): {cause}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub cause: String,
    pub status: Option<u16>,
    pub body: Option<String>,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, cause: impl Into<String>) -> Self {
        Self {
            kind,
            cause: cause.into(),
            status: None,
            body: None,
        }
    }

    pub fn with_status(mut self, status: u16, body: String) -> Self {
        self.status = Some(status);
        self.body = Some(body);
        self
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == TransportErrorKind::Timeout
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_decode() {
            TransportErrorKind::Decode
        } else {
            TransportErrorKind::Connect
        };
        let mut transport = Self::new(kind, err.to_string());
        transport.status = err.status().map(|s| s.as_u16());
        transport
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionFailure {
    #[error("no JSON array found in LLM response")]
    NoArray,
    #[error("no JSON object with key \"{key}\" found in LLM response")]
    NoObject { key: String },
    #[error("JSON present but malformed: {detail}")]
    Malformed { detail: String },
    #[error("JSON present but truncated")]
    Truncated,
}

/// Extraction gave up. `raw` is the model output exactly as received.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{reason}")]
pub struct ExtractionError {
    pub raw: String,
    pub reason: ExtractionFailure,
}

/// Every way a task request can fail. None of them are fatal to the process.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TaskError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to parse JSON from LLM response: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("LLM response failed validation: {message}")]
    Validation { message: String, raw: String },
}

impl TaskError {
    /// Model text worth showing to whoever is tuning prompts, if any.
    pub fn raw(&self) -> Option<&str> {
        match self {
            Self::Extraction(e) => Some(&e.raw),
            Self::Validation { raw, .. } => Some(raw),
            _ => None,
        }
    }
}
