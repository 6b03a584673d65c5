use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),
    #[error("URL parsing failed: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("Invalid stream pattern: {0:?}")]
    InvalidPattern(String),
    #[error("Base URL cannot carry a path: {0}")]
    InvalidBaseUrl(String),
    #[error("Stream endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Stream closed by server")]
    Closed,
    #[error("No data from stream for {0:?}")]
    Idle(std::time::Duration),
}

pub type Result<T> = std::result::Result<T, StreamError>;
