use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("not authenticated, log in first")]
    NotAuthenticated,

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API returned error: status={status}, url={url}, body={body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    #[error("invalid response from {url}: {message}")]
    InvalidResponse {
        url: String,
        message: String,
    },
}

