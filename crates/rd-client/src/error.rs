//! Client-local error taxonomy, converted into `rd_core::Error` wherever
//! the CLI surfaces a failure (spec §6, §7 — the CLI's error envelope is
//! the same `{error, message, details?}` shape the server emits).

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{status} from {url}: {message}")]
    Api { status: u16, url: String, message: String },

    #[error("failed to open event stream: {0}")]
    EventSource(#[from] reqwest_eventsource::CannotCloneRequestError),

    #[error(transparent)]
    Core(#[from] rd_core::Error),
}

impl From<ClientError> for rd_core::Error {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Core(inner) => inner,
            ClientError::Api { status, .. } if status == 401 => rd_core::Error::Unauthorized,
            other => rd_core::Error::Exception(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
