use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Threads API error: {0}")]
    ThreadsApi(#[from] ThreadsApiError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

#[derive(Error, Debug, Clone)]
pub enum ThreadsApiError {
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Rate limit exceeded. Retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    #[error("Forbidden access to resource: {resource}")]
    Forbidden { resource: String },

    #[error("Post not found: {post_id}")]
    PostNotFound { post_id: String },

    #[error("Invalid access token")]
    InvalidToken,

    #[error("Request timeout")]
    RequestTimeout,

    #[error("Invalid API response: {details}")]
    InvalidResponse { details: String },

    #[error("Server error: {status_code}")]
    ServerError { status_code: u16 },

    #[error("Reply was not published: {details}")]
    PublishFailed { details: String },
}

#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("API key invalid or missing for {provider}")]
    InvalidApiKey { provider: String },

    #[error("Rate limit exceeded for {provider}. Retry after {retry_after} seconds")]
    RateLimitExceeded { provider: String, retry_after: u64 },

    #[error("Content filtered by provider: {reason}")]
    ContentFiltered { reason: String },

    #[error("Provider service unavailable: {provider}")]
    ServiceUnavailable { provider: String },

    #[error("Request timeout for {provider}")]
    RequestTimeout { provider: String },

    #[error("Invalid response format from {provider}")]
    InvalidResponseFormat { provider: String },

    #[error("Empty completion from {provider}")]
    EmptyCompletion { provider: String },
}

#[derive(Error, Debug, Clone)]
pub enum EngineError {
    #[error("Post {post_id} is already being monitored")]
    AlreadyMonitored { post_id: String },

    #[error("Post {post_id} is not in the monitoring list")]
    NotMonitored { post_id: String },

    #[error("Reply cap reached for post {post_id}: {cap} replies")]
    ReplyCapReached { post_id: String, cap: u32 },

    #[error("Scheduler is not running")]
    NotRunning,
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Failed to read {path}: {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt snapshot file {path}: {details}")]
    CorruptSnapshot { path: String, details: String },

    #[error("Failed to create data directory {path}: {source}")]
    DirectoryCreation {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("Missing required credential: {name}")]
    MissingCredential { name: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Environment variable not set: {var_name}")]
    MissingEnvironmentVariable { var_name: String },
}

impl CoreError {
    /// Collaborator failures are contained inside a cycle; everything
    /// else propagates to the caller.
    pub fn is_cycle_local(&self) -> bool {
        matches!(
            self,
            CoreError::ThreadsApi(_) | CoreError::Llm(_) | CoreError::Network(_)
        )
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::ThreadsApi(_) => "THREADS_API",
            CoreError::Llm(_) => "LLM",
            CoreError::Engine(_) => "ENGINE",
            CoreError::Persistence(_) => "PERSISTENCE",
            CoreError::Config(_) => "CONFIG",
            CoreError::Io(_) => "IO",
            CoreError::Serialization(_) => "SERIALIZATION",
            CoreError::Network(_) => "NETWORK",
            CoreError::InvalidInput { .. } => "INVALID_INPUT",
            CoreError::Internal { .. } => "INTERNAL",
        }
    }
}
