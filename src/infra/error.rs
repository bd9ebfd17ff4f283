use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
    #[error("render worker failed: {message}")]
    RenderWorker { message: String },
}

impl InfraError {
    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }

    pub fn render_worker(message: impl Into<String>) -> Self {
        Self::RenderWorker {
            message: message.into(),
        }
    }
}
