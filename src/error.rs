use thiserror::Error;

/// Why a candidate image was refused by the image guard.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageRejection {
    #[error("Unsupported file type. Please upload a JPG, PNG, or WEBP image.")]
    UnsupportedType,
    #[error("File is too large. Please upload an image smaller than 10MB.")]
    TooLarge,
}

/// Camera lifecycle failures. Stale grants are reported as `Canceled` and are
/// not surfaced to the user as errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    #[error("Camera is already starting.")]
    AlreadyStarting,
    #[error("Camera capture is not available on this device.")]
    Unavailable,
    #[error("{0}")]
    Denied(String),
    #[error("Camera start was canceled.")]
    Canceled,
    #[error("Unable to attach the camera stream.")]
    Attach,
    #[error("{0}")]
    NotReady(&'static str),
    #[error("Failed to encode the captured image.")]
    Encode,
}

/// Failures talking to the recognition service.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Non-2xx response; `message` is the server-provided error message or
    /// the endpoint's generic fallback.
    #[error("{message}")]
    Server { status: u16, message: String },
}

impl ApiError {
    /// HTTP status of the failure, when one was received at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Server { status, .. } => Some(*status),
            ApiError::Network(err) => err.status().map(|s| s.as_u16()),
        }
    }
}

/// Top-level flow failures surfaced by the orchestrator.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Please upload or capture an image before scanning.")]
    NoImage,
    #[error(transparent)]
    Image(#[from] ImageRejection),
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error(transparent)]
    Scan(#[from] ApiError),
}
