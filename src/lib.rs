//! Client-side flow for scanning UK driving licences: guard an uploaded or
//! camera-captured image, submit it to the recognition service, validate the
//! extracted fields locally and remotely, and gate saving on the outcome.

pub mod api;
pub mod camera;
pub mod error;
pub mod fence;
pub mod image_guard;
pub mod orchestrator;
pub mod types;
pub mod validator;

pub use api::{ScanApi, ScanClient};
pub use camera::{CameraBackend, CameraStream, CaptureDevice, RawFrame};
pub use error::{ApiError, CameraError, FlowError, ImageRejection};
pub use orchestrator::{FlowStep, RevalidationTicket, ScanOrchestrator, ScanPhase, ValidationSource};
pub use types::{
    CandidateImage, EditableFields, FieldKey, ImageOrigin, ScanFields, ScanResult, ScanValidation,
    SelectedImage,
};
pub use validator::validate_local;
