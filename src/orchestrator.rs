//! The capture/validate/scan flow controller. Owns the selected image, the
//! editable field state and the flow step for one user session; the camera
//! session itself belongs to the embedded `CaptureDevice`.

use std::time::Duration;

use tracing::{debug, warn};

use crate::api::{ScanApi, SCAN_FALLBACK_MESSAGE};
use crate::camera::{CameraBackend, CameraState, CaptureDevice};
use crate::error::{ApiError, CameraError, FlowError, ImageRejection};
use crate::fence::Fence;
use crate::image_guard;
use crate::types::{
    CandidateImage, EditableFields, FieldKey, ScanFields, ScanResult, ScanValidation,
    SelectedImage,
};
use crate::validator::validate_local;

/// Quiet window after the last field edit before remote re-validation fires.
pub const REVALIDATION_DEBOUNCE: Duration = Duration::from_millis(350);

/// Which view the flow is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStep {
    Capture,
    Preview,
}

/// Scan sub-state within the preview step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Idle,
    Scanning,
    Scanned,
    Failed,
}

/// Who produced the current authoritative validation result. The most
/// recently completed producer wins; local recomputes synchronously on every
/// edit and stays authoritative until a fresher remote response lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationSource {
    Local,
    Remote,
}

/// Handle for one scheduled debounced re-validation. The driver sleeps for
/// `delay`, then offers the token back via `revalidation_due`; a newer edit
/// in the meantime makes the token stale and the wakeup a no-op.
#[derive(Debug, Clone, Copy)]
pub struct RevalidationTicket {
    pub token: u64,
    pub delay: Duration,
}

pub struct ScanOrchestrator<A: ScanApi, B: CameraBackend> {
    api: A,
    camera: CaptureDevice<B>,
    step: FlowStep,
    phase: ScanPhase,
    selected: Option<SelectedImage>,
    scan_result: Option<ScanResult>,
    fields: EditableFields,
    validation: ScanValidation,
    validation_source: ValidationSource,
    revalidation: Fence,
    pending_revalidation: Option<u64>,
    last_error: Option<String>,
    scan_error: Option<String>,
}

impl<A: ScanApi, B: CameraBackend> ScanOrchestrator<A, B> {
    pub fn new(api: A, backend: B) -> Self {
        Self {
            api,
            camera: CaptureDevice::new(backend),
            step: FlowStep::Capture,
            phase: ScanPhase::Idle,
            selected: None,
            scan_result: None,
            fields: EditableFields::default(),
            validation: ScanValidation::default(),
            validation_source: ValidationSource::Local,
            revalidation: Fence::new(),
            pending_revalidation: None,
            last_error: None,
            scan_error: None,
        }
    }

    pub fn step(&self) -> FlowStep {
        self.step
    }

    pub fn phase(&self) -> ScanPhase {
        self.phase
    }

    pub fn selected_image(&self) -> Option<&SelectedImage> {
        self.selected.as_ref()
    }

    pub fn scan_result(&self) -> Option<&ScanResult> {
        self.scan_result.as_ref()
    }

    pub fn fields(&self) -> &EditableFields {
        &self.fields
    }

    pub fn validation(&self) -> &ScanValidation {
        &self.validation
    }

    pub fn validation_source(&self) -> ValidationSource {
        self.validation_source
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn scan_error(&self) -> Option<&str> {
        self.scan_error.as_deref()
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn camera(&self) -> &CaptureDevice<B> {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut CaptureDevice<B> {
        &mut self.camera
    }

    /// Run a candidate through the image guard and make it the flow's
    /// subject. Rejection clears any previous selection and keeps the flow
    /// in the capture step.
    pub fn select_image(&mut self, candidate: CandidateImage) -> Result<(), ImageRejection> {
        match image_guard::admit(candidate) {
            Ok(image) => {
                self.selected = Some(image);
                self.last_error = None;
                self.clear_scan_state();
                self.step = FlowStep::Preview;
                if self.camera.state() != CameraState::Idle {
                    self.camera.stop();
                }
                Ok(())
            }
            Err(rejection) => {
                self.selected = None;
                self.clear_scan_state();
                self.step = FlowStep::Capture;
                self.last_error = Some(rejection.to_string());
                Err(rejection)
            }
        }
    }

    /// Submit the selected image to the recognition service and derive the
    /// editable field state from the result.
    pub async fn scan(&mut self) -> Result<(), FlowError> {
        // The selection cannot change while the call is in flight; `scan`
        // holds the orchestrator exclusively.
        let Some(image) = self.selected.clone() else {
            let err = FlowError::NoImage;
            self.last_error = Some(err.to_string());
            return Err(err);
        };

        self.last_error = None;
        self.scan_error = None;
        self.scan_result = None;
        self.phase = ScanPhase::Scanning;

        match self.api.scan(&image).await {
            Ok(result) => {
                self.fields = EditableFields::from_scan(&result);
                self.revalidation.advance();
                self.pending_revalidation = None;
                match result.validation.clone() {
                    Some(validation) => {
                        self.validation = validation;
                        self.validation_source = ValidationSource::Remote;
                    }
                    None => {
                        self.validation = validate_local(&self.fields);
                        self.validation_source = ValidationSource::Local;
                    }
                }
                self.scan_result = Some(result);
                self.phase = ScanPhase::Scanned;
                Ok(())
            }
            Err(err) => {
                warn!(status = err.status(), error = %err, "scan failed");
                self.phase = ScanPhase::Failed;
                self.scan_error = Some(match &err {
                    ApiError::Server { message, .. } => message.clone(),
                    ApiError::Network(_) => SCAN_FALLBACK_MESSAGE.to_string(),
                });
                Err(FlowError::Scan(err))
            }
        }
    }

    /// Apply one field edit. Local validation recomputes immediately and
    /// becomes authoritative; when a scan result exists, a debounced remote
    /// re-validation is scheduled and its ticket returned for the driver.
    pub fn edit_field(
        &mut self,
        key: FieldKey,
        value: impl Into<String>,
    ) -> Option<RevalidationTicket> {
        self.fields.set(key, value);
        self.validation = validate_local(&self.fields);
        self.validation_source = ValidationSource::Local;

        if self.scan_result.is_none() {
            return None;
        }
        let token = self.revalidation.advance();
        self.pending_revalidation = Some(token);
        Some(RevalidationTicket {
            token,
            delay: REVALIDATION_DEBOUNCE,
        })
    }

    /// Debounce expiry gate. Yields the fields snapshot to send only when
    /// the token is still the latest outstanding one; wakeups for superseded
    /// edits return `None` and cause no remote call.
    pub fn revalidation_due(&mut self, token: u64) -> Option<ScanFields> {
        if self.pending_revalidation != Some(token) || !self.revalidation.is_current(token) {
            return None;
        }
        self.pending_revalidation = None;
        Some(self.fields.to_scan_fields())
    }

    /// Reconcile a remote re-validation response. Responses for superseded
    /// tokens are discarded; failures are non-fatal and leave the previous
    /// result in place.
    pub fn apply_revalidation(&mut self, token: u64, outcome: Result<ScanValidation, ApiError>) {
        if !self.revalidation.is_current(token) {
            debug!(token, "discarding stale re-validation response");
            return;
        }
        match outcome {
            Ok(validation) => {
                self.validation = validation;
                self.validation_source = ValidationSource::Remote;
            }
            Err(err) => {
                warn!(error = %err, "remote re-validation failed; keeping previous result");
            }
        }
    }

    /// Drive one scheduled re-validation to completion: wait out the
    /// debounce window, then call the service if the ticket is still live.
    ///
    /// Holds the orchestrator for the whole window, so no edits can land
    /// mid-debounce. Interactive shells that keep accepting input should run
    /// the timer themselves and use `revalidation_due`/`apply_revalidation`
    /// directly; this driver suits sequential callers.
    pub async fn revalidate(&mut self, ticket: RevalidationTicket) {
        tokio::time::sleep(ticket.delay).await;
        let Some(snapshot) = self.revalidation_due(ticket.token) else {
            return;
        };
        let outcome = self.api.validate(&snapshot).await;
        self.apply_revalidation(ticket.token, outcome);
    }

    /// Saving is allowed once a scan has completed, none is in flight, and
    /// the authoritative validation carries no blocking errors.
    pub fn can_save(&self) -> bool {
        self.phase == ScanPhase::Scanned && self.validation.blocking_errors.is_empty()
    }

    /// True when the engine's confidence fell below the service-declared
    /// threshold, prompting the user to review the fields.
    pub fn low_confidence(&self) -> bool {
        self.scan_result
            .as_ref()
            .and_then(|r| r.ocr_confidence.zip(r.confidence_threshold))
            .map(|(confidence, threshold)| confidence < threshold)
            .unwrap_or(false)
    }

    /// Start the camera. A canceled start (superseded by a newer request) is
    /// not recorded as a user-facing error.
    pub async fn start_camera(&mut self) -> Result<(), CameraError> {
        self.last_error = None;
        match self.camera.start().await {
            Ok(()) => Ok(()),
            Err(CameraError::Canceled) => Err(CameraError::Canceled),
            Err(err) => {
                self.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    pub fn stop_camera(&mut self) {
        self.camera.stop();
    }

    /// Capture a still from the active camera session and select it like any
    /// other candidate image.
    pub fn capture(&mut self) -> Result<(), FlowError> {
        self.last_error = None;
        self.scan_error = None;
        let frame = self.camera.capture_frame().map_err(|err| {
            self.last_error = Some(err.to_string());
            err
        })?;
        self.select_image(frame)?;
        Ok(())
    }

    /// Clear the whole session and return to capture.
    pub fn reset(&mut self) {
        self.selected = None;
        self.last_error = None;
        self.clear_scan_state();
        self.step = FlowStep::Capture;
        self.camera.stop();
    }

    /// Reset and immediately start a fresh camera session.
    pub async fn retake(&mut self) -> Result<(), CameraError> {
        self.reset();
        self.start_camera().await
    }

    fn clear_scan_state(&mut self) {
        self.scan_result = None;
        self.scan_error = None;
        self.phase = ScanPhase::Idle;
        self.fields = EditableFields::default();
        self.validation = ScanValidation::default();
        self.validation_source = ValidationSource::Local;
        self.revalidation.advance();
        self.pending_revalidation = None;
    }
}
