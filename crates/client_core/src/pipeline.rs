use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use shared::protocol::{EnhancedJobDescription, EnhancementResult, ExtractedJobDescription};
use thiserror::Error;
use tokio::{sync::broadcast, time::timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    backend::{BackendError, DocumentService, ENHANCE_FAILED, EXTRACT_FAILED},
    view::Action,
    ClientEvent,
};

pub const MAX_DOCUMENT_BYTES: usize = 5 * 1024 * 1024;
pub const PREVIEW_ITEM_LIMIT: usize = 5;

pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/msword",
    "image/jpeg",
    "image/png",
];

#[derive(Clone, PartialEq, Eq)]
pub struct DocumentFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl DocumentFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn info(&self) -> SelectedFileInfo {
        SelectedFileInfo {
            name: self.name.clone(),
            mime_type: self.mime_type.clone(),
            size_bytes: self.size(),
            size_label: format_file_size(self.size()),
        }
    }
}

impl fmt::Debug for DocumentFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentFile")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("size", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFileInfo {
    pub name: String,
    pub mime_type: String,
    pub size_bytes: usize,
    pub size_label: String,
}

pub fn format_file_size(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{bytes} bytes")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStage {
    Selected,
    Uploading,
    Extracting,
    Enhancing,
    Presented,
    Failed,
}

impl UploadStage {
    pub fn progress(self) -> Option<(u8, &'static str)> {
        match self {
            Self::Uploading => Some((10, "Uploading file...")),
            Self::Extracting => Some((30, "Extracting information...")),
            Self::Enhancing => Some((70, "Enhancing job description...")),
            Self::Presented => Some((100, "Completed")),
            Self::Selected | Self::Failed => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadJob {
    pub id: Uuid,
    pub file: Arc<DocumentFile>,
    pub stage: UploadStage,
    pub extracted: Option<ExtractedJobDescription>,
    pub enhanced: Option<EnhancementResult>,
}

impl UploadJob {
    fn new(file: DocumentFile) -> Self {
        Self {
            id: Uuid::new_v4(),
            file: Arc::new(file),
            stage: UploadStage::Selected,
            extracted: None,
            enhanced: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("Invalid file type. Please upload PDF, DOCX, DOC, JPG, or PNG files.")]
    InvalidType,
    #[error("File is too large. Maximum size is 5MB.")]
    TooLarge,
    #[error("Please select a file to upload")]
    NoFileSelected,
    #[error("A document is already being processed")]
    Busy,
    #[error("{0}")]
    Extract(String),
    #[error("{0}")]
    Enhance(String),
    #[error("Job description {stage} timed out")]
    TimedOut { stage: &'static str },
    #[error("Document processing was cancelled")]
    Superseded,
    #[error("No extracted data available")]
    NoResult,
}

pub fn validate_document(file: &DocumentFile) -> Result<(), PipelineError> {
    if !ALLOWED_MIME_TYPES.contains(&file.mime_type.as_str()) {
        return Err(PipelineError::InvalidType);
    }
    if file.size() > MAX_DOCUMENT_BYTES {
        return Err(PipelineError::TooLarge);
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TruncatedList {
    pub items: Vec<String>,
    pub remaining: usize,
}

impl TruncatedList {
    pub fn from_items(items: &[String]) -> Self {
        Self {
            items: items.iter().take(PREVIEW_ITEM_LIMIT).cloned().collect(),
            remaining: items.len().saturating_sub(PREVIEW_ITEM_LIMIT),
        }
    }

    pub fn more_label(&self) -> Option<String> {
        (self.remaining > 0).then(|| format!("...and {} more", self.remaining))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPreview {
    pub job_title: String,
    pub industry: String,
    pub experience: String,
    pub role_summary: String,
    pub responsibilities: TruncatedList,
    pub required_skills: TruncatedList,
}

impl UploadPreview {
    pub fn from_enhanced(enhanced: &EnhancedJobDescription) -> Self {
        let experience = match enhanced.min_work_experience {
            Some(years) if years > 0 => format!("{years} years"),
            _ => "Not specified".to_string(),
        };
        Self {
            job_title: enhanced.job_title.clone(),
            industry: enhanced.industry_name.clone(),
            experience,
            role_summary: enhanced.role_summary.clone(),
            responsibilities: TruncatedList::from_items(&enhanced.responsibilities),
            required_skills: TruncatedList::from_items(&enhanced.required_skills),
        }
    }
}

#[derive(Default)]
struct PipelineState {
    job: Option<UploadJob>,
    epoch: u64,
}

pub struct IngestionPipeline {
    documents: Arc<dyn DocumentService>,
    events: broadcast::Sender<ClientEvent>,
    timeout: Duration,
    state: Mutex<PipelineState>,
    in_flight: AtomicBool,
}

struct RunGuard<'a> {
    pipeline: &'a IngestionPipeline,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.pipeline.in_flight.store(false, Ordering::SeqCst);
        let has_file = self.pipeline.lock().job.is_some();
        self.pipeline.emit_control(has_file, Action::UploadDocument.idle_label());
    }
}

impl IngestionPipeline {
    pub fn new(
        documents: Arc<dyn DocumentService>,
        events: broadcast::Sender<ClientEvent>,
        timeout: Duration,
    ) -> Self {
        Self {
            documents,
            events,
            timeout,
            state: Mutex::new(PipelineState::default()),
            in_flight: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PipelineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit_control(&self, enabled: bool, label: &str) {
        let _ = self.events.send(ClientEvent::ActionControl {
            action: Action::UploadDocument,
            enabled,
            label: label.to_string(),
        });
    }

    pub fn is_processing(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn stage(&self) -> Option<UploadStage> {
        self.lock().job.as_ref().map(|job| job.stage)
    }

    pub fn selected_file(&self) -> Option<SelectedFileInfo> {
        self.lock().job.as_ref().map(|job| job.file.info())
    }

    pub fn result(&self) -> Option<EnhancementResult> {
        self.lock().job.as_ref().and_then(|job| job.enhanced.clone())
    }

    pub fn select(&self, file: DocumentFile) -> Result<SelectedFileInfo, PipelineError> {
        validate_document(&file)?;
        if self.is_processing() {
            return Err(PipelineError::Busy);
        }

        let job = UploadJob::new(file);
        let info = job.file.info();
        debug!(job_id = %job.id, name = %info.name, size = info.size_bytes, "pipeline: file selected");
        self.lock().job = Some(job);

        let _ = self.events.send(ClientEvent::UploadPreviewCleared);
        let _ = self.events.send(ClientEvent::FileSelected(Some(info.clone())));
        self.emit_control(true, Action::UploadDocument.idle_label());
        Ok(info)
    }

    pub fn remove(&self) {
        self.clear();
        let _ = self.events.send(ClientEvent::UploadPreviewCleared);
        self.emit_control(false, Action::UploadDocument.idle_label());
    }

    pub fn reset(&self) {
        self.clear();
        let _ = self.events.send(ClientEvent::UploadPreviewCleared);
    }

    fn clear(&self) {
        let mut state = self.lock();
        state.epoch += 1;
        state.job = None;
        drop(state);
        let _ = self.events.send(ClientEvent::FileSelected(None));
    }

    pub async fn process_file(&self, file: DocumentFile) -> Result<UploadPreview, PipelineError> {
        self.select(file)?;
        self.process().await
    }

    /// Stage N is only issued once stage N-1 succeeded. A failed run keeps the
    /// file selected so it can be processed again.
    pub async fn process(&self) -> Result<UploadPreview, PipelineError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PipelineError::Busy);
        }
        let _run = RunGuard { pipeline: self };

        let (job_id, file, epoch) = {
            let mut state = self.lock();
            let epoch = state.epoch;
            let Some(job) = state.job.as_mut() else {
                return Err(PipelineError::NoFileSelected);
            };
            job.extracted = None;
            job.enhanced = None;
            (job.id, job.file.clone(), epoch)
        };
        self.emit_control(false, Action::UploadDocument.busy_label());
        info!(job_id = %job_id, name = %file.name, "pipeline: processing document");

        self.advance(epoch, job_id, UploadStage::Uploading)?;
        let extracted = timeout(self.timeout, self.documents.extract_document(&file)).await;
        let extracted = match extracted {
            Err(_) => {
                return Err(self.fail(epoch, job_id, PipelineError::TimedOut { stage: "extraction" }))
            }
            Ok(result) => {
                self.advance(epoch, job_id, UploadStage::Extracting)?;
                match result {
                    Ok(extracted) => extracted,
                    Err(err) => {
                        let err = PipelineError::Extract(failure_message(err, EXTRACT_FAILED));
                        return Err(self.fail(epoch, job_id, err));
                    }
                }
            }
        };

        self.with_current_job(epoch, |job| job.extracted = Some(extracted.clone()))?;
        self.advance(epoch, job_id, UploadStage::Enhancing)?;
        let enhanced = match timeout(self.timeout, self.documents.enhance_document(&extracted)).await {
            Err(_) => {
                return Err(self.fail(epoch, job_id, PipelineError::TimedOut { stage: "enhancement" }))
            }
            Ok(Err(err)) => {
                let err = PipelineError::Enhance(failure_message(err, ENHANCE_FAILED));
                return Err(self.fail(epoch, job_id, err));
            }
            Ok(Ok(enhanced)) => enhanced,
        };

        let preview = UploadPreview::from_enhanced(&enhanced.enhanced_jd);
        self.with_current_job(epoch, |job| {
            job.enhanced = Some(enhanced);
            job.stage = UploadStage::Presented;
        })?;
        self.report(job_id, UploadStage::Presented);
        let _ = self.events.send(ClientEvent::UploadPreviewReady(preview.clone()));
        info!(job_id = %job_id, "pipeline: document ready for review");
        Ok(preview)
    }

    pub fn take_result(&self) -> Result<EnhancementResult, PipelineError> {
        let mut state = self.lock();
        let ready = state
            .job
            .as_ref()
            .is_some_and(|job| job.stage == UploadStage::Presented && job.enhanced.is_some());
        if !ready {
            return Err(PipelineError::NoResult);
        }
        let job = state.job.take();
        state.epoch += 1;
        drop(state);

        let _ = self.events.send(ClientEvent::FileSelected(None));
        self.emit_control(false, Action::UploadDocument.idle_label());
        job.and_then(|job| job.enhanced).ok_or(PipelineError::NoResult)
    }

    fn with_current_job<F>(&self, epoch: u64, update: F) -> Result<(), PipelineError>
    where
        F: FnOnce(&mut UploadJob),
    {
        let mut state = self.lock();
        if state.epoch != epoch {
            return Err(PipelineError::Superseded);
        }
        match state.job.as_mut() {
            Some(job) => {
                update(job);
                Ok(())
            }
            None => Err(PipelineError::Superseded),
        }
    }

    fn advance(&self, epoch: u64, job_id: Uuid, stage: UploadStage) -> Result<(), PipelineError> {
        self.with_current_job(epoch, |job| job.stage = stage)?;
        self.report(job_id, stage);
        Ok(())
    }

    fn report(&self, job_id: Uuid, stage: UploadStage) {
        if let Some((percent, status)) = stage.progress() {
            debug!(job_id = %job_id, ?stage, percent, "pipeline: stage");
            let _ = self.events.send(ClientEvent::UploadProgress {
                job_id,
                stage,
                percent,
                status: status.to_string(),
            });
        }
    }

    fn fail(&self, epoch: u64, job_id: Uuid, err: PipelineError) -> PipelineError {
        let mut percent = 0;
        let updated = self.with_current_job(epoch, |job| {
            percent = job.stage.progress().map(|(p, _)| p).unwrap_or_default();
            job.stage = UploadStage::Failed;
        });
        if updated.is_err() {
            debug!(job_id = %job_id, error = %err, "pipeline: dropping result of abandoned run");
            return PipelineError::Superseded;
        }

        warn!(job_id = %job_id, error = %err, "pipeline: processing failed");
        let _ = self.events.send(ClientEvent::UploadProgress {
            job_id,
            stage: UploadStage::Failed,
            percent,
            status: format!("Error: {err}"),
        });
        err
    }
}

fn failure_message(err: BackendError, fallback: &str) -> String {
    match err {
        BackendError::Api(api) if !api.message.trim().is_empty() => api.message,
        BackendError::Api(_) => fallback.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[path = "tests/pipeline_tests.rs"]
mod tests;
