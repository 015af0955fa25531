use shared::domain::JobRecord;
use uuid::Uuid;

pub mod auth;
pub mod backend;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod session;
pub mod view;

pub use auth::{AuthGateway, AuthStateChange, AuthUser, IdentityToolkitGateway};
pub use backend::{BackendClient, BackendError, CompanyService, DocumentService, JobService};
pub use config::{load_settings, Settings, Timeouts};
pub use error::ActionError;
pub use pipeline::{DocumentFile, IngestionPipeline, PipelineError, UploadPreview, UploadStage};
pub use session::{
    ApplyMode, SessionController, SessionPhase, SessionServices, SessionState, SessionUser,
};
pub use view::{
    Action, AuthScreen, CompanyForm, CompanyFormMode, JobForm, Notification, NotificationLevel,
    NotificationTarget, View,
};

use pipeline::SelectedFileInfo;

#[derive(Debug, Clone)]
pub enum ClientEvent {
    ViewChanged(View),
    LoadingChanged(bool),
    HeaderChanged(Option<String>),
    CompanyFormChanged(CompanyForm),
    JobsLoading,
    JobsLoaded(Vec<JobRecord>),
    JobFormChanged(JobForm),
    FocusJobForm,
    Notification(Notification),
    ActionControl {
        action: Action,
        enabled: bool,
        label: String,
    },
    UploadProgress {
        job_id: Uuid,
        stage: UploadStage,
        percent: u8,
        status: String,
    },
    UploadPreviewReady(UploadPreview),
    UploadPreviewCleared,
    UploadPanelVisible(bool),
    FileSelected(Option<SelectedFileInfo>),
}
