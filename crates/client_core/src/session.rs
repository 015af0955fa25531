use std::sync::Arc;

use shared::{
    domain::{Company, CompanyDraft, CompanyId, JobRecord, UserId},
    protocol::{CreateCompanyRequest, SubmitJobRequest, UpdateCompanyRequest},
    validation::{reset_password_allowed, sign_in_allowed, SignUpCheck},
};
use storage::CompanyIdCache;
use tokio::{
    sync::{broadcast, broadcast::error::RecvError, Mutex, MutexGuard},
    task::JoinHandle,
    time::timeout,
};
use tracing::{debug, info, warn};

use crate::{
    auth::{AuthGateway, AuthUser, ResetFailure, SignInFailure, SignUpFailure},
    backend::{BackendError, CompanyService, DocumentService, JobService},
    config::Timeouts,
    error::ActionError,
    pipeline::{DocumentFile, IngestionPipeline, PipelineError, SelectedFileInfo, UploadPreview},
    view::{
        Action, AuthScreen, CompanyForm, CompanyFormMode, ControlGuard, JobForm, Notification,
        NotificationTarget, View,
    },
    ClientEvent,
};

const NO_COMPANY_MESSAGE: &str = "Please create a company profile first";
const ACCOUNT_CREATED_MESSAGE: &str =
    "Account created successfully! Please check your email for verification.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    LoggedOut,
    LoggingInPending,
    AuthedNoCompany,
    AuthedWithCompany,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub user_id: UserId,
    pub email: Option<String>,
}

impl From<&AuthUser> for SessionUser {
    fn from(user: &AuthUser) -> Self {
        Self {
            user_id: user.user_id.clone(),
            email: user.email.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub user: Option<SessionUser>,
    pub phase: SessionPhase,
    pub company_id: Option<CompanyId>,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    UseAll,
    EditManually,
}

#[derive(Clone)]
pub struct SessionServices {
    pub gateway: Arc<dyn AuthGateway>,
    pub companies: Arc<dyn CompanyService>,
    pub jobs: Arc<dyn JobService>,
    pub documents: Arc<dyn DocumentService>,
    pub cache: Arc<dyn CompanyIdCache>,
}

struct ControllerState {
    generation: u64,
    phase: SessionPhase,
    user: Option<SessionUser>,
    company_id: Option<CompanyId>,
    company_form: CompanyForm,
    job_form: JobForm,
    jobs: Vec<JobRecord>,
    view: View,
}

impl Default for ControllerState {
    fn default() -> Self {
        Self {
            generation: 0,
            phase: SessionPhase::LoggedOut,
            user: None,
            company_id: None,
            company_form: CompanyForm::default(),
            job_form: JobForm::default(),
            jobs: Vec::new(),
            view: View::Initializing,
        }
    }
}

impl ControllerState {
    fn is_authenticated(&self) -> bool {
        matches!(
            self.phase,
            SessionPhase::AuthedNoCompany | SessionPhase::AuthedWithCompany
        )
    }
}

pub struct SessionController {
    gateway: Arc<dyn AuthGateway>,
    companies: Arc<dyn CompanyService>,
    jobs: Arc<dyn JobService>,
    cache: Arc<dyn CompanyIdCache>,
    pipeline: IngestionPipeline,
    timeouts: Timeouts,
    inner: Mutex<ControllerState>,
    events: broadcast::Sender<ClientEvent>,
    auth_task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionController {
    pub fn new(services: SessionServices, timeouts: Timeouts) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        let pipeline =
            IngestionPipeline::new(services.documents, events.clone(), timeouts.processing);
        Arc::new(Self {
            gateway: services.gateway,
            companies: services.companies,
            jobs: services.jobs,
            cache: services.cache,
            pipeline,
            timeouts,
            inner: Mutex::new(ControllerState::default()),
            events,
            auth_task: Mutex::new(None),
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub fn pipeline(&self) -> &IngestionPipeline {
        &self.pipeline
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }

    fn notify(&self, notification: Notification) {
        self.emit(ClientEvent::Notification(notification));
    }

    fn set_view(&self, state: &mut ControllerState, view: View) {
        state.view = view;
        self.emit(ClientEvent::ViewChanged(view));
    }

    /// Locks the state only if the session is still the one `generation`
    /// was captured from.
    async fn lock_current(&self, generation: u64) -> Option<MutexGuard<'_, ControllerState>> {
        let state = self.inner.lock().await;
        (state.generation == generation).then_some(state)
    }

    pub async fn start(self: &Arc<Self>) {
        let mut changes = self.gateway.subscribe();
        let initial = self.gateway.current_user().await;
        self.handle_auth_change(initial).await;

        let controller = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            loop {
                let user = match changes.recv().await {
                    Ok(change) => change.user,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "session: auth events lagged; re-reading current user");
                        let Some(controller) = controller.upgrade() else {
                            break;
                        };
                        controller.gateway.current_user().await
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(controller) = controller.upgrade() else {
                    break;
                };
                controller.handle_auth_change(user).await;
            }
            debug!("session: auth event loop stopped");
        });
        *self.auth_task.lock().await = Some(task);
    }

    pub async fn shutdown(&self) {
        if let Some(task) = self.auth_task.lock().await.take() {
            task.abort();
        }
    }

    pub async fn handle_auth_change(
        self: &Arc<Self>,
        user: Option<AuthUser>,
    ) -> Option<JoinHandle<()>> {
        let Some(user) = user else {
            self.enter_logged_out().await;
            return None;
        };

        let session_user = SessionUser::from(&user);
        let generation = {
            let mut state = self.inner.lock().await;
            let same_user = state.user.as_ref().map(|u| &u.user_id) == Some(&session_user.user_id);
            if state.phase != SessionPhase::LoggedOut && same_user {
                debug!(user_id = %session_user.user_id, "session: ignoring repeated login callback");
                return None;
            }

            state.generation += 1;
            if state.user.is_some() {
                debug!(user_id = %session_user.user_id, "session: switching user without sign-out");
                self.clear_user_data(&mut state);
            } else {
                state.company_id = None;
                state.company_form = CompanyForm::default();
                state.jobs.clear();
            }
            state.phase = SessionPhase::LoggingInPending;
            state.user = Some(session_user.clone());
            info!(
                user_id = %session_user.user_id,
                generation = state.generation,
                "session: signed in; resolving company"
            );
            self.emit(ClientEvent::HeaderChanged(session_user.email.clone()));
            self.emit(ClientEvent::LoadingChanged(true));
            self.set_view(&mut state, View::Loading);
            state.generation
        };

        let controller = Arc::clone(self);
        Some(tokio::spawn(async move {
            controller
                .resolve_company(generation, session_user.user_id)
                .await;
        }))
    }

    async fn resolve_company(&self, generation: u64, user_id: UserId) {
        let lookup = timeout(
            self.timeouts.request,
            self.companies.get_company_by_user(&user_id),
        )
        .await;

        match lookup {
            Ok(Ok(Some(company))) => self.on_company_found(generation, company).await,
            Ok(Ok(None)) => self.on_company_missing(generation).await,
            Ok(Err(err)) => self.on_lookup_failed(generation, err.user_message()).await,
            Err(_) => {
                let message = format!(
                    "company lookup timed out after {}s",
                    self.timeouts.request.as_secs()
                );
                self.on_lookup_failed(generation, message).await
            }
        }
    }

    async fn on_company_found(&self, generation: u64, company: Company) {
        let Some(mut state) = self.lock_current(generation).await else {
            debug!(generation, "session: discarding stale company lookup");
            return;
        };
        let Some(user) = state.user.clone() else {
            return;
        };

        if let Err(err) = self.cache.store(&user.user_id, company.id).await {
            warn!(user_id = %user.user_id, company_id = company.id.0, error = %err, "session: failed to persist company id");
        }
        info!(user_id = %user.user_id, company_id = company.id.0, "session: company resolved");

        state.company_id = Some(company.id);
        state.phase = SessionPhase::AuthedWithCompany;
        state.company_form = CompanyForm {
            mode: CompanyFormMode::Edit,
            fields: CompanyDraft::from(&company),
            company_name: Some(company.name.clone()),
        };
        self.emit(ClientEvent::CompanyFormChanged(state.company_form.clone()));
        self.emit(ClientEvent::LoadingChanged(false));
        self.set_view(&mut state, View::JobView);
        self.emit(ClientEvent::UploadPanelVisible(true));
        drop(state);

        let _ = self.load_jobs().await;
    }

    async fn on_company_missing(&self, generation: u64) {
        let Some(mut state) = self.lock_current(generation).await else {
            debug!(generation, "session: discarding stale company lookup");
            return;
        };

        if let Err(err) = self.cache.clear().await {
            warn!(error = %err, "session: failed to clear cached company id");
        }
        info!("session: no company profile yet");

        state.company_id = None;
        state.phase = SessionPhase::AuthedNoCompany;
        state.company_form = CompanyForm::default();
        self.emit(ClientEvent::CompanyFormChanged(state.company_form.clone()));
        self.emit(ClientEvent::LoadingChanged(false));
        self.set_view(&mut state, View::CompanyForm);
    }

    async fn on_lookup_failed(&self, generation: u64, message: String) {
        let Some(mut state) = self.lock_current(generation).await else {
            debug!(generation, "session: discarding stale company lookup failure");
            return;
        };
        warn!(generation, error = %message, "session: company lookup failed");

        state.company_id = None;
        state.phase = SessionPhase::AuthedNoCompany;
        state.company_form = CompanyForm::default();
        self.notify(Notification::error(
            NotificationTarget::Toast,
            format!("Error loading company profile: {message}"),
        ));
        self.emit(ClientEvent::CompanyFormChanged(state.company_form.clone()));
        self.emit(ClientEvent::LoadingChanged(false));
        self.set_view(&mut state, View::CompanyForm);
    }

    async fn enter_logged_out(&self) {
        let mut state = self.inner.lock().await;
        state.generation += 1;
        state.phase = SessionPhase::LoggedOut;
        state.user = None;
        self.clear_user_data(&mut state);

        if let Err(err) = self.cache.clear().await {
            warn!(error = %err, "session: failed to clear cached company id");
        }
        info!(generation = state.generation, "session: signed out");

        self.emit(ClientEvent::HeaderChanged(None));
        self.emit(ClientEvent::LoadingChanged(false));
        self.set_view(&mut state, View::Auth(AuthScreen::Login));
    }

    /// Drops everything tied to the previous user. Resetting the pipeline also
    /// bumps its epoch, so a run that user started cannot publish any more.
    fn clear_user_data(&self, state: &mut ControllerState) {
        state.company_id = None;
        state.company_form = CompanyForm::default();
        state.job_form.reset();
        state.jobs.clear();
        self.pipeline.reset();
        self.emit(ClientEvent::JobFormChanged(state.job_form.clone()));
        self.emit(ClientEvent::UploadPanelVisible(false));
    }

    pub async fn show_auth_screen(&self, screen: AuthScreen) -> bool {
        let mut state = self.inner.lock().await;
        if state.phase != SessionPhase::LoggedOut {
            return false;
        }
        self.set_view(&mut state, View::Auth(screen));
        true
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), ActionError> {
        if !sign_in_allowed(email, password) {
            let message = "Please enter both email and password";
            self.notify(Notification::error(NotificationTarget::Toast, message));
            return Err(ActionError::Validation(message.into()));
        }

        let _control = ControlGuard::engage(&self.events, Action::SignIn);
        match timeout(self.timeouts.request, self.gateway.sign_in(email.trim(), password)).await {
            Ok(Ok(user)) => {
                debug!(user_id = %user.user_id, "session: sign-in accepted");
                Ok(())
            }
            Ok(Err(err)) => {
                let message = SignInFailure::classify(&err).user_message(&err);
                warn!(error = %err, "session: sign-in failed");
                self.notify(Notification::error(NotificationTarget::Toast, message));
                Err(err.into())
            }
            Err(_) => Err(self.timed_out("sign-in", "Error signing in")),
        }
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        confirm: &str,
    ) -> Result<(), ActionError> {
        let email = email.trim();
        let check = SignUpCheck::evaluate(email, password, confirm);
        if let Some(reason) = check.blocking_reason() {
            self.notify(Notification::error(NotificationTarget::Toast, reason.clone()));
            return Err(ActionError::Validation(reason));
        }

        let _control = ControlGuard::engage(&self.events, Action::SignUp);
        let user = match timeout(self.timeouts.request, self.gateway.sign_up(email, password)).await {
            Ok(Ok(user)) => user,
            Ok(Err(err)) => {
                let message = SignUpFailure::classify(&err).user_message(&err);
                warn!(error = %err, "session: sign-up failed");
                self.notify(Notification::error(NotificationTarget::Toast, message));
                return Err(err.into());
            }
            Err(_) => return Err(self.timed_out("sign-up", "Error creating account")),
        };

        match timeout(self.timeouts.request, self.gateway.send_verification_email(&user)).await {
            Ok(Ok(())) => info!(user_id = %user.user_id, "session: verification email requested"),
            Ok(Err(err)) => {
                warn!(user_id = %user.user_id, error = %err, "session: verification email failed")
            }
            Err(_) => warn!(user_id = %user.user_id, "session: verification email timed out"),
        }

        self.show_auth_screen(AuthScreen::Login).await;
        self.notify(Notification::success(
            NotificationTarget::Toast,
            ACCOUNT_CREATED_MESSAGE,
        ));
        Ok(())
    }

    pub async fn reset_password(&self, email: &str) -> Result<(), ActionError> {
        if !reset_password_allowed(email) {
            let message = "Please enter a valid email address";
            self.notify(Notification::error(NotificationTarget::Toast, message));
            return Err(ActionError::Validation(message.into()));
        }

        let _control = ControlGuard::engage(&self.events, Action::ResetPassword);
        match timeout(self.timeouts.request, self.gateway.send_password_reset(email.trim())).await {
            Ok(Ok(())) => {
                self.show_auth_screen(AuthScreen::Login).await;
                self.notify(Notification::success(
                    NotificationTarget::Toast,
                    "Password reset link sent to your email",
                ));
                Ok(())
            }
            Ok(Err(err)) => {
                let message = ResetFailure::classify(&err).user_message(&err);
                warn!(error = %err, "session: password reset failed");
                self.notify(Notification::error(NotificationTarget::Toast, message));
                Err(err.into())
            }
            Err(_) => Err(self.timed_out("password reset", "Error sending reset link")),
        }
    }

    pub async fn sign_out(&self) -> Result<(), ActionError> {
        let result = timeout(self.timeouts.request, self.gateway.sign_out()).await;

        self.inner.lock().await.company_id = None;
        if let Err(err) = self.cache.clear().await {
            warn!(error = %err, "session: failed to clear cached company id");
        }

        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => {
                warn!(error = %err, "session: sign-out failed");
                self.notify(Notification::error(
                    NotificationTarget::Toast,
                    format!("Error signing out: {err}"),
                ));
                Err(err.into())
            }
            Err(_) => Err(self.timed_out("sign-out", "Error signing out")),
        }
    }

    pub async fn save_company(&self, draft: CompanyDraft) -> Result<Company, ActionError> {
        let (generation, user, company_id) = {
            let state = self.inner.lock().await;
            let Some(user) = state.user.clone() else {
                return Err(ActionError::NotSignedIn);
            };
            if !state.is_authenticated() {
                return Err(ActionError::Validation(
                    "Company profile is still loading".into(),
                ));
            }
            (state.generation, user, state.company_id)
        };

        if draft.name.trim().is_empty() {
            let message = "Please fill in all required fields";
            self.notify(Notification::error(NotificationTarget::CompanyForm, message));
            return Err(ActionError::Validation(message.into()));
        }

        let mode = match company_id {
            Some(_) => CompanyFormMode::Edit,
            None => CompanyFormMode::Create,
        };
        let (busy, idle) = (mode.busy_label(), mode.submit_label());
        let mut control = ControlGuard::engage_with(&self.events, Action::SaveCompany, busy, idle);

        let description = draft
            .description
            .clone()
            .filter(|text| !text.trim().is_empty());
        let request = async {
            match company_id {
                Some(id) => {
                    self.companies
                        .update_company(&UpdateCompanyRequest {
                            id,
                            name: draft.name.clone(),
                            address: draft.address.clone(),
                            description: description.clone(),
                        })
                        .await
                }
                None => {
                    self.companies
                        .create_company(&CreateCompanyRequest {
                            user_id: user.user_id.clone(),
                            name: draft.name.clone(),
                            address: draft.address.clone(),
                            description: description.clone(),
                        })
                        .await
                }
            }
        };
        let company = match timeout(self.timeouts.request, request).await {
            Ok(Ok(company)) => company,
            Ok(Err(err)) => return Err(self.backend_failed(NotificationTarget::CompanyForm, err)),
            Err(_) => return Err(self.timed_out("company save", "Error")),
        };

        let created = company_id.is_none();
        let Some(mut state) = self.lock_current(generation).await else {
            return Err(ActionError::Superseded("company save"));
        };
        if let Err(err) = self.cache.store(&user.user_id, company.id).await {
            warn!(user_id = %user.user_id, company_id = company.id.0, error = %err, "session: failed to persist company id");
        }
        info!(user_id = %user.user_id, company_id = company.id.0, created, "session: company saved");

        state.company_id = Some(company.id);
        state.company_form = CompanyForm {
            mode: CompanyFormMode::Edit,
            fields: draft.clone(),
            company_name: Some(draft.name.clone()),
        };
        control.set_idle_label(CompanyFormMode::Edit.submit_label());
        self.emit(ClientEvent::CompanyFormChanged(state.company_form.clone()));
        self.notify(Notification::success(
            NotificationTarget::CompanyForm,
            format!(
                "Company profile {} successfully!",
                if created { "created" } else { "updated" }
            ),
        ));

        if created {
            state.phase = SessionPhase::AuthedWithCompany;
            self.set_view(&mut state, View::JobView);
            self.emit(ClientEvent::UploadPanelVisible(true));
        }
        drop(state);

        if created {
            let _ = self.load_jobs().await;
        }
        Ok(company)
    }

    pub async fn show_company_form(&self) -> bool {
        let mut state = self.inner.lock().await;
        if !state.is_authenticated() {
            return false;
        }
        self.emit(ClientEvent::CompanyFormChanged(state.company_form.clone()));
        self.set_view(&mut state, View::CompanyForm);
        true
    }

    pub async fn show_job_view(&self) -> Result<Vec<JobRecord>, ActionError> {
        {
            let mut state = self.inner.lock().await;
            if state.user.is_none() {
                return Err(ActionError::NotSignedIn);
            }
            if state.company_id.is_none() {
                drop(state);
                self.notify(Notification::error(NotificationTarget::Toast, NO_COMPANY_MESSAGE));
                return Err(ActionError::Validation(NO_COMPANY_MESSAGE.into()));
            }
            self.set_view(&mut state, View::JobView);
            self.emit(ClientEvent::UploadPanelVisible(true));
        }
        self.load_jobs().await
    }

    pub async fn load_jobs(&self) -> Result<Vec<JobRecord>, ActionError> {
        let (generation, company_id) = {
            let state = self.inner.lock().await;
            (state.generation, state.company_id)
        };
        let Some(company_id) = company_id else {
            return Err(ActionError::Validation(NO_COMPANY_MESSAGE.into()));
        };

        self.emit(ClientEvent::JobsLoading);
        let result = timeout(self.timeouts.request, self.jobs.list_jobs(company_id)).await;

        let Some(mut state) = self.lock_current(generation).await else {
            return Err(ActionError::Superseded("job list"));
        };
        match result {
            Ok(Ok(jobs)) => {
                debug!(company_id = company_id.0, count = jobs.len(), "session: jobs loaded");
                state.jobs = jobs.clone();
                self.emit(ClientEvent::JobsLoaded(jobs.clone()));
                Ok(jobs)
            }
            Ok(Err(err)) => {
                drop(state);
                Err(self.backend_failed(NotificationTarget::JobList, err))
            }
            Err(_) => {
                drop(state);
                Err(self.timed_out("job list", "Error"))
            }
        }
    }

    pub async fn set_job_field(&self, name: &str, value: impl Into<String>) -> bool {
        let mut state = self.inner.lock().await;
        let changed = state.job_form.set(name, value);
        if changed {
            self.emit(ClientEvent::JobFormChanged(state.job_form.clone()));
        }
        changed
    }

    pub async fn submit_job(&self) -> Result<(), ActionError> {
        let (generation, company_id, form) = {
            let state = self.inner.lock().await;
            if state.user.is_none() {
                return Err(ActionError::NotSignedIn);
            }
            (state.generation, state.company_id, state.job_form.clone())
        };

        let Some(company_id) = company_id else {
            self.notify(Notification::error(NotificationTarget::Toast, NO_COMPANY_MESSAGE));
            self.show_company_form().await;
            return Err(ActionError::Validation(NO_COMPANY_MESSAGE.into()));
        };
        if form.title().trim().is_empty() {
            let message = "Please fill in the job title";
            self.notify(Notification::error(NotificationTarget::JobForm, message));
            return Err(ActionError::Validation(message.into()));
        }

        let _control = ControlGuard::engage(&self.events, Action::SubmitJob);
        let request = SubmitJobRequest {
            company_id,
            fields: form.submission_fields(),
        };
        match timeout(self.timeouts.request, self.jobs.submit_job(&request)).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => return Err(self.backend_failed(NotificationTarget::JobForm, err)),
            Err(_) => return Err(self.timed_out("job submission", "Error")),
        }

        {
            let Some(mut state) = self.lock_current(generation).await else {
                return Err(ActionError::Superseded("job submission"));
            };
            info!(company_id = company_id.0, title = %form.title(), "session: job description submitted");
            state.job_form.reset();
            self.emit(ClientEvent::JobFormChanged(state.job_form.clone()));
            self.notify(Notification::success(
                NotificationTarget::JobForm,
                "Job description added successfully!",
            ));
        }
        let _ = self.load_jobs().await;
        Ok(())
    }

    pub fn select_document(&self, file: DocumentFile) -> Result<SelectedFileInfo, ActionError> {
        self.pipeline.select(file).map_err(|err| {
            self.notify(Notification::error(NotificationTarget::Upload, err.to_string()));
            ActionError::from(err)
        })
    }

    pub fn remove_document(&self) {
        self.pipeline.remove();
    }

    pub async fn process_document(&self) -> Result<UploadPreview, ActionError> {
        if self.phase().await != SessionPhase::AuthedWithCompany {
            self.notify(Notification::error(NotificationTarget::Upload, NO_COMPANY_MESSAGE));
            return Err(ActionError::Validation(NO_COMPANY_MESSAGE.into()));
        }

        match self.pipeline.process().await {
            Ok(preview) => Ok(preview),
            Err(PipelineError::Superseded) => Err(PipelineError::Superseded.into()),
            Err(err) => {
                self.notify(Notification::error(NotificationTarget::Upload, err.to_string()));
                Err(err.into())
            }
        }
    }

    pub async fn apply_extracted(&self, mode: ApplyMode) -> Result<JobForm, ActionError> {
        let mut state = self.inner.lock().await;
        if !state.is_authenticated() {
            return Err(ActionError::NotSignedIn);
        }
        let result = match self.pipeline.take_result() {
            Ok(result) => result,
            Err(err) => {
                self.notify(Notification::error(NotificationTarget::Upload, err.to_string()));
                return Err(err.into());
            }
        };

        let notification = match mode {
            ApplyMode::UseAll => {
                state.job_form.fill_all(&result.job_form_data);
                Notification::success(
                    NotificationTarget::JobForm,
                    "Job description data has been filled in the form. Review and submit when ready.",
                )
            }
            ApplyMode::EditManually => {
                state.job_form.fill_basics(&result.job_form_data);
                Notification::info(
                    NotificationTarget::JobForm,
                    "You can now manually edit the job description form.",
                )
            }
        };
        debug!(?mode, "session: applied processed document to job form");

        self.emit(ClientEvent::JobFormChanged(state.job_form.clone()));
        self.emit(ClientEvent::UploadPanelVisible(false));
        self.emit(ClientEvent::FocusJobForm);
        self.notify(notification);
        Ok(state.job_form.clone())
    }

    pub async fn state(&self) -> SessionState {
        let state = self.inner.lock().await;
        SessionState {
            user: state.user.clone(),
            phase: state.phase,
            company_id: state.company_id,
            generation: state.generation,
        }
    }

    pub async fn phase(&self) -> SessionPhase {
        self.inner.lock().await.phase
    }

    pub async fn view(&self) -> View {
        self.inner.lock().await.view
    }

    pub async fn company_form(&self) -> CompanyForm {
        self.inner.lock().await.company_form.clone()
    }

    pub async fn job_form(&self) -> JobForm {
        self.inner.lock().await.job_form.clone()
    }

    pub async fn jobs(&self) -> Vec<JobRecord> {
        self.inner.lock().await.jobs.clone()
    }

    pub async fn company_id(&self) -> Option<CompanyId> {
        self.inner.lock().await.company_id
    }

    pub async fn cached_company_id(&self) -> Option<CompanyId> {
        let state = self.inner.lock().await;
        if state.company_id.is_some() {
            return state.company_id;
        }
        let user = state.user.clone()?;
        match self.cache.load(&user.user_id).await {
            Ok(company_id) => company_id,
            Err(err) => {
                warn!(user_id = %user.user_id, error = %err, "session: failed to read cached company id");
                None
            }
        }
    }

    fn backend_failed(&self, target: NotificationTarget, err: BackendError) -> ActionError {
        warn!(code = ?err.code(), error = %err, "session: backend request failed");
        self.notify(Notification::error(
            target,
            format!("Error: {}", err.user_message()),
        ));
        err.into()
    }

    fn timed_out(&self, operation: &'static str, prefix: &str) -> ActionError {
        let limit = self.timeouts.request;
        warn!(operation, limit_secs = limit.as_secs(), "session: request timed out");
        self.notify(Notification::error(
            NotificationTarget::Toast,
            format!("{prefix}: {operation} timed out"),
        ));
        ActionError::Timeout { operation, limit }
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
