use std::collections::BTreeMap;

use shared::{domain::CompanyDraft, protocol::JobFormData};
use tokio::sync::broadcast;

use crate::ClientEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScreen {
    Login,
    SignUp,
    ResetPassword,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Initializing,
    Loading,
    Auth(AuthScreen),
    CompanyForm,
    JobView,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompanyFormMode {
    Create,
    Edit,
}

impl CompanyFormMode {
    pub fn submit_label(self) -> &'static str {
        match self {
            Self::Create => "Create Company Profile",
            Self::Edit => "Update Company Profile",
        }
    }

    pub fn busy_label(self) -> &'static str {
        match self {
            Self::Create => "Creating Company Profile...",
            Self::Edit => "Updating Company Profile...",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanyForm {
    pub mode: CompanyFormMode,
    pub fields: CompanyDraft,
    pub company_name: Option<String>,
}

impl Default for CompanyForm {
    fn default() -> Self {
        Self {
            mode: CompanyFormMode::Create,
            fields: CompanyDraft::default(),
            company_name: None,
        }
    }
}

impl CompanyForm {
    pub fn title(&self) -> &'static str {
        match self.mode {
            CompanyFormMode::Create => "Create Company Profile",
            CompanyFormMode::Edit => "Edit Company Profile",
        }
    }
}

pub const EMPTY_JOB_LIST_MESSAGE: &str = "No job descriptions added yet.";

pub const JOB_FORM_FIELDS: &[&str] = &[
    "title",
    "job_code",
    "job_level",
    "department",
    "job_function",
    "contract_duration",
    "time_commitment",
    "job_summary",
    "day_to_day_tasks",
    "performance_indicators",
    "decision_making",
    "stakeholder_interactions",
    "required_qualifications",
    "preferred_qualifications",
    "mandatory_certifications",
    "legal_eligibility",
    "background_checks",
    "clearance_level",
    "hard_skills",
    "soft_skills",
    "domain_expertise",
    "methodologies",
    "languages",
    "skills_priority",
    "base_salary",
    "bonus_structure",
    "equity_options",
    "benefits",
    "relocation_assistance",
    "visa_sponsorship",
    "work_model",
    "work_locations",
    "travel_requirements",
    "shift_type",
    "growth_opportunities",
    "training_development",
    "mentorship",
    "succession_planning",
    "culture_page_link",
    "careers_page_link",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobForm {
    fields: BTreeMap<String, String>,
}

impl JobForm {
    pub fn get(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or_default()
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) -> bool {
        if !JOB_FORM_FIELDS.contains(&name) {
            return false;
        }
        self.fields.insert(name.to_string(), value.into());
        true
    }

    pub fn title(&self) -> &str {
        self.get("title")
    }

    pub fn is_empty(&self) -> bool {
        self.fields.values().all(|value| value.is_empty())
    }

    pub fn reset(&mut self) {
        self.fields.clear();
    }

    pub fn fill_all(&mut self, data: &JobFormData) {
        for name in JOB_FORM_FIELDS {
            if let Some(value) = data.field_value(name) {
                self.fields.insert((*name).to_string(), value);
            }
        }
    }

    pub fn fill_basics(&mut self, data: &JobFormData) {
        self.fields
            .insert("title".into(), data.title.clone().unwrap_or_default());
        self.fields
            .insert("job_summary".into(), data.job_summary.clone().unwrap_or_default());
    }

    pub fn submission_fields(&self) -> BTreeMap<String, String> {
        self.fields
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Success,
    Error,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationTarget {
    Toast,
    CompanyForm,
    JobForm,
    JobList,
    Upload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    pub target: NotificationTarget,
}

impl Notification {
    pub fn success(target: NotificationTarget, message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            message: message.into(),
            target,
        }
    }

    pub fn error(target: NotificationTarget, message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
            target,
        }
    }

    pub fn info(target: NotificationTarget, message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            message: message.into(),
            target,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    SignIn,
    SignUp,
    ResetPassword,
    SaveCompany,
    SubmitJob,
    UploadDocument,
}

impl Action {
    pub fn idle_label(self) -> &'static str {
        match self {
            Self::SignIn => "Sign In",
            Self::SignUp => "Create Account",
            Self::ResetPassword => "Send Reset Link",
            Self::SaveCompany => "Create Company Profile",
            Self::SubmitJob => "Add Job Description",
            Self::UploadDocument => "Upload & Process",
        }
    }

    pub fn busy_label(self) -> &'static str {
        match self {
            Self::SignIn => "Signing in...",
            Self::SignUp => "Creating account...",
            Self::ResetPassword => "Sending reset link...",
            Self::SaveCompany => "Saving Company Profile...",
            Self::SubmitJob => "Adding Job Description...",
            Self::UploadDocument => "Processing...",
        }
    }
}

/// Disables an action control for its lifetime and re-enables it on drop,
/// so every exit path of an action restores the control.
pub(crate) struct ControlGuard {
    events: broadcast::Sender<ClientEvent>,
    action: Action,
    idle_label: &'static str,
}

impl ControlGuard {
    pub(crate) fn engage(events: &broadcast::Sender<ClientEvent>, action: Action) -> Self {
        Self::engage_with(events, action, action.busy_label(), action.idle_label())
    }

    pub(crate) fn engage_with(
        events: &broadcast::Sender<ClientEvent>,
        action: Action,
        busy_label: &'static str,
        idle_label: &'static str,
    ) -> Self {
        let _ = events.send(ClientEvent::ActionControl {
            action,
            enabled: false,
            label: busy_label.to_string(),
        });
        Self {
            events: events.clone(),
            action,
            idle_label,
        }
    }

    pub(crate) fn set_idle_label(&mut self, label: &'static str) {
        self.idle_label = label;
    }
}

impl Drop for ControlGuard {
    fn drop(&mut self) {
        let _ = self.events.send(ClientEvent::ActionControl {
            action: self.action,
            enabled: true,
            label: self.idle_label.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn company_form_titles_follow_mode() {
        let mut form = CompanyForm::default();
        assert_eq!(form.title(), "Create Company Profile");
        form.mode = CompanyFormMode::Edit;
        assert_eq!(form.title(), "Edit Company Profile");
        assert_eq!(form.mode.submit_label(), "Update Company Profile");
        assert_eq!(CompanyFormMode::Create.busy_label(), "Creating Company Profile...");
    }

    #[test]
    fn job_form_ignores_unknown_fields() {
        let mut form = JobForm::default();
        assert!(form.set("title", "Engineer"));
        assert!(!form.set("salary_band", "L5"));
        assert_eq!(form.title(), "Engineer");
        assert_eq!(form.get("salary_band"), "");
    }

    #[test]
    fn fill_all_only_touches_fields_present_in_record() {
        let data: JobFormData = serde_json::from_value(serde_json::json!({
            "title": "Engineer",
            "job_summary": null,
            "hard_skills": ["rust", "sql"],
            "not_a_form_field": "ignored"
        }))
        .expect("form data");

        let mut form = JobForm::default();
        form.set("benefits", "Pension");
        form.fill_all(&data);

        assert_eq!(form.title(), "Engineer");
        assert_eq!(form.get("job_summary"), "");
        assert_eq!(form.get("hard_skills"), "rust\nsql");
        assert_eq!(form.get("benefits"), "Pension");
        assert_eq!(form.get("not_a_form_field"), "");
    }

    #[test]
    fn fill_basics_sets_title_and_summary_only() {
        let data: JobFormData = serde_json::from_value(serde_json::json!({
            "title": "Engineer",
            "job_summary": "Build things",
            "hard_skills": ["rust"]
        }))
        .expect("form data");

        let mut form = JobForm::default();
        form.fill_basics(&data);
        assert_eq!(form.title(), "Engineer");
        assert_eq!(form.get("job_summary"), "Build things");
        assert_eq!(form.get("hard_skills"), "");
        assert_eq!(form.submission_fields().len(), 2);
    }

    #[test]
    fn control_guard_restores_on_drop() {
        let (events, mut rx) = broadcast::channel(8);
        {
            let mut guard = ControlGuard::engage(&events, Action::SaveCompany);
            guard.set_idle_label("Update Company Profile");
        }
        match rx.try_recv().expect("disable event") {
            ClientEvent::ActionControl { enabled, label, .. } => {
                assert!(!enabled);
                assert_eq!(label, "Saving Company Profile...");
            }
            other => panic!("unexpected event {other:?}"),
        }
        match rx.try_recv().expect("enable event") {
            ClientEvent::ActionControl { enabled, label, .. } => {
                assert!(enabled);
                assert_eq!(label, "Update Company Profile");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
