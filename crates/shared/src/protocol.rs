use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{CompanyId, UserId};

pub const STATUS_SUCCESS: &str = "success";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub status: String,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl<T> ApiEnvelope<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: STATUS_SUCCESS.to_string(),
            data: Some(data),
            detail: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCompanyRequest {
    pub user_id: UserId,
    pub name: String,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateCompanyRequest {
    pub id: CompanyId,
    pub name: String,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitJobRequest {
    pub company_id: CompanyId,
    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
}

/// Only the fields the client displays are typed; everything else is carried
/// through untouched so the enhancement call sees the full record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedJobDescription {
    #[serde(default)]
    pub job_title: String,
    #[serde(default)]
    pub job_description: String,
    #[serde(default)]
    pub industry_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_skills: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_work_experience: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnhancedJobDescription {
    #[serde(default)]
    pub job_title: String,
    #[serde(default, alias = "industry")]
    pub industry_name: String,
    #[serde(default, alias = "experience")]
    pub min_work_experience: Option<i64>,
    #[serde(default, alias = "summary")]
    pub role_summary: String,
    #[serde(default, alias = "duties")]
    pub responsibilities: Vec<String>,
    #[serde(default, alias = "skills")]
    pub required_skills: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobFormData {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub job_summary: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl JobFormData {
    pub fn field_value(&self, name: &str) -> Option<String> {
        match name {
            "title" => self.title.clone().or(Some(String::new())),
            "job_summary" => self.job_summary.clone().or(Some(String::new())),
            _ => self.extra.get(name).map(form_text),
        }
    }
}

fn form_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Array(items) => items.iter().map(form_text).collect::<Vec<_>>().join("\n"),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnhancementResult {
    pub enhanced_jd: EnhancedJobDescription,
    pub job_form_data: JobFormData,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthProviderConfig {
    pub api_key: String,
    pub auth_domain: String,
    pub project_id: String,
    pub storage_bucket: String,
    pub messaging_sender_id: String,
    pub app_id: String,
    pub measurement_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracted_record_keeps_unknown_fields_for_enhancement() {
        let raw = serde_json::json!({
            "job_title": "Data Analyst",
            "job_description": "Analyse data",
            "industry_name": "Finance",
            "required_skills": ["sql"],
            "min_work_experience": 2,
            "source_filename": "jd.pdf"
        });
        let extracted: ExtractedJobDescription =
            serde_json::from_value(raw.clone()).expect("extracted");
        assert_eq!(extracted.extra.get("source_filename"), Some(&raw["source_filename"]));
        assert_eq!(serde_json::to_value(&extracted).expect("json"), raw);
    }

    #[test]
    fn enhanced_record_accepts_aliased_field_names() {
        let enhanced: EnhancedJobDescription = serde_json::from_value(serde_json::json!({
            "job_title": "Engineer",
            "industry": "Technology",
            "summary": "Build things",
            "duties": ["ship"],
            "skills": ["rust"]
        }))
        .expect("enhanced");
        assert_eq!(enhanced.industry_name, "Technology");
        assert_eq!(enhanced.role_summary, "Build things");
        assert_eq!(enhanced.responsibilities, vec!["ship".to_string()]);
        assert_eq!(enhanced.required_skills, vec!["rust".to_string()]);
    }

    #[test]
    fn job_form_field_values_flatten_lists_and_nulls() {
        let form: JobFormData = serde_json::from_value(serde_json::json!({
            "title": "Engineer",
            "job_summary": null,
            "day_to_day_tasks": "a\nb",
            "skills_priority": ["rust", "go"],
            "job_level": null
        }))
        .expect("form data");
        assert_eq!(form.field_value("title").as_deref(), Some("Engineer"));
        assert_eq!(form.field_value("job_summary").as_deref(), Some(""));
        assert_eq!(form.field_value("skills_priority").as_deref(), Some("rust\ngo"));
        assert_eq!(form.field_value("job_level").as_deref(), Some(""));
        assert_eq!(form.field_value("benefits"), None);
    }

    #[test]
    fn envelope_without_data_is_still_success() {
        let envelope: ApiEnvelope<serde_json::Value> =
            serde_json::from_str(r#"{"status":"success","data":null}"#).expect("envelope");
        assert!(envelope.is_success());
        assert!(envelope.data.is_none());
    }
}
