use std::sync::atomic::AtomicUsize;

use super::*;
use async_trait::async_trait;
use serde_json::json;
use shared::error::{ApiException, ErrorCode};
use tokio::sync::Notify;

struct FakeDocuments {
    extract: Result<ExtractedJobDescription, BackendError>,
    enhance: Result<EnhancementResult, BackendError>,
    extract_gate: Option<Arc<Notify>>,
    extract_delay: Option<Duration>,
    extract_calls: Arc<AtomicUsize>,
    enhance_calls: Arc<AtomicUsize>,
}

impl FakeDocuments {
    fn ok(enhanced: EnhancementResult) -> Self {
        Self {
            extract: Ok(extracted_record()),
            enhance: Ok(enhanced),
            extract_gate: None,
            extract_delay: None,
            extract_calls: Arc::new(AtomicUsize::new(0)),
            enhance_calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl DocumentService for FakeDocuments {
    async fn extract_document(
        &self,
        file: &DocumentFile,
    ) -> Result<ExtractedJobDescription, BackendError> {
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        assert!(!file.bytes.is_empty());
        if let Some(gate) = &self.extract_gate {
            gate.notified().await;
        }
        if let Some(delay) = self.extract_delay {
            tokio::time::sleep(delay).await;
        }
        self.extract.clone()
    }

    async fn enhance_document(
        &self,
        extracted: &ExtractedJobDescription,
    ) -> Result<EnhancementResult, BackendError> {
        self.enhance_calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(extracted.job_title, "Data Analyst");
        assert_eq!(extracted.extra.get("source_filename"), Some(&json!("jd.pdf")));
        self.enhance.clone()
    }
}

fn extracted_record() -> ExtractedJobDescription {
    serde_json::from_value(json!({
        "job_title": "Data Analyst",
        "job_description": "Analyse data",
        "industry_name": "Finance",
        "source_filename": "jd.pdf"
    }))
    .expect("extracted")
}

fn enhancement(responsibilities: usize, skills: usize, experience: Option<i64>) -> EnhancementResult {
    serde_json::from_value(json!({
        "enhanced_jd": {
            "job_title": "Senior Data Analyst",
            "industry_name": "Finance",
            "min_work_experience": experience,
            "role_summary": "Turn data into decisions",
            "responsibilities": (1..=responsibilities).map(|i| format!("duty {i}")).collect::<Vec<_>>(),
            "required_skills": (1..=skills).map(|i| format!("skill {i}")).collect::<Vec<_>>()
        },
        "job_form_data": {
            "title": "Senior Data Analyst",
            "job_summary": "Turn data into decisions",
            "hard_skills": ["sql", "python"]
        }
    }))
    .expect("enhancement")
}

fn pdf(size: usize) -> DocumentFile {
    DocumentFile::new("jd.pdf", "application/pdf", vec![b'%'; size])
}

fn pipeline_with(fake: FakeDocuments) -> (IngestionPipeline, broadcast::Receiver<ClientEvent>) {
    let (events, rx) = broadcast::channel(64);
    (
        IngestionPipeline::new(Arc::new(fake), events, Duration::from_secs(5)),
        rx,
    )
}

fn drain(rx: &mut broadcast::Receiver<ClientEvent>) -> Vec<ClientEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn progress(events: &[ClientEvent]) -> Vec<(UploadStage, u8, String)> {
    events
        .iter()
        .filter_map(|event| match event {
            ClientEvent::UploadProgress {
                stage,
                percent,
                status,
                ..
            } => Some((*stage, *percent, status.clone())),
            _ => None,
        })
        .collect()
}

#[test]
fn rejects_unsupported_types_and_oversized_files() {
    let fake = FakeDocuments::ok(enhancement(1, 1, None));
    let calls = fake.extract_calls.clone();
    let (pipeline, _rx) = pipeline_with(fake);

    let text = DocumentFile::new("jd.txt", "text/plain", b"hello".to_vec());
    assert_eq!(pipeline.select(text), Err(PipelineError::InvalidType));
    assert_eq!(
        pipeline.select(pdf(MAX_DOCUMENT_BYTES + 1)),
        Err(PipelineError::TooLarge)
    );
    assert_eq!(pipeline.stage(), None);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    for mime in ALLOWED_MIME_TYPES {
        let file = DocumentFile::new("jd", *mime, vec![1; MAX_DOCUMENT_BYTES]);
        assert!(validate_document(&file).is_ok(), "{mime} should be accepted");
    }
    assert_eq!(
        PipelineError::InvalidType.to_string(),
        "Invalid file type. Please upload PDF, DOCX, DOC, JPG, or PNG files."
    );
    assert_eq!(
        PipelineError::TooLarge.to_string(),
        "File is too large. Maximum size is 5MB."
    );
}

#[tokio::test]
async fn rejected_selection_keeps_previous_file() {
    let (pipeline, _rx) = pipeline_with(FakeDocuments::ok(enhancement(1, 1, None)));
    pipeline.select(pdf(10)).expect("select");
    let before = pipeline.selected_file();

    let png = DocumentFile::new("big.png", "image/png", vec![0; MAX_DOCUMENT_BYTES + 1]);
    assert!(pipeline.process_file(png).await.is_err());
    assert_eq!(pipeline.selected_file(), before);
    assert_eq!(pipeline.stage(), Some(UploadStage::Selected));
}

#[tokio::test]
async fn successful_run_reports_each_stage_and_truncates_preview() {
    let fake = FakeDocuments::ok(enhancement(7, 3, Some(4)));
    let enhance_calls = fake.enhance_calls.clone();
    let (pipeline, mut rx) = pipeline_with(fake);

    let preview = pipeline.process_file(pdf(2048)).await.expect("processed");

    assert_eq!(preview.job_title, "Senior Data Analyst");
    assert_eq!(preview.experience, "4 years");
    assert_eq!(preview.responsibilities.items.len(), 5);
    assert_eq!(preview.responsibilities.items[4], "duty 5");
    assert_eq!(
        preview.responsibilities.more_label().as_deref(),
        Some("...and 2 more")
    );
    assert_eq!(preview.required_skills.items.len(), 3);
    assert_eq!(preview.required_skills.more_label(), None);
    assert_eq!(enhance_calls.load(Ordering::SeqCst), 1);
    assert_eq!(pipeline.stage(), Some(UploadStage::Presented));
    assert!(pipeline.result().is_some());

    let events = drain(&mut rx);
    assert_eq!(
        progress(&events),
        vec![
            (UploadStage::Uploading, 10, "Uploading file...".to_string()),
            (UploadStage::Extracting, 30, "Extracting information...".to_string()),
            (UploadStage::Enhancing, 70, "Enhancing job description...".to_string()),
            (UploadStage::Presented, 100, "Completed".to_string()),
        ]
    );
    assert!(events
        .iter()
        .any(|event| matches!(event, ClientEvent::UploadPreviewReady(p) if *p == preview)));
    assert!(matches!(
        events.last(),
        Some(ClientEvent::ActionControl { action: Action::UploadDocument, enabled: true, .. })
    ));

    let result = pipeline.take_result().expect("result");
    assert_eq!(result.job_form_data.title.as_deref(), Some("Senior Data Analyst"));
    assert_eq!(pipeline.stage(), None);
    assert_eq!(pipeline.take_result(), Err(PipelineError::NoResult));
}

#[tokio::test]
async fn enhance_failure_fails_the_job_and_keeps_the_file() {
    let mut fake = FakeDocuments::ok(enhancement(1, 1, None));
    fake.enhance = Err(BackendError::Api(ApiException::new(
        ErrorCode::Internal,
        "Enhancement service unavailable",
    )));
    let (pipeline, mut rx) = pipeline_with(fake);

    let err = pipeline.process_file(pdf(100)).await.expect_err("enhance fails");
    assert_eq!(
        err,
        PipelineError::Enhance("Enhancement service unavailable".into())
    );
    assert_eq!(pipeline.stage(), Some(UploadStage::Failed));
    assert!(pipeline.result().is_none());
    assert!(pipeline.selected_file().is_some());
    assert_eq!(pipeline.take_result(), Err(PipelineError::NoResult));

    let stages = progress(&drain(&mut rx));
    assert_eq!(
        stages.last(),
        Some(&(
            UploadStage::Failed,
            70,
            "Error: Enhancement service unavailable".to_string()
        ))
    );

    // A failed run can be retried with the same file.
    let err = pipeline.process().await.expect_err("still failing");
    assert!(matches!(err, PipelineError::Enhance(_)));
}

#[tokio::test]
async fn extract_failure_without_detail_uses_fallback() {
    let mut fake = FakeDocuments::ok(enhancement(1, 1, None));
    fake.extract = Err(BackendError::Api(ApiException::new(ErrorCode::Internal, "")));
    let enhance_calls = fake.enhance_calls.clone();
    let (pipeline, _rx) = pipeline_with(fake);

    let err = pipeline.process_file(pdf(100)).await.expect_err("extract fails");
    assert_eq!(err.to_string(), "Failed to extract job description");
    assert_eq!(enhance_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn second_run_while_in_flight_is_rejected() {
    let gate = Arc::new(Notify::new());
    let mut fake = FakeDocuments::ok(enhancement(1, 1, None));
    fake.extract_gate = Some(gate.clone());
    let (pipeline, mut rx) = pipeline_with(fake);
    let pipeline = Arc::new(pipeline);
    pipeline.select(pdf(100)).expect("select");

    let running = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move { pipeline.process().await })
    };
    loop {
        match rx.recv().await.expect("event") {
            ClientEvent::UploadProgress {
                stage: UploadStage::Uploading,
                ..
            } => break,
            _ => continue,
        }
    }

    assert!(pipeline.is_processing());
    assert_eq!(pipeline.process().await, Err(PipelineError::Busy));
    assert_eq!(pipeline.select(pdf(5)), Err(PipelineError::Busy));

    gate.notify_one();
    running.await.expect("join").expect("first run completes");
    assert!(!pipeline.is_processing());
}

#[tokio::test]
async fn removing_the_file_abandons_an_in_flight_run() {
    let gate = Arc::new(Notify::new());
    let mut fake = FakeDocuments::ok(enhancement(1, 1, None));
    fake.extract_gate = Some(gate.clone());
    let enhance_calls = fake.enhance_calls.clone();
    let (pipeline, mut rx) = pipeline_with(fake);
    let pipeline = Arc::new(pipeline);
    pipeline.select(pdf(100)).expect("select");

    let running = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move { pipeline.process().await })
    };
    loop {
        if let ClientEvent::UploadProgress { .. } = rx.recv().await.expect("event") {
            break;
        }
    }

    pipeline.remove();
    gate.notify_one();
    let outcome = running.await.expect("join");
    assert_eq!(outcome, Err(PipelineError::Superseded));
    assert_eq!(enhance_calls.load(Ordering::SeqCst), 0);
    assert_eq!(pipeline.stage(), None);
    assert!(!drain(&mut rx)
        .iter()
        .any(|event| matches!(event, ClientEvent::UploadPreviewReady(_))));
}

#[tokio::test]
async fn slow_extraction_times_out() {
    let mut fake = FakeDocuments::ok(enhancement(1, 1, None));
    fake.extract_delay = Some(Duration::from_secs(5));
    let (events, _rx) = broadcast::channel(64);
    let pipeline = IngestionPipeline::new(Arc::new(fake), events, Duration::from_millis(50));

    let err = pipeline.process_file(pdf(100)).await.expect_err("timeout");
    assert_eq!(err, PipelineError::TimedOut { stage: "extraction" });
    assert_eq!(pipeline.stage(), Some(UploadStage::Failed));
}

#[test]
fn preview_experience_and_file_sizes() {
    let none = UploadPreview::from_enhanced(&enhancement(0, 0, None).enhanced_jd);
    assert_eq!(none.experience, "Not specified");
    assert_eq!(none.responsibilities, TruncatedList::default());
    let zero = UploadPreview::from_enhanced(&enhancement(0, 0, Some(0)).enhanced_jd);
    assert_eq!(zero.experience, "Not specified");

    assert_eq!(format_file_size(512), "512 bytes");
    assert_eq!(format_file_size(1536), "1.5 KB");
    assert_eq!(format_file_size(2 * 1024 * 1024), "2.0 MB");
}
