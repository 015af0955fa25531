use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use client_core::{
    config::{load_settings_from, DEFAULT_CONFIG_FILE},
    pipeline::UploadPreview,
    view::{EMPTY_JOB_LIST_MESSAGE, JOB_FORM_FIELDS},
    ApplyMode, BackendClient, ClientEvent, DocumentFile, IdentityToolkitGateway,
    NotificationLevel, SessionController, SessionPhase, SessionServices, Settings, View,
};
use futures::StreamExt;
use shared::domain::CompanyDraft;
use storage::{CompanyIdCache, MemoryCompanyIdCache, Storage};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "athena", about = "Company profiles and job descriptions from the terminal")]
struct Cli {
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    #[arg(long)]
    backend_url: Option<String>,
    #[arg(long)]
    database_url: Option<String>,
    /// Identity provider API key; fetched from the backend when unset.
    #[arg(long)]
    api_key: Option<String>,
    /// Keep the cached company id in memory instead of the local database.
    #[arg(long)]
    ephemeral: bool,
    /// Used when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct Credentials {
    #[arg(long, env = "ATHENA_EMAIL")]
    email: String,
    #[arg(long, env = "ATHENA_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the backend is up.
    Health,
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        confirm: String,
    },
    ResetPassword {
        #[arg(long)]
        email: String,
    },
    /// Sign in and show the company profile and its job descriptions.
    Status {
        #[command(flatten)]
        credentials: Credentials,
    },
    /// Create the company profile, or update it if one exists.
    Company {
        #[command(flatten)]
        credentials: Credentials,
        #[arg(long)]
        name: String,
        #[arg(long)]
        address: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Add a job description from form fields.
    Submit {
        #[command(flatten)]
        credentials: Credentials,
        #[arg(long)]
        title: String,
        /// Extra form field as `name=value`; repeatable.
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },
    /// Extract and enhance a job description document, then fill the form.
    Upload {
        #[command(flatten)]
        credentials: Credentials,
        path: PathBuf,
        #[arg(long, value_enum, default_value_t = ApplyArg::UseAll)]
        apply: ApplyArg,
        /// Submit the filled form right away.
        #[arg(long)]
        submit: bool,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum ApplyArg {
    UseAll,
    Edit,
}

impl From<ApplyArg> for ApplyMode {
    fn from(value: ApplyArg) -> Self {
        match value {
            ApplyArg::UseAll => ApplyMode::UseAll,
            ApplyArg::Edit => ApplyMode::EditManually,
        }
    }
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got `{raw}`"))?;
    let name = name.trim();
    if !JOB_FORM_FIELDS.contains(&name) {
        return Err(format!("unknown job form field `{name}`"));
    }
    Ok((name.to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let settings = settings_for(&cli);
    let backend = BackendClient::new(&settings.backend_url, settings.timeouts().processing)
        .with_context(|| format!("invalid backend url {}", settings.backend_url))?;

    if let Command::Health = cli.command {
        let health = backend.health().await.context("backend health check failed")?;
        println!("{}: {}", health.status, health.message);
        return Ok(());
    }

    let controller = connect(&settings, backend, cli.ephemeral).await?;
    let printer = spawn_printer(&controller);
    let outcome = run(&controller, cli.command, settings.timeouts().request).await;

    controller.shutdown().await;
    drop(controller);
    let _ = tokio::time::timeout(Duration::from_secs(1), printer).await;
    outcome
}

fn settings_for(cli: &Cli) -> Settings {
    let mut settings = load_settings_from(&cli.config);
    if let Some(url) = &cli.backend_url {
        settings.backend_url = url.clone();
    }
    if let Some(url) = &cli.database_url {
        settings.database_url = url.clone();
    }
    if let Some(key) = &cli.api_key {
        settings.auth_api_key = Some(key.clone());
    }
    settings
}

async fn connect(
    settings: &Settings,
    backend: BackendClient,
    ephemeral: bool,
) -> Result<Arc<SessionController>> {
    let api_key = match settings
        .auth_api_key
        .clone()
        .filter(|key| !key.trim().is_empty())
    {
        Some(key) => key,
        None => {
            debug!("cli: no local api key; asking the backend");
            backend
                .fetch_auth_config()
                .await
                .context("no auth api key configured and the backend did not provide one")?
                .api_key
        }
    };
    if api_key.trim().is_empty() {
        bail!("auth api key is empty; set ATHENA_AUTH_API_KEY or --api-key");
    }

    let cache: Arc<dyn CompanyIdCache> = if ephemeral {
        Arc::new(MemoryCompanyIdCache::new())
    } else {
        let storage = Storage::new(&settings.database_url)
            .await
            .with_context(|| format!("failed to open local database {}", settings.database_url))?;
        storage
            .health_check()
            .await
            .context("local database is not usable")?;
        Arc::new(storage)
    };
    let gateway = IdentityToolkitGateway::new(
        backend.http().clone(),
        settings.identity_toolkit_url.clone(),
        api_key,
    );
    let backend = Arc::new(backend);
    info!(backend_url = %settings.backend_url, "cli: client ready");

    Ok(SessionController::new(
        SessionServices {
            gateway: Arc::new(gateway),
            companies: backend.clone(),
            jobs: backend.clone(),
            documents: backend,
            cache,
        },
        settings.timeouts(),
    ))
}

async fn run(controller: &Arc<SessionController>, command: Command, limit: Duration) -> Result<()> {
    match command {
        Command::Health => Ok(()),
        Command::Signup {
            email,
            password,
            confirm,
        } => {
            controller.sign_up(&email, &password, &confirm).await?;
            Ok(())
        }
        Command::ResetPassword { email } => {
            controller.reset_password(&email).await?;
            Ok(())
        }
        Command::Status { credentials } => {
            sign_in(controller, &credentials, limit).await?;
            print_status(controller).await
        }
        Command::Company {
            credentials,
            name,
            address,
            description,
        } => {
            sign_in(controller, &credentials, limit).await?;
            let company = controller
                .save_company(CompanyDraft {
                    name,
                    address,
                    description,
                })
                .await?;
            println!("company_id={}", company.id);
            Ok(())
        }
        Command::Submit {
            credentials,
            title,
            fields,
        } => {
            sign_in(controller, &credentials, limit).await?;
            controller.set_job_field("title", title).await;
            for (name, value) in fields {
                controller.set_job_field(&name, value).await;
            }
            controller.submit_job().await?;
            Ok(())
        }
        Command::Upload {
            credentials,
            path,
            apply,
            submit,
        } => {
            sign_in(controller, &credentials, limit).await?;
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            let name = path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("document")
                .to_string();
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            controller.select_document(DocumentFile::new(name, mime.essence_str(), bytes))?;
            controller.process_document().await?;

            let form = controller.apply_extracted(apply.into()).await?;
            if submit {
                controller.submit_job().await?;
            } else {
                for (name, value) in form.submission_fields() {
                    println!("{name}: {value}");
                }
            }
            Ok(())
        }
    }
}

async fn sign_in(
    controller: &Arc<SessionController>,
    credentials: &Credentials,
    limit: Duration,
) -> Result<()> {
    let mut events = BroadcastStream::new(controller.subscribe_events());
    controller.start().await;
    controller
        .sign_in(&credentials.email, &credentials.password)
        .await?;

    let settled = tokio::time::timeout(limit + Duration::from_secs(1), async {
        while let Some(event) = events.next().await {
            if let Ok(ClientEvent::ViewChanged(View::CompanyForm | View::JobView)) = event {
                return true;
            }
        }
        false
    })
    .await;
    if !matches!(settled, Ok(true)) {
        bail!("sign-in did not complete");
    }
    Ok(())
}

async fn print_status(controller: &Arc<SessionController>) -> Result<()> {
    let state = controller.state().await;
    if let Some(user) = &state.user {
        println!("user: {}", user.email.as_deref().unwrap_or(user.user_id.as_str()));
    }
    if state.phase != SessionPhase::AuthedWithCompany {
        println!("no company profile yet; create one with `athena company`");
        return Ok(());
    }

    let form = controller.company_form().await;
    println!("company: {}", form.fields.name);
    println!("address: {}", form.fields.address);
    if let Some(description) = form.fields.description.as_deref() {
        println!("description: {description}");
    }

    let jobs = controller.load_jobs().await?;
    if jobs.is_empty() {
        println!("{EMPTY_JOB_LIST_MESSAGE}");
    }
    for job in jobs {
        let created = job
            .created_at
            .map(|at| format!(" ({})", at.format("%Y-%m-%d")))
            .unwrap_or_default();
        println!("\n# {}{created}", job.title);
        for (label, value) in job.detail_lines() {
            println!("  {label}: {value}");
        }
    }
    Ok(())
}

fn spawn_printer(controller: &SessionController) -> JoinHandle<()> {
    let mut events = BroadcastStream::new(controller.subscribe_events());
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                Ok(event) => render(&event),
                Err(err) => warn!(%err, "cli: event stream lagged"),
            }
        }
    })
}

fn render(event: &ClientEvent) {
    match event {
        ClientEvent::Notification(notification) => {
            let tag = match notification.level {
                NotificationLevel::Success => "ok",
                NotificationLevel::Error => "error",
                NotificationLevel::Info => "info",
            };
            println!("[{tag}] {}", notification.message);
        }
        ClientEvent::FileSelected(Some(file)) => {
            println!("selected {} ({})", file.name, file.size_label);
        }
        ClientEvent::UploadProgress {
            percent, status, ..
        } => println!("[{percent:>3}%] {status}"),
        ClientEvent::UploadPreviewReady(preview) => print_preview(preview),
        ClientEvent::JobFormChanged(form) if !form.is_empty() => {
            println!("job form: {}", form.title());
        }
        other => debug!(event = ?other, "cli: event"),
    }
}

fn print_preview(preview: &UploadPreview) {
    println!("title: {}", preview.job_title);
    println!("industry: {}", preview.industry);
    println!("experience: {}", preview.experience);
    println!("summary: {}", preview.role_summary);
    for (heading, list) in [
        ("responsibilities", &preview.responsibilities),
        ("required skills", &preview.required_skills),
    ] {
        println!("{heading}:");
        for item in &list.items {
            println!("  - {item}");
        }
        if let Some(more) = list.more_label() {
            println!("  {more}");
        }
    }
}
