use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use req2test::llm::create_llm_for;
use req2test::llm::registry::providers;
use req2test::models::{ClientDocument, RuleKind};
use req2test::{
    ArtifactType, ClientContext, Config, DocumentParser, ExportFormat, GenerationProgress,
    ProviderKind, Session,
};
use std::future::Future;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "req2test")]
#[command(version, about = "Generate test cases and automation scripts from requirements documents")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for settings, clients, exports and history
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate tests from a requirements document (TXT, PDF or DOCX)
    Generate(GenerateArgs),
    /// List providers and whether their credentials are present
    Providers {
        /// Probe each provider's endpoint
        #[arg(long)]
        check: bool,
    },
    /// List models offered by a provider
    Models {
        /// Provider to query; the active one when omitted
        #[arg(long)]
        provider: Option<ProviderKind>,
    },
    /// Show or change persisted settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
    /// Manage client contexts
    Client {
        #[command(subcommand)]
        command: ClientCommands,
    },
    /// Show past generations, newest first
    History {
        /// Only generations for this client (id or name)
        #[arg(long)]
        client: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(clap::Args)]
struct GenerateArgs {
    /// Requirements document
    file: PathBuf,

    /// Also generate Gherkin feature files
    #[arg(long)]
    gherkin: bool,
    /// Also generate Selenium (Python) scripts
    #[arg(long)]
    selenium: bool,
    /// Also generate Playwright (JavaScript) scripts
    #[arg(long)]
    playwright: bool,
    /// Generate every artifact type
    #[arg(long)]
    all: bool,

    /// Client context to apply (id or name)
    #[arg(long)]
    client: Option<String>,

    /// Provider for this run only
    #[arg(long)]
    provider: Option<ProviderKind>,
    /// Model for this run only
    #[arg(long)]
    model: Option<String>,

    #[arg(long)]
    no_edge_cases: bool,
    #[arg(long)]
    no_negative: bool,
    #[arg(long)]
    no_boundary: bool,

    /// Ask for additional tests covering gaps after the first pass
    #[arg(long)]
    enhance: bool,

    /// Export format for manual tests: excel, csv, markdown or zip
    #[arg(long)]
    format: Option<ExportFormat>,
    /// Also write each generated script to its own file
    #[arg(long)]
    scripts: bool,
    /// Skip exporting
    #[arg(long)]
    no_export: bool,
}

#[derive(Subcommand)]
enum SettingsCommands {
    /// Print the persisted settings (credentials are never shown)
    Show,
    /// Set a dotted key, e.g. `ollama.base_url http://gpu-box:11434`
    Set { key: String, value: String },
    /// Make a provider the active one
    Provider { provider: ProviderKind },
}

#[derive(Subcommand)]
enum ClientCommands {
    List,
    Show {
        client: String,
    },
    Create {
        name: String,
        #[arg(long, default_value = "")]
        project: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Comma separated
        #[arg(long, value_delimiter = ',')]
        tech_stack: Vec<String>,
        #[arg(long, default_value = "")]
        environment: String,
    },
    /// Add a navigation, thumb, business or best_practice rule
    AddRule {
        client: String,
        kind: RuleKind,
        rule: String,
    },
    /// Attach a reference document
    AddDoc {
        client: String,
        file: PathBuf,
    },
    RemoveDoc {
        client: String,
        filename: String,
    },
    Delete {
        client: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };
    if let Some(dir) = &cli.data_dir {
        config.storage.data_dir = Some(dir.clone());
    }
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("req2test={},warn", config.logging.level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut session = Session::open(config).await?;
    report_warnings(&mut session);

    let outcome = match cli.command {
        Commands::Generate(args) => generate(&mut session, args).await,
        Commands::Providers { check } => list_providers(&session, check).await,
        Commands::Models { provider } => list_models(&session, provider).await,
        Commands::Settings { command } => settings(&mut session, command).await,
        Commands::Client { command } => client(&session, command).await,
        Commands::History { client, limit } => history(&session, client, limit).await,
    };

    report_warnings(&mut session);
    if let Err(e) = &outcome {
        if let Some(err) = e.downcast_ref::<req2test::Error>() {
            error!("❌ {}", err.user_message());
        }
    }
    outcome
}

fn report_warnings(session: &mut Session) {
    for warning in session.take_warnings() {
        warn!("⚠️ {}", warning);
    }
}

async fn generate(session: &mut Session, args: GenerateArgs) -> Result<()> {
    if let Some(provider) = args.provider {
        session.settings_mut().llm_provider = provider;
    }
    if let Some(model) = &args.model {
        session.settings_mut().set_active_model(model.as_str());
    }
    {
        let generation = &mut session.settings_mut().generation;
        generation.include_edge_cases &= !args.no_edge_cases;
        generation.include_negative_tests &= !args.no_negative;
        generation.include_boundary_tests &= !args.no_boundary;
    }
    if let Some(client) = &args.client {
        session.select_client(client).await?;
    }

    let requirement = DocumentParser::new().parse_file(&args.file).await?;
    let stats = requirement.stats();
    info!(
        "📄 {}: {} words, {} lines",
        requirement.filename, stats.words, stats.lines
    );

    let mut artifacts = vec![ArtifactType::Manual];
    if args.gherkin || args.all {
        artifacts.push(ArtifactType::Gherkin);
    }
    if args.selenium || args.all {
        artifacts.push(ArtifactType::Selenium);
    }
    if args.playwright || args.all {
        artifacts.push(ArtifactType::Playwright);
    }

    info!(
        "🚀 Generating with {} ({})",
        session.settings().llm_provider.info().display_name,
        session.settings().active_model()
    );

    let (sender, mut receiver) = mpsc::unbounded_channel::<GenerationProgress>();
    let progress_task = tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            match &event.error {
                Some(message) => warn!("[{}/{}] {}", event.step, event.total_steps, message),
                None => info!(
                    "[{:>3.0}%] {}",
                    event.progress * 100.0,
                    event.message
                ),
            }
        }
    });

    let result = until_cancelled(
        async {
            session
                .generate(requirement, &artifacts, Some(sender))
                .await
                .map(|suite| suite.summary())
        },
        tokio::signal::ctrl_c(),
    )
    .await;
    let _ = progress_task.await;
    let summary = result??;

    info!(
        "✅ {} manual tests, {} Gherkin scenarios, {} Selenium and {} Playwright scripts",
        summary.manual_tests, summary.gherkin_scenarios, summary.selenium_tests, summary.playwright_tests
    );
    if let Some(suite) = session.last_result() {
        for failure in &suite.failures {
            warn!("❌ {} not generated: {}", failure.artifact.display_name(), failure.message);
        }
    }

    if args.enhance {
        let generator = session.build_generator()?;
        match session.enhance_last(&generator).await {
            Ok(added) => info!("🆕 Added {} tests covering gaps", added),
            Err(e) => warn!("Enhancement failed: {}", e.user_message()),
        }
    }

    if args.no_export {
        return Ok(());
    }

    let path = session.export_last(args.format).await?;
    info!("💾 Exported to {}", path.display());

    if args.scripts {
        for artifact in artifacts.into_iter().filter(|a| *a != ArtifactType::Manual) {
            match session.export_scripts(artifact).await {
                Ok(paths) => info!("💾 Wrote {} {} files", paths.len(), artifact.display_name()),
                Err(e) => warn!("{}", e.user_message()),
            }
        }
    }

    Ok(())
}

/// Runs `work` unless `cancel` completes first, which is reported as an error
async fn until_cancelled<T, C>(work: impl Future<Output = T>, cancel: C) -> Result<T>
where
    C: Future,
{
    tokio::select! {
        output = work => Ok(output),
        _ = cancel => {
            warn!("Generation cancelled");
            anyhow::bail!("generation cancelled by the user")
        }
    }
}

async fn list_providers(session: &Session, check: bool) -> Result<()> {
    let settings = session.settings();
    for info in providers() {
        let active = if info.kind == settings.llm_provider { "*" } else { " " };
        let credentials = if settings.has_credentials(info.kind) {
            "ready"
        } else {
            "missing credentials"
        };
        let mut line = format!(
            "{} {:<12} {:<32} {}",
            active,
            info.kind.as_str(),
            info.display_name,
            credentials
        );

        if check {
            let reachable = match create_llm_for(info.kind, settings) {
                Ok(llm) => llm.is_available().await,
                Err(_) => false,
            };
            line.push_str(if reachable { " ✅" } else { " ❌" });
        }
        println!("{}", line);
    }
    Ok(())
}

async fn list_models(session: &Session, provider: Option<ProviderKind>) -> Result<()> {
    let kind = provider.unwrap_or(session.settings().llm_provider);
    let llm = create_llm_for(kind, session.settings())?;
    let mut models = llm.list_models().await;
    if models.is_empty() {
        info!("{} returned no models, showing suggestions", kind);
        models = kind.info().suggested_models.iter().map(|m| m.to_string()).collect();
    }
    for model in models {
        let marker = if model == llm.model() { "*" } else { " " };
        println!("{} {}", marker, model);
    }
    Ok(())
}

async fn settings(session: &mut Session, command: SettingsCommands) -> Result<()> {
    match command {
        SettingsCommands::Show => {
            let value = session.settings().to_persisted_json()?;
            println!("{}", serde_json::to_string_pretty(&value)?);
            println!("\n{}", session.config().summary());
        }
        SettingsCommands::Set { key, value } => {
            session.settings_mut().set_value(&key, &value)?;
            session.save_settings().await?;
            info!("✅ {} = {}", key, value);
        }
        SettingsCommands::Provider { provider } => {
            session.settings_mut().llm_provider = provider;
            session.save_settings().await?;
            if !session.settings().has_credentials(provider) {
                if let Some(env) = provider.info().credential_env {
                    warn!("Set {} in the environment to use {}", env, provider);
                }
            }
            info!("✅ Active provider: {}", provider.info().display_name);
        }
    }
    Ok(())
}

async fn find_client(session: &Session, id_or_name: &str) -> Result<ClientContext> {
    session
        .clients()
        .find(id_or_name)
        .await?
        .with_context(|| format!("no client matches '{}'", id_or_name))
}

async fn client(session: &Session, command: ClientCommands) -> Result<()> {
    let store = session.clients();
    match command {
        ClientCommands::List => {
            let clients = store.list().await?;
            if clients.is_empty() {
                info!("📭 No clients yet");
            }
            for client in clients {
                println!("{}  {:<24} {}", client.id, client.name, client.rules_summary());
            }
        }
        ClientCommands::Show { client } => {
            let client = find_client(session, &client).await?;
            println!("{} ({})", client.name, client.id);
            println!("{}", client.context_text());
        }
        ClientCommands::Create {
            name,
            project,
            description,
            tech_stack,
            environment,
        } => {
            let mut client = ClientContext::new(name).with_project(project, description);
            client.tech_stack = tech_stack
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
            client.test_environment = environment;
            let client = store.create(client).await?;
            println!("{}", client.id);
        }
        ClientCommands::AddRule { client, kind, rule } => {
            let mut client = find_client(session, &client).await?;
            if client.add_rule(kind, rule) {
                store.update(&mut client).await?;
                info!("✅ {} rule added to {}", kind, client.name);
            } else {
                warn!("Rule is empty or already present");
            }
        }
        ClientCommands::AddDoc { client, file } => {
            let client = find_client(session, &client).await?;
            let parsed = DocumentParser::new().parse_file(&file).await?;
            let document = ClientDocument {
                filename: parsed.filename,
                file_type: parsed.file_type,
                content: parsed.content,
                uploaded_at: Local::now(),
            };
            let updated = store.add_document(&client.id, document).await?;
            info!("📎 {} now has {} documents", updated.name, updated.documents.len());
        }
        ClientCommands::RemoveDoc { client, filename } => {
            let client = find_client(session, &client).await?;
            store.remove_document(&client.id, &filename).await?;
            info!("🗑️ Removed {} from {}", filename, client.name);
        }
        ClientCommands::Delete { client } => {
            let client = find_client(session, &client).await?;
            if store.delete(&client.id).await? {
                info!("🗑️ Deleted {}", client.name);
            }
        }
    }
    Ok(())
}

async fn history(session: &Session, client: Option<String>, limit: usize) -> Result<()> {
    let client_id = match client {
        Some(client) => Some(find_client(session, &client).await?.id),
        None => None,
    };

    let records = session.history(client_id.as_deref(), limit)?;
    if records.is_empty() {
        info!("📭 No generations recorded");
    }
    for record in records {
        let failed = if record.failed.is_empty() {
            String::new()
        } else {
            format!(
                " (failed: {})",
                record.failed.iter().map(|a| a.as_str()).collect::<Vec<_>>().join(", ")
            )
        };
        println!(
            "{}  {}  {:<30} {:>4} tests  {}{}",
            record.generated_at.format("%Y-%m-%d %H:%M"),
            record.client_id.as_deref().unwrap_or("-"),
            record.requirement_filename,
            record.total(),
            record.model,
            failed
        );
    }
    Ok(())
}
