use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use statement_analyzer::analysis::{summarize, Summary};
use statement_analyzer::auth::{
    identity_from_config, OidcIdentity, OidcSettings, ProxySessionIdentity, SessionCache,
    SessionProvider, SignInOutcome,
};
use statement_analyzer::client::{ApiClient, AuthEvents};
use statement_analyzer::config::{
    default_config_path, resolve_api_url, AuthMode, Feature, ResolvedConfig,
};
use statement_analyzer::duration::format_duration;
use statement_analyzer::error::AnalysisError;
use statement_analyzer::models::UploadResponse;
use statement_analyzer::pipeline::{Analysis, Analyzer, StatementFile};
use statement_analyzer::render::{
    render_error, render_metadata, render_summary, render_top_transactions,
};
use statement_analyzer::report::{write_csv_exports, ReportClient};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "statement-analyzer")]
#[command(about = "Analyze bank statements with the extraction backend")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_COMMIT_HASH"), ")"))]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Override the backend base URL
    #[arg(long, value_name = "URL")]
    api_url: Option<String>,

    /// Emit logs as JSON lines on stderr
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a statement PDF and summarize the extracted transactions
    Analyze {
        /// Statement PDF
        file: PathBuf,

        /// Read the PDF password from this environment variable
        #[arg(long, value_name = "VAR")]
        password_env: Option<String>,

        /// Print the result and summary as JSON
        #[arg(long)]
        json: bool,

        /// Save the backend response for later `summarize`/`report` runs
        #[arg(long, value_name = "PATH")]
        save: Option<PathBuf>,

        /// Write the backend's CSV exports into this directory
        #[arg(long, value_name = "DIR")]
        csv_dir: Option<PathBuf>,

        /// Also download the PDF report to this path
        #[arg(long, value_name = "PATH")]
        report: Option<PathBuf>,
    },

    /// Summarize a saved analysis result
    Summarize {
        /// JSON file written by `analyze --save`
        result: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// Generate a PDF report from a saved analysis result
    Report {
        /// JSON file written by `analyze --save`
        result: PathBuf,

        /// Output path (defaults to the backend-supplied file name)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Sign in with the configured identity provider
    Login {
        /// Authorization code returned to the redirect URL (OIDC)
        #[arg(long, requires = "state")]
        code: Option<String>,

        /// State returned alongside the code (OIDC)
        #[arg(long, requires = "code")]
        state: Option<String>,

        /// Store an access token obtained elsewhere
        #[arg(long, conflicts_with_all = ["code", "cookie"])]
        token: Option<String>,

        /// Import a session cookie as NAME=VALUE (auth proxy)
        #[arg(long, value_name = "NAME=VALUE", conflicts_with = "code")]
        cookie: Option<String>,
    },

    /// Sign out and forget the cached session
    Logout,

    /// Show the signed-in user
    Whoami,

    /// Check that the backend is reachable
    Health,

    /// Show resolved configuration
    Config,
}

fn init_logging(config: &ResolvedConfig, json: bool) {
    let default_filter = if config.features.is_enabled(Feature::DebugMode) {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true);
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .init();
    } else {
        tracing_subscriber::registry().with(filter).with(layer).init();
    }
}

/// Everything a command may need, built once from the resolved config.
struct App {
    config: ResolvedConfig,
    client: ApiClient,
    session: Option<Arc<SessionProvider>>,
}

impl App {
    async fn new(config: ResolvedConfig) -> Result<Self> {
        let events = AuthEvents::new();
        let mut client = ApiClient::new(&config.api_url)?.with_auth_events(events.clone());

        let session = if config.auth.mode == AuthMode::None {
            None
        } else {
            let identity = identity_from_config(&config, SessionCache::new()?)?;
            identity.map(|identity| Arc::new(SessionProvider::new(identity)))
        };

        if let Some(provider) = &session {
            if let Err(err) = provider.refresh_session().await {
                tracing::warn!(error = %err, "Could not restore session");
            }
            client = client.with_token_source(provider.clone());
            provider.spawn_token_expiry_listener(&events);
        }

        Ok(Self {
            config,
            client,
            session,
        })
    }

    fn session(&self) -> Result<&Arc<SessionProvider>> {
        self.session
            .as_ref()
            .context("Authentication is disabled (set auth.mode in the config)")
    }
}

fn read_password(var: Option<&str>) -> Result<Option<SecretString>> {
    let Some(var) = var else {
        return Ok(None);
    };
    let value =
        std::env::var(var).with_context(|| format!("Environment variable {var} is not set"))?;
    Ok(Some(SecretString::from(value)))
}

fn load_saved(path: &Path) -> Result<Analysis> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let response = UploadResponse::parse(&bytes)
        .with_context(|| format!("Failed to parse analysis result: {}", path.display()))?;
    let analysis: Result<Analysis, AnalysisError> = response.into();
    analysis.map_err(|err| anyhow::anyhow!(render_error(&err)))
}

fn summary_for(config: &ResolvedConfig, analysis: &Analysis) -> Summary {
    let mut summary = summarize(&analysis.result);
    if !config.features.is_enabled(Feature::AdvancedAnalytics) {
        summary.monthly.clear();
        summary.categories.clear();
        summary.insights.clear();
    }
    summary
}

fn print_analysis(config: &ResolvedConfig, analysis: &Analysis, json: bool) -> Result<()> {
    let summary = summary_for(config, analysis);
    if json {
        let output = serde_json::json!({
            "result": analysis.result,
            "metadata": analysis.metadata,
            "summary": summary,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    print!("{}", render_summary(&analysis.result, &summary));
    print!("{}", render_top_transactions(&analysis.result));
    if let Some(metadata) = &analysis.metadata {
        let line = render_metadata(metadata);
        if !line.is_empty() {
            println!("\n{line}");
        }
    }
    Ok(())
}

async fn download_report(app: &App, analysis: &Analysis, output: Option<&Path>) -> Result<()> {
    if !app.config.features.is_enabled(Feature::PdfGeneration) {
        anyhow::bail!("PDF report generation is disabled (features.pdf_generation)");
    }
    let reports = ReportClient::new(app.client.clone(), &app.config);
    let report = reports
        .generate(&analysis.result)
        .await
        .map_err(|err| anyhow::anyhow!(render_error(&err)))?;

    let path = match output {
        Some(path) => {
            report.save_as(path)?;
            path.to_path_buf()
        }
        None => report.save_in(Path::new("."))?,
    };
    eprintln!("Report saved to {}", path.display());
    Ok(())
}

async fn analyze(
    app: &App,
    file: &Path,
    password_env: Option<&str>,
    json: bool,
    save: Option<&Path>,
    csv_dir: Option<&Path>,
    report: Option<&Path>,
) -> Result<()> {
    let statement = StatementFile::from_path(file)?;
    let password = read_password(password_env)?;

    let mut analyzer = Analyzer::new(app.client.clone(), &app.config);
    let analysis = match analyzer.analyze(&statement, password.as_ref()).await {
        Ok(analysis) => analysis,
        Err(err) => {
            eprintln!("Error: {}", render_error(&err));
            std::process::exit(1);
        }
    };

    if let Some(path) = save {
        let content = serde_json::to_string_pretty(&analysis.result)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        eprintln!("Result saved to {}", path.display());
    }
    if let Some(dir) = csv_dir {
        let written = write_csv_exports(dir, &analysis.csv_exports)?;
        eprintln!("Wrote {} CSV export(s) to {}", written.len(), dir.display());
    }

    print_analysis(&app.config, &analysis, json)?;

    if let Some(path) = report {
        download_report(app, &analysis, Some(path)).await?;
    }
    Ok(())
}

async fn login(
    app: &App,
    code: Option<String>,
    state: Option<String>,
    token: Option<String>,
    cookie: Option<String>,
) -> Result<()> {
    let provider = app.session()?;
    let auth = &app.config.auth;

    if let Some(token) = token {
        let now = chrono::Utc::now().timestamp();
        SessionCache::new()?.update(&auth.profile, |s| {
            s.access_token = Some(token);
            s.expires_at = None;
            s.captured_at = Some(now);
        })?;
    } else if let Some(cookie) = cookie {
        if auth.mode != AuthMode::Proxy {
            anyhow::bail!("--cookie is only supported with auth.mode = \"proxy\"");
        }
        let (name, value) = cookie
            .split_once('=')
            .context("Expected --cookie NAME=VALUE")?;
        ProxySessionIdentity::new(app.config.auth_base_url(), SessionCache::new()?, &auth.profile)
            .import_cookie(name.trim(), value.trim())?;
    } else if let (Some(code), Some(state)) = (code, state) {
        if auth.mode != AuthMode::Oidc {
            anyhow::bail!("--code is only supported with auth.mode = \"oidc\"");
        }
        OidcIdentity::new(
            OidcSettings::from_config(&app.config)?,
            SessionCache::new()?,
            &auth.profile,
        )
        .complete_sign_in(&code, &state)
        .await?;
    } else {
        match provider.sign_in().await? {
            SignInOutcome::SignedIn => {}
            SignInOutcome::Redirect { url } => {
                println!("Open this URL in a browser to sign in:\n\n  {url}\n");
                if auth.mode == AuthMode::Oidc {
                    println!(
                        "Then run: statement-analyzer login --code <CODE> --state <STATE>"
                    );
                } else {
                    println!("Then run: statement-analyzer login --cookie <NAME=VALUE>");
                }
                return Ok(());
            }
        }
    }

    provider.refresh_session().await?;
    let session = provider.session();
    match session.user {
        Some(user) => println!("Signed in as {}", user.display_name()),
        None => println!("Credentials stored, but the identity provider did not accept them"),
    }
    Ok(())
}

fn print_config(path: &Path, config: &ResolvedConfig) {
    println!("Config file: {}", path.display());
    println!("App: {} {}", config.app_name, config.version);
    println!("API URL: {}", config.api_url);
    println!(
        "Features: pdf_generation={} advanced_analytics={} debug_mode={}",
        config.features.pdf_generation,
        config.features.advanced_analytics,
        config.features.debug_mode
    );
    println!(
        "Timeouts: upload={} report={}",
        format_duration(config.timeouts.upload),
        format_duration(config.timeouts.report)
    );
    println!("Max upload size: {} bytes", config.upload.max_file_size);
    println!("Auth mode: {:?}", config.auth.mode);
    if config.auth.mode != AuthMode::None {
        println!("Auth origin: {}", config.auth_base_url());
        println!("Session profile: {}", config.auth.profile);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ResolvedConfig::load_or_default(&cli.config)?;
    if let Some(url) = cli.api_url.as_deref() {
        config.api_url = resolve_api_url(Some(url), Some(&config.api_url));
    }
    init_logging(&config, cli.log_json);
    tracing::debug!(config = %cli.config.display(), api_url = %config.api_url, "Configuration resolved");

    let command = match cli.command {
        Command::Config => {
            print_config(&cli.config, &config);
            return Ok(());
        }
        command => command,
    };

    let app = App::new(config).await?;

    match command {
        Command::Analyze {
            file,
            password_env,
            json,
            save,
            csv_dir,
            report,
        } => {
            analyze(
                &app,
                &file,
                password_env.as_deref(),
                json,
                save.as_deref(),
                csv_dir.as_deref(),
                report.as_deref(),
            )
            .await?;
        }
        Command::Summarize { result, json } => {
            let analysis = load_saved(&result)?;
            print_analysis(&app.config, &analysis, json)?;
        }
        Command::Report { result, output } => {
            let analysis = load_saved(&result)?;
            download_report(&app, &analysis, output.as_deref()).await?;
        }
        Command::Login {
            code,
            state,
            token,
            cookie,
        } => {
            login(&app, code, state, token, cookie).await?;
        }
        Command::Logout => {
            app.session()?.sign_out().await?;
            println!("Signed out");
        }
        Command::Whoami => {
            let provider = app.session()?;
            provider.refresh_session().await?;
            let session = provider.session();
            match session.user {
                Some(user) => {
                    println!("{}", user.display_name());
                    if let Some(email) = user.email.as_deref() {
                        println!("Email: {email}");
                    }
                    if let Some(groups) = user.groups.as_ref().filter(|g| !g.is_empty()) {
                        println!("Groups: {}", groups.join(", "));
                    }
                }
                None => println!("Not signed in"),
            }
        }
        Command::Health => {
            let health = app.client.health().await?;
            println!(
                "{} {}",
                health.status,
                health.service.as_deref().unwrap_or(&app.config.api_url)
            );
        }
        Command::Config => print_config(&cli.config, &app.config),
    }

    Ok(())
}
