//! tsfiler: encrypted file service client
//!
//! Commands:
//!   login                          - check credentials, optionally print the token
//!   push <file> [--as <path>]      - encrypt and upload one file
//!   pull <file-id> [-o <out>]      - download, decrypt and write one file
//!   push-direct <file>             - single-shot upload with an upload token
//!   push-tree <dir> [--remove]     - upload every file under a directory
//!   metadata put|query             - store or query JSON metadata
//!   config show                    - display current configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use tsfiler_core::config::TsfilerConfig;
use tsfiler_core::{FileHandle, FileId, TsfilerError};
use tsfiler_transfer::{
    login, push_tree, save_download, upload_file_direct, Credentials, DownloadSession,
    ProgressFn, ServiceClient, TreeOptions, UploadRequest, UploadSession,
};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "tsfiler",
    version,
    about = "tsfiler encrypted file service client",
    long_about = "tsfiler: push and pull files through the tsfiler service with per-chunk encryption"
)]
struct Cli {
    /// Path to the tsfiler config file
    #[arg(
        long,
        short = 'c',
        global = true,
        env = "TSFILER_CONFIG",
        default_value = "~/.config/tsfiler/config.toml"
    )]
    config: PathBuf,

    /// Service base URL (overrides [service] base_url)
    #[arg(long, global = true, env = "PYTSFILER_BASE_URL")]
    base_url: Option<String>,

    /// Account email (overrides [auth] email)
    #[arg(long, global = true, env = "PYTSFILER_EMAIL")]
    email: Option<String>,

    /// Account password; prompted for when absent
    #[arg(long, global = true, env = "PYTSFILER_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Log filter, e.g. "debug" or "tsfiler_transfer=trace"
    #[arg(long, global = true, env = "TSFILER_LOG")]
    log: Option<String>,

    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Log in and verify credentials
    Login {
        /// Print the session token to stdout
        #[arg(long)]
        print_token: bool,
    },

    /// Encrypt and upload a single file
    Push {
        /// Local file
        file: PathBuf,
        /// Logical path on the service (default: the local path as given)
        #[arg(long = "as")]
        logical_path: Option<String>,
    },

    /// Download and decrypt a stored file
    Pull {
        /// File id returned by push
        file_id: String,
        /// Local destination (default: ./<file-id>)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// Chunks fetched at once (overrides [transfer] chunk_concurrency)
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Upload a file with a pre-authorized upload token (no client-side encryption)
    #[command(name = "push-direct")]
    PushDirect {
        file: PathBuf,
        /// Upload token issued by the service
        #[arg(long, env = "PYTSFILER_UPLOAD_TOKEN", hide_env_values = true)]
        upload_token: String,
    },

    /// Upload every file under a directory
    #[command(name = "push-tree")]
    PushTree {
        dir: PathBuf,
        /// Delete each local file after its upload is confirmed
        #[arg(long)]
        remove: bool,
    },

    /// Metadata store
    Metadata {
        #[command(subcommand)]
        action: MetadataAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum MetadataAction {
    /// Store a JSON metadata document
    Put {
        /// JSON document, e.g. '{"project":"alpha"}'
        json: String,
    },
    /// Query stored metadata
    Query {
        /// JSON query document
        query: String,
        /// JSON selection of fields to return
        #[arg(long)]
        select: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);
    let mut config = TsfilerConfig::load(&config_path)
        .with_context(|| format!("loading config: {}", config_path.display()))?;
    if let Some(url) = &cli.base_url {
        config.service.base_url = url.clone();
    }

    let level = cli.log.clone().unwrap_or_else(|| config.logging.level.clone());
    let format = cli.log_format.unwrap_or(match config.logging.format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(&level, format);
    tracing::debug!(config = %config_path.display(), endpoint = %config.service.base_url, "config loaded");

    match &cli.command {
        Commands::Login { print_token } => cmd_login(&cli, &config, *print_token).await,
        Commands::Push { file, logical_path } => {
            cmd_push(&cli, &config, file, logical_path.as_deref()).await
        }
        Commands::Pull {
            file_id,
            output,
            concurrency,
        } => cmd_pull(&cli, &config, file_id, output.as_deref(), *concurrency).await,
        Commands::PushDirect { file, upload_token } => {
            cmd_push_direct(&config, file, upload_token).await
        }
        Commands::PushTree { dir, remove } => cmd_push_tree(&cli, &config, dir, *remove).await,
        Commands::Metadata { action } => cmd_metadata(&cli, &config, action).await,
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &config_path),
    }
}

fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let layer = fmt::layer().with_writer(std::io::stderr);

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(layer.json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .init();
        }
    }
}

// ── Shared helpers ────────────────────────────────────────────────────────────

/// Expand `~` in path to the user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    match s.strip_prefix("~/") {
        Some(rest) => {
            let home = std::env::var("HOME").unwrap_or_default();
            PathBuf::from(home).join(rest)
        }
        None => path.to_path_buf(),
    }
}

fn build_client(config: &TsfilerConfig) -> Result<ServiceClient> {
    ServiceClient::new(&config.service).context("configuring service client")
}

/// Email from flag/env > config; password from flag/env > interactive prompt.
fn resolve_credentials(cli: &Cli, config: &TsfilerConfig) -> Result<Credentials> {
    let email = cli
        .email
        .clone()
        .or_else(|| config.auth.email.clone())
        .context(
            "no account email\n\
             Pass --email, set PYTSFILER_EMAIL, or set [auth] email in the config file.",
        )?;
    let password = match &cli.password {
        Some(p) => p.clone(),
        None => rpassword::prompt_password(format!("Password for {email}: "))
            .context("reading password")?,
    };
    Ok(Credentials::new(email, SecretString::from(password)))
}

async fn session_token(cli: &Cli, config: &TsfilerConfig, client: &ServiceClient) -> Result<SecretString> {
    let creds = resolve_credentials(cli, config)?;
    login(client, &creds)
        .await
        .with_context(|| format!("logging in as {}", creds.email))
}

/// Cancellation token that fires on Ctrl-C.
fn ctrl_c_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    token
}

fn parse_json(what: &str, raw: &str) -> Result<serde_json::Value> {
    serde_json::from_str(raw).with_context(|| format!("{what} is not valid JSON: {raw}"))
}

// ── Progress bar helpers ──────────────────────────────────────────────────────

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-")
}

fn make_progress_bar(total: u64, prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(bar_style());
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn progress_for(pb: &ProgressBar) -> ProgressFn {
    let pb = pb.clone();
    Box::new(move |done, total, msg| {
        pb.set_length(total);
        pb.set_position(done);
        pb.set_message(msg.to_string());
    })
}

// ── `tsfiler login` ───────────────────────────────────────────────────────────

async fn cmd_login(cli: &Cli, config: &TsfilerConfig, print_token: bool) -> Result<()> {
    let client = build_client(config)?;
    let token = session_token(cli, config, &client).await?;
    if print_token {
        println!("{}", token.expose_secret());
    } else {
        println!("Authenticated against {}", client.base_url());
    }
    Ok(())
}

// ── `tsfiler push` ────────────────────────────────────────────────────────────

async fn cmd_push(
    cli: &Cli,
    config: &TsfilerConfig,
    file: &Path,
    logical_path: Option<&str>,
) -> Result<()> {
    if !file.is_file() {
        anyhow::bail!("not a file: {}", file.display());
    }
    let logical_path = logical_path
        .map(str::to_string)
        .unwrap_or_else(|| file.to_string_lossy().replace('\\', "/"));

    let client = build_client(config)?;
    let token = session_token(cli, config, &client).await?;

    let plaintext = tokio::fs::read(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let request = UploadRequest::new(plaintext, logical_path.clone());

    println!("Pushing {} → {} ({})", file.display(), logical_path, client.base_url());
    let pb = make_spinner("push");
    pb.set_message(format!("md5 {}", request.digest()));

    let mut session = UploadSession::new(&client, &token).with_cancellation(ctrl_c_token());
    match session.run(&request).await {
        Ok(outcome) => {
            pb.finish_with_message("done".to_string());
            println!();
            println!("  file id:  {}", outcome.file_id);
            println!("  md5:      {}", request.digest());
            println!("  bytes:    {}", fmt_bytes(request.plaintext().len() as u64));
            println!("  stored:   {} (encrypted)", fmt_bytes(outcome.confirmed_byte_count));
            Ok(())
        }
        Err(TsfilerError::AlreadyExists { path, .. }) => {
            pb.finish_and_clear();
            anyhow::bail!(
                "{path} is already stored with identical content\n\
                 Push it under another name with --as <path>."
            )
        }
        Err(e) => {
            pb.abandon_with_message("failed".to_string());
            Err(e).with_context(|| format!("uploading {}", file.display()))
        }
    }
}

// ── `tsfiler pull` ────────────────────────────────────────────────────────────

async fn cmd_pull(
    cli: &Cli,
    config: &TsfilerConfig,
    file_id: &str,
    output: Option<&Path>,
    concurrency: Option<usize>,
) -> Result<()> {
    let client = build_client(config)?;
    let token = session_token(cli, config, &client).await?;
    let local_path = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(file_id));
    let concurrency = concurrency.unwrap_or(config.transfer.chunk_concurrency);

    println!("Pulling {} → {}", file_id, local_path.display());
    let pb = make_progress_bar(0, "pull");
    pb.set_message("fetching manifest...".to_string());
    let progress = progress_for(&pb);

    let handle = FileHandle::new(FileId::new(file_id));
    let content = DownloadSession::new(&client, &token)
        .with_concurrency(concurrency)
        .with_cancellation(ctrl_c_token())
        .with_progress(&progress)
        .run(&handle)
        .await;
    let content = match content {
        Ok(c) => c,
        Err(e) => {
            pb.abandon_with_message("failed".to_string());
            return Err(e).with_context(|| format!("downloading file {file_id}"));
        }
    };

    save_download(&local_path, &content)
        .await
        .with_context(|| format!("writing {}", local_path.display()))?;

    pb.finish_with_message("done".to_string());
    println!();
    println!("Downloaded:");
    println!("  local:  {}", local_path.display());
    println!("  bytes:  {}", fmt_bytes(content.len() as u64));
    Ok(())
}

// ── `tsfiler push-direct` ─────────────────────────────────────────────────────

async fn cmd_push_direct(config: &TsfilerConfig, file: &Path, upload_token: &str) -> Result<()> {
    let client = build_client(config)?;
    let token = SecretString::from(upload_token.to_string());

    let pb = make_spinner("push-direct");
    pb.set_message(file.display().to_string());
    let outcome = upload_file_direct(&client, &token, file).await;
    match outcome {
        Ok(outcome) => {
            pb.finish_with_message("done".to_string());
            println!("  file id:  {}", outcome.file_id);
            for (k, v) in &outcome.extra {
                println!("  {k}:  {v}");
            }
            Ok(())
        }
        Err(e) => {
            pb.abandon_with_message("failed".to_string());
            Err(e).with_context(|| format!("direct upload of {}", file.display()))
        }
    }
}

// ── `tsfiler push-tree` ───────────────────────────────────────────────────────

async fn cmd_push_tree(cli: &Cli, config: &TsfilerConfig, dir: &Path, remove: bool) -> Result<()> {
    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }
    let client = build_client(config)?;
    let creds = resolve_credentials(cli, config)?;
    let mut options = TreeOptions::from(&config.transfer);
    options.remove_after_upload |= remove;

    println!("Pushing tree {} → {}", dir.display(), client.base_url());
    let pb = make_spinner("push-tree");
    pb.set_message("scanning files...");

    let pb_clone = pb.clone();
    let progress: ProgressFn = Box::new(move |done, total, msg| {
        if total > 0 {
            pb_clone.set_style(bar_style());
            pb_clone.set_length(total);
        }
        pb_clone.set_position(done);
        pb_clone.set_message(msg.to_string());
    });

    let cancel = ctrl_c_token();
    let report = match push_tree(&client, &creds, dir, &options, Some(&progress), Some(&cancel)).await {
        Ok(report) => report,
        Err(e) => {
            pb.abandon_with_message("failed".to_string());
            return Err(e).with_context(|| format!("pushing tree: {}", dir.display()));
        }
    };

    pb.finish_with_message("done".to_string());
    println!();
    println!("Push complete:");
    println!("  uploaded:        {} files ({})", report.uploaded, fmt_bytes(report.bytes));
    println!("  already stored:  {} files", report.already_exists);
    println!("  failed:          {} files", report.failed);
    if options.remove_after_upload {
        println!("  removed:         {} local files", report.removed);
    }

    if report.failed > 0 {
        anyhow::bail!("{} file(s) failed to upload", report.failed);
    }
    Ok(())
}

// ── `tsfiler metadata` ────────────────────────────────────────────────────────

async fn cmd_metadata(cli: &Cli, config: &TsfilerConfig, action: &MetadataAction) -> Result<()> {
    let client = build_client(config)?;

    match action {
        MetadataAction::Put { json } => {
            let metadata = parse_json("metadata", json)?;
            let token = session_token(cli, config, &client).await?;
            client
                .put_metadata(&token, &metadata)
                .await
                .context("storing metadata")?;
            println!("Metadata stored");
        }
        MetadataAction::Query { query, select } => {
            let query = parse_json("query", query)?;
            let select = match select {
                Some(s) => parse_json("select", s)?,
                None => serde_json::Value::Null,
            };
            let token = session_token(cli, config, &client).await?;
            let result = client
                .query_metadata(&token, &query, &select)
                .await
                .context("querying metadata")?;
            let rendered =
                serde_json::to_string_pretty(&result).context("rendering query result")?;
            println!("{rendered}");
        }
    }
    Ok(())
}

// ── `tsfiler config show` ─────────────────────────────────────────────────────

fn cmd_config_show(config: &TsfilerConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_push_with_logical_path() {
        let cli = Cli::try_parse_from(["tsfiler", "push", "a.txt", "--as", "docs/a.txt"]).unwrap();
        match cli.command {
            Commands::Push { file, logical_path } => {
                assert_eq!(file, PathBuf::from("a.txt"));
                assert_eq!(logical_path.as_deref(), Some("docs/a.txt"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_pull_output() {
        let cli = Cli::try_parse_from(["tsfiler", "pull", "42", "-o", "out.bin"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Pull { ref file_id, output: Some(_), concurrency: None } if file_id == "42"
        ));
    }

    #[test]
    fn test_expand_tilde() {
        let home = std::env::var("HOME").unwrap_or_default();
        assert_eq!(
            expand_tilde(Path::new("~/.config/tsfiler/config.toml")),
            PathBuf::from(home).join(".config/tsfiler/config.toml")
        );
        assert_eq!(expand_tilde(Path::new("/etc/x.toml")), PathBuf::from("/etc/x.toml"));
    }

    #[test]
    fn test_fmt_bytes() {
        assert_eq!(fmt_bytes(16), "16 B");
        assert_eq!(fmt_bytes(2048), "2.0 KB");
        assert_eq!(fmt_bytes(5 * 1024 * 1024), "5.0 MB");
    }
}
