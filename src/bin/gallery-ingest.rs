//! CLI binary for gallery-ingest.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `IngestConfig` / `ServerConfig` and prints results.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use gallery_ingest::{
    create_gallery_from_file, ingest, prepare, server, upload, GalleryClient, HttpTransport,
    InMemoryGalleryStore, IngestConfig, ServerConfig, UploadSource,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

fn spinner(enabled: bool, message: &str) -> Option<ProgressBar> {
    if !enabled {
        return None;
    }
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
    );
    bar.set_prefix("Gallery");
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(80));
    Some(bar)
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Show what the downscaler would do with a photo
  gallery-ingest compress holiday.jpg

  # Write the encoded data-URL to a file
  gallery-ingest compress holiday.jpg -o holiday.txt

  # Upload without a gallery (prints the new image id)
  gallery-ingest upload holiday.jpg

  # Add to a gallery, signing in first
  GALLERY_EMAIL=ann@example.com GALLERY_PASSWORD=... \
    gallery-ingest upload holiday.jpg --gallery-id 3f2a...

  # Start a new gallery with a background image
  gallery-ingest --token $TOKEN create-gallery background.png

  # Run the reference API server
  ACCESS_TOKEN_SECRET=... REFRESH_TOKEN_SECRET=... gallery-ingest serve

ENVIRONMENT VARIABLES:
  GALLERY_API_URL         Base URL of the gallery API (default http://localhost:3000)
  GALLERY_TOKEN           Bearer token for owner-only operations
  GALLERY_EMAIL           Sign in with this e-mail when no token is given
  GALLERY_PASSWORD        Password for GALLERY_EMAIL
  ACCESS_TOKEN_SECRET     HS256 secret for access tokens (serve, required)
  REFRESH_TOKEN_SECRET    HS256 secret for refresh tokens (serve, required)
"#;

/// Downscale, encode and upload images to a drawing gallery.
#[derive(Parser, Debug)]
#[command(
    name = "gallery-ingest",
    version,
    about = "Downscale, encode and upload images to a drawing gallery",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Base URL of the gallery API.
    #[arg(long, global = true, env = "GALLERY_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    /// Bearer token for owner-only operations.
    #[arg(long, global = true, env = "GALLERY_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Sign in with this e-mail when no token is given.
    #[arg(long, global = true, env = "GALLERY_EMAIL")]
    email: Option<String>,

    /// Password for --email.
    #[arg(long, global = true, env = "GALLERY_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Per-request timeout in seconds.
    #[arg(long, global = true, env = "GALLERY_TIMEOUT", default_value_t = 30)]
    timeout: u64,

    /// Largest image (in pixels) the decoder accepts.
    #[arg(long, global = true, env = "GALLERY_MAX_PIXELS", default_value_t = 50_000_000)]
    max_pixels: u64,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "GALLERY_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "GALLERY_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode and downscale an image without uploading it.
    Compress {
        file: PathBuf,

        /// Write the encoded data-URL here instead of printing a summary.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Upload an image, optionally into a gallery.
    Upload {
        file: PathBuf,

        /// Store the image in this gallery (URL-safe create_image path).
        #[arg(long, env = "GALLERY_ID")]
        gallery_id: Option<String>,
    },

    /// Create a gallery with an image as its background.
    CreateGallery { file: PathBuf },

    /// Run the reference API server with an in-memory store.
    Serve {
        /// Address to listen on.
        #[arg(long, env = "GALLERY_BIND", default_value = "127.0.0.1:3000")]
        bind: SocketAddr,

        /// Largest accepted request body in bytes.
        #[arg(long, env = "GALLERY_MAX_BODY", default_value_t = 16 * 1024 * 1024)]
        max_body: usize,
    },
}

fn build_config(cli: &Cli) -> Result<IngestConfig> {
    let mut builder = IngestConfig::builder()
        .api_base_url(&cli.api_url)
        .request_timeout_secs(cli.timeout)
        .max_decoded_pixels(cli.max_pixels);
    if let Some(token) = &cli.token {
        builder = builder.token(token);
    }
    builder.build().context("Invalid configuration")
}

async fn connect(cli: &Cli, config: &IngestConfig) -> Result<GalleryClient<HttpTransport>> {
    let mut client = GalleryClient::from_config(config).context("Failed to build HTTP client")?;
    if client.token().is_none() {
        if let (Some(email), Some(password)) = (&cli.email, &cli.password) {
            client
                .sign_in(email, password)
                .await
                .context("Sign-in failed")?;
        }
    }
    Ok(client)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    let filter = match (&cli.command, cli.verbose, cli.quiet) {
        (Command::Serve { .. }, false, false) => "info",
        _ => filter,
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli)?;
    let show_progress = !cli.quiet && !cli.verbose;

    match &cli.command {
        // ── compress ─────────────────────────────────────────────────────
        Command::Compress { file, output } => {
            let prepared = prepare(UploadSource::File(file.clone()), &config)
                .await
                .with_context(|| format!("Failed to process {}", file.display()))?;

            if let Some(path) = output {
                tokio::fs::write(path, prepared.encoded.data.as_bytes())
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                if !cli.quiet {
                    eprintln!(
                        "{} {} → {}x{}  →  {}",
                        green("✔"),
                        prepared.source,
                        prepared.encoded.width,
                        prepared.encoded.height,
                        bold(&path.display().to_string())
                    );
                }
            } else {
                let steps: Vec<String> = prepared
                    .plan
                    .as_ref()
                    .map(|p| p.steps.iter().map(|d| d.to_string()).collect())
                    .unwrap_or_default();
                let report = json!({
                    "file": file.display().to_string(),
                    "source": prepared.source.to_string(),
                    "width": prepared.encoded.width,
                    "height": prepared.encoded.height,
                    "downscaled": prepared.was_downscaled(),
                    "steps": steps,
                    "encodedBytes": prepared.encoded.data.len(),
                });
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).context("Failed to serialise report")?
                );
            }
        }

        // ── upload ───────────────────────────────────────────────────────
        Command::Upload { file, gallery_id } => {
            let client = connect(&cli, &config).await?;
            let bar = spinner(show_progress, "Uploading…");
            let source = UploadSource::File(file.clone());

            let id = match gallery_id {
                Some(gallery_id) => {
                    ingest(&client, source, gallery_id, &config)
                        .await
                        .with_context(|| format!("Failed to add {} to gallery", file.display()))?
                        .id
                }
                None => {
                    upload(&client, source, &config)
                        .await
                        .with_context(|| format!("Failed to upload {}", file.display()))?
                        .id
                }
            };

            if let Some(bar) = bar {
                bar.finish_and_clear();
            }
            println!("{id}");
            if !cli.quiet {
                eprintln!("{} uploaded {}", green("✔"), dim(&file.display().to_string()));
            }
        }

        // ── create-gallery ───────────────────────────────────────────────
        Command::CreateGallery { file } => {
            let client = connect(&cli, &config).await?;
            if client.token().is_none() {
                bail!("create-gallery needs --token or --email/--password");
            }
            let bar = spinner(show_progress, "Creating gallery…");
            let gallery = create_gallery_from_file(&client, file, &config)
                .await
                .with_context(|| format!("Failed to create gallery from {}", file.display()))?;
            if let Some(bar) = bar {
                bar.finish_and_clear();
            }
            println!("{}", gallery.id);
        }

        // ── serve ────────────────────────────────────────────────────────
        Command::Serve { bind, max_body } => {
            let server_config = ServerConfig::from_env()
                .context("Server configuration is incomplete")?
                .bind(*bind)
                .max_body_bytes(*max_body);
            server::run_server(server_config, Arc::new(InMemoryGalleryStore::new()))
                .await
                .context("Server stopped")?;
        }
    }

    Ok(())
}
