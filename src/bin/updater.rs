//! CLI binary for the AirDocs updater.

use airdocs_updater::update::{HistoryStore, InstallOutcome, PendingUpdateMarker, UpdateInfo};
use airdocs_updater::{
    ConfirmationPort, ProgressSink, Stage, UpdateContext, UpdaterConfig, logging, startup, update,
};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// AirDocs updater: check, stage, and apply application updates.
#[derive(Parser)]
#[command(name = "airdocs-updater", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Application directory (default: directory of this executable).
    #[arg(long)]
    app_dir: Option<PathBuf>,

    /// Version of the installed application.
    #[arg(long, default_value = env!("CARGO_PKG_VERSION"))]
    current_version: String,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Command,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Check for a newer version.
    Check,

    /// Download and stage the newest version for the next start.
    Install {
        /// Do not ask for confirmation.
        #[arg(short, long)]
        yes: bool,
    },

    /// Apply a staged update now (run before the application starts).
    Apply,

    /// Show installation paths and any staged update.
    Status,

    /// Show recent update attempts.
    History {
        /// Maximum number of records.
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Remove the previous version kept after an update.
    Cleanup,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(ref path) => UpdaterConfig::from_file(path)?,
        None => UpdaterConfig::default(),
    };
    if let Some(dir) = cli.app_dir {
        config.install.app_dir = Some(dir);
    }
    let ctx = UpdateContext::resolve(config, &cli.current_version)?;
    // `apply` starts file logging itself, after the tree is settled.
    let _log_guard = match cli.command {
        Command::Apply => None,
        _ => {
            let guard = logging::init(&ctx.layout.logs_dir())?;
            log_start(&ctx);
            Some(guard)
        }
    };

    match cli.command {
        Command::Check => run_check(ctx).await,
        Command::Install { yes } => run_install(ctx, yes).await,
        Command::Apply => run_apply(&ctx),
        Command::Status => run_status(&ctx),
        Command::History { limit } => run_history(&ctx, limit),
        Command::Cleanup => {
            if update::cleanup_old_version(&ctx.layout, &ctx.config.install.entry_point) {
                println!("Removed {}", ctx.layout.backup_dir().display());
            } else {
                println!("Nothing to clean up.");
            }
            Ok(())
        }
    }
}

fn log_start(ctx: &UpdateContext) {
    info!(
        app_dir = %ctx.layout.app_dir().display(),
        user_dir = %ctx.layout.user_dir().display(),
        "airdocs-updater v{}",
        env!("CARGO_PKG_VERSION")
    );
}

async fn check_now(ctx: &UpdateContext) -> anyhow::Result<Option<UpdateInfo>> {
    let checker = ctx.checker();
    let current = ctx.current_version.clone();
    Ok(tokio::task::spawn_blocking(move || checker.check(&current)).await?)
}

async fn run_check(ctx: UpdateContext) -> anyhow::Result<()> {
    match check_now(&ctx).await? {
        Some(info) => print_update(&ctx, &info),
        None => println!("AirDocs {} is up to date.", ctx.current_version),
    }
    Ok(())
}

async fn run_install(ctx: UpdateContext, yes: bool) -> anyhow::Result<()> {
    let Some(info) = check_now(&ctx).await? else {
        println!("AirDocs {} is up to date.", ctx.current_version);
        return Ok(());
    };
    print_update(&ctx, &info);

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, cancelling...");
            cancel_clone.cancel();
        }
    });

    let prepared = tokio::task::spawn_blocking(move || {
        let prompt = TerminalPrompt { assume_yes: yes };
        let sink = BarSink::default();
        let result = startup::offer_update(&ctx, &info, &prompt, &sink, &cancel);
        sink.finish();
        result
    })
    .await??;

    match prepared {
        Some(prepared) => {
            println!(
                "Update {} staged ({} files). It will be installed on the next start.",
                prepared.marker.version, prepared.extraction.files
            );
            if prepared.verification == update::Verification::Skipped {
                println!("Warning: no checksum was available; package integrity was not verified.");
            }
        }
        None => println!("Update skipped."),
    }
    Ok(())
}

/// Applies with stderr-only logging so the log file never pins a file
/// inside the tree being renamed. File logging starts once the application
/// directory is complete again.
fn run_apply(ctx: &UpdateContext) -> anyhow::Result<()> {
    let sink = BarSink::default();
    let report = logging::stderr_only(|| {
        log_start(ctx);
        startup::run_startup(ctx, &sink)
    });
    sink.finish();

    let entry_point = ctx.layout.app_dir().join(&ctx.config.install.entry_point);
    let _log_guard = if entry_point.is_file() {
        let guard = logging::init(&ctx.layout.logs_dir())?;
        match &report.outcome {
            Ok(outcome) => info!(outcome = ?outcome, "startup apply finished"),
            Err(e) => info!(error = %e, "startup apply finished without changes"),
        }
        Some(guard)
    } else {
        None
    };

    if let Some(message) = report.user_message() {
        println!("{message}");
    } else {
        println!("No update is pending.");
    }
    if report.removed_old_version {
        println!("Removed previous version.");
    }
    match report.outcome {
        Ok(InstallOutcome::RollbackFailed { .. }) => {
            anyhow::bail!("update failed and could not be rolled back")
        }
        Ok(InstallOutcome::RecoveryNeeded { .. }) => {
            anyhow::bail!("installation is incomplete, manual recovery required")
        }
        Ok(_) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn run_status(ctx: &UpdateContext) -> anyhow::Result<()> {
    let layout = &ctx.layout;
    println!("Installed version:  {}", ctx.current_version);
    println!("Application dir:    {}", layout.app_dir().display());
    println!("User data dir:      {}", layout.user_dir().display());
    println!("Portable:           {}", layout.is_portable());
    println!("Channel:            {}", ctx.config.check.channel);
    match ctx.pending().read()? {
        Some(marker) => println!(
            "Staged update:      {} (downloaded {})",
            marker.version, marker.download_timestamp
        ),
        None => println!("Staged update:      none"),
    }
    if layout.backup_dir().is_dir() {
        println!("Previous version:   {}", layout.backup_dir().display());
    }
    Ok(())
}

fn run_history(ctx: &UpdateContext, limit: usize) -> anyhow::Result<()> {
    let records = ctx.history().list(limit)?;
    if records.is_empty() {
        println!("No update attempts recorded.");
        return Ok(());
    }
    for r in records {
        let status = match (r.install_success, r.rollback_occurred) {
            (true, _) => "ok",
            (false, true) => "rolled back",
            (false, false) => "failed",
        };
        println!(
            "{}  {} -> {}  [{}] {}",
            r.timestamp,
            r.previous_version,
            r.version,
            status,
            r.error_message.unwrap_or_default()
        );
    }
    Ok(())
}

fn print_update(ctx: &UpdateContext, info: &UpdateInfo) {
    println!(
        "Update available: {} -> {} ({} channel)",
        ctx.current_version, info.version, info.channel
    );
    if !info.release_date.is_empty() {
        println!("Released: {}", info.release_date);
    }
    if !info.release_notes.is_empty() {
        println!("\n{}\n", info.release_notes);
    }
    if info.sha256.is_none() {
        println!("Note: this release has no checksum; integrity cannot be verified.");
    }
}

/// Asks on the terminal.
struct TerminalPrompt {
    assume_yes: bool,
}

impl TerminalPrompt {
    fn ask(&self, question: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        print!("{question} [y/N] ");
        let _ = std::io::stdout().flush();
        let mut answer = String::new();
        if std::io::stdin().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

impl ConfirmationPort for TerminalPrompt {
    fn confirm_install(&self, info: &UpdateInfo) -> bool {
        self.ask(&format!("Download and stage AirDocs {}?", info.version))
    }

    fn confirm_restart(&self, marker: &PendingUpdateMarker) -> bool {
        self.ask(&format!(
            "AirDocs {} is staged. Restart now to install it?",
            marker.version
        ))
    }
}

/// Renders progress events as one indicatif bar per stage.
#[derive(Default)]
struct BarSink {
    bar: Mutex<Option<(Stage, ProgressBar)>>,
}

impl BarSink {
    fn finish(&self) {
        let mut guard = self.bar.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((_, bar)) = guard.take() {
            bar.finish();
        }
    }
}

impl ProgressSink for BarSink {
    fn on_progress(&self, stage: Stage, current: u64, total: u64) {
        let mut guard = self.bar.lock().unwrap_or_else(|e| e.into_inner());
        let needs_new = !matches!(&*guard, Some((s, _)) if *s == stage);
        if needs_new {
            if let Some((_, old)) = guard.take() {
                old.finish();
            }
            let bar = ProgressBar::new(total);
            let template = if stage == Stage::Downloading {
                "  {msg:<20} [{bar:30}] {bytes}/{total_bytes} {bytes_per_sec} ETA {eta}"
            } else {
                "  {msg:<20} [{bar:30}] {pos}/{len}"
            };
            if let Ok(style) = ProgressStyle::with_template(template) {
                bar.set_style(style);
            }
            bar.set_message(stage.to_string());
            *guard = Some((stage, bar));
        }
        if let Some((_, bar)) = guard.as_ref() {
            if total > 0 {
                bar.set_length(total);
            }
            bar.set_position(current);
        }
    }
}
