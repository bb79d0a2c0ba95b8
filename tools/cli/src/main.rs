//! PhantomVault CLI - Command line interface for profiles and folders.
//!
//! Locks folders into the per-user vault and unlocks them again, either
//! temporarily (relocked when the process is told to quit) or permanently.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use phantomvault_autolock::{AutoLockCoordinator, AutoLockReport, SignalSender, SystemSignal};
use phantomvault_common::{Error, Password, ProfileId};
use phantomvault_vault::{FolderEntry, Profile, UnlockMode, VaultLayout, VaultManager};

#[derive(Parser)]
#[command(name = "phantomvault")]
#[command(about = "PhantomVault - Password-protected folder vault")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Data directory (default: per-user data dir).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage profiles.
    #[command(subcommand)]
    Profile(ProfileCommand),

    /// Manage folders of a profile.
    Folder {
        /// Profile name (default: the active profile).
        #[arg(short, long, global = true)]
        profile: Option<String>,

        #[command(subcommand)]
        command: FolderCommand,
    },
}

#[derive(Subcommand)]
enum ProfileCommand {
    /// Create a profile.
    Create { name: String },
    /// List profiles.
    List,
    /// Make a profile active.
    Use { name: String },
    /// Change a profile's master password.
    Passwd { name: String },
    /// Show a profile's recovery key.
    RecoveryKey { name: String },
    /// Recover a master password with a recovery key.
    Recover,
    /// Delete a profile.
    Delete { name: String },
}

#[derive(Subcommand)]
enum FolderCommand {
    /// Start managing a folder.
    Add {
        path: PathBuf,

        /// Protect the folder with its own password.
        #[arg(long)]
        custom_password: bool,
    },
    /// List managed folders.
    List,
    /// Lock a folder into the vault.
    Lock {
        /// Folder id or name.
        folder: String,
    },
    /// Unlock a folder.
    Unlock {
        /// Folder id or name.
        folder: String,

        /// Remove the folder from vault management instead of relocking later.
        #[arg(long)]
        permanent: bool,
    },
    /// Unlock every master-password folder.
    UnlockAll {
        #[arg(long)]
        permanent: bool,
    },
    /// Stop managing an unlocked folder.
    Remove { folder: String },
    /// Hide an unlocked folder.
    Hide { folder: String },
    /// Reveal a hidden folder.
    Unhide { folder: String },
    /// Recover a custom folder password with its recovery key.
    RecoverPassword { folder: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let result = run(cli).await;
    if let Err(e) = &result {
        if e.downcast_ref::<Error>().is_some_and(Error::requires_manual_recovery) {
            error!(error = %e, "Rollback failed");
            eprintln!("!! MANUAL RECOVERY REQUIRED !!");
            eprintln!("A folder may be partially moved or encrypted. Its backups were kept under the data directory.");
        }
    }
    result
}

async fn run(cli: Cli) -> Result<()> {
    let root = match cli.data_dir {
        Some(dir) => dir,
        None => VaultLayout::default_root().context("Failed to locate data directory")?,
    };
    let vault = VaultManager::open(VaultLayout::new(&root))
        .await
        .context("Failed to open vault")?;

    match cli.command {
        Commands::Profile(command) => run_profile(&vault, command).await,
        Commands::Folder { profile, command } => {
            let profile = resolve_profile(&vault, profile.as_deref()).await?;
            run_folder(&vault, &profile, command).await
        }
    }
}

/// Prompt for password securely.
fn prompt_password(prompt: &str) -> Result<Password> {
    let password = rpassword::prompt_password(prompt).context("Failed to read password")?;
    Ok(Password::new(password))
}

fn prompt_new_password(prompt: &str) -> Result<Password> {
    let password = prompt_password(prompt)?;
    let confirm = prompt_password("Confirm password: ")?;
    if password != confirm {
        anyhow::bail!("Passwords do not match");
    }
    Ok(password)
}

async fn profile_by_name(vault: &VaultManager, name: &str) -> Result<Profile> {
    vault
        .profiles()
        .find_profile_by_name(name)
        .await?
        .with_context(|| format!("No profile named '{}'", name))
}

async fn resolve_profile(vault: &VaultManager, name: Option<&str>) -> Result<Profile> {
    match name {
        Some(name) => profile_by_name(vault, name).await,
        None => vault
            .active_profile()
            .await?
            .context("No active profile; run `phantomvault profile use <name>` or pass --profile"),
    }
}

async fn run_profile(vault: &VaultManager, command: ProfileCommand) -> Result<()> {
    match command {
        ProfileCommand::Create { name } => {
            let password = prompt_new_password("Master password: ")?;
            let (profile, recovery_key) = vault
                .create_profile(&name, &password)
                .await
                .context("Failed to create profile")?;
            println!("Profile created: {} ({})", profile.name, profile.id);
            println!("Recovery key: {}", recovery_key.expose());
            println!("Store it somewhere safe. It is shown only on request with the master password.");
        }

        ProfileCommand::List => {
            let active = vault.active_profile().await?.map(|p| p.id);
            for profile in vault.profiles().list_profiles().await? {
                let marker = if Some(&profile.id) == active.as_ref() { "*" } else { " " };
                println!(
                    "{} {:<20} {}  last used {}",
                    marker,
                    profile.name,
                    profile.id,
                    profile.last_access_at.format("%Y-%m-%d %H:%M")
                );
            }
        }

        ProfileCommand::Use { name } => {
            let profile = profile_by_name(vault, &name).await?;
            let password = prompt_password("Master password: ")?;
            vault
                .switch_profile(&profile.id, &password)
                .await
                .context("Failed to switch profile")?;
            println!("Active profile: {}", profile.name);
        }

        ProfileCommand::Passwd { name } => {
            let profile = profile_by_name(vault, &name).await?;
            let old = prompt_password("Current master password: ")?;
            let new = prompt_new_password("New master password: ")?;
            let recovery_key = vault
                .change_password(&profile.id, &old, &new)
                .await
                .context("Failed to change password")?;
            println!("Password changed.");
            println!("New recovery key: {}", recovery_key.expose());
        }

        ProfileCommand::RecoveryKey { name } => {
            let profile = profile_by_name(vault, &name).await?;
            let password = prompt_password("Master password: ")?;
            let recovery_key = vault
                .profiles()
                .show_recovery_key(&profile.id, &password)
                .await
                .context("Failed to show recovery key")?;
            println!("Recovery key: {}", recovery_key.expose());
        }

        ProfileCommand::Recover => {
            let key = prompt_password("Recovery key: ")?;
            let (profile_id, password) = vault
                .profiles()
                .recover_with_recovery_key(key.expose())
                .await
                .context("Failed to recover master password")?;
            let profile = vault.profiles().get_profile(&profile_id).await?;
            println!("Profile: {}", profile.name);
            println!("Master password: {}", password.expose());
        }

        ProfileCommand::Delete { name } => {
            let profile = profile_by_name(vault, &name).await?;
            let password = prompt_password("Master password: ")?;
            vault
                .delete_profile(&profile.id, &password)
                .await
                .context("Failed to delete profile")?;
            println!("Profile deleted: {}", profile.name);
        }
    }
    Ok(())
}

/// Find a folder by id or by unique name.
async fn resolve_folder(vault: &VaultManager, profile_id: &ProfileId, key: &str) -> Result<FolderEntry> {
    let folders = vault.engine().list_folders(profile_id).await?;
    if let Some(entry) = folders.iter().find(|f| f.id.as_str() == key) {
        return Ok(entry.clone());
    }
    let mut matches = folders.into_iter().filter(|f| f.folder_name == key);
    match (matches.next(), matches.next()) {
        (Some(entry), None) => Ok(entry),
        (Some(_), Some(_)) => anyhow::bail!("Several folders are named '{}'; use the folder id", key),
        (None, _) => anyhow::bail!("No folder matches '{}'", key),
    }
}

fn folder_password(entry: &FolderEntry) -> Result<Password> {
    if entry.uses_master_password {
        prompt_password("Master password: ")
    } else {
        prompt_password(&format!("Password for {}: ", entry.folder_name))
    }
}

fn unlock_mode(permanent: bool) -> UnlockMode {
    if permanent {
        UnlockMode::Permanent
    } else {
        UnlockMode::Temporary
    }
}

async fn run_folder(vault: &VaultManager, profile: &Profile, command: FolderCommand) -> Result<()> {
    let engine = vault.engine();
    match command {
        FolderCommand::Add { path, custom_password } => {
            let custom = if custom_password {
                Some(prompt_new_password("Folder password: ")?)
            } else {
                None
            };
            let added = engine
                .add_folder(&profile.id, &path, custom.as_ref())
                .await
                .context("Failed to add folder")?;
            println!("Folder added: {} ({})", added.entry.folder_name, added.entry.id);
            if let Some(key) = added.recovery_key {
                println!("Folder recovery key: {}", key.expose());
            }
        }

        FolderCommand::List => {
            for entry in engine.list_folders(&profile.id).await? {
                let state = match (entry.is_locked, entry.unlock_mode) {
                    (true, _) => "locked".to_string(),
                    (false, Some(mode)) => format!("unlocked ({})", mode),
                    (false, None) => "unlocked".to_string(),
                };
                let path = entry
                    .original_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("{}  {:<20} {:<22} {}", entry.id, entry.folder_name, state, path);
            }
        }

        FolderCommand::Lock { folder } => {
            let entry = resolve_folder(vault, &profile.id, &folder).await?;
            let password = folder_password(&entry)?;
            engine
                .lock_folder_with_password(&profile.id, &entry.id, &password)
                .await
                .context("Failed to lock folder")?;
            println!("Locked: {}", entry.folder_name);
        }

        FolderCommand::Unlock { folder, permanent } => {
            let entry = resolve_folder(vault, &profile.id, &folder).await?;
            let password = folder_password(&entry)?;
            let coordinator = AutoLockCoordinator::attach(engine);
            let unlocked = engine
                .unlock_folder(&profile.id, &entry.id, &password, unlock_mode(permanent))
                .await
                .context("Failed to unlock folder")?;
            if !unlocked {
                anyhow::bail!("Unlock failed");
            }
            println!("Unlocked: {}", entry.folder_name);
            if !permanent {
                hold_until_exit(&coordinator).await?;
            }
        }

        FolderCommand::UnlockAll { permanent } => {
            let password = prompt_password("Master password: ")?;
            let coordinator = AutoLockCoordinator::attach(engine);
            let report = engine
                .unlock_all_folders(&profile.id, &password, unlock_mode(permanent))
                .await?;
            println!("Unlocked {} folder(s)", report.succeeded.len());
            for (id, reason) in &report.failed {
                eprintln!("  failed {}: {}", id, reason);
            }
            if !permanent && !report.succeeded.is_empty() {
                hold_until_exit(&coordinator).await?;
            }
        }

        FolderCommand::Remove { folder } => {
            let entry = resolve_folder(vault, &profile.id, &folder).await?;
            engine
                .remove_folder(&profile.id, &entry.id)
                .await
                .context("Failed to remove folder")?;
            println!("No longer managed: {}", entry.folder_name);
        }

        FolderCommand::Hide { folder } => {
            let entry = resolve_folder(vault, &profile.id, &folder).await?;
            let hidden = engine.hide_folder(&profile.id, &entry.id).await?;
            if let Some(path) = hidden.original_path {
                println!("Hidden at {}", path.display());
            }
        }

        FolderCommand::Unhide { folder } => {
            let entry = resolve_folder(vault, &profile.id, &folder).await?;
            let shown = engine.unhide_folder(&profile.id, &entry.id).await?;
            if let Some(path) = shown.original_path {
                println!("Visible at {}", path.display());
            }
        }

        FolderCommand::RecoverPassword { folder } => {
            let entry = resolve_folder(vault, &profile.id, &folder).await?;
            let key = prompt_password("Folder recovery key: ")?;
            let password = engine
                .recover_folder_password(&profile.id, &entry.id, key.expose())
                .await
                .context("Failed to recover folder password")?;
            println!("Folder password: {}", password.expose());
        }
    }
    Ok(())
}

/// Keep temporarily unlocked folders open until the process is told to stop,
/// then relock them before exiting.
async fn hold_until_exit(coordinator: &Arc<AutoLockCoordinator>) -> Result<()> {
    let (sender, signal_loop) = coordinator.spawn();
    let task = tokio::spawn(signal_loop.run());

    println!("Folders stay unlocked until Ctrl-C.");
    let signal = wait_for_exit_signal().await?;
    let report = relock(&sender, signal).await?;

    sender.shutdown().await;
    task.await.context("Auto-lock loop panicked")?;

    println!("Relocked {} folder(s)", report.locked.len());
    if !report.is_complete() {
        for (id, reason) in &report.failed {
            eprintln!("  failed {}: {}", id, reason);
        }
        anyhow::bail!("Some folders could not be relocked");
    }
    Ok(())
}

async fn relock(sender: &SignalSender, signal: SystemSignal) -> Result<AutoLockReport> {
    info!(%signal, "Relocking before exit");
    sender
        .deliver(signal)
        .await?
        .context("Exit signal was not held for relocking")
}

#[cfg(unix)]
async fn wait_for_exit_signal() -> Result<SystemSignal> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            Ok(SystemSignal::BeforeQuit)
        }
        _ = terminate.recv() => Ok(SystemSignal::Shutdown),
    }
}

#[cfg(not(unix))]
async fn wait_for_exit_signal() -> Result<SystemSignal> {
    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    Ok(SystemSignal::BeforeQuit)
}
