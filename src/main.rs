//! Optinstaller - OptiScaler version manager
//!
//! Command-line front-end: list/download/delete cached versions and install,
//! update or remove OptiScaler in game directories.

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use optinstaller::compat::{
    check_opti_patcher_support, find_shipping_binaries, has_unreal_engine_layout, EnvironmentInfo,
};
use optinstaller::config::AppConfig;
use optinstaller::installers::{
    GameConfig, GameSettings, InstallEngine, InstallError, InstallTarget, InstallationOptions,
    Upscaler, DEFAULT_TARGET_FILENAME,
};
use optinstaller::logging::{init_logger, log_action, log_error, log_warning};
use optinstaller::tasks::{run_in_background, TaskContext};
use optinstaller::versions::{is_newer_version, DownloadProgress, VersionDescriptor, VersionManager};

type CliResult<T = ()> = Result<T, Box<dyn Error + Send + Sync>>;

/// Download, cache and install OptiScaler releases
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List known versions (remote feeds plus the local cache)
    Versions {
        /// Only show versions already downloaded
        #[arg(long)]
        offline: bool,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Download a version into the local cache
    Download { tag: String },

    /// Remove a version from the local cache
    Delete { tag: String },

    /// Show what is installed in a game directory
    Status { dir: PathBuf },

    /// Install OptiScaler into a game directory
    Install {
        dir: PathBuf,
        /// Version tag (defaults to the last used, then the newest)
        #[arg(short, long)]
        version: Option<String>,
        /// Filename the payload is installed as
        #[arg(short, long, default_value = DEFAULT_TARGET_FILENAME)]
        filename: String,
        /// Force Dxgi=false (typical for AMD/Intel GPUs)
        #[arg(long)]
        no_spoofing: bool,
        /// Also install the OptiPatcher plugin
        #[arg(long)]
        opti_patcher: bool,
        /// Do not write a removal script
        #[arg(long)]
        no_uninstaller: bool,
    },

    /// Replace only the installed payload, keeping configuration
    Update {
        dir: PathBuf,
        #[arg(short, long)]
        version: Option<String>,
    },

    /// Remove OptiScaler from a game directory
    Uninstall { dir: PathBuf },

    /// Show or change settings in a game's OptiScaler.ini
    Config {
        dir: PathBuf,
        /// auto, dlss, fsr2, xess or fsr3
        #[arg(long)]
        upscaler: Option<Upscaler>,
        #[arg(long)]
        render_scale: Option<f32>,
        #[arg(long)]
        sharpness: Option<f32>,
        /// Show the in-game overlay menu
        #[arg(long)]
        overlay: Option<bool>,
        /// GPU spoofing (Dxgi=auto when on, Dxgi=false when off)
        #[arg(long)]
        spoofing: Option<bool>,
    },

    /// Manage saved game directories
    Games {
        #[command(subcommand)]
        command: GamesCommands,
    },
}

#[derive(Subcommand, Debug)]
enum GamesCommands {
    /// List saved directories and their install state
    List,
    /// Save a game directory
    Add { dir: PathBuf },
    /// Forget a game directory
    Remove { dir: PathBuf },
}

fn main() {
    let cli = Cli::parse();

    init_logger();
    log_action(&format!("{:?}", cli.command));

    if let Err(e) = run(cli.command) {
        log_error(&e.to_string());
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(command: Commands) -> CliResult {
    let mut config = AppConfig::load();
    let manager = Arc::new(VersionManager::new());
    let engine = Arc::new(InstallEngine::new());

    match command {
        Commands::Versions { offline, json } => {
            let versions = if offline {
                manager.list_local()
            } else {
                let m = manager.clone();
                run_with_progress("catalog", move |ctx| {
                    ctx.set_status("Fetching releases...".to_string());
                    m.list_versions()
                })?
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&versions)?);
            } else {
                print_versions(&versions, config.last_selected_version.as_deref());
            }
        }

        Commands::Download { tag } => {
            let version = ensure_downloaded(&manager, Some(tag))?;
            println!("{} ready at {}", version.tag_name, display_local(&version));
            config.last_selected_version = Some(version.tag_name);
            config.save();
        }

        Commands::Delete { tag } => {
            let mut local = manager.list_local();
            let version = VersionManager::find(&mut local, &tag)
                .ok_or_else(|| format!("version '{}' is not downloaded", tag))?;
            manager.delete(version)?;
            println!("Deleted {}", tag);

            if config
                .last_selected_version
                .as_deref()
                .is_some_and(|t| t.eq_ignore_ascii_case(&tag))
            {
                config.last_selected_version = None;
                config.save();
            }
        }

        Commands::Status { dir } => {
            let target = InstallTarget::detect(&dir, &engine);
            print_target(&target);

            if target.is_installed {
                if let Some(newest) = manager.list_local().first() {
                    if is_newer_version(&newest.tag_name, &target.current_version) {
                        println!("  Update:    {} is cached (run `update`)", newest.tag_name);
                    }
                }
            }
            warn_unreal_layout(&dir);
        }

        Commands::Install {
            dir,
            version,
            filename,
            no_spoofing,
            opti_patcher,
            no_uninstaller,
        } => {
            require_dir(&dir)?;
            warn_unreal_layout(&dir);

            let version = ensure_downloaded(&manager, version.or(config.last_selected_version.clone()))?;
            let local_path = version
                .local_path
                .clone()
                .ok_or_else(|| format!("{} has no local copy", version.tag_name))?;

            let mut options = InstallationOptions::new(&dir, local_path);
            options.target_filename = filename;
            options.enable_spoofing = !no_spoofing;
            options.use_opti_patcher = opti_patcher;
            options.create_uninstaller = !no_uninstaller;

            let environment = EnvironmentInfo::detect();
            environment.apply_to(&mut options);
            println!("GPU: {}", environment.gpu_name);

            if opti_patcher && !check_opti_patcher_support(&dir) {
                log_warning("OptiPatcher does not list this game; installing it anyway");
                println!("Warning: OptiPatcher does not list an executable from this directory");
            }

            let e = engine.clone();
            run_with_progress("install", move |ctx| e.install(&options, ctx))??;

            let target = InstallTarget::detect(&dir, &engine);
            print_target(&target);

            config.last_selected_version = Some(version.tag_name);
            config.add_path(&dir);
            config.save();
        }

        Commands::Update { dir, version } => {
            let target = InstallTarget::detect(&dir, &engine);
            if !target.is_installed {
                return Err(InstallError::NotInstalled(dir).into());
            }

            let version = ensure_downloaded(&manager, version.or(config.last_selected_version.clone()))?;
            let local_path = version
                .local_path
                .clone()
                .ok_or_else(|| format!("{} has no local copy", version.tag_name))?;

            let previous = target.current_version.clone();
            let filename = target.installed_filename.clone();
            let e = engine.clone();
            let target_dir = dir.clone();
            run_with_progress("update", move |ctx| {
                ctx.set_status(format!("Replacing {}...", filename));
                e.update_payload(&target_dir, &local_path, &filename)
            })??;

            let mut target = target;
            target.refresh(&engine);
            println!("Updated {}: {} -> {}", target.name, previous, target.current_version);

            config.last_selected_version = Some(version.tag_name);
            config.save();
        }

        Commands::Uninstall { dir } => {
            let mut target = InstallTarget::detect(&dir, &engine);
            let e = engine.clone();
            let target = run_with_progress("uninstall", move |ctx| {
                ctx.set_status(format!("Removing OptiScaler from {}...", target.name));
                target.uninstall(&e).map(|_| target)
            })??;
            println!("OptiScaler removed from {}", target.name);
        }

        Commands::Config {
            dir,
            upscaler,
            render_scale,
            sharpness,
            overlay,
            spoofing,
        } => {
            let mut game_config = GameConfig::load(&dir)?;
            let settings = &mut game_config.settings;
            if let Some(upscaler) = upscaler {
                settings.upscaler = upscaler;
            }
            if render_scale.is_some() {
                settings.render_scale = render_scale;
            }
            if sharpness.is_some() {
                settings.sharpness = sharpness;
            }
            if let Some(overlay) = overlay {
                settings.overlay = overlay;
            }
            if let Some(spoofing) = spoofing {
                settings.spoofing = spoofing;
            }

            if game_config.is_modified() {
                game_config.save()?;
                println!("Saved {}", game_config.path().display());
            }
            print_settings(&game_config.settings);
        }

        Commands::Games { command } => match command {
            GamesCommands::List => {
                if config.saved_paths.is_empty() {
                    println!("No saved game directories (add one with `games add <dir>`)");
                }
                for path in &config.saved_paths {
                    let target = InstallTarget::detect(path, &engine);
                    println!("{:<40} {}", target.name, describe(&target));
                }
            }
            GamesCommands::Add { dir } => {
                require_dir(&dir)?;
                if config.add_path(&dir) {
                    config.save();
                    println!("Saved {}", dir.display());
                } else {
                    println!("{} is already saved", dir.display());
                }
            }
            GamesCommands::Remove { dir } => {
                if config.remove_path(&dir) {
                    config.save();
                    println!("Removed {}", dir.display());
                } else {
                    println!("{} was not saved", dir.display());
                }
            }
        },
    }

    Ok(())
}

// ============================================================================
// Version Resolution
// ============================================================================

/// Finds `tag` (or the newest version) and downloads it if needed.
fn ensure_downloaded(manager: &Arc<VersionManager>, tag: Option<String>) -> CliResult<VersionDescriptor> {
    if let Some(tag) = &tag {
        let mut local = manager.list_local();
        if let Some(v) = VersionManager::find(&mut local, tag) {
            return Ok(v.clone());
        }
    }

    let m = manager.clone();
    let mut versions = run_with_progress("catalog", move |ctx| {
        ctx.set_status("Fetching releases...".to_string());
        m.list_versions()
    })?;

    let version = match &tag {
        Some(tag) => VersionManager::find(&mut versions, tag)
            .cloned()
            .ok_or_else(|| format!("unknown version '{}'", tag))?,
        None => versions
            .first()
            .cloned()
            .ok_or("no versions available (offline with an empty cache?)")?,
    };

    if version.is_downloaded {
        return Ok(version);
    }

    let m = manager.clone();
    let version = run_with_progress("download", move |ctx| {
        let mut version = version;
        m.download(&mut version, ctx).map(|_| version)
    })??;
    Ok(version)
}

// ============================================================================
// Background Execution
// ============================================================================

enum Update {
    Status(String),
    Progress(DownloadProgress),
}

/// Runs `job` on a worker thread, drawing its updates on the main thread.
fn run_with_progress<T, F>(name: &str, job: F) -> CliResult<T>
where
    T: Send + 'static,
    F: FnOnce(&TaskContext) -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<Update>();
    let status_tx = tx.clone();
    let ctx = TaskContext::new(
        move |msg| {
            let _ = status_tx.send(Update::Status(msg));
        },
        move |p| {
            let _ = tx.send(Update::Progress(p));
        },
    );

    let handle = run_in_background(name, move || job(&ctx))?;

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .map_err(|e| e.to_string())?
            .progress_chars("█▉▊▋▌▍▎▏ "),
    );
    bar.enable_steady_tick(Duration::from_millis(100));

    // Ends once the worker drops its context
    for update in rx {
        match update {
            Update::Status(msg) => bar.set_message(msg),
            Update::Progress(DownloadProgress::Percent(p)) => bar.set_position(p.round() as u64),
            Update::Progress(DownloadProgress::Indeterminate) => {}
        }
    }
    bar.finish_and_clear();

    handle.join().map_err(|_| format!("{} task panicked", name).into())
}

// ============================================================================
// Output
// ============================================================================

fn print_versions(versions: &[VersionDescriptor], selected: Option<&str>) {
    if versions.is_empty() {
        println!("No versions found");
        return;
    }
    for v in versions {
        let marker = if selected.is_some_and(|s| v.matches_tag(s)) { "*" } else { " " };
        let state = if v.is_downloaded { "downloaded" } else { "" };
        println!(
            "{} {:<32} {}  {:<10} {}",
            marker,
            v.tag_name,
            v.published_at.format("%Y-%m-%d"),
            v.origin,
            state
        );
    }
}

fn describe(target: &InstallTarget) -> String {
    if target.is_installed {
        format!("{} ({})", target.current_version, target.installed_filename)
    } else {
        target.current_version.clone()
    }
}

fn print_target(target: &InstallTarget) {
    println!("{}", target.name);
    println!("  Path:      {}", target.path.display());
    println!("  Status:    {}", describe(target));
}

fn print_settings(settings: &GameSettings) {
    let number = |value: Option<f32>| value.map_or_else(|| "auto".to_string(), |v| format!("{:.1}", v));
    println!("  Upscaler:     {}", settings.upscaler);
    println!("  Render scale: {}", number(settings.render_scale));
    println!("  Sharpness:    {}", number(settings.sharpness));
    println!("  Overlay menu: {}", if settings.overlay { "on" } else { "off" });
    println!("  Spoofing:     {}", if settings.spoofing { "on" } else { "off" });
}

fn display_local(version: &VersionDescriptor) -> String {
    version
        .local_path
        .as_deref()
        .map(|p| p.display().to_string())
        .unwrap_or_default()
}

fn warn_unreal_layout(dir: &Path) {
    if has_unreal_engine_layout(dir) {
        println!("Warning: this looks like an Unreal Engine launcher directory.");
        match find_shipping_binaries(dir) {
            Some(bin) => println!("         OptiScaler usually belongs in {}", bin.display()),
            None => println!("         OptiScaler usually belongs next to the *-Shipping.exe binary"),
        }
    }
}

fn require_dir(dir: &Path) -> CliResult {
    if !dir.is_dir() {
        return Err(format!("{} is not a directory", dir.display()).into());
    }
    Ok(())
}
