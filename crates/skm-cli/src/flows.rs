use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use semver::Version;

use skm_core::{
    compile_ignore_patterns, copy_path, materialize, plugin_file_set, versions_url, CancelToken,
    InstallLayout, PluginManifest,
};
use skm_devloop::{BuildPipeline, DevLoopController, RunSpec};
use skm_installer::{run_install, run_update, HttpReleaseFetcher, UpdateContext};
use skm_watcher::{WatchContext, WatchPolicy};

use crate::render::{current_output_style, render_status_line, start_spinner};

/// Paths skipped while copying and watching plugin sources, always in
/// effect alongside any user-supplied patterns.
pub(crate) const DEFAULT_PLUGIN_IGNORES: &[&str] = &[
    "vendor",
    r"\.git",
    "docs",
    r"\.idea",
    r"___\w*",
    "node_modules",
];

pub fn run_install_command(dir: &Path, version: &str) -> Result<()> {
    let style = current_output_style();
    let spinner = start_spinner(style, &format!("fetching release {version}"));
    let result = run_install(dir, version, &HttpReleaseFetcher);
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    result?;
    println!(
        "{}",
        render_status_line(style, "done", &format!("installed into {}", dir.display()))
    );
    Ok(())
}

pub fn run_update_command(dir: &Path, version: &str, verbose: bool) -> Result<()> {
    let style = current_output_style();
    let ctx = UpdateContext::new(dir, verbose);
    run_update(&ctx, version, &HttpReleaseFetcher)?;
    println!(
        "{}",
        render_status_line(style, "done", &format!("updated {}", dir.display()))
    );
    Ok(())
}

pub fn run_versions_command() -> Result<()> {
    let url = versions_url();
    let body = reqwest::blocking::get(&url)
        .with_context(|| format!("failed to fetch version listing: {url}"))?
        .error_for_status()
        .with_context(|| format!("version listing request rejected: {url}"))?
        .text()
        .context("failed to read version listing")?;

    let versions = parse_version_listing(&body);
    if versions.is_empty() {
        println!("No published versions found");
        return Ok(());
    }
    for version in versions {
        println!("{version}");
    }
    Ok(())
}

/// Parses one version per line, dropping anything that is not valid
/// semver, and orders the result newest first.
pub(crate) fn parse_version_listing(body: &str) -> Vec<Version> {
    let mut versions: Vec<Version> = body
        .lines()
        .filter_map(|line| Version::parse(line.trim()).ok())
        .collect();
    versions.sort_unstable_by(|a, b| b.cmp(a));
    versions
}

pub struct PluginCopyArgs {
    pub src: PathBuf,
    pub dest: PathBuf,
    pub watch: bool,
    pub run: bool,
    pub dev_mode: bool,
    pub entry: PathBuf,
    pub extra_copies: Vec<PathBuf>,
    pub delete: bool,
    pub ignore: Vec<String>,
    pub verbose: bool,
}

pub fn run_plugin_copy(args: PluginCopyArgs) -> Result<()> {
    // All input validation happens before any filesystem mutation.
    if !args.src.is_dir() {
        return Err(anyhow!(
            "plugin source directory does not exist: {}",
            args.src.display()
        ));
    }
    if !args.dest.is_dir() {
        return Err(anyhow!(
            "destination directory does not exist: {}",
            args.dest.display()
        ));
    }
    let manifest = PluginManifest::load(&args.src.join("manifest.json"))?;

    let ignore_patterns = plugin_ignore_patterns(&args.ignore);
    let compiled_ignore = compile_ignore_patterns(&ignore_patterns)?;

    // Dev mode only makes sense with a supervised server.
    let run = args.run || args.dev_mode;

    let layout = InstallLayout::new(&args.dest);
    if run && !layout.is_installation() {
        return Err(anyhow!(
            "{} is not a SiteKit installation, cannot run the server there",
            args.dest.display()
        ));
    }

    let plugin_dir = layout.plugin_dir(&manifest.id);
    let pipeline = BuildPipeline::new(
        args.src.join(&args.entry),
        plugin_dir.join(&manifest.services.bin),
    );

    let src = args.src.clone();
    let extras: Vec<PathBuf> = args
        .extra_copies
        .iter()
        .map(|extra| args.src.join(extra))
        .collect();
    let delete = args.delete;
    let deploy_layout = layout.clone();
    let deploy = Box::new(move || {
        // Reloaded per cycle so manifest edits take effect mid-watch.
        let manifest = PluginManifest::load(&src.join("manifest.json"))?;
        let set = plugin_file_set(&src, &manifest, &extras);
        materialize(
            &set,
            &src,
            &deploy_layout.plugin_dir(&manifest.id),
            delete,
            &compiled_ignore,
        )
    });

    let mut controller = DevLoopController::new(deploy).with_pipeline(pipeline);
    if run {
        controller = controller.with_run(RunSpec {
            name: "sitekit".to_string(),
            binary: layout.server_binary_path(),
            work_dir: args.dest.clone(),
        });
        if args.dev_mode {
            controller = controller.with_server_pipeline(BuildPipeline::new(
                args.dest.join("main.go"),
                layout.server_binary_path(),
            ));
        }
    }

    let controller = Arc::new(Mutex::new(controller));
    controller
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .run_cycle()?;
    println!("Deployed plugin {} to {}", manifest.id, plugin_dir.display());

    if args.watch {
        watch_and_rebuild(&args.src, &ignore_patterns, &controller, args.verbose)?;
    } else if run {
        wait_for_interrupt()?;
    } else {
        return Ok(());
    }

    controller
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .shutdown();
    Ok(())
}

fn watch_and_rebuild(
    src: &Path,
    ignore_patterns: &[String],
    controller: &Arc<Mutex<DevLoopController>>,
    verbose: bool,
) -> Result<()> {
    let cancel = CancelToken::default();
    install_interrupt_handler(&cancel)?;

    let hook_controller = Arc::clone(controller);
    let policy = WatchPolicy::Rebuild(Box::new(move |path| {
        println!("Change detected: {}", path.display());
        let mut controller = hook_controller
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(err) = controller.run_cycle() {
            eprintln!("rebuild failed: {err:#}");
        }
    }));

    println!("Watching {} for changes", src.display());
    WatchContext::new(src, ignore_patterns, policy, cancel)?
        .with_debounce_window(skm_watcher::REBUILD_DEBOUNCE_WINDOW)
        .with_verbose(verbose)
        .watch()
}

fn wait_for_interrupt() -> Result<()> {
    let cancel = CancelToken::default();
    install_interrupt_handler(&cancel)?;
    cancel.wait();
    Ok(())
}

fn install_interrupt_handler(cancel: &CancelToken) -> Result<()> {
    let handler_cancel = cancel.clone();
    ctrlc::set_handler(move || handler_cancel.cancel())
        .context("failed to install interrupt handler")
}

pub(crate) fn plugin_ignore_patterns(user_patterns: &[String]) -> Vec<String> {
    let mut patterns: Vec<String> = DEFAULT_PLUGIN_IGNORES
        .iter()
        .map(|pattern| pattern.to_string())
        .collect();
    patterns.extend(user_patterns.iter().cloned());
    patterns
}

pub struct ThemeCopyArgs {
    pub src: PathBuf,
    pub dest: PathBuf,
    pub name: String,
    pub watch: bool,
    pub delete: bool,
    pub ignore: Vec<String>,
    pub verbose: bool,
}

pub fn run_theme_copy(args: ThemeCopyArgs) -> Result<()> {
    if !args.src.is_dir() {
        return Err(anyhow!(
            "theme source directory does not exist: {}",
            args.src.display()
        ));
    }
    if !args.dest.is_dir() {
        return Err(anyhow!(
            "destination directory does not exist: {}",
            args.dest.display()
        ));
    }
    if args.name.trim().is_empty() {
        return Err(anyhow!("theme name must not be empty"));
    }
    let compiled_ignore = compile_ignore_patterns(&args.ignore)?;

    let theme_dir = InstallLayout::new(&args.dest).theme_dir(&args.name);
    copy_path(&args.src, &theme_dir, args.delete, &compiled_ignore)?;
    println!("Deployed theme {} to {}", args.name, theme_dir.display());

    if !args.watch {
        return Ok(());
    }

    let cancel = CancelToken::default();
    install_interrupt_handler(&cancel)?;

    println!("Watching {} for changes", args.src.display());
    WatchContext::new(
        &args.src,
        &args.ignore,
        WatchPolicy::CarbonCopy {
            destination: theme_dir,
        },
        cancel,
    )?
    .with_verbose(args.verbose)
    .watch()
}
