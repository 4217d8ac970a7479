use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

mod flows;
mod render;

use flows::{PluginCopyArgs, ThemeCopyArgs};

#[derive(Parser, Debug)]
#[command(name = "skm")]
#[command(about = "Manager for SiteKit installations, plugins, and themes", long_about = None)]
struct Cli {
    /// Print per-file detail while copying and merging.
    #[arg(long, global = true)]
    verbose: bool,
    /// Release version to install or update to.
    #[arg(long, global = true, default_value = skm_core::layout::DEFAULT_RELEASE_VERSION)]
    use_version: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download and unpack a fresh release into a directory.
    Install { dir: PathBuf },
    /// Apply a staged update to an installation (defaults to the current
    /// directory).
    Update { dir: Option<PathBuf> },
    /// List published release versions, newest first.
    Versions,
    /// Plugin development commands.
    Plugin {
        #[command(subcommand)]
        command: PluginCommands,
    },
    /// Theme development commands.
    Theme {
        #[command(subcommand)]
        command: ThemeCommands,
    },
    /// Print a shell completion script.
    Completion { shell: Shell },
}

#[derive(Subcommand, Debug)]
enum PluginCommands {
    /// Build a plugin and deploy it into an installation.
    Copy {
        src: PathBuf,
        dest: PathBuf,
        /// Keep watching the source tree and redeploy on change.
        #[arg(long)]
        watch: bool,
        /// Start the installation's server after deploying.
        #[arg(long)]
        run: bool,
        /// Rebuild the server from source before each start.
        #[arg(long)]
        dev_mode: bool,
        /// Build entry file, relative to the plugin source tree.
        #[arg(long, default_value = "main.go")]
        entry: PathBuf,
        /// Extra path to deploy, relative to the plugin source tree.
        #[arg(long = "copy")]
        copy: Vec<PathBuf>,
        /// Remove each destination subtree before copying into it.
        #[arg(long)]
        delete: bool,
        /// Ignore pattern (regex), added to the default set.
        #[arg(long = "ignore")]
        ignore: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
enum ThemeCommands {
    /// Deploy a theme into an installation.
    Copy {
        src: PathBuf,
        dest: PathBuf,
        /// Theme name to deploy as.
        #[arg(long)]
        name: String,
        /// Keep watching the source tree and mirror changes.
        #[arg(long)]
        watch: bool,
        /// Remove the destination theme before copying.
        #[arg(long)]
        delete: bool,
        /// Ignore pattern (regex).
        #[arg(long = "ignore")]
        ignore: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Install { dir } => flows::run_install_command(&dir, &cli.use_version),
        Commands::Update { dir } => {
            let dir = dir.unwrap_or_else(|| PathBuf::from("."));
            flows::run_update_command(&dir, &cli.use_version, cli.verbose)
        }
        Commands::Versions => flows::run_versions_command(),
        Commands::Plugin {
            command:
                PluginCommands::Copy {
                    src,
                    dest,
                    watch,
                    run,
                    dev_mode,
                    entry,
                    copy,
                    delete,
                    ignore,
                },
        } => flows::run_plugin_copy(PluginCopyArgs {
            src,
            dest,
            watch,
            run,
            dev_mode,
            entry,
            extra_copies: copy,
            delete,
            ignore,
            verbose: cli.verbose,
        }),
        Commands::Theme {
            command:
                ThemeCommands::Copy {
                    src,
                    dest,
                    name,
                    watch,
                    delete,
                    ignore,
                },
        } => flows::run_theme_copy(ThemeCopyArgs {
            src,
            dest,
            name,
            watch,
            delete,
            ignore,
            verbose: cli.verbose,
        }),
        Commands::Completion { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "skm", &mut std::io::stdout());
            Ok(())
        }
    }
}
