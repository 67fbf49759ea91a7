use anyhow::{bail, Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use launch_settings::{
    BuildCommand, BuildMetadata, EnvironmentVariables, LaunchProfile, LaunchSettings,
    LaunchSettingsProvider, ProfileKind, ProjectContext, ProjectFlavor, ProviderConfig,
    DEFAULT_SETTINGS_FOLDER,
};
use serde_json::Value;
use std::io;
use std::path::PathBuf;

mod report;

use report::SnapshotReport;

#[derive(Parser)]
#[command(name = "launch-settings")]
#[command(about = "Inspect and edit the launch profiles of a project", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project directory
    #[arg(long, global = true, default_value = ".")]
    project: PathBuf,

    /// Project name (defaults to the directory name)
    #[arg(long, global = true)]
    name: Option<String>,

    /// Which defaults the project gets
    #[arg(long, global = true, value_enum, default_value_t = FlavorArg::Console)]
    kind: FlavorArg,

    /// Folder holding launchSettings.json, relative to the project
    #[arg(long, global = true, default_value = DEFAULT_SETTINGS_FOLDER)]
    settings_folder: String,

    /// Run command reported by the build, as NAME=CMDLINE (repeatable)
    #[arg(long = "command", global = true, value_parser = parse_build_command)]
    commands: Vec<BuildCommand>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile once and print the resulting snapshot
    Show,
    /// Print every published snapshot as a JSON line until interrupted
    Watch,
    /// Select the active profile
    SetActive {
        name: String,
    },
    /// Add a profile or replace the one with the same name
    AddProfile(AddProfileArgs),
    /// Remove a profile
    RemoveProfile {
        name: String,
    },
    /// Add or replace a top-level section (VALUE is JSON, or taken as a string)
    SetGlobal {
        key: String,
        value: String,
    },
    /// Remove a top-level section
    RemoveGlobal {
        key: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FlavorArg {
    Web,
    Console,
    Library,
}

impl From<FlavorArg> for ProjectFlavor {
    fn from(arg: FlavorArg) -> Self {
        match arg {
            FlavorArg::Web => Self::Web,
            FlavorArg::Console => Self::Console,
            FlavorArg::Library => Self::Library,
        }
    }
}

#[derive(Args)]
struct AddProfileArgs {
    name: String,

    /// commandName written to disk (IISExpress, IIS, Project, Executable or a build command)
    #[arg(long, default_value = "Executable")]
    command_name: String,

    #[arg(long)]
    executable: Option<String>,

    /// Command line arguments
    #[arg(long = "args", allow_hyphen_values = true)]
    command_line_args: Option<String>,

    #[arg(long)]
    working_dir: Option<String>,

    #[arg(long)]
    launch_url: Option<String>,

    #[arg(long)]
    application_url: Option<String>,

    #[arg(long)]
    launch_browser: bool,

    /// Environment variable as KEY=VALUE (repeatable)
    #[arg(long = "env", value_parser = parse_key_value)]
    env: Vec<(String, String)>,

    /// Insert at the front instead of replacing in place
    #[arg(long)]
    front: bool,
}

impl AddProfileArgs {
    fn into_profile(self) -> LaunchProfile {
        let kind = ProfileKind::from_command_name(Some(&self.command_name));
        let environment_variables = (!self.env.is_empty())
            .then(|| self.env.into_iter().collect::<EnvironmentVariables>());
        LaunchProfile {
            command_name: Some(self.command_name),
            executable_path: self.executable,
            command_line_args: self.command_line_args,
            working_directory: self.working_dir,
            launch_browser: self.launch_browser,
            launch_url: self.launch_url,
            application_url: self.application_url,
            environment_variables,
            ..LaunchProfile::new(self.name, kind)
        }
    }
}

fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn parse_build_command(raw: &str) -> std::result::Result<BuildCommand, String> {
    let (name, command_line) = parse_key_value(raw)?;
    Ok(BuildCommand::new(name, command_line))
}

fn parse_global_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn print_stdout(text: &str) -> Result<()> {
    use std::io::Write;

    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.write_all(b"\n"))
        .and_then(|_| stdout.flush())
    {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

fn print_snapshot(provider: &LaunchSettingsProvider, snapshot: &LaunchSettings) -> Result<()> {
    let report = SnapshotReport::new(provider.settings_path(), snapshot);
    print_stdout(&serde_json::to_string_pretty(&report)?)
}

pub async fn main_entry() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let mut project = ProjectContext::new(&cli.project, cli.kind.into())
        .with_settings_folder(cli.settings_folder.clone());
    if let Some(name) = &cli.name {
        project = project.with_name(name.clone());
    }
    let config = ProviderConfig {
        watch: matches!(cli.command, Commands::Watch),
        ..ProviderConfig::from_env()
    };
    let provider = LaunchSettingsProvider::builder(project).config(config).build();
    provider
        .start()
        .await
        .with_context(|| format!("failed to start on {}", cli.project.display()))?;

    if !cli.commands.is_empty() {
        provider
            .on_build_metadata(BuildMetadata {
                commands: cli.commands.clone(),
                active_profile: None,
            })
            .await;
    }

    let result = run_command(&provider, cli.command).await;
    provider.flush().await;
    provider.shutdown();
    result
}

async fn run_command(provider: &LaunchSettingsProvider, command: Commands) -> Result<()> {
    match command {
        Commands::Show => return run_show(provider),
        Commands::Watch => return run_watch(provider).await,
        Commands::SetActive { name } => provider.set_active_profile(&name).await?,
        Commands::AddProfile(args) => {
            let front = args.front;
            provider
                .add_or_update_profile(args.into_profile(), front)
                .await?;
        }
        Commands::RemoveProfile { name } => provider.remove_profile(&name).await?,
        Commands::SetGlobal { key, value } => {
            provider
                .add_or_update_global_setting(&key, parse_global_value(&value))
                .await?;
        }
        Commands::RemoveGlobal { key } => provider.remove_global_setting(&key).await?,
    }
    let snapshot = provider.snapshot_or_error().await?;
    print_snapshot(provider, &snapshot)
}

fn run_show(provider: &LaunchSettingsProvider) -> Result<()> {
    let Some(snapshot) = provider.current_snapshot() else {
        bail!("no launch settings available");
    };
    print_snapshot(provider, &snapshot)?;
    if let Some(message) = snapshot.error_message() {
        bail!(
            "{} has errors: {message}",
            provider.settings_path().display()
        );
    }
    Ok(())
}

async fn run_watch(provider: &LaunchSettingsProvider) -> Result<()> {
    let mut updates = provider.subscribe();
    if let Some(snapshot) = updates.latest() {
        let report = SnapshotReport::new(provider.settings_path(), &snapshot);
        print_stdout(&serde_json::to_string(&report)?)?;
    }
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl-C")?;
                log::info!("interrupted; stopping");
                break;
            }
            snapshot = updates.changed() => {
                let Some(snapshot) = snapshot else { break };
                let report = SnapshotReport::new(provider.settings_path(), &snapshot);
                print_stdout(&serde_json::to_string(&report)?)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_value_splits_on_first_equals() {
        assert_eq!(
            parse_key_value("web=run --server.urls=http://localhost:8080"),
            Ok((
                "web".to_string(),
                "run --server.urls=http://localhost:8080".to_string()
            ))
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }

    #[test]
    fn global_values_fall_back_to_strings() {
        assert_eq!(parse_global_value("{\"a\": 1}"), serde_json::json!({"a": 1}));
        assert_eq!(parse_global_value("true"), Value::Bool(true));
        assert_eq!(parse_global_value("plain"), Value::String("plain".into()));
    }

    #[test]
    fn add_profile_args_infer_kind() {
        let cli = Cli::parse_from([
            "launch-settings",
            "add-profile",
            "site",
            "--command-name",
            "IISExpress",
            "--env",
            "A=1",
            "--front",
        ]);
        let Commands::AddProfile(args) = cli.command else {
            panic!("expected add-profile");
        };
        assert!(args.front);
        let profile = args.into_profile();
        assert_eq!(profile.kind, ProfileKind::IisExpress);
        assert_eq!(
            profile
                .environment_variables
                .as_ref()
                .and_then(|env| env.get("A")),
            Some("1")
        );
    }

    #[test]
    fn repeated_commands_are_collected() {
        let cli = Cli::parse_from([
            "launch-settings",
            "--kind",
            "library",
            "--command",
            "web=run",
            "--command",
            "test=xunit",
            "show",
        ]);
        assert_eq!(cli.commands.len(), 2);
        assert_eq!(cli.commands[1], BuildCommand::new("test", "xunit"));
        assert!(matches!(cli.kind, FlavorArg::Library));
    }
}
