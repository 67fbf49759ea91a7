//! The merge of disk state, build metadata and generated defaults.
//!
//! ```text
//! previous snapshot ─┐
//! disk document ─────┼─> 1. starting list ─> 2. build commands ─> 3. defaults
//! build metadata ────┘                                               │
//!                          5. diff (broadcast? persist?) <─ 4. active name
//! ```
//!
//! Everything here is synchronous and free of I/O; the provider feeds it the
//! decoded document and acts on the outcome.

use crate::build::BuildCommand;
use crate::codec::{to_document, DecodedDocument};
use crate::profile::{
    is_blank, EnvironmentVariables, LaunchProfile, ProfileKind, IIS_EXPRESS_COMMAND,
    IIS_EXPRESS_PROFILE_NAME, NO_ACTION_PROFILE_NAME,
};
use crate::project::{PortAllocator, ProjectContext, ProjectFlavor};
use crate::sections::SectionRegistry;
use crate::server::{ServerBinding, ServerSettings};
use crate::snapshot::{GlobalSettings, LaunchSettings};
use crate::Result;
use log::{debug, warn};

pub const WEB_COMMAND_NAME: &str = "web";
pub const DEFAULT_WEB_URL: &str = "http://localhost:5000/";
pub const ENVIRONMENT_VARIABLE: &str = "ASPNETCORE_ENVIRONMENT";
pub const DEVELOPMENT_ENVIRONMENT: &str = "Development";

const HOSTING_MARKERS: [&str; 3] = [
    "Microsoft.AspNet.Hosting",
    "Microsoft.AspNet.Server.Kestrel",
    "Microsoft.AspNet.Server.WebListener",
];
const SERVER_URLS_OPTION: &str = "--server.urls";

/// What step 1 found on disk.
#[derive(Debug)]
pub enum DiskState {
    /// The file was not reloaded; start from the previous snapshot.
    Unchanged,
    /// No file, or an empty one.
    Missing,
    Loaded(DecodedDocument),
}

#[derive(Debug)]
pub struct ReconcileInput<'a> {
    pub previous: Option<&'a LaunchSettings>,
    pub disk: DiskState,
    pub active_override: Option<&'a str>,
    pub commands: Option<&'a [BuildCommand]>,
}

#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub snapshot: LaunchSettings,
    /// Subscribers would observe a difference.
    pub broadcast: bool,
    /// The written document would differ from what the pass started from.
    pub persist: bool,
}

pub struct Reconciler<'a> {
    project: &'a ProjectContext,
    ports: &'a dyn PortAllocator,
    registry: &'a SectionRegistry,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        project: &'a ProjectContext,
        ports: &'a dyn PortAllocator,
        registry: &'a SectionRegistry,
    ) -> Self {
        Self {
            project,
            ports,
            registry,
        }
    }

    pub fn reconcile(&self, input: ReconcileInput<'_>) -> Result<ReconcileOutcome> {
        let previous = input.previous;
        let (mut profiles, mut server, globals) = starting_state(input.disk, previous);
        let start_form = to_document(&profiles, server.as_ref(), &globals, self.registry)?;

        if let Some(commands) = input.commands {
            merge_build_commands(&mut profiles, commands);
        }

        self.ensure_defaults(&mut profiles, &mut server, previous);

        let mut active = resolve_active_name(&profiles, input.active_override, previous);
        if profiles.is_empty() {
            profiles.push(LaunchProfile::no_action());
            active = Some(NO_ACTION_PROFILE_NAME.to_string());
        }

        let snapshot = LaunchSettings::new(profiles, active, globals, server);
        let end_form = to_document(
            snapshot.profiles(),
            snapshot.server_settings(),
            snapshot.global_settings(),
            self.registry,
        )?;
        let persist = end_form != start_form;
        let broadcast = previous.map_or(true, |prev| {
            prev.content_differs(&snapshot)
                || prev.active_profile_name() != snapshot.active_profile_name()
        });
        debug!(
            "reconciled {} profile(s); broadcast={broadcast} persist={persist}",
            snapshot.profiles().len()
        );

        Ok(ReconcileOutcome {
            snapshot,
            broadcast,
            persist,
        })
    }

    /// Inserts the profiles and bindings the project flavor requires.
    /// Running it on its own output changes nothing.
    pub fn ensure_defaults(
        &self,
        profiles: &mut Vec<LaunchProfile>,
        server: &mut Option<ServerSettings>,
        previous: Option<&LaunchSettings>,
    ) {
        match self.project.flavor() {
            ProjectFlavor::Web => {
                self.ensure_iis_express(profiles, server, previous);
                if profiles.iter().any(|p| p.kind == ProfileKind::Iis) {
                    self.ensure_iis_binding(server, previous);
                }
            }
            ProjectFlavor::Console => self.ensure_run_project(profiles),
            ProjectFlavor::Library => {}
        }
    }

    fn ensure_iis_express(
        &self,
        profiles: &mut Vec<LaunchProfile>,
        server: &mut Option<ServerSettings>,
        previous: Option<&LaunchSettings>,
    ) {
        let existing = profiles.iter_mut().find(|p| p.name == IIS_EXPRESS_PROFILE_NAME);
        match existing {
            Some(profile) if profile.kind == ProfileKind::IisExpress => {
                profile.executable_path = None;
                profile.command_name = Some(IIS_EXPRESS_COMMAND.to_string());
            }
            Some(profile) => {
                warn!(
                    "profile '{IIS_EXPRESS_PROFILE_NAME}' has kind {:?}; not adding the default",
                    profile.kind
                );
            }
            None => {
                debug!("adding default '{IIS_EXPRESS_PROFILE_NAME}' profile");
                let profile = LaunchProfile {
                    launch_browser: true,
                    environment_variables: Some(development_environment()),
                    ..LaunchProfile::new(IIS_EXPRESS_PROFILE_NAME, ProfileKind::IisExpress)
                };
                profiles.insert(0, profile);
            }
        }

        let binding = server
            .get_or_insert_with(ServerSettings::default)
            .iis_express
            .get_or_insert_with(ServerBinding::default);
        if is_blank(binding.application_url.as_deref()) {
            let url = previous_url(previous, |s| s.iis_express.as_ref()).unwrap_or_else(|| {
                format!("http://localhost:{}/", self.ports.next_free_port())
            });
            binding.application_url = Some(url);
        }
    }

    fn ensure_iis_binding(
        &self,
        server: &mut Option<ServerSettings>,
        previous: Option<&LaunchSettings>,
    ) {
        let binding = server
            .get_or_insert_with(ServerSettings::default)
            .iis
            .get_or_insert_with(ServerBinding::default);
        if is_blank(binding.application_url.as_deref()) {
            let url = previous_url(previous, |s| s.iis.as_ref())
                .unwrap_or_else(|| format!("http://localhost/{}", self.project.name()));
            binding.application_url = Some(url);
        }
    }

    fn ensure_run_project(&self, profiles: &mut Vec<LaunchProfile>) {
        let name = self.project.name();
        if profiles.iter().any(|p| p.name == name) {
            return;
        }
        debug!("adding run-project profile '{name}'");
        profiles.push(LaunchProfile::new(name, ProfileKind::Project));
    }
}

fn starting_state(
    disk: DiskState,
    previous: Option<&LaunchSettings>,
) -> (Vec<LaunchProfile>, Option<ServerSettings>, GlobalSettings) {
    match (disk, previous) {
        (DiskState::Loaded(doc), _) => (doc.profiles, doc.server_settings, doc.global_settings),
        (DiskState::Missing, _) | (DiskState::Unchanged, None) => {
            (Vec::new(), None, GlobalSettings::new())
        }
        (DiskState::Unchanged, Some(prev)) => (
            prev.profiles()
                .iter()
                .filter(|p| !p.kind.is_synthetic())
                .cloned()
                .collect(),
            prev.server_settings().cloned(),
            prev.global_settings().clone(),
        ),
    }
}

fn previous_url(
    previous: Option<&LaunchSettings>,
    pick: impl Fn(&ServerSettings) -> Option<&ServerBinding>,
) -> Option<String> {
    previous
        .and_then(LaunchSettings::server_settings)
        .and_then(pick)
        .and_then(|b| b.application_url.clone())
        .filter(|url| !url.trim().is_empty())
}

/// Folds the build-reported commands into the profile list (step 2).
pub fn merge_build_commands(profiles: &mut Vec<LaunchProfile>, commands: &[BuildCommand]) {
    let mut pending: Vec<&BuildCommand> = commands.iter().collect();
    let mut merged = Vec::with_capacity(profiles.len() + pending.len());

    for mut profile in profiles.drain(..) {
        if let Some(idx) = pending.iter().position(|c| c.name == profile.name) {
            let command = pending.remove(idx);
            profile.kind = ProfileKind::BuiltInCommand;
            profile.executable_path = None;
            profile.command_name = Some(profile.name.clone());
            apply_web_defaults(&mut profile, command, false);
            merged.push(profile);
        } else if profile.kind == ProfileKind::BuiltInCommand {
            if profile.should_be_persisted() {
                debug!("command '{}' is gone; keeping customized profile", profile.name);
                profile.kind = ProfileKind::CustomizedCommand;
                merged.push(profile);
            } else {
                debug!("command '{}' is gone; dropping its profile", profile.name);
            }
        } else {
            merged.push(profile);
        }
    }

    for command in pending {
        if merged.iter().any(|p| p.name == command.name) {
            continue;
        }
        let mut profile = LaunchProfile {
            command_name: Some(command.name.clone()),
            ..LaunchProfile::new(command.name.clone(), ProfileKind::BuiltInCommand)
        };
        apply_web_defaults(&mut profile, command, true);
        merged.push(profile);
    }

    *profiles = merged;
}

/// Web commands launch a browser at their server URL; freshly created ones
/// also get the development environment.
fn apply_web_defaults(profile: &mut LaunchProfile, command: &BuildCommand, is_new: bool) {
    if !is_web_command(command) {
        return;
    }
    if is_blank(profile.application_url.as_deref()) {
        profile.launch_browser = true;
        profile.application_url = Some(
            server_url_from_command_line(&command.command_line)
                .unwrap_or_else(|| DEFAULT_WEB_URL.to_string()),
        );
    }
    if is_new {
        profile.environment_variables = Some(development_environment());
    }
}

#[must_use]
pub fn is_web_command(command: &BuildCommand) -> bool {
    command.name.eq_ignore_ascii_case(WEB_COMMAND_NAME)
        || HOSTING_MARKERS
            .iter()
            .any(|marker| command.command_line.contains(marker))
}

/// First URL passed through `--server.urls`, in either `--server.urls x` or
/// `--server.urls=x` form. The value may list several URLs separated by commas.
/// In the space-separated form the value must start with `http`.
#[must_use]
pub fn server_url_from_command_line(command_line: &str) -> Option<String> {
    let tokens: Vec<&str> = command_line.split_whitespace().collect();
    for (idx, token) in tokens.iter().enumerate() {
        if *token == SERVER_URLS_OPTION {
            match tokens.get(idx + 1) {
                Some(next) if next.starts_with("http") => return first_url(next),
                _ => continue,
            }
        }
        if let Some(rest) = token.strip_prefix(SERVER_URLS_OPTION) {
            let Some(value) = rest.strip_prefix('=') else {
                continue;
            };
            if value.is_empty() || value.contains('=') {
                return None;
            }
            return first_url(value);
        }
    }
    None
}

fn first_url(list: &str) -> Option<String> {
    list.split(',')
        .find(|url| !url.is_empty())
        .map(str::to_string)
}

/// Active name for the new snapshot (step 4).
fn resolve_active_name(
    profiles: &[LaunchProfile],
    active_override: Option<&str>,
    previous: Option<&LaunchSettings>,
) -> Option<String> {
    if let Some(name) = active_override.filter(|n| !n.trim().is_empty()) {
        return Some(name.to_string());
    }
    if let Some(name) = previous.and_then(LaunchSettings::active_profile_name) {
        if profiles.iter().any(|p| p.name == name) {
            return Some(name.to_string());
        }
    }
    profiles.first().map(|p| p.name.clone())
}

fn development_environment() -> EnvironmentVariables {
    [(ENVIRONMENT_VARIABLE, DEVELOPMENT_ENVIRONMENT)]
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode, encode};
    use crate::project::FixedPortAllocator;
    use pretty_assertions::assert_eq;

    const PORT: FixedPortAllocator = FixedPortAllocator(51234);

    fn project(flavor: ProjectFlavor) -> ProjectContext {
        ProjectContext::new("/work/Sample", flavor)
    }

    fn run(
        project: &ProjectContext,
        previous: Option<&LaunchSettings>,
        disk: DiskState,
        commands: Option<&[BuildCommand]>,
        active: Option<&str>,
    ) -> ReconcileOutcome {
        let registry = SectionRegistry::new();
        Reconciler::new(project, &PORT, &registry)
            .reconcile(ReconcileInput {
                previous,
                disk,
                active_override: active,
                commands,
            })
            .unwrap()
    }

    fn names(settings: &LaunchSettings) -> Vec<&str> {
        settings.profiles().iter().map(|p| p.name.as_str()).collect()
    }

    fn loaded(raw: &str) -> DiskState {
        DiskState::Loaded(decode(raw, &SectionRegistry::new()).unwrap())
    }

    #[test]
    fn web_defaults_are_created_once() {
        let web = project(ProjectFlavor::Web);
        let first = run(&web, None, DiskState::Missing, None, None);
        assert!(first.broadcast);
        assert!(first.persist);
        assert_eq!(names(&first.snapshot), vec![IIS_EXPRESS_PROFILE_NAME]);
        let binding = first
            .snapshot
            .server_settings()
            .and_then(|s| s.iis_express.clone())
            .unwrap();
        assert_eq!(binding.application_url.as_deref(), Some("http://localhost:51234/"));

        let second = run(&web, Some(&first.snapshot), DiskState::Unchanged, None, None);
        assert!(!second.broadcast);
        assert!(!second.persist);
        assert_eq!(second.snapshot, first.snapshot);

        let written = encode(&first.snapshot, &SectionRegistry::new()).unwrap();
        let reloaded = run(&web, Some(&first.snapshot), loaded(&written), None, None);
        assert!(!reloaded.broadcast);
        assert!(!reloaded.persist);
    }

    #[test]
    fn ensure_defaults_is_idempotent() {
        let registry = SectionRegistry::new();
        for flavor in [ProjectFlavor::Web, ProjectFlavor::Console, ProjectFlavor::Library] {
            let ctx = project(flavor);
            let reconciler = Reconciler::new(&ctx, &PORT, &registry);
            let mut profiles = vec![LaunchProfile::new("site", ProfileKind::Iis)];
            let mut server = None;
            reconciler.ensure_defaults(&mut profiles, &mut server, None);
            let (once_profiles, once_server) = (profiles.clone(), server.clone());
            reconciler.ensure_defaults(&mut profiles, &mut server, None);
            assert_eq!(profiles, once_profiles, "{flavor:?}");
            assert_eq!(server, once_server, "{flavor:?}");
        }
    }

    #[test]
    fn iis_profile_gets_default_binding() {
        let web = project(ProjectFlavor::Web);
        let outcome = run(
            &web,
            None,
            loaded(r#"{"profiles": {"site": {"commandName": "IIS"}}}"#),
            None,
            None,
        );
        let server = outcome.snapshot.server_settings().unwrap();
        assert_eq!(
            server.iis.as_ref().and_then(|b| b.application_url.as_deref()),
            Some("http://localhost/Sample")
        );
        assert_eq!(names(&outcome.snapshot), vec![IIS_EXPRESS_PROFILE_NAME, "site"]);
    }

    #[test]
    fn application_url_is_reused_from_previous_snapshot() {
        let web = project(ProjectFlavor::Web);
        let previous = LaunchSettings::new(
            Vec::new(),
            None,
            GlobalSettings::new(),
            Some(ServerSettings {
                iis_express: Some(ServerBinding::with_url("http://localhost:7777/")),
                ..ServerSettings::default()
            }),
        );
        let outcome = run(&web, Some(&previous), DiskState::Missing, None, None);
        let url = outcome
            .snapshot
            .server_settings()
            .and_then(|s| s.iis_express.as_ref())
            .and_then(|b| b.application_url.clone());
        assert_eq!(url.as_deref(), Some("http://localhost:7777/"));
    }

    #[test]
    fn console_project_runs_itself_without_writing() {
        let console = project(ProjectFlavor::Console);
        let outcome = run(&console, None, DiskState::Missing, None, None);
        assert_eq!(names(&outcome.snapshot), vec!["Sample"]);
        assert_eq!(outcome.snapshot.profiles()[0].kind, ProfileKind::Project);
        assert_eq!(outcome.snapshot.active_profile_name(), Some("Sample"));
        assert!(outcome.broadcast);
        assert!(!outcome.persist);
    }

    #[test]
    fn empty_library_gets_no_action_profile() {
        let library = project(ProjectFlavor::Library);
        let outcome = run(&library, None, DiskState::Missing, None, None);
        assert_eq!(names(&outcome.snapshot), vec![NO_ACTION_PROFILE_NAME]);
        assert_eq!(outcome.snapshot.profiles()[0].kind, ProfileKind::NoAction);
        assert_eq!(outcome.snapshot.active_profile_name(), Some(NO_ACTION_PROFILE_NAME));
        assert!(!outcome.persist);

        let again = run(&library, Some(&outcome.snapshot), DiskState::Unchanged, None, None);
        assert!(!again.broadcast);
        assert_eq!(again.snapshot, outcome.snapshot);
    }

    #[test]
    fn new_web_command_gets_url_browser_and_environment() {
        let library = project(ProjectFlavor::Library);
        let commands = [BuildCommand::new("web", "Microsoft.AspNet.Server.Kestrel")];
        let outcome = run(&library, None, DiskState::Missing, Some(&commands), None);
        let web = outcome.snapshot.profile("web").unwrap();
        assert_eq!(web.kind, ProfileKind::BuiltInCommand);
        assert!(web.launch_browser);
        assert_eq!(web.application_url.as_deref(), Some(DEFAULT_WEB_URL));
        assert_eq!(
            web.environment_variables
                .as_ref()
                .and_then(|e| e.get(ENVIRONMENT_VARIABLE)),
            Some(DEVELOPMENT_ENVIRONMENT)
        );
        assert!(outcome.persist);
    }

    #[test]
    fn environment_is_injected_on_creation_only() {
        let library = project(ProjectFlavor::Library);
        let commands = [BuildCommand::new("web", "run")];
        let first = run(&library, None, DiskState::Missing, Some(&commands), None);

        let mut edited = first.snapshot.profile("web").cloned().unwrap();
        edited.environment_variables = None;
        let previous = first
            .snapshot
            .to_builder()
            .add_or_update_profile(edited, false)
            .build();

        let second = run(&library, Some(&previous), DiskState::Unchanged, Some(&commands), None);
        let web = second.snapshot.profile("web").unwrap();
        assert!(web.environment_variables.is_none());
        assert!(!second.broadcast);
    }

    #[test]
    fn web_heuristic_reads_server_urls_and_markers() {
        assert!(is_web_command(&BuildCommand::new("WEB", "")));
        assert!(is_web_command(&BuildCommand::new(
            "kestrel",
            "Microsoft.AspNet.Hosting --config hosting.ini"
        )));
        assert!(!is_web_command(&BuildCommand::new("test", "xunit.runner")));

        assert_eq!(
            server_url_from_command_line(
                "Microsoft.AspNet.Hosting --server.urls http://*:8080,http://*:9090"
            ),
            Some("http://*:8080".to_string())
        );
        assert_eq!(
            server_url_from_command_line("--server.urls=http://localhost:1234,http://b:2"),
            Some("http://localhost:1234".to_string())
        );
        assert_eq!(server_url_from_command_line("--server.urls"), None);
        assert_eq!(server_url_from_command_line("--server.urls --other"), None);
        assert_eq!(
            server_url_from_command_line("--server.urls --other --server.urls=http://c:3"),
            Some("http://c:3".to_string())
        );
        assert_eq!(server_url_from_command_line("--server.urls=a=b"), None);
        assert_eq!(server_url_from_command_line("Microsoft.AspNet.Hosting"), None);
    }

    #[test]
    fn iis_express_name_taken_by_another_kind_is_left_alone() {
        let web = project(ProjectFlavor::Web);
        let outcome = run(
            &web,
            None,
            loaded(
                r#"{"profiles": {"IIS Express": {"commandName": "Executable", "executablePath": "/bin/site"}}}"#,
            ),
            None,
            None,
        );
        assert_eq!(names(&outcome.snapshot), vec![IIS_EXPRESS_PROFILE_NAME]);
        let profile = &outcome.snapshot.profiles()[0];
        assert_eq!(profile.kind, ProfileKind::Executable);
        assert_eq!(profile.executable_path.as_deref(), Some("/bin/site"));
        assert!(outcome
            .snapshot
            .server_settings()
            .and_then(|s| s.iis_express.as_ref())
            .is_some());

        let commands = [BuildCommand::new(IIS_EXPRESS_PROFILE_NAME, "dotnet run")];
        let claimed = run(&web, None, DiskState::Missing, Some(&commands), None);
        assert_eq!(names(&claimed.snapshot), vec![IIS_EXPRESS_PROFILE_NAME]);
        assert_eq!(claimed.snapshot.profiles()[0].kind, ProfileKind::BuiltInCommand);
    }

    #[test]
    fn run_project_profile_is_appended_under_project_name() {
        let console = project(ProjectFlavor::Console);
        let outcome = run(
            &console,
            None,
            loaded(r#"{"profiles": {"tool": {"commandName": "Executable"}}}"#),
            None,
            None,
        );
        assert_eq!(names(&outcome.snapshot), vec!["tool", "Sample"]);
        assert_eq!(outcome.snapshot.active_profile_name(), Some("tool"));

        let other_project = run(
            &console,
            None,
            loaded(r#"{"profiles": {"tool": {}, "Other": {"commandName": "Project"}}}"#),
            None,
            None,
        );
        assert_eq!(names(&other_project.snapshot), vec!["tool", "Other", "Sample"]);

        let taken = run(
            &console,
            None,
            loaded(r#"{"profiles": {"Sample": {"commandName": "Executable"}}}"#),
            None,
            None,
        );
        assert_eq!(names(&taken.snapshot), vec!["Sample"]);
        assert_eq!(taken.snapshot.profiles()[0].kind, ProfileKind::Executable);
    }

    #[test]
    fn existing_profile_is_claimed_by_command() {
        let library = project(ProjectFlavor::Library);
        let commands = [BuildCommand::new("tool", "dotnet tool")];
        let outcome = run(
            &library,
            None,
            loaded(r#"{"profiles": {"tool": {"commandName": "custom", "executablePath": "/bin/x", "commandLineArgs": "-v"}}}"#),
            Some(&commands),
            None,
        );
        let tool = outcome.snapshot.profile("tool").unwrap();
        assert_eq!(tool.kind, ProfileKind::BuiltInCommand);
        assert_eq!(tool.executable_path, None);
        assert_eq!(tool.command_name.as_deref(), Some("tool"));
        assert_eq!(tool.command_line_args.as_deref(), Some("-v"));
        assert!(outcome.persist);
    }

    #[test]
    fn vanished_commands_are_demoted_or_dropped() {
        let library = project(ProjectFlavor::Library);
        let customized = LaunchProfile {
            command_line_args: Some("--fast".into()),
            ..LaunchProfile::new("bench", ProfileKind::BuiltInCommand)
        };
        let plain = LaunchProfile::new("plain", ProfileKind::BuiltInCommand);
        let user = LaunchProfile::new("mine", ProfileKind::Executable);
        let previous = LaunchSettings::new(
            vec![customized, plain, user],
            Some("plain".into()),
            GlobalSettings::new(),
            None,
        );

        let outcome = run(&library, Some(&previous), DiskState::Unchanged, Some(&[]), None);
        assert_eq!(names(&outcome.snapshot), vec!["bench", "mine"]);
        assert_eq!(
            outcome.snapshot.profile("bench").map(|p| p.kind),
            Some(ProfileKind::CustomizedCommand)
        );
        assert_eq!(outcome.snapshot.active_profile_name(), Some("bench"));
        assert!(outcome.broadcast);
    }

    #[test]
    fn active_name_prefers_override_then_previous() {
        let library = project(ProjectFlavor::Library);
        let raw = r#"{"profiles": {"a": {}, "b": {}, "c": {}}}"#;

        let fresh = run(&library, None, loaded(raw), None, None);
        assert_eq!(fresh.snapshot.active_profile_name(), Some("a"));

        let chosen = run(&library, Some(&fresh.snapshot), DiskState::Unchanged, None, Some("c"));
        assert_eq!(chosen.snapshot.active_profile_name(), Some("c"));
        assert!(chosen.broadcast);
        assert!(!chosen.persist);

        let kept = run(&library, Some(&chosen.snapshot), DiskState::Unchanged, None, None);
        assert_eq!(kept.snapshot.active_profile_name(), Some("c"));
        assert!(!kept.broadcast);

        let unknown = run(&library, Some(&fresh.snapshot), DiskState::Unchanged, None, Some("zzz"));
        assert_eq!(
            unknown.snapshot.active_profile().map(|p| p.name.as_str()),
            Some("a")
        );
    }

    #[test]
    fn synthetic_entries_do_not_survive_into_next_pass() {
        let library = project(ProjectFlavor::Library);
        let error = LaunchSettings::error("broken");
        let outcome = run(
            &library,
            Some(&error),
            DiskState::Unchanged,
            Some(&[BuildCommand::new("run", "x")]),
            None,
        );
        assert_eq!(names(&outcome.snapshot), vec!["run"]);
        assert!(outcome.broadcast);
    }
}
