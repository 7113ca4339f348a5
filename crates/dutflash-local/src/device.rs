//! Device reached through external command-line tools
//!
//! The version query runs the tool shipped with the build (bound to
//! `{tool}`) and expects `<image kind> <version>` on the first non-empty
//! stdout line. The update runs an arbitrary flashing program; its output is
//! streamed into the attempt log line by line and its exit code classifies
//! the attempt.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Output, Stdio};

use async_trait::async_trait;
use dutflash_core::{
    AttemptOutcome, AttemptRequest, CollaboratorError, CollaboratorResult, DeviceHandle,
    FailureReason, InstalledImage, VersionSession,
};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

/// Argument templates for the external tools
///
/// Placeholders: `{tool}`, `{build}`, `{branch}`, `{image}`, `{artifact}`,
/// `{destination}`, `{serial}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCommands {
    /// Prints "<image kind> <version>"
    #[serde(default = "default_version_command")]
    pub version_command: Vec<String>,

    /// Flashes the device; exit code 0 means success
    #[serde(default = "default_update_command")]
    pub update_command: Vec<String>,
}

impl Default for DeviceCommands {
    fn default() -> Self {
        Self {
            version_command: default_version_command(),
            update_command: default_update_command(),
        }
    }
}

fn default_version_command() -> Vec<String> {
    vec!["{tool}".to_string(), "version".to_string()]
}

fn default_update_command() -> Vec<String> {
    [
        "dut-update",
        "--build",
        "{build}",
        "--branch",
        "{branch}",
        "--image",
        "{image}",
        "--destination",
        "{destination}",
        "--serial",
        "{serial}",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Values substituted into command templates
#[derive(Debug, Default, Clone)]
struct Placeholders<'a> {
    tool: Option<&'a Path>,
    build: Option<&'a str>,
    branch: Option<&'a str>,
    image: Option<&'a str>,
    artifact: Option<&'a Path>,
    destination: Option<&'a Path>,
    serial: Option<&'a str>,
}

impl Placeholders<'_> {
    fn expand(&self, template: &[String]) -> CollaboratorResult<Vec<String>> {
        if template.is_empty() {
            return Err(CollaboratorError::Internal("empty command template".into()));
        }

        let path = |p: Option<&Path>| p.map(|p| p.display().to_string());
        let values = [
            ("{tool}", path(self.tool)),
            ("{build}", self.build.map(String::from)),
            ("{branch}", self.branch.map(String::from)),
            ("{image}", self.image.map(String::from)),
            ("{artifact}", path(self.artifact)),
            ("{destination}", path(self.destination)),
            ("{serial}", self.serial.map(String::from)),
        ];

        Ok(template
            .iter()
            .map(|arg| {
                values.iter().fold(arg.clone(), |arg, (key, value)| match value {
                    Some(value) => arg.replace(key, value),
                    None => arg,
                })
            })
            .collect())
    }
}

/// Map an update tool's exit code to an attempt failure
pub fn failure_from_exit_code(code: Option<i32>) -> FailureReason {
    match code {
        Some(2) => FailureReason::Download,
        Some(3) => FailureReason::DeviceUnavailable,
        Some(4) => FailureReason::Transfer,
        Some(5) => FailureReason::Verification,
        Some(124) => FailureReason::Timeout,
        Some(code) => FailureReason::Other(format!("exit status {}", code)),
        None => FailureReason::Other("terminated by signal".to_string()),
    }
}

fn parse_version_line(stdout: &[u8]) -> CollaboratorResult<InstalledImage> {
    let text = String::from_utf8_lossy(stdout);
    let line = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or_else(|| CollaboratorError::InvalidResponse("empty version output".into()))?;

    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(kind), Some(version)) => Ok(InstalledImage {
            kind: kind
                .parse()
                .map_err(|e| CollaboratorError::InvalidResponse(format!("{}", e)))?,
            version: version.to_string(),
        }),
        _ => Err(CollaboratorError::InvalidResponse(format!(
            "expected '<image> <version>', got '{}'",
            line
        ))),
    }
}

fn command(argv: &[String]) -> CollaboratorResult<(&String, Command)> {
    debug!(command = ?argv, "Running device command");
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| CollaboratorError::Internal("empty command".into()))?;
    let mut command = Command::new(program);
    command.args(args).kill_on_drop(true);
    Ok((program, command))
}

fn spawn_error(program: &str, e: std::io::Error) -> CollaboratorError {
    if e.kind() == std::io::ErrorKind::NotFound {
        CollaboratorError::DeviceUnavailable(format!("tool not found: {}", program))
    } else {
        CollaboratorError::Io(e)
    }
}

async fn run(argv: &[String]) -> CollaboratorResult<Output> {
    let (program, mut command) = command(argv)?;
    command.output().await.map_err(|e| spawn_error(program, e))
}

/// Run a command, copying each stdout/stderr line into `log` as it arrives.
///
/// Lines already written stay in the log if the future is dropped before
/// the command exits.
async fn run_logged(
    argv: &[String],
    log: &mut (dyn Write + Send),
) -> CollaboratorResult<ExitStatus> {
    let (program, mut command) = command(argv)?;
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| spawn_error(program, e))?;

    let missing_pipe = || CollaboratorError::Internal("child output not captured".into());
    let mut stdout = BufReader::new(child.stdout.take().ok_or_else(missing_pipe)?).lines();
    let mut stderr = BufReader::new(child.stderr.take().ok_or_else(missing_pipe)?).lines();

    let (mut stdout_done, mut stderr_done) = (false, false);
    while !(stdout_done && stderr_done) {
        let (line, from_stdout) = tokio::select! {
            line = stdout.next_line(), if !stdout_done => (line?, true),
            line = stderr.next_line(), if !stderr_done => (line?, false),
        };
        match line {
            Some(line) => {
                writeln!(log, "{}", line)?;
                log.flush()?;
            }
            None if from_stdout => stdout_done = true,
            None => stderr_done = true,
        }
    }

    Ok(child.wait().await?)
}

/// Device handle driving external tools
#[derive(Debug, Clone, Default)]
pub struct CommandDevice {
    commands: DeviceCommands,
}

impl CommandDevice {
    pub fn new(commands: DeviceCommands) -> Self {
        Self { commands }
    }

    async fn query_version(&self, tool: &Path) -> CollaboratorResult<InstalledImage> {
        let argv = Placeholders {
            tool: Some(tool),
            artifact: Some(tool),
            ..Default::default()
        }
        .expand(&self.commands.version_command)?;

        let output = run(&argv).await?;
        if !output.status.success() {
            return Err(CollaboratorError::DeviceUnavailable(format!(
                "version query exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        parse_version_line(&output.stdout)
    }
}

/// Version session bound to one device tool
struct CommandSession {
    device: CommandDevice,
    tool: PathBuf,
}

#[async_trait]
impl VersionSession for CommandSession {
    async fn version_info(&mut self) -> CollaboratorResult<InstalledImage> {
        self.device.query_version(&self.tool).await
    }
}

#[async_trait]
impl DeviceHandle for CommandDevice {
    async fn open_session(&self, artifact: &Path) -> CollaboratorResult<Box<dyn VersionSession>> {
        Ok(Box::new(CommandSession {
            device: self.clone(),
            tool: artifact.to_path_buf(),
        }))
    }

    async fn update(
        &self,
        request: AttemptRequest<'_>,
        log: &mut (dyn Write + Send),
    ) -> CollaboratorResult<AttemptOutcome> {
        let argv = Placeholders {
            tool: Some(request.build.artifact_path.as_path()),
            build: Some(request.build.build_number.as_str()),
            branch: Some(request.branch),
            image: Some(request.image_kind.as_str()),
            artifact: Some(request.build.artifact_path.as_path()),
            destination: Some(request.destination),
            serial: request.device.serial_number(),
        }
        .expand(&self.commands.update_command)?;

        let status = run_logged(&argv, log).await?;
        if !status.success() {
            return Ok(AttemptOutcome::failure(failure_from_exit_code(status.code())));
        }

        // The tool shipped with the build is only there once the update
        // tool has staged it.
        match self.query_version(&request.build.artifact_path).await {
            Ok(installed) => Ok(AttemptOutcome::success(installed.version)),
            Err(e) => {
                warn!("Update succeeded but version query failed: {}", e);
                Ok(AttemptOutcome::success_without_version())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dutflash_core::ImageKind;

    #[test]
    fn test_expand_placeholders() {
        let placeholders = Placeholders {
            build: Some("120"),
            branch: Some("main"),
            destination: Some(Path::new("/var/dl")),
            ..Default::default()
        };
        let argv = placeholders
            .expand(&[
                "flash".to_string(),
                "--target={branch}/{build}".to_string(),
                "{destination}".to_string(),
                "{serial}".to_string(),
            ])
            .unwrap();

        assert_eq!(argv, vec!["flash", "--target=main/120", "/var/dl", "{serial}"]);
    }

    #[test]
    fn test_expand_empty_template() {
        assert!(Placeholders::default().expand(&[]).is_err());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(failure_from_exit_code(Some(3)), FailureReason::DeviceUnavailable);
        assert_eq!(failure_from_exit_code(Some(124)), FailureReason::Timeout);
        assert_eq!(
            failure_from_exit_code(Some(17)),
            FailureReason::Other("exit status 17".into())
        );
    }

    #[test]
    fn test_parse_version_line() {
        let installed = parse_version_line(b"\n  development 120\nextra").unwrap();
        assert_eq!(installed.kind, ImageKind::Development);
        assert_eq!(installed.version, "120");

        assert!(parse_version_line(b"").is_err());
        assert!(parse_version_line(b"120").is_err());
        assert!(parse_version_line(b"nightly 120").is_err());
    }

    #[test]
    fn test_commands_from_toml_defaults() {
        let commands: DeviceCommands =
            serde_json::from_str(r#"{"update_command": ["flasher", "{build}"]}"#).unwrap();
        assert_eq!(commands.version_command, vec!["{tool}", "version"]);
        assert_eq!(commands.update_command, vec!["flasher", "{build}"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_update_through_shell_tools() {
        use dutflash_core::{DeviceRecord, ResolvedBuild};

        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("devtool");
        std::fs::write(&tool, "").unwrap();

        let device = CommandDevice::new(DeviceCommands {
            version_command: vec!["echo".into(), "factory 121".into()],
            update_command: vec!["sh".into(), "-c".into(), "echo flashing {build}".into()],
        });
        let build = ResolvedBuild {
            build_number: "121".into(),
            artifact_path: tool.clone(),
        };
        let record = DeviceRecord::new("dut-1");
        let request = AttemptRequest {
            build: &build,
            branch: "main",
            image_kind: ImageKind::Factory,
            destination: dir.path(),
            device: &record,
        };

        let mut log = Vec::new();
        let outcome = device.update(request, &mut log).await.unwrap();

        assert_eq!(outcome, AttemptOutcome::success("121"));
        assert_eq!(String::from_utf8(log).unwrap(), "flashing 121\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_update_maps_exit_code() {
        use dutflash_core::{DeviceRecord, ResolvedBuild};

        let dir = tempfile::tempdir().unwrap();
        let device = CommandDevice::new(DeviceCommands {
            version_command: vec!["echo".into(), "development 1".into()],
            update_command: vec!["sh".into(), "-c".into(), "exit 4".into()],
        });
        let build = ResolvedBuild {
            build_number: "1".into(),
            artifact_path: dir.path().join("devtool"),
        };
        let record = DeviceRecord::new("dut-1");
        let request = AttemptRequest {
            build: &build,
            branch: "main",
            image_kind: ImageKind::Development,
            destination: dir.path(),
            device: &record,
        };

        let mut log = Vec::new();
        let outcome = device.update(request, &mut log).await.unwrap();
        assert_eq!(outcome, AttemptOutcome::failure(FailureReason::Transfer));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_update_output_reaches_log_before_exit() {
        use dutflash_core::{DeviceRecord, ResolvedBuild};
        use std::time::Duration;

        let dir = tempfile::tempdir().unwrap();
        let device = CommandDevice::new(DeviceCommands {
            version_command: vec!["echo".into(), "development 1".into()],
            update_command: vec![
                "sh".into(),
                "-c".into(),
                "echo staging {build}; echo slow link >&2; sleep 5".into(),
            ],
        });
        let build = ResolvedBuild {
            build_number: "9".into(),
            artifact_path: dir.path().join("devtool"),
        };
        let record = DeviceRecord::new("dut-1");
        let request = AttemptRequest {
            build: &build,
            branch: "main",
            image_kind: ImageKind::Development,
            destination: dir.path(),
            device: &record,
        };

        let mut log = Vec::new();
        let result =
            tokio::time::timeout(Duration::from_secs(1), device.update(request, &mut log)).await;
        assert!(result.is_err());

        let log = String::from_utf8(log).unwrap();
        assert!(log.contains("staging 9\n"));
        assert!(log.contains("slow link\n"));
    }
}
