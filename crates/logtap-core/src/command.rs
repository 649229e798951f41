//! Log source command specifications.
//!
//! The daemon invokes the log source in three shapes:
//! - probe: `logcat [-b <buf>] -d -f /dev/null` (does the buffer work?)
//! - tail:  `logcat (-b <buf>)* -v threadtime -s am_proc_start <tag> [*:F]`
//! - clear: `logcat (-b <buf>)* -c`
//!
//! Tail and clear are built once after probing and never change afterwards.

use std::ffi::OsString;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::config::DaemonConfig;
use crate::error::{CoreError, CoreResult};

/// Log tag carrying process-start events.
pub const PROC_START_TAG: &str = "am_proc_start";

/// Program plus arguments for one log source invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: PathBuf,
    args: Vec<OsString>,
}

impl CommandSpec {
    /// Creates a specification with no arguments.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Creates a specification from a full argument vector (`argv[0]` is the program).
    pub fn from_argv<I, S>(argv: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let mut iter = argv.into_iter().map(Into::into);
        let program = iter.next().ok_or(CoreError::EmptyCommand)?;
        Ok(Self {
            program: PathBuf::from(program),
            args: iter.collect(),
        })
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The program path.
    pub fn program(&self) -> &PathBuf {
        &self.program
    }

    /// The arguments (without the program).
    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }

    /// Full argument vector, program first.
    pub fn argv(&self) -> Vec<OsString> {
        std::iter::once(self.program.clone().into_os_string())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Builds an async command with stdin and stderr detached.
    ///
    /// Stdout is left to the caller (piped for tailing, null for probes).
    pub fn to_command(&self) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stderr(Stdio::null());
        command
    }

    /// Builds a blocking command with all stdio detached.
    pub fn to_std_command(&self) -> std::process::Command {
        let mut command = std::process::Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        command
    }
}

/// Builds the probe invocation.
///
/// With a buffer: tests whether that buffer can be dumped.
/// Without: tests whether the log source works at all.
pub fn probe_command(logcat_path: &Path, buffer: Option<&str>) -> CommandSpec {
    let spec = CommandSpec::new(logcat_path);
    let spec = match buffer {
        Some(buffer) => spec.args(["-b", buffer]),
        None => spec,
    };
    spec.args(["-d", "-f", DEV_NULL])
}

/// Resets `/dev/null` to mode `0666` if a probe changed it.
///
/// Some log source builds chmod their `-f` target. Returns `true` if the
/// mode had to be restored.
pub fn restore_dev_null_mode() -> CoreResult<bool> {
    restore_mode(Path::new(DEV_NULL), 0o666)
}

const DEV_NULL: &str = "/dev/null";

fn restore_mode(path: &Path, mode: u32) -> CoreResult<bool> {
    let meta = fs::metadata(path).map_err(|e| CoreError::io(path, e))?;
    if meta.permissions().mode() & 0o777 == mode {
        return Ok(false);
    }
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|e| CoreError::io(path, e))?;
    Ok(true)
}

/// The frozen tail and clear invocations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSourceCommands {
    /// Streams the log continuously.
    pub tail: CommandSpec,
    /// Purges the log source's ring buffers.
    pub clear: CommandSpec,
}

impl LogSourceCommands {
    /// Builds both invocations from the buffers that passed probing.
    pub fn build<S: AsRef<str>>(config: &DaemonConfig, supported_buffers: &[S]) -> Self {
        let mut base = CommandSpec::new(&config.logcat_path);
        for buffer in supported_buffers {
            base = base.args(["-b", buffer.as_ref()]);
        }

        let mut tail = base
            .clone()
            .args(["-v", "threadtime", "-s", PROC_START_TAG])
            .arg(config.tag.as_str());
        if config.verbose_source {
            tail = tail.arg("*:F");
        }

        let clear = base.arg("-c");

        Self { tail, clear }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DaemonConfig {
        DaemonConfig {
            logcat_path: PathBuf::from("/system/bin/logcat"),
            tag: "Magisk".to_string(),
            verbose_source: false,
            ..Default::default()
        }
    }

    fn strings(spec: &CommandSpec) -> Vec<String> {
        spec.argv()
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_probe_command_with_buffer() {
        let spec = probe_command(&config().logcat_path, Some("events"));
        assert_eq!(
            strings(&spec),
            ["/system/bin/logcat", "-b", "events", "-d", "-f", "/dev/null"]
        );
    }

    #[test]
    fn test_probe_command_without_buffer() {
        let spec = probe_command(&config().logcat_path, None);
        assert_eq!(strings(&spec), ["/system/bin/logcat", "-d", "-f", "/dev/null"]);
    }

    #[test]
    fn test_build_includes_only_supported_buffers() {
        let commands = LogSourceCommands::build(&config(), &["main", "crash"]);
        assert_eq!(
            strings(&commands.tail),
            [
                "/system/bin/logcat",
                "-b",
                "main",
                "-b",
                "crash",
                "-v",
                "threadtime",
                "-s",
                "am_proc_start",
                "Magisk"
            ]
        );
        assert_eq!(
            strings(&commands.clear),
            ["/system/bin/logcat", "-b", "main", "-b", "crash", "-c"]
        );
    }

    #[test]
    fn test_build_with_no_buffers() {
        let commands = LogSourceCommands::build::<&str>(&config(), &[]);
        assert_eq!(strings(&commands.clear), ["/system/bin/logcat", "-c"]);
    }

    #[test]
    fn test_verbose_source_appends_fatal_filter() {
        let config = DaemonConfig {
            verbose_source: true,
            ..config()
        };
        let commands = LogSourceCommands::build(&config, &["main"]);
        assert_eq!(
            strings(&commands.tail).last().map(String::as_str),
            Some("*:F")
        );
        assert_eq!(strings(&commands.clear).last().map(String::as_str), Some("-c"));
    }

    #[test]
    fn test_restore_mode_fixes_changed_permissions() {
        let dir = std::env::temp_dir().join(format!("logtap-mode-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let file = dir.join("target");
        fs::write(&file, b"").unwrap();
        fs::set_permissions(&file, fs::Permissions::from_mode(0o600)).unwrap();

        assert!(restore_mode(&file, 0o644).unwrap());
        assert!(!restore_mode(&file, 0o644).unwrap());
        let mode = fs::metadata(&file).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_restore_mode_missing_path() {
        let result = restore_mode(Path::new("/nonexistent/logtap/target"), 0o644);
        assert!(matches!(result, Err(CoreError::Io { .. })));
    }

    #[test]
    fn test_from_argv() {
        let spec = CommandSpec::from_argv(["sh", "-c", "true"]).expect("non-empty argv");
        assert_eq!(spec.program(), &PathBuf::from("sh"));
        assert_eq!(spec.arguments().len(), 2);

        let empty = CommandSpec::from_argv(Vec::<String>::new());
        assert!(matches!(empty, Err(CoreError::EmptyCommand)));
    }
}
