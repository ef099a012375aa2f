//! External hook programs.
//!
//! Both extension points go through [`run_hook`]: a program, its arguments,
//! an environment and an optional stdin payload go in; an exit status and
//! (optionally) the captured stdout come out.

use crate::types::HookSpec;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

pub const HOOK_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Error)]
pub enum HookError {
    #[error("failed to start hook '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("hook '{program}' timed out after {}s and was killed", .timeout.as_secs_f32())]
    Timeout { program: String, timeout: Duration },

    #[error("hook '{program}' failed with {status}")]
    Failed { program: String, status: ExitStatus },

    #[error("hook '{program}' returned malformed output: {reason}")]
    MalformedOutput { program: String, reason: String },

    #[error("I/O error while talking to hook '{program}': {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Where a hook's standard output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStdout {
    Inherit,
    /// Redirected to our stderr (stdout carries the config in stdin mode).
    Stderr,
    Capture,
}

#[derive(Debug)]
pub struct HookCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(&'static str, String)>,
    pub stdin: Option<Vec<u8>>,
    pub stdout: HookStdout,
    pub working_dir: Option<PathBuf>,
    pub timeout: Duration,
}

#[derive(Debug)]
pub struct HookOutput {
    pub status: ExitStatus,
    pub stdout: Option<String>,
}

/// Process-wide knobs shared by every hook invocation.
#[derive(Debug, Clone)]
pub struct HookSettings {
    pub timeout: Duration,
    pub working_dir: Option<PathBuf>,
    pub console_on_stderr: bool,
}

impl Default for HookSettings {
    fn default() -> Self {
        Self {
            timeout: HOOK_TIMEOUT,
            working_dir: executable_dir(),
            console_on_stderr: false,
        }
    }
}

impl HookSettings {
    fn console_stdout(&self) -> HookStdout {
        if self.console_on_stderr {
            HookStdout::Stderr
        } else {
            HookStdout::Inherit
        }
    }

    fn forward_line(&self, line: &str) {
        if self.console_on_stderr {
            eprintln!("{}", line);
        } else {
            println!("{}", line);
        }
    }
}

/// Directory of the running executable; hooks run from here so they can
/// reach helper scripts shipped next to the updater.
pub fn executable_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

/// Resolve a configured hook program.
///
/// A relative path that exists under the config directory is used from
/// there; anything else is handed to the OS untouched (PATH lookup).
pub fn resolve_hook_program(program: &str, config_dir: &Path) -> PathBuf {
    let path = Path::new(program);
    if path.is_relative() {
        let candidate = config_dir.join(path);
        if candidate.exists() {
            return candidate;
        }
    }
    path.to_path_buf()
}

pub async fn run_hook(cmd: &HookCommand) -> Result<HookOutput, HookError> {
    let program = cmd.program.display().to_string();
    let io_err = |source| HookError::Io {
        program: program.clone(),
        source,
    };

    let mut command = Command::new(&cmd.program);
    command
        .args(&cmd.args)
        .envs(cmd.env.iter().map(|(k, v)| (*k, v.as_str())))
        .stdin(if cmd.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stderr(Stdio::inherit())
        .kill_on_drop(true);
    match cmd.stdout {
        HookStdout::Inherit => command.stdout(Stdio::inherit()),
        HookStdout::Stderr => command.stdout(Stdio::from(io::stderr())),
        HookStdout::Capture => command.stdout(Stdio::piped()),
    };
    if let Some(dir) = &cmd.working_dir {
        command.current_dir(dir);
    }

    tracing::debug!("Executing hook: {} {:?}", program, cmd.args);
    let mut child = command.spawn().map_err(|source| HookError::Spawn {
        program: program.clone(),
        source,
    })?;

    if let (Some(payload), Some(mut stdin)) = (cmd.stdin.clone(), child.stdin.take()) {
        tokio::spawn(async move {
            // A hook that ignores its input may exit before reading it.
            if let Err(e) = stdin.write_all(&payload).await {
                tracing::debug!("Hook did not consume stdin: {}", e);
            }
        });
    }

    let mut reader = child.stdout.take().map(|mut out| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            out.read_to_end(&mut buf).await.map(|_| buf)
        })
    });

    // One deadline covers both the exit and the end of stdout: a background
    // child holding the pipe open must not stall the run.
    let finished = tokio::time::timeout(cmd.timeout, async {
        let status = child.wait().await?;
        let bytes = match reader.as_mut() {
            Some(task) => Some(
                task.await
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))??,
            ),
            None => None,
        };
        Ok::<_, io::Error>((status, bytes))
    })
    .await;

    let (status, bytes) = match finished {
        Ok(result) => result.map_err(io_err)?,
        Err(_) => {
            if let Some(task) = &reader {
                task.abort();
            }
            if let Err(e) = child.kill().await {
                tracing::warn!("Could not kill hook {}: {}", program, e);
            }
            return Err(HookError::Timeout {
                program,
                timeout: cmd.timeout,
            });
        }
    };
    let stdout = bytes.map(|b| String::from_utf8_lossy(&b).into_owned());

    Ok(HookOutput { status, stdout })
}

pub struct FindAssetsContext<'a> {
    pub app_name: &'a str,
    pub repo: &'a str,
    pub current_tag: &'a str,
    pub latest_tag: &'a str,
    pub install_dir: &'a Path,
    pub config_dir: &'a Path,
}

/// Let an external program filter and reorder the release's asset names.
///
/// The names go in on stdin as a JSON array. Every stdout line before the
/// last non-empty one is passed through to the console; the last one must be
/// a JSON array of strings.
pub async fn run_find_assets_hook(
    hook: &HookSpec,
    asset_names: &[String],
    ctx: &FindAssetsContext<'_>,
    settings: &HookSettings,
) -> Result<Vec<String>, HookError> {
    let program = resolve_hook_program(&hook.program, ctx.config_dir);
    tracing::info!("Running find-assets hook: {}", program.display());

    let payload = serde_json::to_vec(asset_names).map_err(|e| HookError::Io {
        program: program.display().to_string(),
        source: e.into(),
    })?;

    let cmd = HookCommand {
        program: program.clone(),
        args: hook.args.clone(),
        env: vec![
            ("UPDATER_APP_NAME", ctx.app_name.to_string()),
            ("UPDATER_REPO", ctx.repo.to_string()),
            ("UPDATER_CURRENT_TAG", ctx.current_tag.to_string()),
            ("UPDATER_LATEST_TAG", ctx.latest_tag.to_string()),
            ("UPDATER_INSTALL_DIR", ctx.install_dir.display().to_string()),
            ("UPDATER_CONFIG_DIR", ctx.config_dir.display().to_string()),
        ],
        stdin: Some(payload),
        stdout: HookStdout::Capture,
        working_dir: settings.working_dir.clone(),
        timeout: settings.timeout,
    };

    let output = run_hook(&cmd).await?;
    let stdout = output.stdout.unwrap_or_default();
    let program = program.display().to_string();

    let lines: Vec<&str> = stdout.lines().collect();
    let last = lines.iter().rposition(|l| !l.trim().is_empty());

    for line in &lines[..last.unwrap_or(lines.len())] {
        settings.forward_line(line);
    }

    if !output.status.success() {
        return Err(HookError::Failed {
            program,
            status: output.status,
        });
    }

    let last = last.ok_or_else(|| HookError::MalformedOutput {
        program: program.clone(),
        reason: "no output".to_string(),
    })?;
    let names: Vec<String> =
        serde_json::from_str(lines[last].trim()).map_err(|e| HookError::MalformedOutput {
            program: program.clone(),
            reason: format!("last line is not a JSON array of strings: {}", e),
        })?;

    tracing::info!("Find-assets hook selected {} asset(s)", names.len());
    Ok(names)
}

pub struct PostDownloadContext<'a> {
    pub app_name: &'a str,
    pub repo: &'a str,
    pub tag: &'a str,
    pub asset_name: &'a str,
    pub file_path: &'a Path,
    pub config_dir: &'a Path,
}

/// Run the post-download hook for one installed file.
pub async fn run_post_download_hook(
    hook: &HookSpec,
    ctx: &PostDownloadContext<'_>,
    settings: &HookSettings,
) -> Result<(), HookError> {
    let program = resolve_hook_program(&hook.program, ctx.config_dir);
    tracing::info!("Running post-download hook: {}", program.display());

    let file_dir = ctx
        .file_path
        .parent()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let file_name = ctx
        .file_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let cmd = HookCommand {
        program: program.clone(),
        args: hook.args.clone(),
        env: vec![
            ("UPDATER_APP_NAME", ctx.app_name.to_string()),
            ("UPDATER_REPO", ctx.repo.to_string()),
            ("UPDATER_TAG", ctx.tag.to_string()),
            ("UPDATER_ASSET_NAME", ctx.asset_name.to_string()),
            ("UPDATER_FILE_PATH", ctx.file_path.display().to_string()),
            ("UPDATER_FILE_DIR", file_dir),
            ("UPDATER_FILE_NAME", file_name),
            ("UPDATER_CONFIG_DIR", ctx.config_dir.display().to_string()),
        ],
        stdin: None,
        stdout: settings.console_stdout(),
        working_dir: settings.working_dir.clone(),
        timeout: settings.timeout,
    };

    let output = run_hook(&cmd).await?;
    if !output.status.success() {
        return Err(HookError::Failed {
            program: program.display().to_string(),
            status: output.status,
        });
    }
    tracing::info!("Post-download hook completed successfully");
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    // Scripts are run through `sh` so the test never executes a file it
    // has just written.
    fn sh_hook(script: &Path, extra: &[&str]) -> HookSpec {
        let mut args = vec![script.display().to_string()];
        args.extend(extra.iter().map(|s| s.to_string()));
        HookSpec {
            program: "sh".to_string(),
            args,
        }
    }

    fn settings(timeout: Duration) -> HookSettings {
        HookSettings {
            timeout,
            working_dir: None,
            console_on_stderr: true,
        }
    }

    fn find_ctx<'a>(dir: &'a Path) -> FindAssetsContext<'a> {
        FindAssetsContext {
            app_name: "App",
            repo: "o/r",
            current_tag: "v1",
            latest_tag: "v2",
            install_dir: dir,
            config_dir: dir,
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_find_assets_hook_filters_on_last_line() {
        let tmp = tempdir().unwrap();
        let script = tmp.path().join("find.sh");
        fs::write(
            &script,
            "input=$(cat)\necho \"got $input\"\necho \"latest $UPDATER_LATEST_TAG\"\necho '[\"b.tar.gz\", \"a.tar.gz\"]'\n",
        )
        .unwrap();

        let result = run_find_assets_hook(
            &sh_hook(&script, &[]),
            &names(&["a.tar.gz", "a.zip", "b.tar.gz"]),
            &find_ctx(tmp.path()),
            &settings(HOOK_TIMEOUT),
        )
        .await
        .unwrap();
        assert_eq!(result, vec!["b.tar.gz", "a.tar.gz"]);
    }

    #[tokio::test]
    async fn test_find_assets_hook_empty_list() {
        let tmp = tempdir().unwrap();
        let script = tmp.path().join("find.sh");
        fs::write(&script, "cat > /dev/null\necho '[]'\n").unwrap();

        let result = run_find_assets_hook(
            &sh_hook(&script, &[]),
            &names(&["a.zip"]),
            &find_ctx(tmp.path()),
            &settings(HOOK_TIMEOUT),
        )
        .await
        .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_find_assets_hook_malformed_output() {
        let tmp = tempdir().unwrap();
        let script = tmp.path().join("find.sh");
        fs::write(&script, "echo '[\"a.zip\"]'\necho 'done'\n").unwrap();

        let err = run_find_assets_hook(
            &sh_hook(&script, &[]),
            &names(&["a.zip"]),
            &find_ctx(tmp.path()),
            &settings(HOOK_TIMEOUT),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, HookError::MalformedOutput { .. }));

        fs::write(&script, "echo '{\"a\": 1}'\n").unwrap();
        let err = run_find_assets_hook(
            &sh_hook(&script, &[]),
            &names(&["a.zip"]),
            &find_ctx(tmp.path()),
            &settings(HOOK_TIMEOUT),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, HookError::MalformedOutput { .. }));
    }

    #[tokio::test]
    async fn test_find_assets_hook_nonzero_exit() {
        let tmp = tempdir().unwrap();
        let script = tmp.path().join("find.sh");
        fs::write(&script, "echo '[\"a.zip\"]'\nexit 3\n").unwrap();

        let err = run_find_assets_hook(
            &sh_hook(&script, &[]),
            &names(&["a.zip"]),
            &find_ctx(tmp.path()),
            &settings(HOOK_TIMEOUT),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, HookError::Failed { .. }));
    }

    #[tokio::test]
    async fn test_post_download_hook_environment() {
        let tmp = tempdir().unwrap();
        let script = tmp.path().join("post.sh");
        let report = tmp.path().join("report.txt");
        fs::write(
            &script,
            "env | grep '^UPDATER_' | sort > \"$1\"\necho \"arg=$2\" >> \"$1\"\n",
        )
        .unwrap();

        let file = tmp.path().join("apps").join("app.zip");
        let ctx = PostDownloadContext {
            app_name: "My App",
            repo: "o/r",
            tag: "v2.0",
            asset_name: "app-2.0.zip",
            file_path: &file,
            config_dir: tmp.path(),
        };
        let report_arg = report.display().to_string();
        run_post_download_hook(
            &sh_hook(&script, &[&report_arg, "--flag"]),
            &ctx,
            &settings(HOOK_TIMEOUT),
        )
        .await
        .unwrap();

        let content = fs::read_to_string(&report).unwrap();
        assert!(content.contains("UPDATER_APP_NAME=My App"));
        assert!(content.contains("UPDATER_REPO=o/r"));
        assert!(content.contains("UPDATER_TAG=v2.0"));
        assert!(content.contains("UPDATER_ASSET_NAME=app-2.0.zip"));
        assert!(content.contains(&format!("UPDATER_FILE_PATH={}", file.display())));
        assert!(content.contains(&format!(
            "UPDATER_FILE_DIR={}",
            tmp.path().join("apps").display()
        )));
        assert!(content.contains("UPDATER_FILE_NAME=app.zip"));
        assert!(content.contains(&format!("UPDATER_CONFIG_DIR={}", tmp.path().display())));
        assert!(content.contains("arg=--flag"));
    }

    #[tokio::test]
    async fn test_post_download_hook_runs_in_working_dir() {
        let tmp = tempdir().unwrap();
        let workdir = tmp.path().join("bin");
        fs::create_dir_all(&workdir).unwrap();
        let script = tmp.path().join("post.sh");
        fs::write(&script, "pwd > \"$1\"\n").unwrap();
        let report = tmp.path().join("pwd.txt");

        let file = tmp.path().join("app.zip");
        let ctx = PostDownloadContext {
            app_name: "a",
            repo: "o/r",
            tag: "v1",
            asset_name: "app.zip",
            file_path: &file,
            config_dir: tmp.path(),
        };
        let settings = HookSettings {
            working_dir: Some(workdir.clone()),
            ..settings(HOOK_TIMEOUT)
        };
        let report_arg = report.display().to_string();
        run_post_download_hook(&sh_hook(&script, &[&report_arg]), &ctx, &settings)
            .await
            .unwrap();

        let pwd = fs::read_to_string(&report).unwrap();
        assert_eq!(
            fs::canonicalize(pwd.trim()).unwrap(),
            fs::canonicalize(&workdir).unwrap()
        );
    }

    #[tokio::test]
    async fn test_post_download_hook_failure_and_timeout() {
        let tmp = tempdir().unwrap();
        let file = tmp.path().join("app.zip");
        let ctx = PostDownloadContext {
            app_name: "a",
            repo: "o/r",
            tag: "v1",
            asset_name: "app.zip",
            file_path: &file,
            config_dir: tmp.path(),
        };

        let failing = tmp.path().join("fail.sh");
        fs::write(&failing, "exit 1\n").unwrap();
        let err = run_post_download_hook(&sh_hook(&failing, &[]), &ctx, &settings(HOOK_TIMEOUT))
            .await
            .unwrap_err();
        assert!(matches!(err, HookError::Failed { .. }));

        let slow = tmp.path().join("slow.sh");
        fs::write(&slow, "sleep 10\n").unwrap();
        let started = std::time::Instant::now();
        let err = run_post_download_hook(
            &sh_hook(&slow, &[]),
            &ctx,
            &settings(Duration::from_millis(200)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, HookError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_background_child_cannot_outlive_timeout() {
        let tmp = tempdir().unwrap();
        let script = tmp.path().join("find.sh");
        fs::write(&script, "cat > /dev/null\nsleep 8 &\necho '[\"a.zip\"]'\n").unwrap();

        let started = std::time::Instant::now();
        let err = run_find_assets_hook(
            &sh_hook(&script, &[]),
            &names(&["a.zip"]),
            &find_ctx(tmp.path()),
            &settings(Duration::from_millis(500)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, HookError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_resolve_hook_program() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("hook.sh"), "").unwrap();
        assert_eq!(
            resolve_hook_program("hook.sh", tmp.path()),
            tmp.path().join("hook.sh")
        );
        assert_eq!(
            resolve_hook_program("not-here.sh", tmp.path()),
            PathBuf::from("not-here.sh")
        );
        assert_eq!(
            resolve_hook_program("/usr/bin/env", tmp.path()),
            PathBuf::from("/usr/bin/env")
        );
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let cmd = HookCommand {
            program: PathBuf::from("/definitely/not/a/hook"),
            args: vec![],
            env: vec![],
            stdin: None,
            stdout: HookStdout::Capture,
            working_dir: None,
            timeout: HOOK_TIMEOUT,
        };
        let err = run_hook(&cmd).await.unwrap_err();
        assert!(matches!(err, HookError::Spawn { .. }));
    }
}
