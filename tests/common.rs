use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

// Each integration test binary uses a different subset of these helpers.
#[allow(dead_code)]
pub struct TestContext {
    pub temp_dir: TempDir,
    pub config_path: PathBuf,
    pub bin_path: PathBuf,
}

#[allow(dead_code)]
impl TestContext {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("updater_config.json");
        let bin_path = PathBuf::from(env!("CARGO_BIN_EXE_gh-updater"));

        Self {
            temp_dir,
            config_path,
            bin_path,
        }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.temp_dir.path().join(rel)
    }

    pub fn write_config(&self, config: &serde_json::Value) {
        let content = serde_json::to_string_pretty(config).expect("Failed to render config");
        fs::write(&self.config_path, content).expect("Failed to write config");
    }

    pub fn read_config(&self) -> serde_json::Value {
        let content = fs::read_to_string(&self.config_path).expect("Failed to read config");
        serde_json::from_str(&content).expect("Config is not valid JSON")
    }

    /// A command isolated from the caller's environment and pointed at
    /// `api_url` for GitHub.
    pub fn cmd(&self, api_url: &str) -> Command {
        let mut cmd = Command::new(&self.bin_path);
        cmd.current_dir(self.temp_dir.path());
        cmd.env_remove("GITHUB_TOKEN");
        cmd.env_remove("GH_UPDATER_CONFIG");
        cmd.env_remove("RUST_LOG");
        cmd.env("GITHUB_API_BASE_URL", api_url);
        cmd.env("HOME", self.temp_dir.path());
        cmd.env("XDG_CONFIG_HOME", self.temp_dir.path().join("xdg"));
        cmd
    }

    /// Run with `--config <config_path>` plus `args`.
    pub fn run(&self, api_url: &str, args: &[&str]) -> CommandOutput {
        self.cmd(api_url)
            .arg("--config")
            .arg(&self.config_path)
            .args(args)
            .output()
            .expect("Failed to run gh-updater")
            .into()
    }

    /// Run with `--config -`, feeding `stdin`.
    pub fn run_with_stdin(&self, api_url: &str, stdin: &str, args: &[&str]) -> CommandOutput {
        let mut child = self
            .cmd(api_url)
            .args(["--config", "-"])
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("Failed to run gh-updater");
        child
            .stdin
            .take()
            .expect("stdin is piped")
            .write_all(stdin.as_bytes())
            .expect("Failed to write stdin");
        child
            .wait_with_output()
            .expect("Failed to wait for gh-updater")
            .into()
    }
}

#[allow(dead_code)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: std::process::ExitStatus,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            status: output.status,
        }
    }
}

#[allow(dead_code)]
impl CommandOutput {
    pub fn assert_success(&self) -> &Self {
        if !self.status.success() {
            panic!(
                "Command failed with status {:?}\nstdout: {}\nstderr: {}",
                self.status.code(),
                self.stdout,
                self.stderr
            );
        }
        self
    }

    pub fn assert_code(&self, code: i32) -> &Self {
        assert_eq!(
            self.status.code(),
            Some(code),
            "Unexpected exit status\nstdout: {}\nstderr: {}",
            self.stdout,
            self.stderr
        );
        self
    }

    pub fn assert_stdout_contains(&self, text: &str) -> &Self {
        assert!(
            self.stdout.contains(text),
            "Stdout did not contain '{}'\nActual stdout: {}",
            text,
            self.stdout
        );
        self
    }

    pub fn assert_stderr_contains(&self, text: &str) -> &Self {
        assert!(
            self.stderr.contains(text),
            "Stderr did not contain '{}'\nActual stderr: {}",
            text,
            self.stderr
        );
        self
    }
}
