mod cli;
mod config;
mod download;
mod error;
mod github;
mod hooks;
mod matcher;
mod paths;
mod trash;
mod types;
mod updater;


use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;
use config::{get_config_source, load_config, save_config, trash_config};
use github::{GitHubClient, DEFAULT_API_BASE_URL};
use hooks::HookSettings;
use std::env;
use std::process::ExitCode;
use updater::{print_summary, AppFilter, Updater};

const TOKEN_ENV_VAR: &str = "GITHUB_TOKEN";
const API_URL_ENV_VAR: &str = "GITHUB_API_BASE_URL";

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    setup_logging(&cli)?;

    let source = get_config_source(cli.config.as_deref())?;
    let mut loaded = load_config(&source)?;

    let token = resolve_token(&cli, loaded.config.github_token.as_deref())?;
    let api_url = cli
        .api_url
        .clone()
        .or_else(|| env::var(API_URL_ENV_VAR).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
    if api_url != DEFAULT_API_BASE_URL {
        tracing::info!("Using GitHub API at {}", api_url);
    }

    let github = GitHubClient::new(Some(&api_url), token);
    if !github.is_authenticated() {
        tracing::info!("No GitHub token configured, API requests are unauthenticated");
    }

    let trash = trash_config(
        loaded.config.trash_config.as_ref(),
        &loaded.config_dir,
        !cli.dry_run,
    )?;
    let hook_settings = HookSettings {
        console_on_stderr: source.is_stdin(),
        ..HookSettings::default()
    };
    let updater = Updater::new(&github, loaded.config_dir.clone(), trash)
        .with_hook_settings(hook_settings)
        .with_dry_run(cli.dry_run);

    let filter = AppFilter {
        names: cli.apps.clone(),
        repos: cli.repos.clone(),
    };
    if loaded.config.apps.is_empty() {
        tracing::warn!("No apps configured");
    }
    let reports = updater.run(&mut loaded.config.apps, &filter).await;
    if reports.is_empty() && !loaded.config.apps.is_empty() {
        tracing::warn!("No configured app matches the --apps/--repos selection");
    }

    print_summary(&reports);

    if cli.dry_run {
        tracing::info!("Dry run, config left untouched");
    } else {
        save_config(&loaded).context("Failed to save updated config")?;
    }

    let failed = reports.iter().filter(|r| r.outcome.is_failed()).count();
    if cli.strict && failed > 0 {
        tracing::error!("{} app(s) failed", failed);
        return Ok(ExitCode::from(2));
    }
    Ok(ExitCode::SUCCESS)
}

fn setup_logging(cli: &Cli) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level()));

    // stdout is reserved for the config in `--config -` mode.
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();

    Ok(())
}

/// Token priority: `--token`/`--token-prompt`, then `$GITHUB_TOKEN`, then the
/// config file.
fn resolve_token(cli: &Cli, from_config: Option<&str>) -> Result<Option<String>> {
    if let Some(token) = &cli.token {
        return Ok(Some(token.clone()));
    }
    if cli.token_prompt {
        let term = console::Term::stderr();
        term.write_str("GitHub token: ")?;
        let token = term
            .read_secure_line()
            .context("Could not read token from terminal")?;
        let token = token.trim().to_string();
        if token.is_empty() {
            tracing::warn!("Empty token entered, continuing without authentication");
            return Ok(None);
        }
        return Ok(Some(token));
    }
    if let Some(token) = env::var(TOKEN_ENV_VAR).ok().filter(|t| !t.is_empty()) {
        return Ok(Some(token));
    }
    Ok(from_config.filter(|t| !t.is_empty()).map(str::to_string))
}
