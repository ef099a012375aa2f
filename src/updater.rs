//! The per-app update pipeline and the batch driver around it.
//!
//! An app goes fetch → decide → match → resolve → (trash, download)* →
//! post-download hooks → commit, and ends up Installed, Skipped or Failed.
//! Apps and assets are processed strictly one after another.

use crate::download::download_file;
use crate::error::UpdateError;
use crate::github::GitHubClient;
use crate::hooks::{
    run_find_assets_hook, run_post_download_hook, FindAssetsContext, HookError, HookSettings,
    PostDownloadContext,
};
use crate::matcher::{match_assets, should_check};
use crate::paths::{asset_destination, previous_install_path, resolve_install_path};
use crate::trash;
use crate::types::*;
use console::style;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::Instrument;

#[derive(Debug)]
pub enum AppOutcome {
    Installed {
        tag: String,
        files: Vec<PathBuf>,
        asset_failures: Vec<(String, UpdateError)>,
        hook_failures: Vec<(PathBuf, HookError)>,
    },
    Skipped {
        tag: String,
    },
    /// `--dry-run`: what would have been installed.
    Planned {
        tag: String,
        files: Vec<PathBuf>,
    },
    Failed(UpdateError),
}

impl AppOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, AppOutcome::Failed(_))
    }
}

impl fmt::Display for AppOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppOutcome::Installed {
                tag,
                files,
                asset_failures,
                hook_failures,
            } => {
                write!(f, "installed {} ({} file(s))", tag, files.len())?;
                if !asset_failures.is_empty() {
                    write!(f, ", {} asset(s) failed", asset_failures.len())?;
                }
                if !hook_failures.is_empty() {
                    write!(f, ", {} hook(s) failed", hook_failures.len())?;
                }
                Ok(())
            }
            AppOutcome::Skipped { tag } => write!(f, "up to date ({})", tag),
            AppOutcome::Planned { tag, files } => {
                write!(f, "would install {} ({} file(s))", tag, files.len())
            }
            AppOutcome::Failed(e) => write!(f, "failed [{}]: {}", e.kind(), e),
        }
    }
}

#[derive(Debug)]
pub struct AppReport {
    pub name: String,
    pub repo: String,
    pub outcome: AppOutcome,
}

/// Which apps a run touches. Empty filters select everything.
#[derive(Debug, Clone, Default)]
pub struct AppFilter {
    pub names: Vec<String>,
    pub repos: Vec<String>,
}

impl AppFilter {
    pub fn selects(&self, entry: &AppEntry) -> bool {
        if self.names.is_empty() && self.repos.is_empty() {
            return true;
        }
        self.names.contains(&entry.name)
            || entry
                .repo
                .as_ref()
                .is_some_and(|repo| self.repos.contains(repo))
    }
}

pub struct Updater<'a> {
    github: &'a GitHubClient,
    config_dir: PathBuf,
    trash: TrashConfig,
    hooks: HookSettings,
    dry_run: bool,
}

impl<'a> Updater<'a> {
    pub fn new(github: &'a GitHubClient, config_dir: impl Into<PathBuf>, trash: TrashConfig) -> Self {
        Self {
            github,
            config_dir: config_dir.into(),
            trash,
            hooks: HookSettings::default(),
            dry_run: false,
        }
    }

    pub fn with_hook_settings(mut self, hooks: HookSettings) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Run every selected app in order. One app's failure never stops the
    /// others; the entries' tags are updated in place on success.
    pub async fn run(&self, apps: &mut [AppEntry], filter: &AppFilter) -> Vec<AppReport> {
        let mut reports = Vec::new();
        for entry in apps.iter_mut().filter(|e| filter.selects(e)) {
            let outcome = self.update_app(entry).await;
            reports.push(AppReport {
                name: entry.name.clone(),
                repo: entry.repo.clone().unwrap_or_default(),
                outcome,
            });
        }
        reports
    }

    pub async fn update_app(&self, entry: &mut AppEntry) -> AppOutcome {
        let span = tracing::info_span!("app", name = %entry.name);
        async {
            let app = match AppSpec::try_from(&*entry) {
                Ok(app) => app,
                Err(e) => {
                    tracing::error!("App '{}' is misconfigured: {}", entry.name, e);
                    return AppOutcome::Failed(e);
                }
            };

            match self.process(&app).await {
                Ok(outcome) => {
                    if let AppOutcome::Installed { tag, .. } = &outcome {
                        entry.tag = tag.clone();
                    }
                    outcome
                }
                Err(e) => {
                    tracing::error!("Skipping {} due to error: {}", app.name, e);
                    AppOutcome::Failed(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn process(&self, app: &AppSpec) -> Result<AppOutcome, UpdateError> {
        tracing::info!("Checking {}...", app.name);
        tracing::info!(
            "Current tag: {}",
            if app.tag.is_empty() { "(none)" } else { app.tag.as_str() }
        );
        tracing::info!("Repository: {}", app.repo);
        tracing::debug!("Check pre-releases: {}", app.use_prerelease);

        let release = self
            .github
            .get_latest_release(&app.repo, app.use_prerelease)
            .await?;
        let latest_tag = release.tag_name.clone();
        tracing::info!("Latest tag: {}", latest_tag);

        let is_update = should_check(&app.tag, &latest_tag);
        let install_base =
            resolve_install_path(&app.install_path, app.install_path_match, &latest_tag, &self.config_dir);

        if is_update {
            tracing::info!("New version available!");
        } else if !app.is_directory_mode() {
            if install_base.exists() {
                tracing::info!("Already on latest version and file exists, no action needed");
                return Ok(AppOutcome::Skipped { tag: latest_tag });
            }
            tracing::warn!("File not found at {}, will re-download", install_base.display());
        }

        let (mut planned, mut asset_failures) = self.plan(app, &release, &install_base).await?;
        if !is_update {
            planned.retain(|(asset, dest)| {
                let missing = !dest.exists();
                if missing && app.is_directory_mode() {
                    tracing::warn!("{} is missing, will re-download", asset.name);
                }
                missing
            });
            if planned.is_empty() {
                tracing::info!("Already on latest version and all files exist, no action needed");
                return Ok(AppOutcome::Skipped { tag: latest_tag });
            }
        }

        if self.dry_run {
            for (asset, dest) in &planned {
                tracing::info!("Would install {} to {}", asset.name, dest.display());
            }
            return Ok(AppOutcome::Planned {
                tag: latest_tag,
                files: planned.into_iter().map(|(_, dest)| dest).collect(),
            });
        }

        let mut installed: Vec<(AssetInfo, PathBuf)> = Vec::new();
        for (asset, dest) in planned {
            match self.install_asset(app, &asset, &dest, &latest_tag).await {
                Ok(()) => installed.push((asset, dest)),
                Err(e) => {
                    tracing::error!("Failed to install {}: {}", asset.name, e);
                    asset_failures.push((asset.name, e));
                }
            }
        }

        if installed.is_empty() {
            let (_, first) = asset_failures
                .into_iter()
                .next()
                .ok_or_else(|| UpdateError::NoMatch(app.asset_match.to_string()))?;
            return Err(first);
        }

        let mut hook_failures = Vec::new();
        if let Some(hook) = &app.post_download_hook {
            for (asset, dest) in &installed {
                let ctx = PostDownloadContext {
                    app_name: &app.name,
                    repo: &app.repo,
                    tag: &latest_tag,
                    asset_name: &asset.name,
                    file_path: dest,
                    config_dir: &self.config_dir,
                };
                if let Err(e) = run_post_download_hook(hook, &ctx, &self.hooks).await {
                    tracing::error!("Post-download hook failed for {}: {}", dest.display(), e);
                    hook_failures.push((dest.clone(), e));
                }
            }
        }

        if is_update && !app.tag.is_empty() {
            tracing::info!("{} updated from {} to {}", app.name, app.tag, latest_tag);
        } else {
            tracing::info!("{} downloaded (version {})", app.name, latest_tag);
        }

        Ok(AppOutcome::Installed {
            tag: latest_tag,
            files: installed.into_iter().map(|(_, dest)| dest).collect(),
            asset_failures,
            hook_failures,
        })
    }

    /// Select the assets to install and pair each with its destination.
    /// Assets whose names cannot be used as a file name are returned
    /// separately as failures.
    async fn plan(
        &self,
        app: &AppSpec,
        release: &GitHubRelease,
        install_base: &Path,
    ) -> Result<(MatchResult, Vec<(String, UpdateError)>), UpdateError> {
        let mut names = release.asset_names();

        if let Some(hook) = &app.find_assets_hook {
            let install_dir = if app.is_directory_mode() {
                install_base
            } else {
                install_base.parent().unwrap_or(install_base)
            };
            let ctx = FindAssetsContext {
                app_name: &app.name,
                repo: &app.repo,
                current_tag: &app.tag,
                latest_tag: &release.tag_name,
                install_dir,
                config_dir: &self.config_dir,
            };
            let selected = run_find_assets_hook(hook, &names, &ctx, &self.hooks).await?;
            names = selected
                .into_iter()
                .filter(|name| {
                    let known = release.assets.iter().any(|a| &a.name == name);
                    if !known {
                        tracing::warn!("Find-assets hook returned unknown asset '{}'", name);
                    }
                    known
                })
                .collect();
        }

        let matched = match_assets(&names, &app.asset_match, &release.tag_name)?;

        let mut result = MatchResult::new();
        let mut rejected = Vec::new();
        for name in matched {
            let asset = release
                .assets
                .iter()
                .find(|a| a.name == name)
                .map(AssetInfo::from)
                .ok_or_else(|| UpdateError::NoMatch(name.clone()))?;
            let dest = if app.is_directory_mode() {
                match asset_destination(install_base, &name) {
                    Ok(dest) => dest,
                    Err(e) => {
                        tracing::warn!("Skipping asset {}: {}", name, e);
                        rejected.push((name, e));
                        continue;
                    }
                }
            } else {
                install_base.to_path_buf()
            };
            if let Some((other, _)) = result.iter().find(|(_, p)| *p == dest) {
                return Err(UpdateError::Config(format!(
                    "assets '{}' and '{}' both resolve to {}",
                    other.name,
                    name,
                    dest.display()
                )));
            }
            tracing::info!("Matched asset: {}", name);
            result.push((asset, dest));
        }
        Ok((result, rejected))
    }

    /// Trash whatever currently sits at the destination, then download.
    async fn install_asset(
        &self,
        app: &AppSpec,
        asset: &AssetInfo,
        dest: &Path,
        latest_tag: &str,
    ) -> Result<(), UpdateError> {
        if asset.download_url.is_empty() {
            return Err(UpdateError::Download {
                url: String::new(),
                reason: format!("asset '{}' has no download URL", asset.name),
            });
        }

        trash::archive(dest, &self.trash, &app.tag)?;
        if let Some(previous) = previous_install_path(
            &app.install_path,
            app.install_path_match,
            &app.tag,
            latest_tag,
            &self.config_dir,
        ) {
            trash::archive(&previous, &self.trash, &app.tag)?;
        }

        download_file(self.github.http(), &asset.download_url, dest).await?;
        Ok(())
    }
}

/// Print the end-of-run table to stderr.
pub fn print_summary(reports: &[AppReport]) {
    if reports.is_empty() {
        return;
    }
    eprintln!("\n--- Update Summary ---");
    for report in reports {
        let outcome = match &report.outcome {
            AppOutcome::Failed(_) => style(&report.outcome).for_stderr().red(),
            AppOutcome::Installed { .. } => style(&report.outcome).for_stderr().green(),
            _ => style(&report.outcome).for_stderr().dim(),
        };
        eprintln!("  {} ({}): {}", report.name, report.repo, outcome);
    }
    let failed = reports.iter().filter(|r| r.outcome.is_failed()).count();
    eprintln!("{} app(s) checked, {} failed", reports.len(), failed);
    eprintln!("----------------------\n");
}
