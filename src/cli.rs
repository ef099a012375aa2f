use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "gh-updater")]
#[command(about = "Keep locally installed files in sync with GitHub releases")]
#[command(version)]
#[command(after_help = "Examples:\n  gh-updater -c ~/apps/updater_config.json\n  gh-updater -A ripgrep -A fd --dry-run\n  cat updater_config.json | gh-updater -c - > updated.json")]
pub struct Cli {
    /// Config file path; '-' reads it from stdin and writes the result to stdout
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<String>,

    /// GitHub API base URL (defaults to $GITHUB_API_BASE_URL, then https://api.github.com)
    #[arg(short = 'm', long, visible_alias = "mock-api", value_name = "URL")]
    pub api_url: Option<String>,

    /// GitHub token (overrides $GITHUB_TOKEN and the config file)
    #[arg(short, long, conflicts_with = "token_prompt")]
    pub token: Option<String>,

    /// Prompt for a GitHub token without echoing it
    #[arg(short = 'T', long)]
    pub token_prompt: bool,

    /// Only update apps with these names
    #[arg(short = 'A', long, num_args = 1.., value_name = "NAME")]
    pub apps: Vec<String>,

    /// Only update apps tracking these repositories (owner/name)
    #[arg(short = 'R', long, num_args = 1.., value_name = "REPO")]
    pub repos: Vec<String>,

    /// Show what would be installed without touching any file
    #[arg(long)]
    pub dry_run: bool,

    /// Exit with status 2 when any app failed
    #[arg(long)]
    pub strict: bool,

    /// Increase verbosity (use multiple times for more detail)
    #[arg(short, long, action = clap::ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Reduce output to errors only
    #[arg(short, long)]
    pub quiet: bool,
}

impl Cli {
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            }
        }
    }
}
