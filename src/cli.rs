//! Command-line interface definitions for the Carnival crawler.
//!
//! All options can be given as flags; remote store credentials can also come
//! from the environment or a `.env` file.

use clap::Parser;

/// Command-line arguments for one crawl run.
///
/// # Examples
///
/// ```sh
/// # Crawl El Heraldo with default settings
/// carnaval_scrapers elheraldo
///
/// # Custom settings, fresh fetches, explicit run file
/// carnaval_scrapers carnaval_oficial -c config.yaml --no-cache -o /tmp/oficial.jsonl
///
/// # Show registered sources
/// carnaval_scrapers --list
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Source to crawl (see --list)
    #[arg(required_unless_present = "list")]
    pub source: Option<String>,

    /// List registered sources and exit
    #[arg(long)]
    pub list: bool,

    /// Optional path to config.yaml file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Directory for run files; overrides `output_dir` in the config
    #[arg(short = 'd', long)]
    pub output_dir: Option<String>,

    /// Exact path of this run's JSON-lines file
    #[arg(short, long)]
    pub output: Option<String>,

    /// Bypass the HTTP response cache for this run
    #[arg(long)]
    pub no_cache: bool,

    /// Supabase project URL; enables the remote store together with the key
    #[arg(long, env = "SUPABASE_URL", hide_env_values = true)]
    pub supabase_url: Option<String>,

    /// Supabase API key
    #[arg(long, env = "SUPABASE_KEY", hide_env_values = true)]
    pub supabase_key: Option<String>,
}
