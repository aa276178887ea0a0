use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use desain_core::record::StatusView;

#[derive(Debug, Parser)]
#[command(name = "desain", about = "Submit and track design requests")]
pub struct Config {
    /// Supabase project URL
    #[arg(long, env = "DESAIN_SUPABASE_URL")]
    pub supabase_url: String,

    /// Public anon key of the project
    #[arg(long, env = "DESAIN_SUPABASE_ANON_KEY", hide_env_values = true)]
    pub anon_key: String,

    /// Storage bucket holding attachments
    #[arg(long, env = "DESAIN_BUCKET", default_value = desain_store::DEFAULT_BUCKET)]
    pub bucket: String,

    /// Where the session is kept between runs
    #[arg(long, env = "DESAIN_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create an account
    Register {
        email: String,
        #[arg(long, env = "DESAIN_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign in and remember the session
    Login {
        email: String,
        #[arg(long, env = "DESAIN_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign out and forget the session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// List requests in one view
    List {
        /// new, revision or done
        #[arg(long, default_value = "new", value_parser = parse_view)]
        view: StatusView,
        /// Filter by client name
        #[arg(long)]
        search: Option<String>,
    },
    /// Submit a new design request
    Submit {
        #[arg(long)]
        client: String,
        /// Briefing date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, default_value = "")]
        briefing: String,
        /// Reference file to attach, repeatable
        #[arg(long = "file")]
        files: Vec<PathBuf>,
    },
    /// Change the briefing or reference files of a request
    Edit {
        id: String,
        #[arg(long)]
        briefing: Option<String>,
        /// File to attach, repeatable
        #[arg(long = "add")]
        add: Vec<PathBuf>,
        /// Attachment URL to drop, repeatable
        #[arg(long = "remove")]
        remove: Vec<String>,
    },
    /// Accept the results of a request under revision
    Approve { id: String },
    /// Mark a request's results as seen
    Seen { id: String },
    /// Delete a request and its attachments
    Remove { id: String },
}

fn parse_view(s: &str) -> Result<StatusView, String> {
    StatusView::parse_str(s).ok_or_else(|| format!("unknown view '{s}' (new, revision, done)"))
}

impl Config {
    pub fn data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        let base = if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            PathBuf::from(xdg)
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home).join(".local/share")
        } else {
            PathBuf::from(".")
        };
        base.join("desain")
    }
}
