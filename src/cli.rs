use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "sdlc-monitor")]
#[command(about = "Start, follow and steer AI SDLC workflow sessions")]
#[command(version)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Workflow API base URL (overrides config and SDLC_API_URL)
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Config file (defaults to ~/.sdlc-monitor/config.yaml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Also print diagnostic logs to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start a workflow and follow it
    Start {
        /// The requirements text (all arguments are joined)
        #[arg(trailing_var_arg = true, required = true)]
        requirements: Vec<String>,

        #[arg(long)]
        project_name: Option<String>,

        /// Stakeholder name (repeatable)
        #[arg(long = "stakeholder")]
        stakeholders: Vec<String>,

        /// Print the session id and exit instead of following
        #[arg(long)]
        detach: bool,
    },
    /// Attach to an existing session and follow it
    Watch { session_id: String },
    /// Print one status fetch
    Status {
        session_id: String,

        /// Print the raw status document as JSON
        #[arg(long)]
        json: bool,
    },
    /// Answer the pending interrupt of a session
    Respond {
        session_id: String,
        response: String,

        /// Additional JSON data sent with the response
        #[arg(long)]
        data: Option<String>,
    },
    /// Stop a session on the server
    Stop { session_id: String },
    /// List sessions known to the server
    Sessions,
    /// Check that the API is reachable
    Health,
}
