//! # HelpMeTest CLI
//!
//! Command-line interface definition and main entry point.

use super::modes;
use crate::config::{ApiOverrides, ENV_DEBUG, env_flag_enabled};
use crate::utils::logging::init_logging;
use anyhow::Result;
use clap::{Args, Parser, Subcommand};

/// HelpMeTest command-line client.
#[derive(Parser, Debug, Clone)]
#[command(name = "helpmetest", author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the MCP server over stdio for AI agents.
    ///
    /// Example: helpmetest mcp $HELPMETEST_API_TOKEN --verbose
    Mcp(McpArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct McpArgs {
    /// API token (overrides HELPMETEST_API_TOKEN)
    #[arg(value_name = "TOKEN")]
    pub token: Option<String>,

    /// API base URL (overrides HELPMETEST_API_URL)
    #[arg(long, value_name = "URL")]
    pub api_url: Option<String>,

    /// Company to act for (overrides HELPMETEST_COMPANY; looked up from the token if unset)
    #[arg(long, value_name = "NAME")]
    pub company: Option<String>,

    /// Event stream subscription pattern (default: the company name)
    #[arg(long, value_name = "PATTERN")]
    pub stream_pattern: Option<String>,

    /// Enable debug logging (also enabled by HELPMETEST_DEBUG)
    #[arg(long, short)]
    pub verbose: bool,

    /// Log to stderr instead of file
    #[arg(long)]
    pub log_to_stderr: bool,
}

impl McpArgs {
    pub fn overrides(&self) -> ApiOverrides {
        ApiOverrides {
            token: self.token.clone(),
            api_url: self.api_url.clone(),
            company: self.company.clone(),
            stream_pattern: self.stream_pattern.clone(),
        }
    }

    pub fn log_level(&self) -> &'static str {
        if self.verbose || env_flag_enabled(ENV_DEBUG) {
            "debug"
        } else {
            "info"
        }
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Mcp(args) => {
            init_logging(args.log_level(), !args.log_to_stderr)?;
            modes::run_server_mode(args).await
        }
    }
}
