use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "tracker", about = "Follow candidate searches and upload jobs to completion")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (RON)
    #[arg(long, default_value = "tracker.ron")]
    pub config: PathBuf,

    /// Let go of the live stream after this many seconds and keep watching by polling
    #[arg(long, value_name = "SECS")]
    pub detach_after: Option<u64>,

    /// Also write log output to ./tracker.log
    #[arg(long)]
    pub log: bool,

    /// Log at debug level
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run a natural-language candidate search
    Search {
        query: String,
        /// Owner the search is recorded under
        #[arg(long)]
        owner: Option<String>,
    },
    /// Import candidates from a CSV file
    Upload { csv: PathBuf },
    /// Reattach to an operation by route, e.g. /search/abc123; defaults to the last one tracked
    Resume { route: Option<String> },
    /// List past operations for an owner
    List { owner: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_search_with_detach() {
        let cli = Cli::try_parse_from([
            "tracker",
            "--detach-after",
            "5",
            "search",
            "rust engineers",
            "--owner",
            "user-1",
        ])
        .unwrap();
        assert_eq!(cli.detach_after, Some(5));
        assert_eq!(
            cli.command,
            Command::Search {
                query: "rust engineers".to_string(),
                owner: Some("user-1".to_string()),
            }
        );
    }

    #[test]
    fn resume_route_is_optional() {
        let cli = Cli::try_parse_from(["tracker", "resume"]).unwrap();
        assert_eq!(cli.command, Command::Resume { route: None });
        assert_eq!(cli.config, PathBuf::from("tracker.ron"));
    }
}
