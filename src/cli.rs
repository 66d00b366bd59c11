//! Command line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::logic::enrich::EnrichField;

#[derive(Debug, Parser)]
#[command(name = "wids-pipeline", version, about = "Kismet telemetry sync and enrichment for Elasticsearch")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// `run` when no subcommand is given
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run)
    }
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum Command {
    /// Run the sync and enrichment loops with the status server
    Run,
    /// Run a single sync poll and exit
    SyncOnce,
    /// Run a single enrichment scan for one field and exit
    EnrichOnce {
        /// `anomaly_score` or `context.summary`
        #[arg(long)]
        field: EnrichField,
    },
    /// Export feature vectors as JSONL for model training
    ExportTraining {
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 10_000)]
        limit: usize,
    },
    /// Inspect or move the sync cursor
    Cursor {
        #[command(subcommand)]
        action: CursorAction,
    },
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum CursorAction {
    /// Print the persisted cursor
    Show,
    /// Delete the cursor, or set it to `--to` (unix seconds)
    Reset {
        #[arg(long)]
        to: Option<i64>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_run() {
        let cli = Cli::try_parse_from(["wids-pipeline"]).unwrap();
        assert_eq!(cli.command(), Command::Run);
    }

    #[test]
    fn test_enrich_once_field() {
        let cli = Cli::try_parse_from(["wids-pipeline", "enrich-once", "--field", "context.summary"]).unwrap();
        assert_eq!(
            cli.command(),
            Command::EnrichOnce {
                field: EnrichField::ContextSummary
            }
        );
        assert!(Cli::try_parse_from(["wids-pipeline", "enrich-once", "--field", "ssid"]).is_err());
    }

    #[test]
    fn test_cursor_reset_to() {
        let cli = Cli::try_parse_from(["wids-pipeline", "cursor", "reset", "--to", "1700000000"]).unwrap();
        assert_eq!(
            cli.command(),
            Command::Cursor {
                action: CursorAction::Reset { to: Some(1_700_000_000) }
            }
        );
    }

    #[test]
    fn test_export_default_limit() {
        let cli = Cli::try_parse_from(["wids-pipeline", "export-training", "--out", "train.jsonl"]).unwrap();
        match cli.command() {
            Command::ExportTraining { out, limit } => {
                assert_eq!(out, PathBuf::from("train.jsonl"));
                assert_eq!(limit, 10_000);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
