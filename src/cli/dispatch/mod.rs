//! Map parsed CLI arguments to an [`Action`].

use crate::cli::actions::Action;
use crate::cli::commands::{engine, ARG_IDENTITY, ARG_MESSAGE};
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Map validated CLI matches to an action.
///
/// # Errors
/// Returns an error if required arguments are missing or no subcommand was given.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let config = engine::Options::parse(matches)?.config;

    match matches.subcommand() {
        Some(("session", session)) => match session.subcommand() {
            Some(("show", show)) => Ok(Action::SessionShow {
                identity: show
                    .get_one::<String>(ARG_IDENTITY)
                    .cloned()
                    .context("missing required argument: --identity")?,
                config,
            }),
            Some(("clear", _)) => Ok(Action::SessionClear { config }),
            _ => Err(anyhow::anyhow!("missing session subcommand")),
        },
        Some(("extract-code", extract)) => Ok(Action::ExtractCode {
            message: extract
                .get_one::<String>(ARG_MESSAGE)
                .map(PathBuf::from)
                .context("missing required argument: <message>")?,
            config,
        }),
        Some(("config", _)) => Ok(Action::Config { config }),
        _ => Err(anyhow::anyhow!("missing subcommand")),
    }
}
