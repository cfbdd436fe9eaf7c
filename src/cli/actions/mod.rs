pub mod extract;
pub mod session;

use crate::config::EngineConfig;
use anyhow::Result;
use std::path::PathBuf;

#[derive(Debug)]
pub enum Action {
    SessionShow {
        identity: String,
        config: EngineConfig,
    },
    SessionClear {
        config: EngineConfig,
    },
    ExtractCode {
        message: PathBuf,
        config: EngineConfig,
    },
    Config {
        config: EngineConfig,
    },
}

impl Action {
    /// Execute the action.
    ///
    /// # Errors
    /// Returns an error if the underlying session or message file cannot be handled.
    pub async fn execute(self) -> Result<()> {
        match self {
            Self::SessionShow { identity, config } => session::show(&identity, &config),
            Self::SessionClear { config } => session::clear(&config),
            Self::ExtractCode { message, config } => extract::execute(&message, &config).await,
            Self::Config { config } => {
                println!("{config:#?}");
                Ok(())
            }
        }
    }
}
