//! Application state management.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::info;
use vizgate_tableau::TableauClient;

use crate::auth::SessionService;
use crate::config::ServerConfig;
use crate::credentials::CredentialStore;
use crate::directory::{WorkbookDirectory, WorkbookSource};
use crate::embed::EmbedTokenMinter;
use crate::vendor::TableauWorkbookSource;

/// Application state shared across request handlers.
pub struct AppState {
    /// Server configuration.
    pub config: ServerConfig,
    /// Login and token verification.
    pub sessions: SessionService,
    /// Embed token signing.
    pub minter: EmbedTokenMinter,
    /// Workbook listing.
    pub directory: WorkbookDirectory,
    /// Start time.
    start_time: Instant,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("directory", &self.directory)
            .field("start_time", &self.start_time)
            .finish()
    }
}

impl AppState {
    /// Build state from configuration, connecting the directory to Tableau
    /// Server when one is configured.
    pub fn new(config: ServerConfig) -> anyhow::Result<Self> {
        let source = match config.tableau.settings() {
            Some(settings) => {
                let client = TableauClient::new(settings).context("building Tableau client")?;
                info!(server = %client.server_url(), "Workbook directory in live mode");
                let source = TableauWorkbookSource::new(client)
                    .with_view_resolution(config.tableau.resolve_views)
                    .with_sign_out(config.directory.sign_out_after_refresh);
                Some(Arc::new(source) as Arc<dyn WorkbookSource>)
            }
            None => {
                info!("No Tableau server configured; workbook directory in static mode");
                None
            }
        };

        Self::with_source(config, source)
    }

    /// Build state with an explicit workbook source.
    pub fn with_source(
        config: ServerConfig,
        source: Option<Arc<dyn WorkbookSource>>,
    ) -> anyhow::Result<Self> {
        let store = CredentialStore::from_config(&config.auth.users)?;
        let sessions = SessionService::new(store, &config.auth)?;
        let minter = EmbedTokenMinter::new(&config.embed, &config.tableau)?;
        let directory = WorkbookDirectory::new(source, &config.directory);

        Ok(Self {
            config,
            sessions,
            minter,
            directory,
            start_time: Instant::now(),
        })
    }

    /// Get server uptime.
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}
