//! Tableau REST client implementation

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::ACCEPT;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::models::{
    Pagination, SignInRequest, SignInResponse, SitesResponse, ViewsResponse, WorkbooksResponse,
};
use crate::site::{SiteContext, SiteContextMode};
use crate::{
    AUTH_HEADER, DEFAULT_API_VERSION, DEFAULT_PAGE_SIZE, Result, Site, TableauError, View, Workbook,
};

/// Connection settings for a Tableau Server.
#[derive(Clone)]
pub struct TableauSettings {
    /// Base URL, e.g. `https://tableau.example.com`.
    pub server_url: String,
    /// REST API version segment.
    pub api_version: String,
    /// Service account name.
    pub username: String,
    /// Service account password.
    pub password: String,
    /// Site content URL; empty selects the default site.
    pub site: String,
    /// How the sign-in payload names the site.
    pub site_context: SiteContextMode,
    /// Skip TLS certificate validation. Only for self-signed internal servers.
    pub accept_invalid_certs: bool,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Page size for list calls.
    pub page_size: u32,
}

impl TableauSettings {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
            username: String::new(),
            password: String::new(),
            site: String::new(),
            site_context: SiteContextMode::default(),
            accept_invalid_certs: false,
            timeout: Duration::from_secs(30),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn with_site(mut self, site: impl Into<String>, mode: SiteContextMode) -> Self {
        self.site = site.into();
        self.site_context = mode;
        self
    }
}

impl std::fmt::Debug for TableauSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableauSettings")
            .field("server_url", &self.server_url)
            .field("api_version", &self.api_version)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("site", &self.site)
            .field("site_context", &self.site_context)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Result of a successful sign-in.
#[derive(Debug, Clone)]
pub struct Session {
    /// Value for the `X-Tableau-Auth` header.
    pub token: String,
    /// LUID of the signed-in site.
    pub site_id: String,
    /// Content URL of the signed-in site.
    pub site_content_url: String,
    /// Payload shape that worked.
    pub site_context: SiteContext,
}

/// Client for a Tableau Server's REST API.
#[derive(Clone)]
pub struct TableauClient {
    http: reqwest::Client,
    settings: Arc<TableauSettings>,
    /// Site context picked by the first successful probe in `Auto` mode.
    resolved_context: Arc<OnceCell<SiteContext>>,
}

impl std::fmt::Debug for TableauClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableauClient")
            .field("settings", &self.settings)
            .field("resolved_context", &self.resolved_context.get())
            .finish()
    }
}

impl TableauClient {
    /// Build a client. No request is made until the first call.
    pub fn new(settings: TableauSettings) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(settings.timeout.min(Duration::from_secs(10)))
            .timeout(settings.timeout);

        if settings.accept_invalid_certs {
            warn!(
                server = %settings.server_url,
                "TLS certificate validation is DISABLED for the Tableau Server connection"
            );
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(Self {
            http: builder.build()?,
            settings: Arc::new(settings),
            resolved_context: Arc::new(OnceCell::new()),
        })
    }

    pub fn settings(&self) -> &TableauSettings {
        &self.settings
    }

    pub fn server_url(&self) -> &str {
        self.settings.server_url.trim_end_matches('/')
    }

    /// Site context chosen by `Auto` probing, once one has succeeded.
    pub fn resolved_site_context(&self) -> Option<&SiteContext> {
        self.resolved_context.get()
    }

    fn api_url(&self, path: &str) -> String {
        format!(
            "{}/api/{}/{}",
            self.server_url(),
            self.settings.api_version,
            path.trim_start_matches('/')
        )
    }

    fn transport_error(&self, error: reqwest::Error) -> TableauError {
        if error.is_connect() || error.is_timeout() {
            debug!("Transport failure talking to Tableau: {}", error);
            TableauError::Connection(self.server_url().to_string())
        } else {
            TableauError::Request(error)
        }
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        context: &'static str,
    ) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(TableauError::Server {
                context,
                status: status.as_u16(),
                body,
            });
        }

        Ok(serde_json::from_str(&body)?)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        token: &str,
        query: &[(&str, String)],
        context: &'static str,
    ) -> Result<T> {
        let response = self
            .http
            .get(url)
            .header(ACCEPT, "application/json")
            .header(AUTH_HEADER, token)
            .query(query)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        Self::read_json(response, context).await
    }

    /// Sign in with the configured service account.
    ///
    /// In `Auto` mode the first call probes each site context in turn and
    /// remembers the one that worked; later calls use only that shape.
    pub async fn authenticate(&self) -> Result<Session> {
        match self.settings.site_context {
            SiteContextMode::Explicit => {
                self.sign_in(&SiteContext::for_site(&self.settings.site))
                    .await
            }
            SiteContextMode::Omitted => self.sign_in(&SiteContext::Omitted).await,
            SiteContextMode::Auto => {
                if let Some(context) = self.resolved_context.get() {
                    return self.sign_in(context).await;
                }

                let session = self.probe_site_contexts().await?;
                if self
                    .resolved_context
                    .set(session.site_context.clone())
                    .is_ok()
                {
                    info!("Tableau sign-in resolved to {}", session.site_context);
                }
                Ok(session)
            }
        }
    }

    async fn probe_site_contexts(&self) -> Result<Session> {
        let mut failures = Vec::new();

        for context in SiteContext::probe_order(&self.settings.site) {
            match self.sign_in(&context).await {
                Ok(session) => return Ok(session),
                Err(e) => {
                    warn!("Tableau sign-in with {} failed: {}", context, e);
                    failures.push(format!("{context}: {e}"));
                }
            }
        }

        Err(TableauError::AllSiteContextsFailed(failures))
    }

    /// Sign in with one specific site context.
    pub async fn sign_in(&self, context: &SiteContext) -> Result<Session> {
        let url = self.api_url("auth/signin");
        let body = SignInRequest::new(&self.settings.username, &self.settings.password, context);

        debug!(
            server = %self.server_url(),
            username = %self.settings.username,
            "Signing in to Tableau Server with {}",
            context
        );

        let response = self
            .http
            .post(&url)
            .header(ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let signed_in: SignInResponse = Self::read_json(response, "Sign-in").await?;
        let credentials = signed_in.credentials;

        if credentials.token.is_empty() {
            return Err(TableauError::InvalidResponse(
                "sign-in returned an empty token".to_string(),
            ));
        }

        Ok(Session {
            token: credentials.token,
            site_id: credentials.site.id,
            site_content_url: credentials.site.content_url,
            site_context: context.clone(),
        })
    }

    /// Invalidate a session token. The server answers 204 on success.
    pub async fn sign_out(&self, token: &str) -> Result<()> {
        let url = self.api_url("auth/signout");
        let response = self
            .http
            .post(&url)
            .header(AUTH_HEADER, token)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(TableauError::Server {
                context: "Sign-out",
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            })
        }
    }

    /// List every workbook on the site, following pagination.
    pub async fn list_workbooks(&self, token: &str, site_id: &str) -> Result<Vec<Workbook>> {
        let url = self.api_url(&format!("sites/{site_id}/workbooks"));
        let mut workbooks = Vec::new();
        let mut page = 1u32;

        loop {
            let response: WorkbooksResponse = self
                .get_json(&url, token, &self.page_query(page), "List workbooks")
                .await?;

            let fetched = response.workbooks.workbook.len();
            workbooks.extend(response.workbooks.workbook);

            if !self.has_more(response.pagination.as_ref(), workbooks.len(), fetched) {
                break;
            }
            page += 1;
        }

        debug!("Listed {} workbooks on site {}", workbooks.len(), site_id);
        Ok(workbooks)
    }

    /// List the views of one workbook.
    pub async fn list_views(
        &self,
        token: &str,
        site_id: &str,
        workbook_id: &str,
    ) -> Result<Vec<View>> {
        let url = self.api_url(&format!("sites/{site_id}/workbooks/{workbook_id}/views"));
        let response: ViewsResponse = self.get_json(&url, token, &[], "List views").await?;
        Ok(response.views.view)
    }

    /// List the sites visible to the signed-in account.
    pub async fn list_sites(&self, token: &str) -> Result<Vec<Site>> {
        let url = self.api_url("sites");
        let mut sites = Vec::new();
        let mut page = 1u32;

        loop {
            let response: SitesResponse = self
                .get_json(&url, token, &self.page_query(page), "List sites")
                .await?;

            let fetched = response.sites.site.len();
            sites.extend(response.sites.site);

            if !self.has_more(response.pagination.as_ref(), sites.len(), fetched) {
                break;
            }
            page += 1;
        }

        Ok(sites)
    }

    fn page_query(&self, page: u32) -> Vec<(&'static str, String)> {
        vec![
            ("pageSize", self.settings.page_size.to_string()),
            ("pageNumber", page.to_string()),
        ]
    }

    fn has_more(&self, pagination: Option<&Pagination>, seen: usize, last_page: usize) -> bool {
        if last_page == 0 {
            return false;
        }
        match pagination.and_then(|p| p.total_available) {
            Some(total) => (seen as u64) < total,
            None => false,
        }
    }
}
