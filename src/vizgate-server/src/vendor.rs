//! Live workbook source backed by the Tableau REST client.

use async_trait::async_trait;
use tracing::{debug, warn};
use vizgate_tableau::{Session, TableauClient, TableauError, Workbook};

use crate::directory::{WorkbookDescriptor, WorkbookSource};

/// Guess the view to open from the workbook name.
pub fn guess_view(workbook_name: &str) -> &'static str {
    if workbook_name.contains("Home") {
        "Home"
    } else {
        "Dashboard"
    }
}

/// Map a server workbook to a descriptor. `view` overrides the guessed view.
pub fn describe(workbook: Workbook, view: Option<String>) -> WorkbookDescriptor {
    let view = view.unwrap_or_else(|| guess_view(&workbook.name).to_string());
    let description = workbook
        .description
        .clone()
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| format!("Workbook {}", workbook.name));
    let tags = workbook.tag_labels();

    WorkbookDescriptor {
        id: workbook.id,
        workbook: workbook.content_url,
        view,
        description,
        owner: workbook.owner.and_then(|o| o.name),
        created_at: workbook.created_at,
        updated_at: workbook.updated_at,
        size: workbook.size,
        tags,
        name: workbook.name,
    }
}

/// Fetches workbooks from Tableau Server on every call.
pub struct TableauWorkbookSource {
    client: TableauClient,
    resolve_views: bool,
    sign_out: bool,
}

impl TableauWorkbookSource {
    pub fn new(client: TableauClient) -> Self {
        Self {
            client,
            resolve_views: false,
            sign_out: true,
        }
    }

    /// Look up each workbook's first view instead of guessing it.
    pub fn with_view_resolution(mut self, enabled: bool) -> Self {
        self.resolve_views = enabled;
        self
    }

    /// Sign out after each fetch.
    pub fn with_sign_out(mut self, enabled: bool) -> Self {
        self.sign_out = enabled;
        self
    }

    async fn first_view(&self, session: &Session, workbook: &Workbook) -> Option<String> {
        match self
            .client
            .list_views(&session.token, &session.site_id, &workbook.id)
            .await
        {
            Ok(views) => views.first().map(|v| v.sheet_name().to_string()),
            Err(e) => {
                warn!("Failed to list views of '{}': {}", workbook.name, e);
                None
            }
        }
    }

    async fn describe_all(
        &self,
        session: &Session,
    ) -> Result<Vec<WorkbookDescriptor>, TableauError> {
        let workbooks = self
            .client
            .list_workbooks(&session.token, &session.site_id)
            .await?;

        let mut descriptors = Vec::with_capacity(workbooks.len());
        for workbook in workbooks {
            let view = if self.resolve_views {
                self.first_view(session, &workbook).await
            } else {
                None
            };
            descriptors.push(describe(workbook, view));
        }
        Ok(descriptors)
    }
}

#[async_trait]
impl WorkbookSource for TableauWorkbookSource {
    async fn fetch_workbooks(&self) -> Result<Vec<WorkbookDescriptor>, TableauError> {
        let session = self.client.authenticate().await?;
        let result = self.describe_all(&session).await;

        if self.sign_out {
            if let Err(e) = self.client.sign_out(&session.token).await {
                debug!("Tableau sign-out failed: {}", e);
            }
        }

        result
    }
}
