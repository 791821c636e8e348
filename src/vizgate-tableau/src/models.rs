//! Wire types for the Tableau REST API (JSON flavour).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::site::SiteContext;

/// Body of `POST /auth/signin`.
#[derive(Debug, Serialize)]
pub(crate) struct SignInRequest<'a> {
    pub credentials: SignInCredentials<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SignInCredentials<'a> {
    pub name: &'a str,
    pub password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<SiteRef<'a>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SiteRef<'a> {
    #[serde(rename = "contentUrl")]
    pub content_url: &'a str,
}

impl<'a> SignInRequest<'a> {
    pub fn new(name: &'a str, password: &'a str, context: &'a SiteContext) -> Self {
        Self {
            credentials: SignInCredentials {
                name,
                password,
                site: context.content_url().map(|content_url| SiteRef { content_url }),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SignInResponse {
    pub credentials: SignedIn,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SignedIn {
    pub token: String,
    pub site: SignedInSite,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SignedInSite {
    pub id: String,
    #[serde(rename = "contentUrl", default)]
    pub content_url: String,
}

/// Pagination block attached to list responses. Tableau sends the numbers as strings.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Pagination {
    #[serde(default, deserialize_with = "de_opt_u64")]
    pub total_available: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WorkbooksResponse {
    #[serde(default)]
    pub pagination: Option<Pagination>,
    #[serde(default)]
    pub workbooks: WorkbookList,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct WorkbookList {
    #[serde(default)]
    pub workbook: Vec<Workbook>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ViewsResponse {
    #[serde(default)]
    pub views: ViewList,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ViewList {
    #[serde(default)]
    pub view: Vec<View>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SitesResponse {
    #[serde(default)]
    pub pagination: Option<Pagination>,
    #[serde(default)]
    pub sites: SiteList,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SiteList {
    #[serde(default)]
    pub site: Vec<Site>,
}

/// A published workbook as returned by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workbook {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub content_url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub owner: Option<OwnerRef>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_opt_u64")]
    pub size: Option<u64>,
    #[serde(default, deserialize_with = "de_tags")]
    pub tags: Vec<Tag>,
}

impl Workbook {
    pub fn tag_labels(&self) -> Vec<String> {
        self.tags.iter().map(|t| t.label.clone()).collect()
    }
}

/// Owner reference embedded in a workbook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerRef {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub label: String,
}

/// A view (sheet or dashboard) inside a workbook.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct View {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub content_url: String,
}

impl View {
    /// The sheet segment used in embed URLs.
    ///
    /// `contentUrl` looks like `Workbook/sheets/Sheet`; falls back to the
    /// display name when the server omits it.
    pub fn sheet_name(&self) -> &str {
        self.content_url
            .rsplit_once("/sheets/")
            .map(|(_, sheet)| sheet)
            .filter(|sheet| !sheet.is_empty())
            .unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub content_url: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    Text(String),
}

fn de_opt_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::Number(n)) => Ok(Some(n)),
        Some(NumberOrString::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// `"tags": {"tag": [...]}`, `"tags": {}` or absent.
fn de_tags<'de, D>(deserializer: D) -> Result<Vec<Tag>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct TagList {
        #[serde(default)]
        tag: Vec<Tag>,
    }

    Ok(Option::<TagList>::deserialize(deserializer)?
        .map(|list| list.tag)
        .unwrap_or_default())
}
