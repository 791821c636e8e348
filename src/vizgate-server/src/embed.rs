//! Embed token minting for Tableau Connected Apps.

use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::{Identity, unix_now};
use crate::config::{EmbedConfig, TableauConfig};
use crate::error::{AppError, AppResult};

/// Audience expected by Tableau for embed tokens.
pub const EMBED_AUDIENCE: &str = "tableau";

/// Issuer used when neither a client id nor a server URL is configured.
const FALLBACK_ISSUER: &str = "vizgate";

/// Claims of a Tableau embed token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub exp: u64,
    pub jti: String,
    pub scp: Vec<String>,
    #[serde(rename = "https://tableau.com/oda")]
    pub oda: OdaClaim,
}

/// Content target of an embed token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OdaClaim {
    pub site: String,
    pub content: ContentTarget,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentTarget {
    pub workbook: String,
    pub view: String,
}

/// A signed embed token and what it grants.
#[derive(Debug, Clone)]
pub struct EmbedToken {
    pub token: String,
    pub claims: EmbedClaims,
    pub viz_url: String,
}

impl EmbedToken {
    pub fn workbook(&self) -> &str {
        &self.claims.oda.content.workbook
    }

    pub fn view(&self) -> &str {
        &self.claims.oda.content.view
    }
}

/// Build the URL the embedding client loads for a view.
///
/// The default site ("") has no `/t/<site>` segment. Site, workbook and view
/// are each encoded as a single path segment.
pub fn viz_url(server_url: &str, site: &str, workbook: &str, view: &str) -> String {
    let server = server_url.trim_end_matches('/');
    let workbook = path_segment(workbook);
    let view = path_segment(view);
    if site.is_empty() {
        format!("{server}/views/{workbook}/{view}")
    } else {
        format!("{server}/t/{}/views/{workbook}/{view}", path_segment(site))
    }
}

fn path_segment(value: &str) -> String {
    match value {
        // Dot segments are left as is by percent-encoding but resolved by URL parsers.
        "." => "%2E".to_string(),
        ".." => "%2E%2E".to_string(),
        _ => urlencoding::encode(value).into_owned(),
    }
}

/// Signs embed tokens with the Connected App secret.
pub struct EmbedTokenMinter {
    key: EncodingKey,
    issuer: String,
    key_id: Option<String>,
    expiry_seconds: u64,
    scopes: Vec<String>,
    default_workbook: String,
    default_view: String,
    server_url: String,
    site: String,
}

impl std::fmt::Debug for EmbedTokenMinter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbedTokenMinter")
            .field("issuer", &self.issuer)
            .field("key_id", &self.key_id)
            .field("expiry_seconds", &self.expiry_seconds)
            .field("server_url", &self.server_url)
            .finish()
    }
}

impl EmbedTokenMinter {
    pub fn new(embed: &EmbedConfig, tableau: &TableauConfig) -> AppResult<Self> {
        let secret = embed
            .secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::Configuration("embed secret not configured".to_string()))?;

        let server_url = tableau.base_url().to_string();
        let issuer = embed
            .client_id
            .clone()
            .or_else(|| (!server_url.is_empty()).then(|| server_url.clone()))
            .unwrap_or_else(|| FALLBACK_ISSUER.to_string());

        Ok(Self {
            key: EncodingKey::from_secret(secret.as_bytes()),
            issuer,
            key_id: embed.secret_id.clone(),
            expiry_seconds: embed.expiry_minutes.checked_mul(60).ok_or_else(|| {
                AppError::Configuration(format!(
                    "embed expiry {} minutes is out of range",
                    embed.expiry_minutes
                ))
            })?,
            scopes: embed.scopes.clone(),
            default_workbook: embed.default_workbook.clone(),
            default_view: embed.default_view.clone(),
            server_url,
            site: tableau.site.clone(),
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub fn site(&self) -> &str {
        &self.site
    }

    /// Mint a token for `identity`, targeting the given workbook and view.
    ///
    /// Missing or blank targets use the configured defaults.
    pub fn mint(
        &self,
        identity: &Identity,
        workbook: Option<&str>,
        view: Option<&str>,
    ) -> AppResult<EmbedToken> {
        self.mint_at(identity, workbook, view, unix_now())
    }

    pub fn mint_at(
        &self,
        identity: &Identity,
        workbook: Option<&str>,
        view: Option<&str>,
        now: u64,
    ) -> AppResult<EmbedToken> {
        let workbook = non_blank(workbook).unwrap_or(&self.default_workbook);
        let view = non_blank(view).unwrap_or(&self.default_view);

        let exp = now.checked_add(self.expiry_seconds).ok_or_else(|| {
            AppError::Configuration(format!(
                "embed expiry {}s is out of range",
                self.expiry_seconds
            ))
        })?;

        let claims = EmbedClaims {
            iss: self.issuer.clone(),
            sub: identity.username.clone(),
            aud: EMBED_AUDIENCE.to_string(),
            exp,
            jti: uuid::Uuid::new_v4().to_string(),
            scp: self.scopes.clone(),
            oda: OdaClaim {
                site: self.site.clone(),
                content: ContentTarget {
                    workbook: workbook.to_string(),
                    view: view.to_string(),
                },
            },
        };

        let mut header = Header::new(Algorithm::HS256);
        header.kid = self.key_id.clone();

        let token = encode(&header, &claims, &self.key)
            .map_err(|e| AppError::Internal(format!("Failed to sign embed token: {e}")))?;

        debug!(
            username = %identity.username,
            workbook = %workbook,
            view = %view,
            jti = %claims.jti,
            "Minted embed token"
        );

        Ok(EmbedToken {
            token,
            viz_url: viz_url(&self.server_url, &self.site, workbook, view),
            claims,
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
