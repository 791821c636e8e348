//! Workbook directory: cached live listing with a static fallback.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use vizgate_tableau::TableauError;
use vizgate_utils_cache::{EntryState, FetchError, Origin, TtlCache};

use crate::config::DirectoryConfig;

const CACHE_KEY: &str = "workbooks";

/// A dashboard the portal can embed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkbookDescriptor {
    pub id: String,
    pub name: String,
    /// Workbook content URL.
    pub workbook: String,
    /// Sheet name of the view to open.
    pub view: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl WorkbookDescriptor {
    fn fixed(id: &str, name: &str, workbook: &str, view: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            workbook: workbook.to_string(),
            view: view.to_string(),
            description: description.to_string(),
            owner: None,
            created_at: None,
            updated_at: None,
            size: None,
            tags: Vec::new(),
        }
    }
}

/// Built-in list served when the server cannot be reached.
pub fn fallback_workbooks() -> Vec<WorkbookDescriptor> {
    vec![
        WorkbookDescriptor::fixed(
            "dashboard-sebaran-pelanggaran",
            "Dashboard Sebaran Pelanggaran",
            "DashboardSebaranPelanggaran",
            "Dashboard",
            "Dashboard untuk melihat sebaran pelanggaran lalu lintas",
        ),
        WorkbookDescriptor::fixed(
            "dashboard-summary-dakgar",
            "Dashboard Summary Dakgar",
            "DashboardSummaryDakgar",
            "Summary",
            "Ringkasan data DAKGAR LANTAS",
        ),
        WorkbookDescriptor::fixed(
            "korlantas-trend-pelanggaran",
            "Korlantas Trend Pelanggaran",
            "KorlantasTrendPelanggaran",
            "Trend",
            "Trend pelanggaran lalu lintas Korlantas",
        ),
        WorkbookDescriptor::fixed(
            "dashboard-demografi-pelanggaran",
            "Dashboard Demografi Pelanggaran",
            "DashboardDemografiPelanggaran",
            "Demografi",
            "Analisis demografi pelanggar lalu lintas",
        ),
        WorkbookDescriptor::fixed(
            "dashboard-denda",
            "Dashboard Denda",
            "DashboardDenda",
            "Denda",
            "Dashboard monitoring denda tilang",
        ),
        WorkbookDescriptor::fixed(
            "dashboard-blangko-e-tilang",
            "Dashboard Blangko E-Tilang",
            "DashboardBlangkoE-Tilang",
            "Blangko",
            "Monitoring blangko E-Tilang",
        ),
        WorkbookDescriptor::fixed(
            "dashboard-dakgar-lantas-fin",
            "Dashboard DAKGAR LANTAS Final",
            "DashboardDAKGARLANTAS_Fin",
            "Dashboard",
            "Dashboard DAKGAR LANTAS versi final",
        ),
        WorkbookDescriptor::fixed(
            "anatomi-perkara",
            "Anatomi Perkara",
            "AnatomiPerkara",
            "Perkara",
            "Analisis anatomi perkara tilang",
        ),
        WorkbookDescriptor::fixed(
            "dashboard-teguran",
            "Dashboard Teguran",
            "Teguran",
            "Teguran",
            "Dashboard monitoring teguran",
        ),
        WorkbookDescriptor::fixed(
            "dashboard-home",
            "Dashboard Home",
            "home",
            "Home",
            "Dashboard utama Korlantas",
        ),
    ]
}

/// Something that can produce the live workbook list.
#[async_trait]
pub trait WorkbookSource: Send + Sync {
    async fn fetch_workbooks(&self) -> Result<Vec<WorkbookDescriptor>, TableauError>;
}

/// Where a listing came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingSource {
    Live,
    Cached,
    Fallback,
}

#[derive(Debug, Clone, Serialize)]
pub struct DirectoryListing {
    pub workbooks: Vec<WorkbookDescriptor>,
    pub source: ListingSource,
}

/// Serves workbook descriptors from the live source through a TTL cache.
///
/// Without a source the directory is in static mode and only ever returns
/// the fallback list.
pub struct WorkbookDirectory {
    source: Option<Arc<dyn WorkbookSource>>,
    cache: TtlCache<&'static str, Vec<WorkbookDescriptor>>,
    fallback: Vec<WorkbookDescriptor>,
}

impl std::fmt::Debug for WorkbookDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkbookDirectory")
            .field("live", &self.is_live())
            .field("cache", &self.cache)
            .field("fallback", &self.fallback.len())
            .finish()
    }
}

impl WorkbookDirectory {
    pub fn new(source: Option<Arc<dyn WorkbookSource>>, config: &DirectoryConfig) -> Self {
        Self {
            source,
            cache: TtlCache::new(config.cache_ttl_duration()),
            fallback: config
                .fallback_workbooks
                .clone()
                .unwrap_or_else(fallback_workbooks),
        }
    }

    /// Whether a live source is configured.
    pub fn is_live(&self) -> bool {
        self.source.is_some()
    }

    pub fn cache_state(&self) -> EntryState {
        self.cache.state(&CACHE_KEY)
    }

    /// List the workbooks.
    ///
    /// A fresh cache entry is returned as is. Otherwise the source is asked
    /// and its answer replaces the entry. If that fails the fallback list is
    /// returned and the entry is left untouched. Callers that were waiting
    /// on that failed fetch get the fallback list too, without a retry.
    pub async fn list(&self) -> DirectoryListing {
        let Some(source) = &self.source else {
            return self.fallback_listing();
        };

        let lookup = self
            .cache
            .get_or_try_fetch(&CACHE_KEY, move || async move {
                let workbooks = source.fetch_workbooks().await?;
                info!("Fetched {} workbooks from Tableau Server", workbooks.len());
                Ok::<_, TableauError>(workbooks)
            })
            .await;

        match lookup {
            Ok(lookup) => {
                let source = match lookup.origin {
                    Origin::Hit => ListingSource::Cached,
                    Origin::Fetched => ListingSource::Live,
                };
                debug!(source = ?source, count = lookup.value.len(), "Workbook listing");
                DirectoryListing {
                    workbooks: lookup.value,
                    source,
                }
            }
            Err(FetchError::Failed(e)) => {
                warn!("Failed to fetch workbooks from Tableau, using fallback list: {}", e);
                self.fallback_listing()
            }
            Err(FetchError::Joined) => {
                debug!("Concurrent workbook fetch failed, using fallback list");
                self.fallback_listing()
            }
        }
    }

    fn fallback_listing(&self) -> DirectoryListing {
        DirectoryListing {
            workbooks: self.fallback.clone(),
            source: ListingSource::Fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Source that replays queued results and counts calls.
    struct ScriptedSource {
        calls: AtomicUsize,
        results: Mutex<Vec<Result<Vec<WorkbookDescriptor>, TableauError>>>,
    }

    impl ScriptedSource {
        fn with(results: Vec<Result<Vec<WorkbookDescriptor>, TableauError>>) -> Arc<Self> {
            let mut results = results;
            results.reverse();
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                results: Mutex::new(results),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl WorkbookSource for ScriptedSource {
        async fn fetch_workbooks(&self) -> Result<Vec<WorkbookDescriptor>, TableauError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.results
                .lock()
                .pop()
                .unwrap_or_else(|| Err(TableauError::Connection("script exhausted".into())))
        }
    }

    fn live(name: &str) -> Vec<WorkbookDescriptor> {
        vec![WorkbookDescriptor::fixed(name, name, name, "Dashboard", name)]
    }

    fn directory(source: Arc<ScriptedSource>) -> WorkbookDirectory {
        WorkbookDirectory::new(Some(source), &DirectoryConfig::default())
    }

    #[tokio::test]
    async fn test_static_mode_serves_fallback() {
        let dir = WorkbookDirectory::new(None, &DirectoryConfig::default());
        let listing = dir.list().await;

        assert!(!dir.is_live());
        assert_eq!(listing.source, ListingSource::Fallback);
        assert_eq!(listing.workbooks.len(), 10);
        assert_eq!(listing.workbooks[9].view, "Home");
        assert_eq!(dir.cache_state(), EntryState::Empty);
    }

    #[tokio::test]
    async fn test_fallback_on_failure() {
        let source = ScriptedSource::with(vec![Err(TableauError::Connection("refused".into()))]);
        let dir = directory(source.clone());

        let listing = dir.list().await;
        assert_eq!(listing.source, ListingSource::Fallback);
        assert_eq!(listing.workbooks, fallback_workbooks());
        assert_eq!(dir.cache_state(), EntryState::Empty);
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_then_cached() {
        let source = ScriptedSource::with(vec![Ok(live("sales"))]);
        let dir = directory(source.clone());

        let first = dir.list().await;
        assert_eq!(first.source, ListingSource::Live);
        assert_eq!(first.workbooks, live("sales"));

        for _ in 0..5 {
            let again = dir.list().await;
            assert_eq!(again.source, ListingSource::Cached);
            assert_eq!(again.workbooks, live("sales"));
        }
        assert_eq!(source.calls(), 1);
        assert_eq!(dir.cache_state(), EntryState::Fresh);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_after_ttl() {
        let source = ScriptedSource::with(vec![Ok(live("old")), Ok(live("new"))]);
        let dir = directory(source.clone());

        dir.list().await;
        tokio::time::advance(Duration::from_secs(300)).await;
        assert_eq!(dir.cache_state(), EntryState::Stale);

        let refreshed = dir.list().await;
        assert_eq!(refreshed.source, ListingSource::Live);
        assert_eq!(refreshed.workbooks, live("new"));
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_keeps_cached_entry() {
        let source = ScriptedSource::with(vec![
            Ok(live("old")),
            Err(TableauError::Connection("down".into())),
        ]);
        let dir = directory(source.clone());

        dir.list().await;
        tokio::time::advance(Duration::from_secs(301)).await;

        let during_outage = dir.list().await;
        assert_eq!(during_outage.source, ListingSource::Fallback);
        assert_eq!(dir.cache_state(), EntryState::Stale);
    }

    #[tokio::test]
    async fn test_concurrent_misses_fetch_once() {
        let source = ScriptedSource::with(vec![Ok(live("once"))]);
        let dir = Arc::new(directory(source.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dir = Arc::clone(&dir);
                tokio::spawn(async move { dir.list().await })
            })
            .collect();

        for handle in handles {
            let listing = handle.await.unwrap();
            assert_eq!(listing.workbooks, live("once"));
        }
        assert_eq!(source.calls(), 1);
    }

    /// Source that takes a while and then fails.
    struct SlowFailingSource {
        calls: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl WorkbookSource for SlowFailingSource {
        async fn fetch_workbooks(&self) -> Result<Vec<WorkbookDescriptor>, TableauError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Err(TableauError::Connection("timed out".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_misses_share_failed_fetch() {
        let source = Arc::new(SlowFailingSource {
            calls: AtomicUsize::new(0),
            delay: Duration::from_secs(30),
        });
        let dir = Arc::new(WorkbookDirectory::new(
            Some(source.clone()),
            &DirectoryConfig::default(),
        ));
        let started = tokio::time::Instant::now();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let dir = Arc::clone(&dir);
                tokio::spawn(async move {
                    let listing = dir.list().await;
                    (listing.source, started.elapsed())
                })
            })
            .collect();

        for handle in handles {
            let (served_from, waited) = handle.await.unwrap();
            assert_eq!(served_from, ListingSource::Fallback);
            assert_eq!(waited, Duration::from_secs(30));
        }
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(dir.cache_state(), EntryState::Empty);
    }

    #[test]
    fn test_configured_fallback_replaces_builtin() {
        let config = DirectoryConfig {
            fallback_workbooks: Some(live("custom")),
            ..DirectoryConfig::default()
        };
        let dir = WorkbookDirectory::new(None, &config);
        assert_eq!(dir.fallback, live("custom"));
    }

    #[test]
    fn test_descriptor_json_shape() {
        let json = serde_json::to_value(&fallback_workbooks()[0]).unwrap();
        assert_eq!(json["workbook"], "DashboardSebaranPelanggaran");
        assert!(json.get("createdAt").is_none());
        assert_eq!(json["tags"], serde_json::json!([]));
    }
}
