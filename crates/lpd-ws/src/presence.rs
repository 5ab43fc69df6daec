//! Page presence tracking.
//!
//! The feed session is only wanted while at least one page on a supported
//! site is open. `PagePresence` keeps the set of open pages and publishes the
//! derived "interested" flag on a watch channel, notifying receivers only when
//! the value actually changes.

use crate::error::{WsError, WsResult};
use dashmap::DashMap;
use regex::Regex;
use tokio::sync::watch;
use tracing::{debug, info};

/// Site patterns used when none are configured.
pub const DEFAULT_SITE_PATTERNS: &[&str] = &["*://axiom.trade/*", "*://gmgn.ai/*"];

/// A `*` glob over page URLs (e.g. `*://gmgn.ai/*`).
#[derive(Debug, Clone)]
pub struct SitePattern {
    raw: String,
    regex: Regex,
}

impl SitePattern {
    pub fn parse(glob: &str) -> WsResult<Self> {
        let glob = glob.trim();
        if glob.is_empty() {
            return Err(WsError::InvalidSitePattern("empty pattern".to_string()));
        }
        let source = format!("^{}$", regex::escape(glob).replace(r"\*", ".*"));
        let regex =
            Regex::new(&source).map_err(|e| WsError::InvalidSitePattern(format!("{glob}: {e}")))?;
        Ok(Self {
            raw: glob.to_string(),
            regex,
        })
    }

    pub fn matches(&self, url: &str) -> bool {
        self.regex.is_match(url)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

#[derive(Debug, Clone)]
struct PageEntry {
    url: String,
    qualifies: bool,
}

/// Open pages and the derived "interested" signal.
pub struct PagePresence {
    patterns: Vec<SitePattern>,
    pages: DashMap<String, PageEntry>,
    interested_tx: watch::Sender<bool>,
}

impl PagePresence {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> WsResult<Self> {
        let patterns = patterns
            .iter()
            .map(|p| SitePattern::parse(p.as_ref()))
            .collect::<WsResult<Vec<_>>>()?;
        let (interested_tx, _) = watch::channel(false);
        Ok(Self {
            patterns,
            pages: DashMap::new(),
            interested_tx,
        })
    }

    pub fn with_default_sites() -> WsResult<Self> {
        Self::new(DEFAULT_SITE_PATTERNS)
    }

    /// Receiver for the "interested" flag.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.interested_tx.subscribe()
    }

    pub fn is_interested(&self) -> bool {
        *self.interested_tx.borrow()
    }

    pub fn qualifies(&self, url: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(url))
    }

    /// A page opened or navigated. Returns whether its URL qualifies.
    pub fn page_updated(&self, page_id: &str, url: &str) -> bool {
        let qualifies = self.qualifies(url);
        self.pages.insert(
            page_id.to_string(),
            PageEntry {
                url: url.to_string(),
                qualifies,
            },
        );
        debug!(page_id, url, qualifies, "Page updated");
        self.recompute();
        qualifies
    }

    pub fn page_closed(&self, page_id: &str) {
        if self.pages.remove(page_id).is_some() {
            debug!(page_id, "Page closed");
            self.recompute();
        }
    }

    /// URLs of open pages on supported sites.
    pub fn qualifying_urls(&self) -> Vec<String> {
        self.pages
            .iter()
            .filter(|entry| entry.qualifies)
            .map(|entry| entry.url.clone())
            .collect()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn recompute(&self) {
        let changed = self.interested_tx.send_if_modified(|current| {
            let interested = self.pages.iter().any(|entry| entry.qualifies);
            if *current == interested {
                return false;
            }
            *current = interested;
            true
        });
        if changed {
            info!(interested = self.is_interested(), "Page interest changed");
        }
    }
}
