//! Annotation engine.
//!
//! Clock-injected state machine: every entry point takes the current
//! `Instant`, and timers are plain deadlines the driver waits on through
//! `next_deadline` before calling `poll`. Identifiers move from `pending`
//! (no row marked yet, retried on a fixed delay) to `resolved` (marked,
//! re-marked only when their rows or markers change).
//!
//! A scan walks the document once into a `RowIndex` and looks every entry
//! up there. Only pending entries missing from the index go through the
//! locator chain.

use crate::config::EngineConfig;
use crate::dom::{Document, MutationRecord, NodeId};
use crate::locator::{LocatorChain, RowIndex};
use crate::marker::{apply_marker, find_marker, MarkerConfig, MarkerOutcome, MARKER_CLASS};
use crate::profile::SiteProfile;
use lpd_core::{AnnotationView, Identifier};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Page lifecycle signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Visible,
    Hidden,
    Focus,
    /// Page shown again, including back/forward navigation.
    PageShow,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub scans: u64,
    pub markers_created: u64,
    pub markers_updated: u64,
    pub resolved: u64,
    pub exhausted: u64,
}

#[derive(Debug)]
struct PendingEntry {
    config: MarkerConfig,
    attempts: u32,
    next_retry: Option<Instant>,
}

impl PendingEntry {
    fn is_due(&self, now: Instant) -> bool {
        self.next_retry.map_or(true, |at| at <= now)
    }
}

#[derive(Debug)]
struct ResolvedEntry {
    config: MarkerConfig,
    rows: Vec<NodeId>,
    dirty: bool,
}

pub struct AnnotationEngine {
    profile: SiteProfile,
    config: EngineConfig,
    locators: LocatorChain,
    pending: BTreeMap<Identifier, PendingEntry>,
    resolved: BTreeMap<Identifier, ResolvedEntry>,
    scan_at: Option<Instant>,
    mutation_at: Option<Instant>,
    scroll_at: Option<Instant>,
    last_scroll: Option<Instant>,
    observe_at: Option<Instant>,
    observed: HashSet<NodeId>,
    observe_requests: Vec<NodeId>,
    stats: EngineStats,
}

impl AnnotationEngine {
    /// New engine; rows are first registered for visibility tracking one
    /// observe delay after `now`.
    pub fn new(profile: SiteProfile, config: EngineConfig, now: Instant) -> Self {
        let observe_at = Some(now + config.observe_delay());
        Self {
            profile,
            config,
            locators: LocatorChain::default(),
            pending: BTreeMap::new(),
            resolved: BTreeMap::new(),
            scan_at: None,
            mutation_at: None,
            scroll_at: None,
            last_scroll: None,
            observe_at,
            observed: HashSet::new(),
            observe_requests: Vec::new(),
            stats: EngineStats::default(),
        }
    }

    pub fn with_locators(mut self, locators: LocatorChain) -> Self {
        self.locators = locators;
        self
    }

    pub fn profile(&self) -> &SiteProfile {
        &self.profile
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn is_pending(&self, identifier: &Identifier) -> bool {
        self.pending.contains_key(identifier)
    }

    pub fn is_resolved(&self, identifier: &Identifier) -> bool {
        self.resolved.contains_key(identifier)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Rows currently marked for `identifier`.
    pub fn rows_for(&self, identifier: &Identifier) -> &[NodeId] {
        self.resolved
            .get(identifier)
            .map_or(&[], |entry| entry.rows.as_slice())
    }

    /// A pushed fact. Coalesced through the scan debounce.
    pub fn annotate(&mut self, view: &AnnotationView, now: Instant) {
        self.insert(view);
        self.request_scan(now);
    }

    /// Facts the page may have missed before loading. Scans immediately.
    pub fn load_known(&mut self, doc: &mut Document, views: &[AnnotationView], now: Instant) {
        for view in views {
            self.insert(view);
        }
        debug!(count = views.len(), pending = self.pending.len(), "Loaded known annotations");
        self.scan_now(doc, now);
    }

    fn insert(&mut self, view: &AnnotationView) {
        let config = MarkerConfig::from(view);
        if let Some(entry) = self.resolved.get_mut(&view.identifier) {
            if entry.config != config {
                entry.config = config;
                entry.dirty = true;
            }
            return;
        }
        match self.pending.get_mut(&view.identifier) {
            Some(entry) => entry.config = config,
            None => {
                self.pending.insert(
                    view.identifier.clone(),
                    PendingEntry {
                        config,
                        attempts: 0,
                        next_retry: None,
                    },
                );
            }
        }
    }

    /// Non-resetting debounce: the first request fixes the deadline.
    pub fn request_scan(&mut self, now: Instant) {
        if self.scan_at.is_none() {
            self.scan_at = Some(now + self.config.scan_debounce());
        }
    }

    /// Subtree mutation records. Rows appearing, or rows/markers vanishing,
    /// restart the mutation debounce.
    pub fn on_mutations(&mut self, doc: &Document, records: &[MutationRecord], now: Instant) {
        let relevant = records.iter().any(|record| match *record {
            MutationRecord::Added { node, .. } => self.profile.contains_row(doc, node),
            MutationRecord::Removed { node, .. } => {
                self.profile.contains_row(doc, node)
                    || doc.get(node).is_some_and(|e| e.has_class(MARKER_CLASS))
                    || find_marker(doc, node).is_some()
            }
        });
        if relevant {
            self.mutation_at = Some(now + self.config.mutation_debounce());
        }
    }

    /// Rows that entered the viewport.
    pub fn on_intersection(&mut self, doc: &Document, visible: &[NodeId], now: Instant) {
        if self.pending.is_empty() && self.resolved.is_empty() {
            return;
        }
        let unmarked = visible.iter().any(|&row| {
            self.observed.contains(&row) && doc.is_connected(row) && find_marker(doc, row).is_none()
        });
        if unmarked {
            self.request_scan(now);
        }
    }

    pub fn on_lifecycle(&mut self, doc: &mut Document, event: LifecycleEvent, now: Instant) {
        match event {
            LifecycleEvent::Visible | LifecycleEvent::Focus | LifecycleEvent::PageShow => {
                self.scan_now(doc, now);
            }
            LifecycleEvent::Hidden => {}
        }
    }

    /// Throttled, then debounced into a scan request.
    pub fn on_scroll(&mut self, now: Instant) {
        if let Some(last) = self.last_scroll {
            if now.saturating_duration_since(last) < self.config.scroll_throttle() {
                return;
            }
        }
        self.last_scroll = Some(now);
        self.scroll_at = Some(now + self.config.scroll_debounce());
    }

    /// Earliest timer the driver should wake for.
    pub fn next_deadline(&self) -> Option<Instant> {
        let retry = self.pending.values().filter_map(|e| e.next_retry).min();
        [self.scan_at, self.mutation_at, self.scroll_at, self.observe_at, retry]
            .into_iter()
            .flatten()
            .min()
    }

    /// Fire every timer due at `now`.
    pub fn poll(&mut self, doc: &mut Document, now: Instant) {
        if take_due(&mut self.mutation_at, now) {
            self.scan_now(doc, now);
            if self.observe_at.is_none() {
                self.observe_at = Some(now + self.config.observe_delay());
            }
        }
        if take_due(&mut self.scroll_at, now) {
            self.request_scan(now);
        }
        if take_due(&mut self.observe_at, now) {
            self.register_rows(doc);
        }
        let retry_due = self
            .pending
            .values()
            .any(|e| e.next_retry.is_some_and(|at| at <= now));
        if take_due(&mut self.scan_at, now) || retry_due {
            self.scan_now(doc, now);
        }
    }

    /// Rows newly registered for visibility tracking since the last call.
    pub fn take_observe_requests(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.observe_requests)
    }

    fn register_rows(&mut self, doc: &Document) {
        for row in self.profile.rows(doc) {
            if self.observed.insert(row) {
                self.observe_requests.push(row);
            }
        }
    }

    fn scan_now(&mut self, doc: &mut Document, now: Instant) {
        self.scan_at = None;
        self.scan(doc, now);
    }

    fn scan(&mut self, doc: &mut Document, now: Instant) {
        if self.pending.is_empty() && self.resolved.is_empty() {
            return;
        }
        self.stats.scans += 1;
        let index = RowIndex::build(doc, &self.profile);

        for (identifier, entry) in self.resolved.iter_mut() {
            let indexed = index.rows(identifier);
            let candidates: Vec<NodeId> = if indexed.is_empty() {
                entry
                    .rows
                    .iter()
                    .copied()
                    .filter(|&row| doc.is_connected(row) && !index.identifies(row))
                    .collect()
            } else {
                indexed.to_vec()
            };
            let settled = !entry.dirty
                && candidates == entry.rows
                && candidates.iter().all(|&row| find_marker(doc, row).is_some());
            if settled {
                continue;
            }
            entry.rows = Self::mark(
                doc,
                &self.profile,
                &mut self.stats,
                identifier,
                &entry.config,
                candidates,
            );
            entry.dirty = false;
        }

        let pending: Vec<Identifier> = self.pending.keys().cloned().collect();
        for identifier in pending {
            let Some(config) = self.pending.get(&identifier).map(|e| e.config.clone()) else {
                continue;
            };
            let mut candidates = index.rows(&identifier).to_vec();
            if candidates.is_empty() {
                candidates = self.locators.locate_rows(doc, &self.profile, &identifier);
            }
            let rows = Self::mark(
                doc,
                &self.profile,
                &mut self.stats,
                &identifier,
                &config,
                candidates,
            );
            if !rows.is_empty() {
                self.pending.remove(&identifier);
                self.stats.resolved += 1;
                debug!(identifier = %identifier, rows = rows.len(), "Annotation resolved");
                self.resolved.insert(
                    identifier,
                    ResolvedEntry {
                        config,
                        rows,
                        dirty: false,
                    },
                );
                continue;
            }

            let max_attempts = self.config.max_attempts;
            let retry_at = now + self.config.retry_delay();
            let Some(entry) = self.pending.get_mut(&identifier) else {
                continue;
            };
            if !entry.is_due(now) {
                continue;
            }
            entry.attempts += 1;
            if entry.attempts >= max_attempts {
                self.pending.remove(&identifier);
                self.stats.exhausted += 1;
                info!(
                    identifier = %identifier,
                    attempts = max_attempts,
                    "No target found, giving up"
                );
            } else {
                entry.next_retry = Some(retry_at);
            }
        }
    }

    /// Mark `rows` for `identifier`; returns the rows now marked.
    fn mark(
        doc: &mut Document,
        profile: &SiteProfile,
        stats: &mut EngineStats,
        identifier: &Identifier,
        config: &MarkerConfig,
        rows: Vec<NodeId>,
    ) -> Vec<NodeId> {
        let mut marked = Vec::with_capacity(rows.len());
        for row in rows {
            match apply_marker(doc, profile, row, config) {
                Ok(MarkerOutcome::Created(_)) => {
                    stats.markers_created += 1;
                    marked.push(row);
                }
                Ok(MarkerOutcome::Updated(_)) => {
                    stats.markers_updated += 1;
                    marked.push(row);
                }
                Ok(MarkerOutcome::Unchanged(_)) => marked.push(row),
                Ok(MarkerOutcome::AnchorMissing) => {}
                Err(e) => warn!(identifier = %identifier, error = %e, "Failed to apply marker"),
            }
        }
        marked
    }
}

fn take_due(deadline: &mut Option<Instant>, now: Instant) -> bool {
    match *deadline {
        Some(at) if at <= now => {
            *deadline = None;
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lpd_core::ColorHex;
    use std::time::Duration;

    const MINT: &str = "7GCihgDB8fe6KNjn2MYtkzZcRjQy3t9GHdC8uHYmW2hr";

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn view(id: &str, color: &str) -> AnnotationView {
        AnnotationView {
            identifier: Identifier::new(id).unwrap(),
            label: "UXENTO".to_string(),
            color: ColorHex::parse(color).unwrap(),
        }
    }

    fn add_row(doc: &mut Document, profile: &SiteProfile, id: &str) -> NodeId {
        let row = doc.create_element("div");
        doc.set_class_name(row, &profile.row_classes.join(" ")).unwrap();
        let anchor = doc.append_element(row, "span", &profile.anchor.classes.join(" ")).unwrap();
        doc.set_text(anchor, "Token").unwrap();
        let link = doc.append_element(row, "a", "").unwrap();
        doc.set_attribute(link, "href", &format!("/meme/{id}")).unwrap();
        doc.append_child(doc.root(), row).unwrap();
        row
    }

    fn setup() -> (AnnotationEngine, Document, Instant) {
        let t0 = Instant::now();
        (
            AnnotationEngine::new(SiteProfile::axiom(), EngineConfig::default(), t0),
            Document::new(),
            t0,
        )
    }

    #[test]
    fn test_annotate_debounced_then_marks_once() {
        let (mut engine, mut doc, t0) = setup();
        let profile = engine.profile().clone();
        let row = add_row(&mut doc, &profile, MINT);

        engine.annotate(&view(MINT, "#ff0000"), t0);
        engine.annotate(&view(MINT, "#ff0000"), t0 + ms(100));
        assert_eq!(engine.next_deadline(), Some(t0 + ms(300)));

        engine.poll(&mut doc, t0 + ms(299));
        assert!(find_marker(&doc, row).is_none());

        engine.poll(&mut doc, t0 + ms(300));
        assert!(find_marker(&doc, row).is_some());
        assert!(engine.is_resolved(&Identifier::new(MINT).unwrap()));
        assert_eq!(engine.stats().scans, 1);
        assert_eq!(engine.stats().markers_created, 1);
    }

    #[test]
    fn test_retry_budget_exhausts() {
        let (mut engine, mut doc, t0) = setup();
        let id = Identifier::new(MINT).unwrap();
        engine.load_known(&mut doc, &[view(MINT, "#ff0000")], t0);
        assert!(engine.is_pending(&id));

        let mut now = t0;
        for _ in 1..10 {
            now += ms(500);
            engine.poll(&mut doc, now);
        }
        assert!(!engine.is_pending(&id));
        assert_eq!(engine.stats().exhausted, 1);
        assert_eq!(engine.stats().scans, 10);
    }

    #[test]
    fn test_success_cancels_retry() {
        let (mut engine, mut doc, t0) = setup();
        let profile = engine.profile().clone();
        engine.load_known(&mut doc, &[view(MINT, "#ff0000")], t0);
        assert_eq!(engine.next_deadline(), Some(t0 + ms(500)));

        add_row(&mut doc, &profile, MINT);
        engine.poll(&mut doc, t0 + ms(500));

        assert_eq!(engine.pending_count(), 0);
        assert_eq!(engine.next_deadline(), Some(t0 + ms(1000)));
    }

    #[test]
    fn test_reactive_scans_do_not_consume_retries() {
        let (mut engine, mut doc, t0) = setup();
        let profile = engine.profile().clone();
        let id = Identifier::new(MINT).unwrap();
        engine.load_known(&mut doc, &[view(MINT, "#ff0000")], t0);

        for i in 0..50 {
            engine.on_lifecycle(&mut doc, LifecycleEvent::Focus, t0 + ms(10 + i));
        }
        assert!(engine.is_pending(&id));

        add_row(&mut doc, &profile, MINT);
        engine.on_lifecycle(&mut doc, LifecycleEvent::Visible, t0 + ms(100));
        assert!(engine.is_resolved(&id));
    }

    #[test]
    fn test_row_added_triggers_mutation_debounce() {
        let (mut engine, mut doc, t0) = setup();
        let profile = engine.profile().clone();
        engine.load_known(&mut doc, &[view(MINT, "#ff0000")], t0);
        doc.take_mutations();

        let row = add_row(&mut doc, &profile, MINT);
        let records = doc.take_mutations();
        engine.on_mutations(&doc, &records, t0 + ms(10));
        engine.on_mutations(&doc, &records, t0 + ms(60));
        assert_eq!(engine.next_deadline(), Some(t0 + ms(160)));

        engine.poll(&mut doc, t0 + ms(160));
        assert!(find_marker(&doc, row).is_some());
    }

    #[test]
    fn test_marker_insertion_is_not_relevant_mutation() {
        let (mut engine, mut doc, t0) = setup();
        let profile = engine.profile().clone();
        add_row(&mut doc, &profile, MINT);
        doc.take_mutations();

        engine.load_known(&mut doc, &[view(MINT, "#ff0000")], t0);
        let records = doc.take_mutations();
        assert_eq!(records.len(), 1);
        engine.on_mutations(&doc, &records, t0);
        assert_eq!(engine.next_deadline(), Some(t0 + ms(1000)));
    }

    #[test]
    fn test_recycled_row_remarked_without_retries() {
        let (mut engine, mut doc, t0) = setup();
        let profile = engine.profile().clone();
        let id = Identifier::new(MINT).unwrap();
        let first = add_row(&mut doc, &profile, MINT);
        engine.load_known(&mut doc, &[view(MINT, "#ff0000")], t0);
        assert_eq!(engine.rows_for(&id), &[first]);

        doc.remove(first).unwrap();
        let second = add_row(&mut doc, &profile, MINT);
        let records = doc.take_mutations();
        engine.on_mutations(&doc, &records, t0 + ms(5_000));
        engine.poll(&mut doc, t0 + ms(5_100));

        assert_eq!(engine.rows_for(&id), &[second]);
        assert!(find_marker(&doc, second).is_some());
        assert_eq!(engine.stats().resolved, 1);
        assert_eq!(engine.stats().markers_created, 2);
    }

    #[test]
    fn test_scan_follows_recycled_rows_across_many_resolved() {
        let (mut engine, mut doc, t0) = setup();
        let profile = engine.profile().clone();
        let mints: Vec<String> = (0..300).map(|i| format!("{i:0>4}{}", &MINT[4..])).collect();
        let views: Vec<AnnotationView> = mints.iter().map(|m| view(m, "#ff0000")).collect();
        let rows: Vec<NodeId> = mints.iter().map(|m| add_row(&mut doc, &profile, m)).collect();
        engine.load_known(&mut doc, &views, t0);
        assert_eq!(engine.stats().resolved, 300);
        assert_eq!(engine.stats().markers_created, 300);

        for row in rows {
            doc.remove(row).unwrap();
        }
        let recycled: Vec<NodeId> = mints[..5]
            .iter()
            .map(|m| add_row(&mut doc, &profile, m))
            .collect();
        for i in 0..95 {
            add_row(&mut doc, &profile, &format!("{i:0>4}{}", &MINT[..40]));
        }
        engine.on_lifecycle(&mut doc, LifecycleEvent::Visible, t0 + ms(1_000));

        let first = Identifier::new(mints[0].as_str()).unwrap();
        let gone = Identifier::new(mints[200].as_str()).unwrap();
        assert_eq!(engine.rows_for(&first), &[recycled[0]]);
        assert!(engine.rows_for(&gone).is_empty());
        assert!(engine.is_resolved(&gone));
        assert_eq!(engine.stats().markers_created, 305);

        engine.on_lifecycle(&mut doc, LifecycleEvent::Focus, t0 + ms(2_000));
        assert_eq!(engine.stats().markers_created, 305);
        assert_eq!(engine.stats().markers_updated, 0);
        assert_eq!(engine.stats().scans, 3);
    }

    #[test]
    fn test_color_change_updates_in_place() {
        let (mut engine, mut doc, t0) = setup();
        let profile = engine.profile().clone();
        let row = add_row(&mut doc, &profile, MINT);
        engine.load_known(&mut doc, &[view(MINT, "#ff0000")], t0);

        engine.annotate(&view(MINT, "#00ff00"), t0 + ms(10));
        engine.poll(&mut doc, t0 + ms(310));

        let marker = find_marker(&doc, row).unwrap();
        assert_eq!(doc.get(marker).unwrap().style("color"), Some("#00ff00"));
        assert_eq!(engine.stats().markers_updated, 1);
    }

    #[test]
    fn test_anchor_missing_counts_as_unresolved() {
        let (mut engine, mut doc, t0) = setup();
        let profile = engine.profile().clone();
        let row = doc
            .append_element(doc.root(), "div", &profile.row_classes.join(" "))
            .unwrap();
        let link = doc.append_element(row, "a", "").unwrap();
        doc.set_attribute(link, "href", &format!("/meme/{MINT}")).unwrap();

        engine.load_known(&mut doc, &[view(MINT, "#ff0000")], t0);
        assert!(engine.is_pending(&Identifier::new(MINT).unwrap()));

        doc.append_element(row, "span", &profile.anchor.classes.join(" ")).unwrap();
        engine.poll(&mut doc, t0 + ms(500));
        assert!(engine.is_resolved(&Identifier::new(MINT).unwrap()));
    }

    #[test]
    fn test_scroll_throttled_and_debounced() {
        let (mut engine, mut doc, t0) = setup();
        engine.observe_at = None;

        engine.on_scroll(t0);
        engine.on_scroll(t0 + ms(100));
        assert_eq!(engine.next_deadline(), Some(t0 + ms(300)));

        engine.on_scroll(t0 + ms(400));
        assert_eq!(engine.next_deadline(), Some(t0 + ms(700)));

        engine.poll(&mut doc, t0 + ms(700));
        assert_eq!(engine.scan_at, Some(t0 + ms(1_000)));
    }

    #[test]
    fn test_rows_observed_once() {
        let (mut engine, mut doc, t0) = setup();
        let profile = engine.profile().clone();
        let a = add_row(&mut doc, &profile, MINT);
        engine.poll(&mut doc, t0 + ms(1_000));
        assert_eq!(engine.take_observe_requests(), vec![a]);

        let b = add_row(&mut doc, &profile, "otherMint");
        let records = doc.take_mutations();
        engine.on_mutations(&doc, &records, t0 + ms(1_100));
        engine.poll(&mut doc, t0 + ms(1_200));
        engine.poll(&mut doc, t0 + ms(2_200));
        assert_eq!(engine.take_observe_requests(), vec![b]);
    }

    #[test]
    fn test_intersection_of_unmarked_row_requests_scan() {
        let (mut engine, mut doc, t0) = setup();
        let profile = engine.profile().clone();
        let row = add_row(&mut doc, &profile, "otherMint");
        engine.load_known(&mut doc, &[view(MINT, "#ff0000")], t0);
        engine.poll(&mut doc, t0 + ms(1_000));

        engine.on_intersection(&doc, &[row], t0 + ms(1_050));
        assert_eq!(engine.scan_at, Some(t0 + ms(1_350)));
    }
}
