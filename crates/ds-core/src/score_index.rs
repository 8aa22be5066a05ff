//! Spatial+temporal score index (spec.md §4.C / §9 "native spatial index
//! (tiled hash...)").
//!
//! Rows are indexed twice: once in a coarse lat/long grid keyed by cell
//! (for candidate selection) and once by monotonic id (for the actual
//! data and for ordered/TTL scans). A query only ever touches the 3x3
//! neighborhood of cells around the query point, so lookup cost is
//! independent of the index's total size.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use ds_geo::{BoundingBox, Location};

type CellKey = (i64, i64);

struct Row {
    bbox: BoundingBox,
    location: Location,
    user_id: String,
    score: i64,
    inserted_at: Instant,
}

pub struct ScoreIndex {
    cell_size_deg: f64,
    search_radius_m: f64,
    ttl: Duration,
    /// Allow a lookup to return the caller's own entries once they are
    /// older than one hour. Set from `scoresd --allow-same-user`.
    pub allow_same_user: bool,
    /// When true, candidate scan order is newest-first by id; when
    /// false, scan order is index-internal (unordered) and cheaper.
    pub ordered_lookup: bool,
    cells: HashMap<CellKey, Vec<u64>>,
    rows: HashMap<u64, Row>,
    next_id: u64,
}

const SAME_USER_GRACE: Duration = Duration::from_secs(3600);

impl ScoreIndex {
    pub fn new(search_radius_m: f64, ttl: Duration) -> Self {
        let cell_size_deg = (search_radius_m / ds_geo::EARTH_RADIUS_M).to_degrees();
        Self {
            cell_size_deg: cell_size_deg.max(1e-9),
            search_radius_m,
            ttl,
            allow_same_user: false,
            ordered_lookup: true,
            cells: HashMap::new(),
            rows: HashMap::new(),
            next_id: 0,
        }
    }

    fn cell_of(&self, location: &Location) -> CellKey {
        (
            (location.lat / self.cell_size_deg).floor() as i64,
            (location.long / self.cell_size_deg).floor() as i64,
        )
    }

    fn neighborhood(&self, location: &Location) -> impl Iterator<Item = CellKey> {
        let (cy, cx) = self.cell_of(location);
        (-1..=1).flat_map(move |dy| (-1..=1).map(move |dx| (cy + dy, cx + dx)))
    }

    /// Insert `(location, user_id, score)`, returning the assigned id.
    pub fn insert(&mut self, location: Location, user_id: impl Into<String>, score: i64) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        let bbox = location.bounding_box(self.search_radius_m);
        let row = Row {
            bbox,
            location,
            user_id: user_id.into(),
            score,
            inserted_at: Instant::now(),
        };
        self.cells.entry(self.cell_of(&location)).or_default().push(id);
        self.rows.insert(id, row);
        id
    }

    /// Scan boxes containing `point`, excluding `caller_user_id` (unless
    /// testing mode allows stale same-user entries), deduplicated by
    /// user_id with first-wins-in-scan-order semantics.
    pub fn lookup(&self, point: Location, caller_user_id: &str) -> Vec<(Location, i64)> {
        let mut candidate_ids: Vec<u64> = self
            .neighborhood(&point)
            .filter_map(|cell| self.cells.get(&cell))
            .flatten()
            .copied()
            .collect();
        candidate_ids.sort_unstable();
        candidate_ids.dedup();

        if self.ordered_lookup {
            candidate_ids.sort_unstable_by(|a, b| b.cmp(a));
        }

        let mut seen_users = std::collections::HashSet::new();
        let mut out = Vec::new();
        for id in candidate_ids {
            let Some(row) = self.rows.get(&id) else { continue };
            if !row.bbox.contains(&point) {
                continue;
            }
            if row.user_id == caller_user_id {
                let stale_enough = row.inserted_at.elapsed() > SAME_USER_GRACE;
                if !(self.allow_same_user && stale_enough) {
                    continue;
                }
            }
            if !seen_users.insert(row.user_id.clone()) {
                continue;
            }
            out.push((row.location, row.score));
        }
        out
    }

    /// Bulk-delete every row older than `ttl`.
    pub fn roll(&mut self) {
        let ttl = self.ttl;
        let expired: Vec<u64> = self
            .rows
            .iter()
            .filter(|(_, row)| row.inserted_at.elapsed() > ttl)
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            self.rows.remove(id);
        }
        if expired.is_empty() {
            return;
        }
        let expired: std::collections::HashSet<u64> = expired.into_iter().collect();
        self.cells.retain(|_, ids| {
            ids.retain(|id| !expired.contains(id));
            !ids.is_empty()
        });
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(lat: f64, long: f64) -> Location {
        Location::new(lat, long)
    }

    #[test]
    fn lookup_finds_nearby_entry_within_radius() {
        let mut idx = ScoreIndex::new(1000.0, Duration::from_secs(3600));
        idx.insert(loc(40.400, -3.700), "alice", 500);
        let hits = idx.lookup(loc(40.4005, -3.7005), "bob");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].1, 500);
    }

    #[test]
    fn lookup_excludes_far_entry() {
        let mut idx = ScoreIndex::new(100.0, Duration::from_secs(3600));
        idx.insert(loc(40.400, -3.700), "alice", 500);
        let hits = idx.lookup(loc(41.0, -4.0), "bob");
        assert!(hits.is_empty());
    }

    #[test]
    fn lookup_excludes_caller_own_entry_by_default() {
        let mut idx = ScoreIndex::new(1000.0, Duration::from_secs(3600));
        idx.insert(loc(40.400, -3.700), "alice", 500);
        let hits = idx.lookup(loc(40.400, -3.700), "alice");
        assert!(hits.is_empty());
    }

    #[test]
    fn lookup_dedupes_by_user_id_first_wins() {
        let mut idx = ScoreIndex::new(1000.0, Duration::from_secs(3600));
        idx.insert(loc(40.400, -3.700), "alice", 100);
        idx.insert(loc(40.4001, -3.7001), "alice", 200);
        let hits = idx.lookup(loc(40.400, -3.700), "bob");
        assert_eq!(hits.len(), 1);
        // ordered_lookup defaults to true: newest id (score 200) wins.
        assert_eq!(hits[0].1, 200);
    }

    #[test]
    fn roll_deletes_entries_older_than_ttl() {
        let mut idx = ScoreIndex::new(1000.0, Duration::from_millis(1));
        idx.insert(loc(40.400, -3.700), "alice", 500);
        std::thread::sleep(Duration::from_millis(5));
        idx.roll();
        assert!(idx.is_empty());
    }

    #[test]
    fn allow_same_user_requires_stale_entry() {
        let mut idx = ScoreIndex::new(1000.0, Duration::from_secs(3600));
        idx.allow_same_user = true;
        idx.insert(loc(40.400, -3.700), "alice", 500);
        // Fresh entry: still excluded even in testing mode.
        let hits = idx.lookup(loc(40.400, -3.700), "alice");
        assert!(hits.is_empty());
    }
}
