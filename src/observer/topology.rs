use std::fmt;

use chrono::{DateTime, Utc};
use hashbrown::{HashMap, HashSet};
use tracing::{debug, trace};

use super::{addr::PeerAddr, error::Error, ring::Identifier, wire::NodeDescriptor};

/// The last reported state of one node. A newer snapshot for the same address
/// replaces it whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSnapshot {
    /// Address of the node's data channel.
    pub primary: PeerAddr,
    /// Address the node serves observation channels on.
    pub observation: PeerAddr,
    pub identifier: Identifier,
    /// Always 32 characters.
    pub hex_identifier: String,
    pub owned_entries: u64,
    pub held_entries: u64,
    pub activity: NodeActivity,
}

/// When the node last rerouted, synchronized and migrated, as it reports it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeActivity {
    pub last_reroute: Option<DateTime<Utc>>,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_migrate: Option<DateTime<Utc>>,
}

impl NodeSnapshot {
    pub fn from_descriptor(descriptor: &NodeDescriptor) -> Result<Self, Error> {
        let primary = PeerAddr::parse(&descriptor.addr)?;
        let observation = primary.observation()?;
        let identifier = Identifier::from_base64(&descriptor.pos)?;
        Ok(Self {
            primary,
            observation,
            identifier,
            hex_identifier: identifier.to_hex(),
            owned_entries: descriptor.owned_entries,
            held_entries: descriptor.held_entries,
            activity: NodeActivity {
                last_reroute: reported(descriptor.last_reroute),
                last_sync: reported(descriptor.last_sync),
                last_migrate: reported(descriptor.last_migrate),
            },
        })
    }
}

/// Nodes that never did something report the epoch (or the zero time).
fn reported(at: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    at.filter(|at| at.timestamp() > 0)
}

impl fmt::Display for NodeSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}@{}]", self.hex_identifier, self.primary)
    }
}

/// A peer listed in some node's membership view.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Discovered {
    pub primary: PeerAddr,
    pub observation: PeerAddr,
}

impl Discovered {
    pub fn from_descriptor(descriptor: &NodeDescriptor) -> Result<Self, Error> {
        let primary = PeerAddr::parse(&descriptor.addr)?;
        let observation = primary.observation()?;
        Ok(Self {
            primary,
            observation,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopologyEntry {
    pub snapshot: NodeSnapshot,
    /// Observation channels currently reporting this node. The entry lives
    /// as long as one of them does.
    pub sources: HashSet<PeerAddr>,
    /// Wall clock time of the last notification carrying this snapshot, equal
    /// or not.
    pub last_seen: DateTime<Utc>,
}

/// A pair of monotonically increasing stamps: `update` moves whenever the
/// guarded state changes, `render` catches up once the renderer confirms it
/// has drawn a frame carrying that update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Staleness {
    update: u64,
    render: u64,
}

impl Staleness {
    pub fn bump(&mut self) {
        self.update += 1;
    }

    /// Records that the renderer has drawn everything up to `version`.
    /// Older acknowledgements never move the stamp back.
    pub fn mark_rendered(&mut self, version: u64) {
        self.render = self.render.max(version.min(self.update));
    }

    pub fn is_stale(&self) -> bool {
        self.update > self.render
    }

    pub fn last_update(&self) -> u64 {
        self.update
    }
}

/// Last known snapshot per observation address, plus the selected node.
#[derive(Debug, Default)]
pub struct TopologyView {
    entries: HashMap<PeerAddr, TopologyEntry>,
    selected: Option<PeerAddr>,
    seen_any: bool,
    routes: Staleness,
    meta: Staleness,
}

impl TopologyView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `snapshot` as reported over the channel at `source` and returns
    /// the listed peers this view has no entry for yet, deduplicated, in the
    /// order they were listed.
    pub fn apply_snapshot(
        &mut self,
        source: &PeerAddr,
        snapshot: NodeSnapshot,
        peers: &[Discovered],
    ) -> Vec<Discovered> {
        let now = Utc::now();
        let key = snapshot.observation.clone();

        // a channel speaks for one node; if it used to report under another
        // address it no longer vouches for that entry
        let moved: Vec<PeerAddr> = self
            .entries
            .iter()
            .filter(|(addr, entry)| **addr != key && entry.sources.contains(source))
            .map(|(addr, _)| addr.clone())
            .collect();
        for addr in moved {
            debug!(%source, old = %addr, new = %key, "channel now reports a different node");
            self.release(&addr, source);
        }

        match self.entries.get_mut(&key) {
            Some(entry) if entry.snapshot == snapshot => {
                trace!(node = %snapshot, "snapshot unchanged");
                entry.last_seen = now;
                entry.sources.insert(source.clone());
            }
            Some(entry) => {
                debug!(node = %snapshot, owned = snapshot.owned_entries, held = snapshot.held_entries, "snapshot changed");
                entry.snapshot = snapshot;
                entry.last_seen = now;
                entry.sources.insert(source.clone());
                self.bump_routes(&key);
            }
            None => {
                debug!(node = %snapshot, owned = snapshot.owned_entries, held = snapshot.held_entries, "new node");
                let mut sources = HashSet::new();
                sources.insert(source.clone());
                self.entries.insert(
                    key.clone(),
                    TopologyEntry {
                        snapshot,
                        sources,
                        last_seen: now,
                    },
                );
                self.bump_routes(&key);
            }
        }

        if !self.seen_any {
            self.seen_any = true;
            self.selected = Some(key);
            self.meta.bump();
        }

        let mut listed = HashSet::new();
        peers
            .iter()
            .filter(|peer| !self.entries.contains_key(&peer.observation))
            .filter(|peer| listed.insert(peer.observation.clone()))
            .cloned()
            .collect()
    }

    fn bump_routes(&mut self, changed: &PeerAddr) {
        self.routes.bump();
        if self.selected.as_ref() == Some(changed) {
            self.meta.bump();
        }
    }

    /// Drops `source` from the entry at `addr` and evicts the entry once no
    /// channel reports it any more.
    fn release(&mut self, addr: &PeerAddr, source: &PeerAddr) -> Option<NodeSnapshot> {
        let entry = self.entries.get_mut(addr)?;
        entry.sources.remove(source);
        if !entry.sources.is_empty() {
            return None;
        }
        self.evict(addr)
    }

    /// Removes the entry at `addr`, clearing the selection if it pointed
    /// there.
    pub fn evict(&mut self, addr: &PeerAddr) -> Option<NodeSnapshot> {
        let entry = self.entries.remove(addr)?;
        self.routes.bump();
        if self.selected.as_ref() == Some(addr) {
            self.selected = None;
            self.meta.bump();
        }
        Some(entry.snapshot)
    }

    /// Forgets the channel at `source` and removes every entry no other
    /// channel still reports.
    pub fn evict_source(&mut self, source: &PeerAddr) -> Vec<NodeSnapshot> {
        let addrs: Vec<PeerAddr> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.sources.contains(source))
            .map(|(addr, _)| addr.clone())
            .collect();
        addrs
            .iter()
            .filter_map(|addr| self.release(addr, source))
            .collect()
    }

    /// Points the detail panel at `addr`. Unknown addresses leave the
    /// selection as it is.
    pub fn select_node(&mut self, addr: &PeerAddr) -> bool {
        if !self.entries.contains_key(addr) {
            return false;
        }
        self.selected = Some(addr.clone());
        self.meta.bump();
        true
    }

    pub fn selected(&self) -> Option<&NodeSnapshot> {
        self.selected
            .as_ref()
            .and_then(|addr| self.entries.get(addr))
            .map(|entry| &entry.snapshot)
    }

    pub fn contains(&self, addr: &PeerAddr) -> bool {
        self.entries.contains_key(addr)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sorted by identifier, ties broken by address.
    pub fn ring_order(&self) -> Vec<(&PeerAddr, &TopologyEntry)> {
        let mut entries: Vec<_> = self.entries.iter().collect();
        entries.sort_by(|(a_addr, a), (b_addr, b)| {
            a.snapshot
                .identifier
                .cmp(&b.snapshot.identifier)
                .then_with(|| a_addr.cmp(b_addr))
        });
        entries
    }

    pub fn routes(&self) -> Staleness {
        self.routes
    }

    pub fn meta(&self) -> Staleness {
        self.meta
    }

    pub fn mark_routes_rendered(&mut self, version: u64) {
        self.routes.mark_rendered(version);
    }

    pub fn mark_meta_rendered(&mut self, version: u64) {
        self.meta.mark_rendered(version);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn addr(s: &str) -> PeerAddr {
        PeerAddr::parse(s).unwrap()
    }

    fn snapshot(primary: &str, pos: u128, owned: u64) -> NodeSnapshot {
        let primary = addr(primary);
        let identifier = Identifier::from_value(pos);
        NodeSnapshot {
            observation: primary.observation().unwrap(),
            primary,
            identifier,
            hex_identifier: identifier.to_hex(),
            owned_entries: owned,
            held_entries: owned,
            activity: NodeActivity::default(),
        }
    }

    fn discovered(primary: &str) -> Discovered {
        let primary = addr(primary);
        Discovered {
            observation: primary.observation().unwrap(),
            primary,
        }
    }

    #[test]
    fn first_snapshot_becomes_selected() {
        let mut view = TopologyView::new();
        let source = addr("10.0.0.1:9001");
        view.apply_snapshot(&source, snapshot("10.0.0.1:9000", 1, 3), &[]);
        assert_eq!(view.selected().unwrap().observation, source);
        assert!(view.routes().is_stale());
        assert!(view.meta().is_stale());

        // later nodes do not steal the selection
        let other = addr("10.0.0.2:9001");
        view.apply_snapshot(&other, snapshot("10.0.0.2:9000", 2, 0), &[]);
        assert_eq!(view.selected().unwrap().observation, source);
    }

    #[test]
    fn unchanged_snapshot_does_not_bump() {
        let mut view = TopologyView::new();
        let source = addr("10.0.0.1:9001");
        view.apply_snapshot(&source, snapshot("10.0.0.1:9000", 1, 3), &[]);
        view.mark_routes_rendered(view.routes().last_update());
        view.mark_meta_rendered(view.meta().last_update());
        let before = view.routes().last_update();

        view.apply_snapshot(&source, snapshot("10.0.0.1:9000", 1, 3), &[]);
        assert_eq!(view.routes().last_update(), before);
        assert!(!view.routes().is_stale());

        view.apply_snapshot(&source, snapshot("10.0.0.1:9000", 1, 4), &[]);
        assert!(view.routes().last_update() > before);
        assert!(view.routes().is_stale());
        // the selected node changed, so the detail panel is stale too
        assert!(view.meta().is_stale());
        assert_eq!(view.len(), 1);
    }

    #[test]
    fn returns_only_unknown_peers() {
        let mut view = TopologyView::new();
        view.apply_snapshot(&addr("10.0.0.1:9001"), snapshot("10.0.0.1:9000", 1, 0), &[]);

        let peers = [
            discovered("10.0.0.1:9000"),
            discovered("10.0.0.2:9000"),
            discovered("10.0.0.3:9000"),
            discovered("10.0.0.2:9000"),
        ];
        let new = view.apply_snapshot(&addr("10.0.0.1:9001"), snapshot("10.0.0.1:9000", 1, 0), &peers);
        let observed: Vec<String> = new.iter().map(|d| d.observation.to_string()).collect();
        assert_eq!(observed, ["10.0.0.2:9001", "10.0.0.3:9001"]);
    }

    #[test]
    fn eviction_clears_selection() {
        let mut view = TopologyView::new();
        let source = addr("10.0.0.1:9001");
        view.apply_snapshot(&source, snapshot("10.0.0.1:9000", 1, 0), &[]);
        view.mark_meta_rendered(view.meta().last_update());

        let evicted = view.evict_source(&source);
        assert_eq!(evicted.len(), 1);
        assert!(view.selected().is_none());
        assert!(view.meta().is_stale());
        assert!(view.is_empty());

        // a later node is not auto-selected: only the very first one is
        view.apply_snapshot(&addr("10.0.0.2:9001"), snapshot("10.0.0.2:9000", 2, 0), &[]);
        assert!(view.selected().is_none());
    }

    #[test]
    fn select_node_requires_known_address() {
        let mut view = TopologyView::new();
        view.apply_snapshot(&addr("10.0.0.1:9001"), snapshot("10.0.0.1:9000", 1, 0), &[]);
        view.apply_snapshot(&addr("10.0.0.2:9001"), snapshot("10.0.0.2:9000", 2, 0), &[]);
        view.mark_meta_rendered(view.meta().last_update());

        assert!(!view.select_node(&addr("10.0.0.9:9001")));
        assert!(!view.meta().is_stale());

        assert!(view.select_node(&addr("10.0.0.2:9001")));
        assert_eq!(view.selected().unwrap().primary, addr("10.0.0.2:9000"));
        assert!(view.meta().is_stale());
    }

    #[test]
    fn channel_reporting_a_new_address_replaces_its_entry() {
        let mut view = TopologyView::new();
        let source = addr("10.0.0.1:9001");
        view.apply_snapshot(&source, snapshot("10.0.0.1:9000", 1, 0), &[]);
        view.apply_snapshot(&source, snapshot("10.0.0.1:7000", 1, 0), &[]);
        assert_eq!(view.len(), 1);
        assert!(view.contains(&addr("10.0.0.1:7001")));
    }

    #[test]
    fn entry_outlives_one_of_two_sources() {
        let mut view = TopologyView::new();
        let seed = addr("10.0.0.1:9000");
        let direct = addr("10.0.0.1:9001");
        view.apply_snapshot(&seed, snapshot("10.0.0.1:9000", 1, 0), &[]);
        view.apply_snapshot(&direct, snapshot("10.0.0.1:9000", 1, 0), &[]);
        assert_eq!(view.len(), 1);

        assert!(view.evict_source(&direct).is_empty());
        assert!(view.contains(&direct));

        // the remaining channel moving on to another node releases it
        view.apply_snapshot(&seed, snapshot("10.0.0.5:9000", 5, 0), &[]);
        assert!(!view.contains(&direct));
        assert!(view.contains(&addr("10.0.0.5:9001")));
    }

    #[test]
    fn changed_snapshot_keeps_earlier_sources() {
        let mut view = TopologyView::new();
        let seed = addr("10.0.0.1:9000");
        let direct = addr("10.0.0.1:9001");
        view.apply_snapshot(&seed, snapshot("10.0.0.1:9000", 1, 0), &[]);
        view.apply_snapshot(&direct, snapshot("10.0.0.1:9000", 1, 7), &[]);

        view.evict_source(&direct);
        assert_eq!(view.selected().unwrap().owned_entries, 7);
        assert_eq!(view.evict_source(&seed).len(), 1);
        assert!(view.is_empty());
    }

    #[test]
    fn render_stamp_follows_acknowledgements() {
        let mut view = TopologyView::new();
        let source = addr("10.0.0.1:9001");
        view.apply_snapshot(&source, snapshot("10.0.0.1:9000", 1, 0), &[]);
        let drawn = view.routes().last_update();

        // a change lands before the renderer confirms the earlier frame
        view.apply_snapshot(&source, snapshot("10.0.0.1:9000", 1, 1), &[]);
        view.mark_routes_rendered(drawn);
        assert!(view.routes().is_stale());

        view.mark_routes_rendered(view.routes().last_update());
        assert!(!view.routes().is_stale());

        // late or bogus versions change nothing
        view.mark_routes_rendered(drawn);
        view.mark_routes_rendered(u64::MAX);
        assert!(!view.routes().is_stale());
        view.apply_snapshot(&source, snapshot("10.0.0.1:9000", 1, 2), &[]);
        assert!(view.routes().is_stale());
    }

    #[test]
    fn ring_order_sorts_by_identifier() {
        let mut view = TopologyView::new();
        view.apply_snapshot(&addr("10.0.0.3:9001"), snapshot("10.0.0.3:9000", 30, 0), &[]);
        view.apply_snapshot(&addr("10.0.0.1:9001"), snapshot("10.0.0.1:9000", 10, 0), &[]);
        view.apply_snapshot(&addr("10.0.0.2:9001"), snapshot("10.0.0.2:9000", 20, 0), &[]);
        let order: Vec<u128> = view
            .ring_order()
            .iter()
            .map(|(_, entry)| entry.snapshot.identifier.value())
            .collect();
        assert_eq!(order, [10, 20, 30]);
    }

    #[test]
    fn descriptor_conversion() {
        let descriptor = NodeDescriptor {
            addr: "localhost:9000".into(),
            pos: Identifier::from_value(0xff).to_base64(),
            owned_entries: 3,
            held_entries: 5,
            last_reroute: None,
            last_sync: Utc.timestamp_opt(0, 0).single(),
            last_migrate: None,
        };
        let snapshot = NodeSnapshot::from_descriptor(&descriptor).unwrap();
        assert_eq!(snapshot.observation.to_string(), "127.0.0.1:9001");
        assert_eq!(snapshot.hex_identifier.len(), 32);
        assert!(snapshot.activity.last_sync.is_none());
        assert_eq!(
            snapshot.to_string(),
            "[000000000000000000000000000000ff@127.0.0.1:9000]"
        );

        let bad = NodeDescriptor {
            addr: "nowhere".into(),
            ..descriptor.clone()
        };
        assert!(matches!(
            NodeSnapshot::from_descriptor(&bad),
            Err(Error::InvalidAddress(_))
        ));
        let narrow = NodeDescriptor {
            pos: "AAAA".into(),
            ..descriptor
        };
        assert!(matches!(
            NodeSnapshot::from_descriptor(&narrow),
            Err(Error::IdentifierWidth(3))
        ));
    }
}
