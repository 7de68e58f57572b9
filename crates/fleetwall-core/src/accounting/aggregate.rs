// ── Per-owner aggregation ──

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::model::{ConnectionRecord, TrafficAggregate};

/// Bucket for connections no resolver could attribute.
pub const UNKNOWN_OWNER: &str = "unknown";

/// Maps a connection to the user or host that owns it.
pub trait OwnerResolver: Send + Sync {
    fn owner(&self, record: &ConnectionRecord) -> Option<String>;
}

/// Owner lookup by address, checking the local endpoint first.
#[derive(Debug, Clone, Default)]
pub struct AddressOwnerMap {
    owners: HashMap<String, String>,
}

impl AddressOwnerMap {
    pub fn new(owners: HashMap<String, String>) -> Self {
        Self { owners }
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

impl FromIterator<(String, String)> for AddressOwnerMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl OwnerResolver for AddressOwnerMap {
    fn owner(&self, record: &ConnectionRecord) -> Option<String> {
        if let Some(owner) = &record.owner {
            return Some(owner.clone());
        }
        self.owners
            .get(&record.local.address)
            .or_else(|| self.owners.get(&record.remote.address))
            .cloned()
    }
}

/// Fill in `owner` on each record the resolver knows.
pub fn attribute(records: &mut [ConnectionRecord], resolver: &dyn OwnerResolver) {
    for record in records {
        if record.owner.is_none() {
            record.owner = resolver.owner(record);
        }
    }
}

/// Fold records into one aggregate per owner, largest total first.
///
/// Unresolved connections land under [`UNKNOWN_OWNER`]. Ties keep a stable
/// order by owner name.
pub fn aggregate<I>(records: I, resolver: &dyn OwnerResolver) -> Vec<TrafficAggregate>
where
    I: IntoIterator<Item = ConnectionRecord>,
{
    let mut buckets: HashMap<String, (TrafficAggregate, HashSet<String>)> = HashMap::new();

    for record in records {
        let owner = resolver
            .owner(&record)
            .unwrap_or_else(|| UNKNOWN_OWNER.to_owned());
        let (agg, remotes) = buckets.entry(owner.clone()).or_insert_with(|| {
            (
                TrafficAggregate {
                    owner,
                    connections: 0,
                    bytes_in: 0,
                    bytes_out: 0,
                    protocols: BTreeSet::new(),
                    distinct_remotes: 0,
                },
                HashSet::new(),
            )
        });
        agg.connections += 1;
        agg.bytes_in = agg.bytes_in.saturating_add(record.bytes_in);
        agg.bytes_out = agg.bytes_out.saturating_add(record.bytes_out);
        agg.protocols.insert(record.protocol);
        remotes.insert(record.remote.address);
    }

    let mut out: Vec<TrafficAggregate> = buckets
        .into_values()
        .map(|(mut agg, remotes)| {
            agg.distinct_remotes = remotes.len();
            agg
        })
        .collect();
    out.sort_by(|a, b| {
        b.total_bytes()
            .cmp(&a.total_bytes())
            .then_with(|| a.owner.cmp(&b.owner))
    });
    out
}
