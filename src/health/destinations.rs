//! Destination ↔ reverse destination prefix audit.

use super::{add_finding, into_lists, Findings, HealthArgs, HealthCache, IndexHealth, ReverseDestinationsIHReply};
use crate::error::Result;
use crate::keys::{DESTINATION_PREFIX, REVERSE_DESTINATION_PREFIX};
use crate::types::Destination;
use tracing::info;

impl IndexHealth<'_> {
    pub fn get_reverse_destinations_index_health(&self, args: &HealthArgs) -> Result<ReverseDestinationsIHReply> {
        let destinations: HealthCache<Destination> = HealthCache::new(&args.object_cache);
        let reverse: HealthCache<Vec<String>> = HealthCache::new(&args.index_cache);
        let mut broken = Findings::new();
        let mut missing = Findings::new();

        // reverse entry → destination must own the prefix
        for prefix in self.ids_for_prefix(REVERSE_DESTINATION_PREFIX)? {
            let Some(dest_ids) = reverse.get_or_load(&prefix, || self.store.get_reverse_destination(&prefix))? else {
                continue;
            };
            for dest_id in dest_ids.iter() {
                match destinations.get_or_load(dest_id, || self.store.get_destination(dest_id))? {
                    None => {
                        broken.entry(dest_id.clone()).or_default();
                    }
                    Some(dest) if !dest.prefixes.contains(&prefix) => {
                        add_finding(&mut broken, dest_id.clone(), prefix.as_str());
                    }
                    Some(_) => {}
                }
            }
        }

        // destination prefix → reverse entry must list the destination
        for dest_id in self.ids_for_prefix(DESTINATION_PREFIX)? {
            let Some(dest) = destinations.get_or_load(&dest_id, || self.store.get_destination(&dest_id))? else {
                continue;
            };
            for prefix in &dest.prefixes {
                let listed = reverse
                    .get_or_load(prefix, || self.store.get_reverse_destination(prefix))?
                    .is_some_and(|ids| ids.contains(&dest_id));
                if !listed {
                    add_finding(&mut missing, prefix.clone(), dest_id.as_str());
                }
            }
        }

        info!(
            missing = missing.len(),
            broken = broken.len(),
            "reverse destination index health checked"
        );
        Ok(ReverseDestinationsIHReply {
            missing_reverse_destinations: into_lists(missing),
            broken_references: into_lists(broken),
        })
    }
}
