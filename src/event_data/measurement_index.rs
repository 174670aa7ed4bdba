use crate::types::{GeometryId, SourceLink};
use log::warn;
use std::collections::BTreeMap;

/// Source links keyed by the surface they were recorded on.
///
/// At most one link per surface. When the input holds several links for the
/// same surface the first one is kept.
#[derive(Clone, Debug, Default)]
pub struct MeasurementIndex {
    links: BTreeMap<GeometryId, SourceLink>,
}

impl MeasurementIndex {
    pub fn from_source_links<'a, I>(source_links: I) -> Self
    where
        I: IntoIterator<Item = &'a SourceLink>,
    {
        source_links.into_iter().copied().collect()
    }

    pub fn get(&self, geometry_id: GeometryId) -> Option<&SourceLink> {
        self.links.get(&geometry_id)
    }

    pub fn contains(&self, geometry_id: GeometryId) -> bool {
        self.links.contains_key(&geometry_id)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn geometry_ids(&self) -> impl Iterator<Item = GeometryId> + '_ {
        self.links.keys().copied()
    }
}

impl FromIterator<SourceLink> for MeasurementIndex {
    fn from_iter<I: IntoIterator<Item = SourceLink>>(iter: I) -> Self {
        let mut links: BTreeMap<GeometryId, SourceLink> = BTreeMap::new();
        for link in iter {
            if let Some(kept) = links.get(&link.geometry_id) {
                warn!(
                    "Dropping source link {} on {}: surface already has link {}",
                    link.index, link.geometry_id, kept.index
                );
                continue;
            }
            links.insert(link.geometry_id, link);
        }
        Self { links }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(layer: u64) -> GeometryId {
        GeometryId::default().with_volume(1).with_layer(layer)
    }

    #[test]
    fn test_first_link_wins() {
        let links = [
            SourceLink::new(id(2), 0),
            SourceLink::new(id(4), 1),
            SourceLink::new(id(2), 2),
        ];
        let index = MeasurementIndex::from_source_links(&links);

        assert_eq!(index.len(), 2);
        assert_eq!(index.get(id(2)).map(|l| l.index), Some(0));
        assert!(index.contains(id(4)));
        assert!(!index.contains(id(6)));
    }

    #[test]
    fn test_order_independent() {
        let forward = [SourceLink::new(id(2), 0), SourceLink::new(id(4), 1)];
        let reversed = [SourceLink::new(id(4), 1), SourceLink::new(id(2), 0)];

        let a: Vec<_> = MeasurementIndex::from_source_links(&forward).geometry_ids().collect();
        let b: Vec<_> = MeasurementIndex::from_source_links(&reversed).geometry_ids().collect();
        assert_eq!(a, b);
    }
}
