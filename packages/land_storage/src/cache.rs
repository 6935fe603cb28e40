//! Short-lived memo of land fetched during one storage operation.

use crate::{
    land::{
        CellLocation,
        LandObject,
    },
    source::LandSource,
};
use std::{
    collections::HashMap,
    sync::Arc,
};
use anyhow::Result;


/// Land fetched so far by one storage operation, including cells known to have
/// no land.
///
/// Access patterns during a fill are highly local, so the most recent lookup is
/// remembered separately from the map and checked first.
///
/// Never kept across operations: create one per call and drop it afterwards.
#[derive(Debug, Default)]
pub struct LandCache {
    cells: HashMap<CellLocation, Option<Arc<LandObject>>>,
    last: Option<(CellLocation, Option<Arc<LandObject>>)>,
}

impl LandCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a cell's land, fetching it from `source` only if this cache has
    /// never seen the cell. A failed fetch is not remembered.
    pub fn get_land(
        &mut self,
        source: &dyn LandSource,
        location: CellLocation,
    ) -> Result<Option<Arc<LandObject>>> {
        if let Some((last_location, land)) = &self.last {
            if *last_location == location {
                return Ok(land.clone());
            }
        }

        let land = match self.cells.get(&location) {
            Some(land) => land.clone(),
            None => {
                trace!(?location, "land cache miss");
                let land = source.fetch_cell(location)?;
                self.cells.insert(location, land.clone());
                land
            }
        };
        self.last = Some((location, land.clone()));
        Ok(land)
    }

    /// Number of distinct cells looked up so far.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}


#[test]
fn test_fetches_each_cell_once() {
    use crate::{
        land::{LandData, DataTypes, Worldspace, LAND_SIZE},
        source::MemoryLandSource,
    };

    let a = CellLocation::new(0, 0, Worldspace::DEFAULT);
    let b = CellLocation::new(1, 0, Worldspace::DEFAULT);
    let mut source = MemoryLandSource::new();
    source.insert_cell(a, LandObject::new(LandData::new(LAND_SIZE), DataTypes::empty(), 0).unwrap());

    let mut cache = LandCache::new();
    for &location in &[a, a, b, a, b, b, a] {
        let land = cache.get_land(&source, location).unwrap();
        assert_eq!(land.is_some(), location == a);
    }
    assert_eq!(source.fetch_count(), 2);
    assert_eq!(cache.len(), 2);
}

#[test]
fn test_failed_fetch_not_cached() {
    use crate::{
        land::Worldspace,
        source::MemoryLandSource,
    };

    let a = CellLocation::new(5, 5, Worldspace::DEFAULT);
    let mut source = MemoryLandSource::new();
    source.fail_cell(a);

    let mut cache = LandCache::new();
    assert!(cache.get_land(&source, a).is_err());
    assert!(cache.get_land(&source, a).is_err());
    assert_eq!(source.fetch_count(), 2);
    assert!(cache.is_empty());
}
