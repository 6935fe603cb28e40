//! Where land data comes from.

use crate::land::{
    CellLocation,
    LandObject,
    Worldspace,
    LAND_SIZE,
    CELL_SIZE,
};
use std::{
    collections::{
        HashMap,
        HashSet,
    },
    sync::Arc,
};
use parking_lot::Mutex;
use anyhow::{
    bail,
    Result,
};


/// Capabilities storage needs from a game data format.
///
/// Must be safe to call concurrently, since chunks are built on several
/// threads at once.
pub trait LandSource: Send + Sync {
    /// Get a cell's land. `Ok(None)` means the cell simply has none.
    fn fetch_cell(&self, location: CellLocation) -> Result<Option<Arc<LandObject>>>;

    /// Resolve an unbiased texture layer index, as defined by the given plugin,
    /// to a texture path.
    fn fetch_texture_layer_name(&self, index: u16, plugin: u32) -> Result<Option<String>>;

    /// Whether an asset exists at the given path.
    fn file_exists(&self, path: &str) -> bool;

    /// Vertices per side of a cell's land grid in the given worldspace.
    fn land_size(&self, _worldspace: Worldspace) -> usize {
        LAND_SIZE
    }

    /// World units per side of a cell in the given worldspace.
    fn cell_world_size(&self, _worldspace: Worldspace) -> f32 {
        CELL_SIZE
    }
}


/// Land source backed by plain in-memory maps.
///
/// Records cell fetches, and can be told to fail fetching specific cells.
#[derive(Debug, Default)]
pub struct MemoryLandSource {
    cells: HashMap<CellLocation, Arc<LandObject>>,
    texture_layers: HashMap<(u16, u32), String>,
    files: HashSet<String>,
    land_sizes: HashMap<Worldspace, (usize, f32)>,
    failing: HashSet<CellLocation>,
    fetched: Mutex<Vec<CellLocation>>,
}

impl MemoryLandSource {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn insert_cell(&mut self, location: CellLocation, land: LandObject) {
        self.cells.insert(location, Arc::new(land));
    }

    pub fn insert_texture_layer(&mut self, index: u16, plugin: u32, path: impl Into<String>) {
        self.texture_layers.insert((index, plugin), path.into());
    }

    pub fn insert_file(&mut self, path: impl Into<String>) {
        self.files.insert(path.into());
    }

    /// Override land grid geometry for a worldspace.
    pub fn set_worldspace_geometry(
        &mut self,
        worldspace: Worldspace,
        land_size: usize,
        cell_world_size: f32,
    ) {
        self.land_sizes.insert(worldspace, (land_size, cell_world_size));
    }

    /// Make fetching the given cell error.
    pub fn fail_cell(&mut self, location: CellLocation) {
        self.failing.insert(location);
    }

    /// Number of `fetch_cell` calls so far.
    pub fn fetch_count(&self) -> usize {
        self.fetched.lock().len()
    }

    /// Every location passed to `fetch_cell` so far, in call order.
    pub fn fetched(&self) -> Vec<CellLocation> {
        self.fetched.lock().clone()
    }
}

impl LandSource for MemoryLandSource {
    fn fetch_cell(&self, location: CellLocation) -> Result<Option<Arc<LandObject>>> {
        self.fetched.lock().push(location);
        if self.failing.contains(&location) {
            bail!("failed to load land for cell {:?}", location);
        }
        Ok(self.cells.get(&location).cloned())
    }

    fn fetch_texture_layer_name(&self, index: u16, plugin: u32) -> Result<Option<String>> {
        Ok(self.texture_layers.get(&(index, plugin)).cloned())
    }

    fn file_exists(&self, path: &str) -> bool {
        self.files.contains(path)
    }

    fn land_size(&self, worldspace: Worldspace) -> usize {
        self.land_sizes.get(&worldspace).map(|&(size, _)| size).unwrap_or(LAND_SIZE)
    }

    fn cell_world_size(&self, worldspace: Worldspace) -> f32 {
        self.land_sizes.get(&worldspace).map(|&(_, size)| size).unwrap_or(CELL_SIZE)
    }
}


#[test]
fn test_memory_source() {
    use crate::land::{LandData, DataTypes};

    let mut source = MemoryLandSource::new();
    let here = CellLocation::new(1, -2, Worldspace::DEFAULT);
    let broken = CellLocation::new(0, 0, Worldspace::DEFAULT);
    source.insert_cell(here, LandObject::new(LandData::new(LAND_SIZE), DataTypes::empty(), 0).unwrap());
    source.fail_cell(broken);
    source.set_worldspace_geometry(Worldspace(7), 33, 4096.0);

    assert!(source.fetch_cell(here).unwrap().is_some());
    assert!(source.fetch_cell(here.offset(1, 0)).unwrap().is_none());
    assert!(source.fetch_cell(broken).is_err());
    assert_eq!(source.fetch_count(), 3);
    assert_eq!(source.fetched()[2], broken);
    assert_eq!(source.land_size(Worldspace::DEFAULT), LAND_SIZE);
    assert_eq!(source.land_size(Worldspace(7)), 33);
    assert_eq!(source.cell_world_size(Worldspace(7)), 4096.0);
}
