//! Terrain chunk data built from per-cell land.
//!
//! The world is a grid of cells, each with its own land: a square grid of
//! heights, normals and vertex colours, plus a coarser grid of texture layer
//! indices. Land comes from a `LandSource`, one per game data format.
//! `Storage` turns it into what a terrain renderer wants per chunk: vertex
//! buffers at some level of detail, blend maps with the material layers they
//! blend, and height bounds and point heights.
//!
//! Missing land is never an error. Wherever a cell has none, the default
//! height, an up normal, white and the default texture stand in. Errors from
//! the land source itself are passed through untouched.

#[macro_use]
extern crate tracing;

mod land;
mod source;
mod cache;
mod layer;
mod settings;
mod storage;


pub use self::{
    land::{
        CellLocation,
        DataTypes,
        LandData,
        LandObject,
        UniqueTextureId,
        Worldspace,
        CELL_SIZE,
        DEFAULT_HEIGHT,
        LAND_SIZE,
        LAND_TEXTURE_SIZE,
    },
    source::{
        LandSource,
        MemoryLandSource,
    },
    cache::LandCache,
    layer::{
        LayerInfo,
        LayerInfoCache,
    },
    settings::{
        BlendmapPacking,
        TerrainSettings,
        SETTINGS_FILE_NAME,
    },
    storage::{
        Blendmaps,
        Storage,
        DEFAULT_TEXTURE,
    },
};


/// Route test logs through the test harness. `RUST_LOG` filters them.
#[cfg(test)]
pub(crate) fn init_test_logging() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[test]
fn test_storage_is_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Storage>();
    assert_send_sync::<MemoryLandSource>();
}
