//! Per-cell land data and its load state.

use std::ops::BitOr;
use anyhow::{
    ensure,
    Result,
};
use vek::*;


/// Vertices per side of a cell's land grid in the default worldspace.
pub const LAND_SIZE: usize = 65;

/// Texels per side of a cell's texture-layer grid.
pub const LAND_TEXTURE_SIZE: usize = 16;

/// World units per side of a cell in the default worldspace.
pub const CELL_SIZE: f32 = 8192.0;

/// Height reported wherever no height data is loaded.
pub const DEFAULT_HEIGHT: f32 = -2048.0;


/// Bitmask of land attribute groups.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct DataTypes(pub u32);

impl DataTypes {
    pub const NORMALS: DataTypes = DataTypes(1);
    pub const HEIGHTS: DataTypes = DataTypes(2);
    /// World map heights. Never required by storage.
    pub const WNAM: DataTypes = DataTypes(4);
    pub const COLOURS: DataTypes = DataTypes(8);
    pub const TEXTURES: DataTypes = DataTypes(16);

    pub fn empty() -> Self {
        DataTypes(0)
    }

    pub fn all() -> Self {
        Self::NORMALS | Self::HEIGHTS | Self::WNAM | Self::COLOURS | Self::TEXTURES
    }

    /// Whether every bit of `other` is also set in `self`.
    pub fn contains(self, other: DataTypes) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for DataTypes {
    type Output = DataTypes;

    fn bitor(self, rhs: DataTypes) -> DataTypes {
        DataTypes(self.0 | rhs.0)
    }
}


/// Identifies a worldspace. Cell coordinates are only meaningful within one.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Worldspace(pub u32);

impl Worldspace {
    pub const DEFAULT: Worldspace = Worldspace(0);
}

impl Default for Worldspace {
    fn default() -> Self {
        Worldspace::DEFAULT
    }
}

/// Cell coordinate within a worldspace.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct CellLocation {
    pub x: i32,
    pub y: i32,
    pub worldspace: Worldspace,
}

impl CellLocation {
    pub fn new(x: i32, y: i32, worldspace: Worldspace) -> Self {
        CellLocation { x, y, worldspace }
    }

    /// The cell `dx` cells along x and `dy` along y from this one.
    pub fn offset(self, dx: i32, dy: i32) -> Self {
        CellLocation {
            x: self.x + dx,
            y: self.y + dy,
            ..self
        }
    }
}


/// Texture layer index within a cell, biased by +1, paired with the plugin
/// which defined the cell. `(0, 0)` is the default ground texture whatever the
/// plugin.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct UniqueTextureId(pub u16, pub u32);

impl UniqueTextureId {
    pub const DEFAULT: UniqueTextureId = UniqueTextureId(0, 0);
}


/// Raw land attributes of one cell.
///
/// Vertex attributes are indexed by `y * land_size + x`, texture layers by
/// `y * LAND_TEXTURE_SIZE + x`. An attribute group which is not loaded is left
/// empty.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LandData {
    pub land_size: usize,
    pub heights: Vec<f32>,
    pub normals: Vec<Vec3<f32>>,
    pub colours: Vec<Rgb<u8>>,
    pub textures: Vec<u16>,
}

impl LandData {
    pub fn new(land_size: usize) -> Self {
        LandData {
            land_size,
            ..Default::default()
        }
    }

    pub fn height(&self, x: usize, y: usize) -> f32 {
        self.heights[y * self.land_size + x]
    }

    pub fn normal(&self, x: usize, y: usize) -> Vec3<f32> {
        self.normals[y * self.land_size + x]
    }

    pub fn colour(&self, x: usize, y: usize) -> Rgb<u8> {
        self.colours[y * self.land_size + x]
    }

    pub fn texture(&self, x: usize, y: usize) -> u16 {
        self.textures[y * LAND_TEXTURE_SIZE + x]
    }

    fn validate(&self, flags: DataTypes) -> Result<()> {
        ensure!(
            self.land_size >= 2 && (self.land_size - 1).is_power_of_two(),
            "land size {} is not a power of two plus one",
            self.land_size,
        );
        let verts = self.land_size * self.land_size;
        let checks = [
            (DataTypes::HEIGHTS, self.heights.len(), verts, "heights"),
            (DataTypes::NORMALS, self.normals.len(), verts, "normals"),
            (DataTypes::COLOURS, self.colours.len(), verts, "colours"),
            (
                DataTypes::TEXTURES,
                self.textures.len(),
                LAND_TEXTURE_SIZE * LAND_TEXTURE_SIZE,
                "textures",
            ),
        ];
        for (flag, len, expected, name) in checks {
            if flags.contains(flag) {
                ensure!(
                    len == expected,
                    "{} flagged as loaded but has {} of {} elements",
                    name,
                    len,
                    expected,
                );
            }
        }
        Ok(())
    }
}


/// One cell's land data, the attribute groups actually loaded, and the plugin
/// it came from. Immutable once built, shared via `Arc`.
#[derive(Debug, Clone)]
pub struct LandObject {
    data: LandData,
    load_flags: DataTypes,
    plugin: u32,
}

impl LandObject {
    /// Errors if an attribute group in `load_flags` is not fully populated.
    pub fn new(data: LandData, load_flags: DataTypes, plugin: u32) -> Result<Self> {
        data.validate(load_flags)?;
        Ok(LandObject {
            data,
            load_flags,
            plugin,
        })
    }

    /// The land data, if every group in `flags` is loaded.
    pub fn get_data(&self, flags: DataTypes) -> Option<&LandData> {
        if self.load_flags.contains(flags) {
            Some(&self.data)
        } else {
            None
        }
    }

    pub fn plugin(&self) -> u32 {
        self.plugin
    }

    pub fn land_size(&self) -> usize {
        self.data.land_size
    }
}


#[test]
fn test_data_types() {
    let flags = DataTypes::HEIGHTS | DataTypes::NORMALS;
    assert!(flags.contains(DataTypes::HEIGHTS));
    assert!(flags.contains(DataTypes::empty()));
    assert!(!flags.contains(DataTypes::COLOURS));
    assert!(!flags.contains(DataTypes::HEIGHTS | DataTypes::COLOURS));
    assert!(DataTypes::all().contains(flags));
}

#[test]
fn test_get_data_requires_subset() {
    let mut data = LandData::new(3);
    data.heights = vec![1.0; 9];
    let land = LandObject::new(data, DataTypes::HEIGHTS, 2).unwrap();
    assert!(land.get_data(DataTypes::HEIGHTS).is_some());
    assert!(land.get_data(DataTypes::empty()).is_some());
    assert!(land.get_data(DataTypes::NORMALS).is_none());
    assert!(land.get_data(DataTypes::HEIGHTS | DataTypes::COLOURS).is_none());
    assert_eq!(land.plugin(), 2);
}

#[test]
fn test_rejects_partial_data() {
    let mut data = LandData::new(3);
    data.heights = vec![1.0; 8];
    assert!(LandObject::new(data.clone(), DataTypes::HEIGHTS, 0).is_err());
    assert!(LandObject::new(data, DataTypes::empty(), 0).is_ok());
    assert!(LandObject::new(LandData::new(4), DataTypes::empty(), 0).is_err());
    assert!(LandObject::new(LandData::new(3), DataTypes::TEXTURES, 0).is_err());
}

#[test]
fn test_cell_offset() {
    let cell = CellLocation::new(-1, 4, Worldspace(3));
    assert_eq!(cell.offset(2, -5), CellLocation::new(1, -1, Worldspace(3)));
}
