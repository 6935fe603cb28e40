
use std::{
    path::Path,
    fs::File,
    io::{
        BufReader,
        BufWriter,
    },
};
use serde::{Serialize, Deserialize};
use anyhow::Result;


pub const SETTINGS_FILE_NAME: &'static str = "terrain.json";


/// How texture layers are laid out in blend map images.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendmapPacking {
    /// One single-channel image per layer past the base layer.
    Single,
    /// Four layers per RGBA image.
    Packed,
}

impl Default for BlendmapPacking {
    fn default() -> Self {
        BlendmapPacking::Single
    }
}

/// Terrain material and blend map options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainSettings {
    /// Inserted before a diffuse map's extension to find its normal map.
    pub normal_map_pattern: String,
    /// Like `normal_map_pattern`, for a normal map with height in its alpha
    /// channel. Tried first.
    pub normal_height_map_pattern: String,
    pub auto_use_normal_maps: bool,
    /// Inserted before a diffuse map's extension to find a variant with
    /// specular in its alpha channel.
    pub specular_map_pattern: String,
    pub auto_use_specular_maps: bool,
    pub blendmap_packing: BlendmapPacking,
}

impl Default for TerrainSettings {
    fn default() -> Self {
        TerrainSettings {
            normal_map_pattern: "_n".to_owned(),
            normal_height_map_pattern: "_nh".to_owned(),
            auto_use_normal_maps: false,
            specular_map_pattern: "_diffusespec".to_owned(),
            auto_use_specular_maps: false,
            blendmap_packing: BlendmapPacking::Single,
        }
    }
}

impl TerrainSettings {
    pub fn read(path: impl AsRef<Path>) -> Self {
        Self::try_read(path).unwrap_or_default()
    }

    pub fn try_read(path: impl AsRef<Path>) -> Result<Self> {
        Ok(serde_json::from_reader(BufReader::new(File::open(path)?))?)
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        serde_json::to_writer_pretty(BufWriter::new(File::create(path)?), self)?;
        Ok(())
    }
}


#[test]
fn test_missing_fields_default() {
    let settings: TerrainSettings = serde_json::from_str(r#"{
        "auto_use_normal_maps": true,
        "blendmap_packing": "packed"
    }"#).unwrap();
    assert!(settings.auto_use_normal_maps);
    assert_eq!(settings.blendmap_packing, BlendmapPacking::Packed);
    assert_eq!(settings.normal_map_pattern, "_n");
    assert_eq!(settings.specular_map_pattern, "_diffusespec");
    assert!(!settings.auto_use_specular_maps);
}

#[test]
fn test_write_then_read() {
    let path = std::env::temp_dir().join(format!("land_storage_settings_{}.json", std::process::id()));
    let settings = TerrainSettings {
        auto_use_specular_maps: true,
        normal_map_pattern: "_norm".to_owned(),
        ..Default::default()
    };
    settings.write(&path).unwrap();
    assert_eq!(TerrainSettings::try_read(&path).unwrap(), settings);
    std::fs::remove_file(&path).unwrap();
    assert_eq!(TerrainSettings::read(&path), TerrainSettings::default());
}
