//! Material layers and the companion maps found next to a diffuse map.

use crate::{
    settings::TerrainSettings,
    source::LandSource,
};
use std::collections::HashMap;
use parking_lot::Mutex;


/// Material description of one terrain texture layer.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct LayerInfo {
    pub diffuse_map: String,
    pub normal_map: Option<String>,
    /// The diffuse map's alpha channel holds specular.
    pub specular: bool,
    /// The normal map's alpha channel holds height.
    pub parallax: bool,
}

impl LayerInfo {
    /// A layer with just a diffuse map.
    pub fn plain(diffuse_map: impl Into<String>) -> Self {
        LayerInfo {
            diffuse_map: diffuse_map.into(),
            normal_map: None,
            specular: false,
            parallax: false,
        }
    }

    /// Work out a diffuse map's layer by probing for companion maps named
    /// after it.
    pub fn resolve(path: &str, settings: &TerrainSettings, source: &dyn LandSource) -> Self {
        let mut info = LayerInfo::plain(path);

        if settings.auto_use_normal_maps {
            for (pattern, parallax) in [
                (&settings.normal_height_map_pattern, true),
                (&settings.normal_map_pattern, false),
            ] {
                if let Some(candidate) = with_suffix(path, pattern) {
                    if source.file_exists(&candidate) {
                        info.normal_map = Some(candidate);
                        info.parallax = parallax;
                        break;
                    }
                }
            }
        }

        if settings.auto_use_specular_maps {
            if let Some(candidate) = with_suffix(path, &settings.specular_map_pattern) {
                if source.file_exists(&candidate) {
                    info.diffuse_map = candidate;
                    info.specular = true;
                }
            }
        }

        info
    }
}

/// Insert `suffix` before the extension of `path`. `None` if `path` has no
/// extension.
fn with_suffix(path: &str, suffix: &str) -> Option<String> {
    let dot = path.rfind('.')?;
    let mut out = String::with_capacity(path.len() + suffix.len());
    out.push_str(&path[..dot]);
    out.push_str(suffix);
    out.push_str(&path[dot..]);
    Some(out)
}


/// Resolved layers by diffuse map path, shared between threads.
#[derive(Debug, Default)]
pub struct LayerInfoCache {
    layers: Mutex<HashMap<String, LayerInfo>>,
}

impl LayerInfoCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the cached layer for `path`, or compute and cache it. The lock is
    /// held throughout, so each path is computed at most once.
    pub fn get_or_insert_with<F>(&self, path: &str, compute: F) -> LayerInfo
    where
        F: FnOnce() -> LayerInfo,
    {
        let mut layers = self.layers.lock();
        if let Some(info) = layers.get(path) {
            return info.clone();
        }
        let info = compute();
        debug!(%path, ?info, "resolved terrain layer");
        layers.insert(path.to_owned(), info.clone());
        info
    }

    pub fn len(&self) -> usize {
        self.layers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.lock().is_empty()
    }
}


#[test]
fn test_with_suffix() {
    assert_eq!(with_suffix("textures\\tx_grass.dds", "_n").unwrap(), "textures\\tx_grass_n.dds");
    assert_eq!(with_suffix("a.b.dds", "_nh").unwrap(), "a.b_nh.dds");
    assert_eq!(with_suffix("no_extension", "_n"), None);
}

#[test]
fn test_resolve_prefers_normal_height() {
    use crate::source::MemoryLandSource;

    let mut source = MemoryLandSource::new();
    source.insert_file("rock_nh.dds");
    source.insert_file("rock_n.dds");
    source.insert_file("dirt_n.dds");
    let settings = TerrainSettings {
        auto_use_normal_maps: true,
        ..Default::default()
    };

    let rock = LayerInfo::resolve("rock.dds", &settings, &source);
    assert_eq!(rock.normal_map.as_deref(), Some("rock_nh.dds"));
    assert!(rock.parallax);

    let dirt = LayerInfo::resolve("dirt.dds", &settings, &source);
    assert_eq!(dirt.normal_map.as_deref(), Some("dirt_n.dds"));
    assert!(!dirt.parallax);

    assert_eq!(LayerInfo::resolve("sand.dds", &settings, &source), LayerInfo::plain("sand.dds"));
}

#[test]
fn test_resolve_respects_flags() {
    use crate::source::MemoryLandSource;

    let mut source = MemoryLandSource::new();
    source.insert_file("rock_n.dds");
    source.insert_file("rock_diffusespec.dds");

    let off = LayerInfo::resolve("rock.dds", &TerrainSettings::default(), &source);
    assert_eq!(off, LayerInfo::plain("rock.dds"));

    let settings = TerrainSettings {
        auto_use_specular_maps: true,
        ..Default::default()
    };
    let spec = LayerInfo::resolve("rock.dds", &settings, &source);
    assert_eq!(spec.diffuse_map, "rock_diffusespec.dds");
    assert!(spec.specular);
    assert_eq!(spec.normal_map, None);
}

#[test]
fn test_cache_computes_once() {
    let cache = LayerInfoCache::new();
    let mut calls = 0;
    for _ in 0..3 {
        let info = cache.get_or_insert_with("grass.dds", || {
            calls += 1;
            LayerInfo::plain("grass.dds")
        });
        assert_eq!(info.diffuse_map, "grass.dds");
    }
    assert_eq!(calls, 1);
    assert_eq!(cache.len(), 1);
}
