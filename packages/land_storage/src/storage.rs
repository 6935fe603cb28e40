//! Turning cell land into terrain chunk data.

use crate::{
    land::{
        CellLocation,
        DataTypes,
        LandData,
        LandObject,
        UniqueTextureId,
        Worldspace,
        DEFAULT_HEIGHT,
        LAND_TEXTURE_SIZE,
    },
    source::LandSource,
    cache::LandCache,
    layer::{
        LayerInfo,
        LayerInfoCache,
    },
    settings::{
        BlendmapPacking,
        TerrainSettings,
    },
};
use std::{
    collections::HashMap,
    sync::Arc,
};
use grid_sampling::{
    blendmap_size,
    try_sample_blendmaps,
    try_sample_cell_grid,
};
use image::{
    DynamicImage,
    GrayImage,
    Luma,
    RgbaImage,
};
use anyhow::{
    ensure,
    Result,
};
use vek::*;


/// Texture used wherever a texel has no resolvable texture layer.
pub const DEFAULT_TEXTURE: &'static str = "textures\\_land_default.dds";


/// Blend maps for one chunk and the layers they blend between.
///
/// Layer 0 is the base layer and has no blend map. Layer `l` past it is
/// stored in channel `(l - 1) % 4` of image `(l - 1) / 4` when packed, or in
/// image `l - 1` otherwise.
#[derive(Debug, Clone)]
pub struct Blendmaps {
    pub images: Vec<DynamicImage>,
    pub layers: Vec<LayerInfo>,
}

/// Terrain data provider over some `LandSource`.
///
/// Safe to share between threads building different chunks. Holds no land
/// itself: every operation fetches through a `LandCache` of its own.
pub struct Storage {
    source: Arc<dyn LandSource>,
    settings: TerrainSettings,
    layers: LayerInfoCache,
}

impl Storage {
    pub fn new(source: Arc<dyn LandSource>, settings: TerrainSettings) -> Self {
        Storage {
            source,
            settings,
            layers: LayerInfoCache::new(),
        }
    }

    /// World units per side of a cell.
    pub fn cell_world_size(&self, worldspace: Worldspace) -> f32 {
        self.source.cell_world_size(worldspace)
    }

    /// Vertices per side of a cell.
    pub fn cell_vertices(&self, worldspace: Worldspace) -> usize {
        self.source.land_size(worldspace)
    }

    /// Blend map texels per side of a chunk `chunk_size` cells wide, not
    /// counting the shared border.
    pub fn blendmap_scale(&self, chunk_size: f32) -> usize {
        (LAND_TEXTURE_SIZE as f32 * chunk_size) as usize
    }

    /// Height extrema of a chunk no more than one cell wide, and whether there
    /// was height data for it at all.
    ///
    /// Returns `(DEFAULT_HEIGHT, DEFAULT_HEIGHT, false)` if there is none.
    pub fn get_min_max_heights(
        &self,
        size: f32,
        center: Vec2<f32>,
        worldspace: Worldspace,
    ) -> Result<(f32, f32, bool)> {
        ensure!(
            size > 0.0 && size <= 1.0,
            "chunk size {} out of range for height bounds",
            size,
        );

        let origin = center - size / 2.0;
        let cell = CellLocation::new(
            origin.x.floor() as i32,
            origin.y.floor() as i32,
            worldspace,
        );
        let land_size = self.source.land_size(worldspace);
        let land = self.source.fetch_cell(cell)?;
        let data = match loaded(land.as_deref(), DataTypes::HEIGHTS, land_size) {
            Some(data) => data,
            None => return Ok((DEFAULT_HEIGHT, DEFAULT_HEIGHT, false)),
        };

        let edge = (land_size - 1) as f32;
        let span = (size * edge) as usize + 1;
        let start_x = ((origin.x - cell.x as f32) * edge) as usize;
        let start_y = ((origin.y - cell.y as f32) * edge) as usize;
        let end_x = (start_x + span).min(land_size);
        let end_y = (start_y + span).min(land_size);

        let mut min = f32::MAX;
        let mut max = -f32::MAX;
        for y in start_y..end_y {
            for x in start_x..end_x {
                let h = data.height(x, y);
                min = min.min(h);
                max = max.max(h);
            }
        }
        Ok((min, max, true))
    }

    /// Normal at vertex `<x, y>` relative to the given cell, read from
    /// whichever cell actually owns that vertex. Coordinates outside
    /// `0..land_size - 1` wrap into neighbouring cells.
    pub fn fix_normal(
        &self,
        cache: &mut LandCache,
        mut location: CellLocation,
        mut x: i32,
        mut y: i32,
    ) -> Result<Vec3<f32>> {
        let land_size = self.source.land_size(location.worldspace);
        let edge = land_size as i32 - 1;
        while x >= edge {
            location.x += 1;
            x -= edge;
        }
        while y >= edge {
            location.y += 1;
            y -= edge;
        }
        while x < 0 {
            location.x -= 1;
            x += edge;
        }
        while y < 0 {
            location.y -= 1;
            y += edge;
        }

        let land = cache.get_land(&*self.source, location)?;
        Ok(loaded(land.as_deref(), DataTypes::NORMALS, land_size)
            .map(|data| normalize(data.normal(x as usize, y as usize)))
            .unwrap_or(Vec3::unit_z()))
    }

    /// Average of the normals of the four vertices next to vertex `<x, y>`.
    pub fn average_normal(
        &self,
        cache: &mut LandCache,
        location: CellLocation,
        x: i32,
        y: i32,
    ) -> Result<Vec3<f32>> {
        let sum = self.fix_normal(cache, location, x + 1, y)?
            + self.fix_normal(cache, location, x - 1, y)?
            + self.fix_normal(cache, location, x, y + 1)?
            + self.fix_normal(cache, location, x, y - 1)?;
        Ok(normalize(sum))
    }

    /// Colour at vertex `<x, y>` of the given cell. A vertex on the last row
    /// or column is read from the neighbouring cell instead.
    pub fn fix_colour(
        &self,
        cache: &mut LandCache,
        mut location: CellLocation,
        mut x: usize,
        mut y: usize,
    ) -> Result<Rgb<u8>> {
        let land_size = self.source.land_size(location.worldspace);
        if x == land_size - 1 {
            location.x += 1;
            x = 0;
        }
        if y == land_size - 1 {
            location.y += 1;
            y = 0;
        }

        let land = cache.get_land(&*self.source, location)?;
        Ok(loaded(land.as_deref(), DataTypes::COLOURS, land_size)
            .map(|data| data.colour(x, y))
            .unwrap_or(Rgb::broadcast(255)))
    }

    /// Fill vertex buffers for a chunk `size` cells wide centered on `center`,
    /// keeping every `2^lod`-th vertex.
    ///
    /// Buffers are resized to `n * n` for `n` vertices per side, and indexed
    /// by `vert_x * n + vert_y`. Positions are relative to the chunk center.
    pub fn fill_vertex_buffers(
        &self,
        lod: u32,
        size: f32,
        center: Vec2<f32>,
        worldspace: Worldspace,
        positions: &mut Vec<Vec3<f32>>,
        normals: &mut Vec<Vec3<f32>>,
        colours: &mut Vec<Rgba<u8>>,
    ) -> Result<()> {
        debug!(lod, size, ?center, ?worldspace, "filling terrain vertex buffers");

        let land_size = self.source.land_size(worldspace);
        let cell_world_size = self.source.cell_world_size(worldspace);
        ensure!(lod < usize::BITS, "lod level {} out of range", lod);
        let stride = 1usize << lod;

        let origin = center - size / 2.0;
        let start_cell = CellLocation::new(
            origin.x.floor() as i32,
            origin.y.floor() as i32,
            worldspace,
        );
        let edge = (land_size - 1) as f32;
        let begin_x = ((origin.x - start_cell.x as f32) * edge) as usize;
        let begin_y = ((origin.y - start_cell.y as f32) * edge) as usize;
        let distance = (size * edge) as usize + 1;
        let num_verts = (distance - 1) / stride + 1;

        positions.clear();
        normals.clear();
        colours.clear();
        positions.resize(num_verts * num_verts, Vec3::zero());
        normals.resize(num_verts * num_verts, Vec3::unit_z());
        colours.resize(num_verts * num_verts, Rgba::broadcast(255));

        let span = (num_verts - 1).max(1) as f32;
        let extent = size * cell_world_size;
        let last = land_size - 1;
        let mut cache = LandCache::new();

        try_sample_cell_grid(
            land_size,
            stride,
            begin_x,
            begin_y,
            distance,
            |cell_x, cell_y, x, y, vert_x, vert_y| -> Result<()> {
                let location = start_cell.offset(cell_x as i32, cell_y as i32);
                let land = cache.get_land(&*self.source, location)?;
                let i = vert_x * num_verts + vert_y;

                let height = loaded(land.as_deref(), DataTypes::HEIGHTS, land_size)
                    .map(|data| data.height(x, y))
                    .unwrap_or(DEFAULT_HEIGHT);
                positions[i] = Vec3::new(
                    (vert_x as f32 / span - 0.5) * extent,
                    (vert_y as f32 / span - 0.5) * extent,
                    height,
                );

                // normals don't connect seamlessly between cells
                let mut normal = loaded(land.as_deref(), DataTypes::NORMALS, land_size)
                    .map(|data| normalize(data.normal(x, y)))
                    .unwrap_or(Vec3::unit_z());
                if x == last || y == last {
                    normal = self.fix_normal(&mut cache, location, x as i32, y as i32)?;
                }
                // stored corner normals are unreliable, may even point down
                if (x == 0 || x == last) && (y == 0 || y == last) {
                    normal = self.average_normal(&mut cache, location, x as i32, y as i32)?;
                }
                normals[i] = normal;

                let mut colour = loaded(land.as_deref(), DataTypes::COLOURS, land_size)
                    .map(|data| data.colour(x, y))
                    .unwrap_or(Rgb::broadcast(255));
                if x == last || y == last {
                    colour = self.fix_colour(&mut cache, location, x, y)?;
                }
                colours[i] = Rgba::new(colour.r, colour.g, colour.b, 255);

                Ok(())
            },
        )?;

        trace!(cells = cache.len(), num_verts, "filled terrain vertex buffers");
        Ok(())
    }

    /// Texture at texel `<x, y>` of the given land. Layer 0 is the default
    /// texture whichever plugin defined the land.
    pub fn get_vtex_index_at(&self, land: Option<&LandObject>, x: usize, y: usize) -> UniqueTextureId {
        let land = match land {
            Some(land) => land,
            None => return UniqueTextureId::DEFAULT,
        };
        match land.get_data(DataTypes::TEXTURES) {
            Some(data) => match data.texture(x, y) {
                0 => UniqueTextureId::DEFAULT,
                tex => UniqueTextureId(tex, land.plugin()),
            },
            None => UniqueTextureId::DEFAULT,
        }
    }

    /// Path of a texture's diffuse map.
    pub fn get_texture_name(&self, id: UniqueTextureId) -> Result<String> {
        if id.0 == 0 {
            return Ok(DEFAULT_TEXTURE.to_owned());
        }
        match self.source.fetch_texture_layer_name(id.0 - 1, id.1)? {
            Some(name) => Ok(name),
            None => {
                warn!(
                    index = id.0 - 1,
                    plugin = id.1,
                    "unable to find land texture, using default texture instead"
                );
                Ok(DEFAULT_TEXTURE.to_owned())
            }
        }
    }

    /// Material layer for a diffuse map, resolved once per storage.
    pub fn get_layer_info(&self, texture: &str) -> LayerInfo {
        self.layers.get_or_insert_with(texture, || {
            LayerInfo::resolve(texture, &self.settings, &*self.source)
        })
    }

    pub fn default_layer(&self) -> LayerInfo {
        self.get_layer_info(DEFAULT_TEXTURE)
    }

    /// Build the blend maps for a chunk `chunk_size` cells wide centered on
    /// `chunk_center`.
    ///
    /// Layers are numbered in the order their textures are first met, scanning
    /// blend map columns outermost. Textures sharing a diffuse map share a
    /// layer. The default texture always has a layer, last if no texel uses it.
    pub fn get_blendmaps(
        &self,
        chunk_size: f32,
        chunk_center: Vec2<f32>,
        worldspace: Worldspace,
    ) -> Result<Blendmaps> {
        debug!(chunk_size, ?chunk_center, ?worldspace, "building terrain blendmaps");

        let origin = chunk_center - chunk_size / 2.0;
        let n = blendmap_size(chunk_size, LAND_TEXTURE_SIZE as i32);
        let mut cache = LandCache::new();
        let mut ids = vec![UniqueTextureId::DEFAULT; n * n];
        try_sample_blendmaps(
            chunk_size,
            origin.x,
            origin.y,
            LAND_TEXTURE_SIZE as i32,
            |sample| -> Result<()> {
                let location = CellLocation::new(sample.cell_x, sample.cell_y, worldspace);
                let land = cache.get_land(&*self.source, location)?;
                ids[sample.dst_col * n + sample.dst_row] =
                    self.get_vtex_index_at(land.as_deref(), sample.src_row, sample.src_col);
                Ok(())
            },
        )?;

        let mut assigned = HashMap::new();
        let mut layers = Vec::new();
        let mut texel_layers = Vec::with_capacity(ids.len());
        for &id in &ids {
            texel_layers.push(self.layer_index(id, &mut assigned, &mut layers)?);
        }
        if !assigned.contains_key(&UniqueTextureId::DEFAULT) {
            self.layer_index(UniqueTextureId::DEFAULT, &mut assigned, &mut layers)?;
        }

        let images = match self.settings.blendmap_packing {
            BlendmapPacking::Single => {
                let mut images = vec![GrayImage::new(n as u32, n as u32); layers.len() - 1];
                for (i, &layer) in texel_layers.iter().enumerate() {
                    if layer > 0 {
                        let (x, y) = ((i % n) as u32, (i / n) as u32);
                        images[layer - 1].put_pixel(x, y, Luma([255]));
                    }
                }
                images.into_iter().map(DynamicImage::ImageLuma8).collect()
            }
            BlendmapPacking::Packed => {
                let mut images = vec![RgbaImage::new(n as u32, n as u32); (layers.len() - 1 + 3) / 4];
                for (i, &layer) in texel_layers.iter().enumerate() {
                    if layer > 0 {
                        let (x, y) = ((i % n) as u32, (i / n) as u32);
                        images[(layer - 1) / 4].get_pixel_mut(x, y).0[(layer - 1) % 4] = 255;
                    }
                }
                images.into_iter().map(DynamicImage::ImageRgba8).collect()
            }
        };

        Ok(Blendmaps { images, layers })
    }

    fn layer_index(
        &self,
        id: UniqueTextureId,
        assigned: &mut HashMap<UniqueTextureId, usize>,
        layers: &mut Vec<LayerInfo>,
    ) -> Result<usize> {
        if let Some(&index) = assigned.get(&id) {
            return Ok(index);
        }
        let info = self.get_layer_info(&self.get_texture_name(id)?);
        let index = match layers.iter().position(|layer| layer.diffuse_map == info.diffuse_map) {
            Some(index) => index,
            None => {
                layers.push(info);
                layers.len() - 1
            }
        };
        assigned.insert(id, index);
        Ok(index)
    }

    /// Terrain height at a world position, interpolated across the triangle of
    /// the land grid containing it.
    pub fn get_height_at(&self, world_pos: Vec3<f32>, worldspace: Worldspace) -> Result<f32> {
        let cell_size = self.source.cell_world_size(worldspace);
        let cell = CellLocation::new(
            (world_pos.x / cell_size).floor() as i32,
            (world_pos.y / cell_size).floor() as i32,
            worldspace,
        );
        let land = self.source.fetch_cell(cell)?;
        let data = match land.as_deref().and_then(|land| land.get_data(DataTypes::HEIGHTS)) {
            Some(data) => data,
            None => return Ok(DEFAULT_HEIGHT),
        };
        let land_size = data.land_size;

        // position within the cell, 0 to 1
        let n_x = (world_pos.x - cell.x as f32 * cell_size) / cell_size;
        let n_y = (world_pos.y - cell.y as f32 * cell_size) / cell_size;

        // the far edge uses the last quad, n may round up to exactly 1
        let factor = (land_size - 1) as f32;
        let start_x = ((n_x * factor) as usize).min(land_size - 2);
        let start_y = ((n_y * factor) as usize).min(land_size - 2);
        let end_x = start_x + 1;
        let end_y = start_y + 1;

        let start_x_ts = start_x as f32 / factor;
        let start_y_ts = start_y as f32 / factor;
        let end_x_ts = end_x as f32 / factor;
        let end_y_ts = end_y as f32 / factor;

        let x_param = (n_x - start_x_ts) * factor;
        let y_param = (n_y - start_y_ts) * factor;

        // 3---2
        // | \ |
        // 0---1
        let v0 = Vec3::new(start_x_ts, start_y_ts, data.height(start_x, start_y) / cell_size);
        let v1 = Vec3::new(end_x_ts, start_y_ts, data.height(end_x, start_y) / cell_size);
        let v2 = Vec3::new(end_x_ts, end_y_ts, data.height(end_x, end_y) / cell_size);
        let v3 = Vec3::new(start_x_ts, end_y_ts, data.height(start_x, end_y) / cell_size);

        let (a, b, c) = if 1.0 - y_param > x_param {
            (v0, v1, v3)
        } else {
            (v1, v2, v3)
        };
        let normal = (b - a).cross(c - b);
        let d = -normal.dot(a);
        Ok((-normal.x * n_x - normal.y * n_y - d) / normal.z * cell_size)
    }
}

/// The land's data if it has everything in `flags` and matches the expected
/// grid size.
fn loaded(land: Option<&LandObject>, flags: DataTypes, land_size: usize) -> Option<&LandData> {
    land.filter(|land| land.land_size() == land_size)
        .and_then(|land| land.get_data(flags))
}

fn normalize(v: Vec3<f32>) -> Vec3<f32> {
    let len = v.magnitude();
    if len > 0.0 {
        v / len
    } else {
        v
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        land::{LandData, LAND_SIZE},
        source::MemoryLandSource,
        init_test_logging,
    };

    /// Worldspace with small cells: 5 vertices and 64 units per side.
    const WS: Worldspace = Worldspace(1);
    const LS: usize = 5;

    fn memory_source() -> MemoryLandSource {
        init_test_logging();
        let mut source = MemoryLandSource::new();
        source.set_worldspace_geometry(WS, LS, 64.0);
        source
    }

    fn land_with<F>(plugin: u32, f: F) -> LandObject
    where
        F: FnOnce(&mut LandData),
    {
        let mut data = LandData::new(LS);
        data.heights = vec![0.0; LS * LS];
        data.normals = vec![Vec3::unit_z(); LS * LS];
        data.colours = vec![Rgb::broadcast(255); LS * LS];
        data.textures = vec![0; LAND_TEXTURE_SIZE * LAND_TEXTURE_SIZE];
        f(&mut data);
        let flags = DataTypes::HEIGHTS | DataTypes::NORMALS | DataTypes::COLOURS | DataTypes::TEXTURES;
        LandObject::new(data, flags, plugin).unwrap()
    }

    fn cell(x: i32, y: i32) -> CellLocation {
        CellLocation::new(x, y, WS)
    }

    fn storage(source: MemoryLandSource) -> Storage {
        Storage::new(Arc::new(source), TerrainSettings::default())
    }

    struct Buffers {
        positions: Vec<Vec3<f32>>,
        normals: Vec<Vec3<f32>>,
        colours: Vec<Rgba<u8>>,
    }

    fn fill(storage: &Storage, lod: u32, size: f32, center: Vec2<f32>) -> Result<Buffers> {
        let mut buffers = Buffers {
            positions: Vec::new(),
            normals: Vec::new(),
            colours: Vec::new(),
        };
        storage.fill_vertex_buffers(
            lod,
            size,
            center,
            WS,
            &mut buffers.positions,
            &mut buffers.normals,
            &mut buffers.colours,
        )?;
        Ok(buffers)
    }

    fn assert_close(a: Vec3<f32>, b: Vec3<f32>) {
        assert!((a - b).magnitude() < 1e-4, "{:?} != {:?}", a, b);
    }

    #[test]
    fn test_min_max_missing_cell() {
        let storage = storage(memory_source());
        assert_eq!(
            storage.get_min_max_heights(1.0, Vec2::new(0.5, 0.5), WS).unwrap(),
            (DEFAULT_HEIGHT, DEFAULT_HEIGHT, false),
        );
    }

    #[test]
    fn test_min_max_heights() {
        let mut source = memory_source();
        source.insert_cell(cell(0, 0), land_with(0, |data| {
            for (i, h) in data.heights.iter_mut().enumerate() {
                *h = i as f32;
            }
        }));
        let storage = storage(source);

        assert_eq!(storage.get_min_max_heights(1.0, Vec2::new(0.5, 0.5), WS).unwrap(), (0.0, 24.0, true));
        assert_eq!(storage.get_min_max_heights(0.5, Vec2::new(0.25, 0.25), WS).unwrap(), (0.0, 12.0, true));
        assert_eq!(storage.get_min_max_heights(0.5, Vec2::new(0.75, 0.75), WS).unwrap(), (12.0, 24.0, true));
        assert!(storage.get_min_max_heights(2.0, Vec2::new(0.0, 0.0), WS).is_err());
        for &size in &[0.0, -0.5, f32::NAN] {
            assert!(storage.get_min_max_heights(size, Vec2::new(0.5, 0.5), WS).is_err());
        }
    }

    #[test]
    fn test_height_at_flat() {
        let mut source = memory_source();
        source.insert_cell(cell(0, 0), land_with(0, |data| data.heights = vec![100.0; LS * LS]));
        let storage = storage(source);

        for &(x, y) in &[(10.0, 20.0), (0.0, 0.0), (63.0, 1.0), (32.0, 48.5)] {
            let h = storage.get_height_at(Vec3::new(x, y, 0.0), WS).unwrap();
            assert!((h - 100.0).abs() < 1e-3, "{} at {}, {}", h, x, y);
        }
        assert_eq!(storage.get_height_at(Vec3::new(-10.0, 5.0, 0.0), WS).unwrap(), DEFAULT_HEIGHT);
    }

    #[test]
    fn test_height_at_slope() {
        let mut source = memory_source();
        let slope = |data: &mut LandData| {
            for y in 0..LS {
                for x in 0..LS {
                    data.heights[y * LS + x] = x as f32 * 10.0;
                }
            }
        };
        source.insert_cell(cell(0, 0), land_with(0, slope));
        source.insert_cell(cell(-1, 0), land_with(0, slope));
        let storage = storage(source);

        for &(x, y, expected) in &[
            (16.0, 3.0, 10.0),
            (40.0, 10.0, 25.0),
            (40.0, 60.0, 25.0),
            (-48.0, 30.0, 10.0),
        ] {
            let h = storage.get_height_at(Vec3::new(x, y, 0.0), WS).unwrap();
            assert!((h - expected).abs() < 1e-2, "{} != {} at {}, {}", h, expected, x, y);
        }
    }

    #[test]
    fn test_height_at_far_edge() {
        // just below a cell border, the position within the lower cell
        // rounds to exactly 1
        init_test_logging();
        let mut data = LandData::new(LAND_SIZE);
        data.heights = vec![100.0; LAND_SIZE * LAND_SIZE];
        let flat = LandObject::new(data, DataTypes::HEIGHTS, 0).unwrap();
        let mut source = MemoryLandSource::new();
        source.insert_cell(CellLocation::new(-1, 0, Worldspace::DEFAULT), flat.clone());
        source.insert_cell(CellLocation::new(0, -1, Worldspace::DEFAULT), flat);
        let storage = storage(source);

        for &(x, y) in &[(-0.0001, 100.0), (100.0, -0.0001)] {
            let h = storage.get_height_at(Vec3::new(x, y, 0.0), Worldspace::DEFAULT).unwrap();
            assert!((h - 100.0).abs() < 1e-2, "{} at {}, {}", h, x, y);
        }
    }

    #[test]
    fn test_height_at_picks_triangle() {
        // only the far corner of the first quad is raised, so the height
        // depends on which side of the diagonal the query falls
        let mut source = memory_source();
        source.insert_cell(cell(0, 0), land_with(0, |data| data.heights[1 * LS + 1] = 64.0));
        let storage = storage(source);

        // lower left triangle (v0, v1, v3) doesn't include the raised vertex
        let h = storage.get_height_at(Vec3::new(4.0, 4.0, 0.0), WS).unwrap();
        assert!(h.abs() < 1e-3, "{}", h);
        // upper right triangle (v1, v2, v3) does
        let h = storage.get_height_at(Vec3::new(12.0, 12.0, 0.0), WS).unwrap();
        assert!((h - 32.0).abs() < 1e-2, "{}", h);
    }

    #[test]
    fn test_vertex_buffers_missing_land() {
        let storage = storage(memory_source());
        let buffers = fill(&storage, 0, 1.0, Vec2::new(0.5, 0.5)).unwrap();

        assert_eq!(buffers.positions.len(), 25);
        assert_eq!(buffers.normals.len(), 25);
        assert_eq!(buffers.colours.len(), 25);
        assert_eq!(buffers.positions[0], Vec3::new(-32.0, -32.0, DEFAULT_HEIGHT));
        assert_eq!(buffers.positions[1], Vec3::new(-32.0, -16.0, DEFAULT_HEIGHT));
        assert_eq!(buffers.positions[5], Vec3::new(-16.0, -32.0, DEFAULT_HEIGHT));
        assert_eq!(buffers.positions[24], Vec3::new(32.0, 32.0, DEFAULT_HEIGHT));
        assert!(buffers.normals.iter().all(|&n| n == Vec3::unit_z()));
        assert!(buffers.colours.iter().all(|&c| c == Rgba::broadcast(255)));
    }

    #[test]
    fn test_vertex_buffer_sizes() {
        let storage = storage(memory_source());
        let sizes = [
            (0, 1.0, 5),
            (1, 1.0, 3),
            (2, 1.0, 2),
            (0, 0.5, 3),
            (0, 2.0, 9),
            (2, 2.0, 3),
        ];
        for &(lod, size, n) in &sizes {
            let buffers = fill(&storage, lod, size, Vec2::new(0.0, 0.0)).unwrap();
            assert_eq!(buffers.positions.len(), n * n, "lod {} size {}", lod, size);
        }
    }

    #[test]
    fn test_vertex_buffers_replace_contents() {
        let storage = storage(memory_source());
        let mut positions = vec![Vec3::one(); 100];
        let mut normals = Vec::new();
        let mut colours = vec![Rgba::zero(); 3];
        storage
            .fill_vertex_buffers(1, 1.0, Vec2::new(0.5, 0.5), WS, &mut positions, &mut normals, &mut colours)
            .unwrap();
        assert_eq!(positions.len(), 9);
        assert_eq!(normals.len(), 9);
        assert_eq!(colours.len(), 9);
        assert!(positions.iter().all(|p| p.z == DEFAULT_HEIGHT));
    }

    #[test]
    fn test_vertex_buffers_read_land() {
        let mut source = memory_source();
        source.insert_cell(cell(0, 0), land_with(0, |data| {
            for (i, h) in data.heights.iter_mut().enumerate() {
                *h = i as f32;
            }
            data.normals = vec![Vec3::new(1.0, 0.0, 1.0); LS * LS];
            data.colours = vec![Rgb::new(10, 20, 30); LS * LS];
        }));
        let storage = storage(source);
        let buffers = fill(&storage, 0, 1.0, Vec2::new(0.5, 0.5)).unwrap();

        for vert_x in 0..LS {
            for vert_y in 0..LS {
                let p = buffers.positions[vert_x * LS + vert_y];
                assert_eq!(p.z, (vert_y * LS + vert_x) as f32);
            }
        }

        let tilted = Vec3::new(1.0, 0.0, 1.0).normalized();
        assert_close(buffers.normals[1 * LS + 2], tilted);
        assert_eq!(buffers.colours[1 * LS + 2], Rgba::new(10, 20, 30, 255));

        // last column belongs to the missing neighbour
        assert_eq!(buffers.normals[4 * LS + 2], Vec3::unit_z());
        assert_eq!(buffers.colours[4 * LS + 2], Rgba::broadcast(255));

        // corner averages two tilted neighbours with two missing ones
        let corner = buffers.normals[0];
        assert_close(corner, (tilted * 2.0 + Vec3::unit_z() * 2.0).normalized());
        assert!(corner.z > 0.0);
    }

    #[test]
    fn test_vertex_buffers_lod_across_cells() {
        // heights encode the vertex index in a 9x9 window over four cells
        let mut source = memory_source();
        for cell_y in -1..=0 {
            for cell_x in -1..=0 {
                source.insert_cell(cell(cell_x, cell_y), land_with(0, |data| {
                    for y in 0..LS {
                        for x in 0..LS {
                            let global_x = (cell_x + 1) as usize * (LS - 1) + x;
                            let global_y = (cell_y + 1) as usize * (LS - 1) + y;
                            data.heights[y * LS + x] = (global_y * 100 + global_x) as f32;
                        }
                    }
                }));
            }
        }
        let storage = storage(source);
        let buffers = fill(&storage, 1, 2.0, Vec2::new(0.0, 0.0)).unwrap();

        let n = 5;
        assert_eq!(buffers.positions.len(), n * n);
        for vert_x in 0..n {
            for vert_y in 0..n {
                let p = buffers.positions[vert_x * n + vert_y];
                assert_eq!(p.z, (vert_y * 2 * 100 + vert_x * 2) as f32, "vert {}, {}", vert_x, vert_y);
            }
        }
    }

    #[test]
    fn test_wrong_grid_size_ignored() {
        let mut source = memory_source();
        let mut data = LandData::new(3);
        data.heights = vec![7.0; 9];
        source.insert_cell(cell(0, 0), LandObject::new(data, DataTypes::HEIGHTS, 0).unwrap());
        let storage = storage(source);

        let buffers = fill(&storage, 0, 1.0, Vec2::new(0.5, 0.5)).unwrap();
        assert!(buffers.positions.iter().all(|p| p.z == DEFAULT_HEIGHT));
        assert_eq!(
            storage.get_min_max_heights(1.0, Vec2::new(0.5, 0.5), WS).unwrap(),
            (DEFAULT_HEIGHT, DEFAULT_HEIGHT, false),
        );
    }

    #[test]
    fn test_border_normal_from_neighbour() {
        let mut source = memory_source();
        source.insert_cell(cell(0, 0), land_with(0, |_| ()));
        source.insert_cell(cell(1, 0), land_with(0, |data| {
            data.normals = vec![Vec3::new(1.0, 0.0, 1.0); LS * LS];
            data.colours = vec![Rgb::new(1, 2, 3); LS * LS];
        }));
        let storage = storage(source);
        let buffers = fill(&storage, 0, 1.0, Vec2::new(0.5, 0.5)).unwrap();

        assert_close(buffers.normals[4 * LS + 2], Vec3::new(1.0, 0.0, 1.0).normalized());
        assert_eq!(buffers.colours[4 * LS + 2], Rgba::new(1, 2, 3, 255));
        assert_eq!(buffers.normals[3 * LS + 2], Vec3::unit_z());
        assert_eq!(buffers.colours[3 * LS + 2], Rgba::broadcast(255));
    }

    #[test]
    fn test_fix_normal_wraps() {
        let mut source = memory_source();
        source.insert_cell(cell(-1, 2), land_with(0, |data| {
            data.normals[1 * LS + 3] = Vec3::new(0.0, 3.0, 4.0);
        }));
        let storage = storage(source);
        let mut cache = LandCache::new();

        // x = -1 wraps to 3 in the cell before, y = 9 to 1 two cells on
        let n = storage.fix_normal(&mut cache, cell(0, 0), -1, 9).unwrap();
        assert_close(n, Vec3::new(0.0, 0.6, 0.8));
        let n = storage.fix_normal(&mut cache, cell(-1, 2), 3, 1).unwrap();
        assert_close(n, Vec3::new(0.0, 0.6, 0.8));
        assert_eq!(storage.fix_normal(&mut cache, cell(5, 5), 1, 1).unwrap(), Vec3::unit_z());
    }

    #[test]
    fn test_fix_colour_only_wraps_last() {
        let mut source = memory_source();
        source.insert_cell(cell(0, 0), land_with(0, |data| data.colours[2 * LS + 0] = Rgb::new(9, 9, 9)));
        source.insert_cell(cell(1, 0), land_with(0, |data| data.colours[2 * LS + 0] = Rgb::new(7, 7, 7)));
        let storage = storage(source);
        let mut cache = LandCache::new();

        assert_eq!(storage.fix_colour(&mut cache, cell(0, 0), 0, 2).unwrap(), Rgb::new(9, 9, 9));
        assert_eq!(storage.fix_colour(&mut cache, cell(0, 0), 4, 2).unwrap(), Rgb::new(7, 7, 7));
        assert_eq!(storage.fix_colour(&mut cache, cell(0, 0), 4, 4).unwrap(), Rgb::broadcast(255));
    }

    #[test]
    fn test_each_cell_fetched_once() {
        let mut source = memory_source();
        source.insert_cell(cell(0, 0), land_with(0, |_| ()));
        source.insert_cell(cell(-1, 0), land_with(0, |_| ()));
        let source = Arc::new(source);
        let storage = Storage::new(source.clone(), TerrainSettings::default());

        fill(&storage, 0, 2.0, Vec2::new(0.0, 0.0)).unwrap();
        let mut fetched = source.fetched();
        let total = fetched.len();
        fetched.sort();
        fetched.dedup();
        assert_eq!(fetched.len(), total);
        assert!(fetched.contains(&cell(-1, -1)));
        assert!(fetched.contains(&cell(0, 0)));

        // nothing kept between calls
        fill(&storage, 0, 2.0, Vec2::new(0.0, 0.0)).unwrap();
        assert_eq!(source.fetch_count(), total * 2);
    }

    #[test]
    fn test_source_errors_propagate() {
        let mut source = memory_source();
        source.fail_cell(cell(0, 0));
        let storage = storage(source);

        for result in [
            fill(&storage, 0, 1.0, Vec2::new(0.5, 0.5)).map(|_| ()),
            storage.get_min_max_heights(1.0, Vec2::new(0.5, 0.5), WS).map(|_| ()),
            storage.get_height_at(Vec3::new(1.0, 1.0, 0.0), WS).map(|_| ()),
            storage.get_blendmaps(1.0, Vec2::new(0.5, 0.5), WS).map(|_| ()),
        ] {
            let e = result.unwrap_err();
            assert!(e.to_string().contains("failed to load land"), "{}", e);
        }
    }

    #[test]
    fn test_invalid_chunk_size() {
        let storage = storage(memory_source());
        // 0.75 cells is 3 vertex steps, not a power of two
        let e = fill(&storage, 0, 0.75, Vec2::new(0.5, 0.5)).map(|_| ()).unwrap_err();
        let e = e.downcast::<grid_sampling::Error>().unwrap();
        assert_eq!(e.kind(), grid_sampling::ErrorKind::InvalidArgument);
    }

    /// Cell (0, 0) in plugin 3, grass on its lower half along x and rock on
    /// the upper.
    fn two_texture_source() -> MemoryLandSource {
        let mut source = memory_source();
        source.insert_cell(cell(0, 0), land_with(3, |data| {
            for y in 0..LAND_TEXTURE_SIZE {
                for x in 0..LAND_TEXTURE_SIZE {
                    data.textures[y * LAND_TEXTURE_SIZE + x] = if x < 8 { 1 } else { 2 };
                }
            }
        }));
        source.insert_texture_layer(0, 3, "grass.dds");
        source.insert_texture_layer(1, 3, "rock.dds");
        source
    }

    fn luma(image: &DynamicImage, x: u32, y: u32) -> u8 {
        image.as_luma8().unwrap().get_pixel(x, y).0[0]
    }

    #[test]
    fn test_blendmaps_single() {
        let storage = storage(two_texture_source());
        let blendmaps = storage.get_blendmaps(1.0, Vec2::new(0.5, 0.5), WS).unwrap();

        let names: Vec<&str> = blendmaps.layers.iter().map(|l| l.diffuse_map.as_str()).collect();
        assert_eq!(names, vec![DEFAULT_TEXTURE, "grass.dds", "rock.dds"]);
        assert_eq!(blendmaps.images.len(), 2);

        let grass = &blendmaps.images[0];
        let rock = &blendmaps.images[1];
        assert_eq!(grass.as_luma8().unwrap().dimensions(), (17, 17));
        // first row comes from the missing cell before
        assert_eq!(luma(grass, 0, 0), 0);
        assert_eq!(luma(rock, 0, 0), 0);
        assert_eq!(luma(grass, 1, 0), 255);
        assert_eq!(luma(grass, 8, 15), 255);
        assert_eq!(luma(rock, 8, 15), 0);
        assert_eq!(luma(rock, 9, 0), 255);
        assert_eq!(luma(rock, 16, 15), 255);
        // last column comes from the missing cell after
        assert_eq!(luma(grass, 1, 16), 0);
        assert_eq!(luma(rock, 16, 16), 0);
    }

    #[test]
    fn test_blendmaps_packed() {
        let storage = Storage::new(
            Arc::new(two_texture_source()),
            TerrainSettings {
                blendmap_packing: BlendmapPacking::Packed,
                ..Default::default()
            },
        );
        let blendmaps = storage.get_blendmaps(1.0, Vec2::new(0.5, 0.5), WS).unwrap();

        assert_eq!(blendmaps.layers.len(), 3);
        assert_eq!(blendmaps.images.len(), 1);
        let image = blendmaps.images[0].as_rgba8().unwrap();
        assert_eq!(image.get_pixel(0, 0).0, [0, 0, 0, 0]);
        assert_eq!(image.get_pixel(1, 0).0, [255, 0, 0, 0]);
        assert_eq!(image.get_pixel(9, 0).0, [0, 255, 0, 0]);
        assert_eq!(image.get_pixel(9, 16).0, [0, 0, 0, 0]);
    }

    #[test]
    fn test_blendmaps_default_appended() {
        let mut source = memory_source();
        for &(x, y) in &[(0, 0), (-1, 0), (0, 1), (-1, 1)] {
            source.insert_cell(cell(x, y), land_with(3, |data| data.textures = vec![1; 256]));
        }
        source.insert_texture_layer(0, 3, "grass.dds");
        let storage = storage(source);
        let blendmaps = storage.get_blendmaps(1.0, Vec2::new(0.5, 0.5), WS).unwrap();

        assert_eq!(blendmaps.layers.len(), 2);
        assert_eq!(blendmaps.layers[0].diffuse_map, "grass.dds");
        assert_eq!(blendmaps.layers[1], storage.default_layer());
        assert_eq!(blendmaps.images.len(), 1);
        assert!(blendmaps.images[0].as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_blendmaps_share_diffuse_map() {
        let mut source = memory_source();
        source.insert_cell(cell(0, 0), land_with(3, |data| data.textures = vec![1; 256]));
        source.insert_cell(cell(-1, 0), land_with(4, |data| data.textures = vec![1; 256]));
        source.insert_texture_layer(0, 3, "grass.dds");
        source.insert_texture_layer(0, 4, "grass.dds");
        let storage = storage(source);
        let blendmaps = storage.get_blendmaps(1.0, Vec2::new(0.5, 0.5), WS).unwrap();

        let names: Vec<&str> = blendmaps.layers.iter().map(|l| l.diffuse_map.as_str()).collect();
        assert_eq!(names, vec!["grass.dds", DEFAULT_TEXTURE]);
        assert_eq!(blendmaps.images.len(), 1);
        assert_eq!(luma(&blendmaps.images[0], 0, 16), 255);
        assert_eq!(luma(&blendmaps.images[0], 5, 16), 255);
        assert_eq!(luma(&blendmaps.images[0], 0, 15), 0);
        assert_eq!(luma(&blendmaps.images[0], 5, 15), 0);
    }

    #[test]
    fn test_blendmaps_deterministic() {
        let storage = storage(two_texture_source());
        let a = storage.get_blendmaps(0.5, Vec2::new(0.25, 0.75), WS).unwrap();
        let b = storage.get_blendmaps(0.5, Vec2::new(0.25, 0.75), WS).unwrap();
        assert_eq!(a.layers, b.layers);
        assert_eq!(a.images.len(), b.images.len());
        for (a, b) in a.images.iter().zip(&b.images) {
            assert_eq!(a.as_bytes(), b.as_bytes());
        }
    }

    #[test]
    fn test_texture_names() {
        let storage = storage(two_texture_source());
        assert_eq!(storage.get_texture_name(UniqueTextureId::DEFAULT).unwrap(), DEFAULT_TEXTURE);
        assert_eq!(storage.get_texture_name(UniqueTextureId(0, 3)).unwrap(), DEFAULT_TEXTURE);
        assert_eq!(storage.get_texture_name(UniqueTextureId(2, 3)).unwrap(), "rock.dds");
        assert_eq!(storage.get_texture_name(UniqueTextureId(2, 5)).unwrap(), DEFAULT_TEXTURE);
    }

    #[test]
    fn test_vtex_index() {
        let land = land_with(6, |data| data.textures[3 * LAND_TEXTURE_SIZE + 2] = 4);
        let storage = storage(memory_source());
        assert_eq!(storage.get_vtex_index_at(Some(&land), 2, 3), UniqueTextureId(4, 6));
        assert_eq!(storage.get_vtex_index_at(Some(&land), 3, 2), UniqueTextureId::DEFAULT);
        assert_eq!(storage.get_vtex_index_at(None, 2, 3), UniqueTextureId::DEFAULT);
    }

    #[test]
    fn test_layer_info_probing() {
        let mut source = memory_source();
        source.insert_file("textures\\_land_default_nh.dds");
        source.insert_file("textures\\_land_default_diffusespec.dds");
        let storage = Storage::new(Arc::new(source), TerrainSettings {
            auto_use_normal_maps: true,
            auto_use_specular_maps: true,
            ..Default::default()
        });

        let layer = storage.default_layer();
        assert_eq!(layer.diffuse_map, "textures\\_land_default_diffusespec.dds");
        assert_eq!(layer.normal_map.as_deref(), Some("textures\\_land_default_nh.dds"));
        assert!(layer.specular);
        assert!(layer.parallax);
        assert_eq!(storage.get_layer_info(DEFAULT_TEXTURE), layer);
    }

    #[test]
    fn test_geometry_queries() {
        let storage = storage(memory_source());
        assert_eq!(storage.cell_world_size(WS), 64.0);
        assert_eq!(storage.cell_vertices(WS), LS);
        assert_eq!(storage.cell_vertices(Worldspace::DEFAULT), LAND_SIZE);
        assert_eq!(storage.blendmap_scale(0.5), 8);
    }

    #[test]
    fn test_concurrent_fills() {
        let storage = storage(two_texture_source());
        let expected = fill(&storage, 0, 1.0, Vec2::new(0.5, 0.5)).unwrap().positions;
        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    let buffers = fill(&storage, 0, 1.0, Vec2::new(0.5, 0.5)).unwrap();
                    assert_eq!(buffers.positions, expected);
                    let blendmaps = storage.get_blendmaps(1.0, Vec2::new(0.5, 0.5), WS).unwrap();
                    assert_eq!(blendmaps.layers.len(), 3);
                });
            }
        });
    }
}
