//! Index arithmetic for sampling terrain data stored per cell.
//!
//! Basic example:
//!
//! ```
//! use grid_sampling::sample_cell_grid;
//!
//! // cells of 65x65 vertices, every 4th vertex, a window one cell wide
//! // starting half way into cell 2 along x
//! let mut count = 0;
//! sample_cell_grid(65, 4, 160, 0, 65, |cell_x, cell_y, local_x, local_y, vert_x, vert_y| {
//!     assert_eq!(cell_x * 64 + local_x, 160 + vert_x * 4);
//!     assert_eq!(cell_y * 64 + local_y, vert_y * 4);
//!     count += 1;
//! }).unwrap();
//! assert_eq!(count, 17 * 17);
//! ```
//!
//! ## cells, shared borders
//!
//! The world is divided into a grid of _cells_ which extends indefinitely in
//! all directions. Each cell stores a square grid of `cell_size` vertices per
//! side, where `cell_size - 1` is a power of two. Neighboring cells both store
//! the vertices along the border they share, so a cell spans only
//! `cell_size - 1` vertices of the global grid. A global vertex coordinate on
//! a border is attributed to the lower cell at local coordinate
//! `cell_size - 1`, except when it is where a request begins.
//!
//! ## vertex grids, sample sizes
//!
//! `sample_cell_grid` walks a square window of a virtual global vertex grid,
//! keeping every `sample_size`-th vertex. This is how lower levels of detail
//! are built: level `n` keeps every `2^n`-th vertex.
//!
//! ## blend maps
//!
//! Texture layers are stored per cell as a grid of `texture_size` texels per
//! side, without duplicated borders. `sample_blendmaps` works out which cell
//! texel feeds each texel of a blend map covering an arbitrary region, which
//! may begin at negative or fractional cell coordinates.

#[macro_use]
mod error;
mod cell_grid;
mod blendmap;


pub use self::{
    error::{
        Error,
        ErrorKind,
        Result,
    },
    cell_grid::{
        sample_cell_grid,
        try_sample_cell_grid,
    },
    blendmap::{
        CellSample,
        blendmap_size,
        sample_blendmaps,
        try_sample_blendmaps,
    },
};
