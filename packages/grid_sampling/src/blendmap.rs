//! Texel sampling for blend maps which cover a region of one or more cells.

use crate::error::{
    Error,
    Result,
};


/// Instruction to copy source texel `<src_row, src_col>` of cell
/// `<cell_x, cell_y>` to destination texel `<dst_row, dst_col>`.
///
/// Rows run along world x, columns along world y.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct CellSample {
    pub cell_x: i32,
    pub cell_y: i32,
    pub src_row: usize,
    pub src_col: usize,
    pub dst_row: usize,
    pub dst_col: usize,
}

/// Number of destination texels per side of a blend map covering `size`
/// cells with `texture_size` texels per cell.
pub fn blendmap_size(size: f32, texture_size: i32) -> usize {
    (texture_size as f32 * size) as usize + 1
}

#[derive(Debug, Copy, Clone)]
struct TexelRun {
    cell: i32,
    first_src: usize,
    first_dst: usize,
    len: usize,
}

fn texel_runs(first_global: i64, count: usize, texture_size: i64) -> Vec<TexelRun> {
    let mut runs: Vec<TexelRun> = Vec::new();
    for dst in 0..count {
        let global = first_global + dst as i64;
        let cell = global.div_euclid(texture_size) as i32;
        match runs.last_mut() {
            Some(run) if run.cell == cell => run.len += 1,
            _ => runs.push(TexelRun {
                cell,
                first_src: global.rem_euclid(texture_size) as usize,
                first_dst: dst,
                len: 1,
            }),
        }
    }
    runs
}

/// Enumerate the texel copies needed to build a blend map for the square
/// region of `size` cells whose minimum corner is `<min_x, min_y>` in cell
/// units.
///
/// Adjacent cells share their border texels. Destination row `r` takes source
/// row `r - 1`, so the first row comes from the last row of the cell before;
/// columns are unshifted and run over into the next cell. Samples are grouped
/// by cell: column runs outermost, then row runs, then destination column,
/// then destination row.
///
/// Errors if `size` or `texture_size` is not positive. No sample is emitted
/// then.
pub fn sample_blendmaps<F>(
    size: f32,
    min_x: f32,
    min_y: f32,
    texture_size: i32,
    mut f: F,
) -> Result<()>
where
    F: FnMut(CellSample),
{
    try_sample_blendmaps(size, min_x, min_y, texture_size, |sample| -> Result<()> {
        f(sample);
        Ok(())
    })
}

/// Like `sample_blendmaps`, but the callback may fail, which aborts the
/// enumeration and passes its error through.
pub fn try_sample_blendmaps<F, E>(
    size: f32,
    min_x: f32,
    min_y: f32,
    texture_size: i32,
    mut f: F,
) -> std::result::Result<(), E>
where
    F: FnMut(CellSample) -> std::result::Result<(), E>,
    E: From<Error>,
{
    if !(size > 0.0) {
        bail!(InvalidArgument, "invalid size for blendmap sampling: {}", size);
    }
    if texture_size <= 0 {
        bail!(InvalidArgument, "invalid texture size for blendmap sampling: {}", texture_size);
    }

    let begin_cell_x = min_x.floor() as i32;
    let begin_cell_y = min_y.floor() as i32;
    let begin_row = ((min_x - begin_cell_x as f32) * texture_size as f32) as i64;
    let begin_col = ((min_y - begin_cell_y as f32) * texture_size as f32) as i64;
    let count = blendmap_size(size, texture_size);
    let texture_size = texture_size as i64;

    let rows = texel_runs(begin_cell_x as i64 * texture_size + begin_row - 1, count, texture_size);
    let cols = texel_runs(begin_cell_y as i64 * texture_size + begin_col, count, texture_size);

    for col_run in &cols {
        for row_run in &rows {
            for j in 0..col_run.len {
                for i in 0..row_run.len {
                    f(CellSample {
                        cell_x: row_run.cell,
                        cell_y: col_run.cell,
                        src_row: row_run.first_src + i,
                        src_col: col_run.first_src + j,
                        dst_row: row_run.first_dst + i,
                        dst_col: col_run.first_dst + j,
                    })?;
                }
            }
        }
    }
    Ok(())
}


#[cfg(test)]
fn collect(size: f32, min_x: f32, min_y: f32, texture_size: i32) -> Vec<(i32, i32, usize, usize, usize, usize)> {
    let mut samples = Vec::new();
    sample_blendmaps(size, min_x, min_y, texture_size, |s| samples.push((
        s.cell_x,
        s.cell_y,
        s.src_row,
        s.src_col,
        s.dst_row,
        s.dst_col,
    ))).unwrap();
    samples
}

#[test]
fn test_rejects_non_positive_size() {
    for &size in &[0.0, -1.0, f32::NAN] {
        let mut called = false;
        let e = sample_blendmaps(size, 0.0, 0.0, 8, |_| called = true).unwrap_err();
        assert_eq!(e.kind(), crate::ErrorKind::InvalidArgument);
        assert!(!called);
    }
}

#[test]
fn test_rejects_non_positive_texture_size() {
    for &texture_size in &[0, -16] {
        let mut called = false;
        let e = sample_blendmaps(1.0, 0.0, 0.0, texture_size, |_| called = true).unwrap_err();
        assert_eq!(e.kind(), crate::ErrorKind::InvalidArgument);
        assert!(!called);
    }
}

#[test]
fn test_decrements_begin_row() {
    assert_eq!(
        collect(0.125, 0.125, 0.125, 8),
        vec![(0, 0, 0, 1, 0, 0), (0, 0, 1, 1, 1, 0), (0, 0, 0, 2, 0, 1), (0, 0, 1, 2, 1, 1)],
    );
}

#[test]
fn test_decrements_begin_row_over_cell_border() {
    assert_eq!(
        collect(0.125, 0.0, 0.0, 8),
        vec![(-1, 0, 7, 0, 0, 0), (-1, 0, 7, 1, 0, 1), (0, 0, 0, 0, 1, 0), (0, 0, 0, 1, 1, 1)],
    );
}

#[test]
fn test_negative_coordinates() {
    assert_eq!(
        collect(0.125, -0.5, -0.5, 8),
        vec![(-1, -1, 3, 4, 0, 0), (-1, -1, 4, 4, 1, 0), (-1, -1, 3, 5, 0, 1), (-1, -1, 4, 5, 1, 1)],
    );
}

#[test]
fn test_covers_multiple_cells() {
    assert_eq!(
        collect(2.0, -1.5, -1.5, 2),
        vec![
            (-2, -2, 0, 1, 0, 0),
            (-2, -2, 1, 1, 1, 0),
            (-1, -2, 0, 1, 2, 0),
            (-1, -2, 1, 1, 3, 0),
            (0, -2, 0, 1, 4, 0),
            (-2, -1, 0, 0, 0, 1),
            (-2, -1, 1, 0, 1, 1),
            (-2, -1, 0, 1, 0, 2),
            (-2, -1, 1, 1, 1, 2),
            (-1, -1, 0, 0, 2, 1),
            (-1, -1, 1, 0, 3, 1),
            (-1, -1, 0, 1, 2, 2),
            (-1, -1, 1, 1, 3, 2),
            (0, -1, 0, 0, 4, 1),
            (0, -1, 0, 1, 4, 2),
            (-2, 0, 0, 0, 0, 3),
            (-2, 0, 1, 0, 1, 3),
            (-2, 0, 0, 1, 0, 4),
            (-2, 0, 1, 1, 1, 4),
            (-1, 0, 0, 0, 2, 3),
            (-1, 0, 1, 0, 3, 3),
            (-1, 0, 0, 1, 2, 4),
            (-1, 0, 1, 1, 3, 4),
            (0, 0, 0, 0, 4, 3),
            (0, 0, 0, 1, 4, 4),
        ],
    );
}

#[test]
fn test_whole_cell_covers_every_destination_once() {
    let size = blendmap_size(1.0, 16);
    assert_eq!(size, 17);
    let samples = collect(1.0, 3.0, -4.0, 16);
    assert_eq!(samples.len(), size * size);
    let mut seen = vec![false; size * size];
    for (cell_x, cell_y, src_row, src_col, dst_row, dst_col) in samples {
        assert!(src_row < 16 && src_col < 16);
        assert_eq!(cell_x as i64 * 16 + src_row as i64, 3 * 16 + dst_row as i64 - 1);
        assert_eq!(cell_y as i64 * 16 + src_col as i64, -4 * 16 + dst_col as i64);
        assert!(!seen[dst_col * size + dst_row]);
        seen[dst_col * size + dst_row] = true;
    }
}
