//! Vertex sampling over an infinite grid of cells which share border vertices.

use crate::error::{
    Error,
    Result,
};


/// Consecutive samples along one axis which all fall into the same cell.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct AxisRun {
    cell: usize,
    first_local: usize,
    first_vert: usize,
    len: usize,
}

/// Split a global vertex coordinate into a cell and a coordinate local to
/// that cell.
///
/// Cells overlap by one vertex. A vertex on a shared border belongs to the
/// lower cell, at local coordinate `cell_size - 1`, unless it is the first
/// vertex of the request.
fn to_cell_and_local(begin: usize, global: usize, cell_size: usize) -> (usize, usize) {
    let cell = global / (cell_size - 1);
    let local = global % (cell_size - 1);
    if global != begin && local == 0 {
        (cell - 1, cell_size - 1)
    } else {
        (cell, local)
    }
}

fn axis_runs(
    cell_size: usize,
    sample_size: usize,
    begin: usize,
    count: usize,
) -> Vec<AxisRun> {
    let samples = (count - 1) / sample_size + 1;
    let mut runs: Vec<AxisRun> = Vec::new();
    for vert in 0..samples {
        let (cell, local) = to_cell_and_local(begin, begin + vert * sample_size, cell_size);
        match runs.last_mut() {
            Some(run) if run.cell == cell => run.len += 1,
            _ => runs.push(AxisRun {
                cell,
                first_local: local,
                first_vert: vert,
                len: 1,
            }),
        }
    }
    runs
}

fn validate(cell_size: usize, sample_size: usize, count: usize) -> Result<()> {
    if cell_size < 2 || !(cell_size - 1).is_power_of_two() {
        bail!(InvalidArgument, "invalid cell size for cell grid sampling: {}", cell_size);
    }
    if !sample_size.is_power_of_two() {
        bail!(InvalidArgument, "invalid sample size for cell grid sampling: {}", sample_size);
    }
    if count < 2 || !(count - 1).is_power_of_two() {
        bail!(InvalidArgument, "invalid count for cell grid sampling: {}", count);
    }
    Ok(())
}

/// Enumerate every `sample_size`-th vertex of the square window of `count`
/// vertices per side starting at `<begin_x, begin_y>`, in a virtual grid
/// formed by cells of `cell_size` vertices per side.
///
/// The callback receives `(cell_x, cell_y, local_x, local_y, vert_x,
/// vert_y)`, where the vert coordinates index into the output grid of
/// `(count - 1) / sample_size + 1` samples per side.
///
/// If the window is narrower than one cell, or the stride skips over whole
/// cells, samples are emitted row by row. Otherwise they are grouped by cell,
/// so that each cell's data is visited in one go.
///
/// Errors if `cell_size - 1`, `sample_size` or `count - 1` is not a power of
/// two (or `cell_size`, `count` are less than 2). No sample is emitted then.
pub fn sample_cell_grid<F>(
    cell_size: usize,
    sample_size: usize,
    begin_x: usize,
    begin_y: usize,
    count: usize,
    mut f: F,
) -> Result<()>
where
    F: FnMut(usize, usize, usize, usize, usize, usize),
{
    try_sample_cell_grid(
        cell_size,
        sample_size,
        begin_x,
        begin_y,
        count,
        |cell_x, cell_y, local_x, local_y, vert_x, vert_y| -> Result<()> {
            f(cell_x, cell_y, local_x, local_y, vert_x, vert_y);
            Ok(())
        },
    )
}

/// Like `sample_cell_grid`, but the callback may fail, which aborts the
/// enumeration and passes its error through.
pub fn try_sample_cell_grid<F, E>(
    cell_size: usize,
    sample_size: usize,
    begin_x: usize,
    begin_y: usize,
    count: usize,
    mut f: F,
) -> std::result::Result<(), E>
where
    F: FnMut(usize, usize, usize, usize, usize, usize) -> std::result::Result<(), E>,
    E: From<Error>,
{
    validate(cell_size, sample_size, count)?;

    let runs_x = axis_runs(cell_size, sample_size, begin_x, count);
    let runs_y = axis_runs(cell_size, sample_size, begin_y, count);

    if count < cell_size || sample_size > cell_size - 1 {
        for run_y in &runs_y {
            for j in 0..run_y.len {
                for run_x in &runs_x {
                    for i in 0..run_x.len {
                        f(
                            run_x.cell,
                            run_y.cell,
                            run_x.first_local + i * sample_size,
                            run_y.first_local + j * sample_size,
                            run_x.first_vert + i,
                            run_y.first_vert + j,
                        )?;
                    }
                }
            }
        }
    } else {
        for run_y in &runs_y {
            for run_x in &runs_x {
                for j in 0..run_y.len {
                    for i in 0..run_x.len {
                        f(
                            run_x.cell,
                            run_y.cell,
                            run_x.first_local + i * sample_size,
                            run_y.first_local + j * sample_size,
                            run_x.first_vert + i,
                            run_y.first_vert + j,
                        )?;
                    }
                }
            }
        }
    }
    Ok(())
}


#[cfg(test)]
fn collect(
    cell_size: usize,
    sample_size: usize,
    begin_x: usize,
    begin_y: usize,
    count: usize,
) -> Vec<[usize; 6]> {
    let mut samples = Vec::new();
    sample_cell_grid(
        cell_size,
        sample_size,
        begin_x,
        begin_y,
        count,
        |cx, cy, lx, ly, vx, vy| samples.push([cx, cy, lx, ly, vx, vy]),
    ).unwrap();
    samples
}

#[cfg(test)]
fn assert_invalid(cell_size: usize, sample_size: usize, count: usize) {
    let mut called = false;
    let e = sample_cell_grid(cell_size, sample_size, 0, 0, count, |_, _, _, _, _, _| called = true)
        .unwrap_err();
    assert_eq!(e.kind(), crate::ErrorKind::InvalidArgument);
    assert!(!called);
}

#[test]
fn test_rejects_bad_cell_size() {
    assert_invalid(0, 1, 3);
    assert_invalid(1, 1, 3);
    assert_invalid(4, 1, 3);
    assert_invalid(64, 1, 3);
}

#[test]
fn test_rejects_bad_sample_size() {
    assert_invalid(3, 0, 3);
    assert_invalid(3, 3, 3);
    assert_invalid(65, 6, 3);
}

#[test]
fn test_rejects_bad_count() {
    assert_invalid(3, 1, 0);
    assert_invalid(3, 1, 1);
    assert_invalid(3, 1, 4);
    assert_invalid(3, 1, 6);
}

#[test]
fn test_minimum_valid_arguments() {
    assert_eq!(
        collect(2, 1, 0, 0, 2),
        vec![
            [0, 0, 0, 0, 0, 0],
            [0, 0, 1, 0, 1, 0],
            [0, 0, 0, 1, 0, 1],
            [0, 0, 1, 1, 1, 1],
        ],
    );
}

#[test]
fn test_sample_size_one_covers_cell() {
    assert_eq!(
        collect(3, 1, 0, 0, 3),
        vec![
            [0, 0, 0, 0, 0, 0],
            [0, 0, 1, 0, 1, 0],
            [0, 0, 2, 0, 2, 0],
            [0, 0, 0, 1, 0, 1],
            [0, 0, 1, 1, 1, 1],
            [0, 0, 2, 1, 2, 1],
            [0, 0, 0, 2, 0, 2],
            [0, 0, 1, 2, 1, 2],
            [0, 0, 2, 2, 2, 2],
        ],
    );
}

#[test]
fn test_count_limits_scope() {
    assert_eq!(
        collect(3, 1, 0, 0, 2),
        vec![[0, 0, 0, 0, 0, 0], [0, 0, 1, 0, 1, 0], [0, 0, 0, 1, 0, 1], [0, 0, 1, 1, 1, 1]],
    );
    assert_eq!(
        collect(3, 1, 1, 0, 2),
        vec![[0, 0, 1, 0, 0, 0], [0, 0, 2, 0, 1, 0], [0, 0, 1, 1, 0, 1], [0, 0, 2, 1, 1, 1]],
    );
    assert_eq!(
        collect(3, 1, 0, 1, 2),
        vec![[0, 0, 0, 1, 0, 0], [0, 0, 1, 1, 1, 0], [0, 0, 0, 2, 0, 1], [0, 0, 1, 2, 1, 1]],
    );
    assert_eq!(
        collect(5, 1, 1, 1, 2),
        vec![[0, 0, 1, 1, 0, 0], [0, 0, 2, 1, 1, 0], [0, 0, 1, 2, 0, 1], [0, 0, 2, 2, 1, 1]],
    );
}

#[test]
fn test_narrow_window_crosses_cell_border_row_by_row() {
    assert_eq!(
        collect(5, 1, 3, 0, 3),
        vec![
            [0, 0, 3, 0, 0, 0],
            [0, 0, 4, 0, 1, 0],
            [1, 0, 1, 0, 2, 0],
            [0, 0, 3, 1, 0, 1],
            [0, 0, 4, 1, 1, 1],
            [1, 0, 1, 1, 2, 1],
            [0, 0, 3, 2, 0, 2],
            [0, 0, 4, 2, 1, 2],
            [1, 0, 1, 2, 2, 2],
        ],
    );
}

#[test]
fn test_cell_wide_window_groups_by_cell() {
    assert_eq!(
        collect(3, 1, 1, 0, 3),
        vec![
            [0, 0, 1, 0, 0, 0],
            [0, 0, 2, 0, 1, 0],
            [0, 0, 1, 1, 0, 1],
            [0, 0, 2, 1, 1, 1],
            [0, 0, 1, 2, 0, 2],
            [0, 0, 2, 2, 1, 2],
            [1, 0, 1, 0, 2, 0],
            [1, 0, 1, 1, 2, 1],
            [1, 0, 1, 2, 2, 2],
        ],
    );
}

#[test]
fn test_wide_window_spans_several_cells() {
    let samples = collect(3, 1, 1, 0, 5);
    assert_eq!(samples.len(), 25);
    assert_eq!(
        &samples[12..17],
        &[
            [2, 0, 1, 0, 4, 0],
            [2, 0, 1, 1, 4, 1],
            [2, 0, 1, 2, 4, 2],
            [0, 1, 1, 1, 0, 3],
            [0, 1, 2, 1, 1, 3],
        ],
    );
    assert_eq!(samples[24], [2, 1, 1, 2, 4, 4]);
}

#[test]
fn test_sample_size_skips_points() {
    assert_eq!(
        collect(3, 2, 0, 0, 3),
        vec![[0, 0, 0, 0, 0, 0], [0, 0, 2, 0, 1, 0], [0, 0, 0, 2, 0, 1], [0, 0, 2, 2, 1, 1]],
    );
    assert_eq!(
        collect(3, 2, 0, 0, 5),
        vec![
            [0, 0, 0, 0, 0, 0],
            [0, 0, 2, 0, 1, 0],
            [0, 0, 0, 2, 0, 1],
            [0, 0, 2, 2, 1, 1],
            [1, 0, 2, 0, 2, 0],
            [1, 0, 2, 2, 2, 1],
            [0, 1, 0, 2, 0, 2],
            [0, 1, 2, 2, 1, 2],
            [1, 1, 2, 2, 2, 2],
        ],
    );
}

#[test]
fn test_sample_size_beyond_cell_picks_border_vertices() {
    assert_eq!(
        collect(3, 4, 0, 0, 9),
        vec![
            [0, 0, 0, 0, 0, 0],
            [1, 0, 2, 0, 1, 0],
            [3, 0, 2, 0, 2, 0],
            [0, 1, 0, 2, 0, 1],
            [1, 1, 2, 2, 1, 1],
            [3, 1, 2, 2, 2, 1],
            [0, 3, 0, 2, 0, 2],
            [1, 3, 2, 2, 1, 2],
            [3, 3, 2, 2, 2, 2],
        ],
    );
    assert_eq!(
        collect(3, 8, 0, 0, 9),
        vec![[0, 0, 0, 0, 0, 0], [3, 0, 2, 0, 1, 0], [0, 3, 0, 2, 0, 1], [3, 3, 2, 2, 1, 1]],
    );
}

#[test]
fn test_sample_count_and_local_range() {
    for &cell_size in &[2, 3, 5, 9, 17, 65] {
        for &sample_size in &[1, 2, 4, 8, 16] {
            for &count in &[2, 3, 5, 9, 17, 33, 65, 129] {
                for &(begin_x, begin_y) in &[(0, 0), (7, 3), (64, 128), (100, 1)] {
                    let samples = collect(cell_size, sample_size, begin_x, begin_y, count);
                    let side = (count - 1) / sample_size + 1;
                    assert_eq!(samples.len(), side * side);
                    let mut seen = vec![false; side * side];
                    for [cx, cy, lx, ly, vx, vy] in samples {
                        assert!(lx <= cell_size - 1 && ly <= cell_size - 1);
                        assert_eq!(cx * (cell_size - 1) + lx, begin_x + vx * sample_size);
                        assert_eq!(cy * (cell_size - 1) + ly, begin_y + vy * sample_size);
                        assert!(!seen[vy * side + vx]);
                        seen[vy * side + vx] = true;
                    }
                }
            }
        }
    }
}

#[test]
fn test_callback_error_aborts() {
    let mut calls = 0;
    let result = try_sample_cell_grid(3, 1, 0, 0, 3, |_, _, _, _, _, _| {
        calls += 1;
        if calls == 4 {
            Err(error!(InvalidArgument, "stop"))
        } else {
            Ok(())
        }
    });
    assert!(result.is_err());
    assert_eq!(calls, 4);
}
