//! Strip windows for streaming raster access
//!
//! The streaming pipeline walks a raster as a sequence of full-width row
//! strips. A `Window` names one strip; `strip_windows` enumerates the
//! strips covering a grid for a given strip height.

/// A full-width window of raster rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// Row offset in the source raster
    pub row_offset: usize,
    /// Number of rows in this window
    pub rows: usize,
    /// Number of columns (always the full raster width)
    pub cols: usize,
}

impl Window {
    /// Create a new window
    pub fn new(row_offset: usize, rows: usize, cols: usize) -> Self {
        Self {
            row_offset,
            rows,
            cols,
        }
    }

    /// Number of cells covered
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    /// Whether the window covers no cells
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Row range in the source raster
    pub fn row_range(&self) -> std::ops::Range<usize> {
        self.row_offset..self.row_offset + self.rows
    }
}

/// Enumerate the row strips covering a `rows` x `cols` grid.
///
/// Every strip has `strip_rows` rows except the final one, which is
/// shortened to the remainder. A zero-sized grid yields no windows.
pub fn strip_windows(rows: usize, cols: usize, strip_rows: usize) -> Vec<Window> {
    let strip_rows = strip_rows.max(1);
    let mut windows = Vec::with_capacity(rows.div_ceil(strip_rows));
    let mut offset = 0;
    while offset < rows {
        let n = strip_rows.min(rows - offset);
        windows.push(Window::new(offset, n, cols));
        offset += n;
    }
    windows
}
