//! Reconstructed tables.

use crate::geometry::Rect;
use crate::page::FragmentId;
use serde::{Deserialize, Serialize};

/// Where a grid axis' boundaries came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoundarySource {
    /// Painted ruling lines
    Rulings,
    /// Whitespace gaps recurring across lines
    Whitespace,
    /// Text line positions
    Lines,
}

/// One cell of a table, possibly spanning several grid positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    /// Top row index
    pub row: usize,
    /// Left column index
    pub col: usize,
    /// Rows covered, at least 1
    pub row_span: usize,
    /// Columns covered, at least 1
    pub col_span: usize,
    /// Concatenated fragment text
    pub text: String,
    /// Fragments assigned to this cell, indices into the page
    pub fragments: Vec<FragmentId>,
}

impl Cell {
    /// Empty 1x1 cell.
    pub fn new(row: usize, col: usize) -> Self {
        Self {
            row,
            col,
            row_span: 1,
            col_span: 1,
            text: String::new(),
            fragments: Vec::new(),
        }
    }

    /// True when `(row, col)` lies within the cell's span.
    pub fn covers(&self, row: usize, col: usize) -> bool {
        (self.row..self.row + self.row_span).contains(&row) && (self.col..self.col + self.col_span).contains(&col)
    }

    /// Grid positions covered.
    pub fn area(&self) -> usize {
        self.row_span * self.col_span
    }
}

/// A table on one page.
///
/// Invariant: every cell's span lies within `rows x columns`, spans never
/// overlap, and together they cover the whole grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRegion {
    /// Page-space bounds
    pub bbox: Rect,
    /// Grid rows
    pub rows: usize,
    /// Grid columns
    pub columns: usize,
    /// Cells in row-major order of their top-left position
    pub cells: Vec<Cell>,
    /// Structural evidence score in `[0, 1]`
    pub confidence: f32,
    /// Origin of the row boundaries
    pub row_source: BoundarySource,
    /// Origin of the column boundaries
    pub column_source: BoundarySource,
}

impl TableRegion {
    /// The cell whose span covers `(row, col)`.
    pub fn cell_at(&self, row: usize, col: usize) -> Option<&Cell> {
        self.cells.iter().find(|c| c.covers(row, col))
    }

    /// Text grid, one `Vec` per row. Positions covered by a span but not at
    /// its top-left corner are empty strings.
    pub fn grid(&self) -> Vec<Vec<String>> {
        let mut grid = vec![vec![String::new(); self.columns]; self.rows];
        for cell in &self.cells {
            if let Some(slot) = grid.get_mut(cell.row).and_then(|r| r.get_mut(cell.col)) {
                slot.clone_from(&cell.text);
            }
        }
        grid
    }

    /// Cells covering more than one grid position.
    pub fn spanning_cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter().filter(|c| c.area() > 1)
    }

    /// Check the span invariant.
    pub fn is_well_formed(&self) -> bool {
        let mut covered = vec![false; self.rows * self.columns];
        for cell in &self.cells {
            if cell.row_span == 0
                || cell.col_span == 0
                || cell.row + cell.row_span > self.rows
                || cell.col + cell.col_span > self.columns
            {
                return false;
            }
            for r in cell.row..cell.row + cell.row_span {
                for c in cell.col..cell.col + cell.col_span {
                    let slot = &mut covered[r * self.columns + c];
                    if *slot {
                        return false;
                    }
                    *slot = true;
                }
            }
        }
        covered.iter().all(|&c| c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(cells: Vec<Cell>, rows: usize, columns: usize) -> TableRegion {
        TableRegion {
            bbox: Rect::new(0.0, 0.0, 100.0, 100.0),
            rows,
            columns,
            cells,
            confidence: 1.0,
            row_source: BoundarySource::Rulings,
            column_source: BoundarySource::Rulings,
        }
    }

    #[test]
    fn test_grid_with_span() {
        let mut header = Cell::new(0, 0);
        header.col_span = 2;
        header.text = "Totals".into();
        let mut a = Cell::new(1, 0);
        a.text = "1".into();
        let mut b = Cell::new(1, 1);
        b.text = "2".into();
        let t = table(vec![header, a, b], 2, 2);
        assert!(t.is_well_formed());
        assert_eq!(t.grid(), vec![vec!["Totals".to_string(), String::new()], vec!["1".into(), "2".into()]]);
        assert_eq!(t.cell_at(0, 1).map(|c| c.text.as_str()), Some("Totals"));
        assert_eq!(t.spanning_cells().count(), 1);
    }

    #[test]
    fn test_well_formed_detects_problems() {
        let mut wide = Cell::new(0, 0);
        wide.col_span = 2;
        assert!(!table(vec![wide.clone(), Cell::new(0, 1)], 1, 2).is_well_formed());
        assert!(!table(vec![Cell::new(0, 0)], 1, 2).is_well_formed());
        wide.col_span = 3;
        assert!(!table(vec![wide], 1, 2).is_well_formed());
    }
}
