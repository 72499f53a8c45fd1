//! Board Geometry
//!
//! A square grid numbered along a serpentine path. Row 0 is numbered
//! left-to-right starting from the highest value, the next row
//! right-to-left, and so on, so consecutive values are always adjacent.
//! Players start on value 1 and finish on the highest value.

use std::collections::{BTreeMap, BTreeSet};
use serde::{Serialize, Deserialize};

use crate::config::{validate_board, ConfigError};
use crate::core::rng::{light_color, RandomSource};
use crate::game::state::PlayerId;

/// Cell coordinates, 0-indexed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Row from the top.
    pub row: usize,
    /// Column from the left.
    pub col: usize,
}

impl Position {
    /// Create a position.
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// A single board cell.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// Path value (1 = start).
    pub value: u32,
    /// Where a player landing here is sent, if this is a portal source.
    pub portal: Option<Position>,
    /// Display color.
    pub color: String,
    /// Players on this cell, in arrival order.
    pub occupants: Vec<PlayerId>,
}

impl Cell {
    fn blank(color: &str) -> Self {
        Self {
            value: 0,
            portal: None,
            color: color.to_string(),
            occupants: Vec::new(),
        }
    }

    /// Check if landing here teleports.
    #[inline]
    pub fn is_portal(&self) -> bool {
        self.portal.is_some()
    }

    /// Check if a player is on this cell.
    pub fn contains(&self, player_id: &PlayerId) -> bool {
        self.occupants.iter().any(|id| id == player_id)
    }
}

/// One portal, by cell values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalPair {
    /// Value of the cell that teleports.
    pub source: u32,
    /// Value of the cell the player ends on.
    pub dest: u32,
}

/// The game board.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Board {
    size: usize,
    cells: Vec<Vec<Cell>>,
    /// Value → position index. Built once.
    finder: BTreeMap<u32, Position>,
    last_cell_value: u32,
    portals: Vec<PortalPair>,
}

impl Board {
    /// Build a board with `max_portals` randomly placed portal pairs.
    pub fn new(
        size: usize,
        max_portals: usize,
        default_color: &str,
        rng: &mut dyn RandomSource,
    ) -> Result<Self, ConfigError> {
        validate_board(size, max_portals, default_color)?;
        let mut board = Self::numbered(size, default_color);

        // Every value except start and finish is a candidate endpoint
        let mut candidates: Vec<u32> = (2..board.last_cell_value).collect();
        for _ in 0..max_portals {
            let idx = rng.next_below(candidates.len() as u32) as usize;
            let source = candidates.swap_remove(idx);
            let idx = rng.next_below(candidates.len() as u32) as usize;
            let dest = candidates.swap_remove(idx);

            let color = light_color(rng);
            board.link(PortalPair { source, dest }, color);
        }

        Ok(board)
    }

    /// Build a board with explicit portal pairs.
    ///
    /// Endpoints must lie strictly between the start and finish values and
    /// no value may be used twice.
    pub fn with_portals(
        size: usize,
        pairs: &[PortalPair],
        default_color: &str,
        rng: &mut dyn RandomSource,
    ) -> Result<Self, ConfigError> {
        validate_board(size, pairs.len(), default_color)?;
        let mut board = Self::numbered(size, default_color);

        let mut used = BTreeSet::new();
        for pair in pairs {
            for value in [pair.source, pair.dest] {
                if value <= 1 || value >= board.last_cell_value {
                    return Err(ConfigError::InvalidConfiguration(format!(
                        "portal endpoint {value} must be between 2 and {}",
                        board.last_cell_value - 1
                    )));
                }
                if !used.insert(value) {
                    return Err(ConfigError::InvalidConfiguration(format!(
                        "cell {value} is used by more than one portal endpoint"
                    )));
                }
            }
            board.link(*pair, light_color(rng));
        }

        Ok(board)
    }

    /// Grid with serpentine values and no portals.
    fn numbered(size: usize, default_color: &str) -> Self {
        let last_cell_value = (size * size) as u32;
        let mut cells = vec![vec![Cell::blank(default_color); size]; size];
        let mut finder = BTreeMap::new();

        let mut value = last_cell_value;
        for (row, cells_in_row) in cells.iter_mut().enumerate() {
            for step in 0..size {
                let col = if row % 2 == 0 { step } else { size - step - 1 };
                cells_in_row[col].value = value;
                finder.insert(value, Position::new(row, col));
                value -= 1;
            }
        }

        Self {
            size,
            cells,
            finder,
            last_cell_value,
            portals: Vec::new(),
        }
    }

    fn link(&mut self, pair: PortalPair, color: String) {
        let source = self.finder[&pair.source];
        let dest = self.finder[&pair.dest];

        let cell = &mut self.cells[source.row][source.col];
        cell.portal = Some(dest);
        cell.color = color.clone();
        self.cells[dest.row][dest.col].color = color;
        self.portals.push(pair);
    }

    /// Board dimension.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Highest cell value (`size²`), held by the finish cell.
    pub fn last_cell_value(&self) -> u32 {
        self.last_cell_value
    }

    /// Where every player starts (value 1).
    pub fn start(&self) -> Position {
        self.finder[&1]
    }

    /// The finish cell (highest value).
    pub fn finish(&self) -> Position {
        self.finder[&self.last_cell_value]
    }

    /// Look up the position holding `value`.
    pub fn position_of(&self, value: u32) -> Option<Position> {
        self.finder.get(&value).copied()
    }

    /// Get a cell.
    pub fn cell(&self, pos: Position) -> Option<&Cell> {
        self.cells.get(pos.row).and_then(|row| row.get(pos.col))
    }

    /// Get a cell mutably.
    pub(crate) fn cell_mut(&mut self, pos: Position) -> Option<&mut Cell> {
        self.cells.get_mut(pos.row).and_then(|row| row.get_mut(pos.col))
    }

    /// Value of the cell at `pos`.
    pub fn value_at(&self, pos: Position) -> Option<u32> {
        self.cell(pos).map(|c| c.value)
    }

    /// All rows, top to bottom.
    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.cells
    }

    /// Portal pairs in creation order.
    pub fn portals(&self) -> &[PortalPair] {
        &self.portals
    }

    /// Where a player landing on `value` ends up.
    ///
    /// Returns the final position and whether a portal was taken. Portals
    /// never chain: a destination is never itself a source.
    pub fn resolve(&self, value: u32) -> Option<(Position, bool)> {
        let landing = self.position_of(value)?;
        match self.cell(landing)?.portal {
            Some(dest) => Some((dest, true)),
            None => Some((landing, false)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rng::XorShiftRng;

    fn plain_board(size: usize) -> Board {
        Board::new(size, 0, "#FFFFFF", &mut XorShiftRng::new(1)).unwrap()
    }

    #[test]
    fn test_serpentine_numbering() {
        let board = plain_board(10);

        assert_eq!(board.last_cell_value(), 100);
        assert_eq!(board.value_at(Position::new(0, 0)), Some(100));
        assert_eq!(board.value_at(Position::new(0, 9)), Some(91));
        assert_eq!(board.value_at(Position::new(1, 9)), Some(90));
        assert_eq!(board.value_at(Position::new(1, 0)), Some(81));
        assert_eq!(board.value_at(Position::new(9, 0)), Some(1));
        assert_eq!(board.value_at(Position::new(9, 9)), Some(10));

        assert_eq!(board.start(), Position::new(9, 0));
        assert_eq!(board.finish(), Position::new(0, 0));
    }

    #[test]
    fn test_start_is_bottom_left() {
        for size in [2, 4, 6, 10] {
            let board = plain_board(size);
            assert_eq!(board.start(), Position::new(size - 1, 0), "size {size}");
            assert_eq!(board.finish(), Position::new(0, 0), "size {size}");
        }
    }

    #[test]
    fn test_odd_board_rejected() {
        for size in [3, 5, 7] {
            assert!(matches!(
                Board::new(size, 0, "#FFFFFF", &mut XorShiftRng::new(1)),
                Err(ConfigError::InvalidConfiguration(_))
            ));
            assert!(matches!(
                Board::with_portals(size, &[], "#FFFFFF", &mut XorShiftRng::new(1)),
                Err(ConfigError::InvalidConfiguration(_))
            ));
        }
    }

    #[test]
    fn test_consecutive_values_are_adjacent() {
        for size in [2, 4, 6, 10] {
            let board = plain_board(size);
            for value in 1..board.last_cell_value() {
                let a = board.position_of(value).unwrap();
                let b = board.position_of(value + 1).unwrap();
                let distance = a.row.abs_diff(b.row) + a.col.abs_diff(b.col);
                assert_eq!(distance, 1, "values {value} and {} on size {size}", value + 1);
            }
        }
    }

    #[test]
    fn test_finder_is_bijection() {
        let board = plain_board(6);
        let mut seen = BTreeSet::new();

        for (row, cells) in board.rows().iter().enumerate() {
            for (col, cell) in cells.iter().enumerate() {
                assert!(seen.insert(cell.value));
                assert_eq!(board.position_of(cell.value), Some(Position::new(row, col)));
            }
        }
        assert_eq!(seen.len(), 36);
        assert_eq!(seen.first(), Some(&1));
        assert_eq!(seen.last(), Some(&36));
    }

    #[test]
    fn test_random_portals_are_disjoint() {
        let mut rng = XorShiftRng::new(99);
        let board = Board::new(10, 20, "#FFFFFF", &mut rng).unwrap();
        assert_eq!(board.portals().len(), 20);

        let mut endpoints = BTreeSet::new();
        for pair in board.portals() {
            assert!(endpoints.insert(pair.source));
            assert!(endpoints.insert(pair.dest));
            assert!(pair.source > 1 && pair.source < 100);
            assert!(pair.dest > 1 && pair.dest < 100);

            let source = board.cell(board.position_of(pair.source).unwrap()).unwrap();
            let dest_pos = board.position_of(pair.dest).unwrap();
            assert_eq!(source.portal, Some(dest_pos));
            assert!(!board.cell(dest_pos).unwrap().is_portal());
            assert_eq!(source.color, board.cell(dest_pos).unwrap().color);
        }

        let portal_cells = board.rows().iter().flatten().filter(|c| c.is_portal()).count();
        assert_eq!(portal_cells, 20);
    }

    #[test]
    fn test_portals_can_fill_board() {
        // 4x4: values 2..=15 give 14 candidates, room for 7 pairs
        let board = Board::new(4, 7, "#FFFFFF", &mut XorShiftRng::new(5)).unwrap();
        assert_eq!(board.portals().len(), 7);
        assert!(Board::new(4, 8, "#FFFFFF", &mut XorShiftRng::new(5)).is_err());
    }

    #[test]
    fn test_explicit_portals() {
        let pairs = [PortalPair { source: 50, dest: 20 }, PortalPair { source: 30, dest: 77 }];
        let board = Board::with_portals(10, &pairs, "#FFFFFF", &mut XorShiftRng::new(3)).unwrap();

        assert_eq!(board.resolve(50), Some((board.position_of(20).unwrap(), true)));
        assert_eq!(board.resolve(30), Some((board.position_of(77).unwrap(), true)));
        assert_eq!(board.resolve(20), Some((board.position_of(20).unwrap(), false)));
        assert_eq!(board.resolve(101), None);
    }

    #[test]
    fn test_explicit_portals_rejected() {
        let mut rng = XorShiftRng::new(3);
        let bad = [
            vec![PortalPair { source: 1, dest: 20 }],
            vec![PortalPair { source: 50, dest: 100 }],
            vec![PortalPair { source: 50, dest: 20 }, PortalPair { source: 20, dest: 60 }],
            vec![PortalPair { source: 50, dest: 50 }],
        ];
        for pairs in bad {
            assert!(matches!(
                Board::with_portals(10, &pairs, "#FFFFFF", &mut rng),
                Err(ConfigError::InvalidConfiguration(_))
            ));
        }
    }

    #[test]
    fn test_default_color_applied() {
        let board = plain_board(4);
        assert!(board.rows().iter().flatten().all(|c| c.color == "#FFFFFF"));
        assert!(board.rows().iter().flatten().all(|c| c.occupants.is_empty()));
    }
}
