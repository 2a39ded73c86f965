use serde::{Deserialize as SerdeDeserialize, Serialize as SerdeSerialize};

pub const GRID_SIDE_MIN: u32 = 2;
pub const GRID_SIDE_MAX: u32 = 10;
pub const DEFAULT_DIFFICULTY: u32 = 3;

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    rkyv::Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    SerdeSerialize,
    SerdeDeserialize,
)]
pub struct GridDims {
    pub rows: u32,
    pub cols: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Up,
    Right,
    Down,
    Left,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Right,
        Direction::Down,
        Direction::Left,
    ];
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, SerdeSerialize)]
pub struct PieceRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl GridDims {
    pub fn new(rows: u32, cols: u32) -> Option<Self> {
        let valid = |side: u32| (GRID_SIDE_MIN..=GRID_SIDE_MAX).contains(&side);
        if valid(rows) && valid(cols) {
            Some(Self { rows, cols })
        } else {
            None
        }
    }

    /// Square grid for a difficulty level, clamped into the supported range.
    pub fn square(difficulty: u32) -> Self {
        let side = difficulty.clamp(GRID_SIDE_MIN, GRID_SIDE_MAX);
        Self {
            rows: side,
            cols: side,
        }
    }

    pub fn total(&self) -> usize {
        self.rows as usize * self.cols as usize
    }

    pub fn contains(&self, index: usize) -> bool {
        index < self.total()
    }

    /// (col, row) of a linear slot or piece index.
    pub fn coords(&self, index: usize) -> (usize, usize) {
        let cols = self.cols.max(1) as usize;
        (index % cols, index / cols)
    }

    pub fn index_of(&self, col: usize, row: usize) -> Option<usize> {
        if col < self.cols as usize && row < self.rows as usize {
            Some(row * self.cols as usize + col)
        } else {
            None
        }
    }

    pub fn is_adjacent(&self, a: usize, b: usize) -> bool {
        if !self.contains(a) || !self.contains(b) {
            return false;
        }
        let (ax, ay) = self.coords(a);
        let (bx, by) = self.coords(b);
        ax.abs_diff(bx) + ay.abs_diff(by) == 1
    }

    pub fn neighbor(&self, index: usize, dir: Direction) -> Option<usize> {
        if !self.contains(index) {
            return None;
        }
        let cols = self.cols as usize;
        let rows = self.rows as usize;
        let (col, row) = self.coords(index);
        match dir {
            Direction::Up if row > 0 => Some(index - cols),
            Direction::Right if col + 1 < cols => Some(index + 1),
            Direction::Down if row + 1 < rows => Some(index + cols),
            Direction::Left if col > 0 => Some(index - 1),
            _ => None,
        }
    }

    /// Source crop of a piece. Edges absorb the remainder so the pieces tile
    /// the whole image.
    pub fn piece_rect(&self, piece: usize, width: u32, height: u32) -> Option<PieceRect> {
        if !self.contains(piece) {
            return None;
        }
        let (col, row) = self.coords(piece);
        let edge = |i: usize, span: u32, parts: u32| -> u32 {
            ((i as u64 * span as u64) / parts.max(1) as u64) as u32
        };
        let x0 = edge(col, width, self.cols);
        let x1 = edge(col + 1, width, self.cols);
        let y0 = edge(row, height, self.rows);
        let y1 = edge(row + 1, height, self.rows);
        Some(PieceRect {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DifficultyChoice {
    pub difficulty: u32,
    pub dims: GridDims,
}

pub fn difficulty_choices() -> Vec<DifficultyChoice> {
    (GRID_SIDE_MIN..=GRID_SIDE_MAX)
        .map(|difficulty| DifficultyChoice {
            difficulty,
            dims: GridDims::square(difficulty),
        })
        .collect()
}

pub fn difficulty_label(choice: &DifficultyChoice) -> String {
    format!(
        "{} pieces ({}x{})",
        choice.dims.total(),
        choice.dims.cols,
        choice.dims.rows
    )
}
