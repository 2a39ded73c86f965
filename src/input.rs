use puzzlehunt_core::{Board, Direction, GridDims};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerKind {
    Mouse,
    Touch,
    Pen,
    Unknown,
}

impl PointerKind {
    pub fn from_pointer_type(value: &str) -> Self {
        match value {
            "mouse" => PointerKind::Mouse,
            "touch" => PointerKind::Touch,
            "pen" => PointerKind::Pen,
            _ => PointerKind::Unknown,
        }
    }

    /// Fingers wobble more than a mouse before they mean to drag.
    pub fn drag_slop(self) -> f32 {
        match self {
            PointerKind::Touch => TOUCH_DRAG_SLOP_PX,
            _ => CLICK_DEFAULT_SLOP_PX,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PointerId(pub i32);

pub const CLICK_DEFAULT_SLOP_PX: f32 = 4.0;
pub const TOUCH_DRAG_SLOP_PX: f32 = 10.0;

#[derive(Clone, Copy, Debug)]
pub(crate) struct DragSlopGate {
    start: [f32; 2],
    slop: f32,
    moved: bool,
}

impl DragSlopGate {
    pub(crate) fn new(start_x: f32, start_y: f32, slop: f32) -> Self {
        Self {
            start: [start_x, start_y],
            slop,
            moved: false,
        }
    }

    pub(crate) fn update(&mut self, x: f32, y: f32) -> bool {
        if self.moved {
            return true;
        }
        let dx = x - self.start[0];
        let dy = y - self.start[1];
        if dx * dx + dy * dy > self.slop * self.slop {
            self.moved = true;
        }
        self.moved
    }
}

/// On-screen box of one grid cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl CellRect {
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.left && x <= self.left + self.width && y >= self.top && y <= self.top + self.height
    }

    pub fn center(&self) -> (f32, f32) {
        (self.left + self.width * 0.5, self.top + self.height * 0.5)
    }

    fn distance_sq(&self, x: f32, y: f32) -> f32 {
        let (cx, cy) = self.center();
        (x - cx) * (x - cx) + (y - cy) * (y - cy)
    }
}

/// Row-major cell boxes for a grid drawn at `(left, top)` with `gap` between
/// cells.
pub fn grid_cells(dims: GridDims, left: f32, top: f32, cell: f32, gap: f32) -> Vec<CellRect> {
    (0..dims.total())
        .map(|index| {
            let (col, row) = dims.coords(index);
            CellRect {
                left: left + col as f32 * (cell + gap),
                top: top + row as f32 * (cell + gap),
                width: cell,
                height: cell,
            }
        })
        .collect()
}

/// Cell under `(x, y)`. Containment wins; shared edges and gaps between cells
/// go to the nearest centre. Points outside the whole grid hit nothing.
pub fn hit_test(cells: &[CellRect], x: f32, y: f32) -> Option<usize> {
    let containing: Vec<(usize, &CellRect)> = cells
        .iter()
        .enumerate()
        .filter(|(_, cell)| cell.contains(x, y))
        .collect();
    match containing.len() {
        1 => Some(containing[0].0),
        0 => {
            let bounds = bounding_box(cells)?;
            if !bounds.contains(x, y) {
                return None;
            }
            nearest(cells.iter().enumerate(), x, y)
        }
        _ => nearest(containing.into_iter(), x, y),
    }
}

fn nearest<'a>(
    candidates: impl Iterator<Item = (usize, &'a CellRect)>,
    x: f32,
    y: f32,
) -> Option<usize> {
    candidates
        .min_by(|(_, a), (_, b)| a.distance_sq(x, y).total_cmp(&b.distance_sq(x, y)))
        .map(|(index, _)| index)
}

fn bounding_box(cells: &[CellRect]) -> Option<CellRect> {
    let first = cells.first()?;
    let (mut min_x, mut min_y) = (first.left, first.top);
    let (mut max_x, mut max_y) = (first.left + first.width, first.top + first.height);
    for cell in &cells[1..] {
        min_x = min_x.min(cell.left);
        min_y = min_y.min(cell.top);
        max_x = max_x.max(cell.left + cell.width);
        max_y = max_y.max(cell.top + cell.height);
    }
    Some(CellRect {
        left: min_x,
        top: min_y,
        width: max_x - min_x,
        height: max_y - min_y,
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GridKey {
    Arrow(Direction),
    Rotate,
    ClearSelection,
}

impl GridKey {
    /// Maps a DOM `KeyboardEvent.key` value.
    pub fn from_key(value: &str) -> Option<Self> {
        match value {
            "ArrowUp" => Some(GridKey::Arrow(Direction::Up)),
            "ArrowRight" => Some(GridKey::Arrow(Direction::Right)),
            "ArrowDown" => Some(GridKey::Arrow(Direction::Down)),
            "ArrowLeft" => Some(GridKey::Arrow(Direction::Left)),
            "r" | "R" => Some(GridKey::Rotate),
            "Escape" => Some(GridKey::ClearSelection),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GridAction {
    Select(Option<usize>),
    SwapOrMove { from: usize, to: usize },
    Shift { from: usize, dir: Direction },
    Rotate { slot: usize },
    Scramble,
}

#[derive(Clone, Copy, Debug)]
struct GridDrag {
    pointer: PointerId,
    from: usize,
    gate: DragSlopGate,
}

/// Turns pointer and key events on the grid into board actions. Holds the
/// selection and at most one drag.
#[derive(Clone, Debug, Default)]
pub struct GridInput {
    drag: Option<GridDrag>,
    selection: Option<usize>,
}

impl GridInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selection(&self) -> Option<usize> {
        self.selection
    }

    pub fn set_selection(&mut self, selection: Option<usize>) {
        self.selection = selection;
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// A press on an occupied cell arms a drag. Other presses wait for the
    /// release.
    pub fn pointer_down(
        &mut self,
        board: &Board,
        cells: &[CellRect],
        pointer: PointerId,
        kind: PointerKind,
        x: f32,
        y: f32,
    ) {
        if self.drag.is_some() {
            return;
        }
        let Some(slot) = hit_test(cells, x, y) else {
            return;
        };
        if board.slot(slot).is_some_and(|slot| !slot.is_empty()) {
            self.drag = Some(GridDrag {
                pointer,
                from: slot,
                gate: DragSlopGate::new(x, y, kind.drag_slop()),
            });
        }
    }

    pub fn pointer_move(&mut self, pointer: PointerId, x: f32, y: f32) {
        if let Some(drag) = self.drag.as_mut().filter(|drag| drag.pointer == pointer) {
            drag.gate.update(x, y);
        }
    }

    pub fn pointer_cancel(&mut self, pointer: PointerId) {
        if self.drag.is_some_and(|drag| drag.pointer == pointer) {
            self.drag = None;
        }
    }

    pub fn pointer_up(
        &mut self,
        cells: &[CellRect],
        pointer: PointerId,
        x: f32,
        y: f32,
    ) -> Option<GridAction> {
        let target = hit_test(cells, x, y);
        match self.drag.take() {
            Some(mut drag) if drag.pointer == pointer => {
                if drag.gate.update(x, y) {
                    let to = target?;
                    return (to != drag.from).then_some(GridAction::SwapOrMove {
                        from: drag.from,
                        to,
                    });
                }
                let selection = if self.selection == Some(drag.from) {
                    None
                } else {
                    Some(drag.from)
                };
                Some(GridAction::Select(selection))
            }
            Some(drag) => {
                self.drag = Some(drag);
                None
            }
            None => match (self.selection, target) {
                (Some(from), Some(to)) if from != to => Some(GridAction::SwapOrMove { from, to }),
                (Some(_), None) => Some(GridAction::Select(None)),
                _ => None,
            },
        }
    }

    pub fn key(&self, key: GridKey) -> Option<GridAction> {
        match key {
            GridKey::Arrow(dir) => self.selection.map(|from| GridAction::Shift { from, dir }),
            GridKey::Rotate => self.selection.map(|slot| GridAction::Rotate { slot }),
            GridKey::ClearSelection => Some(GridAction::Select(None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use puzzlehunt_core::BoardRules;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn board_with(pieces: &[u32]) -> Board {
        let dims = GridDims::new(2, 2).expect("dims");
        let mut board = Board::new(dims, BoardRules::default());
        let mut rng = StdRng::seed_from_u64(1);
        for &piece in pieces {
            board.place_new_piece(piece, &mut rng);
        }
        board
    }

    #[test]
    fn hit_test_prefers_containment_then_nearest_centre() {
        let cells = grid_cells(GridDims::new(2, 2).expect("dims"), 0.0, 0.0, 10.0, 2.0);
        assert_eq!(hit_test(&cells, 5.0, 5.0), Some(0));
        assert_eq!(hit_test(&cells, 17.0, 3.0), Some(1));
        // Inside the gap, closer to the lower-left cell.
        assert_eq!(hit_test(&cells, 4.0, 11.5), Some(2));
        assert_eq!(hit_test(&cells, 40.0, 40.0), None);
        let touching = vec![
            CellRect { left: 0.0, top: 0.0, width: 10.0, height: 10.0 },
            CellRect { left: 10.0, top: 0.0, width: 10.0, height: 10.0 },
        ];
        assert_eq!(hit_test(&touching, 10.0, 2.0), Some(0));
    }

    #[test]
    fn drag_from_occupied_cell_requests_swap() {
        let board = board_with(&[0, 1, 2, 3]);
        let cells = grid_cells(board.dims(), 0.0, 0.0, 10.0, 0.0);
        let mut input = GridInput::new();
        input.pointer_down(&board, &cells, PointerId(1), PointerKind::Mouse, 5.0, 5.0);
        assert!(input.is_dragging());
        input.pointer_move(PointerId(1), 15.0, 5.0);
        assert_eq!(
            input.pointer_up(&cells, PointerId(1), 15.0, 5.0),
            Some(GridAction::SwapOrMove { from: 0, to: 1 })
        );
        assert!(!input.is_dragging());
    }

    #[test]
    fn press_on_empty_cell_does_not_drag() {
        let board = board_with(&[]);
        let cells = grid_cells(board.dims(), 0.0, 0.0, 10.0, 0.0);
        let mut input = GridInput::new();
        input.pointer_down(&board, &cells, PointerId(1), PointerKind::Mouse, 5.0, 5.0);
        assert!(!input.is_dragging());
        assert_eq!(input.pointer_up(&cells, PointerId(1), 15.0, 5.0), None);
    }

    #[test]
    fn click_selects_and_keys_follow_selection() {
        let board = board_with(&[0, 1, 2, 3]);
        let cells = grid_cells(board.dims(), 0.0, 0.0, 10.0, 0.0);
        let mut input = GridInput::new();
        assert_eq!(input.key(GridKey::Rotate), None);
        input.pointer_down(&board, &cells, PointerId(2), PointerKind::Touch, 14.0, 4.0);
        input.pointer_move(PointerId(2), 16.0, 5.0);
        let action = input.pointer_up(&cells, PointerId(2), 16.0, 5.0);
        assert_eq!(action, Some(GridAction::Select(Some(1))));
        input.set_selection(Some(1));
        assert_eq!(
            input.key(GridKey::Arrow(Direction::Down)),
            Some(GridAction::Shift { from: 1, dir: Direction::Down })
        );
        assert_eq!(input.key(GridKey::Rotate), Some(GridAction::Rotate { slot: 1 }));
        assert_eq!(
            input.key(GridKey::ClearSelection),
            Some(GridAction::Select(None))
        );
    }

    #[test]
    fn dom_keys_map_to_grid_keys() {
        assert_eq!(GridKey::from_key("ArrowLeft"), Some(GridKey::Arrow(Direction::Left)));
        assert_eq!(GridKey::from_key("R"), Some(GridKey::Rotate));
        assert_eq!(GridKey::from_key("Escape"), Some(GridKey::ClearSelection));
        assert_eq!(GridKey::from_key("q"), None);
        assert_eq!(PointerKind::from_pointer_type("pen"), PointerKind::Pen);
    }
}
