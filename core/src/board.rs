use rand::seq::{IndexedRandom, SliceRandom};
use rand::Rng;

use crate::grid::{Direction, GridDims};

pub const ROTATION_STEPS: u8 = 4;

/// Quarter turns, always in `0..4`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rotation(u8);

impl Rotation {
    pub const ZERO: Rotation = Rotation(0);

    pub fn new(quarter_turns: u8) -> Self {
        Self(quarter_turns % ROTATION_STEPS)
    }

    pub fn quarter_turns(self) -> u8 {
        self.0
    }

    pub fn degrees(self) -> u32 {
        self.0 as u32 * 90
    }

    pub fn turned(self) -> Self {
        Self::new(self.0 + 1)
    }

    pub fn is_upright(self) -> bool {
        self.0 == 0
    }

    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self(rng.random_range(0..ROTATION_STEPS))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Slot {
    #[default]
    Empty,
    Occupied {
        piece: u32,
        rotation: Rotation,
    },
}

impl Slot {
    pub fn piece(&self) -> Option<u32> {
        match self {
            Slot::Empty => None,
            Slot::Occupied { piece, .. } => Some(*piece),
        }
    }

    pub fn rotation(&self) -> Option<Rotation> {
        match self {
            Slot::Empty => None,
            Slot::Occupied { rotation, .. } => Some(*rotation),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Slot::Empty)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BoardRules {
    /// Newly placed pieces start at a random quarter turn.
    pub random_rotation: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaceOutcome {
    Placed { slot: usize },
    AlreadyPlaced { slot: usize },
    NoFreeSlot,
    OutOfRange,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveRejection {
    OutOfRange,
    EmptySource,
    NotAdjacent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveOutcome {
    Swapped,
    Moved,
    Rejected(MoveRejection),
}

impl MoveOutcome {
    pub fn is_applied(&self) -> bool {
        !matches!(self, MoveOutcome::Rejected(_))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub removed: Vec<u32>,
    pub placed: Vec<u32>,
}

impl ReconcileReport {
    pub fn changed(&self) -> bool {
        !self.removed.is_empty() || !self.placed.is_empty()
    }
}

/// Slot grid of one image. Completion is always derived from the slots.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Board {
    dims: GridDims,
    slots: Vec<Slot>,
    rules: BoardRules,
}

impl Board {
    pub fn new(dims: GridDims, rules: BoardRules) -> Self {
        Self {
            dims,
            slots: vec![Slot::Empty; dims.total()],
            rules,
        }
    }

    /// Rebuilds a board from persisted arrays. Out-of-range and repeated
    /// pieces are dropped; missing rotations read as upright.
    pub fn from_state(
        dims: GridDims,
        rules: BoardRules,
        slot_state: &[Option<u32>],
        rotation_state: &[u8],
    ) -> Self {
        let total = dims.total();
        let mut seen = vec![false; total];
        let mut slots = vec![Slot::Empty; total];
        for (idx, entry) in slot_state.iter().take(total).enumerate() {
            let Some(piece) = *entry else {
                continue;
            };
            let id = piece as usize;
            if id >= total || seen[id] {
                continue;
            }
            seen[id] = true;
            let rotation = rotation_state
                .get(idx)
                .copied()
                .map(Rotation::new)
                .unwrap_or_default();
            slots[idx] = Slot::Occupied { piece, rotation };
        }
        Self { dims, slots, rules }
    }

    pub fn dims(&self) -> GridDims {
        self.dims
    }

    pub fn rules(&self) -> BoardRules {
        self.rules
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> Option<Slot> {
        self.slots.get(index).copied()
    }

    pub fn slot_state(&self) -> Vec<Option<u32>> {
        self.slots.iter().map(Slot::piece).collect()
    }

    pub fn rotation_state(&self) -> Vec<u8> {
        self.slots
            .iter()
            .map(|slot| slot.rotation().unwrap_or_default().quarter_turns())
            .collect()
    }

    pub fn slot_of(&self, piece: u32) -> Option<usize> {
        self.slots.iter().position(|slot| slot.piece() == Some(piece))
    }

    pub fn placed_count(&self) -> usize {
        self.slots.iter().filter(|slot| !slot.is_empty()).count()
    }

    pub fn is_completed(&self) -> bool {
        !self.slots.is_empty()
            && self.slots.iter().enumerate().all(|(idx, slot)| match slot {
                Slot::Occupied { piece, rotation } => {
                    *piece as usize == idx && rotation.is_upright()
                }
                Slot::Empty => false,
            })
    }

    /// Puts a freshly collected piece into an empty slot, avoiding the
    /// piece's home slot unless nothing else is free.
    pub fn place_new_piece<R: Rng + ?Sized>(&mut self, piece: u32, rng: &mut R) -> PlaceOutcome {
        if !self.dims.contains(piece as usize) {
            return PlaceOutcome::OutOfRange;
        }
        if let Some(slot) = self.slot_of(piece) {
            return PlaceOutcome::AlreadyPlaced { slot };
        }
        let empty: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_empty())
            .map(|(idx, _)| idx)
            .collect();
        let away_from_home: Vec<usize> = empty
            .iter()
            .copied()
            .filter(|idx| *idx != piece as usize)
            .collect();
        let pool = if away_from_home.is_empty() {
            &empty
        } else {
            &away_from_home
        };
        let Some(&slot) = pool.choose(rng) else {
            return PlaceOutcome::NoFreeSlot;
        };
        let rotation = if self.rules.random_rotation {
            Rotation::random(rng)
        } else {
            Rotation::ZERO
        };
        self.slots[slot] = Slot::Occupied { piece, rotation };
        PlaceOutcome::Placed { slot }
    }

    /// Brings the board in line with the collected set: pieces that are not
    /// collected leave the board, collected pieces missing from it are placed.
    pub fn reconcile<R: Rng + ?Sized>(&mut self, collected: &[u32], rng: &mut R) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        for slot in self.slots.iter_mut() {
            if let Some(piece) = slot.piece() {
                if !collected.contains(&piece) {
                    report.removed.push(piece);
                    *slot = Slot::Empty;
                }
            }
        }
        for &piece in collected {
            if let PlaceOutcome::Placed { .. } = self.place_new_piece(piece, rng) {
                report.placed.push(piece);
            }
        }
        report
    }

    pub fn swap_or_move(&mut self, from: usize, to: usize) -> MoveOutcome {
        if !self.dims.contains(from) || !self.dims.contains(to) {
            return MoveOutcome::Rejected(MoveRejection::OutOfRange);
        }
        if self.slots[from].is_empty() {
            return MoveOutcome::Rejected(MoveRejection::EmptySource);
        }
        if !self.dims.is_adjacent(from, to) {
            return MoveOutcome::Rejected(MoveRejection::NotAdjacent);
        }
        let target_empty = self.slots[to].is_empty();
        self.slots.swap(from, to);
        if target_empty {
            MoveOutcome::Moved
        } else {
            MoveOutcome::Swapped
        }
    }

    /// Keyboard form of [`Board::swap_or_move`]: pushes the piece one cell in
    /// `dir` and reports where it ended up.
    pub fn shift(&mut self, from: usize, dir: Direction) -> (MoveOutcome, Option<usize>) {
        let Some(to) = self.dims.neighbor(from, dir) else {
            let rejection = if self.dims.contains(from) {
                MoveRejection::NotAdjacent
            } else {
                MoveRejection::OutOfRange
            };
            return (MoveOutcome::Rejected(rejection), None);
        };
        let outcome = self.swap_or_move(from, to);
        let landed = outcome.is_applied().then_some(to);
        (outcome, landed)
    }

    pub fn rotate(&mut self, slot: usize) -> bool {
        match self.slots.get_mut(slot) {
            Some(Slot::Occupied { rotation, .. }) => {
                *rotation = rotation.turned();
                true
            }
            _ => false,
        }
    }

    /// Clears the board and re-places every collected piece in random order
    /// with the usual placement policy.
    pub fn scramble<R: Rng + ?Sized>(&mut self, collected: &[u32], rng: &mut R) {
        self.slots.iter_mut().for_each(|slot| *slot = Slot::Empty);
        let mut order: Vec<u32> = collected.to_vec();
        order.shuffle(rng);
        for piece in order {
            self.place_new_piece(piece, rng);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn plain() -> BoardRules {
        BoardRules {
            random_rotation: false,
        }
    }

    fn board(slots: &[Option<u32>]) -> Board {
        let side = (slots.len() as f64).sqrt() as u32;
        Board::from_state(GridDims::square(side), plain(), slots, &[])
    }

    #[test]
    fn place_avoids_home_slot() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..50 {
            let mut board = board(&[None, None, None, None]);
            let outcome = board.place_new_piece(2, &mut rng);
            let PlaceOutcome::Placed { slot } = outcome else {
                panic!("unexpected {outcome:?}");
            };
            assert_ne!(slot, 2);
        }
    }

    #[test]
    fn place_falls_back_to_home_when_only_slot() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut board = board(&[Some(1), Some(0), None, Some(3)]);
        assert_eq!(
            board.place_new_piece(2, &mut rng),
            PlaceOutcome::Placed { slot: 2 }
        );
        assert_eq!(
            board.place_new_piece(2, &mut rng),
            PlaceOutcome::AlreadyPlaced { slot: 2 }
        );
        assert_eq!(board.place_new_piece(9, &mut rng), PlaceOutcome::OutOfRange);
    }

    #[test]
    fn last_piece_fills_rectangular_board() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut board = Board::from_state(
            GridDims { rows: 2, cols: 3 },
            plain(),
            &[Some(0), Some(1), Some(2), Some(3), Some(4), None],
            &[],
        );
        assert_eq!(board.place_new_piece(5, &mut rng), PlaceOutcome::Placed { slot: 5 });
        assert_eq!(board.placed_count(), 6);
        assert!(board.is_completed());
    }

    #[test]
    fn swap_exchanges_piece_and_rotation() {
        let mut board = Board::from_state(
            GridDims::square(2),
            plain(),
            &[Some(1), Some(0), None, None],
            &[3, 1, 0, 0],
        );
        assert_eq!(board.swap_or_move(0, 1), MoveOutcome::Swapped);
        assert_eq!(board.slot_state(), vec![Some(0), Some(1), None, None]);
        assert_eq!(board.rotation_state(), vec![1, 3, 0, 0]);
    }

    #[test]
    fn move_into_empty_leaves_source_empty() {
        let mut board = board(&[Some(3), None, None, None]);
        assert_eq!(board.swap_or_move(0, 2), MoveOutcome::Moved);
        assert_eq!(board.slot_state(), vec![None, None, Some(3), None]);
    }

    #[test]
    fn invalid_moves_are_no_ops() {
        let mut board = board(&[Some(3), None, None, Some(1)]);
        let before = board.clone();
        assert_eq!(
            board.swap_or_move(0, 3),
            MoveOutcome::Rejected(MoveRejection::NotAdjacent)
        );
        assert_eq!(
            board.swap_or_move(1, 0),
            MoveOutcome::Rejected(MoveRejection::EmptySource)
        );
        assert_eq!(
            board.swap_or_move(0, 17),
            MoveOutcome::Rejected(MoveRejection::OutOfRange)
        );
        assert_eq!(board, before);
    }

    #[test]
    fn shift_follows_direction() {
        let mut board = board(&[Some(3), None, None, None]);
        assert_eq!(board.shift(0, Direction::Down), (MoveOutcome::Moved, Some(2)));
        let (outcome, landed) = board.shift(2, Direction::Down);
        assert_eq!(outcome, MoveOutcome::Rejected(MoveRejection::NotAdjacent));
        assert_eq!(landed, None);
    }

    #[test]
    fn rotate_cycles_through_quarter_turns() {
        let mut board = board(&[Some(0), None, None, None]);
        for expected in [1, 2, 3, 0] {
            assert!(board.rotate(0));
            assert_eq!(board.rotation_state()[0], expected);
        }
        assert!(!board.rotate(1));
    }

    #[test]
    fn completion_requires_every_home_piece_upright() {
        let solved = Board::from_state(
            GridDims::square(2),
            plain(),
            &[Some(0), Some(1), Some(2), Some(3)],
            &[0, 0, 0, 0],
        );
        assert!(solved.is_completed());

        let turned = Board::from_state(
            GridDims::square(2),
            plain(),
            &[Some(0), Some(1), Some(2), Some(3)],
            &[0, 0, 2, 0],
        );
        assert!(!turned.is_completed());

        let swapped = board(&[Some(0), Some(1), Some(3), Some(2)]);
        assert!(!swapped.is_completed());

        let gap = board(&[Some(0), Some(1), Some(2), None]);
        assert!(!gap.is_completed());
    }

    #[test]
    fn from_state_drops_duplicates_and_strays() {
        let board = Board::from_state(
            GridDims::square(2),
            plain(),
            &[Some(1), Some(1), Some(42), Some(0), Some(3)],
            &[5, 0, 0, 0],
        );
        assert_eq!(board.slot_state(), vec![Some(1), None, None, Some(0)]);
        assert_eq!(board.rotation_state(), vec![1, 0, 0, 0]);
    }

    #[test]
    fn reconcile_restores_partial_permutation() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut board = board(&[Some(2), None, Some(3), None]);
        let report = board.reconcile(&[0, 2, 1], &mut rng);
        assert_eq!(report.removed, vec![3]);
        let mut placed = report.placed.clone();
        placed.sort_unstable();
        assert_eq!(placed, vec![0, 1]);
        let mut pieces: Vec<u32> = board.slot_state().into_iter().flatten().collect();
        pieces.sort_unstable();
        assert_eq!(pieces, vec![0, 1, 2]);
        assert!(!board.reconcile(&[0, 2, 1], &mut rng).changed());
    }

    #[test]
    fn random_rotation_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut board = Board::new(
            GridDims::square(4),
            BoardRules {
                random_rotation: true,
            },
        );
        let collected: Vec<u32> = (0..16).collect();
        board.reconcile(&collected, &mut rng);
        assert!(board.rotation_state().iter().all(|r| *r < ROTATION_STEPS));
        assert_eq!(board.placed_count(), 16);
    }
}
