use std::cell::RefCell;
use std::rc::Rc;

use puzzlehunt_core::{Board, BoardRules, BoardSnapshot, ExtensionMsg, ImageId, PuzzleImage};
use rand::rngs::StdRng;

use crate::bus::MessageBus;
use crate::clock::now_ms;
use crate::console;
use crate::input::{CellRect, GridAction, GridInput, GridKey, PointerId, PointerKind};
use crate::repository::Repository;
use crate::storage::{StorageArea, StorageError};

/// Fired once when a puzzle goes from solving to solved.
pub trait Celebration {
    fn celebrate(&self, image: &PuzzleImage);
}

impl<F: Fn(&PuzzleImage)> Celebration for F {
    fn celebrate(&self, image: &PuzzleImage) {
        self(image)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ViewError {
    #[error("image {0} not found")]
    NotFound(ImageId),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewUpdate {
    pub changed: bool,
    pub completed_now: bool,
    pub selection: Option<usize>,
}

struct ViewState {
    image: PuzzleImage,
    board: Board,
    input: GridInput,
    rng: StdRng,
}

/// The puzzle page for one image: owns the board, applies input and keeps
/// storage in step after every accepted change.
pub struct PuzzleView<S, B, C> {
    repo: Rc<Repository<S>>,
    bus: B,
    celebration: C,
    rules: BoardRules,
    state: RefCell<ViewState>,
}

impl<S, B, C> PuzzleView<S, B, C>
where
    S: StorageArea,
    B: MessageBus,
    C: Celebration,
{
    /// Loads the image and repairs its board against the collected set.
    pub async fn open(
        repo: Rc<Repository<S>>,
        bus: B,
        celebration: C,
        image_id: &ImageId,
        mut rng: StdRng,
    ) -> Result<Self, ViewError> {
        let settings = repo.settings().await?;
        let rules = BoardRules {
            random_rotation: settings.random_rotation,
        };
        let image = repo
            .image(image_id)
            .await?
            .ok_or_else(|| ViewError::NotFound(image_id.clone()))?;
        let mut board = image.board(rules);
        let report = board.reconcile(&image.collected, &mut rng);
        let repaired = report.changed()
            || board.slot_state() != image.slots
            || board.rotation_state() != image.rotations;
        if !report.removed.is_empty() {
            console::warn(&format!(
                "{image_id}: dropped uncollected pieces {:?}",
                report.removed
            ));
        }
        let view = Self {
            repo,
            bus,
            celebration,
            rules,
            state: RefCell::new(ViewState {
                image,
                board,
                input: GridInput::new(),
                rng,
            }),
        };
        if repaired {
            view.persist(false).await?;
        }
        Ok(view)
    }

    pub fn image_id(&self) -> ImageId {
        self.state.borrow().image.id.clone()
    }

    pub fn image(&self) -> PuzzleImage {
        self.state.borrow().image.clone()
    }

    pub fn board(&self) -> Board {
        self.state.borrow().board.clone()
    }

    pub fn selection(&self) -> Option<usize> {
        self.state.borrow().input.selection()
    }

    pub fn is_completed(&self) -> bool {
        self.state.borrow().board.is_completed()
    }

    /// What the page draws: board, selection and progress.
    pub fn snapshot(&self) -> BoardSnapshot {
        let state = self.state.borrow();
        BoardSnapshot::new(&state.image, &state.board, state.input.selection())
    }

    pub async fn apply(&self, action: GridAction) -> Result<ViewUpdate, ViewError> {
        let (changed, reopen, selection) = {
            let mut state = self.state.borrow_mut();
            let ViewState {
                image,
                board,
                input,
                rng,
            } = &mut *state;
            let (changed, reopen) = match action {
                GridAction::Select(selection) => {
                    let selection =
                        selection.filter(|slot| board.slot(*slot).is_some_and(|s| !s.is_empty()));
                    input.set_selection(selection);
                    (false, false)
                }
                GridAction::SwapOrMove { from, to } => {
                    let applied = board.swap_or_move(from, to).is_applied();
                    if applied && input.selection() == Some(from) {
                        input.set_selection(Some(to));
                    }
                    (applied, false)
                }
                GridAction::Shift { from, dir } => {
                    let (outcome, landed) = board.shift(from, dir);
                    if landed.is_some() {
                        input.set_selection(landed);
                    }
                    (outcome.is_applied(), false)
                }
                GridAction::Rotate { slot } => (board.rotate(slot), false),
                GridAction::Scramble => {
                    board.scramble(&image.collected, rng);
                    input.set_selection(None);
                    (true, true)
                }
            };
            (changed, reopen, input.selection())
        };
        let completed_now = if changed {
            self.persist(reopen).await?
        } else {
            false
        };
        Ok(ViewUpdate {
            changed,
            completed_now,
            selection,
        })
    }

    pub fn pointer_down(
        &self,
        cells: &[CellRect],
        pointer: PointerId,
        kind: PointerKind,
        x: f32,
        y: f32,
    ) {
        let mut state = self.state.borrow_mut();
        let ViewState { board, input, .. } = &mut *state;
        input.pointer_down(board, cells, pointer, kind, x, y);
    }

    pub fn pointer_move(&self, pointer: PointerId, x: f32, y: f32) {
        self.state.borrow_mut().input.pointer_move(pointer, x, y);
    }

    pub fn pointer_cancel(&self, pointer: PointerId) {
        self.state.borrow_mut().input.pointer_cancel(pointer);
    }

    pub async fn pointer_up(
        &self,
        cells: &[CellRect],
        pointer: PointerId,
        x: f32,
        y: f32,
    ) -> Result<Option<ViewUpdate>, ViewError> {
        let action = self.state.borrow_mut().input.pointer_up(cells, pointer, x, y);
        match action {
            Some(action) => self.apply(action).await.map(Some),
            None => Ok(None),
        }
    }

    /// Keyboard entry point; takes the DOM `key` value.
    pub async fn key(&self, key: &str) -> Result<Option<ViewUpdate>, ViewError> {
        let action = GridKey::from_key(key).and_then(|key| self.state.borrow().input.key(key));
        match action {
            Some(action) => self.apply(action).await.map(Some),
            None => Ok(None),
        }
    }

    /// A piece collected somewhere else lands on this board.
    pub async fn on_piece_collected(
        &self,
        image_id: &ImageId,
        piece: u32,
        collected: &[u32],
    ) -> Result<bool, ViewError> {
        let changed = {
            let mut state = self.state.borrow_mut();
            let ViewState {
                image, board, rng, ..
            } = &mut *state;
            if &image.id != image_id {
                return Ok(false);
            }
            image.merge_collected(collected);
            image.collect_piece(piece);
            board.reconcile(&image.collected, rng).changed()
        };
        if changed {
            self.persist(false).await?;
        }
        Ok(changed)
    }

    /// Adopts whatever storage holds now, then repairs it.
    pub async fn refresh(&self) -> Result<bool, ViewError> {
        let image_id = self.image_id();
        let stored = self
            .repo
            .image(&image_id)
            .await?
            .ok_or_else(|| ViewError::NotFound(image_id.clone()))?;
        let repaired = {
            let mut state = self.state.borrow_mut();
            let ViewState {
                image,
                board,
                input,
                rng,
            } = &mut *state;
            let mut fresh_board = stored.board(self.rules);
            let mut collected = stored.collected.clone();
            for piece in &image.collected {
                if !collected.contains(piece) {
                    collected.push(*piece);
                }
            }
            let report = fresh_board.reconcile(&collected, rng);
            let repaired = report.changed()
                || fresh_board.slot_state() != stored.slots
                || fresh_board.rotation_state() != stored.rotations
                || collected.len() != stored.collected.len();
            *image = stored;
            image.merge_collected(&collected);
            *board = fresh_board;
            if input
                .selection()
                .is_some_and(|slot| board.slot(slot).is_none_or(|s| s.is_empty()))
            {
                input.set_selection(None);
            }
            repaired
        };
        if repaired {
            self.persist(false).await?;
        }
        Ok(repaired)
    }

    pub async fn on_message(&self, msg: &ExtensionMsg) -> Result<bool, ViewError> {
        match msg {
            ExtensionMsg::PieceCollected {
                image_id,
                piece,
                collected,
            } => self.on_piece_collected(image_id, *piece, collected).await,
            ExtensionMsg::PuzzleStateUpdated { image_id } if *image_id == self.image_id() => {
                self.refresh().await
            }
            _ => Ok(false),
        }
    }

    /// Writes the board back into the stored image and handles the
    /// completion transition. Returns true when this write solved the puzzle.
    async fn persist(&self, reopen: bool) -> Result<bool, ViewError> {
        let (image_id, slots, rotations, collected, solved) = {
            let state = self.state.borrow();
            (
                state.image.id.clone(),
                state.board.slot_state(),
                state.board.rotation_state(),
                state.image.collected.clone(),
                state.board.is_completed(),
            )
        };
        let now = now_ms();
        let written = self
            .repo
            .update_images(|images| {
                let Some(stored) = images.iter_mut().find(|image| image.id == image_id) else {
                    return (None, false);
                };
                stored.merge_collected(&collected);
                stored.slots = slots;
                stored.rotations = rotations;
                if reopen {
                    stored.completed_at = None;
                }
                let solved_now = solved && stored.completed_at.is_none();
                if solved_now {
                    stored.completed_at = Some(now);
                } else if !solved {
                    stored.completed_at = None;
                }
                (Some((stored.clone(), solved_now)), true)
            })
            .await?;
        let Some((stored, solved_now)) = written else {
            return Err(ViewError::NotFound(image_id));
        };
        self.state.borrow_mut().image = stored.clone();

        self.bus.send_to_background(&ExtensionMsg::PuzzleStateUpdated {
            image_id: image_id.clone(),
        });
        if solved_now {
            console::log(&format!("{image_id} solved"));
            self.bus.send_to_background(&ExtensionMsg::PuzzleCompleted { image_id });
            self.celebration.celebrate(&stored);
        }
        Ok(solved_now)
    }
}
