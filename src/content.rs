use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use puzzlehunt_core::{
    overlay_layout, ExtensionMsg, HuntRules, ImageId, OverlayLayout, PieceRect, PuzzleImage,
    ScatterPick, ScatterScheduler, TickDecision,
};
use rand::rngs::StdRng;

use crate::bus::{MessageBus, TabId};
use crate::collection::{collect_piece, CollectOutcome};
use crate::console;
use crate::repository::Repository;
use crate::storage::StorageArea;

/// Everything the page needs to draw one scattered piece.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayPiece {
    pub image_id: ImageId,
    pub piece: u32,
    pub source: String,
    pub source_width: u32,
    pub source_height: u32,
    pub crop: PieceRect,
    pub layout: OverlayLayout,
}

/// Draws the scattered piece on the host page.
pub trait PieceOverlay {
    fn show(&self, piece: &OverlayPiece);
    fn remove(&self);
    fn viewport(&self) -> (f32, f32);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageEffect {
    None,
    PieceWithdrawn,
    ResumeScatter,
    PauseScatter,
}

struct ContentState {
    scheduler: ScatterScheduler,
    rng: StdRng,
}

/// Per-tab scatter loop and click handling.
pub struct ContentScript<S, B, V> {
    tab: TabId,
    repo: Rc<Repository<S>>,
    bus: B,
    overlay: V,
    rules: HuntRules,
    state: RefCell<ContentState>,
    running: Cell<bool>,
    /// Bumped by every loop start; a loop that sees a newer value stops.
    generation: Cell<u64>,
}

impl<S, B, V> ContentScript<S, B, V>
where
    S: StorageArea,
    B: MessageBus,
    V: PieceOverlay,
{
    pub fn new(
        tab: TabId,
        repo: Rc<Repository<S>>,
        bus: B,
        overlay: V,
        rules: HuntRules,
        rng: StdRng,
    ) -> Self {
        let rules = rules.sanitized();
        Self {
            tab,
            repo,
            bus,
            overlay,
            rules,
            state: RefCell::new(ContentState {
                scheduler: ScatterScheduler::new(rules.eligibility_scale),
                rng,
            }),
            running: Cell::new(false),
            generation: Cell::new(0),
        }
    }

    pub fn tab(&self) -> TabId {
        self.tab
    }

    pub fn visible(&self) -> Option<ScatterPick> {
        self.state.borrow().scheduler.visible().cloned()
    }

    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    pub fn eligibility(&self, image_id: &ImageId) -> Option<bool> {
        self.state.borrow().scheduler.eligibility().decision(image_id)
    }

    /// One scheduling attempt against a fresh read of storage.
    pub async fn tick(&self) -> TickDecision {
        let enabled = match self.repo.enabled().await {
            Ok(enabled) => enabled,
            Err(err) => {
                console::warn(&format!("tab {}: enabled flag unreadable: {err}", self.tab.0));
                return TickDecision::Idle;
            }
        };
        if !enabled {
            return TickDecision::Disabled;
        }
        let images = match self.repo.images().await {
            Ok(images) => images,
            Err(err) => {
                console::warn(&format!("tab {}: image list unreadable: {err}", self.tab.0));
                return TickDecision::Idle;
            }
        };

        let viewport = self.overlay.viewport();
        let (decision, shown) = {
            let mut state = self.state.borrow_mut();
            let ContentState { scheduler, rng } = &mut *state;
            let decision = scheduler.tick(&images, enabled, rng);
            let shown = match &decision {
                TickDecision::Show(pick) => overlay_piece(&images, pick, viewport, rng),
                _ => None,
            };
            (decision, shown)
        };
        if let Some(piece) = shown {
            console::debug(&format!(
                "tab {}: showing {}#{}",
                self.tab.0, piece.image_id, piece.piece
            ));
            self.overlay.show(&piece);
        }
        decision
    }

    /// Ticks until the enabled flag goes off. A second call while the loop is
    /// live returns at once. A loop paused mid-sleep and replaced by a newer
    /// one exits when it wakes.
    pub async fn run<F, Fut>(&self, mut sleep: F)
    where
        F: FnMut(Duration) -> Fut,
        Fut: Future<Output = ()>,
    {
        if self.running.replace(true) {
            return;
        }
        let generation = self.generation.get().wrapping_add(1);
        self.generation.set(generation);
        let interval = Duration::from_millis(u64::from(self.rules.tick_interval_ms));
        loop {
            if self.tick().await == TickDecision::Disabled {
                break;
            }
            sleep(interval).await;
            if !self.owns_loop(generation) {
                return;
            }
        }
        if self.owns_loop(generation) {
            self.running.set(false);
        }
    }

    fn owns_loop(&self, generation: u64) -> bool {
        self.running.get() && self.generation.get() == generation
    }

    /// Click on the visible piece. The overlay goes away before storage is
    /// touched and stays gone whatever the write does.
    pub async fn on_piece_clicked(&self) -> Option<CollectOutcome> {
        let pick = self.state.borrow_mut().scheduler.take_visible()?;
        self.overlay.remove();
        let outcome = collect_piece(&self.repo, &self.bus, &pick.image_id, pick.piece).await;
        Some(outcome)
    }

    pub fn on_message(&self, msg: &ExtensionMsg) -> MessageEffect {
        match msg {
            ExtensionMsg::PieceCollected {
                image_id, piece, ..
            } => {
                let withdrawn = self.state.borrow_mut().scheduler.withdraw(image_id, *piece);
                if withdrawn {
                    self.overlay.remove();
                    return MessageEffect::PieceWithdrawn;
                }
                MessageEffect::None
            }
            ExtensionMsg::ImageRemoved { image_id } => {
                let withdrawn = self.state.borrow_mut().scheduler.forget_image(image_id);
                if withdrawn {
                    self.overlay.remove();
                    return MessageEffect::PieceWithdrawn;
                }
                MessageEffect::None
            }
            ExtensionMsg::ToggleEnabled { enabled: true } => MessageEffect::ResumeScatter,
            ExtensionMsg::ToggleEnabled { enabled: false } => {
                self.running.set(false);
                MessageEffect::PauseScatter
            }
            _ => MessageEffect::None,
        }
    }
}

fn overlay_piece(
    images: &[PuzzleImage],
    pick: &ScatterPick,
    viewport: (f32, f32),
    rng: &mut StdRng,
) -> Option<OverlayPiece> {
    let image = images.iter().find(|image| image.id == pick.image_id)?;
    let crop = image
        .dims
        .piece_rect(pick.piece as usize, image.width, image.height)?;
    Some(OverlayPiece {
        image_id: image.id.clone(),
        piece: pick.piece,
        source: image.source.clone(),
        source_width: image.width,
        source_height: image.height,
        crop,
        layout: overlay_layout(crop, viewport.0, viewport.1, rng),
    })
}
