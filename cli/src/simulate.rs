use std::cell::{Cell, RefCell};
use std::rc::Rc;

use puzzlehunt::input::GridAction;
use puzzlehunt::{
    Background, ContentScript, Endpoint, Gallery, LocalBus, LocalPort, MemoryStorage,
    MessageEffect, OverlayPiece, PieceOverlay, PuzzleView, Repository, TabId,
};
use puzzlehunt_core::{HuntRules, ImageId, PuzzleImage, TickDecision, UploadRecord};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub tabs: usize,
    pub images: usize,
    pub difficulty: u32,
    pub frequency: i64,
    pub ticks: u32,
    pub click_chance: f64,
    pub feed_capacity: u32,
    pub seed: u64,
    pub solve: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReport {
    pub id: ImageId,
    pub label: String,
    pub collected: usize,
    pub total: usize,
    pub completed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SimReport {
    pub images: Vec<ImageReport>,
    pub shown: usize,
    pub clicks: usize,
    pub collected: usize,
    pub withdrawn: usize,
    pub relayed: usize,
    pub cursor: u64,
    pub celebrations: usize,
}

/// Counts what would have been drawn on the page.
#[derive(Clone, Default)]
struct HeadlessOverlay {
    shown: Rc<Cell<usize>>,
}

impl PieceOverlay for HeadlessOverlay {
    fn show(&self, piece: &OverlayPiece) {
        tracing::trace!(image = %piece.image_id, piece = piece.piece, "overlay shown");
        self.shown.set(self.shown.get() + 1);
    }

    fn remove(&self) {}

    fn viewport(&self) -> (f32, f32) {
        (1280.0, 800.0)
    }
}

type Tab = ContentScript<MemoryStorage, LocalPort, HeadlessOverlay>;

struct World {
    repo: Rc<Repository<MemoryStorage>>,
    bus: LocalBus,
    background: Background<MemoryStorage, LocalPort>,
    tabs: Vec<Tab>,
    changed: Rc<RefCell<Vec<String>>>,
}

impl World {
    /// Delivers queued messages and storage notifications until both are
    /// quiet.
    async fn settle(&self, report: &mut SimReport) {
        loop {
            let inbound = self.bus.drain(Endpoint::Background);
            for (from, msg) in &inbound {
                self.background.on_message(*from, msg);
                report.relayed += 1;
            }
            for tab in &self.tabs {
                for (_, msg) in self.bus.drain(Endpoint::Tab(tab.tab())) {
                    if tab.on_message(&msg) == MessageEffect::PieceWithdrawn {
                        report.withdrawn += 1;
                    }
                }
            }
            self.bus.drain(Endpoint::Page);
            let keys: Vec<String> = self.changed.borrow_mut().drain(..).collect();
            for key in &keys {
                self.background.on_storage_changed(key).await;
            }
            if inbound.is_empty() && keys.is_empty() && self.bus.pending() == 0 {
                break;
            }
        }
    }
}

pub async fn run(config: SimConfig) -> Result<SimReport, Box<dyn std::error::Error>> {
    let storage = MemoryStorage::new();
    let repo = Rc::new(Repository::new(storage.clone()));
    repo.set_settings(HuntRules {
        feed_capacity: config.feed_capacity,
        default_difficulty: config.difficulty,
        ..HuntRules::default()
    })
    .await?;
    let rules = repo.settings().await?;

    let changed = Rc::new(RefCell::new(Vec::new()));
    let _subscription = {
        let changed = Rc::clone(&changed);
        storage.subscribe(Rc::new(move |key: &str| {
            changed.borrow_mut().push(key.to_string());
        }))
    };

    let bus = LocalBus::new();
    let background = Background::new(Rc::clone(&repo), bus.background());
    background.start().await;

    let gallery = Gallery::new(
        Rc::clone(&repo),
        bus.open_page(),
        StdRng::seed_from_u64(config.seed),
    );
    for index in 0..config.images {
        gallery
            .add_image(UploadRecord {
                label: format!("image-{index}"),
                source: format!("sim://image-{index}.png"),
                width: 600,
                height: 600,
                dims: None,
                frequency: Some(config.frequency),
            })
            .await?;
    }

    let overlay = HeadlessOverlay::default();
    let tabs = (0..config.tabs)
        .map(|index| {
            let tab = TabId(index as i32 + 1);
            ContentScript::new(
                tab,
                Rc::clone(&repo),
                bus.open_tab(tab),
                overlay.clone(),
                rules,
                StdRng::seed_from_u64(config.seed.wrapping_add(index as u64 + 1)),
            )
        })
        .collect();
    let world = World {
        repo: Rc::clone(&repo),
        bus,
        background,
        tabs,
        changed,
    };

    let mut report = SimReport::default();
    world.settle(&mut report).await;
    let mut clicker = StdRng::seed_from_u64(config.seed ^ 0x5ca7_7e12);
    for tick in 0..config.ticks {
        for tab in &world.tabs {
            if let TickDecision::Show(pick) = tab.tick().await {
                tracing::debug!(tick, tab = tab.tab().0, image = %pick.image_id, piece = pick.piece, "shown");
            }
            if tab.visible().is_some() && clicker.random_bool(config.click_chance.clamp(0.0, 1.0)) {
                if let Some(outcome) = tab.on_piece_clicked().await {
                    report.clicks += 1;
                    if outcome.is_collected() {
                        report.collected += 1;
                    }
                }
            }
            world.settle(&mut report).await;
        }
    }
    report.shown = overlay.shown.get();

    if config.solve {
        report.celebrations = solve_all(&world, &mut report, config.seed).await?;
    }

    report.cursor = world.repo.cursor().await?.0;
    report.images = world
        .repo
        .images()
        .await?
        .iter()
        .map(|image| ImageReport {
            id: image.id.clone(),
            label: image.label.clone(),
            collected: image.collected.len(),
            total: image.total_pieces(),
            completed: image.completed_at.is_some(),
        })
        .collect();
    Ok(report)
}

async fn solve_all(
    world: &World,
    report: &mut SimReport,
    seed: u64,
) -> Result<usize, Box<dyn std::error::Error>> {
    let celebrations = Rc::new(Cell::new(0));
    let images = world.repo.images().await?;
    for image in images.iter().filter(|image| image.is_fully_collected()) {
        let counter = Rc::clone(&celebrations);
        let view = PuzzleView::open(
            Rc::clone(&world.repo),
            world.bus.open_page(),
            move |image: &PuzzleImage| {
                tracing::info!(image = %image.id, "puzzle solved");
                counter.set(counter.get() + 1);
            },
            &image.id,
            StdRng::seed_from_u64(seed),
        )
        .await?;
        solve(&view).await?;
        world.settle(report).await;
    }
    Ok(celebrations.get())
}

/// Walks each piece home through adjacent swaps, filling cells in index
/// order, then turns it upright.
async fn solve<C: puzzlehunt::Celebration>(
    view: &PuzzleView<MemoryStorage, LocalPort, C>,
) -> Result<(), puzzlehunt::ViewError> {
    let dims = view.board().dims();
    let cols = dims.cols as usize;
    for target in 0..dims.total() {
        let Some(mut at) = view.board().slot_of(target as u32) else {
            continue;
        };
        let (tcol, trow) = dims.coords(target);
        while at != target {
            let (col, row) = dims.coords(at);
            // Stay inside the unsolved cells so finished ones are never disturbed.
            let next = if row > trow && col > tcol {
                at - 1
            } else if row > trow && col < tcol {
                at + 1
            } else if row > trow {
                at - cols
            } else {
                at - 1
            };
            view.apply(GridAction::SwapOrMove { from: at, to: next }).await?;
            at = next;
        }
        while view
            .board()
            .slot(target)
            .and_then(|slot| slot.rotation())
            .is_some_and(|rotation| !rotation.is_upright())
        {
            view.apply(GridAction::Rotate { slot: target }).await?;
        }
    }
    Ok(())
}
