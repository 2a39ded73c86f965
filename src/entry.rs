use std::cell::RefCell;
use std::rc::Rc;

use gloo::events::EventListener;
use puzzlehunt_core::{ImageId, PuzzleImage};
use puzzlehunt_image_pipeline::{ImagePipeline, PipelineConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::spawn_local;
use web_sys::{Element, KeyboardEvent, PointerEvent};

use crate::background::Background;
use crate::bus::TabId;
use crate::chrome::{on_message, on_storage_changed, ChromeBus, ChromeStorage};
use crate::console;
use crate::content::{ContentScript, MessageEffect};
use crate::gallery::Gallery;
use crate::input::{grid_cells, CellRect, GridAction, PointerId, PointerKind};
use crate::overlay::{ClickHandler, DomOverlay};
use crate::puzzle_view::PuzzleView;
use crate::repository::Repository;

fn fresh_rng() -> StdRng {
    StdRng::from_rng(&mut rand::rng())
}

fn repository() -> Rc<Repository<ChromeStorage>> {
    Rc::new(Repository::new(ChromeStorage))
}

#[wasm_bindgen]
pub fn start_background() {
    let background = Rc::new(Background::new(repository(), ChromeBus));
    {
        let background = Rc::clone(&background);
        on_message(move |from, msg| {
            background.on_message(from, &msg);
        });
    }
    {
        let background = Rc::clone(&background);
        on_storage_changed(move |key| {
            let background = Rc::clone(&background);
            spawn_local(async move {
                background.on_storage_changed(&key).await;
            });
        });
    }
    spawn_local(async move {
        background.start().await;
    });
}

type ChromeContent = ContentScript<ChromeStorage, ChromeBus, DomOverlay>;

fn spawn_scatter(content: &Rc<ChromeContent>) {
    let content = Rc::clone(content);
    spawn_local(async move {
        content.run(gloo::timers::future::sleep).await;
    });
}

/// `tab_id` is handed over by the loader script; it only labels logs.
#[wasm_bindgen]
pub fn start_content_script(tab_id: i32) {
    let Some(document) = web_sys::window().and_then(|window| window.document()) else {
        return;
    };
    spawn_local(async move {
        let repo = repository();
        let rules = match repo.settings().await {
            Ok(rules) => rules,
            Err(err) => {
                console::warn(&format!("settings unreadable, using defaults: {err}"));
                Default::default()
            }
        };
        let clicks: ClickHandler = Rc::new(RefCell::new(None));
        let content = Rc::new(ContentScript::new(
            TabId(tab_id),
            repo,
            ChromeBus,
            DomOverlay::new(document, Rc::clone(&clicks)),
            rules,
            fresh_rng(),
        ));
        {
            let weak = Rc::downgrade(&content);
            *clicks.borrow_mut() = Some(Rc::new(move || {
                let Some(content) = weak.upgrade() else {
                    return;
                };
                spawn_local(async move {
                    content.on_piece_clicked().await;
                });
            }));
        }
        {
            let content = Rc::clone(&content);
            on_message(move |_from, msg| {
                if content.on_message(&msg) == MessageEffect::ResumeScatter {
                    spawn_scatter(&content);
                }
            });
        }
        spawn_scatter(&content);
    });
}

#[wasm_bindgen]
pub async fn gallery_add_upload(label: String, bytes: Vec<u8>) -> Result<String, JsValue> {
    let gallery = Gallery::new(repository(), ChromeBus, fresh_rng());
    let pipeline = ImagePipeline::new(PipelineConfig::default());
    gallery
        .add_upload(&label, &bytes, &pipeline, None)
        .await
        .map(|id| id.to_string())
        .map_err(|err| JsValue::from_str(&err.to_string()))
}

#[wasm_bindgen]
pub async fn gallery_remove_image(image_id: String) -> Result<bool, JsValue> {
    let image_id = parse_id(&image_id)?;
    let gallery = Gallery::new(repository(), ChromeBus, fresh_rng());
    gallery
        .remove_image(&image_id)
        .await
        .map_err(|err| JsValue::from_str(&err.to_string()))
}

/// Accepts whatever the input field held; junk falls back to the default.
#[wasm_bindgen]
pub async fn gallery_set_frequency(image_id: String, raw: f64) -> Result<u32, JsValue> {
    let image_id = parse_id(&image_id)?;
    let raw = if raw.is_finite() { raw as i64 } else { 0 };
    let gallery = Gallery::new(repository(), ChromeBus, fresh_rng());
    gallery
        .set_frequency(&image_id, raw)
        .await
        .map(|frequency| frequency.get())
        .map_err(|err| JsValue::from_str(&err.to_string()))
}

#[wasm_bindgen]
pub async fn gallery_set_enabled(enabled: bool) -> Result<(), JsValue> {
    let gallery = Gallery::new(repository(), ChromeBus, fresh_rng());
    gallery
        .set_enabled(enabled)
        .await
        .map_err(|err| JsValue::from_str(&err.to_string()))
}

#[wasm_bindgen]
pub async fn gallery_set_difficulty(difficulty: u32) -> Result<u32, JsValue> {
    let gallery = Gallery::new(repository(), ChromeBus, fresh_rng());
    gallery
        .set_default_difficulty(difficulty)
        .await
        .map(|rules| rules.default_difficulty)
        .map_err(|err| JsValue::from_str(&err.to_string()))
}

fn parse_id(raw: &str) -> Result<ImageId, JsValue> {
    ImageId::parse(raw).map_err(|err| JsValue::from_str(&err.to_string()))
}

/// Marks the grid element; the page styles and sounds take it from there.
struct GridCelebration {
    grid: Element,
}

impl crate::puzzle_view::Celebration for GridCelebration {
    fn celebrate(&self, image: &PuzzleImage) {
        if let Err(err) = self.grid.set_attribute("data-completed", image.id.as_str()) {
            console::warn(&format!(
                "could not mark the grid solved: {}",
                crate::chrome::js_err(err)
            ));
        }
    }
}

type ChromeView = PuzzleView<ChromeStorage, ChromeBus, GridCelebration>;

fn grid_layout(view: &ChromeView, grid: &Element) -> Vec<CellRect> {
    let rect = grid.get_bounding_client_rect();
    let dims = view.image().dims;
    let cell = (rect.width() as f32 / dims.cols as f32).min(rect.height() as f32 / dims.rows as f32);
    grid_cells(dims, rect.left() as f32, rect.top() as f32, cell, 0.0)
}

fn pointer_of(event: &PointerEvent) -> (PointerId, PointerKind, f32, f32) {
    (
        PointerId(event.pointer_id()),
        PointerKind::from_pointer_type(&event.pointer_type()),
        event.client_x() as f32,
        event.client_y() as f32,
    )
}

/// Hands the board to the page's `render` callback as JSON.
fn redraw(view: &ChromeView, render: &js_sys::Function) {
    let Some(json) = view.snapshot().to_json() else {
        console::warn("board snapshot did not serialize");
        return;
    };
    if let Err(err) = render.call1(&JsValue::NULL, &JsValue::from_str(&json)) {
        console::warn(&format!("render failed: {}", crate::chrome::js_err(err)));
    }
}

/// Handle the puzzle page keeps for its buttons.
#[wasm_bindgen]
pub struct PuzzlePage {
    view: Rc<ChromeView>,
    render: js_sys::Function,
}

#[wasm_bindgen]
impl PuzzlePage {
    /// Current board as JSON, for pages that draw it themselves.
    pub fn snapshot(&self) -> Option<String> {
        self.view.snapshot().to_json()
    }

    pub fn scramble(&self) {
        let view = Rc::clone(&self.view);
        let render = self.render.clone();
        spawn_local(async move {
            match view.apply(GridAction::Scramble).await {
                Ok(_) => redraw(&view, &render),
                Err(err) => console::warn(&format!("scramble failed: {err}")),
            }
        });
    }
}

/// Opens the puzzle view for `image_id` on the element with id `grid_id`.
/// `render` receives the board snapshot as JSON after every change.
/// Listeners live as long as the page.
#[wasm_bindgen]
pub async fn start_puzzle_page(
    image_id: String,
    grid_id: String,
    render: js_sys::Function,
) -> Result<PuzzlePage, JsValue> {
    let image_id = parse_id(&image_id)?;
    let document = web_sys::window()
        .and_then(|window| window.document())
        .ok_or_else(|| JsValue::from_str("no document"))?;
    let grid = document
        .get_element_by_id(&grid_id)
        .ok_or_else(|| JsValue::from_str("grid element missing"))?;
    let view = PuzzleView::open(
        repository(),
        ChromeBus,
        GridCelebration { grid: grid.clone() },
        &image_id,
        fresh_rng(),
    )
    .await
    .map_err(|err| JsValue::from_str(&err.to_string()))?;
    let view = Rc::new(view);
    redraw(&view, &render);

    let mut listeners = Vec::new();
    {
        let view = Rc::clone(&view);
        let render = render.clone();
        let target = grid.clone();
        listeners.push(EventListener::new(&grid, "pointerdown", move |event| {
            let Some(event) = event.dyn_ref::<PointerEvent>() else {
                return;
            };
            let (pointer, kind, x, y) = pointer_of(event);
            view.pointer_down(&grid_layout(&view, &target), pointer, kind, x, y);
            redraw(&view, &render);
        }));
    }
    {
        let view = Rc::clone(&view);
        listeners.push(EventListener::new(&grid, "pointermove", move |event| {
            if let Some(event) = event.dyn_ref::<PointerEvent>() {
                let (pointer, _, x, y) = pointer_of(event);
                view.pointer_move(pointer, x, y);
            }
        }));
    }
    {
        let view = Rc::clone(&view);
        listeners.push(EventListener::new(&grid, "pointercancel", move |event| {
            if let Some(event) = event.dyn_ref::<PointerEvent>() {
                view.pointer_cancel(PointerId(event.pointer_id()));
            }
        }));
    }
    {
        let view = Rc::clone(&view);
        let render = render.clone();
        let target = grid.clone();
        listeners.push(EventListener::new(&grid, "pointerup", move |event| {
            let Some(event) = event.dyn_ref::<PointerEvent>() else {
                return;
            };
            let (pointer, _, x, y) = pointer_of(event);
            let cells = grid_layout(&view, &target);
            let view = Rc::clone(&view);
            let render = render.clone();
            spawn_local(async move {
                match view.pointer_up(&cells, pointer, x, y).await {
                    Ok(_) => redraw(&view, &render),
                    Err(err) => console::warn(&format!("puzzle update failed: {err}")),
                }
            });
        }));
    }
    {
        let view = Rc::clone(&view);
        let render = render.clone();
        listeners.push(EventListener::new(&document, "keydown", move |event| {
            let Some(event) = event.dyn_ref::<KeyboardEvent>() else {
                return;
            };
            let key = event.key();
            let view = Rc::clone(&view);
            let render = render.clone();
            spawn_local(async move {
                match view.key(&key).await {
                    Ok(Some(_)) => redraw(&view, &render),
                    Ok(None) => {}
                    Err(err) => console::warn(&format!("puzzle update failed: {err}")),
                }
            });
        }));
    }
    {
        let view = Rc::clone(&view);
        let render = render.clone();
        on_message(move |_from, msg| {
            let view = Rc::clone(&view);
            let render = render.clone();
            spawn_local(async move {
                match view.on_message(&msg).await {
                    Ok(true) => redraw(&view, &render),
                    Ok(false) => {}
                    Err(err) => console::warn(&format!("puzzle refresh failed: {err}")),
                }
            });
        });
    }
    for listener in listeners {
        listener.forget();
    }
    Ok(PuzzlePage { view, render })
}
