use std::cell::RefCell;
use std::rc::Rc;

use gloo::events::EventListener;
use wasm_bindgen::JsCast;
use web_sys::{Document, HtmlElement};

use crate::console;
use crate::content::{OverlayPiece, PieceOverlay};

const OVERLAY_Z_INDEX: &str = "2147483646";

pub(crate) type ClickHandler = Rc<RefCell<Option<Rc<dyn Fn()>>>>;

/// Absolutely positioned `<div>` showing the piece crop as a background
/// image. One at a time.
pub(crate) struct DomOverlay {
    document: Document,
    element: RefCell<Option<(HtmlElement, EventListener)>>,
    on_click: ClickHandler,
}

impl DomOverlay {
    pub(crate) fn new(document: Document, on_click: ClickHandler) -> Self {
        Self {
            document,
            element: RefCell::new(None),
            on_click,
        }
    }

    fn build(&self, piece: &OverlayPiece) -> Option<HtmlElement> {
        let element = self
            .document
            .create_element("div")
            .ok()?
            .dyn_into::<HtmlElement>()
            .ok()?;
        let layout = piece.layout;
        let scale = layout.width / piece.crop.width.max(1) as f32;
        let style = element.style();
        let rules = [
            ("position", "fixed".to_string()),
            ("left", format!("{:.1}px", layout.left)),
            ("top", format!("{:.1}px", layout.top)),
            ("width", format!("{:.1}px", layout.width)),
            ("height", format!("{:.1}px", layout.height)),
            ("background-image", format!("url(\"{}\")", piece.source)),
            (
                "background-size",
                format!(
                    "{:.1}px {:.1}px",
                    piece.source_width as f32 * scale,
                    piece.source_height as f32 * scale
                ),
            ),
            (
                "background-position",
                format!(
                    "-{:.1}px -{:.1}px",
                    piece.crop.x as f32 * scale,
                    piece.crop.y as f32 * scale
                ),
            ),
            ("cursor", "pointer".to_string()),
            ("z-index", OVERLAY_Z_INDEX.to_string()),
        ];
        for (name, value) in rules {
            style.set_property(name, &value).ok()?;
        }
        Some(element)
    }
}

impl PieceOverlay for DomOverlay {
    fn show(&self, piece: &OverlayPiece) {
        self.remove();
        let Some(element) = self.build(piece) else {
            console::warn("could not build piece overlay");
            return;
        };
        let Some(body) = self.document.body() else {
            return;
        };
        if body.append_child(&element).is_err() {
            return;
        }
        let on_click = Rc::clone(&self.on_click);
        let listener = EventListener::new(&element, "click", move |_event| {
            let handler = on_click.borrow().clone();
            if let Some(handler) = handler {
                handler();
            }
        });
        *self.element.borrow_mut() = Some((element, listener));
    }

    fn remove(&self) {
        if let Some((element, _listener)) = self.element.borrow_mut().take() {
            element.remove();
        }
    }

    fn viewport(&self) -> (f32, f32) {
        let Some(window) = web_sys::window() else {
            return (0.0, 0.0);
        };
        let read = |value: Result<wasm_bindgen::JsValue, wasm_bindgen::JsValue>| {
            value.ok().and_then(|value| value.as_f64()).unwrap_or(0.0) as f32
        };
        (read(window.inner_width()), read(window.inner_height()))
    }
}
