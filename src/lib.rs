//! Runtime of the puzzle-hunt browser extension.
//!
//! Every context (background, extension pages, one content script per tab)
//! talks to the same storage area through a [`Repository`] and to the other
//! contexts through a [`MessageBus`]. Both are traits so the whole extension
//! also runs natively over [`MemoryStorage`] and [`LocalBus`].

pub mod background;
pub mod bus;
pub mod clock;
pub mod collection;
pub(crate) mod console;
pub mod content;
pub mod gallery;
pub mod input;
pub mod publish;
pub mod puzzle_view;
pub mod repository;
pub mod storage;

#[cfg(target_arch = "wasm32")]
mod chrome;
#[cfg(target_arch = "wasm32")]
mod entry;
#[cfg(target_arch = "wasm32")]
mod overlay;

pub use background::{Background, Relay};
pub use bus::{Endpoint, LocalBus, LocalPort, MessageBus, TabId};
pub use collection::{collect_piece, CollectOutcome};
pub use content::{ContentScript, MessageEffect, OverlayPiece, PieceOverlay};
pub use gallery::{Gallery, GalleryEntry, GalleryError};
pub use input::{GridAction, GridInput, GridKey};
pub use publish::{publish_image, PublishError, PublishPipeline, PublishRequest};
pub use puzzle_view::{Celebration, PuzzleView, ViewError, ViewUpdate};
pub use repository::Repository;
pub use storage::{MemoryStorage, StorageArea, StorageError, StorageSubscription};

#[cfg(target_arch = "wasm32")]
pub use chrome::{ChromeBus, ChromeStorage};
