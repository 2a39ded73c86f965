pub mod board;
pub mod codec;
pub mod feed;
pub mod grid;
pub mod image_id;
pub mod model;
pub mod protocol;
pub mod records;
pub mod rules;
pub mod scatter;
pub mod snapshot;

pub use board::{
    Board, BoardRules, MoveOutcome, MoveRejection, PlaceOutcome, ReconcileReport, Rotation, Slot,
};
pub use codec::{decode, decode_text, encode, encode_text};
pub use feed::{drain_events, CollectionEvent, DrainOutcome, EventFeed, FeedCursor};
pub use grid::{
    difficulty_choices, difficulty_label, DifficultyChoice, Direction, GridDims, PieceRect,
    DEFAULT_DIFFICULTY, GRID_SIDE_MAX, GRID_SIDE_MIN,
};
pub use image_id::{is_valid_image_id, ImageId, ImageIdError, IMAGE_ID_ALPHABET, IMAGE_ID_LEN};
pub use model::{
    Frequency, PublishOutcome, PublishState, PuzzleImage, UploadError, UploadRecord,
};
pub use protocol::ExtensionMsg;
pub use rules::{HuntRules, FEED_CAPACITY_DEFAULT};
pub use scatter::{
    overlay_layout, EligibilityCache, OverlayLayout, ScatterPick, ScatterScheduler, TickDecision,
};
pub use snapshot::{BoardSnapshot, SlotSnapshot};
