use rand::Rng;

use crate::board::{Board, BoardRules};
use crate::grid::GridDims;
use crate::image_id::ImageId;
use crate::rules::{FREQUENCY_DEFAULT, FREQUENCY_MAX, FREQUENCY_MIN};

/// How often an image's pieces turn up while browsing, 1 (always) to 100
/// (rarely).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    rkyv::Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(from = "i64", into = "u32")]
pub struct Frequency(u32);

impl Frequency {
    pub fn new(value: u32) -> Option<Self> {
        (FREQUENCY_MIN..=FREQUENCY_MAX)
            .contains(&value)
            .then_some(Self(value))
    }

    /// Lenient form used for anything read from storage or a form field.
    pub fn from_raw(value: i64) -> Self {
        u32::try_from(value)
            .ok()
            .and_then(Self::new)
            .unwrap_or_default()
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl Default for Frequency {
    fn default() -> Self {
        Self(FREQUENCY_DEFAULT)
    }
}

impl From<i64> for Frequency {
    fn from(value: i64) -> Self {
        Self::from_raw(value)
    }
}

impl From<Frequency> for u32 {
    fn from(value: Frequency) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
pub struct PublishState {
    pub published: bool,
    pub permalink: Option<String>,
    pub blocked: bool,
    pub failure_message: Option<String>,
}

/// What the external publish pipeline reported back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Published { permalink: String },
    /// Rejected for good (moderation); retrying will not help.
    Blocked { message: String },
    Failed { message: String, retriable: bool },
}

impl PublishState {
    pub fn apply(&mut self, outcome: PublishOutcome) {
        match outcome {
            PublishOutcome::Published { permalink } => {
                self.published = true;
                self.permalink = Some(permalink);
                self.blocked = false;
                self.failure_message = None;
            }
            PublishOutcome::Blocked { message } => {
                self.published = false;
                self.blocked = true;
                self.failure_message = Some(message);
            }
            PublishOutcome::Failed { message, retriable } => {
                self.published = false;
                self.blocked = !retriable;
                self.failure_message = Some(message);
            }
        }
    }

    pub fn can_retry(&self) -> bool {
        !self.published && !self.blocked
    }
}

#[derive(Debug, Clone, PartialEq, Eq, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
pub struct PuzzleImage {
    pub id: ImageId,
    pub label: String,
    /// Opaque image reference (data URI or URL).
    pub source: String,
    pub width: u32,
    pub height: u32,
    pub dims: GridDims,
    pub frequency: Frequency,
    pub collected: Vec<u32>,
    pub slots: Vec<Option<u32>>,
    pub rotations: Vec<u8>,
    pub added_at: u64,
    pub completed_at: Option<u64>,
    pub publish: PublishState,
}

/// Image handed over by the upload pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadRecord {
    pub label: String,
    pub source: String,
    pub width: u32,
    pub height: u32,
    pub dims: Option<GridDims>,
    pub frequency: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    #[error("upload has no image source")]
    MissingSource,
    #[error("invalid image dimensions {width}x{height}")]
    Dimensions { width: u32, height: u32 },
    #[error("unsupported grid {rows}x{cols}")]
    Grid { rows: u32, cols: u32 },
}

impl PuzzleImage {
    /// Only structural fields are checked; the image content is trusted.
    pub fn from_upload<R: Rng + ?Sized>(
        record: UploadRecord,
        difficulty: u32,
        now_ms: u64,
        rng: &mut R,
    ) -> Result<Self, UploadError> {
        if record.source.trim().is_empty() {
            return Err(UploadError::MissingSource);
        }
        if record.width == 0 || record.height == 0 {
            return Err(UploadError::Dimensions {
                width: record.width,
                height: record.height,
            });
        }
        let dims = match record.dims {
            Some(dims) => GridDims::new(dims.rows, dims.cols).ok_or(UploadError::Grid {
                rows: dims.rows,
                cols: dims.cols,
            })?,
            None => GridDims::square(difficulty),
        };
        let total = dims.total();
        Ok(Self {
            id: ImageId::generate(rng),
            label: record.label,
            source: record.source,
            width: record.width,
            height: record.height,
            dims,
            frequency: record.frequency.map(Frequency::from_raw).unwrap_or_default(),
            collected: Vec::new(),
            slots: vec![None; total],
            rotations: vec![0; total],
            added_at: now_ms,
            completed_at: None,
            publish: PublishState::default(),
        })
    }

    pub fn total_pieces(&self) -> usize {
        self.dims.total()
    }

    pub fn is_collected(&self, piece: u32) -> bool {
        self.collected.contains(&piece)
    }

    /// Adds a piece to the collected set. Returns false when the piece was
    /// already there or does not belong to this grid.
    pub fn collect_piece(&mut self, piece: u32) -> bool {
        if !self.dims.contains(piece as usize) || self.is_collected(piece) {
            return false;
        }
        self.collected.push(piece);
        true
    }

    /// Set union with another view of the collected pieces.
    pub fn merge_collected(&mut self, pieces: &[u32]) -> bool {
        let mut changed = false;
        for &piece in pieces {
            changed |= self.collect_piece(piece);
        }
        changed
    }

    pub fn uncollected(&self) -> Vec<u32> {
        (0..self.total_pieces() as u32)
            .filter(|piece| !self.is_collected(*piece))
            .collect()
    }

    pub fn is_fully_collected(&self) -> bool {
        self.collected.len() >= self.total_pieces()
    }

    pub fn board(&self, rules: BoardRules) -> Board {
        Board::from_state(self.dims, rules, &self.slots, &self.rotations)
    }

    pub fn store_board(&mut self, board: &Board) {
        self.slots = board.slot_state();
        self.rotations = board.rotation_state();
    }

    pub fn is_completed(&self) -> bool {
        self.board(BoardRules::default()).is_completed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn upload() -> UploadRecord {
        UploadRecord {
            label: "harbor".to_string(),
            source: "data:image/png;base64,AAAA".to_string(),
            width: 640,
            height: 480,
            dims: None,
            frequency: None,
        }
    }

    #[test]
    fn upload_takes_difficulty_when_dims_missing() {
        let mut rng = StdRng::seed_from_u64(11);
        let image = PuzzleImage::from_upload(upload(), 4, 1_000, &mut rng).expect("image");
        assert_eq!(image.dims, GridDims { rows: 4, cols: 4 });
        assert_eq!(image.slots.len(), 16);
        assert_eq!(image.rotations.len(), 16);
        assert_eq!(image.frequency.get(), FREQUENCY_DEFAULT);
        assert!(!image.is_completed());
    }

    #[test]
    fn upload_keeps_existing_dims() {
        let mut rng = StdRng::seed_from_u64(12);
        let record = UploadRecord {
            dims: Some(GridDims { rows: 3, cols: 5 }),
            frequency: Some(40),
            ..upload()
        };
        let image = PuzzleImage::from_upload(record, 8, 0, &mut rng).expect("image");
        assert_eq!(image.dims, GridDims { rows: 3, cols: 5 });
        assert_eq!(image.frequency.get(), 40);
    }

    #[test]
    fn upload_rejects_structural_problems() {
        let mut rng = StdRng::seed_from_u64(13);
        let missing = UploadRecord {
            source: " ".to_string(),
            ..upload()
        };
        assert_eq!(
            PuzzleImage::from_upload(missing, 3, 0, &mut rng),
            Err(UploadError::MissingSource)
        );
        let flat = UploadRecord {
            height: 0,
            ..upload()
        };
        assert!(matches!(
            PuzzleImage::from_upload(flat, 3, 0, &mut rng),
            Err(UploadError::Dimensions { .. })
        ));
        let huge = UploadRecord {
            dims: Some(GridDims { rows: 11, cols: 2 }),
            ..upload()
        };
        assert_eq!(
            PuzzleImage::from_upload(huge, 3, 0, &mut rng),
            Err(UploadError::Grid { rows: 11, cols: 2 })
        );
    }

    #[test]
    fn collecting_twice_changes_once() {
        let mut rng = StdRng::seed_from_u64(14);
        let mut image = PuzzleImage::from_upload(upload(), 2, 0, &mut rng).expect("image");
        assert!(image.collect_piece(3));
        assert!(!image.collect_piece(3));
        assert!(!image.collect_piece(4));
        assert_eq!(image.collected, vec![3]);
        assert_eq!(image.uncollected(), vec![0, 1, 2]);
    }

    #[test]
    fn frequency_falls_back_to_default() {
        assert_eq!(Frequency::from_raw(0).get(), FREQUENCY_DEFAULT);
        assert_eq!(Frequency::from_raw(-3).get(), FREQUENCY_DEFAULT);
        assert_eq!(Frequency::from_raw(101).get(), FREQUENCY_DEFAULT);
        assert_eq!(Frequency::from_raw(100).get(), 100);
        let parsed: Frequency = serde_json::from_str("250").expect("lenient");
        assert_eq!(parsed, Frequency::default());
    }

    #[test]
    fn publish_failures_are_classified() {
        let mut state = PublishState::default();
        state.apply(PublishOutcome::Failed {
            message: "timeout".to_string(),
            retriable: true,
        });
        assert!(state.can_retry());
        state.apply(PublishOutcome::Blocked {
            message: "flagged by moderation".to_string(),
        });
        assert!(state.blocked);
        assert!(!state.can_retry());
        state.apply(PublishOutcome::Published {
            permalink: "https://example.test/p/1".to_string(),
        });
        assert!(state.published);
        assert_eq!(state.failure_message, None);
    }
}
