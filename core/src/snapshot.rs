//! Read-only view of a puzzle board for pages that draw it. Storage keeps
//! rkyv records, so this is the only shape the page script ever parses.

use serde::Serialize;

use crate::board::Board;
use crate::grid::PieceRect;
use crate::image_id::ImageId;
use crate::model::PuzzleImage;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotSnapshot {
    pub piece: u32,
    pub degrees: u32,
    /// Where the piece sits in the source image.
    pub crop: PieceRect,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSnapshot {
    pub image_id: ImageId,
    pub label: String,
    pub source: String,
    pub source_width: u32,
    pub source_height: u32,
    pub rows: u32,
    pub cols: u32,
    /// One entry per cell, `null` for empty cells.
    pub slots: Vec<Option<SlotSnapshot>>,
    pub selection: Option<usize>,
    pub collected: usize,
    pub total: usize,
    pub completed: bool,
    pub completed_at: Option<u64>,
}

impl BoardSnapshot {
    pub fn new(image: &PuzzleImage, board: &Board, selection: Option<usize>) -> Self {
        let dims = board.dims();
        let slots = board
            .slots()
            .iter()
            .map(|slot| {
                let piece = slot.piece()?;
                let rotation = slot.rotation()?;
                let crop = dims.piece_rect(piece as usize, image.width, image.height)?;
                Some(SlotSnapshot {
                    piece,
                    degrees: rotation.degrees(),
                    crop,
                })
            })
            .collect();
        Self {
            image_id: image.id.clone(),
            label: image.label.clone(),
            source: image.source.clone(),
            source_width: image.width,
            source_height: image.height,
            rows: dims.rows,
            cols: dims.cols,
            slots,
            selection,
            collected: image.collected.len(),
            total: dims.total(),
            completed: board.is_completed(),
            completed_at: image.completed_at,
        }
    }

    pub fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::BoardRules;
    use crate::grid::GridDims;
    use crate::model::UploadRecord;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn image() -> PuzzleImage {
        let mut rng = StdRng::seed_from_u64(31);
        let mut image = PuzzleImage::from_upload(
            UploadRecord {
                label: "dunes".to_string(),
                source: "blob:dunes".to_string(),
                width: 100,
                height: 80,
                dims: GridDims::new(2, 2),
                frequency: None,
            },
            3,
            0,
            &mut rng,
        )
        .expect("image");
        image.collected = vec![0, 3];
        image
    }

    #[test]
    fn empty_cells_are_null_and_pieces_carry_crop_and_turn() {
        let image = image();
        let board = Board::from_state(
            image.dims,
            BoardRules::default(),
            &[Some(3), None, None, Some(0)],
            &[1, 0, 0, 0],
        );
        let snapshot = BoardSnapshot::new(&image, &board, Some(0));
        assert_eq!(snapshot.total, 4);
        assert_eq!(snapshot.collected, 2);
        assert!(!snapshot.completed);

        let value: serde_json::Value =
            serde_json::from_str(&snapshot.to_json().expect("json")).expect("value");
        assert_eq!(value["imageId"], serde_json::json!(image.id.as_str()));
        assert_eq!(value["selection"], serde_json::json!(0));
        assert!(value["slots"][1].is_null());
        assert_eq!(value["slots"][0]["piece"], serde_json::json!(3));
        assert_eq!(value["slots"][0]["degrees"], serde_json::json!(90));
        assert_eq!(
            value["slots"][0]["crop"],
            serde_json::json!({ "x": 50, "y": 40, "width": 50, "height": 40 })
        );
        assert_eq!(value["sourceWidth"], serde_json::json!(100));
        assert!(value["completedAt"].is_null());
    }

    #[test]
    fn solved_board_reports_completion() {
        let mut image = image();
        image.collected = vec![0, 1, 2, 3];
        image.completed_at = Some(42);
        let board = Board::from_state(
            image.dims,
            BoardRules::default(),
            &[Some(0), Some(1), Some(2), Some(3)],
            &[],
        );
        let snapshot = BoardSnapshot::new(&image, &board, None);
        assert!(snapshot.completed);
        assert_eq!(snapshot.completed_at, Some(42));
        assert!(snapshot.slots.iter().all(|slot| slot.as_ref().is_some_and(|s| s.degrees == 0)));
    }
}
