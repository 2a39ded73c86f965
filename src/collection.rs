use puzzlehunt_core::{ExtensionMsg, ImageId};

use crate::bus::MessageBus;
use crate::clock::now_ms;
use crate::console;
use crate::repository::Repository;
use crate::storage::StorageArea;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectOutcome {
    Collected {
        /// Feed id of the recorded event; `None` when only the image list
        /// write made it.
        sequence_id: Option<u64>,
        collected: Vec<u32>,
    },
    AlreadyCollected,
    UnknownImage,
    InvalidPiece,
    ReadFailed,
    WriteFailed,
}

impl CollectOutcome {
    pub fn is_collected(&self) -> bool {
        matches!(self, CollectOutcome::Collected { .. })
    }
}

/// Records a clicked piece: image list first, then the background relay,
/// then the feed. Only the image list write decides success.
pub async fn collect_piece<S, B>(
    repo: &Repository<S>,
    bus: &B,
    image_id: &ImageId,
    piece: u32,
) -> CollectOutcome
where
    S: StorageArea,
    B: MessageBus,
{
    let mut images = match repo.images().await {
        Ok(images) => images,
        Err(err) => {
            console::warn(&format!("collect {image_id}#{piece}: {err}"));
            return CollectOutcome::ReadFailed;
        }
    };
    let Some(image) = images.iter_mut().find(|image| &image.id == image_id) else {
        console::debug(&format!("collect {image_id}#{piece}: image is gone"));
        return CollectOutcome::UnknownImage;
    };
    if !image.dims.contains(piece as usize) {
        return CollectOutcome::InvalidPiece;
    }
    if !image.collect_piece(piece) {
        return CollectOutcome::AlreadyCollected;
    }
    let collected = image.collected.clone();
    let total = image.total_pieces();
    if let Err(err) = repo.save_images(&images).await {
        console::warn(&format!("collect {image_id}#{piece}: {err}"));
        return CollectOutcome::WriteFailed;
    }

    bus.send_to_background(&ExtensionMsg::PieceCollected {
        image_id: image_id.clone(),
        piece,
        collected: collected.clone(),
    });

    let sequence_id = match repo.append_event(image_id.clone(), piece, now_ms()).await {
        Ok(sequence_id) => Some(sequence_id),
        Err(err) => {
            console::warn(&format!("feed append for {image_id}#{piece} failed: {err}"));
            None
        }
    };
    console::log(&format!(
        "collected {image_id}#{piece} ({}/{})",
        collected.len(),
        total
    ));
    CollectOutcome::Collected {
        sequence_id,
        collected,
    }
}
