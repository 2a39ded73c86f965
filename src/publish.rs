use puzzlehunt_core::{BoardRules, ImageId, PublishOutcome, PuzzleImage};
use puzzlehunt_image_pipeline::{render_board_png, PipelineError};

use crate::console;
use crate::repository::Repository;
use crate::storage::{StorageArea, StorageError};

/// What goes out to the external publishing service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    pub image_id: ImageId,
    pub label: String,
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub added_at: u64,
    pub completed_at: u64,
}

#[allow(async_fn_in_trait)]
pub trait PublishPipeline {
    async fn publish(&self, request: PublishRequest) -> PublishOutcome;
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("image {0} not found")]
    NotFound(ImageId),
    #[error("image {0} is not completed")]
    NotCompleted(ImageId),
    #[error("image {0} was already published or is blocked")]
    Closed(ImageId),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Renders the finished board. Only solved images with a completion stamp
/// qualify.
pub fn build_request(image: &PuzzleImage, source: &[u8]) -> Result<PublishRequest, PublishError> {
    let board = image.board(BoardRules::default());
    let completed_at = image
        .completed_at
        .filter(|_| board.is_completed())
        .ok_or_else(|| PublishError::NotCompleted(image.id.clone()))?;
    let rendered = render_board_png(source, &board)?;
    Ok(PublishRequest {
        image_id: image.id.clone(),
        label: image.label.clone(),
        png: rendered.png,
        width: rendered.width,
        height: rendered.height,
        added_at: image.added_at,
        completed_at,
    })
}

/// Hands a completed image to `pipeline` and records what came back.
pub async fn publish_image<S, P>(
    repo: &Repository<S>,
    pipeline: &P,
    image_id: &ImageId,
    source: &[u8],
) -> Result<PublishOutcome, PublishError>
where
    S: StorageArea,
    P: PublishPipeline,
{
    let image = repo
        .image(image_id)
        .await?
        .ok_or_else(|| PublishError::NotFound(image_id.clone()))?;
    if !image.publish.can_retry() {
        return Err(PublishError::Closed(image_id.clone()));
    }
    let request = build_request(&image, source)?;
    let outcome = pipeline.publish(request).await;
    match &outcome {
        PublishOutcome::Published { permalink } => {
            console::log(&format!("{image_id} published at {permalink}"));
        }
        PublishOutcome::Blocked { message } => {
            console::warn(&format!("{image_id} blocked: {message}"));
        }
        PublishOutcome::Failed { message, retriable } => {
            console::warn(&format!(
                "{image_id} publish failed (retriable: {retriable}): {message}"
            ));
        }
    }
    let recorded = outcome.clone();
    let found = repo
        .update_images(|images| {
            match images.iter_mut().find(|image| &image.id == image_id) {
                Some(image) => {
                    image.publish.apply(recorded);
                    (true, true)
                }
                None => (false, false),
            }
        })
        .await?;
    if !found {
        return Err(PublishError::NotFound(image_id.clone()));
    }
    Ok(outcome)
}
