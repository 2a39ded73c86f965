use std::cell::RefCell;
use std::rc::Rc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use puzzlehunt_core::{
    ExtensionMsg, Frequency, GridDims, HuntRules, ImageId, PuzzleImage, UploadError, UploadRecord,
};
use puzzlehunt_image_pipeline::{ImagePipeline, PipelineError};
use rand::rngs::StdRng;

use crate::bus::MessageBus;
use crate::clock::now_ms;
use crate::console;
use crate::repository::Repository;
use crate::storage::{StorageArea, StorageError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryEntry {
    pub id: ImageId,
    pub label: String,
    pub dims: GridDims,
    pub frequency: Frequency,
    pub collected: usize,
    pub total: usize,
    pub completed: bool,
    pub published: bool,
}

impl GalleryEntry {
    fn from_image(image: &PuzzleImage) -> Self {
        Self {
            id: image.id.clone(),
            label: image.label.clone(),
            dims: image.dims,
            frequency: image.frequency,
            collected: image.collected.len(),
            total: image.total_pieces(),
            completed: image.is_completed(),
            published: image.publish.published,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GalleryError {
    #[error("image {0} not found")]
    NotFound(ImageId),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Image management from the extension page. Every change is written to
/// storage first and then announced to the tabs.
pub struct Gallery<S, B> {
    repo: Rc<Repository<S>>,
    bus: B,
    rng: RefCell<StdRng>,
}

impl<S, B> Gallery<S, B>
where
    S: StorageArea,
    B: MessageBus,
{
    pub fn new(repo: Rc<Repository<S>>, bus: B, rng: StdRng) -> Self {
        Self {
            repo,
            bus,
            rng: RefCell::new(rng),
        }
    }

    pub async fn entries(&self) -> Result<Vec<GalleryEntry>, GalleryError> {
        let images = self.repo.images().await?;
        Ok(images.iter().map(GalleryEntry::from_image).collect())
    }

    /// Grid size comes from the record when it has one, otherwise from the
    /// current default difficulty. It never changes afterwards.
    pub async fn add_image(&self, mut record: UploadRecord) -> Result<ImageId, GalleryError> {
        let settings = self.repo.settings().await?;
        if record.frequency.is_none() {
            record.frequency = Some(i64::from(settings.default_frequency));
        }
        let image = PuzzleImage::from_upload(
            record,
            settings.default_difficulty,
            now_ms(),
            &mut *self.rng.borrow_mut(),
        )?;
        let image_id = image.id.clone();
        let label = image.label.clone();
        let dims = image.dims;
        self.repo
            .update_images(|images| {
                images.push(image);
                ((), true)
            })
            .await?;
        console::log(&format!(
            "added {image_id} \"{label}\" as {}x{}",
            dims.rows, dims.cols
        ));
        self.bus.send_to_background(&ExtensionMsg::ImageAdded {
            image_id: image_id.clone(),
        });
        Ok(image_id)
    }

    /// Runs raw file bytes through `pipeline` and stores the result as a PNG
    /// data URI.
    pub async fn add_upload(
        &self,
        label: &str,
        bytes: &[u8],
        pipeline: &ImagePipeline,
        dims: Option<GridDims>,
    ) -> Result<ImageId, GalleryError> {
        let prepared = pipeline.prepare_upload(bytes)?;
        let source = format!("data:image/png;base64,{}", STANDARD.encode(&prepared.png));
        self.add_image(UploadRecord {
            label: label.to_string(),
            source,
            width: prepared.width,
            height: prepared.height,
            dims,
            frequency: None,
        })
        .await
    }

    pub async fn remove_image(&self, image_id: &ImageId) -> Result<bool, GalleryError> {
        let removed = self
            .repo
            .update_images(|images| {
                let before = images.len();
                images.retain(|image| &image.id != image_id);
                let removed = images.len() != before;
                (removed, removed)
            })
            .await?;
        if removed {
            console::log(&format!("removed {image_id}"));
            self.bus.send_to_background(&ExtensionMsg::ImageRemoved {
                image_id: image_id.clone(),
            });
        }
        Ok(removed)
    }

    /// Out-of-range or non-numeric input falls back to the default
    /// frequency.
    pub async fn set_frequency(
        &self,
        image_id: &ImageId,
        raw: i64,
    ) -> Result<Frequency, GalleryError> {
        let frequency = Frequency::from_raw(raw);
        let found = self
            .repo
            .update_images(|images| {
                match images.iter_mut().find(|image| &image.id == image_id) {
                    Some(image) => {
                        let changed = image.frequency != frequency;
                        image.frequency = frequency;
                        (true, changed)
                    }
                    None => (false, false),
                }
            })
            .await?;
        if !found {
            return Err(GalleryError::NotFound(image_id.clone()));
        }
        self.bus.send_to_background(&ExtensionMsg::FrequencyChanged {
            image_id: image_id.clone(),
            frequency,
        });
        Ok(frequency)
    }

    pub async fn set_enabled(&self, enabled: bool) -> Result<(), GalleryError> {
        self.repo.set_enabled(enabled).await?;
        console::log(if enabled {
            "scattering enabled"
        } else {
            "scattering paused"
        });
        self.bus
            .send_to_background(&ExtensionMsg::ToggleEnabled { enabled });
        Ok(())
    }

    /// Applies to images added from now on.
    pub async fn set_default_difficulty(&self, difficulty: u32) -> Result<HuntRules, GalleryError> {
        let rules = HuntRules {
            default_difficulty: difficulty,
            ..self.repo.settings().await?
        }
        .sanitized();
        self.repo.set_settings(rules).await?;
        Ok(rules)
    }
}
