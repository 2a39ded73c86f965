use puzzlehunt_core::records::{
    CursorRecord, EnabledRecord, FeedRecord, ImagesRecord, SettingsRecord, ENABLED_KEY,
    FEED_CURSOR_KEY, FEED_KEY, FEED_RECORD_VERSION, IMAGES_KEY, IMAGES_RECORD_VERSION,
    SETTINGS_KEY, SETTINGS_RECORD_VERSION,
};
use puzzlehunt_core::{decode, encode, EventFeed, FeedCursor, HuntRules, ImageId, PuzzleImage};

use crate::console;
use crate::storage::{StorageArea, StorageError};

/// Typed access to the records every context shares. Unreadable or
/// out-of-date records read as absent.
pub struct Repository<S> {
    storage: S,
}

impl<S: StorageArea> Repository<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub async fn images(&self) -> Result<Vec<PuzzleImage>, StorageError> {
        let Some(bytes) = self.storage.get(IMAGES_KEY).await? else {
            return Ok(Vec::new());
        };
        match decode::<ImagesRecord>(&bytes) {
            Some(record) if record.version == IMAGES_RECORD_VERSION => Ok(record.images),
            Some(record) => {
                console::warn(&format!(
                    "ignoring images record version {}",
                    record.version
                ));
                Ok(Vec::new())
            }
            None => {
                console::warn("images record is unreadable; starting empty");
                Ok(Vec::new())
            }
        }
    }

    pub async fn image(&self, id: &ImageId) -> Result<Option<PuzzleImage>, StorageError> {
        let images = self.images().await?;
        Ok(images.into_iter().find(|image| &image.id == id))
    }

    pub async fn save_images(&self, images: &[PuzzleImage]) -> Result<(), StorageError> {
        let record = ImagesRecord::new(images.to_vec());
        let bytes = encode(&record).ok_or(StorageError::Encode(IMAGES_KEY))?;
        self.storage.set(IMAGES_KEY, bytes).await
    }

    /// Read-modify-write of the image list. `mutate` returns its result and
    /// whether anything changed; unchanged lists are not written back.
    pub async fn update_images<T, F>(&self, mutate: F) -> Result<T, StorageError>
    where
        F: FnOnce(&mut Vec<PuzzleImage>) -> (T, bool),
    {
        let mut images = self.images().await?;
        let (value, changed) = mutate(&mut images);
        if changed {
            self.save_images(&images).await?;
        }
        Ok(value)
    }

    pub async fn enabled(&self) -> Result<bool, StorageError> {
        let Some(bytes) = self.storage.get(ENABLED_KEY).await? else {
            return Ok(EnabledRecord::default().enabled);
        };
        Ok(decode::<EnabledRecord>(&bytes)
            .unwrap_or_default()
            .enabled)
    }

    pub async fn set_enabled(&self, enabled: bool) -> Result<(), StorageError> {
        let bytes = encode(&EnabledRecord { enabled }).ok_or(StorageError::Encode(ENABLED_KEY))?;
        self.storage.set(ENABLED_KEY, bytes).await
    }

    pub async fn settings(&self) -> Result<HuntRules, StorageError> {
        let Some(bytes) = self.storage.get(SETTINGS_KEY).await? else {
            return Ok(HuntRules::default());
        };
        let record = decode::<SettingsRecord>(&bytes)
            .filter(|record| record.version == SETTINGS_RECORD_VERSION)
            .unwrap_or_default();
        Ok(record.rules.sanitized())
    }

    pub async fn set_settings(&self, rules: HuntRules) -> Result<(), StorageError> {
        let record = SettingsRecord {
            rules: rules.sanitized(),
            ..SettingsRecord::default()
        };
        let bytes = encode(&record).ok_or(StorageError::Encode(SETTINGS_KEY))?;
        self.storage.set(SETTINGS_KEY, bytes).await
    }

    pub async fn feed(&self) -> Result<EventFeed, StorageError> {
        let capacity = self.settings().await?.feed_capacity;
        let mut feed = match self.storage.get(FEED_KEY).await? {
            Some(bytes) => decode::<FeedRecord>(&bytes)
                .filter(|record| record.version == FEED_RECORD_VERSION)
                .map(|record| record.feed)
                .unwrap_or_else(|| {
                    console::warn("feed record is unreadable; starting a fresh feed");
                    EventFeed::new(capacity)
                }),
            None => EventFeed::new(capacity),
        };
        feed.set_capacity(capacity);
        Ok(feed)
    }

    /// Appends one collection event and returns its sequence id.
    pub async fn append_event(
        &self,
        image_id: ImageId,
        piece: u32,
        timestamp: u64,
    ) -> Result<u64, StorageError> {
        let mut feed = self.feed().await?;
        let sequence_id = feed.append(image_id, piece, timestamp);
        let bytes = encode(&FeedRecord::new(feed)).ok_or(StorageError::Encode(FEED_KEY))?;
        self.storage.set(FEED_KEY, bytes).await?;
        Ok(sequence_id)
    }

    pub async fn cursor(&self) -> Result<FeedCursor, StorageError> {
        let Some(bytes) = self.storage.get(FEED_CURSOR_KEY).await? else {
            return Ok(FeedCursor::default());
        };
        Ok(decode::<CursorRecord>(&bytes)
            .map(|record| record.cursor)
            .unwrap_or_default())
    }

    pub async fn set_cursor(&self, cursor: FeedCursor) -> Result<(), StorageError> {
        let bytes =
            encode(&CursorRecord { cursor }).ok_or(StorageError::Encode(FEED_CURSOR_KEY))?;
        self.storage.set(FEED_CURSOR_KEY, bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use puzzlehunt_core::UploadRecord;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn image(rng: &mut StdRng) -> PuzzleImage {
        PuzzleImage::from_upload(
            UploadRecord {
                label: "dunes".to_string(),
                source: "data:image/png;base64,AAAA".to_string(),
                width: 300,
                height: 300,
                dims: None,
                frequency: Some(3),
            },
            2,
            10,
            rng,
        )
        .expect("image")
    }

    #[tokio::test]
    async fn empty_storage_reads_as_defaults() {
        let repo = Repository::new(MemoryStorage::new());
        assert!(repo.images().await.expect("images").is_empty());
        assert!(repo.enabled().await.expect("enabled"));
        assert_eq!(repo.cursor().await.expect("cursor"), FeedCursor(0));
        assert_eq!(repo.settings().await.expect("settings"), HuntRules::default());
        assert!(repo.feed().await.expect("feed").events().is_empty());
    }

    #[tokio::test]
    async fn garbage_records_read_as_absent() {
        let storage = MemoryStorage::new();
        storage.set(IMAGES_KEY, vec![1, 2, 3]).await.expect("set");
        storage.set(FEED_KEY, vec![9; 5]).await.expect("set");
        let repo = Repository::new(storage);
        assert!(repo.images().await.expect("images").is_empty());
        assert!(repo.feed().await.expect("feed").events().is_empty());
    }

    #[tokio::test]
    async fn update_skips_write_when_unchanged() {
        let storage = MemoryStorage::new();
        let repo = Repository::new(storage.clone());
        let value = repo
            .update_images(|images| (images.len(), false))
            .await
            .expect("update");
        assert_eq!(value, 0);
        assert!(!storage.contains_key(IMAGES_KEY));

        let mut rng = StdRng::seed_from_u64(4);
        let added = image(&mut rng);
        let id = added.id.clone();
        repo.update_images(|images| {
            images.push(added);
            ((), true)
        })
        .await
        .expect("update");
        assert_eq!(repo.image(&id).await.expect("image").map(|image| image.id), Some(id));
    }

    #[tokio::test]
    async fn feed_honours_configured_capacity() {
        let repo = Repository::new(MemoryStorage::new());
        repo.set_settings(HuntRules {
            feed_capacity: 2,
            ..HuntRules::default()
        })
        .await
        .expect("settings");
        let mut rng = StdRng::seed_from_u64(8);
        let id = image(&mut rng).id;
        for piece in 0..3 {
            repo.append_event(id.clone(), piece, 100).await.expect("append");
        }
        let feed = repo.feed().await.expect("feed");
        let ids: Vec<u64> = feed.events().iter().map(|event| event.sequence_id).collect();
        assert_eq!(ids, vec![2, 3]);
    }
}
