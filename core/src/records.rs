use crate::feed::{EventFeed, FeedCursor};
use crate::model::PuzzleImage;
use crate::rules::HuntRules;

pub const IMAGES_RECORD_VERSION: u32 = 1;
pub const FEED_RECORD_VERSION: u32 = 1;
pub const SETTINGS_RECORD_VERSION: u32 = 1;

pub const IMAGES_KEY: &str = "images.v1";
pub const FEED_KEY: &str = "feed.v1";
pub const FEED_CURSOR_KEY: &str = "feed_cursor.v1";
pub const ENABLED_KEY: &str = "enabled.v1";
pub const SETTINGS_KEY: &str = "settings.v1";

#[derive(Debug, Clone, PartialEq, Eq, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
pub struct ImagesRecord {
    pub version: u32,
    pub images: Vec<PuzzleImage>,
}

impl ImagesRecord {
    pub fn new(images: Vec<PuzzleImage>) -> Self {
        Self {
            version: IMAGES_RECORD_VERSION,
            images,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
pub struct FeedRecord {
    pub version: u32,
    pub feed: EventFeed,
}

impl FeedRecord {
    pub fn new(feed: EventFeed) -> Self {
        Self {
            version: FEED_RECORD_VERSION,
            feed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
pub struct CursorRecord {
    pub cursor: FeedCursor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
pub struct EnabledRecord {
    pub enabled: bool,
}

impl Default for EnabledRecord {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
pub struct SettingsRecord {
    pub version: u32,
    pub rules: HuntRules,
}

impl Default for SettingsRecord {
    fn default() -> Self {
        Self {
            version: SETTINGS_RECORD_VERSION,
            rules: HuntRules::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode, encode};
    use crate::model::UploadRecord;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn images_record_survives_codec() {
        let mut rng = StdRng::seed_from_u64(41);
        let mut image = PuzzleImage::from_upload(
            UploadRecord {
                label: "lighthouse".to_string(),
                source: "https://example.test/lighthouse.jpg".to_string(),
                width: 800,
                height: 600,
                dims: None,
                frequency: Some(20),
            },
            2,
            5,
            &mut rng,
        )
        .expect("image");
        image.collect_piece(2);
        image.slots[0] = Some(2);
        image.rotations[0] = 3;
        let record = ImagesRecord::new(vec![image]);
        let bytes = encode(&record).expect("encode");
        assert_eq!(decode::<ImagesRecord>(&bytes), Some(record));
    }

    #[test]
    fn settings_default_to_current_version() {
        let settings = SettingsRecord::default();
        assert_eq!(settings.version, SETTINGS_RECORD_VERSION);
        let bytes = encode(&settings).expect("encode");
        assert_eq!(decode::<SettingsRecord>(&bytes), Some(settings));
    }
}
