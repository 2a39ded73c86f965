//! Collection feed: a bounded log of "piece collected" events that the
//! background context folds into the canonical image list.
//!
//! Applying an event is a set union on the image's collected pieces, so the
//! fold is idempotent and order-independent. Sequence ids only let a consumer
//! skip events it has already seen; a dropped or reordered event cannot
//! corrupt the result.

use crate::image_id::ImageId;
use crate::model::PuzzleImage;

#[derive(Debug, Clone, PartialEq, Eq, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
pub struct CollectionEvent {
    pub sequence_id: u64,
    pub image_id: ImageId,
    pub piece: u32,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
pub struct EventFeed {
    /// Next id to hand out. Lives with the events so ids keep growing after
    /// old entries fall off the front.
    next_sequence: u64,
    capacity: u32,
    events: Vec<CollectionEvent>,
}

impl EventFeed {
    pub fn new(capacity: u32) -> Self {
        Self {
            next_sequence: 1,
            capacity: capacity.max(1),
            events: Vec::new(),
        }
    }

    pub fn events(&self) -> &[CollectionEvent] {
        &self.events
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Highest id handed out so far, 0 for a fresh feed. Survives eviction.
    pub fn last_sequence(&self) -> u64 {
        self.next_sequence.saturating_sub(1)
    }

    pub fn set_capacity(&mut self, capacity: u32) {
        self.capacity = capacity.max(1);
        self.trim();
    }

    pub fn append(&mut self, image_id: ImageId, piece: u32, timestamp: u64) -> u64 {
        let sequence_id = self.next_sequence;
        self.next_sequence = self.next_sequence.saturating_add(1);
        self.events.push(CollectionEvent {
            sequence_id,
            image_id,
            piece,
            timestamp,
        });
        self.trim();
        sequence_id
    }

    pub fn events_after(&self, cursor: FeedCursor) -> impl Iterator<Item = &CollectionEvent> {
        self.events
            .iter()
            .filter(move |event| event.sequence_id > cursor.0)
    }

    fn trim(&mut self) {
        let capacity = self.capacity as usize;
        if self.events.len() > capacity {
            let overflow = self.events.len() - capacity;
            self.events.drain(..overflow);
        }
    }
}

/// Highest sequence id a consumer has folded in.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    rkyv::Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
)]
pub struct FeedCursor(pub u64);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainOutcome {
    pub cursor: FeedCursor,
    pub applied: usize,
    pub images_changed: bool,
    pub unknown_images: usize,
}

impl DrainOutcome {
    pub fn cursor_advanced(&self, previous: FeedCursor) -> bool {
        self.cursor > previous
    }
}

/// Folds every event newer than `cursor` into `images`. The cursor moves to
/// the largest id seen even when nothing changed.
pub fn drain_events<'a, I>(images: &mut [PuzzleImage], events: I, cursor: FeedCursor) -> DrainOutcome
where
    I: IntoIterator<Item = &'a CollectionEvent>,
{
    let mut outcome = DrainOutcome {
        cursor,
        ..DrainOutcome::default()
    };
    for event in events {
        if event.sequence_id <= cursor.0 {
            continue;
        }
        outcome.cursor = outcome.cursor.max(FeedCursor(event.sequence_id));
        match images.iter_mut().find(|image| image.id == event.image_id) {
            Some(image) => {
                if image.collect_piece(event.piece) {
                    outcome.applied += 1;
                    outcome.images_changed = true;
                }
            }
            None => outcome.unknown_images += 1,
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UploadRecord;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn image(rng: &mut StdRng) -> PuzzleImage {
        PuzzleImage::from_upload(
            UploadRecord {
                label: "feed".to_string(),
                source: "blob:feed".to_string(),
                width: 10,
                height: 10,
                dims: None,
                frequency: None,
            },
            2,
            0,
            rng,
        )
        .expect("image")
    }

    #[test]
    fn ids_keep_growing_after_eviction() {
        let mut rng = StdRng::seed_from_u64(21);
        let id = image(&mut rng).id;
        let mut feed = EventFeed::new(3);
        assert_eq!(feed.last_sequence(), 0);
        for piece in 0..5 {
            feed.append(id.clone(), piece, 100 + piece as u64);
        }
        let ids: Vec<u64> = feed.events().iter().map(|event| event.sequence_id).collect();
        assert_eq!(ids, vec![3, 4, 5]);
        assert_eq!(feed.last_sequence(), 5);
        assert_eq!(feed.append(id, 0, 200), 6);
    }

    #[test]
    fn shrinking_capacity_drops_oldest() {
        let mut rng = StdRng::seed_from_u64(22);
        let id = image(&mut rng).id;
        let mut feed = EventFeed::new(10);
        for piece in 0..4 {
            feed.append(id.clone(), piece, 0);
        }
        feed.set_capacity(2);
        assert_eq!(feed.events().len(), 2);
        assert_eq!(feed.events()[0].piece, 2);
    }

    #[test]
    fn drain_skips_seen_events_and_advances_cursor() {
        let mut rng = StdRng::seed_from_u64(23);
        let mut images = vec![image(&mut rng)];
        let id = images[0].id.clone();
        let mut feed = EventFeed::new(10);
        feed.append(id.clone(), 1, 0);
        feed.append(id.clone(), 2, 0);
        feed.append(id.clone(), 2, 0);

        let outcome = drain_events(&mut images, feed.events(), FeedCursor(1));
        assert_eq!(outcome.cursor, FeedCursor(3));
        assert_eq!(outcome.applied, 1);
        assert!(outcome.images_changed);
        assert_eq!(images[0].collected, vec![2]);

        let again = drain_events(&mut images, feed.events_after(outcome.cursor), outcome.cursor);
        assert_eq!(again.cursor, FeedCursor(3));
        assert!(!again.images_changed);
    }

    #[test]
    fn drain_advances_past_events_for_removed_images() {
        let mut rng = StdRng::seed_from_u64(24);
        let mut images = vec![image(&mut rng)];
        let gone = image(&mut rng).id;
        let mut feed = EventFeed::new(10);
        feed.append(gone, 0, 0);
        let outcome = drain_events(&mut images, feed.events(), FeedCursor::default());
        assert_eq!(outcome.cursor, FeedCursor(1));
        assert_eq!(outcome.unknown_images, 1);
        assert!(!outcome.images_changed);
        assert!(outcome.cursor_advanced(FeedCursor::default()));
    }
}
