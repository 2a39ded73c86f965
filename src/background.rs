use std::cell::Cell;
use std::rc::Rc;

use puzzlehunt_core::records::FEED_KEY;
use puzzlehunt_core::{drain_events, DrainOutcome, ExtensionMsg, FeedCursor};

use crate::bus::{Endpoint, MessageBus};
use crate::console;
use crate::repository::Repository;
use crate::storage::StorageArea;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relay {
    /// Forwarded to other tabs and to extension pages.
    TabsAndPages,
    Tabs,
    Dropped,
}

/// Relays messages between contexts and folds the collection feed into the
/// image list.
pub struct Background<S, B> {
    repo: Rc<Repository<S>>,
    bus: B,
    draining: Cell<bool>,
    drain_again: Cell<bool>,
}

impl<S, B> Background<S, B>
where
    S: StorageArea,
    B: MessageBus,
{
    pub fn new(repo: Rc<Repository<S>>, bus: B) -> Self {
        Self {
            repo,
            bus,
            draining: Cell::new(false),
            drain_again: Cell::new(false),
        }
    }

    pub async fn start(&self) -> Option<DrainOutcome> {
        console::log("background started");
        self.drain_feed().await
    }

    pub fn on_message(&self, from: Endpoint, msg: &ExtensionMsg) -> Relay {
        match (from, msg) {
            (Endpoint::Tab(tab), ExtensionMsg::PieceCollected { .. }) => {
                self.bus.broadcast_to_tabs(msg, Some(tab));
                self.bus.notify_pages(msg);
                Relay::TabsAndPages
            }
            (Endpoint::Page, _) => {
                self.bus.broadcast_to_tabs(msg, None);
                Relay::Tabs
            }
            (_, msg) => {
                console::debug(&format!("background ignores {} from {from:?}", msg.kind()));
                Relay::Dropped
            }
        }
    }

    pub async fn on_storage_changed(&self, key: &str) -> Option<DrainOutcome> {
        if key != FEED_KEY {
            return None;
        }
        self.drain_feed().await
    }

    /// Merges every feed event past the cursor. A drain requested while one
    /// is running is folded into another pass of the running drain.
    pub async fn drain_feed(&self) -> Option<DrainOutcome> {
        if self.draining.replace(true) {
            self.drain_again.set(true);
            return None;
        }
        let mut last = None;
        loop {
            self.drain_again.set(false);
            match self.drain_once().await {
                Some(outcome) => last = Some(outcome),
                None => break,
            }
            if !self.drain_again.get() {
                break;
            }
        }
        self.draining.set(false);
        last
    }

    async fn drain_once(&self) -> Option<DrainOutcome> {
        let read = async {
            let cursor = self.repo.cursor().await?;
            let feed = self.repo.feed().await?;
            let images = self.repo.images().await?;
            Ok::<_, crate::storage::StorageError>((cursor, feed, images))
        };
        let (stored_cursor, feed, mut images) = match read.await {
            Ok(state) => state,
            Err(err) => {
                console::warn(&format!("feed drain abandoned: {err}"));
                return None;
            }
        };
        // A feed that was lost and started over hands out ids below the cursor.
        let cursor = if feed.last_sequence() < stored_cursor.0 {
            console::warn(&format!(
                "feed restarted at {} below cursor {}; draining from the start",
                feed.last_sequence(),
                stored_cursor.0
            ));
            FeedCursor::default()
        } else {
            stored_cursor
        };
        let outcome = drain_events(&mut images, feed.events_after(cursor), cursor);
        if outcome.images_changed {
            if let Err(err) = self.repo.save_images(&images).await {
                console::warn(&format!("feed drain could not save images: {err}"));
                return None;
            }
        }
        if outcome.cursor != stored_cursor {
            if let Err(err) = self.repo.set_cursor(outcome.cursor).await {
                console::warn(&format!("feed drain could not save cursor: {err}"));
                return None;
            }
        }
        if outcome.applied > 0 || outcome.unknown_images > 0 {
            console::log(&format!(
                "feed drained to {}: {} applied, {} for unknown images",
                outcome.cursor.0, outcome.applied, outcome.unknown_images
            ));
        }
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{LocalBus, TabId};
    use crate::storage::MemoryStorage;
    use puzzlehunt_core::{PuzzleImage, UploadRecord};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn image(seed: u64) -> PuzzleImage {
        let mut rng = StdRng::seed_from_u64(seed);
        PuzzleImage::from_upload(
            UploadRecord {
                label: "reef".to_string(),
                source: "data:image/png;base64,AAAA".to_string(),
                width: 90,
                height: 90,
                dims: None,
                frequency: None,
            },
            3,
            0,
            &mut rng,
        )
        .expect("image")
    }

    #[test]
    fn tab_collections_fan_out_to_everyone_else() {
        let repo = Rc::new(Repository::new(MemoryStorage::new()));
        let bus = LocalBus::new();
        let _a = bus.open_tab(TabId(1));
        let _b = bus.open_tab(TabId(2));
        let _page = bus.open_page();
        let background = Background::new(repo, bus.background());
        let msg = ExtensionMsg::PieceCollected {
            image_id: image(1).id,
            piece: 4,
            collected: vec![4],
        };
        assert_eq!(
            background.on_message(Endpoint::Tab(TabId(1)), &msg),
            Relay::TabsAndPages
        );
        assert!(bus.drain(Endpoint::Tab(TabId(1))).is_empty());
        assert_eq!(bus.drain(Endpoint::Tab(TabId(2))).len(), 1);
        assert_eq!(bus.drain(Endpoint::Page).len(), 1);

        let toggle = ExtensionMsg::ToggleEnabled { enabled: false };
        assert_eq!(background.on_message(Endpoint::Page, &toggle), Relay::Tabs);
        assert_eq!(bus.drain(Endpoint::Tab(TabId(1))).len(), 1);
        assert_eq!(
            background.on_message(Endpoint::Tab(TabId(2)), &toggle),
            Relay::Dropped
        );
    }

    #[tokio::test]
    async fn drain_merges_and_persists_cursor() {
        let repo = Rc::new(Repository::new(MemoryStorage::new()));
        let image = image(2);
        let id = image.id.clone();
        repo.save_images(&[image]).await.expect("save");
        repo.append_event(id.clone(), 1, 0).await.expect("append");
        repo.append_event(id.clone(), 5, 0).await.expect("append");
        repo.append_event(id.clone(), 1, 0).await.expect("append");

        let bus = LocalBus::new();
        let background = Background::new(Rc::clone(&repo), bus.background());
        let outcome = background.start().await.expect("drain");
        assert_eq!(outcome.applied, 2);
        assert_eq!(repo.cursor().await.expect("cursor"), FeedCursor(3));
        let stored = repo.image(&id).await.expect("read").expect("image");
        assert_eq!(stored.collected, vec![1, 5]);

        let again = background
            .on_storage_changed(FEED_KEY)
            .await
            .expect("drain");
        assert_eq!(again.applied, 0);
        assert!(!again.cursor_advanced(FeedCursor(3)));
        assert!(background.on_storage_changed("images.v1").await.is_none());
    }

    #[tokio::test]
    async fn cursor_rewinds_when_the_feed_starts_over() {
        let repo = Rc::new(Repository::new(MemoryStorage::new()));
        let image = image(4);
        let id = image.id.clone();
        repo.save_images(&[image]).await.expect("save");
        for piece in 0..3 {
            repo.append_event(id.clone(), piece, 0).await.expect("append");
        }
        let background = Background::new(Rc::clone(&repo), LocalBus::new().background());
        background.drain_feed().await.expect("drain");
        assert_eq!(repo.cursor().await.expect("cursor"), FeedCursor(3));

        repo.storage()
            .set(FEED_KEY, vec![0xde, 0xad, 0xbe, 0xef])
            .await
            .expect("clobber feed");
        let sequence_id = repo.append_event(id.clone(), 3, 0).await.expect("append");
        assert_eq!(sequence_id, 1);

        let outcome = background.drain_feed().await.expect("drain");
        assert_eq!(outcome.applied, 1);
        assert_eq!(outcome.cursor, FeedCursor(1));
        assert_eq!(repo.cursor().await.expect("cursor"), FeedCursor(1));
        let stored = repo.image(&id).await.expect("read").expect("image");
        assert_eq!(stored.collected, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn emptied_feed_resets_the_cursor() {
        let repo = Rc::new(Repository::new(MemoryStorage::new()));
        let image = image(5);
        let id = image.id.clone();
        repo.save_images(&[image]).await.expect("save");
        repo.append_event(id, 2, 0).await.expect("append");
        let background = Background::new(Rc::clone(&repo), LocalBus::new().background());
        background.drain_feed().await.expect("drain");

        repo.storage().remove(FEED_KEY).await.expect("drop feed");
        let outcome = background.drain_feed().await.expect("drain");
        assert_eq!(outcome.applied, 0);
        assert_eq!(repo.cursor().await.expect("cursor"), FeedCursor(0));
    }

    #[tokio::test]
    async fn unknown_images_still_advance_the_cursor() {
        let repo = Rc::new(Repository::new(MemoryStorage::new()));
        repo.append_event(image(3).id, 0, 0).await.expect("append");
        let background = Background::new(Rc::clone(&repo), LocalBus::new().background());
        let outcome = background.drain_feed().await.expect("drain");
        assert_eq!(outcome.unknown_images, 1);
        assert_eq!(repo.cursor().await.expect("cursor"), FeedCursor(1));
        assert!(repo.images().await.expect("images").is_empty());
    }
}
