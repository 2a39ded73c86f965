//! Decides which piece, if any, a tab shows on the current tick.
//!
//! Two gates apply per image. The first is drawn once per tab lifetime
//! (`min(1, scale / frequency)`) so rare images do not surface in every tab
//! at once. The second is drawn every tick (`1 / frequency`). Images that
//! pass both are candidates; one of them is shown.

use std::collections::HashMap;

use rand::seq::IndexedRandom;
use rand::Rng;

use crate::grid::PieceRect;
use crate::image_id::ImageId;
use crate::model::{Frequency, PuzzleImage};

pub const OVERLAY_MAX_SIDE: f32 = 120.0;
pub const OVERLAY_MARGIN: f32 = 16.0;

pub fn eligibility_probability(frequency: Frequency, scale: f64) -> f64 {
    (scale / frequency.get().max(1) as f64).min(1.0)
}

pub fn attempt_probability(frequency: Frequency) -> f64 {
    let value = frequency.get();
    if value <= 1 {
        1.0
    } else {
        1.0 / value as f64
    }
}

#[derive(Debug, Default, Clone)]
pub struct EligibilityCache {
    decided: HashMap<ImageId, bool>,
}

impl EligibilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_eligible<R: Rng + ?Sized>(
        &mut self,
        image: &PuzzleImage,
        scale: f64,
        rng: &mut R,
    ) -> bool {
        *self.decided.entry(image.id.clone()).or_insert_with(|| {
            rng.random::<f64>() < eligibility_probability(image.frequency, scale)
        })
    }

    pub fn decision(&self, id: &ImageId) -> Option<bool> {
        self.decided.get(id).copied()
    }

    pub fn forget(&mut self, id: &ImageId) {
        self.decided.remove(id);
    }

    pub fn len(&self) -> usize {
        self.decided.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decided.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScatterPick {
    pub image_id: ImageId,
    pub piece: u32,
}

pub fn pick_candidate<R: Rng + ?Sized>(
    images: &[PuzzleImage],
    cache: &mut EligibilityCache,
    scale: f64,
    rng: &mut R,
) -> Option<ScatterPick> {
    let mut candidates = Vec::new();
    for image in images {
        if !cache.is_eligible(image, scale, rng) {
            continue;
        }
        let uncollected = image.uncollected();
        if uncollected.is_empty() {
            continue;
        }
        if rng.random::<f64>() >= attempt_probability(image.frequency) {
            continue;
        }
        if let Some(&piece) = uncollected.choose(rng) {
            candidates.push(ScatterPick {
                image_id: image.id.clone(),
                piece,
            });
        }
    }
    candidates.choose(rng).cloned()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickDecision {
    Disabled,
    PieceVisible,
    Idle,
    Show(ScatterPick),
}

/// Per-tab scheduler state: the eligibility cache and the one piece that may
/// be on screen.
#[derive(Debug, Clone)]
pub struct ScatterScheduler {
    scale: f64,
    cache: EligibilityCache,
    visible: Option<ScatterPick>,
}

impl ScatterScheduler {
    pub fn new(scale: f64) -> Self {
        Self {
            scale,
            cache: EligibilityCache::new(),
            visible: None,
        }
    }

    /// Disabling never retracts a piece that is already showing.
    pub fn tick<R: Rng + ?Sized>(
        &mut self,
        images: &[PuzzleImage],
        enabled: bool,
        rng: &mut R,
    ) -> TickDecision {
        if !enabled {
            return TickDecision::Disabled;
        }
        if self.visible.is_some() {
            return TickDecision::PieceVisible;
        }
        match pick_candidate(images, &mut self.cache, self.scale, rng) {
            Some(pick) => {
                self.visible = Some(pick.clone());
                TickDecision::Show(pick)
            }
            None => TickDecision::Idle,
        }
    }

    pub fn visible(&self) -> Option<&ScatterPick> {
        self.visible.as_ref()
    }

    pub fn take_visible(&mut self) -> Option<ScatterPick> {
        self.visible.take()
    }

    /// Drops the visible piece if it is `(image_id, piece)`.
    pub fn withdraw(&mut self, image_id: &ImageId, piece: u32) -> bool {
        let matches = self
            .visible
            .as_ref()
            .is_some_and(|pick| &pick.image_id == image_id && pick.piece == piece);
        if matches {
            self.visible = None;
        }
        matches
    }

    /// Forgets everything about an image that was removed.
    pub fn forget_image(&mut self, image_id: &ImageId) -> bool {
        self.cache.forget(image_id);
        let matches = self
            .visible
            .as_ref()
            .is_some_and(|pick| &pick.image_id == image_id);
        if matches {
            self.visible = None;
        }
        matches
    }

    pub fn eligibility(&self) -> &EligibilityCache {
        &self.cache
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayLayout {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

/// Screen box for a scattered piece: the crop scaled to fit
/// `OVERLAY_MAX_SIDE`, dropped at a random spot inside the viewport.
pub fn overlay_layout<R: Rng + ?Sized>(
    rect: PieceRect,
    viewport_width: f32,
    viewport_height: f32,
    rng: &mut R,
) -> OverlayLayout {
    let longest = rect.width.max(rect.height).max(1) as f32;
    let scale = (OVERLAY_MAX_SIDE / longest).min(1.0);
    let width = (rect.width as f32 * scale).max(1.0);
    let height = (rect.height as f32 * scale).max(1.0);
    let span = |viewport: f32, size: f32| -> (f32, f32) {
        let min = OVERLAY_MARGIN;
        let max = (viewport - size - OVERLAY_MARGIN).max(min);
        (min, max)
    };
    let (min_x, max_x) = span(viewport_width, width);
    let (min_y, max_y) = span(viewport_height, height);
    OverlayLayout {
        left: min_x + (max_x - min_x) * rng.random::<f32>(),
        top: min_y + (max_y - min_y) * rng.random::<f32>(),
        width,
        height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UploadRecord;
    use crate::rules::ELIGIBILITY_SCALE_DEFAULT;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn image(rng: &mut StdRng, frequency: i64) -> PuzzleImage {
        PuzzleImage::from_upload(
            UploadRecord {
                label: "scatter".to_string(),
                source: "blob:scatter".to_string(),
                width: 300,
                height: 300,
                dims: None,
                frequency: Some(frequency),
            },
            3,
            0,
            rng,
        )
        .expect("image")
    }

    fn eligibility_rate(frequency: i64, trials: usize) -> f64 {
        let mut rng = StdRng::seed_from_u64(frequency as u64);
        let image = image(&mut rng, frequency);
        let eligible = (0..trials)
            .filter(|_| {
                let mut cache = EligibilityCache::new();
                cache.is_eligible(&image, ELIGIBILITY_SCALE_DEFAULT, &mut rng)
            })
            .count();
        eligible as f64 / trials as f64
    }

    #[test]
    fn eligibility_rate_tracks_frequency() {
        assert_eq!(eligibility_rate(10, 2_000), 1.0);
        let rare = eligibility_rate(100, 20_000);
        assert!((rare - 0.10).abs() < 0.02, "rate {rare}");
    }

    #[test]
    fn probabilities_follow_frequency() {
        let freq = |v| Frequency::new(v).expect("freq");
        assert_eq!(eligibility_probability(freq(5), 10.0), 1.0);
        assert_eq!(eligibility_probability(freq(40), 10.0), 0.25);
        assert_eq!(attempt_probability(freq(1)), 1.0);
        assert_eq!(attempt_probability(freq(4)), 0.25);
    }

    #[test]
    fn eligibility_is_decided_once_per_tab() {
        let mut rng = StdRng::seed_from_u64(31);
        let image = image(&mut rng, 100);
        let mut cache = EligibilityCache::new();
        let first = cache.is_eligible(&image, ELIGIBILITY_SCALE_DEFAULT, &mut rng);
        for _ in 0..100 {
            assert_eq!(cache.is_eligible(&image, ELIGIBILITY_SCALE_DEFAULT, &mut rng), first);
        }
        assert_eq!(cache.decision(&image.id), Some(first));
    }

    #[test]
    fn only_uncollected_pieces_are_picked() {
        let mut rng = StdRng::seed_from_u64(32);
        let mut image = image(&mut rng, 1);
        for piece in 0..8 {
            image.collect_piece(piece);
        }
        let mut cache = EligibilityCache::new();
        for _ in 0..20 {
            let pick = pick_candidate(
                std::slice::from_ref(&image),
                &mut cache,
                ELIGIBILITY_SCALE_DEFAULT,
                &mut rng,
            )
            .expect("frequency 1 always picks");
            assert_eq!(pick.piece, 8);
        }
        image.collect_piece(8);
        assert!(pick_candidate(
            std::slice::from_ref(&image),
            &mut cache,
            ELIGIBILITY_SCALE_DEFAULT,
            &mut rng
        )
        .is_none());
    }

    #[test]
    fn one_piece_visible_at_a_time() {
        let mut rng = StdRng::seed_from_u64(33);
        let images = vec![image(&mut rng, 1), image(&mut rng, 1)];
        let mut scheduler = ScatterScheduler::new(ELIGIBILITY_SCALE_DEFAULT);
        let TickDecision::Show(pick) = scheduler.tick(&images, true, &mut rng) else {
            panic!("frequency 1 should show a piece");
        };
        assert_eq!(scheduler.tick(&images, true, &mut rng), TickDecision::PieceVisible);
        assert_eq!(scheduler.tick(&images, false, &mut rng), TickDecision::Disabled);
        assert_eq!(scheduler.visible(), Some(&pick));
        assert!(!scheduler.withdraw(&pick.image_id, pick.piece + 1));
        assert!(scheduler.withdraw(&pick.image_id, pick.piece));
        assert!(matches!(
            scheduler.tick(&images, true, &mut rng),
            TickDecision::Show(_)
        ));
    }

    #[test]
    fn forgetting_an_image_withdraws_its_piece() {
        let mut rng = StdRng::seed_from_u64(34);
        let images = vec![image(&mut rng, 1)];
        let mut scheduler = ScatterScheduler::new(ELIGIBILITY_SCALE_DEFAULT);
        scheduler.tick(&images, true, &mut rng);
        assert!(scheduler.forget_image(&images[0].id));
        assert!(scheduler.visible().is_none());
        assert!(scheduler.eligibility().is_empty());
    }

    #[test]
    fn overlay_stays_inside_viewport() {
        let mut rng = StdRng::seed_from_u64(35);
        let rect = PieceRect {
            x: 0,
            y: 0,
            width: 400,
            height: 200,
        };
        for _ in 0..100 {
            let layout = overlay_layout(rect, 1024.0, 768.0, &mut rng);
            assert_eq!(layout.width, OVERLAY_MAX_SIDE);
            assert_eq!(layout.height, OVERLAY_MAX_SIDE / 2.0);
            assert!(layout.left >= OVERLAY_MARGIN);
            assert!(layout.left + layout.width <= 1024.0 - OVERLAY_MARGIN + 0.01);
            assert!(layout.top + layout.height <= 768.0 - OVERLAY_MARGIN + 0.01);
        }
    }
}
