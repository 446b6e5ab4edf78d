//! Resolve a hover OCR result to the word under the pointer.

use crate::ocr::OcrResult;
use crate::ocr_coordinator::OcrEvent;
use crate::tokenizer::{closest_token, TokenWithPosition, Tokenizer};
use pdf_viewer_cache::{Point, Rect};

/// The word nearest to the pointer.
#[derive(Debug, Clone, PartialEq)]
pub struct HoverHit {
    pub token: TokenWithPosition,
    /// Token rectangle mapped back to screen coordinates
    pub screen_rect: Rect,
    /// Distance from the pointer to the token, in image pixels
    pub distance: f32,
}

/// Maps pointer positions into OCR image space and back.
///
/// The OCR image is a capture of `region` on screen, possibly at a different
/// resolution; coordinates are scaled by `image_size / region size`.
#[derive(Debug, Clone, Default)]
pub struct HoverLookup {
    max_distance: Option<f32>,
}

impl HoverLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ignore tokens farther than `distance` image pixels from the pointer
    pub fn with_max_distance(mut self, distance: f32) -> Self {
        self.max_distance = Some(distance);
        self
    }

    /// Resolve a completed OCR event. Other events yield `None`.
    pub fn lookup(&self, tokenizer: &Tokenizer, event: &OcrEvent) -> Option<HoverHit> {
        match event {
            OcrEvent::Completed {
                result,
                region,
                pointer,
                image_size,
            } => self.lookup_result(tokenizer, result, region, pointer, *image_size),
            _ => None,
        }
    }

    pub fn lookup_result(
        &self,
        tokenizer: &Tokenizer,
        result: &OcrResult,
        region: &Rect,
        pointer: &Point,
        image_size: (u32, u32),
    ) -> Option<HoverHit> {
        let tokens = tokenizer.tokenize_with_position(result);
        let (sx, sy) = scale_factors(region, image_size);

        let image_point = Point::new((pointer.x - region.x) * sx, (pointer.y - region.y) * sy);
        let (token, distance) = closest_token(&tokens, &image_point)?;

        if self.max_distance.is_some_and(|max| distance > max) {
            tracing::trace!(word = %token.word, distance, "nearest token too far from pointer");
            return None;
        }

        let screen_rect = token
            .estimated_rect
            .scaled(1.0 / sx, 1.0 / sy)
            .translated(region.x, region.y);

        Some(HoverHit {
            token: token.clone(),
            screen_rect,
            distance,
        })
    }
}

/// Screen-to-image scale; 1.0 on any degenerate axis.
fn scale_factors(region: &Rect, (width, height): (u32, u32)) -> (f32, f32) {
    let axis = |pixels: u32, extent: f32| {
        if pixels == 0 || extent <= 0.0 {
            1.0
        } else {
            pixels as f32 / extent
        }
    };
    (axis(width, region.width), axis(height, region.height))
}
