//! Ranking images by recency and size
//!
//! Both rankings sort a copy of their input with a stable sort, so equal keys
//! keep their inventory order.

use std::cmp::Reverse;

use crate::image::ImageRecord;

/// Images ordered from most to least recently pulled.
///
/// A `limit` between zero and the number of images truncates the ranking,
/// anything else returns it whole.
pub fn by_recency(images: &[ImageRecord], limit: Option<usize>) -> Vec<ImageRecord> {
    let mut ranked = images.to_vec();
    ranked.sort_by_key(|image| Reverse(image.last_pull_date));
    truncate(ranked, limit)
}

/// Images ordered from largest to smallest.
///
/// `limit` behaves as in [`by_recency`].
pub fn by_size(images: &[ImageRecord], limit: Option<usize>) -> Vec<ImageRecord> {
    let mut ranked = images.to_vec();
    ranked.sort_by_key(|image| Reverse(image.image_size));
    truncate(ranked, limit)
}

fn truncate(mut ranked: Vec<ImageRecord>, limit: Option<usize>) -> Vec<ImageRecord> {
    if let Some(n) = limit {
        if n > 0 && n < ranked.len() {
            ranked.truncate(n);
        }
    }
    ranked
}
