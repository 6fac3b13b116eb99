// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Marker icon memoization.
//!
//! Icons depend only on the heading (rounded to 15°) and the color bucket,
//! so at most 24 × buckets distinct icons exist. The cache stops inserting
//! once it reaches its cap; icons past the cap are built on every request.

use std::collections::HashMap;
use std::sync::Arc;

use crate::classify::ColorBucket;

/// Heading granularity in degrees.
pub const HEADING_STEP_DEG: u16 = 15;
/// Default maximum number of cached icons.
pub const DEFAULT_ICON_CACHE_CAP: usize = 100;

const ICON_SIZE_PX: u32 = 32;
const OUTLINE_COLOR: &str = "#1e40af";

/// A rendered aircraft marker icon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerIcon {
    pub heading_deg: u16,
    pub bucket: ColorBucket,
    /// SVG markup, `ICON_SIZE_PX` square, rotated about its center.
    pub svg: String,
}

impl MarkerIcon {
    fn build(heading_deg: u16, bucket: ColorBucket) -> Self {
        let half = ICON_SIZE_PX / 2;
        let svg = format!(
            concat!(
                r#"<svg width="{size}" height="{size}" viewBox="0 0 {size} {size}" xmlns="http://www.w3.org/2000/svg">"#,
                r#"<g transform="rotate({heading} {half} {half})">"#,
                r#"<path d="M16 2 L18 14 L24 14 L24 18 L18 18 L16 30 L14 30 L12 18 L6 18 L6 14 L12 14 L14 2 Z" "#,
                r#"fill="{fill}" stroke="{outline}" stroke-width="1"/>"#,
                "</g></svg>"
            ),
            size = ICON_SIZE_PX,
            heading = heading_deg,
            half = half,
            fill = bucket.hex(),
            outline = OUTLINE_COLOR,
        );
        Self {
            heading_deg,
            bucket,
            svg,
        }
    }
}

/// Round a heading to the nearest [`HEADING_STEP_DEG`], normalized to `0..360`.
///
/// A missing or non-finite heading points north.
#[must_use]
pub fn round_heading(heading: Option<f64>) -> u16 {
    let Some(deg) = heading.filter(|h| h.is_finite()) else {
        return 0;
    };
    let step = f64::from(HEADING_STEP_DEG);
    let rounded = ((deg / step).round() * step).rem_euclid(360.0);

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "rem_euclid keeps the value in 0..360"
    )]
    let rounded = rounded as u16;
    rounded
}

/// Bounded icon cache keyed by rounded heading and bucket.
#[derive(Debug)]
pub struct IconCache {
    icons: HashMap<(u16, ColorBucket), Arc<MarkerIcon>>,
    cap: usize,
}

impl Default for IconCache {
    fn default() -> Self {
        Self::new(DEFAULT_ICON_CACHE_CAP)
    }
}

impl IconCache {
    #[must_use]
    pub fn new(cap: usize) -> Self {
        Self {
            icons: HashMap::new(),
            cap,
        }
    }

    /// Icon for a raw heading and bucket.
    pub fn icon(&mut self, heading: Option<f64>, bucket: ColorBucket) -> Arc<MarkerIcon> {
        let key = (round_heading(heading), bucket);

        if let Some(icon) = self.icons.get(&key) {
            return Arc::clone(icon);
        }

        let icon = Arc::new(MarkerIcon::build(key.0, bucket));
        if self.icons.len() < self.cap {
            self.icons.insert(key, Arc::clone(&icon));
        }
        icon
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.icons.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.icons.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_heading() {
        assert_eq!(round_heading(Some(0.0)), 0);
        assert_eq!(round_heading(Some(7.4)), 0);
        assert_eq!(round_heading(Some(7.5)), 15);
        assert_eq!(round_heading(Some(92.0)), 90);
        assert_eq!(round_heading(Some(355.0)), 0);
        assert_eq!(round_heading(Some(-20.0)), 345);
        assert_eq!(round_heading(None), 0);
        assert_eq!(round_heading(Some(f64::NAN)), 0);
    }

    #[test]
    fn test_nearby_headings_share_icon() {
        let mut cache = IconCache::default();
        let a = cache.icon(Some(88.0), ColorBucket::United);
        let b = cache.icon(Some(94.0), ColorBucket::United);

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
        assert!(a.svg.contains("rotate(90 16 16)"));
        assert!(a.svg.contains(ColorBucket::United.hex()));
    }

    #[test]
    fn test_cap_stops_insertions() {
        let mut cache = IconCache::new(2);
        cache.icon(Some(0.0), ColorBucket::Delta);
        cache.icon(Some(15.0), ColorBucket::Delta);
        let third = cache.icon(Some(30.0), ColorBucket::Delta);

        assert_eq!(cache.len(), 2);
        assert_eq!(third.heading_deg, 30);
    }
}
