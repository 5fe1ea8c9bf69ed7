// src/raster/collection.rs
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};

use super::aoi::AreaOfInterest;
use super::image::Image;

/// Space, time and quality constraints applied when building a collection.
#[derive(Debug, Clone)]
pub struct CollectionFilter {
    aoi: AreaOfInterest,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    max_cloud_cover: f64,
}

impl CollectionFilter {
    /// Dates are UTC days; `end` is exclusive.
    pub fn new(aoi: AreaOfInterest, start: NaiveDate, end: NaiveDate, max_cloud_cover: f64) -> Self {
        Self {
            aoi,
            start: Utc.from_utc_datetime(&start.and_time(NaiveTime::MIN)),
            end: Utc.from_utc_datetime(&end.and_time(NaiveTime::MIN)),
            max_cloud_cover,
        }
    }

    pub fn aoi(&self) -> &AreaOfInterest {
        &self.aoi
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn max_cloud_cover(&self) -> f64 {
        self.max_cloud_cover
    }

    /// Date and cloud-cover test, usable before any pixels are read.
    /// A missing cloud-cover property never passes.
    pub fn accepts_metadata(&self, acquired: DateTime<Utc>, cloud_cover: Option<f64>) -> bool {
        let in_time = acquired >= self.start && acquired < self.end;
        in_time && cloud_cover.is_some_and(|cover| cover < self.max_cloud_cover)
    }

    pub fn accepts(&self, image: &Image) -> bool {
        self.accepts_metadata(image.acquired(), image.cloud_cover())
            && self.aoi.intersects_grid(image.grid())
    }
}

/// Images sorted by acquisition time, oldest first.
#[derive(Debug, Clone, Default)]
pub struct ImageCollection {
    images: Vec<Image>,
}

impl ImageCollection {
    pub fn from_images(mut images: Vec<Image>) -> Self {
        images.sort_by_key(Image::acquired);
        Self { images }
    }

    pub fn filter(images: Vec<Image>, filter: &CollectionFilter) -> Self {
        let total = images.len();
        let kept: Vec<Image> = images.into_iter().filter(|img| filter.accepts(img)).collect();
        log::info!(
            "Collection filter kept {} of {} scenes ({} .. {}, cloud cover < {})",
            kept.len(),
            total,
            filter.start.date_naive(),
            filter.end.date_naive(),
            filter.max_cloud_cover
        );
        Self::from_images(kept)
    }

    pub fn images(&self) -> &[Image] {
        &self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Earliest and latest acquisition time.
    pub fn time_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        Some((self.images.first()?.acquired(), self.images.last()?.acquired()))
    }

    pub fn ids(&self) -> Vec<String> {
        self.images.iter().map(|img| img.id().to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::GridSpec;
    use geo::Rect;

    fn scene(id: &str, day: u32, cloud: Option<f64>, origin_x: f64) -> Image {
        let acquired = Utc.with_ymd_and_hms(2023, 7, day, 2, 30, 0).unwrap();
        let image = Image::new(id, acquired, GridSpec::north_up(origin_x, 10.0, 1.0, 10, 10));
        match cloud {
            Some(c) => image.with_cloud_cover(c),
            None => image,
        }
    }

    fn filter() -> CollectionFilter {
        CollectionFilter::new(
            AreaOfInterest::from_rect(Rect::new((0.0, 0.0), (10.0, 10.0))),
            NaiveDate::from_ymd_opt(2023, 7, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 7, 20).unwrap(),
            20.0,
        )
    }

    #[test]
    fn test_filter_rules() {
        let images = vec![
            scene("late", 15, Some(5.0), 0.0),
            scene("cloudy", 3, Some(20.0), 0.0),
            scene("no_property", 4, None, 0.0),
            scene("elsewhere", 5, Some(1.0), 500.0),
            scene("early", 2, Some(19.9), 0.0),
            scene("after_end", 25, Some(1.0), 0.0),
        ];

        let collection = ImageCollection::filter(images, &filter());
        assert_eq!(collection.ids(), vec!["early", "late"]);

        let (start, end) = collection.time_range().unwrap();
        assert!(start < end);
    }

    #[test]
    fn test_end_date_is_exclusive() {
        let at_end = Image::new(
            "midnight",
            Utc.with_ymd_and_hms(2023, 7, 20, 0, 0, 0).unwrap(),
            GridSpec::north_up(0.0, 10.0, 1.0, 10, 10),
        )
        .with_cloud_cover(0.0);
        assert!(!filter().accepts(&at_end));
    }

    #[test]
    fn test_metadata_rules() {
        let f = filter();
        let day = |d: u32| Utc.with_ymd_and_hms(2023, 7, d, 10, 0, 0).unwrap();
        assert!(f.accepts_metadata(day(1), Some(0.0)));
        assert!(f.accepts_metadata(day(19), Some(19.99)));
        assert!(!f.accepts_metadata(day(19), Some(20.0)));
        assert!(!f.accepts_metadata(day(10), None));
        assert!(!f.accepts_metadata(day(20), Some(0.0)));
    }

    #[test]
    fn test_too_strict_threshold_leaves_nothing() {
        let strict = CollectionFilter::new(
            AreaOfInterest::from_rect(Rect::new((0.0, 0.0), (10.0, 10.0))),
            NaiveDate::from_ymd_opt(2023, 7, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 9, 30).unwrap(),
            0.0,
        );
        let collection = ImageCollection::filter(vec![scene("a", 2, Some(0.0), 0.0)], &strict);
        assert!(collection.is_empty());
        assert!(collection.time_range().is_none());
    }
}
