use serde::{Deserialize, Serialize};

use conescout_api::{BoundingBox, LatLng};

/// Pixel position inside the map container, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContainerPoint {
    pub x: i64,
    pub y: i64,
}

/// The visible map extent and its size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub bounds: BoundingBox,
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    /// California at a typical desktop map size.
    fn default() -> Self {
        Self {
            bounds: BoundingBox::new(-124.5, 32.5, -114.0, 42.0),
            width: 1024,
            height: 768,
        }
    }
}

impl Viewport {
    pub fn new(bounds: BoundingBox, width: u32, height: u32) -> Self {
        Self {
            bounds,
            width,
            height,
        }
    }

    /// `west,south,east,north`
    pub fn bbox_string(&self) -> String {
        self.bounds.to_bbox_string()
    }

    /// Project a coordinate to container pixels (linear EPSG:4326),
    /// rounded to the nearest pixel.
    #[allow(clippy::cast_possible_truncation)]
    pub fn container_point(&self, latlng: LatLng) -> ContainerPoint {
        let span_x = self.bounds.width();
        let span_y = self.bounds.height();
        let fx = if span_x.abs() < f64::EPSILON {
            0.0
        } else {
            (latlng.lng - self.bounds.west) / span_x
        };
        let fy = if span_y.abs() < f64::EPSILON {
            0.0
        } else {
            (self.bounds.north - latlng.lat) / span_y
        };
        ContainerPoint {
            x: (fx * f64::from(self.width)).round() as i64,
            y: (fy * f64::from(self.height)).round() as i64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_point_maps_corners_and_center() {
        let vp = Viewport::new(BoundingBox::new(-124.0, 36.0, -120.0, 40.0), 800, 600);
        assert_eq!(vp.container_point(LatLng::new(40.0, -124.0)), ContainerPoint { x: 0, y: 0 });
        assert_eq!(vp.container_point(LatLng::new(36.0, -120.0)), ContainerPoint { x: 800, y: 600 });
        assert_eq!(vp.container_point(LatLng::new(38.0, -122.0)), ContainerPoint { x: 400, y: 300 });
    }

    #[test]
    fn degenerate_bounds_do_not_divide_by_zero() {
        let vp = Viewport::new(BoundingBox::new(-120.0, 38.0, -120.0, 38.0), 10, 10);
        assert_eq!(vp.container_point(LatLng::new(38.0, -120.0)), ContainerPoint { x: 0, y: 0 });
    }
}
