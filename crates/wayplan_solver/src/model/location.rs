use geo::{Distance, Haversine};

/// A geographic point. Stops may carry one; vehicle start and end stops
/// without a physical location simply omit it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    point: geo::Point,
}

impl Location {
    pub fn from_lat_lon(lat: f64, lon: f64) -> Self {
        Self {
            point: geo::Point::new(lon, lat),
        }
    }

    pub fn from_cartesian(x: f64, y: f64) -> Self {
        Self {
            point: geo::Point::new(x, y),
        }
    }

    pub fn x(&self) -> f64 {
        self.point.x()
    }

    pub fn y(&self) -> f64 {
        self.point.y()
    }

    pub fn lon(&self) -> f64 {
        self.point.x()
    }

    pub fn lat(&self) -> f64 {
        self.point.y()
    }

    pub fn haversine_distance(&self, to: &Location) -> f64 {
        let haversine = Haversine;
        haversine.distance(self.point, to.point)
    }
}
