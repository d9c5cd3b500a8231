use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

const EARTH_RADIUS_KM: f64 = 6_371.0;
const AVERAGE_SPEED_KMH: f64 = 40.0;

/// A point on the map. Travels over the wire and in exports as `"<lat>,<lng>"`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Builds an optional location from independently optional coordinates.
    pub fn from_pair(lat: Option<f64>, lng: Option<f64>) -> Result<Option<Self>, AppError> {
        match (lat, lng) {
            (Some(lat), Some(lng)) => Ok(Some(Self::new(lat, lng))),
            (None, None) => Ok(None),
            _ => Err(AppError::MalformedLocationPair),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6},{:.6}", self.lat, self.lng)
    }
}

impl FromStr for Location {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (lat, lng) = raw
            .split_once(',')
            .ok_or_else(|| AppError::InvalidLocationFormat(raw.to_string()))?;

        let parse = |part: &str| {
            part.trim()
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .ok_or_else(|| AppError::InvalidLocationFormat(raw.to_string()))
        };

        Ok(Self::new(parse(lat)?, parse(lng)?))
    }
}

impl TryFrom<String> for Location {
    type Error = AppError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

impl From<Location> for String {
    fn from(location: Location) -> Self {
        location.to_string()
    }
}

pub fn haversine_km(a: &Location, b: &Location) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.clamp(0.0, 1.0).sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

/// Travel time in whole minutes at the fleet's average speed.
pub fn eta_minutes(from: Option<&Location>, to: Option<&Location>) -> u32 {
    match (from, to) {
        (Some(from), Some(to)) => (haversine_km(from, to) / AVERAGE_SPEED_KMH * 60.0) as u32,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::{eta_minutes, haversine_km, Location};
    use crate::error::AppError;

    #[test]
    fn zero_distance_for_same_point() {
        let p = Location::new(53.5511, 9.9937);
        let distance = haversine_km(&p, &p);
        assert!(distance < 1e-9);
    }

    #[test]
    fn distance_is_symmetric() {
        let london = Location::new(51.5074, -0.1278);
        let paris = Location::new(48.8566, 2.3522);
        let there = haversine_km(&london, &paris);
        let back = haversine_km(&paris, &london);
        assert!((there - back).abs() < 1e-9);
        assert!((there - 343.0).abs() < 5.0);
    }

    #[test]
    fn one_degree_of_longitude_at_equator() {
        let origin = Location::new(0.0, 0.0);
        let east = Location::new(0.0, 1.0);

        let distance = haversine_km(&origin, &east);
        assert!((distance - 111.19).abs() < 0.01);
        assert_eq!(eta_minutes(Some(&origin), Some(&east)), 166);
    }

    #[test]
    fn eta_grows_with_distance() {
        let origin = Location::new(0.0, 0.0);
        let mut previous = 0;
        for step in 0..20 {
            let target = Location::new(0.0, step as f64 * 0.25);
            let eta = eta_minutes(Some(&origin), Some(&target));
            assert!(eta >= previous);
            previous = eta;
        }
    }

    #[test]
    fn eta_is_zero_without_both_points() {
        let origin = Location::new(0.0, 0.0);
        assert_eq!(eta_minutes(None, Some(&origin)), 0);
        assert_eq!(eta_minutes(Some(&origin), None), 0);
    }

    #[test]
    fn parses_and_formats_lat_lng_string() {
        let location: Location = " 52.52 , 13.405".parse().unwrap();
        assert_eq!(location, Location::new(52.52, 13.405));
        assert_eq!(location.to_string(), "52.520000,13.405000");

        let json = serde_json::to_string(&location).unwrap();
        assert_eq!(json, "\"52.520000,13.405000\"");
    }

    #[test]
    fn rejects_malformed_strings() {
        for raw in ["", "52.52", "52.52,north", "1,2,3", "NaN,1"] {
            assert!(matches!(
                raw.parse::<Location>(),
                Err(AppError::InvalidLocationFormat(_))
            ));
        }
    }

    #[test]
    fn lat_lng_must_come_together() {
        assert!(Location::from_pair(None, None).unwrap().is_none());
        assert!(Location::from_pair(Some(1.0), Some(2.0)).unwrap().is_some());
        assert!(matches!(
            Location::from_pair(Some(1.0), None),
            Err(AppError::MalformedLocationPair)
        ));
    }
}
