use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Highest score a single guess can earn
pub const MAX_SCORE: i32 = 5000;

/// Mean earth radius in meters
const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

/// Source of street-level imagery for a game
///
/// The provider decides both the point catalog and how quickly the score
/// decays with distance: sparse coverage means guesses are judged on a
/// larger scale.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Provider {
    Google,
    Mapillary,
    Kartaview,
}

impl Provider {
    /// Distance in kilometers at which a guess earns about 60% of the max score
    pub fn decay_km(self) -> f64 {
        match self {
            Provider::Google => 150.0,
            Provider::Mapillary => 500.0,
            Provider::Kartaview => 750.0,
        }
    }
}

/// Score and miss distance of a single guess
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub score: i32,
    pub distance: f64,
}

impl ScoreResult {
    pub const ZERO: ScoreResult = ScoreResult {
        score: 0,
        distance: 0.0,
    };
}

/// True when the coordinate is the "no guess submitted" sentinel
pub fn is_zero_guess(lat: f64, lng: f64) -> bool {
    lat == 0.0 && lng == 0.0
}

/// Great-circle distance between two coordinates, in meters
pub fn haversine_distance(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lng2 - lng1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Scores a guess against the true location
///
/// A guess of exactly (0, 0) means the player never guessed and yields
/// `(0, 0)` rather than the distance to null island.
pub fn score(
    provider: Provider,
    true_lat: f64,
    true_lng: f64,
    guess_lat: f64,
    guess_lng: f64,
) -> ScoreResult {
    if is_zero_guess(guess_lat, guess_lng) {
        return ScoreResult::ZERO;
    }

    let distance = haversine_distance(true_lat, true_lng, guess_lat, guess_lng);
    let scaled = (distance / 1000.0) / provider.decay_km();
    let raw = f64::from(MAX_SCORE) * (-0.5 * scaled * scaled).exp();

    ScoreResult {
        score: (raw.round() as i32).clamp(0, MAX_SCORE),
        distance,
    }
}
