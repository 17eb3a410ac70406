use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum::IntoEnumIterator;
use tracing::{debug, instrument, warn};

use crate::scoring::Provider;
use crate::shared::AppError;

/// A geographic point backed by a street-level panorama
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanoramaPoint {
    pub id: String,
    pub streetview_ref: String,
    pub lat: f64,
    pub lng: f64,
}

impl PanoramaPoint {
    pub fn new(id: &str, streetview_ref: &str, lat: f64, lng: f64) -> Self {
        Self {
            id: id.to_string(),
            streetview_ref: streetview_ref.to_string(),
            lat,
            lng,
        }
    }
}

/// Read-only query contract of the panorama catalog
#[async_trait]
pub trait PanoramaCatalog: Send + Sync {
    async fn random_point(&self, provider: Provider) -> Result<PanoramaPoint, AppError>;
    async fn point_by_id(
        &self,
        provider: Provider,
        id: &str,
    ) -> Result<Option<PanoramaPoint>, AppError>;
}

/// In-memory catalog for development and testing
pub struct InMemoryPanoramaCatalog {
    points: HashMap<Provider, Vec<PanoramaPoint>>,
}

impl Default for InMemoryPanoramaCatalog {
    fn default() -> Self {
        Self::with_default_points()
    }
}

impl InMemoryPanoramaCatalog {
    /// Creates an empty catalog
    pub fn new() -> Self {
        Self {
            points: HashMap::new(),
        }
    }

    /// Creates a catalog that serves the same points for every provider
    pub fn with_points(points: Vec<PanoramaPoint>) -> Self {
        let mut catalog = Self::new();
        for provider in Provider::iter() {
            catalog = catalog.with_provider_points(provider, points.clone());
        }
        catalog
    }

    pub fn with_provider_points(mut self, provider: Provider, points: Vec<PanoramaPoint>) -> Self {
        self.points.entry(provider).or_default().extend(points);
        self
    }

    /// A handful of well known locations so a fresh server is playable
    pub fn with_default_points() -> Self {
        Self::with_points(vec![
            PanoramaPoint::new("paris-1", "CAoSLEFGMVFpcE1", 48.8584, 2.2945),
            PanoramaPoint::new("tokyo-1", "CAoSLEFGMVFpcE2", 35.6595, 139.7005),
            PanoramaPoint::new("nyc-1", "CAoSLEFGMVFpcE3", 40.7580, -73.9855),
            PanoramaPoint::new("sydney-1", "CAoSLEFGMVFpcE4", -33.8568, 151.2153),
            PanoramaPoint::new("cape-town-1", "CAoSLEFGMVFpcE5", -33.9249, 18.4241),
            PanoramaPoint::new("reykjavik-1", "CAoSLEFGMVFpcE6", 64.1466, -21.9426),
            PanoramaPoint::new("lima-1", "CAoSLEFGMVFpcE7", -12.0464, -77.0428),
        ])
    }
}

#[async_trait]
impl PanoramaCatalog for InMemoryPanoramaCatalog {
    #[instrument(skip(self))]
    async fn random_point(&self, provider: Provider) -> Result<PanoramaPoint, AppError> {
        let points = match self.points.get(&provider) {
            Some(points) if !points.is_empty() => points,
            _ => {
                warn!(provider = %provider, "No panoramas available for provider");
                return Err(AppError::NotFound(format!(
                    "No panorama available for provider {}",
                    provider
                )));
            }
        };

        let index = rand::rng().random_range(0..points.len());
        let point = points[index].clone();
        debug!(provider = %provider, point_id = %point.id, "Picked random panorama");
        Ok(point)
    }

    #[instrument(skip(self))]
    async fn point_by_id(
        &self,
        provider: Provider,
        id: &str,
    ) -> Result<Option<PanoramaPoint>, AppError> {
        Ok(self
            .points
            .get(&provider)
            .and_then(|points| points.iter().find(|p| p.id == id).cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_random_point_comes_from_provider_set() {
        let catalog = InMemoryPanoramaCatalog::new()
            .with_provider_points(Provider::Mapillary, vec![PanoramaPoint::new("a", "ref-a", 1.0, 2.0)]);

        let point = catalog.random_point(Provider::Mapillary).await.unwrap();
        assert_eq!(point.id, "a");

        let missing = catalog.random_point(Provider::Google).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_point_by_id() {
        let catalog = InMemoryPanoramaCatalog::with_default_points();

        let point = catalog
            .point_by_id(Provider::Google, "tokyo-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(point.lat, 35.6595);

        assert!(catalog
            .point_by_id(Provider::Google, "atlantis")
            .await
            .unwrap()
            .is_none());
    }
}
