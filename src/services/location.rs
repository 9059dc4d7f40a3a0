// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Human-readable location labels for new posts.

use geo::Point;
use std::future::Future;

use crate::error::Result;

/// Label used when the position resolves to no named place.
pub const FALLBACK_LABEL: &str = "Current location";

/// Reverse-geocoded place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Address {
    pub city: Option<String>,
    pub region: Option<String>,
}

/// Device location service (position fix and reverse geocoding).
pub trait LocationProvider: Send + Sync {
    /// Current position as `(longitude, latitude)`.
    fn current_position(&self) -> impl Future<Output = Result<Point<f64>>> + Send;

    fn reverse_geocode(&self, position: Point<f64>)
        -> impl Future<Output = Result<Vec<Address>>> + Send;
}

/// Label for an address: `"City, Region"`, the region alone, or the
/// fallback.
pub fn label_for(address: Option<&Address>) -> String {
    let Some(address) = address else {
        return FALLBACK_LABEL.to_string();
    };
    match (non_empty(&address.city), non_empty(&address.region)) {
        (Some(city), Some(region)) => format!("{}, {}", city, region),
        (Some(city), None) => city.to_string(),
        (None, Some(region)) => region.to_string(),
        (None, None) => FALLBACK_LABEL.to_string(),
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Resolve the device's current position to a label.
pub async fn current_location_label<L: LocationProvider>(provider: &L) -> Result<String> {
    let position = provider.current_position().await?;
    let addresses = provider.reverse_geocode(position).await?;

    let label = label_for(addresses.first());
    tracing::debug!(lon = position.x(), lat = position.y(), label = %label, "Resolved location");
    Ok(label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    struct FixedLocation {
        addresses: Vec<Address>,
        fail: bool,
    }

    impl LocationProvider for FixedLocation {
        async fn current_position(&self) -> Result<Point<f64>> {
            if self.fail {
                return Err(AppError::Validation(
                    "Location permission denied".to_string(),
                ));
            }
            Ok(Point::new(-47.06, -22.90))
        }

        async fn reverse_geocode(&self, _position: Point<f64>) -> Result<Vec<Address>> {
            Ok(self.addresses.clone())
        }
    }

    fn address(city: Option<&str>, region: Option<&str>) -> Address {
        Address {
            city: city.map(String::from),
            region: region.map(String::from),
        }
    }

    #[test]
    fn test_label_variants() {
        assert_eq!(
            label_for(Some(&address(Some("Campinas"), Some("SP")))),
            "Campinas, SP"
        );
        assert_eq!(label_for(Some(&address(Some("Campinas"), None))), "Campinas");
        assert_eq!(label_for(Some(&address(Some(""), Some("SP")))), "SP");
        assert_eq!(label_for(Some(&address(Some("  "), Some(" SP ")))), "SP");
        assert_eq!(label_for(Some(&address(None, None))), FALLBACK_LABEL);
        assert_eq!(label_for(None), FALLBACK_LABEL);
    }

    #[tokio::test]
    async fn test_current_location_label() {
        let provider = FixedLocation {
            addresses: vec![address(Some("Campinas"), Some("SP")), address(None, Some("RJ"))],
            fail: false,
        };
        assert_eq!(
            current_location_label(&provider).await.unwrap(),
            "Campinas, SP"
        );

        let empty = FixedLocation {
            addresses: vec![],
            fail: false,
        };
        assert_eq!(current_location_label(&empty).await.unwrap(), FALLBACK_LABEL);
    }

    #[tokio::test]
    async fn test_permission_failure_propagates() {
        let provider = FixedLocation {
            addresses: vec![],
            fail: true,
        };
        assert!(current_location_label(&provider).await.is_err());
    }
}
