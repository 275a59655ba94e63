use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Location {
    #[validate(length(min = 1))]
    pub name: String,

    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,

    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
}

impl Location {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            name: name.into(),
            latitude,
            longitude,
        }
    }

    /// Filesystem-safe identity used in every artifact name: lowercase,
    /// spaces to underscores, everything outside [a-z0-9_-] dropped.
    pub fn slug(&self) -> String {
        crate::utils::filename::sanitize(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_validation() {
        let location = Location::new("Paris", 48.8566, 2.3522);
        assert!(location.validate().is_ok());
    }

    #[test]
    fn test_invalid_coordinates() {
        let location = Location::new("Nowhere", 91.0, 2.3522);
        assert!(location.validate().is_err());

        let location = Location::new("Nowhere", 48.0, -181.0);
        assert!(location.validate().is_err());
    }

    #[test]
    fn test_slug() {
        let location = Location::new("New York City", 40.7128, -74.006);
        assert_eq!(location.slug(), "new_york_city");

        let location = Location::new("São Paulo!", -23.55, -46.63);
        assert_eq!(location.slug(), "so_paulo");
    }
}
