//! Typed boundary structs for maps dataset items.

use serde::Deserialize;

/// A single maps listing as returned by the actor's dataset.
///
/// Narrow and explicitly optional: dataset items are dict-shaped and vary by
/// listing; anything the pipeline does not consume is dropped here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawListing {
    /// Business display name.
    #[serde(default)]
    pub title: String,
    /// Free-form street address, e.g. "100 Main St, Dallas, TX 75201".
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    /// Maps listing URL — the stable external listing key.
    #[serde(default, rename = "url")]
    pub listing_url: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default, rename = "reviewsCount")]
    pub reviews_count: Option<u32>,
    /// Listing-reported opening hours, kept as free-form JSON.
    #[serde(default, rename = "openingHours")]
    pub opening_hours: Option<serde_json::Value>,
    /// Social/business profile link, when the listing exposes one.
    #[serde(default, rename = "facebookUrl")]
    pub profile_url: Option<String>,
}

/// Address components split out of a listing's free-form address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Address {
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
}

impl RawListing {
    /// Whether the listing carries enough identity to persist.
    ///
    /// Records missing both a name and a listing key are untrusted noise and
    /// are dropped silently by the orchestrator.
    pub fn has_identity(&self) -> bool {
        !self.title.trim().is_empty()
            || matches!(&self.listing_url, Some(u) if !u.trim().is_empty())
    }

    /// Split the free-form address into components.
    ///
    /// Best-effort comma split: "street, city, ST zip". Missing pieces stay
    /// `None`; no validation is attempted.
    pub fn address_components(&self) -> Address {
        let Some(address) = self.address.as_deref() else {
            return Address::default();
        };

        let parts: Vec<&str> = address.split(',').map(str::trim).collect();
        let street = parts.first().filter(|s| !s.is_empty()).map(|s| s.to_string());
        let city = parts.get(1).filter(|s| !s.is_empty()).map(|s| s.to_string());

        let (state, zip) = match parts.get(2) {
            Some(state_zip) => {
                let pieces: Vec<&str> = state_zip.split_whitespace().collect();
                if pieces.len() >= 2 {
                    (
                        Some(pieces[0].to_string()),
                        Some(pieces[pieces.len() - 1].to_string()),
                    )
                } else if pieces.len() == 1 {
                    (Some(pieces[0].to_string()), None)
                } else {
                    (None, None)
                }
            }
            None => (None, None),
        };

        Address {
            street,
            city,
            state,
            zip,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_address_splits() {
        let listing = RawListing {
            address: Some("100 Main St, Dallas, TX 75201".into()),
            ..Default::default()
        };
        let addr = listing.address_components();
        assert_eq!(addr.street.as_deref(), Some("100 Main St"));
        assert_eq!(addr.city.as_deref(), Some("Dallas"));
        assert_eq!(addr.state.as_deref(), Some("TX"));
        assert_eq!(addr.zip.as_deref(), Some("75201"));
    }

    #[test]
    fn partial_address_leaves_gaps() {
        let listing = RawListing {
            address: Some("100 Main St, Dallas".into()),
            ..Default::default()
        };
        let addr = listing.address_components();
        assert_eq!(addr.street.as_deref(), Some("100 Main St"));
        assert_eq!(addr.city.as_deref(), Some("Dallas"));
        assert_eq!(addr.state, None);
        assert_eq!(addr.zip, None);

        let empty = RawListing::default();
        assert_eq!(empty.address_components(), Address::default());
    }

    #[test]
    fn identity_requires_name_or_key() {
        let named = RawListing {
            title: "Ace Towing".into(),
            ..Default::default()
        };
        assert!(named.has_identity());

        let keyed = RawListing {
            listing_url: Some("https://maps.example.com/x".into()),
            ..Default::default()
        };
        assert!(keyed.has_identity());

        let neither = RawListing {
            listing_url: Some("  ".into()),
            ..Default::default()
        };
        assert!(!neither.has_identity());
    }

    #[test]
    fn deserializes_actor_item() {
        let item = serde_json::json!({
            "title": "Ace Towing",
            "address": "100 Main St, Dallas, TX 75201",
            "phone": "555-0100",
            "website": "https://acetowing.example.com",
            "url": "https://maps.example.com/ace",
            "rating": 4.6,
            "reviewsCount": 120,
            "openingHours": [{"day": "Monday", "hours": "8am-6pm"}],
            "facebookUrl": "https://facebook.example.com/acetowing",
            "someFieldWeIgnore": {"nested": true}
        });
        let listing: RawListing = serde_json::from_value(item).expect("deserialize");
        assert_eq!(listing.title, "Ace Towing");
        assert_eq!(listing.reviews_count, Some(120));
        assert!(listing.opening_hours.is_some());
        assert_eq!(
            listing.profile_url.as_deref(),
            Some("https://facebook.example.com/acetowing")
        );
    }
}
