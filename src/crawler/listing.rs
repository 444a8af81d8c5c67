//! Listing data model
//!
//! A [`ListingReference`] is what a result card tells us before its detail page
//! is visited; a [`PropertyRecord`] is the completed unit of output.

use serde::Serialize;
use url::Url;

/// Price placeholder when a card shows no price
pub const NO_PRICE: &str = "N/A";

/// A candidate listing observed on the search-results page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingReference {
    /// Resolved, normalized detail page URL
    pub detail_url: Url,

    /// Price text as shown on the card, or [`NO_PRICE`]
    pub listed_price: String,
}

impl ListingReference {
    pub fn new(detail_url: Url, listed_price: Option<String>) -> Self {
        let listed_price = listed_price
            .map(|price| clean_price(&price))
            .filter(|price| !price.is_empty())
            .unwrap_or_else(|| NO_PRICE.to_string());

        Self {
            detail_url,
            listed_price,
        }
    }
}

/// Removes non-breaking spaces and surrounding whitespace from card prices
pub fn clean_price(raw: &str) -> String {
    raw.replace('\u{a0}', "").trim().to_string()
}

/// A latitude/longitude pair; the two values only ever exist together
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// A completed property listing
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyRecord {
    pub name: String,
    pub coordinates: Option<GeoPoint>,
    pub address: String,
    pub price: String,
    pub rating: String,
    pub url: String,
}

impl PropertyRecord {
    pub fn latitude(&self) -> Option<f64> {
        self.coordinates.map(|point| point.latitude)
    }

    pub fn longitude(&self) -> Option<f64> {
        self.coordinates.map(|point| point.longitude)
    }

    /// Flat row view in output column order
    pub fn row(&self) -> RecordRow<'_> {
        RecordRow {
            name: &self.name,
            latitude: self.latitude(),
            longitude: self.longitude(),
            address: &self.address,
            price: &self.price,
            rating: &self.rating,
            url: &self.url,
        }
    }
}

/// Output columns, in feed order
pub const RECORD_COLUMNS: [&str; 7] = [
    "name",
    "latitude",
    "longitude",
    "address",
    "price",
    "rating",
    "url",
];

/// Serializable row of a [`PropertyRecord`]; null coordinates become empty cells
#[derive(Debug, Serialize)]
pub struct RecordRow<'a> {
    pub name: &'a str,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: &'a str,
    pub price: &'a str,
    pub rating: &'a str,
    pub url: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> Url {
        Url::parse("https://www.example.test/hotel/a.html").unwrap()
    }

    #[test]
    fn test_reference_price_cleaning() {
        let reference = ListingReference::new(url(), Some(" €\u{a0}1.234 ".to_string()));
        assert_eq!(reference.listed_price, "€1.234");
    }

    #[test]
    fn test_reference_missing_price() {
        assert_eq!(ListingReference::new(url(), None).listed_price, NO_PRICE);
        assert_eq!(
            ListingReference::new(url(), Some("\u{a0} ".to_string())).listed_price,
            NO_PRICE
        );
    }

    #[test]
    fn test_coordinates_both_or_neither() {
        let mut record = PropertyRecord {
            name: "Hotel A".to_string(),
            coordinates: Some(GeoPoint {
                latitude: 41.3851,
                longitude: 2.1734,
            }),
            address: String::new(),
            price: NO_PRICE.to_string(),
            rating: String::new(),
            url: url().to_string(),
        };
        assert_eq!(record.latitude(), Some(41.3851));
        assert_eq!(record.longitude(), Some(2.1734));

        record.coordinates = None;
        assert_eq!(record.row().latitude, None);
        assert_eq!(record.row().longitude, None);
    }
}
