//! Detail page extraction
//!
//! Each field is read independently. A missing or malformed field degrades
//! to an empty value and a [`FieldWarning`]; only a page that never loads
//! fails the whole listing.

use crate::config::SelectorConfig;
use crate::crawler::{GeoPoint, ListingReference, PropertyRecord};
use crate::driver::{BrowserPage, DriverError, DriverResult, Locator, RenderingDriver};
use crate::HarvestError;
use std::fmt;
use std::time::Duration;

/// Reads the first text node of an element, skipping nested markup
const FIRST_TEXT_NODE_JS: &str =
    "function() { return this.childNodes.length ? this.childNodes[0].textContent : null; }";

/// Name, coordinates, address and rating
const DETAIL_FIELDS: usize = 4;

/// A field that could not be read as expected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldWarning {
    MissingField { field: &'static str },
    MalformedField { field: &'static str, raw: String },
    /// The driver failed while reading the field
    UnreadableField { field: &'static str, reason: String },
}

impl fmt::Display for FieldWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField { field } => write!(f, "{} is missing", field),
            Self::MalformedField { field, raw } => write!(f, "{} is malformed: {:?}", field, raw),
            Self::UnreadableField { field, reason } => {
                write!(f, "{} could not be read: {}", field, reason)
            }
        }
    }
}

/// Parses a "lat,lng" pair
///
/// Anything other than exactly two finite numbers is rejected, so a record
/// never carries half a coordinate.
pub fn parse_coordinates(raw: &str) -> Result<GeoPoint, FieldWarning> {
    let malformed = || FieldWarning::MalformedField {
        field: "coordinates",
        raw: raw.to_string(),
    };

    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    let [lat, lng] = parts.as_slice() else {
        return Err(malformed());
    };

    let latitude: f64 = lat.parse().map_err(|_| malformed())?;
    let longitude: f64 = lng.parse().map_err(|_| malformed())?;
    if !latitude.is_finite() || !longitude.is_finite() {
        return Err(malformed());
    }

    Ok(GeoPoint {
        latitude,
        longitude,
    })
}

/// One extracted record and the fields that degraded on the way
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub record: PropertyRecord,
    pub warnings: Vec<FieldWarning>,
}

/// Builds [`PropertyRecord`]s from rendered detail pages
#[derive(Debug, Clone, Copy)]
pub struct DetailExtractor<'a> {
    selectors: &'a SelectorConfig,
}

impl<'a> DetailExtractor<'a> {
    pub fn new(selectors: &'a SelectorConfig) -> Self {
        Self { selectors }
    }

    /// Extracts a record from a loaded detail page
    ///
    /// Absent, unparsable or unreadable fields degrade to empty values. A
    /// closed page or browser is returned as an error, and so is a page on
    /// which no field could be read at all.
    pub async fn extract<P: BrowserPage>(
        &self,
        page: &P,
        reference: &ListingReference,
    ) -> DriverResult<Extraction> {
        let mut warnings = Vec::new();
        let selectors = self.selectors;

        let name = self.read_text(page, &selectors.title).await;
        let name = degrade(name, "name", &mut warnings)?;

        let coordinates = self
            .read_attribute(page, &selectors.coordinates, &selectors.coordinates_attribute)
            .await;
        let coordinates = match degrade(coordinates, "coordinates", &mut warnings)? {
            raw if raw.is_empty() => None,
            raw => match parse_coordinates(&raw) {
                Ok(point) => Some(point),
                Err(warning) => {
                    warnings.push(warning);
                    None
                }
            },
        };

        let address = self.read_address(page).await;
        let address = degrade(address, "address", &mut warnings)?;

        let rating = self
            .read_attribute(page, &selectors.rating, &selectors.rating_attribute)
            .await;
        let rating = degrade(rating, "rating", &mut warnings)?;

        let unreadable: Vec<&str> = warnings
            .iter()
            .filter_map(|warning| match warning {
                FieldWarning::UnreadableField { reason, .. } => Some(reason.as_str()),
                _ => None,
            })
            .collect();
        if unreadable.len() == DETAIL_FIELDS {
            return Err(DriverError::Protocol(format!(
                "no field of {} could be read: {}",
                reference.detail_url, unreadable[0]
            )));
        }

        let url = match page.current_url().await {
            Ok(url) if !url.is_empty() => url,
            Err(DriverError::Closed) => return Err(DriverError::Closed),
            _ => reference.detail_url.to_string(),
        };

        Ok(Extraction {
            record: PropertyRecord {
                name,
                coordinates,
                address,
                price: reference.listed_price.clone(),
                rating,
                url,
            },
            warnings,
        })
    }

    async fn read_text<P: BrowserPage>(
        &self,
        page: &P,
        selector: &str,
    ) -> DriverResult<Option<String>> {
        match page.query_first(&Locator::css(selector)).await? {
            Some(element) => page.text_content(&element).await,
            None => Ok(None),
        }
    }

    async fn read_attribute<P: BrowserPage>(
        &self,
        page: &P,
        selector: &str,
        attribute: &str,
    ) -> DriverResult<Option<String>> {
        match page.query_first(&Locator::css(selector)).await? {
            Some(element) => page.attribute(&element, attribute).await,
            None => Ok(None),
        }
    }

    /// First text node of the address block, or the whole block's text
    async fn read_address<P: BrowserPage>(&self, page: &P) -> DriverResult<Option<String>> {
        let Some(block) = page
            .query_first(&Locator::css(&self.selectors.address))
            .await?
        else {
            return Ok(None);
        };

        match page.evaluate(&block, FIRST_TEXT_NODE_JS).await? {
            serde_json::Value::String(text) if !text.trim().is_empty() => Ok(Some(text)),
            _ => page.text_content(&block).await,
        }
    }
}

/// Turns one field read into its trimmed value, recording why it is empty
///
/// A closed page is passed through; every other driver error only empties
/// the field.
fn degrade(
    value: DriverResult<Option<String>>,
    field: &'static str,
    warnings: &mut Vec<FieldWarning>,
) -> DriverResult<String> {
    let text = match value {
        Ok(value) => value.map(|v| v.trim().to_string()).unwrap_or_default(),
        Err(DriverError::Closed) => return Err(DriverError::Closed),
        Err(e) => {
            warnings.push(FieldWarning::UnreadableField {
                field,
                reason: e.to_string(),
            });
            return Ok(String::new());
        }
    };
    if text.is_empty() {
        warnings.push(FieldWarning::MissingField { field });
    }
    Ok(text)
}

/// Opens, extracts and closes one detail page
///
/// A navigation or load timeout becomes [`HarvestError::PageLoadTimeout`].
/// The page is closed whether extraction succeeds or not.
pub async fn fetch_detail<D: RenderingDriver>(
    driver: &D,
    reference: &ListingReference,
    selectors: &SelectorConfig,
    page_load_timeout: Duration,
) -> Result<Extraction, HarvestError> {
    let url = reference.detail_url.as_str();
    let timeout_ms = page_load_timeout.as_millis() as u64;
    let load_timeout = |url: &str| HarvestError::PageLoadTimeout {
        url: url.to_string(),
        timeout_ms,
    };

    let page = match driver.open_page(url, page_load_timeout).await {
        Ok(page) => page,
        Err(e) if e.is_timeout() => return Err(load_timeout(url)),
        Err(e) => return Err(e.into()),
    };

    let result = match page.wait_for_load(page_load_timeout).await {
        Ok(()) => DetailExtractor::new(selectors)
            .extract(&page, reference)
            .await
            .map_err(HarvestError::from),
        Err(e) if e.is_timeout() => Err(load_timeout(url)),
        Err(e) => Err(e.into()),
    };

    if let Err(e) = page.close().await {
        tracing::warn!("Failed to close detail page {}: {}", url, e);
    }

    result
}
