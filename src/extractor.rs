use log::{debug, info};
use scraper::Html;

use crate::{
    driver::PageDriver,
    error::CourtError,
    html::{extract_text, selector},
    site::layout,
    slot::{CleanSlot, RawSlotEntry},
};

/// Scrapes the bookable listings currently rendered on `page`, in DOM order.
pub async fn extract(page: &dyn PageDriver) -> Result<Vec<CleanSlot>, CourtError> {
    let html = page.content().await?;
    parse_listings(&html)
}

/// Reads every listing, keeps only the bookable ones whose action string
/// matches the booking grammar.
///
/// The court name, price and time range are read by position from the
/// listing's text fields because the site does not label them. If the site
/// reorders those fields, slots come out with swapped values rather than an
/// error; `layout::LISTING_TEXT` is the single place to adjust.
pub fn parse_listings(html: &str) -> Result<Vec<CleanSlot>, CourtError> {
    let document = Html::parse_document(html);
    let listing_selector = selector(layout::LISTING)?;
    let marker_selector = selector(layout::BOOKABLE_MARKER)?;
    let text_selector = selector(layout::LISTING_TEXT)?;

    let mut seen = 0usize;
    let mut slots = Vec::new();
    for listing in document.select(&listing_selector) {
        seen += 1;
        let marker = listing.select(&marker_selector).next();
        let mut fields = listing.select(&text_selector).map(extract_text);

        let raw = RawSlotEntry {
            court_name: fields.next().unwrap_or_default(),
            price: fields.next().unwrap_or_default(),
            time_range: fields.next().unwrap_or_default(),
            action: marker
                .and_then(|node| node.value().attr(layout::ACTION_ATTRIBUTE))
                .map(str::to_string),
            bookable: marker.is_some(),
        };

        match CleanSlot::from_raw(raw.clone()) {
            Some(slot) => slots.push(slot),
            None => debug!("skipping listing {:?} ({:?})", raw.court_name, raw.time_range),
        }
    }

    info!("found {} listings, {} bookable", seen, slots.len());
    Ok(slots)
}
