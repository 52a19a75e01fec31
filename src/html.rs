use scraper::{ElementRef, Html, Selector};

use crate::error::CourtError;

pub fn extract_text(node: ElementRef) -> String {
    node.text().collect::<String>().trim().to_string()
}

pub fn selector(css: &str) -> Result<Selector, CourtError> {
    Selector::parse(css).map_err(|_| CourtError::InvalidSelector(css.to_string()))
}

/// Two positionally aligned lists read from sibling containers: label `i`
/// describes target `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledPairs {
    pub labels: Vec<String>,
    pub targets: Vec<String>,
}

impl LabeledPairs {
    /// Reads the `item` texts of the `label_index`-th and `target_index`-th
    /// `container` in `document`, in DOM order.
    pub fn read(
        document: &Html,
        container: &str,
        label_index: usize,
        target_index: usize,
        item: &str,
    ) -> Result<Self, CourtError> {
        let container_selector = selector(container)?;
        let item_selector = selector(item)?;
        let containers: Vec<ElementRef> = document.select(&container_selector).collect();

        let texts = |index: usize| -> Result<Vec<String>, CourtError> {
            let Some(node) = containers.get(index) else {
                return Err(CourtError::ElementNotFound(format!("{container}[{index}]")));
            };
            // Descendants only, matching querySelectorAll on the container.
            Ok(node
                .select(&item_selector)
                .filter(|el| el.id() != node.id())
                .map(extract_text)
                .collect())
        };

        let labels = texts(label_index)?;
        let targets = texts(target_index)?;
        if targets.len() < labels.len() {
            return Err(CourtError::ElementNotFound(format!(
                "{container}[{target_index}] has {} items for {} labels",
                targets.len(),
                labels.len()
            )));
        }
        Ok(Self { labels, targets })
    }

    /// Index of the first label equal to `label`.
    pub fn position(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|candidate| candidate == label)
    }
}
