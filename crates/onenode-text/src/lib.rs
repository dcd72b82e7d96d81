//! Message content cleanup.
//!
//! Agent answers embed image references (`![[3]](url)`), collapsible
//! reference blocks (`<details>…</details>`) and citation markers
//! (`[[3]](url)`). Before an answer is reused as plain text, images are
//! swapped for short placeholders, references and citations are dropped,
//! and the placeholders can later be swapped back.
//!
//! Cleaning returns the placeholder table alongside the text; restoring
//! takes that table explicitly.

use regex::Regex;
use tracing::debug;

/// One image reference pulled out of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// The reference as it appeared, e.g. `![[3]](https://…/a.png)`.
    pub original: String,
    /// The placeholder that replaced it, e.g. `[image_3]`.
    pub placeholder: String,
}

/// Image references extracted by [`MessageCleaner::clean`], in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageReferences(Vec<ImageReference>);

impl ImageReferences {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageReference> {
        self.0.iter()
    }

    /// Put every placeholder in `content` back to its original reference.
    pub fn restore(&self, content: &str) -> String {
        let mut restored = content.to_string();
        for reference in &self.0 {
            restored = restored.replace(&reference.placeholder, &reference.original);
        }
        restored
    }
}

pub struct MessageCleaner {
    image: Regex,
    details: Regex,
    citation: Regex,
}

impl MessageCleaner {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            image: Regex::new(r"!\[\[(\d+)\]\]\(([^)]+)\)")?,
            details: Regex::new(r"(?s)<details>.*?</details>")?,
            citation: Regex::new(r"\[\[\d+\]\]\([^)]*\)")?,
        })
    }

    /// Strip a message down to plain content.
    ///
    /// Images become `[image_N]` placeholders (recorded in the returned
    /// table), then `<details>` blocks and citation markers are removed.
    pub fn clean(&self, content: &str) -> (String, ImageReferences) {
        if content.is_empty() {
            return (String::new(), ImageReferences::default());
        }

        let mut references = Vec::new();
        let with_placeholders = self.image.replace_all(content, |caps: &regex::Captures<'_>| {
            let placeholder = format!("[image_{}]", &caps[1]);
            references.push(ImageReference {
                original: caps[0].to_string(),
                placeholder: placeholder.clone(),
            });
            placeholder
        });

        let without_details = self.details.replace_all(&with_placeholders, "");
        let cleaned = self.citation.replace_all(&without_details, "").into_owned();

        debug!(
            images = references.len(),
            removed_bytes = content.len().saturating_sub(cleaned.len()),
            "message content cleaned"
        );
        (cleaned, ImageReferences(references))
    }
}

/// Restore placeholders produced by [`MessageCleaner::clean`].
pub fn restore_image_references(content: &str, references: &ImageReferences) -> String {
    if references.is_empty() {
        return content.to_string();
    }
    references.restore(content)
}
