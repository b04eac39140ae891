use std::sync::Arc;

use htmd::HtmlToMarkdown;
use sift_core::error::AppError;

/// HTML-to-Markdown cleaner using htmd.
///
/// Strips non-content elements (script, style, nav, etc.) so the result is
/// the readable body of the page.
#[derive(Clone)]
pub struct HtmdCleaner {
    converter: Arc<HtmlToMarkdown>,
}

impl HtmdCleaner {
    pub fn new() -> Self {
        let converter = HtmlToMarkdown::builder()
            .skip_tags(vec![
                "script", "style", "nav", "footer", "header", "aside", "noscript", "iframe", "svg",
                "form", "figure", "button",
            ])
            .build();

        Self {
            converter: Arc::new(converter),
        }
    }

    pub fn clean(&self, html: &str) -> Result<String, AppError> {
        self.converter
            .convert(html)
            .map(|md| md.trim().to_string())
            .map_err(|e| AppError::Generic(format!("HTML conversion failed: {e}")))
    }
}

impl Default for HtmdCleaner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converts_paragraphs() {
        let md = HtmdCleaner::new()
            .clean("<h1>Budget passes</h1><p>The Senate voted late.</p>")
            .unwrap();
        assert!(md.contains("Budget passes"));
        assert!(md.contains("The Senate voted late."));
    }

    #[test]
    fn test_strips_chrome() {
        let md = HtmdCleaner::new()
            .clean("<nav>Home | World</nav><p>Story</p><script>track()</script>")
            .unwrap();
        assert!(md.contains("Story"));
        assert!(!md.contains("World"));
        assert!(!md.contains("track"));
    }
}
