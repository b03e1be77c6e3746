//! The capabilities the detector needs from a rendered document.

use crate::cssom::Stylesheet;
use crate::error::Result;
use url::Url;

/// The two computed properties that decide whether a pseudo-element renders.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComputedStyle {
    pub content: String,
    pub display: String,
}

impl ComputedStyle {
    /// Initial values for `pseudo`: `::before` and `::after` generate nothing
    /// until given `content`.
    pub fn initial(pseudo: &str) -> Self {
        let content = match pseudo {
            "before" | "after" => "none",
            _ => "normal",
        };
        Self { content: content.to_string(), display: "inline".to_string() }
    }

    /// Whether a pseudo-element with this style generates a box.
    pub fn renders(&self) -> bool {
        self.content != "none" && self.display != "none"
    }
}

/// A document as seen after rendering.
pub trait Dom {
    /// Handle to an element of this document.
    type Node<'a>: Copy
    where
        Self: 'a;

    /// URL of the page.
    fn location(&self) -> &Url;

    /// Class tokens of `<body>`, in document order.
    fn body_classes(&self) -> &[String];

    /// Stylesheets in document order, linked and inline.
    fn stylesheets(&self) -> &[Stylesheet];

    /// Every element matching `selector`; an error if the selector is not
    /// understood.
    fn query_selector_all(&self, selector: &str) -> Result<Vec<Self::Node<'_>>>;

    /// Computed style of the `pseudo` element (name without colons) of `node`.
    fn computed_style(&self, node: Self::Node<'_>, pseudo: &str) -> ComputedStyle;
}

#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockDom;

#[cfg(any(test, feature = "mock"))]
mod mock {
    use super::*;
    use crate::error::ErrorKind;
    use scraper::Selector;
    use std::collections::HashMap;

    /// A scripted document: query results and pseudo-element styles are
    /// configured up front. Selectors are still validated by the real
    /// selector engine.
    #[derive(Clone, Debug)]
    pub struct MockDom {
        location: Url,
        body_classes: Vec<String>,
        stylesheets: Vec<Stylesheet>,
        matches: HashMap<String, Vec<usize>>,
        styles: HashMap<(usize, String), ComputedStyle>,
    }

    impl MockDom {
        pub fn new(location: &str) -> Self {
            Self {
                location: Url::parse(location).expect("mock location must be a valid URL"),
                body_classes: Vec::new(),
                stylesheets: Vec::new(),
                matches: HashMap::new(),
                styles: HashMap::new(),
            }
        }

        pub fn with_body_classes(mut self, classes: &str) -> Self {
            self.body_classes = classes.split_whitespace().map(str::to_string).collect();
            self
        }

        pub fn with_stylesheet(mut self, sheet: Stylesheet) -> Self {
            self.stylesheets.push(sheet);
            self
        }

        /// Make `selector` (as queried, after clean-up) return `nodes`.
        pub fn with_matches(mut self, selector: &str, nodes: &[usize]) -> Self {
            self.matches.insert(selector.to_string(), nodes.to_vec());
            self
        }

        pub fn with_pseudo_style(mut self, node: usize, pseudo: &str, content: &str, display: &str) -> Self {
            let style = ComputedStyle { content: content.to_string(), display: display.to_string() };
            self.styles.insert((node, pseudo.to_string()), style);
            self
        }
    }

    impl Dom for MockDom {
        type Node<'a> = usize;

        fn location(&self) -> &Url {
            &self.location
        }

        fn body_classes(&self) -> &[String] {
            &self.body_classes
        }

        fn stylesheets(&self) -> &[Stylesheet] {
            &self.stylesheets
        }

        fn query_selector_all(&self, selector: &str) -> Result<Vec<usize>> {
            Selector::parse(selector).map_err(|e| ErrorKind::InvalidSelector(format!("{selector}: {e}")))?;
            Ok(self.matches.get(selector).cloned().unwrap_or_default())
        }

        fn computed_style(&self, node: usize, pseudo: &str) -> ComputedStyle {
            self.styles.get(&(node, pseudo.to_string())).cloned().unwrap_or_else(|| ComputedStyle::initial(pseudo))
        }
    }
}
