//! Amendment documents as ordered instruction spans.

use serde::{Deserialize, Serialize};

use crate::document::PAGE_MARKER;

/// Where an instruction span sits in the amending document. Citation only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub page: Option<u32>,
    pub paragraph: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionSpan {
    pub index: usize,
    pub text: String,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amendment {
    pub amendment_id: String,
    #[serde(default)]
    pub title: Option<String>,
    /// The Act being amended, as named in the amending document.
    #[serde(default)]
    pub target_act: Option<String>,
    spans: Vec<InstructionSpan>,
}

impl Amendment {
    /// Build an amendment from already-split spans. Blank spans are dropped
    /// and the rest re-indexed in order.
    pub fn new(
        amendment_id: impl Into<String>,
        spans: impl IntoIterator<Item = (String, SourceLocation)>,
    ) -> Self {
        let spans = spans
            .into_iter()
            .filter(|(text, _)| !text.trim().is_empty())
            .enumerate()
            .map(|(index, (text, location))| InstructionSpan {
                index,
                text: text.trim().to_string(),
                location,
            })
            .collect();
        Self {
            amendment_id: amendment_id.into(),
            title: None,
            target_act: None,
            spans,
        }
    }

    /// Split extracted amendment text into paragraph-level spans.
    ///
    /// Paragraphs are separated by blank lines; `--- PAGE n ---` markers set
    /// the page of the spans that follow. Line breaks inside a paragraph are
    /// joined with a space.
    pub fn from_text(amendment_id: impl Into<String>, text: &str) -> Self {
        let mut spans = Vec::new();
        let mut page = None;
        let mut paragraph = 0usize;
        let mut current: Vec<&str> = Vec::new();

        let mut flush = |current: &mut Vec<&str>, page: Option<u32>, paragraph: &mut usize| {
            if !current.is_empty() {
                spans.push((
                    current.join(" "),
                    SourceLocation {
                        page,
                        paragraph: *paragraph,
                    },
                ));
                *paragraph += 1;
                current.clear();
            }
        };

        for line in text.lines() {
            if let Some(caps) = PAGE_MARKER.captures(line) {
                flush(&mut current, page, &mut paragraph);
                page = caps[1].parse().ok();
                continue;
            }
            if line.trim().is_empty() {
                flush(&mut current, page, &mut paragraph);
            } else {
                current.push(line.trim());
            }
        }
        flush(&mut current, page, &mut paragraph);

        Self::new(amendment_id, spans)
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_target_act(mut self, target_act: impl Into<String>) -> Self {
        self.target_act = Some(target_act.into());
        self
    }

    pub fn spans(&self) -> &[InstructionSpan] {
        &self.spans
    }

    pub fn span(&self, index: usize) -> Option<&InstructionSpan> {
        self.spans.get(index)
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }
}
