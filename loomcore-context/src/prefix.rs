//! Phase 1: the stable prefix — system prompt, persona, tool descriptions,
//! skill snippets, and user memory, rendered in a fixed priority order so
//! the provider's KV cache can reuse it turn over turn.

/// One labeled section of the stable prefix.
#[derive(Debug, Clone)]
pub struct PrefixSection {
    /// Short label, used for diagnostics only (not shown to the model).
    pub label: String,
    /// Markdown or plain-text body rendered into the prefix.
    pub content: String,
    /// Lower renders first. Sections with equal priority keep insertion order.
    pub priority: u32,
}

/// Composes the stable prefix from an ordered set of sections.
///
/// Order matters for cache reuse: the prefix must render byte-identical
/// across turns as long as its inputs (tool allowlist, selected skills,
/// memory) haven't changed, so sections are sorted once by priority rather
/// than by arrival order.
#[derive(Debug, Clone, Default)]
pub struct StablePrefix {
    sections: Vec<PrefixSection>,
}

impl StablePrefix {
    /// Create an empty stable prefix.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a section.
    pub fn add_section(&mut self, section: PrefixSection) {
        self.sections.push(section);
    }

    /// Drop everything but section headers — used when phase-1 shrinking is
    /// needed (skills details collapse to headers-only, never fully dropped).
    pub fn headers_only(&self) -> Self {
        Self {
            sections: self
                .sections
                .iter()
                .map(|s| PrefixSection {
                    label: s.label.clone(),
                    content: String::new(),
                    priority: s.priority,
                })
                .collect(),
        }
    }

    /// Render all sections in priority order, joined by blank lines.
    pub fn render(&self) -> String {
        let mut ordered: Vec<&PrefixSection> = self.sections.iter().collect();
        ordered.sort_by_key(|s| s.priority);
        ordered
            .iter()
            .map(|s| {
                if s.content.is_empty() {
                    format!("## {}", s.label)
                } else {
                    format!("## {}\n{}", s.label, s.content)
                }
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
