//! Dual-language placements for editor injection.
//!
//! Both placement lists come from a single generation pass. The host list is
//! exactly the generated pieces: one connected virtual program that symbol
//! resolution runs against. The markup list is derived from the markup lines
//! of the same pass by cutting out `{...}` interpolation holes; it is
//! fragmented on purpose and only used for presentation. Nothing semantic
//! may be read from the markup list.

use serde::Serialize;
use tracing::{debug, warn};

use crate::compiler::{VirtualProgram, transpile_with};
use crate::config::GeneratorOptions;
use crate::error::CoreError;
use crate::lexer::{LineKind, LineToken};
use crate::span::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Host,
    Markup,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Placement {
    pub language: Language,
    pub prefix: String,
    pub suffix: String,
    pub source_range: Span,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Placements {
    pub host: Vec<Placement>,
    pub markup: Vec<Placement>,
}

/// Receives the placements of one language for one document.
pub trait InjectionConsumer {
    fn inject(&mut self, placements: &[Placement]);
}

impl InjectionConsumer for Vec<Placement> {
    fn inject(&mut self, placements: &[Placement]) {
        self.clear();
        self.extend_from_slice(placements);
    }
}

#[derive(Debug)]
pub enum Dispatch {
    Injected { host: usize, markup: usize },
    /// Generation failed; neither consumer was called.
    Skipped(CoreError),
}

/// Computes both placement lists for a document and hands them to the
/// host-language and markup consumers.
#[derive(Debug, Clone, Default)]
pub struct Coordinator {
    options: GeneratorOptions,
}

impl Coordinator {
    pub fn new(options: GeneratorOptions) -> Self {
        Coordinator { options }
    }

    pub fn place(&self, source: &str) -> Result<Placements, CoreError> {
        let program = transpile_with(source, &self.options)?;
        Ok(derive_placements(source, &program))
    }

    /// Never fails: a document that does not generate is logged and left
    /// without injections.
    pub fn dispatch(
        &self,
        source: &str,
        host: &mut dyn InjectionConsumer,
        markup: &mut dyn InjectionConsumer,
    ) -> Dispatch {
        match self.place(source) {
            Ok(placements) => {
                host.inject(&placements.host);
                markup.inject(&placements.markup);
                debug!(
                    host = placements.host.len(),
                    markup = placements.markup.len(),
                    "injected placements"
                );
                Dispatch::Injected {
                    host: placements.host.len(),
                    markup: placements.markup.len(),
                }
            }
            Err(err) => {
                warn!(error = %err, "skipping injection for document");
                Dispatch::Skipped(err)
            }
        }
    }
}

pub fn place(source: &str) -> Result<Placements, CoreError> {
    Coordinator::default().place(source)
}

/// Split a generation result into the two placement lists.
pub fn derive_placements(source: &str, program: &VirtualProgram) -> Placements {
    let host = program
        .pieces
        .iter()
        .map(|piece| Placement {
            language: Language::Host,
            prefix: piece.prefix.clone(),
            suffix: piece.suffix.clone(),
            source_range: piece.source_range,
        })
        .collect();

    let markup = program
        .tokens
        .iter()
        .filter(|token| token.kind == LineKind::Markup)
        .flat_map(|token| markup_segments(source, token))
        .map(|range| Placement {
            language: Language::Markup,
            prefix: String::new(),
            suffix: String::new(),
            source_range: range,
        })
        .collect();

    Placements { host, markup }
}

/// Literal markup ranges of one line, with `{...}` holes removed.
///
/// Braces nest inside a hole, so `{ {"a": 1}["a"] }` is one hole. An
/// unterminated hole runs to the end of the line; a stray `}` outside any
/// hole is literal markup.
pub fn markup_segments(source: &str, token: &LineToken) -> Vec<Span> {
    let content = token.content;
    let bytes = content.slice(source).as_bytes();
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut segment_start = content.start;

    for (i, &b) in bytes.iter().enumerate() {
        let at = content.start + i;
        match b {
            b'{' => {
                if depth == 0 && at > segment_start {
                    segments.push(Span::new(segment_start, at));
                }
                depth += 1;
            }
            b'}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    segment_start = at + 1;
                }
            }
            _ => {}
        }
    }

    if depth == 0 && segment_start < content.end {
        segments.push(Span::new(segment_start, content.end));
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::classify;

    fn segments_of(line: &str) -> Vec<&str> {
        let tokens = classify(line);
        markup_segments(line, &tokens[0])
            .into_iter()
            .map(|span| span.slice(line))
            .collect()
    }

    #[test]
    fn holes_are_excluded_from_markup() {
        assert_eq!(segments_of("<div>{name}</div>"), vec!["<div>", "</div>"]);
    }

    #[test]
    fn nested_braces_stay_inside_the_hole() {
        assert_eq!(
            segments_of("<p class=\"x\">{ {'a': 1}['a'] } items</p>"),
            vec!["<p class=\"x\">", " items</p>"]
        );
    }

    #[test]
    fn adjacent_holes_and_edges() {
        assert_eq!(segments_of("<b>{a}{b}</b>"), vec!["<b>", "</b>"]);
        assert_eq!(segments_of("  <i>{x}"), vec!["<i>"]);
        assert_eq!(segments_of("<i>{x"), vec!["<i>"]);
        assert_eq!(segments_of("<i>}</i>"), vec!["<i>}</i>"]);
    }

    #[test]
    fn host_list_is_the_generated_program() {
        let source = "user: User\n\n<ul>\nif user.active:\n<li>{user.name}</li>\nend\n</ul>\n";
        let placements = place(source).expect("place should succeed");
        assert_eq!(placements.host.len(), 6);
        assert!(
            placements
                .host
                .iter()
                .all(|placement| placement.language == Language::Host)
        );
        let markup: Vec<_> = placements
            .markup
            .iter()
            .map(|placement| placement.source_range.slice(source))
            .collect();
        assert_eq!(markup, vec!["<ul>", "<li>", "</li>", "</ul>"]);
    }

    #[test]
    fn markup_ranges_stay_inside_host_ranges() {
        let source = "<section>\nfor post in posts:\n<a href=\"{post.url}\">{post.title}</a>\nend\n</section>\n";
        let placements = place(source).expect("place should succeed");
        for markup in &placements.markup {
            assert!(placements.host.iter().any(|host| {
                host.source_range.start <= markup.source_range.start
                    && markup.source_range.end <= host.source_range.end
            }));
        }
    }

    #[test]
    fn dispatch_feeds_both_consumers() {
        let mut host: Vec<Placement> = Vec::new();
        let mut markup: Vec<Placement> = Vec::new();
        let outcome = Coordinator::default().dispatch("<p>{x}</p>\n", &mut host, &mut markup);
        assert!(matches!(outcome, Dispatch::Injected { host: 2, markup: 2 }));
        assert_eq!(host.len(), 2);
        assert_eq!(markup.len(), 2);
    }

    #[test]
    fn dispatch_skips_documents_that_do_not_generate() {
        let mut host = vec![Placement {
            language: Language::Host,
            prefix: String::new(),
            suffix: String::new(),
            source_range: Span::point(0),
        }];
        let mut markup: Vec<Placement> = Vec::new();
        let outcome = Coordinator::default().dispatch("if open:\n<p/>\n", &mut host, &mut markup);
        assert!(matches!(outcome, Dispatch::Skipped(CoreError::Structure { .. })));
        // Consumers are left untouched.
        assert_eq!(host.len(), 1);
        assert!(markup.is_empty());
    }
}
