//! Line classifier for `.hyper` templates.
//!
//! The classifier works one physical line at a time. It never looks at
//! more than the leading word of a line, so it cannot tell a host-language
//! comparison that happens to start with `<` from a markup line: such a
//! line is classified as markup. This is a known limitation of line-level
//! classification and is covered by a boundary test below.

use crate::span::Span;

/// Leading keywords that open (or continue) a compound statement.
///
/// The set is closed: a line is a control line only when its first word
/// is exactly one of these and is followed by whitespace, `(` or `:`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    If,
    For,
    While,
    Match,
    Def,
    Class,
    Elif,
    Else,
    Case,
    Try,
    Except,
    Finally,
    With,
}

impl Keyword {
    pub fn from_word(word: &str) -> Option<Keyword> {
        let keyword = match word {
            "if" => Keyword::If,
            "for" => Keyword::For,
            "while" => Keyword::While,
            "match" => Keyword::Match,
            "def" => Keyword::Def,
            "class" => Keyword::Class,
            "elif" => Keyword::Elif,
            "else" => Keyword::Else,
            "case" => Keyword::Case,
            "try" => Keyword::Try,
            "except" => Keyword::Except,
            "finally" => Keyword::Finally,
            "with" => Keyword::With,
            _ => return None,
        };
        Some(keyword)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::If => "if",
            Keyword::For => "for",
            Keyword::While => "while",
            Keyword::Match => "match",
            Keyword::Def => "def",
            Keyword::Class => "class",
            Keyword::Elif => "elif",
            Keyword::Else => "else",
            Keyword::Case => "case",
            Keyword::Try => "try",
            Keyword::Except => "except",
            Keyword::Finally => "finally",
            Keyword::With => "with",
        }
    }

    /// Keywords that continue the enclosing compound statement rather than
    /// opening a new one.
    pub fn is_dedent(self) -> bool {
        matches!(
            self,
            Keyword::Else | Keyword::Elif | Keyword::Except | Keyword::Finally
        )
    }
}

/// Kind of a classified line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// Literal markup, e.g. `<li>{item}</li>`.
    Markup,
    /// A keyword-led block opener such as `if x:` or `async for a in b:`.
    ControlOpen { keyword: Keyword, is_async: bool },
    /// The block-closing `end` keyword.
    ControlClose,
    /// Any other line, including blank lines and comments.
    Host,
}

/// One physical line of the source.
///
/// `range` covers the line terminator so that consecutive tokens are
/// gapless; `text` excludes the terminator; `content` additionally strips
/// surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineToken {
    pub kind: LineKind,
    pub range: Span,
    pub text: Span,
    pub content: Span,
    /// 0-based line number.
    pub line: usize,
}

impl LineToken {
    pub fn is_blank(&self) -> bool {
        self.content.is_empty()
    }

    pub fn is_comment(&self, source: &str) -> bool {
        self.content.slice(source).starts_with('#')
    }

    pub fn content_str<'a>(&self, source: &'a str) -> &'a str {
        self.content.slice(source)
    }
}

/// Split `source` into classified lines.
///
/// An empty source yields no tokens; a trailing newline does not produce an
/// extra empty line.
pub fn classify(source: &str) -> Vec<LineToken> {
    let mut lexer = LineLexer {
        source,
        bytes: source.as_bytes(),
        index: 0,
        line: 0,
    };
    lexer.run()
}

struct LineLexer<'src> {
    source: &'src str,
    bytes: &'src [u8],
    index: usize,
    line: usize,
}

impl<'src> LineLexer<'src> {
    fn run(&mut self) -> Vec<LineToken> {
        let mut tokens = Vec::new();
        while self.index < self.bytes.len() {
            let start = self.index;
            let (text_end, next) = match self.source[start..].find('\n') {
                Some(rel) => {
                    let newline = start + rel;
                    let text_end = if newline > start && self.bytes[newline - 1] == b'\r' {
                        newline - 1
                    } else {
                        newline
                    };
                    (text_end, newline + 1)
                }
                None => (self.bytes.len(), self.bytes.len()),
            };

            let text = Span::new(start, text_end);
            tokens.push(LineToken {
                kind: classify_line(text.slice(self.source)),
                range: Span::new(start, next),
                text,
                content: content_bounds(self.source, text),
                line: self.line,
            });

            self.index = next;
            self.line += 1;
        }
        tokens
    }
}

/// Classify a single line (without its terminator).
///
/// Leading whitespace is Unicode whitespace, the same definition that
/// bounds a token's `content`.
pub fn classify_line(text: &str) -> LineKind {
    let rest = text.trim_start();

    if rest.starts_with('<') {
        return LineKind::Markup;
    }

    if let Some((keyword, is_async)) = leading_keyword(rest) {
        return LineKind::ControlOpen { keyword, is_async };
    }

    if rest.trim_end() == "end" {
        return LineKind::ControlClose;
    }

    LineKind::Host
}

fn leading_keyword(rest: &str) -> Option<(Keyword, bool)> {
    let (rest, is_async) = match strip_word(rest, "async") {
        Some(after) if after.starts_with([' ', '\t']) => {
            (after.trim_start_matches([' ', '\t']), true)
        }
        _ => (rest, false),
    };

    let word_len = rest
        .bytes()
        .take_while(|&b| is_ident_continue(b))
        .count();
    let keyword = Keyword::from_word(&rest[..word_len])?;
    match rest.as_bytes().get(word_len) {
        Some(b' ' | b'\t' | b'(' | b':') => Some((keyword, is_async)),
        _ => None,
    }
}

fn strip_word<'a>(text: &'a str, word: &str) -> Option<&'a str> {
    let after = text.strip_prefix(word)?;
    match after.bytes().next() {
        Some(b) if is_ident_continue(b) => None,
        _ => Some(after),
    }
}

fn content_bounds(source: &str, text: Span) -> Span {
    let line = text.slice(source);
    let leading = line.len() - line.trim_start().len();
    let trailing = line.len() - line.trim_end().len();
    if leading == line.len() {
        return Span::point(text.start);
    }
    Span::new(text.start + leading, text.end - trailing)
}

pub(crate) fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

pub(crate) fn is_ident_continue(ch: u8) -> bool {
    is_ident_start(ch) || ch.is_ascii_digit()
}
