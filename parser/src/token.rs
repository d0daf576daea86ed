//! FILENAME: parser/src/token.rs
//! PURPOSE: Placeholder kinds and spans produced by the scanner.
//! CONTEXT: Placeholders are the atomic units of report text. Every span
//! starts with `{`, is classified by the character that follows, and ends
//! at the next `}`.

/// Reference kinds recognized inside curly braces.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum PlaceholderKind {
    /// `{table.column}`: a raw column reference (no discriminator).
    Column,
    /// `{@id}`: a formula reference.
    Formula,
    /// `{?id}`: a parameter reference.
    Parameter,
    /// `{!id}`: a user column reference.
    UserColumn,
    /// `{%name}`: a built-in special value.
    Special,
}

impl PlaceholderKind {
    /// Classifies the first character found inside the braces. Anything
    /// that is not a known discriminator belongs to a column reference.
    pub fn from_discriminator(ch: char) -> PlaceholderKind {
        match ch {
            '@' => PlaceholderKind::Formula,
            '?' => PlaceholderKind::Parameter,
            '!' => PlaceholderKind::UserColumn,
            '%' => PlaceholderKind::Special,
            _ => PlaceholderKind::Column,
        }
    }

    /// The discriminator character, if this kind has one.
    pub fn discriminator(self) -> Option<char> {
        match self {
            PlaceholderKind::Column => None,
            PlaceholderKind::Formula => Some('@'),
            PlaceholderKind::Parameter => Some('?'),
            PlaceholderKind::UserColumn => Some('!'),
            PlaceholderKind::Special => Some('%'),
        }
    }

    /// The opening delimiter for a single-kind rewrite pass, discriminator
    /// included.
    pub fn open(self) -> &'static str {
        match self {
            PlaceholderKind::Column => "{",
            PlaceholderKind::Formula => "{@",
            PlaceholderKind::Parameter => "{?",
            PlaceholderKind::UserColumn => "{!",
            PlaceholderKind::Special => "{%",
        }
    }

    /// True for the kinds whose storage-form body is a numeric id.
    pub fn has_id_body(self) -> bool {
        matches!(
            self,
            PlaceholderKind::Formula | PlaceholderKind::Parameter | PlaceholderKind::UserColumn
        )
    }
}

/// One placeholder span found in a piece of text.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Placeholder<'a> {
    pub kind: PlaceholderKind,
    /// Text between the delimiters, discriminator excluded.
    pub body: &'a str,
    /// Byte offset of the opening brace.
    pub start: usize,
    /// Byte offset one past the closing brace.
    pub end: usize,
}

impl std::fmt::Display for Placeholder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind.discriminator() {
            Some(ch) => write!(f, "{{{}{}}}", ch, self.body),
            None => write!(f, "{{{}}}", self.body),
        }
    }
}
