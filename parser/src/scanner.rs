//! FILENAME: parser/src/scanner.rs
//! PURPOSE: Finds placeholder spans in report text and rewrites them.
//! CONTEXT: This is the first stage of expression resolution. The scanner
//! walks the text for `{`, classifies each reference by its discriminator
//! character, and either yields spans (passive scan) or hands bodies to a
//! caller-supplied replacer (rewrite pass).
//!
//! SCANNING RULES:
//! - Curly braces never nest; a span ends at the first `}`.
//! - An opening brace with no closing brace ends the scan; the tail is
//!   left untouched.
//! - Replacement output is never rescanned within the same pass.
//! - A span immediately preceded by the "except after" marker is skipped.
//!   Formula text defaults the marker to "#" so that the target script's
//!   own `#{...}` interpolation survives substitution.

use crate::token::{Placeholder, PlaceholderKind};

/// Iterator over the placeholder spans of a piece of text.
pub struct Placeholders<'a> {
    text: &'a str,
    pos: usize,
    except_after: Option<&'a str>,
}

/// Scans `text` for placeholders of every kind.
///
/// # Arguments
/// * `text` - The text to scan.
/// * `except_after` - Optional marker; a placeholder immediately preceded
///   by this exact substring is skipped.
pub fn placeholders<'a>(text: &'a str, except_after: Option<&'a str>) -> Placeholders<'a> {
    Placeholders {
        text,
        pos: 0,
        except_after,
    }
}

impl<'a> Iterator for Placeholders<'a> {
    type Item = Placeholder<'a>;

    fn next(&mut self) -> Option<Placeholder<'a>> {
        loop {
            let rel = self.text[self.pos..].find('{')?;
            let start = self.pos + rel;
            if marker_precedes(self.text, start, self.except_after) {
                self.pos = start + 1;
                continue;
            }
            let close_rel = match self.text[start + 1..].find('}') {
                Some(i) => i,
                None => {
                    self.pos = self.text.len();
                    return None;
                }
            };
            let close = start + 1 + close_rel;
            let (kind, body) = split_discriminator(&self.text[start + 1..close]);
            self.pos = close + 1;
            return Some(Placeholder {
                kind,
                body,
                start,
                end: close + 1,
            });
        }
    }
}

/// Replaces every `open`...`}` span of one placeholder kind.
///
/// The replacer receives the text between the delimiters and returns the
/// replacement text, or `None` to abort; an aborted rewrite yields `None`
/// so callers can distinguish "a referenced value was missing" from an
/// empty result.
///
/// # Arguments
/// * `text` - The text to rewrite.
/// * `open` - Opening delimiter including any discriminator (`"{@"`, `"{"`).
/// * `except_after` - Optional skip marker, as for [`placeholders`].
/// * `replace` - Called once per span with the body text.
pub fn rewrite<F>(
    text: &str,
    open: &str,
    except_after: Option<&str>,
    mut replace: F,
) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    let mut out = String::with_capacity(text.len());
    let mut pos = 0;
    while let Some(rel) = text[pos..].find(open) {
        let start = pos + rel;
        if marker_precedes(text, start, except_after) {
            out.push_str(&text[pos..start + open.len()]);
            pos = start + open.len();
            continue;
        }
        let close_rel = match text[start + open.len()..].find('}') {
            Some(i) => i,
            None => break,
        };
        let close = start + open.len() + close_rel;
        let replacement = replace(&text[start + open.len()..close])?;
        out.push_str(&text[pos..start]);
        out.push_str(&replacement);
        pos = close + 1;
    }
    out.push_str(&text[pos..]);
    Some(out)
}

fn marker_precedes(text: &str, start: usize, except_after: Option<&str>) -> bool {
    match except_after {
        Some(marker) => text[..start].ends_with(marker),
        None => false,
    }
}

fn split_discriminator(inner: &str) -> (PlaceholderKind, &str) {
    match inner.chars().next() {
        Some(ch) => {
            let kind = PlaceholderKind::from_discriminator(ch);
            if kind.discriminator().is_some() {
                (kind, &inner[ch.len_utf8()..])
            } else {
                (PlaceholderKind::Column, inner)
            }
        }
        None => (PlaceholderKind::Column, inner),
    }
}
