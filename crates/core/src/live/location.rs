//! Parsing of the free-text "current location" field.
//!
//! The vocabulary is whatever the feed happens to use; anything that does
//! not match a known phrase yields no hint.

use strum::{EnumIter, IntoEnumIterator};

/// Stations named by a location phrase, before resolution
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LocationHint<'a> {
    /// Station the vehicle has left or is standing at
    pub previous: Option<&'a str>,
    /// Station the vehicle is heading for
    pub next: Option<&'a str>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter)]
enum LocationVerb {
    Approaching,
    Left,
    Leaving,
    Departed,
    At,
}

impl LocationVerb {
    fn prefix(self) -> &'static str {
        match self {
            Self::Approaching => "approaching ",
            Self::Left => "left ",
            Self::Leaving => "leaving ",
            Self::Departed => "departed ",
            Self::At => "at ",
        }
    }

    fn names_next(self) -> bool {
        matches!(self, Self::Approaching)
    }
}

/// Byte offset of `needle` in `haystack`, ignoring ASCII case
fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    haystack.to_ascii_lowercase().find(needle)
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &text[prefix.len()..])
}

/// Drop a trailing "Platform ..." qualifier
fn strip_platform(name: &str) -> &str {
    let name = name.trim();
    match find_ignore_case(name, " platform") {
        Some(index) => name[..index].trim_end(),
        None => name,
    }
}

fn non_empty(name: &str) -> Option<&str> {
    let name = name.trim();
    (!name.is_empty()).then_some(name)
}

/// Extract station hints from a location phrase.
///
/// "Between A and B" names both stations and wins over the verb phrases
/// ("Approaching A", "Left A", "Leaving A", "Departed (from) A", "At A").
pub fn parse_location(text: &str) -> LocationHint<'_> {
    let text = text.trim();

    if let Some(start) = find_ignore_case(text, "between ") {
        let rest = &text[start + "between ".len()..];
        if let Some(split) = find_ignore_case(rest, " and ") {
            let from = non_empty(&rest[..split]);
            let to = non_empty(&rest[split + " and ".len()..]);
            if from.is_some() {
                return LocationHint { previous: from, next: to };
            }
        }
    }

    for verb in LocationVerb::iter() {
        let Some(rest) = strip_prefix_ignore_case(text, verb.prefix()) else {
            continue;
        };
        let rest = match verb {
            LocationVerb::Departed => strip_prefix_ignore_case(rest.trim_start(), "from ").unwrap_or(rest),
            _ => rest,
        };
        let name = non_empty(strip_platform(rest));
        return if verb.names_next() {
            LocationHint { previous: None, next: name }
        } else {
            LocationHint { previous: name, next: None }
        };
    }

    LocationHint::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_between() {
        let hint = parse_location("Between Pimlico and Victoria");
        assert_eq!(hint.previous, Some("Pimlico"));
        assert_eq!(hint.next, Some("Victoria"));

        let hint = parse_location("Northbound between Highbury & Islington and Finsbury Park");
        assert_eq!(hint.previous, Some("Highbury & Islington"));
        assert_eq!(hint.next, Some("Finsbury Park"));
    }

    #[test]
    fn test_verbs() {
        assert_eq!(parse_location("Approaching Green Park").next, Some("Green Park"));
        assert_eq!(parse_location("Left Brixton").previous, Some("Brixton"));
        assert_eq!(parse_location("leaving Stockwell").previous, Some("Stockwell"));
        assert_eq!(parse_location("Departed from Vauxhall").previous, Some("Vauxhall"));
        assert_eq!(parse_location("Departed Vauxhall").previous, Some("Vauxhall"));
        assert_eq!(parse_location("At Oxford Circus Platform 3").previous, Some("Oxford Circus"));
    }

    #[test]
    fn test_unknown_phrasing_gives_no_hint() {
        assert_eq!(parse_location("Near Euston"), LocationHint::default());
        assert_eq!(parse_location(""), LocationHint::default());
        assert_eq!(parse_location("Between"), LocationHint::default());
    }
}
