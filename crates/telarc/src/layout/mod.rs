//! Path-templating mini-language for the archive layout.
//!
//! A template is compiled once into a sequence of literal and verb nodes
//! and rendered many times, one [`PacketInfo`] per render. Literal text is
//! copied verbatim; a verb is
//!
//! ```text
//! %[0][digits][#]V[+N]
//! ```
//!
//! with `0` zero-padding, `digits` the truncation/resolution value, `#`
//! the alternate form, `V` the verb letter, and `+N` an additive offset in
//! the verb's natural unit (`+` alone defaults to truncation - 1).
//!
//! | verb | meaning       | notes                                       |
//! |------|---------------|---------------------------------------------|
//! | `Y`  | year          | no offset                                   |
//! | `J`  | day of year   | zero-pad to 3 digits; offset in days        |
//! | `M`  | month         | `#` renders the month name; zero-pad to 2   |
//! | `D`  | day of month  | zero-pad to 2 digits                        |
//! | `h`  | hour          | truncate to a multiple of N hours first     |
//! | `m`  | minute        | truncate to a multiple of N minutes first   |
//! | `P`  | primary id    | `#` renders hex; zero id renders empty      |
//! | `S`  | secondary id  | same rules as `P`                           |
//! | `U`  | free-text tag | verbatim                                    |
//!
//! Time verbs truncate first, then add the offset, then extract the
//! field, which is what produces aligned overlapping-window bucket names:
//!
//! ```text
//! pattern: /base/%P/%Y/%J/%04h/rt_%05m_%05m+4.dat
//! pid 451, 2019-07-18 10:41:23
//! result:  /base/451/2019/199/08/rt_40_44.dat
//! ```

pub mod builder;

use crate::error::{ArchiveError, Result};
use chrono::{DateTime, Datelike, Duration, Timelike, Utc};

/// Routing metadata for one packet, produced by an external payload
/// interpreter and never mutated after extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketInfo {
    /// Primary id; zero means absent and renders empty.
    pub pid: u32,
    /// Secondary id; zero means absent and renders empty.
    pub sid: u32,
    /// Packet timestamp.
    pub when: DateTime<Utc>,
    /// Free-text tag substituted verbatim by `%U`.
    pub tag: String,
}

impl PacketInfo {
    /// Creates packet metadata with an empty tag.
    pub fn new(pid: u32, sid: u32, when: DateTime<Utc>) -> Self {
        Self {
            pid,
            sid,
            when,
            tag: String::new(),
        }
    }

    /// Sets the free-text tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Year,
    DayOfYear,
    Month,
    Day,
    Hour,
    Minute,
    PrimaryId,
    SecondaryId,
    Tag,
}

impl Verb {
    fn from_letter(letter: u8) -> Option<Self> {
        match letter {
            b'Y' => Some(Self::Year),
            b'J' => Some(Self::DayOfYear),
            b'M' => Some(Self::Month),
            b'D' => Some(Self::Day),
            b'h' => Some(Self::Hour),
            b'm' => Some(Self::Minute),
            b'P' => Some(Self::PrimaryId),
            b'S' => Some(Self::SecondaryId),
            b'U' => Some(Self::Tag),
            _ => None,
        }
    }

    /// Whether a trailing `+N` offset is part of the verb. After the
    /// other verbs a `+` is ordinary literal text.
    fn takes_offset(self) -> bool {
        matches!(
            self,
            Self::DayOfYear | Self::Month | Self::Day | Self::Hour | Self::Minute
        )
    }
}

/// One compiled verb with the flags it closes over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct VerbSpec {
    verb: Verb,
    padded: bool,
    alternate: bool,
    truncate: u32,
    offset: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Literal(String),
    Verb(VerbSpec),
}

/// A compiled path template.
///
/// Immutable once compiled and safe to reuse across many renders; each
/// render accumulates into its own buffer.
///
/// # Examples
/// ```rust,ignore
/// use telarc::layout::{PacketInfo, Template};
///
/// let template = Template::parse("/base/%P/%Y/%J/%04h/rt_%05m_%05m+4.dat")?;
/// let path = template.render(&info);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pattern: String,
    nodes: Vec<Node>,
}

impl Template {
    /// Compiles a pattern.
    ///
    /// # Errors
    ///
    /// Fails on an empty pattern, a pattern without any verb, an unknown
    /// verb letter, an unparsable numeric run, or a dangling `%`.
    pub fn parse(pattern: &str) -> Result<Self> {
        if pattern.is_empty() {
            return Err(ArchiveError::EmptyPattern);
        }
        let bytes = pattern.as_bytes();
        let mut nodes = Vec::new();
        let mut verbs = 0;
        let mut i = 0;
        while i < bytes.len() {
            let start = i;
            while i < bytes.len() && bytes[i] != b'%' {
                i += 1;
            }
            if i > start {
                nodes.push(Node::Literal(pattern[start..i].to_string()));
            }
            if i >= bytes.len() {
                break;
            }
            i += 1; // consume '%'
            let (spec, consumed) = parse_verb(bytes, i)?;
            nodes.push(Node::Verb(spec));
            verbs += 1;
            i += consumed;
        }
        if verbs == 0 {
            return Err(ArchiveError::NoVerb);
        }
        Ok(Self {
            pattern: pattern.to_string(),
            nodes,
        })
    }

    /// Renders a path fragment for one packet, trimming surrounding
    /// whitespace from the result.
    pub fn render(&self, info: &PacketInfo) -> String {
        let mut out = String::with_capacity(self.pattern.len() + 16);
        for node in &self.nodes {
            match node {
                Node::Literal(text) => out.push_str(text),
                Node::Verb(spec) => spec.format(info, &mut out),
            }
        }
        out.trim().to_string()
    }

    /// Returns the source pattern.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

/// Parses one verb starting at `at` (just past the `%`). Returns the
/// spec and the number of bytes consumed.
fn parse_verb(bytes: &[u8], at: usize) -> Result<(VerbSpec, usize)> {
    let rest = &bytes[at..];
    let mut i = 0;
    let mut padded = false;
    let mut truncate = 0u32;
    let mut alternate = false;

    if rest.first() == Some(&b'0') {
        padded = true;
        i += 1;
    }
    let digits = i;
    while i < rest.len() && rest[i].is_ascii_digit() {
        i += 1;
    }
    if i > digits {
        truncate = std::str::from_utf8(&rest[digits..i])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(ArchiveError::MalformedPattern(at + digits))?;
    }
    if rest.get(i) == Some(&b'#') {
        alternate = true;
        i += 1;
    }

    let letter = *rest.get(i).ok_or(ArchiveError::MalformedPattern(at + i))?;
    let verb = Verb::from_letter(letter).ok_or(ArchiveError::UnknownVerb(letter as char))?;
    i += 1;

    let mut offset = 0u32;
    if verb.takes_offset() && rest.get(i) == Some(&b'+') {
        i += 1;
        let digits = i;
        while i < rest.len() && rest[i].is_ascii_digit() {
            i += 1;
        }
        if i > digits {
            offset = std::str::from_utf8(&rest[digits..i])
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or(ArchiveError::MalformedPattern(at + digits))?;
        } else if truncate > 0 {
            offset = truncate - 1;
        }
    }

    Ok((
        VerbSpec {
            verb,
            padded,
            alternate,
            truncate,
            offset,
        },
        i,
    ))
}

impl VerbSpec {
    fn format(&self, info: &PacketInfo, out: &mut String) {
        match self.verb {
            Verb::Year => out.push_str(&info.when.year().to_string()),
            Verb::DayOfYear => {
                let when = self.adjusted(info.when, 86_400);
                push_padded(out, when.ordinal(), if self.padded { 3 } else { 0 });
            }
            Verb::Month => {
                if self.alternate {
                    out.push_str(&info.when.format("%B").to_string());
                } else {
                    push_padded(out, info.when.month(), if self.padded { 2 } else { 0 });
                }
            }
            Verb::Day => push_padded(out, info.when.day(), if self.padded { 2 } else { 0 }),
            Verb::Hour => {
                let when = self.adjusted(info.when, 3_600);
                push_padded(out, when.hour(), if self.padded { 2 } else { 0 });
            }
            Verb::Minute => {
                let when = self.adjusted(info.when, 60);
                push_padded(out, when.minute(), if self.padded { 2 } else { 0 });
            }
            Verb::PrimaryId => push_id(out, info.pid, self.alternate),
            Verb::SecondaryId => push_id(out, info.sid, self.alternate),
            Verb::Tag => out.push_str(&info.tag),
        }
    }

    /// Truncates down to a multiple of the verb's unit, then applies the
    /// offset, both in `unit_secs` granularity since the epoch.
    fn adjusted(&self, when: DateTime<Utc>, unit_secs: i64) -> DateTime<Utc> {
        let mut adjusted = when;
        let truncate = i64::from(self.truncate) * unit_secs;
        if truncate > 0 {
            let secs = adjusted.timestamp().div_euclid(truncate) * truncate;
            adjusted = DateTime::from_timestamp(secs, 0).unwrap_or(adjusted);
        }
        let offset = i64::from(self.offset) * unit_secs;
        if offset > 0 {
            adjusted += Duration::seconds(offset);
        }
        adjusted
    }
}

fn push_padded(out: &mut String, value: u32, width: usize) {
    out.push_str(&format!("{:0width$}", value, width = width));
}

fn push_id(out: &mut String, id: u32, alternate: bool) {
    if id == 0 {
        return;
    }
    if alternate {
        out.push_str(&format!("{:x}", id));
    } else {
        out.push_str(&id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn info(pid: u32) -> PacketInfo {
        PacketInfo::new(
            pid,
            0,
            Utc.with_ymd_and_hms(2019, 7, 18, 10, 41, 23).unwrap(),
        )
    }

    #[test]
    fn test_canonical_pattern() {
        let template = Template::parse("/base/%P/%Y/%J/%04h/rt_%05m_%05m+4.dat").unwrap();
        assert_eq!(
            template.render(&info(451)),
            "/base/451/2019/199/08/rt_40_44.dat"
        );
    }

    #[test]
    fn test_zero_id_renders_empty() {
        let template = Template::parse("id_%P.dat").unwrap();
        assert_eq!(template.render(&info(0)), "id_.dat");
    }

    #[test]
    fn test_hex_and_month_name_alternates() {
        let template = Template::parse("%#P/%#M").unwrap();
        assert_eq!(template.render(&info(451)), "1c3/July");
    }

    #[test]
    fn test_secondary_id_reads_sid() {
        let template = Template::parse("%P-%S").unwrap();
        let mut packet = info(1);
        packet.sid = 9;
        assert_eq!(template.render(&packet), "1-9");
    }

    #[test]
    fn test_plus_after_offsetless_verb_is_literal() {
        let template = Template::parse("%Y+1").unwrap();
        assert_eq!(template.render(&info(1)), "2019+1");
    }

    #[test]
    fn test_bare_plus_defaults_to_truncation_minus_one() {
        let template = Template::parse("%05m_%05m+").unwrap();
        assert_eq!(template.render(&info(1)), "40_44");
    }

    #[test]
    fn test_day_and_doy_padding() {
        let template = Template::parse("%0J/%0D/%0M").unwrap();
        assert_eq!(template.render(&info(1)), "199/18/07");
    }

    #[test]
    fn test_tag_substitution_and_trim() {
        let template = Template::parse(" %U_%Y ").unwrap();
        let packet = info(1).with_tag("rt");
        assert_eq!(template.render(&packet), "rt_2019");
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(matches!(
            Template::parse(""),
            Err(ArchiveError::EmptyPattern)
        ));
    }

    #[test]
    fn test_parse_rejects_verbless() {
        assert!(matches!(
            Template::parse("/plain/path.dat"),
            Err(ArchiveError::NoVerb)
        ));
    }

    #[test]
    fn test_parse_rejects_unknown_verb() {
        assert!(matches!(
            Template::parse("%Q"),
            Err(ArchiveError::UnknownVerb('Q'))
        ));
    }

    #[test]
    fn test_parse_rejects_dangling_percent() {
        assert!(matches!(
            Template::parse("trail%"),
            Err(ArchiveError::MalformedPattern(_))
        ));
    }

    #[test]
    fn test_parse_rejects_numeric_overflow() {
        assert!(matches!(
            Template::parse("%99999999999h"),
            Err(ArchiveError::MalformedPattern(_))
        ));
    }

    #[test]
    fn test_render_is_reusable() {
        let template = Template::parse("%Y/%0M").unwrap();
        let first = template.render(&info(1));
        let second = template.render(&info(2));
        assert_eq!(first, second);
    }
}
