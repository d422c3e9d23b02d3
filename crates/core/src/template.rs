//! Archive path and filename templates.
//!
//! A template is literal text with `{name}` placeholders, for example
//! `{partner_id}/{year}/{month}` or `{filename}_{timestamp}.{extension}`.
//! Templates are parsed once when configuration is loaded, so an unknown
//! placeholder is reported before any document is touched.

use std::borrow::Cow;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{Local, NaiveDateTime};

use crate::error::TemplateError;
use crate::partner::Partner;

/// The recognized placeholder names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placeholder {
    Filename,
    Extension,
    PartnerId,
    PartnerName,
    Timestamp,
    Date,
    Time,
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

impl Placeholder {
    pub const ALL: [Placeholder; 13] = [
        Placeholder::Filename,
        Placeholder::Extension,
        Placeholder::PartnerId,
        Placeholder::PartnerName,
        Placeholder::Timestamp,
        Placeholder::Date,
        Placeholder::Time,
        Placeholder::Year,
        Placeholder::Month,
        Placeholder::Day,
        Placeholder::Hour,
        Placeholder::Minute,
        Placeholder::Second,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Placeholder::Filename => "filename",
            Placeholder::Extension => "extension",
            Placeholder::PartnerId => "partner_id",
            Placeholder::PartnerName => "partner_name",
            Placeholder::Timestamp => "timestamp",
            Placeholder::Date => "date",
            Placeholder::Time => "time",
            Placeholder::Year => "year",
            Placeholder::Month => "month",
            Placeholder::Day => "day",
            Placeholder::Hour => "hour",
            Placeholder::Minute => "minute",
            Placeholder::Second => "second",
        }
    }

    /// `chrono` format string for time-derived placeholders.
    fn time_format(&self) -> Option<&'static str> {
        match self {
            Placeholder::Timestamp => Some("%Y%m%d_%H%M%S"),
            Placeholder::Date => Some("%Y%m%d"),
            Placeholder::Time => Some("%H%M%S"),
            Placeholder::Year => Some("%Y"),
            Placeholder::Month => Some("%m"),
            Placeholder::Day => Some("%d"),
            Placeholder::Hour => Some("%H"),
            Placeholder::Minute => Some("%M"),
            Placeholder::Second => Some("%S"),
            _ => None,
        }
    }
}

impl FromStr for Placeholder {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Placeholder::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(Placeholder),
}

/// A validated template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parse a template, rejecting unknown or unterminated placeholders.
    ///
    /// A `}` with no matching `{` is literal text.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = source;
        let mut offset = 0;

        while let Some(open) = rest.find('{') {
            literal.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let close = after.find('}').ok_or_else(|| TemplateError::Unterminated {
                position: offset + open,
                template: source.to_string(),
            })?;
            let name = &after[..close];
            let placeholder =
                name.parse::<Placeholder>()
                    .map_err(|()| TemplateError::UnknownPlaceholder {
                        name: name.to_string(),
                        template: source.to_string(),
                    })?;

            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Placeholder(placeholder));

            let consumed = open + 1 + close + 1;
            offset += consumed;
            rest = &rest[consumed..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Placeholders referenced by this template, in order of appearance.
    pub fn placeholders(&self) -> impl Iterator<Item = Placeholder> + '_ {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(p) => Some(*p),
            Segment::Literal(_) => None,
        })
    }

    /// Substitute every placeholder from `context`.
    pub fn render(&self, context: &RenderContext) -> String {
        let mut out = String::with_capacity(self.source.len() + 16);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(p) => out.push_str(&context.value(*p)),
            }
        }
        out
    }
}

impl FromStr for Template {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Template::parse(s)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Parse and render in one step.
pub fn render(template: &str, context: &RenderContext) -> Result<String, TemplateError> {
    Template::parse(template).map(|t| t.render(context))
}

/// Per-document values available to templates.
///
/// All time placeholders derive from the single `captured_at` instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderContext {
    pub filename: String,
    pub extension: String,
    pub partner_id: String,
    pub partner_name: String,
    pub captured_at: NaiveDateTime,
}

impl RenderContext {
    /// Build a context for `file_name` captured at `captured_at`.
    ///
    /// The stem and extension split on the last dot; a leading dot does not
    /// start an extension.
    pub fn new(file_name: &str, partner: &Partner, captured_at: NaiveDateTime) -> Self {
        let path = Path::new(file_name);
        let filename = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            filename,
            extension,
            partner_id: partner.id.clone(),
            partner_name: normalize_name(&partner.name),
            captured_at,
        }
    }

    /// Build a context captured at the current local time.
    pub fn capture(file_name: &str, partner: &Partner) -> Self {
        Self::new(file_name, partner, Local::now().naive_local())
    }

    pub fn value(&self, placeholder: Placeholder) -> Cow<'_, str> {
        if let Some(format) = placeholder.time_format() {
            return Cow::Owned(self.captured_at.format(format).to_string());
        }
        match placeholder {
            Placeholder::Filename => Cow::Borrowed(&self.filename),
            Placeholder::Extension => Cow::Borrowed(&self.extension),
            Placeholder::PartnerId => Cow::Borrowed(&self.partner_id),
            Placeholder::PartnerName => Cow::Borrowed(&self.partner_name),
            _ => Cow::Borrowed(""),
        }
    }
}

/// Collapse runs of whitespace to a single underscore.
fn normalize_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join("_")
}
