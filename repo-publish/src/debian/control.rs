// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! RFC-822 style control file primitives.

`Packages` indexes and `dpkg-deb -f` output are sequences of *paragraphs*:
ordered `Name: value` fields where continuation lines begin with a space and
paragraphs are separated by a blank line. Field names compare
case-insensitively on read and preserve case on write.

See <https://www.debian.org/doc/debian-policy/ch-controlfields.html>.
*/

use {
    crate::error::{RepoPublishError, Result},
    std::{
        borrow::Cow,
        io::{BufRead, Write},
    },
};

/// A field in a control paragraph.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ControlField<'a> {
    name: Cow<'a, str>,
    value: Cow<'a, str>,
}

impl<'a> ControlField<'a> {
    /// Construct an instance from a field name and value.
    pub fn new(name: Cow<'a, str>, value: Cow<'a, str>) -> Self {
        Self { name, value }
    }

    /// The name of this field.
    pub fn name(&self) -> &str {
        self.name.as_ref()
    }

    /// The value with its original formatting, including any continuation
    /// newlines and leading whitespace.
    pub fn value_str(&self) -> &str {
        self.value.as_ref()
    }

    /// Write `Name: value\n` to a writer.
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(self.name.as_bytes())?;
        writer.write_all(b": ")?;
        writer.write_all(self.value.as_bytes())?;
        writer.write_all(b"\n")
    }
}

/// An ordered series of control fields.
///
/// Paragraphs contain a single occurrence of a field; the mutation API
/// enforces this by replacing on name collision.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ControlParagraph<'a> {
    fields: Vec<ControlField<'a>>,
}

impl<'a> ControlParagraph<'a> {
    /// Whether the paragraph has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Set a field, replacing an existing field of the same name in place.
    ///
    /// Replacement preserves the original field position so rewriting an
    /// index does not shuffle stanza layout.
    pub fn set_field(&mut self, field: ControlField<'a>) {
        if let Some(existing) = self
            .fields
            .iter_mut()
            .find(|f| f.name.eq_ignore_ascii_case(&field.name))
        {
            *existing = field;
        } else {
            self.fields.push(field);
        }
    }

    /// Set a field from strings.
    pub fn set_field_from_string(&mut self, name: Cow<'a, str>, value: Cow<'a, str>) {
        self.set_field(ControlField::new(name, value));
    }

    /// Whether a named field is present.
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Iterate fields in insertion order.
    pub fn iter_fields(&self) -> impl Iterator<Item = &ControlField<'a>> {
        self.fields.iter()
    }

    /// Obtain the field with a given name.
    pub fn field(&self, name: &str) -> Option<&ControlField<'a>> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Obtain the raw string value of the named field.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.field(name).map(|f| f.value_str())
    }

    /// Obtain the named field parsed as a u64.
    pub fn field_u64(&self, name: &str) -> Option<Result<u64>> {
        self.field_str(name)
            .map(|v| v.trim().parse::<u64>().map_err(RepoPublishError::from))
    }

    /// Serialize the paragraph. A trailing newline terminates the final
    /// field but no blank separator line is emitted.
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for field in &self.fields {
            field.write(writer)?;
        }

        Ok(())
    }
}

impl<'a> std::fmt::Display for ControlParagraph<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for field in &self.fields {
            writeln!(f, "{}: {}", field.name(), field.value_str())?;
        }

        Ok(())
    }
}

/// Streaming line-oriented parser producing [ControlParagraph] instances.
#[derive(Clone, Debug, Default)]
pub struct ControlFileParser {
    paragraph: ControlParagraph<'static>,
    field: Option<String>,
}

impl ControlFileParser {
    /// Feed one line (without trailing newline) to the parser.
    ///
    /// Returns a paragraph when the line completes one.
    pub fn write_line(&mut self, line: &str) -> Result<Option<ControlParagraph<'static>>> {
        let is_empty_line = line.trim().is_empty();
        let is_indented = line.starts_with(' ') && line.len() > 1;

        let current_field = self.field.take();

        if is_empty_line {
            if let Some(field) = current_field {
                self.flush_field(field)?;
            }

            return Ok(if self.paragraph.is_empty() {
                None
            } else {
                Some(std::mem::take(&mut self.paragraph))
            });
        }

        match (current_field, is_indented) {
            // An unindented line begins a new field; flush the previous one.
            (Some(field), false) => {
                self.flush_field(field)?;
                self.field = Some(line.to_string());
                Ok(None)
            }
            (None, _) => {
                self.field = Some(line.to_string());
                Ok(None)
            }
            // Continuation line.
            (Some(field), true) => {
                self.field = Some(format!("{}\n{}", field, line));
                Ok(None)
            }
        }
    }

    /// Signal end of input, returning any paragraph still being accumulated.
    pub fn finish(mut self) -> Result<Option<ControlParagraph<'static>>> {
        if let Some(field) = self.field.take() {
            self.flush_field(field)?;
        }

        Ok(if self.paragraph.is_empty() {
            None
        } else {
            Some(self.paragraph)
        })
    }

    fn flush_field(&mut self, field: String) -> Result<()> {
        let (name, value) = field.split_once(':').ok_or_else(|| {
            RepoPublishError::MetadataParse(format!("control line missing colon: {}", field))
        })?;

        self.paragraph.set_field_from_string(
            name.trim().to_string().into(),
            value.trim_start_matches(' ').to_string().into(),
        );

        Ok(())
    }
}

/// Parse every paragraph from a reader.
pub fn parse_paragraphs(reader: impl BufRead) -> Result<Vec<ControlParagraph<'static>>> {
    let mut parser = ControlFileParser::default();
    let mut paragraphs = vec![];

    for line in reader.lines() {
        if let Some(paragraph) = parser.write_line(&line?)? {
            paragraphs.push(paragraph);
        }
    }

    if let Some(paragraph) = parser.finish()? {
        paragraphs.push(paragraph);
    }

    Ok(paragraphs)
}
