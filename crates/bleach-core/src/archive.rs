//! Append-only record of everything a bleach run removed.
//!
//! One line per item: identifier first, text fields wrapped in double
//! quotes, handles bare. Commas inside text are backslash-escaped rather
//! than CSV-quoted, so lines are easy to grep but not strictly RFC 4180.
//! Newlines inside text are written as a literal `\n` so every record
//! stays on one line.

use std::fmt::Write as _;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::error::Result;
use crate::types::{ListMember, Tweet, TwitterList, User};

// ---------------------------------------------------------------------------
// Fields
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field<'a> {
    Bare(&'a str),
    Quoted(&'a str),
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

pub fn format_line(fields: &[Field<'_>]) -> String {
    let mut line = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            line.push(',');
        }
        match field {
            Field::Bare(s) => line.push_str(&escape(s)),
            Field::Quoted(s) => {
                let _ = write!(line, "\"{}\"", escape(s));
            }
        }
    }
    line.push('\n');
    line
}

// ---------------------------------------------------------------------------
// ArchiveRecord
// ---------------------------------------------------------------------------

/// An item that can be written to an archive line.
pub trait ArchiveRecord {
    fn archive_fields(&self) -> Vec<Field<'_>>;
}

impl ArchiveRecord for User {
    fn archive_fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::Bare(&self.id),
            Field::Quoted(&self.name),
            Field::Bare(&self.username),
        ]
    }
}

impl ArchiveRecord for Tweet {
    fn archive_fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::Bare(&self.id),
            Field::Quoted(&self.text),
            Field::Bare(self.created_at.as_deref().unwrap_or("")),
        ]
    }
}

impl ArchiveRecord for TwitterList {
    fn archive_fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::Bare("LIST"),
            Field::Bare(&self.id),
            Field::Quoted(&self.name),
        ]
    }
}

impl ArchiveRecord for ListMember {
    fn archive_fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::Bare(&self.list_id),
            Field::Bare(&self.user.id),
            Field::Quoted(&self.user.name),
            Field::Bare(&self.user.username),
        ]
    }
}

// ---------------------------------------------------------------------------
// ArchiveSink
// ---------------------------------------------------------------------------

/// Caller-owned writable stream that archive lines are appended to.
///
/// Nothing is ever read back. Dropping the sink flushes and closes the
/// underlying writer, so an operation that bails early still leaves a
/// complete file behind.
pub struct ArchiveSink {
    writer: Box<dyn Write>,
    records: u64,
}

impl ArchiveSink {
    pub fn new(writer: impl Write + 'static) -> Self {
        Self {
            writer: Box::new(writer),
            records: 0,
        }
    }

    /// Open `path` in append mode, creating it if needed.
    pub fn open(path: &Path) -> Result<Self> {
        let file = crate::io::open_append(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }

    pub fn record<R: ArchiveRecord + ?Sized>(&mut self, item: &R) -> io::Result<()> {
        self.write_fields(&item.archive_fields())
    }

    pub fn write_fields(&mut self, fields: &[Field<'_>]) -> io::Result<()> {
        self.writer.write_all(format_line(fields).as_bytes())?;
        self.records += 1;
        Ok(())
    }

    /// Number of lines written through this sink.
    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl std::fmt::Debug for ArchiveSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveSink")
            .field("records", &self.records)
            .finish_non_exhaustive()
    }
}

impl Drop for ArchiveSink {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}
