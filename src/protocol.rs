//! Parser for the CSV lines printed by `inotifywait -c`.
//!
//! Each line has three fields: `directory,"KIND[,KIND...]",filename`. The
//! kind list is quoted when it holds more than one name, and any field may be
//! quoted to protect embedded commas.

use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Result, WatchError};
use crate::mask::EventMask;

/// One occurrence reported by a watch source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedEvent {
    pub mask: EventMask,
    pub directory: PathBuf,
    /// `None` for events on the watched entry itself, like `DELETE_SELF`.
    pub name: Option<String>,
}

impl ObservedEvent {
    pub fn new(mask: EventMask, directory: impl Into<PathBuf>, name: Option<String>) -> Self {
        Self {
            mask,
            directory: directory.into(),
            name: name.filter(|n| !n.is_empty()),
        }
    }

    /// `directory` joined with `name`, or `directory` alone for self events.
    pub fn path(&self) -> PathBuf {
        match &self.name {
            Some(name) => self.directory.join(name),
            None => self.directory.clone(),
        }
    }
}

impl FromStr for ObservedEvent {
    type Err = WatchError;

    fn from_str(line: &str) -> Result<Self> {
        let fields = split_fields(line);
        if fields.len() != 3 {
            return Err(WatchError::Parse {
                line: line.to_string(),
                fields: fields.len(),
            });
        }

        let directory = strip_quotes(fields[0]);
        let kinds = fields[1];
        let filename = strip_quotes(fields[2]);

        Ok(ObservedEvent::new(
            EventMask::parse_list(kinds),
            directory,
            Some(filename),
        ))
    }
}

/// Parses one line of utility output. A missing line is an error.
pub fn parse(line: Option<&str>) -> Result<ObservedEvent> {
    line.ok_or(WatchError::NullLine)?.parse()
}

/// Splits on every comma followed by an even number of quote characters up
/// to the end of the line. Commas inside a balanced quoted span are kept.
/// Trailing empty fields are preserved.
fn split_fields(line: &str) -> Vec<&str> {
    let line = line.trim_end_matches(['\r', '\n']);
    let total = line.matches('"').count();
    let mut seen = 0;
    let mut start = 0;
    let mut fields = Vec::new();

    for (idx, ch) in line.char_indices() {
        match ch {
            '"' => seen += 1,
            ',' if (total - seen) % 2 == 0 => {
                fields.push(&line[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    fields.push(&line[start..]);
    fields
}

fn strip_quotes(field: &str) -> String {
    field.replace('"', "")
}
