//! Event kinds reported by a watch source.

use std::fmt;

bitflags::bitflags! {
    /// Bitset over the inotify event kinds a watcher can report.
    ///
    /// Bit values match the kernel's `IN_*` constants, so a mask can be
    /// handed to anything that speaks inotify.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EventMask: u32 {
        const ACCESS = 0x0000_0001;
        const MODIFY = 0x0000_0002;
        const ATTRIB = 0x0000_0004;
        const CLOSE_WRITE = 0x0000_0008;
        const CLOSE_NOWRITE = 0x0000_0010;
        const OPEN = 0x0000_0020;
        const MOVED_FROM = 0x0000_0040;
        const MOVED_TO = 0x0000_0080;
        const CREATE = 0x0000_0100;
        const DELETE = 0x0000_0200;
        const DELETE_SELF = 0x0000_0400;
        const MOVE_SELF = 0x0000_0800;
    }
}

const NAMES: [(&str, EventMask); 12] = [
    ("ACCESS", EventMask::ACCESS),
    ("MODIFY", EventMask::MODIFY),
    ("ATTRIB", EventMask::ATTRIB),
    ("CLOSE_WRITE", EventMask::CLOSE_WRITE),
    ("CLOSE_NOWRITE", EventMask::CLOSE_NOWRITE),
    ("OPEN", EventMask::OPEN),
    ("MOVED_FROM", EventMask::MOVED_FROM),
    ("MOVED_TO", EventMask::MOVED_TO),
    ("CREATE", EventMask::CREATE),
    ("DELETE", EventMask::DELETE),
    ("DELETE_SELF", EventMask::DELETE_SELF),
    ("MOVE_SELF", EventMask::MOVE_SELF),
];

impl EventMask {
    /// Every kind.
    pub const ALL: EventMask = EventMask::all();

    /// Maps a single kind name to its bit, ignoring case and surrounding
    /// quotes or whitespace.
    ///
    /// Unknown names (`ISDIR`, `CLOSE`, typos) yield the empty mask rather
    /// than an error.
    pub fn parse(name: &str) -> EventMask {
        let name = name.trim().trim_matches('"').trim();
        NAMES
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(name))
            .map(|(_, bit)| *bit)
            .unwrap_or_else(EventMask::empty)
    }

    /// Splits a comma separated list of kind names and unions the result.
    ///
    /// A list with no recognized name yields the empty mask.
    pub fn parse_list(list: &str) -> EventMask {
        list.replace('"', "")
            .split(',')
            .map(EventMask::parse)
            .fold(EventMask::empty(), |acc, bit| acc | bit)
    }

    /// Names of the kinds set in this mask, in bit order.
    pub fn names(&self) -> Vec<&'static str> {
        NAMES
            .iter()
            .filter(|(_, bit)| self.contains(*bit))
            .map(|(name, _)| *name)
            .collect()
    }
}

impl fmt::Display for EventMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.names().join(","))
    }
}
