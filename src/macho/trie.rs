//! Export trie decoding.
//!
//! Exported names are stored as a prefix tree. A node carries an optional
//! terminal payload (flags, then an address or re-export target) followed by
//! its outgoing edges, each a NUL-terminated label and a ULEB128 child offset.
//!
//! The decoder walks the trie depth-first, rebuilding each exported name from
//! the edge labels on the current path. The byte range of every node on that
//! path is kept so an edge pointing back into an ancestor (a cycle or an
//! overlap) is rejected instead of being walked forever.

use std::sync::atomic::{AtomicBool, Ordering};

use super::constants::*;
use crate::cursor::{Cursor, Endian};
use crate::error::{Error, Result};
use crate::range::Range;

/// Maximum nesting depth of trie nodes.
pub const MAX_TRIE_DEPTH: usize = 128;

/// Smallest possible trie: an empty root node.
pub const MIN_TRIE_SIZE: usize = 2;

// =============================================================================
// Export Kind
// =============================================================================

/// Classification of an export from its trie flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    /// Regular or absolute symbol
    Normal,
    /// Weak definition
    Weak,
    /// Thread-local variable
    ThreadLocal,
}

impl ExportKind {
    /// Classifies an export by its flags.
    ///
    /// Weak definitions win over the kind bits.
    #[inline]
    pub fn from_flags(flags: u64) -> Self {
        if flags & EXPORT_SYMBOL_FLAGS_WEAK_DEFINITION != 0 {
            Self::Weak
        } else if flags & EXPORT_SYMBOL_FLAGS_KIND_MASK == EXPORT_SYMBOL_FLAGS_KIND_THREAD_LOCAL {
            Self::ThreadLocal
        } else {
            Self::Normal
        }
    }
}

// =============================================================================
// Export Trie Parser
// =============================================================================

/// Parser for export tries.
pub struct ExportTrieParser<'a, 'c> {
    data: &'a [u8],
    base: u64,
    cancel: Option<&'c AtomicBool>,
    path: Vec<u8>,
    visited: Vec<Range>,
    nodes: usize,
}

impl<'a, 'c> ExportTrieParser<'a, 'c> {
    /// Creates a parser for `data`, which starts at file offset `base`.
    pub fn new(data: &'a [u8], base: u64) -> Self {
        Self {
            data,
            base,
            cancel: None,
            path: Vec::new(),
            visited: Vec::new(),
            nodes: 0,
        }
    }

    /// Checks `flag` at every node and stops with [`Error::Cancelled`] once set.
    pub fn with_cancel(mut self, flag: Option<&'c AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    /// Walks the whole trie, calling `visit(name, flags)` for every export in trie order.
    pub fn parse<F>(mut self, mut visit: F) -> Result<()>
    where
        F: FnMut(&[u8], u64) -> Result<()>,
    {
        if self.data.len() < MIN_TRIE_SIZE {
            return Err(Error::invalid_trie(self.base));
        }
        self.parse_node(0, 0, &mut visit)
    }

    /// Collects every export as an owned `(name, flags)` pair.
    pub fn parse_all(self) -> Result<Vec<(Vec<u8>, u64)>> {
        let mut exports = Vec::new();
        self.parse(|name, flags| {
            exports.try_reserve(1)?;
            exports.push((name.to_vec(), flags));
            Ok(())
        })?;
        Ok(exports)
    }

    #[inline]
    fn check_cancelled(&self) -> Result<()> {
        match self.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(Error::Cancelled),
            _ => Ok(()),
        }
    }

    /// Runs `f` with `label` appended to the path, then rewinds the path and
    /// the visited ranges to where they were.
    fn descend<F>(&mut self, label: &[u8], f: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        let path_len = self.path.len();
        let visited_len = self.visited.len();

        self.path
            .try_reserve(label.len())
            .map_err(|_| Error::OutOfMemory {
                requested: path_len + label.len(),
            })?;
        self.path.extend_from_slice(label);

        let result = f(self);

        self.path.truncate(path_len);
        self.visited.truncate(visited_len);
        result
    }

    /// Recursive node parser.
    fn parse_node<F>(&mut self, offset: u64, depth: usize, visit: &mut F) -> Result<()>
    where
        F: FnMut(&[u8], u64) -> Result<()>,
    {
        self.check_cancelled()?;

        let at = self.base.saturating_add(offset);
        let invalid = |_: Error| Error::invalid_trie(at);

        // Every node spans at least two bytes, so a well-formed trie cannot
        // have more nodes than half its size.
        self.nodes += 1;
        if depth > MAX_TRIE_DEPTH || self.nodes > self.data.len() / MIN_TRIE_SIZE {
            return Err(Error::invalid_trie(at));
        }

        let mut cursor = Cursor::new(self.data, Endian::Little).with_base(self.base);
        cursor.seek(offset).map_err(invalid)?;

        let terminal_size = cursor.read_uleb128().map_err(invalid)?;
        let terminal_size = usize::try_from(terminal_size).map_err(|_| Error::invalid_trie(at))?;
        let terminal = cursor.read_bytes(terminal_size).map_err(invalid)?;
        let flags = if terminal.is_empty() {
            None
        } else {
            Some(parse_terminal(terminal).map_err(invalid)?)
        };

        // First pass: find where the node ends.
        let child_count = cursor.read_u8().map_err(invalid)?;
        let children_start = cursor.position() as u64;
        for _ in 0..child_count {
            cursor.read_cstr(usize::MAX).map_err(invalid)?;
            cursor.read_uleb128().map_err(invalid)?;
        }

        let range = Range {
            begin: offset,
            end: cursor.position() as u64,
        };
        if self.visited.iter().any(|seen| seen.overlaps(&range)) {
            return Err(Error::invalid_trie(at));
        }
        self.visited.try_reserve(1)?;
        self.visited.push(range);

        if let Some(flags) = flags {
            visit(&self.path, flags)?;
        }

        // Second pass: recurse.
        cursor.seek(children_start).map_err(invalid)?;
        for _ in 0..child_count {
            let label = cursor.read_cstr(usize::MAX).map_err(invalid)?;
            let child = cursor.read_uleb128().map_err(invalid)?;
            if child >= self.data.len() as u64 {
                return Err(Error::invalid_trie(at));
            }

            self.descend(label, |parser| parser.parse_node(child, depth + 1, visit))?;
        }

        Ok(())
    }
}

/// Decodes a terminal payload and returns its flags.
///
/// The payload is either a re-export (ordinal plus an optional import name)
/// or an address, followed by a resolver address for stub-and-resolver
/// exports.
fn parse_terminal(payload: &[u8]) -> Result<u64> {
    let mut cursor = Cursor::new(payload, Endian::Little);
    let flags = cursor.read_uleb128()?;

    if flags & EXPORT_SYMBOL_FLAGS_REEXPORT != 0 {
        cursor.read_uleb128()?;
        cursor.read_cstr(cursor.remaining())?;
    } else {
        cursor.read_uleb128()?;
        if flags & EXPORT_SYMBOL_FLAGS_STUB_AND_RESOLVER != 0 {
            cursor.read_uleb128()?;
        }
    }

    Ok(flags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macho::testutil::{encode_trie, reexport_terminal, terminal, TrieNode};

    fn names(exports: &[(Vec<u8>, u64)]) -> Vec<&str> {
        exports
            .iter()
            .map(|(name, _)| std::str::from_utf8(name).unwrap())
            .collect()
    }

    fn sample_trie() -> Vec<u8> {
        let foobar = TrieNode::leaf(terminal(EXPORT_SYMBOL_FLAGS_WEAK_DEFINITION, 0x2000));
        let foo = TrieNode::leaf(terminal(0, 0x1000)).child("bar", foobar);
        let bar = TrieNode::leaf(terminal(EXPORT_SYMBOL_FLAGS_KIND_THREAD_LOCAL, 0x3000));
        let underscore = TrieNode::default().child("foo", foo).child("bar", bar);
        encode_trie(&TrieNode::default().child("_", underscore))
    }

    #[test]
    fn test_parse_nested_trie() {
        let exports = ExportTrieParser::new(&sample_trie(), 0).parse_all().unwrap();
        assert_eq!(names(&exports), ["_foo", "_foobar", "_bar"]);

        let kinds: Vec<_> = exports.iter().map(|(_, f)| ExportKind::from_flags(*f)).collect();
        assert_eq!(kinds, [ExportKind::Normal, ExportKind::Weak, ExportKind::ThreadLocal]);
    }

    #[test]
    fn test_reexport_and_resolver_terminals() {
        let root = TrieNode::default()
            .child(
                "_re",
                TrieNode::leaf(reexport_terminal(EXPORT_SYMBOL_FLAGS_REEXPORT, 1, "_orig")),
            )
            .child(
                "_stub",
                TrieNode::leaf({
                    let mut payload = terminal(EXPORT_SYMBOL_FLAGS_STUB_AND_RESOLVER, 0x10);
                    crate::cursor::write_uleb128(0x20, &mut payload);
                    payload
                }),
            );
        let exports = ExportTrieParser::new(&encode_trie(&root), 0).parse_all().unwrap();
        assert_eq!(names(&exports), ["_re", "_stub"]);
    }

    #[test]
    fn test_cycle_rejected() {
        // Root with one child edge pointing back at the root itself.
        let trie = [0x00, 0x01, b'a', 0x00, 0x00];
        assert!(matches!(
            ExportTrieParser::new(&trie, 0x4000).parse_all(),
            Err(Error::InvalidExportsTrie { offset: 0x4000 })
        ));
    }

    #[test]
    fn test_overlapping_child_rejected() {
        // The child starts inside the root's child table.
        let mut trie = vec![0x00, 0x02, b'a', 0x00, 0x08, b'b', 0x00, 0x03];
        trie.extend_from_slice(&[0x00, 0x00]);
        assert!(matches!(
            ExportTrieParser::new(&trie, 0).parse_all(),
            Err(Error::InvalidExportsTrie { .. })
        ));
    }

    #[test]
    fn test_child_offset_past_end() {
        let trie = [0x00, 0x01, b'a', 0x00, 0x40];
        assert!(matches!(
            ExportTrieParser::new(&trie, 0).parse_all(),
            Err(Error::InvalidExportsTrie { .. })
        ));
    }

    #[test]
    fn test_too_small() {
        assert!(ExportTrieParser::new(&[0x00], 0).parse_all().is_err());
        // An empty root is the smallest valid trie.
        assert!(ExportTrieParser::new(&[0x00, 0x00], 0)
            .parse_all()
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_truncated_terminal() {
        // Terminal size claims 3 bytes but the flags ULEB never terminates.
        let trie = [0x03, 0x80, 0x80, 0x80, 0x00];
        assert!(matches!(
            ExportTrieParser::new(&trie, 0).parse_all(),
            Err(Error::InvalidExportsTrie { .. })
        ));

        // Terminal size runs past the end of the trie.
        let trie = [0x09, 0x00, 0x00];
        assert!(ExportTrieParser::new(&trie, 0).parse_all().is_err());
    }

    #[test]
    fn test_depth_limit() {
        let mut node = TrieNode::leaf(terminal(0, 0));
        for _ in 0..MAX_TRIE_DEPTH {
            node = TrieNode::default().child("a", node);
        }
        let within = encode_trie(&node);
        assert_eq!(ExportTrieParser::new(&within, 0).parse_all().unwrap().len(), 1);

        let too_deep = encode_trie(&TrieNode::default().child("a", node));
        assert!(matches!(
            ExportTrieParser::new(&too_deep, 0).parse_all(),
            Err(Error::InvalidExportsTrie { .. })
        ));
    }

    #[test]
    fn test_cancellation() {
        let flag = AtomicBool::new(true);
        let result = ExportTrieParser::new(&sample_trie(), 0)
            .with_cancel(Some(&flag))
            .parse_all();
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn test_visitor_error_propagates() {
        let result = ExportTrieParser::new(&sample_trie(), 0).parse(|name, _| {
            if name == b"_foobar" {
                Err(Error::NoExports)
            } else {
                Ok(())
            }
        });
        assert!(matches!(result, Err(Error::NoExports)));
    }
}
