//! Symbol-table decoding and symbol classification.
//!
//! The classic `nlist` table is decoded for libraries without an export trie
//! and for undefined symbols. Names are classified into the stub categories
//! (normal, weak, Objective-C class, ivar, exception type) by their prefix.

use byteorder::{ByteOrder, LittleEndian};
use tracing::{debug, trace};
use zerocopy::{FromBytes, Immutable, KnownLayout};

use super::constants::*;
use super::file::Slice;
use super::structs::*;
use crate::cursor::{find_nul, Cursor};
use crate::error::{Error, Result};
use crate::range::{checked_mul, slice_range, Range};
use crate::tbd::{MetaType, ParseOptions, SymbolType, TbdVersion};

// =============================================================================
// Objective-C Prefixes
// =============================================================================

const OBJC_CLASS_PREFIX: &[u8] = b"_OBJC_CLASS_$";
const OBJC_METACLASS_PREFIX: &[u8] = b"_OBJC_METACLASS_$";
const OBJC_CLASS_NAME_PREFIX: &[u8] = b".objc_class_name";
const OBJC_IVAR_PREFIX: &[u8] = b"_OBJC_IVAR_$";
const OBJC_EHTYPE_PREFIX: &[u8] = b"_OBJC_EHTYPE_$";

// First eight bytes of each prefix, compared as one word before the full check.
const CLASS_WORD: u64 = u64::from_le_bytes(*b"_OBJC_CL");
const METACLASS_WORD: u64 = u64::from_le_bytes(*b"_OBJC_ME");
const CLASS_NAME_WORD: u64 = u64::from_le_bytes(*b".objc_cl");
const IVAR_WORD: u64 = u64::from_le_bytes(*b"_OBJC_IV");
const EHTYPE_WORD: u64 = u64::from_le_bytes(*b"_OBJC_EH");

/// Recognizes an Objective-C symbol and returns its category and stub name.
///
/// Returns `None` for ordinary names. Exception types are only a category of
/// their own from v3 on; earlier dialects list them as normal symbols under
/// their full name.
pub fn classify_objc(name: &[u8], version: TbdVersion) -> Option<(SymbolType, &[u8])> {
    let word = LittleEndian::read_u64(name.get(..8)?);
    let (kind, prefix) = match word {
        CLASS_WORD => (SymbolType::ObjcClass, OBJC_CLASS_PREFIX),
        METACLASS_WORD => (SymbolType::ObjcClass, OBJC_METACLASS_PREFIX),
        CLASS_NAME_WORD => (SymbolType::ObjcClass, OBJC_CLASS_NAME_PREFIX),
        IVAR_WORD => (SymbolType::ObjcIvar, OBJC_IVAR_PREFIX),
        EHTYPE_WORD if version.has_objc_eh_types() => (SymbolType::ObjcEhType, OBJC_EHTYPE_PREFIX),
        _ => return None,
    };

    let mut rest = name.strip_prefix(prefix)?;
    if version.strips_objc_underscore() {
        rest = rest.strip_prefix(b"_").unwrap_or(rest);
    }
    (!rest.is_empty()).then_some((kind, rest))
}

/// Classifies a symbol that is not a weak definition or reference.
#[inline]
pub fn classify_name(name: &[u8], version: TbdVersion, fallback: SymbolType) -> (SymbolType, &[u8]) {
    classify_objc(name, version).unwrap_or((fallback, name))
}

/// Returns the option that admits non-external symbols of `kind`.
pub fn private_symbol_option(kind: SymbolType) -> ParseOptions {
    match kind {
        SymbolType::Normal | SymbolType::ThreadLocal => ParseOptions::ALLOW_PRIVATE_NORMAL_SYMBOLS,
        SymbolType::Weak => ParseOptions::ALLOW_PRIVATE_WEAK_SYMBOLS,
        SymbolType::ObjcClass => ParseOptions::ALLOW_PRIVATE_OBJC_CLASS_SYMBOLS,
        SymbolType::ObjcEhType => ParseOptions::ALLOW_PRIVATE_OBJC_EHTYPE_SYMBOLS,
        SymbolType::ObjcIvar => ParseOptions::ALLOW_PRIVATE_OBJC_IVAR_SYMBOLS,
    }
}

// =============================================================================
// Symbol Table
// =============================================================================

/// A symbol accepted from the symbol table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol<'a> {
    /// Name as written in the stub
    pub name: &'a [u8],
    /// Category
    pub kind: SymbolType,
    /// Exported or undefined
    pub meta: MetaType,
}

/// Which symbols a decode pass should report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolFilter {
    /// Report defined symbols
    pub exports: bool,
    /// Report undefined symbols
    pub undefineds: bool,
}

/// 32- and 64-bit nlist entries.
pub trait NlistEntry: FromBytes + KnownLayout + Immutable + Swap {
    /// On-disk size of one entry.
    const SIZE: usize;

    /// Converts the entry to the 64-bit layout.
    fn into_nlist64(self) -> Nlist64;
}

impl NlistEntry for Nlist {
    const SIZE: usize = Nlist::SIZE;

    #[inline]
    fn into_nlist64(self) -> Nlist64 {
        self.widen()
    }
}

impl NlistEntry for Nlist64 {
    const SIZE: usize = Nlist64::SIZE;

    #[inline]
    fn into_nlist64(self) -> Nlist64 {
        self
    }
}

/// Decodes the symbol table described by `command`.
///
/// `visit` is called for every accepted symbol. Entries with a string index
/// past the string table are skipped.
pub fn parse_symbol_table<'a, F>(
    slice: &Slice<'a>,
    command: &SymtabCommand,
    version: TbdVersion,
    options: ParseOptions,
    filter: SymbolFilter,
    visit: F,
) -> Result<()>
where
    F: FnMut(Symbol<'a>) -> Result<()>,
{
    if slice.header.is_64 {
        decode::<Nlist64, F>(slice, command, version, options, filter, visit)
    } else {
        decode::<Nlist, F>(slice, command, version, options, filter, visit)
    }
}

fn decode<'a, N, F>(
    slice: &Slice<'a>,
    command: &SymtabCommand,
    version: TbdVersion,
    options: ParseOptions,
    filter: SymbolFilter,
    mut visit: F,
) -> Result<()>
where
    N: NlistEntry,
    F: FnMut(Symbol<'a>) -> Result<()>,
{
    let bounds = slice.local_range();

    let symbols_range = checked_mul(command.nsyms as u64, N::SIZE as u64)
        .and_then(|size| Range::from_offset_size(command.symoff as u64, size))
        .filter(|range| bounds.contains(range))
        .ok_or(Error::InvalidSymbolTable {
            reason: "symbol table extends past end of architecture",
        })?;

    let strings_range = Range::from_offset_size(command.stroff as u64, command.strsize as u64)
        .filter(|range| bounds.contains(range))
        .ok_or(Error::InvalidStringTable {
            reason: "string table extends past end of architecture",
        })?;

    if symbols_range.overlaps(&strings_range) {
        return Err(Error::OverlappingSymbolTables);
    }

    let symbols = slice_range(slice.data, symbols_range).ok_or(Error::InvalidSymbolTable {
        reason: "symbol table extends past end of architecture",
    })?;
    let strings = slice_range(slice.data, strings_range).ok_or(Error::InvalidStringTable {
        reason: "string table extends past end of architecture",
    })?;

    debug!(
        "{}: decoding {} symbol(s), {} string byte(s)",
        slice.arch.name, command.nsyms, command.strsize
    );

    let mut cursor = Cursor::new(symbols, slice.header.endian)
        .with_base(slice.range.begin + symbols_range.begin);

    for index in 0..command.nsyms {
        let entry = cursor.read_swapped::<N>()?.into_nlist64();

        let Some((meta, raw_kind)) = accept(&entry, version, filter) else {
            continue;
        };

        let Some(name) = lookup_string(strings, entry.n_strx) else {
            trace!("Skipping symbol {} with bad string index {}", index, entry.n_strx);
            continue;
        };

        let (kind, name) = match raw_kind {
            SymbolType::Weak => (SymbolType::Weak, name),
            fallback => classify_name(name, version, fallback),
        };

        if meta == MetaType::Export
            && !entry.is_external()
            && !options.contains(private_symbol_option(kind))
        {
            continue;
        }

        visit(Symbol { name, kind, meta })?;
    }

    Ok(())
}

/// Decides whether an entry is reported, and as what.
///
/// Returns the meta type and either `Weak` or `Normal`; Objective-C
/// categories are assigned from the name afterwards.
fn accept(entry: &Nlist64, version: TbdVersion, filter: SymbolFilter) -> Option<(MetaType, SymbolType)> {
    if entry.is_debug() {
        return None;
    }

    let meta = match entry.kind() {
        N_SECT | N_INDR => MetaType::Export,
        // Common symbols, listed as exports by the oldest dialect.
        N_UNDF if entry.is_external() && entry.n_value != 0 => {
            if version != TbdVersion::V1 {
                return None;
            }
            MetaType::Export
        }
        N_UNDF if entry.is_external() => MetaType::Undefined,
        _ => return None,
    };

    let kind = match meta {
        MetaType::Export if !filter.exports => return None,
        MetaType::Undefined if !filter.undefineds => return None,
        MetaType::Export if entry.n_desc & N_WEAK_DEF != 0 => SymbolType::Weak,
        MetaType::Undefined if entry.n_desc & N_WEAK_REF != 0 => SymbolType::Weak,
        _ => SymbolType::Normal,
    };

    Some((meta, kind))
}

/// Returns the NUL-terminated string at `index`, or `None` if it is out of
/// range, unterminated or empty.
fn lookup_string(strings: &[u8], index: u32) -> Option<&[u8]> {
    let tail = strings.get(index as usize..)?;
    let len = find_nul(tail)?;
    (len != 0).then(|| &tail[..len])
}
