//! Text stub writer.
//!
//! Output is fully determined by the [`CreateInfo`]: sections come in a fixed
//! order, symbols in their stored order, and groups of entries sharing the
//! same target set are ordered by set size and then by bit pattern.
//!
//! Layout follows the reference stubs: top-level values start at column 17,
//! values inside a group at column 21, and flow lists wrap before column 80
//! with continuation lines aligned after the opening bracket.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::debug;

use super::create_info::{CreateInfo, MetaType, MetadataKind, SymbolType, TbdFlags, UuidInfo};
use super::options::{TbdVersion, WriteOptions};
use super::yaml::quote;
use crate::bit_list::BitList;
use crate::error::{Error, Result};
use crate::target::{Platform, Target};

/// Column at which top-level values start.
const KEY_WIDTH: usize = 17;

/// Column at which values inside a group start.
const GROUP_VALUE_COLUMN: usize = 21;

/// Lines are wrapped before this column.
const MAX_COLUMN: usize = 80;

/// UUIDs per line in the v1-v3 `uuids` list.
const UUIDS_PER_LINE: usize = 2;

const GROUP_FIRST_INDENT: &str = "  - ";
const GROUP_INDENT: &str = "    ";

// =============================================================================
// Entry Points
// =============================================================================

/// Renders `info` as a stub document.
pub fn write_tbd_to_string(info: &CreateInfo, options: WriteOptions) -> Result<String> {
    let mut writer = TbdWriter::new(info, options);
    writer.write_document();
    Ok(writer.out)
}

/// Writes `info` to `writer`.
pub fn write_tbd<W: Write>(info: &CreateInfo, options: WriteOptions, mut writer: W) -> Result<()> {
    let text = write_tbd_to_string(info, options)?;
    writer.write_all(text.as_bytes())?;
    writer.flush()?;
    Ok(())
}

/// Writes `info` to the file at `path`, creating parent directories.
pub fn write_tbd_to_path<P: AsRef<Path>>(
    info: &CreateInfo,
    options: WriteOptions,
    path: P,
) -> Result<()> {
    let path = path.as_ref();
    let text = write_tbd_to_string(info, options)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| Error::FileWrite {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
    }

    let file = File::create(path).map_err(|e| Error::FileWrite {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut writer = BufWriter::new(file);

    writer
        .write_all(text.as_bytes())
        .and_then(|_| writer.flush())
        .map_err(|e| Error::FileWrite {
            path: path.to_path_buf(),
            source: e,
        })?;

    debug!("Wrote {} bytes to {}", text.len(), path.display());
    Ok(())
}

// =============================================================================
// Grouping
// =============================================================================

/// Orders target sets: larger sets first, then by bit pattern.
fn compare_targets(a: &BitList, b: &BitList) -> Ordering {
    b.set_count()
        .cmp(&a.set_count())
        .then_with(|| a.equal_counts_compare(b))
}

fn same_targets(a: &BitList, b: &BitList) -> bool {
    a.set_count() == b.set_count() && a.equal_counts_is_equal(b)
}

/// Collects the distinct target sets among `lists`, in output order.
fn distinct_groups<'b>(lists: impl Iterator<Item = &'b BitList>) -> Vec<&'b BitList> {
    let mut groups: Vec<&BitList> = lists.collect();
    groups.sort_by(|a, b| compare_targets(a, b));
    groups.dedup_by(|a, b| same_targets(a, b));
    groups
}

/// One category line inside a group.
struct Category {
    key: &'static str,
    source: Source,
}

#[derive(Clone, Copy)]
enum Source {
    Symbol(MetaType, SymbolType),
    Metadata(MetadataKind),
}

impl Category {
    const fn symbol(key: &'static str, meta: MetaType, kind: SymbolType) -> Self {
        Self {
            key,
            source: Source::Symbol(meta, kind),
        }
    }

    const fn metadata(key: &'static str, kind: MetadataKind) -> Self {
        Self {
            key,
            source: Source::Metadata(kind),
        }
    }
}

// =============================================================================
// Writer
// =============================================================================

struct TbdWriter<'a> {
    info: &'a CreateInfo,
    options: WriteOptions,
    version: TbdVersion,
    /// Target indexes in output order
    order: Vec<usize>,
    out: String,
}

impl<'a> TbdWriter<'a> {
    fn new(info: &'a CreateInfo, options: WriteOptions) -> Self {
        let mut order: Vec<usize> = (0..info.targets.len()).collect();
        if options.contains(WriteOptions::ORDER_BY_ARCHITECTURE_TABLE) {
            order.sort_by_key(|&i| info.targets.as_slice()[i].arch().index());
        }

        Self {
            info,
            options,
            version: info.version,
            order,
            out: String::new(),
        }
    }

    fn platforms(&self) -> Vec<Platform> {
        if self.info.platforms.is_empty() {
            vec![self.info.primary_platform()]
        } else {
            self.info.platforms.clone()
        }
    }

    fn targets_in_order(&self) -> impl Iterator<Item = Target> + '_ {
        self.order
            .iter()
            .filter_map(|&i| self.info.targets.get_target(i))
    }

    /// Architecture names for the set bits of `bits`.
    fn arch_names(&self, bits: &BitList) -> Vec<Cow<'static, str>> {
        self.order
            .iter()
            .filter(|&&i| bits.get(i))
            .filter_map(|&i| self.info.targets.get_target(i))
            .map(|t| Cow::Borrowed(t.arch().name))
            .collect()
    }

    /// v4 target names for the set bits of `bits`.
    fn target_names(&self, bits: &BitList) -> Vec<Cow<'static, str>> {
        let platforms = self.platforms();
        let mut names = Vec::new();
        for &i in &self.order {
            if !bits.get(i) {
                continue;
            }
            if let Some(target) = self.info.targets.get_target(i) {
                for platform in &platforms {
                    names.push(Cow::Owned(format!(
                        "{}-{}",
                        target.arch().name,
                        platform.target_name()
                    )));
                }
            }
        }
        names
    }

    // -------------------------------------------------------------------------
    // Low-level layout
    // -------------------------------------------------------------------------

    /// Writes `indent` and `key:`, pads to `value_column` and returns the column reached.
    fn key(&mut self, indent: &str, key: &str, value_column: usize) -> usize {
        self.out.push_str(indent);
        self.out.push_str(key);
        self.out.push(':');
        let used = indent.len() + key.len() + 1;
        let column = value_column.max(used + 1);
        self.out.extend(std::iter::repeat(' ').take(column - used));
        column
    }

    fn scalar(&mut self, key: &str, value: &str) {
        self.key("", key, KEY_WIDTH);
        self.out.push_str(value);
        self.out.push('\n');
    }

    /// Writes `[ a, b, ... ]` starting at `column`.
    ///
    /// Without `per_line`, items wrap before [`MAX_COLUMN`]; an item too long
    /// for any line sits alone on its own line. With `per_line`, each line
    /// holds exactly that many items.
    fn flow_list<S: AsRef<str>>(&mut self, column: usize, items: &[S], per_line: Option<usize>) {
        let indent = column + 2;
        self.out.push_str("[ ");
        let mut current = indent;

        for (i, item) in items.iter().enumerate() {
            let item = quote(item.as_ref());
            if i > 0 {
                let wrap = match per_line {
                    Some(n) => i % n == 0,
                    None => current + 2 + item.len() > MAX_COLUMN,
                };
                if wrap {
                    self.out.push_str(",\n");
                    self.out.extend(std::iter::repeat(' ').take(indent));
                    current = indent;
                } else {
                    self.out.push_str(", ");
                    current += 2;
                }
            }
            self.out.push_str(&item);
            current += item.len();
        }
        self.out.push_str(" ]\n");
    }

    fn list<S: AsRef<str>>(&mut self, key: &str, items: &[S]) {
        let column = self.key("", key, KEY_WIDTH);
        self.flow_list(column, items, None);
    }

    fn group_list<S: AsRef<str>>(&mut self, first: bool, key: &str, items: &[S]) {
        let indent = if first { GROUP_FIRST_INDENT } else { GROUP_INDENT };
        let column = self.key(indent, key, GROUP_VALUE_COLUMN);
        self.flow_list(column, items, None);
    }

    fn group_scalar(&mut self, key: &str, value: &str) {
        self.key(GROUP_INDENT, key, GROUP_VALUE_COLUMN);
        self.out.push_str(value);
        self.out.push('\n');
    }

    // -------------------------------------------------------------------------
    // Document
    // -------------------------------------------------------------------------

    fn write_document(&mut self) {
        self.out.push_str(self.version.header());
        self.out.push('\n');

        if self.version == TbdVersion::V4 {
            self.write_v4_header();
        } else {
            self.write_legacy_header();
        }

        self.write_sections();

        if !self.options.contains(WriteOptions::IGNORE_FOOTER) {
            self.out.push_str("...\n");
        }
    }

    fn write_legacy_header(&mut self) {
        let archs: Vec<&str> = self.targets_in_order().map(|t| t.arch().name).collect();
        self.list("archs", &archs);

        if !self.options.contains(WriteOptions::IGNORE_UUIDS) && !self.info.uuids.is_empty() {
            let uuids: Vec<String> = self
                .uuids_in_order()
                .map(|u| format!("{}: {}", u.target.arch().name, u.uuid_string()))
                .collect();
            let column = self.key("", "uuids", KEY_WIDTH);
            self.flow_list(column, &uuids, Some(UUIDS_PER_LINE));
        }

        match self.info.platforms.as_slice() {
            [] => {}
            [a, b, ..] if Platform::is_zippered_pair(*a, *b) => self.scalar("platform", "zippered"),
            [first, ..] => self.scalar("platform", first.legacy_name()),
        }

        if self.version >= TbdVersion::V2 {
            self.write_flags();
        }
        self.write_identity();

        if let Some(swift) = self.info.swift_version {
            if self.version >= TbdVersion::V2 {
                self.scalar("swift-version", &swift.to_string());
            }
        }
        if let Some(constraint) = self.info.objc_constraint {
            self.scalar("objc-constraint", constraint.as_str());
        }

        if !self.options.contains(WriteOptions::IGNORE_PARENT_UMBRELLA) {
            if let Some(umbrella) = self.info.metadata_of(MetadataKind::ParentUmbrella).next() {
                self.scalar("parent-umbrella", &quote(&umbrella.value_lossy()));
            }
        }
    }

    fn write_v4_header(&mut self) {
        self.scalar("tbd-version", "4");

        let all: Vec<Cow<'static, str>> = {
            let platforms = self.platforms();
            self.targets_in_order()
                .flat_map(|t| {
                    platforms.iter().map(move |p| {
                        Cow::Owned(format!("{}-{}", t.arch().name, p.target_name()))
                    })
                })
                .collect()
        };
        self.list("targets", &all);

        if !self.options.contains(WriteOptions::IGNORE_UUIDS) && !self.info.uuids.is_empty() {
            self.out.push_str("uuids:\n");
            let platforms = self.platforms();
            let uuids: Vec<_> = self.uuids_in_order().collect();
            for uuid in uuids {
                for platform in &platforms {
                    let target = format!("{}-{}", uuid.target.arch().name, platform.target_name());
                    self.key(GROUP_FIRST_INDENT, "target", GROUP_VALUE_COLUMN);
                    self.out.push_str(&quote(&target));
                    self.out.push('\n');
                    self.group_scalar("value", &uuid.uuid_string());
                }
            }
        }

        self.write_flags();
        self.write_identity();

        if let Some(swift) = self.info.swift_version {
            self.scalar("swift-abi-version", &swift.to_string());
        }

        if !self.options.contains(WriteOptions::IGNORE_PARENT_UMBRELLA) {
            self.write_v4_metadata("parent-umbrella", "umbrella", MetadataKind::ParentUmbrella);
        }
        if !self.options.contains(WriteOptions::IGNORE_CLIENTS) {
            self.write_v4_metadata("allowable-clients", "clients", MetadataKind::Client);
        }
        if !self.options.contains(WriteOptions::IGNORE_REEXPORTS) {
            self.write_v4_metadata("reexported-libraries", "libraries", MetadataKind::Reexport);
        }
    }

    fn uuids_in_order(&self) -> impl Iterator<Item = UuidInfo> + '_ {
        let info = self.info;
        self.order.iter().filter_map(move |&i| {
            let target = info.targets.get_target(i)?;
            info.uuids.iter().find(|u| u.target == target).copied()
        })
    }

    fn write_flags(&mut self) {
        if self.options.contains(WriteOptions::IGNORE_FLAGS) {
            return;
        }
        let flags = self.info.flags.unwrap_or_default();
        let mut names = Vec::new();
        if flags.contains(TbdFlags::FLAT_NAMESPACE) {
            names.push("flat_namespace");
        }
        if flags.contains(TbdFlags::NOT_APP_EXTENSION_SAFE) {
            names.push("not_app_extension_safe");
        }
        if !names.is_empty() {
            self.list("flags", &names);
        }
    }

    fn write_identity(&mut self) {
        if let Some(name) = &self.info.install_name {
            self.scalar("install-name", &quote(&String::from_utf8_lossy(name)));
        }
        if !self.options.contains(WriteOptions::IGNORE_CURRENT_VERSION) {
            if let Some(version) = self.info.current_version {
                self.scalar("current-version", &version.to_string());
            }
        }
        if !self.options.contains(WriteOptions::IGNORE_COMPATIBILITY_VERSION) {
            if let Some(version) = self.info.compatibility_version {
                self.scalar("compatibility-version", &version.to_string());
            }
        }
    }

    fn write_v4_metadata(&mut self, section: &str, key: &'static str, kind: MetadataKind) {
        let info = self.info;
        let groups = distinct_groups(info.metadata_of(kind).map(|m| &m.targets));
        if groups.is_empty() {
            return;
        }

        self.out.push_str(section);
        self.out.push_str(":\n");
        for group in groups {
            let targets = self.target_names(group);
            self.group_list(true, "targets", &targets);

            let values: Vec<Cow<'_, str>> = info
                .metadata_of(kind)
                .filter(|m| same_targets(&m.targets, group))
                .map(|m| m.value_lossy())
                .collect();
            if kind == MetadataKind::ParentUmbrella {
                if let Some(value) = values.first() {
                    self.group_scalar(key, &quote(value));
                }
            } else {
                self.group_list(false, key, &values);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Exports and undefineds
    // -------------------------------------------------------------------------

    fn export_categories(&self) -> Vec<Category> {
        use MetaType::Export;
        use SymbolType::*;

        let mut categories = Vec::new();
        if self.version != TbdVersion::V4 {
            if !self.options.contains(WriteOptions::IGNORE_CLIENTS) {
                let key = if self.version == TbdVersion::V1 {
                    "allowed-clients"
                } else {
                    "allowable-clients"
                };
                categories.push(Category::metadata(key, MetadataKind::Client));
            }
            if !self.options.contains(WriteOptions::IGNORE_REEXPORTS) {
                categories.push(Category::metadata("re-exports", MetadataKind::Reexport));
            }
        }

        categories.push(Category::symbol("symbols", Export, Normal));
        categories.push(Category::symbol("objc-classes", Export, ObjcClass));
        if self.version.has_objc_eh_types() {
            categories.push(Category::symbol("objc-eh-types", Export, ObjcEhType));
        }
        categories.push(Category::symbol("objc-ivars", Export, ObjcIvar));
        let weak = if self.version == TbdVersion::V4 {
            "weak-symbols"
        } else {
            "weak-def-symbols"
        };
        categories.push(Category::symbol(weak, Export, Weak));
        categories.push(Category::symbol("thread-local-symbols", Export, ThreadLocal));
        categories
    }

    fn undefined_categories(&self) -> Vec<Category> {
        use MetaType::Undefined;
        use SymbolType::*;

        let mut categories = vec![
            Category::symbol("symbols", Undefined, Normal),
            Category::symbol("objc-classes", Undefined, ObjcClass),
        ];
        if self.version.has_objc_eh_types() {
            categories.push(Category::symbol("objc-eh-types", Undefined, ObjcEhType));
        }
        categories.push(Category::symbol("objc-ivars", Undefined, ObjcIvar));
        let weak = if self.version == TbdVersion::V4 {
            "weak-symbols"
        } else {
            "weak-ref-symbols"
        };
        categories.push(Category::symbol(weak, Undefined, Weak));
        categories
    }

    fn entries(&self, source: Source) -> Box<dyn Iterator<Item = (&'a [u8], &'a BitList)> + 'a> {
        let info = self.info;
        match source {
            Source::Symbol(meta, kind) => Box::new(
                info.symbols
                    .iter()
                    .filter(move |s| s.meta == meta && s.kind == kind)
                    .map(|s| (s.name.as_slice(), &s.targets)),
            ),
            Source::Metadata(kind) => Box::new(
                info.metadata_of(kind)
                    .map(|m| (m.value.as_slice(), &m.targets)),
            ),
        }
    }

    fn write_sections(&mut self) {
        let exports = self.export_categories();
        self.write_grouped("exports", &exports);

        if self.version >= TbdVersion::V2 && !self.options.contains(WriteOptions::IGNORE_UNDEFINEDS)
        {
            let undefineds = self.undefined_categories();
            self.write_grouped("undefineds", &undefineds);
        }
    }

    fn write_grouped(&mut self, section: &str, categories: &[Category]) {
        let groups = {
            let lists: Vec<&'a BitList> = categories
                .iter()
                .flat_map(|c| self.entries(c.source).map(|(_, targets)| targets))
                .collect();
            distinct_groups(lists.into_iter())
        };
        if groups.is_empty() {
            return;
        }

        self.out.push_str(section);
        self.out.push_str(":\n");

        let targets_key = if self.version == TbdVersion::V4 {
            "targets"
        } else {
            "archs"
        };
        for group in groups {
            let names = if self.version == TbdVersion::V4 {
                self.target_names(group)
            } else {
                self.arch_names(group)
            };
            self.group_list(true, targets_key, &names);

            for category in categories {
                // Names are raw bytes until here.
                let items: Vec<Cow<'a, str>> = self
                    .entries(category.source)
                    .filter(|(_, targets)| same_targets(targets, group))
                    .map(|(name, _)| String::from_utf8_lossy(name))
                    .collect();
                if !items.is_empty() {
                    self.group_list(false, category.key, &items);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macho::ObjcConstraint;
    use crate::target::ArchInfo;
    use crate::tbd::conflict::RejectConflicts;
    use crate::tbd::ParseOptions;

    fn arch(name: &str) -> &'static ArchInfo {
        ArchInfo::by_name(name).unwrap()
    }

    fn sample(version: TbdVersion) -> CreateInfo {
        let policy = &mut RejectConflicts;
        let x86 = arch("x86_64");
        let mut info = CreateInfo::new(version, ParseOptions::empty(), 1);
        info.set_platforms(&[Platform::MacOs], policy, x86).unwrap();
        let index = info.add_architecture(x86, policy).unwrap().unwrap();
        info.add_uuid(index, [0x11; 16], policy).unwrap();
        info.set_flags(TbdFlags::empty(), policy, x86).unwrap();
        info.set_install_name(b"/usr/lib/libfoo.dylib", policy, x86).unwrap();
        info.set_current_version(0x0001_0203, policy, x86).unwrap();
        info.set_compatibility_version(0x0001_0000, policy, x86).unwrap();
        info.add_symbol(b"_foo", SymbolType::Normal, MetaType::Export, index)
            .unwrap();
        info.add_symbol(b"_bar", SymbolType::Normal, MetaType::Undefined, index)
            .unwrap();
        info
    }

    fn two_arch(version: TbdVersion) -> CreateInfo {
        let policy = &mut RejectConflicts;
        let mut info = CreateInfo::new(version, ParseOptions::empty(), 2);
        info.set_platforms(&[Platform::IOs], policy, arch("arm64")).unwrap();
        info.add_architecture(arch("arm64"), policy).unwrap();
        info.add_architecture(arch("armv7"), policy).unwrap();
        info.add_uuid(0, [0xAA; 16], policy).unwrap();
        info.add_uuid(1, [0xBB; 16], policy).unwrap();
        info.set_install_name(b"/usr/lib/libtwo.dylib", policy, arch("arm64"))
            .unwrap();
        for index in 0..2 {
            info.add_symbol(b"_both", SymbolType::Normal, MetaType::Export, index)
                .unwrap();
        }
        info.add_symbol(b"_only64", SymbolType::Normal, MetaType::Export, 0)
            .unwrap();
        info.add_symbol(b"_weak", SymbolType::Weak, MetaType::Export, 1)
            .unwrap();
        info.add_metadata(b"Foundation", MetadataKind::Client, 0).unwrap();
        info.add_metadata(b"Foundation", MetadataKind::Client, 1).unwrap();
        info
    }

    #[test]
    fn test_v2_document() {
        let text = write_tbd_to_string(&sample(TbdVersion::V2), WriteOptions::empty()).unwrap();
        let expected = "\
--- !tapi-tbd-v2
archs:           [ x86_64 ]
uuids:           [ 'x86_64: 11111111-1111-1111-1111-111111111111' ]
platform:        macosx
install-name:    /usr/lib/libfoo.dylib
current-version: 1.2.3
compatibility-version: 1
exports:
  - archs:           [ x86_64 ]
    symbols:         [ _foo ]
undefineds:
  - archs:           [ x86_64 ]
    symbols:         [ _bar ]
...
";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_v1_has_no_undefineds() {
        let text = write_tbd_to_string(&sample(TbdVersion::V1), WriteOptions::empty()).unwrap();
        assert!(text.starts_with("---\narchs:           [ x86_64 ]\n"));
        assert!(!text.contains("undefineds:"));
        assert!(text.contains("    symbols:         [ _foo ]\n"));
    }

    #[test]
    fn test_v4_document() {
        let mut info = sample(TbdVersion::V4);
        info.swift_version = Some(5);
        info.objc_constraint = Some(ObjcConstraint::RetainRelease);
        info.add_metadata(b"/usr/lib/libbar.dylib", MetadataKind::Reexport, 0)
            .unwrap();

        let text = write_tbd_to_string(&info, WriteOptions::empty()).unwrap();
        let expected = "\
--- !tapi-tbd
tbd-version:     4
targets:         [ x86_64-macos ]
uuids:
  - target:          x86_64-macos
    value:           11111111-1111-1111-1111-111111111111
install-name:    /usr/lib/libfoo.dylib
current-version: 1.2.3
compatibility-version: 1
swift-abi-version: 5
reexported-libraries:
  - targets:         [ x86_64-macos ]
    libraries:       [ /usr/lib/libbar.dylib ]
exports:
  - targets:         [ x86_64-macos ]
    symbols:         [ _foo ]
undefineds:
  - targets:         [ x86_64-macos ]
    symbols:         [ _bar ]
...
";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_groups_by_target_set() {
        let text = write_tbd_to_string(&two_arch(TbdVersion::V3), WriteOptions::empty()).unwrap();
        let expected = "\
exports:
  - archs:           [ arm64, armv7 ]
    allowable-clients: [ Foundation ]
    symbols:         [ _both ]
  - archs:           [ arm64 ]
    symbols:         [ _only64 ]
  - archs:           [ armv7 ]
    weak-def-symbols: [ _weak ]
...
";
        assert!(text.ends_with(expected), "{text}");
        assert!(text.contains("archs:           [ arm64, armv7 ]\n"));
        assert!(text.contains("platform:        ios\n"));
    }

    #[test]
    fn test_order_by_architecture_table() {
        let info = two_arch(TbdVersion::V2);
        let text = write_tbd_to_string(&info, WriteOptions::ORDER_BY_ARCHITECTURE_TABLE).unwrap();
        assert!(text.contains("archs:           [ armv7, arm64 ]\n"));
        assert!(text.contains(
            "uuids:           [ 'armv7: BBBBBBBB-BBBB-BBBB-BBBB-BBBBBBBBBBBB', 'arm64: AAAAAAAA-AAAA-AAAA-AAAA-AAAAAAAAAAAA' ]\n"
        ));
    }

    #[test]
    fn test_uuids_two_per_line() {
        let policy = &mut RejectConflicts;
        let mut info = CreateInfo::new(TbdVersion::V2, ParseOptions::empty(), 3);
        for (i, name) in ["armv7", "armv7s", "arm64"].iter().enumerate() {
            info.add_architecture(arch(name), policy).unwrap();
            info.add_uuid(i, [i as u8; 16], policy).unwrap();
        }
        let text = write_tbd_to_string(&info, WriteOptions::IGNORE_FOOTER).unwrap();
        let uuids: Vec<&str> = text
            .lines()
            .skip_while(|l| !l.starts_with("uuids:"))
            .take(2)
            .collect();
        assert_eq!(uuids.len(), 2);
        assert!(uuids[0].ends_with("'armv7s: 01010101-0101-0101-0101-010101010101',"));
        assert_eq!(
            uuids[1],
            "                   'arm64: 02020202-0202-0202-0202-020202020202' ]"
        );
        assert!(!text.contains("..."));
    }

    #[test]
    fn test_wraps_long_lists() {
        let policy = &mut RejectConflicts;
        let mut info = CreateInfo::new(TbdVersion::V3, ParseOptions::empty(), 1);
        info.add_architecture(arch("x86_64"), policy).unwrap();
        for i in 0..20 {
            let name = format!("_symbol_number_{i:02}");
            info.add_symbol(name.as_bytes(), SymbolType::Normal, MetaType::Export, 0)
                .unwrap();
        }
        let long = "_".repeat(100);
        info.add_symbol(long.as_bytes(), SymbolType::Weak, MetaType::Export, 0)
            .unwrap();

        let text = write_tbd_to_string(&info, WriteOptions::empty()).unwrap();
        for line in text.lines() {
            if line.contains("_symbol_number_") {
                assert!(line.len() <= MAX_COLUMN + 2, "{line}");
            }
        }
        let continuation = " ".repeat(GROUP_VALUE_COLUMN + 2);
        assert!(text.contains(&format!("{continuation}_symbol_number_")));
        assert!(text.contains(&format!("    weak-def-symbols: [ {long} ]\n")));
    }

    #[test]
    fn test_write_options() {
        let info = sample(TbdVersion::V2);
        let options = WriteOptions::IGNORE_UUIDS
            | WriteOptions::IGNORE_CURRENT_VERSION
            | WriteOptions::IGNORE_COMPATIBILITY_VERSION
            | WriteOptions::IGNORE_UNDEFINEDS;
        let text = write_tbd_to_string(&info, options).unwrap();
        assert!(!text.contains("uuids:"));
        assert!(!text.contains("current-version:"));
        assert!(!text.contains("compatibility-version:"));
        assert!(!text.contains("undefineds:"));
        assert!(text.contains("exports:"));
    }

    #[test]
    fn test_flags_and_zippered() {
        let mut info = sample(TbdVersion::V3);
        info.flags = Some(TbdFlags::FLAT_NAMESPACE);
        info.platforms = vec![Platform::MacOs, Platform::MacCatalyst];
        let text = write_tbd_to_string(&info, WriteOptions::empty()).unwrap();
        assert!(text.contains("platform:        zippered\n"));
        assert!(text.contains("flags:           [ flat_namespace ]\n"));

        info.version = TbdVersion::V4;
        let text = write_tbd_to_string(&info, WriteOptions::empty()).unwrap();
        assert!(text.contains("targets:         [ x86_64-macos, x86_64-maccatalyst ]\n"));
    }

    #[test]
    fn test_invalid_utf8_names_stay_distinct() {
        let mut info = sample(TbdVersion::V3);
        info.add_symbol(b"_a\xff", SymbolType::Normal, MetaType::Export, 0)
            .unwrap();
        info.add_symbol(b"_a\xfe", SymbolType::Normal, MetaType::Export, 0)
            .unwrap();

        let text = write_tbd_to_string(&info, WriteOptions::empty()).unwrap();
        assert_eq!(text.matches("_a\u{FFFD}").count(), 2);
        assert!(text.contains("    symbols:         [ _a\u{FFFD}, _a\u{FFFD}, _foo ]\n"));
    }

    #[test]
    fn test_idempotent() {
        for version in TbdVersion::ALL {
            let info = two_arch(version);
            let first = write_tbd_to_string(&info, WriteOptions::empty()).unwrap();
            let second = write_tbd_to_string(&info, WriteOptions::empty()).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_write_to_sink() {
        let info = sample(TbdVersion::V3);
        let mut buffer = Vec::new();
        write_tbd(&info, WriteOptions::empty(), &mut buffer).unwrap();
        assert_eq!(
            String::from_utf8(buffer).unwrap(),
            write_tbd_to_string(&info, WriteOptions::empty()).unwrap()
        );
    }
}
