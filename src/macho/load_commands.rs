//! Load-command walker.
//!
//! Walks one architecture's load-command stream and collects everything the
//! stub needs: identification, UUID, platform, symbol-table and export-trie
//! locations, re-exports, clients, the parent umbrella and Objective-C image
//! info. Every size and offset in the stream is attacker-controlled, so each
//! command body is cut out of the stream with checked arithmetic before any
//! field is read from it.

use tracing::{debug, trace};

use super::constants::*;
use super::file::Slice;
use super::structs::*;
use crate::cursor::{find_nul, Cursor};
use crate::error::{ConflictKind, Error, Result};
use crate::range::{checked_add, checked_mul, Range};
use crate::target::Platform;
use crate::tbd::conflict::{resolve, ConflictPolicy};
use crate::tbd::ParseOptions;

// =============================================================================
// Results
// =============================================================================

/// Contents of `LC_ID_DYLIB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identification<'a> {
    /// Install name
    pub install_name: &'a [u8],
    /// Current version (xxxx.yy.zz packed)
    pub current_version: u32,
    /// Compatibility version (xxxx.yy.zz packed)
    pub compatibility_version: u32,
}

/// Objective-C retain/release model of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjcConstraint {
    /// Reference counted
    RetainRelease,
    /// Reference counted, garbage collection supported
    RetainReleaseOrGc,
    /// Garbage collection required
    Gc,
    /// Reference counted, built for the simulator
    RetainReleaseForSimulator,
}

impl ObjcConstraint {
    /// Derives the constraint from image-info flags.
    pub fn from_flags(flags: u32) -> Self {
        if flags & OBJC_IMAGE_IS_SIMULATED != 0 {
            Self::RetainReleaseForSimulator
        } else if flags & OBJC_IMAGE_REQUIRES_GC != 0 {
            Self::Gc
        } else if flags & OBJC_IMAGE_SUPPORTS_GC != 0 {
            Self::RetainReleaseOrGc
        } else {
            Self::RetainRelease
        }
    }

    /// Name used in stub files.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RetainRelease => "retain_release",
            Self::RetainReleaseOrGc => "retain_release_or_gc",
            Self::Gc => "gc",
            Self::RetainReleaseForSimulator => "retain_release_for_simulator",
        }
    }
}

/// Extracts the swift version byte from image-info flags.
#[inline]
pub fn swift_version_from_flags(flags: u32) -> u32 {
    (flags >> OBJC_IMAGE_SWIFT_VERSION_SHIFT) & OBJC_IMAGE_SWIFT_VERSION_MASK
}

/// Everything collected from one architecture's load commands.
#[derive(Debug, Default)]
pub struct LoadCommands<'a> {
    /// `LC_ID_DYLIB` contents
    pub identification: Option<Identification<'a>>,
    /// `LC_UUID` contents
    pub uuid: Option<[u8; 16]>,
    /// Platforms, at most two (the zippered macOS/Catalyst pair)
    pub platforms: Vec<Platform>,
    /// `LC_SYMTAB` contents
    pub symtab: Option<SymtabCommand>,
    /// Export trie location relative to the slice
    pub exports_trie: Option<Range>,
    /// `LC_REEXPORT_DYLIB` paths
    pub reexports: Vec<&'a [u8]>,
    /// `LC_SUB_CLIENT` names
    pub clients: Vec<&'a [u8]>,
    /// `LC_SUB_FRAMEWORK` umbrella
    pub parent_umbrella: Option<&'a [u8]>,
    /// Raw Objective-C image-info flags
    pub objc_image_info: Option<u32>,
}

// =============================================================================
// Walker
// =============================================================================

/// Walks the load commands of `slice`.
///
/// Duplicate commands that disagree are routed through `policy`; when it
/// continues, the first value is kept.
pub fn parse_load_commands<'a>(
    slice: &Slice<'a>,
    options: ParseOptions,
    policy: &mut dyn ConflictPolicy,
) -> Result<LoadCommands<'a>> {
    let header = &slice.header;
    if !header.is_dylib() && !options.contains(ParseOptions::ALLOW_NON_DYLIB) {
        return Err(Error::UnsupportedFileType(header.header.filetype));
    }

    let ncmds = header.header.ncmds;
    let sizeofcmds = header.header.sizeofcmds;
    if ncmds == 0 {
        return Err(Error::NoLoadCommands);
    }

    let minimum = checked_mul(ncmds as u64, LoadCommand::SIZE as u64)
        .ok_or(Error::LoadCommandsTooSmall { ncmds, sizeofcmds })?;
    if (sizeofcmds as u64) < minimum {
        return Err(Error::LoadCommandsTooSmall { ncmds, sizeofcmds });
    }

    let commands_range = Range::from_offset_size(header.size() as u64, sizeofcmds as u64)
        .filter(|range| slice.local_range().contains(range))
        .ok_or(Error::LoadCommandsOutOfBounds)?;
    let commands = slice
        .bytes(commands_range)
        .ok_or(Error::LoadCommandsOutOfBounds)?;

    let mut walker = Walker {
        slice,
        options,
        policy,
        result: LoadCommands::default(),
    };

    let mut cursor = Cursor::new(commands, header.endian)
        .with_base(slice.range.begin + commands_range.begin);
    let last = ncmds - 1;

    for index in 0..ncmds {
        let start = cursor.position() as u64;
        let command: LoadCommand = cursor
            .read_swapped()
            .map_err(|_| Error::LoadCommandOverflow { index })?;

        if (command.cmdsize as usize) < LoadCommand::SIZE {
            return Err(Error::invalid_load_command(index, "cmdsize smaller than header"));
        }

        let end = checked_add(start, command.cmdsize as u64)
            .filter(|&end| end <= sizeofcmds as u64)
            .ok_or(Error::LoadCommandOverflow { index })?;

        // Only the last command may reach the end of the stream, and it must.
        let exhausted = end == sizeofcmds as u64;
        if exhausted && index != last {
            return Err(Error::invalid_load_command(
                index,
                "command ends the stream before the last command",
            ));
        }
        if !exhausted && index == last {
            return Err(Error::invalid_load_command(
                index,
                "trailing bytes after the last command",
            ));
        }

        let body = &commands[start as usize..end as usize];
        walker.dispatch(index, command.cmd, body)?;
        cursor.seek(end)?;
    }

    walker.finish()
}

struct Walker<'a, 's, 'p> {
    slice: &'s Slice<'a>,
    options: ParseOptions,
    policy: &'p mut dyn ConflictPolicy,
    result: LoadCommands<'a>,
}

impl<'a> Walker<'a, '_, '_> {
    #[inline]
    fn conflict(&mut self, kind: ConflictKind) -> Result<()> {
        resolve(&mut *self.policy, kind, self.slice.arch)
    }

    #[inline]
    fn body_cursor(&self, body: &'a [u8]) -> Cursor<'a> {
        Cursor::new(body, self.slice.header.endian)
    }

    fn dispatch(&mut self, index: u32, cmd: u32, body: &'a [u8]) -> Result<()> {
        match cmd {
            LC_ID_DYLIB => self.id_dylib(index, body),
            LC_UUID => self.uuid(index, body),
            LC_BUILD_VERSION => self.build_version(index, body),
            LC_VERSION_MIN_MACOSX
            | LC_VERSION_MIN_IPHONEOS
            | LC_VERSION_MIN_TVOS
            | LC_VERSION_MIN_WATCHOS => self.version_min(index, cmd, body),
            LC_SYMTAB => self.symtab(index, body),
            LC_DYLD_INFO | LC_DYLD_INFO_ONLY => self.dyld_info(index, body),
            LC_DYLD_EXPORTS_TRIE => self.exports_trie(index, body),
            LC_REEXPORT_DYLIB => {
                let name = self.dylib_name(index, body).map_err(|_| Error::InvalidReexport { index })?;
                self.result.reexports.push(name);
                Ok(())
            }
            LC_SUB_CLIENT => {
                let name = self.sub_string(index, body).map_err(|_| Error::InvalidClient { index })?;
                self.result.clients.push(name);
                Ok(())
            }
            LC_SUB_FRAMEWORK => self.sub_framework(index, body),
            LC_SEGMENT if self.options.needs_objc_info() => self.segment(index, body, false),
            LC_SEGMENT_64 if self.options.needs_objc_info() => self.segment(index, body, true),
            _ => {
                trace!("Skipping load command {:#x} at index {}", cmd, index);
                Ok(())
            }
        }
    }

    fn require_size(index: u32, body: &[u8], size: usize) -> Result<()> {
        if body.len() < size {
            return Err(Error::invalid_load_command(index, "cmdsize too small for command"));
        }
        Ok(())
    }

    fn id_dylib(&mut self, index: u32, body: &'a [u8]) -> Result<()> {
        let install_name = self
            .dylib_name(index, body)
            .map_err(|_| Error::InvalidInstallName { index })?;
        let command: DylibCommand = self.body_cursor(body).read_swapped()?;
        let id = Identification {
            install_name,
            current_version: command.dylib.current_version,
            compatibility_version: command.dylib.compatibility_version,
        };

        match self.result.identification {
            None => self.result.identification = Some(id),
            Some(existing) => {
                if existing.install_name != id.install_name {
                    self.conflict(ConflictKind::InstallName)?;
                }
                if existing.current_version != id.current_version {
                    self.conflict(ConflictKind::CurrentVersion)?;
                }
                if existing.compatibility_version != id.compatibility_version {
                    self.conflict(ConflictKind::CompatibilityVersion)?;
                }
            }
        }
        Ok(())
    }

    /// Reads the path string of a dylib-shaped command.
    fn dylib_name(&self, index: u32, body: &'a [u8]) -> Result<&'a [u8]> {
        Self::require_size(index, body, DylibCommand::SIZE)?;
        let command: DylibCommand = self.body_cursor(body).read_swapped()?;
        lc_str(body, command.dylib.name_offset, DylibCommand::SIZE)
            .ok_or(Error::invalid_load_command(index, "bad string offset"))
    }

    /// Reads the string of a sub-client or sub-framework command.
    fn sub_string(&self, index: u32, body: &'a [u8]) -> Result<&'a [u8]> {
        Self::require_size(index, body, SubCommand::SIZE)?;
        let command: SubCommand = self.body_cursor(body).read_swapped()?;
        lc_str(body, command.offset, SubCommand::SIZE)
            .ok_or(Error::invalid_load_command(index, "bad string offset"))
    }

    fn sub_framework(&mut self, index: u32, body: &'a [u8]) -> Result<()> {
        let umbrella = self
            .sub_string(index, body)
            .map_err(|_| Error::InvalidParentUmbrella { index })?;
        match self.result.parent_umbrella {
            None => self.result.parent_umbrella = Some(umbrella),
            Some(existing) if existing != umbrella => {
                self.conflict(ConflictKind::ParentUmbrella)?;
            }
            Some(_) => {}
        }
        Ok(())
    }

    fn uuid(&mut self, index: u32, body: &'a [u8]) -> Result<()> {
        Self::require_size(index, body, UuidCommand::SIZE)?;
        let command: UuidCommand = self.body_cursor(body).read_swapped()?;
        match self.result.uuid {
            None => self.result.uuid = Some(command.uuid),
            Some(existing) if existing != command.uuid => self.conflict(ConflictKind::Uuid)?,
            Some(_) => {}
        }
        Ok(())
    }

    fn build_version(&mut self, index: u32, body: &'a [u8]) -> Result<()> {
        Self::require_size(index, body, BuildVersionCommand::SIZE)?;
        let command: BuildVersionCommand = self.body_cursor(body).read_swapped()?;
        let platform = Platform::from_raw(command.platform)?;
        self.add_platform(platform)
    }

    fn version_min(&mut self, index: u32, cmd: u32, body: &'a [u8]) -> Result<()> {
        Self::require_size(index, body, VersionMinCommand::SIZE)?;

        // Older simulator builds only carry the device version-min command.
        let simulator = matches!(self.slice.arch.cputype, CPU_TYPE_X86 | CPU_TYPE_X86_64);
        let platform = match (cmd, simulator) {
            (LC_VERSION_MIN_MACOSX, _) => Platform::MacOs,
            (LC_VERSION_MIN_IPHONEOS, false) => Platform::IOs,
            (LC_VERSION_MIN_IPHONEOS, true) => Platform::IOsSimulator,
            (LC_VERSION_MIN_TVOS, false) => Platform::TvOs,
            (LC_VERSION_MIN_TVOS, true) => Platform::TvOsSimulator,
            (LC_VERSION_MIN_WATCHOS, false) => Platform::WatchOs,
            _ => Platform::WatchOsSimulator,
        };
        self.add_platform(platform)
    }

    fn add_platform(&mut self, platform: Platform) -> Result<()> {
        if self.result.platforms.contains(&platform) {
            return Ok(());
        }

        let accepted = match self.result.platforms.as_slice() {
            [] => true,
            [first] => Platform::is_zippered_pair(*first, platform),
            _ => false,
        };
        if accepted {
            self.result.platforms.push(platform);
        } else {
            self.conflict(ConflictKind::Platform)?;
        }
        Ok(())
    }

    fn symtab(&mut self, index: u32, body: &'a [u8]) -> Result<()> {
        Self::require_size(index, body, SymtabCommand::SIZE)?;
        let command: SymtabCommand = self.body_cursor(body).read_swapped()?;
        if let Some(existing) = &self.result.symtab {
            if (existing.symoff, existing.nsyms, existing.stroff, existing.strsize)
                != (command.symoff, command.nsyms, command.stroff, command.strsize)
            {
                return Err(Error::invalid_load_command(index, "multiple differing LC_SYMTAB"));
            }
            return Ok(());
        }
        self.result.symtab = Some(command);
        Ok(())
    }

    fn dyld_info(&mut self, index: u32, body: &'a [u8]) -> Result<()> {
        Self::require_size(index, body, DyldInfoCommand::SIZE)?;
        let command: DyldInfoCommand = self.body_cursor(body).read_swapped()?;
        self.set_exports_trie(index, command.export_off, command.export_size)
    }

    fn exports_trie(&mut self, index: u32, body: &'a [u8]) -> Result<()> {
        Self::require_size(index, body, LinkeditDataCommand::SIZE)?;
        let command: LinkeditDataCommand = self.body_cursor(body).read_swapped()?;
        self.set_exports_trie(index, command.dataoff, command.datasize)
    }

    fn set_exports_trie(&mut self, index: u32, offset: u32, size: u32) -> Result<()> {
        if size == 0 {
            return Ok(());
        }

        let range = Range::from_offset_size(offset as u64, size as u64)
            .ok_or(Error::invalid_load_command(index, "export trie range overflows"))?;
        match self.result.exports_trie {
            None => self.result.exports_trie = Some(range),
            Some(existing) if existing != range => {
                return Err(Error::invalid_load_command(index, "multiple differing export tries"));
            }
            Some(_) => {}
        }
        Ok(())
    }

    fn segment(&mut self, index: u32, body: &'a [u8], is_64: bool) -> Result<()> {
        let mut cursor = self.body_cursor(body);
        let (nsects, segment_size, section_size) = if is_64 {
            Self::require_size(index, body, SegmentCommand64::SIZE)?;
            let segment: SegmentCommand64 = cursor.read_swapped()?;
            (segment.nsects, SegmentCommand64::SIZE, Section64::SIZE)
        } else {
            Self::require_size(index, body, SegmentCommand::SIZE)?;
            let segment: SegmentCommand = cursor.read_swapped()?;
            (segment.nsects, SegmentCommand::SIZE, Section::SIZE)
        };

        checked_mul(nsects as u64, section_size as u64)
            .and_then(|size| checked_add(size, segment_size as u64))
            .filter(|&needed| needed <= body.len() as u64)
            .ok_or(Error::invalid_load_command(index, "sections extend past cmdsize"))?;

        for _ in 0..nsects {
            let (segname, sectname, offset, size) = if is_64 {
                let section: Section64 = cursor.read_swapped()?;
                (section.segname, section.sectname, section.offset, section.size)
            } else {
                let section: Section = cursor.read_swapped()?;
                (section.segname, section.sectname, section.offset, section.size as u64)
            };

            if is_objc_image_info(fixed_name(&segname), fixed_name(&sectname)) {
                self.objc_image_info(index, offset, size)?;
            }
        }
        Ok(())
    }

    fn objc_image_info(&mut self, index: u32, offset: u32, size: u64) -> Result<()> {
        if size < ObjcImageInfo::SIZE as u64 {
            return Err(Error::InvalidObjcImageInfo);
        }

        let range = Range::from_offset_size(offset as u64, ObjcImageInfo::SIZE as u64)
            .filter(|range| self.slice.local_range().contains(range))
            .ok_or(Error::InvalidSection { index })?;

        let mut cursor = self.slice.cursor();
        cursor.seek(range.begin)?;
        let info: ObjcImageInfo = cursor.read_swapped()?;
        debug!("Found objc image info flags {:#x}", info.flags);

        match self.result.objc_image_info {
            None => self.result.objc_image_info = Some(info.flags),
            Some(existing) => {
                if ObjcConstraint::from_flags(existing) != ObjcConstraint::from_flags(info.flags) {
                    self.conflict(ConflictKind::ObjcConstraint)?;
                }
                if swift_version_from_flags(existing) != swift_version_from_flags(info.flags) {
                    self.conflict(ConflictKind::SwiftVersion)?;
                }
            }
        }
        Ok(())
    }

    fn finish(self) -> Result<LoadCommands<'a>> {
        let arch = self.slice.arch.name;
        let result = self.result;

        if self.slice.header.is_dylib() && result.identification.is_none() {
            return Err(Error::MissingIdentification);
        }
        if result.uuid.is_none() && !self.options.contains(ParseOptions::IGNORE_MISSING_UUIDS) {
            return Err(Error::MissingUuid { arch });
        }
        if result.platforms.is_empty()
            && !self.options.contains(ParseOptions::IGNORE_MISSING_PLATFORM)
        {
            return Err(Error::MissingPlatform { arch });
        }

        debug!(
            "{}: {} reexport(s), {} client(s), symtab: {}, trie: {}",
            arch,
            result.reexports.len(),
            result.clients.len(),
            result.symtab.is_some(),
            result.exports_trie.is_some()
        );
        Ok(result)
    }
}

/// Returns true for the sections that hold Objective-C image info.
fn is_objc_image_info(segname: &[u8], sectname: &[u8]) -> bool {
    match segname {
        b"__DATA" | b"__DATA_CONST" | b"__DATA_DIRTY" => sectname == b"__objc_imageinfo",
        b"__OBJC" => sectname == b"__image_info",
        _ => false,
    }
}

/// Locates a NUL-terminated string inside a command body.
///
/// The offset must point past the fixed part of the command and the string
/// must end before the command does. Empty strings are rejected.
pub fn lc_str(body: &[u8], offset: u32, fixed_size: usize) -> Option<&[u8]> {
    let offset = offset as usize;
    if offset < fixed_size || offset >= body.len() {
        return None;
    }

    let tail = &body[offset..];
    let len = find_nul(tail)?;
    (len != 0).then(|| &tail[..len])
}
