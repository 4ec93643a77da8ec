//! Building a [`CreateInfo`] from a Mach-O file.
//!
//! Architectures are parsed one after another: load commands first, then the
//! export trie or symbol table. Every value an architecture contributes is
//! merged into the shared description before the next one starts.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use super::conflict::ConflictPolicy;
use super::create_info::{CreateInfo, MetaType, MetadataKind, SymbolType, TbdFlags};
use super::options::{ParseOptions, TbdVersion};
use crate::error::{Error, Result};
use crate::macho::{
    classify_name, parse_load_commands, parse_symbol_table, swift_version_from_flags,
    ExportKind, ExportTrieParser, LoadCommands, MachOFile, ObjcConstraint, Slice, SymbolFilter,
};

/// One parse of one file.
pub struct ParseSession<'p, 'c> {
    options: ParseOptions,
    version: TbdVersion,
    policy: &'p mut dyn ConflictPolicy,
    cancel: Option<&'c AtomicBool>,
}

impl<'p, 'c> ParseSession<'p, 'c> {
    /// Creates a session with default options that reports conflicts to `policy`.
    pub fn new(policy: &'p mut dyn ConflictPolicy) -> Self {
        Self {
            options: ParseOptions::empty(),
            version: TbdVersion::default(),
            policy,
            cancel: None,
        }
    }

    /// Sets the parse options.
    pub fn with_options(mut self, options: ParseOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the dialect symbols are classified for.
    pub fn with_version(mut self, version: TbdVersion) -> Self {
        self.version = version;
        self
    }

    /// Stops the parse with [`Error::Cancelled`] once `flag` is set.
    pub fn with_cancel(mut self, flag: Option<&'c AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    fn check_cancelled(&self) -> Result<()> {
        match self.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(Error::Cancelled),
            _ => Ok(()),
        }
    }

    /// Parses every architecture of `data`.
    pub fn parse(&mut self, data: &[u8]) -> Result<CreateInfo> {
        let file = MachOFile::parse(data)?;
        let mut info = CreateInfo::new(self.version, self.options, file.slices.len());
        info.targets.reserve(file.slices.len())?;

        for slice in &file.slices {
            self.check_cancelled()?;
            debug!(
                "Parsing {} slice at {:#x} ({} bytes)",
                slice.arch.name,
                slice.range.begin,
                slice.range.size()
            );
            self.parse_slice(&mut info, slice)?;
        }

        if self.options.contains(ParseOptions::ENFORCE_HAS_EXPORTS) && !info.has_exports() {
            return Err(Error::NoExports);
        }

        debug!(
            "Collected {} symbols and {} metadata strings from {} architectures",
            info.symbols.len(),
            info.metadata.len(),
            info.targets.len()
        );
        Ok(info)
    }

    fn parse_slice(&mut self, info: &mut CreateInfo, slice: &Slice<'_>) -> Result<()> {
        let arch = slice.arch;
        let commands = parse_load_commands(slice, self.options, &mut *self.policy)?;

        info.set_platforms(&commands.platforms, &mut *self.policy, arch)?;
        let Some(index) = info.add_architecture(arch, &mut *self.policy)? else {
            debug!("Skipping duplicate {} slice", arch.name);
            return Ok(());
        };

        if let Some(uuid) = commands.uuid {
            info.add_uuid(index, uuid, &mut *self.policy)?;
        }
        info.set_flags(
            TbdFlags::from_header(slice.header.flags()),
            &mut *self.policy,
            arch,
        )?;

        if let Some(id) = &commands.identification {
            info.set_install_name(id.install_name, &mut *self.policy, arch)?;
            info.set_current_version(id.current_version, &mut *self.policy, arch)?;
            info.set_compatibility_version(id.compatibility_version, &mut *self.policy, arch)?;
        }

        if let Some(flags) = commands.objc_image_info {
            if !self.options.contains(ParseOptions::IGNORE_OBJC_CONSTRAINT) {
                info.set_objc_constraint(ObjcConstraint::from_flags(flags), &mut *self.policy, arch)?;
            }
            if !self.options.contains(ParseOptions::IGNORE_SWIFT_VERSION) {
                let swift = swift_version_from_flags(flags);
                if swift != 0 {
                    info.set_swift_version(swift, &mut *self.policy, arch)?;
                }
            }
        }

        if let Some(umbrella) = commands.parent_umbrella {
            info.add_parent_umbrella(umbrella, index, &mut *self.policy, arch)?;
        }
        for client in &commands.clients {
            info.add_metadata(client, MetadataKind::Client, index)?;
        }
        for reexport in &commands.reexports {
            info.add_metadata(reexport, MetadataKind::Reexport, index)?;
        }

        self.parse_symbols(info, slice, &commands, index)
    }

    fn parse_symbols(
        &self,
        info: &mut CreateInfo,
        slice: &Slice<'_>,
        commands: &LoadCommands<'_>,
        index: usize,
    ) -> Result<()> {
        let wants_exports = !self.options.contains(ParseOptions::IGNORE_EXPORTS);
        let wants_undefineds = !self.options.contains(ParseOptions::IGNORE_UNDEFINEDS);

        if wants_exports && commands.symtab.is_none() && commands.exports_trie.is_none() {
            return Err(Error::NoSymbolTable);
        }

        // USE_SYMBOL_TABLE only applies when there is a symbol table to use.
        let prefer_symtab =
            self.options.contains(ParseOptions::USE_SYMBOL_TABLE) && commands.symtab.is_some();
        let trie = commands
            .exports_trie
            .filter(|_| wants_exports && !prefer_symtab);

        if let Some(range) = trie {
            let base = slice.range.begin + range.begin;
            let data = slice.bytes(range).ok_or(Error::invalid_trie(base))?;
            debug!("Decoding {} byte export trie", data.len());

            let version = self.version;
            ExportTrieParser::new(data, base)
                .with_cancel(self.cancel)
                .parse(|name, flags| {
                    let (kind, name) = match ExportKind::from_flags(flags) {
                        ExportKind::Weak => (SymbolType::Weak, name),
                        ExportKind::ThreadLocal => {
                            classify_name(name, version, SymbolType::ThreadLocal)
                        }
                        ExportKind::Normal => classify_name(name, version, SymbolType::Normal),
                    };
                    info.add_symbol(name, kind, MetaType::Export, index)
                })?;
        }

        let filter = SymbolFilter {
            exports: wants_exports && trie.is_none(),
            undefineds: wants_undefineds,
        };
        if let Some(symtab) = &commands.symtab {
            if filter.exports || filter.undefineds {
                parse_symbol_table(slice, symtab, self.version, self.options, filter, |symbol| {
                    info.add_symbol(symbol.name, symbol.kind, symbol.meta, index)
                })?;
            }
        }

        Ok(())
    }
}
