//! Synthetic Mach-O images for tests.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use super::constants::*;
use crate::cursor::write_uleb128;

// =============================================================================
// Export Trie Encoding
// =============================================================================

/// A trie node to encode.
#[derive(Debug, Clone, Default)]
pub struct TrieNode {
    /// Terminal payload (flags and address), if the node is an export
    pub terminal: Option<Vec<u8>>,
    /// Outgoing edges
    pub children: Vec<(Vec<u8>, TrieNode)>,
}

impl TrieNode {
    /// A terminal node without children.
    pub fn leaf(payload: Vec<u8>) -> Self {
        Self {
            terminal: Some(payload),
            children: Vec::new(),
        }
    }

    /// Adds an edge.
    pub fn child(mut self, label: &str, node: TrieNode) -> Self {
        self.children.push((label.as_bytes().to_vec(), node));
        self
    }

    fn encoded_size(&self) -> usize {
        let terminal = self.terminal.as_deref().unwrap_or_default();
        let mut size_prefix = Vec::new();
        write_uleb128(terminal.len() as u64, &mut size_prefix);
        let edges: usize = self
            .children
            .iter()
            .map(|(label, _)| label.len() + 1 + OFFSET_WIDTH)
            .sum();
        size_prefix.len() + terminal.len() + 1 + edges
    }
}

// Child offsets are written as fixed-width ULEB128 so node sizes do not
// depend on where their children land.
const OFFSET_WIDTH: usize = 4;

fn write_padded_uleb(value: u64, out: &mut Vec<u8>) {
    assert!(value < 1 << 28);
    for i in 0..OFFSET_WIDTH {
        let mut byte = ((value >> (7 * i)) & 0x7F) as u8;
        if i + 1 < OFFSET_WIDTH {
            byte |= 0x80;
        }
        out.push(byte);
    }
}

/// Encodes a trie in preorder.
pub fn encode_trie(root: &TrieNode) -> Vec<u8> {
    fn assign<'n>(node: &'n TrieNode, next: &mut usize, order: &mut Vec<(&'n TrieNode, usize)>) {
        order.push((node, *next));
        *next += node.encoded_size();
        for (_, child) in &node.children {
            assign(child, next, order);
        }
    }

    let mut order = Vec::new();
    let mut next = 0;
    assign(root, &mut next, &mut order);

    let offset_of = |target: &TrieNode| {
        order
            .iter()
            .find(|(node, _)| std::ptr::eq(*node, target))
            .map(|(_, offset)| *offset)
            .unwrap()
    };

    let mut out = Vec::new();
    for (node, offset) in &order {
        assert_eq!(out.len(), *offset);
        let terminal = node.terminal.as_deref().unwrap_or_default();
        write_uleb128(terminal.len() as u64, &mut out);
        out.extend_from_slice(terminal);
        out.push(node.children.len() as u8);
        for (label, child) in &node.children {
            out.extend_from_slice(label);
            out.push(0);
            write_padded_uleb(offset_of(child) as u64, &mut out);
        }
    }
    out
}

/// Terminal payload of a regular export.
pub fn terminal(flags: u64, address: u64) -> Vec<u8> {
    let mut out = Vec::new();
    write_uleb128(flags, &mut out);
    write_uleb128(address, &mut out);
    out
}

/// Terminal payload of a re-export.
pub fn reexport_terminal(flags: u64, ordinal: u64, import_name: &str) -> Vec<u8> {
    let mut out = Vec::new();
    write_uleb128(flags, &mut out);
    write_uleb128(ordinal, &mut out);
    out.extend_from_slice(import_name.as_bytes());
    out.push(0);
    out
}

/// A trie whose root links directly to one leaf per export.
pub fn flat_trie(exports: &[(&str, u64)]) -> Vec<u8> {
    let root = exports.iter().fold(TrieNode::default(), |root, (name, flags)| {
        root.child(name, TrieNode::leaf(terminal(*flags, 0x1000)))
    });
    encode_trie(&root)
}

// =============================================================================
// Image Builder
// =============================================================================

struct RawSymbol {
    name: Option<String>,
    strx: u32,
    n_type: u8,
    n_desc: u16,
    n_value: u64,
}

/// Builds a single-architecture Mach-O image.
pub struct DylibBuilder {
    cputype: u32,
    cpusubtype: u32,
    is_64: bool,
    big_endian: bool,
    filetype: u32,
    flags: u32,
    install_name: Option<String>,
    extra_id: Option<String>,
    current_version: u32,
    compatibility_version: u32,
    uuid: Option<[u8; 16]>,
    platforms: Vec<u32>,
    version_min: Option<u32>,
    reexports: Vec<String>,
    clients: Vec<String>,
    parent_umbrella: Option<String>,
    symbols: Vec<RawSymbol>,
    trie: Option<Vec<u8>>,
    exports_trie_command: bool,
    symtab: bool,
    objc_flags: Option<u32>,
}

impl DylibBuilder {
    /// A 64-bit little-endian macOS dylib with a UUID derived from the cpu type.
    pub fn new(cputype: u32, cpusubtype: u32) -> Self {
        let mut uuid = [0x11u8; 16];
        uuid[..4].copy_from_slice(&cputype.to_be_bytes());
        uuid[4..8].copy_from_slice(&cpusubtype.to_be_bytes());

        Self {
            cputype,
            cpusubtype,
            is_64: true,
            big_endian: false,
            filetype: MH_DYLIB,
            flags: (MachOFlags::TWOLEVEL | MachOFlags::APP_EXTENSION_SAFE).bits(),
            install_name: Some("/usr/lib/libtest.dylib".into()),
            extra_id: None,
            current_version: 0x0001_0000,
            compatibility_version: 0x0001_0000,
            uuid: Some(uuid),
            platforms: vec![PLATFORM_MACOS],
            version_min: None,
            reexports: Vec::new(),
            clients: Vec::new(),
            parent_umbrella: None,
            symbols: Vec::new(),
            trie: None,
            exports_trie_command: false,
            symtab: true,
            objc_flags: None,
        }
    }

    pub fn thirty_two_bit(mut self) -> Self {
        self.is_64 = false;
        self
    }

    pub fn big_endian(mut self) -> Self {
        self.big_endian = true;
        self
    }

    pub fn filetype(mut self, filetype: u32) -> Self {
        self.filetype = filetype;
        self
    }

    pub fn flags(mut self, flags: MachOFlags) -> Self {
        self.flags = flags.bits();
        self
    }

    pub fn install_name(mut self, name: &str) -> Self {
        self.install_name = Some(name.into());
        self
    }

    pub fn no_install_name(mut self) -> Self {
        self.install_name = None;
        self
    }

    /// Adds a second `LC_ID_DYLIB` with the same versions.
    pub fn extra_id_dylib(mut self, name: &str) -> Self {
        self.extra_id = Some(name.into());
        self
    }

    pub fn versions(mut self, current: u32, compatibility: u32) -> Self {
        self.current_version = current;
        self.compatibility_version = compatibility;
        self
    }

    pub fn uuid(mut self, uuid: [u8; 16]) -> Self {
        self.uuid = Some(uuid);
        self
    }

    pub fn no_uuid(mut self) -> Self {
        self.uuid = None;
        self
    }

    /// Replaces the `LC_BUILD_VERSION` platforms.
    pub fn platforms(mut self, platforms: &[u32]) -> Self {
        self.platforms = platforms.to_vec();
        self
    }

    /// Uses an `LC_VERSION_MIN_*` command instead of `LC_BUILD_VERSION`.
    pub fn version_min(mut self, cmd: u32) -> Self {
        self.platforms.clear();
        self.version_min = Some(cmd);
        self
    }

    pub fn reexport(mut self, path: &str) -> Self {
        self.reexports.push(path.into());
        self
    }

    pub fn client(mut self, name: &str) -> Self {
        self.clients.push(name.into());
        self
    }

    pub fn parent_umbrella(mut self, name: &str) -> Self {
        self.parent_umbrella = Some(name.into());
        self
    }

    pub fn symbol(self, name: &str, n_type: u8, n_desc: u16) -> Self {
        self.symbol_with_value(name, n_type, n_desc, 0x1000)
    }

    /// Adds a symbol. Undefined symbols get a zero value unless given one here.
    pub fn symbol_with_value(mut self, name: &str, n_type: u8, n_desc: u16, value: u64) -> Self {
        let n_value = if n_type & N_TYPE == N_UNDF && value == 0x1000 {
            0
        } else {
            value
        };
        self.symbols.push(RawSymbol {
            name: Some(name.into()),
            strx: 0,
            n_type,
            n_desc,
            n_value,
        });
        self
    }

    /// Adds a symbol with an explicit string index.
    pub fn raw_symbol(mut self, strx: u32, n_type: u8, n_desc: u16, n_value: u64) -> Self {
        self.symbols.push(RawSymbol {
            name: None,
            strx,
            n_type,
            n_desc,
            n_value,
        });
        self
    }

    pub fn trie(mut self, trie: Vec<u8>) -> Self {
        self.trie = Some(trie);
        self
    }

    /// Locates the trie with `LC_DYLD_EXPORTS_TRIE` instead of `LC_DYLD_INFO_ONLY`.
    pub fn exports_trie_command(mut self) -> Self {
        self.exports_trie_command = true;
        self
    }

    /// Leaves out `LC_SYMTAB`; the tables are still laid out.
    pub fn no_symtab(mut self) -> Self {
        self.symtab = false;
        self
    }

    pub fn objc_flags(mut self, flags: u32) -> Self {
        self.objc_flags = Some(flags);
        self
    }

    fn put_u16(&self, out: &mut Vec<u8>, value: u16) {
        let mut buf = [0u8; 2];
        if self.big_endian {
            BigEndian::write_u16(&mut buf, value);
        } else {
            LittleEndian::write_u16(&mut buf, value);
        }
        out.extend_from_slice(&buf);
    }

    fn put_u32(&self, out: &mut Vec<u8>, value: u32) {
        let mut buf = [0u8; 4];
        if self.big_endian {
            BigEndian::write_u32(&mut buf, value);
        } else {
            LittleEndian::write_u32(&mut buf, value);
        }
        out.extend_from_slice(&buf);
    }

    fn put_u64(&self, out: &mut Vec<u8>, value: u64) {
        let mut buf = [0u8; 8];
        if self.big_endian {
            BigEndian::write_u64(&mut buf, value);
        } else {
            LittleEndian::write_u64(&mut buf, value);
        }
        out.extend_from_slice(&buf);
    }

    /// Pointer-sized field.
    fn put_word(&self, out: &mut Vec<u8>, value: u64) {
        if self.is_64 {
            self.put_u64(out, value);
        } else {
            self.put_u32(out, value as u32);
        }
    }

    fn align(&self) -> usize {
        if self.is_64 {
            8
        } else {
            4
        }
    }

    fn padded(&self, len: usize) -> usize {
        len.next_multiple_of(self.align())
    }

    fn string_command(&self, cmd: u32, fixed: &[u32], name: &str) -> Vec<u8> {
        let fixed_size = 8 + 4 * (fixed.len() + 1);
        let cmdsize = self.padded(fixed_size + name.len() + 1);
        let mut out = Vec::new();
        self.put_u32(&mut out, cmd);
        self.put_u32(&mut out, cmdsize as u32);
        self.put_u32(&mut out, fixed_size as u32);
        for value in fixed {
            self.put_u32(&mut out, *value);
        }
        out.extend_from_slice(name.as_bytes());
        out.resize(cmdsize, 0);
        out
    }

    fn dylib_command(&self, cmd: u32, name: &str) -> Vec<u8> {
        // timestamp, current version, compatibility version
        self.string_command(
            cmd,
            &[2, self.current_version, self.compatibility_version],
            name,
        )
    }

    fn string_table(&self) -> (Vec<u8>, Vec<u32>) {
        let mut strings = vec![b' ', 0];
        let mut indexes = Vec::new();
        for symbol in &self.symbols {
            match &symbol.name {
                Some(name) => {
                    indexes.push(strings.len() as u32);
                    strings.extend_from_slice(name.as_bytes());
                    strings.push(0);
                }
                None => indexes.push(symbol.strx),
            }
        }
        strings.resize(strings.len().next_multiple_of(8), 0);
        (strings, indexes)
    }

    fn commands(&self, linkedit: usize) -> Vec<Vec<u8>> {
        let nlist_size = if self.is_64 { 16 } else { 12 };
        let (strings, _) = self.string_table();

        let objc_offset = linkedit;
        let symoff = objc_offset + if self.objc_flags.is_some() { 8 } else { 0 };
        let stroff = symoff + self.symbols.len() * nlist_size;
        let trie_offset = stroff + strings.len();

        let mut commands = Vec::new();

        if self.objc_flags.is_some() {
            let (cmd, segment_size, section_size) = if self.is_64 {
                (LC_SEGMENT_64, 72, 80)
            } else {
                (LC_SEGMENT, 56, 68)
            };
            let mut out = Vec::new();
            self.put_u32(&mut out, cmd);
            self.put_u32(&mut out, (segment_size + section_size) as u32);
            out.extend_from_slice(&fixed16("__DATA"));
            self.put_word(&mut out, 0x4000); // vmaddr
            self.put_word(&mut out, 0x1000); // vmsize
            self.put_word(&mut out, objc_offset as u64); // fileoff
            self.put_word(&mut out, 8); // filesize
            self.put_u32(&mut out, 3);
            self.put_u32(&mut out, 3);
            self.put_u32(&mut out, 1); // nsects
            self.put_u32(&mut out, 0);

            out.extend_from_slice(&fixed16("__objc_imageinfo"));
            out.extend_from_slice(&fixed16("__DATA"));
            self.put_word(&mut out, 0x4000); // addr
            self.put_word(&mut out, 8); // size
            self.put_u32(&mut out, objc_offset as u32);
            for _ in 0..(if self.is_64 { 7 } else { 6 }) {
                self.put_u32(&mut out, 0);
            }
            assert_eq!(out.len(), segment_size + section_size);
            commands.push(out);
        }

        if let Some(name) = &self.install_name {
            commands.push(self.dylib_command(LC_ID_DYLIB, name));
        }
        if let Some(name) = &self.extra_id {
            commands.push(self.dylib_command(LC_ID_DYLIB, name));
        }

        if let Some(uuid) = self.uuid {
            let mut out = Vec::new();
            self.put_u32(&mut out, LC_UUID);
            self.put_u32(&mut out, 24);
            out.extend_from_slice(&uuid);
            commands.push(out);
        }

        for platform in &self.platforms {
            let mut out = Vec::new();
            self.put_u32(&mut out, LC_BUILD_VERSION);
            self.put_u32(&mut out, 24);
            self.put_u32(&mut out, *platform);
            self.put_u32(&mut out, 0x000B_0000);
            self.put_u32(&mut out, 0x000B_0000);
            self.put_u32(&mut out, 0);
            commands.push(out);
        }

        if let Some(cmd) = self.version_min {
            let mut out = Vec::new();
            self.put_u32(&mut out, cmd);
            self.put_u32(&mut out, 16);
            self.put_u32(&mut out, 0x000A_0000);
            self.put_u32(&mut out, 0x000A_0000);
            commands.push(out);
        }

        for path in &self.reexports {
            commands.push(self.dylib_command(LC_REEXPORT_DYLIB, path));
        }
        for client in &self.clients {
            commands.push(self.string_command(LC_SUB_CLIENT, &[], client));
        }
        if let Some(umbrella) = &self.parent_umbrella {
            commands.push(self.string_command(LC_SUB_FRAMEWORK, &[], umbrella));
        }

        if self.symtab {
            let mut symtab = Vec::new();
            self.put_u32(&mut symtab, LC_SYMTAB);
            self.put_u32(&mut symtab, 24);
            self.put_u32(&mut symtab, symoff as u32);
            self.put_u32(&mut symtab, self.symbols.len() as u32);
            self.put_u32(&mut symtab, stroff as u32);
            self.put_u32(&mut symtab, strings.len() as u32);
            commands.push(symtab);
        }

        if let Some(trie) = &self.trie {
            let mut out = Vec::new();
            if self.exports_trie_command {
                self.put_u32(&mut out, LC_DYLD_EXPORTS_TRIE);
                self.put_u32(&mut out, 16);
                self.put_u32(&mut out, trie_offset as u32);
                self.put_u32(&mut out, trie.len() as u32);
            } else {
                self.put_u32(&mut out, LC_DYLD_INFO_ONLY);
                self.put_u32(&mut out, 48);
                for _ in 0..8 {
                    self.put_u32(&mut out, 0);
                }
                self.put_u32(&mut out, trie_offset as u32);
                self.put_u32(&mut out, trie.len() as u32);
            }
            commands.push(out);
        }

        commands
    }

    /// Assembles the image.
    pub fn build(&self) -> Vec<u8> {
        let header_size = if self.is_64 { 32 } else { 28 };

        // Command sizes do not depend on the linkedit offset.
        let sizeofcmds: usize = self.commands(0).iter().map(Vec::len).sum();
        let linkedit = (header_size + sizeofcmds).next_multiple_of(16);
        let commands = self.commands(linkedit);

        let mut out = Vec::new();
        let magic = if self.is_64 { MH_MAGIC_64 } else { MH_MAGIC };
        self.put_u32(&mut out, magic);
        self.put_u32(&mut out, self.cputype);
        self.put_u32(&mut out, self.cpusubtype);
        self.put_u32(&mut out, self.filetype);
        self.put_u32(&mut out, commands.len() as u32);
        self.put_u32(&mut out, sizeofcmds as u32);
        self.put_u32(&mut out, self.flags);
        if self.is_64 {
            self.put_u32(&mut out, 0);
        }
        for command in &commands {
            out.extend_from_slice(command);
        }
        out.resize(linkedit, 0);

        if let Some(flags) = self.objc_flags {
            self.put_u32(&mut out, 0);
            self.put_u32(&mut out, flags);
        }

        let (strings, indexes) = self.string_table();
        for (symbol, strx) in self.symbols.iter().zip(indexes) {
            self.put_u32(&mut out, strx);
            out.push(symbol.n_type);
            out.push(if symbol.n_type & N_TYPE == N_SECT { 1 } else { 0 });
            self.put_u16(&mut out, symbol.n_desc);
            self.put_word(&mut out, symbol.n_value);
        }
        out.extend_from_slice(&strings);

        if let Some(trie) = &self.trie {
            out.extend_from_slice(trie);
        }
        out.resize(out.len().next_multiple_of(8), 0);
        out
    }
}

fn fixed16(name: &str) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[..name.len()].copy_from_slice(name.as_bytes());
    out
}

/// Wraps thin images in a fat header.
pub fn fat(slices: &[&[u8]], is_64: bool) -> Vec<u8> {
    let entry_size = if is_64 { 32 } else { 20 };
    let table_end = 8 + slices.len() * entry_size;

    let mut offsets = Vec::new();
    let mut next = table_end.next_multiple_of(64);
    for slice in slices {
        offsets.push(next);
        next = (next + slice.len()).next_multiple_of(64);
    }

    let mut out = Vec::new();
    let mut word = [0u8; 4];
    let mut put = |out: &mut Vec<u8>, value: u32| {
        BigEndian::write_u32(&mut word, value);
        out.extend_from_slice(&word);
    };

    put(&mut out, if is_64 { FAT_MAGIC_64 } else { FAT_MAGIC });
    put(&mut out, slices.len() as u32);
    for (slice, offset) in slices.iter().zip(&offsets) {
        // The slice header is little-endian in every test image that gets wrapped.
        put(&mut out, LittleEndian::read_u32(&slice[4..8]));
        put(&mut out, LittleEndian::read_u32(&slice[8..12]));
        if is_64 {
            put(&mut out, 0);
            put(&mut out, *offset as u32);
            put(&mut out, 0);
            put(&mut out, slice.len() as u32);
            put(&mut out, 6);
            put(&mut out, 0);
        } else {
            put(&mut out, *offset as u32);
            put(&mut out, slice.len() as u32);
            put(&mut out, 6);
        }
    }

    for (slice, offset) in slices.iter().zip(&offsets) {
        out.resize(*offset, 0);
        out.extend_from_slice(slice);
    }
    out
}
