//! Source span tracking for frontend-reported synthesis errors.

use std::{mem, sync};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
/// Handle to a span in a [PositionTable].
pub struct PosIdx(u32);

#[derive(Clone, Copy, PartialEq, Eq)]
/// Handle to a file in a [PositionTable].
pub struct FileIdx(u32);

/// A registered source file.
struct File {
    name: String,
    source: String,
}

struct Span {
    file: FileIdx,
    start: usize,
    end: usize,
}

/// Spans of the source program a module body was built from. The frontend
/// registers files and spans while constructing the IR; error reporting
/// resolves them back to `file:line`.
pub struct PositionTable {
    files: Vec<File>,
    spans: Vec<Span>,
}

impl Default for PositionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionTable {
    /// The unknown position. Always index 0.
    pub const UNKNOWN: PosIdx = PosIdx(0);

    pub fn new() -> Self {
        let mut table = PositionTable {
            files: Vec::new(),
            spans: Vec::new(),
        };
        table.add_file("unknown".to_string(), "".to_string());
        let pos = table.add_pos(FileIdx(0), 0, 0);
        debug_assert!(pos == Self::UNKNOWN);
        table
    }

    /// Register a source file.
    pub fn add_file(&mut self, name: String, source: String) -> FileIdx {
        let idx = self.files.len();
        self.files.push(File { name, source });
        FileIdx(idx as u32)
    }

    /// Register a span within a previously added file.
    pub fn add_pos(
        &mut self,
        file: FileIdx,
        start: usize,
        end: usize,
    ) -> PosIdx {
        let idx = self.spans.len();
        self.spans.push(Span { file, start, end });
        PosIdx(idx as u32)
    }

    fn get_span(&self, pos: PosIdx) -> &Span {
        &self.spans[pos.0 as usize]
    }

    fn get_file(&self, file: FileIdx) -> &File {
        &self.files[file.0 as usize]
    }
}

/// The process-wide position table. Positions are append-only interned data,
/// so sharing one table across compilations is harmless.
pub struct GlobalPositionTable;

impl GlobalPositionTable {
    /// Return a mutable reference to the global [PositionTable].
    pub fn as_mut() -> &'static mut PositionTable {
        static mut SINGLETON: mem::MaybeUninit<PositionTable> =
            mem::MaybeUninit::uninit();
        static ONCE: sync::Once = sync::Once::new();

        // SAFETY:
        // - writing to the singleton is OK because we only do it one time
        // - the ONCE guarantees that SINGLETON is init'ed before assume_init_mut
        unsafe {
            ONCE.call_once(|| {
                SINGLETON.write(PositionTable::new());
                assert!(PositionTable::UNKNOWN == GPosIdx::UNKNOWN.0)
            });
            SINGLETON.assume_init_mut()
        }
    }

    pub fn as_ref() -> &'static PositionTable {
        Self::as_mut()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
/// A span index backed by the global [PositionTable].
pub struct GPosIdx(pub PosIdx);

impl Default for GPosIdx {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

impl GPosIdx {
    /// Symbol for the unknown position.
    pub const UNKNOWN: GPosIdx = GPosIdx(PosIdx(0));

    /// `None` if this is the unknown position.
    pub fn into_option(self) -> Option<Self> {
        if self == Self::UNKNOWN {
            None
        } else {
            Some(self)
        }
    }

    /// Resolve to (file name, line number, column), 1-based.
    pub fn get_location(&self) -> (&'static str, usize, usize) {
        let table = GlobalPositionTable::as_ref();
        let span = table.get_span(self.0);
        let file = table.get_file(span.file);
        let mut line = 1;
        let mut col = 1;
        for (i, ch) in file.source.char_indices() {
            if i >= span.start {
                break;
            }
            if ch == '\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
        }
        (&file.name, line, col)
    }

    /// Format an error message with its resolved location prefixed.
    pub fn format<S: AsRef<str>>(&self, err_msg: S) -> String {
        if self.into_option().is_none() {
            return err_msg.as_ref().to_string();
        }
        let (name, line, col) = self.get_location();
        format!("{}:{}:{}: {}", name, line, col, err_msg.as_ref())
    }
}
