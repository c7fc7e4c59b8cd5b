/// Identifier of a source file within the translation unit.
///
/// The preprocessor assigns these densely starting at 0 for the main file.
/// File-static scopes carry the id of the file they belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FileId(pub u32);

/// A 1-based line/column position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Pos {
    pub line: u32,
    pub column: u32,
}

/// A source range within a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub file: FileId,
    pub start: Pos,
    pub end: Pos,
}

impl Span {
    pub fn new(file: FileId, start: Pos, end: Pos) -> Self {
        Self { file, start, end }
    }

    /// A single-position span, for tokens whose width doesn't matter.
    pub fn at(file: FileId, line: u32, column: u32) -> Self {
        let pos = Pos { line, column };
        Self {
            file,
            start: pos,
            end: pos,
        }
    }

    /// Span for compiler-generated nodes.
    pub fn dummy() -> Self {
        Self::default()
    }

    /// Cover both spans (same file assumed).
    pub fn merge(&self, other: &Span) -> Span {
        let start = if (self.start.line, self.start.column) <= (other.start.line, other.start.column)
        {
            self.start
        } else {
            other.start
        };
        let end = if (self.end.line, self.end.column) >= (other.end.line, other.end.column) {
            self.end
        } else {
            other.end
        };
        Span {
            file: self.file,
            start,
            end,
        }
    }
}

impl std::fmt::Display for Pos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "file {}:{}", self.file.0, self.start)
    }
}
