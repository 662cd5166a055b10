use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsmErrorKind {
    Parse(String),
    DuplicateSymbol(String),
    UndefinedSymbol(String),
    LiteralOverflow(String),
    DoublePatch(String),
    OverlappingSegments(String),
    Io(String),
}

impl fmt::Display for AsmErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsmErrorKind::Parse(msg) => write!(f, "parse error: {msg}"),
            AsmErrorKind::DuplicateSymbol(name) => write!(f, "symbol {name} defined multiple times"),
            AsmErrorKind::UndefinedSymbol(name) => write!(f, "symbol {name} used but not defined"),
            AsmErrorKind::LiteralOverflow(tok) => write!(f, "literal {tok} does not fit in a word"),
            AsmErrorKind::DoublePatch(name) => {
                write!(f, "internal error: symbol {name} ref is nonzero before patching")
            }
            AsmErrorKind::OverlappingSegments(msg) => write!(f, "overlapping segments: {msg}"),
            AsmErrorKind::Io(msg) => write!(f, "{msg}"),
        }
    }
}

/// Every assembler failure is fatal and carries the file/line it happened
/// at, matching `file:line: Fatal: <kind>` from the original tool's
/// diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsmError {
    pub file: String,
    pub line: usize,
    pub kind: AsmErrorKind,
}

impl AsmError {
    #[must_use]
    pub fn new(file: impl Into<String>, line: usize, kind: AsmErrorKind) -> Self {
        Self {
            file: file.into(),
            line,
            kind,
        }
    }
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: Fatal: {}", self.file, self.line, self.kind)
    }
}

impl std::error::Error for AsmError {}
