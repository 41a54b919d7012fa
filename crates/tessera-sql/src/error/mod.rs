//! Query error codes.
//!
//! Stable numeric error codes for the query layer, grouped by range:
//!
//! - Implementation errors: `[-1, -50)`
//! - Lexical errors: `[-50, -100)`
//! - Syntax errors: `[-100, -200)`
//! - Semantic errors: `[-200, -300)`
//! - Execution errors: `[-300, ...)`
//! - `Success` is `0`; warnings start at `100`
//!
//! The numeric values are part of the client protocol and must not change
//! across versions. Each code maps to a human-readable message; the text
//! does not have to be English and can be translated.

use std::fmt;

/// A stable error code reported by the query layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum QueryErrorCode {
    /// Success.
    Success = 0,

    // Implementation related errors [-1, -50).
    /// Generic failure.
    Failure = -1,
    /// Invalid SQL statement.
    SqlStatementInvalid = -2,
    /// Invalid CQL statement.
    CqlStatementInvalid = -3,
    /// Feature not yet implemented.
    FeatureNotYetImplemented = -4,
    /// Feature not supported.
    FeatureNotSupported = -5,

    // Lexical errors [-50, -100).
    /// Lexical error.
    LexicalError = -50,
    /// Character not in repertoire.
    CharacterNotInRepertoire = -51,
    /// Invalid escape sequence.
    InvalidEscapeSequence = -52,
    /// Name too long.
    NameTooLong = -53,
    /// Nonstandard use of escape character.
    NonstandardUseOfEscapeCharacter = -54,

    // Syntax errors [-100, -200).
    /// Syntax error.
    SyntaxError = -100,
    /// Invalid parameter value.
    InvalidParameterValue = -101,

    // Semantic errors [-200, -300).
    /// Semantic error.
    SemError = -200,
    /// Datatype mismatch.
    DatatypeMismatch = -201,
    /// Duplicate table.
    DuplicateTable = -202,
    /// Undefined column.
    UndefinedColumn = -203,
    /// Duplicate column.
    DuplicateColumn = -204,
    /// Missing primary key.
    MissingPrimaryKey = -205,
    /// Invalid primary key column datatype.
    InvalidPrimaryColumnType = -206,
    /// Missing argument for primary key.
    MissingArgumentForPrimaryKey = -207,
    /// Null argument for primary key.
    NullArgumentForPrimaryKey = -208,
    /// Incomparable datatypes.
    IncomparableDatatypes = -209,
    /// Invalid table property.
    InvalidTableProperty = -210,
    /// Duplicate table property.
    DuplicateTableProperty = -211,
    /// Invalid datatype.
    InvalidDatatype = -212,
    /// The system namespace is read-only.
    SystemNamespaceReadonly = -213,
    /// Invalid function call.
    InvalidFunctionCall = -214,

    // Execution errors [-300, ...).
    /// Execution error.
    ExecError = -300,
    /// Table not found.
    TableNotFound = -301,
    /// Invalid table definition.
    InvalidTableDefinition = -302,
    /// Wrong metadata version.
    WrongMetadataVersion = -303,
    /// Invalid arguments.
    InvalidArguments = -304,
    /// Too few arguments.
    TooFewArguments = -305,
    /// Too many arguments.
    TooManyArguments = -306,
    /// Keyspace already exists.
    KeyspaceAlreadyExists = -307,
    /// Keyspace not found.
    KeyspaceNotFound = -308,
    /// Tablet not found.
    TabletNotFound = -309,

    // Warnings. Start with 100.
    /// Not found.
    Notfound = 100,
}

impl QueryErrorCode {
    /// Returns the stable numeric value of this code.
    #[inline]
    #[must_use]
    pub const fn as_i16(self) -> i16 {
        self as i16
    }

    /// Returns true if this code denotes an error (negative codes).
    #[inline]
    #[must_use]
    pub const fn is_error(self) -> bool {
        (self as i16) < 0
    }

    /// Returns true if this code denotes a warning (codes from 100 up).
    #[inline]
    #[must_use]
    pub const fn is_warning(self) -> bool {
        (self as i16) >= 100
    }

    /// Returns the error category name, derived from the code's range.
    #[must_use]
    pub const fn category(self) -> &'static str {
        let code = self as i16;
        if code >= 100 {
            "Warning"
        } else if code == 0 {
            "Success"
        } else if code > -50 {
            "Implementation"
        } else if code > -100 {
            "Lexical"
        } else if code > -200 {
            "Syntax"
        } else if code > -300 {
            "Semantic"
        } else {
            "Execution"
        }
    }
}

/// Converts a query error code into readable text.
#[must_use]
pub const fn error_text(code: QueryErrorCode) -> &'static str {
    match code {
        QueryErrorCode::Success => "Success",
        QueryErrorCode::Failure => "",
        QueryErrorCode::SqlStatementInvalid => "Invalid SQL Statement",
        QueryErrorCode::CqlStatementInvalid => "Invalid CQL Statement",
        QueryErrorCode::FeatureNotYetImplemented => "Feature Not Yet Implemented",
        QueryErrorCode::FeatureNotSupported => "Feature Not Supported",
        QueryErrorCode::LexicalError => "Lexical Error",
        QueryErrorCode::CharacterNotInRepertoire => "Character Not in Repertoire",
        QueryErrorCode::InvalidEscapeSequence => "Invalid Escape Sequence",
        QueryErrorCode::NameTooLong => "Name Too Long",
        QueryErrorCode::NonstandardUseOfEscapeCharacter => "Nonstandard Use of Escape Character",
        QueryErrorCode::SyntaxError => "Syntax Error",
        QueryErrorCode::InvalidParameterValue => "Invalid Parameter Value",
        QueryErrorCode::SemError => "Semantic Error",
        QueryErrorCode::DatatypeMismatch => "Datatype Mismatch",
        QueryErrorCode::DuplicateTable => "Duplicate Table",
        QueryErrorCode::UndefinedColumn => "Undefined Column",
        QueryErrorCode::DuplicateColumn => "Duplicate Column",
        QueryErrorCode::MissingPrimaryKey => "Missing Primary Key",
        QueryErrorCode::InvalidPrimaryColumnType => "Invalid Primary Key Column Datatype",
        QueryErrorCode::MissingArgumentForPrimaryKey => "Missing Argument for Primary Key",
        QueryErrorCode::NullArgumentForPrimaryKey => "Null Argument for Primary Key",
        QueryErrorCode::IncomparableDatatypes => "Incomparable Datatypes",
        QueryErrorCode::InvalidTableProperty => "Invalid Table Property",
        QueryErrorCode::DuplicateTableProperty => "Duplicate Table Property",
        QueryErrorCode::InvalidDatatype => "Invalid Datatype",
        QueryErrorCode::SystemNamespaceReadonly => "system namespace is read-only",
        QueryErrorCode::InvalidFunctionCall => "Invalid Function Call",
        QueryErrorCode::ExecError => "Execution Error",
        QueryErrorCode::TableNotFound => "Table Not Found",
        QueryErrorCode::InvalidTableDefinition => "Invalid Table Definition",
        QueryErrorCode::WrongMetadataVersion => "Wrong Metadata Version",
        QueryErrorCode::InvalidArguments => "Invalid Arguments",
        QueryErrorCode::TooFewArguments => "Too Few Arguments",
        QueryErrorCode::TooManyArguments => "Too Many Arguments",
        QueryErrorCode::KeyspaceAlreadyExists => "Keyspace Already Exists",
        QueryErrorCode::KeyspaceNotFound => "Keyspace Not Found",
        QueryErrorCode::TabletNotFound => "Tablet Not Found",
        QueryErrorCode::Notfound => "Not Found",
    }
}

impl fmt::Display for QueryErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", error_text(*self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(QueryErrorCode::Success.as_i16(), 0);
        assert_eq!(QueryErrorCode::Failure.as_i16(), -1);
        assert_eq!(QueryErrorCode::LexicalError.as_i16(), -50);
        assert_eq!(QueryErrorCode::SyntaxError.as_i16(), -100);
        assert_eq!(QueryErrorCode::SemError.as_i16(), -200);
        assert_eq!(QueryErrorCode::ExecError.as_i16(), -300);
        assert_eq!(QueryErrorCode::Notfound.as_i16(), 100);
    }

    #[test]
    fn test_categories() {
        assert_eq!(QueryErrorCode::Failure.category(), "Implementation");
        assert_eq!(QueryErrorCode::NameTooLong.category(), "Lexical");
        assert_eq!(QueryErrorCode::SyntaxError.category(), "Syntax");
        assert_eq!(QueryErrorCode::UndefinedColumn.category(), "Semantic");
        assert_eq!(QueryErrorCode::TabletNotFound.category(), "Execution");
        assert_eq!(QueryErrorCode::Notfound.category(), "Warning");
        assert_eq!(QueryErrorCode::Success.category(), "Success");
    }

    #[test]
    fn test_error_vs_warning() {
        assert!(QueryErrorCode::SyntaxError.is_error());
        assert!(!QueryErrorCode::SyntaxError.is_warning());
        assert!(QueryErrorCode::Notfound.is_warning());
        assert!(!QueryErrorCode::Success.is_error());
    }

    #[test]
    fn test_error_text() {
        assert_eq!(error_text(QueryErrorCode::SyntaxError), "Syntax Error");
        assert_eq!(error_text(QueryErrorCode::Failure), "");
        assert_eq!(format!("{}", QueryErrorCode::TableNotFound), "Table Not Found");
    }
}
