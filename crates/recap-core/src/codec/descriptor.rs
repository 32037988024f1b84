//! Canonical type descriptors
//!
//! A [`TypeDesc`] is the self-describing tag attached to every encoded value:
//! kind plus element/key/value references, constructed during encode and
//! consumed during decode, with no reliance on runtime type introspection.
//! Descriptors serialize as their canonical text form (`seq<string>`,
//! `map<string,int>`, `demo.Greeting`) so snapshot files stay readable.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::RecapError;

/// Tagged canonical type descriptor for a portable value
///
/// `Seq` and `Map` carry exactly one element/value descriptor: containers are
/// homogeneous by contract. Mixed-element containers are unsupported and must
/// be modeled as a `Named` composite instead; decoding rejects the first
/// element that does not match the declared element type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDesc {
    /// The unit value; encodes as an explicit null payload
    Unit,
    /// Boolean
    Bool,
    /// Signed 64-bit integer
    Int,
    /// Unsigned 64-bit integer
    UInt,
    /// 64-bit float
    Float,
    /// UTF-8 string
    String,
    /// Instant in time, encoded as an RFC 3339 string
    Timestamp,
    /// Optional value of the inner type
    Option(Box<TypeDesc>),
    /// Homogeneous sequence of the element type
    Seq(Box<TypeDesc>),
    /// Homogeneous map from key type to value type; keys must encode as
    /// JSON object keys, so the key type must be `String`
    Map(Box<TypeDesc>, Box<TypeDesc>),
    /// Composite type registered under a canonical name
    Named(String),
}

impl TypeDesc {
    /// Descriptor for a registered composite type
    pub fn named(name: impl Into<String>) -> Self {
        TypeDesc::Named(name.into())
    }

    /// Descriptor for an optional value
    pub fn option(inner: TypeDesc) -> Self {
        TypeDesc::Option(Box::new(inner))
    }

    /// Descriptor for a homogeneous sequence
    pub fn seq(element: TypeDesc) -> Self {
        TypeDesc::Seq(Box::new(element))
    }

    /// Descriptor for a homogeneous string-keyed map
    pub fn map(key: TypeDesc, value: TypeDesc) -> Self {
        TypeDesc::Map(Box::new(key), Box::new(value))
    }

    /// Canonical text form of this descriptor
    pub fn canonical(&self) -> String {
        self.to_string()
    }

    /// The registered name, when this descriptor is a `Named` composite
    pub fn name(&self) -> Option<&str> {
        match self {
            TypeDesc::Named(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDesc::Unit => f.write_str("unit"),
            TypeDesc::Bool => f.write_str("bool"),
            TypeDesc::Int => f.write_str("int"),
            TypeDesc::UInt => f.write_str("uint"),
            TypeDesc::Float => f.write_str("float"),
            TypeDesc::String => f.write_str("string"),
            TypeDesc::Timestamp => f.write_str("timestamp"),
            TypeDesc::Option(inner) => write!(f, "option<{inner}>"),
            TypeDesc::Seq(element) => write!(f, "seq<{element}>"),
            TypeDesc::Map(key, value) => write!(f, "map<{key},{value}>"),
            TypeDesc::Named(name) => f.write_str(name),
        }
    }
}

impl FromStr for TypeDesc {
    type Err = RecapError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut parser = Parser::new(input);
        let desc = parser.parse()?;
        parser.expect_end()?;
        Ok(desc)
    }
}

impl Serialize for TypeDesc {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.canonical())
    }
}

impl<'de> Deserialize<'de> for TypeDesc {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(D::Error::custom)
    }
}

/// Recursive-descent parser over the canonical text form
struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Parser { input, pos: 0 }
    }

    fn parse(&mut self) -> Result<TypeDesc, RecapError> {
        self.skip_ws();
        let word = self.take_word()?;
        let desc = match word {
            "unit" => TypeDesc::Unit,
            "bool" => TypeDesc::Bool,
            "int" => TypeDesc::Int,
            "uint" => TypeDesc::UInt,
            "float" => TypeDesc::Float,
            "string" => TypeDesc::String,
            "timestamp" => TypeDesc::Timestamp,
            "option" => {
                self.expect('<')?;
                let inner = self.parse()?;
                self.expect('>')?;
                TypeDesc::option(inner)
            }
            "seq" => {
                self.expect('<')?;
                let element = self.parse()?;
                self.expect('>')?;
                TypeDesc::seq(element)
            }
            "map" => {
                self.expect('<')?;
                let key = self.parse()?;
                self.expect(',')?;
                let value = self.parse()?;
                self.expect('>')?;
                TypeDesc::map(key, value)
            }
            name => TypeDesc::named(name),
        };
        self.skip_ws();
        Ok(desc)
    }

    fn skip_ws(&mut self) {
        while self.input[self.pos..].starts_with(' ') {
            self.pos += 1;
        }
    }

    fn take_word(&mut self) -> Result<&'a str, RecapError> {
        let rest = &self.input[self.pos..];
        let end = rest
            .char_indices()
            .find(|(_, c)| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$' | '-')))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        if end == 0 {
            return Err(self.malformed());
        }
        self.pos += end;
        Ok(&rest[..end])
    }

    fn expect(&mut self, wanted: char) -> Result<(), RecapError> {
        self.skip_ws();
        if self.input[self.pos..].starts_with(wanted) {
            self.pos += wanted.len_utf8();
            Ok(())
        } else {
            Err(self.malformed())
        }
    }

    fn expect_end(&mut self) -> Result<(), RecapError> {
        self.skip_ws();
        if self.pos == self.input.len() {
            Ok(())
        } else {
            Err(self.malformed())
        }
    }

    fn malformed(&self) -> RecapError {
        RecapError::codec(format!(
            "Malformed type descriptor `{}` at offset {}",
            self.input, self.pos
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_form_round_trips() {
        let descs = [
            TypeDesc::Unit,
            TypeDesc::Bool,
            TypeDesc::Int,
            TypeDesc::UInt,
            TypeDesc::Float,
            TypeDesc::String,
            TypeDesc::Timestamp,
            TypeDesc::option(TypeDesc::String),
            TypeDesc::seq(TypeDesc::named("demo.Greeting")),
            TypeDesc::map(TypeDesc::String, TypeDesc::seq(TypeDesc::Int)),
            TypeDesc::named("demo.Greeting"),
        ];
        for desc in descs {
            let text = desc.canonical();
            let parsed: TypeDesc = text.parse().unwrap();
            assert_eq!(parsed, desc, "round-trip of `{text}`");
        }
    }

    #[test]
    fn nested_descriptors_parse() {
        let parsed: TypeDesc = "map<string, seq<option<demo.Greeting>>>".parse().unwrap();
        assert_eq!(
            parsed,
            TypeDesc::map(
                TypeDesc::String,
                TypeDesc::seq(TypeDesc::option(TypeDesc::named("demo.Greeting")))
            )
        );
    }

    #[test]
    fn malformed_descriptors_are_rejected() {
        for text in ["seq<", "map<string>", "seq<string>>", "", "<int>"] {
            assert!(text.parse::<TypeDesc>().is_err(), "accepted `{text}`");
        }
    }

    #[test]
    fn serializes_as_canonical_string() {
        let json = serde_json::to_string(&TypeDesc::seq(TypeDesc::String)).unwrap();
        assert_eq!(json, "\"seq<string>\"");
        let back: TypeDesc = serde_json::from_str(&json).unwrap();
        assert_eq!(back, TypeDesc::seq(TypeDesc::String));
    }
}
