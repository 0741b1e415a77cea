//! Parser for term text returned in `OK` response bodies.
//!
//! Accepts everything [`encode`](super::encode) produces plus the forms the
//! node prints on its own: bare atoms (`ok`, `true`), `=>` surrounded by
//! whitespace, and line breaks between tokens.

use super::{Mapping, Value};

/// Deepest container nesting accepted in one body.
pub const MAX_NESTING_DEPTH: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} at offset {offset}")]
pub struct DecodeError {
    pub offset: usize,
    pub message: String,
}

/// Parse exactly one term; trailing input other than whitespace is rejected.
pub fn decode(src: &str) -> Result<Value, DecodeError> {
    let mut parser = Parser::new(src);
    let value = parser.parse_value()?;
    parser.skip_ws();
    if !parser.eof() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(value)
}

struct Parser<'a> {
    src: &'a str,
    bytes: &'a [u8],
    index: usize,
    depth: usize,
}

type ParseResult<T> = Result<T, DecodeError>;

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            index: 0,
            depth: 0,
        }
    }

    fn eof(&self) -> bool {
        self.index >= self.bytes.len()
    }

    fn current(&self) -> Option<u8> {
        self.bytes.get(self.index).copied()
    }

    fn skip_ws(&mut self) {
        while self.current().is_some_and(|b| b.is_ascii_whitespace()) {
            self.index += 1;
        }
    }

    fn error(&self, message: impl Into<String>) -> DecodeError {
        DecodeError {
            offset: self.index,
            message: message.into(),
        }
    }

    fn expect(&mut self, byte: u8) -> ParseResult<()> {
        self.skip_ws();
        if self.current() == Some(byte) {
            self.index += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", byte as char)))
        }
    }

    fn parse_value(&mut self) -> ParseResult<Value> {
        self.skip_ws();
        match self.current() {
            None => Err(self.error("unexpected end of input")),
            Some(b'[') => self.nested(|p| p.parse_items(b'[', b']').map(Value::Sequence)),
            Some(b'{') => self.nested(|p| p.parse_items(b'{', b'}').map(Value::Pair)),
            Some(b'#') => self.nested(Self::parse_mapping),
            Some(b'"') => self.parse_quoted(b'"').map(Value::Text),
            Some(b'\'') => self.parse_quoted(b'\'').map(Value::Symbol),
            Some(b'-' | b'+' | b'0'..=b'9') => self.parse_number(),
            Some(b) if b.is_ascii_lowercase() => Ok(self.parse_atom()),
            Some(b) => Err(self.error(format!("unexpected character '{}'", b as char))),
        }
    }

    fn nested(&mut self, parse: impl FnOnce(&mut Self) -> ParseResult<Value>) -> ParseResult<Value> {
        if self.depth == MAX_NESTING_DEPTH {
            return Err(self.error("nesting too deep"));
        }
        self.depth += 1;
        let value = parse(self);
        self.depth -= 1;
        value
    }

    fn parse_items(&mut self, open: u8, close: u8) -> ParseResult<Vec<Value>> {
        self.expect(open)?;
        let mut items = Vec::new();
        self.skip_ws();
        if self.current() == Some(close) {
            self.index += 1;
            return Ok(items);
        }
        loop {
            items.push(self.parse_value()?);
            self.skip_ws();
            match self.current() {
                Some(b',') => self.index += 1,
                Some(b) if b == close => {
                    self.index += 1;
                    return Ok(items);
                }
                _ => return Err(self.error(format!("expected ',' or '{}'", close as char))),
            }
        }
    }

    fn parse_mapping(&mut self) -> ParseResult<Value> {
        self.expect(b'#')?;
        if self.current() != Some(b'{') {
            return Err(self.error("expected '{' after '#'"));
        }
        self.index += 1;

        let mut mapping = Mapping::new();
        self.skip_ws();
        if self.current() == Some(b'}') {
            self.index += 1;
            return Ok(Value::Mapping(mapping));
        }
        loop {
            let key_offset = self.index;
            let key = self.parse_value()?;
            self.skip_ws();
            if !self.src[self.index..].starts_with("=>") {
                return Err(self.error("expected '=>'"));
            }
            self.index += 2;
            let value = self.parse_value()?;
            if mapping.insert(key, value).is_some() {
                return Err(DecodeError {
                    offset: key_offset,
                    message: "duplicate mapping key".to_string(),
                });
            }
            self.skip_ws();
            match self.current() {
                Some(b',') => self.index += 1,
                Some(b'}') => {
                    self.index += 1;
                    return Ok(Value::Mapping(mapping));
                }
                _ => return Err(self.error("expected ',' or '}'")),
            }
        }
    }

    /// `\\` and an escaped quote are unescaped; any other backslash is literal.
    fn parse_quoted(&mut self, quote: u8) -> ParseResult<String> {
        let start = self.index;
        self.index += 1;
        let mut out = String::new();
        let mut run_start = self.index;
        loop {
            match self.current() {
                None => {
                    return Err(DecodeError {
                        offset: start,
                        message: "unterminated quoted term".to_string(),
                    });
                }
                Some(b) if b == quote => {
                    out.push_str(&self.src[run_start..self.index]);
                    self.index += 1;
                    return Ok(out);
                }
                Some(b'\\') => match self.bytes.get(self.index + 1).copied() {
                    Some(escaped) if escaped == quote || escaped == b'\\' => {
                        out.push_str(&self.src[run_start..self.index]);
                        out.push(escaped as char);
                        self.index += 2;
                        run_start = self.index;
                    }
                    _ => self.index += 1,
                },
                Some(_) => self.index += 1,
            }
        }
    }

    fn parse_number(&mut self) -> ParseResult<Value> {
        let start = self.index;
        if matches!(self.current(), Some(b'-' | b'+')) {
            self.index += 1;
        }
        let int_digits = self.consume_digits();
        if int_digits == 0 {
            return Err(self.error("expected digits"));
        }

        let mut is_float = false;
        let fraction_follows = self.bytes.get(self.index + 1).is_some_and(u8::is_ascii_digit);
        if self.current() == Some(b'.') && fraction_follows {
            is_float = true;
            self.index += 1;
            self.consume_digits();
        }
        if matches!(self.current(), Some(b'e' | b'E')) {
            is_float = true;
            self.index += 1;
            if matches!(self.current(), Some(b'-' | b'+')) {
                self.index += 1;
            }
            if self.consume_digits() == 0 {
                return Err(self.error("expected exponent digits"));
            }
        }

        let literal = &self.src[start..self.index];
        if is_float {
            literal.parse::<f64>().map(Value::Float).map_err(|e| DecodeError {
                offset: start,
                message: format!("invalid float '{literal}': {e}"),
            })
        } else {
            literal.parse::<i64>().map(Value::Integer).map_err(|e| DecodeError {
                offset: start,
                message: format!("invalid integer '{literal}': {e}"),
            })
        }
    }

    fn consume_digits(&mut self) -> usize {
        let start = self.index;
        while self.current().is_some_and(|b| b.is_ascii_digit()) {
            self.index += 1;
        }
        self.index - start
    }

    fn parse_atom(&mut self) -> Value {
        let start = self.index;
        while self
            .current()
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'@')
        {
            self.index += 1;
        }
        match &self.src[start..self.index] {
            "undefined" => Value::Nil,
            atom => Value::Symbol(atom.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::encode;
    use proptest::prelude::*;

    #[test]
    fn scalars() {
        assert_eq!(decode("undefined"), Ok(Value::Nil));
        assert_eq!(decode("7"), Ok(Value::Integer(7)));
        assert_eq!(decode("-7"), Ok(Value::Integer(-7)));
        assert_eq!(decode("+3"), Ok(Value::Integer(3)));
        assert_eq!(decode("1.5"), Ok(Value::Float(1.5)));
        assert_eq!(decode("1.0e-7"), Ok(Value::Float(1e-7)));
        assert_eq!(decode("2e3"), Ok(Value::Float(2000.0)));
        assert_eq!(decode("\"7\""), Ok(Value::text("7")));
        assert_eq!(decode("'get_value'"), Ok(Value::symbol("get_value")));
        assert_eq!(decode("ok"), Ok(Value::symbol("ok")));
        assert_eq!(decode("node@host"), Ok(Value::symbol("node@host")));
    }

    #[test]
    fn whitespace_and_newlines_between_tokens() {
        let v = decode("  #{ 'a' =>\n [1,\n 2] }\n").unwrap();
        let expected: Mapping = [(
            Value::symbol("a"),
            Value::Sequence(vec![1.into(), 2.into()]),
        )]
        .into_iter()
        .collect();
        assert_eq!(v, Value::Mapping(expected));
    }

    #[test]
    fn escaped_quotes_and_backslashes() {
        assert_eq!(decode(r#""a\"b""#), Ok(Value::text(r#"a"b"#)));
        assert_eq!(decode(r#""a\\b""#), Ok(Value::text(r"a\b")));
        assert_eq!(decode(r#""a\nb""#), Ok(Value::text(r"a\nb")));
    }

    #[test]
    fn nested_round_trip() {
        let mapping: Mapping = [
            (Value::symbol("k"), Value::Pair(vec![Value::Nil, Value::Float(0.25)])),
            (Value::text("list"), Value::Sequence(vec![])),
            (Value::Integer(1), Value::Mapping(Mapping::new())),
        ]
        .into_iter()
        .collect();
        let value = Value::Sequence(vec![
            Value::Mapping(mapping),
            Value::pair([Value::symbol("a"), Value::text("b c"), Value::Integer(-4)]),
            Value::Float(3.0e30),
            Value::Float(-1.0e-9),
        ]);
        assert_eq!(decode(&encode(&value)), Ok(value));
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Nil),
            any::<i64>().prop_map(Value::Integer),
            any::<f64>()
                .prop_filter("finite", |x| x.is_finite())
                .prop_map(Value::Float),
            "[a-zA-Z0-9 _@.,{}#=>-]{0,12}".prop_map(Value::Text),
            "[a-z0-9_@ ]{0,12}".prop_map(Value::Symbol),
        ];
        leaf.prop_recursive(4, 48, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Sequence),
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Pair),
                prop::collection::vec((inner.clone(), inner), 0..6)
                    .prop_map(|entries| Value::Mapping(entries.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn encoded_values_decode_back(value in arb_value()) {
            prop_assert_eq!(decode(&encode(&value)), Ok(value));
        }
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(decode("").unwrap_err().message, "unexpected end of input");
        assert_eq!(decode("[1, 2").unwrap_err().message, "expected ',' or ']'");
        assert_eq!(decode("\"open").unwrap_err().offset, 0);
        assert_eq!(decode("1 2").unwrap_err().message, "unexpected trailing input");
        assert_eq!(decode("#{'a' 1}").unwrap_err().message, "expected '=>'");
        assert_eq!(decode("#[1]").unwrap_err().message, "expected '{' after '#'");
        assert_eq!(decode("Foo").unwrap_err().message, "unexpected character 'F'");
        assert_eq!(decode("#{a=>1, a=>2}").unwrap_err().message, "duplicate mapping key");
        assert!(decode("99999999999999999999").is_err());
        assert!(decode("1e").is_err());

        let deep = "[".repeat(200_000) + &"]".repeat(200_000);
        let err = decode(&deep).unwrap_err();
        assert_eq!(err.message, "nesting too deep");
        assert_eq!(err.offset, MAX_NESTING_DEPTH);
    }

    #[test]
    fn nesting_up_to_the_limit_decodes() {
        let src = "{".repeat(MAX_NESTING_DEPTH) + &"}".repeat(MAX_NESTING_DEPTH);
        let mut value = decode(&src).unwrap();
        let mut depth = 1;
        while let Value::Pair(mut items) = value {
            let Some(inner) = items.pop() else { break };
            value = inner;
            depth += 1;
        }
        assert_eq!(depth, MAX_NESTING_DEPTH);

        let mixed = "#{1=>".repeat(MAX_NESTING_DEPTH) + "0" + &"}".repeat(MAX_NESTING_DEPTH);
        assert!(decode(&mixed).is_ok());
        let over = "#{1=>".repeat(MAX_NESTING_DEPTH + 1) + "0" + &"}".repeat(MAX_NESTING_DEPTH + 1);
        assert_eq!(decode(&over).unwrap_err().message, "nesting too deep");
    }

    #[test]
    fn error_display_includes_offset() {
        let err = decode("[1,,]").unwrap_err();
        assert_eq!(err.to_string(), "unexpected character ',' at offset 3");
    }
}
