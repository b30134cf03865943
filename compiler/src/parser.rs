use brine_proto_schema::{OptionMap, OptionValue, Rule, Syntax, ID_MAX};
use crate::{
    tokenizer::{tokenize_schema, Token},
    types::{EnumDecl, EnumValueDecl, ExtendDecl, FieldDecl, MessageDecl, MethodDecl, Schema, ServiceDecl},
    utils::{error, parse_integer, quote},
    error::ProtoError,
};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref NAME:      Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
    static ref TYPE_NAME: Regex = Regex::new(r"^\.?[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$").unwrap();
    static ref INTEGER:   Regex = Regex::new(r"^-?(0[xX][0-9A-Fa-f]+|\d+)$").unwrap();
    static ref FLOAT:     Regex = Regex::new(r"^-?(\d+\.\d*|\.\d+|\d+)([eE][+-]?\d+)?$").unwrap();
}

/// Parses `.proto` text into a [Schema].
pub fn parse_schema(text: &str) -> Result<Schema, ProtoError> {
    let tokens = tokenize_schema(text)?;
    Parser::new(&tokens).parse_file()
}

struct Parser<'a> {
    tokens: &'a [Token],
    index:  usize,
    syntax: Syntax,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Parser<'a> {
        Parser { tokens, index: 0, syntax: Syntax::Proto2 }
    }

    fn current(&self) -> &'a Token {
        // the tokenizer always ends the stream with an empty marker
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.index.min(last)]
    }

    fn peek(&self) -> &'a str {
        &self.current().text
    }

    fn peek_at(&self, offset: usize) -> &'a str {
        self.tokens.get(self.index + offset).map_or("", |t| t.text.as_str())
    }

    fn advance(&mut self) -> &'a Token {
        let token = self.current();
        if self.index < self.tokens.len() {
            self.index += 1;
        }
        token
    }

    fn eat(&mut self, text: &str) -> bool {
        if self.peek() == text {
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn fail(&self, msg: &str) -> ProtoError {
        let token = self.current();
        error(msg, token.line, token.column)
    }

    fn unexpected(&self) -> ProtoError {
        if self.peek().is_empty() {
            self.fail("Unexpected end of input")
        } else {
            self.fail(&format!("Unexpected token {}", quote(self.peek())))
        }
    }

    fn expect(&mut self, text: &str) -> Result<(), ProtoError> {
        if !self.eat(text) {
            return Err(self.fail(&format!("Expected {} but found {}", quote(text), quote(self.peek()))));
        }
        Ok(())
    }

    fn expect_match(&mut self, test: &Regex, expected: &str) -> Result<String, ProtoError> {
        if !test.is_match(self.peek()) {
            return Err(self.fail(&format!("Expected {} but found {}", expected, quote(self.peek()))));
        }
        Ok(self.advance().text.clone())
    }

    fn expect_name(&mut self) -> Result<String, ProtoError> {
        self.expect_match(&NAME, "identifier")
    }

    fn expect_type_name(&mut self) -> Result<String, ProtoError> {
        self.expect_match(&TYPE_NAME, "type name")
    }

    fn expect_integer(&mut self) -> Result<i64, ProtoError> {
        let token = self.current();
        let text = self.expect_match(&INTEGER, "integer")?;
        parse_integer(&text)
            .and_then(|n| i64::try_from(n).ok())
            .ok_or_else(|| error(&format!("Invalid integer {}", quote(&text)), token.line, token.column))
    }

    /// One or more adjacent string literals, unescaped and concatenated.
    fn expect_string(&mut self) -> Result<String, ProtoError> {
        if !self.current().is_string() {
            return Err(self.fail(&format!("Expected string but found {}", quote(self.peek()))));
        }
        let mut bytes = Vec::new();
        while self.current().is_string() {
            let token = self.advance();
            unescape(&token.text[1..token.text.len() - 1], &mut bytes)
                .map_err(|msg| error(&msg, token.line, token.column))?;
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn parse_file(mut self) -> Result<Schema, ProtoError> {
        let mut schema = Schema::default();

        if self.eat("syntax") {
            self.expect("=")?;
            let name = self.expect_string()?;
            self.syntax = Syntax::from_name(&name)
                .ok_or_else(|| self.fail(&format!("Unsupported syntax {}", quote(&name))))?;
            self.expect(";")?;
        }
        schema.syntax = self.syntax;

        loop {
            match self.peek() {
                "" => break,
                ";" => {
                    self.advance();
                }
                "syntax" => return Err(self.fail("The syntax statement must come first")),
                "package" => {
                    if schema.package.is_some() {
                        return Err(self.fail("Duplicate package statement"));
                    }
                    self.advance();
                    schema.package = Some(self.expect_type_name()?);
                    self.expect(";")?;
                }
                "import" => {
                    self.advance();
                    let weak = self.eat("weak");
                    if !weak {
                        self.eat("public");
                    }
                    let path = self.expect_string()?;
                    self.expect(";")?;
                    if weak {
                        schema.weak_imports.push(path);
                    } else {
                        schema.imports.push(path);
                    }
                }
                "option" => self.parse_option_statement(&mut schema.options)?,
                "message" => schema.messages.push(self.parse_message()?),
                "enum" => schema.enums.push(self.parse_enum()?),
                "service" => schema.services.push(self.parse_service()?),
                "extend" => {
                    let extend = self.parse_extend(&mut schema.messages)?;
                    schema.extends.push(extend);
                }
                _ => return Err(self.unexpected()),
            }
        }

        Ok(schema)
    }

    /// `name`, `(custom.name)` or `(custom.name).sub.path`.
    fn parse_option_name(&mut self) -> Result<String, ProtoError> {
        let mut name = if self.eat("(") {
            let inner = self.expect_type_name()?;
            self.expect(")")?;
            format!("({})", inner)
        } else {
            self.expect_type_name()?
        };
        while self.peek().starts_with('.') && TYPE_NAME.is_match(self.peek()) {
            name.push_str(&self.advance().text);
        }
        Ok(name)
    }

    fn parse_option_value(&mut self) -> Result<OptionValue, ProtoError> {
        if self.eat("{") {
            let mut entries = OptionMap::new();
            while !self.eat("}") {
                if self.peek().is_empty() {
                    return Err(self.unexpected());
                }
                let key = self.parse_option_name()?;
                self.eat(":");
                let value = self.parse_option_value()?;
                entries.insert(key, value);
                if !self.eat(",") {
                    self.eat(";");
                }
            }
            return Ok(OptionValue::Aggregate(entries));
        }
        if self.current().is_string() {
            return Ok(OptionValue::String(self.expect_string()?));
        }
        if self.eat("-") {
            let name = self.expect_name()?;
            return Ok(OptionValue::String(format!("-{}", name)));
        }

        let token = self.current();
        let text = token.text.as_str();
        if INTEGER.is_match(text) {
            self.advance();
            let n = parse_integer(text)
                .ok_or_else(|| error(&format!("Invalid integer {}", quote(text)), token.line, token.column))?;
            return Ok(match i64::try_from(n) {
                Ok(n) => OptionValue::Int(n),
                Err(_) => OptionValue::String(n.to_string()),
            });
        }
        if FLOAT.is_match(text) {
            self.advance();
            let n = text
                .parse::<f64>()
                .map_err(|_| error(&format!("Invalid number {}", quote(text)), token.line, token.column))?;
            return Ok(OptionValue::Float(n));
        }
        let name = self.expect_type_name()?;
        Ok(match name.as_str() {
            "true" => OptionValue::Bool(true),
            "false" => OptionValue::Bool(false),
            _ => OptionValue::String(name),
        })
    }

    fn parse_option_statement(&mut self, options: &mut OptionMap) -> Result<(), ProtoError> {
        self.expect("option")?;
        let name = self.parse_option_name()?;
        self.expect("=")?;
        let value = self.parse_option_value()?;
        self.expect(";")?;
        options.insert(name, value);
        Ok(())
    }

    /// `[name = value, ...]` after a field, enum value or range.
    fn parse_bracket_options(&mut self) -> Result<OptionMap, ProtoError> {
        let mut options = OptionMap::new();
        if !self.eat("[") {
            return Ok(options);
        }
        loop {
            let name = self.parse_option_name()?;
            self.expect("=")?;
            let value = self.parse_option_value()?;
            options.insert(name, value);
            if !self.eat(",") {
                break;
            }
        }
        self.expect("]")?;
        Ok(options)
    }

    /// `1, 5 to 9, 100 to max`
    fn parse_ranges(&mut self) -> Result<Vec<(i64, i64)>, ProtoError> {
        let mut ranges = Vec::new();
        loop {
            let lo = self.expect_integer()?;
            let hi = if self.eat("to") {
                if self.eat("max") {
                    ID_MAX as i64
                } else {
                    self.expect_integer()?
                }
            } else {
                lo
            };
            ranges.push((lo, hi));
            if !self.eat(",") {
                break;
            }
        }
        Ok(ranges)
    }

    /// `reserved` followed by either ranges or quoted names.
    fn parse_reserved(&mut self, ranges: &mut Vec<(i64, i64)>, names: &mut Vec<String>) -> Result<(), ProtoError> {
        self.expect("reserved")?;
        if self.current().is_string() {
            loop {
                names.push(self.expect_string()?);
                if !self.eat(",") {
                    break;
                }
            }
        } else {
            ranges.extend(self.parse_ranges()?);
        }
        self.expect(";")
    }

    /// Parses `message Name { ... }`. Group bodies found inside become nested
    /// messages of the result.
    fn parse_message(&mut self) -> Result<MessageDecl, ProtoError> {
        self.expect("message")?;
        let mut message = MessageDecl {
            name: self.expect_name()?,
            ..MessageDecl::default()
        };
        self.parse_message_body(&mut message)?;
        Ok(message)
    }

    fn parse_message_body(&mut self, message: &mut MessageDecl) -> Result<(), ProtoError> {
        self.expect("{")?;
        loop {
            match self.peek() {
                "}" => {
                    self.advance();
                    break;
                }
                "" => return Err(self.unexpected()),
                ";" => {
                    self.advance();
                }
                "message" => message.messages.push(self.parse_message()?),
                "enum" => message.enums.push(self.parse_enum()?),
                "extend" => {
                    let extend = self.parse_extend(&mut message.messages)?;
                    message.extends.push(extend);
                }
                "option" => self.parse_option_statement(&mut message.options)?,
                "extensions" => {
                    self.advance();
                    message.extensions.extend(self.parse_ranges()?);
                    self.parse_bracket_options()?;
                    self.expect(";")?;
                }
                "reserved" => self.parse_reserved(&mut message.reserved_ranges, &mut message.reserved_names)?,
                "oneof" => self.parse_oneof(message)?,
                "map" if self.peek_at(1) == "<" => {
                    let field = self.parse_map_field()?;
                    message.fields.push(field);
                }
                _ => {
                    let field = self.parse_field(&mut message.messages, None)?;
                    message.fields.push(field);
                }
            }
        }
        Ok(())
    }

    fn parse_oneof(&mut self, message: &mut MessageDecl) -> Result<(), ProtoError> {
        self.expect("oneof")?;
        let name = self.expect_name()?;
        self.expect("{")?;
        message.oneofs.push(name.clone());
        loop {
            match self.peek() {
                "}" => {
                    self.advance();
                    break;
                }
                "" => return Err(self.unexpected()),
                ";" => {
                    self.advance();
                }
                "option" => {
                    let mut ignored = OptionMap::new();
                    self.parse_option_statement(&mut ignored)?;
                }
                _ => {
                    let field = self.parse_field(&mut message.messages, Some(&name))?;
                    message.fields.push(field);
                }
            }
        }
        Ok(())
    }

    /// A labelled or unlabelled field, or a proto2 group. `nested` receives
    /// the body of a group.
    fn parse_field(&mut self, nested: &mut Vec<MessageDecl>, oneof: Option<&str>) -> Result<FieldDecl, ProtoError> {
        let label = Rule::from_name(self.peek()).filter(|rule| *rule != Rule::Map);
        let rule = match label {
            Some(rule) if oneof.is_some() => {
                return Err(self.fail(&format!("Fields in oneofs must not have labels, found {}", rule.as_str())));
            }
            Some(rule) => {
                self.advance();
                rule
            }
            None if oneof.is_some() || self.syntax == Syntax::Proto3 => Rule::Optional,
            None => return Err(self.fail(&format!("Expected field rule but found {}", quote(self.peek())))),
        };
        if rule == Rule::Required && self.syntax == Syntax::Proto3 {
            return Err(self.fail("Required fields are not allowed in proto3"));
        }

        if self.peek() == "group" && NAME.is_match(self.peek_at(1)) {
            return self.parse_group(rule, nested, oneof);
        }

        let type_ = self.expect_type_name()?;
        let name = self.expect_name()?;
        self.expect("=")?;
        let id = self.expect_integer()?;
        let options = self.parse_bracket_options()?;
        if self.syntax == Syntax::Proto3 && options.contains_key("default") {
            return Err(self.fail("Explicit default values are not allowed in proto3"));
        }
        self.expect(";")?;

        Ok(FieldDecl {
            rule,
            type_,
            key_type: None,
            name,
            id,
            options,
            oneof: oneof.map(str::to_owned),
        })
    }

    fn parse_group(&mut self, rule: Rule, nested: &mut Vec<MessageDecl>, oneof: Option<&str>) -> Result<FieldDecl, ProtoError> {
        if self.syntax == Syntax::Proto3 {
            return Err(self.fail("Groups are not allowed in proto3"));
        }
        self.expect("group")?;
        let name = self.expect_name()?;
        self.expect("=")?;
        let id = self.expect_integer()?;
        let options = self.parse_bracket_options()?;

        let mut group = MessageDecl {
            name: name.clone(),
            is_group: true,
            ..MessageDecl::default()
        };
        self.parse_message_body(&mut group)?;
        nested.push(group);

        Ok(FieldDecl {
            rule,
            type_: name.clone(),
            key_type: None,
            name: name.to_lowercase(),
            id,
            options,
            oneof: oneof.map(str::to_owned),
        })
    }

    fn parse_map_field(&mut self) -> Result<FieldDecl, ProtoError> {
        self.expect("map")?;
        self.expect("<")?;
        let key_type = self.expect_type_name()?;
        self.expect(",")?;
        let type_ = self.expect_type_name()?;
        self.expect(">")?;
        let name = self.expect_name()?;
        self.expect("=")?;
        let id = self.expect_integer()?;
        let options = self.parse_bracket_options()?;
        self.expect(";")?;

        Ok(FieldDecl {
            rule: Rule::Map,
            type_,
            key_type: Some(key_type),
            name,
            id,
            options,
            oneof: None,
        })
    }

    fn parse_enum(&mut self) -> Result<EnumDecl, ProtoError> {
        self.expect("enum")?;
        let mut decl = EnumDecl {
            name: self.expect_name()?,
            ..EnumDecl::default()
        };
        self.expect("{")?;
        loop {
            match self.peek() {
                "}" => {
                    self.advance();
                    break;
                }
                "" => return Err(self.unexpected()),
                ";" => {
                    self.advance();
                }
                "option" => self.parse_option_statement(&mut decl.options)?,
                "reserved" => self.parse_reserved(&mut decl.reserved_ranges, &mut decl.reserved_names)?,
                _ => {
                    let name = self.expect_name()?;
                    self.expect("=")?;
                    let id = self.expect_integer()?;
                    let options = self.parse_bracket_options()?;
                    self.expect(";")?;
                    decl.values.push(EnumValueDecl { name, id, options });
                }
            }
        }
        Ok(decl)
    }

    fn parse_service(&mut self) -> Result<ServiceDecl, ProtoError> {
        self.expect("service")?;
        let mut decl = ServiceDecl {
            name: self.expect_name()?,
            ..ServiceDecl::default()
        };
        self.expect("{")?;
        loop {
            match self.peek() {
                "}" => {
                    self.advance();
                    break;
                }
                "" => return Err(self.unexpected()),
                ";" => {
                    self.advance();
                }
                "option" => self.parse_option_statement(&mut decl.options)?,
                "rpc" => decl.methods.push(self.parse_method()?),
                _ => return Err(self.unexpected()),
            }
        }
        Ok(decl)
    }

    fn parse_method(&mut self) -> Result<MethodDecl, ProtoError> {
        self.expect("rpc")?;
        let name = self.expect_name()?;
        self.expect("(")?;
        let request_stream = self.peek() == "stream" && self.peek_at(1) != ")" && self.eat("stream");
        let request = self.expect_type_name()?;
        self.expect(")")?;
        self.expect("returns")?;
        self.expect("(")?;
        let response_stream = self.peek() == "stream" && self.peek_at(1) != ")" && self.eat("stream");
        let response = self.expect_type_name()?;
        self.expect(")")?;

        let mut options = OptionMap::new();
        if self.eat("{") {
            loop {
                match self.peek() {
                    "}" => {
                        self.advance();
                        break;
                    }
                    "" => return Err(self.unexpected()),
                    ";" => {
                        self.advance();
                    }
                    "option" => self.parse_option_statement(&mut options)?,
                    _ => return Err(self.unexpected()),
                }
            }
            self.eat(";");
        } else {
            self.expect(";")?;
        }

        Ok(MethodDecl {
            name,
            request,
            response,
            request_stream,
            response_stream,
            options,
        })
    }

    /// `extend Target { fields }`. Group bodies land in `scope`, the messages
    /// of the enclosing scope.
    fn parse_extend(&mut self, scope: &mut Vec<MessageDecl>) -> Result<ExtendDecl, ProtoError> {
        self.expect("extend")?;
        let mut decl = ExtendDecl {
            ref_: self.expect_type_name()?,
            fields: Vec::new(),
        };
        self.expect("{")?;
        loop {
            match self.peek() {
                "}" => {
                    self.advance();
                    break;
                }
                "" => return Err(self.unexpected()),
                ";" => {
                    self.advance();
                }
                _ => {
                    let field = self.parse_field(scope, None)?;
                    decl.fields.push(field);
                }
            }
        }
        Ok(decl)
    }
}

/// Appends the bytes of a string literal body, resolving escapes.
fn unescape(body: &str, out: &mut Vec<u8>) -> Result<(), String> {
    let bytes = body.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        i += 1;
        if c != b'\\' {
            out.push(c);
            continue;
        }
        let escape = *bytes.get(i).ok_or("Unterminated escape sequence")?;
        i += 1;
        match escape {
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0C),
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'v' => out.push(0x0B),
            b'\\' | b'\'' | b'"' | b'?' => out.push(escape),
            b'x' | b'X' => {
                let digits: String = body[i..].chars().take(2).take_while(char::is_ascii_hexdigit).collect();
                if digits.is_empty() {
                    return Err("Invalid hex escape".to_owned());
                }
                i += digits.len();
                out.push(u8::from_str_radix(&digits, 16).map_err(|e| e.to_string())?);
            }
            b'0'..=b'7' => {
                let digits: String = body[i - 1..].chars().take(3).take_while(|c| ('0'..='7').contains(c)).collect();
                i += digits.len() - 1;
                let value = u32::from_str_radix(&digits, 8).map_err(|e| e.to_string())?;
                out.push(u8::try_from(value).map_err(|_| format!("Octal escape \\{} out of range", digits))?);
            }
            other => return Err(format!("Invalid escape sequence \\{}", other as char)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unescaped(body: &str) -> Vec<u8> {
        let mut out = Vec::new();
        unescape(body, &mut out).unwrap();
        out
    }

    #[test]
    fn escapes() {
        assert_eq!(unescaped(r"a\nb"), b"a\nb");
        assert_eq!(unescaped(r"\x41\101\0"), b"AA\0");
        assert_eq!(unescaped(r#"\"\'\\"#), b"\"'\\");
        assert_eq!(unescaped(r"\a\b\f\v\t\r"), [7, 8, 12, 11, 9, 13]);
        assert!(unescape(r"\q", &mut Vec::new()).is_err());
        assert!(unescape(r"\777", &mut Vec::new()).is_err());
    }

    #[test]
    fn adjacent_strings_concatenate() {
        let schema = parse_schema(r#"syntax = "pro" 'to3'; package a.b;"#).unwrap();
        assert_eq!(schema.syntax, Syntax::Proto3);
        assert_eq!(schema.package.as_deref(), Some("a.b"));
    }

    #[test]
    fn option_values() {
        let schema = parse_schema(
            r#"option a = 1; option b = -0x10; option c = 1.5; option d = inf; option e = -inf;
               option f = true; option g = "s"; option (x.y).z = { k: 1 v: "w" };
               option h = 18446744073709551615;"#,
        )
        .unwrap();
        let o = &schema.options;
        assert_eq!(o["a"], OptionValue::Int(1));
        assert_eq!(o["b"], OptionValue::Int(-16));
        assert_eq!(o["c"], OptionValue::Float(1.5));
        assert_eq!(o["d"], OptionValue::String("inf".into()));
        assert_eq!(o["e"], OptionValue::String("-inf".into()));
        assert_eq!(o["f"], OptionValue::Bool(true));
        assert_eq!(o["g"], OptionValue::String("s".into()));
        assert_eq!(o["h"], OptionValue::String("18446744073709551615".into()));
        match o["(x.y).z"] {
            OptionValue::Aggregate(ref entries) => {
                assert_eq!(entries["k"], OptionValue::Int(1));
                assert_eq!(entries["v"], OptionValue::String("w".into()));
            }
            ref other => panic!("expected aggregate, got {:?}", other),
        }
    }
}
