//! Classic-encoding front end: a hand-rolled tokenizer and a
//! schema-directed recursive descent parser that pushes the document into
//! a [`SceneHandler`].
//!
//! Field parsing is directed by the declarations of the enclosing node
//! type: node-valued fields recurse, everything else is captured as raw
//! value text for the downstream exporters to type.

use std::fmt::Display;

use crate::error::ExportError;
use crate::event::SceneHandler;
use crate::schema::{
    ExternProtoDef, FieldAccess, FieldDecl, FieldType, NodeKind, ProtoDef, SchemaSet, Storage,
};

const MAX_DEPTH: usize = 512;

#[derive(Debug)]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub col: usize,
}

impl ParseError {
    fn new(message: impl Into<String>, line: usize, col: usize) -> ParseError {
        ParseError {
            message: message.into(),
            line,
            col,
        }
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "parse error at {}:{}: {}",
            self.line, self.col, self.message
        ))
    }
}

impl From<ExportError> for ParseError {
    fn from(err: ExportError) -> ParseError {
        ParseError::new(format!("handler: {}", err), 0, 0)
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Ident,
    Number,
    Str,
    Punct,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    /// Raw source text; strings keep their quotes so value text can be
    /// reassembled verbatim.
    text: String,
    line: usize,
    col: usize,
}

fn tokenize(source: &str) -> ParseResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    let mut line = 1usize;
    let mut col = 1usize;

    macro_rules! bump {
        ($c:expr) => {{
            if $c == '\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
        }};
    }

    while let Some(&c) = chars.peek() {
        // commas are whitespace in the classic encoding
        if c.is_whitespace() || c == ',' {
            chars.next();
            bump!(c);
            continue;
        }
        if c == '#' {
            while let Some(&c) = chars.peek() {
                if c == '\n' {
                    break;
                }
                chars.next();
                bump!(c);
            }
            continue;
        }

        let (start_line, start_col) = (line, col);

        if c == '{' || c == '}' || c == '[' || c == ']' || c == '.' {
            chars.next();
            bump!(c);
            tokens.push(Token {
                kind: TokenKind::Punct,
                text: c.to_string(),
                line: start_line,
                col: start_col,
            });
            continue;
        }

        if c == '"' {
            let mut text = String::new();
            text.push(c);
            chars.next();
            bump!(c);
            let mut escaped = false;
            let mut closed = false;
            while let Some(&c) = chars.peek() {
                chars.next();
                bump!(c);
                text.push(c);
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    closed = true;
                    break;
                }
            }
            if !closed {
                return Err(ParseError::new("unterminated string", start_line, start_col));
            }
            tokens.push(Token {
                kind: TokenKind::Str,
                text,
                line: start_line,
                col: start_col,
            });
            continue;
        }

        if c.is_ascii_digit() || c == '+' || c == '-' || c == '.' {
            let mut text = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_ascii_hexdigit()
                    || matches!(c, '+' | '-' | '.' | 'x' | 'X' | 'e' | 'E')
                {
                    text.push(c);
                    chars.next();
                    bump!(c);
                } else {
                    break;
                }
            }
            tokens.push(Token {
                kind: TokenKind::Number,
                text,
                line: start_line,
                col: start_col,
            });
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let mut text = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_alphanumeric() || c == '_' {
                    text.push(c);
                    chars.next();
                    bump!(c);
                } else {
                    break;
                }
            }
            tokens.push(Token {
                kind: TokenKind::Ident,
                text,
                line: start_line,
                col: start_col,
            });
            continue;
        }

        return Err(ParseError::new(
            format!("unexpected character '{}'", c),
            line,
            col,
        ));
    }

    Ok(tokens)
}

/// Parse a classic-encoding document, pushing events into `handler`.
pub fn parse<H: SceneHandler>(source: &str, handler: &mut H) -> ParseResult<()> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        schemas: SchemaSet::new(),
        depth: 0,
    };
    parser.document(handler)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    schemas: SchemaSet,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> ParseResult<Token> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| self.eof("unexpected end of input"))?;
        self.pos += 1;
        Ok(token)
    }

    fn eof(&self, message: &str) -> ParseError {
        let (line, col) = self
            .tokens
            .last()
            .map(|t| (t.line, t.col))
            .unwrap_or((1, 1));
        ParseError::new(message, line, col)
    }

    fn error_at(&self, token: &Token, message: impl Into<String>) -> ParseError {
        ParseError::new(message, token.line, token.col)
    }

    fn expect_punct(&mut self, punct: char) -> ParseResult<()> {
        let token = self.next()?;
        if token.kind != TokenKind::Punct || token.text != punct.to_string() {
            return Err(self.error_at(&token, format!("expected '{}', found '{}'", punct, token.text)));
        }
        Ok(())
    }

    fn expect_ident(&mut self) -> ParseResult<Token> {
        let token = self.next()?;
        if token.kind != TokenKind::Ident {
            return Err(self.error_at(&token, format!("expected a name, found '{}'", token.text)));
        }
        Ok(token)
    }

    fn at_punct(&self, punct: char) -> bool {
        matches!(self.peek(), Some(token) if token.kind == TokenKind::Punct && token.text == punct.to_string())
    }

    fn document<H: SceneHandler>(&mut self, handler: &mut H) -> ParseResult<()> {
        while let Some(token) = self.peek() {
            let keyword = token.text.clone();
            match keyword.as_str() {
                "PROTO" => self.proto_decl(handler)?,
                "EXTERNPROTO" => self.extern_proto_decl(handler)?,
                "ROUTE" => self.route(handler)?,
                _ => self.node(handler)?,
            }
        }

        Ok(())
    }

    fn node<H: SceneHandler>(&mut self, handler: &mut H) -> ParseResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.eof("node nesting too deep"));
        }

        let token = self.expect_ident()?;
        let (def_name, type_token) = if token.text == "USE" {
            let name = self.expect_ident()?;
            handler.use_ref(&name.text)?;
            self.depth -= 1;
            return Ok(());
        } else if token.text == "DEF" {
            let def = self.expect_ident()?;
            (Some(def.text), self.expect_ident()?)
        } else {
            (None, token)
        };

        let kind = self
            .schemas
            .resolve(&type_token.text)
            .ok_or_else(|| {
                self.error_at(&type_token, format!("unknown node type '{}'", type_token.text))
            })?;

        handler.start_node(&type_token.text, def_name.as_deref())?;
        self.expect_punct('{')?;

        while !self.at_punct('}') {
            let token = self.peek().ok_or_else(|| self.eof("unclosed node body"))?;
            if token.text == "ROUTE" {
                self.route(handler)?;
                continue;
            }
            self.field(&kind, handler)?;
        }
        self.expect_punct('}')?;

        handler.end_node()?;
        self.depth -= 1;

        Ok(())
    }

    fn field<H: SceneHandler>(&mut self, kind: &NodeKind, handler: &mut H) -> ParseResult<()> {
        let name_token = self.expect_ident()?;
        let decl = kind.field_declaration(&name_token.text).ok_or_else(|| {
            self.error_at(
                &name_token,
                format!(
                    "unknown field '{}' for node type '{}'",
                    name_token.text,
                    kind.name()
                ),
            )
        })?;
        let field_type = decl.field_type;

        handler.start_field(&name_token.text)?;

        match field_type {
            FieldType::SFNode => {
                if matches!(self.peek(), Some(token) if token.text == "NULL") {
                    self.next()?;
                    handler.field_value(None)?;
                } else {
                    self.node(handler)?;
                }
            }
            FieldType::MFNode => {
                if self.at_punct('[') {
                    self.next()?;
                    if self.at_punct(']') {
                        self.next()?;
                        handler.field_value(None)?;
                    } else {
                        while !self.at_punct(']') {
                            if self.peek().is_none() {
                                return Err(self.eof("unclosed node list"));
                            }
                            self.node(handler)?;
                        }
                        self.next()?;
                        handler.end_field()?;
                    }
                } else if matches!(self.peek(), Some(token) if token.text == "NULL") {
                    self.next()?;
                    handler.field_value(None)?;
                } else {
                    // a lone node is a one-element list
                    self.node(handler)?;
                    handler.end_field()?;
                }
            }
            _ => {
                let raw = self.value_text(field_type)?;
                handler.field_value(Some(&raw))?;
            }
        }

        Ok(())
    }

    /// Capture the raw text of a non-node field value.
    fn value_text(&mut self, field_type: FieldType) -> ParseResult<String> {
        if self.at_punct('[') {
            self.next()?;
            let mut parts = vec!["[".to_string()];
            loop {
                let token = self.next()?;
                if token.kind == TokenKind::Punct && token.text == "]" {
                    parts.push("]".to_string());
                    break;
                }
                if token.kind == TokenKind::Punct {
                    return Err(
                        self.error_at(&token, format!("unexpected '{}' in value", token.text))
                    );
                }
                parts.push(token.text);
            }
            return Ok(parts.join(" "));
        }

        // unbracketed: the declared type decides how many tokens one value
        // spans
        let count = match field_type.storage() {
            Storage::Str | Storage::StrArray => 1,
            Storage::IntArray if field_type.fixed_len().is_none() => {
                return self.image_value_text(field_type)
            }
            _ => field_type.fixed_len().unwrap_or(field_type.span()),
        };

        let mut parts = Vec::with_capacity(count);
        for _ in 0..count {
            let token = self.next()?;
            if token.kind == TokenKind::Punct {
                return Err(self.error_at(&token, format!("unexpected '{}' in value", token.text)));
            }
            parts.push(token.text);
        }

        Ok(parts.join(" "))
    }

    /// SFImage (and an unbracketed MFInt32 single value): width, height,
    /// components, then width × height pixel values.
    fn image_value_text(&mut self, field_type: FieldType) -> ParseResult<String> {
        if field_type != FieldType::SFImage {
            // single unbracketed integer
            let token = self.next()?;
            return Ok(token.text);
        }

        let mut parts = Vec::new();
        let mut dims = [0u64; 2];
        for dim in &mut dims {
            let token = self.next()?;
            *dim = token.text.parse().map_err(|_| {
                self.error_at(&token, format!("invalid image dimension '{}'", token.text))
            })?;
            parts.push(token.text);
        }
        let components = self.next()?;
        parts.push(components.text);

        for _ in 0..dims[0] * dims[1] {
            parts.push(self.next()?.text);
        }

        Ok(parts.join(" "))
    }

    fn field_decl_header(&mut self) -> ParseResult<(FieldAccess, FieldType, String)> {
        let access_token = self.expect_ident()?;
        let access = FieldAccess::parse(&access_token.text).ok_or_else(|| {
            self.error_at(
                &access_token,
                format!("expected an access type, found '{}'", access_token.text),
            )
        })?;

        let type_token = self.expect_ident()?;
        let field_type = FieldType::parse(&type_token.text).ok_or_else(|| {
            self.error_at(
                &type_token,
                format!("unknown field type '{}'", type_token.text),
            )
        })?;

        let name = self.expect_ident()?;

        Ok((access, field_type, name.text))
    }

    fn proto_decl<H: SceneHandler>(&mut self, handler: &mut H) -> ParseResult<()> {
        self.next()?; // PROTO
        let name = self.expect_ident()?;
        handler.start_proto_decl(&name.text)?;

        let mut fields = Vec::new();
        let mut raw_defaults = Vec::new();

        self.expect_punct('[')?;
        while !self.at_punct(']') {
            if self.peek().is_none() {
                return Err(self.eof("unclosed proto interface"));
            }
            let (access, field_type, field_name) = self.field_decl_header()?;

            let default = if matches!(access, FieldAccess::Field | FieldAccess::ExposedField) {
                if field_type.is_node() {
                    let token = self.next()?;
                    if token.text != "NULL" && !(token.text == "[") {
                        return Err(self.error_at(
                            &token,
                            "only NULL or [] node defaults are supported in declarations",
                        ));
                    }
                    if token.text == "[" {
                        self.expect_punct(']')?;
                    }
                    None
                } else {
                    Some(self.value_text(field_type)?)
                }
            } else {
                None
            };

            handler.proto_field_decl(access, field_type, &field_name, default.as_deref())?;

            let mut decl = FieldDecl::new(access, field_type, &field_name);
            if let Some(raw) = &default {
                decl.default = crate::values::FieldValue::parse(field_type, raw).ok();
            }
            fields.push(decl);
            raw_defaults.push(default);
        }
        self.expect_punct(']')?;
        handler.end_proto_decl()?;

        // the body was resolved upstream; skip it wholesale
        self.expect_punct('{')?;
        let mut depth = 1usize;
        while depth > 0 {
            let token = self.next()?;
            if token.kind == TokenKind::Punct {
                match token.text.as_str() {
                    "{" => depth += 1,
                    "}" => depth -= 1,
                    _ => {}
                }
            }
        }

        self.schemas.add_proto(ProtoDef {
            name: name.text,
            fields,
            raw_defaults,
        });

        Ok(())
    }

    fn extern_proto_decl<H: SceneHandler>(&mut self, handler: &mut H) -> ParseResult<()> {
        self.next()?; // EXTERNPROTO
        let name = self.expect_ident()?;
        handler.start_extern_proto_decl(&name.text)?;

        let mut fields = Vec::new();

        self.expect_punct('[')?;
        while !self.at_punct(']') {
            if self.peek().is_none() {
                return Err(self.eof("unclosed externproto interface"));
            }
            let (access, field_type, field_name) = self.field_decl_header()?;
            handler.proto_field_decl(access, field_type, &field_name, None)?;
            fields.push(FieldDecl::new(access, field_type, &field_name));
        }
        self.expect_punct(']')?;

        let mut uris = Vec::new();
        if self.at_punct('[') {
            self.next()?;
            while !self.at_punct(']') {
                let token = self.next()?;
                if token.kind != TokenKind::Str {
                    return Err(self.error_at(&token, "expected a URL string"));
                }
                uris.push(unquote(&token.text));
            }
            self.next()?;
        } else {
            let token = self.next()?;
            if token.kind != TokenKind::Str {
                return Err(self.error_at(&token, "expected a URL string"));
            }
            uris.push(unquote(&token.text));
        }

        handler.extern_proto_uri(&uris)?;
        handler.end_extern_proto_decl()?;

        self.schemas.add_extern(ExternProtoDef {
            name: name.text,
            fields,
            uris,
        });

        Ok(())
    }

    fn route<H: SceneHandler>(&mut self, handler: &mut H) -> ParseResult<()> {
        self.next()?; // ROUTE
        let src_def = self.expect_ident()?;
        self.expect_punct('.')?;
        let src_field = self.expect_ident()?;

        let to = self.expect_ident()?;
        if to.text != "TO" {
            return Err(self.error_at(&to, format!("expected TO, found '{}'", to.text)));
        }

        let dest_def = self.expect_ident()?;
        self.expect_punct('.')?;
        let dest_field = self.expect_ident()?;

        handler.route(
            &src_def.text,
            &src_field.text,
            &dest_def.text,
            &dest_field.text,
        )?;

        Ok(())
    }
}

fn unquote(raw: &str) -> String {
    let inner = raw
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(raw);
    let mut out = String::with_capacity(inner.len());
    let mut escaped = false;
    for c in inner.chars() {
        if escaped {
            out.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::event::{Event, EventBuffer};

    fn parse_to_events(source: &str) -> EventBuffer {
        let mut events = EventBuffer::new();
        parse(source, &mut events).unwrap();
        events
    }

    #[test]
    fn test_parse_simple_scene() {
        let events = parse_to_events(
            "#VRML V2.0 utf8\n\
             DEF T Transform {\n\
               translation 1 2 3\n\
               children [\n\
                 Shape { geometry Box { size 1 1 1 } }\n\
                 USE T\n\
               ]\n\
             }\n",
        );

        let expected = [
            Event::StartNode {
                name: "Transform".to_string(),
                def_name: Some("T".to_string()),
            },
            Event::StartField {
                name: "translation".to_string(),
            },
            Event::FieldValue {
                value: Some("1 2 3".to_string()),
            },
            Event::StartField {
                name: "children".to_string(),
            },
            Event::StartNode {
                name: "Shape".to_string(),
                def_name: None,
            },
            Event::StartField {
                name: "geometry".to_string(),
            },
            Event::StartNode {
                name: "Box".to_string(),
                def_name: None,
            },
            Event::StartField {
                name: "size".to_string(),
            },
            Event::FieldValue {
                value: Some("1 1 1".to_string()),
            },
            Event::EndNode,
            Event::EndNode,
            Event::UseRef {
                def_name: "T".to_string(),
            },
            Event::EndField,
            Event::EndNode,
        ];
        assert_eq!(events.events(), expected);
    }

    #[test]
    fn test_parse_bracketed_values_and_comments() {
        let events = parse_to_events(
            "Shape {\n\
               geometry IndexedFaceSet {\n\
                 coord Coordinate { point [ 0 0 0, 1 0 0, 0 1 0 ] } # triangle\n\
                 coordIndex [ 0, 1, 2, -1 ]\n\
               }\n\
             }\n",
        );

        assert!(events.events().iter().any(|e| matches!(
            e,
            Event::FieldValue { value: Some(v) } if v == "[ 0 0 0 1 0 0 0 1 0 ]"
        )));
        assert!(events.events().iter().any(|e| matches!(
            e,
            Event::FieldValue { value: Some(v) } if v == "[ 0 1 2 -1 ]"
        )));
    }

    #[test]
    fn test_parse_strings() {
        let events = parse_to_events(
            "WorldInfo { title \"a \\\"b\\\" c\" info [ \"x\" \"y\" ] }",
        );
        assert!(events.events().iter().any(|e| matches!(
            e,
            Event::FieldValue { value: Some(v) } if v == "\"a \\\"b\\\" c\""
        )));
    }

    #[test]
    fn test_parse_route_and_proto() {
        let events = parse_to_events(
            "PROTO Spinner [\n\
               field SFVec3f axis 0 1 0\n\
               eventIn SFFloat set_speed\n\
             ] { Group {} }\n\
             DEF S Spinner { axis 1 0 0 }\n\
             DEF CLOCK TimeSensor { loop TRUE }\n\
             ROUTE CLOCK.fraction_changed TO S.set_speed\n",
        );

        assert!(events.events().iter().any(|e| matches!(
            e,
            Event::ProtoFieldDecl { name, default: Some(d), .. }
                if name == "axis" && d == "0 1 0"
        )));
        assert!(events.events().iter().any(|e| matches!(
            e,
            Event::StartNode { name, .. } if name == "Spinner"
        )));
        assert!(events.events().iter().any(|e| matches!(
            e,
            Event::Route { src_def, dest_field, .. }
                if src_def == "CLOCK" && dest_field == "set_speed"
        )));
    }

    #[test]
    fn test_parse_sfnode_null() {
        let events = parse_to_events("Shape { appearance NULL geometry Sphere { } }");
        assert!(events
            .events()
            .iter()
            .any(|e| matches!(e, Event::FieldValue { value: None })));
    }

    #[test]
    fn test_parse_error_reports_position() {
        let mut events = EventBuffer::new();
        let err = parse("Transform { translation 1 2 }", &mut events).unwrap_err();
        assert!(err.line >= 1);
        let err = parse("NotANode { }", &mut events).unwrap_err();
        assert!(err.message.contains("NotANode"));
    }

    #[test]
    fn test_parse_encode_decode_print_pipeline() {
        use crate::encoding::binary;
        use crate::encoding::classic::ClassicExporter;
        use crate::options::ExportOptions;

        let source = "\
#VRML V2.0 utf8
DEF ROOT Transform {
  translation 0 1.5 0
  children [
    DEF CLOCK TimeSensor {
      loop TRUE
      cycleInterval 4
    }
    Shape {
      appearance Appearance {
        material Material { diffuseColor 0.2 0.4 0.9 }
      }
      geometry IndexedFaceSet {
        coord Coordinate { point [ 0 0 0, 1 0 0, 1 1 0 ] }
        coordIndex [ 0 1 2 -1 ]
      }
    }
  ]
}
ROUTE CLOCK.fraction_changed TO ROOT.rotation
";

        let mut events = EventBuffer::new();
        parse(source, &mut events).unwrap();

        let options = ExportOptions::default();
        let mut bytes = Vec::new();
        binary::export(&events, &mut bytes, &options).unwrap();

        let mut decoded = EventBuffer::new();
        binary::decode::decode(&bytes, &mut decoded, &options).unwrap();

        let mut printer = ClassicExporter::new(Vec::new());
        decoded.replay(&mut printer).unwrap();
        let printed = String::from_utf8(printer.into_inner()).unwrap();

        // the reprinted text parses back to the decoded event stream
        let mut reparsed = EventBuffer::new();
        parse(&printed, &mut reparsed).unwrap();
        assert_eq!(reparsed.events(), decoded.events());

        assert!(printed.contains("DEF CLOCK TimeSensor"));
        assert!(printed.contains("ROUTE CLOCK.fraction_changed TO ROOT.rotation"));
    }

    #[test]
    fn test_parse_unbracketed_mfnode_child() {
        let events = parse_to_events("Group { children Shape { } }");
        let has_end_field = events
            .events()
            .iter()
            .any(|e| matches!(e, Event::EndField));
        assert!(has_end_field);
    }
}
