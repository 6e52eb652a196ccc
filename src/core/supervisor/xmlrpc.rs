//! Minimal XML-RPC codec for the supervisord API.
//!
//! Requests only ever carry string parameters, but responses use the full
//! value grammar (structs of mixed scalars, arrays of structs, faults), so the
//! decoder handles every standard value type.

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum XmlRpcError {
    #[error("invalid XML: {0}")]
    Xml(String),
    #[error("malformed XML-RPC document: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Str(String),
    Double(f64),
    DateTime(String),
    Base64(String),
    Array(Vec<Value>),
    Struct(BTreeMap<String, Value>),
    Nil,
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn member(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Struct(fields) => fields.get(key),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MethodResponse {
    Success(Value),
    Fault { code: i64, message: String },
}

pub fn encode_call(method: &str, params: &[Value]) -> String {
    let mut out = String::from("<?xml version=\"1.0\"?>\n<methodCall><methodName>");
    out.push_str(&quick_xml::escape::escape(method));
    out.push_str("</methodName><params>");
    for param in params {
        out.push_str("<param>");
        encode_value(param, &mut out);
        out.push_str("</param>");
    }
    out.push_str("</params></methodCall>");
    out
}

fn encode_value(value: &Value, out: &mut String) {
    out.push_str("<value>");
    match value {
        Value::Int(i) => out.push_str(&format!("<int>{}</int>", i)),
        Value::Bool(b) => out.push_str(&format!("<boolean>{}</boolean>", u8::from(*b))),
        Value::Str(s) => {
            out.push_str("<string>");
            out.push_str(&quick_xml::escape::escape(s.as_str()));
            out.push_str("</string>");
        }
        Value::Double(d) => out.push_str(&format!("<double>{}</double>", d)),
        Value::DateTime(s) => {
            out.push_str(&format!("<dateTime.iso8601>{}</dateTime.iso8601>", s))
        }
        Value::Base64(s) => out.push_str(&format!("<base64>{}</base64>", s)),
        Value::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                encode_value(item, out);
            }
            out.push_str("</data></array>");
        }
        Value::Struct(fields) => {
            out.push_str("<struct>");
            for (name, field) in fields {
                out.push_str("<member><name>");
                out.push_str(&quick_xml::escape::escape(name.as_str()));
                out.push_str("</name>");
                encode_value(field, out);
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
        Value::Nil => out.push_str("<nil/>"),
    }
    out.push_str("</value>");
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open(String),
    Close(String),
    Empty(String),
    Text(String),
}

fn tokenize(xml: &str) -> Result<Vec<Token>, XmlRpcError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut tokens = Vec::new();
    loop {
        let event = reader
            .read_event()
            .map_err(|e| XmlRpcError::Xml(e.to_string()))?;
        match event {
            Event::Start(e) => tokens.push(Token::Open(
                String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
            )),
            Event::End(e) => tokens.push(Token::Close(
                String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
            )),
            Event::Empty(e) => tokens.push(Token::Empty(
                String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
            )),
            Event::Text(t) => {
                let text = t.unescape().map_err(|e| XmlRpcError::Xml(e.to_string()))?;
                tokens.push(Token::Text(text.into_owned()));
            }
            Event::CData(c) => tokens.push(Token::Text(
                String::from_utf8_lossy(&c.into_inner()).into_owned(),
            )),
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(tokens)
}

struct Cursor {
    tokens: Vec<Token>,
    pos: usize,
}

impl Cursor {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn is_open(&self, tag: &str) -> bool {
        matches!(self.peek(), Some(Token::Open(t)) if t == tag)
    }

    fn is_empty_tag(&self, tag: &str) -> bool {
        matches!(self.peek(), Some(Token::Empty(t)) if t == tag)
    }

    fn expect_open(&mut self, tag: &str) -> Result<(), XmlRpcError> {
        match self.next() {
            Some(Token::Open(t)) if t == tag => Ok(()),
            other => Err(unexpected(&format!("<{}>", tag), other)),
        }
    }

    fn expect_close(&mut self, tag: &str) -> Result<(), XmlRpcError> {
        match self.next() {
            Some(Token::Close(t)) if t == tag => Ok(()),
            other => Err(unexpected(&format!("</{}>", tag), other)),
        }
    }

    /// Optional text followed by the closing tag.
    fn text_until_close(&mut self, tag: &str) -> Result<String, XmlRpcError> {
        let text = match self.peek() {
            Some(Token::Text(_)) => match self.next() {
                Some(Token::Text(t)) => t,
                _ => String::new(),
            },
            _ => String::new(),
        };
        self.expect_close(tag)?;
        Ok(text)
    }
}

fn unexpected(expected: &str, found: Option<Token>) -> XmlRpcError {
    let found = match found {
        Some(Token::Open(t)) => format!("<{}>", t),
        Some(Token::Close(t)) => format!("</{}>", t),
        Some(Token::Empty(t)) => format!("<{}/>", t),
        Some(Token::Text(t)) => format!("text {:?}", t),
        None => "end of document".to_string(),
    };
    XmlRpcError::Malformed(format!("expected {}, found {}", expected, found))
}

pub fn decode_response(xml: &str) -> Result<MethodResponse, XmlRpcError> {
    let mut cursor = Cursor {
        tokens: tokenize(xml)?,
        pos: 0,
    };

    cursor.expect_open("methodResponse")?;
    let response = if cursor.is_open("fault") {
        cursor.next();
        let fault = parse_value(&mut cursor)?;
        cursor.expect_close("fault")?;
        let code = match fault.member("faultCode") {
            Some(Value::Int(code)) => *code,
            _ => 0,
        };
        let message = fault
            .member("faultString")
            .and_then(Value::as_str)
            .unwrap_or("unknown fault")
            .to_string();
        MethodResponse::Fault { code, message }
    } else if cursor.is_empty_tag("params") {
        cursor.next();
        MethodResponse::Success(Value::Nil)
    } else {
        cursor.expect_open("params")?;
        cursor.expect_open("param")?;
        let value = parse_value(&mut cursor)?;
        cursor.expect_close("param")?;
        cursor.expect_close("params")?;
        MethodResponse::Success(value)
    };
    cursor.expect_close("methodResponse")?;
    Ok(response)
}

fn parse_value(cursor: &mut Cursor) -> Result<Value, XmlRpcError> {
    if cursor.is_empty_tag("value") {
        cursor.next();
        return Ok(Value::Str(String::new()));
    }
    cursor.expect_open("value")?;
    let value = match cursor.next() {
        // Untyped values are strings.
        Some(Token::Text(text)) => {
            cursor.expect_close("value")?;
            return Ok(Value::Str(text));
        }
        Some(Token::Close(t)) if t == "value" => return Ok(Value::Str(String::new())),
        Some(Token::Empty(tag)) => match tag.as_str() {
            "nil" => Value::Nil,
            "string" => Value::Str(String::new()),
            "array" => Value::Array(Vec::new()),
            "struct" => Value::Struct(BTreeMap::new()),
            other => {
                return Err(XmlRpcError::Malformed(format!(
                    "empty <{}/> is not a valid value",
                    other
                )));
            }
        },
        Some(Token::Open(tag)) => parse_typed(cursor, &tag)?,
        other => return Err(unexpected("a value", other)),
    };
    cursor.expect_close("value")?;
    Ok(value)
}

fn parse_typed(cursor: &mut Cursor, tag: &str) -> Result<Value, XmlRpcError> {
    match tag {
        "int" | "i4" | "i8" => {
            let text = cursor.text_until_close(tag)?;
            text.trim()
                .parse()
                .map(Value::Int)
                .map_err(|_| XmlRpcError::Malformed(format!("bad integer {:?}", text)))
        }
        "boolean" => match cursor.text_until_close(tag)?.trim() {
            "1" => Ok(Value::Bool(true)),
            "0" => Ok(Value::Bool(false)),
            other => Err(XmlRpcError::Malformed(format!("bad boolean {:?}", other))),
        },
        "double" => {
            let text = cursor.text_until_close(tag)?;
            text.trim()
                .parse()
                .map(Value::Double)
                .map_err(|_| XmlRpcError::Malformed(format!("bad double {:?}", text)))
        }
        "string" => Ok(Value::Str(cursor.text_until_close(tag)?)),
        "dateTime.iso8601" => Ok(Value::DateTime(cursor.text_until_close(tag)?)),
        "base64" => Ok(Value::Base64(cursor.text_until_close(tag)?)),
        "nil" => {
            cursor.expect_close(tag)?;
            Ok(Value::Nil)
        }
        "array" => {
            let mut items = Vec::new();
            if cursor.is_empty_tag("data") {
                cursor.next();
            } else {
                cursor.expect_open("data")?;
                while cursor.is_open("value") || cursor.is_empty_tag("value") {
                    items.push(parse_value(cursor)?);
                }
                cursor.expect_close("data")?;
            }
            cursor.expect_close("array")?;
            Ok(Value::Array(items))
        }
        "struct" => {
            let mut fields = BTreeMap::new();
            while cursor.is_open("member") {
                cursor.next();
                let name = if cursor.is_empty_tag("name") {
                    cursor.next();
                    String::new()
                } else {
                    cursor.expect_open("name")?;
                    cursor.text_until_close("name")?
                };
                let value = parse_value(cursor)?;
                cursor.expect_close("member")?;
                fields.insert(name, value);
            }
            cursor.expect_close("struct")?;
            Ok(Value::Struct(fields))
        }
        other => Err(XmlRpcError::Malformed(format!(
            "unsupported value type <{}>",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_PROCESS_INFO: &str = r#"<?xml version='1.0'?>
<methodResponse>
<params>
<param>
<value><array><data>
<value><struct>
<member><name>name</name><value><string>worker</string></value></member>
<member><name>group</name><value><string>web</string></value></member>
<member><name>statename</name><value><string>RUNNING</string></value></member>
<member><name>pid</name><value><int>4242</int></value></member>
<member><name>description</name><value><string>pid 4242, uptime 0:01:00</string></value></member>
</struct></value>
<value><struct>
<member><name>name</name><value>cron</value></member>
<member><name>statename</name><value><string>FATAL</string></value></member>
<member><name>description</name><value><string>Exited too quickly &amp; gave up</string></value></member>
</struct></value>
</data></array></value>
</param>
</params>
</methodResponse>"#;

    #[test]
    fn decodes_array_of_structs() {
        let value = match decode_response(ALL_PROCESS_INFO).unwrap() {
            MethodResponse::Success(value) => value,
            other => panic!("expected success, got {:?}", other),
        };
        let items = value.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].member("name").and_then(Value::as_str), Some("worker"));
        assert_eq!(items[0].member("pid"), Some(&Value::Int(4242)));
        // untyped value is a string
        assert_eq!(items[1].member("name").and_then(Value::as_str), Some("cron"));
        assert_eq!(
            items[1].member("description").and_then(Value::as_str),
            Some("Exited too quickly & gave up")
        );
        assert!(items[1].member("group").is_none());
    }

    #[test]
    fn decodes_fault() {
        let xml = r#"<?xml version="1.0"?>
<methodResponse><fault><value><struct>
<member><name>faultCode</name><value><int>10</int></value></member>
<member><name>faultString</name><value><string>BAD_NAME: nope</string></value></member>
</struct></value></fault></methodResponse>"#;
        assert_eq!(
            decode_response(xml).unwrap(),
            MethodResponse::Fault {
                code: 10,
                message: "BAD_NAME: nope".to_string()
            }
        );
    }

    #[test]
    fn decodes_boolean_result() {
        let xml = "<methodResponse><params><param><value><boolean>1</boolean></value></param></params></methodResponse>";
        assert_eq!(
            decode_response(xml).unwrap(),
            MethodResponse::Success(Value::Bool(true))
        );
    }

    #[test]
    fn empty_string_forms_decode_to_empty() {
        let xml = "<methodResponse><params><param><value><array><data><value/><value><string/></value><value></value></data></array></value></param></params></methodResponse>";
        let value = match decode_response(xml).unwrap() {
            MethodResponse::Success(value) => value,
            other => panic!("expected success, got {:?}", other),
        };
        assert_eq!(
            value,
            Value::Array(vec![
                Value::Str(String::new()),
                Value::Str(String::new()),
                Value::Str(String::new())
            ])
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode_response("<html><body>502 Bad Gateway</body></html>").is_err());
        assert!(decode_response("<methodResponse><params>").is_err());
        let bad_int = "<methodResponse><params><param><value><int>x</int></value></param></params></methodResponse>";
        assert!(matches!(
            decode_response(bad_int),
            Err(XmlRpcError::Malformed(_))
        ));
    }

    #[test]
    fn encodes_call_with_escaped_string_params() {
        let xml = encode_call(
            "supervisor.startProcess",
            &[Value::Str("web:<worker>&co".to_string())],
        );
        assert!(xml.contains("<methodName>supervisor.startProcess</methodName>"));
        assert!(xml.contains("<string>web:&lt;worker&gt;&amp;co</string>"));
        assert!(xml.ends_with("</params></methodCall>"));
    }
}
