//! XML codec for the settings document
//!
//! Layout on disk:
//!
//! ```xml
//! <?xml version="1.0" encoding="utf-8"?>
//! <settings>
//!     <!--operator-facing header-->
//!     <port>1194</port>
//!     <dns/>
//!     <clients>
//!         <KqzLmPwTeRaXbYcD>
//!             <name>laptop</name>
//!             <users>alice,bob</users>
//!         </KqzLmPwTeRaXbYcD>
//!     </clients>
//! </settings>
//! ```

use crate::schema::CLIENTS_KEY;
use crate::settings::{Client, Settings};
use crate::value::Value;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::io::Cursor;

/// Root element name
pub const ROOT_TAG: &str = "settings";

/// Result of parsing a settings document
#[derive(Debug)]
pub struct ParsedDocument {
    /// Decoded settings
    pub settings: Settings,
    /// Whether the `clients` element was present
    pub has_registry: bool,
}

#[derive(Debug, Default)]
struct Element {
    tag: String,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn child(&self, tag: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.tag == tag)
    }
}

// ─── Parsing ─────────────────────────────────────────────────────────────────

/// Parse a settings document. Any structural problem is an error: a
/// document that cannot be read faithfully must not be acted on.
pub fn parse(content: &str) -> Result<ParsedDocument, String> {
    let root = parse_tree(content)?;
    if root.tag != ROOT_TAG {
        return Err(format!("root element is <{}>, expected <{}>", root.tag, ROOT_TAG));
    }

    let mut settings = Settings::new();
    settings.set_header(first_comment(content));
    let mut has_registry = false;

    for child in &root.children {
        if Settings::is_registry_key(&child.tag) {
            has_registry = true;
            for entry in &child.children {
                settings.insert_client(parse_client(entry)?);
            }
        } else if !child.children.is_empty() {
            return Err(format!("unexpected nested element <{}>", child.tag));
        } else {
            settings.set(&child.tag, Value::decode(&child.text));
        }
    }

    Ok(ParsedDocument {
        settings,
        has_registry,
    })
}

fn parse_client(entry: &Element) -> Result<Client, String> {
    let name = entry
        .child("name")
        .map(|n| n.text.clone())
        .ok_or_else(|| format!("client <{}> has no <name>", entry.tag))?;
    if name.is_empty() {
        return Err(format!("client <{}> has an empty <name>", entry.tag));
    }
    let users = entry.child("users").map(|u| u.text.clone()).unwrap_or_default();

    Ok(Client {
        id: entry.tag.clone(),
        name,
        users,
    })
}

fn parse_tree(content: &str) -> Result<Element, String> {
    // Leaf text is kept verbatim, so no trimming at the reader
    let mut reader = Reader::from_str(content);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                stack.push(Element {
                    tag: tag_name(e)?,
                    ..Default::default()
                });
            }
            Ok(Event::Empty(ref e)) => {
                let element = Element {
                    tag: tag_name(e)?,
                    ..Default::default()
                };
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::End(_)) => {
                let mut element = stack
                    .pop()
                    .ok_or_else(|| "closing tag without an opening tag".to_string())?;
                if !element.children.is_empty() {
                    // indentation between child elements
                    element.text.clear();
                }
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| format!("bad text at position {}: {}", reader.buffer_position(), e))?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format!(
                    "XML error at position {}: {}",
                    reader.buffer_position(),
                    e
                ))
            }
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err("unexpected end of document".to_string());
    }
    root.ok_or_else(|| "document has no root element".to_string())
}

fn tag_name(e: &BytesStart<'_>) -> Result<String, String> {
    std::str::from_utf8(e.name().as_ref())
        .map(str::to_string)
        .map_err(|_| "invalid UTF-8 in tag name".to_string())
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<(), String> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(element);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(element);
            Ok(())
        }
        None => Err(format!("second root element <{}>", element.tag)),
    }
}

/// First comment inside the root element, verbatim
fn first_comment(content: &str) -> Option<String> {
    let open = format!("<{}>", ROOT_TAG);
    let start = content.find(&open)?;
    let body = &content[start..];
    let begin = body.find("<!--")? + "<!--".len();
    let end = body[begin..].find("-->")? + begin;
    Some(body[begin..end].to_string())
}

// ─── Rendering ───────────────────────────────────────────────────────────────

/// Render settings as a tab-indented XML document
pub fn render(settings: &Settings) -> Result<String, String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b'\t', 1);

    write(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    write(&mut writer, Event::Start(BytesStart::new(ROOT_TAG)))?;

    if let Some(header) = settings.header() {
        write(&mut writer, Event::Comment(BytesText::from_escaped(header)))?;
    }

    for (key, value) in settings.options() {
        write_leaf(&mut writer, key, &value.encode())?;
    }

    if settings.clients().is_empty() {
        write(&mut writer, Event::Empty(BytesStart::new(CLIENTS_KEY)))?;
    } else {
        write(&mut writer, Event::Start(BytesStart::new(CLIENTS_KEY)))?;
        for (id, client) in settings.clients() {
            write(&mut writer, Event::Start(BytesStart::new(id.as_str())))?;
            write_leaf(&mut writer, "name", &client.name)?;
            write_leaf(&mut writer, "users", &client.users)?;
            write(&mut writer, Event::End(BytesEnd::new(id.as_str())))?;
        }
        write(&mut writer, Event::End(BytesEnd::new(CLIENTS_KEY)))?;
    }

    write(&mut writer, Event::End(BytesEnd::new(ROOT_TAG)))?;

    let mut out = String::from_utf8(writer.into_inner().into_inner()).map_err(|e| e.to_string())?;
    out.push('\n');
    Ok(out)
}

fn write_leaf<W: std::io::Write>(writer: &mut Writer<W>, tag: &str, text: &str) -> Result<(), String> {
    if text.is_empty() {
        return write(writer, Event::Empty(BytesStart::new(tag)));
    }
    write(writer, Event::Start(BytesStart::new(tag)))?;
    write(writer, Event::Text(BytesText::new(text)))?;
    write(writer, Event::End(BytesEnd::new(tag)))
}

fn write<W: std::io::Write>(writer: &mut Writer<W>, event: Event<'_>) -> Result<(), String> {
    writer.write_event(event).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<settings>
	<!--Managed by ovpnctl-->
	<port>1194</port>
	<protocol>udp</protocol>
	<compression>true</compression>
	<dns/>
	<clients>
		<AbCdEfGhIjKlMnOp>
			<name>laptop</name>
			<users>alice,bob</users>
		</AbCdEfGhIjKlMnOp>
	</clients>
</settings>
"#;

    #[test]
    fn test_parse_sample() {
        let doc = parse(SAMPLE).unwrap();
        let s = &doc.settings;
        assert!(doc.has_registry);
        assert_eq!(s.header(), Some("Managed by ovpnctl"));
        assert_eq!(s.get("port"), Some(&Value::Int(1194)));
        assert_eq!(s.get("compression"), Some(&Value::Bool(true)));
        assert_eq!(s.get("dns"), Some(&Value::Text(String::new())));
        let client = s.client_by_name("laptop").unwrap();
        assert_eq!(client.id, "AbCdEfGhIjKlMnOp");
        assert_eq!(client.users, "alice,bob");
    }

    #[test]
    fn test_render_then_parse_is_identity() {
        let first = parse(SAMPLE).unwrap().settings;
        let rendered = render(&first).unwrap();
        let second = parse(&rendered).unwrap().settings;
        assert_eq!(first, second);
        assert!(rendered.contains("<!--Managed by ovpnctl-->"));
        assert!(rendered.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
    }

    #[test]
    fn test_empty_registry_renders_element() {
        let rendered = render(&Settings::with_defaults()).unwrap();
        assert!(rendered.contains("<clients/>"));
        assert!(parse(&rendered).unwrap().has_registry);
    }

    #[test]
    fn test_text_is_escaped() {
        let mut settings = Settings::with_defaults();
        settings.set("extra_options", "push \"route 10.0.0.0 255.0.0.0\",tls-version-min 1.2");
        let parsed = parse(&render(&settings).unwrap()).unwrap().settings;
        assert_eq!(parsed.list("extra_options").len(), 2);
        assert_eq!(parsed.text("extra_options"), settings.text("extra_options"));
    }

    #[test]
    fn test_document_order_is_kept() {
        let doc = parse(SAMPLE).unwrap().settings;
        let rendered = render(&doc).unwrap();
        let port = rendered.find("<port>").unwrap();
        let protocol = rendered.find("<protocol>").unwrap();
        let compression = rendered.find("<compression>").unwrap();
        let dns = rendered.find("<dns/>").unwrap();
        assert!(port < protocol && protocol < compression && compression < dns);
    }

    #[test]
    fn test_leaf_whitespace_is_kept() {
        let doc = SAMPLE.replace(
            "<dns/>",
            "<dns/>\n\t<public_address> vpn.example.org </public_address>",
        );
        let first = parse(&doc).unwrap().settings;
        assert_eq!(first.get("public_address"), Some(&Value::Text(" vpn.example.org ".into())));
        assert_eq!(first.client_by_name("laptop").unwrap().users, "alice,bob");

        let rendered = render(&first).unwrap();
        assert!(rendered.contains("<public_address> vpn.example.org </public_address>"));
        assert_eq!(parse(&rendered).unwrap().settings, first);
    }

    #[test]
    fn test_malformed_documents() {
        assert!(parse("<settings><port>1194</settings>").is_err());
        assert!(parse("<config><port>1</port></config>").is_err());
        assert!(parse("").is_err());
        assert!(parse("<settings><nested><a>1</a></nested></settings>").is_err());
        assert!(parse("<settings><clients><X><users>a</users></X></clients></settings>").is_err());
    }
}
