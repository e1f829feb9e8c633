//! Strict decoder for authenticated SOAP responses
//!
//! Responses are parsed into a small element tree keyed by local name, so
//! namespace prefixes (`tds:`, `tt:`, `trt:` or vendor specific) do not
//! matter, but malformed XML does.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{Error, Result};
use crate::models::{DeviceInformation, ServiceXAddrs};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    /// Local name without prefix
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    fn from_start(e: &BytesStart<'_>) -> Result<Self> {
        let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in e.attributes() {
            let attr = attr.map_err(|e| Error::Parse(format!("bad attribute: {}", e)))?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| Error::Parse(format!("bad attribute value: {}", e)))?
                .into_owned();
            attributes.push((key, value));
        }
        Ok(Self {
            name,
            attributes,
            ..Default::default()
        })
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Follow a chain of child names
    pub fn path(&self, names: &[&str]) -> Option<&XmlElement> {
        names.iter().try_fold(self, |el, name| el.child(name))
    }

    /// Trimmed text of a direct child, `None` when absent or empty
    pub fn child_text(&self, name: &str) -> Option<String> {
        self.child(name)
            .map(|c| c.text.trim().to_string())
            .filter(|t| !t.is_empty())
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, el: XmlElement) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(el);
        Ok(())
    } else if root.is_none() {
        *root = Some(el);
        Ok(())
    } else {
        Err(Error::Parse("multiple root elements".to_string()))
    }
}

/// Parse a whole document into its root element
pub fn parse_document(xml: &str) -> Result<XmlElement> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => stack.push(XmlElement::from_start(&e)?),
            Ok(Event::Empty(e)) => {
                let el = XmlElement::from_start(&e)?;
                attach(&mut stack, &mut root, el)?;
            }
            Ok(Event::End(_)) => {
                let el = stack
                    .pop()
                    .ok_or_else(|| Error::Parse("unbalanced end tag".to_string()))?;
                attach(&mut stack, &mut root, el)?;
            }
            Ok(Event::Text(t)) => {
                if let Some(top) = stack.last_mut() {
                    let text = t
                        .unescape()
                        .map_err(|e| Error::Parse(format!("bad text: {}", e)))?;
                    top.text.push_str(&text);
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(Error::Parse(format!(
                    "XML error at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        }
    }

    if !stack.is_empty() {
        return Err(Error::Parse("unexpected end of document".to_string()));
    }
    root.ok_or_else(|| Error::Parse("empty document".to_string()))
}

/// Parse an envelope and return the named element inside `Body`
pub fn body_element(xml: &str, expected: &str) -> Result<XmlElement> {
    let root = parse_document(xml)?;
    if root.name != "Envelope" {
        return Err(Error::Parse(format!("root element is {}, not Envelope", root.name)));
    }
    let body = root
        .child("Body")
        .ok_or_else(|| Error::Parse("Envelope has no Body".to_string()))?;
    body.child(expected)
        .cloned()
        .ok_or_else(|| Error::Parse(format!("{} missing from response", expected)))
}

pub fn decode_device_information(el: &XmlElement) -> DeviceInformation {
    DeviceInformation {
        manufacturer: el.child_text("Manufacturer").unwrap_or_default(),
        model: el.child_text("Model").unwrap_or_default(),
        firmware_version: el.child_text("FirmwareVersion").unwrap_or_default(),
        serial_number: el.child_text("SerialNumber").unwrap_or_default(),
        hardware_id: el.child_text("HardwareId").unwrap_or_default(),
    }
}

pub fn decode_capabilities(el: &XmlElement) -> ServiceXAddrs {
    let caps = match el.child("Capabilities") {
        Some(c) => c,
        None => return ServiceXAddrs::default(),
    };
    let xaddr = |names: &[&str]| caps.path(names).and_then(|c| c.child_text("XAddr"));

    ServiceXAddrs {
        device: xaddr(&["Device"]),
        media: xaddr(&["Media"]).or_else(|| xaddr(&["Extension", "Media2"])),
        events: xaddr(&["Events"]),
        ptz: xaddr(&["PTZ"]),
        imaging: xaddr(&["Imaging"]),
    }
}

/// `(token, name)` per profile, in document order
pub fn decode_profiles(el: &XmlElement) -> Vec<(String, Option<String>)> {
    el.children_named("Profiles")
        .filter_map(|p| {
            let token = p.attr("token")?.to_string();
            Some((token, p.child_text("Name")))
        })
        .collect()
}

pub fn decode_stream_uri(el: &XmlElement) -> Option<String> {
    el.path(&["MediaUri"]).and_then(|m| m.child_text("Uri"))
}
