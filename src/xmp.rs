//! Minimal XMP packet builder
//!
//! Renders the `x:xmpmeta`/RDF packet embedded alongside the EXIF block:
//! one `rdf:Description` carrying `dc:creator` (artist) and `dc:rights`
//! (copyright). Values are escaped on write, so reserved XML characters in
//! copyright text cannot produce a malformed packet.

use std::io::Cursor;

use quick_xml::{
    events::{BytesEnd, BytesPI, BytesStart, BytesText, Event},
    Writer,
};

use crate::error::{Error, Result};

const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
const DC_NS: &str = "http://purl.org/dc/elements/1.1/";
const XPACKET_BEGIN: &str = "xpacket begin=\"\u{FEFF}\" id=\"W5M0MpCehiHzreSzNTczkc9d\"";
const XPACKET_END: &str = "xpacket end=\"w\"";

/// Render an XMP packet (UTF-8 XML) with the given rights and creator.
///
/// `dc:creator` is included only when an artist is given, `dc:rights` only
/// when a copyright is given; empty strings still produce well-formed
/// (empty) entries. Never fails hard: an internal write error degrades to a
/// bare `x:xmpmeta` wrapper.
pub fn build_packet(copyright: Option<&str>, artist: Option<&str>) -> Vec<u8> {
    render(copyright, artist).unwrap_or_else(|err| {
        log::warn!("XMP render failed ({err}), writing empty packet");
        format!(
            "<?{XPACKET_BEGIN}?><x:xmpmeta xmlns:x=\"adobe:ns:meta/\"></x:xmpmeta><?{XPACKET_END}?>"
        )
        .into_bytes()
    })
}

fn emit(writer: &mut Writer<Cursor<Vec<u8>>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| Error::InvalidFormat(format!("XMP write error: {e}")))
}

fn render(copyright: Option<&str>, artist: Option<&str>) -> Result<Vec<u8>> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    emit(&mut writer, Event::PI(BytesPI::new(XPACKET_BEGIN)))?;

    let mut xmpmeta = BytesStart::new("x:xmpmeta");
    xmpmeta.push_attribute(("xmlns:x", "adobe:ns:meta/"));
    emit(&mut writer, Event::Start(xmpmeta))?;

    let mut rdf = BytesStart::new("rdf:RDF");
    rdf.push_attribute(("xmlns:rdf", RDF_NS));
    emit(&mut writer, Event::Start(rdf))?;

    let mut description = BytesStart::new("rdf:Description");
    description.push_attribute(("rdf:about", ""));
    description.push_attribute(("xmlns:dc", DC_NS));
    emit(&mut writer, Event::Start(description))?;

    if let Some(name) = artist {
        emit(&mut writer, Event::Start(BytesStart::new("dc:creator")))?;
        emit(&mut writer, Event::Start(BytesStart::new("rdf:Seq")))?;
        emit(&mut writer, Event::Start(BytesStart::new("rdf:li")))?;
        emit(&mut writer, Event::Text(BytesText::new(name)))?;
        emit(&mut writer, Event::End(BytesEnd::new("rdf:li")))?;
        emit(&mut writer, Event::End(BytesEnd::new("rdf:Seq")))?;
        emit(&mut writer, Event::End(BytesEnd::new("dc:creator")))?;
    }

    if let Some(text) = copyright {
        emit(&mut writer, Event::Start(BytesStart::new("dc:rights")))?;
        emit(&mut writer, Event::Start(BytesStart::new("rdf:Alt")))?;
        let mut li = BytesStart::new("rdf:li");
        li.push_attribute(("xml:lang", "x-default"));
        emit(&mut writer, Event::Start(li))?;
        emit(&mut writer, Event::Text(BytesText::new(text)))?;
        emit(&mut writer, Event::End(BytesEnd::new("rdf:li")))?;
        emit(&mut writer, Event::End(BytesEnd::new("rdf:Alt")))?;
        emit(&mut writer, Event::End(BytesEnd::new("dc:rights")))?;
    }

    emit(&mut writer, Event::End(BytesEnd::new("rdf:Description")))?;
    emit(&mut writer, Event::End(BytesEnd::new("rdf:RDF")))?;
    emit(&mut writer, Event::End(BytesEnd::new("x:xmpmeta")))?;
    emit(&mut writer, Event::PI(BytesPI::new(XPACKET_END)))?;

    Ok(writer.into_inner().into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet_str(copyright: Option<&str>, artist: Option<&str>) -> String {
        String::from_utf8(build_packet(copyright, artist)).unwrap()
    }

    #[test]
    fn test_both_fields() {
        let xmp = packet_str(Some("© 2025 Acme"), Some("J. Doe"));
        assert!(xmp.contains("x:xmpmeta"));
        assert!(xmp.contains("<dc:creator><rdf:Seq><rdf:li>J. Doe</rdf:li>"));
        assert!(xmp.contains("xml:lang=\"x-default\""));
        assert!(xmp.contains("© 2025 Acme"));
        assert!(xmp.ends_with("<?xpacket end=\"w\"?>"));
    }

    #[test]
    fn test_creator_only_when_artist_set() {
        let xmp = packet_str(Some("text"), None);
        assert!(xmp.contains("dc:rights"));
        assert!(!xmp.contains("dc:creator"));

        let xmp = packet_str(None, Some("name"));
        assert!(xmp.contains("dc:creator"));
        assert!(!xmp.contains("dc:rights"));
    }

    #[test]
    fn test_empty_value_is_well_formed() {
        let xmp = packet_str(Some(""), None);
        assert!(xmp.contains("<rdf:li xml:lang=\"x-default\"></rdf:li>"));
    }

    #[test]
    fn test_reserved_characters_are_escaped() {
        let xmp = packet_str(Some("A & B <C>"), None);
        assert!(xmp.contains("A &amp; B &lt;C&gt;"));
        assert!(!xmp.contains("A & B <C>"));
    }
}
