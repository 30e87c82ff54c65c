//! Shared `<param key="" value=""/>` serialization, the same shape
//! `core-analysis` already uses for effect parameters. Every stock filter's
//! `write_state`/`read_state` is built on this so a saved state file reads
//! uniformly regardless of which filter produced a given fragment.

use std::collections::HashMap;
use std::fmt;

use quick_xml::events::Event;
use quick_xml::Reader;

pub fn write_param(w: &mut dyn fmt::Write, key: u32, value: impl fmt::Display) -> fmt::Result {
    write!(w, "<param key=\"{key}\" value=\"{value}\"/>")
}

/// Parse every top-level `<param key=".." value=".."/>` in a filter's own
/// state fragment (the exact bytes `write_param` emitted) into a lookup
/// table keyed by the numeric property key.
pub fn parse_params(xml: &str) -> Result<HashMap<u32, String>, String> {
    let mut reader = Reader::from_str(xml);
    let mut out = HashMap::new();
    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Eof => break,
            Event::Empty(e) if e.name().as_ref() == b"param" => {
                let mut key = None;
                let mut value = None;
                for attr in e.attributes() {
                    let attr = attr.map_err(|e| e.to_string())?;
                    let v = attr.unescape_value().map_err(|e| e.to_string())?.into_owned();
                    match attr.key.as_ref() {
                        b"key" => key = Some(v.parse::<u32>().map_err(|_| format!("bad param key {v:?}"))?),
                        b"value" => value = Some(v),
                        _ => {}
                    }
                }
                let key = key.ok_or("<param> missing key attribute")?;
                let value = value.ok_or("<param> missing value attribute")?;
                out.insert(key, value);
            }
            _ => {}
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_handful_of_params() {
        let mut frag = String::new();
        write_param(&mut frag, 0, "1000").unwrap();
        write_param(&mut frag, 1, true).unwrap();
        let parsed = parse_params(&frag).unwrap();
        assert_eq!(parsed.get(&0).map(String::as_str), Some("1000"));
        assert_eq!(parsed.get(&1).map(String::as_str), Some("true"));
    }

    #[test]
    fn missing_key_attribute_is_an_error() {
        assert!(parse_params("<param value=\"1\"/>").is_err());
    }
}
