/// Parser for JaCoCo XML coverage reports.
///
/// JaCoCo XML structure:
///   <report name="...">
///     <sessioninfo id="..." start="..." dump="..."/>
///     <package name="com/example">
///       <class name="com/example/Foo" sourcefilename="Foo.java">
///         ...
///       </class>
///       <sourcefile name="Foo.java">
///         <line nr="10" mi="0" ci="3" mb="0" cb="2"/>
///         <line nr="11" mi="0" ci="5" mb="1" cb="1"/>
///         ...
///       </sourcefile>
///     </package>
///   </report>
///
/// Only the `<sourcefile>/<line>` elements matter here. A line counts as
/// executed when `ci` (covered instructions) is greater than zero. Paths are
/// the package name joined with the source filename.
use std::io::BufRead;

use quick_xml::events::Event;

use super::{get_attr, xml_err};
use crate::error::{HarvestError, Result};
use crate::model::CoverageFact;

/// Parse JaCoCo XML coverage data from raw bytes.
pub fn parse(input: &[u8]) -> Result<Vec<CoverageFact>> {
    let mut facts = Vec::new();
    parse_streaming(&mut &*input, &mut |fact| {
        facts.push(fact);
        Ok(())
    })?;
    Ok(facts)
}

/// Streaming JaCoCo parser. Calls `emit` once per `<line>` inside a
/// `<sourcefile>`.
pub fn parse_streaming(
    reader: &mut dyn BufRead,
    emit: &mut dyn FnMut(CoverageFact) -> Result<()>,
) -> Result<()> {
    let mut xml = super::xml_reader(reader);
    let mut buf = Vec::new();

    let mut current_package: Option<String> = None;
    let mut current_sourcefile: Option<String> = None;

    loop {
        let event = xml.read_event_into(&mut buf);
        let is_start_event = matches!(&event, Ok(Event::Start(_)));
        match event {
            Err(e) => return Err(xml_err(e, &xml)),
            Ok(Event::Eof) => break,
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"package" if is_start_event => {
                    current_package = get_attr(e, b"name");
                }
                b"sourcefile" if is_start_event => {
                    current_sourcefile = get_attr(e, b"name").map(|name| match &current_package {
                        Some(pkg) => format!("{}/{}", pkg, name),
                        None => name,
                    });
                }
                b"line" => {
                    if let Some(path) = current_sourcefile.as_ref() {
                        let position = xml.buffer_position();
                        let line_number: u32 = required_number(e, b"nr", position)?;
                        let covered: u64 = required_number(e, b"ci", position)?;
                        emit(CoverageFact {
                            file_path: path.clone(),
                            line_number,
                            was_executed: covered > 0,
                        })?;
                    }
                }
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"package" => current_package = None,
                b"sourcefile" => current_sourcefile = None,
                _ => {}
            },
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

fn required_number<T: std::str::FromStr>(
    e: &quick_xml::events::BytesStart,
    name: &[u8],
    position: usize,
) -> Result<T> {
    let attr = String::from_utf8_lossy(name);
    let value = get_attr(e, name).ok_or_else(|| HarvestError::ReportParse {
        message: format!("<line> is missing the '{}' attribute", attr),
        position,
    })?;
    value.trim().parse().map_err(|_| HarvestError::ReportParse {
        message: format!("<line> has a non-numeric '{}' attribute: '{}'", attr, value),
        position,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_jacoco() {
        let input = include_bytes!("../../tests/fixtures/sample_jacoco.xml");
        let facts = parse(input).unwrap();

        assert_eq!(facts.len(), 7);
        assert_eq!(facts[0].file_path, "com/example/Worker.java");
        assert_eq!(facts[0].line_number, 10);
        assert!(facts[0].was_executed);

        let missed: Vec<_> = facts.iter().filter(|f| !f.was_executed).collect();
        assert_eq!(missed.len(), 2);
        assert_eq!(missed[0].line_number, 19);

        let other = facts.last().unwrap();
        assert_eq!(other.file_path, "com/example/util/Helper.java");
    }

    #[test]
    fn test_parse_jacoco_no_package() {
        let input = br#"<?xml version="1.0"?>
<report name="t">
  <sourcefile name="App.java">
    <line nr="1" mi="0" ci="2" mb="0" cb="0"/>
    <line nr="2" mi="1" ci="0" mb="0" cb="0"/>
  </sourcefile>
</report>"#;
        let facts = parse(input).unwrap();
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].file_path, "App.java");
        assert!(facts[0].was_executed);
        assert!(!facts[1].was_executed);
    }

    #[test]
    fn test_parse_jacoco_ignores_class_counters() {
        let input = br#"<report name="t">
  <package name="p">
    <class name="p/A" sourcefilename="A.java">
      <method name="run" desc="()V" line="3">
        <counter type="INSTRUCTION" missed="0" covered="4"/>
      </method>
    </class>
    <sourcefile name="A.java">
      <line nr="3" mi="0" ci="4" mb="0" cb="0"/>
      <counter type="LINE" missed="0" covered="1"/>
    </sourcefile>
  </package>
</report>"#;
        let facts = parse(input).unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].file_path, "p/A.java");
    }

    #[test]
    fn test_parse_jacoco_empty() {
        let facts = parse(br#"<?xml version="1.0"?><report name="empty"></report>"#).unwrap();
        assert!(facts.is_empty());
    }

    #[test]
    fn test_parse_jacoco_malformed() {
        let input = include_bytes!("../../tests/fixtures/malformed_jacoco.xml");
        let result = parse(input);
        assert!(result.is_err());
        let err_msg = format!("{}", result.unwrap_err());
        assert!(
            err_msg.contains("position"),
            "Error should contain position info: {err_msg}",
        );
    }

    #[test]
    fn test_parse_jacoco_bad_line_attribute() {
        let input = br#"<report><package name="p"><sourcefile name="A.java">
<line nr="x" ci="1"/></sourcefile></package></report>"#;
        let err = parse(input).unwrap_err();
        assert!(matches!(err, HarvestError::ReportParse { .. }), "{err}");

        let input = br#"<report><package name="p"><sourcefile name="A.java">
<line nr="4"/></sourcefile></package></report>"#;
        assert!(parse(input).is_err());
    }
}
