//! Kapow session export (XML, sessions grouped under their `<project>`).
//!
//! ```xml
//! <kapow>
//!   <project name="alpha">
//!     <session date="2025-06-02" start="09:00:00" stop="10:30:00" billed="0" note=""/>
//!   </project>
//! </kapow>
//! ```

use std::io::Read;

use chrono::{NaiveDate, NaiveTime};
use roxmltree::{Document, Node};
use serde_json::json;

use super::ParseError;
use crate::record::{EventRecord, EventSource};
use crate::types::{DateRange, RecordId};

const FILE: &str = "Kapow";

/// Parses a Kapow export, keeping sessions dated within `period`.
///
/// Each session becomes one event whose only category is its project name.
/// The billed flag and the note are kept as `kapow_billed`/`kapow_note`
/// metadata. Events are returned sorted by start.
pub fn parse_kapow_sessions<R: Read>(
    mut reader: R,
    period: DateRange,
) -> Result<Vec<EventRecord>, ParseError> {
    let mut text = String::new();
    reader
        .read_to_string(&mut text)
        .map_err(|source| ParseError::Io { file: FILE, source })?;
    let doc = Document::parse(&text).map_err(|source| ParseError::Xml { file: FILE, source })?;

    let mut events = Vec::new();
    let mut skipped = 0_usize;
    for project in doc
        .root_element()
        .children()
        .filter(|node| node.has_tag_name("project"))
    {
        let name = attribute(&doc, project, "name")?;
        for session in project.children().filter(|node| node.is_element()) {
            let line = line_of(&doc, session);
            let raw_date = attribute(&doc, session, "date")?;
            let date = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d")
                .map_err(|_| format_error(line, "date", raw_date, "YYYY-MM-DD"))?;
            if !period.contains(date) {
                skipped += 1;
                continue;
            }

            let start = date.and_time(time(&doc, session, "start")?);
            let end = date.and_time(time(&doc, session, "stop")?);
            let raw_billed = attribute(&doc, session, "billed")?;
            let billed: i64 = raw_billed
                .parse()
                .map_err(|_| format_error(line, "billed", raw_billed, "an integer"))?;
            let note = attribute(&doc, session, "note")?;

            let event = EventRecord::new(
                RecordId::generate(),
                start,
                end,
                vec![name.to_string()],
                EventSource::Kapow,
                Some(json!({ "kapow_billed": billed, "kapow_note": note })),
            )
            .map_err(|source| ParseError::Record {
                file: FILE,
                line,
                source,
            })?;
            events.push(event);
        }
    }
    if skipped > 0 {
        tracing::debug!(skipped, "skipped kapow sessions outside the import period");
    }

    events.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.end.cmp(&b.end)));
    Ok(events)
}

fn line_of(doc: &Document<'_>, node: Node<'_, '_>) -> u64 {
    u64::from(doc.text_pos_at(node.range().start).row)
}

fn attribute<'a>(
    doc: &Document<'_>,
    node: Node<'a, '_>,
    name: &'static str,
) -> Result<&'a str, ParseError> {
    node.attribute(name)
        .ok_or_else(|| ParseError::MissingAttribute {
            file: FILE,
            line: line_of(doc, node),
            element: node.tag_name().name().to_string(),
            attribute: name,
        })
}

/// Session times are written with or without seconds.
fn time(doc: &Document<'_>, node: Node<'_, '_>, name: &'static str) -> Result<NaiveTime, ParseError> {
    let raw = attribute(doc, node, name)?;
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .map_err(|_| format_error(line_of(doc, node), name, raw, "HH:MM:SS"))
}

fn format_error(line: u64, column: &'static str, value: &str, expected: &'static str) -> ParseError {
    ParseError::Format {
        file: FILE,
        line,
        column,
        value: value.to_string(),
        expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn june() -> DateRange {
        DateRange::month(2025, 6).unwrap()
    }

    fn parse(projects: &str) -> Result<Vec<EventRecord>, ParseError> {
        parse_kapow_sessions(format!("<kapow>\n{projects}</kapow>\n").as_bytes(), june())
    }

    #[test]
    fn parses_sessions_as_project_events() {
        let events = parse(concat!(
            "<project name=\"beta\">\n",
            "<session date=\"2025-06-03\" start=\"13:00:00\" stop=\"14:00:00\" billed=\"1\" note=\"review\"/>\n",
            "</project>\n",
            "<project name=\"alpha\">\n",
            "<session date=\"2025-06-02\" start=\"09:00\" stop=\"10:30\" billed=\"0\" note=\"\"/>\n",
            "</project>\n",
        ))
        .unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].categories, vec!["alpha"]);
        assert_eq!(events[0].source, EventSource::Kapow);
        assert_eq!(events[0].duration_minutes(), 90);
        assert_eq!(
            events[0].metadata,
            Some(json!({ "kapow_billed": 0, "kapow_note": "" }))
        );
        assert_eq!(events[1].categories, vec!["beta"]);
        assert_eq!(
            events[1].metadata,
            Some(json!({ "kapow_billed": 1, "kapow_note": "review" }))
        );
    }

    #[test]
    fn keeps_only_sessions_in_period() {
        let events = parse(concat!(
            "<project name=\"alpha\">\n",
            "<session date=\"2025-05-31\" start=\"09:00:00\" stop=\"10:00:00\" billed=\"0\" note=\"\"/>\n",
            "<session date=\"2025-06-30\" start=\"09:00:00\" stop=\"10:00:00\" billed=\"0\" note=\"\"/>\n",
            "<session date=\"2025-07-01\" start=\"09:00:00\" stop=\"10:00:00\" billed=\"0\" note=\"\"/>\n",
            "</project>\n",
        ))
        .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].primary_date(), NaiveDate::from_ymd_opt(2025, 6, 30).unwrap());
    }

    #[test]
    fn reports_missing_attribute_with_line() {
        let err = parse(concat!(
            "<project name=\"alpha\">\n",
            "<session date=\"2025-06-02\" start=\"09:00:00\" billed=\"0\" note=\"\"/>\n",
            "</project>\n",
        ))
        .unwrap_err();
        assert!(matches!(
            err,
            ParseError::MissingAttribute {
                line: 3,
                attribute: "stop",
                ref element,
                ..
            } if element == "session"
        ));
    }

    #[test]
    fn rejects_bad_time_and_reversed_sessions() {
        let err = parse(concat!(
            "<project name=\"alpha\">\n",
            "<session date=\"2025-06-02\" start=\"9 Uhr\" stop=\"10:00:00\" billed=\"0\" note=\"\"/>\n",
            "</project>\n",
        ))
        .unwrap_err();
        assert!(matches!(err, ParseError::Format { column: "start", line: 3, .. }));

        let err = parse(concat!(
            "<project name=\"alpha\">\n",
            "<session date=\"2025-06-02\" start=\"11:00:00\" stop=\"10:00:00\" billed=\"0\" note=\"\"/>\n",
            "</project>\n",
        ))
        .unwrap_err();
        assert!(matches!(err, ParseError::Record { line: 3, .. }));
    }

    #[test]
    fn rejects_malformed_xml() {
        let err = parse_kapow_sessions("<kapow><project>".as_bytes(), june()).unwrap_err();
        assert!(matches!(err, ParseError::Xml { file: "Kapow", .. }));
    }
}
