//! Partwise MusicXML to [`Timeline`], via roxmltree.
//!
//! Only the first `<part>` is read. Every voice of that part is flattened
//! into one offset-ordered sequence, which is what the section slicer and
//! the pattern counter expect.

use roxmltree::{Document, Node, ParsingOptions};
use std::path::Path;
use thiserror::Error;

use super::{Event, EventKind, PitchClass, PitchError, Timeline};

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("XML error: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("Unsupported root element <{0}> (expected <score-partwise>)")]
    UnsupportedRoot(String),
    #[error("Missing required element <{0}>")]
    MissingElement(&'static str),
    #[error("Invalid value {value:?} for <{element}>")]
    InvalidValue {
        element: &'static str,
        value: String,
    },
    #[error("Pitch error: {0}")]
    Pitch(#[from] PitchError),
}

pub fn load_file(path: &Path) -> Result<Timeline, ParseError> {
    let text = std::fs::read_to_string(path)?;
    parse_str(&text)
}

pub fn parse_str(xml: &str) -> Result<Timeline, ParseError> {
    // Most exported MusicXML carries a DOCTYPE.
    let opts = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    let doc = Document::parse_with_options(xml, opts)?;
    let root = doc.root_element();

    match root.tag_name().name() {
        "score-partwise" => {}
        other => return Err(ParseError::UnsupportedRoot(other.to_string())),
    }

    let part = root
        .children()
        .find(|n| n.has_tag_name("part"))
        .ok_or(ParseError::MissingElement("part"))?;

    read_part(part)
}

fn read_part(part: Node) -> Result<Timeline, ParseError> {
    let mut events: Vec<Event> = Vec::new();
    let mut divisions = 1.0_f64;
    let mut measure_start = 0.0_f64;

    for measure in part.children().filter(|n| n.has_tag_name("measure")) {
        // Positions inside the measure, in quarter notes.
        let mut cursor = 0.0_f64;
        let mut measure_len = 0.0_f64;
        let mut last_onset = 0.0_f64;
        let mut last_note: Option<usize> = None;

        for el in measure.children().filter(|n| n.is_element()) {
            match el.tag_name().name() {
                "attributes" => {
                    if let Some(text) = child_text(el, "divisions") {
                        divisions = parse_number("divisions", text)?;
                        if divisions <= 0.0 {
                            return Err(ParseError::InvalidValue {
                                element: "divisions",
                                value: text.to_string(),
                            });
                        }
                    }
                }
                "note" => {
                    let is_chord = has_child(el, "chord");
                    let duration = if has_child(el, "grace") {
                        0.0
                    } else {
                        match child_text(el, "duration") {
                            Some(text) => parse_number("duration", text)? / divisions,
                            None => 0.0,
                        }
                    };
                    let onset = if is_chord { last_onset } else { cursor };
                    let offset = measure_start + onset;

                    if has_child(el, "rest") {
                        events.push(Event::rest(offset, duration));
                        last_note = None;
                    } else if let Some(pitch_el) = child(el, "pitch") {
                        let pitch = read_pitch(pitch_el)?;
                        match (is_chord, last_note) {
                            (true, Some(i)) => add_to_chord(&mut events[i], pitch),
                            _ => {
                                events.push(Event::note(offset, duration, pitch));
                                last_note = Some(events.len() - 1);
                            }
                        }
                    }
                    // Unpitched (percussion) notes take time but are not events.

                    if !is_chord {
                        last_onset = cursor;
                        cursor += duration;
                        measure_len = measure_len.max(cursor);
                    }
                }
                "backup" => {
                    let d = required_number(el, "duration")? / divisions;
                    cursor = (cursor - d).max(0.0);
                    last_note = None;
                }
                "forward" => {
                    let d = required_number(el, "duration")? / divisions;
                    cursor += d;
                    measure_len = measure_len.max(cursor);
                    last_note = None;
                }
                _ => {}
            }
        }

        measure_start += measure_len;
    }

    Ok(Timeline::from_events(events))
}

fn add_to_chord(event: &mut Event, pitch: PitchClass) {
    let kind = std::mem::replace(&mut event.kind, EventKind::Rest);
    event.kind = match kind {
        EventKind::Note(first) => EventKind::Chord(vec![first, pitch]),
        EventKind::Chord(mut members) => {
            members.push(pitch);
            EventKind::Chord(members)
        }
        EventKind::Rest => EventKind::Note(pitch),
    };
}

fn read_pitch(pitch: Node) -> Result<PitchClass, ParseError> {
    let step_text = child_text(pitch, "step").ok_or(ParseError::MissingElement("step"))?;
    let mut chars = step_text.trim().chars();
    let step = match (chars.next(), chars.next()) {
        (Some(c), None) => c,
        _ => {
            return Err(ParseError::InvalidValue {
                element: "step",
                value: step_text.to_string(),
            });
        }
    };
    let alter = match child_text(pitch, "alter") {
        Some(text) => parse_number("alter", text)?,
        None => 0.0,
    };
    Ok(PitchClass::from_step_alter(step, alter)?)
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(name))
}

fn has_child(node: Node, name: &str) -> bool {
    child(node, name).is_some()
}

fn child_text<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    child(node, name).and_then(|n| n.text())
}

fn required_number(node: Node, name: &'static str) -> Result<f64, ParseError> {
    let text = child_text(node, name).ok_or(ParseError::MissingElement(name))?;
    parse_number(name, text)
}

fn parse_number(element: &'static str, text: &str) -> Result<f64, ParseError> {
    text.trim().parse::<f64>().map_err(|_| ParseError::InvalidValue {
        element,
        value: text.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrap(measures: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE score-partwise PUBLIC "-//Recordare//DTD MusicXML 3.1 Partwise//EN"
  "http://www.musicxml.org/dtds/partwise.dtd">
<score-partwise version="3.1">
  <part-list><score-part id="P1"><part-name>Voice</part-name></score-part></part-list>
  <part id="P1">{measures}</part>
  <part id="P2"><measure number="1">
    <note><pitch><step>A</step><octave>2</octave></pitch><duration>8</duration></note>
  </measure></part>
</score-partwise>"#
        )
    }

    fn note(step: &str, alter: Option<i32>, duration: u32) -> String {
        let alter = alter.map(|a| format!("<alter>{a}</alter>")).unwrap_or_default();
        format!(
            "<note><pitch><step>{step}</step>{alter}<octave>4</octave></pitch>\
             <duration>{duration}</duration></note>"
        )
    }

    fn names(t: &Timeline) -> Vec<String> {
        t.pitch_names().iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_offsets_follow_divisions_and_measures() {
        let xml = wrap(&format!(
            r#"<measure number="1"><attributes><divisions>2</divisions></attributes>
                 {}{}<note><rest/><duration>2</duration></note>{}</measure>
               <measure number="2">{}</measure>"#,
            note("C", None, 2),
            note("D", None, 1),
            note("E", None, 3),
            note("F", Some(1), 8),
        ));
        let t = parse_str(&xml).unwrap();
        let offsets: Vec<f64> = t.events().iter().map(|e| e.offset).collect();
        assert_eq!(offsets, vec![0.0, 1.0, 1.5, 2.5, 4.0]);
        assert_eq!(names(&t), vec!["C", "D", "E", "F#"]);
        assert_eq!(t.events()[2].kind, EventKind::Rest);
    }

    #[test]
    fn test_only_first_part_is_read() {
        let xml = wrap(&format!(r#"<measure number="1">{}</measure>"#, note("G", None, 1)));
        let t = parse_str(&xml).unwrap();
        assert_eq!(names(&t), vec!["G"]);
    }

    #[test]
    fn test_chord_members_merge_into_one_event() {
        let xml = wrap(&format!(
            r#"<measure number="1">{}
                 <note><chord/><pitch><step>E</step><octave>4</octave></pitch>
                   <duration>1</duration></note>
                 {}</measure>"#,
            note("C", None, 1),
            note("B", Some(-1), 1),
        ));
        let t = parse_str(&xml).unwrap();
        assert_eq!(t.len(), 2);
        assert!(matches!(&t.events()[0].kind, EventKind::Chord(m) if m.len() == 2));
        assert_eq!(t.events()[1].offset, 1.0);
        assert_eq!(names(&t), vec!["B-"]);
    }

    #[test]
    fn test_backup_interleaves_second_voice() {
        let xml = wrap(&format!(
            r#"<measure number="1">{}{}<backup><duration>2</duration></backup>{}</measure>
               <measure number="2">{}</measure>"#,
            note("C", None, 1),
            note("D", None, 1),
            note("G", None, 2),
            note("A", None, 1),
        ));
        let t = parse_str(&xml).unwrap();
        let offsets: Vec<f64> = t.events().iter().map(|e| e.offset).collect();
        assert_eq!(offsets, vec![0.0, 0.0, 1.0, 2.0]);
        assert_eq!(names(&t), vec!["C", "G", "D", "A"]);
    }

    #[test]
    fn test_grace_note_takes_no_time() {
        let xml = wrap(&format!(
            r#"<measure number="1">
                 <note><grace/><pitch><step>B</step><octave>4</octave></pitch></note>{}</measure>"#,
            note("C", None, 1),
        ));
        let t = parse_str(&xml).unwrap();
        assert_eq!(t.events()[0].offset, 0.0);
        assert_eq!(t.events()[1].offset, 0.0);
        assert_eq!(names(&t), vec!["B", "C"]);
    }

    #[test]
    fn test_rejects_timewise_and_garbage() {
        assert!(matches!(
            parse_str("<score-timewise/>"),
            Err(ParseError::UnsupportedRoot(_))
        ));
        assert!(matches!(parse_str("<not xml"), Err(ParseError::Xml(_))));
        assert!(matches!(
            parse_str("<score-partwise></score-partwise>"),
            Err(ParseError::MissingElement("part"))
        ));
    }

    #[test]
    fn test_bad_duration_is_an_error() {
        let xml =
            wrap(r#"<measure number="1"><note><rest/><duration>x</duration></note></measure>"#);
        assert!(matches!(
            parse_str(&xml),
            Err(ParseError::InvalidValue { element: "duration", .. })
        ));
    }
}
