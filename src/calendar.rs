//! iCalendar (`.ics`) fetching
//!
//! A tolerant line scanner rather than a full RFC 5545 implementation: events
//! are located by their `BEGIN:VEVENT`/`END:VEVENT` markers and only the
//! properties the calendar widget shows are read.

use crate::error::{IronDashError, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub summary: String,
    /// Start time as written in the source, in the zone described by `utc`/`tzid`
    pub start: NaiveDateTime,
    pub end: Option<NaiveDateTime>,
    /// `DTSTART` was a date without a time
    pub all_day: bool,
    /// `DTSTART` carried the `Z` suffix
    pub utc: bool,
    /// `TZID` parameter of `DTSTART`, if any
    pub tzid: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
}

/// Fetch `url` and parse it as an iCalendar document.
///
/// # Errors
///
/// Returns [`IronDashError::Upstream`] if the request fails or the body is not
/// an iCalendar document.
pub async fn fetch_calendar(client: &reqwest::Client, url: &str) -> Result<Vec<CalendarEvent>> {
    let body = crate::content::fetch_text(client, url).await?;
    if !looks_like_calendar(&body) {
        return Err(IronDashError::Upstream(format!(
            "{url} did not return an iCalendar document"
        )));
    }
    let events = parse_calendar(&body);
    tracing::debug!("Parsed {} calendar events from {url}", events.len());
    Ok(events)
}

fn looks_like_calendar(body: &str) -> bool {
    body.trim_start_matches('\u{feff}')
        .trim_start()
        .get(..15)
        .is_some_and(|head| head.eq_ignore_ascii_case("BEGIN:VCALENDAR"))
}

/// Extract the events of an iCalendar document, sorted by start time.
///
/// Events without a summary or a parseable `DTSTART` are skipped.
#[must_use]
pub fn parse_calendar(ics: &str) -> Vec<CalendarEvent> {
    let unfolded = unfold(ics);
    let mut events = Vec::new();

    for block in unfolded.split("BEGIN:VEVENT").skip(1) {
        let block = block.split("END:VEVENT").next().unwrap_or_default();
        if let Some(event) = parse_event(block) {
            events.push(event);
        }
    }

    events.sort_by(|a, b| a.start.cmp(&b.start));
    events
}

/// Join continuation lines (those starting with a space or tab).
fn unfold(ics: &str) -> String {
    ics.replace("\r\n", "\n")
        .replace("\n ", "")
        .replace("\n\t", "")
}

struct Property<'a> {
    name: &'a str,
    params: Vec<(&'a str, &'a str)>,
    value: &'a str,
}

fn parse_property(line: &str) -> Option<Property<'_>> {
    let (head, value) = line.split_once(':')?;
    let mut parts = head.split(';');
    let name = parts.next()?.trim();
    let params = parts.filter_map(|p| p.split_once('=')).collect();
    Some(Property {
        name,
        params,
        value: value.trim_end_matches('\r'),
    })
}

fn parse_event(block: &str) -> Option<CalendarEvent> {
    let mut summary = None;
    let mut start = None;
    let mut end = None;
    let mut description = None;
    let mut location = None;

    // Depth of nested components such as VALARM; their properties are not the event's.
    let mut nested = 0usize;
    for line in block.lines() {
        let Some(prop) = parse_property(line) else {
            continue;
        };
        let name = prop.name.to_ascii_uppercase();
        match name.as_str() {
            "BEGIN" => {
                nested += 1;
                continue;
            }
            "END" => {
                nested = nested.saturating_sub(1);
                continue;
            }
            _ if nested > 0 => continue,
            _ => {}
        }
        match name.as_str() {
            "SUMMARY" if summary.is_none() => summary = Some(unescape(prop.value)),
            "DESCRIPTION" if description.is_none() => description = Some(unescape(prop.value)),
            "LOCATION" if location.is_none() => location = Some(unescape(prop.value)),
            "DTSTART" if start.is_none() => {
                let tzid = prop
                    .params
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case("TZID"))
                    .map(|(_, v)| v.trim_matches('"').to_string());
                start = parse_ical_time(prop.value).map(|t| (t, tzid));
            }
            "DTEND" if end.is_none() => end = parse_ical_time(prop.value).map(|t| t.at),
            _ => {}
        }
    }

    let summary = summary.filter(|s| !s.trim().is_empty())?;
    let (start, tzid) = start?;
    Some(CalendarEvent {
        summary,
        start: start.at,
        end,
        all_day: start.all_day,
        utc: start.utc,
        tzid,
        description: description.filter(|d| !d.is_empty()),
        location: location.filter(|l| !l.is_empty()),
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct IcalTime {
    at: NaiveDateTime,
    all_day: bool,
    utc: bool,
}

fn parse_ical_time(raw: &str) -> Option<IcalTime> {
    let raw = raw.trim();
    let (raw, utc) = match raw.strip_suffix('Z') {
        Some(rest) => (rest, true),
        None => (raw, false),
    };

    if let Ok(at) = NaiveDateTime::parse_from_str(raw, "%Y%m%dT%H%M%S") {
        return Some(IcalTime {
            at,
            all_day: false,
            utc,
        });
    }
    let date = NaiveDate::parse_from_str(raw, "%Y%m%d").ok()?;
    Some(IcalTime {
        at: date.and_hms_opt(0, 0, 0)?,
        all_day: true,
        utc,
    })
}

/// Undo iCalendar TEXT escaping (`\,` `\;` `\n` `\N` `\\`).
fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n' | 'N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").unwrap()
    }

    #[test]
    fn test_minimal_event() {
        let ics = "BEGIN:VCALENDAR\nBEGIN:VEVENT\nSUMMARY:Meeting\nDTSTART:20250101T090000\nEND:VEVENT\nEND:VCALENDAR\n";
        let events = parse_calendar(ics);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].summary, "Meeting");
        assert_eq!(events[0].start, at("2025-01-01T09:00:00"));
        assert!(!events[0].utc);
        assert!(!events[0].all_day);
        assert_eq!(events[0].tzid, None);
    }

    #[test]
    fn test_parameters_escapes_and_crlf() {
        let ics = concat!(
            "BEGIN:VCALENDAR\r\n",
            "BEGIN:VEVENT\r\n",
            "DTSTART;TZID=Europe/Berlin:20250315T183000\r\n",
            "DTEND;TZID=Europe/Berlin:20250315T200000\r\n",
            "SUMMARY:Dinner\\, drinks\\; games\r\n",
            "LOCATION;LANGUAGE=en:Main St. 1\r\n",
            "DESCRIPTION:Line one\\nLine two\\\\done\r\n",
            "END:VEVENT\r\n",
            "END:VCALENDAR\r\n",
        );
        let events = parse_calendar(ics);

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.summary, "Dinner, drinks; games");
        assert_eq!(event.start, at("2025-03-15T18:30:00"));
        assert_eq!(event.end, Some(at("2025-03-15T20:00:00")));
        assert_eq!(event.tzid.as_deref(), Some("Europe/Berlin"));
        assert_eq!(event.location.as_deref(), Some("Main St. 1"));
        assert_eq!(event.description.as_deref(), Some("Line one\nLine two\\done"));
    }

    #[test]
    fn test_folded_lines_are_joined() {
        let ics = "BEGIN:VEVENT\r\nSUMMARY:A very long\r\n  summary line\r\nDTSTART:20250102T100000Z\r\nEND:VEVENT\r\n";
        let events = parse_calendar(ics);

        assert_eq!(events[0].summary, "A very long summary line");
        assert!(events[0].utc);
    }

    #[test]
    fn test_all_day_event() {
        let ics = "BEGIN:VEVENT\nSUMMARY:Holiday\nDTSTART;VALUE=DATE:20251225\nEND:VEVENT\n";
        let events = parse_calendar(ics);

        assert!(events[0].all_day);
        assert_eq!(events[0].start, at("2025-12-25T00:00:00"));
    }

    #[test]
    fn test_incomplete_events_are_dropped_and_rest_sorted() {
        let ics = concat!(
            "BEGIN:VEVENT\nSUMMARY:Later\nDTSTART:20250301T080000\nEND:VEVENT\n",
            "BEGIN:VEVENT\nDTSTART:20250201T080000\nEND:VEVENT\n",
            "BEGIN:VEVENT\nSUMMARY:No start\nEND:VEVENT\n",
            "BEGIN:VEVENT\nSUMMARY:Bad start\nDTSTART:next tuesday\nEND:VEVENT\n",
            "BEGIN:VEVENT\nSUMMARY:Earlier\nDTSTART:20250105T080000\nEND:VEVENT\n",
        );
        let events = parse_calendar(ics);

        let summaries: Vec<&str> = events.iter().map(|e| e.summary.as_str()).collect();
        assert_eq!(summaries, vec!["Earlier", "Later"]);
    }

    #[test]
    fn test_alarm_properties_do_not_override_the_event() {
        let ics = concat!(
            "BEGIN:VCALENDAR\n",
            "BEGIN:VEVENT\n",
            "SUMMARY:Dentist\n",
            "DTSTART:20250410T083000\n",
            "DESCRIPTION:Bring insurance card\n",
            "BEGIN:VALARM\n",
            "ACTION:DISPLAY\n",
            "DESCRIPTION:Reminder\n",
            "SUMMARY:Alarm\n",
            "END:VALARM\n",
            "LOCATION:Clinic\n",
            "END:VEVENT\n",
            "END:VCALENDAR\n",
        );
        let events = parse_calendar(ics);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].summary, "Dentist");
        assert_eq!(events[0].description.as_deref(), Some("Bring insurance card"));
        assert_eq!(events[0].location.as_deref(), Some("Clinic"));
    }

    #[test]
    fn test_first_occurrence_of_a_property_wins() {
        let ics = "BEGIN:VEVENT\nSUMMARY:First\nSUMMARY:Second\nDTSTART:20250101T090000\nEND:VEVENT\n";
        assert_eq!(parse_calendar(ics)[0].summary, "First");
    }

    #[test]
    fn test_calendar_detection() {
        assert!(looks_like_calendar("BEGIN:VCALENDAR\r\nEND:VCALENDAR"));
        assert!(looks_like_calendar("\u{feff}\n begin:vcalendar\n"));
        assert!(!looks_like_calendar("<!doctype html><html></html>"));
        assert!(!looks_like_calendar(""));
    }

    #[test]
    fn test_no_events() {
        assert!(parse_calendar("").is_empty());
        assert!(parse_calendar("BEGIN:VCALENDAR\nEND:VCALENDAR").is_empty());
    }

    #[test]
    fn test_serialized_start_keeps_source_wall_time() {
        let events = parse_calendar("BEGIN:VEVENT\nSUMMARY:Meeting\nDTSTART:20250101T090000\nEND:VEVENT");
        let json = serde_json::to_value(&events[0]).unwrap();
        assert_eq!(json["start"], "2025-01-01T09:00:00");
        assert_eq!(json["allDay"], false);
    }
}
