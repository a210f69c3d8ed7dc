//! Locates natural-language date expressions inside free text.
//!
//! Every pattern below proposes candidate spans; overlapping candidates are
//! resolved in favour of the earliest, then longest, span. Absolute calendar
//! dates are handed to chrono-english first, with a local fallback when it
//! rejects the canonical form.

use chrono::{DateTime, Datelike, Duration, Local, Months, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_english::{Dialect, parse_date_string};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

const DEFAULT_HOUR: u32 = 9;
const TONIGHT_HOUR: u32 = 20;

const CLOCK: &str = r"(?:\d{1,2}(?::\d{2})?\s*(?:am|pm)|\d{1,2}:\d{2}|noon|midnight)";
const MONTHS: &str = r"jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sept?(?:ember)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?";
const MONTH_NAMES: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];

/// A date expression found in the input, with its byte span.
#[derive(Debug, Clone, PartialEq)]
pub struct DateMatch {
    pub start: usize,
    pub end: usize,
    pub text: String,
    pub value: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
enum Anchor {
    /// Calendar day; the clock time comes from the expression or a default.
    Day(NaiveDate),
    /// Only a clock time was written, the day is the reference day.
    ClockOnly,
    /// Already a complete instant (relative offsets, chrono-english output).
    Instant(DateTime<Local>),
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    start: usize,
    end: usize,
    anchor: Anchor,
    time: Option<NaiveTime>,
    default_hour: u32,
}

struct Slot {
    anchor: Anchor,
    time: Option<NaiveTime>,
    default_hour: u32,
}

impl Slot {
    fn day(date: NaiveDate, caps: &Captures) -> Self {
        Self {
            anchor: Anchor::Day(date),
            time: trailing_time(caps),
            default_hour: DEFAULT_HOUR,
        }
    }
}

type Builder = fn(&Captures, DateTime<Local>) -> Option<Slot>;

struct Pattern {
    regex: Regex,
    build: Builder,
}

fn time_suffix() -> String {
    format!(r"(?:\s+(?:at\s+)?(?P<time>{CLOCK})|\s+at\s+(?P<hour>\d{{1,2}})\b)?")
}

fn pattern(source: String, build: Builder) -> Pattern {
    Pattern {
        regex: Regex::new(&source).unwrap(),
        build,
    }
}

static PATTERNS: Lazy<Vec<Pattern>> = Lazy::new(|| {
    let suffix = time_suffix();
    vec![
        pattern(
            format!(
                r"(?i)\b(?P<day>day\s+after\s+tomorrow|today|tonight|tomorrow|tmrw|yesterday){suffix}\b"
            ),
            relative_day,
        ),
        pattern(
            format!(
                r"(?i)\b(?:(?P<rel>next|this|last|on)\s+)?(?P<weekday>monday|tuesday|wednesday|thursday|friday|saturday|sunday){suffix}\b"
            ),
            weekday,
        ),
        pattern(
            r"(?i)\bnext\s+(?P<period>week|month|year)\b".to_string(),
            next_period,
        ),
        pattern(
            r"(?i)\bin\s+(?P<amount>\d+|an?|one|two|three)\s+(?P<unit>minutes?|mins?|hours?|hrs?|days?|weeks?|months?)\b"
                .to_string(),
            in_offset,
        ),
        pattern(
            r"(?i)\b\d+\s+(?:minutes?|hours?|days?|weeks?)\s+ago\b".to_string(),
            ago,
        ),
        pattern(
            format!(
                r"(?i)\b(?P<month>{MONTHS})\.?\s+(?P<day>\d{{1,2}})(?:st|nd|rd|th)?(?:,?\s+(?P<year>\d{{4}}))?{suffix}\b"
            ),
            month_name_date,
        ),
        pattern(
            format!(
                r"(?i)\b(?P<day>\d{{1,2}})(?:st|nd|rd|th)?\s+(?:of\s+)?(?P<month>{MONTHS})(?:,?\s+(?P<year>\d{{4}}))?{suffix}\b"
            ),
            month_name_date,
        ),
        pattern(
            format!(r"(?i)\b(?P<year>\d{{4}})-(?P<month>\d{{1,2}})-(?P<day>\d{{1,2}}){suffix}\b"),
            iso_date,
        ),
        pattern(
            format!(
                r"(?i)\b(?P<month>\d{{1,2}})/(?P<day>\d{{1,2}})(?:/(?P<year>\d{{2,4}}))?{suffix}\b"
            ),
            slash_date,
        ),
        pattern(
            format!(r"(?i)(?:\bat\s+)?\b(?P<time>{CLOCK})\b"),
            clock_only,
        ),
    ]
});

/// Finds every date expression in `input`, in order of appearance,
/// evaluating relative expressions against `now`.
pub fn scan(input: &str, now: DateTime<Local>) -> Vec<DateMatch> {
    let mut candidates = Vec::new();

    for pattern in PATTERNS.iter() {
        for caps in pattern.regex.captures_iter(input) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            if let Some(slot) = (pattern.build)(&caps, now) {
                candidates.push(Candidate {
                    start: whole.start(),
                    end: whole.end(),
                    anchor: slot.anchor,
                    time: slot.time,
                    default_hour: slot.default_hour,
                });
            }
        }
    }

    candidates.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));

    let mut kept: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if kept.last().is_none_or(|last| candidate.start >= last.end) {
            kept.push(candidate);
        }
    }

    merge_time_then_day(input, kept)
        .into_iter()
        .filter_map(|c| {
            let value = resolve(&c, now)?;
            Some(DateMatch {
                start: c.start,
                end: c.end,
                text: input[c.start..c.end].to_string(),
                value,
            })
        })
        .collect()
}

/// "5pm tomorrow" arrives as two candidates; fold the clock into the day.
fn merge_time_then_day(input: &str, kept: Vec<Candidate>) -> Vec<Candidate> {
    let mut merged: Vec<Candidate> = Vec::with_capacity(kept.len());
    let mut iter = kept.into_iter().peekable();

    while let Some(current) = iter.next() {
        if let (Anchor::ClockOnly, Some(next)) = (current.anchor, iter.peek()) {
            let gap = input[current.end..next.start].trim();
            let joinable = gap.is_empty() || gap.eq_ignore_ascii_case("on");
            if joinable && next.time.is_none() {
                if let Anchor::Day(_) = next.anchor {
                    let next = *next;
                    iter.next();
                    merged.push(Candidate {
                        start: current.start,
                        end: next.end,
                        time: current.time,
                        ..next
                    });
                    continue;
                }
            }
        }
        merged.push(current);
    }

    merged
}

fn resolve(candidate: &Candidate, now: DateTime<Local>) -> Option<DateTime<Utc>> {
    let naive = match candidate.anchor {
        Anchor::Instant(dt) => return Some(dt.with_timezone(&Utc)),
        Anchor::ClockOnly => now.date_naive().and_time(candidate.time?),
        Anchor::Day(date) => {
            let time = match candidate.time {
                Some(time) => time,
                None => NaiveTime::from_hms_opt(candidate.default_hour, 0, 0)?,
            };
            date.and_time(time)
        }
    };

    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

// Builders

fn relative_day(caps: &Captures, now: DateTime<Local>) -> Option<Slot> {
    let word = caps.name("day")?.as_str().to_lowercase();
    let today = now.date_naive();

    let (date, default_hour) = match word.split_whitespace().collect::<Vec<_>>().as_slice() {
        ["today"] => (today, DEFAULT_HOUR),
        ["tonight"] => (today, TONIGHT_HOUR),
        ["tomorrow"] | ["tmrw"] => (today + Duration::days(1), DEFAULT_HOUR),
        ["yesterday"] => (today - Duration::days(1), DEFAULT_HOUR),
        ["day", "after", "tomorrow"] => (today + Duration::days(2), DEFAULT_HOUR),
        _ => return None,
    };

    Some(Slot {
        default_hour,
        ..Slot::day(date, caps)
    })
}

fn weekday(caps: &Captures, now: DateTime<Local>) -> Option<Slot> {
    let target: Weekday = caps.name("weekday")?.as_str().parse().ok()?;
    let relation = caps.name("rel").map(|m| m.as_str().to_lowercase());

    let current = now.weekday().num_days_from_monday() as i64;
    let wanted = target.num_days_from_monday() as i64;

    let offset = match relation.as_deref() {
        Some("last") => {
            let back = (current - wanted + 7) % 7;
            -(if back == 0 { 7 } else { back })
        }
        Some("next") => {
            let ahead = (wanted - current + 7) % 7;
            if ahead == 0 { 7 } else { ahead }
        }
        _ => (wanted - current + 7) % 7,
    };

    Some(Slot::day(now.date_naive() + Duration::days(offset), caps))
}

fn next_period(caps: &Captures, now: DateTime<Local>) -> Option<Slot> {
    let today = now.date_naive();
    let date = match caps.name("period")?.as_str().to_lowercase().as_str() {
        "week" => today + Duration::days(7),
        "month" => today.checked_add_months(Months::new(1))?,
        "year" => today.checked_add_months(Months::new(12))?,
        _ => return None,
    };
    Some(Slot::day(date, caps))
}

fn in_offset(caps: &Captures, now: DateTime<Local>) -> Option<Slot> {
    let amount_text = caps.name("amount")?.as_str().to_lowercase();
    let amount: i64 = match amount_text.as_str() {
        "a" | "an" | "one" => 1,
        "two" => 2,
        "three" => 3,
        digits => digits.parse().ok()?,
    };
    let unit = caps.name("unit")?.as_str().to_lowercase();

    // Offsets chrono cannot represent yield no date.
    let offset = if unit.starts_with("min") {
        Duration::try_minutes(amount)
    } else if unit.starts_with("h") {
        Duration::try_hours(amount)
    } else if unit.starts_with("day") {
        Duration::try_days(amount)
    } else if unit.starts_with("week") {
        Duration::try_weeks(amount)
    } else {
        None
    };
    let instant = match offset {
        Some(offset) => now.checked_add_signed(offset)?,
        None if unit.starts_with("month") => {
            now.checked_add_months(Months::new(u32::try_from(amount).ok()?))?
        }
        None => return None,
    };

    Some(Slot {
        anchor: Anchor::Instant(instant),
        time: None,
        default_hour: DEFAULT_HOUR,
    })
}

fn ago(caps: &Captures, now: DateTime<Local>) -> Option<Slot> {
    let instant = delegate(caps.get(0)?.as_str(), now)?;
    Some(Slot {
        anchor: Anchor::Instant(instant),
        time: None,
        default_hour: DEFAULT_HOUR,
    })
}

fn month_name_date(caps: &Captures, now: DateTime<Local>) -> Option<Slot> {
    let month = month_index(caps.name("month")?.as_str())?;
    let day: u32 = caps.name("day")?.as_str().parse().ok()?;
    let year = match caps.name("year") {
        Some(y) => y.as_str().parse().ok()?,
        None => now.year(),
    };

    let canonical = format!("{day} {} {year}", MONTH_NAMES[(month - 1) as usize]);
    let date = delegate(&canonical, now)
        .map(|dt| dt.date_naive())
        .or_else(|| NaiveDate::from_ymd_opt(year, month, day))?;

    Some(Slot::day(date, caps))
}

fn iso_date(caps: &Captures, _now: DateTime<Local>) -> Option<Slot> {
    let year = caps.name("year")?.as_str().parse().ok()?;
    let month = caps.name("month")?.as_str().parse().ok()?;
    let day = caps.name("day")?.as_str().parse().ok()?;
    Some(Slot::day(NaiveDate::from_ymd_opt(year, month, day)?, caps))
}

fn slash_date(caps: &Captures, now: DateTime<Local>) -> Option<Slot> {
    let month: u32 = caps.name("month")?.as_str().parse().ok()?;
    let day: u32 = caps.name("day")?.as_str().parse().ok()?;
    let year: i32 = match caps.name("year") {
        Some(y) if y.as_str().len() == 2 => 2000 + y.as_str().parse::<i32>().ok()?,
        Some(y) => y.as_str().parse().ok()?,
        None => now.year(),
    };
    // Reject before delegating so "13/45" never reaches chrono-english.
    let fallback = NaiveDate::from_ymd_opt(year, month, day)?;

    let canonical = format!("{month}/{day}/{year}");
    let date = delegate(&canonical, now)
        .map(|dt| dt.date_naive())
        .unwrap_or(fallback);

    Some(Slot::day(date, caps))
}

fn clock_only(caps: &Captures, _now: DateTime<Local>) -> Option<Slot> {
    let time = parse_clock(caps.name("time")?.as_str())?;
    Some(Slot {
        anchor: Anchor::ClockOnly,
        time: Some(time),
        default_hour: DEFAULT_HOUR,
    })
}

// Helpers

fn delegate(expression: &str, now: DateTime<Local>) -> Option<DateTime<Local>> {
    match parse_date_string(expression, now, Dialect::Us) {
        Ok(dt) => Some(dt),
        Err(_) => {
            tracing::debug!(expression, "chrono-english rejected expression");
            None
        }
    }
}

fn trailing_time(caps: &Captures) -> Option<NaiveTime> {
    caps.name("time")
        .or_else(|| caps.name("hour"))
        .and_then(|m| parse_clock(m.as_str()))
}

fn month_index(name: &str) -> Option<u32> {
    let prefix: String = name.chars().take(3).collect::<String>().to_lowercase();
    let index = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ]
    .iter()
    .position(|m| *m == prefix)?;
    Some(index as u32 + 1)
}

fn parse_clock(text: &str) -> Option<NaiveTime> {
    let lowered = text.trim().to_lowercase();
    match lowered.as_str() {
        "noon" => return NaiveTime::from_hms_opt(12, 0, 0),
        "midnight" => return NaiveTime::from_hms_opt(0, 0, 0),
        _ => {}
    }

    let (digits, is_pm) = if let Some(rest) = lowered.strip_suffix("am") {
        (rest.trim(), Some(false))
    } else if let Some(rest) = lowered.strip_suffix("pm") {
        (rest.trim(), Some(true))
    } else {
        (lowered.as_str(), None)
    };

    let (hour, minute): (u32, u32) = match digits.split_once(':') {
        Some((h, m)) => (h.parse().ok()?, m.parse().ok()?),
        None => (digits.parse().ok()?, 0),
    };

    if is_pm.is_some() && !(1..=12).contains(&hour) {
        return None;
    }

    NaiveTime::from_hms_opt(resolve_24h(hour, is_pm), minute, 0)
}

fn resolve_24h(hour: u32, is_pm: Option<bool>) -> u32 {
    match (hour, is_pm) {
        (12, Some(true)) => 12,
        (12, Some(false)) => 0,
        (h, Some(true)) => h + 12,
        (h, _) => h,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Wednesday, 2025-03-12 10:00 local.
    fn reference() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 3, 12, 10, 0, 0).unwrap()
    }

    fn local(dt: DateTime<Utc>) -> chrono::NaiveDateTime {
        dt.with_timezone(&Local).naive_local()
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn test_tomorrow_with_time() {
        let found = scan("call mom tomorrow at 5pm please", reference());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text, "tomorrow at 5pm");
        assert_eq!(local(found[0].value), at(2025, 3, 13, 17, 0));
    }

    #[test]
    fn test_day_without_time_defaults_to_morning() {
        let found = scan("Buy milk tomorrow", reference());
        assert_eq!(local(found[0].value), at(2025, 3, 13, 9, 0));

        let tonight = scan("watch film tonight", reference());
        assert_eq!(local(tonight[0].value), at(2025, 3, 12, 20, 0));
    }

    #[test]
    fn test_weekday_relations() {
        let friday = scan("review on friday", reference());
        assert_eq!(friday[0].text, "on friday");
        assert_eq!(local(friday[0].value), at(2025, 3, 14, 9, 0));

        let next_wed = scan("sync next wednesday 9:30am", reference());
        assert_eq!(local(next_wed[0].value), at(2025, 3, 19, 9, 30));

        let last_mon = scan("filed last monday", reference());
        assert_eq!(local(last_mon[0].value), at(2025, 3, 10, 9, 0));
    }

    #[test]
    fn test_clock_before_day_is_merged() {
        let found = scan("standup at 5pm tomorrow", reference());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text, "at 5pm tomorrow");
        assert_eq!(local(found[0].value), at(2025, 3, 13, 17, 0));
    }

    #[test]
    fn test_multiple_expressions_in_order() {
        let found = scan("dentist friday remind me tomorrow at noon", reference());
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].text, "friday");
        assert_eq!(found[1].text, "tomorrow at noon");
        assert_eq!(local(found[1].value), at(2025, 3, 13, 12, 0));
    }

    #[test]
    fn test_absolute_dates() {
        let iso = scan("ship 2025-04-01 at 14:15", reference());
        assert_eq!(local(iso[0].value), at(2025, 4, 1, 14, 15));

        let named = scan("party march 20th", reference());
        assert_eq!(named[0].text, "march 20th");
        assert_eq!(local(named[0].value).date(), NaiveDate::from_ymd_opt(2025, 3, 20).unwrap());

        let day_first = scan("trip on 3rd of may", reference());
        assert_eq!(local(day_first[0].value).date(), NaiveDate::from_ymd_opt(2025, 5, 3).unwrap());
    }

    #[test]
    fn test_relative_offset() {
        let found = scan("check oven in 2 hours", reference());
        assert_eq!(local(found[0].value), at(2025, 3, 12, 12, 0));
    }

    #[test]
    fn test_huge_offsets_are_not_dates() {
        for input in [
            "ship in 99999999 days",
            "ship in 99999999999999 minutes",
            "ship in 9999999999 weeks",
            "ship in 99999999999 hours",
            "ship in 99999999999 months",
        ] {
            assert!(scan(input, reference()).is_empty(), "input: {input:?}");
        }
    }

    #[test]
    fn test_plain_text_has_no_dates() {
        assert!(scan("Water the plants", reference()).is_empty());
        assert!(scan("read 3 maybe books", reference()).is_empty());
        assert!(scan("", reference()).is_empty());
    }

    #[test]
    fn test_invalid_dates_are_skipped() {
        assert!(scan("2025-02-31", reference()).is_empty());
        assert!(scan("13/45", reference()).is_empty());
    }

    #[test]
    fn test_parse_clock() {
        assert_eq!(parse_clock("12am"), NaiveTime::from_hms_opt(0, 0, 0));
        assert_eq!(parse_clock("12 pm"), NaiveTime::from_hms_opt(12, 0, 0));
        assert_eq!(parse_clock("7:45pm"), NaiveTime::from_hms_opt(19, 45, 0));
        assert_eq!(parse_clock("17:00"), NaiveTime::from_hms_opt(17, 0, 0));
        assert_eq!(parse_clock("13pm"), None);
    }
}
