use std::sync::OnceLock;

use chrono::{
  DateTime,
  Datelike,
  Local,
  NaiveDate,
  Utc
};
use regex::Regex;
use serde_json::Value;

use crate::task::Task;

/// Two digit years below this pivot land in the 2000s, the rest in the
/// 1900s.
const TWO_DIGIT_YEAR_PIVOT: i32 = 70;

/// Outcome of reading a date typed in the display format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayDate {
  Empty,
  Invalid,
  Valid(NaiveDate)
}

impl DisplayDate {
  pub fn status(&self) -> &'static str {
    match self {
      | Self::Empty => "empty",
      | Self::Invalid => "invalid",
      | Self::Valid(_) => "valid"
    }
  }

  /// Canonical ISO value when valid.
  pub fn value(&self) -> Option<String> {
    self.date().map(format_iso)
  }

  pub fn date(&self) -> Option<NaiveDate> {
    match self {
      | Self::Valid(date) => Some(*date),
      | _ => None
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
  OnTime,
  Late
}

impl CompletionStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      | Self::OnTime => "on-time",
      | Self::Late => "late"
    }
  }
}

fn iso_pattern()
-> Option<&'static Regex> {
  static ISO_RE: OnceLock<
    Option<Regex>
  > = OnceLock::new();
  ISO_RE
    .get_or_init(|| {
      Regex::new(
        r"^(?P<year>[0-9]{4})-(?P<month>[0-9]{2})-(?P<day>[0-9]{2})$"
      )
      .ok()
    })
    .as_ref()
}

fn display_pattern()
-> Option<&'static Regex> {
  static DISPLAY_RE: OnceLock<
    Option<Regex>
  > = OnceLock::new();
  DISPLAY_RE
    .get_or_init(|| {
      Regex::new(
        r"^(?P<day>[0-9]{1,2})/(?P<month>[0-9]{1,2})/(?P<year>[0-9]{4}|[0-9]{2})$"
      )
      .ok()
    })
    .as_ref()
}

/// Parses a canonical `YYYY-MM-DD` date. Dates the calendar cannot hold,
/// such as `2023-02-30`, are rejected rather than rolled over.
pub fn parse_iso(
  input: &str
) -> Option<NaiveDate> {
  let caps =
    iso_pattern()?.captures(input)?;
  let year = caps
    .name("year")?
    .as_str()
    .parse::<i32>()
    .ok()?;
  let month = caps
    .name("month")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  let day = caps
    .name("day")?
    .as_str()
    .parse::<u32>()
    .ok()?;

  calendar_date(year, month, day)
}

/// Parses `DD/MM/YYYY` (or `DD/MM/YY`) as typed by the user.
pub fn parse_display(
  input: &str
) -> DisplayDate {
  let trimmed = input.trim();
  if trimmed.is_empty() {
    return DisplayDate::Empty;
  }

  let Some(pattern) = display_pattern()
  else {
    return DisplayDate::Invalid;
  };
  let Some(caps) =
    pattern.captures(trimmed)
  else {
    return DisplayDate::Invalid;
  };

  match display_components(&caps) {
    | Some(date) => {
      DisplayDate::Valid(date)
    }
    | None => DisplayDate::Invalid
  }
}

fn display_components(
  caps: &regex::Captures<'_>
) -> Option<NaiveDate> {
  let day = caps
    .name("day")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  let month = caps
    .name("month")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  let raw_year =
    caps.name("year")?.as_str();
  let mut year =
    raw_year.parse::<i32>().ok()?;
  if raw_year.len() == 2 {
    year += if year
      < TWO_DIGIT_YEAR_PIVOT
    {
      2000
    } else {
      1900
    };
  }

  calendar_date(year, month, day)
}

/// Builds the date and confirms the calendar kept every component as
/// given.
fn calendar_date(
  year: i32,
  month: u32,
  day: u32
) -> Option<NaiveDate> {
  let date = NaiveDate::from_ymd_opt(
    year, month, day
  )?;
  (date.year() == year
    && date.month() == month
    && date.day() == day)
    .then_some(date)
}

pub fn format_iso(
  date: NaiveDate
) -> String {
  format!(
    "{:04}-{:02}-{:02}",
    date.year(),
    date.month(),
    date.day()
  )
}

pub fn format_date_display(
  date: NaiveDate
) -> String {
  format!(
    "{:02}/{:02}/{:04}",
    date.day(),
    date.month(),
    date.year()
  )
}

/// ISO to `DD/MM/YYYY`; empty when the input is not a valid ISO date.
pub fn format_display(
  iso: &str
) -> String {
  parse_iso(iso)
    .map(format_date_display)
    .unwrap_or_default()
}

/// Current calendar date in the local timezone.
pub fn today() -> NaiveDate {
  Local::now().date_naive()
}

pub fn today_iso() -> String {
  format_iso(today())
}

/// Calendar date a completion timestamp falls on, in local time.
pub fn local_date(
  at: DateTime<Utc>
) -> NaiveDate {
  at.with_timezone(&Local)
    .date_naive()
}

pub fn is_overdue(task: &Task) -> bool {
  is_overdue_on(task, today())
}

pub fn is_overdue_on(
  task: &Task,
  today: NaiveDate
) -> bool {
  !task.completed
    && task
      .due_date
      .is_some_and(|due| due < today)
}

pub fn completion_status(
  due_date: Option<NaiveDate>,
  completed_at: Option<DateTime<Utc>>
) -> Option<CompletionStatus> {
  let due = due_date?;
  let done = local_date(completed_at?);
  if done <= due {
    Some(CompletionStatus::OnTime)
  } else {
    Some(CompletionStatus::Late)
  }
}

/// Reads a stored timestamp: RFC 3339 text or epoch milliseconds.
pub fn parse_timestamp(
  value: &Value
) -> Option<DateTime<Utc>> {
  match value {
    | Value::String(raw) => {
      DateTime::parse_from_rfc3339(
        raw.trim()
      )
      .ok()
      .map(|dt| dt.with_timezone(&Utc))
    }
    | Value::Number(number) => {
      let millis =
        number.as_i64().or_else(|| {
          number
            .as_f64()
            .filter(|f| f.is_finite())
            .map(|f| f as i64)
        })?;
      DateTime::from_timestamp_millis(
        millis
      )
    }
    | _ => None
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    TimeZone,
    Utc
  };
  use proptest::prelude::*;
  use rstest::rstest;
  use serde_json::json;

  use super::*;
  use crate::task::Task;

  fn date(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid test date")
  }

  #[rstest]
  #[case("2024-02-29", Some(date(2024, 2, 29)))]
  #[case("2023-02-29", None)]
  #[case("2023-02-30", None)]
  #[case("2023-13-01", None)]
  #[case("2023-00-10", None)]
  #[case("2023-1-05", None)]
  #[case(" 2023-01-05", None)]
  #[case("2023-01-05T00:00", None)]
  #[case("", None)]
  fn iso_parsing_rejects_impossible_dates(
    #[case] input: &str,
    #[case] expected: Option<NaiveDate>
  ) {
    assert_eq!(
      parse_iso(input),
      expected
    );
  }

  #[rstest]
  #[case("", "empty", None)]
  #[case("   ", "empty", None)]
  #[case("30/02/2023", "invalid", None)]
  #[case("2023-01-01", "invalid", None)]
  #[case("1/2/2024", "valid", Some("2024-02-01"))]
  #[case(" 05/11/2023 ", "valid", Some("2023-11-05"))]
  #[case("01/01/70", "valid", Some("1970-01-01"))]
  #[case("01/01/69", "valid", Some("2069-01-01"))]
  #[case("31/12/99", "valid", Some("1999-12-31"))]
  #[case("01/01/123", "invalid", None)]
  fn display_parsing(
    #[case] input: &str,
    #[case] status: &str,
    #[case] value: Option<&str>
  ) {
    let parsed = parse_display(input);
    assert_eq!(parsed.status(), status);
    assert_eq!(
      parsed.value().as_deref(),
      value
    );
  }

  #[test]
  fn format_display_is_empty_for_bad_input()
  {
    assert_eq!(
      format_display("2023-07-04"),
      "04/07/2023"
    );
    assert_eq!(
      format_display("2023-02-30"),
      ""
    );
    assert_eq!(
      format_display("soon"),
      ""
    );
  }

  #[test]
  fn overdue_only_for_open_tasks_due_before_today()
   {
    let now = Utc
      .with_ymd_and_hms(
        2026, 3, 10, 12, 0, 0
      )
      .single()
      .expect("valid now");
    let today = date(2026, 3, 10);

    let mut task = Task::new(
      "<p>x</p>".to_string(),
      None,
      Some(date(2026, 3, 9)),
      now
    );
    assert!(is_overdue_on(&task, today));

    task.due_date =
      Some(date(2026, 3, 10));
    assert!(!is_overdue_on(
      &task, today
    ));

    task.due_date =
      Some(date(2026, 3, 1));
    task.mark_completed(now);
    assert!(!is_overdue_on(
      &task, today
    ));

    task.mark_active();
    task.due_date = None;
    assert!(!is_overdue_on(
      &task, today
    ));
  }

  #[test]
  fn completion_status_compares_calendar_days()
   {
    let done = Utc
      .with_ymd_and_hms(
        2026, 3, 10, 12, 0, 0
      )
      .single()
      .expect("valid timestamp");

    assert_eq!(
      completion_status(
        Some(date(2026, 3, 20)),
        Some(done)
      ),
      Some(CompletionStatus::OnTime)
    );
    assert_eq!(
      completion_status(
        Some(date(2026, 3, 1)),
        Some(done)
      ),
      Some(CompletionStatus::Late)
    );
    assert_eq!(
      completion_status(None, Some(done)),
      None
    );
    assert_eq!(
      completion_status(
        Some(date(2026, 3, 1)),
        None
      ),
      None
    );
    assert_eq!(
      CompletionStatus::OnTime.as_str(),
      "on-time"
    );
  }

  #[test]
  fn timestamps_accept_rfc3339_and_epoch_millis()
   {
    let expected = Utc
      .with_ymd_and_hms(
        2024, 1, 2, 3, 4, 5
      )
      .single()
      .expect("valid timestamp");

    assert_eq!(
      parse_timestamp(&json!(
        "2024-01-02T03:04:05Z"
      )),
      Some(expected)
    );
    assert_eq!(
      parse_timestamp(&json!(
        expected.timestamp_millis()
      )),
      Some(expected)
    );
    assert_eq!(
      parse_timestamp(&json!("later")),
      None
    );
    assert_eq!(
      parse_timestamp(&json!(null)),
      None
    );
  }

  proptest! {
    #[test]
    fn iso_and_display_round_trip(days in 0i64..(366 * 400)) {
      let base = date(1800, 1, 1);
      let d = base + chrono::Duration::days(days);
      let iso = format_iso(d);

      prop_assert_eq!(parse_iso(&iso), Some(d));
      let display = format_display(&iso);
      prop_assert_eq!(parse_display(&display).value(), Some(iso));
    }
  }
}
