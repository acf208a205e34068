use chrono::{
  DateTime,
  NaiveDate,
  Utc
};
use chrono_tz::Tz;
use tracing::warn;

const DUE_DATE_FORMAT: &str =
  "%Y-%m-%d";

pub fn parse_timezone(
  raw: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => Some(tz),
    | Err(error) => {
      warn!(
        timezone = trimmed,
        %error,
        "invalid timezone name"
      );
      None
    }
  }
}

/// Calendar date of `now` as seen in
/// `tz`. Recurrence and overdue checks
/// are measured against this.
#[must_use]
pub fn local_date(
  now: DateTime<Utc>,
  tz: &Tz
) -> NaiveDate {
  now.with_timezone(tz).date_naive()
}

/// Accepts `YYYY-MM-DD` or a full RFC
/// 3339 timestamp (date part kept).
/// Blank and unparseable input mean
/// "no due date".
pub fn parse_due_date(
  raw: &str
) -> Option<NaiveDate> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return None;
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      trimmed,
      DUE_DATE_FORMAT
    )
  {
    return Some(date);
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(
      trimmed
    )
  {
    return Some(dt.date_naive());
  }

  warn!(
    raw = trimmed,
    "ignoring unparseable due date"
  );
  None
}

#[must_use]
pub fn format_due_date(
  date: NaiveDate
) -> String {
  date
    .format(DUE_DATE_FORMAT)
    .to_string()
}

pub mod due_date_serde {
  use chrono::NaiveDate;
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };
  use serde_json::Value;

  pub fn serialize<S>(
    date: &Option<NaiveDate>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    match date {
      | Some(value) => {
        serializer.serialize_str(
          &super::format_due_date(
            *value
          )
        )
      }
      | None => {
        serializer.serialize_none()
      }
    }
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<Option<NaiveDate>, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw =
      Option::<Value>::deserialize(
        deserializer
      )?;
    Ok(match raw {
      | Some(Value::String(text)) => {
        super::parse_due_date(&text)
      }
      | _ => None
    })
  }
}
