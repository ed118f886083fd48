//! Date detection in extracted text.

use chrono::{DateTime, NaiveDate, Utc};
use regex::{Captures, Regex};
use std::sync::LazyLock;

static DATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        \b(?:
            (?P<d>\d{1,2})[./-](?P<m>\d{1,2})[./-](?P<y>\d{4})
          | (?P<iy>\d{4})-(?P<im>\d{1,2})-(?P<id>\d{1,2})
          | (?P<wd>\d{1,2})\.?\s+(?P<mon>[a-z]{3,9})\.?,?\s+(?P<wy>\d{4})
        )\b",
    )
    .unwrap_or_else(|_| unreachable!())
});

const MIN_YEAR: i32 = 1900;

fn month_number(name: &str) -> Option<u32> {
    let month = match name.to_lowercase().as_str() {
        "jan" | "january" => 1,
        "feb" | "february" => 2,
        "mar" | "march" => 3,
        "apr" | "april" => 4,
        "may" => 5,
        "jun" | "june" => 6,
        "jul" | "july" => 7,
        "aug" | "august" => 8,
        "sep" | "sept" | "september" => 9,
        "oct" | "october" => 10,
        "nov" | "november" => 11,
        "dec" | "december" => 12,
        _ => return None,
    };
    Some(month)
}

fn number<T: std::str::FromStr>(caps: &Captures<'_>, name: &str) -> Option<T> {
    caps.name(name)?.as_str().parse().ok()
}

fn date_from(caps: &Captures<'_>) -> Option<NaiveDate> {
    let (year, month, day) = if caps.name("y").is_some() {
        (number(caps, "y")?, number(caps, "m")?, number(caps, "d")?)
    } else if caps.name("iy").is_some() {
        (number(caps, "iy")?, number(caps, "im")?, number(caps, "id")?)
    } else {
        (
            number(caps, "wy")?,
            month_number(caps.name("mon")?.as_str())?,
            number(caps, "wd")?,
        )
    };
    if year < MIN_YEAR {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Returns the first valid date in reading order, at midnight UTC.
///
/// Recognized forms are `DD.MM.YYYY` (also with `/` or `-`), `YYYY-MM-DD`
/// and `DD Month YYYY`. Bare digit runs such as `20180213` are not dates.
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use papertray::backends::dates::first_date;
///
/// let text = "lorem ipsum 130218, 2018, 20180213 and lorem 13.02.2018";
/// assert_eq!(first_date(text), Some(Utc.with_ymd_and_hms(2018, 2, 13, 0, 0, 0).unwrap()));
/// ```
#[must_use]
pub fn first_date(text: &str) -> Option<DateTime<Utc>> {
    DATE_PATTERN
        .captures_iter(text)
        .find_map(|caps| date_from(&caps))
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ymd(y: i32, m: u32, d: u32) -> Option<DateTime<Utc>> {
        Some(Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap())
    }

    #[test]
    fn test_day_month_year() {
        assert_eq!(first_date("Date: 02/03/2019"), ymd(2019, 3, 2));
        assert_eq!(first_date("am 1-12-2020 erstellt"), ymd(2020, 12, 1));
    }

    #[test]
    fn test_iso() {
        assert_eq!(first_date("issued 2017-11-05 by"), ymd(2017, 11, 5));
    }

    #[test]
    fn test_written_month() {
        assert_eq!(first_date("London, 4 March 2016"), ymd(2016, 3, 4));
        assert_eq!(first_date("4. Sept. 2016"), ymd(2016, 9, 4));
    }

    #[test]
    fn test_skips_invalid_dates() {
        assert_eq!(first_date("31.02.2018 then 01.03.2018"), ymd(2018, 3, 1));
        assert_eq!(first_date("01.01.1066"), None);
        assert_eq!(first_date("12 Smarch 2018"), None);
    }

    #[test]
    fn test_no_date() {
        assert_eq!(first_date("nothing here 20180213"), None);
        assert_eq!(first_date(""), None);
    }
}
