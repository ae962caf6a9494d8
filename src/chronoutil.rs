use chrono::format::ParseResult;
use chrono::naive::NaiveDateTime;
use chrono::offset::Utc;
use chrono::{DateTime, TimeZone};

/// IMF-fixdate, the preferred HTTP-date format: `Sun, 06 Nov 1994 08:49:37 GMT`.
const IMF_FIXDATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// The obsolete RFC 850 format: `Sunday, 06-Nov-94 08:49:37 GMT`.
const RFC_850_FORMAT: &str = "%A, %d-%b-%y %H:%M:%S GMT";

/// The obsolete asctime format: `Sun Nov  6 08:49:37 1994`.
const ASCTIME_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

pub(crate) trait ParseHTTPDate<T> {
    /// Parse an HTTP-date in any of the three formats a recipient must accept.
    fn parse_from_http_date(s: &str) -> ParseResult<T>;
}

impl ParseHTTPDate<DateTime<Utc>> for DateTime<Utc> {
    fn parse_from_http_date(s: &str) -> ParseResult<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(s, IMF_FIXDATE_FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(s, RFC_850_FORMAT))
            .or_else(|_| NaiveDateTime::parse_from_str(s, ASCTIME_FORMAT))
            .map(|naive| Utc.from_utc_datetime(&naive))
    }
}

#[cfg(test)]
mod tests {
    use super::ParseHTTPDate;
    use chrono::{DateTime, Utc};

    #[test_log::test]
    fn test_http_date_formats() {
        let expected = 1618884475; // Tue, 20 Apr 2021 02:07:55 UTC

        let parsed = DateTime::<Utc>::parse_from_http_date("Tue, 20 Apr 2021 02:07:55 GMT").unwrap();
        assert_eq!(parsed.timestamp(), expected);

        let parsed = DateTime::<Utc>::parse_from_http_date("Tuesday, 20-Apr-21 02:07:55 GMT").unwrap();
        assert_eq!(parsed.timestamp(), expected);

        let parsed = DateTime::<Utc>::parse_from_http_date("Tue Apr 20 02:07:55 2021").unwrap();
        assert_eq!(parsed.timestamp(), expected);
    }

    #[test_log::test]
    fn test_http_date_error_handling() {
        assert!(DateTime::<Utc>::parse_from_http_date("blatantly-wrong").is_err());
        assert!(DateTime::<Utc>::parse_from_http_date("2021-04-20T02:07:55Z").is_err());
        // The weekday must agree with the date.
        assert!(DateTime::<Utc>::parse_from_http_date("Wed, 20 Apr 2021 02:07:55 GMT").is_err());
    }
}
