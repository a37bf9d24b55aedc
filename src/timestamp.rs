use chrono::{DateTime, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::{America::New_York, Tz};

use crate::error::FieldError;

/// Source timestamps are wall-clock times in this zone
pub const SOURCE_TIMEZONE: Tz = New_York;

/// chrono equivalent of the `MM/dd/yyyy hh:mm:ss tt` source pattern
const SOURCE_FORMAT: &str = "%m/%d/%Y %I:%M:%S %p";

/// Character classes of the source pattern: `9` digit, `A` letter, anything else literal.
/// chrono accepts unpadded numbers, so the shape is checked first to keep the match exact.
const SOURCE_SHAPE: &[u8] = b"99/99/9999 99:99:99 AA";

/// Parse a source timestamp and normalize it to UTC.
///
/// The string carries no offset; it is read as US Eastern civil time and converted with
/// the zone's historical daylight-saving rules. A time repeated by the fall-back
/// transition resolves to standard time. A time skipped by the spring-forward
/// transition is rejected.
pub fn parse_eastern_timestamp(
    column: &'static str,
    value: &str,
) -> Result<DateTime<Utc>, FieldError> {
    let invalid = || FieldError::InvalidTimestamp {
        column,
        value: value.to_string(),
    };

    if !matches_source_shape(value) {
        return Err(invalid());
    }

    let naive = NaiveDateTime::parse_from_str(value, SOURCE_FORMAT).map_err(|_| invalid())?;

    match SOURCE_TIMEZONE.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        // Fall-back hour: earliest is daylight time, latest is standard time
        LocalResult::Ambiguous(_, standard) => Ok(standard.with_timezone(&Utc)),
        LocalResult::None => Err(FieldError::NonexistentLocalTime {
            column,
            value: value.to_string(),
        }),
    }
}

fn matches_source_shape(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == SOURCE_SHAPE.len()
        && bytes
            .iter()
            .zip(SOURCE_SHAPE)
            .all(|(&b, &class)| match class {
                b'9' => b.is_ascii_digit(),
                b'A' => b.is_ascii_alphabetic(),
                literal => b == literal,
            })
}
