use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

const TIMEZONE_CONFIG_FILE: &str = "dayline-time.toml";
const TIMEZONE_ENV_VAR: &str = "DAYLINE_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str = "DAYLINE_TIME_CONFIG";

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
    timezone: Option<String>,
    time: Option<TimezoneSection>,
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
    timezone: Option<String>,
}

/// Timezone used for rendering deadlines and interpreting local date input.
pub fn display_timezone() -> &'static Tz {
    static DISPLAY_TZ: OnceLock<Tz> = OnceLock::new();
    DISPLAY_TZ.get_or_init(resolve_display_timezone)
}

/// Drops sub-millisecond precision so in-memory instants match what the
/// epoch-millisecond record format can represent.
#[must_use]
pub fn millis_floor(dt: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(dt.timestamp_millis()).unwrap_or(dt)
}

/// Formats a deadline for display, e.g. `25 Aug 2026 14:30`.
#[must_use]
pub fn format_deadline(dt: DateTime<Utc>) -> String {
    dt.with_timezone(display_timezone())
        .format("%-d %b %Y %H:%M")
        .to_string()
}

fn resolve_display_timezone() -> Tz {
    if let Ok(raw) = std::env::var(TIMEZONE_ENV_VAR) {
        if let Some(tz) = parse_timezone(&raw, TIMEZONE_ENV_VAR) {
            return tz;
        }
    }

    if let Some(path) = timezone_config_path()
        && let Some(tz) = load_timezone_from_file(&path)
    {
        return tz;
    }

    chrono_tz::UTC
}

fn timezone_config_path() -> Option<PathBuf> {
    if let Ok(raw) = std::env::var(TIMEZONE_CONFIG_ENV_VAR) {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    std::env::current_dir()
        .ok()
        .map(|dir| dir.join(TIMEZONE_CONFIG_FILE))
}

fn load_timezone_from_file(path: &Path) -> Option<Tz> {
    if !path.exists() {
        return None;
    }

    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::error!(
                file = %path.display(),
                error = %err,
                "failed reading timezone config file"
            );
            return None;
        }
    };

    let parsed = match toml::from_str::<TimezoneConfig>(&raw) {
        Ok(parsed) => parsed,
        Err(err) => {
            tracing::error!(
                file = %path.display(),
                error = %err,
                "failed parsing timezone config file"
            );
            return None;
        }
    };

    let timezone = parsed
        .timezone
        .or_else(|| parsed.time.and_then(|section| section.timezone));
    let Some(timezone) = timezone else {
        tracing::warn!(
            file = %path.display(),
            "timezone config had no timezone field"
        );
        return None;
    };

    parse_timezone(timezone.as_str(), &format!("file:{}", path.display()))
}

fn parse_timezone(raw: &str, source: &str) -> Option<Tz> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        tracing::warn!(source, "timezone source was empty");
        return None;
    }

    match trimmed.parse::<Tz>() {
        Ok(tz) => {
            tracing::info!(source, timezone = %trimmed, "configured display timezone");
            Some(tz)
        }
        Err(err) => {
            tracing::error!(
                source,
                timezone = %trimmed,
                error = %err,
                "failed to parse timezone id"
            );
            None
        }
    }
}

fn to_utc_from_display_local(
    local_naive: NaiveDateTime,
    context: &str,
) -> anyhow::Result<DateTime<Utc>> {
    match display_timezone().from_local_datetime(&local_naive) {
        LocalResult::Single(local_dt) => Ok(local_dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(first, second) => {
            tracing::warn!(
                context,
                first = %first,
                second = %second,
                "ambiguous local datetime; using earliest"
            );
            let chosen = if first <= second { first } else { second };
            Ok(chosen.with_timezone(&Utc))
        }
        LocalResult::None => Err(anyhow!(
            "local datetime does not exist in configured timezone: {context}"
        )),
    }
}

/// Parses a deadline expression into a UTC instant.
///
/// Accepted forms: `now`, `today`, `tomorrow`, signed relatives (`+2h`,
/// `-30m`, `+3d`), RFC3339, `YYYY-MM-DD`, and `YYYY-MM-DDTHH:MM` /
/// `YYYY-MM-DD HH:MM` interpreted in the display timezone.
#[tracing::instrument(skip(now), fields(input = input))]
pub fn parse_date_expr(input: &str, now: DateTime<Utc>) -> anyhow::Result<DateTime<Utc>> {
    let token = input.trim();
    let lower = token.to_ascii_lowercase();

    match lower.as_str() {
        "now" => return Ok(now),
        "today" => {
            let local_now = now.with_timezone(display_timezone());
            let midnight = local_now
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .ok_or_else(|| anyhow!("failed to construct midnight for today"))?;
            return to_utc_from_display_local(midnight, "today");
        }
        "tomorrow" => {
            let today = parse_date_expr("today", now)?;
            return Ok(today + Duration::days(1));
        }
        _ => {}
    }

    let rel_re = Regex::new(r"^(?P<sign>[+-])(?P<num>\d+)(?P<unit>[dhm])$")
        .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;

    if let Some(caps) = rel_re.captures(token) {
        let sign = caps
            .name("sign")
            .map(|m| m.as_str())
            .ok_or_else(|| anyhow!("missing relative sign"))?;
        let num: i64 = caps
            .name("num")
            .map(|m| m.as_str())
            .ok_or_else(|| anyhow!("missing relative amount"))?
            .parse()
            .context("invalid relative number")?;
        let unit = caps
            .name("unit")
            .map(|m| m.as_str())
            .ok_or_else(|| anyhow!("missing relative unit"))?;

        let duration = match unit {
            "d" => Duration::days(num),
            "h" => Duration::hours(num),
            "m" => Duration::minutes(num),
            _ => return Err(anyhow!("unknown relative unit: {unit}")),
        };

        return Ok(if sign == "-" {
            now - duration
        } else {
            now + duration
        });
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(token) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(date) = NaiveDate::parse_from_str(token, "%Y-%m-%d") {
        let midnight = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| anyhow!("failed to construct midnight for date"))?;
        return to_utc_from_display_local(midnight, "date");
    }

    for fmt in ["%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(token, fmt) {
            return to_utc_from_display_local(ndt, fmt);
        }
    }

    Err(anyhow!("unrecognized date expression: {input}")).with_context(|| {
        "supported formats: now/today/tomorrow, +Nd/+Nh/+Nm, RFC3339, \
         YYYY-MM-DD, YYYY-MM-DDTHH:MM, YYYY-MM-DD HH:MM"
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::{millis_floor, parse_date_expr};

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 17, 12, 0, 0)
            .single()
            .expect("valid now")
    }

    #[test]
    fn parses_relative_offsets() {
        let now = fixed_now();
        assert_eq!(
            parse_date_expr("+2h", now).expect("parse +2h"),
            now + Duration::hours(2)
        );
        assert_eq!(
            parse_date_expr("-30m", now).expect("parse -30m"),
            now - Duration::minutes(30)
        );
        assert_eq!(
            parse_date_expr("+3d", now).expect("parse +3d"),
            now + Duration::days(3)
        );
    }

    #[test]
    fn parses_rfc3339() {
        let now = fixed_now();
        let parsed = parse_date_expr("2026-05-01T09:00:00Z", now).expect("parse rfc3339");
        assert_eq!(
            parsed,
            Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0)
                .single()
                .expect("valid instant")
        );
    }

    #[test]
    fn rejects_unknown_expressions() {
        let err = parse_date_expr("whenever", fixed_now()).expect_err("must fail");
        assert!(format!("{err:#}").contains("unrecognized date expression"));
    }

    #[test]
    fn millis_floor_discards_sub_millisecond_precision() {
        let dt = DateTime::from_timestamp(1_700_000_000, 123_456_789).expect("valid instant");
        let floored = millis_floor(dt);
        assert_eq!(floored.timestamp_millis(), dt.timestamp_millis());
        assert_eq!(floored.timestamp_subsec_nanos() % 1_000_000, 0);
    }
}

pub mod epoch_ms_serde {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(dt.timestamp_millis())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = i64::deserialize(deserializer)?;
        DateTime::from_timestamp_millis(millis).ok_or_else(|| {
            serde::de::Error::custom(format!("epoch milliseconds out of range: {millis}"))
        })
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S>(dt: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match dt {
                Some(value) => super::serialize(value, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let opt = Option::<i64>::deserialize(deserializer)?;
            match opt {
                Some(millis) => {
                    DateTime::from_timestamp_millis(millis)
                        .map(Some)
                        .ok_or_else(|| {
                            serde::de::Error::custom(format!(
                                "epoch milliseconds out of range: {millis}"
                            ))
                        })
                }
                None => Ok(None),
            }
        }
    }
}
