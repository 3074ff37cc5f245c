use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime, PrimitiveDateTime};

pub(crate) fn primitive_now_utc() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    PrimitiveDateTime::new(now.date(), now.time())
}

pub(crate) fn format_primitive(value: PrimitiveDateTime) -> String {
    value.assume_utc().format(&Rfc3339).unwrap_or_else(|_| value.assume_utc().to_string())
}

/// True once `window` has fully elapsed between `since` and `now`.
pub(crate) fn window_elapsed(
    since: PrimitiveDateTime,
    window: Duration,
    now: PrimitiveDateTime,
) -> bool {
    now - since >= window
}
