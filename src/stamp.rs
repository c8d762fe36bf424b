// Record timestamps for the TIME column: wall clock as YYYY/MM/DD-HH:MM:SS (UTC).
use time::OffsetDateTime;

pub fn wall_stamp() -> String {
    stamp_at(OffsetDateTime::now_utc())
}

fn stamp_at(ts: OffsetDateTime) -> String {
    format!(
        "{:04}/{:02}/{:02}-{:02}:{:02}:{:02}",
        ts.year(),
        u8::from(ts.month()),
        ts.day(),
        ts.hour(),
        ts.minute(),
        ts.second()
    )
}
