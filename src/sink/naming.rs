use std::fmt;

use chrono::{DateTime, Offset, TimeZone, Utc};

/// Military time-zone letters keyed by minutes west of UTC.
const ZONE_LETTERS: &[(i32, &str)] = &[
    (0, "Z"),
    (60, "N"),
    (120, "O"),
    (180, "P"),
    (210, "P30"),
    (240, "Q"),
    (300, "R"),
    (360, "S"),
    (420, "T"),
    (480, "U"),
    (540, "V"),
    (570, "V30"),
    (600, "W"),
    (660, "X"),
    (720, "Y"),
    (-840, "MB"),
    (-780, "MA"),
    (-765, "M45"),
    (-720, "M"),
    (-660, "L"),
    (-630, "K30"),
    (-600, "K"),
    (-570, "I30"),
    (-540, "I"),
    (-525, "H45"),
    (-480, "H"),
    (-420, "G"),
    (-390, "F30"),
    (-360, "F"),
    (-330, "E30"),
    (-300, "E"),
    (-270, "D30"),
    (-240, "D"),
    (-210, "C30"),
    (-180, "C"),
    (-120, "B"),
    (-60, "A"),
];

/// Letter for an offset of `minutes_west` minutes behind UTC; `J` (local
/// time, unspecified) when the offset has no letter.
pub fn zone_letter(minutes_west: i32) -> &'static str {
    ZONE_LETTERS
        .iter()
        .find(|(offset, _)| *offset == minutes_west)
        .map(|(_, letter)| *letter)
        .unwrap_or("J")
}

/// `YYYY-MM-DDTHH-MM-SS<zone>`, safe to use in file names on every platform.
///
/// With `local` the wall-clock time of `at` is used and suffixed with its
/// zone letter; otherwise the time is converted to UTC and suffixed `Z`.
pub fn filename_safe_timestamp<Tz>(at: &DateTime<Tz>, local: bool) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    if local {
        let minutes_west = -at.offset().fix().local_minus_utc() / 60;
        format!(
            "{}{}",
            at.format("%Y-%m-%dT%H-%M-%S"),
            zone_letter(minutes_west)
        )
    } else {
        format!(
            "{}Z",
            at.with_timezone(&Utc).format("%Y-%m-%dT%H-%M-%S")
        )
    }
}
