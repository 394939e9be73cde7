/// Source id constants to ensure consistency across the codebase.
/// These are the ids used in registry files, CLI arguments and cache keys.
pub const EVENTBRITE_SOURCE: &str = "eventbrite";
pub const MEETUP_SOURCE: &str = "meetup";
pub const TICKETMASTER_SOURCE: &str = "ticketmaster";
pub const SONGKICK_SOURCE: &str = "songkick";
pub const DICE_SOURCE: &str = "dice";
pub const RESIDENT_ADVISOR_SOURCE: &str = "resident_advisor";
pub const ENTRADIUM_SOURCE: &str = "entradium";
pub const TICKETEK_SOURCE: &str = "ticketek";
pub const FIXTURELIST_SOURCE: &str = "fixturelist";
pub const TIMEOUT_CITY_SOURCE: &str = "timeout_city";

/// Region tag that declares a source covers every country.
pub const GLOBAL_REGION: &str = "global";

/// Get all built-in source ids
pub fn builtin_source_ids() -> Vec<&'static str> {
    vec![
        EVENTBRITE_SOURCE,
        MEETUP_SOURCE,
        TICKETMASTER_SOURCE,
        SONGKICK_SOURCE,
        DICE_SOURCE,
        RESIDENT_ADVISOR_SOURCE,
        ENTRADIUM_SOURCE,
        TICKETEK_SOURCE,
        FIXTURELIST_SOURCE,
        TIMEOUT_CITY_SOURCE,
    ]
}
