//! Keyword-based auto replies.
//!
//! Inbound text is trimmed and lowercased, then matched against an ordered
//! rule table. The first matching rule produces the reply; if none matches the
//! fallback reply points the sender at `!help`.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

pub const GREETING: &str =
    "Hello! 👋 I'm an automated assistant. Send !help to see what I can do.";
pub const STATUS: &str = "✅ Bot is online and running!";
pub const THANKS: &str = "You're welcome! 😊";
pub const HELP: &str = "📋 Available commands:\n\
!help - Show this list\n\
!status - Check whether the bot is online\n\
!time - Show the current time\n\
hi / hello - Say hello";
pub const FALLBACK: &str = "🤖 I didn't understand that. Type !help to see available commands.";

/// How a rule inspects the normalized text.
#[derive(Debug, Clone)]
enum Matcher {
    Equals(&'static [&'static str]),
    Contains(&'static [&'static str]),
    Either(Box<Matcher>, Box<Matcher>),
}

impl Matcher {
    fn matches(&self, text: &str) -> bool {
        match self {
            Matcher::Equals(words) => words.iter().any(|w| text == *w),
            Matcher::Contains(words) => words.iter().any(|w| text.contains(w)),
            Matcher::Either(a, b) => a.matches(text) || b.matches(text),
        }
    }
}

#[derive(Debug, Clone)]
enum Response {
    Static(&'static str),
    /// Time of day in the engine's timezone.
    LocalTime,
}

#[derive(Debug, Clone)]
struct ReplyRule {
    matcher: Matcher,
    response: Response,
}

/// Maps inbound message text to a reply.
///
/// Deterministic for a given `(text, now)` pair; the timezone used by `!time`
/// is fixed at construction and does not depend on the host locale.
#[derive(Debug, Clone)]
pub struct ReplyEngine {
    timezone: Tz,
    rules: Vec<ReplyRule>,
}

impl ReplyEngine {
    pub fn new(timezone: Tz) -> Self {
        let rules = vec![
            ReplyRule {
                matcher: Matcher::Equals(&["hi", "hello"]),
                response: Response::Static(GREETING),
            },
            ReplyRule {
                matcher: Matcher::Either(
                    Box::new(Matcher::Equals(&["!status"])),
                    Box::new(Matcher::Contains(&["online"])),
                ),
                response: Response::Static(STATUS),
            },
            ReplyRule {
                matcher: Matcher::Equals(&["!time"]),
                response: Response::LocalTime,
            },
            ReplyRule {
                matcher: Matcher::Contains(&["thanks", "thank you"]),
                response: Response::Static(THANKS),
            },
            ReplyRule {
                matcher: Matcher::Equals(&["!help"]),
                response: Response::Static(HELP),
            },
        ];
        Self { timezone, rules }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Compute the reply for `text` as of `now`.
    pub fn reply(&self, text: &str, now: DateTime<Utc>) -> String {
        let normalized = normalize(text);
        self.rules
            .iter()
            .find(|rule| rule.matcher.matches(&normalized))
            .map(|rule| match &rule.response {
                Response::Static(text) => (*text).to_string(),
                Response::LocalTime => self.time_reply(now),
            })
            .unwrap_or_else(|| FALLBACK.to_string())
    }

    /// Compute the reply for `text` using the current wall clock.
    pub fn respond(&self, text: &str) -> String {
        self.reply(text, Utc::now())
    }

    fn time_reply(&self, now: DateTime<Utc>) -> String {
        let local = now.with_timezone(&self.timezone);
        format!(
            "🕐 Current time: {} ({})",
            local.format("%-I:%M:%S %p"),
            self.timezone.name()
        )
    }
}

impl Default for ReplyEngine {
    fn default() -> Self {
        Self::new(Tz::UTC)
    }
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn engine() -> ReplyEngine {
        ReplyEngine::default()
    }

    fn at(hour: u32, min: u32, sec: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, min, sec).unwrap()
    }

    mod rules {
        use super::*;

        #[test]
        fn greeting_starts_with_hello() {
            assert!(engine().reply("Hi", at(0, 0, 0)).starts_with("Hello"));
            assert!(engine().reply("  HELLO ", at(0, 0, 0)).starts_with("Hello"));
        }

        #[test]
        fn greeting_requires_exact_match() {
            assert_eq!(engine().reply("hi there", at(0, 0, 0)), FALLBACK);
        }

        #[test]
        fn status_by_command_or_keyword() {
            assert_eq!(engine().reply("!status", at(0, 0, 0)), STATUS);
            assert_eq!(engine().reply("are you ONLINE?", at(0, 0, 0)), STATUS);
        }

        #[test]
        fn thanks_matches_substring() {
            assert_eq!(engine().reply("thanks a lot", at(0, 0, 0)), THANKS);
            assert_eq!(engine().reply("Thank you!", at(0, 0, 0)), THANKS);
        }

        #[test]
        fn help_is_normalized() {
            assert_eq!(engine().reply("!HELP ", at(0, 0, 0)), HELP);
        }

        #[test]
        fn unknown_text_gets_fallback() {
            assert_eq!(engine().reply("xyz123", at(0, 0, 0)), FALLBACK);
            assert!(FALLBACK.contains("!help"));
        }

        #[test]
        fn help_lists_commands() {
            for command in ["!help", "!status", "!time"] {
                assert!(HELP.contains(command));
            }
            assert!(HELP.lines().count() > 1);
        }
    }

    mod ordering {
        use super::*;

        #[test]
        fn status_wins_over_thanks() {
            assert_eq!(engine().reply("thanks, are you online", at(0, 0, 0)), STATUS);
        }

        #[test]
        fn first_match_wins_over_later_rules() {
            // "hello" could never reach the fallback or any later rule
            assert_eq!(engine().reply("hello", at(0, 0, 0)), GREETING);
            // "!help" contains none of the earlier keywords
            assert_eq!(engine().reply("!help", at(0, 0, 0)), HELP);
        }
    }

    mod time {
        use super::*;

        #[test]
        fn time_uses_configured_zone() {
            let kolkata: Tz = "Asia/Kolkata".parse().unwrap();
            let reply = ReplyEngine::new(kolkata).reply("!time", at(12, 0, 0));
            assert_eq!(reply, "🕐 Current time: 5:30:00 PM (Asia/Kolkata)");
        }

        #[test]
        fn configured_zone_is_reported() {
            let kolkata: Tz = "Asia/Kolkata".parse().unwrap();
            assert_eq!(ReplyEngine::new(kolkata).timezone(), kolkata);
            assert_eq!(engine().timezone(), Tz::UTC);
            assert_eq!(ReplyEngine::new(kolkata).timezone().to_string(), "Asia/Kolkata");
        }

        #[test]
        fn time_in_utc() {
            let reply = engine().reply("!TIME", at(9, 5, 7));
            assert_eq!(reply, "🕐 Current time: 9:05:07 AM (UTC)");
        }

        #[test]
        fn same_input_same_instant_same_output() {
            let now = at(23, 59, 59);
            let e = engine();
            for text in ["!time", "hi", "xyz"] {
                assert_eq!(e.reply(text, now), e.reply(text, now));
            }
        }
    }

    #[test]
    fn respond_uses_wall_clock() {
        assert_eq!(engine().respond("hello"), GREETING);
        assert!(engine().respond("!time").starts_with("🕐 Current time:"));
    }
}
