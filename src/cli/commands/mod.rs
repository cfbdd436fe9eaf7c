pub mod engine;
pub mod logging;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

pub const ARG_IDENTITY: &str = "identity";
pub const ARG_MESSAGE: &str = "message";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("holdfast")
        .about("Resilient remote-session execution engine")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("session")
                .about("Inspect or remove the stored session")
                .subcommand_required(true)
                .subcommand(
                    Command::new("show")
                        .about("Show the identity and setting keys of the stored session")
                        .arg(
                            Arg::new(ARG_IDENTITY)
                                .short('i')
                                .long(ARG_IDENTITY)
                                .help("Identity the session must belong to")
                                .env("HOLDFAST_IDENTITY")
                                .required(true),
                        ),
                )
                .subcommand(Command::new("clear").about("Remove the stored session")),
        )
        .subcommand(
            Command::new("extract-code")
                .about("Extract a verification code from a saved RFC 822 message")
                .arg(
                    Arg::new(ARG_MESSAGE)
                        .help("Path to the .eml file")
                        .required(true),
                ),
        )
        .subcommand(Command::new("config").about("Print the effective engine configuration"));

    let command = engine::with_args(command);
    logging::with_args(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "holdfast");
        assert_eq!(
            command.get_about().map(ToString::to_string),
            Some("Resilient remote-session execution engine".to_string())
        );
        assert_eq!(
            command.get_version().map(ToString::to_string),
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
    }

    #[test]
    fn test_session_show_identity() {
        temp_env::with_vars([("HOLDFAST_IDENTITY", None::<&str>)], || {
            let matches =
                new().get_matches_from(vec!["holdfast", "session", "show", "--identity", "alice"]);
            let show = matches
                .subcommand_matches("session")
                .and_then(|m| m.subcommand_matches("show"));
            assert_eq!(
                show.and_then(|m| m.get_one::<String>(ARG_IDENTITY)).cloned(),
                Some("alice".to_string())
            );
        });
    }

    #[test]
    fn test_session_show_requires_identity() {
        temp_env::with_vars([("HOLDFAST_IDENTITY", None::<&str>)], || {
            let result = new().try_get_matches_from(vec!["holdfast", "session", "show"]);
            assert!(result.is_err());
        });
    }

    #[test]
    fn test_global_args_after_subcommand() {
        let matches = new().get_matches_from(vec![
            "holdfast",
            "config",
            "--session-file",
            "/tmp/alice.json",
            "--max-retries",
            "5",
        ]);
        assert_eq!(
            matches.get_one::<String>(engine::ARG_SESSION_FILE).cloned(),
            Some("/tmp/alice.json".to_string())
        );
        assert_eq!(
            matches.get_one::<u32>(engine::ARG_MAX_RETRIES).copied(),
            Some(5)
        );
    }

    #[test]
    fn test_check_env() {
        temp_env::with_vars(
            [
                ("HOLDFAST_SESSION_FILE", Some("/var/lib/holdfast/bob.json")),
                ("HOLDFAST_WINDOW_REQUEST_CEILING", Some("20")),
                ("HOLDFAST_CHALLENGE_MARKER", Some("example")),
                ("HOLDFAST_LOG_LEVEL", Some("info")),
            ],
            || {
                let matches = new().get_matches_from(vec!["holdfast", "config"]);
                assert_eq!(
                    matches.get_one::<String>(engine::ARG_SESSION_FILE).cloned(),
                    Some("/var/lib/holdfast/bob.json".to_string())
                );
                assert_eq!(
                    matches
                        .get_one::<u32>(engine::ARG_WINDOW_REQUEST_CEILING)
                        .copied(),
                    Some(20)
                );
                assert_eq!(
                    matches
                        .get_one::<String>(engine::ARG_CHALLENGE_MARKER)
                        .cloned(),
                    Some("example".to_string())
                );
                assert_eq!(
                    matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                    Some(2)
                );
            },
        );
    }

    #[test]
    fn test_check_log_level_env() {
        // loop cover all possible value_parse
        let levels = vec!["error", "warn", "info", "debug", "trace"];
        for (index, &level) in levels.iter().enumerate() {
            temp_env::with_vars([("HOLDFAST_LOG_LEVEL", Some(level))], || {
                let matches = new().get_matches_from(vec!["holdfast", "config"]);
                assert_eq!(
                    matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                    u8::try_from(index).ok()
                );
            });
        }
    }

    #[test]
    fn test_check_log_level_verbosity() {
        let levels = vec!["error", "warn", "info", "debug", "trace"];
        for (index, _) in levels.iter().enumerate() {
            temp_env::with_vars([("HOLDFAST_LOG_LEVEL", None::<String>)], || {
                let mut args = vec!["holdfast".to_string(), "config".to_string()];

                // Add the appropriate number of "-v" flags based on the index
                if index > 0 {
                    args.push(format!("-{}", "v".repeat(index)));
                }

                let matches = new().get_matches_from(args);

                assert_eq!(
                    matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                    u8::try_from(index).ok()
                );
            });
        }
    }

    #[test]
    fn test_log_format_rejects_unknown() {
        let result =
            new().try_get_matches_from(vec!["holdfast", "config", "--log-format", "xml"]);
        assert!(result.is_err());
    }
}
