//! Tokenizer for event format templates.

use logos::Logos;

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    #[regex(r"[^%]+", |lex| lex.slice())]
    Text(&'a str),

    #[token("%%")]
    Percent,

    #[token("%0")]
    Nul,

    #[token("%n")]
    Newline,

    /// Directory part of the watched path.
    #[token("%w")]
    WatchedDir,

    /// Name of the file the event is about.
    #[token("%f")]
    FileName,

    /// Event names joined with `,`.
    #[token("%e")]
    Events,

    /// Event names joined with the given separator, written `%<sep>e`.
    #[regex(r"%[^%0nwfecT]e", |lex| lex.slice()[1..].chars().next())]
    EventsSep(char),

    /// Current time rendered with the configured strftime pattern.
    #[token("%T")]
    Time,

    /// Rename cookie in hex.
    #[token("%c")]
    Cookie,

    /// Any other `%x` pair, emitted verbatim.
    #[regex(r"%[^%0nwfecT]", |lex| lex.slice()[1..].chars().next())]
    Literal(char),

    /// A `%` with nothing after it.
    #[token("%")]
    Dangling,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &str) -> Vec<Token<'_>> {
        Token::lexer(input)
            .collect::<Result<Vec<_>, _>>()
            .expect("template should tokenize")
    }

    #[test]
    fn splits_text_and_directives() {
        assert_eq!(
            lex("%w%f changed: %e%n"),
            vec![
                Token::WatchedDir,
                Token::FileName,
                Token::Text(" changed: "),
                Token::Events,
                Token::Newline,
            ]
        );
    }

    #[test]
    fn separator_events_win_over_literals() {
        assert_eq!(lex("%:e"), vec![Token::EventsSep(':')]);
        assert_eq!(lex("%xe"), vec![Token::EventsSep('x')]);
        assert_eq!(lex("%x"), vec![Token::Literal('x')]);
        assert_eq!(lex("%xz"), vec![Token::Literal('x'), Token::Text("z")]);
    }

    #[test]
    fn known_directives_are_not_separators() {
        assert_eq!(lex("%ee"), vec![Token::Events, Token::Text("e")]);
        assert_eq!(lex("%Te"), vec![Token::Time, Token::Text("e")]);
        assert_eq!(lex("%%e"), vec![Token::Percent, Token::Text("e")]);
    }

    #[test]
    fn trailing_percent_is_dangling() {
        assert_eq!(lex("abc%"), vec![Token::Text("abc"), Token::Dangling]);
    }
}
