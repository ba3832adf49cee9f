//! Grammar of the lines the debugger writes in machine interface mode.

pub mod value;

use crate::error::ParseError;
use chumsky::prelude::*;
use chumsky::Parser;

type Err<'a> = extra::Err<Rich<'a, char>>;

/// The literal idle prompt.
pub const PROMPT: &str = "(gdb) ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// `~`, console output.
    Console,
    /// `@`, output of the debuggee.
    Target,
    /// `&`, debugger log.
    Log,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncKind {
    /// `*`
    Exec,
    /// `+`
    Status,
    /// `=`
    Notify,
}

/// One inbound line.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Stream {
        kind: StreamKind,
        text: String,
    },
    /// Result or out of band record that carries a token. The payload is parsed lazily
    /// by the handler of the command owning the token.
    Result {
        token: u64,
        class: char,
        payload: String,
    },
    /// Out of band record without a token.
    Async {
        kind: AsyncKind,
        payload: String,
    },
    Prompt,
}

fn stream<'a>() -> impl Parser<'a, &'a str, Record, Err<'a>> {
    let kind = choice((
        just('~').to(StreamKind::Console),
        just('@').to(StreamKind::Target),
        just('&').to(StreamKind::Log),
    ));
    kind.then(value::c_string())
        .map(|(kind, text)| Record::Stream { kind, text })
        .labelled("stream record")
}

fn result<'a>() -> impl Parser<'a, &'a str, Record, Err<'a>> {
    let token = text::digits(10)
        .at_least(1)
        .to_slice()
        .try_map(|s: &str, span| s.parse::<u64>().map_err(|e| Rich::custom(span, e)));
    let class = any().filter(|c: &char| !c.is_ascii_digit());

    token
        .then(class)
        .then(any().repeated().to_slice())
        .map(|((token, class), payload): ((u64, char), &str)| Record::Result {
            token,
            class,
            payload: payload.to_string(),
        })
        .labelled("result record")
}

fn async_record<'a>() -> impl Parser<'a, &'a str, Record, Err<'a>> {
    let kind = choice((
        just('*').to(AsyncKind::Exec),
        just('+').to(AsyncKind::Status),
        just('=').to(AsyncKind::Notify),
    ));
    kind.then(any().repeated().to_slice())
        .map(|(kind, payload): (AsyncKind, &str)| Record::Async {
            kind,
            payload: payload.to_string(),
        })
        .labelled("async record")
}

fn prompt<'a>() -> impl Parser<'a, &'a str, Record, Err<'a>> {
    just(PROMPT.trim_end())
        .then(text::inline_whitespace())
        .to(Record::Prompt)
        .labelled("prompt")
}

fn record<'a>() -> impl Parser<'a, &'a str, Record, Err<'a>> {
    choice((stream(), prompt(), result(), async_record())).then_ignore(end())
}

/// Classify a line (without its terminating newline).
pub fn parse_line(line: &str) -> Result<Record, ParseError> {
    record().parse(line).into_result().map_err(|errs| ParseError {
        line: line.to_string(),
        reason: errs
            .first()
            .map(ToString::to_string)
            .unwrap_or_else(|| "unknown error".to_string()),
    })
}
