//! Values carried by result and async records: `class[,name=value]*`.

use crate::error::ParseError;
use chumsky::prelude::*;
use chumsky::Parser;
use std::str::FromStr;
use strum_macros::{Display, EnumString};

type Err<'a> = extra::Err<Rich<'a, char>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum ResultClass {
    Done,
    Running,
    Connected,
    Error,
    Exit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Const(String),
    Tuple(Vec<(String, Value)>),
    /// List of values or of results, names of results are not kept.
    List(Vec<Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Const(s) => Some(s),
            _ => None,
        }
    }

    /// Return the first field named `name` of a tuple.
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Tuple(fields) => fields.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Elements of a list, an empty tuple `{}` is an empty list too.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(values) => Some(values),
            Value::Tuple(fields) if fields.is_empty() => Some(&[]),
            _ => None,
        }
    }
}

/// Parsed payload of a result record.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    pub class: ResultClass,
    pub results: Vec<(String, Value)>,
}

impl ResultRecord {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.results.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Error message of an `error` class record.
    pub fn message(&self) -> Option<&str> {
        self.get_str("msg")
    }
}

impl FromStr for ResultRecord {
    type Err = ParseError;

    fn from_str(payload: &str) -> Result<Self, Self::Err> {
        result_record()
            .parse(payload)
            .into_result()
            .map_err(|errs| ParseError {
                line: payload.to_string(),
                reason: errs
                    .first()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "unknown error".to_string()),
            })
    }
}

/// Parse `class[,name=value]*` of an async record, the class is any word.
pub fn parse_async(payload: &str) -> Result<(String, Vec<(String, Value)>), ParseError> {
    variable()
        .map(ToString::to_string)
        .then(just(',').ignore_then(result()).repeated().collect::<Vec<_>>())
        .then_ignore(end())
        .parse(payload)
        .into_result()
        .map_err(|errs| ParseError {
            line: payload.to_string(),
            reason: errs
                .first()
                .map(ToString::to_string)
                .unwrap_or_else(|| "unknown error".to_string()),
        })
}

#[derive(Clone)]
enum Unit {
    Char(char),
    Byte(u8),
}

/// Octal escapes encode raw bytes, runs of them are decoded as utf-8.
fn decode(units: Vec<Unit>) -> String {
    let mut bytes = Vec::with_capacity(units.len());
    for unit in units {
        match unit {
            Unit::Char(c) => {
                let mut buf = [0; 4];
                bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
            Unit::Byte(b) => bytes.push(b),
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Quoted C string with `\n \t \r \" \\` and octal escapes.
pub fn c_string<'a>() -> impl Parser<'a, &'a str, String, Err<'a>> + Clone {
    let octal = any::<_, Err>()
        .filter(|c: &char| c.is_digit(8))
        .repeated()
        .at_least(1)
        .at_most(3)
        .to_slice()
        .try_map(|s: &str, span| {
            u32::from_str_radix(s, 8)
                .map(|v| Unit::Byte(v as u8))
                .map_err(|e| Rich::custom(span, e))
        });

    let escape = just('\\').ignore_then(choice((
        just('n').to(Unit::Char('\n')),
        just('t').to(Unit::Char('\t')),
        just('r').to(Unit::Char('\r')),
        octal,
        any().map(Unit::Char),
    )));

    let unit = any()
        .filter(|c: &char| *c != '\\' && *c != '"')
        .map(Unit::Char)
        .or(escape);

    unit.repeated()
        .collect::<Vec<_>>()
        .map(decode)
        .delimited_by(just('"'), just('"'))
        .labelled("c string")
}

fn variable<'a>() -> impl Parser<'a, &'a str, &'a str, Err<'a>> + Clone {
    any::<_, Err>()
        .filter(|c: &char| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .repeated()
        .at_least(1)
        .to_slice()
        .labelled("variable")
}

fn value<'a>() -> impl Parser<'a, &'a str, Value, Err<'a>> + Clone {
    recursive(|value| {
        let result = variable()
            .map(ToString::to_string)
            .then_ignore(just('='))
            .then(value.clone());

        let tuple = result
            .clone()
            .separated_by(just(','))
            .collect::<Vec<_>>()
            .delimited_by(just('{'), just('}'))
            .map(Value::Tuple);

        let list = result
            .map(|(_, v)| v)
            .or(value)
            .separated_by(just(','))
            .collect::<Vec<_>>()
            .delimited_by(just('['), just(']'))
            .map(Value::List);

        choice((c_string().map(Value::Const), tuple, list)).labelled("value")
    })
}

fn result<'a>() -> impl Parser<'a, &'a str, (String, Value), Err<'a>> + Clone {
    variable()
        .map(ToString::to_string)
        .then_ignore(just('='))
        .then(value())
}

fn result_record<'a>() -> impl Parser<'a, &'a str, ResultRecord, Err<'a>> {
    let class = variable().try_map(|s: &str, span| {
        ResultClass::from_str(s).map_err(|_| Rich::custom(span, format!("unknown class `{s}`")))
    });

    class
        .then(just(',').ignore_then(result()).repeated().collect::<Vec<_>>())
        .then_ignore(end())
        .map(|(class, results)| ResultRecord { class, results })
}

#[cfg(test)]
mod test {
    use super::*;

    fn s(v: &str) -> Value {
        Value::Const(v.to_string())
    }

    #[test]
    fn test_c_string() {
        struct TestCase {
            string: &'static str,
            result: Result<&'static str, ()>,
        }
        let cases = vec![
            TestCase {
                string: r#""""#,
                result: Ok(""),
            },
            TestCase {
                string: r#""Breakpoint 1 at 0x1139: file a.c, line 4.\n""#,
                result: Ok("Breakpoint 1 at 0x1139: file a.c, line 4.\n"),
            },
            TestCase {
                string: r#""say \"hi\"\t\\""#,
                result: Ok("say \"hi\"\t\\"),
            },
            TestCase {
                string: r#""caf\303\251 \033""#,
                result: Ok("caf\u{e9} \u{1b}"),
            },
            TestCase {
                string: r#""unterminated"#,
                result: Err(()),
            },
            TestCase {
                string: "no quotes",
                result: Err(()),
            },
        ];

        for tc in cases {
            let parsed = c_string().then_ignore(end()).parse(tc.string).into_result();
            assert_eq!(
                parsed.as_deref().map_err(|_| ()),
                tc.result,
                "input: {}",
                tc.string
            );
        }
    }

    #[test]
    fn test_result_record() {
        let record: ResultRecord = r#"done,value="5""#.parse().unwrap();
        assert_eq!(record.class, ResultClass::Done);
        assert_eq!(record.get_str("value"), Some("5"));

        let record: ResultRecord = "running".parse().unwrap();
        assert_eq!(record.class, ResultClass::Running);
        assert!(record.results.is_empty());

        let record: ResultRecord = r#"error,msg="No symbol table is loaded.""#.parse().unwrap();
        assert_eq!(record.class, ResultClass::Error);
        assert_eq!(record.message(), Some("No symbol table is loaded."));

        assert!("bogus".parse::<ResultRecord>().is_err());
        assert!("done,value=5".parse::<ResultRecord>().is_err());
        assert!(r#"done,value="5"trailing"#.parse::<ResultRecord>().is_err());
    }

    #[test]
    fn test_nested_values() {
        let payload = concat!(
            r#"done,BreakpointTable={nr_rows="2",hdr=[{width="7",col_name="number"}],"#,
            r#"body=[bkpt={number="1",enabled="y",fullname="/src/a.c",line="4"},"#,
            r#"bkpt={number="2",enabled="n",locations=[{number="2.1",line="9"}]}]}"#
        );
        let record: ResultRecord = payload.parse().unwrap();

        let table = record.get("BreakpointTable").unwrap();
        assert_eq!(table.get_str("nr_rows"), Some("2"));
        let body = table.get("body").and_then(Value::as_list).unwrap();
        assert_eq!(body.len(), 2);
        assert_eq!(
            body[0],
            Value::Tuple(vec![
                ("number".to_string(), s("1")),
                ("enabled".to_string(), s("y")),
                ("fullname".to_string(), s("/src/a.c")),
                ("line".to_string(), s("4")),
            ])
        );
        let locations = body[1].get("locations").and_then(Value::as_list).unwrap();
        assert_eq!(locations[0].get_str("number"), Some("2.1"));

        let record: ResultRecord = "done,stack=[],frame={}".parse().unwrap();
        assert_eq!(record.get("stack").and_then(Value::as_list), Some(&[][..]));
        assert_eq!(record.get("frame").and_then(Value::as_list), Some(&[][..]));
    }

    #[test]
    fn test_async_payload() {
        let (class, results) =
            parse_async(r#"stopped,reason="breakpoint-hit",frame={line="4"}"#).unwrap();
        assert_eq!(class, "stopped");
        assert_eq!(results[0], ("reason".to_string(), s("breakpoint-hit")));

        let (class, results) = parse_async("running").unwrap();
        assert_eq!(class, "running");
        assert!(results.is_empty());
    }
}
