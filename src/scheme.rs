use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_till, take_while1},
    character::complete::{char, multispace0, multispace1},
    combinator::{recognize, value},
    error::ErrorKind,
    multi::many0_count,
    sequence::preceded,
};

use crate::ast::Value;
use crate::number::parse_numeral;
use crate::{Error, MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

/// Reader options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseConfig {
    /// Treat `;` up to the end of the line as whitespace
    pub handle_comments: bool,
}

impl Default for ParseConfig {
    fn default() -> Self {
        ParseConfig {
            handle_comments: true,
        }
    }
}

/// Characters that may appear in an atom
fn is_atom_char(c: char) -> bool {
    !c.is_whitespace() && !c.is_control() && !matches!(c, '(' | ')' | '"' | ';' | '\'')
}

/// Convert nom parsing errors to structured parse errors
fn parse_error_from_nom(input: &str, error: nom::Err<nom::error::Error<&str>>) -> Error {
    let e = match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => e,
        nom::Err::Incomplete(_) => {
            return ParseError::from_message(ParseErrorKind::Incomplete, "Incomplete input").into();
        }
    };

    let position = input.len().saturating_sub(e.input.len());
    let found = e.input.chars().next().map(String::from);
    let (kind, message) = match (e.code, found.as_deref()) {
        (ErrorKind::TooLarge, _) => (
            ParseErrorKind::TooDeeplyNested,
            format!("Expression too deeply nested (max depth: {MAX_PARSE_DEPTH})"),
        ),
        (ErrorKind::Eof, _) | (_, None) => (
            ParseErrorKind::Incomplete,
            "Unexpected end of input".to_owned(),
        ),
        (_, Some(")")) => (
            ParseErrorKind::InvalidSyntax,
            format!("Unexpected ')' at position {position}"),
        ),
        (_, Some(c)) => (
            ParseErrorKind::InvalidSyntax,
            format!("Unexpected character {c:?} at position {position}"),
        ),
    };

    ParseError::with_context_and_found(kind, message, input, position, found).into()
}

fn end_of_input(input: &str) -> nom::Err<nom::error::Error<&str>> {
    nom::Err::Failure(nom::error::Error::new(input, ErrorKind::Eof))
}

/// Skip whitespace and, when enabled, line comments
fn skip_ignored(input: &str, config: ParseConfig) -> IResult<&str, ()> {
    if config.handle_comments {
        let comment = recognize(preceded(char(';'), take_till(|c: char| c == '\n')));
        value((), many0_count(alt((multispace1, comment)))).parse(input)
    } else {
        value((), multispace0).parse(input)
    }
}

fn skip(input: &str, config: ParseConfig) -> &str {
    skip_ignored(input, config).map_or(input, |(rest, ())| rest)
}

/// Parse a numeral. A token that continues with atom characters is left to the atom parser.
fn parse_number(input: &str) -> IResult<&str, Value> {
    let not_a_number = || nom::Err::Error(nom::error::Error::new(input, ErrorKind::Digit));

    let starts_numeral = matches!(
        input.as_bytes(),
        [b'0'..=b'9', ..] | [b'-', b'0'..=b'9', ..]
    );
    if !starts_numeral {
        return Err(not_a_number());
    }

    let Some((number, consumed)) = parse_numeral(input) else {
        return Err(not_a_number());
    };
    let rest = &input[consumed..];
    if rest.starts_with(is_atom_char) {
        return Err(not_a_number());
    }
    Ok((rest, Value::Number(number)))
}

/// Parse a boolean (#t or #f)
fn parse_bool(input: &str) -> IResult<&str, Value> {
    let (rest, b) = alt((value(true, tag("#t")), value(false, tag("#f")))).parse(input)?;
    if rest.starts_with(is_atom_char) {
        // `#true` and friends are ordinary atoms
        return Err(nom::Err::Error(nom::error::Error::new(input, ErrorKind::Tag)));
    }
    Ok((rest, Value::Boolean(b)))
}

/// Parse an atom (any run of atom characters)
fn parse_atom(input: &str) -> IResult<&str, Value> {
    let (rest, name) = take_while1(is_atom_char).parse(input)?;
    Ok((rest, Value::atom(name)))
}

/// Parse a string literal. `\n` and `\t` are escapes; any other escaped character stands for itself.
fn parse_string(input: &str) -> IResult<&str, Value> {
    let (mut remaining, _) = char('"').parse(input)?;
    let mut text = String::new();

    loop {
        let mut char_iter = remaining.chars();
        match char_iter.next() {
            Some('"') => return Ok((char_iter.as_str(), Value::from(text))),
            Some('\\') => {
                match char_iter.next() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some(other) => text.push(other),
                    None => return Err(end_of_input(char_iter.as_str())),
                }
                remaining = char_iter.as_str();
            }
            Some(ch) => {
                text.push(ch);
                remaining = char_iter.as_str();
            }
            None => return Err(end_of_input(remaining)),
        }
    }
}

/// Parse a list; running out of input before `)` is reported as incomplete
fn parse_list(input: &str, config: ParseConfig, depth: usize) -> IResult<&str, Value> {
    let (mut input, _) = char('(').parse(input)?;
    let mut elements = Vec::new();

    loop {
        input = skip(input, config);
        if input.is_empty() {
            return Err(end_of_input(input));
        }
        if let Some(rest) = input.strip_prefix(')') {
            return Ok((rest, Value::list(elements)));
        }
        let (rest, element) = parse_sexpr(input, config, depth + 1)?;
        elements.push(element);
        input = rest;
    }
}

/// Parse quoted expression ('expr -> (quote expr))
fn parse_quote(input: &str, config: ParseConfig, depth: usize) -> IResult<&str, Value> {
    let (input, _) = char('\'').parse(input)?;
    let (input, expr) = parse_sexpr(input, config, depth + 1)?;
    Ok((input, Value::list(vec![Value::atom("quote"), expr])))
}

/// Parse one S-expression, skipping leading whitespace and comments
fn parse_sexpr(input: &str, config: ParseConfig, depth: usize) -> IResult<&str, Value> {
    if depth >= MAX_PARSE_DEPTH {
        return Err(nom::Err::Failure(nom::error::Error::new(
            input,
            ErrorKind::TooLarge,
        )));
    }

    let input = skip(input, config);
    if input.is_empty() {
        return Err(end_of_input(input));
    }

    alt((
        |input| parse_quote(input, config, depth),
        |input| parse_list(input, config, depth),
        parse_string,
        parse_number,
        parse_bool,
        parse_atom,
    ))
    .parse(input)
}

/// Parse exactly one S-expression from input.
pub fn parse_scheme(input: &str) -> Result<Value, Error> {
    parse_scheme_with_config(input, ParseConfig::default())
}

pub fn parse_scheme_with_config(input: &str, config: ParseConfig) -> Result<Value, Error> {
    match parse_sexpr(input, config, 0) {
        Ok((rest, value)) => {
            let rest = skip(rest, config);
            if rest.is_empty() {
                Ok(value)
            } else {
                let position = input.len() - rest.len();
                Err(ParseError::with_context_and_found(
                    ParseErrorKind::TrailingContent,
                    format!("Unexpected remaining input at position {position}"),
                    input,
                    position,
                    rest.chars().next().map(String::from),
                )
                .into())
            }
        }
        Err(e) => Err(parse_error_from_nom(input, e)),
    }
}

/// Parse zero or more S-expressions and return them as a list, in order.
pub fn parse_program(input: &str) -> Result<Value, Error> {
    parse_program_with_config(input, ParseConfig::default())
}

pub fn parse_program_with_config(input: &str, config: ParseConfig) -> Result<Value, Error> {
    let mut forms = Vec::new();
    let mut rest = skip(input, config);

    while !rest.is_empty() {
        match parse_sexpr(rest, config, 0) {
            Ok((next, form)) => {
                forms.push(form);
                rest = skip(next, config);
            }
            Err(e) => return Err(parse_error_from_nom(input, e)),
        }
    }

    Ok(Value::list(forms))
}
