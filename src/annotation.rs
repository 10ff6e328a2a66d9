use std::{iter::Peekable, str::Chars};

use crate::{errors::AnnotationErrorKind, instantiator::CallingConvention, scope::Scope};

/// Parsed text of a `@provides` annotation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Provides {
    /// Explicit provider name, the declaration's default name is used when absent
    pub name: Option<String>,
    pub scope: Scope,
    pub calling_convention: CallingConvention,
}

/// Parses the text following `@provides`.
///
/// Accepts an empty text, a bare or quoted name, and `scope='...'`, `async='...'`, `name='...'` pairs
/// separated by commas or whitespace, e.g. `'db' scope='prototype', async='promise'`.
///
/// # Errors
/// - Returns [`AnnotationErrorKind::UnknownKey`] for a key other than `name`, `scope` and `async`
/// - Returns [`AnnotationErrorKind::InvalidScope`] and [`AnnotationErrorKind::InvalidAsync`] for unsupported values
/// - Returns [`AnnotationErrorKind::DuplicateName`] if the name is declared twice
/// - Returns [`AnnotationErrorKind::UnterminatedQuote`] if a quoted value isn't closed
pub fn parse_provides(text: &str) -> Result<Provides, AnnotationErrorKind> {
    let mut provides = Provides::default();

    for token in tokenize(text)? {
        match token.key.as_deref() {
            None | Some("name") => {
                if let Some(first) = provides.name.take() {
                    return Err(AnnotationErrorKind::DuplicateName {
                        first,
                        second: token.value,
                    });
                }
                provides.name = Some(token.value);
            }
            Some("scope") => provides.scope = token.value.parse()?,
            Some("async") => provides.calling_convention = token.value.parse()?,
            Some(key) => return Err(AnnotationErrorKind::UnknownKey(key.to_owned())),
        }
    }

    Ok(provides)
}

/// Parses the text following `@requires` into dependency names, keeping their order and duplicates.
///
/// Accepts `['a', 'b']`, `a, b` and `'a' 'b'`.
///
/// # Errors
/// - Returns [`AnnotationErrorKind::UnknownKey`] if a name is written as a `key=value` pair
/// - Returns [`AnnotationErrorKind::UnterminatedQuote`] if a quoted name isn't closed
pub fn parse_requires(text: &str) -> Result<Vec<String>, AnnotationErrorKind> {
    let text = text.trim();
    let text = text
        .strip_prefix('[')
        .and_then(|text| text.strip_suffix(']'))
        .unwrap_or(text);

    tokenize(text)?
        .into_iter()
        .map(|token| match token.key {
            Some(key) => Err(AnnotationErrorKind::UnknownKey(key)),
            None => Ok(token.value),
        })
        .collect()
}

#[derive(Debug, PartialEq, Eq)]
struct Token {
    key: Option<String>,
    value: String,
}

fn is_separator(c: char) -> bool {
    c == ',' || c.is_whitespace()
}

fn is_quote(c: char) -> bool {
    c == '\'' || c == '"'
}

fn tokenize(text: &str) -> Result<Vec<Token>, AnnotationErrorKind> {
    let mut chars = text.chars().peekable();
    let mut tokens = Vec::new();

    loop {
        while chars.next_if(|c| is_separator(*c)).is_some() {}
        let Some(&c) = chars.peek() else {
            break;
        };

        if is_quote(c) {
            tokens.push(Token {
                key: None,
                value: quoted(text, &mut chars)?,
            });
            continue;
        }

        let word = bare(&mut chars);
        if word.is_empty() {
            // Only a stray `=` stops a bare word before its first char
            return Err(AnnotationErrorKind::UnknownKey(String::new()));
        }
        if chars.next_if(|c| *c == '=').is_none() {
            tokens.push(Token { key: None, value: word });
            continue;
        }

        let value = match chars.peek() {
            Some(&c) if is_quote(c) => quoted(text, &mut chars)?,
            _ => bare(&mut chars),
        };
        tokens.push(Token {
            key: Some(word.to_ascii_lowercase()),
            value,
        });
    }

    Ok(tokens)
}

fn bare(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut value = String::new();
    while let Some(c) = chars.next_if(|c| !is_separator(*c) && *c != '=' && !is_quote(*c)) {
        value.push(c);
    }
    value
}

fn quoted(text: &str, chars: &mut Peekable<Chars<'_>>) -> Result<String, AnnotationErrorKind> {
    let Some(quote) = chars.next() else {
        return Err(AnnotationErrorKind::UnterminatedQuote(text.to_owned()));
    };

    let mut value = String::new();
    for c in chars.by_ref() {
        if c == quote {
            return Ok(value);
        }
        value.push(c);
    }
    Err(AnnotationErrorKind::UnterminatedQuote(text.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::{parse_provides, parse_requires, Provides};
    use crate::{errors::AnnotationErrorKind, instantiator::CallingConvention, scope::Scope};

    #[test]
    fn test_parse_provides() {
        assert_eq!(parse_provides("").unwrap(), Provides::default());
        assert_eq!(
            parse_provides("'database'").unwrap(),
            Provides {
                name: Some("database".to_owned()),
                ..Provides::default()
            }
        );
        assert_eq!(
            parse_provides("db scope='prototype', async=\"promise\"").unwrap(),
            Provides {
                name: Some("db".to_owned()),
                scope: Scope::Prototype,
                calling_convention: CallingConvention::FutureReturning,
            }
        );
        assert_eq!(
            parse_provides("async='callback' name='mongo.client'").unwrap(),
            Provides {
                name: Some("mongo.client".to_owned()),
                scope: Scope::Singleton,
                calling_convention: CallingConvention::CallbackStyle,
            }
        );
        assert_eq!(
            parse_provides("scope=singleton,async=none").unwrap().calling_convention,
            CallingConvention::Direct
        );
    }

    #[test]
    fn test_parse_provides_errors() {
        assert_eq!(
            parse_provides("db lifetime='request'"),
            Err(AnnotationErrorKind::UnknownKey("lifetime".to_owned()))
        );
        assert_eq!(
            parse_provides("scope='request'"),
            Err(AnnotationErrorKind::InvalidScope("request".to_owned()))
        );
        assert_eq!(
            parse_provides("async='thread'"),
            Err(AnnotationErrorKind::InvalidAsync("thread".to_owned()))
        );
        assert_eq!(
            parse_provides("db name='other'"),
            Err(AnnotationErrorKind::DuplicateName {
                first: "db".to_owned(),
                second: "other".to_owned(),
            })
        );
        assert!(matches!(parse_provides("'db"), Err(AnnotationErrorKind::UnterminatedQuote(_))));
    }

    #[test]
    fn test_parse_requires() {
        let expected = ["config".to_owned(), "logger".to_owned(), "config".to_owned()];

        assert_eq!(parse_requires("['config', 'logger', 'config']").unwrap(), expected);
        assert_eq!(parse_requires("config, logger, config").unwrap(), expected);
        assert_eq!(parse_requires("'config' \"logger\" 'config'").unwrap(), expected);
        assert!(parse_requires("").unwrap().is_empty());
        assert!(parse_requires("[]").unwrap().is_empty());
        assert!(matches!(parse_requires("['config"), Err(AnnotationErrorKind::UnterminatedQuote(_))));
    }
}
