//! Tokenizer for expression text.

use crate::error::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number { value: f64, unit: Option<String> },
    Str(String),
    Ident(String),
    /// `[...]` contents, trimmed.
    Bracket(String),
    LParen,
    RParen,
    Comma,
    Pipe,
    Amp,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Bang,
}

/// Token plus the character offset it started at.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub position: usize,
}

pub fn tokenize(input: &str) -> Result<Vec<Spanned>, ParseError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let token = match c {
            '0'..='9' => {
                let (token, next) = lex_number(&chars, i)?;
                i = next;
                token
            }
            '.' if chars.get(i + 1).is_some_and(|d| d.is_ascii_digit()) => {
                let (token, next) = lex_number(&chars, i)?;
                i = next;
                token
            }
            '"' | '\'' => {
                let (text, next) = lex_string(&chars, i)?;
                i = next;
                Token::Str(text)
            }
            '[' => {
                let close = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == ']')
                    .ok_or_else(|| ParseError::new(start, "unterminated '['"))?;
                let name: String = chars[i + 1..i + 1 + close].iter().collect();
                let name = name.trim().to_string();
                if name.is_empty() {
                    return Err(ParseError::new(start, "empty name in '[]'"));
                }
                i += close + 2;
                Token::Bracket(name)
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut end = i + 1;
                while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_' || chars[end] == '.') {
                    end += 1;
                }
                let ident: String = chars[i..end].iter().collect();
                i = end;
                Token::Ident(ident)
            }
            _ => {
                let next = chars.get(i + 1).copied();
                let (token, width) = match (c, next) {
                    ('(', _) => (Token::LParen, 1),
                    (')', _) => (Token::RParen, 1),
                    (',', _) => (Token::Comma, 1),
                    ('|', Some('|')) => (Token::Pipe, 2),
                    ('|', _) => (Token::Pipe, 1),
                    ('&', Some('&')) => (Token::Amp, 2),
                    ('&', _) => (Token::Amp, 1),
                    ('=', Some('=')) => (Token::EqEq, 2),
                    ('=', _) => (Token::EqEq, 1),
                    ('!', Some('=')) => (Token::NotEq, 2),
                    ('!', _) => (Token::Bang, 1),
                    ('<', Some('=')) => (Token::Le, 2),
                    ('<', Some('>')) => (Token::NotEq, 2),
                    ('<', _) => (Token::Lt, 1),
                    ('>', Some('=')) => (Token::Ge, 2),
                    ('>', _) => (Token::Gt, 1),
                    ('+', _) => (Token::Plus, 1),
                    ('-', _) => (Token::Minus, 1),
                    ('*', _) => (Token::Star, 1),
                    ('/', _) => (Token::Slash, 1),
                    ('^', _) => (Token::Caret, 1),
                    _ => return Err(ParseError::new(start, format!("unexpected character '{}'", c))),
                };
                i += width;
                token
            }
        };

        tokens.push(Spanned {
            token,
            position: start,
        });
    }

    Ok(tokens)
}

/// Digits with an optional fraction, then an optional unit suffix:
/// `%`, `°` followed by letters, or a run of letters.
fn lex_number(chars: &[char], start: usize) -> Result<(Token, usize), ParseError> {
    let mut i = start;
    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    if i < chars.len() && chars[i] == '.' {
        i += 1;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
    }
    let digits: String = chars[start..i].iter().collect();
    let value: f64 = digits
        .parse()
        .map_err(|_| ParseError::new(start, format!("invalid number '{}'", digits)))?;
    if !value.is_finite() {
        return Err(ParseError::new(start, format!("number '{}' is out of range", digits)));
    }

    let unit_start = i;
    match chars.get(i) {
        Some('%') => i += 1,
        Some('°') => {
            i += 1;
            while i < chars.len() && chars[i].is_alphabetic() {
                i += 1;
            }
        }
        Some(c) if c.is_alphabetic() => {
            while i < chars.len() && chars[i].is_alphabetic() {
                i += 1;
            }
        }
        _ => {}
    }
    let unit = (i > unit_start).then(|| chars[unit_start..i].iter().collect::<String>());

    Ok((Token::Number { value, unit }, i))
}

fn lex_string(chars: &[char], start: usize) -> Result<(String, usize), ParseError> {
    let quote = chars[start];
    let mut text = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => {
                let escaped = chars
                    .get(i + 1)
                    .ok_or_else(|| ParseError::new(i, "dangling escape"))?;
                text.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => *other,
                });
                i += 2;
            }
            c if c == quote => return Ok((text, i + 1)),
            c => {
                text.push(c);
                i += 1;
            }
        }
    }
    Err(ParseError::new(start, "unterminated string"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<Token> {
        tokenize(input).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn numbers_take_unit_suffixes() {
        assert_eq!(
            kinds("5°C 10% 12h 3"),
            vec![
                Token::Number { value: 5.0, unit: Some("°C".into()) },
                Token::Number { value: 10.0, unit: Some("%".into()) },
                Token::Number { value: 12.0, unit: Some("h".into()) },
                Token::Number { value: 3.0, unit: None },
            ]
        );
    }

    #[test]
    fn overflowing_number_is_rejected() {
        let huge = format!("1{}", "0".repeat(400));
        let err = tokenize(&format!("x + {}", huge)).unwrap_err();
        assert_eq!(err.position, 4);
        assert!(err.reason.contains("out of range"), "{}", err.reason);
        assert!(tokenize(&format!("{}.5", "9".repeat(300))).is_ok());
    }

    #[test]
    fn brackets_keep_inner_text() {
        assert_eq!(
            kinds("[dtmi:com:acme:Sensor;1] [zone air temp]"),
            vec![
                Token::Bracket("dtmi:com:acme:Sensor;1".into()),
                Token::Bracket("zone air temp".into()),
            ]
        );
    }

    #[test]
    fn two_char_operators() {
        assert_eq!(
            kinds("a<=b != c && d || e"),
            vec![
                Token::Ident("a".into()),
                Token::Le,
                Token::Ident("b".into()),
                Token::NotEq,
                Token::Ident("c".into()),
                Token::Amp,
                Token::Ident("d".into()),
                Token::Pipe,
                Token::Ident("e".into()),
            ]
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(kinds(r#""a\"b" 'c'"#), vec![Token::Str("a\"b".into()), Token::Str("c".into())]);
    }

    #[test]
    fn errors_carry_position() {
        let err = tokenize("a + #").unwrap_err();
        assert_eq!(err.position, 4);
        assert_eq!(tokenize("[open").unwrap_err().position, 0);
        assert!(tokenize("\"open").is_err());
    }
}
