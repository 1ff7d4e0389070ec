// Expression language - tokenizer
//
// Splits expression text into tokens. Positions are 0-based character
// offsets into the source text.

use crate::expression::parser::{ParseError, ParseErrorKind};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    Text(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    Not,
    And,
    Or,
    LParen,
    RParen,
    /// Argument separator, either `;` or `,`
    Separator,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: usize,
}

/// Tokenize an expression
pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let kind = match c {
            '0'..='9' | '.' => {
                let (value, end) = lex_number(&chars, i)?;
                i = end;
                TokenKind::Number(value)
            }
            '"' | '\'' => {
                let (text, end) = lex_text(&chars, i)?;
                i = end;
                TokenKind::Text(text)
            }
            c if c.is_alphabetic() || c == '_' => {
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                match word.to_lowercase().as_str() {
                    "and" => TokenKind::And,
                    "or" => TokenKind::Or,
                    "not" => TokenKind::Not,
                    _ => TokenKind::Ident(word),
                }
            }
            _ => {
                let next = chars.get(i + 1).copied();
                let (kind, width) = match (c, next) {
                    ('<', Some('=')) => (TokenKind::Le, 2),
                    ('<', Some('>')) => (TokenKind::Ne, 2),
                    ('>', Some('=')) => (TokenKind::Ge, 2),
                    ('=', Some('=')) => (TokenKind::Eq, 2),
                    ('!', Some('=')) => (TokenKind::Ne, 2),
                    ('&', Some('&')) => (TokenKind::And, 2),
                    ('|', Some('|')) => (TokenKind::Or, 2),
                    ('<', _) => (TokenKind::Lt, 1),
                    ('>', _) => (TokenKind::Gt, 1),
                    ('=', _) => (TokenKind::Eq, 1),
                    ('!', _) => (TokenKind::Not, 1),
                    ('+', _) => (TokenKind::Plus, 1),
                    ('-', _) => (TokenKind::Minus, 1),
                    ('*', _) => (TokenKind::Star, 1),
                    ('/', _) => (TokenKind::Slash, 1),
                    ('^', _) => (TokenKind::Caret, 1),
                    ('(', _) => (TokenKind::LParen, 1),
                    (')', _) => (TokenKind::RParen, 1),
                    (';', _) | (',', _) => (TokenKind::Separator, 1),
                    _ => {
                        return Err(ParseError::new(
                            start,
                            ParseErrorKind::InvalidCharacter(c),
                        ))
                    }
                };
                i += width;
                kind
            }
        };

        tokens.push(Token {
            kind,
            position: start,
        });
    }

    Ok(tokens)
}

fn lex_number(chars: &[char], start: usize) -> Result<(f64, usize), ParseError> {
    let mut i = start;
    while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
        i += 1;
    }

    // Optional exponent: only taken when digits follow
    if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
        let mut j = i + 1;
        if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
            j += 1;
        }
        if j < chars.len() && chars[j].is_ascii_digit() {
            while j < chars.len() && chars[j].is_ascii_digit() {
                j += 1;
            }
            i = j;
        }
    }

    let literal: String = chars[start..i].iter().collect();
    literal
        .parse::<f64>()
        .map(|value| (value, i))
        .map_err(|_| ParseError::new(start, ParseErrorKind::InvalidNumber(literal)))
}

fn lex_text(chars: &[char], start: usize) -> Result<(String, usize), ParseError> {
    let quote = chars[start];
    let mut i = start + 1;
    let mut text = String::new();

    while i < chars.len() {
        if chars[i] == quote {
            // A doubled quote stands for one literal quote character
            if chars.get(i + 1) == Some(&quote) {
                text.push(quote);
                i += 2;
                continue;
            }
            return Ok((text, i + 1));
        }
        text.push(chars[i]);
        i += 1;
    }

    Err(ParseError::new(start, ParseErrorKind::UnterminatedText))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_operators_and_positions() {
        let tokens = tokenize("a <= 10").unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[1].kind, TokenKind::Le);
        assert_eq!(tokens[1].position, 2);
        assert_eq!(tokens[2].position, 5);
    }

    #[test]
    fn test_word_operators() {
        assert_eq!(
            kinds("x AND y or NOT z"),
            vec![
                TokenKind::Ident("x".into()),
                TokenKind::And,
                TokenKind::Ident("y".into()),
                TokenKind::Or,
                TokenKind::Not,
                TokenKind::Ident("z".into()),
            ]
        );
    }

    #[test]
    fn test_numbers_with_exponent() {
        assert_eq!(kinds("1.5e3"), vec![TokenKind::Number(1500.0)]);
        // "e" without digits is not an exponent
        assert_eq!(
            kinds("2e"),
            vec![TokenKind::Number(2.0), TokenKind::Ident("e".into())]
        );
    }

    #[test]
    fn test_text_literals() {
        assert_eq!(kinds("\"gold\""), vec![TokenKind::Text("gold".into())]);
        assert_eq!(kinds("'it''s'"), vec![TokenKind::Text("it's".into())]);
    }

    #[test]
    fn test_unterminated_text_reports_start() {
        let err = tokenize("x + \"abc").unwrap_err();
        assert_eq!(err.position, 4);
        assert_eq!(err.kind, ParseErrorKind::UnterminatedText);
    }

    #[test]
    fn test_invalid_character() {
        let err = tokenize("a # b").unwrap_err();
        assert_eq!(err.position, 2);
        assert_eq!(err.kind, ParseErrorKind::InvalidCharacter('#'));
    }

    #[test]
    fn test_both_separators() {
        assert_eq!(
            kinds("max(1;2,3)"),
            vec![
                TokenKind::Ident("max".into()),
                TokenKind::LParen,
                TokenKind::Number(1.0),
                TokenKind::Separator,
                TokenKind::Number(2.0),
                TokenKind::Separator,
                TokenKind::Number(3.0),
                TokenKind::RParen,
            ]
        );
    }
}
