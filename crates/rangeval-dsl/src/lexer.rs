//! Tokenizer and normalizer for rule text
//!
//! Splits raw rule text into classified lexemes in one pass. Strings use
//! single quotes with `''` as an escaped quote; a double quote anywhere is an
//! error. URLs and decimal numbers stay whole.

use crate::ast::SpecialVar;
use crate::error::{SyntaxError, SyntaxErrorKind};

/// Reserved words; matched case-insensitively
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    True,
    False,
    And,
    Or,
    Between,
    NotBetween,
    In,
    NotIn,
    If,
    Then,
    Else,
    EndIf,
    Switch,
    Case,
    EndSwitch,
    Return,
}

impl Keyword {
    pub fn from_word(word: &str) -> Option<Self> {
        let keyword = match word.to_ascii_lowercase().as_str() {
            "true" => Self::True,
            "false" => Self::False,
            "and" => Self::And,
            "or" => Self::Or,
            "between" => Self::Between,
            "notbetween" => Self::NotBetween,
            "in" => Self::In,
            "notin" => Self::NotIn,
            "if" => Self::If,
            "then" => Self::Then,
            "else" => Self::Else,
            "endif" => Self::EndIf,
            "switch" => Self::Switch,
            "case" => Self::Case,
            "endswitch" => Self::EndSwitch,
            "return" => Self::Return,
            _ => return None,
        };
        Some(keyword)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::True => "true",
            Self::False => "false",
            Self::And => "and",
            Self::Or => "or",
            Self::Between => "between",
            Self::NotBetween => "notbetween",
            Self::In => "in",
            Self::NotIn => "notin",
            Self::If => "if",
            Self::Then => "then",
            Self::Else => "else",
            Self::EndIf => "endif",
            Self::Switch => "switch",
            Self::Case => "case",
            Self::EndSwitch => "endswitch",
            Self::Return => "return",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Lowercase or mixed-case bareword: a field, function or set literal
    Ident,
    /// All-uppercase bareword
    LocalVar,
    Special(SpecialVar),
    Keyword(Keyword),
    Number,
    /// Single-quoted string; the lexeme text holds the unescaped contents
    Str,
    Url,
    /// `=`
    Assign,
    /// `==`
    EqEq,
    /// `!=` or `<>`
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Semicolon,
    Colon,
    Dot,
    DotDot,
}

impl TokenKind {
    /// Opening delimiter for a closer, if this is one
    pub fn opener(&self) -> Option<TokenKind> {
        match self {
            Self::RParen => Some(Self::LParen),
            Self::RBracket => Some(Self::LBracket),
            Self::RBrace => Some(Self::LBrace),
            _ => None,
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Self::Assign | Self::EqEq | Self::NotEq | Self::Lt | Self::Le | Self::Gt | Self::Ge
        )
    }
}

/// One classified token with its byte offset in the source text
#[derive(Debug, Clone, PartialEq)]
pub struct Lexeme {
    pub kind: TokenKind,
    pub text: String,
    pub position: usize,
}

impl Lexeme {
    fn new(kind: TokenKind, text: impl Into<String>, position: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            position,
        }
    }

    /// Canonical spelling: keywords lowercase, strings re-quoted
    pub fn render(&self) -> String {
        match self.kind {
            TokenKind::Keyword(keyword) => keyword.as_str().to_string(),
            TokenKind::Str => format!("'{}'", self.text.replace('\'', "''")),
            _ => self.text.clone(),
        }
    }
}

fn is_word_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_url_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, ';' | ',' | ')' | ']' | '}' | '\'' | '"')
}

struct Lexer<'a> {
    source: &'a str,
    chars: Vec<(usize, char)>,
    index: usize,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().collect(),
            index: 0,
        }
    }

    fn peek(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.index + ahead).map(|(_, c)| *c)
    }

    fn offset(&self) -> usize {
        self.chars
            .get(self.index)
            .map(|(offset, _)| *offset)
            .unwrap_or(self.source.len())
    }

    fn take_while(&mut self, predicate: impl Fn(char) -> bool) -> &'a str {
        let start = self.offset();
        while let Some(c) = self.peek(0) {
            if !predicate(c) {
                break;
            }
            self.index += 1;
        }
        &self.source[start..self.offset()]
    }

    fn run(mut self) -> Result<Vec<Lexeme>, SyntaxError> {
        let mut lexemes = Vec::new();

        while let Some(c) = self.peek(0) {
            let start = self.offset();

            if c.is_whitespace() {
                self.index += 1;
                continue;
            }

            let lexeme = match c {
                '"' => {
                    return Err(SyntaxError::new(
                        SyntaxErrorKind::DoubleQuote,
                        start,
                        "Double quotes are not allowed; quote text with single quotes",
                        "\"",
                    ))
                }
                '\'' => self.string(start)?,
                c if c.is_ascii_digit() => self.number(start),
                '.' if self.peek(1).is_some_and(|n| n.is_ascii_digit()) => self.number(start),
                c if is_word_start(c) => self.word(start),
                _ => self.operator(c, start)?,
            };
            lexemes.push(lexeme);
        }

        Ok(lexemes)
    }

    fn string(&mut self, start: usize) -> Result<Lexeme, SyntaxError> {
        self.index += 1;
        let mut contents = String::new();

        loop {
            match self.peek(0) {
                None => {
                    return Err(SyntaxError::new(
                        SyntaxErrorKind::UnterminatedString,
                        start,
                        "String is never closed",
                        &self.source[start..],
                    ))
                }
                Some('\'') if self.peek(1) == Some('\'') => {
                    contents.push('\'');
                    self.index += 2;
                }
                Some('\'') => {
                    self.index += 1;
                    break;
                }
                Some('"') => {
                    return Err(SyntaxError::new(
                        SyntaxErrorKind::DoubleQuote,
                        self.offset(),
                        "Double quotes are not allowed inside strings",
                        "\"",
                    ))
                }
                Some(c) => {
                    contents.push(c);
                    self.index += 1;
                }
            }
        }

        Ok(Lexeme::new(TokenKind::Str, contents, start))
    }

    fn number(&mut self, start: usize) -> Lexeme {
        self.take_while(|c| c.is_ascii_digit());
        // A single dot followed by a digit continues the number; `..` is a range
        if self.peek(0) == Some('.') && self.peek(1).is_some_and(|c| c.is_ascii_digit()) {
            self.index += 1;
            self.take_while(|c| c.is_ascii_digit());
        }
        Lexeme::new(TokenKind::Number, &self.source[start..self.offset()], start)
    }

    fn word(&mut self, start: usize) -> Lexeme {
        let word = self.take_while(is_word_char);

        if self.peek(0) == Some(':') && self.peek(1) == Some('/') && self.peek(2) == Some('/') {
            self.take_while(is_url_char);
            return Lexeme::new(TokenKind::Url, &self.source[start..self.offset()], start);
        }

        let kind = if let Some(keyword) = Keyword::from_word(word) {
            TokenKind::Keyword(keyword)
        } else if let Some(special) = SpecialVar::from_name(word) {
            TokenKind::Special(special)
        } else if word.chars().any(|c| c.is_ascii_alphabetic())
            && !word.chars().any(|c| c.is_ascii_lowercase())
        {
            TokenKind::LocalVar
        } else {
            TokenKind::Ident
        };

        Lexeme::new(kind, word, start)
    }

    fn operator(&mut self, c: char, start: usize) -> Result<Lexeme, SyntaxError> {
        let two = match (c, self.peek(1)) {
            ('=', Some('=')) => Some(TokenKind::EqEq),
            ('!', Some('=')) | ('<', Some('>')) => Some(TokenKind::NotEq),
            ('>', Some('=')) => Some(TokenKind::Ge),
            ('<', Some('=')) => Some(TokenKind::Le),
            ('.', Some('.')) => Some(TokenKind::DotDot),
            _ => None,
        };
        if let Some(kind) = two {
            self.index += 2;
            return Ok(Lexeme::new(kind, &self.source[start..self.offset()], start));
        }

        let kind = match c {
            '=' => TokenKind::Assign,
            '>' => TokenKind::Gt,
            '<' => TokenKind::Lt,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            ':' => TokenKind::Colon,
            '.' => TokenKind::Dot,
            other => {
                return Err(SyntaxError::new(
                    SyntaxErrorKind::UnexpectedToken,
                    start,
                    format!("Unexpected character '{}'", other),
                    other.to_string(),
                ))
            }
        };
        self.index += 1;
        Ok(Lexeme::new(kind, c.to_string(), start))
    }
}

/// Split rule text into lexemes
pub fn tokenize(text: &str) -> Result<Vec<Lexeme>, SyntaxError> {
    Lexer::new(text).run()
}

/// Canonical single-spaced form of rule text
///
/// Keywords are lowercased and strings re-quoted; everything else keeps its
/// spelling. Normalizing twice gives the same text as normalizing once.
pub fn normalize(text: &str) -> Result<String, SyntaxError> {
    let lexemes = tokenize(text)?;
    Ok(lexemes
        .iter()
        .map(Lexeme::render)
        .collect::<Vec<_>>()
        .join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(text: &str) -> Vec<TokenKind> {
        tokenize(text).unwrap().into_iter().map(|l| l.kind).collect()
    }

    fn texts(text: &str) -> Vec<String> {
        tokenize(text).unwrap().into_iter().map(|l| l.text).collect()
    }

    #[test]
    fn classifies_words() {
        assert_eq!(
            kinds("x pulse VISIT BETWEEN hivisit"),
            vec![
                TokenKind::Special(SpecialVar::Current),
                TokenKind::Ident,
                TokenKind::LocalVar,
                TokenKind::Keyword(Keyword::Between),
                TokenKind::Special(SpecialVar::HighestVisit),
            ]
        );
    }

    #[test]
    fn decimals_and_ranges() {
        assert_eq!(texts("2.5 .5 1..9"), vec!["2.5", ".5", "1", "..", "9"]);
        assert_eq!(kinds("a..c")[1], TokenKind::DotDot);
    }

    #[test]
    fn urls_stay_whole() {
        let lexemes = tokenize("x = https://example.org/a?b=1;").unwrap();
        assert_eq!(lexemes[2].kind, TokenKind::Url);
        assert_eq!(lexemes[2].text, "https://example.org/a?b=1");
        assert_eq!(lexemes[3].kind, TokenKind::Semicolon);
    }

    #[test]
    fn two_character_operators() {
        assert_eq!(
            kinds("== != <> >= <= = < >"),
            vec![
                TokenKind::EqEq,
                TokenKind::NotEq,
                TokenKind::NotEq,
                TokenKind::Ge,
                TokenKind::Le,
                TokenKind::Assign,
                TokenKind::Lt,
                TokenKind::Gt,
            ]
        );
    }

    #[test]
    fn strings_with_escaped_quotes() {
        let lexemes = tokenize("'it''s fine' x").unwrap();
        assert_eq!(lexemes[0].kind, TokenKind::Str);
        assert_eq!(lexemes[0].text, "it's fine");
        assert_eq!(lexemes[1].position, 13);
    }

    #[test]
    fn double_quote_is_rejected() {
        let error = tokenize("x = \"yes\"").unwrap_err();
        assert_eq!(error.kind, SyntaxErrorKind::DoubleQuote);
        assert_eq!(error.position, 4);
    }

    #[test]
    fn unterminated_string_reports_opening_position() {
        let error = tokenize("between 1 and 5 or 'oops").unwrap_err();
        assert_eq!(error.kind, SyntaxErrorKind::UnterminatedString);
        assert_eq!(error.position, 19);
    }

    #[test]
    fn unknown_character() {
        let error = tokenize("x # 1").unwrap_err();
        assert_eq!(error.kind, SyntaxErrorKind::UnexpectedToken);
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize("  [X=N:'Error: blank']   BETWEEN  1 AND 5 ").unwrap();
        assert_eq!(once, "[ X = N : 'Error: blank' ] between 1 and 5");
        assert_eq!(normalize(&once).unwrap(), once);
    }

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(kinds("NotIn")[0], TokenKind::Keyword(Keyword::NotIn));
        assert_eq!(kinds("ENDIF")[0], TokenKind::Keyword(Keyword::EndIf));
    }
}
