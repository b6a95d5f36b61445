//! Explicit parse-state stack
//!
//! The parser pushes a frame whenever it enters a construct that must be
//! closed (brackets, `if`/`endif`, `switch`/`endswitch`, lookup braces...).
//! Anything left open at end of input is reported against its opener.

use crate::error::{SyntaxError, SyntaxErrorKind};
use crate::lexer::{Lexeme, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseState {
    Plain,
    InBetween,
    InSet,
    InIfCondition,
    InThen,
    InElse,
    InSwitch,
    InBracketConditional,
    InCrossTable,
    InParen,
    InGroup,
}

impl ParseState {
    /// What the author has to write to leave this state
    pub fn closer(&self) -> &'static str {
        match self {
            Self::Plain => "end of input",
            Self::InBetween => "and",
            Self::InSet | Self::InParen => ")",
            Self::InIfCondition => "then",
            Self::InThen | Self::InElse => "endif",
            Self::InSwitch => "endswitch",
            Self::InBracketConditional => "]",
            Self::InCrossTable | Self::InGroup => "}",
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Self::Plain => "rule",
            Self::InBetween => "between",
            Self::InSet => "value list",
            Self::InIfCondition => "if condition",
            Self::InThen => "then branch",
            Self::InElse => "else branch",
            Self::InSwitch => "switch",
            Self::InBracketConditional => "bracket conditional",
            Self::InCrossTable => "cross-table lookup",
            Self::InParen => "parenthesis",
            Self::InGroup => "group",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub state: ParseState,
    /// Byte offset of the token that opened the frame
    pub opened_at: usize,
}

/// Stack of open constructs; empty means [`ParseState::Plain`]
#[derive(Debug, Default)]
pub struct ParseStack {
    frames: Vec<Frame>,
}

impl ParseStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, state: ParseState, opened_at: usize) {
        self.frames.push(Frame { state, opened_at });
    }

    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    /// Swap the innermost state, keeping its opener (`then` -> `else`)
    pub fn replace(&mut self, state: ParseState) {
        if let Some(frame) = self.frames.last_mut() {
            frame.state = state;
        }
    }

    pub fn current(&self) -> ParseState {
        self.frames
            .last()
            .map(|frame| frame.state)
            .unwrap_or(ParseState::Plain)
    }

    pub fn innermost(&self) -> Option<Frame> {
        self.frames.last().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Error for input that ended inside the innermost frame
    pub fn unclosed_error(&self, source: &str) -> Option<SyntaxError> {
        self.innermost().map(|frame| unclosed(frame, source))
    }
}

fn unclosed(frame: Frame, source: &str) -> SyntaxError {
    let fragment: String = source
        .get(frame.opened_at..)
        .unwrap_or_default()
        .chars()
        .take(24)
        .collect();
    SyntaxError::new(
        SyntaxErrorKind::UnmatchedBracket,
        frame.opened_at,
        format!(
            "{} opened at position {} is never closed with '{}'",
            frame.state.describe(),
            frame.opened_at,
            frame.state.closer()
        ),
        fragment,
    )
}

/// Check that `()`, `[]` and `{}` nest properly before parsing starts
///
/// A stray closer is reported at its own position; an unclosed opener at the
/// position of the opener.
pub fn check_balance(lexemes: &[Lexeme], source: &str) -> Result<(), SyntaxError> {
    let mut stack = ParseStack::new();

    for lexeme in lexemes {
        match lexeme.kind {
            TokenKind::LParen => stack.push(ParseState::InParen, lexeme.position),
            TokenKind::LBracket => stack.push(ParseState::InBracketConditional, lexeme.position),
            TokenKind::LBrace => stack.push(ParseState::InGroup, lexeme.position),
            kind => {
                let Some(opener) = kind.opener() else { continue };
                let expected = match opener {
                    TokenKind::LParen => ParseState::InParen,
                    TokenKind::LBracket => ParseState::InBracketConditional,
                    _ => ParseState::InGroup,
                };
                match stack.pop() {
                    Some(frame) if frame.state == expected => {}
                    Some(frame) => {
                        return Err(SyntaxError::new(
                            SyntaxErrorKind::UnmatchedBracket,
                            lexeme.position,
                            format!(
                                "'{}' does not match the {} opened at position {}",
                                lexeme.text,
                                frame.state.describe(),
                                frame.opened_at
                            ),
                            lexeme.text.clone(),
                        ))
                    }
                    None => {
                        return Err(SyntaxError::new(
                            SyntaxErrorKind::UnmatchedBracket,
                            lexeme.position,
                            format!("'{}' has no matching opener", lexeme.text),
                            lexeme.text.clone(),
                        ))
                    }
                }
            }
        }
    }

    match stack.unclosed_error(source) {
        Some(error) => Err(error),
        None => Ok(()),
    }
}
