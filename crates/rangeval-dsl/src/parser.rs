//! Statement parser for rule text
//!
//! Recursive descent over the lexeme stream with an explicit [`ParseStack`]
//! recording every construct that still needs closing. Brackets are checked
//! for balance before parsing starts, so a stray `]` is reported where it
//! stands rather than as some unrelated error further on.
//!
//! ## Statements
//!
//! - `expr`: a check; `false` rejects with the default message and non-empty
//!   text rejects with that text as the message
//! - `VAR = expr`, `VAR = table{col = expr and ...}`: assignments; only
//!   uppercase locals can be assigned
//! - `return expr`
//! - `if cond then ... [else ...] endif`
//! - `switch subject case v1, v2: ... case > v: ... [else ...] endswitch`
//! - `[cond: ...][cond: ...] fallthrough`: guards; the first arm whose
//!   condition holds finishes the rule with its result, otherwise the
//!   fallthrough runs. `{ ... }` groups a chain with its own fallthrough.
//!
//! Statements are separated by `;`. The separator is optional after
//! `if`, `switch` and bracket chains.

use crate::ast::{
    ArithOp, Arm, CaseLabel, CmpOp, CompareMode, CrossTableLookup, ExpressionNode, Literal,
    LookupPredicate, Rule, SetMember, SpecialVar, Statement, SwitchCase,
};
use crate::context::CompilationContext;
use crate::error::{CompileError, MetadataError, SyntaxError, SyntaxErrorKind};
use crate::functions::Builtin;
use crate::lexer::{tokenize, Keyword, Lexeme, TokenKind};
use crate::state::{check_balance, ParseStack, ParseState};
use rangeval_core::{CodedValues, FieldType};

type ParseResult<T> = Result<T, CompileError>;

/// Parse rule text against the field described by `ctx`
pub fn parse(source: &str, ctx: &mut CompilationContext<'_>) -> ParseResult<Rule> {
    let lexemes = tokenize(source)?;
    check_balance(&lexemes, source)?;

    let mut parser = Parser {
        source,
        lexemes,
        pos: 0,
        stack: ParseStack::new(),
        ctx,
    };

    let statements = parser.block()?;
    if let Some(lexeme) = parser.peek().cloned() {
        return Err(parser.syntax(
            SyntaxErrorKind::UnmatchedBracket,
            &lexeme,
            format!("'{}' has no matching opener", lexeme.render()),
        ));
    }

    Ok(Rule {
        statements,
        locals: parser.ctx.locals().to_vec(),
        lookups: parser.ctx.lookup_count(),
    })
}

/// Members collected from an `in (...)` list before `c` is expanded
struct SetMembers {
    members: Vec<SetMember>,
    placeholder: bool,
}

struct Parser<'s, 'c, 'a> {
    source: &'s str,
    lexemes: Vec<Lexeme>,
    pos: usize,
    stack: ParseStack,
    ctx: &'c mut CompilationContext<'a>,
}

impl<'s, 'c, 'a> Parser<'s, 'c, 'a> {
    // ---- token helpers -------------------------------------------------

    fn peek(&self) -> Option<&Lexeme> {
        self.lexemes.get(self.pos)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|l| l.kind)
    }

    fn peek_kind_at(&self, ahead: usize) -> Option<TokenKind> {
        self.lexemes.get(self.pos + ahead).map(|l| l.kind)
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind() == Some(kind)
    }

    fn at_keyword(&self, keyword: Keyword) -> bool {
        self.at(TokenKind::Keyword(keyword))
    }

    fn advance(&mut self) -> Option<Lexeme> {
        let lexeme = self.lexemes.get(self.pos).cloned();
        if lexeme.is_some() {
            self.pos += 1;
        }
        lexeme
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn syntax(&self, kind: SyntaxErrorKind, lexeme: &Lexeme, message: impl Into<String>) -> CompileError {
        SyntaxError::new(kind, lexeme.position, message, lexeme.render()).into()
    }

    /// Tokens that end a statement list
    fn at_terminator(&self) -> bool {
        matches!(
            self.peek_kind(),
            Some(
                TokenKind::RBracket
                    | TokenKind::RBrace
                    | TokenKind::RParen
                    | TokenKind::Keyword(Keyword::Else)
                    | TokenKind::Keyword(Keyword::EndIf)
                    | TokenKind::Keyword(Keyword::Case)
                    | TokenKind::Keyword(Keyword::EndSwitch)
            )
        )
    }

    fn at_statement_end(&self) -> bool {
        self.peek().is_none() || self.at(TokenKind::Semicolon) || self.at_terminator()
    }

    /// Error for a token that is not what `expected` describes
    ///
    /// Running into the end of input or into some other construct's closer
    /// means the innermost open construct was never closed.
    fn unexpected(&self, expected: &str) -> CompileError {
        match self.peek() {
            None => match self.stack.unclosed_error(self.source) {
                Some(error) => error.into(),
                None => SyntaxError::new(
                    SyntaxErrorKind::UnexpectedToken,
                    self.source.len(),
                    format!("Rule ends where {} was expected", expected),
                    "",
                )
                .into(),
            },
            Some(lexeme) if self.at_terminator() && !self.stack.is_empty() => {
                let closes_innermost = self.stack.innermost().is_some_and(|frame| {
                    frame.state.closer() == lexeme.render()
                });
                match self.stack.unclosed_error(self.source) {
                    Some(error) if !closes_innermost => error.into(),
                    _ => self.syntax(
                        SyntaxErrorKind::UnexpectedToken,
                        lexeme,
                        format!("Expected {}, found '{}'", expected, lexeme.render()),
                    ),
                }
            }
            Some(lexeme) => self.syntax(
                SyntaxErrorKind::UnexpectedToken,
                lexeme,
                format!("Expected {}, found '{}'", expected, lexeme.render()),
            ),
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> ParseResult<Lexeme> {
        if self.at(kind) {
            if let Some(lexeme) = self.advance() {
                return Ok(lexeme);
            }
        }
        Err(self.unexpected(expected))
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> ParseResult<Lexeme> {
        self.expect(TokenKind::Keyword(keyword), &format!("'{}'", keyword.as_str()))
    }

    // ---- statements ----------------------------------------------------

    fn block(&mut self) -> ParseResult<Vec<Statement>> {
        let mut statements = Vec::new();

        loop {
            while self.eat(TokenKind::Semicolon) {}
            if self.peek().is_none() || self.at_terminator() {
                break;
            }

            let statement = self.statement()?;
            let is_block = matches!(
                statement,
                Statement::If { .. } | Statement::Switch { .. } | Statement::BracketChain { .. }
            );
            statements.push(statement);

            if self.eat(TokenKind::Semicolon) || self.peek().is_none() || self.at_terminator() || is_block {
                continue;
            }
            return Err(self.unexpected("';' between statements"));
        }

        Ok(statements)
    }

    fn statement(&mut self) -> ParseResult<Statement> {
        let Some(lexeme) = self.peek().cloned() else {
            return Err(self.unexpected("a statement"));
        };

        match lexeme.kind {
            TokenKind::Keyword(Keyword::If) => self.if_statement(),
            TokenKind::Keyword(Keyword::Switch) => self.switch_statement(),
            TokenKind::Keyword(Keyword::Return) => {
                self.advance();
                Ok(Statement::Return(self.expression()?))
            }
            TokenKind::LBracket => self.bracket_chain(false),
            TokenKind::LBrace => self.group(),
            TokenKind::LocalVar if self.peek_kind_at(1) == Some(TokenKind::Assign) => self.assignment(),
            TokenKind::Special(_) | TokenKind::Ident
                if self.peek_kind_at(1) == Some(TokenKind::Assign) =>
            {
                let what = match lexeme.kind {
                    TokenKind::Special(_) => "special variable",
                    _ => "field",
                };
                Err(self.syntax(
                    SyntaxErrorKind::InvalidAssignment,
                    &lexeme,
                    format!(
                        "Use '==' to compare {} '{}'; only uppercase variables can be assigned with '='",
                        what, lexeme.text
                    ),
                ))
            }
            TokenKind::LocalVar
                if self.peek_kind_at(1) == Some(TokenKind::Dot)
                    && self.peek_kind_at(3) == Some(TokenKind::Assign) =>
            {
                Err(self.syntax(
                    SyntaxErrorKind::InvalidAssignment,
                    &lexeme,
                    "Fields of a looked-up row are read-only",
                ))
            }
            _ => Ok(Statement::Check(self.expression()?)),
        }
    }

    fn assignment(&mut self) -> ParseResult<Statement> {
        let target = self.expect(TokenKind::LocalVar, "a variable")?;
        self.expect(TokenKind::Assign, "'='")?;

        if self.at(TokenKind::Ident) && self.peek_kind_at(1) == Some(TokenKind::LBrace) {
            let lookup = self.lookup()?;
            self.ctx.bind_row(&target.text, &lookup.table);
            return Ok(Statement::Lookup {
                var: target.text,
                lookup,
            });
        }

        let value = self.expression()?;
        self.ctx.bind_value(&target.text);
        Ok(Statement::Assign {
            var: target.text,
            value,
        })
    }

    /// `table{col op value and ...}`
    fn lookup(&mut self) -> ParseResult<CrossTableLookup> {
        let table = self.expect(TokenKind::Ident, "a table name")?;
        if !self.ctx.resolver.table_exists(&table.text) {
            return Err(self.syntax(
                SyntaxErrorKind::UnknownTable,
                &table,
                format!("Unknown table '{}'", table.text),
            ));
        }

        let open = self.expect(TokenKind::LBrace, "'{'")?;
        self.stack.push(ParseState::InCrossTable, open.position);

        let mut predicates = Vec::new();
        if !self.at(TokenKind::RBrace) {
            loop {
                let column = self.expect(TokenKind::Ident, "a column of the looked-up table")?;
                if !self.ctx.resolver.has_column(&table.text, &column.text) {
                    return Err(self.syntax(
                        SyntaxErrorKind::UnknownField,
                        &column,
                        format!("Unknown field '{}' on table '{}'", column.text, table.text),
                    ));
                }
                let op = self.comparison_operator()?;
                let value = self.additive()?;
                predicates.push(LookupPredicate {
                    column: column.text,
                    op,
                    value,
                });

                if !self.eat(TokenKind::Keyword(Keyword::And)) {
                    break;
                }
            }
        }

        self.expect(TokenKind::RBrace, "'}' closing the lookup")?;
        self.stack.pop();

        // Index columns the author left out are matched against the current record
        for column in self.ctx.resolver.table_index_columns(&table.text)? {
            let constrained = predicates
                .iter()
                .any(|p| p.column == column && p.op == CmpOp::Eq);
            if !constrained && self.ctx.is_field(&column) {
                predicates.push(LookupPredicate {
                    value: self.field_reference(&column),
                    column,
                    op: CmpOp::Eq,
                });
            }
        }

        let info = self.ctx.resolver.table_info(&table.text)?;
        if let (true, Some(row_id)) = (info.log_form, info.row_id_column) {
            if !predicates.iter().any(|p| p.column == row_id) {
                predicates.push(LookupPredicate {
                    column: row_id,
                    op: CmpOp::Gt,
                    value: ExpressionNode::number(0.0),
                });
            }
        }

        Ok(CrossTableLookup {
            id: self.ctx.next_lookup_id(),
            table: table.text,
            predicates,
            limit: 1,
        })
    }

    fn if_statement(&mut self) -> ParseResult<Statement> {
        let open = self.expect_keyword(Keyword::If)?;
        self.stack.push(ParseState::InIfCondition, open.position);

        let condition = self.expression()?;
        self.expect_keyword(Keyword::Then)?;
        self.stack.replace(ParseState::InThen);
        let then_branch = self.block()?;

        let else_branch = if self.eat(TokenKind::Keyword(Keyword::Else)) {
            self.stack.replace(ParseState::InElse);
            Some(self.block()?)
        } else {
            None
        };

        self.expect_keyword(Keyword::EndIf)?;
        self.stack.pop();

        Ok(Statement::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn switch_statement(&mut self) -> ParseResult<Statement> {
        let open = self.expect_keyword(Keyword::Switch)?;
        self.stack.push(ParseState::InSwitch, open.position);

        let subject = self.expression()?;
        let mut cases = Vec::new();

        while self.eat(TokenKind::Keyword(Keyword::Case)) {
            let (label, condition) = if self.peek_kind().is_some_and(|k| k.is_comparison()) {
                let op = self.comparison_operator()?;
                let value = self.additive()?;
                let condition = comparison(op, subject.clone(), value.clone());
                (CaseLabel::Compare(op, value), condition)
            } else {
                let mut values = vec![self.additive()?];
                while self.eat(TokenKind::Comma) {
                    values.push(self.additive()?);
                }
                let condition = values
                    .iter()
                    .map(|v| comparison(CmpOp::Eq, subject.clone(), v.clone()))
                    .reduce(ExpressionNode::or)
                    .unwrap_or_else(|| ExpressionNode::bool(false));
                (CaseLabel::Values(values), condition)
            };

            if !self.eat(TokenKind::Colon) && !self.eat(TokenKind::Keyword(Keyword::Then)) {
                return Err(self.unexpected("':' after the case label"));
            }

            let body = self.block()?;
            cases.push(SwitchCase {
                label,
                condition,
                body,
            });
        }

        if cases.is_empty() {
            return Err(self.unexpected("'case'"));
        }

        let default = if self.eat(TokenKind::Keyword(Keyword::Else)) {
            Some(self.block()?)
        } else {
            None
        };

        self.expect_keyword(Keyword::EndSwitch)?;
        self.stack.pop();

        Ok(Statement::Switch {
            subject,
            cases,
            default,
        })
    }

    fn bracket_chain(&mut self, grouped: bool) -> ParseResult<Statement> {
        let mut arms = Vec::new();
        while self.at(TokenKind::LBracket) {
            arms.push(self.bracket_arm()?);
        }

        let fallthrough = if self.at_statement_end() {
            None
        } else {
            Some(vec![self.statement()?])
        };

        if !grouped && fallthrough.is_some() {
            if let Some(lexeme) = self.peek().filter(|l| l.kind == TokenKind::LBracket).cloned() {
                return Err(self.syntax(
                    SyntaxErrorKind::MalformedTrigger,
                    &lexeme,
                    "Bracket conditionals after a fallthrough must be grouped: {[cond: result] fallthrough}",
                ));
            }
        }

        Ok(Statement::BracketChain {
            arms,
            fallthrough,
            grouped,
        })
    }

    fn bracket_arm(&mut self) -> ParseResult<Arm> {
        let open = self.expect(TokenKind::LBracket, "'['")?;
        self.stack.push(ParseState::InBracketConditional, open.position);

        if self.at(TokenKind::RBracket) {
            return Err(self.syntax(SyntaxErrorKind::MalformedTrigger, &open, "Empty bracket conditional"));
        }

        let condition = self.expression()?;
        if !self.eat(TokenKind::Colon) {
            if self.at(TokenKind::RBracket) {
                return Err(self.syntax(
                    SyntaxErrorKind::MalformedTrigger,
                    &open,
                    "Bracket conditional needs a result: [condition: result]",
                ));
            }
            return Err(self.unexpected("':' after the bracket condition"));
        }

        let body = self.block()?;
        if body.is_empty() {
            return Err(self.syntax(
                SyntaxErrorKind::MalformedTrigger,
                &open,
                "Bracket conditional has an empty result",
            ));
        }

        self.expect(TokenKind::RBracket, "']'")?;
        self.stack.pop();

        Ok(Arm { condition, body })
    }

    fn group(&mut self) -> ParseResult<Statement> {
        let open = self.expect(TokenKind::LBrace, "'{'")?;
        self.stack.push(ParseState::InGroup, open.position);

        if !self.at(TokenKind::LBracket) {
            return Err(self.unexpected("'[' starting the group"));
        }
        let chain = self.bracket_chain(true)?;

        self.expect(TokenKind::RBrace, "'}' closing the group")?;
        self.stack.pop();
        Ok(chain)
    }

    // ---- expressions ---------------------------------------------------

    fn expression(&mut self) -> ParseResult<ExpressionNode> {
        let mut left = self.and_expression()?;
        while self.eat(TokenKind::Keyword(Keyword::Or)) {
            let right = self.and_expression()?;
            left = ExpressionNode::or(left, right);
        }
        Ok(left)
    }

    fn and_expression(&mut self) -> ParseResult<ExpressionNode> {
        let mut left = self.comparison_expression()?;
        while self.eat(TokenKind::Keyword(Keyword::And)) {
            let right = self.comparison_expression()?;
            left = ExpressionNode::and(left, right);
        }
        Ok(left)
    }

    fn starts_without_subject(&self) -> bool {
        match self.peek_kind() {
            Some(TokenKind::Keyword(
                Keyword::Between | Keyword::NotBetween | Keyword::In | Keyword::NotIn,
            )) => true,
            Some(kind) => kind.is_comparison(),
            None => false,
        }
    }

    fn comparison_expression(&mut self) -> ParseResult<ExpressionNode> {
        let left = if self.starts_without_subject() {
            ExpressionNode::current()
        } else {
            self.additive()?
        };

        match self.peek_kind() {
            Some(TokenKind::Keyword(Keyword::Between)) => self.between(left, false),
            Some(TokenKind::Keyword(Keyword::NotBetween)) => self.between(left, true),
            Some(TokenKind::Keyword(Keyword::In)) => self.in_set(left, false),
            Some(TokenKind::Keyword(Keyword::NotIn)) => self.in_set(left, true),
            Some(kind) if kind.is_comparison() => {
                let op = self.comparison_operator()?;
                let right = self.additive()?;
                Ok(comparison(op, left, right))
            }
            _ => Ok(left),
        }
    }

    fn comparison_operator(&mut self) -> ParseResult<CmpOp> {
        let op = match self.peek_kind() {
            Some(TokenKind::Assign | TokenKind::EqEq) => CmpOp::Eq,
            Some(TokenKind::NotEq) => CmpOp::Ne,
            Some(TokenKind::Lt) => CmpOp::Lt,
            Some(TokenKind::Le) => CmpOp::Le,
            Some(TokenKind::Gt) => CmpOp::Gt,
            Some(TokenKind::Ge) => CmpOp::Ge,
            _ => return Err(self.unexpected("a comparison operator")),
        };
        self.advance();
        Ok(op)
    }

    fn between(&mut self, subject: ExpressionNode, negated: bool) -> ParseResult<ExpressionNode> {
        let keyword = self.advance();
        let opened_at = keyword.as_ref().map(|l| l.position).unwrap_or(self.source.len());
        self.stack.push(ParseState::InBetween, opened_at);

        let low = self.additive()?;
        if !self.eat(TokenKind::Keyword(Keyword::And)) {
            let word = if negated { "notbetween" } else { "between" };
            return Err(self.unexpected(&format!("'and': {} takes exactly two operands", word)));
        }
        let high = self.additive()?;
        self.stack.pop();

        Ok(between(subject, low, high, negated))
    }

    fn in_set(&mut self, subject: ExpressionNode, negated: bool) -> ParseResult<ExpressionNode> {
        let keyword = self.advance();
        let opened_at = keyword.as_ref().map(|l| l.position).unwrap_or(self.source.len());
        self.stack.push(ParseState::InSet, opened_at);

        self.expect(TokenKind::LParen, "'(' after in")?;
        let mut set = SetMembers {
            members: Vec::new(),
            placeholder: false,
        };
        if !self.at(TokenKind::RParen) {
            loop {
                self.set_member(&mut set)?;
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')' closing the value list")?;
        self.stack.pop();

        self.expand_set(subject, set, negated)
    }

    fn set_member(&mut self, set: &mut SetMembers) -> ParseResult<()> {
        let Some(lexeme) = self.advance() else {
            return Err(self.unexpected("a value"));
        };

        let member = match lexeme.kind {
            TokenKind::Number | TokenKind::Minus => {
                let low = self.signed_number(&lexeme)?;
                if self.eat(TokenKind::DotDot) {
                    let Some(high_lexeme) = self.advance() else {
                        return Err(self.unexpected("the end of the range"));
                    };
                    let high = self.signed_number(&high_lexeme)?;
                    if low.fract() != 0.0 || high.fract() != 0.0 {
                        return Err(self.syntax(
                            SyntaxErrorKind::UnexpectedToken,
                            &lexeme,
                            "Numeric ranges in a value list take whole numbers",
                        ));
                    }
                    SetMember::IntRange(low as i64, high as i64)
                } else {
                    SetMember::Value {
                        value: ExpressionNode::number(low),
                        text: false,
                    }
                }
            }
            TokenKind::Str | TokenKind::Url => SetMember::Value {
                value: ExpressionNode::text(lexeme.text.clone()),
                text: true,
            },
            TokenKind::Keyword(Keyword::True) => SetMember::Value {
                value: ExpressionNode::bool(true),
                text: false,
            },
            TokenKind::Keyword(Keyword::False) => SetMember::Value {
                value: ExpressionNode::bool(false),
                text: false,
            },
            TokenKind::Special(special) => SetMember::Value {
                value: ExpressionNode::SpecialVariable(special),
                text: false,
            },
            TokenKind::Ident | TokenKind::LocalVar => {
                if self.eat(TokenKind::DotDot) {
                    let high = self.expect_word("the end of the range")?;
                    match (single_char(&lexeme.text), single_char(&high.text)) {
                        (Some(low), Some(high)) => SetMember::CharRange(low, high),
                        _ => {
                            return Err(self.syntax(
                                SyntaxErrorKind::UnexpectedToken,
                                &lexeme,
                                "Letter ranges run between single letters, like a..c",
                            ))
                        }
                    }
                } else if lexeme.kind == TokenKind::Ident && lexeme.text == "c" {
                    set.placeholder = true;
                    return Ok(());
                } else {
                    // Barewords in a value list are literal text
                    SetMember::Value {
                        value: ExpressionNode::text(lexeme.text.clone()),
                        text: false,
                    }
                }
            }
            _ => {
                return Err(self.syntax(
                    SyntaxErrorKind::UnexpectedToken,
                    &lexeme,
                    format!("Expected a value in the list, found '{}'", lexeme.render()),
                ))
            }
        };

        set.members.push(member);
        Ok(())
    }

    /// A word token on either side of a letter range (special names included)
    fn expect_word(&mut self, expected: &str) -> ParseResult<Lexeme> {
        match self.peek_kind() {
            Some(TokenKind::Ident | TokenKind::LocalVar | TokenKind::Special(_)) => {
                self.advance().ok_or_else(|| self.unexpected(expected))
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    fn signed_number(&mut self, lexeme: &Lexeme) -> ParseResult<f64> {
        let (negative, number) = if lexeme.kind == TokenKind::Minus {
            match self.advance() {
                Some(next) if next.kind == TokenKind::Number => (true, next),
                _ => {
                    return Err(self.syntax(
                        SyntaxErrorKind::UnexpectedToken,
                        lexeme,
                        "Expected a number after '-'",
                    ))
                }
            }
        } else {
            (false, lexeme.clone())
        };

        let value: f64 = number.text.parse().map_err(|_| {
            self.syntax(
                SyntaxErrorKind::UnexpectedToken,
                &number,
                format!("'{}' is not a number", number.text),
            )
        })?;
        Ok(if negative { -value } else { value })
    }

    /// Replace the `c` placeholder with the field's coded values
    ///
    /// Discrete codes join the list. A numeric range becomes a `between`
    /// clause (with step and precision checks) joined by `or` for `in` and
    /// `and not(...)` for `notin`.
    fn expand_set(
        &mut self,
        subject: ExpressionNode,
        set: SetMembers,
        negated: bool,
    ) -> ParseResult<ExpressionNode> {
        let SetMembers {
            mut members,
            placeholder,
        } = set;
        let mut range_clause = None;

        if placeholder {
            let definition = &self.ctx.definition;
            match self.ctx.resolver.coded_values(definition)? {
                CodedValues::None => {
                    return Err(MetadataError::MalformedCodes {
                        field: definition.qualified_name(),
                        reason: "rule uses 'c' but the field has no coded values".to_string(),
                    }
                    .into())
                }
                CodedValues::Discrete(codes) => {
                    for code in codes {
                        let value = match code.value.parse::<f64>() {
                            Ok(number) => ExpressionNode::number(number),
                            Err(_) => ExpressionNode::text(code.value),
                        };
                        members.push(SetMember::Value { value, text: false });
                    }
                }
                CodedValues::Range(range) => {
                    let mut clause = between(
                        subject.clone(),
                        ExpressionNode::number(range.min),
                        ExpressionNode::number(range.max),
                        false,
                    );
                    if let Some(step) = range.step {
                        clause = ExpressionNode::and(
                            clause,
                            ExpressionNode::call(
                                Builtin::OnStep,
                                vec![
                                    subject.clone(),
                                    ExpressionNode::number(range.min),
                                    ExpressionNode::number(step),
                                ],
                            ),
                        );
                    }
                    let precision = match (definition.field_type, definition.decimals) {
                        (FieldType::Integer, _) => Some(0),
                        (_, places) => places,
                    };
                    if let Some(places) = precision {
                        clause = ExpressionNode::and(
                            clause,
                            ExpressionNode::compare(
                                CmpOp::Le,
                                CompareMode::Loose,
                                ExpressionNode::call(Builtin::Decimals, vec![subject.clone()]),
                                ExpressionNode::number(f64::from(places)),
                            ),
                        );
                    }
                    range_clause = Some(clause);
                }
            }
        }

        let Some(clause) = range_clause else {
            return Ok(ExpressionNode::InSet {
                subject: Box::new(subject),
                members,
                negated,
            });
        };

        let excluded = ExpressionNode::call(Builtin::Not, vec![clause.clone()]);
        if members.is_empty() {
            return Ok(if negated { excluded } else { clause });
        }

        let set = ExpressionNode::InSet {
            subject: Box::new(subject),
            members,
            negated,
        };
        Ok(if negated {
            ExpressionNode::and(set, excluded)
        } else {
            ExpressionNode::or(set, clause)
        })
    }

    fn additive(&mut self) -> ParseResult<ExpressionNode> {
        let mut left = self.multiplicative()?;
        loop {
            if self.eat(TokenKind::Plus) {
                let right = self.multiplicative()?;
                left = if left.is_stringish() || right.is_stringish() {
                    ExpressionNode::Concat {
                        left: Box::new(left),
                        right: Box::new(right),
                    }
                } else {
                    arithmetic(ArithOp::Add, left, right)
                };
            } else if self.eat(TokenKind::Minus) {
                let right = self.multiplicative()?;
                left = arithmetic(ArithOp::Sub, left, right);
            } else {
                return Ok(left);
            }
        }
    }

    fn multiplicative(&mut self) -> ParseResult<ExpressionNode> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Star) => ArithOp::Mul,
                Some(TokenKind::Slash) => ArithOp::Div,
                Some(TokenKind::Percent) => ArithOp::Rem,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.unary()?;
            left = arithmetic(op, left, right);
        }
    }

    fn unary(&mut self) -> ParseResult<ExpressionNode> {
        if self.eat(TokenKind::Minus) {
            let operand = self.unary()?;
            return Ok(match operand {
                ExpressionNode::Literal(Literal::Number(n)) => ExpressionNode::number(-n),
                other => ExpressionNode::Negate(Box::new(other)),
            });
        }
        self.primary()
    }

    fn primary(&mut self) -> ParseResult<ExpressionNode> {
        let Some(lexeme) = self.peek().cloned() else {
            return Err(self.unexpected("a value"));
        };

        match lexeme.kind {
            TokenKind::Number => {
                self.advance();
                let value: f64 = lexeme.text.parse().map_err(|_| {
                    self.syntax(
                        SyntaxErrorKind::UnexpectedToken,
                        &lexeme,
                        format!("'{}' is not a number", lexeme.text),
                    )
                })?;
                Ok(ExpressionNode::number(value))
            }
            TokenKind::Str | TokenKind::Url => {
                self.advance();
                Ok(ExpressionNode::text(lexeme.text))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Ok(ExpressionNode::bool(true))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Ok(ExpressionNode::bool(false))
            }
            TokenKind::Special(special) => {
                self.advance();
                Ok(ExpressionNode::SpecialVariable(special))
            }
            TokenKind::LParen => {
                self.advance();
                self.stack.push(ParseState::InParen, lexeme.position);
                let inner = self.expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                self.stack.pop();
                Ok(inner)
            }
            TokenKind::Ident | TokenKind::LocalVar if self.peek_kind_at(1) == Some(TokenKind::LParen) => {
                self.function_call()
            }
            TokenKind::Ident if self.peek_kind_at(1) == Some(TokenKind::LBrace) => Err(self.syntax(
                SyntaxErrorKind::InvalidLookup,
                &lexeme,
                "Cross-table lookups must be stored in an uppercase variable: VAR = table{...}",
            )),
            TokenKind::Ident => {
                self.advance();
                if !self.ctx.is_field(&lexeme.text) {
                    return Err(self.syntax(
                        SyntaxErrorKind::UnknownField,
                        &lexeme,
                        format!("Unknown field '{}' on table '{}'", lexeme.text, self.ctx.table()),
                    ));
                }
                Ok(self.field_reference(&lexeme.text))
            }
            TokenKind::LocalVar => {
                self.advance();
                if self.eat(TokenKind::Dot) {
                    return self.row_field(&lexeme);
                }
                self.ctx.declare_local(&lexeme.text);
                Ok(ExpressionNode::LocalVariable(lexeme.text))
            }
            TokenKind::Keyword(keyword @ (Keyword::If | Keyword::Switch)) => Err(self.syntax(
                SyntaxErrorKind::UnexpectedToken,
                &lexeme,
                format!("'{}' can only start a statement", keyword.as_str()),
            )),
            _ => Err(self.unexpected("a value")),
        }
    }

    fn field_reference(&self, name: &str) -> ExpressionNode {
        if name == self.ctx.field() {
            ExpressionNode::SpecialVariable(SpecialVar::Current)
        } else {
            ExpressionNode::FieldReference(name.to_string())
        }
    }

    fn row_field(&mut self, var: &Lexeme) -> ParseResult<ExpressionNode> {
        let field = self.expect(TokenKind::Ident, "a field name after '.'")?;
        let Some(table) = self.ctx.row_table(&var.text).map(str::to_string) else {
            return Err(self.syntax(
                SyntaxErrorKind::InvalidLookup,
                var,
                format!("'{}' does not hold a looked-up row", var.text),
            ));
        };

        if !self.ctx.resolver.has_column(&table, &field.text) {
            return Err(self.syntax(
                SyntaxErrorKind::UnknownField,
                &field,
                format!("Unknown field '{}' on table '{}'", field.text, table),
            ));
        }

        Ok(ExpressionNode::RowField {
            var: var.text.clone(),
            field: field.text,
        })
    }

    fn function_call(&mut self) -> ParseResult<ExpressionNode> {
        let name = self.advance().ok_or_else(|| self.unexpected("a function name"))?;
        let Some(function) = Builtin::from_name(&name.text) else {
            return Err(self.syntax(
                SyntaxErrorKind::UnknownFunction,
                &name,
                format!("Unknown function '{}'", name.text),
            ));
        };

        let open = self.expect(TokenKind::LParen, "'('")?;
        self.stack.push(ParseState::InParen, open.position);

        let mut args = Vec::new();
        if !self.at(TokenKind::RParen) {
            loop {
                args.push(self.expression()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')' closing the argument list")?;
        self.stack.pop();

        if !function.accepts(args.len()) {
            let (min, max) = function.arity();
            let expected = if min == max {
                format!("{}", min)
            } else {
                format!("{} to {}", min, max)
            };
            return Err(self.syntax(
                SyntaxErrorKind::UnexpectedToken,
                &name,
                format!("{}() takes {} argument(s), got {}", function, expected, args.len()),
            ));
        }

        Ok(ExpressionNode::call(function, args))
    }
}

fn single_char(text: &str) -> Option<char> {
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

fn arithmetic(op: ArithOp, left: ExpressionNode, right: ExpressionNode) -> ExpressionNode {
    ExpressionNode::Arithmetic {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

/// Build a comparison, choosing text mode for string literals
///
/// Empty values compare equal to 0 in loose mode, so `=`, `>=` and `<=`
/// against a literal 0 also require the other side to be non-empty.
fn comparison(op: CmpOp, left: ExpressionNode, right: ExpressionNode) -> ExpressionNode {
    let mode = if left.is_stringish() || right.is_stringish() {
        CompareMode::Text
    } else {
        CompareMode::Loose
    };

    let guarded = match (mode, op) {
        (CompareMode::Loose, CmpOp::Eq | CmpOp::Ge | CmpOp::Le) => {
            if right.is_zero_literal() && !left.is_zero_literal() {
                Some(left.clone())
            } else if left.is_zero_literal() && !right.is_zero_literal() {
                Some(right.clone())
            } else {
                None
            }
        }
        _ => None,
    };

    let compare = ExpressionNode::compare(op, mode, left, right);
    match guarded {
        Some(operand) => ExpressionNode::and(non_empty(operand), compare),
        None => compare,
    }
}

fn length_of(operand: ExpressionNode) -> ExpressionNode {
    ExpressionNode::call(Builtin::Len, vec![operand])
}

fn non_empty(operand: ExpressionNode) -> ExpressionNode {
    ExpressionNode::compare(CmpOp::Gt, CompareMode::Loose, length_of(operand), ExpressionNode::number(0.0))
}

/// `between` with a literal-zero bound gets the same emptiness guard
fn between(subject: ExpressionNode, low: ExpressionNode, high: ExpressionNode, negated: bool) -> ExpressionNode {
    let zero_bound = low.is_zero_literal() || high.is_zero_literal();
    let node = ExpressionNode::Between {
        subject: Box::new(subject.clone()),
        low: Box::new(low),
        high: Box::new(high),
        negated,
    };

    match (zero_bound, negated) {
        (false, _) => node,
        (true, false) => ExpressionNode::and(non_empty(subject), node),
        (true, true) => ExpressionNode::or(
            ExpressionNode::compare(CmpOp::Eq, CompareMode::Loose, length_of(subject), ExpressionNode::number(0.0)),
            node,
        ),
    }
}
