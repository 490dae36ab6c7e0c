//! Parser for rule and pipeline sources
//!
//! A recursive descent parser with one function per precedence level. It
//! builds an untyped AST without consulting the function registry; names and
//! types are resolved later by the validator. Parsing is all-or-nothing: the
//! first syntax error aborts the whole document.

use crate::ast::{
    Argument, BinaryOperator, Declaration, Expression, FunctionCall, LogicalOperator, PipelineDecl,
    RuleDecl, RuleRef, Span, StageDecl, StageMatch, Statement,
};
use crate::error::SyntaxError;
use crate::lexer::{Lexer, SpannedToken, Token};
use sluice_types::Value;

type ParseResult<T> = Result<T, SyntaxError>;

/// Words that cannot name a variable or function
const RESERVED: &[&str] = &[
    "rule", "when", "then", "end", "let", "pipeline", "stage", "match", "and", "or", "not", "true",
    "false",
];

fn is_reserved(word: &str) -> bool {
    RESERVED.iter().any(|kw| word.eq_ignore_ascii_case(kw))
}

/// Parse a single rule declaration
///
/// # Errors
///
/// The first syntax error, or an error if the source holds anything besides
/// exactly one rule.
pub fn parse_rule(source: &str) -> ParseResult<RuleDecl> {
    let mut parser = Parser::new(source)?;
    let rule = parser.parse_rule()?;
    parser.expect_eof()?;
    Ok(rule)
}

/// Parse a single pipeline declaration
///
/// # Errors
///
/// The first syntax error, or an error if the source holds anything besides
/// exactly one pipeline.
pub fn parse_pipeline(source: &str) -> ParseResult<PipelineDecl> {
    let mut parser = Parser::new(source)?;
    let pipeline = parser.parse_pipeline()?;
    parser.expect_eof()?;
    Ok(pipeline)
}

/// Parse a document of rule and pipeline declarations in source order
///
/// # Errors
///
/// The first syntax error; no declaration is returned in that case.
pub fn parse_declarations(source: &str) -> ParseResult<Vec<Declaration>> {
    let mut parser = Parser::new(source)?;
    let mut declarations = Vec::new();
    while !parser.at(&Token::Eof) {
        if parser.at_keyword("rule") {
            declarations.push(Declaration::Rule(parser.parse_rule()?));
        } else if parser.at_keyword("pipeline") {
            declarations.push(Declaration::Pipeline(parser.parse_pipeline()?));
        } else {
            return Err(parser.unexpected("'rule' or 'pipeline'"));
        }
    }
    Ok(declarations)
}

/// Parse a standalone expression
///
/// # Errors
///
/// The first syntax error.
pub fn parse_expression(source: &str) -> ParseResult<Expression> {
    let mut parser = Parser::new(source)?;
    let expr = parser.parse_expression()?;
    parser.expect_eof()?;
    Ok(expr)
}

/// Parser state over a fully tokenized source
pub struct Parser<'s> {
    source: &'s str,
    tokens: Vec<SpannedToken>,
    position: usize,
}

impl<'s> Parser<'s> {
    /// Tokenize `source` and position the parser at its first token
    ///
    /// # Errors
    ///
    /// Lexical errors.
    pub fn new(source: &'s str) -> ParseResult<Self> {
        let tokens = Lexer::new(source).tokenize()?;
        Ok(Self { source, tokens, position: 0 })
    }

    fn current(&self) -> &SpannedToken {
        // tokenize always ends with Eof and advance never moves past it
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    fn token(&self) -> &Token {
        &self.current().token
    }

    fn span(&self) -> Span {
        self.current().span
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.position + 1).map_or(&Token::Eof, |t| &t.token)
    }

    fn advance(&mut self) -> SpannedToken {
        let token = self.current().clone();
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
        token
    }

    fn at(&self, token: &Token) -> bool {
        std::mem::discriminant(self.token()) == std::mem::discriminant(token)
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.token(), Token::Identifier(word) if word.eq_ignore_ascii_case(keyword))
    }

    fn unexpected(&self, expected: &str) -> SyntaxError {
        SyntaxError::at(self.span(), format!("expected {expected}, found {}", self.token()))
    }

    fn expect(&mut self, expected: Token) -> ParseResult<SpannedToken> {
        if self.at(&expected) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&expected.to_string()))
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> ParseResult<SpannedToken> {
        if self.at_keyword(keyword) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&format!("'{keyword}'")))
        }
    }

    fn expect_eof(&self) -> ParseResult<()> {
        if self.at(&Token::Eof) { Ok(()) } else { Err(self.unexpected("end of input")) }
    }

    fn expect_string(&mut self, what: &str) -> ParseResult<String> {
        match self.token().clone() {
            Token::String(s) => {
                self.advance();
                Ok(s)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    /// An identifier that is not a reserved word
    fn expect_name(&mut self, what: &str) -> ParseResult<String> {
        match self.token().clone() {
            Token::Identifier(name) if !is_reserved(&name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn source_between(&self, start: usize, end: usize) -> String {
        self.source.get(start..end).unwrap_or_default().to_string()
    }

    /// `rule "<name>" when <expr> then <stmt>* end`
    pub fn parse_rule(&mut self) -> ParseResult<RuleDecl> {
        let head = self.expect_keyword("rule")?;
        let name = self.expect_string("rule name")?;
        self.expect_keyword("when")?;
        let when = self.parse_expression()?;
        self.expect_keyword("then")?;

        let mut then = Vec::new();
        while !self.at_keyword("end") {
            if self.at(&Token::Eof) {
                return Err(self.unexpected("'end'"));
            }
            then.push(self.parse_statement()?);
        }
        let tail = self.expect_keyword("end")?;

        Ok(RuleDecl { name, when, then, source: self.source_between(head.start, tail.end), span: head.span })
    }

    fn parse_statement(&mut self) -> ParseResult<Statement> {
        let span = self.span();
        let statement = if self.at_keyword("let") {
            self.advance();
            let name = self.expect_name("variable name")?;
            self.expect(Token::Assign)?;
            let expr = self.parse_expression()?;
            Statement::VarAssign { name, expr, ty: None, span }
        } else {
            let expr = self.parse_expression()?;
            Statement::ExprStatement { expr, span }
        };
        self.expect(Token::Semicolon)?;
        Ok(statement)
    }

    /// `pipeline "<name>" (stage <n> match <policy> (rule "<name>";)*)* end`
    pub fn parse_pipeline(&mut self) -> ParseResult<PipelineDecl> {
        let head = self.expect_keyword("pipeline")?;
        let name = self.expect_string("pipeline name")?;

        let mut stages = Vec::new();
        while self.at_keyword("stage") {
            stages.push(self.parse_stage()?);
        }
        let tail = self.expect_keyword("end")?;

        Ok(PipelineDecl { name, stages, source: self.source_between(head.start, tail.end), span: head.span })
    }

    fn parse_stage(&mut self) -> ParseResult<StageDecl> {
        let span = self.expect_keyword("stage")?.span;
        let negative = if self.at(&Token::Minus) {
            self.advance();
            true
        } else {
            false
        };
        let order = match *self.token() {
            Token::Integer(n) => {
                let n = if negative { n.wrapping_neg() } else { n };
                i32::try_from(n).map_err(|_| SyntaxError::at(self.span(), format!("stage number {n} is out of range")))?
            }
            _ => return Err(self.unexpected("stage number")),
        };
        self.advance();

        self.expect_keyword("match")?;
        let matching = match self.token() {
            Token::Identifier(word) if word.eq_ignore_ascii_case("all") => StageMatch::All,
            Token::Identifier(word) if word.eq_ignore_ascii_case("any") || word.eq_ignore_ascii_case("either") => {
                StageMatch::Any
            }
            Token::Identifier(word) if word.eq_ignore_ascii_case("pass") => StageMatch::Pass,
            _ => return Err(self.unexpected("'all', 'any', 'either' or 'pass'")),
        };
        self.advance();

        let mut rules = Vec::new();
        while self.at_keyword("rule") {
            self.advance();
            let span = self.span();
            let name = self.expect_string("rule name")?;
            if self.at(&Token::Semicolon) {
                self.advance();
            }
            rules.push(RuleRef { name, span });
        }

        Ok(StageDecl { order, matching, rules, span })
    }

    /// Parse an expression at the lowest precedence level
    pub fn parse_expression(&mut self) -> ParseResult<Expression> {
        self.parse_or_expression()
    }

    fn parse_or_expression(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_and_expression()?;

        while self.at(&Token::Or) || self.at_keyword("or") {
            let span = self.advance().span;
            let right = self.parse_and_expression()?;
            left = Expression::logical(left, LogicalOperator::Or, right, span);
        }

        Ok(left)
    }

    fn parse_and_expression(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_equality_expression()?;

        while self.at(&Token::And) || self.at_keyword("and") {
            let span = self.advance().span;
            let right = self.parse_equality_expression()?;
            left = Expression::logical(left, LogicalOperator::And, right, span);
        }

        Ok(left)
    }

    fn parse_equality_expression(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_comparison_expression()?;

        loop {
            let op = match self.token() {
                Token::Equal => BinaryOperator::Equal,
                Token::NotEqual => BinaryOperator::NotEqual,
                _ => break,
            };
            let span = self.advance().span;
            let right = self.parse_comparison_expression()?;
            left = Expression::binary(left, op, right, span);
        }

        Ok(left)
    }

    fn parse_comparison_expression(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_additive_expression()?;

        loop {
            let op = match self.token() {
                Token::LessThan => BinaryOperator::LessThan,
                Token::LessThanEqual => BinaryOperator::LessThanOrEqual,
                Token::GreaterThan => BinaryOperator::GreaterThan,
                Token::GreaterThanEqual => BinaryOperator::GreaterThanOrEqual,
                _ => break,
            };
            let span = self.advance().span;
            let right = self.parse_additive_expression()?;
            left = Expression::binary(left, op, right, span);
        }

        Ok(left)
    }

    fn parse_additive_expression(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_multiplicative_expression()?;

        loop {
            let op = match self.token() {
                Token::Plus => BinaryOperator::Add,
                Token::Minus => BinaryOperator::Subtract,
                _ => break,
            };
            let span = self.advance().span;
            let right = self.parse_multiplicative_expression()?;
            left = Expression::binary(left, op, right, span);
        }

        Ok(left)
    }

    fn parse_multiplicative_expression(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_unary_expression()?;

        loop {
            let op = match self.token() {
                Token::Star => BinaryOperator::Multiply,
                Token::Slash => BinaryOperator::Divide,
                Token::Percent => BinaryOperator::Modulo,
                _ => break,
            };
            let span = self.advance().span;
            let right = self.parse_unary_expression()?;
            left = Expression::binary(left, op, right, span);
        }

        Ok(left)
    }

    fn parse_unary_expression(&mut self) -> ParseResult<Expression> {
        let span = self.span();
        if self.at(&Token::Not) || self.at_keyword("not") {
            self.advance();
            let operand = self.parse_unary_expression()?;
            return Ok(Expression::Not { operand: Box::new(operand), span });
        }
        if self.at(&Token::Minus) {
            self.advance();
            // fold `-<literal>`; the lexer hands over i64::MIN for `-9223372036854775808`
            return match self.token().clone() {
                Token::Integer(n) if !matches!(self.peek(), Token::LeftBracket) => {
                    self.advance();
                    Ok(Expression::literal(Value::Long(n.wrapping_neg()), span))
                }
                Token::Float(n) if !matches!(self.peek(), Token::LeftBracket) => {
                    self.advance();
                    Ok(Expression::literal(Value::Double(-n), span))
                }
                _ => {
                    let operand = self.parse_unary_expression()?;
                    Ok(Expression::Negate { operand: Box::new(operand), span })
                }
            };
        }
        self.parse_postfix_expression()
    }

    fn parse_postfix_expression(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_primary_expression()?;

        while self.at(&Token::LeftBracket) {
            let span = self.advance().span;
            let index = self.parse_expression()?;
            self.expect(Token::RightBracket)?;
            expr = Expression::Index { target: Box::new(expr), index: Box::new(index), span };
        }

        Ok(expr)
    }

    fn parse_primary_expression(&mut self) -> ParseResult<Expression> {
        let span = self.span();
        match self.token().clone() {
            Token::Integer(i64::MIN) => Err(SyntaxError::at(
                span,
                format!("integer literal '{}' is out of range", i64::MIN.unsigned_abs()),
            )),
            Token::Integer(n) => {
                self.advance();
                Ok(Expression::literal(Value::Long(n), span))
            }
            Token::Float(n) => {
                self.advance();
                Ok(Expression::literal(Value::Double(n), span))
            }
            Token::String(s) => {
                self.advance();
                Ok(Expression::literal(Value::String(s), span))
            }
            Token::MessageRef => {
                self.advance();
                self.parse_field_ref(span)
            }
            Token::LeftParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(Token::RightParen)?;
                Ok(expr)
            }
            Token::LeftBracket => self.parse_array_literal(span),
            Token::LeftBrace => self.parse_map_literal(span),
            Token::Identifier(word) if word.eq_ignore_ascii_case("true") => {
                self.advance();
                Ok(Expression::literal(Value::Boolean(true), span))
            }
            Token::Identifier(word) if word.eq_ignore_ascii_case("false") => {
                self.advance();
                Ok(Expression::literal(Value::Boolean(false), span))
            }
            Token::Identifier(name) if !is_reserved(&name) => {
                self.advance();
                if self.at(&Token::LeftParen) {
                    self.parse_function_call(name, span)
                } else {
                    Ok(Expression::VarRef { name, span })
                }
            }
            _ => Err(self.unexpected("an expression")),
        }
    }

    fn parse_field_ref(&mut self, span: Span) -> ParseResult<Expression> {
        match self.token() {
            Token::Dot => {
                self.advance();
                match self.token().clone() {
                    Token::Identifier(name) => {
                        self.advance();
                        Ok(Expression::FieldRef { name, span })
                    }
                    _ => Err(self.unexpected("field name")),
                }
            }
            Token::LeftBracket => {
                self.advance();
                let name = self.expect_string("quoted field name")?;
                self.expect(Token::RightBracket)?;
                Ok(Expression::FieldRef { name, span })
            }
            _ => Err(self.unexpected("'.' or '[' after $message")),
        }
    }

    fn parse_function_call(&mut self, name: String, span: Span) -> ParseResult<Expression> {
        self.expect(Token::LeftParen)?;
        let mut args = Vec::new();

        if !self.at(&Token::RightParen) {
            loop {
                let arg_span = self.span();
                let arg_name = match (self.token(), self.peek()) {
                    (Token::Identifier(n), Token::Colon) => Some(n.clone()),
                    _ => None,
                };
                if arg_name.is_some() {
                    self.advance();
                    self.advance();
                }
                let value = self.parse_expression()?;
                args.push(Argument { name: arg_name, value, span: arg_span });

                if self.at(&Token::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }

        self.expect(Token::RightParen)?;
        Ok(Expression::FunctionCall(FunctionCall { name, args, bindings: Vec::new(), span }))
    }

    fn parse_array_literal(&mut self, span: Span) -> ParseResult<Expression> {
        self.expect(Token::LeftBracket)?;
        let mut elements = Vec::new();

        if !self.at(&Token::RightBracket) {
            loop {
                elements.push(self.parse_expression()?);
                if self.at(&Token::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }

        self.expect(Token::RightBracket)?;
        Ok(Expression::ArrayLiteral { elements, span })
    }

    fn parse_map_literal(&mut self, span: Span) -> ParseResult<Expression> {
        self.expect(Token::LeftBrace)?;
        let mut entries = Vec::new();

        if !self.at(&Token::RightBrace) {
            loop {
                let key = match self.token().clone() {
                    Token::Identifier(key) | Token::String(key) => {
                        self.advance();
                        key
                    }
                    _ => return Err(self.unexpected("map key")),
                };
                self.expect(Token::Colon)?;
                entries.push((key, self.parse_expression()?));

                if self.at(&Token::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }

        self.expect(Token::RightBrace)?;
        Ok(Expression::MapLiteral { entries, span })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence() {
        let expr = parse_expression("1 + 2 * 3 == 7 and not false").unwrap();
        assert_eq!(expr.to_string(), "(((1 + (2 * 3)) == 7) and not false)");
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        let rule = parse_rule("RULE \"r\" When TRUE Then End").unwrap();
        assert_eq!(rule.name, "r");
        assert!(rule.then.is_empty());
    }

    #[test]
    fn test_rule_source_is_captured() {
        let text = "// lead\nrule \"a\" when true then end\nrule \"b\" when false then end";
        let decls = parse_declarations(text).unwrap();
        assert_eq!(decls.len(), 2);
        match &decls[1] {
            Declaration::Rule(rule) => assert_eq!(rule.source, "rule \"b\" when false then end"),
            Declaration::Pipeline(_) => panic!("expected a rule"),
        }
    }

    #[test]
    fn test_named_arguments() {
        let expr = parse_expression("to_long(value: $message.x, default: -1)").unwrap();
        let Expression::FunctionCall(call) = expr else { panic!("expected call") };
        assert_eq!(call.args[0].name.as_deref(), Some("value"));
        assert_eq!(call.args[1].value, Expression::literal(Value::Long(-1), Span::new(1, 37)));
    }

    #[test]
    fn test_negative_literal_bounds() {
        let expr = parse_expression("-9223372036854775807 - 1").unwrap();
        assert_eq!(expr.to_string(), "(-9223372036854775807 - 1)");
    }

    #[test]
    fn test_min_long_literal() {
        let expr = parse_expression("-9223372036854775808").unwrap();
        assert_eq!(expr, Expression::literal(Value::Long(i64::MIN), Span::new(1, 1)));

        let err = parse_expression("1 - 9223372036854775808").unwrap_err();
        assert_eq!((err.line, err.column), (1, 5));
        assert!(err.message.contains("out of range"));
        assert!(parse_expression("-9223372036854775808[0]").is_err());
    }

    #[test]
    fn test_missing_end_reports_position() {
        let err = parse_rule("rule \"r\"\nwhen true\nthen\n  set_field(\"a\", 1);\n").unwrap_err();
        assert_eq!(err.line, 5);
        assert!(err.message.contains("'end'"));
    }

    #[test]
    fn test_reserved_word_as_variable_is_rejected() {
        assert!(parse_rule("rule \"r\" when true then let end = 1; end").is_err());
    }

    #[test]
    fn test_pipeline_stages() {
        let decl = parse_pipeline(
            "pipeline \"p\"\nstage 1 match either\n  rule \"a\";\n  rule \"b\";\nstage 0 match all\nend",
        )
        .unwrap();
        assert_eq!(decl.stages.len(), 2);
        assert_eq!(decl.stages[0].matching, StageMatch::Any);
        assert_eq!(decl.stages[0].rules[1].name, "b");
        assert_eq!(decl.stages[1].order, 0);
    }
}
