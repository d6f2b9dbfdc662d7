//! 구문 분석기 -- 토큰 열을 규칙/파이프라인 AST로 변환합니다.
//!
//! 식은 Pratt 방식으로 파싱합니다. 문법 에러가 나면 에러를 기록하고
//! 문장은 `;`/`end`까지, 조건식은 `then`까지 건너뛴 뒤 계속 진행합니다.
//!
//! # 우선순위 (낮음 → 높음)
//! `or` < `and` < `== !=` < `< <= > >=` < `+ -` < `* / %` < 단항 `not`, 부호 < `.` `[]`

use std::collections::BTreeMap;

use crate::ast::{
    Arg, BinaryOp, Call, Expr, ExprKind, MatchPolicy, PipelineDecl, Rule, Span, StageDecl, Stmt,
};

use super::error::{ParseError, ParseErrorKind};
use super::lexer::{Token, TokenKind};

/// 에러가 이미 기록되었음을 알리는 표식 (복구 지점까지 전파)
#[derive(Debug)]
pub(crate) struct Recover;

type PResult<T> = Result<T, Recover>;

const PREFIX_BP: u8 = 13;

/// 식 AST의 최대 깊이. 타입 검사와 평가도 AST를 재귀로 순회하므로 여기서 막습니다.
pub(crate) const MAX_EXPR_DEPTH: usize = 256;

pub(crate) struct Grammar<'t> {
    tokens: &'t [Token],
    pos: usize,
    /// 현재 파싱 중인 식의 중첩 깊이
    depth: usize,
    pub(crate) errors: Vec<ParseError>,
}

impl<'t> Grammar<'t> {
    /// `tokens`는 `Eof`로 끝나야 합니다.
    pub(crate) fn new(tokens: &'t [Token]) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
            errors: Vec::new(),
        }
    }

    // --- 토큰 커서 ---

    fn peek(&self) -> &'t Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    fn peek_nth(&self, n: usize) -> &'t Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[(self.pos + n).min(last)]
    }

    fn at(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind)
    }

    fn at_eof(&self) -> bool {
        self.at(&TokenKind::Eof)
    }

    fn advance(&mut self) -> &'t Token {
        let token = self.peek();
        if !matches!(token.kind, TokenKind::Eof) {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> PResult<&'t Token> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(self.mismatched(kind.describe()))
        }
    }

    fn expect_string(&mut self) -> PResult<(String, Span)> {
        let token = self.peek();
        match &token.kind {
            TokenKind::Str(s) => {
                self.advance();
                Ok((s.clone(), token.span))
            }
            _ => Err(self.mismatched("String")),
        }
    }

    /// 식별자 자리: 일반 식별자와 일부 키워드(`all`, `pass` 등)를 허용합니다.
    fn expect_name(&mut self) -> PResult<(String, Span)> {
        let token = self.peek();
        let name = match &token.kind {
            TokenKind::Ident(name) => name.clone(),
            other => match other.soft_keyword_name() {
                Some(name) => name.to_owned(),
                None => return Err(self.mismatched("Identifier")),
            },
        };
        self.advance();
        Ok((name, token.span))
    }

    fn is_name(&self, token: &Token) -> bool {
        matches!(token.kind, TokenKind::Ident(_)) || token.kind.soft_keyword_name().is_some()
    }

    // --- 에러 기록 ---

    fn mismatched(&mut self, expecting: &str) -> Recover {
        let token = self.peek();
        self.errors.push(ParseError::syntax(
            format!("mismatched input '{}' expecting {expecting}", token.text),
            token.span,
        ));
        Recover
    }

    fn no_viable_alternative(&mut self) -> Recover {
        let token = self.peek();
        self.errors.push(ParseError::syntax(
            format!("no viable alternative at input '{}'", token.text),
            token.span,
        ));
        Recover
    }

    fn extraneous(&mut self, expecting: &str) {
        let token = self.peek();
        self.errors.push(ParseError::syntax(
            format!("extraneous input '{}' expecting {expecting}", token.text),
            token.span,
        ));
    }

    /// 식 중첩을 한 단계 늘립니다. 한도를 넘으면 에러를 기록합니다.
    fn nest(&mut self) -> PResult<()> {
        self.depth += 1;
        if self.depth > MAX_EXPR_DEPTH {
            let span = self.peek().span;
            self.errors.push(ParseError::syntax(
                format!("expression nested too deeply (limit {MAX_EXPR_DEPTH})"),
                span,
            ));
            return Err(Recover);
        }
        Ok(())
    }

    /// 다음 동기화 토큰까지 건너뜁니다 (동기화 토큰은 소비하지 않음).
    fn skip_until(&mut self, stops: &[TokenKind]) {
        while !self.at_eof() && !stops.iter().any(|k| self.at(k)) {
            self.advance();
        }
    }

    // --- 규칙 ---

    /// `rule "name" when <expr> then <stmt>* end`
    pub(crate) fn rule(&mut self) -> Option<Rule> {
        if self.expect(&TokenKind::Rule).is_err() {
            return None;
        }
        let name = match self.expect_string() {
            Ok((name, _)) => name,
            Err(Recover) => {
                self.skip_until(&[TokenKind::When, TokenKind::Then, TokenKind::End]);
                String::new()
            }
        };

        let when_span = self.peek().span;
        let when = if self.expect(&TokenKind::When).is_ok() {
            match self.expr(0) {
                Ok(expr) => Some(expr),
                Err(Recover) => {
                    self.skip_until(&[TokenKind::Then, TokenKind::End]);
                    None
                }
            }
        } else {
            self.skip_until(&[TokenKind::Then, TokenKind::End]);
            None
        };

        if self.expect(&TokenKind::Then).is_err() {
            self.skip_until(&[TokenKind::End]);
        }

        let mut then = Vec::new();
        while !self.at(&TokenKind::End) && !self.at_eof() {
            match self.statement() {
                Ok(Some(stmt)) => then.push(stmt),
                Ok(None) => {}
                Err(Recover) => {
                    self.skip_until(&[TokenKind::Semi, TokenKind::End]);
                    self.eat(&TokenKind::Semi);
                }
            }
        }
        let _ = self.expect(&TokenKind::End);

        Some(Rule {
            id: None,
            name,
            when: when.unwrap_or_else(|| Expr::new(ExprKind::Bool(false), when_span)),
            then,
        })
    }

    /// `let x = expr;` / `call(...);` / `;`
    fn statement(&mut self) -> PResult<Option<Stmt>> {
        if self.eat(&TokenKind::Semi) {
            return Ok(None);
        }
        if self.at(&TokenKind::Let) {
            let span = self.advance().span;
            let name = match &self.peek().kind {
                TokenKind::Ident(name) => name.clone(),
                _ => return Err(self.mismatched("Identifier")),
            };
            self.advance();
            self.expect(&TokenKind::Assign)?;
            let value = self.expr(0)?;
            self.expect(&TokenKind::Semi)?;
            return Ok(Some(Stmt::Let { name, value, span }));
        }

        let is_call = matches!(self.peek().kind, TokenKind::Ident(_))
            && matches!(self.peek_nth(1).kind, TokenKind::LParen);
        if !is_call {
            return Err(self.no_viable_alternative());
        }
        let expr = self.expr(0)?;
        if !matches!(expr.kind, ExprKind::Call(_)) {
            self.errors.push(ParseError::syntax(
                "only function calls can be used as statements",
                expr.span,
            ));
            return Err(Recover);
        }
        self.expect(&TokenKind::Semi)?;
        Ok(Some(Stmt::Expr(expr)))
    }

    /// 입력 끝이 아니면 남은 입력을 에러로 기록합니다.
    pub(crate) fn expect_eof(&mut self) {
        if !self.at_eof() {
            self.extraneous("<EOF>");
        }
    }

    pub(crate) fn at_end_of_input(&self) -> bool {
        self.at_eof()
    }

    // --- 파이프라인 ---

    /// `pipeline "name" stage* end`
    pub(crate) fn pipeline(&mut self) -> Option<PipelineDecl> {
        if self.expect(&TokenKind::Pipeline).is_err() {
            // 다음 파이프라인 선언까지 건너뜀
            self.advance();
            self.skip_until(&[TokenKind::Pipeline]);
            return None;
        }
        let name = match self.expect_string() {
            Ok((name, _)) => name,
            Err(Recover) => String::new(),
        };

        let mut stages: BTreeMap<i32, StageDecl> = BTreeMap::new();
        while self.at(&TokenKind::Stage) {
            match self.stage() {
                Ok(stage) => {
                    if stages.contains_key(&stage.number) {
                        self.errors.push(ParseError::at(
                            ParseErrorKind::DuplicateStage {
                                pipeline: name.clone(),
                                stage: stage.number,
                            },
                            stage.span,
                        ));
                    } else {
                        stages.insert(stage.number, stage);
                    }
                }
                Err(Recover) => self.skip_until(&[TokenKind::Stage, TokenKind::End]),
            }
        }
        if self.expect(&TokenKind::End).is_err() {
            self.skip_until(&[TokenKind::End, TokenKind::Pipeline]);
            self.eat(&TokenKind::End);
        }

        Some(PipelineDecl {
            id: None,
            name,
            stages: stages.into_values().collect(),
        })
    }

    /// `stage [-]N match all|either|pass (rule "name" ;?)*`
    fn stage(&mut self) -> PResult<StageDecl> {
        let span = self.expect(&TokenKind::Stage)?.span;
        let negative = self.eat(&TokenKind::Minus);
        let number = match self.peek().kind {
            TokenKind::Long(n) => {
                self.advance();
                let n = if negative { -n } else { n };
                match i32::try_from(n) {
                    Ok(n) => n,
                    Err(_) => {
                        self.errors.push(ParseError::syntax(
                            format!("stage number {n} out of range"),
                            span,
                        ));
                        return Err(Recover);
                    }
                }
            }
            _ => return Err(self.mismatched("Integer")),
        };
        self.expect(&TokenKind::Match)?;
        let match_policy = match self.peek().kind {
            TokenKind::All => MatchPolicy::All,
            TokenKind::Either => MatchPolicy::Either,
            TokenKind::Pass => MatchPolicy::Pass,
            _ => return Err(self.mismatched("{'all', 'either', 'pass'}")),
        };
        self.advance();

        let mut rule_names = Vec::new();
        while self.eat(&TokenKind::Rule) {
            let (name, _) = self.expect_string()?;
            rule_names.push(name);
            self.eat(&TokenKind::Semi);
        }

        Ok(StageDecl {
            number,
            match_policy,
            rule_names,
            span,
        })
    }

    // --- 식 ---

    pub(crate) fn expr(&mut self, min_bp: u8) -> PResult<Expr> {
        let depth = self.depth;
        let result = self.nested_expr(min_bp);
        self.depth = depth;
        result
    }

    /// 괄호, 단항 연산자, 인자, 이항 연산 체인, 후위 접근이 모두 깊이를 늘립니다.
    fn nested_expr(&mut self, min_bp: u8) -> PResult<Expr> {
        self.nest()?;
        let mut lhs = self.prefix()?;
        loop {
            let (op, left_bp, right_bp) = match self.peek().kind {
                TokenKind::Or => (BinaryOp::Or, 1, 2),
                TokenKind::And => (BinaryOp::And, 3, 4),
                TokenKind::Eq => (BinaryOp::Eq, 5, 6),
                TokenKind::NotEq => (BinaryOp::NotEq, 5, 6),
                TokenKind::Lt => (BinaryOp::Lt, 7, 8),
                TokenKind::Le => (BinaryOp::Le, 7, 8),
                TokenKind::Gt => (BinaryOp::Gt, 7, 8),
                TokenKind::Ge => (BinaryOp::Ge, 7, 8),
                TokenKind::Plus => (BinaryOp::Add, 9, 10),
                TokenKind::Minus => (BinaryOp::Sub, 9, 10),
                TokenKind::Star => (BinaryOp::Mul, 11, 12),
                TokenKind::Slash => (BinaryOp::Div, 11, 12),
                TokenKind::Percent => (BinaryOp::Rem, 11, 12),
                _ => break,
            };
            if left_bp < min_bp {
                break;
            }
            self.nest()?;
            self.advance();
            let rhs = self.expr(right_bp)?;
            let span = lhs.span;
            lhs = Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(lhs),
                    right: Box::new(rhs),
                },
                span,
            );
        }
        Ok(lhs)
    }

    fn prefix(&mut self) -> PResult<Expr> {
        let token = self.peek();
        match token.kind {
            TokenKind::Not => {
                self.advance();
                let inner = self.expr(PREFIX_BP)?;
                Ok(Expr::new(ExprKind::Not(Box::new(inner)), token.span))
            }
            TokenKind::Plus | TokenKind::Minus => {
                self.advance();
                let inner = self.expr(PREFIX_BP)?;
                Ok(Expr::new(
                    ExprKind::Signed {
                        negative: matches!(token.kind, TokenKind::Minus),
                        expr: Box::new(inner),
                    },
                    token.span,
                ))
            }
            _ => {
                let primary = self.primary()?;
                self.postfix(primary)
            }
        }
    }

    fn postfix(&mut self, mut expr: Expr) -> PResult<Expr> {
        loop {
            if self.at(&TokenKind::Dot) || self.at(&TokenKind::LBracket) {
                self.nest()?;
            }
            if self.eat(&TokenKind::Dot) {
                let (field, _) = self.expect_name()?;
                let span = expr.span;
                expr = Expr::new(
                    ExprKind::Field {
                        object: Box::new(expr),
                        field,
                    },
                    span,
                );
            } else if self.eat(&TokenKind::LBracket) {
                let index = self.expr(0)?;
                self.expect(&TokenKind::RBracket)?;
                let span = expr.span;
                expr = Expr::new(
                    ExprKind::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    },
                    span,
                );
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> PResult<Expr> {
        let token = self.peek();
        let span = token.span;
        let kind = match &token.kind {
            TokenKind::Long(n) => ExprKind::Long(*n),
            TokenKind::Double(d) => ExprKind::Double(*d),
            TokenKind::Str(s) => ExprKind::String(s.clone()),
            TokenKind::True => ExprKind::Bool(true),
            TokenKind::False => ExprKind::Bool(false),
            TokenKind::LParen => {
                self.advance();
                let inner = self.expr(0)?;
                self.expect(&TokenKind::RParen)?;
                return Ok(inner);
            }
            TokenKind::LBracket => return self.array_literal(),
            TokenKind::LBrace => return self.map_literal(),
            TokenKind::MessageRef => {
                self.advance();
                self.expect(&TokenKind::Dot)?;
                let (field, _) = self.expect_name()?;
                return Ok(Expr::new(ExprKind::MessageField(field), span));
            }
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                if self.at(&TokenKind::LParen) {
                    return self.call(name, span);
                }
                ExprKind::Var(name)
            }
            _ => return Err(self.no_viable_alternative()),
        };
        self.advance();
        Ok(Expr::new(kind, span))
    }

    fn array_literal(&mut self) -> PResult<Expr> {
        let span = self.expect(&TokenKind::LBracket)?.span;
        let mut items = Vec::new();
        if !self.eat(&TokenKind::RBracket) {
            loop {
                items.push(self.expr(0)?);
                if self.eat(&TokenKind::Comma) {
                    continue;
                }
                self.expect(&TokenKind::RBracket)?;
                break;
            }
        }
        Ok(Expr::new(ExprKind::Array(items), span))
    }

    fn map_literal(&mut self) -> PResult<Expr> {
        let span = self.expect(&TokenKind::LBrace)?.span;
        let mut entries = Vec::new();
        if !self.eat(&TokenKind::RBrace) {
            loop {
                let key = match &self.peek().kind {
                    TokenKind::Str(s) => {
                        let key = s.clone();
                        self.advance();
                        key
                    }
                    _ => self.expect_name()?.0,
                };
                self.expect(&TokenKind::Colon)?;
                let value = self.expr(0)?;
                entries.push((key, value));
                if self.eat(&TokenKind::Comma) {
                    continue;
                }
                self.expect(&TokenKind::RBrace)?;
                break;
            }
        }
        Ok(Expr::new(ExprKind::Map(entries), span))
    }

    /// `name(positional..., key: value, ...)`
    fn call(&mut self, name: String, span: Span) -> PResult<Expr> {
        self.expect(&TokenKind::LParen)?;
        let mut args: Vec<Arg> = Vec::new();
        let mut seen_named = false;
        if !self.eat(&TokenKind::RParen) {
            loop {
                let named = self.is_name(self.peek())
                    && matches!(self.peek_nth(1).kind, TokenKind::Colon);
                if named {
                    let (arg_name, _) = self.expect_name()?;
                    self.advance();
                    let value = self.expr(0)?;
                    args.push(Arg {
                        name: Some(arg_name),
                        value,
                    });
                    seen_named = true;
                } else {
                    let arg_span = self.peek().span;
                    let value = self.expr(0)?;
                    if seen_named {
                        self.errors.push(ParseError::syntax(
                            "positional argument follows named argument",
                            arg_span,
                        ));
                        return Err(Recover);
                    }
                    args.push(Arg { name: None, value });
                }
                if self.eat(&TokenKind::Comma) {
                    continue;
                }
                self.expect(&TokenKind::RParen)?;
                break;
            }
        }
        Ok(Expr::new(
            ExprKind::Call(Call {
                name,
                args,
                function: None,
            }),
            span,
        ))
    }
}
