//! 규칙 언어 파서 -- 렉싱, 구문 분석, 타입 검사
//!
//! [`RuleParser`]는 규칙 소스와 파이프라인 소스를 AST로 변환합니다.
//! 에러는 첫 번째에서 멈추지 않고 모두 수집되어 [`ParseErrors`]로 반환됩니다.
//! 문법 에러가 있으면 타입 검사는 수행하지 않습니다.
//!
//! # 사용 예시
//! ```ignore
//! let parser = RuleParser::new(Arc::new(FunctionRegistry::with_builtins()));
//! let rule = parser.parse_rule(r#"rule "r" when true then drop_message(); end"#)?;
//! ```

pub mod error;
pub mod lexer;

mod grammar;
mod typecheck;

use std::sync::Arc;

pub use error::{ParseError, ParseErrorKind, ParseErrors};

use crate::ast::{PipelineDecl, Rule};
use crate::functions::FunctionRegistry;

use grammar::Grammar;
use typecheck::TypeChecker;

/// 규칙/파이프라인 소스 파서
///
/// 상태가 없으므로 여러 스레드에서 공유할 수 있습니다.
#[derive(Clone)]
pub struct RuleParser {
    functions: Arc<FunctionRegistry>,
}

impl RuleParser {
    pub fn new(functions: Arc<FunctionRegistry>) -> Self {
        Self { functions }
    }

    pub fn functions(&self) -> &Arc<FunctionRegistry> {
        &self.functions
    }

    /// 규칙 하나를 파싱하고 타입 검사합니다.
    pub fn parse_rule(&self, source: &str) -> Result<Rule, ParseErrors> {
        let (tokens, mut errors) = lexer::tokenize(source);
        let mut grammar = Grammar::new(&tokens);
        let rule = grammar.rule();
        if rule.is_some() {
            grammar.expect_eof();
        }
        errors.append(&mut grammar.errors);

        let mut rule = match rule {
            Some(rule) if errors.is_empty() => rule,
            _ => return Err(sorted(errors)),
        };

        let mut checker = TypeChecker::new(&self.functions);
        checker.check_rule(&mut rule);
        if checker.errors.is_empty() {
            Ok(rule)
        } else {
            Err(sorted(checker.errors))
        }
    }

    /// 파이프라인 선언 하나를 파싱합니다.
    pub fn parse_pipeline(&self, source: &str) -> Result<PipelineDecl, ParseErrors> {
        let (tokens, mut errors) = lexer::tokenize(source);
        let mut grammar = Grammar::new(&tokens);
        let pipeline = grammar.pipeline();
        if pipeline.is_some() {
            grammar.expect_eof();
        }
        errors.append(&mut grammar.errors);
        match pipeline {
            Some(pipeline) if errors.is_empty() => Ok(pipeline),
            _ => Err(sorted(errors)),
        }
    }

    /// 여러 파이프라인 선언이 이어진 소스를 파싱합니다.
    pub fn parse_pipelines(&self, source: &str) -> Result<Vec<PipelineDecl>, ParseErrors> {
        let (tokens, mut errors) = lexer::tokenize(source);
        let mut grammar = Grammar::new(&tokens);
        let mut pipelines = Vec::new();
        while !grammar.at_end_of_input() {
            if let Some(pipeline) = grammar.pipeline() {
                pipelines.push(pipeline);
            }
        }
        errors.append(&mut grammar.errors);
        if errors.is_empty() {
            Ok(pipelines)
        } else {
            Err(sorted(errors))
        }
    }
}

fn sorted(mut errors: Vec<ParseError>) -> ParseErrors {
    errors.sort_by_key(|e| (e.line, e.column));
    ParseErrors::new(errors)
}
