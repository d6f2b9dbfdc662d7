//! 렉서 -- 규칙 소스를 위치가 붙은 토큰 열로 분해합니다.
//!
//! 인식할 수 없는 문자는 에러로 기록하고 한 글자를 건너뛴 뒤 계속 진행합니다.

use winnow::ascii::{digit1, multispace1, till_line_ending};
use winnow::combinator::{alt, opt, repeat};
use winnow::error::ModalResult;
use winnow::prelude::*;
use winnow::token::{any, one_of, take_till, take_until, take_while};

use crate::ast::Span;

use super::error::ParseError;

/// 토큰 종류
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Str(String),
    Long(i64),
    Double(f64),
    /// `$message`
    MessageRef,
    // 키워드 (대소문자 무시)
    Rule,
    When,
    Then,
    End,
    Let,
    Pipeline,
    Stage,
    Match,
    All,
    Either,
    Pass,
    And,
    Or,
    Not,
    True,
    False,
    // 구두점 / 연산자
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Semi,
    Colon,
    Dot,
    Assign,
    Eq,
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
    Eof,
}

impl TokenKind {
    fn keyword(word: &str) -> Option<Self> {
        let kind = match word.to_ascii_lowercase().as_str() {
            "rule" => Self::Rule,
            "when" => Self::When,
            "then" => Self::Then,
            "end" => Self::End,
            "let" => Self::Let,
            "pipeline" => Self::Pipeline,
            "stage" => Self::Stage,
            "match" => Self::Match,
            "all" => Self::All,
            "either" => Self::Either,
            "pass" => Self::Pass,
            "and" => Self::And,
            "or" => Self::Or,
            "not" => Self::Not,
            "true" => Self::True,
            "false" => Self::False,
            _ => return None,
        };
        Some(kind)
    }

    /// 에러 메시지의 `expecting ...` 부분에 쓰는 표기
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Ident(_) => "Identifier",
            Self::Str(_) => "String",
            Self::Long(_) => "Integer",
            Self::Double(_) => "Float",
            Self::MessageRef => "'$message'",
            Self::Rule => "'rule'",
            Self::When => "'when'",
            Self::Then => "'then'",
            Self::End => "'end'",
            Self::Let => "'let'",
            Self::Pipeline => "'pipeline'",
            Self::Stage => "'stage'",
            Self::Match => "'match'",
            Self::All => "'all'",
            Self::Either => "'either'",
            Self::Pass => "'pass'",
            Self::And => "'and'",
            Self::Or => "'or'",
            Self::Not => "'not'",
            Self::True => "'true'",
            Self::False => "'false'",
            Self::LParen => "'('",
            Self::RParen => "')'",
            Self::LBracket => "'['",
            Self::RBracket => "']'",
            Self::LBrace => "'{'",
            Self::RBrace => "'}'",
            Self::Comma => "','",
            Self::Semi => "';'",
            Self::Colon => "':'",
            Self::Dot => "'.'",
            Self::Assign => "'='",
            Self::Eq => "'=='",
            Self::NotEq => "'!='",
            Self::Lt => "'<'",
            Self::Le => "'<='",
            Self::Gt => "'>'",
            Self::Ge => "'>='",
            Self::Plus => "'+'",
            Self::Minus => "'-'",
            Self::Star => "'*'",
            Self::Slash => "'/'",
            Self::Percent => "'%'",
            Self::Eof => "<EOF>",
        }
    }

    /// 식별자 자리에 올 수 있는 키워드 (`all`, `pass` 등은 함수 인자 이름으로도 쓰임)
    pub fn soft_keyword_name(&self) -> Option<&'static str> {
        match self {
            Self::All => Some("all"),
            Self::Either => Some("either"),
            Self::Pass => Some("pass"),
            Self::Match => Some("match"),
            Self::Stage => Some("stage"),
            Self::Pipeline => Some("pipeline"),
            Self::Rule => Some("rule"),
            _ => None,
        }
    }
}

/// 위치가 붙은 토큰
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// 소스상의 원문 (에러 메시지용)
    pub text: String,
    pub span: Span,
}

/// 소스 전체를 토큰화합니다. 결과 토큰 열은 항상 `Eof`로 끝납니다.
pub fn tokenize(source: &str) -> (Vec<Token>, Vec<ParseError>) {
    let mut lines = LineIndex::new(source);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();
    let mut input: &str = source;

    loop {
        // 공백 / 주석
        if let Some(comment_start) = skip_trivia(&mut input) {
            errors.push(ParseError::syntax(
                "unterminated comment",
                lines.span(source.len() - comment_start.len()),
            ));
        }
        let offset = source.len() - input.len();
        let span = lines.span(offset);
        if input.is_empty() {
            tokens.push(Token {
                kind: TokenKind::Eof,
                text: "<EOF>".to_owned(),
                span,
            });
            break;
        }

        let checkpoint = input;
        match token(&mut input) {
            Ok(Ok(kind)) => {
                let text = checkpoint[..checkpoint.len() - input.len()].to_owned();
                tokens.push(Token { kind, text, span });
            }
            Ok(Err(message)) => {
                errors.push(ParseError::syntax(message, span));
            }
            Err(_) => {
                input = checkpoint;
                let mut chars = input.chars();
                let bad = chars.next().unwrap_or_default();
                errors.push(ParseError::syntax(
                    format!("token recognition error at: '{bad}'"),
                    span,
                ));
                input = chars.as_str();
            }
        }
    }

    (tokens, errors)
}

/// 공백과 주석을 건너뜁니다. 닫히지 않은 블록 주석이면 그 시작 위치를 반환하고 입력을 모두 소비합니다.
fn skip_trivia<'i>(input: &mut &'i str) -> Option<&'i str> {
    let _: ModalResult<()> = repeat(
        0..,
        alt((
            multispace1.void(),
            ("//", till_line_ending).void(),
            ("/*", take_until(0.., "*/"), "*/").void(),
        )),
    )
    .parse_next(input);

    if input.starts_with("/*") {
        let start = *input;
        *input = "";
        return Some(start);
    }
    None
}

/// 토큰 하나를 인식합니다.
///
/// 바깥 `Err`는 어떤 토큰으로도 시작하지 않는 입력, 안쪽 `Err`는
/// 토큰으로 시작했지만 형식이 잘못된 경우(닫히지 않은 문자열 등)입니다.
fn token(input: &mut &str) -> ModalResult<Result<TokenKind, String>> {
    alt((
        string_token,
        number_token,
        "$message".value(Ok(TokenKind::MessageRef)),
        quoted_ident.map(|name| Ok(TokenKind::Ident(name.to_owned()))),
        word.map(|w: &str| Ok(TokenKind::keyword(w).unwrap_or_else(|| TokenKind::Ident(w.to_owned())))),
        operator.map(Ok),
    ))
    .parse_next(input)
}

fn word<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    (
        one_of(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
        .take()
        .parse_next(input)
}

fn quoted_ident<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    ('`', take_till(0.., '`'), '`')
        .map(|(_, name, _)| name)
        .parse_next(input)
}

fn number_token(input: &mut &str) -> ModalResult<Result<TokenKind, String>> {
    let text = (
        digit1,
        opt(('.', digit1)),
        opt((one_of(['e', 'E']), opt(one_of(['+', '-'])), digit1)),
    )
        .take()
        .parse_next(input)?;

    let is_double = text.contains(['.', 'e', 'E']);
    let kind = if is_double {
        text.parse::<f64>().map(TokenKind::Double).ok()
    } else {
        text.parse::<i64>().map(TokenKind::Long).ok()
    };
    Ok(kind.ok_or_else(|| format!("invalid number literal '{text}'")))
}

fn string_token(input: &mut &str) -> ModalResult<Result<TokenKind, String>> {
    '"'.parse_next(input)?;
    let mut s = String::new();
    loop {
        let Ok(ch) = any::<_, winnow::error::ContextError>.parse_next(input) else {
            return Ok(Err("unterminated string literal".to_owned()));
        };
        match ch {
            '"' => return Ok(Ok(TokenKind::Str(s))),
            '\\' => {
                let Ok(esc) = any::<_, winnow::error::ContextError>.parse_next(input) else {
                    return Ok(Err("unterminated string literal".to_owned()));
                };
                match esc {
                    '"' => s.push('"'),
                    '\'' => s.push('\''),
                    '\\' => s.push('\\'),
                    'n' => s.push('\n'),
                    't' => s.push('\t'),
                    'r' => s.push('\r'),
                    'u' => {
                        let hex: Result<&str, winnow::error::ContextError> =
                            take_while(4, |c: char| c.is_ascii_hexdigit()).parse_next(input);
                        let decoded = hex
                            .ok()
                            .and_then(|h| u32::from_str_radix(h, 16).ok())
                            .and_then(char::from_u32);
                        match decoded {
                            Some(c) => s.push(c),
                            None => return Ok(Err("invalid unicode escape".to_owned())),
                        }
                    }
                    other => {
                        s.push('\\');
                        s.push(other);
                    }
                }
            }
            c => s.push(c),
        }
    }
}

fn operator(input: &mut &str) -> ModalResult<TokenKind> {
    alt((
        alt((
            "&&".value(TokenKind::And),
            "||".value(TokenKind::Or),
            "==".value(TokenKind::Eq),
            "!=".value(TokenKind::NotEq),
            "<=".value(TokenKind::Le),
            ">=".value(TokenKind::Ge),
            '<'.value(TokenKind::Lt),
            '>'.value(TokenKind::Gt),
            '!'.value(TokenKind::Not),
            '='.value(TokenKind::Assign),
        )),
        alt((
            '+'.value(TokenKind::Plus),
            '-'.value(TokenKind::Minus),
            '*'.value(TokenKind::Star),
            '/'.value(TokenKind::Slash),
            '%'.value(TokenKind::Percent),
            '('.value(TokenKind::LParen),
            ')'.value(TokenKind::RParen),
            '['.value(TokenKind::LBracket),
            ']'.value(TokenKind::RBracket),
        )),
        alt((
            '{'.value(TokenKind::LBrace),
            '}'.value(TokenKind::RBrace),
            ','.value(TokenKind::Comma),
            ';'.value(TokenKind::Semi),
            ':'.value(TokenKind::Colon),
            '.'.value(TokenKind::Dot),
        )),
    ))
    .parse_next(input)
}

/// 바이트 오프셋을 (줄, 열) 위치로 변환합니다.
///
/// 오프셋이 증가하는 순서로 조회되면 같은 줄에서는 직전 위치부터 이어서 셉니다.
struct LineIndex<'s> {
    source: &'s str,
    line_starts: Vec<usize>,
    /// 직전 조회의 (줄, 오프셋, 열)
    last: (usize, usize, usize),
}

impl<'s> LineIndex<'s> {
    fn new(source: &'s str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            source,
            line_starts,
            last: (0, 0, 0),
        }
    }

    fn span(&mut self, offset: usize) -> Span {
        let line = self.line_starts.partition_point(|&start| start <= offset).max(1);
        let (last_line, last_offset, last_column) = self.last;
        let column = if line == last_line && offset >= last_offset {
            last_column + self.source[last_offset..offset].chars().count()
        } else {
            let start = self.line_starts[line - 1];
            self.source[start..offset].chars().count()
        };
        self.last = (line, offset, column);
        Span::new(
            u32::try_from(line).unwrap_or(u32::MAX),
            u32::try_from(column).unwrap_or(u32::MAX),
        )
    }
}
